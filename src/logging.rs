// ==========================================
// 批量导入核心 - 日志
// ==========================================
// tracing-subscriber，级别由 RUST_LOG 覆盖
// 默认: 本库 info，其余 warn
// ==========================================

use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_DIRECTIVES: &str = "bulk_import=info,warn";

fn env_filter(fallback: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback))
}

/// 文本日志（控制台）
///
/// # 环境变量
/// - RUST_LOG: 例如 `RUST_LOG=bulk_import::importer::allocator=trace`
///
/// 宿主已安装订阅者时静默跳过
pub fn init() {
    let _ = fmt()
        .with_env_filter(env_filter(DEFAULT_DIRECTIVES))
        .with_target(true)
        .with_line_number(true)
        .try_init();
}

/// JSON 行日志，带当前 span（run_id / entity_type 随 span 输出）
pub fn init_json() {
    let _ = fmt()
        .json()
        .with_env_filter(env_filter(DEFAULT_DIRECTIVES))
        .with_current_span(true)
        .try_init();
}

/// 测试用: debug 级别，输出交给测试框架捕获
pub fn init_test() {
    let _ = fmt()
        .with_env_filter(EnvFilter::new("bulk_import=debug"))
        .with_test_writer()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeated_init_is_harmless() {
        init_test();
        init();
        init_json();
        tracing::info!("日志已初始化");
    }

    #[test]
    fn test_default_directives_parse() {
        assert!(DEFAULT_DIRECTIVES.parse::<EnvFilter>().is_ok());
    }
}
