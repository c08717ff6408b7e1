// ==========================================
// 批量导入核心 - 参数化批量语句构建
// ==========================================
// 职责: 标识符集中校验 + 多行 INSERT 分块构建
// 约束: 值只走绑定参数；单条语句参数数不超过 SQLite 上限
// ==========================================

use crate::repository::entity_store::{SqlValue, Statement};
use crate::repository::error::{RepositoryError, RepositoryResult};

/// SQLite 单条语句绑定参数上限（SQLITE_MAX_VARIABLE_NUMBER，3.32+ 默认值）
pub const MAX_BOUND_PARAMETERS: usize = 32_766;

/// 校验并引用 SQL 标识符
///
/// 只接受 `[A-Za-z_][A-Za-z0-9_]*`，返回带双引号的标识符。
pub fn quote_identifier(name: &str) -> RepositoryResult<String> {
    let mut chars = name.chars();
    let valid_head = chars
        .next()
        .map(|c| c.is_ascii_alphabetic() || c == '_')
        .unwrap_or(false);
    let valid_tail = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

    if valid_head && valid_tail {
        Ok(format!("\"{}\"", name))
    } else {
        Err(RepositoryError::InvalidIdentifier(name.to_string()))
    }
}

/// `?1, ?2, ...` 形式的占位符列表（从 start 开始编号）
pub fn numbered_placeholders(start: usize, count: usize) -> String {
    (start..start + count)
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ")
}

// ==========================================
// BulkInsertBuilder - 多行 INSERT 分块
// ==========================================
#[derive(Debug, Clone)]
pub struct BulkInsertBuilder {
    table: String,
    columns: Vec<String>,
    rows_per_statement: usize,
}

impl BulkInsertBuilder {
    /// # 参数
    /// - table: 目标表（可带 `temp.` 模式前缀）
    /// - columns: 列名
    /// - rows_per_statement: 每条语句的行数上限（会被参数上限进一步收紧）
    pub fn new(table: &str, columns: &[&str], rows_per_statement: usize) -> RepositoryResult<Self> {
        if columns.is_empty() {
            return Err(RepositoryError::InvalidStatement(format!(
                "批量插入 {} 未指定列",
                table
            )));
        }

        let table = match table.split_once('.') {
            Some((schema, name)) => format!("{}.{}", quote_identifier(schema)?, quote_identifier(name)?),
            None => quote_identifier(table)?,
        };
        let columns = columns
            .iter()
            .map(|c| quote_identifier(c))
            .collect::<RepositoryResult<Vec<_>>>()?;

        let max_rows = (MAX_BOUND_PARAMETERS / columns.len()).max(1);
        let rows_per_statement = rows_per_statement.clamp(1, max_rows);

        Ok(Self {
            table,
            columns,
            rows_per_statement,
        })
    }

    pub fn rows_per_statement(&self) -> usize {
        self.rows_per_statement
    }

    /// 将行切分为若干条参数化语句
    pub fn build(&self, rows: &[Vec<SqlValue>]) -> RepositoryResult<Vec<Statement>> {
        let width = self.columns.len();
        if let Some(bad) = rows.iter().position(|r| r.len() != width) {
            return Err(RepositoryError::InvalidStatement(format!(
                "第 {} 行有 {} 个值，期望 {} 个",
                bad,
                rows[bad].len(),
                width
            )));
        }

        let column_list = self.columns.join(", ");
        let statements = rows
            .chunks(self.rows_per_statement)
            .map(|chunk| {
                let values = (0..chunk.len())
                    .map(|i| format!("({})", numbered_placeholders(i * width + 1, width)))
                    .collect::<Vec<_>>()
                    .join(", ");
                Statement::new(
                    format!("INSERT INTO {} ({}) VALUES {}", self.table, column_list, values),
                    chunk.iter().flatten().cloned().collect(),
                )
            })
            .collect();

        Ok(statements)
    }
}
