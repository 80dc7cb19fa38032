//! Embedded database schema, applied on startup.

use anyhow::{Context, Result};
use sqlx::PgPool;
use tracing::{debug, info_span, Instrument};

pub const SCHEMA_SQL: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/sql/schema.sql"));

/// Run every statement of `schema.sql` in order.
///
/// # Errors
/// Returns an error naming the first statement that failed.
pub async fn apply(pool: &PgPool) -> Result<()> {
    for (index, statement) in split_sql_statements(SCHEMA_SQL).iter().enumerate() {
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DDL",
            statement = index + 1
        );
        sqlx::query(statement)
            .execute(pool)
            .instrument(span)
            .await
            .with_context(|| format!("failed to execute schema statement {}", index + 1))?;
    }

    debug!("schema applied");

    Ok(())
}

/// Split on statement-terminating `;`, dropping comment-only lines.
fn split_sql_statements(sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();

    for line in sql.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with("--") {
            continue;
        }
        current.push_str(line);
        current.push('\n');

        if trimmed.ends_with(';') {
            let statement = current.trim();
            if !statement.is_empty() {
                statements.push(statement.to_string());
            }
            current.clear();
        }
    }

    let leftover = current.trim();
    if !leftover.is_empty() {
        statements.push(leftover.to_string());
    }

    statements
}
