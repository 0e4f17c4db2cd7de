//! 会话表结构迁移

use latch_adapter_postgres::{Migration, MigrationManager, MigrationResult};
use latch_errors::AppResult;
use sqlx::PgPool;

const CREATE_SESSIONS: &str = r#"
CREATE TABLE IF NOT EXISTS sessions (
    id UUID PRIMARY KEY,
    username TEXT NOT NULL CHECK (username <> ''),
    credential_hash TEXT NOT NULL,
    issued_at TIMESTAMPTZ NOT NULL
);

CREATE INDEX IF NOT EXISTS sessions_username_idx ON sessions (username, issued_at DESC);
"#;

/// 会话子系统的全部迁移
pub fn session_migrations() -> Vec<Migration> {
    vec![Migration::new(1, "create_sessions", CREATE_SESSIONS)]
}

/// 创建会话表及 username 索引
pub async fn ensure_session_schema(pool: &PgPool) -> AppResult<MigrationResult> {
    MigrationManager::new(pool.clone())
        .migrate(&session_migrations())
        .await
}
