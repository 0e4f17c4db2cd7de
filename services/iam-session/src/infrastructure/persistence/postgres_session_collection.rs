//! PostgreSQL 会话集合实现

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use latch_adapter_postgres::{PostgresConfig, check_connection, create_pool};
use latch_config::DatabaseConfig;
use latch_errors::{AppError, AppResult};
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::domain::repositories::SessionCollection;
use crate::domain::session::{NewSession, SessionFilter, SessionId, SessionRecord};
use crate::domain::value_objects::Username;

use super::ensure_session_schema;

pub struct PostgresSessionCollection {
    pool: PgPool,
}

impl PostgresSessionCollection {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 按配置建立连接池，探测可用后确保会话表存在
    pub async fn connect(config: &DatabaseConfig) -> AppResult<Self> {
        let pool = create_pool(&PostgresConfig::from(config)).await?;
        check_connection(&pool).await?;

        let migrations = ensure_session_schema(&pool).await?;
        info!(
            applied = migrations.applied.len(),
            skipped = migrations.skipped.len(),
            "Session schema ready"
        );

        Ok(Self::new(pool))
    }
}

#[derive(sqlx::FromRow)]
struct SessionRow {
    id: Uuid,
    username: String,
    credential_hash: String,
    issued_at: DateTime<Utc>,
}

impl SessionRow {
    fn into_record(self) -> AppResult<SessionRecord> {
        let username = Username::new(self.username).map_err(|e| {
            AppError::storage_failure(format!("Corrupt session row {}: {}", self.id, e))
        })?;

        Ok(SessionRecord {
            id: SessionId::from_uuid(self.id),
            username,
            credential_hash: self.credential_hash,
            issued_at: self.issued_at,
        })
    }
}

#[async_trait]
impl SessionCollection for PostgresSessionCollection {
    async fn insert(&self, session: NewSession) -> AppResult<SessionRecord> {
        let row = sqlx::query_as::<_, SessionRow>(
            r#"
            INSERT INTO sessions (id, username, credential_hash, issued_at)
            VALUES ($1, $2, $3, $4)
            RETURNING id, username, credential_hash, issued_at
            "#,
        )
        .bind(SessionId::new().0)
        .bind(session.username.as_str())
        .bind(&session.credential_hash)
        .bind(session.issued_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::storage_failure(format!("Failed to insert session: {}", e)))?;

        row.into_record()
    }

    async fn find_one(&self, filter: &SessionFilter) -> AppResult<Option<SessionRecord>> {
        let row = sqlx::query_as::<_, SessionRow>(
            r#"
            SELECT id, username, credential_hash, issued_at
            FROM sessions
            WHERE username = $1 AND ($2::TEXT IS NULL OR credential_hash <> $2)
            ORDER BY issued_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(filter.username.as_str())
        .bind(filter.exclude_credential_hash.as_deref())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::storage_failure(format!("Failed to find session: {}", e)))?;

        row.map(SessionRow::into_record).transpose()
    }

    async fn remove_many(&self, filter: &SessionFilter) -> AppResult<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM sessions
            WHERE username = $1 AND ($2::TEXT IS NULL OR credential_hash <> $2)
            "#,
        )
        .bind(filter.username.as_str())
        .bind(filter.exclude_credential_hash.as_deref())
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::storage_failure(format!("Failed to remove sessions: {}", e)))?;

        Ok(result.rows_affected())
    }
}
