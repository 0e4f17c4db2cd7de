//! 会话存储
//!
//! 编排会话生命周期：签发（生成凭证 → 插入 → 清理同一用户的旧会话）与校验。
//! 每个步骤都受截止时间约束，超时返回 `AppError::Timeout`。

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use latch_common::{Clock, RetryConfig, SystemClock, with_conditional_retry};
use latch_config::SessionConfig;
use latch_errors::{AppError, AppResult};
use latch_telemetry::names;
use secrecy::{ExposeSecret, SecretString};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::domain::repositories::SessionCollection;
use crate::domain::services::CredentialFactory;
use crate::domain::session::{NewSession, SessionFilter, SessionId, SessionRecord};
use crate::domain::value_objects::Username;

const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(5);

/// 旧会话清理的结果
///
/// 清理失败不影响新会话的有效性，由调用方决定是否记录或稍后重试。
#[derive(Debug)]
pub enum CleanupOutcome {
    Removed(u64),
    Failed(AppError),
}

impl CleanupOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    pub fn removed(&self) -> Option<u64> {
        match self {
            Self::Removed(n) => Some(*n),
            Self::Failed(_) => None,
        }
    }
}

/// 新签发的会话，唯一携带明文密钥的结构
#[derive(Debug)]
pub struct IssuedSession {
    pub id: SessionId,
    pub username: Username,
    pub secret: SecretString,
    pub issued_at: DateTime<Utc>,
    pub cleanup: CleanupOutcome,
}

impl IssuedSession {
    /// 取出明文密钥，交付给客户端
    pub fn expose_secret(&self) -> &str {
        self.secret.expose_secret()
    }
}

/// 会话存储
pub struct SessionStore {
    sessions: Arc<dyn SessionCollection>,
    credentials: Arc<dyn CredentialFactory>,
    clock: Arc<dyn Clock>,
    operation_timeout: Duration,
    cleanup_retry: RetryConfig,
}

impl SessionStore {
    pub fn new(
        sessions: Arc<dyn SessionCollection>,
        credentials: Arc<dyn CredentialFactory>,
    ) -> Self {
        Self {
            sessions,
            credentials,
            clock: Arc::new(SystemClock),
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
            cleanup_retry: RetryConfig::default(),
        }
    }

    pub fn from_config(
        sessions: Arc<dyn SessionCollection>,
        credentials: Arc<dyn CredentialFactory>,
        config: &SessionConfig,
    ) -> Self {
        Self::new(sessions, credentials)
            .with_operation_timeout(config.operation_timeout())
            .with_cleanup_retry(config.cleanup_retry.to_retry_config())
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    pub fn with_cleanup_retry(mut self, retry: RetryConfig) -> Self {
        self.cleanup_retry = retry;
        self
    }

    /// 为用户签发新会话，使用默认截止时间
    pub async fn create(&self, username: &str) -> AppResult<IssuedSession> {
        self.create_before(username, Instant::now() + self.operation_timeout)
            .await
    }

    /// 为用户签发新会话，并使该用户的其他会话失效
    ///
    /// # 错误
    /// - `InvalidInput`: 用户名为空
    /// - `CryptoFailure`: 随机源或哈希失败，未写入任何数据
    /// - `StorageFailure` / `Timeout`: 插入失败，未执行清理
    ///
    /// 清理失败不返回错误，见 [`IssuedSession::cleanup`]。
    pub async fn create_before(
        &self,
        username: &str,
        deadline: Instant,
    ) -> AppResult<IssuedSession> {
        let username = Username::new(username)?;
        debug!(username = %username, "Creating session");

        // 1. 生成密钥与哈希
        let started = std::time::Instant::now();
        let credential = within(
            deadline,
            "credential generation",
            self.credentials.generate_credential(),
        )
        .await
        .inspect_err(|e| warn!(username = %username, error = %e, "Failed to generate credential"))?;
        metrics::histogram!(names::CREDENTIAL_GENERATION_SECONDS)
            .record(started.elapsed().as_secs_f64());

        // 2. 插入新会话
        let new_session = NewSession::new(
            username.clone(),
            credential.credential_hash,
            self.clock.now(),
        );
        let record = within(deadline, "session insert", self.sessions.insert(new_session))
            .await
            .inspect_err(|e| warn!(username = %username, error = %e, "Failed to persist session"))?;

        // 3. 删除同一用户名下哈希不同的其他会话
        let cleanup = self.remove_superseded(&record, deadline).await;

        metrics::counter!(names::SESSIONS_CREATED).increment(1);
        info!(
            username = %record.username,
            session_id = %record.id,
            removed = cleanup.removed(),
            "Session created"
        );

        Ok(IssuedSession {
            id: record.id,
            username: record.username,
            secret: credential.secret,
            issued_at: record.issued_at,
            cleanup,
        })
    }

    async fn remove_superseded(&self, record: &SessionRecord, deadline: Instant) -> CleanupOutcome {
        let filter = SessionFilter::by_username(record.username.clone())
            .excluding_credential_hash(record.credential_hash.clone());

        let result = within(
            deadline,
            "session cleanup",
            with_conditional_retry(
                &self.cleanup_retry,
                "session cleanup",
                || self.sessions.remove_many(&filter),
                AppError::is_retryable,
            ),
        )
        .await;

        match result {
            Ok(removed) => {
                if removed > 0 {
                    debug!(username = %record.username, removed, "Superseded sessions removed");
                }
                CleanupOutcome::Removed(removed)
            }
            Err(e) => {
                metrics::counter!(names::SESSION_CLEANUP_FAILURES).increment(1);
                warn!(
                    username = %record.username,
                    session_id = %record.id,
                    error = %e,
                    "Failed to remove superseded sessions, new session remains valid"
                );
                CleanupOutcome::Failed(e)
            }
        }
    }

    /// 校验用户名与密钥，使用默认截止时间
    pub async fn verify_credentials(
        &self,
        username: &str,
        supplied_secret: &str,
    ) -> AppResult<Option<SessionRecord>> {
        self.verify_credentials_before(
            username,
            supplied_secret,
            Instant::now() + self.operation_timeout,
        )
        .await
    }

    /// 校验用户名与密钥
    ///
    /// 匹配返回 `Some(record)`；用户不存在或密钥错误都返回 `None`，
    /// 两种情况都会执行一次哈希校验。不修改任何数据。
    pub async fn verify_credentials_before(
        &self,
        username: &str,
        supplied_secret: &str,
        deadline: Instant,
    ) -> AppResult<Option<SessionRecord>> {
        let outcome = self.verify(username, supplied_secret, deadline).await;

        let label = match &outcome {
            Ok(Some(_)) => "match",
            Ok(None) => "no_match",
            Err(_) => "error",
        };
        metrics::counter!(names::SESSION_VERIFICATIONS, "outcome" => label).increment(1);

        outcome
    }

    async fn verify(
        &self,
        username: &str,
        supplied_secret: &str,
        deadline: Instant,
    ) -> AppResult<Option<SessionRecord>> {
        let username = Username::new(username)?;
        let filter = SessionFilter::by_username(username.clone());

        let record = within(deadline, "session lookup", self.sessions.find_one(&filter))
            .await
            .inspect_err(|e| warn!(username = %username, error = %e, "Failed to look up session"))?;

        let Some(record) = record else {
            within(
                deadline,
                "credential verification",
                self.credentials.verify_against_decoy(supplied_secret),
            )
            .await?;
            debug!(username = %username, "No session for username");
            return Ok(None);
        };

        let matched = within(
            deadline,
            "credential verification",
            self.credentials
                .verify_credential(supplied_secret, &record.credential_hash),
        )
        .await
        .inspect_err(|e| {
            warn!(username = %username, session_id = %record.id, error = %e, "Credential verification failed")
        })?;

        if matched {
            debug!(username = %username, session_id = %record.id, "Session credentials verified");
            Ok(Some(record))
        } else {
            debug!(username = %username, "Session credentials did not match");
            Ok(None)
        }
    }
}

/// 在截止时间内执行一个步骤
async fn within<T>(
    deadline: Instant,
    step: &str,
    fut: impl Future<Output = AppResult<T>>,
) -> AppResult<T> {
    match tokio::time::timeout_at(deadline, fut).await {
        Ok(result) => result,
        Err(_) => Err(AppError::timeout(format!("{} exceeded deadline", step))),
    }
}
