//! 截止时间与并发相关的会话测试

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use iam_session::infrastructure::persistence::InMemorySessionCollection;
use iam_session::{
    Argon2CredentialFactory, CleanupOutcome, CredentialFactory, GeneratedCredential, NewSession,
    SessionCollection, SessionFilter, SessionRecord, SessionStore,
};
use latch_config::HashingConfig;
use latch_errors::{AppError, AppResult};
use tokio::time::Instant;

fn fast_factory() -> Arc<Argon2CredentialFactory> {
    let hashing = HashingConfig {
        memory_kib: 8,
        iterations: 1,
        parallelism: 1,
    };
    Arc::new(Argon2CredentialFactory::new(&hashing, 32).unwrap())
}

/// 写入成功后才卡住的集合，模拟 "已落库但调用方超时" 的情况
struct StallAfterInsert {
    inner: Arc<InMemorySessionCollection>,
    stalls_remaining: AtomicU32,
    stall: Duration,
}

impl StallAfterInsert {
    fn new(inner: Arc<InMemorySessionCollection>, stalls: u32) -> Self {
        Self {
            inner,
            stalls_remaining: AtomicU32::new(stalls),
            stall: Duration::from_secs(5),
        }
    }
}

#[async_trait]
impl SessionCollection for StallAfterInsert {
    async fn insert(&self, session: NewSession) -> AppResult<SessionRecord> {
        let record = self.inner.insert(session).await?;
        let stalled = self
            .stalls_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if stalled {
            tokio::time::sleep(self.stall).await;
        }
        Ok(record)
    }

    async fn find_one(&self, filter: &SessionFilter) -> AppResult<Option<SessionRecord>> {
        self.inner.find_one(filter).await
    }

    async fn remove_many(&self, filter: &SessionFilter) -> AppResult<u64> {
        self.inner.remove_many(filter).await
    }
}

/// 查询永远卡住的集合
struct StallingLookup {
    inner: InMemorySessionCollection,
}

#[async_trait]
impl SessionCollection for StallingLookup {
    async fn insert(&self, session: NewSession) -> AppResult<SessionRecord> {
        self.inner.insert(session).await
    }

    async fn find_one(&self, _filter: &SessionFilter) -> AppResult<Option<SessionRecord>> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(None)
    }

    async fn remove_many(&self, filter: &SessionFilter) -> AppResult<u64> {
        self.inner.remove_many(filter).await
    }
}

/// 删除永远卡住的集合
struct StallingRemove {
    inner: Arc<InMemorySessionCollection>,
}

#[async_trait]
impl SessionCollection for StallingRemove {
    async fn insert(&self, session: NewSession) -> AppResult<SessionRecord> {
        self.inner.insert(session).await
    }

    async fn find_one(&self, filter: &SessionFilter) -> AppResult<Option<SessionRecord>> {
        self.inner.find_one(filter).await
    }

    async fn remove_many(&self, _filter: &SessionFilter) -> AppResult<u64> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(0)
    }
}

/// 校验前先等待的工厂，生成凭证不受影响
struct SlowVerifyFactory {
    inner: Arc<Argon2CredentialFactory>,
    delay: Duration,
}

#[async_trait]
impl CredentialFactory for SlowVerifyFactory {
    async fn generate_credential(&self) -> AppResult<GeneratedCredential> {
        self.inner.generate_credential().await
    }

    async fn verify_credential(&self, secret: &str, credential_hash: &str) -> AppResult<bool> {
        tokio::time::sleep(self.delay).await;
        self.inner.verify_credential(secret, credential_hash).await
    }

    async fn verify_against_decoy(&self, secret: &str) -> AppResult<()> {
        tokio::time::sleep(self.delay).await;
        self.inner.verify_against_decoy(secret).await
    }
}

/// 生成凭证前先等待的工厂
struct SlowFactory {
    inner: Arc<Argon2CredentialFactory>,
    delay: Duration,
}

#[async_trait]
impl CredentialFactory for SlowFactory {
    async fn generate_credential(&self) -> AppResult<GeneratedCredential> {
        tokio::time::sleep(self.delay).await;
        self.inner.generate_credential().await
    }

    async fn verify_credential(&self, secret: &str, credential_hash: &str) -> AppResult<bool> {
        self.inner.verify_credential(secret, credential_hash).await
    }

    async fn verify_against_decoy(&self, secret: &str) -> AppResult<()> {
        self.inner.verify_against_decoy(secret).await
    }
}

#[tokio::test]
async fn test_insert_timeout_then_retry_leaves_single_session() {
    let inner = Arc::new(InMemorySessionCollection::new());
    let collection = Arc::new(StallAfterInsert::new(inner.clone(), 1));
    let store = SessionStore::new(collection, fast_factory());

    let deadline = Instant::now() + Duration::from_millis(300);
    let result = store.create_before("alice", deadline).await;
    assert!(matches!(result, Err(AppError::Timeout(_))));

    // 超时的插入已经落库，按用户名仍可发现
    assert_eq!(inner.records_for("alice").await.len(), 1);

    let retried = store.create("alice").await.unwrap();
    let remaining = inner.records_for("alice").await;
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, retried.id);
    assert!(
        store
            .verify_credentials("alice", retried.expose_secret())
            .await
            .unwrap()
            .is_some()
    );
}

#[tokio::test]
async fn test_slow_credential_generation_times_out_without_writing() {
    let collection = Arc::new(InMemorySessionCollection::new());
    let factory = Arc::new(SlowFactory {
        inner: fast_factory(),
        delay: Duration::from_secs(5),
    });
    let store = SessionStore::new(collection.clone(), factory)
        .with_operation_timeout(Duration::from_millis(100));

    let result = store.create("alice").await;
    assert!(matches!(result, Err(AppError::Timeout(_))));
    assert!(collection.is_empty().await);
}

#[tokio::test]
async fn test_slow_lookup_times_out() {
    let collection = Arc::new(StallingLookup {
        inner: InMemorySessionCollection::new(),
    });
    let store = SessionStore::new(collection, fast_factory());

    let deadline = Instant::now() + Duration::from_millis(100);
    let result = store
        .verify_credentials_before("alice", "secret", deadline)
        .await;
    assert!(matches!(result, Err(AppError::Timeout(_))));
}

#[tokio::test]
async fn test_cleanup_timeout_keeps_new_session_valid() {
    let metrics = latch_telemetry::init_metrics().unwrap();

    let inner = Arc::new(InMemorySessionCollection::new());
    let collection = Arc::new(StallingRemove {
        inner: inner.clone(),
    });
    let store = SessionStore::new(collection, fast_factory())
        .with_operation_timeout(Duration::from_millis(300));

    let issued = store.create("alice").await.unwrap();

    assert!(matches!(
        issued.cleanup,
        CleanupOutcome::Failed(AppError::Timeout(_))
    ));
    assert_eq!(inner.records_for("alice").await.len(), 1);
    assert!(
        store
            .verify_credentials("alice", issued.expose_secret())
            .await
            .unwrap()
            .is_some()
    );
    assert!(
        metrics
            .render()
            .contains("session_cleanup_failures_total 1")
    );
}

#[tokio::test]
async fn test_slow_verification_of_stored_hash_times_out() {
    let collection = Arc::new(InMemorySessionCollection::new());
    let issuer = SessionStore::new(collection.clone(), fast_factory());
    let issued = issuer.create("alice").await.unwrap();

    let factory = Arc::new(SlowVerifyFactory {
        inner: fast_factory(),
        delay: Duration::from_secs(5),
    });
    let store = SessionStore::new(collection, factory);

    let deadline = Instant::now() + Duration::from_millis(100);
    let result = store
        .verify_credentials_before("alice", issued.expose_secret(), deadline)
        .await;
    assert!(matches!(result, Err(AppError::Timeout(_))));
}

#[tokio::test]
async fn test_slow_decoy_verification_times_out() {
    let factory = Arc::new(SlowVerifyFactory {
        inner: fast_factory(),
        delay: Duration::from_secs(5),
    });
    let store = SessionStore::new(Arc::new(InMemorySessionCollection::new()), factory)
        .with_operation_timeout(Duration::from_millis(100));

    let result = store.verify_credentials("ghost", "anything").await;
    assert!(matches!(result, Err(AppError::Timeout(_))));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_creates_leave_at_most_one_session() {
    let collection = Arc::new(InMemorySessionCollection::new());
    let store = Arc::new(SessionStore::new(collection.clone(), fast_factory()));

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let store = store.clone();
            tokio::spawn(async move { store.create("alice").await })
        })
        .collect();

    let mut issued = Vec::new();
    for result in futures::future::join_all(tasks).await {
        issued.push(result.unwrap().unwrap());
    }

    let remaining = collection.records_for("alice").await;
    assert!(remaining.len() <= 1);

    let mut verified = 0;
    for session in &issued {
        if store
            .verify_credentials("alice", session.expose_secret())
            .await
            .unwrap()
            .is_some()
        {
            verified += 1;
        }
    }
    assert_eq!(verified, remaining.len());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_creates_for_different_users_are_independent() {
    let collection = Arc::new(InMemorySessionCollection::new());
    let store = Arc::new(SessionStore::new(collection.clone(), fast_factory()));

    let users = ["alice", "bob", "carol", "dave"];
    let tasks: Vec<_> = users
        .iter()
        .map(|user| {
            let store = store.clone();
            let user = user.to_string();
            tokio::spawn(async move { store.create(&user).await })
        })
        .collect();

    let issued: Vec<_> = futures::future::join_all(tasks)
        .await
        .into_iter()
        .map(|r| r.unwrap().unwrap())
        .collect();

    for session in &issued {
        assert_eq!(collection.records_for(session.username.as_str()).await.len(), 1);
        assert!(
            store
                .verify_credentials(session.username.as_str(), session.expose_secret())
                .await
                .unwrap()
                .is_some()
        );
    }
}
