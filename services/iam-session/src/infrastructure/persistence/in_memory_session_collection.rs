//! 进程内会话集合
//!
//! 用于测试与单节点部署。锁只在单次集合操作期间持有。

use async_trait::async_trait;
use latch_errors::AppResult;
use tokio::sync::RwLock;

use crate::domain::repositories::SessionCollection;
use crate::domain::session::{NewSession, SessionFilter, SessionId, SessionRecord};

#[derive(Debug, Default)]
pub struct InMemorySessionCollection {
    records: RwLock<Vec<SessionRecord>>,
}

impl InMemorySessionCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// 某用户名下的全部记录（按插入顺序）
    pub async fn records_for(&self, username: &str) -> Vec<SessionRecord> {
        self.records
            .read()
            .await
            .iter()
            .filter(|r| r.username.as_str() == username)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl SessionCollection for InMemorySessionCollection {
    async fn insert(&self, session: NewSession) -> AppResult<SessionRecord> {
        let record = session.into_record(SessionId::new());
        self.records.write().await.push(record.clone());
        Ok(record)
    }

    async fn find_one(&self, filter: &SessionFilter) -> AppResult<Option<SessionRecord>> {
        // max_by_key 在并列时返回最后一个，即最后插入的记录
        Ok(self
            .records
            .read()
            .await
            .iter()
            .filter(|r| filter.matches(r))
            .max_by_key(|r| r.issued_at)
            .cloned())
    }

    async fn remove_many(&self, filter: &SessionFilter) -> AppResult<u64> {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|r| !filter.matches(r));
        Ok((before - records.len()) as u64)
    }
}
