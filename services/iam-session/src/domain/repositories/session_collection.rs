//! 会话集合 trait

use async_trait::async_trait;
use latch_errors::AppResult;

use crate::domain::session::{NewSession, SessionFilter, SessionRecord};

/// 会话持久化协作方
///
/// 实现方必须保证 `insert` 返回后，新记录对随后的 `find_one` / `remove_many` 可见。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionCollection: Send + Sync {
    /// 插入会话并分配 ID
    async fn insert(&self, session: NewSession) -> AppResult<SessionRecord>;

    /// 返回匹配条件的最新签发的会话
    async fn find_one(&self, filter: &SessionFilter) -> AppResult<Option<SessionRecord>>;

    /// 删除所有匹配条件的会话，返回删除数量
    async fn remove_many(&self, filter: &SessionFilter) -> AppResult<u64>;
}
