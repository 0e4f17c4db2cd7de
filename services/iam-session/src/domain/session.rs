//! 会话记录

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::value_objects::Username;

/// 会话 ID，由持久化层在插入时分配
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 待插入的会话（尚未分配 ID）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSession {
    pub username: Username,
    pub credential_hash: String,
    pub issued_at: DateTime<Utc>,
}

impl NewSession {
    pub fn new(username: Username, credential_hash: String, issued_at: DateTime<Utc>) -> Self {
        Self {
            username,
            credential_hash,
            issued_at,
        }
    }

    /// 由持久化层分配 ID 后得到完整记录
    pub fn into_record(self, id: SessionId) -> SessionRecord {
        SessionRecord {
            id,
            username: self.username,
            credential_hash: self.credential_hash,
            issued_at: self.issued_at,
        }
    }
}

/// 已持久化的会话记录
///
/// 只保存密钥的哈希，明文密钥从不落盘。记录创建后不再修改，
/// 轮换通过插入新记录并删除旧记录完成。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: SessionId,
    pub username: Username,
    pub credential_hash: String,
    pub issued_at: DateTime<Utc>,
}

/// 会话查询条件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionFilter {
    pub username: Username,
    /// 排除哈希等于该值的记录
    pub exclude_credential_hash: Option<String>,
}

impl SessionFilter {
    pub fn by_username(username: Username) -> Self {
        Self {
            username,
            exclude_credential_hash: None,
        }
    }

    pub fn excluding_credential_hash(mut self, credential_hash: impl Into<String>) -> Self {
        self.exclude_credential_hash = Some(credential_hash.into());
        self
    }

    pub fn matches(&self, record: &SessionRecord) -> bool {
        record.username == self.username
            && self
                .exclude_credential_hash
                .as_deref()
                .is_none_or(|excluded| record.credential_hash != excluded)
    }
}
