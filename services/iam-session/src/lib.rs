//! iam-session - 会话凭证子系统
//!
//! 为用户名签发不透明的会话密钥，校验后续请求携带的密钥，
//! 并保证每个用户最多只有一个有效会话。

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::{CleanupOutcome, IssuedSession, SessionStore};
pub use domain::repositories::SessionCollection;
pub use domain::services::{Argon2CredentialFactory, CredentialFactory, GeneratedCredential};
pub use domain::session::{NewSession, SessionFilter, SessionId, SessionRecord};
pub use domain::value_objects::Username;
