//! latch-common - 通用工具库

pub mod clock;
pub mod retry;

pub use clock::*;
pub use retry::*;
