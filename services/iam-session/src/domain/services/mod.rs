mod credential_factory;

pub use credential_factory::*;
