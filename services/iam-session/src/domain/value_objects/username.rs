//! Username 值对象

use latch_errors::AppError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 会话所属的用户名，构造时保证非空
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Username(String);

impl Username {
    pub fn new(username: impl Into<String>) -> Result<Self, UsernameError> {
        let username = username.into();

        if username.is_empty() {
            return Err(UsernameError::Empty);
        }

        Ok(Self(username))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Username {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for Username {
    type Error = UsernameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Username> for String {
    fn from(username: Username) -> Self {
        username.0
    }
}

/// Username 错误
#[derive(Debug, thiserror::Error)]
pub enum UsernameError {
    #[error("Username must not be empty")]
    Empty,
}

impl From<UsernameError> for AppError {
    fn from(err: UsernameError) -> Self {
        AppError::invalid_input(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_username() {
        let username = Username::new("alice").unwrap();
        assert_eq!(username.as_str(), "alice");
        assert_eq!(format!("{}", username), "alice");
    }

    #[test]
    fn test_empty_username_rejected() {
        assert!(matches!(Username::new(""), Err(UsernameError::Empty)));
    }

    #[test]
    fn test_empty_username_maps_to_invalid_input() {
        let err: AppError = Username::new("").unwrap_err().into();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }

    #[test]
    fn test_deserialize_enforces_non_empty() {
        assert_eq!(from_value("bob").unwrap().as_str(), "bob");
        assert!(from_value("").is_err());
    }

    fn from_value(raw: &str) -> Result<Username, serde::de::value::Error> {
        use serde::de::IntoDeserializer;
        Username::deserialize(raw.to_string().into_deserializer())
    }
}
