//! 调用方身份
//!
//! 登录流程由外部认证服务负责，这里只校验其签发的 Bearer Token。

pub mod jwt;

use std::fmt;

pub use jwt::TokenVerifier;

/// 已认证的用户身份（外部签发，不可变）
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity(String);

impl Identity {
    /// 空白身份视为无效
    pub fn new(id: impl Into<String>) -> Option<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            None
        } else {
            Some(Self(id))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
