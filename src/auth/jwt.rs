//! JWT Token 校验
//!
//! 外部认证服务使用共享密钥（HS256）签发 Token，`sub` 即用户身份

use anyhow::{Result, anyhow};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};

use super::Identity;

/// JWT Claims 结构
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// 用户 ID
    pub sub: String,
    /// 过期时间 (Unix timestamp)
    pub exp: usize,
    /// 签发时间 (Unix timestamp)
    #[serde(default)]
    pub iat: usize,
}

/// Token 校验器
#[derive(Clone)]
pub struct TokenVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // 受众由认证服务决定，这里不做限制
        validation.validate_aud = false;
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    /// 验证 Token 并返回身份
    ///
    /// # Returns
    /// * `Ok(Identity)` - 签名有效、未过期且 `sub` 非空
    /// * `Err(_)` - 验证失败（过期、签名错误等）
    pub fn verify(&self, token: &str) -> Result<Identity> {
        let token_data = decode::<Claims>(token, &self.key, &self.validation)
            .map_err(|e| anyhow!("Invalid token: {}", e))?;

        Identity::new(token_data.claims.sub).ok_or_else(|| anyhow!("Token 中缺少用户 ID"))
    }
}

/// 签发 Token（测试中模拟外部认证服务）
#[cfg(test)]
pub fn issue_token(secret: &str, sub: &str, ttl_secs: i64) -> String {
    use jsonwebtoken::{EncodingKey, Header, encode};

    let now = chrono::Utc::now().timestamp();
    let claims = Claims {
        sub: sub.to_string(),
        iat: now as usize,
        exp: (now + ttl_secs).max(0) as usize,
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .unwrap()
}
