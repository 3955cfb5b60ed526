use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// 上游 API Key 环境变量（优先于配置文件）
pub const ENV_UPSTREAM_API_KEY: &str = "OPTIMIZER_UPSTREAM_API_KEY";

/// JWT 密钥环境变量（优先于配置文件）
pub const ENV_JWT_SECRET: &str = "OPTIMIZER_JWT_SECRET";

/// 提示词优化服务配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// SQLite 数据库路径
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// 提示词最大长度（按字符计）
    #[serde(default = "default_prompt_max_length")]
    pub prompt_max_length: usize,

    /// 同一用户两次提交之间的冷却时间（秒），0 表示不限流
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,

    /// 每个用户保留的最大记录数
    #[serde(default = "default_retention_cap")]
    pub retention_cap: usize,

    /// 后台保留策略清理间隔（秒）
    #[serde(default = "default_retention_sweep_secs")]
    pub retention_sweep_secs: u64,

    /// 单次上游调用超时（秒）
    #[serde(default = "default_upstream_timeout_secs")]
    pub upstream_timeout_secs: u64,

    /// 上游调用最大尝试次数（含首次）
    #[serde(default = "default_upstream_max_attempts")]
    pub upstream_max_attempts: u32,

    #[serde(default = "default_upstream_base_url")]
    pub upstream_base_url: String,

    #[serde(default = "default_upstream_model")]
    pub upstream_model: String,

    #[serde(default = "default_upstream_max_tokens")]
    pub upstream_max_tokens: u32,

    /// 上游 API 密钥（可被环境变量覆盖）
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upstream_api_key: Option<String>,

    /// 校验登录 Token 的 HS256 密钥（由外部认证服务签发）
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jwt_secret: Option<String>,

    /// HTTP 代理地址（可选）
    /// 支持格式: http://host:port, https://host:port, socks5://host:port
    #[serde(default)]
    pub proxy_url: Option<String>,

    /// 配置文件路径（运行时元数据，不写入 JSON）
    #[serde(skip)]
    config_path: Option<PathBuf>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_db_path() -> String {
    "optimizer.db".to_string()
}

fn default_prompt_max_length() -> usize {
    2000
}

fn default_cooldown_secs() -> u64 {
    30
}

fn default_retention_cap() -> usize {
    50
}

fn default_retention_sweep_secs() -> u64 {
    300
}

fn default_upstream_timeout_secs() -> u64 {
    15
}

fn default_upstream_max_attempts() -> u32 {
    3
}

fn default_upstream_base_url() -> String {
    "https://api.anthropic.com".to_string()
}

fn default_upstream_model() -> String {
    "claude-sonnet-4-5".to_string()
}

fn default_upstream_max_tokens() -> u32 {
    2048
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            db_path: default_db_path(),
            prompt_max_length: default_prompt_max_length(),
            cooldown_secs: default_cooldown_secs(),
            retention_cap: default_retention_cap(),
            retention_sweep_secs: default_retention_sweep_secs(),
            upstream_timeout_secs: default_upstream_timeout_secs(),
            upstream_max_attempts: default_upstream_max_attempts(),
            upstream_base_url: default_upstream_base_url(),
            upstream_model: default_upstream_model(),
            upstream_max_tokens: default_upstream_max_tokens(),
            upstream_api_key: None,
            jwt_secret: None,
            proxy_url: None,
            config_path: None,
        }
    }
}

impl Config {
    /// 获取默认配置文件路径
    pub fn default_config_path() -> &'static str {
        "config.json"
    }

    /// 从文件加载配置
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            // 配置文件不存在，返回默认配置
            let mut config = Self::default();
            config.config_path = Some(path.to_path_buf());
            return Ok(config);
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("读取配置文件失败: {}", path.display()))?;
        let mut config: Config = serde_json::from_str(&content)
            .with_context(|| format!("解析配置文件失败: {}", path.display()))?;
        config.config_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// 用环境变量覆盖敏感配置
    pub fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var(ENV_UPSTREAM_API_KEY) {
            if !key.trim().is_empty() {
                self.upstream_api_key = Some(key);
            }
        }
        if let Ok(secret) = std::env::var(ENV_JWT_SECRET) {
            if !secret.trim().is_empty() {
                self.jwt_secret = Some(secret);
            }
        }
    }

    /// 校验配置取值
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.prompt_max_length == 0 {
            anyhow::bail!("promptMaxLength 必须大于 0");
        }
        if self.retention_cap == 0 {
            anyhow::bail!("retentionCap 必须大于 0");
        }
        if self.upstream_timeout_secs == 0 {
            anyhow::bail!("upstreamTimeoutSecs 必须大于 0");
        }
        if self.upstream_max_attempts == 0 {
            anyhow::bail!("upstreamMaxAttempts 必须大于 0");
        }
        if self.retention_sweep_secs == 0 {
            anyhow::bail!("retentionSweepSecs 必须大于 0");
        }
        Ok(())
    }

    /// 获取配置文件路径（如果有）
    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout_secs)
    }

    pub fn retention_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.retention_sweep_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.prompt_max_length, 2000);
        assert_eq!(config.cooldown(), Duration::from_secs(30));
        assert_eq!(config.retention_cap, 50);
        assert_eq!(config.upstream_timeout(), Duration::from_secs(15));
        assert_eq!(config.upstream_max_attempts, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_falls_back_to_defaults() {
        let json = r#"{ "port": 9000, "cooldownSecs": 10, "jwtSecret": "s" }"#;
        let config: Config = serde_json::from_str(json).unwrap();

        assert_eq!(config.port, 9000);
        assert_eq!(config.cooldown_secs, 10);
        assert_eq!(config.jwt_secret.as_deref(), Some("s"));
        assert_eq!(config.retention_cap, 50);
        assert_eq!(config.host, "127.0.0.1");
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let config = Config::load("/nonexistent/dir/config.json").unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(
            config.config_path(),
            Some(Path::new("/nonexistent/dir/config.json"))
        );
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let mut config = Config::default();
        config.retention_cap = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.upstream_max_attempts = 0;
        assert!(config.validate().is_err());

        // 冷却时间为 0 是合法的
        let mut config = Config::default();
        config.cooldown_secs = 0;
        assert!(config.validate().is_ok());
    }
}
