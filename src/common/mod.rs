//! 公共工具模块

pub mod auth;

use sha2::{Digest, Sha256};

/// 安全地截断 UTF-8 字符串，确保不会在多字节字符中间截断
///
/// 返回不超过 `max_bytes` 字节的最长有效 UTF-8 子串
pub fn truncate_str_safe(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }

    // 从 max_bytes 位置向前查找有效的字符边界
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }

    &s[..end]
}

/// 安全地截断字符串并添加省略号后缀
pub fn truncate_with_ellipsis(s: &str, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        return s.to_string();
    }

    // 为省略号预留空间
    let truncate_at = if max_bytes > 3 { max_bytes - 3 } else { max_bytes };
    let truncated = truncate_str_safe(s, truncate_at);
    format!("{}...", truncated)
}

/// 文本的 SHA-256 指纹（前 16 位十六进制），用于日志中代替原文
pub fn fingerprint(s: &str) -> String {
    let digest = Sha256::digest(s.as_bytes());
    let mut hex = hex::encode(digest);
    hex.truncate(16);
    hex
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_keeps_char_boundary() {
        let s = "优化提示词";
        // 每个汉字 3 字节，4 字节处不是边界
        assert_eq!(truncate_str_safe(s, 4), "优");
        assert_eq!(truncate_str_safe(s, 100), s);
    }

    #[test]
    fn test_truncate_with_ellipsis() {
        assert_eq!(truncate_with_ellipsis("hello world", 8), "hello...");
        assert_eq!(truncate_with_ellipsis("short", 8), "short");
    }

    #[test]
    fn test_fingerprint_is_stable() {
        let a = fingerprint("same prompt");
        assert_eq!(a, fingerprint("same prompt"));
        assert_ne!(a, fingerprint("other prompt"));
        assert_eq!(a.len(), 16);
    }
}
