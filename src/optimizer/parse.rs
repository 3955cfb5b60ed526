//! 上游回复解析
//!
//! 模型偶尔会在 JSON 外面包一层 markdown 代码块或加一句说明，
//! 这里取最外层的 `{...}` 再按结构反序列化。

use crate::store::OptimizationResult;

/// 回复解析失败原因
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("回复中没有 JSON 对象")]
    NoJsonObject,
    #[error("回复结构不符: {0}")]
    Shape(String),
    #[error("字段 {0} 为空")]
    EmptyField(&'static str),
}

/// 截取文本中最外层的 JSON 对象
fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (start < end).then(|| &text[start..=end])
}

/// 将上游文本回复解析为结构化结果
pub fn parse_optimization(text: &str) -> Result<OptimizationResult, ParseError> {
    let json = extract_json_object(text).ok_or(ParseError::NoJsonObject)?;
    let result: OptimizationResult =
        serde_json::from_str(json).map_err(|e| ParseError::Shape(e.to_string()))?;
    check_fields(&result)?;
    Ok(result)
}

fn check_fields(result: &OptimizationResult) -> Result<(), ParseError> {
    let blank = |s: &str| s.trim().is_empty();

    if blank(&result.purpose) {
        return Err(ParseError::EmptyField("purpose"));
    }
    if blank(&result.structure.system) {
        return Err(ParseError::EmptyField("structure.system"));
    }
    if blank(&result.structure.user) {
        return Err(ParseError::EmptyField("structure.user"));
    }
    if blank(&result.structure.format) {
        return Err(ParseError::EmptyField("structure.format"));
    }
    for improvement in &result.improvements {
        if blank(&improvement.title) {
            return Err(ParseError::EmptyField("improvements.title"));
        }
        if blank(&improvement.content) {
            return Err(ParseError::EmptyField("improvements.content"));
        }
        if blank(&improvement.category) {
            return Err(ParseError::EmptyField("improvements.category"));
        }
    }
    Ok(())
}
