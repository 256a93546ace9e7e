//! LLM 输出解析
//!
//! 从回复文本中提取 JSON 块（```json 围栏或首尾括号切片），供计划生成、
//! 影响分析、hand-off 判定与工具调用解析共用。解析失败不视为致命：
//! 调用方各自决定回退行为。

use serde::Deserialize;

use crate::llm::ToolInvocation;

/// 提取文本中的 JSON 片段：优先 ```json 围栏，其次第一个 { 或 [ 到配对末尾
pub fn extract_json(text: &str) -> Option<&str> {
    let trimmed = text.trim();

    if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        let inner = rest
            .find("```")
            .map(|end| rest[..end].trim())
            .unwrap_or_else(|| rest.trim());
        if !inner.is_empty() {
            return Some(inner);
        }
    }

    let obj = trimmed.find('{').and_then(|s| {
        trimmed.rfind('}').filter(|&e| e > s).map(|e| (s, e))
    });
    let arr = trimmed.find('[').and_then(|s| {
        trimmed.rfind(']').filter(|&e| e > s).map(|e| (s, e))
    });

    // 两者都有时取更早开始的那个（外层结构）
    let slice = match (obj, arr) {
        (Some((os, oe)), Some((as_, ae))) => {
            if as_ < os {
                (as_, ae)
            } else {
                (os, oe)
            }
        }
        (Some(span), None) => span,
        (None, Some(span)) => span,
        (None, None) => return None,
    };
    Some(&trimmed[slice.0..=slice.1])
}

/// LLM 回复中的工具调用请求（简化 JSON：{"tool": "echo", "args": {...}}）
#[derive(Debug, Deserialize)]
struct ToolRequest {
    tool: String,
    #[serde(default)]
    args: serde_json::Value,
}

/// 从回复内容解析工具调用；无有效 JSON 或 tool 为空则为普通文本回复
pub fn parse_tool_request(content: &str) -> Option<ToolInvocation> {
    let json_str = extract_json(content)?;
    let parsed: ToolRequest = serde_json::from_str(json_str).ok()?;
    if parsed.tool.is_empty() {
        return None;
    }
    Some(ToolInvocation::new(parsed.tool, parsed.args))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_fenced_json() {
        let text = "Here is the plan:\n```json\n{\"a\": 1}\n```\nDone.";
        assert_eq!(extract_json(text), Some("{\"a\": 1}"));
    }

    #[test]
    fn test_extract_bare_object() {
        let text = "prefix {\"tool\": \"echo\"} suffix";
        assert_eq!(extract_json(text), Some("{\"tool\": \"echo\"}"));
    }

    #[test]
    fn test_extract_array_before_object() {
        let text = "[{\"id\": \"t1\"}]";
        assert_eq!(extract_json(text), Some("[{\"id\": \"t1\"}]"));
    }

    #[test]
    fn test_no_json() {
        assert!(extract_json("plain answer").is_none());
    }

    #[test]
    fn test_parse_tool_request() {
        let call = parse_tool_request("```json\n{\"tool\": \"echo\", \"args\": {\"text\": \"hi\"}}\n```").unwrap();
        assert_eq!(call.tool, "echo");
        assert_eq!(call.args["text"], "hi");
    }

    #[test]
    fn test_empty_tool_is_plain_reply() {
        assert!(parse_tool_request("{\"tool\": \"\", \"args\": {}}").is_none());
        assert!(parse_tool_request("just words").is_none());
    }
}
