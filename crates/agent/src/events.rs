use serde_json::Value;

/// One typed item from an agent's output stream. Every variant keeps the raw
/// JSON it was decoded from so it can be archived verbatim.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Assistant text, or a plain non-JSON output line.
    Text { text: String, raw: Value },
    ToolUse { name: String, raw: Value },
    ToolResult { raw: Value },
    /// Final result reported by the agent.
    Result {
        text: String,
        is_error: bool,
        raw: Value,
    },
    Other { kind: String, raw: Value },
}

impl StreamEvent {
    pub fn kind(&self) -> &str {
        match self {
            Self::Text { .. } => "text",
            Self::ToolUse { .. } => "tool_use",
            Self::ToolResult { .. } => "tool_result",
            Self::Result { .. } => "result",
            Self::Other { kind, .. } => kind,
        }
    }

    /// Text-bearing content, if any.
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Text { text, .. } | Self::Result { text, .. } => Some(text),
            _ => None,
        }
    }

    pub fn raw(&self) -> &Value {
        match self {
            Self::Text { raw, .. }
            | Self::ToolUse { raw, .. }
            | Self::ToolResult { raw }
            | Self::Result { raw, .. }
            | Self::Other { raw, .. } => raw,
        }
    }

    pub fn text_line(text: impl Into<String>) -> Self {
        let text = text.into();
        Self::Text {
            raw: Value::String(text.clone()),
            text,
        }
    }

    /// Decode one stdout line of a `stream-json` agent. Assistant and user
    /// messages fan out into one event per content block; anything that is
    /// not JSON becomes plain text.
    pub fn parse_line(line: &str) -> Vec<StreamEvent> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Vec::new();
        }

        let value: Value = match serde_json::from_str(trimmed) {
            Ok(v @ Value::Object(_)) => v,
            _ => return vec![Self::text_line(line)],
        };

        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();

        match kind.as_str() {
            "assistant" | "user" => {
                let blocks = value
                    .pointer("/message/content")
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default();
                if blocks.is_empty() {
                    return vec![Self::Other { kind, raw: value }];
                }
                blocks.into_iter().map(Self::from_block).collect()
            }
            "result" => vec![Self::Result {
                text: value
                    .get("result")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                is_error: value
                    .get("is_error")
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
                raw: value,
            }],
            "text" => match value.get("text").and_then(Value::as_str) {
                Some(text) => vec![Self::Text {
                    text: text.to_string(),
                    raw: value,
                }],
                None => vec![Self::Other { kind, raw: value }],
            },
            _ => vec![Self::Other { kind, raw: value }],
        }
    }

    fn from_block(block: Value) -> StreamEvent {
        match block.get("type").and_then(Value::as_str) {
            Some("text") => Self::Text {
                text: block
                    .get("text")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                raw: block,
            },
            Some("tool_use") => Self::ToolUse {
                name: block
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown")
                    .to_string(),
                raw: block,
            },
            Some("tool_result") => Self::ToolResult { raw: block },
            other => Self::Other {
                kind: other.unwrap_or("unknown").to_string(),
                raw: block,
            },
        }
    }
}
