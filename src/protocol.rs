use crate::options::GenerationOptions;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

/// Body of `POST /chat`. Generation options sit at the top level of the
/// document next to `model` and `messages`.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(flatten)]
    pub options: GenerationOptions,
}

/// One record of a chat response: the whole document when streaming is off,
/// one line of the NDJSON body when it is on.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ChatChunk {
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub message: Option<ChunkMessage>,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub done_reason: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(flatten)]
    pub usage: Usage,
}

impl ChatChunk {
    /// Text carried by this record, if any.
    pub fn content(&self) -> Option<&str> {
        self.message.as_ref().map(|message| message.content.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChunkMessage {
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Usage {
    pub total_duration: Option<u64>,
    pub load_duration: Option<u64>,
    pub prompt_eval_count: Option<u64>,
    pub prompt_eval_duration: Option<u64>,
    pub eval_count: Option<u64>,
    pub eval_duration: Option<u64>,
}

/// Body of `GET /tags`.
#[derive(Debug, Clone, Deserialize)]
pub struct TagsResponse {
    #[serde(default)]
    pub models: Vec<ModelInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub modified_at: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn chat_request_flattens_options_and_skips_missing_system() {
        let request = ChatRequest {
            model: "gemma3:4b".to_string(),
            messages: vec![Message::user("Hello")],
            stream: true,
            system: None,
            options: GenerationOptions::new().temperature(0.2),
        };

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            json!({
                "model": "gemma3:4b",
                "messages": [{"role": "user", "content": "Hello"}],
                "stream": true,
                "temperature": 0.2
            })
        );
    }

    #[test]
    fn chat_request_includes_system_prompt_when_set() {
        let request = ChatRequest {
            model: "gemma3:1b".to_string(),
            messages: vec![Message::user("fix this")],
            stream: false,
            system: Some("You are a grammar bot".to_string()),
            options: GenerationOptions::new(),
        };

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["system"], json!("You are a grammar bot"));
        assert_eq!(value["stream"], json!(false));
    }

    #[test]
    fn system_message_serializes_with_system_role() {
        assert_eq!(
            serde_json::to_value(Message::system("be terse")).unwrap(),
            json!({"role": "system", "content": "be terse"})
        );
    }

    #[test]
    fn final_chunk_carries_usage() {
        let chunk: ChatChunk = serde_json::from_value(json!({
            "model": "gemma3:4b",
            "created_at": "2025-03-20T10:00:00Z",
            "message": {"role": "assistant", "content": ""},
            "done": true,
            "done_reason": "stop",
            "total_duration": 5_000_000u64,
            "eval_count": 12
        }))
        .unwrap();

        assert!(chunk.done);
        assert_eq!(chunk.content(), Some(""));
        assert_eq!(chunk.done_reason.as_deref(), Some("stop"));
        assert_eq!(chunk.usage.total_duration, Some(5_000_000));
        assert_eq!(chunk.usage.eval_count, Some(12));
        assert_eq!(chunk.usage.load_duration, None);
    }

    #[test]
    fn chunk_without_message_has_no_content() {
        let chunk: ChatChunk = serde_json::from_str(r#"{"model":"m","done":true}"#).unwrap();
        assert_eq!(chunk.content(), None);
    }

    #[test]
    fn tags_response_tolerates_extra_fields() {
        let tags: TagsResponse = serde_json::from_value(json!({
            "models": [
                {"name": "gemma3:4b", "size": 3338801804u64, "digest": "abc", "details": {}},
                {"name": "llama3.2:latest"}
            ]
        }))
        .unwrap();

        let names: Vec<&str> = tags.models.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["gemma3:4b", "llama3.2:latest"]);
        assert_eq!(tags.models[0].size, Some(3338801804));
    }
}
