// Chat message representation.
//
// These are the canonical types the rest of the crate operates on.
// The token estimator walks them, the client serializes them onto the
// wire, and the CLI builds them from user input. The serde shapes
// mirror the OpenAI-compatible chat schema the backend speaks.

use serde::{Deserialize, Serialize};

/// The role of a message participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// Message content: either a plain string or a list of typed parts.
///
/// The backend accepts both shapes. Plain text is the common case;
/// the part list exists for multimodal messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

/// A reference to an image, by URL or data URI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRef {
    pub url: String,
}

/// One part of a multimodal message.
///
/// Part kinds this client does not understand deserialize to `Other`
/// rather than failing the whole message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageRef },
    #[serde(other)]
    Other,
}

/// A single message in the conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: MessageContent,
}

impl ChatMessage {
    /// Create a plain-text message.
    pub fn text(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: MessageContent::Text(content.into()),
        }
    }

    /// Create a multimodal message from typed parts.
    pub fn parts(role: Role, parts: Vec<ContentPart>) -> Self {
        Self {
            role,
            content: MessageContent::Parts(parts),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // ---------------------------------------------------------------
    // 1. Roles serialize to the lowercase wire form
    // ---------------------------------------------------------------

    #[test]
    fn role_serializes_lowercase() {
        assert_eq!(serde_json::to_value(Role::System).unwrap(), json!("system"));
        assert_eq!(serde_json::to_value(Role::User).unwrap(), json!("user"));
        assert_eq!(
            serde_json::to_value(Role::Assistant).unwrap(),
            json!("assistant")
        );
    }

    #[test]
    fn role_deserializes_from_lowercase() {
        let role: Role = serde_json::from_value(json!("assistant")).unwrap();
        assert_eq!(role, Role::Assistant);
    }

    // ---------------------------------------------------------------
    // 2. Content deserializes from both wire shapes
    // ---------------------------------------------------------------

    #[test]
    fn plain_string_content_deserializes_to_text() {
        let msg: ChatMessage =
            serde_json::from_value(json!({"role": "user", "content": "hello"})).unwrap();
        assert_eq!(msg.content, MessageContent::Text("hello".to_string()));
    }

    #[test]
    fn part_list_content_deserializes_to_parts() {
        let msg: ChatMessage = serde_json::from_value(json!({
            "role": "user",
            "content": [
                {"type": "text", "text": "describe this"},
                {"type": "image_url", "image_url": {"url": "data:image/png;base64,AAAA"}}
            ]
        }))
        .unwrap();
        match &msg.content {
            MessageContent::Parts(parts) => {
                assert_eq!(parts.len(), 2);
                assert_eq!(
                    parts[0],
                    ContentPart::Text {
                        text: "describe this".to_string()
                    }
                );
                assert_eq!(
                    parts[1],
                    ContentPart::ImageUrl {
                        image_url: ImageRef {
                            url: "data:image/png;base64,AAAA".to_string()
                        }
                    }
                );
            }
            other => panic!("expected Parts, got {other:?}"),
        }
    }

    #[test]
    fn text_message_serializes_as_plain_string() {
        let msg = ChatMessage::text(Role::User, "hi");
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value, json!({"role": "user", "content": "hi"}));
    }

    // ---------------------------------------------------------------
    // 3. Unknown part kinds degrade to Other instead of failing
    // ---------------------------------------------------------------

    #[test]
    fn unknown_part_kind_deserializes_to_other() {
        let part: ContentPart =
            serde_json::from_value(json!({"type": "input_audio", "input_audio": {"data": "x"}}))
                .unwrap();
        assert_eq!(part, ContentPart::Other);
    }

    #[test]
    fn message_with_unknown_part_still_deserializes() {
        let msg: ChatMessage = serde_json::from_value(json!({
            "role": "user",
            "content": [
                {"type": "text", "text": "listen"},
                {"type": "video_url", "video_url": {"url": "https://example.com/v.mp4"}}
            ]
        }))
        .unwrap();
        match &msg.content {
            MessageContent::Parts(parts) => {
                assert_eq!(parts[1], ContentPart::Other);
            }
            other => panic!("expected Parts, got {other:?}"),
        }
    }

    // ---------------------------------------------------------------
    // 4. Constructors
    // ---------------------------------------------------------------

    #[test]
    fn text_constructor_sets_role_and_content() {
        let msg = ChatMessage::text(Role::System, "You are helpful.");
        assert_eq!(msg.role, Role::System);
        assert_eq!(
            msg.content,
            MessageContent::Text("You are helpful.".to_string())
        );
    }

    #[test]
    fn parts_constructor_preserves_order() {
        let msg = ChatMessage::parts(
            Role::User,
            vec![
                ContentPart::Text {
                    text: "first".to_string(),
                },
                ContentPart::Text {
                    text: "second".to_string(),
                },
            ],
        );
        match &msg.content {
            MessageContent::Parts(parts) => {
                assert_eq!(
                    parts[0],
                    ContentPart::Text {
                        text: "first".to_string()
                    }
                );
                assert_eq!(
                    parts[1],
                    ContentPart::Text {
                        text: "second".to_string()
                    }
                );
            }
            other => panic!("expected Parts, got {other:?}"),
        }
    }

    #[test]
    fn message_with_empty_content() {
        let msg = ChatMessage::text(Role::User, "");
        assert_eq!(msg.content, MessageContent::Text(String::new()));
    }
}
