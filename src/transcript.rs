use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A message in the conversation history sent to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

/// Append-only conversation log owned by one session.
///
/// There is no way to edit or drop an entry once pushed; callers only ever
/// read the slice back or append to the end.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Transcript {
    messages: Vec<ChatMessage>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, role: Role, content: impl Into<String>) {
        self.messages.push(ChatMessage {
            role,
            content: content.into(),
        });
    }

    pub fn push_system(&mut self, content: impl Into<String>) {
        self.push(Role::System, content);
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.push(Role::User, content);
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.push(Role::Assistant, content);
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serializes_as_role_tagged_records() {
        let mut transcript = Transcript::new();
        transcript.push_system("rules");
        transcript.push_user("page");
        transcript.push_assistant("click(id=1)");

        let value = serde_json::to_value(&transcript).unwrap();
        assert_eq!(
            value,
            serde_json::json!([
                {"role": "system", "content": "rules"},
                {"role": "user", "content": "page"},
                {"role": "assistant", "content": "click(id=1)"},
            ])
        );
        assert_eq!(transcript.last().map(|m| m.role), Some(Role::Assistant));
    }
}
