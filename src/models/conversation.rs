//! Per-session chat history.

use serde::{Deserialize, Serialize};

use super::search::Answer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

/// Append-only message log owned by one interactive session.
///
/// Messages are only added as complete question/answer exchanges, so a
/// failed or abandoned generation never leaves a partial answer behind.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    messages: Vec<Message>,
    last_answer: Option<Answer>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, answer: Answer) {
        self.messages.push(Message {
            role: Role::User,
            content: answer.question.clone(),
        });
        self.messages.push(Message {
            role: Role::Assistant,
            content: answer.text.clone(),
        });
        self.last_answer = Some(answer);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// The most recent answer, for provenance display.
    pub fn last_answer(&self) -> Option<&Answer> {
        self.last_answer.as_ref()
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
    use crate::models::AnswerTimings;

    fn answer(question: &str, text: &str) -> Answer {
        Answer {
            question: question.to_string(),
            text: text.to_string(),
            sources: Vec::new(),
            model: "llama3.1".to_string(),
            timings: AnswerTimings::default(),
        }
    }

    #[test]
    fn test_record_appends_in_order() {
        let mut conversation = Conversation::new();
        assert!(conversation.is_empty());
        assert!(conversation.last_answer().is_none());

        conversation.record(answer("first?", "one"));
        conversation.record(answer("second?", "two"));

        let roles: Vec<Role> = conversation.messages().iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::User, Role::Assistant, Role::User, Role::Assistant]
        );
        assert_eq!(conversation.messages()[2].content, "second?");
        assert_eq!(conversation.last_answer().unwrap().text, "two");
        assert_eq!(conversation.len(), 4);
    }
}
