use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

pub const DEFAULT_TITLE: &str = "New Conversation";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub id: Uuid,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub id: Uuid,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub last_message: Option<String>,
    pub last_activity: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub id: i64,
    pub session_id: Uuid,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

// message_id points at the user message that triggered the turn
#[derive(Debug, Clone, Serialize)]
pub struct ToolCallRecord {
    pub id: i64,
    pub session_id: Uuid,
    pub message_id: i64,
    pub tool_name: String,
    pub input_args: Value,
    pub output: Value,
    pub success: bool,
    pub created_at: DateTime<Utc>,
}

pub fn title_from_message(text: &str) -> String {
    let trimmed = text.trim();
    let chars: Vec<char> = trimmed.chars().collect();
    if chars.len() > 30 {
        let head: String = chars[..30].iter().collect();
        format!("{}...", head)
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trip() {
        assert_eq!(Role::parse("user"), Some(Role::User));
        assert_eq!(Role::parse("assistant"), Some(Role::Assistant));
        assert_eq!(Role::User.as_str(), "user");
        assert!(Role::parse("system").is_none());
    }

    #[test]
    fn short_titles_kept_whole() {
        assert_eq!(title_from_message("find Hunt books"), "find Hunt books");
    }

    #[test]
    fn long_titles_truncated_with_ellipsis() {
        let long = "please order three copies of Clean Code for customer two";
        let title = title_from_message(long);
        assert_eq!(title.chars().count(), 33);
        assert!(title.ends_with("..."));
        assert!(title.starts_with("please order three copies of C"));
    }

    #[test]
    fn multibyte_titles_do_not_split_chars() {
        let long = "ansiktsmaling på bøker og blyanter i biblioteket";
        let title = title_from_message(long);
        assert!(title.ends_with("..."));
        assert_eq!(title.chars().count(), 33);
    }
}
