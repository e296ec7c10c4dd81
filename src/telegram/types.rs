use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Serialize, Deserialize)]
pub struct TelegramMessage {
    pub chat_id: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parse_mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disable_web_page_preview: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct TelegramResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    pub description: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct GetUpdates {
    pub offset: i64,
    pub timeout: u64,
    pub allowed_updates: Vec<&'static str>,
}

#[derive(Debug, Serialize)]
pub struct GetChatMember {
    pub chat_id: String,
    pub user_id: i64,
}

#[derive(Debug, Serialize)]
pub struct GetChat {
    pub chat_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    pub first_name: String,
    pub username: Option<String>,
}

impl User {
    pub fn display_name(&self) -> String {
        self.username
            .clone()
            .unwrap_or_else(|| self.first_name.clone())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: String,
    pub title: Option<String>,
    pub username: Option<String>,
    pub first_name: Option<String>,
}

impl Chat {
    pub fn display_name(&self) -> Option<String> {
        self.title
            .clone()
            .or_else(|| self.username.clone())
            .or_else(|| self.first_name.clone())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    pub from: Option<User>,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatMember {
    pub status: String,
    pub user: User,
}

impl ChatMember {
    pub fn is_admin(&self) -> bool {
        matches!(self.status.as_str(), "creator" | "administrator")
    }

    pub fn is_present(&self) -> bool {
        matches!(
            self.status.as_str(),
            "creator" | "administrator" | "member" | "restricted"
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatMemberUpdated {
    pub chat: Chat,
    pub new_chat_member: ChatMember,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
    pub my_chat_member: Option<ChatMemberUpdated>,
}

#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub api_base_url: String,
    pub poll_timeout_secs: u64,
    /// upper bound on a single request, added on top of the long-poll wait
    pub request_timeout_secs: u64,
}

impl TelegramConfig {
    pub fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base_url, self.bot_token, method)
    }

    /// How long a call may take before it is abandoned. getUpdates is allowed
    /// the long-poll wait on top of the request timeout.
    pub fn request_timeout(&self, method: &str) -> Duration {
        let secs = match method {
            "getUpdates" => self.poll_timeout_secs + self.request_timeout_secs,
            _ => self.request_timeout_secs,
        };
        Duration::from_secs(secs)
    }
}
