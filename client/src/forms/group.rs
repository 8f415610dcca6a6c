//! Group and chat forms

use serde_json::{json, Value};

use super::{invalid, is_valid_email, is_valid_password, Form};
use crate::error::AppResult;
use crate::models::ChatMessage;
use crate::settings::Settings;
use crate::state::AppState;

const GROUP_MANAGER: &str = "GroupManager";
const MEMBER_MANAGER: &str = "MemberManager";

/// Creates a group owned by the current user
#[derive(Debug, Clone, Default)]
pub struct CreateGroup {
    pub nickname: String,
    pub password: String,
    /// Taken from the current user when submitted
    pub email: String,
    pub timezone: String,
}

impl CreateGroup {
    pub fn new(settings: &Settings) -> Self {
        Self {
            timezone: settings.timezone.clone(),
            ..Self::default()
        }
    }
}

impl Form for CreateGroup {
    const NAME: &'static str = "GroupForm";
    const MANAGER: &'static str = GROUP_MANAGER;
    const ACTION: &'static str = "create_group";

    fn prepare(&mut self, state: &AppState) -> AppResult<()> {
        let user = state.require_user()?;
        self.email = user.email.clone().unwrap_or_default();
        Ok(())
    }

    fn validate(&self) -> AppResult<()> {
        if self.nickname.trim().is_empty() {
            return invalid("Please enter a nickname for the group");
        }
        if !is_valid_password(&self.password) {
            return invalid("Please enter a password between 6-50 characters in length");
        }
        Ok(())
    }

    fn config(&self) -> Value {
        json!({
            "nickname": self.nickname.trim(),
            "email": self.email,
            "timezone": self.timezone,
            "password": self.password,
        })
    }

    fn reset(&mut self) {
        self.nickname.clear();
        self.password.clear();
    }
}

/// Invites a roommate into the current group
#[derive(Debug, Clone, Default)]
pub struct CreateInvite {
    pub invitee_email: String,
    pub invitee_name: String,
}

impl Form for CreateInvite {
    const NAME: &'static str = "GroupInvite";
    const MANAGER: &'static str = GROUP_MANAGER;
    const ACTION: &'static str = "create_group_invite";

    fn validate(&self) -> AppResult<()> {
        if !is_valid_email(&self.invitee_email) {
            return invalid("Please enter a valid email for this invite");
        }
        if self.invitee_name.trim().is_empty() {
            return invalid("Please enter your roommate's name");
        }
        Ok(())
    }

    fn config(&self) -> Value {
        json!({"invitee_email": self.invitee_email, "invitee_name": self.invitee_name.trim()})
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Posts to the group chat room
#[derive(Debug, Clone, Default)]
pub struct ChatMessageForm {
    pub message: String,
    /// Ask the group a yes/no question
    pub yes_no: bool,
    /// Post in the group's name
    pub as_group: bool,
}

impl Form for ChatMessageForm {
    const NAME: &'static str = "ChatMessage";
    const MANAGER: &'static str = MEMBER_MANAGER;
    const ACTION: &'static str = "create_chat_message";

    fn validate(&self) -> AppResult<()> {
        if self.message.trim().is_empty() {
            return invalid("Please enter a message to send");
        }
        Ok(())
    }

    fn config(&self) -> Value {
        json!({
            "chat_message": self.message,
            "yes_no": self.yes_no,
            "as_group": self.as_group,
        })
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Answers a yes/no chat message
#[derive(Debug, Clone)]
pub struct ReplyToChatMessage {
    pub chat_message_id: i64,
    pub reply: bool,
    is_question: bool,
}

impl ReplyToChatMessage {
    pub fn yes(message: &ChatMessage) -> Self {
        Self::new(message, true)
    }

    pub fn no(message: &ChatMessage) -> Self {
        Self::new(message, false)
    }

    fn new(message: &ChatMessage, reply: bool) -> Self {
        Self {
            chat_message_id: message.chat_message_id,
            reply,
            is_question: message.is_question(),
        }
    }
}

impl Form for ReplyToChatMessage {
    const NAME: &'static str = "ReplyToChatMessage";
    const MANAGER: &'static str = MEMBER_MANAGER;
    const ACTION: &'static str = "reply_to_chat_message";

    fn validate(&self) -> AppResult<()> {
        if !self.is_question {
            return invalid("Only yes/no questions can be answered");
        }
        Ok(())
    }

    fn config(&self) -> Value {
        json!({"reply": self.reply, "chat_message_id": self.chat_message_id})
    }

    fn reset(&mut self) {}
}
