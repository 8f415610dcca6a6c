//! Entity records received from the server

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::de::{int_or_string, opt_flag, opt_int_or_string, opt_timestamp};
use super::record::{Record, RecordKey};

// ============================================================================
// Account Types
// ============================================================================

/// The signed-in user's account (the `CurrentUser` slot)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserAccount {
    #[serde(deserialize_with = "int_or_string")]
    pub user_id: i64,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub user_token: Option<String>,
    #[serde(default)]
    pub contact_name: Option<String>,
    #[serde(default)]
    pub social_profile: Option<String>,
    #[serde(default, deserialize_with = "opt_timestamp")]
    pub birthday: Option<DateTime<Utc>>,
    #[serde(default)]
    pub picture: Option<String>,
    #[serde(default, deserialize_with = "opt_flag")]
    pub guest: Option<bool>,
    #[serde(default, deserialize_with = "opt_timestamp")]
    pub user_created: Option<DateTime<Utc>>,
    #[serde(default)]
    pub mobile_phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub apt_suite: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default, deserialize_with = "opt_timestamp")]
    pub last_seen: Option<DateTime<Utc>>,
}

impl Record for UserAccount {
    const KIND: &'static str = "user_account";
    const PRIMARY_KEY: &'static str = "user_id";

    fn key(&self) -> RecordKey {
        self.user_id.into()
    }
}

// ============================================================================
// Group Types
// ============================================================================

/// A selectable group style
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupType {
    #[serde(deserialize_with = "int_or_string")]
    pub group_id: i64,
    #[serde(default)]
    pub group_style_type: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub picture_urls: Vec<String>,
    #[serde(default, deserialize_with = "opt_flag")]
    pub original: Option<bool>,
    #[serde(default, deserialize_with = "opt_int_or_string")]
    pub popularity: Option<i64>,
}

impl GroupType {
    /// Whether this style is the one the current group uses
    pub fn is_selected(&self, current: Option<&Group>) -> bool {
        match (current.and_then(|g| g.group_style_type.as_deref()), self.group_style_type.as_deref()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }
}

impl Record for GroupType {
    const KIND: &'static str = "group_type";
    const PRIMARY_KEY: &'static str = "group_id";

    fn key(&self) -> RecordKey {
        self.group_id.into()
    }
}

/// A group (the `CurrentGroup` slot, and doorstep group listings)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    #[serde(deserialize_with = "int_or_string")]
    pub group_id: i64,
    #[serde(default)]
    pub group_token: Option<String>,
    /// References [`GroupType::group_style_type`]
    #[serde(default)]
    pub group_style_type: Option<String>,
    #[serde(default)]
    pub nickname: Option<String>,
}

impl Record for Group {
    const KIND: &'static str = "group";
    const PRIMARY_KEY: &'static str = "group_id";

    fn key(&self) -> RecordKey {
        self.group_id.into()
    }
}

/// A group member (the `CurrentMember` slot, and group people lists)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    #[serde(deserialize_with = "int_or_string")]
    pub member_id: i64,
    /// Only present for the current member
    #[serde(default)]
    pub member_token: Option<String>,
    #[serde(default, deserialize_with = "opt_int_or_string")]
    pub group_id: Option<i64>,
    #[serde(default, deserialize_with = "opt_int_or_string")]
    pub workload: Option<i64>,
    #[serde(default)]
    pub member_status: Option<String>,
    #[serde(default)]
    pub member_status_created: Option<String>,
    #[serde(default)]
    pub group_nickname: Option<String>,
    #[serde(default)]
    pub prefer_task_days: Vec<String>,
    #[serde(default)]
    pub contact_name: Option<String>,
    #[serde(default, deserialize_with = "opt_timestamp")]
    pub birthday: Option<DateTime<Utc>>,
    #[serde(default)]
    pub picture: Option<String>,
    #[serde(default)]
    pub member_created: Option<String>,
    #[serde(default)]
    pub mobile: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, deserialize_with = "opt_timestamp")]
    pub last_seen: Option<DateTime<Utc>>,
}

impl Record for Member {
    const KIND: &'static str = "member";
    const PRIMARY_KEY: &'static str = "member_id";

    fn key(&self) -> RecordKey {
        self.member_id.into()
    }
}

// ============================================================================
// Chat Types
// ============================================================================

/// A message in the group chat room
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(deserialize_with = "int_or_string")]
    pub chat_message_id: i64,
    #[serde(default)]
    pub author_name: Option<String>,
    #[serde(default)]
    pub author_picture: Option<String>,
    #[serde(default, deserialize_with = "opt_int_or_string")]
    pub group_id: Option<i64>,
    #[serde(default)]
    pub chat_message: String,
    #[serde(default, deserialize_with = "opt_flag")]
    pub broadcast: Option<bool>,
    #[serde(default, deserialize_with = "opt_timestamp")]
    pub created: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "opt_flag")]
    pub as_group: Option<bool>,
    /// Yes/no question that members can answer
    #[serde(default, deserialize_with = "opt_flag")]
    pub yes_no: Option<bool>,
}

impl ChatMessage {
    pub fn author_first_name(&self) -> Option<&str> {
        self.author_name
            .as_deref()
            .and_then(|name| name.split_whitespace().next())
    }

    /// Questions stay open for one day
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.created.and_then(|c| c.checked_add_signed(Duration::days(1)))
    }

    pub fn is_question(&self) -> bool {
        self.yes_no == Some(true)
    }

    /// View name of the answer list attached to a question
    pub fn answers_type(&self) -> String {
        format!("{}{}", ChatMessageAnswer::KIND, self.chat_message_id)
    }
}

impl Record for ChatMessage {
    const KIND: &'static str = "chat_message";
    const PRIMARY_KEY: &'static str = "chat_message_id";

    fn key(&self) -> RecordKey {
        self.chat_message_id.into()
    }
}

/// A member's answer to a yes/no chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessageAnswer {
    #[serde(deserialize_with = "int_or_string")]
    pub member_id: i64,
    #[serde(default, deserialize_with = "opt_int_or_string")]
    pub chat_message_id: Option<i64>,
    #[serde(default)]
    pub contact_name: Option<String>,
    #[serde(default)]
    pub picture: Option<String>,
    #[serde(default, deserialize_with = "opt_flag")]
    pub yes_no: Option<bool>,
}

impl Record for ChatMessageAnswer {
    const KIND: &'static str = "chat_message_member";
    const PRIMARY_KEY: &'static str = "member_id";

    fn key(&self) -> RecordKey {
        self.member_id.into()
    }
}

// ============================================================================
// Activity Types
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupLogItem {
    #[serde(deserialize_with = "int_or_string")]
    pub group_log_item_id: i64,
    #[serde(default, deserialize_with = "opt_int_or_string")]
    pub group_id: Option<i64>,
    #[serde(default)]
    pub content_string: String,
    #[serde(default)]
    pub class_name: Option<String>,
    #[serde(default, deserialize_with = "opt_timestamp")]
    pub created: Option<DateTime<Utc>>,
}

impl Record for GroupLogItem {
    const KIND: &'static str = "group_log_item";
    const PRIMARY_KEY: &'static str = "group_log_item_id";

    fn key(&self) -> RecordKey {
        self.group_log_item_id.into()
    }
}

// ============================================================================
// Invitation Types
// ============================================================================

/// An invitation addressed to the signed-in user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invite {
    #[serde(deserialize_with = "int_or_string")]
    pub invite_id: i64,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default, deserialize_with = "opt_int_or_string")]
    pub inviter_id: Option<i64>,
    #[serde(default, deserialize_with = "opt_int_or_string")]
    pub invitee_id: Option<i64>,
    #[serde(default)]
    pub invitee_email: Option<String>,
    #[serde(default)]
    pub invitee_name: Option<String>,
    #[serde(default, deserialize_with = "opt_flag")]
    pub rsvp: Option<bool>,
    #[serde(default, deserialize_with = "opt_flag")]
    pub resent: Option<bool>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default, deserialize_with = "opt_timestamp")]
    pub created: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "opt_timestamp")]
    pub delete_on: Option<DateTime<Utc>>,
}

impl Record for Invite {
    const KIND: &'static str = "invite";
    const PRIMARY_KEY: &'static str = "invite_id";

    fn key(&self) -> RecordKey {
        self.invite_id.into()
    }
}

/// An invitation sent out by the current group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupInvite {
    #[serde(deserialize_with = "int_or_string")]
    pub invite_id: i64,
    #[serde(default)]
    pub invitee_email: Option<String>,
    #[serde(default)]
    pub inviter_name: Option<String>,
    #[serde(default)]
    pub invitee_name: Option<String>,
    #[serde(default)]
    pub groupkey: Option<String>,
    #[serde(default, deserialize_with = "opt_timestamp")]
    pub cancelled_on: Option<DateTime<Utc>>,
}

impl GroupInvite {
    pub fn is_cancelled(&self) -> bool {
        self.cancelled_on.is_some()
    }
}

impl Record for GroupInvite {
    const KIND: &'static str = "group_invite";
    const PRIMARY_KEY: &'static str = "invite_id";

    fn key(&self) -> RecordKey {
        self.invite_id.into()
    }
}
