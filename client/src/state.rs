//! Application state management
//!
//! Holds the app-config slots (current user, group and member) and the
//! user-facing notification queue. Shared as `Arc<RwLock<>>`.

use std::collections::VecDeque;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::RwLock;

use crate::error::{AppError, AppResult};
use crate::models::{Group, Member, Record, UserAccount};

/// Notifications kept before the oldest are dropped
const MAX_NOTICES: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Error,
}

/// Transient user-facing message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub text: String,
    pub level: NoticeLevel,
}

impl Notice {
    pub fn new(text: impl Into<String>, level: NoticeLevel) -> Self {
        Self {
            text: text.into(),
            level,
        }
    }
}

/// Global configuration slots filled from inbound payloads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AppConfigSlot {
    CurrentUser,
    CurrentGroup,
    CurrentMember,
}

impl AppConfigSlot {
    pub const ALL: [AppConfigSlot; 3] = [
        AppConfigSlot::CurrentUser,
        AppConfigSlot::CurrentGroup,
        AppConfigSlot::CurrentMember,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "CurrentUser" => Some(Self::CurrentUser),
            "CurrentGroup" => Some(Self::CurrentGroup),
            "CurrentMember" => Some(Self::CurrentMember),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::CurrentUser => "CurrentUser",
            Self::CurrentGroup => "CurrentGroup",
            Self::CurrentMember => "CurrentMember",
        }
    }
}

/// Global application state
#[derive(Debug, Default)]
pub struct AppState {
    /// Signed-in user (None if not authenticated)
    pub current_user: Option<UserAccount>,

    /// Group the user has entered
    pub current_group: Option<Group>,

    /// The user's membership in the current group
    pub current_member: Option<Member>,

    /// Pending notifications, oldest first
    pub notifications: VecDeque<Notice>,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if user is authenticated
    pub fn is_authenticated(&self) -> bool {
        self.current_user.is_some()
    }

    pub fn user_token(&self) -> Option<&str> {
        self.current_user.as_ref().and_then(|u| u.user_token.as_deref())
    }

    pub fn group_token(&self) -> Option<&str> {
        self.current_group.as_ref().and_then(|g| g.group_token.as_deref())
    }

    pub fn member_token(&self) -> Option<&str> {
        self.current_member.as_ref().and_then(|m| m.member_token.as_deref())
    }

    /// Require authentication, returning error if not authenticated
    pub fn require_user(&self) -> AppResult<&UserAccount> {
        self.current_user.as_ref().ok_or(AppError::NotAuthenticated)
    }

    /// Replace a slot from a payload; `null` clears it
    pub fn define(&mut self, slot: AppConfigSlot, payload: &Value) -> AppResult<()> {
        tracing::debug!("defining config {}", slot.name());
        let clear = payload.is_null();
        match slot {
            AppConfigSlot::CurrentUser => {
                self.current_user = if clear { None } else { Some(UserAccount::from_payload(payload)?) };
            }
            AppConfigSlot::CurrentGroup => {
                self.current_group = if clear { None } else { Some(Group::from_payload(payload)?) };
            }
            AppConfigSlot::CurrentMember => {
                self.current_member = if clear { None } else { Some(Member::from_payload(payload)?) };
            }
        }
        Ok(())
    }

    pub fn clear_slot(&mut self, slot: AppConfigSlot) {
        match slot {
            AppConfigSlot::CurrentUser => self.current_user = None,
            AppConfigSlot::CurrentGroup => self.current_group = None,
            AppConfigSlot::CurrentMember => self.current_member = None,
        }
    }

    /// Clear every slot on logout
    pub fn clear_session(&mut self) {
        for slot in AppConfigSlot::ALL {
            self.clear_slot(slot);
        }
    }

    pub fn push_notice(&mut self, notice: Notice) {
        if self.notifications.len() == MAX_NOTICES {
            self.notifications.pop_front();
        }
        self.notifications.push_back(notice);
    }

    /// Take and clear all pending notifications
    pub fn take_notices(&mut self) -> Vec<Notice> {
        self.notifications.drain(..).collect()
    }
}

/// Thread-safe shared state type
pub type SharedState = Arc<RwLock<AppState>>;

/// Create a new shared state instance
pub fn create_shared_state() -> SharedState {
    Arc::new(RwLock::new(AppState::new()))
}
