//! Account forms handled by the `UserManager`

use md5::{Digest, Md5};
use serde_json::{json, Value};

use super::{invalid, is_valid_email, is_valid_password, Form};
use crate::error::AppResult;

const USER_MANAGER: &str = "UserManager";
const BAD_EMAIL: &str = "Please enter a valid email";
const BAD_PASSWORD: &str = "Please enter a valid password between 6 and 50 characters in length";
const MAX_NAME_LEN: usize = 250;

/// Passwords travel as the lowercase hex MD5 of what was typed
pub fn password_digest(password: &str) -> String {
    hex::encode(Md5::digest(password.as_bytes()))
}

#[derive(Debug, Clone, Default)]
pub struct SignIn {
    pub email: String,
    pub password: String,
}

impl Form for SignIn {
    const NAME: &'static str = "SignIn";
    const MANAGER: &'static str = USER_MANAGER;
    const ACTION: &'static str = "sign_in";

    fn validate(&self) -> AppResult<()> {
        if !is_valid_email(&self.email) {
            return invalid(BAD_EMAIL);
        }
        if !is_valid_password(&self.password) {
            return invalid(BAD_PASSWORD);
        }
        Ok(())
    }

    fn config(&self) -> Value {
        json!({"email": self.email, "password": password_digest(&self.password)})
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}

#[derive(Debug, Clone, Default)]
pub struct SignUp {
    pub name: String,
    pub email: String,
    pub password: String,
    pub repeat_password: String,
}

impl Form for SignUp {
    const NAME: &'static str = "SignUp";
    const MANAGER: &'static str = USER_MANAGER;
    const ACTION: &'static str = "sign_up";

    fn validate(&self) -> AppResult<()> {
        let name = self.name.trim();
        if name.is_empty() {
            return invalid("Please enter a name");
        }
        if name.chars().count() >= MAX_NAME_LEN {
            return invalid("Please enter a name shorter than 250 characters");
        }
        if !is_valid_email(&self.email) {
            return invalid(BAD_EMAIL);
        }
        if !is_valid_password(&self.password) || self.password != self.repeat_password {
            return invalid(BAD_PASSWORD);
        }
        Ok(())
    }

    fn config(&self) -> Value {
        json!({
            "name": self.name.trim(),
            "email": self.email,
            "password": password_digest(&self.password),
        })
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}

#[derive(Debug, Clone, Default)]
pub struct ChangeEmail {
    pub email: String,
}

impl Form for ChangeEmail {
    const NAME: &'static str = "ChangeEmail";
    const MANAGER: &'static str = USER_MANAGER;
    const ACTION: &'static str = "change_email";

    fn validate(&self) -> AppResult<()> {
        if !is_valid_email(&self.email) {
            return invalid("Invalid email. Please try again.");
        }
        Ok(())
    }

    fn config(&self) -> Value {
        json!({"email": self.email})
    }

    fn reset(&mut self) {
        self.email.clear();
    }
}

#[derive(Debug, Clone, Default)]
pub struct ChangePassword {
    pub old_password: String,
    pub password: String,
    pub repeat_password: String,
}

impl Form for ChangePassword {
    const NAME: &'static str = "ChangePassword";
    const MANAGER: &'static str = USER_MANAGER;
    const ACTION: &'static str = "change_password";

    fn validate(&self) -> AppResult<()> {
        let all_valid = [&self.old_password, &self.password, &self.repeat_password]
            .iter()
            .all(|p| is_valid_password(p));
        if !all_valid {
            return invalid("Please enter passwords with 6-50 characters");
        }
        if self.password != self.repeat_password {
            return invalid("The new passwords do not match. Please try again");
        }
        Ok(())
    }

    fn config(&self) -> Value {
        json!({"old_password": self.old_password, "new_password": self.password})
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}

#[derive(Debug, Clone, Default)]
pub struct ForgotPassword {
    pub email: String,
}

impl Form for ForgotPassword {
    const NAME: &'static str = "ForgotPasswordRequest";
    const MANAGER: &'static str = USER_MANAGER;
    const ACTION: &'static str = "send_password_reset";

    fn validate(&self) -> AppResult<()> {
        if !is_valid_email(&self.email) {
            return invalid(BAD_EMAIL);
        }
        Ok(())
    }

    fn config(&self) -> Value {
        json!({"email": self.email})
    }

    fn reset(&mut self) {
        self.email.clear();
    }
}

/// Sets a new password with the token from a reset email
#[derive(Debug, Clone, Default)]
pub struct ResetPassword {
    pub password: String,
    pub repeat_password: String,
    pub reset_token: Option<String>,
    pub email: Option<String>,
}

impl ResetPassword {
    /// Form for the token and address carried by a reset link
    pub fn for_link(reset_token: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            reset_token: Some(reset_token.into()),
            email: Some(email.into()),
            ..Self::default()
        }
    }
}

impl Form for ResetPassword {
    const NAME: &'static str = "PasswordReset";
    const MANAGER: &'static str = USER_MANAGER;
    const ACTION: &'static str = "reset_password";

    fn validate(&self) -> AppResult<()> {
        if !is_valid_password(&self.password) {
            return invalid(BAD_PASSWORD);
        }
        if self.password != self.repeat_password {
            return invalid("The passwords do not match");
        }
        if self.reset_token.as_deref().map_or(true, str::is_empty) {
            return invalid("Please click on Forgot Password");
        }
        if self.email.as_deref().map_or(true, str::is_empty) {
            return invalid("Required params not met");
        }
        Ok(())
    }

    fn config(&self) -> Value {
        json!({
            "password": password_digest(&self.password),
            "reset_token": self.reset_token,
            "email": self.email,
        })
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}
