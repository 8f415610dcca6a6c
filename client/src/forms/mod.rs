//! Form submissions
//!
//! Each form validates its fields locally and then goes to the server as
//! `submit_form({manager, action, config})`. A rejected form pushes its
//! message to the notification queue.

mod account;
mod group;

pub use account::{ChangeEmail, ChangePassword, ForgotPassword, ResetPassword, SignIn, SignUp};
pub use group::{ChatMessageForm, CreateGroup, CreateInvite, ReplyToChatMessage};

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::comm::Body;
use crate::error::{AppError, AppResult};
use crate::session::Session;
use crate::state::{AppState, Notice, NoticeLevel};

pub(crate) static EMAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^([\w-]+(?:\.[\w-]+)*)@((?:[\w-]+\.)*\w[\w-]{0,66})\.([a-z]{2,6}(?:\.[a-z]{2})?)$")
        .expect("email pattern compiles")
});

pub(crate) static PASSWORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"^.{6,50}$").expect("password pattern compiles"));

pub fn is_valid_email(email: &str) -> bool {
    EMAIL.is_match(email)
}

pub fn is_valid_password(password: &str) -> bool {
    PASSWORD.is_match(password)
}

/// Shorthand for a failed check
pub(crate) fn invalid(message: &str) -> AppResult<()> {
    Err(AppError::Validation(message.to_string()))
}

/// A form the server accepts through `submit_form`
pub trait Form: Send {
    /// Name used in log lines
    const NAME: &'static str;
    const MANAGER: &'static str;
    const ACTION: &'static str;

    /// Fill in anything taken from the session, e.g. the current user's email
    fn prepare(&mut self, _state: &AppState) -> AppResult<()> {
        Ok(())
    }

    /// Check the fields, returning the first problem as `AppError::Validation`
    fn validate(&self) -> AppResult<()>;

    /// The `config` sent to the server
    fn config(&self) -> Value;

    /// Clear the fields after a successful submission
    fn reset(&mut self);
}

/// Validate `form` and submit it; the form is reset when the server accepts it
pub async fn submit<F: Form>(form: &mut F, session: &Session) -> AppResult<Body> {
    tracing::info!("submitting the form {}", F::NAME);

    let checked = {
        let state = session.state().read().await;
        form.prepare(&state).and_then(|_| form.validate())
    };
    if let Err(e) = checked {
        tracing::debug!("form {} rejected: {}", F::NAME, e);
        session
            .state()
            .write()
            .await
            .push_notice(Notice::new(e.to_string(), NoticeLevel::Error));
        return Err(e);
    }

    let body = session
        .comm()
        .submit_form(F::MANAGER, F::ACTION, form.config())
        .await?;
    form.reset();
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::{FakeConnector, ScriptedTransport};
    use crate::settings::Settings;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn test_email_pattern() {
        for ok in ["a@b.co", "first.last@mail.example.org", "Some-One@host.CO.UK", "x_y@d-1.info"] {
            assert!(is_valid_email(ok), "{}", ok);
        }
        for bad in ["", "plain", "a@b", "a@b.c", "a b@c.com", "a@b.toolongtld"] {
            assert!(!is_valid_email(bad), "{}", bad);
        }
    }

    #[test]
    fn test_password_pattern() {
        assert!(!is_valid_password("12345"));
        assert!(is_valid_password("123456"));
        assert!(is_valid_password(&"p".repeat(50)));
        assert!(!is_valid_password(&"p".repeat(51)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_form_is_not_sent() {
        let transport = ScriptedTransport::default();
        let session = Session::start(
            &Settings::default(),
            transport.clone(),
            Arc::new(FakeConnector::default()),
        )
        .unwrap();

        let mut form = SignIn {
            email: "nobody".into(),
            password: "secret1".into(),
        };
        let err = submit(&mut form, &session).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(transport.sent().is_empty());

        let notices = session.take_notices().await;
        assert_eq!(notices, vec![Notice::new("Please enter a valid email", NoticeLevel::Error)]);
        // nothing is cleared on failure
        assert_eq!(form.email, "nobody");
    }

    #[tokio::test(start_paused = true)]
    async fn test_accepted_form_is_reset() {
        let transport = ScriptedTransport::default();
        transport.push_ok(json!({"status": 1, "msg": "Welcome back"}));
        let session = Session::start(
            &Settings::default(),
            transport.clone(),
            Arc::new(FakeConnector::default()),
        )
        .unwrap();

        let mut form = SignIn {
            email: "a@b.co".into(),
            password: "secret1".into(),
        };
        submit(&mut form, &session).await.unwrap();
        assert!(form.email.is_empty() && form.password.is_empty());

        let sent = transport.sent();
        let arg0 = sent[0].1.split('&').find_map(|kv| kv.strip_prefix("arg0=")).unwrap();
        let arg0: Value = serde_json::from_str(&urlencoding::decode(arg0).unwrap()).unwrap();
        assert_eq!(
            arg0,
            json!({"manager": "UserManager", "action": "sign_in",
                   "config": {"email": "a@b.co", "password": "e52d98c459819a11775936d8dfbb7929"}})
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_refused_form_keeps_fields() {
        let transport = ScriptedTransport::default();
        transport.push_ok(json!({"status": 0, "msg": "Wrong password"}));
        let session = Session::start(
            &Settings::default(),
            transport.clone(),
            Arc::new(FakeConnector::default()),
        )
        .unwrap();

        let mut form = SignIn {
            email: "a@b.co".into(),
            password: "secret1".into(),
        };
        let err = submit(&mut form, &session).await.unwrap_err();
        assert!(matches!(err, AppError::Application(ref m) if m == "Wrong password"));
        assert_eq!(form.email, "a@b.co");
    }
}
