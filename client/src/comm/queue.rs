//! Outbound message queue
//!
//! Pure state machine driven by [`crate::comm::Messenger`]. Messages leave
//! strictly FIFO and at most one is in flight at any time. A message keeps
//! its in-flight flag while it waits for a retry, so nothing overtakes it.

use std::collections::VecDeque;
use std::time::Duration;

use uuid::Uuid;

use crate::comm::inbound::Outcome;
use crate::comm::message::ServerMessage;
use crate::error::AppError;

/// What to put on the wire next
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatch {
    pub uuid: Uuid,
    pub payload: String,
}

/// Decision taken after a transport failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Resend the same message after this delay
    RetryAfter(Duration),
    /// Backoff disabled; the message was removed
    Dropped,
}

#[derive(Debug)]
pub struct MessageQueue {
    messages: VecDeque<ServerMessage>,
    backoff: bool,
    retry_base: Duration,
    max_retry_delay: Option<Duration>,
}

impl MessageQueue {
    pub fn new(backoff: bool, retry_base: Duration, max_retry_delay: Option<Duration>) -> Self {
        Self {
            messages: VecDeque::new(),
            backoff,
            retry_base,
            max_retry_delay,
        }
    }

    pub fn push(&mut self, mut message: ServerMessage) {
        tracing::debug!(">>> creating message [{}]", message.short_id());
        message.in_flight = false;
        message.retry_delay = self.retry_base;
        self.messages.push_back(message);
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn in_flight_count(&self) -> usize {
        self.messages.iter().filter(|m| m.in_flight).count()
    }

    pub fn get(&self, uuid: &Uuid) -> Option<&ServerMessage> {
        self.messages.iter().find(|m| m.uuid == *uuid)
    }

    /// Mark the head in flight and hand out its payload, unless it is
    /// already travelling.
    pub fn next_to_send(&mut self) -> Option<Dispatch> {
        let head = self.messages.front_mut()?;
        if head.in_flight {
            return None;
        }
        head.in_flight = true;
        head.attempts += 1;
        tracing::debug!(">>> sending message {}", head.short_id());
        Some(Dispatch {
            uuid: head.uuid,
            payload: head.payload.clone(),
        })
    }

    /// A response arrived for `uuid`. The message leaves the queue whatever
    /// the outcome; only a success reaches the caller as `Ok`.
    pub fn complete(&mut self, uuid: &Uuid, outcome: Outcome) -> bool {
        let Some(message) = self.remove(uuid) else {
            tracing::warn!("response for unknown message {}", uuid);
            return false;
        };
        match outcome {
            Outcome::Succeeded(body) => {
                tracing::debug!(">>> Message {} handled successfully", message.short_id());
                message.finish(Ok(body));
            }
            other => {
                tracing::warn!("message handler produced no response for {}", message.short_id());
                message.finish(other.into_result());
            }
        }
        true
    }

    /// The transport failed for `uuid`. With backoff on, the message stays
    /// at the head and its delay doubles for next time.
    pub fn fail_transport(&mut self, uuid: &Uuid, error: AppError) -> RetryDecision {
        if !self.backoff {
            tracing::warn!("Message backoff disabled = failure complete ({})", error);
            if let Some(message) = self.remove(uuid) {
                message.finish(Err(error));
            }
            return RetryDecision::Dropped;
        }

        let max = self.max_retry_delay;
        let Some(message) = self.messages.iter_mut().find(|m| m.uuid == *uuid) else {
            return RetryDecision::Dropped;
        };
        let wait = message.retry_delay;
        let doubled = message.retry_delay.saturating_mul(2);
        message.retry_delay = match max {
            Some(cap) => doubled.min(cap),
            None => doubled,
        };
        tracing::debug!(
            ">>> retrying message {} in {:?} after: {}",
            message.short_id(),
            wait,
            error
        );
        RetryDecision::RetryAfter(wait)
    }

    /// Payload for a scheduled retry of the in-flight head
    pub fn retry(&mut self, uuid: &Uuid) -> Option<Dispatch> {
        let head = self.messages.front_mut()?;
        if head.uuid != *uuid || !head.in_flight {
            return None;
        }
        head.attempts += 1;
        Some(Dispatch {
            uuid: head.uuid,
            payload: head.payload.clone(),
        })
    }

    fn remove(&mut self, uuid: &Uuid) -> Option<ServerMessage> {
        let idx = self.messages.iter().position(|m| m.uuid == *uuid)?;
        tracing::debug!(">>> Removing message {} (idx: {}) from queue.", uuid, idx);
        let mut message = self.messages.remove(idx)?;
        message.in_flight = false;
        Some(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::inbound::Body;
    use crate::comm::message::wait;
    use tokio::sync::oneshot;

    const BASE: Duration = Duration::from_millis(500);

    fn message(payload: &str) -> (ServerMessage, oneshot::Receiver<crate::error::AppResult<Body>>) {
        let (tx, rx) = oneshot::channel();
        (
            ServerMessage::new(Uuid::new_v4(), "get_list", payload.to_string(), Some(tx)),
            rx,
        )
    }

    fn ok_body() -> Outcome {
        Outcome::Succeeded(Body {
            status: true,
            ..Default::default()
        })
    }

    #[test]
    fn test_only_head_is_ever_in_flight() {
        let mut queue = MessageQueue::new(true, BASE, None);
        let mut uuids = Vec::new();
        for i in 0..5 {
            let (m, _rx) = message(&format!("m{}", i));
            uuids.push(m.uuid);
            queue.push(m);
        }

        for uuid in &uuids {
            let d = queue.next_to_send().unwrap();
            assert_eq!(&d.uuid, uuid);
            assert_eq!(queue.in_flight_count(), 1);
            // the head is busy, nothing else goes out
            assert!(queue.next_to_send().is_none());
            assert_eq!(queue.in_flight_count(), 1);

            queue.fail_transport(uuid, AppError::Transport("timeout".into()));
            assert_eq!(queue.in_flight_count(), 1);
            assert!(queue.next_to_send().is_none());

            assert!(queue.complete(uuid, ok_body()));
            assert!(queue.in_flight_count() <= 1);
        }
        assert!(queue.is_empty());
    }

    #[test]
    fn test_retry_delay_doubles_per_failure() {
        let mut queue = MessageQueue::new(true, BASE, None);
        let (m, _rx) = message("a");
        let uuid = m.uuid;
        queue.push(m);
        queue.next_to_send().unwrap();

        let mut expected = BASE;
        for _ in 0..6 {
            let decision = queue.fail_transport(&uuid, AppError::Transport("down".into()));
            assert_eq!(decision, RetryDecision::RetryAfter(expected));
            expected *= 2;
            assert_eq!(queue.get(&uuid).unwrap().retry_delay, expected);
            assert!(queue.retry(&uuid).is_some());
        }
        assert_eq!(queue.get(&uuid).unwrap().attempts, 7);
    }

    #[test]
    fn test_retry_delay_cap() {
        let mut queue = MessageQueue::new(true, BASE, Some(Duration::from_secs(2)));
        let (m, _rx) = message("a");
        let uuid = m.uuid;
        queue.push(m);
        queue.next_to_send().unwrap();

        let waits: Vec<_> = (0..5)
            .map(|_| queue.fail_transport(&uuid, AppError::Transport("down".into())))
            .collect();
        assert_eq!(
            waits,
            vec![
                RetryDecision::RetryAfter(Duration::from_millis(500)),
                RetryDecision::RetryAfter(Duration::from_secs(1)),
                RetryDecision::RetryAfter(Duration::from_secs(2)),
                RetryDecision::RetryAfter(Duration::from_secs(2)),
                RetryDecision::RetryAfter(Duration::from_secs(2)),
            ]
        );
    }

    #[tokio::test]
    async fn test_backoff_disabled_drops_message() {
        let mut queue = MessageQueue::new(false, BASE, None);
        let (m, rx) = message("a");
        let uuid = m.uuid;
        queue.push(m);
        queue.next_to_send().unwrap();

        let decision = queue.fail_transport(&uuid, AppError::Transport("refused".into()));
        assert_eq!(decision, RetryDecision::Dropped);
        assert!(queue.is_empty());
        assert!(matches!(wait(rx).await, Err(AppError::Transport(_))));
    }

    #[tokio::test]
    async fn test_removed_on_application_failure_and_invalid_response() {
        let mut queue = MessageQueue::new(true, BASE, None);
        let (a, rx_a) = message("a");
        let (b, rx_b) = message("b");
        let (ua, ub) = (a.uuid, b.uuid);
        queue.push(a);
        queue.push(b);

        queue.next_to_send().unwrap();
        queue.complete(&ua, Outcome::Failed(Body::default()));
        assert_eq!(queue.len(), 1);
        assert!(matches!(wait(rx_a).await, Err(AppError::Application(_))));

        assert_eq!(queue.next_to_send().unwrap().uuid, ub);
        queue.complete(&ub, Outcome::Invalid(AppError::InvalidSignature));
        assert!(queue.is_empty());
        assert!(matches!(wait(rx_b).await, Err(AppError::InvalidSignature)));
    }

    #[test]
    fn test_stale_retry_is_ignored() {
        let mut queue = MessageQueue::new(true, BASE, None);
        let (m, _rx) = message("a");
        let uuid = m.uuid;
        queue.push(m);
        queue.next_to_send().unwrap();
        queue.complete(&uuid, ok_body());
        assert!(queue.retry(&uuid).is_none());
        assert!(!queue.complete(&uuid, ok_body()));
    }
}
