//! End-to-end scenarios against a scripted server

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::time::Instant;

use housemate_client_lib::cache::{DOORSTEP_VIEW, GROUP_VIEW};
use housemate_client_lib::comm::{sign, SocketConnection, SocketConnector, Transport};
use housemate_client_lib::models::{Group, Member, RecordKey};
use housemate_client_lib::settings::DEFAULT_APP_KEY;
use housemate_client_lib::{AppError, AppResult, Session, Settings};

#[derive(Clone, Default)]
struct Server {
    answers: Arc<Mutex<VecDeque<AppResult<String>>>>,
    requests: Arc<Mutex<Vec<Instant>>>,
}

impl Server {
    fn answer(&self, key: &str, body: Value) {
        let ts = "2014-03-01T10:00:00.000";
        let payload = json!({"timestamp": ts, "signature": sign(ts, key).unwrap(), "body": body});
        self.answers.lock().unwrap().push_back(Ok(payload.to_string()));
    }

    fn time_out(&self) {
        self.answers
            .lock()
            .unwrap()
            .push_back(Err(AppError::Transport("timed out".into())));
    }

    fn request_times(&self) -> Vec<Instant> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for Server {
    async fn send(&self, _payload: &str) -> AppResult<String> {
        self.requests.lock().unwrap().push(Instant::now());
        self.answers
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(AppError::Transport("no answer".into())))
    }
}

/// Socket node that is never reachable
struct Offline;

#[async_trait]
impl SocketConnector for Offline {
    async fn connect(&self, _address: &str) -> AppResult<Box<dyn SocketConnection>> {
        Err(AppError::Socket("offline".into()))
    }
}

fn start(server: &Server) -> Session {
    Session::start(&Settings::default(), server.clone(), Arc::new(Offline)).unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_timeout_twice_then_success_answers_once() {
    let server = Server::default();
    server.time_out();
    server.time_out();
    server.answer(
        DEFAULT_APP_KEY,
        json!({"status": 1, "config": {"doorstep": {"group": [{"group_id": 1, "nickname": "Loft"}]}}}),
    );
    let session = start(&server);

    let body = session
        .comm()
        .get_list(json!({"config": {"doorstep": {"group": {"offset": 0, "limit": 20}}}}))
        .await
        .unwrap();
    assert!(body.status);

    let times = server.request_times();
    assert_eq!(times.len(), 3);
    let (first, second) = (times[1] - times[0], times[2] - times[1]);
    assert!(first >= Duration::from_millis(500) && first < Duration::from_millis(510));
    assert!(second >= Duration::from_millis(1000) && second < Duration::from_millis(1010));
    assert!(!session.comm().is_processing());

    tokio::time::sleep(Duration::from_millis(10)).await;
    let store = session.store().read().await;
    let groups = store.list::<Group>(DOORSTEP_VIEW, "group").unwrap();
    assert_eq!(groups.records().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_unknown_signature_changes_nothing() {
    let server = Server::default();
    server.answer(
        "not-a-key-this-client-knows",
        json!({
            "status": 1,
            "config": {
                "CurrentUser": {"user_id": 1, "user_token": "t".repeat(40)},
                "doorstep": {"group": [{"group_id": 1}]}
            }
        }),
    );
    let session = start(&server);

    let err = session.comm().get_list(json!({})).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidSignature));

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(!session.state().read().await.is_authenticated());
    assert!(session.take_notices().await.is_empty());
    let store = session.store().read().await;
    assert!(store.list::<Group>(DOORSTEP_VIEW, "group").unwrap().records().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_second_update_overwrites_only_its_fields() {
    let server = Server::default();
    server.answer(
        DEFAULT_APP_KEY,
        json!({"status": 1, "config": {"group": {"member": [
            {"member_id": 4, "contact_name": "Ana Lima", "workload": 2, "email": "ana@flat.share"}
        ]}}}),
    );
    server.answer(
        DEFAULT_APP_KEY,
        json!({"status": 1, "config": {"group": {"member": {"member_id": 4, "workload": 3}}}}),
    );
    let session = start(&server);

    session.comm().get_list(json!({})).await.unwrap();
    session.comm().get_list(json!({})).await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    let store = session.store().read().await;
    let members = store.list::<Member>(GROUP_VIEW, "member").unwrap();
    assert_eq!(members.records().len(), 1);
    let ana = members.get(&RecordKey::from(4)).unwrap();
    assert_eq!(ana.workload, Some(3));
    assert_eq!(ana.contact_name.as_deref(), Some("Ana Lima"));
    assert_eq!(ana.email.as_deref(), Some("ana@flat.share"));
}

#[tokio::test(start_paused = true)]
async fn test_application_failure_surfaces_notice_without_retry() {
    let server = Server::default();
    server.answer(DEFAULT_APP_KEY, json!({"status": false, "msg": "That email is taken"}));
    let session = start(&server);

    let err = session
        .comm()
        .submit_form("UserManager", "change_email", json!({"email": "kim@flat.share"}))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Application(_)));

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(server.request_times().len(), 1);
    let notices = session.take_notices().await;
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].text, "That email is taken");
}
