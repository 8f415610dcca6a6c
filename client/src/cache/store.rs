//! The record store and first-level dispatch of inbound configuration

use std::collections::BTreeMap;

use serde_json::Value;

use crate::cache::list::{ListCache, Order, RecordList, DEFAULT_LIMIT};
use crate::cache::object::ObjectCache;
use crate::error::{AppError, AppResult};
use crate::models::{
    ChatMessage, ChatMessageAnswer, Group, GroupInvite, GroupLogItem, GroupType, Invite, Member, Record,
};
use crate::state::{AppConfigSlot, AppState};

pub const GROUP_VIEW: &str = "group";
pub const GROUP_LOG_VIEW: &str = "group_log";
pub const CHAT_ROOM_VIEW: &str = "chat_room";
pub const DOORSTEP_VIEW: &str = "doorstep";

/// Lists every client starts with, as `(view, record_type)`
pub const DEFAULT_VIEWS: [(&str, &str); 6] = [
    (GROUP_VIEW, Member::KIND),
    (GROUP_VIEW, GroupInvite::KIND),
    (GROUP_LOG_VIEW, GroupLogItem::KIND),
    (CHAT_ROOM_VIEW, ChatMessage::KIND),
    (DOORSTEP_VIEW, Group::KIND),
    (DOORSTEP_VIEW, Invite::KIND),
];

/// Lists fetched once a user is signed in
pub const USER_VIEWS: [(&str, &str); 2] = [(DOORSTEP_VIEW, Group::KIND), (DOORSTEP_VIEW, Invite::KIND)];

/// Lists fetched once a group is entered
pub const GROUP_VIEWS: [(&str, &str); 4] = [
    (GROUP_LOG_VIEW, GroupLogItem::KIND),
    (GROUP_VIEW, Member::KIND),
    (GROUP_VIEW, GroupInvite::KIND),
    (CHAT_ROOM_VIEW, ChatMessage::KIND),
];

/// Record kind behind a list type name. Digits are an instance suffix,
/// e.g. `chat_message_member12` holds `chat_message_member` records.
pub fn record_kind(record_type: &str) -> String {
    record_type.chars().filter(|c| !c.is_ascii_digit()).collect()
}

fn boxed<T: Record>(view: &str, record_type: &str, limit: usize, order: Order) -> Box<dyn ListCache> {
    Box::new(RecordList::<T>::new(view, record_type, limit, order))
}

/// Build a list cache for a record type the model layer knows
pub fn new_list(view: &str, record_type: &str, limit: usize, order: Order) -> AppResult<Box<dyn ListCache>> {
    let list = match record_kind(record_type).as_str() {
        k if k == Member::KIND => boxed::<Member>(view, record_type, limit, order),
        k if k == GroupInvite::KIND => boxed::<GroupInvite>(view, record_type, limit, order),
        k if k == GroupLogItem::KIND => boxed::<GroupLogItem>(view, record_type, limit, order),
        k if k == ChatMessage::KIND => boxed::<ChatMessage>(view, record_type, limit, order),
        k if k == ChatMessageAnswer::KIND => boxed::<ChatMessageAnswer>(view, record_type, limit, order),
        k if k == Invite::KIND => boxed::<Invite>(view, record_type, limit, order),
        k if k == GroupType::KIND => boxed::<GroupType>(view, record_type, limit, order),
        k if k == Group::KIND => boxed::<Group>(view, record_type, limit, order),
        _ => {
            tracing::error!(">>> no record type {} for view {}", record_type, view);
            return Err(AppError::UnknownRecordType(record_type.to_string()));
        }
    };
    Ok(list)
}

/// What a dispatched configuration object touched
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub slots: Vec<AppConfigSlot>,
    pub lists: Vec<(String, String)>,
    pub objects: Vec<String>,
    /// Entries with no registered destination, or rejected by it
    pub skipped: Vec<String>,
}

impl DispatchReport {
    pub fn slot_changed(&self, slot: AppConfigSlot) -> bool {
        self.slots.contains(&slot)
    }

    pub fn list_touched(&self, view: &str, record_type: &str) -> bool {
        self.lists.iter().any(|(v, t)| v == view && t == record_type)
    }
}

/// All list and object caches, keyed by view/type and name
#[derive(Debug, Default)]
pub struct Store {
    lists: BTreeMap<(String, String), Box<dyn ListCache>>,
    objects: BTreeMap<String, ObjectCache>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store with the default views registered
    pub fn with_default_views() -> AppResult<Self> {
        let mut store = Self::new();
        for (view, record_type) in DEFAULT_VIEWS {
            store.serve_list(view, record_type, DEFAULT_LIMIT, Order::default())?;
        }
        Ok(store)
    }

    /// Register a typed list, replacing any list under the same view/type
    pub fn register<T: Record>(&mut self, list: RecordList<T>) {
        let key = (list.view().to_string(), list.record_type().to_string());
        self.lists.insert(key, Box::new(list));
    }

    /// Create and register a list, replacing any list under the same view/type
    pub fn serve_list(
        &mut self,
        view: &str,
        record_type: &str,
        limit: usize,
        order: Order,
    ) -> AppResult<()> {
        let list = new_list(view, record_type, limit, order)?;
        self.lists.insert((view.to_string(), record_type.to_string()), list);
        Ok(())
    }

    pub fn is_registered(&self, view: &str, record_type: &str) -> bool {
        self.lists.contains_key(&(view.to_string(), record_type.to_string()))
    }

    pub fn list_cache(&self, view: &str, record_type: &str) -> Option<&dyn ListCache> {
        self.lists
            .get(&(view.to_string(), record_type.to_string()))
            .map(|list| list.as_ref())
    }

    /// Typed access to a registered list
    pub fn list<T: Record>(&self, view: &str, record_type: &str) -> Option<&RecordList<T>> {
        self.list_cache(view, record_type)?
            .as_any()
            .downcast_ref::<RecordList<T>>()
    }

    /// Mark a list as loading and build the request for its next page.
    /// `None` if the list is unknown or the server has nothing further.
    pub fn request_page(&mut self, view: &str, record_type: &str) -> Option<Value> {
        let list = self.lists.get_mut(&(view.to_string(), record_type.to_string()))?;
        if !list.has_more() {
            tracing::debug!("{}/{} has no more pages", view, record_type);
            return None;
        }
        tracing::info!(">>> getting more of {}/{}", view, record_type);
        list.set_loading(true);
        Some(list.page_request())
    }

    /// Register a named object. Returns its `get_object` request when it is new.
    pub fn serve_object(&mut self, name: &str) -> Option<Value> {
        if self.objects.contains_key(name) {
            return None;
        }
        let cache = ObjectCache::new(name);
        let request = cache.load_request();
        self.objects.insert(name.to_string(), cache);
        Some(request)
    }

    pub fn object(&self, name: &str) -> Option<&ObjectCache> {
        self.objects.get(name)
    }

    /// Register answer lists for newly seen chat questions and return the
    /// page requests to fetch them.
    pub fn serve_answers(&mut self) -> Vec<Value> {
        let pending: Vec<String> = self
            .list::<ChatMessage>(CHAT_ROOM_VIEW, ChatMessage::KIND)
            .map(|list| {
                list.records()
                    .iter()
                    .filter(|m| m.is_question())
                    .map(ChatMessage::answers_type)
                    .filter(|t| !self.is_registered(CHAT_ROOM_VIEW, t))
                    .collect()
            })
            .unwrap_or_default();

        pending
            .into_iter()
            .filter_map(|record_type| {
                self.register(RecordList::<ChatMessageAnswer>::new(
                    CHAT_ROOM_VIEW,
                    record_type.as_str(),
                    DEFAULT_LIMIT,
                    Order::asc("created"),
                ));
                self.request_page(CHAT_ROOM_VIEW, &record_type)
            })
            .collect()
    }

    /// Route one configuration object to app-config slots, object caches
    /// and list caches.
    pub fn dispatch(&mut self, config: &Value, state: &mut AppState) -> AppResult<DispatchReport> {
        let config = config
            .as_object()
            .ok_or_else(|| AppError::Malformed("configuration is not an object".into()))?;
        tracing::debug!("dispatching message...");

        let mut report = DispatchReport::default();
        for (name, value) in config {
            if let Some(slot) = AppConfigSlot::from_name(name) {
                tracing::debug!("sending appconfig property {} to define", name);
                match state.define(slot, value) {
                    Ok(()) => report.slots.push(slot),
                    Err(e) => {
                        tracing::error!("could not define {}: {}", name, e);
                        report.skipped.push(name.clone());
                    }
                }
                continue;
            }

            if let Some(object) = self.objects.get_mut(name) {
                object.apply(value);
                report.objects.push(name.clone());
                continue;
            }

            let Some(types) = value.as_object() else {
                tracing::warn!("Could not dispatch {}: not a view", name);
                report.skipped.push(name.clone());
                continue;
            };
            for (record_type, payload) in types {
                let key = (name.clone(), record_type.clone());
                let Some(list) = self.lists.get_mut(&key) else {
                    tracing::warn!("Could not register ViewType: {}/{}", name, record_type);
                    report.skipped.push(format!("{}/{}", name, record_type));
                    continue;
                };
                match list.apply(payload) {
                    Ok(_) => report.lists.push(key),
                    Err(e) => {
                        tracing::error!("{}/{} rejected update: {}", name, record_type, e);
                        report.skipped.push(format!("{}/{}", name, record_type));
                    }
                }
            }
        }
        Ok(report)
    }

    /// Empty every list so it reloads from the first page
    pub fn reset(&mut self) {
        for list in self.lists.values_mut() {
            list.reset();
        }
    }

    /// Reset every list and drop every object
    pub fn clear(&mut self) {
        self.reset();
        self.objects.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> Store {
        Store::with_default_views().unwrap()
    }

    #[test]
    fn test_default_views_registered() {
        let store = store();
        for (view, record_type) in DEFAULT_VIEWS {
            assert!(store.is_registered(view, record_type), "{}/{}", view, record_type);
        }
        let list = store.list::<Member>(GROUP_VIEW, "member").unwrap();
        assert_eq!(list.limit(), 20);
        assert_eq!(list.order(), &Order::desc("created"));
        // wrong type does not downcast
        assert!(store.list::<Invite>(GROUP_VIEW, "member").is_none());
    }

    #[test]
    fn test_unknown_record_type() {
        let mut store = store();
        let err = store.serve_list("garage", "bicycle", 10, Order::default()).unwrap_err();
        assert!(matches!(err, AppError::UnknownRecordType(ref t) if t == "bicycle"));
        // numbered instances resolve to their kind
        assert!(store
            .serve_list(CHAT_ROOM_VIEW, "chat_message_member12", 10, Order::asc("created"))
            .is_ok());
    }

    #[test]
    fn test_dispatch_routes_slots_objects_and_lists() {
        let mut store = store();
        let mut state = AppState::new();
        assert!(store.serve_object("house_rules").is_some());
        assert!(store.serve_object("house_rules").is_none());

        let report = store
            .dispatch(
                &json!({
                    "CurrentGroup": {"group_id": 9, "group_token": "g-token"},
                    "house_rules": {"pets": true},
                    "chat_room": {
                        "chat_message": [{"chat_message_id": 1, "chat_message": "hello"}],
                        "chat_sticker": [{"id": 1}]
                    },
                    "attic": {"box": {}}
                }),
                &mut state,
            )
            .unwrap();

        assert!(report.slot_changed(AppConfigSlot::CurrentGroup));
        assert_eq!(state.group_token(), Some("g-token"));
        assert_eq!(report.objects, vec!["house_rules".to_string()]);
        assert_eq!(store.object("house_rules").unwrap().object(), Some(&json!({"pets": true})));
        assert!(report.list_touched(CHAT_ROOM_VIEW, "chat_message"));
        assert_eq!(
            report.skipped,
            vec!["attic/box".to_string(), "chat_room/chat_sticker".to_string()]
        );
        let messages = store.list::<ChatMessage>(CHAT_ROOM_VIEW, "chat_message").unwrap();
        assert_eq!(messages.records()[0].chat_message, "hello");
    }

    #[test]
    fn test_null_slot_clears() {
        let mut store = store();
        let mut state = AppState::new();
        store
            .dispatch(&json!({"CurrentMember": {"member_id": 2, "member_token": "m"}}), &mut state)
            .unwrap();
        assert_eq!(state.member_token(), Some("m"));
        let report = store.dispatch(&json!({"CurrentMember": null}), &mut state).unwrap();
        assert!(report.slot_changed(AppConfigSlot::CurrentMember));
        assert!(state.current_member.is_none());
    }

    #[test]
    fn test_request_page_and_reset() {
        let mut store = store();
        let request = store.request_page(DOORSTEP_VIEW, "group").unwrap();
        assert_eq!(request["config"]["doorstep"]["group"]["offset"], 0);
        assert!(store.list_cache(DOORSTEP_VIEW, "group").unwrap().is_loading());

        let mut state = AppState::new();
        store
            .dispatch(&json!({"doorstep": {"group": [{"group_id": 1}]}}), &mut state)
            .unwrap();
        // short page: nothing further to fetch until reset
        assert!(store.request_page(DOORSTEP_VIEW, "group").is_none());
        assert!(store.request_page("nowhere", "group").is_none());

        store.reset();
        assert!(store.list_cache(DOORSTEP_VIEW, "group").unwrap().is_empty());
        assert!(store.request_page(DOORSTEP_VIEW, "group").is_some());
    }

    #[test]
    fn test_serve_answers_for_questions() {
        let mut store = store();
        let mut state = AppState::new();
        store
            .dispatch(
                &json!({"chat_room": {"chat_message": [
                    {"chat_message_id": 5, "chat_message": "Pizza tonight?", "yes_no": 1},
                    {"chat_message_id": 6, "chat_message": "ok"}
                ]}}),
                &mut state,
            )
            .unwrap();

        let requests = store.serve_answers();
        assert_eq!(requests.len(), 1);
        assert_eq!(
            requests[0]["config"]["chat_room"]["chat_message_member5"]["order"],
            json!(["created", "ASC"])
        );
        assert!(store.serve_answers().is_empty());

        store
            .dispatch(
                &json!({"chat_room": {"chat_message_member5": {"member_id": 2, "yes_no": true}}}),
                &mut state,
            )
            .unwrap();
        let answers = store
            .list::<ChatMessageAnswer>(CHAT_ROOM_VIEW, "chat_message_member5")
            .unwrap();
        assert_eq!(answers.records()[0].yes_no, Some(true));
    }

    #[test]
    fn test_clear_drops_objects() {
        let mut store = store();
        store.serve_object("house_rules");
        store.clear();
        assert!(store.object("house_rules").is_none());
    }
}
