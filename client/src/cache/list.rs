//! Paged record lists
//!
//! A [`RecordList`] mirrors one server list, e.g. the chat messages of the
//! `chat_room` view. Pages are fetched with `get_list` and merged by primary
//! key as they arrive.

use std::any::Any;
use std::fmt;

use serde::{Serialize, Serializer};
use serde_json::{json, Value};

use crate::error::{AppError, AppResult};
use crate::models::{Record, RecordKey};

/// Page size used by the default views
pub const DEFAULT_LIMIT: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

/// Sort order sent with each page request, `[field, ASC|DESC]` on the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub field: String,
    pub direction: Direction,
}

impl Order {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Desc,
        }
    }
}

impl Default for Order {
    fn default() -> Self {
        Self::desc("created")
    }
}

impl Serialize for Order {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        (&self.field, self.direction.as_str()).serialize(serializer)
    }
}

/// What one update did to a list
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub updated: usize,
    pub appended: usize,
    pub rejected: usize,
}

impl ApplyReport {
    pub fn changed(&self) -> bool {
        self.updated + self.appended > 0
    }
}

/// Type-erased view of a list cache, as kept by the [`crate::cache::Store`]
pub trait ListCache: Send + Sync + fmt::Debug {
    fn view(&self) -> &str;

    fn record_type(&self) -> &str;

    /// Merge a single record or an array of records
    fn apply(&mut self, payload: &Value) -> AppResult<ApplyReport>;

    /// Drop every record and start again from the first page
    fn reset(&mut self);

    /// `get_list` argument for the next page
    fn page_request(&self) -> Value;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn has_more(&self) -> bool;

    fn is_loading(&self) -> bool;

    fn set_loading(&mut self, loading: bool);

    fn as_any(&self) -> &dyn Any;
}

/// Ordered list of records of one type
#[derive(Debug, Clone)]
pub struct RecordList<T: Record> {
    view: String,
    record_type: String,
    offset: usize,
    limit: usize,
    order: Order,
    has_more: bool,
    loading: bool,
    records: Vec<T>,
}

impl<T: Record> RecordList<T> {
    pub fn new(view: impl Into<String>, record_type: impl Into<String>, limit: usize, order: Order) -> Self {
        Self {
            view: view.into(),
            record_type: record_type.into(),
            offset: 0,
            limit,
            order,
            has_more: true,
            loading: true,
            records: Vec::new(),
        }
    }

    pub fn records(&self) -> &[T] {
        &self.records
    }

    pub fn get(&self, key: &RecordKey) -> Option<&T> {
        self.records.iter().find(|r| r.key() == *key)
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn order(&self) -> &Order {
        &self.order
    }

    /// Merge one record payload, appending it if its key is new
    fn apply_one(&mut self, payload: &Value, report: &mut ApplyReport) {
        let existing = T::key_of(payload)
            .and_then(|key| self.records.iter().position(|r| r.key() == key));

        match existing {
            Some(idx) => match self.records[idx].merge(payload) {
                Ok(()) => report.updated += 1,
                Err(e) => {
                    tracing::warn!("rejected update for {}/{}: {}", self.view, self.record_type, e);
                    report.rejected += 1;
                }
            },
            None => match T::from_payload(payload) {
                Ok(record) => {
                    self.records.push(record);
                    report.appended += 1;
                }
                Err(e) => {
                    tracing::warn!("rejected record for {}/{}: {}", self.view, self.record_type, e);
                    report.rejected += 1;
                }
            },
        }
    }
}

impl<T: Record> ListCache for RecordList<T> {
    fn view(&self) -> &str {
        &self.view
    }

    fn record_type(&self) -> &str {
        &self.record_type
    }

    fn apply(&mut self, payload: &Value) -> AppResult<ApplyReport> {
        let mut report = ApplyReport::default();
        match payload {
            Value::Array(items) => {
                for item in items {
                    self.apply_one(item, &mut report);
                }
                // a short page means the server has nothing further
                if items.len() < self.limit {
                    self.has_more = false;
                }
            }
            Value::Object(_) => self.apply_one(payload, &mut report),
            other => {
                return Err(AppError::Malformed(format!(
                    "{}/{} update is neither a record nor a list: {}",
                    self.view, self.record_type, other
                )))
            }
        }
        self.offset += report.appended;
        self.loading = false;
        tracing::debug!(
            "{}/{}: {} updated, {} appended, {} rejected",
            self.view,
            self.record_type,
            report.updated,
            report.appended,
            report.rejected
        );
        Ok(report)
    }

    fn reset(&mut self) {
        self.offset = 0;
        self.has_more = true;
        self.records.clear();
    }

    fn page_request(&self) -> Value {
        json!({
            "config": {
                self.view.as_str(): {
                    self.record_type.as_str(): {
                        "offset": self.offset,
                        "limit": self.limit,
                        "order": self.order,
                    }
                }
            }
        })
    }

    fn len(&self) -> usize {
        self.records.len()
    }

    fn has_more(&self) -> bool {
        self.has_more
    }

    fn is_loading(&self) -> bool {
        self.loading
    }

    fn set_loading(&mut self, loading: bool) {
        self.loading = loading;
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChatMessage, Member};

    fn messages() -> RecordList<ChatMessage> {
        RecordList::new("chat_room", "chat_message", 3, Order::default())
    }

    #[test]
    fn test_page_request_shape() {
        let list = messages();
        assert_eq!(
            list.page_request(),
            json!({"config": {"chat_room": {"chat_message": {
                "offset": 0, "limit": 3, "order": ["created", "DESC"]
            }}}})
        );
    }

    #[test]
    fn test_string_key_updates_numeric_record() {
        let mut list: RecordList<Member> = RecordList::new("group", "member", 20, Order::default());
        list.apply(&json!({"member_id": 7, "workload": 1})).unwrap();
        let report = list.apply(&json!({"member_id": "7", "workload": 2})).unwrap();

        assert_eq!(report, ApplyReport { updated: 1, appended: 0, rejected: 0 });
        assert_eq!(list.get(&RecordKey::from(7)).unwrap().workload, Some(2));

        let report = list.apply(&json!({"member_id": "8"})).unwrap();
        assert_eq!(report.appended, 1);
    }

    #[test]
    fn test_second_update_merges_by_primary_key() {
        let mut list: RecordList<Member> = RecordList::new("group", "member", 20, Order::default());
        list.apply(&json!({"member_id": 4, "contact_name": "Ana", "workload": 2}))
            .unwrap();
        let report = list
            .apply(&json!({"member_id": 4, "workload": 5, "hair_colour": "red"}))
            .unwrap();

        assert_eq!(report, ApplyReport { updated: 1, appended: 0, rejected: 0 });
        assert_eq!(list.len(), 1);
        let member = list.get(&RecordKey::from(4)).unwrap();
        assert_eq!(member.workload, Some(5));
        assert_eq!(member.contact_name.as_deref(), Some("Ana"));
    }

    #[test]
    fn test_pages_advance_offset_until_short_page() {
        let mut list = messages();
        list.apply(&json!([
            {"chat_message_id": 1, "chat_message": "a"},
            {"chat_message_id": 2, "chat_message": "b"},
            {"chat_message_id": 3, "chat_message": "c"}
        ]))
        .unwrap();
        assert_eq!(list.offset(), 3);
        assert!(list.has_more());
        assert!(!list.is_loading());

        // one known record, one new: only the new one moves the offset
        let report = list
            .apply(&json!([
                {"chat_message_id": 3, "chat_message": "c!"},
                {"chat_message_id": 4, "chat_message": "d"}
            ]))
            .unwrap();
        assert_eq!(report, ApplyReport { updated: 1, appended: 1, rejected: 0 });
        assert_eq!(list.offset(), 4);
        assert!(!list.has_more());
        assert_eq!(list.records()[2].chat_message, "c!");
        assert_eq!(list.page_request()["config"]["chat_room"]["chat_message"]["offset"], 4);
    }

    #[test]
    fn test_bad_records_are_rejected_individually() {
        let mut list = messages();
        list.apply(&json!({"chat_message_id": 1, "chat_message": "hi"})).unwrap();
        let report = list
            .apply(&json!([
                {"chat_message": "no key"},
                {"chat_message_id": 1, "chat_message": 17},
                {"chat_message_id": 2, "chat_message": "ok"}
            ]))
            .unwrap();
        assert_eq!(report, ApplyReport { updated: 0, appended: 1, rejected: 2 });
        assert_eq!(list.records()[0].chat_message, "hi");
        assert!(list.apply(&json!("nonsense")).is_err());
    }

    #[test]
    fn test_reset() {
        let mut list = messages();
        list.apply(&json!([{"chat_message_id": 1}])).unwrap();
        assert!(!list.has_more());
        list.reset();
        assert!(list.is_empty());
        assert_eq!(list.offset(), 0);
        assert!(list.has_more());
    }
}
