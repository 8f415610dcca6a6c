//! Client-side record cache
//!
//! Lists and named objects reconciled by primary key as server updates
//! arrive.

mod list;
mod object;
mod store;

use std::sync::Arc;

use tokio::sync::RwLock;

pub use list::{ApplyReport, Direction, ListCache, Order, RecordList, DEFAULT_LIMIT};
pub use object::ObjectCache;
pub use store::{
    new_list, record_kind, DispatchReport, Store, CHAT_ROOM_VIEW, DEFAULT_VIEWS, DOORSTEP_VIEW, GROUP_LOG_VIEW,
    GROUP_VIEW, GROUP_VIEWS, USER_VIEWS,
};

/// Store shared between the session task and the host
pub type SharedStore = Arc<RwLock<Store>>;
