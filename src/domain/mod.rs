//! Domain layer: events, mappings, connections, remote events, suggestions,
//! sync reports, and the per-user sync lock registry.
//!
//! Everything here is plain data plus pure guard logic; I/O lives in
//! `persistence`, `provider`, and `suggestions`.

pub mod connection;
pub mod event;
pub mod ids;
pub mod mapping;
pub mod remote_event;
pub mod suggestion;
pub mod sync_report;
pub mod user_locks;

pub use connection::{CalendarConnection, ConnectionSettings, SyncOutcome, SyncWindow};
pub use event::{Event, EventFields, EventSource, NewEvent, Visibility};
pub use ids::{EventId, UserId};
pub use mapping::EventMapping;
pub use remote_event::{RemoteEvent, RemoteEventBody, RemoteStatus, RemoteTime};
pub use suggestion::{
    Confidence, OpenState, SlotWindow, Suggestion, SuggestionQuery, SuggestionSource,
};
pub use sync_report::{PullReport, PushReport, SyncReport};
pub use user_locks::UserLocks;
