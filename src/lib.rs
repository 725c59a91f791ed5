//! # koda-gateway
//!
//! Backend services of the Koda social calendar: a bidirectional calendar
//! sync engine with loop prevention, and a suggestion pipeline that merges
//! ticketed events and OpenStreetMap places into a deduplicated list.
//!
//! ## Architecture
//!
//! ```text
//! Clients (HTTP)            SyncScheduler (interval)
//!     │                          │
//!     ├── REST Handlers (api/)   │
//!     │                          │
//!     ├── SyncService ◄──────────┘      SuggestionService
//!     │     ├── UserLocks                 ├── ranking (pure)
//!     │     ├── CalendarProvider          ├── CachedFetcher
//!     │     │     └── Google Calendar     │     ├── Ticketmaster
//!     │     └── CalendarStore             │     └── Nominatim + Overpass
//!     │           ├── PostgreSQL          └── SuggestionCache
//!     │           └── in-memory                 ├── in-memory
//!     │                                         └── KeyValueStore
//! ```

pub mod api;
pub mod app_state;
pub mod config;
pub mod domain;
pub mod error;
pub mod persistence;
pub mod provider;
pub mod scheduler;
pub mod service;
pub mod suggestions;
