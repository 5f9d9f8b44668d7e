mod connection;
mod helpers;
mod live;
mod migrations;
pub mod models;
mod repositories;
mod store;

pub use connection::Database;
pub use live::{NightsSnapshot, NightsStream};
pub use models::{NightSummary, SessionRecord, SleepQuality, QUALITY_UNSET};
pub use store::SessionStore;
