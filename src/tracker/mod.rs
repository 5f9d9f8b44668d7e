pub(crate) mod commands;
pub mod coordinator;
pub mod state;

pub use coordinator::{Clock, CommandReceipt, SessionCoordinator, SystemClock, Transition};
pub use state::{open_session, TrackerState, TrackerStatus};
