pub mod night;

pub use night::{NightSummary, SessionRecord, SleepQuality, QUALITY_UNSET};
