use serde::{Deserialize, Serialize};

use crate::db::SessionRecord;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum TrackerStatus {
    #[default]
    Idle,
    Tracking,
}

/// Only the newest night is ever considered for resumption; older open rows are ignored.
pub fn open_session(tonight: Option<SessionRecord>) -> Option<SessionRecord> {
    tonight.filter(SessionRecord::is_open)
}

/// Coordinator-owned view of which night, if any, is open.
///
/// `synced` is false until the state has been derived from the store, and again after a
/// failed command left it unknown.
#[derive(Debug, Clone, Default)]
pub struct TrackerState {
    current: Option<SessionRecord>,
    synced: bool,
}

impl TrackerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<&SessionRecord> {
        self.current.as_ref()
    }

    pub fn status(&self) -> TrackerStatus {
        match self.current {
            Some(_) => TrackerStatus::Tracking,
            None => TrackerStatus::Idle,
        }
    }

    pub fn is_synced(&self) -> bool {
        self.synced
    }

    pub fn adopt_tonight(&mut self, tonight: Option<SessionRecord>) {
        self.current = open_session(tonight);
        self.synced = true;
    }

    /// Replaces the current night after a write the store has acknowledged.
    pub fn replace_current(&mut self, night: SessionRecord) {
        self.current = Some(night);
    }

    pub fn clear(&mut self) {
        self.current = None;
        self.synced = true;
    }

    pub fn invalidate(&mut self) {
        self.current = None;
        self.synced = false;
    }
}
