//! Live query plumbing for the full night history.
//!
//! The registry lives on the DB worker thread. Subscriptions and publishes are queued
//! behind the same channel as the writes, so every subscriber sees snapshots in commit
//! order and the initial snapshot can never miss a write.

use std::{
    pin::Pin,
    task::{Context, Poll},
};

use anyhow::Result;
use futures_core::Stream;
use rusqlite::Connection;
use tokio::sync::mpsc;

use crate::db::{models::SessionRecord, repositories::nights::select_all_nights};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error};

/// Every night in the store, newest (highest id) first.
pub type NightsSnapshot = Vec<SessionRecord>;

pub(crate) struct LiveQueries {
    subscribers: Vec<mpsc::UnboundedSender<NightsSnapshot>>,
}

impl LiveQueries {
    pub fn new() -> Self {
        Self {
            subscribers: Vec::new(),
        }
    }

    pub fn subscribe(
        &mut self,
        conn: &Connection,
        sender: mpsc::UnboundedSender<NightsSnapshot>,
    ) -> Result<()> {
        let snapshot = select_all_nights(conn)?;
        if sender.send(snapshot).is_ok() {
            self.subscribers.push(sender);
            log_debug!("Live query subscriber added ({} active)", self.subscribers.len());
        }
        Ok(())
    }

    /// Re-evaluates the history query and pushes it to every live subscriber.
    pub fn publish(&mut self, conn: &Connection) {
        self.subscribers.retain(|tx| !tx.is_closed());
        if self.subscribers.is_empty() {
            return;
        }

        match select_all_nights(conn) {
            Ok(snapshot) => {
                self.subscribers
                    .retain(|tx| tx.send(snapshot.clone()).is_ok());
            }
            Err(err) => {
                log_error!("Failed to re-evaluate night history for subscribers: {err:#}");
            }
        }
    }

    /// Subscribers whose stream is still alive.
    pub fn active_count(&mut self) -> usize {
        self.subscribers.retain(|tx| !tx.is_closed());
        self.subscribers.len()
    }
}

/// Infinite stream of history snapshots. Each item replaces the previous one.
///
/// Only ends once the owning [`Database`](crate::db::Database) has shut down.
pub struct NightsStream {
    receiver: mpsc::UnboundedReceiver<NightsSnapshot>,
}

impl NightsStream {
    pub(crate) fn new(receiver: mpsc::UnboundedReceiver<NightsSnapshot>) -> Self {
        Self { receiver }
    }

    pub async fn next(&mut self) -> Option<NightsSnapshot> {
        self.receiver.recv().await
    }
}

impl Stream for NightsStream {
    type Item = NightsSnapshot;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().receiver.poll_recv(cx)
    }
}
