use chrono::{DateTime, Local, Utc};
use futures_util::StreamExt;

use crate::{
    db::{NightSummary, SessionRecord},
    error::Error,
    tracker::Transition,
    AppState,
};

fn local_time(at: Option<DateTime<Utc>>) -> String {
    at.map(|dt| dt.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "?".into())
}

fn format_duration(duration_ms: i64) -> String {
    let minutes = duration_ms.max(0) / 60_000;
    format!("{}h{:02}m", minutes / 60, minutes % 60)
}

pub fn format_night(night: &NightSummary) -> String {
    let quality = night.quality.map(|q| q.as_str()).unwrap_or("unrated");
    if night.open {
        format!("#{} {} -> (open) {}", night.id, local_time(night.started_at), quality)
    } else {
        format!(
            "#{} {} -> {} {} {}",
            night.id,
            local_time(night.started_at),
            local_time(night.ended_at),
            format_duration(night.duration_ms),
            quality
        )
    }
}

fn describe(record: &SessionRecord) -> String {
    format_night(&NightSummary::from(record))
}

pub async fn start_tracking(state: &AppState) -> Result<String, String> {
    let outcome = state.tracker.start().await.map_err(|e| e.to_string())?;
    let current = state.tracker.current_session();
    Ok(match (outcome, current) {
        (Transition::Applied, Some(night)) => format!("Started {}", describe(&night)),
        (Transition::Ignored, Some(night)) => format!("Already tracking {}", describe(&night)),
        (_, None) => "No night is being tracked".to_string(),
    })
}

pub async fn stop_tracking(state: &AppState) -> Result<String, String> {
    let open_before = state.tracker.current_session();
    let outcome = state.tracker.stop().await.map_err(|e| e.to_string())?;
    match (outcome, open_before) {
        (Transition::Applied, Some(night)) => {
            let stored = state
                .db
                .get_night(night.id)
                .await
                .map_err(|e| e.to_string())?
                .unwrap_or(night);
            Ok(format!("Stopped {}", describe(&stored)))
        }
        _ => Ok("No night is being tracked".to_string()),
    }
}

pub async fn rate_night(state: &AppState, value: i32) -> Result<String, String> {
    match state.tracker.set_quality(value).await {
        Ok(Transition::Applied) => Ok(state
            .tracker
            .current_session()
            .map(|night| format!("Rated {}", describe(&night)))
            .unwrap_or_else(|| "Rated".to_string())),
        Ok(Transition::Ignored) => Ok("No night is being tracked".to_string()),
        Err(Error::InvalidQuality(value)) => Err(format!("quality must be 0-5, got {value}")),
        Err(err) => Err(err.to_string()),
    }
}

pub async fn clear_nights(state: &AppState) -> Result<String, String> {
    state.tracker.reset().await.map_err(|e| e.to_string())?;
    Ok("All nights cleared".to_string())
}

pub fn tracker_status(state: &AppState) -> String {
    match state.tracker.current_session() {
        Some(night) => format!("Tracking {}", describe(&night)),
        None => "Idle".to_string(),
    }
}

/// First history snapshot, trimmed to the configured row limit.
pub async fn list_nights(state: &AppState) -> Result<Vec<String>, String> {
    let limit = state.settings.settings().history_limit;
    let mut history = state
        .tracker
        .history_summaries()
        .await
        .map_err(|e| e.to_string())?;

    let nights = history.next().await.unwrap_or_default();
    Ok(nights.iter().take(limit).map(format_night).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db::Database, settings::SettingsStore, tracker::SessionCoordinator};

    fn app_state(dir: &tempfile::TempDir) -> AppState {
        let db = Database::in_memory().unwrap();
        AppState {
            tracker: SessionCoordinator::new(db.clone()),
            db,
            settings: SettingsStore::new(dir.path().join("settings.json")).unwrap(),
        }
    }

    #[test]
    fn formats_durations_as_hours_and_minutes() {
        assert_eq!(format_duration(0), "0h00m");
        assert_eq!(format_duration(8 * 3_600_000 + 5 * 60_000), "8h05m");
        assert_eq!(format_duration(-10), "0h00m");
    }

    #[test]
    fn open_night_is_marked() {
        let summary = NightSummary::from(&SessionRecord {
            id: 2,
            ..SessionRecord::begin(1_700_000_000_000)
        });
        let line = format_night(&summary);
        assert!(line.starts_with("#2 "));
        assert!(line.contains("(open)"));
        assert!(line.ends_with("unrated"));
    }

    #[tokio::test]
    async fn command_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let state = app_state(&dir);
        state.tracker.initialize().await.unwrap();

        assert_eq!(tracker_status(&state), "Idle");
        assert!(start_tracking(&state).await.unwrap().starts_with("Started #"));
        assert!(start_tracking(&state).await.unwrap().starts_with("Already tracking"));
        assert!(rate_night(&state, 5).await.unwrap().contains("Excellent"));
        assert!(rate_night(&state, 7).await.is_err());
        assert!(stop_tracking(&state).await.unwrap().starts_with("Stopped #"));
        assert_eq!(stop_tracking(&state).await.unwrap(), "No night is being tracked");

        let rows = list_nights(&state).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].contains("Excellent"));

        clear_nights(&state).await.unwrap();
        assert!(list_nights(&state).await.unwrap().is_empty());
    }
}
