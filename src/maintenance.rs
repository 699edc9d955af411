use std::sync::Arc;
use std::time::Duration;

use chrono::{Days, NaiveDate, Utc};
use tracing::{info, warn};

use crate::engine::Engine;
use crate::store::MemoryStore;

/// Compact the WAL once it has grown past `threshold` appends.
/// Returns whether a compaction ran.
pub async fn compact_if_needed(store: &MemoryStore, threshold: u64) -> bool {
    let appends = store.wal_appends_since_compact().await;
    if appends < threshold {
        return false;
    }
    match store.compact().await {
        Ok(()) => {
            info!(appends, "WAL compacted");
            true
        }
        Err(e) => {
            warn!("WAL compaction failed: {e}");
            false
        }
    }
}

/// Shortest tick the background loops accept; `tokio::time::interval` panics on zero.
const MIN_TICK: Duration = Duration::from_secs(1);

pub async fn run_compactor(store: Arc<MemoryStore>, threshold: u64, every: Duration) {
    let mut interval = tokio::time::interval(every.max(MIN_TICK));
    loop {
        interval.tick().await;
        compact_if_needed(&store, threshold).await;
    }
}

/// Tracks which date reminders already went out for, so a restart of the
/// tick inside the same day does not send twice.
#[derive(Debug, Default)]
pub struct ReminderCursor {
    last_sent: Option<NaiveDate>,
}

impl ReminderCursor {
    /// Send reminders for `today + lead_days` unless already done.
    pub async fn tick(
        &mut self,
        engine: &Engine,
        today: NaiveDate,
        lead_days: u64,
    ) -> Option<usize> {
        let Some(target) = today.checked_add_days(Days::new(lead_days)) else {
            warn!(%today, lead_days, "reminder date out of range");
            return None;
        };
        if self.last_sent == Some(target) {
            return None;
        }
        match engine.send_day_reminders(target).await {
            Ok(sent) => {
                self.last_sent = Some(target);
                Some(sent)
            }
            Err(e) => {
                warn!(date = %target, "day reminders failed: {e}");
                None
            }
        }
    }
}

pub async fn run_reminders(engine: Arc<Engine>, lead_days: u64, every: Duration) {
    let mut interval = tokio::time::interval(every.max(MIN_TICK));
    let mut cursor = ReminderCursor::default();
    loop {
        interval.tick().await;
        cursor
            .tick(&engine, Utc::now().date_naive(), lead_days)
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    use chrono::NaiveTime;
    use ulid::Ulid;

    use crate::engine::NewDay;
    use crate::model::*;
    use crate::notify::NotifyHub;
    use crate::store::Store;

    fn test_wal_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("crewplan_test_maintenance");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    #[tokio::test]
    async fn compactor_waits_for_threshold() {
        let path = test_wal_path("threshold.wal");
        let store = MemoryStore::open(&path).unwrap();
        let project = Project {
            id: Ulid::new(),
            client_name: "Acme".into(),
            start_date: None,
            end_date: None,
            schedule_status: "planned".into(),
        };
        store.save_project(project.clone()).await.unwrap();
        store.save_project(project).await.unwrap();

        assert!(!compact_if_needed(&store, 3).await);
        assert!(compact_if_needed(&store, 2).await);
        assert_eq!(store.wal_appends_since_compact().await, 0);
    }

    #[tokio::test]
    async fn reminder_cursor_sends_once_per_date() {
        let hub = Arc::new(NotifyHub::new());
        let mut rx = hub.subscribe();
        let engine = Engine::new(Arc::new(MemoryStore::new()), hub.clone());

        let today = NaiveDate::from_ymd_opt(2024, 6, 9).unwrap();
        let tomorrow = today.succ_opt().unwrap();
        let project = Project {
            id: Ulid::new(),
            client_name: "Acme".into(),
            start_date: Some(today),
            end_date: Some(tomorrow),
            schedule_status: "active".into(),
        };
        engine.save_project(project.clone()).await.unwrap();
        let created = engine
            .create_assignment(project.id, Ulid::new(), Some(BookingStatus::Confirmed), None)
            .await
            .unwrap();
        let _ = rx.recv().await.unwrap(); // assignment_created
        engine
            .add_days(
                created.assignment.id,
                vec![NewDay {
                    date: tomorrow,
                    start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
                    end_time: NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
                }],
            )
            .await
            .unwrap();

        let mut cursor = ReminderCursor::default();
        assert_eq!(cursor.tick(&engine, today, 1).await, Some(1));
        assert_eq!(cursor.tick(&engine, today, 1).await, None);

        let reminder = rx.recv().await.unwrap();
        assert_eq!(reminder.template, TemplateKind::DayReminder);
        assert_eq!(reminder.params["work_date"], "2024-06-10");
        assert_eq!(reminder.params["start_time"], "09:00");
    }

    #[tokio::test]
    async fn reminder_lead_past_calendar_end_is_skipped() {
        let engine = Engine::new(Arc::new(MemoryStore::new()), Arc::new(NotifyHub::new()));
        let mut cursor = ReminderCursor::default();
        let today = NaiveDate::from_ymd_opt(2024, 6, 9).unwrap();
        assert_eq!(cursor.tick(&engine, today, u64::MAX).await, None);
        assert_eq!(cursor.tick(&engine, NaiveDate::MAX, 1).await, None);
        assert_eq!(cursor.tick(&engine, today, 0).await, Some(0));
    }

    #[tokio::test]
    async fn zero_interval_compactor_keeps_running() {
        let store = Arc::new(MemoryStore::new());
        let task = tokio::spawn(run_compactor(store, 1000, Duration::ZERO));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!task.is_finished());
        task.abort();
    }
}
