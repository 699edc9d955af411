use std::collections::BTreeMap;
use std::io;
use std::path::Path;

use async_trait::async_trait;
use chrono::NaiveDate;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::{RwLock, mpsc, oneshot};
use tracing::info;

use crate::model::*;
use crate::wal::Wal;

use super::{Store, StoreError};

// ── Group-commit WAL channel ─────────────────────────────

enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Drain every Append already queued (the batch window).
/// 3. One flush_sync for the whole batch, then answer every sender.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let (event, response) = match cmd {
            WalCommand::Append { event, response } => (event, response),
            other => {
                handle_command(&mut wal, other);
                continue;
            }
        };

        let mut batch = vec![(event, response)];
        let mut deferred = None;
        loop {
            match rx.try_recv() {
                Ok(WalCommand::Append { event, response }) => batch.push((event, response)),
                Ok(other) => {
                    deferred = Some(other);
                    break;
                }
                Err(_) => break,
            }
        }

        metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
        let flush_start = std::time::Instant::now();
        let result = flush_batch(&mut wal, &batch);
        metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
            .record(flush_start.elapsed().as_secs_f64());
        for (_, tx) in batch {
            let r = match &result {
                Ok(()) => Ok(()),
                Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
            };
            let _ = tx.send(r);
        }

        if let Some(cmd) = deferred {
            handle_command(&mut wal, cmd);
        }
    }
}

fn flush_batch(wal: &mut Wal, batch: &[(Event, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
    let append_result = batch
        .iter()
        .try_for_each(|(event, _)| wal.append_buffered(event));
    // Flush even after a failed append so half-written bytes don't leak into the next batch.
    let flush_result = wal.flush_sync();
    append_result.and(flush_result)
}

fn handle_command(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result =
                Wal::write_compact_file(wal.path(), &events).and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { event, response } => {
            let result = wal.append_buffered(&event).and_then(|()| wal.flush_sync());
            let _ = response.send(result);
        }
    }
}

/// DashMap-backed store. Optionally durable through a WAL.
///
/// Every mutation is written to the WAL (when present) before it is applied
/// in memory, so a crash never exposes state that replay would not rebuild.
pub struct MemoryStore {
    projects: DashMap<ProjectId, Project>,
    assignments: DashMap<AssignmentId, Assignment>,
    /// (project, user) → the single active assignment for the pair.
    active_pairs: DashMap<(ProjectId, UserId), AssignmentId>,
    days: DashMap<DayId, AssignmentDay>,
    /// assignment → work_date → day
    day_index: DashMap<AssignmentId, BTreeMap<NaiveDate, DayId>>,
    /// (user, work_date) → days across all of the user's assignments
    user_dates: DashMap<(UserId, NaiveDate), Vec<DayId>>,
    exclusions: DashMap<AssignmentId, BTreeMap<NaiveDate, ExcludedDate>>,
    conflicts: DashMap<ConflictId, BookingConflict>,
    confirmations: DashMap<RequestId, ConfirmationRequest>,
    wal_tx: Option<mpsc::Sender<WalCommand>>,
    /// Writers hold it shared from WAL append through apply; compaction holds
    /// it exclusively so its snapshot never misses an acknowledged append.
    compact_gate: RwLock<()>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Volatile store, nothing is written to disk.
    pub fn new() -> Self {
        Self {
            projects: DashMap::new(),
            assignments: DashMap::new(),
            active_pairs: DashMap::new(),
            days: DashMap::new(),
            day_index: DashMap::new(),
            user_dates: DashMap::new(),
            exclusions: DashMap::new(),
            conflicts: DashMap::new(),
            confirmations: DashMap::new(),
            wal_tx: None,
            compact_gate: RwLock::new(()),
        }
    }

    /// Replay the WAL at `path` and keep appending to it.
    /// Must be called inside a Tokio runtime (spawns the writer task).
    pub fn open(path: &Path) -> io::Result<Self> {
        let events = Wal::replay(path)?;
        let mut store = Self::new();
        for event in &events {
            store.apply(event);
        }
        info!(events = events.len(), path = %path.display(), "replayed WAL");

        let wal = Wal::open(path)?;
        let (tx, rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, rx));
        store.wal_tx = Some(tx);
        Ok(store)
    }

    pub fn is_durable(&self) -> bool {
        self.wal_tx.is_some()
    }

    async fn wal_append(&self, event: &Event) -> Result<(), StoreError> {
        let Some(wal_tx) = &self.wal_tx else {
            return Ok(());
        };
        let (tx, rx) = oneshot::channel();
        wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| StoreError::Wal("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| StoreError::Wal("WAL writer dropped response".into()))?
            .map_err(|e| StoreError::Wal(e.to_string()))
    }

    /// WAL-append then apply.
    async fn persist(&self, event: Event) -> Result<(), StoreError> {
        let _gate = self.compact_gate.read().await;
        self.wal_append(&event).await?;
        self.apply(&event);
        Ok(())
    }

    fn user_of(&self, assignment_id: &AssignmentId) -> Option<UserId> {
        self.assignments.get(assignment_id).map(|a| a.user_id)
    }

    fn is_active(&self, assignment_id: &AssignmentId) -> bool {
        self.assignments
            .get(assignment_id)
            .is_some_and(|a| a.is_active())
    }

    fn index_day(&self, day: &AssignmentDay) {
        self.day_index
            .entry(day.assignment_id)
            .or_default()
            .insert(day.work_date, day.id);
        if let Some(user_id) = self.user_of(&day.assignment_id) {
            self.user_dates
                .entry((user_id, day.work_date))
                .or_default()
                .push(day.id);
        }
    }

    /// Drop `day` from both indexes, removing index entries it leaves empty.
    fn unindex_day(&self, day: &AssignmentDay) {
        if let Some(mut dates) = self.day_index.get_mut(&day.assignment_id)
            && dates.get(&day.work_date) == Some(&day.id)
        {
            dates.remove(&day.work_date);
        }
        self.day_index
            .remove_if(&day.assignment_id, |_, dates| dates.is_empty());

        if let Some(user_id) = self.user_of(&day.assignment_id) {
            let key = (user_id, day.work_date);
            if let Some(mut ids) = self.user_dates.get_mut(&key) {
                ids.retain(|id| *id != day.id);
            }
            self.user_dates.remove_if(&key, |_, ids| ids.is_empty());
        }
    }

    #[cfg(test)]
    fn index_sizes(&self) -> (usize, usize) {
        (self.day_index.len(), self.user_dates.len())
    }

    /// Apply one event to the in-memory maps. Used by both live writes and replay.
    fn apply(&self, event: &Event) {
        match event {
            Event::ProjectSaved { project } => {
                self.projects.insert(project.id, project.clone());
            }
            Event::AssignmentSaved { assignment } => {
                let key = (assignment.project_id, assignment.user_id);
                if assignment.is_active() {
                    self.active_pairs.insert(key, assignment.id);
                } else {
                    self.active_pairs.remove_if(&key, |_, id| *id == assignment.id);
                }
                self.assignments.insert(assignment.id, assignment.clone());
            }
            Event::DaySaved { day } => {
                if let Some(old) = self.days.insert(day.id, day.clone()) {
                    self.unindex_day(&old);
                }
                self.index_day(day);
            }
            Event::DayDeleted { id, .. } => {
                if let Some((_, old)) = self.days.remove(id) {
                    self.unindex_day(&old);
                }
            }
            Event::DateExcluded { exclusion } => {
                self.exclusions
                    .entry(exclusion.assignment_id)
                    .or_default()
                    .entry(exclusion.excluded_date)
                    .or_insert_with(|| exclusion.clone());
            }
            Event::ConflictSaved { conflict } => {
                self.conflicts.insert(conflict.id, conflict.clone());
            }
            Event::ConfirmationSaved { request } => {
                self.confirmations.insert(request.id, request.clone());
            }
        }
    }

    /// Events that recreate the current state, dependencies first.
    fn snapshot(&self) -> Vec<Event> {
        let mut events = Vec::new();
        events.extend(self.projects.iter().map(|e| Event::ProjectSaved {
            project: e.value().clone(),
        }));
        events.extend(self.assignments.iter().map(|e| Event::AssignmentSaved {
            assignment: e.value().clone(),
        }));
        events.extend(self.days.iter().map(|e| Event::DaySaved {
            day: e.value().clone(),
        }));
        for entry in self.exclusions.iter() {
            events.extend(entry.value().values().map(|exclusion| Event::DateExcluded {
                exclusion: exclusion.clone(),
            }));
        }
        events.extend(self.conflicts.iter().map(|e| Event::ConflictSaved {
            conflict: e.value().clone(),
        }));
        events.extend(self.confirmations.iter().map(|e| Event::ConfirmationSaved {
            request: e.value().clone(),
        }));
        events
    }

    /// Rewrite the WAL with only the events needed for the current state.
    /// No-op for a volatile store.
    pub async fn compact(&self) -> Result<(), StoreError> {
        let Some(wal_tx) = &self.wal_tx else {
            return Ok(());
        };
        let _gate = self.compact_gate.write().await;
        let events = self.snapshot();
        let (tx, rx) = oneshot::channel();
        wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| StoreError::Wal("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| StoreError::Wal("WAL writer dropped response".into()))?
            .map_err(|e| StoreError::Wal(e.to_string()))
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let Some(wal_tx) = &self.wal_tx else {
            return 0;
        };
        let (tx, rx) = oneshot::channel();
        if wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn save_project(&self, project: Project) -> Result<(), StoreError> {
        self.persist(Event::ProjectSaved { project }).await
    }

    async fn project(&self, id: ProjectId) -> Result<Option<Project>, StoreError> {
        Ok(self.projects.get(&id).map(|e| e.value().clone()))
    }

    async fn insert_assignment(&self, assignment: Assignment) -> Result<(), StoreError> {
        if !assignment.is_active() {
            return Err(StoreError::Constraint("new assignment must be active"));
        }
        let key = (assignment.project_id, assignment.user_id);
        let id = assignment.id;
        match self.active_pairs.entry(key) {
            Entry::Occupied(e) => return Err(StoreError::Duplicate { existing: *e.get() }),
            Entry::Vacant(e) => {
                e.insert(id);
            }
        }

        let event = Event::AssignmentSaved { assignment };
        let _gate = self.compact_gate.read().await;
        if let Err(e) = self.wal_append(&event).await {
            self.active_pairs.remove_if(&key, |_, v| *v == id);
            return Err(e);
        }
        self.apply(&event);
        Ok(())
    }

    async fn save_assignment(&self, assignment: Assignment) -> Result<(), StoreError> {
        let was_active = match self.assignments.get(&assignment.id) {
            Some(existing) => existing.is_active(),
            None => return Err(StoreError::NotFound(assignment.id)),
        };
        if !was_active && assignment.is_active() {
            return Err(StoreError::Constraint("cancelled assignment cannot be reactivated"));
        }
        self.persist(Event::AssignmentSaved { assignment }).await
    }

    async fn assignment(&self, id: AssignmentId) -> Result<Option<Assignment>, StoreError> {
        Ok(self.assignments.get(&id).map(|e| e.value().clone()))
    }

    async fn assignments_for_project(
        &self,
        project_id: ProjectId,
    ) -> Result<Vec<Assignment>, StoreError> {
        let mut found: Vec<Assignment> = self
            .assignments
            .iter()
            .filter(|e| e.project_id == project_id && e.is_active())
            .map(|e| e.value().clone())
            .collect();
        found.sort_by_key(|a| (a.created_at, a.id));
        Ok(found)
    }

    async fn assignments_for_user(&self, user_id: UserId) -> Result<Vec<Assignment>, StoreError> {
        let mut found: Vec<Assignment> = self
            .assignments
            .iter()
            .filter(|e| e.user_id == user_id && e.is_active())
            .map(|e| e.value().clone())
            .collect();
        found.sort_by_key(|a| (a.created_at, a.id));
        Ok(found)
    }

    async fn save_day(&self, day: AssignmentDay) -> Result<(), StoreError> {
        if day.end_time <= day.start_time {
            return Err(StoreError::Constraint("end_time must be after start_time"));
        }
        if !self.assignments.contains_key(&day.assignment_id) {
            return Err(StoreError::NotFound(day.assignment_id));
        }
        let taken_by_other = self
            .day_index
            .get(&day.assignment_id)
            .and_then(|dates| dates.get(&day.work_date).copied())
            .is_some_and(|id| id != day.id);
        if taken_by_other {
            return Err(StoreError::Constraint("work_date already scheduled for assignment"));
        }
        self.persist(Event::DaySaved { day }).await
    }

    async fn day(&self, id: DayId) -> Result<Option<AssignmentDay>, StoreError> {
        Ok(self.days.get(&id).map(|e| e.value().clone()))
    }

    async fn day_on_date(
        &self,
        assignment_id: AssignmentId,
        date: NaiveDate,
    ) -> Result<Option<AssignmentDay>, StoreError> {
        let id = self
            .day_index
            .get(&assignment_id)
            .and_then(|dates| dates.get(&date).copied());
        Ok(id.and_then(|id| self.days.get(&id).map(|e| e.value().clone())))
    }

    async fn days_for_assignment(
        &self,
        assignment_id: AssignmentId,
    ) -> Result<Vec<AssignmentDay>, StoreError> {
        let ids: Vec<DayId> = self
            .day_index
            .get(&assignment_id)
            .map(|dates| dates.values().copied().collect())
            .unwrap_or_default();
        Ok(ids
            .iter()
            .filter_map(|id| self.days.get(id).map(|e| e.value().clone()))
            .collect())
    }

    async fn days_for_user_on_date(
        &self,
        user_id: UserId,
        date: NaiveDate,
        excluding: AssignmentId,
    ) -> Result<Vec<AssignmentDay>, StoreError> {
        let ids: Vec<DayId> = self
            .user_dates
            .get(&(user_id, date))
            .map(|ids| ids.value().clone())
            .unwrap_or_default();
        let mut found: Vec<AssignmentDay> = ids
            .iter()
            .filter_map(|id| self.days.get(id).map(|e| e.value().clone()))
            .filter(|day| day.assignment_id != excluding && self.is_active(&day.assignment_id))
            .collect();
        found.sort_by_key(|day| day.id);
        Ok(found)
    }

    async fn days_on_date(&self, date: NaiveDate) -> Result<Vec<AssignmentDay>, StoreError> {
        let mut found: Vec<AssignmentDay> = self
            .days
            .iter()
            .filter(|e| e.work_date == date)
            .map(|e| e.value().clone())
            .collect();
        found.retain(|day| self.is_active(&day.assignment_id));
        found.sort_by_key(|day| day.id);
        Ok(found)
    }

    async fn delete_day(&self, id: DayId) -> Result<Option<AssignmentDay>, StoreError> {
        let Some(day) = self.days.get(&id).map(|e| e.value().clone()) else {
            return Ok(None);
        };
        self.persist(Event::DayDeleted {
            id,
            assignment_id: day.assignment_id,
        })
        .await?;
        Ok(Some(day))
    }

    async fn insert_exclusion(&self, exclusion: ExcludedDate) -> Result<bool, StoreError> {
        if self
            .is_excluded(exclusion.assignment_id, exclusion.excluded_date)
            .await?
        {
            return Ok(false);
        }
        self.persist(Event::DateExcluded { exclusion }).await?;
        Ok(true)
    }

    async fn is_excluded(
        &self,
        assignment_id: AssignmentId,
        date: NaiveDate,
    ) -> Result<bool, StoreError> {
        Ok(self
            .exclusions
            .get(&assignment_id)
            .is_some_and(|dates| dates.contains_key(&date)))
    }

    async fn exclusions_for_assignment(
        &self,
        assignment_id: AssignmentId,
    ) -> Result<Vec<ExcludedDate>, StoreError> {
        Ok(self
            .exclusions
            .get(&assignment_id)
            .map(|dates| dates.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn save_conflict(&self, conflict: BookingConflict) -> Result<(), StoreError> {
        self.persist(Event::ConflictSaved { conflict }).await
    }

    async fn conflict(&self, id: ConflictId) -> Result<Option<BookingConflict>, StoreError> {
        Ok(self.conflicts.get(&id).map(|e| e.value().clone()))
    }

    async fn conflicts_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<BookingConflict>, StoreError> {
        let mut found: Vec<BookingConflict> = self
            .conflicts
            .iter()
            .filter(|e| e.user_id == user_id)
            .map(|e| e.value().clone())
            .collect();
        found.sort_by_key(|c| (c.conflict_date, c.id));
        Ok(found)
    }

    async fn save_confirmation(&self, request: ConfirmationRequest) -> Result<(), StoreError> {
        self.persist(Event::ConfirmationSaved { request }).await
    }

    async fn confirmation(
        &self,
        id: RequestId,
    ) -> Result<Option<ConfirmationRequest>, StoreError> {
        Ok(self.confirmations.get(&id).map(|e| e.value().clone()))
    }

    async fn confirmations_for_project(
        &self,
        project_id: ProjectId,
    ) -> Result<Vec<ConfirmationRequest>, StoreError> {
        let mut found: Vec<ConfirmationRequest> = self
            .confirmations
            .iter()
            .filter(|e| e.project_id == project_id)
            .map(|e| e.value().clone())
            .collect();
        found.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::Arc;

    use chrono::{NaiveTime, Utc};
    use ulid::Ulid;

    fn test_wal_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("crewplan_test_store");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
    }

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn assignment(project_id: ProjectId, user_id: UserId) -> Assignment {
        Assignment {
            id: Ulid::new(),
            project_id,
            user_id,
            booking_status: BookingStatus::Draft,
            notes: None,
            created_at: Utc::now(),
            cancelled_at: None,
        }
    }

    fn day(assignment_id: AssignmentId, d: u32) -> AssignmentDay {
        AssignmentDay {
            id: Ulid::new(),
            assignment_id,
            work_date: date(d),
            start_time: hm(9, 0),
            end_time: hm(17, 0),
        }
    }

    #[tokio::test]
    async fn concurrent_insert_of_same_pair_has_one_winner() {
        let store = Arc::new(MemoryStore::new());
        let (pid, uid) = (Ulid::new(), Ulid::new());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.insert_assignment(assignment(pid, uid)).await })
            })
            .collect();

        let mut ok = 0;
        let mut dup = 0;
        for h in handles {
            match h.await.unwrap() {
                Ok(()) => ok += 1,
                Err(StoreError::Duplicate { .. }) => dup += 1,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!(ok, 1);
        assert_eq!(dup, 7);
        assert_eq!(store.assignments_for_project(pid).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn cancelling_frees_the_pair() {
        let store = MemoryStore::new();
        let (pid, uid) = (Ulid::new(), Ulid::new());
        let mut first = assignment(pid, uid);
        store.insert_assignment(first.clone()).await.unwrap();

        first.cancelled_at = Some(Utc::now());
        store.save_assignment(first.clone()).await.unwrap();
        store.insert_assignment(assignment(pid, uid)).await.unwrap();

        first.cancelled_at = None;
        assert_eq!(
            store.save_assignment(first).await,
            Err(StoreError::Constraint("cancelled assignment cannot be reactivated"))
        );
    }

    #[tokio::test]
    async fn second_day_on_same_date_is_rejected() {
        let store = MemoryStore::new();
        let a = assignment(Ulid::new(), Ulid::new());
        store.insert_assignment(a.clone()).await.unwrap();

        let first = day(a.id, 10);
        store.save_day(first.clone()).await.unwrap();
        let err = store.save_day(day(a.id, 10)).await.unwrap_err();
        assert!(matches!(err, StoreError::Constraint(_)));

        // Overwriting the same id is fine.
        let mut moved = first.clone();
        moved.start_time = hm(8, 0);
        store.save_day(moved.clone()).await.unwrap();
        assert_eq!(store.day_on_date(a.id, date(10)).await.unwrap(), Some(moved));
    }

    #[tokio::test]
    async fn user_day_query_skips_own_and_cancelled_assignments() {
        let store = MemoryStore::new();
        let uid = Ulid::new();
        let a = assignment(Ulid::new(), uid);
        let b = assignment(Ulid::new(), uid);
        let mut c = assignment(Ulid::new(), uid);
        for x in [&a, &b, &c] {
            store.insert_assignment(x.clone()).await.unwrap();
            store.save_day(day(x.id, 10)).await.unwrap();
        }
        c.cancelled_at = Some(Utc::now());
        store.save_assignment(c).await.unwrap();

        let found = store.days_for_user_on_date(uid, date(10), a.id).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].assignment_id, b.id);

        assert!(store
            .days_for_user_on_date(Ulid::new(), date(10), a.id)
            .await
            .unwrap()
            .is_empty());
        assert_eq!(store.days_on_date(date(10)).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn moving_a_day_reindexes_it() {
        let store = MemoryStore::new();
        let uid = Ulid::new();
        let a = assignment(Ulid::new(), uid);
        store.insert_assignment(a.clone()).await.unwrap();
        let mut d = day(a.id, 10);
        store.save_day(d.clone()).await.unwrap();

        d.work_date = date(12);
        store.save_day(d.clone()).await.unwrap();

        assert_eq!(store.day_on_date(a.id, date(10)).await.unwrap(), None);
        assert_eq!(store.day_on_date(a.id, date(12)).await.unwrap(), Some(d));
        let other = Ulid::new();
        assert!(store.days_for_user_on_date(uid, date(10), other).await.unwrap().is_empty());
        assert_eq!(store.days_for_user_on_date(uid, date(12), other).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn exclusion_insert_is_idempotent() {
        let store = MemoryStore::new();
        let aid = Ulid::new();
        let ex = ExcludedDate {
            assignment_id: aid,
            excluded_date: date(14),
            reason: Some("PTO".into()),
        };
        assert!(store.insert_exclusion(ex.clone()).await.unwrap());
        assert!(!store.insert_exclusion(ex).await.unwrap());
        assert_eq!(store.exclusions_for_assignment(aid).await.unwrap().len(), 1);
        assert!(store.is_excluded(aid, date(14)).await.unwrap());
    }

    #[tokio::test]
    async fn delete_missing_day_is_none() {
        let store = MemoryStore::new();
        assert_eq!(store.delete_day(Ulid::new()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn emptied_index_entries_are_pruned() {
        let store = MemoryStore::new();
        let a = assignment(Ulid::new(), Ulid::new());
        store.insert_assignment(a.clone()).await.unwrap();

        let mut d = day(a.id, 10);
        store.save_day(d.clone()).await.unwrap();
        assert_eq!(store.index_sizes(), (1, 1));

        d.work_date = date(12);
        store.save_day(d.clone()).await.unwrap();
        assert_eq!(store.index_sizes(), (1, 1));

        store.delete_day(d.id).await.unwrap();
        assert_eq!(store.index_sizes(), (0, 0));
        assert!(store.days_for_assignment(a.id).await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn compaction_racing_writers_loses_nothing() {
        let path = test_wal_path("compact_race.wal");
        let ids: Vec<ProjectId> = {
            let store = Arc::new(MemoryStore::open(&path).unwrap());
            let writers: Vec<_> = (0..8)
                .map(|w| {
                    let store = store.clone();
                    tokio::spawn(async move {
                        let mut ids = Vec::new();
                        for i in 0..50 {
                            let project = Project {
                                id: Ulid::new(),
                                client_name: format!("client {w}-{i}"),
                                start_date: None,
                                end_date: None,
                                schedule_status: "planned".into(),
                            };
                            ids.push(project.id);
                            store.save_project(project).await.unwrap();
                        }
                        ids
                    })
                })
                .collect();
            let compactor = {
                let store = store.clone();
                tokio::spawn(async move {
                    for _ in 0..50 {
                        store.compact().await.unwrap();
                        tokio::task::yield_now().await;
                    }
                })
            };

            let mut ids = Vec::new();
            for w in writers {
                ids.extend(w.await.unwrap());
            }
            compactor.await.unwrap();
            ids
        };

        let store = MemoryStore::open(&path).unwrap();
        for id in &ids {
            assert!(store.project(*id).await.unwrap().is_some(), "project {id} lost");
        }
    }

    #[tokio::test]
    async fn durable_store_survives_reopen_and_compaction() {
        let path = test_wal_path("reopen.wal");
        let uid = Ulid::new();
        let a = assignment(Ulid::new(), uid);
        let kept = day(a.id, 11);
        {
            let store = MemoryStore::open(&path).unwrap();
            assert!(store.is_durable());
            store.insert_assignment(a.clone()).await.unwrap();
            let removed = day(a.id, 10);
            store.save_day(removed.clone()).await.unwrap();
            store.save_day(kept.clone()).await.unwrap();
            store.delete_day(removed.id).await.unwrap();
            assert_eq!(store.wal_appends_since_compact().await, 4);
        }

        {
            let store = MemoryStore::open(&path).unwrap();
            assert_eq!(store.days_for_assignment(a.id).await.unwrap(), vec![kept.clone()]);
            store.compact().await.unwrap();
            assert_eq!(store.wal_appends_since_compact().await, 0);
        }

        let store = MemoryStore::open(&path).unwrap();
        assert_eq!(store.assignment(a.id).await.unwrap(), Some(a.clone()));
        assert_eq!(store.days_for_assignment(a.id).await.unwrap(), vec![kept]);
        let dup = store.insert_assignment(assignment(a.project_id, uid)).await;
        assert_eq!(dup, Err(StoreError::Duplicate { existing: a.id }));
    }
}
