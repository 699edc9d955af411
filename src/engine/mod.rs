mod assignments;
mod cascade;
mod confirmation;
mod conflict;
mod days;
mod error;
mod queries;
mod reminders;
mod status;

pub use assignments::{
    AddDaysReport, AssignmentCreated, DayOutcome, ExcludeDatesReport, ExclusionOutcome, MovedDay,
    NewDay, RemoveDaysReport, RemoveOutcome,
};
pub use cascade::{CascadeOutcome, CascadePlan, CascadeReport};
pub use confirmation::{ConfirmationOutcome, ResponseOutcome, validate_email};
pub use conflict::DayCollision;
pub use days::{DayFilter, generate_days};
pub use error::EngineError;
pub use status::Transition;

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::info;

use crate::limits::*;
use crate::model::*;
use crate::notify::Notifier;
use crate::observability::record_transition;
use crate::store::Store;

/// Scheduling engine: assignment management, conflict detection, status
/// cascades, and confirmation requests over an abstract [`Store`].
///
/// Every read-decide-write touching one user's days or assignment statuses
/// runs under that user's lock, so two writers for the same person always
/// observe each other's committed days.
pub struct Engine {
    store: Arc<dyn Store>,
    notifier: Arc<dyn Notifier>,
    user_locks: Arc<UserLocks>,
}

type UserLocks = DashMap<UserId, Arc<Mutex<()>>>;

/// Held per-user lock. On drop the user's map entry is removed unless
/// another task still holds or waits on it.
pub(super) struct UserGuard {
    guard: Option<OwnedMutexGuard<()>>,
    locks: Arc<UserLocks>,
    user_id: UserId,
}

impl Drop for UserGuard {
    fn drop(&mut self) {
        self.guard.take();
        self.locks
            .remove_if(&self.user_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

impl Engine {
    pub fn new(store: Arc<dyn Store>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            store,
            notifier,
            user_locks: Arc::new(DashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub(super) async fn lock_user(&self, user_id: UserId) -> UserGuard {
        let lock = self.user_locks.entry(user_id).or_default().value().clone();
        UserGuard {
            guard: Some(lock.lock_owned().await),
            locks: self.user_locks.clone(),
            user_id,
        }
    }

    #[cfg(test)]
    pub(super) fn user_lock_count(&self) -> usize {
        self.user_locks.len()
    }

    /// Lock several users in sorted order to prevent deadlocks.
    pub(super) async fn lock_users(
        &self,
        user_ids: impl IntoIterator<Item = UserId>,
    ) -> Vec<UserGuard> {
        let mut ids: Vec<UserId> = user_ids.into_iter().collect();
        ids.sort();
        ids.dedup();
        let mut guards = Vec::with_capacity(ids.len());
        for id in ids {
            guards.push(self.lock_user(id).await);
        }
        guards
    }

    pub(super) async fn load_project(&self, id: ProjectId) -> Result<Project, EngineError> {
        self.store
            .project(id)
            .await?
            .ok_or(EngineError::NotFound(id))
    }

    pub(super) async fn load_assignment(&self, id: AssignmentId) -> Result<Assignment, EngineError> {
        self.store
            .assignment(id)
            .await?
            .ok_or(EngineError::NotFound(id))
    }

    /// Lookup assignment → lock its user → re-read under the lock.
    pub(super) async fn lock_assignment(
        &self,
        id: AssignmentId,
    ) -> Result<(Assignment, UserGuard), EngineError> {
        let user_id = self.load_assignment(id).await?.user_id;
        let guard = self.lock_user(user_id).await;
        let assignment = self.load_assignment(id).await?;
        if !assignment.is_active() {
            return Err(EngineError::NotActive(id));
        }
        Ok((assignment, guard))
    }

    /// Run `transition` on the assignment, persist, and notify the assignee.
    /// Caller holds the user's lock. Returns the previous status.
    pub(super) async fn apply_transition(
        &self,
        assignment: &mut Assignment,
        transition: Transition,
    ) -> Result<BookingStatus, EngineError> {
        let from = assignment.booking_status;
        let to = from
            .apply(transition)
            .ok_or(EngineError::IneligibleStatus {
                id: assignment.id,
                status: from,
                transition,
            })?;
        if to == from {
            return Ok(from);
        }

        let mut updated = assignment.clone();
        updated.booking_status = to;
        self.store.save_assignment(updated.clone()).await?;
        *assignment = updated;

        record_transition(from, to);
        info!(assignment = %assignment.id, %from, %to, via = transition.as_str(), "booking status changed");
        self.notifier.send(
            Notification::new(
                Recipient::Member(assignment.user_id),
                TemplateKind::AssignmentStatusChanged,
            )
            .param("assignment_id", assignment.id)
            .param("project_id", assignment.project_id)
            .param("from", from)
            .param("to", to),
        );
        Ok(from)
    }

    /// Create or replace a project record. Stand-in for external project CRUD;
    /// the engine itself only reads dates and schedule status.
    pub async fn save_project(&self, project: Project) -> Result<(), EngineError> {
        if project.client_name.len() > MAX_CLIENT_NAME_LEN {
            return Err(EngineError::LimitExceeded("client name too long"));
        }
        if project.schedule_status.len() > MAX_SCHEDULE_STATUS_LEN {
            return Err(EngineError::LimitExceeded("schedule status too long"));
        }
        generate_days(project.start_date, project.end_date, &DayFilter::All)?;
        self.store.save_project(project).await?;
        Ok(())
    }
}
