use chrono::{DateTime, NaiveDate, Utc};
use tracing::info;
use ulid::Ulid;

use crate::limits::MAX_REASON_LEN;
use crate::model::*;

use super::{Engine, EngineError};

/// A day the user already holds under another active assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayCollision {
    pub date: NaiveDate,
    pub other_assignment_id: AssignmentId,
    pub other_day_id: DayId,
}

/// Conflicts to record for one freshly written day.
///
/// One record per other assignment holding `date`, skipping pairs that
/// already have a record for that date (in either direction).
pub(crate) fn new_conflicts(
    user_id: UserId,
    assignment_id: AssignmentId,
    date: NaiveDate,
    existing: &[AssignmentDay],
    recorded: &[BookingConflict],
    now: DateTime<Utc>,
) -> Vec<BookingConflict> {
    let mut fresh: Vec<BookingConflict> = Vec::new();
    for day in existing {
        if day.work_date != date || day.assignment_id == assignment_id {
            continue;
        }
        let seen = recorded
            .iter()
            .chain(fresh.iter())
            .any(|c| c.conflict_date == date && c.involves_pair(assignment_id, day.assignment_id));
        if seen {
            continue;
        }
        fresh.push(BookingConflict {
            id: Ulid::new(),
            user_id,
            conflict_date: date,
            assignment_id,
            other_assignment_id: day.assignment_id,
            resolution: ConflictResolution::Unresolved,
            detected_at: now,
        });
    }
    fresh
}

impl Engine {
    /// Read-only scan: days the user holds elsewhere on any of `dates`.
    pub(super) async fn collisions(
        &self,
        user_id: UserId,
        assignment_id: AssignmentId,
        dates: &[NaiveDate],
    ) -> Result<Vec<DayCollision>, EngineError> {
        let mut found = Vec::new();
        for date in dates {
            let days = self
                .store
                .days_for_user_on_date(user_id, *date, assignment_id)
                .await?;
            found.extend(days.into_iter().map(|day| DayCollision {
                date: *date,
                other_assignment_id: day.assignment_id,
                other_day_id: day.id,
            }));
        }
        Ok(found)
    }

    /// Detect and record conflicts for days just written under `assignment_id`.
    /// Results follow the order of `dates`. Caller holds the user's lock.
    pub(super) async fn detect_conflicts(
        &self,
        user_id: UserId,
        assignment_id: AssignmentId,
        dates: &[NaiveDate],
    ) -> Result<Vec<BookingConflict>, EngineError> {
        let mut recorded: Option<Vec<BookingConflict>> = None;
        let mut detected = Vec::new();
        for date in dates {
            let existing = self
                .store
                .days_for_user_on_date(user_id, *date, assignment_id)
                .await?;
            if existing.is_empty() {
                continue;
            }
            if recorded.is_none() {
                recorded = Some(self.store.conflicts_for_user(user_id).await?);
            }
            let known = recorded.get_or_insert_with(Vec::new);
            for conflict in new_conflicts(user_id, assignment_id, *date, &existing, known, Utc::now()) {
                self.store.save_conflict(conflict.clone()).await?;
                metrics::counter!(crate::observability::CONFLICTS_DETECTED_TOTAL).increment(1);
                info!(
                    user = %user_id,
                    date = %date,
                    assignment = %assignment_id,
                    other = %conflict.other_assignment_id,
                    "double booking detected"
                );
                known.push(conflict.clone());
                detected.push(conflict);
            }
        }
        Ok(detected)
    }

    /// Mark a conflict as overridden. Both bookings stay as they are.
    pub async fn resolve_conflict(
        &self,
        id: ConflictId,
        reason: &str,
    ) -> Result<BookingConflict, EngineError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(EngineError::EmptyReason);
        }
        if reason.len() > MAX_REASON_LEN {
            return Err(EngineError::LimitExceeded("reason too long"));
        }
        let user_id = self
            .store
            .conflict(id)
            .await?
            .ok_or(EngineError::NotFound(id))?
            .user_id;
        let _guard = self.lock_user(user_id).await;

        let mut conflict = self
            .store
            .conflict(id)
            .await?
            .ok_or(EngineError::NotFound(id))?;
        if conflict.is_resolved() {
            return Err(EngineError::AlreadyResolved(id));
        }
        conflict.resolution = ConflictResolution::Overridden {
            reason: reason.to_string(),
            resolved_at: Utc::now(),
        };
        self.store.save_conflict(conflict.clone()).await?;
        metrics::counter!(crate::observability::CONFLICTS_RESOLVED_TOTAL).increment(1);
        info!(conflict = %id, user = %user_id, "conflict overridden");
        Ok(conflict)
    }
}
