use chrono::{NaiveDate, NaiveTime, Utc};
use tracing::{debug, info, warn};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::store::StoreError;

use super::conflict::DayCollision;
use super::days::{DayFilter, check_in_project, generate_days};
use super::{Engine, EngineError, Transition};

/// One requested working day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewDay {
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignmentCreated {
    pub assignment: Assignment,
    /// In-range dates the user already works under other assignments.
    /// Advisory; nothing is recorded until days are actually added.
    pub busy_dates: Vec<DayCollision>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayOutcome {
    pub date: NaiveDate,
    pub result: Result<AssignmentDay, EngineError>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddDaysReport {
    /// One entry per requested day, in request order.
    pub outcomes: Vec<DayOutcome>,
    pub conflicts: Vec<BookingConflict>,
}

impl AddDaysReport {
    pub fn written(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    pub fn rejected(&self) -> impl Iterator<Item = (NaiveDate, &EngineError)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (o.date, e)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoveOutcome {
    Removed,
    /// Unknown id; skipped.
    Missing,
    Failed(EngineError),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoveDaysReport {
    pub outcomes: Vec<(DayId, RemoveOutcome)>,
}

impl RemoveDaysReport {
    pub fn removed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| *o == RemoveOutcome::Removed)
            .count()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExclusionOutcome {
    /// A day still scheduled on the date is reported, not removed.
    Recorded { existing_day: Option<DayId> },
    AlreadyExcluded,
    Rejected(EngineError),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExcludeDatesReport {
    pub outcomes: Vec<(NaiveDate, ExclusionOutcome)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovedDay {
    pub day: AssignmentDay,
    /// Day that already sat on the target date and was replaced.
    pub replaced: Option<DayId>,
    pub conflicts: Vec<BookingConflict>,
}

fn check_times(start: NaiveTime, end: NaiveTime) -> Result<(), EngineError> {
    if end <= start {
        return Err(EngineError::InvalidTimeRange { start, end });
    }
    Ok(())
}

impl Engine {
    pub async fn create_assignment(
        &self,
        project_id: ProjectId,
        user_id: UserId,
        initial_status: Option<BookingStatus>,
        notes: Option<String>,
    ) -> Result<AssignmentCreated, EngineError> {
        let status = initial_status.unwrap_or(BookingStatus::Draft);
        if status == BookingStatus::PendingConfirm {
            return Err(EngineError::ReservedStatus(status));
        }
        if let Some(ref n) = notes
            && n.len() > MAX_NOTES_LEN
        {
            return Err(EngineError::LimitExceeded("notes too long"));
        }
        let project = self.load_project(project_id).await?;
        let range = generate_days(project.start_date, project.end_date, &DayFilter::All)?;

        let assignment = Assignment {
            id: Ulid::new(),
            project_id,
            user_id,
            booking_status: status,
            notes,
            created_at: Utc::now(),
            cancelled_at: None,
        };
        match self.store.insert_assignment(assignment.clone()).await {
            Ok(()) => {}
            Err(StoreError::Duplicate { existing }) => {
                return Err(EngineError::AlreadyAssigned {
                    project_id,
                    user_id,
                    existing,
                });
            }
            Err(e) => return Err(e.into()),
        }
        metrics::counter!(crate::observability::ASSIGNMENTS_CREATED_TOTAL).increment(1);
        info!(assignment = %assignment.id, project = %project_id, user = %user_id, %status, "assignment created");

        let busy_dates = self.collisions(user_id, assignment.id, &range).await?;
        if !busy_dates.is_empty() {
            debug!(assignment = %assignment.id, busy = busy_dates.len(), "user already booked on project dates");
        }

        self.notifier.send(
            Notification::new(Recipient::Member(user_id), TemplateKind::AssignmentCreated)
                .param("assignment_id", assignment.id)
                .param("project_id", project_id)
                .param("client_name", &project.client_name)
                .param("status", status),
        );
        Ok(AssignmentCreated {
            assignment,
            busy_dates,
        })
    }

    /// Soft-delete. Frees the (project, user) pair; the assignment's days stop
    /// taking part in conflict detection.
    pub async fn cancel_assignment(&self, id: AssignmentId) -> Result<Assignment, EngineError> {
        let (mut assignment, _guard) = self.lock_assignment(id).await?;
        assignment.cancelled_at = Some(Utc::now());
        self.store.save_assignment(assignment.clone()).await?;
        info!(assignment = %id, "assignment cancelled");
        Ok(assignment)
    }

    /// Upsert days one by one. A bad entry never stops the others.
    pub async fn add_days(
        &self,
        assignment_id: AssignmentId,
        days: Vec<NewDay>,
    ) -> Result<AddDaysReport, EngineError> {
        if days.len() > MAX_BATCH_SIZE {
            return Err(EngineError::LimitExceeded("batch too large"));
        }
        let (assignment, _guard) = self.lock_assignment(assignment_id).await?;
        let project = self.load_project(assignment.project_id).await?;

        let mut report = AddDaysReport::default();
        for entry in days {
            let result = match self.write_day(&assignment, &project, &entry).await {
                Ok((day, conflicts)) => {
                    report.conflicts.extend(conflicts);
                    Ok(day)
                }
                Err(e) => {
                    metrics::counter!(crate::observability::DAYS_REJECTED_TOTAL, "reason" => e.label())
                        .increment(1);
                    if e.is_validation() {
                        debug!(assignment = %assignment_id, date = %entry.date, "day rejected: {e}");
                    } else {
                        warn!(assignment = %assignment_id, date = %entry.date, "day write failed: {e}");
                    }
                    Err(e)
                }
            };
            report.outcomes.push(DayOutcome {
                date: entry.date,
                result,
            });
        }

        info!(
            assignment = %assignment_id,
            written = report.written(),
            rejected = report.outcomes.len() - report.written(),
            conflicts = report.conflicts.len(),
            "days added"
        );
        Ok(report)
    }

    async fn write_day(
        &self,
        assignment: &Assignment,
        project: &Project,
        entry: &NewDay,
    ) -> Result<(AssignmentDay, Vec<BookingConflict>), EngineError> {
        check_in_project(project, entry.date)?;
        if self.store.is_excluded(assignment.id, entry.date).await? {
            return Err(EngineError::DateExcluded(entry.date));
        }
        check_times(entry.start_time, entry.end_time)?;

        let id = match self.store.day_on_date(assignment.id, entry.date).await? {
            Some(existing) => existing.id,
            None => Ulid::new(),
        };
        let day = AssignmentDay {
            id,
            assignment_id: assignment.id,
            work_date: entry.date,
            start_time: entry.start_time,
            end_time: entry.end_time,
        };
        self.store.save_day(day.clone()).await?;
        metrics::counter!(crate::observability::DAYS_WRITTEN_TOTAL).increment(1);

        let conflicts = self
            .detect_conflicts(assignment.user_id, assignment.id, &[entry.date])
            .await?;
        Ok((day, conflicts))
    }

    /// Delete days by id. Unknown ids are skipped.
    pub async fn remove_days(&self, ids: &[DayId]) -> Result<RemoveDaysReport, EngineError> {
        if ids.len() > MAX_BATCH_SIZE {
            return Err(EngineError::LimitExceeded("batch too large"));
        }
        let mut report = RemoveDaysReport::default();
        for id in ids {
            let outcome = match self.remove_day(*id).await {
                Ok(true) => RemoveOutcome::Removed,
                Ok(false) => RemoveOutcome::Missing,
                Err(e) => {
                    warn!(day = %id, "day removal failed: {e}");
                    RemoveOutcome::Failed(e)
                }
            };
            report.outcomes.push((*id, outcome));
        }
        info!(requested = ids.len(), removed = report.removed(), "days removed");
        Ok(report)
    }

    async fn remove_day(&self, id: DayId) -> Result<bool, EngineError> {
        let Some(day) = self.store.day(id).await? else {
            return Ok(false);
        };
        let user_id = self.load_assignment(day.assignment_id).await?.user_id;
        let _guard = self.lock_user(user_id).await;
        Ok(self.store.delete_day(id).await?.is_some())
    }

    /// Record dates the assignee will not work. Idempotent per date.
    pub async fn exclude_dates(
        &self,
        assignment_id: AssignmentId,
        dates: &[NaiveDate],
        reason: Option<String>,
    ) -> Result<ExcludeDatesReport, EngineError> {
        if dates.len() > MAX_BATCH_SIZE {
            return Err(EngineError::LimitExceeded("batch too large"));
        }
        if let Some(ref r) = reason
            && r.len() > MAX_REASON_LEN
        {
            return Err(EngineError::LimitExceeded("reason too long"));
        }
        let (assignment, _guard) = self.lock_assignment(assignment_id).await?;
        let project = self.load_project(assignment.project_id).await?;

        let mut report = ExcludeDatesReport::default();
        for date in dates {
            let outcome = match self.exclude_date(&project, assignment_id, *date, reason.as_deref()).await {
                Ok(outcome) => outcome,
                Err(e) => ExclusionOutcome::Rejected(e),
            };
            if let ExclusionOutcome::Recorded {
                existing_day: Some(day_id),
            } = &outcome
            {
                debug!(assignment = %assignment_id, %date, day = %day_id, "excluded date still has a scheduled day");
            }
            report.outcomes.push((*date, outcome));
        }
        info!(assignment = %assignment_id, dates = dates.len(), "dates excluded");
        Ok(report)
    }

    async fn exclude_date(
        &self,
        project: &Project,
        assignment_id: AssignmentId,
        date: NaiveDate,
        reason: Option<&str>,
    ) -> Result<ExclusionOutcome, EngineError> {
        check_in_project(project, date)?;
        let inserted = self
            .store
            .insert_exclusion(ExcludedDate {
                assignment_id,
                excluded_date: date,
                reason: reason.map(str::to_string),
            })
            .await?;
        if !inserted {
            return Ok(ExclusionOutcome::AlreadyExcluded);
        }
        let existing_day = self
            .store
            .day_on_date(assignment_id, date)
            .await?
            .map(|d| d.id);
        Ok(ExclusionOutcome::Recorded { existing_day })
    }

    pub async fn adjust_day_time(
        &self,
        day_id: DayId,
        start_time: NaiveTime,
        end_time: NaiveTime,
    ) -> Result<AssignmentDay, EngineError> {
        check_times(start_time, end_time)?;
        let assignment_id = self
            .store
            .day(day_id)
            .await?
            .ok_or(EngineError::NotFound(day_id))?
            .assignment_id;
        let (_assignment, _guard) = self.lock_assignment(assignment_id).await?;

        let mut day = self
            .store
            .day(day_id)
            .await?
            .ok_or(EngineError::NotFound(day_id))?;
        day.start_time = start_time;
        day.end_time = end_time;
        self.store.save_day(day.clone()).await?;
        debug!(day = %day_id, %start_time, %end_time, "day time adjusted");
        Ok(day)
    }

    /// Move a day to another date of the same assignment.
    ///
    /// Validated like an add; on rejection or a failed write both the moved
    /// day and any occupant of the target date stay where they were.
    /// Conflicts are re-detected for the new date only.
    pub async fn move_day(&self, day_id: DayId, new_date: NaiveDate) -> Result<MovedDay, EngineError> {
        let assignment_id = self
            .store
            .day(day_id)
            .await?
            .ok_or(EngineError::NotFound(day_id))?
            .assignment_id;
        let (assignment, _guard) = self.lock_assignment(assignment_id).await?;
        let mut day = self
            .store
            .day(day_id)
            .await?
            .ok_or(EngineError::NotFound(day_id))?;
        if day.work_date == new_date {
            return Ok(MovedDay {
                day,
                replaced: None,
                conflicts: Vec::new(),
            });
        }

        let project = self.load_project(assignment.project_id).await?;
        check_in_project(&project, new_date)?;
        if self.store.is_excluded(assignment_id, new_date).await? {
            return Err(EngineError::DateExcluded(new_date));
        }

        // The occupant has to go first: one day per date per assignment.
        let occupant = self.store.day_on_date(assignment_id, new_date).await?;
        if let Some(ref occupant) = occupant {
            self.store.delete_day(occupant.id).await?;
        }
        let from = day.work_date;
        day.work_date = new_date;
        if let Err(e) = self.store.save_day(day.clone()).await {
            if let Some(occupant) = occupant
                && let Err(restore) = self.store.save_day(occupant).await
            {
                warn!(day = %day_id, "could not restore replaced day after failed move: {restore}");
            }
            return Err(e.into());
        }
        let replaced = occupant.map(|o| o.id);
        info!(day = %day_id, %from, to = %new_date, "day moved");

        let conflicts = self
            .detect_conflicts(assignment.user_id, assignment_id, &[new_date])
            .await?;
        Ok(MovedDay {
            day,
            replaced,
            conflicts,
        })
    }

    /// Operator clicked the status indicator.
    pub async fn cycle_status(&self, id: AssignmentId) -> Result<Assignment, EngineError> {
        self.transition_one(id, Transition::Cycle).await
    }

    /// `draft → tentative`: make the booking visible to the customer.
    pub async fn propose_assignment(&self, id: AssignmentId) -> Result<Assignment, EngineError> {
        self.transition_one(id, Transition::Propose).await
    }

    /// `confirmed → complete`.
    pub async fn complete_assignment(&self, id: AssignmentId) -> Result<Assignment, EngineError> {
        self.transition_one(id, Transition::Complete).await
    }

    async fn transition_one(
        &self,
        id: AssignmentId,
        transition: Transition,
    ) -> Result<Assignment, EngineError> {
        let (mut assignment, _guard) = self.lock_assignment(id).await?;
        self.apply_transition(&mut assignment, transition).await?;
        Ok(assignment)
    }
}
