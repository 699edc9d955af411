use chrono::{NaiveDate, NaiveTime};
use ulid::Ulid;

use crate::model::{AssignmentId, BookingStatus, ProjectId, UserId};
use crate::store::StoreError;

use super::status::Transition;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    NotFound(Ulid),
    /// An active assignment already exists for this (project, user).
    AlreadyAssigned {
        project_id: ProjectId,
        user_id: UserId,
        existing: AssignmentId,
    },
    /// Assignment was cancelled.
    NotActive(AssignmentId),
    InvalidDateRange {
        start: NaiveDate,
        end: NaiveDate,
    },
    InvalidTimeRange {
        start: NaiveTime,
        end: NaiveTime,
    },
    /// The project has no start or no end date.
    ProjectUndated(ProjectId),
    OutsideProjectRange(NaiveDate),
    DateExcluded(NaiveDate),
    IneligibleStatus {
        id: AssignmentId,
        status: BookingStatus,
        transition: Transition,
    },
    NotOnProject {
        assignment_id: AssignmentId,
        project_id: ProjectId,
    },
    /// Only the confirmation workflow may put an assignment into pending_confirm.
    ReservedStatus(BookingStatus),
    InvalidEmail(String),
    EmptyReason,
    EmptySelection,
    AlreadyResolved(Ulid),
    AlreadyAnswered(Ulid),
    /// Only declined requests can be re-sent.
    NotDeclined(Ulid),
    LimitExceeded(&'static str),
    Storage(String),
}

impl EngineError {
    /// Caller-input problems: returned synchronously, never retried, never logged as faults.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            EngineError::InvalidDateRange { .. }
                | EngineError::InvalidTimeRange { .. }
                | EngineError::ProjectUndated(_)
                | EngineError::OutsideProjectRange(_)
                | EngineError::DateExcluded(_)
                | EngineError::IneligibleStatus { .. }
                | EngineError::NotOnProject { .. }
                | EngineError::ReservedStatus(_)
                | EngineError::InvalidEmail(_)
                | EngineError::EmptyReason
                | EngineError::EmptySelection
                | EngineError::LimitExceeded(_)
        )
    }

    /// Short label for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            EngineError::NotFound(_) => "not_found",
            EngineError::AlreadyAssigned { .. } => "already_assigned",
            EngineError::NotActive(_) => "not_active",
            EngineError::InvalidDateRange { .. } => "invalid_date_range",
            EngineError::InvalidTimeRange { .. } => "invalid_time_range",
            EngineError::ProjectUndated(_) => "project_undated",
            EngineError::OutsideProjectRange(_) => "outside_project_range",
            EngineError::DateExcluded(_) => "date_excluded",
            EngineError::IneligibleStatus { .. } => "ineligible_status",
            EngineError::NotOnProject { .. } => "not_on_project",
            EngineError::ReservedStatus(_) => "reserved_status",
            EngineError::InvalidEmail(_) => "invalid_email",
            EngineError::EmptyReason => "empty_reason",
            EngineError::EmptySelection => "empty_selection",
            EngineError::AlreadyResolved(_) => "already_resolved",
            EngineError::AlreadyAnswered(_) => "already_answered",
            EngineError::NotDeclined(_) => "not_declined",
            EngineError::LimitExceeded(_) => "limit_exceeded",
            EngineError::Storage(_) => "storage",
        }
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::AlreadyAssigned {
                project_id,
                user_id,
                existing,
            } => write!(
                f,
                "user {user_id} is already assigned to project {project_id} (assignment {existing})"
            ),
            EngineError::NotActive(id) => write!(f, "assignment {id} is cancelled"),
            EngineError::InvalidDateRange { start, end } => {
                write!(f, "invalid date range: {start} is after {end}")
            }
            EngineError::InvalidTimeRange { start, end } => {
                write!(f, "end time {end} must be after start time {start}")
            }
            EngineError::ProjectUndated(id) => {
                write!(f, "project {id} has no start or end date")
            }
            EngineError::OutsideProjectRange(date) => {
                write!(f, "{date} is outside the project date range")
            }
            EngineError::DateExcluded(date) => write!(f, "{date} is excluded for this assignment"),
            EngineError::IneligibleStatus {
                id,
                status,
                transition,
            } => write!(
                f,
                "assignment {id} in status {status} is not eligible for {}",
                transition.as_str()
            ),
            EngineError::NotOnProject {
                assignment_id,
                project_id,
            } => write!(f, "assignment {assignment_id} is not on project {project_id}"),
            EngineError::ReservedStatus(status) => {
                write!(f, "status {status} can only be entered through a confirmation request")
            }
            EngineError::InvalidEmail(email) => write!(f, "invalid email address: {email:?}"),
            EngineError::EmptyReason => write!(f, "a reason is required"),
            EngineError::EmptySelection => write!(f, "no assignments selected"),
            EngineError::AlreadyResolved(id) => write!(f, "conflict {id} is already resolved"),
            EngineError::AlreadyAnswered(id) => {
                write!(f, "confirmation request {id} was already answered")
            }
            EngineError::NotDeclined(id) => {
                write!(f, "confirmation request {id} was not declined")
            }
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::Storage(e) => write!(f, "storage error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => EngineError::NotFound(id),
            other => EngineError::Storage(other.to_string()),
        }
    }
}
