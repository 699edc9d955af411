use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

pub type ProjectId = Ulid;
pub type UserId = Ulid;
pub type AssignmentId = Ulid;
pub type DayId = Ulid;
pub type ConflictId = Ulid;
pub type RequestId = Ulid;

/// Confidence level of an assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BookingStatus {
    /// Internal-only placeholder.
    Draft,
    /// Externally visible, awaiting confirmation.
    Tentative,
    /// A confirmation request is outstanding.
    PendingConfirm,
    Confirmed,
    /// Work finished. Terminal.
    Complete,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Draft => "draft",
            BookingStatus::Tentative => "tentative",
            BookingStatus::PendingConfirm => "pending_confirm",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Complete => "complete",
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub client_name: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    /// Project-level lifecycle label, unrelated to booking status.
    pub schedule_status: String,
}

impl Project {
    /// Inclusive bounds, only when both are set.
    pub fn range(&self) -> Option<(NaiveDate, NaiveDate)> {
        Some((self.start_date?, self.end_date?))
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.range()
            .is_some_and(|(start, end)| start <= date && date <= end)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub id: AssignmentId,
    pub project_id: ProjectId,
    pub user_id: UserId,
    pub booking_status: BookingStatus,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Set when the assignment is cancelled; cancelled assignments are inactive.
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl Assignment {
    pub fn is_active(&self) -> bool {
        self.cancelled_at.is_none()
    }
}

/// One scheduled working day. `end_time > start_time` always holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentDay {
    pub id: DayId,
    pub assignment_id: AssignmentId,
    pub work_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExcludedDate {
    pub assignment_id: AssignmentId,
    pub excluded_date: NaiveDate,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConflictResolution {
    Unresolved,
    Overridden {
        reason: String,
        resolved_at: DateTime<Utc>,
    },
}

/// Two active assignments of the same user claiming the same date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingConflict {
    pub id: ConflictId,
    pub user_id: UserId,
    pub conflict_date: NaiveDate,
    /// The assignment whose day write triggered detection.
    pub assignment_id: AssignmentId,
    /// The pre-existing assignment it collided with.
    pub other_assignment_id: AssignmentId,
    pub resolution: ConflictResolution,
    pub detected_at: DateTime<Utc>,
}

impl BookingConflict {
    pub fn is_resolved(&self) -> bool {
        !matches!(self.resolution, ConflictResolution::Unresolved)
    }

    /// True if this conflict is about the same unordered pair on the same date.
    pub fn involves_pair(&self, a: AssignmentId, b: AssignmentId) -> bool {
        (self.assignment_id == a && self.other_assignment_id == b)
            || (self.assignment_id == b && self.other_assignment_id == a)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfirmationResponse {
    Accept,
    Decline,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseState {
    Pending,
    Answered {
        response: ConfirmationResponse,
        responded_at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationRequest {
    pub id: RequestId,
    pub project_id: ProjectId,
    pub assignment_ids: Vec<AssignmentId>,
    pub recipient_email: String,
    pub recipient_name: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub response: ResponseState,
}

impl ConfirmationRequest {
    pub fn new(
        project_id: ProjectId,
        assignment_ids: Vec<AssignmentId>,
        recipient_email: String,
        recipient_name: String,
        created_at: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        Self {
            id: Ulid::new(),
            project_id,
            assignment_ids,
            recipient_email,
            recipient_name,
            created_at,
            expires_at: created_at + ttl,
            response: ResponseState::Pending,
        }
    }

    /// Advisory only: nothing is rolled back when a request expires.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.response, ResponseState::Pending)
    }
}

// ── Notifications ────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Recipient {
    Member(UserId),
    Email { address: String, name: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TemplateKind {
    AssignmentCreated,
    AssignmentStatusChanged,
    ConfirmationRequest,
    DayReminder,
}

impl TemplateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TemplateKind::AssignmentCreated => "assignment_created",
            TemplateKind::AssignmentStatusChanged => "assignment_status_changed",
            TemplateKind::ConfirmationRequest => "confirmation_request",
            TemplateKind::DayReminder => "day_reminder",
        }
    }
}

/// Fire-and-forget dispatch request handed to the notification collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub recipient: Recipient,
    pub template: TemplateKind,
    pub params: BTreeMap<String, String>,
}

impl Notification {
    pub fn new(recipient: Recipient, template: TemplateKind) -> Self {
        Self {
            recipient,
            template,
            params: BTreeMap::new(),
        }
    }

    pub fn param(mut self, key: &str, value: impl ToString) -> Self {
        self.params.insert(key.to_string(), value.to_string());
        self
    }
}

/// The event types. This is the WAL record format; every event carries the
/// full record it upserts so replay is order-independent per record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    ProjectSaved { project: Project },
    AssignmentSaved { assignment: Assignment },
    DaySaved { day: AssignmentDay },
    DayDeleted { id: DayId, assignment_id: AssignmentId },
    DateExcluded { exclusion: ExcludedDate },
    ConflictSaved { conflict: BookingConflict },
    ConfirmationSaved { request: ConfirmationRequest },
}
