mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::model::*;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    NotFound(ulid::Ulid),
    /// An active assignment already exists for the (project, user) pair.
    Duplicate { existing: AssignmentId },
    Constraint(&'static str),
    Wal(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::NotFound(id) => write!(f, "record not found: {id}"),
            StoreError::Duplicate { existing } => {
                write!(f, "duplicate active assignment (existing: {existing})")
            }
            StoreError::Constraint(msg) => write!(f, "constraint violated: {msg}"),
            StoreError::Wal(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Data-access contract the engine runs against.
///
/// Implementations own atomicity of the (project, user) uniqueness check and
/// the per-assignment uniqueness of `work_date`. Everything else is plain
/// keyed reads and upserts; the engine serializes per-user work itself.
#[async_trait]
pub trait Store: Send + Sync {
    // ── Projects ─────────────────────────────────────────────

    async fn save_project(&self, project: Project) -> Result<(), StoreError>;
    async fn project(&self, id: ProjectId) -> Result<Option<Project>, StoreError>;

    // ── Assignments ──────────────────────────────────────────

    /// Insert a new active assignment. Fails with `Duplicate` if the pair is taken.
    async fn insert_assignment(&self, assignment: Assignment) -> Result<(), StoreError>;
    /// Overwrite an existing assignment (status, notes, cancellation).
    async fn save_assignment(&self, assignment: Assignment) -> Result<(), StoreError>;
    async fn assignment(&self, id: AssignmentId) -> Result<Option<Assignment>, StoreError>;
    /// Active assignments on a project, oldest first.
    async fn assignments_for_project(
        &self,
        project_id: ProjectId,
    ) -> Result<Vec<Assignment>, StoreError>;
    /// Active assignments of a user, oldest first.
    async fn assignments_for_user(&self, user_id: UserId) -> Result<Vec<Assignment>, StoreError>;

    // ── Days ─────────────────────────────────────────────────

    /// Upsert by id. Rejects a second day on the same date for one assignment.
    async fn save_day(&self, day: AssignmentDay) -> Result<(), StoreError>;
    async fn day(&self, id: DayId) -> Result<Option<AssignmentDay>, StoreError>;
    async fn day_on_date(
        &self,
        assignment_id: AssignmentId,
        date: NaiveDate,
    ) -> Result<Option<AssignmentDay>, StoreError>;
    /// Days of one assignment ordered by date.
    async fn days_for_assignment(
        &self,
        assignment_id: AssignmentId,
    ) -> Result<Vec<AssignmentDay>, StoreError>;
    /// All days of `user_id` on `date` under active assignments other than `excluding`.
    async fn days_for_user_on_date(
        &self,
        user_id: UserId,
        date: NaiveDate,
        excluding: AssignmentId,
    ) -> Result<Vec<AssignmentDay>, StoreError>;
    /// All days on `date` under active assignments.
    async fn days_on_date(&self, date: NaiveDate) -> Result<Vec<AssignmentDay>, StoreError>;
    async fn delete_day(&self, id: DayId) -> Result<Option<AssignmentDay>, StoreError>;

    // ── Exclusions ───────────────────────────────────────────

    /// Record an exclusion. Returns false if the date was already excluded.
    async fn insert_exclusion(&self, exclusion: ExcludedDate) -> Result<bool, StoreError>;
    async fn is_excluded(
        &self,
        assignment_id: AssignmentId,
        date: NaiveDate,
    ) -> Result<bool, StoreError>;
    async fn exclusions_for_assignment(
        &self,
        assignment_id: AssignmentId,
    ) -> Result<Vec<ExcludedDate>, StoreError>;

    // ── Conflicts ────────────────────────────────────────────

    /// Insert or overwrite by id.
    async fn save_conflict(&self, conflict: BookingConflict) -> Result<(), StoreError>;
    async fn conflict(&self, id: ConflictId) -> Result<Option<BookingConflict>, StoreError>;
    /// Conflicts of a user ordered by date then detection order.
    async fn conflicts_for_user(&self, user_id: UserId)
    -> Result<Vec<BookingConflict>, StoreError>;

    // ── Confirmation requests ────────────────────────────────

    /// Insert or overwrite by id.
    async fn save_confirmation(&self, request: ConfirmationRequest) -> Result<(), StoreError>;
    async fn confirmation(
        &self,
        id: RequestId,
    ) -> Result<Option<ConfirmationRequest>, StoreError>;
    /// Requests for a project, newest first.
    async fn confirmations_for_project(
        &self,
        project_id: ProjectId,
    ) -> Result<Vec<ConfirmationRequest>, StoreError>;
}
