use std::collections::BTreeSet;

use chrono::NaiveDate;

use crate::model::*;

use super::days::{DayFilter, generate_days};
use super::{Engine, EngineError};

impl Engine {
    pub async fn project(&self, id: ProjectId) -> Result<Project, EngineError> {
        self.load_project(id).await
    }

    pub async fn assignment(&self, id: AssignmentId) -> Result<Assignment, EngineError> {
        self.load_assignment(id).await
    }

    pub async fn assignments_for_project(
        &self,
        project_id: ProjectId,
    ) -> Result<Vec<Assignment>, EngineError> {
        Ok(self.store.assignments_for_project(project_id).await?)
    }

    pub async fn assignments_for_user(&self, user_id: UserId) -> Result<Vec<Assignment>, EngineError> {
        Ok(self.store.assignments_for_user(user_id).await?)
    }

    pub async fn days_for_assignment(
        &self,
        assignment_id: AssignmentId,
    ) -> Result<Vec<AssignmentDay>, EngineError> {
        Ok(self.store.days_for_assignment(assignment_id).await?)
    }

    pub async fn exclusions_for_assignment(
        &self,
        assignment_id: AssignmentId,
    ) -> Result<Vec<ExcludedDate>, EngineError> {
        Ok(self.store.exclusions_for_assignment(assignment_id).await?)
    }

    /// Project dates matching `filter`, minus the assignment's exclusions.
    /// This is what a calendar offers for selection.
    pub async fn schedulable_days(
        &self,
        assignment_id: AssignmentId,
        filter: &DayFilter,
    ) -> Result<Vec<NaiveDate>, EngineError> {
        let assignment = self.load_assignment(assignment_id).await?;
        let project = self.load_project(assignment.project_id).await?;
        let excluded: BTreeSet<NaiveDate> = self
            .store
            .exclusions_for_assignment(assignment_id)
            .await?
            .into_iter()
            .map(|e| e.excluded_date)
            .collect();
        let mut days = generate_days(project.start_date, project.end_date, filter)?;
        days.retain(|d| !excluded.contains(d));
        Ok(days)
    }

    pub async fn conflicts_for_user(
        &self,
        user_id: UserId,
        unresolved_only: bool,
    ) -> Result<Vec<BookingConflict>, EngineError> {
        let mut conflicts = self.store.conflicts_for_user(user_id).await?;
        if unresolved_only {
            conflicts.retain(|c| !c.is_resolved());
        }
        Ok(conflicts)
    }

    /// Conflicts where the assignment sits on either side.
    pub async fn conflicts_for_assignment(
        &self,
        assignment_id: AssignmentId,
    ) -> Result<Vec<BookingConflict>, EngineError> {
        let assignment = self.load_assignment(assignment_id).await?;
        let mut conflicts = self.store.conflicts_for_user(assignment.user_id).await?;
        conflicts.retain(|c| c.assignment_id == assignment_id || c.other_assignment_id == assignment_id);
        Ok(conflicts)
    }

    /// Requests for a project, newest first. Use
    /// [`ConfirmationRequest::is_expired`] to flag stale ones.
    pub async fn confirmations_for_project(
        &self,
        project_id: ProjectId,
    ) -> Result<Vec<ConfirmationRequest>, EngineError> {
        Ok(self.store.confirmations_for_project(project_id).await?)
    }
}
