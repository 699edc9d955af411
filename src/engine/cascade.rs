use std::collections::BTreeSet;

use tracing::{debug, info, warn};

use crate::limits::{MAX_SCHEDULE_STATUS_LEN, MAX_SELECTION_SIZE};
use crate::model::*;

use super::{Engine, EngineError, Transition};

/// Candidate set plus the operator's selection for a status cascade.
///
/// Built by [`Engine::cascade_candidates`] with every candidate selected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CascadePlan {
    pub project_id: ProjectId,
    pub candidates: Vec<Assignment>,
    pub selected: BTreeSet<AssignmentId>,
}

impl CascadePlan {
    pub fn deselect(&mut self, id: AssignmentId) -> bool {
        self.selected.remove(&id)
    }

    /// Select a candidate. Non-candidates are refused.
    pub fn select(&mut self, id: AssignmentId) -> bool {
        if !self.candidates.iter().any(|a| a.id == id) {
            return false;
        }
        self.selected.insert(id)
    }

    pub fn select_none(&mut self) {
        self.selected.clear();
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CascadeOutcome {
    Updated { from: BookingStatus, to: BookingStatus },
    /// Already at the target status.
    Unchanged,
    /// Not an active assignment of this project (any more).
    NotCandidate,
    Failed(EngineError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CascadeReport {
    pub project: Project,
    pub outcomes: Vec<(AssignmentId, CascadeOutcome)>,
}

impl CascadeReport {
    pub fn updated(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, CascadeOutcome::Updated { .. }))
            .count()
    }
}

impl Engine {
    /// Active assignments of a project, all pre-selected.
    pub async fn cascade_candidates(&self, project_id: ProjectId) -> Result<CascadePlan, EngineError> {
        self.load_project(project_id).await?;
        let candidates = self.store.assignments_for_project(project_id).await?;
        let selected = candidates.iter().map(|a| a.id).collect();
        Ok(CascadePlan {
            project_id,
            candidates,
            selected,
        })
    }

    /// Change the project's schedule status, then set `target` booking status
    /// on exactly the selected candidates. `pending_confirm` is refused as a
    /// target; it needs a confirmation request.
    ///
    /// The project change always goes through, even with an empty selection;
    /// per-assignment failures are reported, not raised.
    pub async fn change_project_status(
        &self,
        plan: &CascadePlan,
        schedule_status: &str,
        target: BookingStatus,
    ) -> Result<CascadeReport, EngineError> {
        if schedule_status.len() > MAX_SCHEDULE_STATUS_LEN {
            return Err(EngineError::LimitExceeded("schedule status too long"));
        }
        if plan.selected.len() > MAX_SELECTION_SIZE {
            return Err(EngineError::LimitExceeded("selection too large"));
        }
        if target == BookingStatus::PendingConfirm {
            return Err(EngineError::ReservedStatus(target));
        }
        let mut project = self.load_project(plan.project_id).await?;
        if project.schedule_status != schedule_status {
            project.schedule_status = schedule_status.to_string();
            self.store.save_project(project.clone()).await?;
            info!(project = %project.id, schedule_status, "project schedule status changed");
        }

        // Candidate order first, then selected ids that were never candidates.
        let mut order: Vec<AssignmentId> = plan
            .candidates
            .iter()
            .map(|a| a.id)
            .filter(|id| plan.selected.contains(id))
            .collect();
        order.extend(
            plan.selected
                .iter()
                .filter(|id| !plan.candidates.iter().any(|a| a.id == **id)),
        );

        let users = plan
            .candidates
            .iter()
            .filter(|a| plan.selected.contains(&a.id))
            .map(|a| a.user_id);
        let _guards = self.lock_users(users).await;

        let mut outcomes = Vec::with_capacity(order.len());
        for id in order {
            let outcome = match self.cascade_one(plan, id, target).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(assignment = %id, "cascade failed: {e}");
                    CascadeOutcome::Failed(e)
                }
            };
            if outcome == CascadeOutcome::NotCandidate {
                debug!(assignment = %id, project = %plan.project_id, "cascade skipped non-candidate");
            }
            outcomes.push((id, outcome));
        }

        let report = CascadeReport { project, outcomes };
        info!(
            project = %plan.project_id,
            %target,
            selected = plan.selected.len(),
            updated = report.updated(),
            "status cascade applied"
        );
        Ok(report)
    }

    async fn cascade_one(
        &self,
        plan: &CascadePlan,
        id: AssignmentId,
        target: BookingStatus,
    ) -> Result<CascadeOutcome, EngineError> {
        let Some(candidate) = plan.candidates.iter().find(|a| a.id == id) else {
            return Ok(CascadeOutcome::NotCandidate);
        };
        // Re-read under the lock; the plan may be stale.
        let Some(mut assignment) = self.store.assignment(candidate.id).await? else {
            return Ok(CascadeOutcome::NotCandidate);
        };
        if !assignment.is_active() || assignment.project_id != plan.project_id {
            return Ok(CascadeOutcome::NotCandidate);
        }
        let from = self
            .apply_transition(&mut assignment, Transition::Set(target))
            .await?;
        if from == target {
            return Ok(CascadeOutcome::Unchanged);
        }
        Ok(CascadeOutcome::Updated { from, to: target })
    }
}
