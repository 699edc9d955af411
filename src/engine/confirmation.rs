use std::sync::LazyLock;

use chrono::{Duration, Utc};
use regex::Regex;
use tracing::{debug, info};

use crate::limits::*;
use crate::model::*;

use super::{Engine, EngineError, Transition};

/// Pragmatic address check: dot-atom local part, dotted hostname with labels
/// of at most 63 chars, at least one dot in the domain.
pub const EMAIL_PATTERN: &str = r"^[A-Za-z0-9!#$%&'*+/=?^_`{|}~-]+(?:\.[A-Za-z0-9!#$%&'*+/=?^_`{|}~-]+)*@[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?)+$";

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(EMAIL_PATTERN).expect("valid regex"));

pub fn validate_email(email: &str) -> Result<(), EngineError> {
    if email.len() > MAX_EMAIL_LEN || !EMAIL_RE.is_match(email) {
        return Err(EngineError::InvalidEmail(email.to_string()));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseOutcome {
    Transitioned { from: BookingStatus, to: BookingStatus },
    /// Left alone: no longer pending_confirm (status shown) or cancelled.
    Skipped(BookingStatus),
    Missing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmationOutcome {
    pub request: ConfirmationRequest,
    pub outcomes: Vec<(AssignmentId, ResponseOutcome)>,
}

impl Engine {
    /// Batch tentative assignments into one customer confirmation request.
    ///
    /// All-or-nothing validation: any id that is not a tentative, active
    /// assignment of `project_id` rejects the whole request.
    pub async fn create_confirmation_request(
        &self,
        project_id: ProjectId,
        assignment_ids: &[AssignmentId],
        recipient_email: &str,
        recipient_name: &str,
    ) -> Result<ConfirmationRequest, EngineError> {
        if assignment_ids.is_empty() {
            return Err(EngineError::EmptySelection);
        }
        if assignment_ids.len() > MAX_SELECTION_SIZE {
            return Err(EngineError::LimitExceeded("selection too large"));
        }
        validate_email(recipient_email)?;
        if recipient_name.len() > MAX_RECIPIENT_NAME_LEN {
            return Err(EngineError::LimitExceeded("recipient name too long"));
        }
        let project = self.load_project(project_id).await?;

        let mut ids: Vec<AssignmentId> = Vec::with_capacity(assignment_ids.len());
        for id in assignment_ids {
            if !ids.contains(id) {
                ids.push(*id);
            }
        }
        let mut users = Vec::with_capacity(ids.len());
        for id in &ids {
            users.push(self.load_assignment(*id).await?.user_id);
        }
        let _guards = self.lock_users(users).await;

        let mut assignments = Vec::with_capacity(ids.len());
        for id in &ids {
            let assignment = self.load_assignment(*id).await?;
            if !assignment.is_active() {
                return Err(EngineError::NotActive(*id));
            }
            if assignment.project_id != project_id {
                return Err(EngineError::NotOnProject {
                    assignment_id: *id,
                    project_id,
                });
            }
            if assignment.booking_status.apply(Transition::SendForConfirmation).is_none() {
                return Err(EngineError::IneligibleStatus {
                    id: *id,
                    status: assignment.booking_status,
                    transition: Transition::SendForConfirmation,
                });
            }
            assignments.push(assignment);
        }

        let request = ConfirmationRequest::new(
            project_id,
            ids,
            recipient_email.to_string(),
            recipient_name.to_string(),
            Utc::now(),
            Duration::days(CONFIRMATION_TTL_DAYS),
        );
        self.store.save_confirmation(request.clone()).await?;
        for assignment in &mut assignments {
            self.apply_transition(assignment, Transition::SendForConfirmation)
                .await?;
        }

        metrics::counter!(crate::observability::CONFIRMATIONS_CREATED_TOTAL).increment(1);
        info!(
            request = %request.id,
            project = %project_id,
            assignments = request.assignment_ids.len(),
            expires_at = %request.expires_at,
            "confirmation request created"
        );
        self.notifier.send(
            Notification::new(
                Recipient::Email {
                    address: request.recipient_email.clone(),
                    name: request.recipient_name.clone(),
                },
                TemplateKind::ConfirmationRequest,
            )
            .param("request_id", request.id)
            .param("project_id", project_id)
            .param("client_name", &project.client_name)
            .param("assignment_count", request.assignment_ids.len())
            .param("expires_at", request.expires_at.to_rfc3339()),
        );
        Ok(request)
    }

    /// Consume the customer's answer. Each request can be answered once.
    ///
    /// Expiry is advisory: a late answer is still applied.
    pub async fn respond_to_confirmation(
        &self,
        request_id: RequestId,
        response: ConfirmationResponse,
    ) -> Result<ConfirmationOutcome, EngineError> {
        let mut request = self
            .store
            .confirmation(request_id)
            .await?
            .ok_or(EngineError::NotFound(request_id))?;
        if !request.is_pending() {
            return Err(EngineError::AlreadyAnswered(request_id));
        }
        let now = Utc::now();
        if request.is_expired(now) {
            debug!(request = %request_id, "answer received after expiry");
        }

        let mut users = Vec::with_capacity(request.assignment_ids.len());
        for id in &request.assignment_ids {
            if let Some(a) = self.store.assignment(*id).await? {
                users.push(a.user_id);
            }
        }
        let _guards = self.lock_users(users).await;

        // Re-check under the locks: a concurrent answer may have won.
        request = self
            .store
            .confirmation(request_id)
            .await?
            .ok_or(EngineError::NotFound(request_id))?;
        if !request.is_pending() {
            return Err(EngineError::AlreadyAnswered(request_id));
        }

        let transition = Transition::Respond(response);
        let mut outcomes = Vec::with_capacity(request.assignment_ids.len());
        for id in &request.assignment_ids {
            let outcome = match self.store.assignment(*id).await? {
                None => ResponseOutcome::Missing,
                Some(a) if !a.is_active() || a.booking_status != BookingStatus::PendingConfirm => {
                    ResponseOutcome::Skipped(a.booking_status)
                }
                Some(mut a) => {
                    let from = self.apply_transition(&mut a, transition).await?;
                    ResponseOutcome::Transitioned {
                        from,
                        to: a.booking_status,
                    }
                }
            };
            outcomes.push((*id, outcome));
        }

        request.response = ResponseState::Answered {
            response,
            responded_at: now,
        };
        self.store.save_confirmation(request.clone()).await?;
        info!(request = %request_id, ?response, "confirmation answered");
        Ok(ConfirmationOutcome { request, outcomes })
    }

    /// Send a declined request again for whatever is still tentative.
    pub async fn resend_confirmation(
        &self,
        request_id: RequestId,
    ) -> Result<ConfirmationRequest, EngineError> {
        let request = self
            .store
            .confirmation(request_id)
            .await?
            .ok_or(EngineError::NotFound(request_id))?;
        let declined = matches!(
            request.response,
            ResponseState::Answered {
                response: ConfirmationResponse::Decline,
                ..
            }
        );
        if !declined {
            return Err(EngineError::NotDeclined(request_id));
        }

        let mut still_tentative = Vec::new();
        for id in &request.assignment_ids {
            if let Some(a) = self.store.assignment(*id).await?
                && a.is_active()
                && a.booking_status == BookingStatus::Tentative
            {
                still_tentative.push(a.id);
            }
        }
        if still_tentative.is_empty() {
            return Err(EngineError::EmptySelection);
        }
        self.create_confirmation_request(
            request.project_id,
            &still_tentative,
            &request.recipient_email,
            &request.recipient_name,
        )
        .await
    }
}
