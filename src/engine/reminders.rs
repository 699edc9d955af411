use chrono::NaiveDate;
use tracing::info;

use crate::model::*;

use super::{Engine, EngineError};

impl Engine {
    /// Notify the assignee of every day scheduled on `date`.
    /// Draft assignments are internal and get no reminder. Returns the number sent.
    pub async fn send_day_reminders(&self, date: NaiveDate) -> Result<usize, EngineError> {
        let days = self.store.days_on_date(date).await?;
        let mut sent = 0;
        for day in days {
            let Some(assignment) = self.store.assignment(day.assignment_id).await? else {
                continue;
            };
            if !assignment.is_active() || assignment.booking_status == BookingStatus::Draft {
                continue;
            }
            self.notifier.send(
                Notification::new(Recipient::Member(assignment.user_id), TemplateKind::DayReminder)
                    .param("assignment_id", assignment.id)
                    .param("project_id", assignment.project_id)
                    .param("work_date", day.work_date)
                    .param("start_time", day.start_time.format("%H:%M"))
                    .param("end_time", day.end_time.format("%H:%M")),
            );
            sent += 1;
        }
        info!(%date, sent, "day reminders sent");
        Ok(sent)
    }
}
