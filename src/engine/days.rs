use chrono::{Datelike, NaiveDate, Weekday};

use crate::limits::MAX_RANGE_DAYS;
use crate::model::Project;

use super::EngineError;

/// Which weekdays of a range are schedulable.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DayFilter {
    #[default]
    All,
    /// Monday through Friday.
    Workdays,
    Only(Vec<Weekday>),
}

impl DayFilter {
    pub fn matches(&self, date: NaiveDate) -> bool {
        let weekday = date.weekday();
        match self {
            DayFilter::All => true,
            DayFilter::Workdays => !matches!(weekday, Weekday::Sat | Weekday::Sun),
            DayFilter::Only(days) => days.contains(&weekday),
        }
    }
}

/// Expand an inclusive `[start, end]` range into ordered, distinct dates.
///
/// A missing bound yields an empty list. `start > end` is an error, as is a
/// range wider than `MAX_RANGE_DAYS`.
pub fn generate_days(
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    filter: &DayFilter,
) -> Result<Vec<NaiveDate>, EngineError> {
    let (Some(start), Some(end)) = (start, end) else {
        return Ok(Vec::new());
    };
    if start > end {
        return Err(EngineError::InvalidDateRange { start, end });
    }
    if (end - start).num_days() + 1 > MAX_RANGE_DAYS {
        return Err(EngineError::LimitExceeded("date range too wide"));
    }
    Ok(start
        .iter_days()
        .take_while(|d| *d <= end)
        .filter(|d| filter.matches(*d))
        .collect())
}

/// Check that `date` lies inside the project's inclusive range.
pub(crate) fn check_in_project(project: &Project, date: NaiveDate) -> Result<(), EngineError> {
    if project.range().is_none() {
        return Err(EngineError::ProjectUndated(project.id));
    }
    if !project.contains(date) {
        return Err(EngineError::OutsideProjectRange(date));
    }
    Ok(())
}
