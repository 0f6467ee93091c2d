use chrono::{Days, Months, NaiveDate};
use std::fmt;

use crate::error::{Error, Result};
use crate::models::{ReviewRecord, ReviewStatus, StudyRecord};

/// How long after a study session a review is due: `3d`, `2w` or `1m`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewPeriod {
    Days(u32),
    Weeks(u32),
    Months(u32),
}

impl ReviewPeriod {
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim().to_lowercase();
        let invalid = || Error::InvalidPeriod(s.clone());

        let unit = s.chars().last().ok_or_else(invalid)?;
        let digits = &s[..s.len() - unit.len_utf8()];
        // u32::from_str would also take a leading '+'
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let amount: u32 = digits.parse().map_err(|_| invalid())?;
        if amount == 0 {
            return Err(invalid());
        }

        match unit {
            'd' => Ok(ReviewPeriod::Days(amount)),
            'w' => Ok(ReviewPeriod::Weeks(amount)),
            'm' => Ok(ReviewPeriod::Months(amount)),
            _ => Err(invalid()),
        }
    }

    /// Month steps land on the same day of month, clamped to the month's end.
    pub fn scheduled_from(&self, date: NaiveDate) -> Option<NaiveDate> {
        match *self {
            ReviewPeriod::Days(n) => date.checked_add_days(Days::new(u64::from(n))),
            ReviewPeriod::Weeks(n) => date.checked_add_days(Days::new(u64::from(n) * 7)),
            ReviewPeriod::Months(n) => date.checked_add_months(Months::new(n)),
        }
    }
}

impl fmt::Display for ReviewPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReviewPeriod::Days(n) => write!(f, "{}d", n),
            ReviewPeriod::Weeks(n) => write!(f, "{}w", n),
            ReviewPeriod::Months(n) => write!(f, "{}m", n),
        }
    }
}

/// Parse a comma separated list such as `"1d, 1w,1m"`, dropping duplicates.
pub fn parse_periods(list: &str) -> Result<Vec<String>> {
    let mut periods: Vec<String> = Vec::new();
    for part in list.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let normalized = ReviewPeriod::parse(part)?.to_string();
        if !periods.contains(&normalized) {
            periods.push(normalized);
        }
    }
    Ok(periods)
}

/// One pending review per period of a stored record. Ids are left at 0 for
/// the store to assign.
pub fn schedule_reviews(record: &StudyRecord) -> Result<Vec<ReviewRecord>> {
    record
        .review_periods
        .iter()
        .map(|raw| {
            let period = ReviewPeriod::parse(raw)?;
            let scheduled_date = period
                .scheduled_from(record.date)
                .ok_or_else(|| Error::InvalidPeriod(raw.clone()))?;
            Ok(ReviewRecord {
                id: 0,
                study_record_id: record.id,
                subject: record.subject.clone(),
                topic: record.topic.clone(),
                period: period.to_string(),
                scheduled_date,
                status: ReviewStatus::Pending,
                completed_date: None,
            })
        })
        .collect()
}

pub fn is_due(review: &ReviewRecord, today: NaiveDate) -> bool {
    review.status == ReviewStatus::Pending && review.scheduled_date <= today
}
