use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::cycle::SubjectSettings;
use crate::error::{Error, Result};
use crate::scoring::TopicRef;

pub const DEFAULT_RATING: u8 = 3;
pub const DEFAULT_USER_WEIGHT: u8 = 3;
pub const DEFAULT_COLOR: &str = "#94A3B8";

/// Ratings (importance, knowledge, topic weight) are integers in 1..=5.
pub fn validate_rating(field: &'static str, value: i64) -> Result<u8> {
    if (1..=5).contains(&value) {
        Ok(value as u8)
    } else {
        Err(Error::InvalidRating { field, value })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub id: i64,
    pub name: String,
    pub observations: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    pub id: i64,
    pub plan_id: i64,
    pub name: String,
    pub color: String,
    pub importance: u8,
    pub knowledge: u8,
    pub topics: Vec<Topic>,
}

impl Subject {
    pub fn settings(&self) -> SubjectSettings {
        SubjectSettings {
            importance: u32::from(self.importance),
            knowledge: u32::from(self.knowledge),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topic {
    pub id: i64,
    pub subject_id: i64,
    pub label: String,
    pub user_weight: Option<u8>,
}

impl Topic {
    pub fn weight(&self) -> u8 {
        self.user_weight.unwrap_or(DEFAULT_USER_WEIGHT)
    }
}

/// A plan with its syllabus, as handed to the cycle generator and the scorer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanData {
    pub plan: Plan,
    pub subjects: Vec<Subject>,
}

impl PlanData {
    pub fn subject(&self, name: &str) -> Option<&Subject> {
        self.subjects.iter().find(|s| s.name == name)
    }

    /// Importance/knowledge per subject. With `only` set, subjects not listed
    /// are left out of the cycle.
    pub fn subject_settings(&self, only: Option<&[String]>) -> BTreeMap<String, SubjectSettings> {
        self.subjects
            .iter()
            .filter(|s| only.map_or(true, |names| names.iter().any(|n| n == &s.name)))
            .map(|s| (s.name.clone(), s.settings()))
            .collect()
    }

    pub fn subject_colors(&self) -> HashMap<String, String> {
        self.subjects
            .iter()
            .map(|s| (s.name.clone(), s.color.clone()))
            .collect()
    }

    /// Every (subject, topic) pair in syllabus order.
    pub fn topic_refs(&self) -> Vec<TopicRef> {
        self.subjects
            .iter()
            .flat_map(|s| {
                s.topics.iter().map(move |t| TopicRef {
                    subject: s.name.clone(),
                    topic: t.label.clone(),
                    user_weight: t.user_weight,
                })
            })
            .collect()
    }

    pub fn topic_count(&self) -> usize {
        self.subjects.iter().map(|s| s.topics.len()).sum()
    }
}

/// A study session the user has logged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudyRecord {
    pub id: i64,
    pub plan_id: i64,
    pub date: NaiveDate,
    pub subject: String,
    pub topic: String,
    pub duration_minutes: u32,
    pub correct: u32,
    pub total: u32,
    pub category: String,
    pub notes: Option<String>,
    pub review_periods: Vec<String>,
    pub theory_finished: bool,
}

/// Fields of a study record before it is stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewStudyRecord {
    pub date: NaiveDate,
    pub subject: String,
    pub topic: String,
    pub duration_minutes: u32,
    pub correct: u32,
    pub total: u32,
    pub category: String,
    pub notes: Option<String>,
    pub review_periods: Vec<String>,
    pub theory_finished: bool,
}

impl NewStudyRecord {
    pub fn validate(&self) -> Result<()> {
        if self.correct > self.total {
            return Err(Error::InvalidConfig(format!(
                "correct answers ({}) exceed total questions ({})",
                self.correct, self.total
            )));
        }
        Ok(())
    }
}

impl From<StudyRecord> for NewStudyRecord {
    fn from(r: StudyRecord) -> Self {
        Self {
            date: r.date,
            subject: r.subject,
            topic: r.topic,
            duration_minutes: r.duration_minutes,
            correct: r.correct,
            total: r.total,
            category: r.category,
            notes: r.notes,
            review_periods: r.review_periods,
            theory_finished: r.theory_finished,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReviewStatus {
    Pending,
    Completed,
    Skipped,
}

impl ReviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewStatus::Pending => "pending",
            ReviewStatus::Completed => "completed",
            ReviewStatus::Skipped => "skipped",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(ReviewStatus::Pending),
            "completed" | "done" => Some(ReviewStatus::Completed),
            "skipped" | "skip" => Some(ReviewStatus::Skipped),
            _ => None,
        }
    }
}

// A spaced-repetition follow-up of a study record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewRecord {
    pub id: i64,
    pub study_record_id: i64,
    pub subject: String,
    pub topic: String,
    pub period: String,
    pub scheduled_date: NaiveDate,
    pub status: ReviewStatus,
    pub completed_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MockExamSubject {
    pub name: String,
    pub weight: u32,
    pub total: u32,
    pub correct: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MockExam {
    pub id: i64,
    pub plan_id: i64,
    pub date: NaiveDate,
    pub name: String,
    pub board: Option<String>,
    pub time_spent: Option<String>,
    pub comments: Option<String>,
    pub subjects: Vec<MockExamSubject>,
}

impl MockExam {
    pub fn total_questions(&self) -> u64 {
        self.subjects.iter().map(|s| u64::from(s.total)).sum()
    }

    pub fn total_correct(&self) -> u64 {
        self.subjects.iter().map(|s| u64::from(s.correct)).sum()
    }

    /// Unweighted share of correct answers, in percent.
    pub fn hit_rate(&self) -> f64 {
        let total = self.total_questions();
        if total == 0 {
            0.0
        } else {
            self.total_correct() as f64 / total as f64 * 100.0
        }
    }

    /// Share of points earned when each subject's questions count `weight` times.
    pub fn weighted_score(&self) -> f64 {
        let possible: u64 = self
            .subjects
            .iter()
            .map(|s| u64::from(s.weight) * u64::from(s.total))
            .sum();
        if possible == 0 {
            return 0.0;
        }
        let earned: u64 = self
            .subjects
            .iter()
            .map(|s| u64::from(s.weight) * u64::from(s.correct))
            .sum();
        earned as f64 / possible as f64 * 100.0
    }
}

// JSON output wrapper for CLI
#[derive(Debug, Serialize)]
pub struct JsonOutput<T: Serialize> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T: Serialize> JsonOutput<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan_data() -> PlanData {
        PlanData {
            plan: Plan {
                id: 1,
                name: "Tax Auditor".to_string(),
                observations: None,
                created_at: "2026-01-01 00:00:00".to_string(),
            },
            subjects: vec![
                Subject {
                    id: 1,
                    plan_id: 1,
                    name: "Law".to_string(),
                    color: "#ff0000".to_string(),
                    importance: 5,
                    knowledge: 2,
                    topics: vec![
                        Topic {
                            id: 1,
                            subject_id: 1,
                            label: "Contracts".to_string(),
                            user_weight: Some(5),
                        },
                        Topic {
                            id: 2,
                            subject_id: 1,
                            label: "Torts".to_string(),
                            user_weight: None,
                        },
                    ],
                },
                Subject {
                    id: 2,
                    plan_id: 1,
                    name: "Accounting".to_string(),
                    color: DEFAULT_COLOR.to_string(),
                    importance: 3,
                    knowledge: 3,
                    topics: vec![Topic {
                        id: 3,
                        subject_id: 2,
                        label: "Ledgers".to_string(),
                        user_weight: Some(1),
                    }],
                },
            ],
        }
    }

    mod rating_tests {
        use super::*;

        #[test]
        fn accepts_one_to_five() {
            for v in 1..=5 {
                assert_eq!(validate_rating("importance", v).unwrap(), v as u8);
            }
        }

        #[test]
        fn rejects_out_of_range() {
            assert!(matches!(
                validate_rating("knowledge", 0),
                Err(Error::InvalidRating {
                    field: "knowledge",
                    value: 0
                })
            ));
            assert!(validate_rating("knowledge", 6).is_err());
            assert!(validate_rating("knowledge", -3).is_err());
        }
    }

    mod plan_data_tests {
        use super::*;

        #[test]
        fn topic_refs_keep_syllabus_order() {
            let refs = plan_data().topic_refs();
            let labels: Vec<_> = refs.iter().map(|r| r.topic.as_str()).collect();
            assert_eq!(labels, vec!["Contracts", "Torts", "Ledgers"]);
            assert_eq!(refs[1].user_weight, None);
            assert_eq!(refs[2].subject, "Accounting");
        }

        #[test]
        fn subject_settings_filtered() {
            let data = plan_data();
            let all = data.subject_settings(None);
            assert_eq!(all.len(), 2);
            assert_eq!(all["Law"].importance, 5);
            assert_eq!(all["Law"].knowledge, 2);

            let only = vec!["Accounting".to_string()];
            let some = data.subject_settings(Some(&only));
            assert_eq!(some.len(), 1);
            assert!(some.contains_key("Accounting"));
        }

        #[test]
        fn subject_colors_and_counts() {
            let data = plan_data();
            assert_eq!(data.subject_colors()["Law"], "#ff0000");
            assert_eq!(data.topic_count(), 3);
            assert!(data.subject("Law").is_some());
            assert!(data.subject("Physics").is_none());
        }

        #[test]
        fn topic_weight_defaults_to_three() {
            let data = plan_data();
            assert_eq!(data.subjects[0].topics[1].weight(), 3);
            assert_eq!(data.subjects[0].topics[0].weight(), 5);
        }
    }

    mod record_tests {
        use super::*;

        fn new_record(correct: u32, total: u32) -> NewStudyRecord {
            NewStudyRecord {
                date: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
                subject: "Law".to_string(),
                topic: "Contracts".to_string(),
                duration_minutes: 50,
                correct,
                total,
                category: "Theory".to_string(),
                notes: None,
                review_periods: vec![],
                theory_finished: false,
            }
        }

        #[test]
        fn validate_accepts_consistent_counts() {
            assert!(new_record(0, 0).validate().is_ok());
            assert!(new_record(7, 10).validate().is_ok());
            assert!(new_record(10, 10).validate().is_ok());
        }

        #[test]
        fn validate_rejects_more_correct_than_total() {
            assert!(new_record(11, 10).validate().is_err());
        }
    }

    mod review_status_tests {
        use super::*;

        #[test]
        fn round_trips_through_str() {
            for status in [
                ReviewStatus::Pending,
                ReviewStatus::Completed,
                ReviewStatus::Skipped,
            ] {
                assert_eq!(ReviewStatus::from_str(status.as_str()), Some(status));
            }
        }

        #[test]
        fn accepts_aliases() {
            assert_eq!(ReviewStatus::from_str("DONE"), Some(ReviewStatus::Completed));
            assert_eq!(ReviewStatus::from_str("skip"), Some(ReviewStatus::Skipped));
            assert_eq!(ReviewStatus::from_str("later"), None);
        }
    }

    mod mock_exam_tests {
        use super::*;

        fn exam(subjects: Vec<MockExamSubject>) -> MockExam {
            MockExam {
                id: 1,
                plan_id: 1,
                date: NaiveDate::from_ymd_opt(2026, 5, 10).unwrap(),
                name: "Mock 1".to_string(),
                board: None,
                time_spent: None,
                comments: None,
                subjects,
            }
        }

        #[test]
        fn empty_exam_scores_zero() {
            let e = exam(vec![]);
            assert_eq!(e.hit_rate(), 0.0);
            assert_eq!(e.weighted_score(), 0.0);
        }

        #[test]
        fn weighted_score_counts_weights() {
            let e = exam(vec![
                MockExamSubject {
                    name: "Law".to_string(),
                    weight: 2,
                    total: 10,
                    correct: 10,
                },
                MockExamSubject {
                    name: "Accounting".to_string(),
                    weight: 1,
                    total: 10,
                    correct: 0,
                },
            ]);
            assert_eq!(e.total_questions(), 20);
            assert_eq!(e.total_correct(), 10);
            assert_eq!(e.hit_rate(), 50.0);
            // 20 of 30 weighted points
            assert!((e.weighted_score() - 66.666_666).abs() < 1e-3);
        }

        #[test]
        fn large_weights_and_totals_do_not_overflow() {
            let e = exam(vec![
                MockExamSubject {
                    name: "Law".to_string(),
                    weight: 100_000,
                    total: 100_000,
                    correct: 50_000,
                },
                MockExamSubject {
                    name: "Tax".to_string(),
                    weight: 1,
                    total: u32::MAX,
                    correct: u32::MAX,
                },
            ]);
            assert_eq!(e.total_questions(), 100_000 + u64::from(u32::MAX));
            assert_eq!(e.total_correct(), 50_000 + u64::from(u32::MAX));
            // 5e9 + 4294967295 of 1e10 + 4294967295 weighted points
            let expected = (5_000_000_000.0 + u32::MAX as f64) / (10_000_000_000.0 + u32::MAX as f64) * 100.0;
            assert!((e.weighted_score() - expected).abs() < 1e-9);
        }
    }

    mod json_output_tests {
        use super::*;

        #[test]
        fn serializes_ok_correctly() {
            let output = JsonOutput::ok("test");
            let json = serde_json::to_string(&output).unwrap();
            assert!(json.contains("\"success\":true"));
            assert!(json.contains("\"data\":\"test\""));
            assert!(json.contains("\"error\":null"));
        }

        #[test]
        fn serializes_err_correctly() {
            let output = JsonOutput::<()>::err("error");
            let json = serde_json::to_string(&output).unwrap();
            assert!(json.contains("\"success\":false"));
            assert!(json.contains("\"data\":null"));
            assert!(json.contains("\"error\":\"error\""));
        }
    }
}
