//! Topic priority scoring.
//!
//! Each topic of a plan is scored from its study history: a low hit rate
//! dominates, staleness (scaled by the user's relevance weight) comes next and
//! raw study frequency breaks near-ties.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::models::{StudyRecord, DEFAULT_USER_WEIGHT};

pub const NEVER_STUDIED_DAYS: i64 = 999;

const ERROR_WEIGHT: f64 = 0.5;
const FREQUENCY_WEIGHT: f64 = 0.2;
const TIME_WEIGHT: f64 = 0.3;
const MAX_USER_WEIGHT: f64 = 5.0;

/// A topic to score, with its optional relevance weight (1..=5).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicRef {
    pub subject: String,
    pub topic: String,
    pub user_weight: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicMetrics {
    pub subject: String,
    pub topic: String,
    pub hit_rate: f64,
    pub total_questions: u32,
    pub study_count: u32,
    pub days_since_last_study: i64,
    pub user_weight: u8,
}

impl TopicMetrics {
    /// Aggregate the records of one (subject, topic) pair.
    pub fn collect(topic: &TopicRef, records: &[StudyRecord], today: NaiveDate) -> Self {
        let mut total_questions = 0;
        let mut correct = 0;
        let mut study_count = 0;
        let mut last_study: Option<NaiveDate> = None;

        for r in records
            .iter()
            .filter(|r| r.subject == topic.subject && r.topic == topic.topic)
        {
            total_questions += r.total;
            correct += r.correct;
            study_count += 1;
            last_study = Some(last_study.map_or(r.date, |d| d.max(r.date)));
        }

        // Untested topics are neutral, not weak.
        let hit_rate = if total_questions > 0 {
            correct as f64 / total_questions as f64
        } else {
            1.0
        };

        let days_since_last_study = last_study
            .map(|d| (today - d).num_days().max(0))
            .unwrap_or(NEVER_STUDIED_DAYS);

        Self {
            subject: topic.subject.clone(),
            topic: topic.topic.clone(),
            hit_rate,
            total_questions,
            study_count,
            days_since_last_study,
            user_weight: topic.user_weight.unwrap_or(DEFAULT_USER_WEIGHT),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicScore {
    #[serde(flatten)]
    pub metrics: TopicMetrics,
    pub score: f64,
    pub justification: String,
}

impl TopicScore {
    pub fn subject(&self) -> &str {
        &self.metrics.subject
    }

    pub fn topic(&self) -> &str {
        &self.metrics.topic
    }
}

pub fn score_topics(records: &[StudyRecord], topics: &[TopicRef], today: NaiveDate) -> Vec<TopicScore> {
    let metrics = topics
        .iter()
        .map(|t| TopicMetrics::collect(t, records, today))
        .collect();
    score_metrics(metrics)
}

/// Score already aggregated metrics, highest priority first. Ties keep their
/// input order.
pub fn score_metrics(metrics: Vec<TopicMetrics>) -> Vec<TopicScore> {
    let max_days = metrics
        .iter()
        .map(|m| m.days_since_last_study)
        .max()
        .unwrap_or(0)
        .max(1) as f64;
    let max_count = metrics
        .iter()
        .map(|m| m.study_count)
        .max()
        .unwrap_or(0)
        .max(1) as f64;

    let mut scores: Vec<TopicScore> = metrics
        .into_iter()
        .map(|m| {
            let error = 1.0 - m.hit_rate;
            let frequency = 1.0 - m.study_count as f64 / max_count;
            let time = m.days_since_last_study as f64 / max_days;
            let weight = m.user_weight as f64 / MAX_USER_WEIGHT;

            let score =
                ERROR_WEIGHT * error + FREQUENCY_WEIGHT * frequency + TIME_WEIGHT * (time * weight);
            let justification = justify(&m);
            TopicScore {
                metrics: m,
                score,
                justification,
            }
        })
        .collect();

    scores.sort_by(|a, b| b.score.total_cmp(&a.score));
    scores
}

fn justify(m: &TopicMetrics) -> String {
    let last = if m.days_since_last_study >= NEVER_STUDIED_DAYS {
        "never studied".to_string()
    } else {
        format!("last studied {}d ago", m.days_since_last_study)
    };
    format!(
        "Priority: hit rate {:.0}%, studied {}x, {}, relevance {}/5.",
        m.hit_rate * 100.0,
        m.study_count,
        last,
        m.user_weight
    )
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub topic: Option<TopicScore>,
    pub justification: String,
}

/// The highest-priority topic, optionally restricted to one subject.
pub fn recommend(scores: &[TopicScore], force_subject: Option<&str>) -> Recommendation {
    let pick = match force_subject {
        Some(subject) => scores.iter().find(|s| s.subject() == subject),
        None => scores.first(),
    };

    let justification = match (pick, force_subject) {
        (Some(score), _) => score.justification.clone(),
        (None, Some(subject)) => format!("No topics found for {}.", subject),
        (None, None) => "No topics to recommend.".to_string(),
    };

    Recommendation {
        topic: pick.cloned(),
        justification,
    }
}
