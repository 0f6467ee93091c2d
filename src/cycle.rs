//! Weekly study cycle generation and lap tracking.
//!
//! Weekly time is split across subjects by importance alone; the
//! importance/knowledge ratio only decides how long each session of a subject
//! is. Sessions are interleaved round-robin in alphabetical subject order and
//! any minutes lost to whole-session rounding are spread back over the pool so
//! the cycle always sums to the weekly budget.

use chrono::Weekday;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::error::{Error, Result};
use crate::models::DEFAULT_COLOR;

// Theoretical range of importance / knowledge with both ratings in 1..=5.
const MIN_EFFECTIVE_WEIGHT: f64 = 1.0 / 5.0;
const MAX_EFFECTIVE_WEIGHT: f64 = 5.0;
const LENGTH_STEP_MINUTES: f64 = 5.0;

pub const MAX_WEEKLY_HOURS: u32 = 7 * 24;
pub const DEFAULT_WEEKLY_QUESTIONS_GOAL: u32 = 250;

/// Monday to Friday.
pub fn default_study_days() -> Vec<Weekday> {
    vec![
        Weekday::Mon,
        Weekday::Tue,
        Weekday::Wed,
        Weekday::Thu,
        Weekday::Fri,
    ]
}

fn default_questions_goal() -> u32 {
    DEFAULT_WEEKLY_QUESTIONS_GOAL
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectSettings {
    pub importance: u32,
    pub knowledge: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleParams {
    pub weekly_minutes: u32,
    pub min_session_minutes: u32,
    pub max_session_minutes: u32,
}

impl CycleParams {
    /// Validated constructor. The generator itself trusts its input, so this
    /// is the place where bad settings are turned away.
    pub fn new(weekly_hours: u32, min_session_minutes: u32, max_session_minutes: u32) -> Result<Self> {
        if weekly_hours == 0 {
            return Err(Error::InvalidConfig(
                "weekly study hours must be positive".to_string(),
            ));
        }
        if weekly_hours > MAX_WEEKLY_HOURS {
            return Err(Error::InvalidConfig(format!(
                "a week has only {} hours, got {}",
                MAX_WEEKLY_HOURS, weekly_hours
            )));
        }
        if min_session_minutes == 0 || max_session_minutes == 0 {
            return Err(Error::InvalidConfig(
                "session lengths must be positive".to_string(),
            ));
        }
        if min_session_minutes > max_session_minutes {
            return Err(Error::InvalidConfig(format!(
                "minimum session ({} min) is longer than maximum session ({} min)",
                min_session_minutes, max_session_minutes
            )));
        }
        Ok(Self {
            weekly_minutes: weekly_hours.checked_mul(60).ok_or_else(|| {
                Error::InvalidConfig(format!("{} weekly hours is out of range", weekly_hours))
            })?,
            min_session_minutes,
            max_session_minutes,
        })
    }
}

/// A planned slot in the cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudySession {
    pub id: String,
    pub subject: String,
    pub duration_minutes: u32,
    pub color: String,
}

/// How a subject's share of the week was turned into sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectAllocation {
    pub subject: String,
    pub allocated_minutes: f64,
    pub session_minutes: u32,
    pub session_count: u32,
}

/// Session length for a subject: the importance/knowledge ratio mapped
/// linearly onto `[min, max]`, snapped to 5 minutes.
pub fn session_length(settings: SubjectSettings, min: u32, max: u32) -> u32 {
    let effective = settings.importance as f64 / settings.knowledge.max(1) as f64;
    let normalized =
        (effective - MIN_EFFECTIVE_WEIGHT) / (MAX_EFFECTIVE_WEIGHT - MIN_EFFECTIVE_WEIGHT);
    let raw = min as f64 + (max - min) as f64 * normalized;
    let snapped = (raw / LENGTH_STEP_MINUTES).round() * LENGTH_STEP_MINUTES;
    snapped.clamp(min as f64, max as f64) as u32
}

/// Per-subject breakdown in alphabetical order. Empty when no importance is
/// configured.
pub fn allocate(
    params: &CycleParams,
    settings: &BTreeMap<String, SubjectSettings>,
) -> Vec<SubjectAllocation> {
    let total_importance: u64 = settings.values().map(|s| u64::from(s.importance)).sum();
    if total_importance == 0 {
        return Vec::new();
    }

    settings
        .iter()
        .map(|(name, s)| {
            let length = session_length(
                *s,
                params.min_session_minutes,
                params.max_session_minutes,
            );
            // weekly * importance / total, kept as an integer numerator so the
            // floor below is exact
            let share = u64::from(params.weekly_minutes) * u64::from(s.importance);
            let count = if length == 0 {
                0
            } else {
                share / (total_importance * u64::from(length))
            };
            SubjectAllocation {
                subject: name.clone(),
                allocated_minutes: share as f64 / total_importance as f64,
                session_minutes: length,
                session_count: count as u32,
            }
        })
        .collect()
}

/// Build the cycle. The result sums to `weekly_minutes` whenever at least one
/// session fits; otherwise it is empty.
pub fn generate_cycle(
    params: &CycleParams,
    settings: &BTreeMap<String, SubjectSettings>,
    colors: &HashMap<String, String>,
) -> Vec<StudySession> {
    let allocations = allocate(params, settings);
    let accounted: u32 = allocations
        .iter()
        .map(|a| a.session_minutes * a.session_count)
        .sum();

    let mut sessions = interleave(&allocations, colors);
    let lost = params.weekly_minutes.saturating_sub(accounted);
    redistribute(&mut sessions, lost);

    tracing::debug!(
        subjects = allocations.len(),
        sessions = sessions.len(),
        weekly_minutes = params.weekly_minutes,
        lost_minutes = lost,
        "generated study cycle"
    );
    sessions
}

// One session per subject per pass, subjects in allocation (alphabetical)
// order, until every quota is used up.
fn interleave(
    allocations: &[SubjectAllocation],
    colors: &HashMap<String, String>,
) -> Vec<StudySession> {
    let total: usize = allocations.iter().map(|a| a.session_count as usize).sum();
    let mut placed = vec![0u32; allocations.len()];
    let mut pool = Vec::with_capacity(total);

    while pool.len() < total {
        for (i, alloc) in allocations.iter().enumerate() {
            if placed[i] >= alloc.session_count {
                continue;
            }
            placed[i] += 1;
            pool.push(StudySession {
                id: format!("{}-{}", alloc.subject, placed[i]),
                subject: alloc.subject.clone(),
                duration_minutes: alloc.session_minutes,
                color: colors
                    .get(&alloc.subject)
                    .cloned()
                    .unwrap_or_else(|| DEFAULT_COLOR.to_string()),
            });
        }
    }

    pool
}

fn redistribute(sessions: &mut [StudySession], lost: u32) {
    if sessions.is_empty() || lost == 0 {
        return;
    }
    let n = sessions.len() as u32;
    let base = lost / n;
    let extra = lost % n;
    for (i, session) in sessions.iter_mut().enumerate() {
        session.duration_minutes += base;
        if (i as u32) < extra {
            session.duration_minutes += 1;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompletionEvent {
    Progressed {
        session_id: String,
        completed_minutes: u32,
        remaining_minutes: u32,
    },
    LapCompleted {
        completed_cycles: u32,
    },
}

/// Persisted cycle of a plan plus progress through the current lap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleState {
    pub params: Option<CycleParams>,
    pub sessions: Vec<StudySession>,
    /// Session id -> minutes studied in the current lap.
    pub progress: BTreeMap<String, u32>,
    pub completed_cycles: u32,
    pub lap_minutes: u32,
    #[serde(default = "default_questions_goal")]
    pub weekly_questions_goal: u32,
    /// Days the streak expects study on; other days never break it.
    #[serde(default = "default_study_days")]
    pub study_days: Vec<Weekday>,
}

impl Default for CycleState {
    fn default() -> Self {
        Self {
            params: None,
            sessions: Vec::new(),
            progress: BTreeMap::new(),
            completed_cycles: 0,
            lap_minutes: 0,
            weekly_questions_goal: DEFAULT_WEEKLY_QUESTIONS_GOAL,
            study_days: default_study_days(),
        }
    }
}

impl CycleState {
    pub fn new(params: CycleParams, sessions: Vec<StudySession>) -> Self {
        Self {
            params: Some(params),
            sessions,
            ..Self::default()
        }
    }

    pub fn total_minutes(&self) -> u32 {
        self.sessions.iter().map(|s| s.duration_minutes).sum()
    }

    pub fn session_progress(&self, id: &str) -> u32 {
        self.progress.get(id).copied().unwrap_or(0)
    }

    pub fn is_session_complete(&self, session: &StudySession) -> bool {
        self.session_progress(&session.id) >= session.duration_minutes
    }

    /// First session in cycle order that still has minutes left.
    pub fn next_session(&self) -> Option<&StudySession> {
        self.sessions.iter().find(|s| !self.is_session_complete(s))
    }

    pub fn lap_percentage(&self) -> f64 {
        let total = self.total_minutes();
        if total == 0 {
            0.0
        } else {
            (self.lap_minutes as f64 / total as f64 * 100.0).min(100.0)
        }
    }

    /// Log study time against a session; `None` counts the full planned
    /// duration. Finishing the last open session closes the lap and resets
    /// progress for the next one.
    pub fn complete_session(&mut self, id: &str, minutes: Option<u32>) -> Result<CompletionEvent> {
        let session = self
            .sessions
            .iter()
            .find(|s| s.id == id)
            .ok_or_else(|| Error::UnknownSession(id.to_string()))?;
        let minutes = minutes.unwrap_or(session.duration_minutes);
        let planned = session.duration_minutes;

        let entry = self.progress.entry(id.to_string()).or_insert(0);
        *entry = entry.saturating_add(minutes);
        let completed_minutes = *entry;
        self.lap_minutes = self.lap_minutes.saturating_add(minutes);

        if let Some(event) = self.close_lap_if_done() {
            return Ok(event);
        }

        Ok(CompletionEvent::Progressed {
            session_id: id.to_string(),
            completed_minutes,
            remaining_minutes: planned.saturating_sub(completed_minutes),
        })
    }

    /// Append a hand-planned session at the end of the cycle.
    pub fn add_session(&mut self, subject: &str, duration_minutes: u32, color: Option<&str>) -> &StudySession {
        let mut n = self.sessions.len() + 1;
        let mut id = format!("manual-{}", n);
        while self.sessions.iter().any(|s| s.id == id) {
            n += 1;
            id = format!("manual-{}", n);
        }

        self.sessions.push(StudySession {
            id,
            subject: subject.to_string(),
            duration_minutes,
            color: color.unwrap_or(DEFAULT_COLOR).to_string(),
        });
        &self.sessions[self.sessions.len() - 1]
    }

    /// Drop a session from the cycle. If every remaining session is already
    /// done, the lap closes as if the last one had just been finished.
    pub fn remove_session(&mut self, id: &str) -> Result<(StudySession, Option<CompletionEvent>)> {
        let index = self
            .sessions
            .iter()
            .position(|s| s.id == id)
            .ok_or_else(|| Error::UnknownSession(id.to_string()))?;
        let removed = self.sessions.remove(index);
        if let Some(done) = self.progress.remove(id) {
            self.lap_minutes = self.lap_minutes.saturating_sub(done);
        }
        Ok((removed, self.close_lap_if_done()))
    }

    fn close_lap_if_done(&mut self) -> Option<CompletionEvent> {
        if self.sessions.is_empty() || !self.sessions.iter().all(|s| self.is_session_complete(s)) {
            return None;
        }
        self.completed_cycles += 1;
        self.progress.clear();
        self.lap_minutes = 0;
        tracing::info!(completed_cycles = self.completed_cycles, "study cycle lap completed");
        Some(CompletionEvent::LapCompleted {
            completed_cycles: self.completed_cycles,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(entries: &[(&str, u32, u32)]) -> BTreeMap<String, SubjectSettings> {
        entries
            .iter()
            .map(|(name, importance, knowledge)| {
                (
                    name.to_string(),
                    SubjectSettings {
                        importance: *importance,
                        knowledge: *knowledge,
                    },
                )
            })
            .collect()
    }

    fn params(weekly_minutes: u32, min: u32, max: u32) -> CycleParams {
        CycleParams {
            weekly_minutes,
            min_session_minutes: min,
            max_session_minutes: max,
        }
    }

    fn total(sessions: &[StudySession]) -> u32 {
        sessions.iter().map(|s| s.duration_minutes).sum()
    }

    fn minutes_for(sessions: &[StudySession], subject: &str) -> u32 {
        sessions
            .iter()
            .filter(|s| s.subject == subject)
            .map(|s| s.duration_minutes)
            .sum()
    }

    mod params_tests {
        use super::*;

        #[test]
        fn converts_hours_to_minutes() {
            let p = CycleParams::new(10, 30, 90).unwrap();
            assert_eq!(p.weekly_minutes, 600);
            assert_eq!(p.min_session_minutes, 30);
            assert_eq!(p.max_session_minutes, 90);
        }

        #[test]
        fn equal_min_and_max_is_valid() {
            assert!(CycleParams::new(10, 60, 60).is_ok());
        }

        #[test]
        fn rejects_min_above_max() {
            assert!(matches!(
                CycleParams::new(10, 120, 60),
                Err(Error::InvalidConfig(_))
            ));
        }

        #[test]
        fn rejects_more_hours_than_a_week() {
            assert!(CycleParams::new(MAX_WEEKLY_HOURS, 60, 120).is_ok());
            assert!(matches!(
                CycleParams::new(MAX_WEEKLY_HOURS + 1, 60, 120),
                Err(Error::InvalidConfig(_))
            ));
            assert!(matches!(
                CycleParams::new(80_000_000, 60, 120),
                Err(Error::InvalidConfig(_))
            ));
            assert!(CycleParams::new(u32::MAX, 60, 120).is_err());
        }

        #[test]
        fn rejects_zero_values() {
            assert!(CycleParams::new(0, 60, 120).is_err());
            assert!(CycleParams::new(10, 0, 120).is_err());
            assert!(CycleParams::new(10, 60, 0).is_err());
        }
    }

    mod session_length_tests {
        use super::*;

        fn s(importance: u32, knowledge: u32) -> SubjectSettings {
            SubjectSettings {
                importance,
                knowledge,
            }
        }

        #[test]
        fn extremes_hit_bounds() {
            assert_eq!(session_length(s(5, 1), 60, 120), 120);
            assert_eq!(session_length(s(1, 5), 60, 120), 60);
        }

        #[test]
        fn balanced_subject_rounds_to_five() {
            // ratio 1.0 -> 60 + 60 * (0.8 / 4.8) = 70
            assert_eq!(session_length(s(3, 3), 60, 120), 70);
            // ratio 2.0 -> 60 + 60 * 0.375 = 82.5 -> 85
            assert_eq!(session_length(s(4, 2), 60, 120), 85);
        }

        #[test]
        fn zero_knowledge_is_floored_to_one() {
            assert_eq!(session_length(s(5, 0), 60, 120), session_length(s(5, 1), 60, 120));
        }

        #[test]
        fn out_of_range_ratings_are_clamped() {
            assert_eq!(session_length(s(0, 5), 60, 120), 60);
            assert_eq!(session_length(s(25, 1), 60, 120), 120);
        }

        #[test]
        fn equal_bounds_give_fixed_length() {
            assert_eq!(session_length(s(2, 4), 45, 45), 45);
            assert_eq!(session_length(s(5, 1), 45, 45), 45);
        }

        #[test]
        fn result_is_multiple_of_five_inside_bounds() {
            for importance in 1..=5 {
                for knowledge in 1..=5 {
                    let len = session_length(s(importance, knowledge), 30, 90);
                    assert!((30..=90).contains(&len));
                    assert_eq!(len % 5, 0, "length {} for {}/{}", len, importance, knowledge);
                }
            }
        }
    }

    mod allocate_tests {
        use super::*;

        #[test]
        fn empty_settings_allocate_nothing() {
            assert!(allocate(&params(600, 60, 120), &BTreeMap::new()).is_empty());
        }

        #[test]
        fn zero_total_importance_allocates_nothing() {
            let s = settings(&[("A", 0, 3), ("B", 0, 1)]);
            assert!(allocate(&params(600, 60, 120), &s).is_empty());
        }

        #[test]
        fn shares_follow_importance_only() {
            // Same importance, very different knowledge: equal minutes,
            // different session lengths.
            let s = settings(&[("A", 3, 1), ("B", 3, 5)]);
            let allocs = allocate(&params(600, 60, 120), &s);

            assert_eq!(allocs[0].allocated_minutes, 300.0);
            assert_eq!(allocs[1].allocated_minutes, 300.0);
            assert!(allocs[0].session_minutes > allocs[1].session_minutes);
        }

        #[test]
        fn counts_are_floored() {
            let s = settings(&[("A", 1, 5)]);
            let allocs = allocate(&params(150, 60, 120), &s);
            assert_eq!(allocs.len(), 1);
            assert_eq!(allocs[0].session_minutes, 60);
            assert_eq!(allocs[0].session_count, 2);
        }

        #[test]
        fn alphabetical_order() {
            let s = settings(&[("Math", 3, 3), ("Biology", 3, 3), ("Law", 3, 3)]);
            let names: Vec<_> = allocate(&params(600, 60, 120), &s)
                .into_iter()
                .map(|a| a.subject)
                .collect();
            assert_eq!(names, vec!["Biology", "Law", "Math"]);
        }
    }

    mod generate_tests {
        use super::*;

        #[test]
        fn empty_settings_give_empty_cycle() {
            let cycle = generate_cycle(&params(600, 60, 120), &BTreeMap::new(), &HashMap::new());
            assert!(cycle.is_empty());
        }

        #[test]
        fn zero_importance_gives_empty_cycle() {
            let s = settings(&[("A", 0, 3)]);
            assert!(generate_cycle(&params(600, 60, 120), &s, &HashMap::new()).is_empty());
        }

        #[test]
        fn budget_too_small_for_any_session_gives_empty_cycle() {
            let s = settings(&[("A", 1, 5), ("B", 1, 5)]);
            assert!(generate_cycle(&params(100, 60, 120), &s, &HashMap::new()).is_empty());
        }

        #[test]
        fn strong_vs_weak_subject_scenario() {
            let s = settings(&[("A", 5, 1), ("B", 1, 5)]);
            let cycle = generate_cycle(&params(600, 60, 120), &s, &HashMap::new());

            assert_eq!(total(&cycle), 600);
            assert!(minutes_for(&cycle, "A") > 3 * minutes_for(&cycle, "B"));

            let a_len = cycle.iter().find(|x| x.subject == "A").unwrap().duration_minutes;
            let b_len = cycle.iter().find(|x| x.subject == "B").unwrap().duration_minutes;
            assert!(a_len > b_len);

            // A: 500 min / 120 -> 4 sessions, B: 100 min / 60 -> 1 session,
            // 60 lost minutes spread over 5 sessions.
            let subjects: Vec<_> = cycle.iter().map(|x| x.subject.as_str()).collect();
            assert_eq!(subjects, vec!["A", "B", "A", "A", "A"]);
            assert_eq!(
                cycle.iter().map(|x| x.duration_minutes).collect::<Vec<_>>(),
                vec![132, 72, 132, 132, 132]
            );
        }

        #[test]
        fn knowledge_changes_granularity_not_volume() {
            // Volume comes from importance alone; knowledge only shapes how
            // the volume is cut into sessions.
            let weak = settings(&[("A", 3, 1), ("B", 3, 3)]);
            let strong = settings(&[("A", 3, 5), ("B", 3, 3)]);
            let p = params(1200, 30, 120);

            let weak_allocs = allocate(&p, &weak);
            let strong_allocs = allocate(&p, &strong);
            assert_eq!(weak_allocs[0].allocated_minutes, strong_allocs[0].allocated_minutes);
            assert!(weak_allocs[0].session_minutes > strong_allocs[0].session_minutes);
            assert!(weak_allocs[0].session_count < strong_allocs[0].session_count);
        }

        #[test]
        fn single_subject_fills_the_week() {
            for importance in 1..=5 {
                for knowledge in 1..=5 {
                    let s = settings(&[("Only", importance, knowledge)]);
                    let cycle = generate_cycle(&params(600, 45, 100), &s, &HashMap::new());
                    assert!(!cycle.is_empty());
                    assert!(cycle.iter().all(|x| x.subject == "Only"));
                    assert_eq!(total(&cycle), 600);
                }
            }
        }

        #[test]
        fn total_always_matches_budget() {
            let cases = [
                (2400, 60, 120),
                (600, 30, 90),
                (1337, 25, 50),
                (601, 60, 60),
                (3000, 45, 180),
            ];
            let s = settings(&[
                ("Law", 5, 2),
                ("Accounting", 3, 3),
                ("Portuguese", 2, 5),
                ("Statistics", 4, 1),
                ("Economics", 1, 1),
            ]);
            for (weekly, min, max) in cases {
                let cycle = generate_cycle(&params(weekly, min, max), &s, &HashMap::new());
                assert_eq!(total(&cycle), weekly, "weekly={} min={} max={}", weekly, min, max);
            }
        }

        #[test]
        fn durations_stay_within_bounds_plus_redistribution() {
            let s = settings(&[("A", 5, 2), ("B", 3, 3), ("C", 2, 5), ("D", 4, 1)]);
            let p = params(1337, 25, 50);
            let allocs = allocate(&p, &s);
            let accounted: u32 = allocs.iter().map(|a| a.session_minutes * a.session_count).sum();
            let cycle = generate_cycle(&p, &s, &HashMap::new());
            let lost = p.weekly_minutes - accounted;
            let slack = (lost + cycle.len() as u32 - 1) / cycle.len() as u32;

            for session in &cycle {
                assert!(session.duration_minutes >= p.min_session_minutes);
                assert!(session.duration_minutes <= p.max_session_minutes + slack);
            }
        }

        #[test]
        fn remainder_goes_to_first_sessions() {
            // One subject, 65-minute sessions: 200 / 65 -> 3 sessions, 5 lost.
            let s = settings(&[("A", 3, 3)]);
            let cycle = generate_cycle(&params(200, 65, 65), &s, &HashMap::new());
            let durations: Vec<_> = cycle.iter().map(|x| x.duration_minutes).collect();
            assert_eq!(durations, vec![67, 67, 66]);
        }

        #[test]
        fn no_back_to_back_subject_while_others_remain() {
            let s = settings(&[("A", 5, 3), ("B", 2, 3), ("C", 1, 1), ("D", 3, 5)]);
            let cycle = generate_cycle(&params(2400, 40, 90), &s, &HashMap::new());

            for i in 1..cycle.len() {
                if cycle[i].subject == cycle[i - 1].subject {
                    let subject = &cycle[i].subject;
                    assert!(
                        cycle[i..].iter().all(|x| &x.subject == subject),
                        "repeat of {} at {} while other subjects still had sessions",
                        subject,
                        i
                    );
                }
            }
        }

        #[test]
        fn ids_are_unique_and_colors_applied() {
            let s = settings(&[("A", 3, 3), ("B", 3, 3)]);
            let mut colors = HashMap::new();
            colors.insert("A".to_string(), "#112233".to_string());
            let cycle = generate_cycle(&params(600, 60, 120), &s, &colors);

            let mut ids: Vec<_> = cycle.iter().map(|x| x.id.clone()).collect();
            ids.sort();
            ids.dedup();
            assert_eq!(ids.len(), cycle.len());

            assert!(cycle
                .iter()
                .filter(|x| x.subject == "A")
                .all(|x| x.color == "#112233"));
            assert!(cycle
                .iter()
                .filter(|x| x.subject == "B")
                .all(|x| x.color == DEFAULT_COLOR));
        }

        #[test]
        fn deterministic() {
            let s = settings(&[("A", 5, 2), ("B", 3, 3), ("C", 2, 5)]);
            let p = params(1500, 50, 110);
            assert_eq!(
                generate_cycle(&p, &s, &HashMap::new()),
                generate_cycle(&p, &s, &HashMap::new())
            );
        }
    }

    mod state_tests {
        use super::*;

        fn state() -> CycleState {
            let s = settings(&[("A", 3, 3), ("B", 3, 3)]);
            let p = params(280, 70, 70);
            CycleState::new(p, generate_cycle(&p, &s, &HashMap::new()))
        }

        #[test]
        fn new_state_starts_empty() {
            let st = state();
            assert_eq!(st.sessions.len(), 4);
            assert_eq!(st.total_minutes(), 280);
            assert_eq!(st.completed_cycles, 0);
            assert_eq!(st.lap_percentage(), 0.0);
            assert_eq!(st.next_session().unwrap().id, "A-1");
        }

        #[test]
        fn partial_progress_keeps_session_open() {
            let mut st = state();
            let event = st.complete_session("A-1", Some(30)).unwrap();
            assert_eq!(
                event,
                CompletionEvent::Progressed {
                    session_id: "A-1".to_string(),
                    completed_minutes: 30,
                    remaining_minutes: 40,
                }
            );
            assert_eq!(st.next_session().unwrap().id, "A-1");

            st.complete_session("A-1", Some(40)).unwrap();
            assert_eq!(st.next_session().unwrap().id, "B-1");
            assert_eq!(st.lap_minutes, 70);
        }

        #[test]
        fn finishing_every_session_closes_the_lap() {
            let mut st = state();
            let ids: Vec<_> = st.sessions.iter().map(|s| s.id.clone()).collect();
            for id in &ids[..ids.len() - 1] {
                assert!(matches!(
                    st.complete_session(id, None).unwrap(),
                    CompletionEvent::Progressed { .. }
                ));
            }
            let event = st.complete_session(&ids[ids.len() - 1], None).unwrap();
            assert_eq!(event, CompletionEvent::LapCompleted { completed_cycles: 1 });
            assert!(st.progress.is_empty());
            assert_eq!(st.lap_minutes, 0);
            assert_eq!(st.next_session().unwrap().id, "A-1");
        }

        #[test]
        fn unknown_session_is_rejected() {
            let mut st = state();
            assert!(matches!(
                st.complete_session("Z-9", None),
                Err(Error::UnknownSession(_))
            ));
        }

        #[test]
        fn empty_cycle_never_completes() {
            let mut st = CycleState::default();
            assert!(st.next_session().is_none());
            assert!(st.complete_session("A-1", None).is_err());
            assert_eq!(st.completed_cycles, 0);
        }

        #[test]
        fn manual_sessions_get_fresh_ids() {
            let mut st = state();
            let first = st.add_session("C", 45, None).id.clone();
            let second = st.add_session("C", 45, Some("#000000")).id.clone();
            assert_ne!(first, second);
            assert_eq!(st.sessions.len(), 6);
            assert_eq!(st.sessions[5].color, "#000000");
            assert_eq!(st.total_minutes(), 370);
        }

        #[test]
        fn removing_a_session_drops_its_progress() {
            let mut st = state();
            st.complete_session("B-1", Some(20)).unwrap();
            let (removed, event) = st.remove_session("B-1").unwrap();
            assert_eq!(removed.subject, "B");
            assert!(event.is_none());
            assert_eq!(st.lap_minutes, 0);
            assert!(st.remove_session("B-1").is_err());
        }

        #[test]
        fn removing_the_last_open_session_closes_the_lap() {
            let mut st = state();
            for id in ["A-1", "B-1", "A-2"] {
                st.complete_session(id, None).unwrap();
            }

            let (removed, event) = st.remove_session("B-2").unwrap();
            assert_eq!(removed.id, "B-2");
            assert_eq!(event, Some(CompletionEvent::LapCompleted { completed_cycles: 1 }));
            assert_eq!(st.completed_cycles, 1);
            assert!(st.progress.is_empty());
            assert_eq!(st.lap_minutes, 0);
            assert_eq!(st.next_session().unwrap().id, "A-1");
        }

        #[test]
        fn removing_every_session_does_not_count_a_lap() {
            let mut st = state();
            let ids: Vec<_> = st.sessions.iter().map(|s| s.id.clone()).collect();
            for id in &ids {
                let (_, event) = st.remove_session(id).unwrap();
                assert!(event.is_none());
            }
            assert!(st.sessions.is_empty());
            assert_eq!(st.completed_cycles, 0);
        }

        #[test]
        fn defaults_for_goal_and_study_days() {
            let st = state();
            assert_eq!(st.weekly_questions_goal, 250);
            assert_eq!(st.study_days.len(), 5);
            assert!(!st.study_days.contains(&Weekday::Sat));
        }

        #[test]
        fn older_documents_without_goal_still_load() {
            let json = r#"{"params":null,"sessions":[],"progress":{},"completed_cycles":2,"lap_minutes":0}"#;
            let st: CycleState = serde_json::from_str(json).unwrap();
            assert_eq!(st.completed_cycles, 2);
            assert_eq!(st.weekly_questions_goal, DEFAULT_WEEKLY_QUESTIONS_GOAL);
            assert_eq!(st.study_days, default_study_days());
        }

        #[test]
        fn serializes_round_trip() {
            let mut st = state();
            st.complete_session("A-1", Some(10)).unwrap();
            let json = serde_json::to_string(&st).unwrap();
            let back: CycleState = serde_json::from_str(&json).unwrap();
            assert_eq!(back, st);
        }
    }
}
