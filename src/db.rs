use chrono::{Datelike, Days, NaiveDate, Weekday};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

use crate::cycle::{self, CycleState};
use crate::error::{Error, Result};
use crate::models::{
    MockExam, MockExamSubject, NewStudyRecord, Plan, PlanData, ReviewRecord, ReviewStatus,
    StudyRecord, Subject, Topic,
};
use crate::review;

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self { conn })
    }

    pub fn init(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS plans (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                observations TEXT,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS subjects (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                plan_id INTEGER NOT NULL,
                name TEXT NOT NULL,
                color TEXT NOT NULL,
                importance INTEGER NOT NULL DEFAULT 3 CHECK(importance BETWEEN 1 AND 5),
                knowledge INTEGER NOT NULL DEFAULT 3 CHECK(knowledge BETWEEN 1 AND 5),
                UNIQUE (plan_id, name),
                FOREIGN KEY (plan_id) REFERENCES plans(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS topics (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                subject_id INTEGER NOT NULL,
                label TEXT NOT NULL,
                user_weight INTEGER CHECK(user_weight IS NULL OR user_weight BETWEEN 1 AND 5),
                UNIQUE (subject_id, label),
                FOREIGN KEY (subject_id) REFERENCES subjects(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS study_records (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                plan_id INTEGER NOT NULL,
                date TEXT NOT NULL,
                subject TEXT NOT NULL,
                topic TEXT NOT NULL,
                duration_minutes INTEGER NOT NULL DEFAULT 0,
                correct INTEGER NOT NULL DEFAULT 0,
                total INTEGER NOT NULL DEFAULT 0,
                category TEXT NOT NULL DEFAULT '',
                notes TEXT,
                review_periods TEXT NOT NULL DEFAULT '[]',
                theory_finished INTEGER NOT NULL DEFAULT 0,
                FOREIGN KEY (plan_id) REFERENCES plans(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS review_records (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                study_record_id INTEGER NOT NULL,
                subject TEXT NOT NULL,
                topic TEXT NOT NULL,
                period TEXT NOT NULL,
                scheduled_date TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending' CHECK(status IN ('pending', 'completed', 'skipped')),
                completed_date TEXT,
                UNIQUE (study_record_id, period),
                FOREIGN KEY (study_record_id) REFERENCES study_records(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS mock_exams (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                plan_id INTEGER NOT NULL,
                date TEXT NOT NULL,
                name TEXT NOT NULL,
                board TEXT,
                time_spent TEXT,
                comments TEXT,
                subjects TEXT NOT NULL DEFAULT '[]',
                FOREIGN KEY (plan_id) REFERENCES plans(id) ON DELETE CASCADE
            );

            -- One persisted cycle per plan, stored as a JSON document
            CREATE TABLE IF NOT EXISTS cycles (
                plan_id INTEGER PRIMARY KEY,
                state TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now')),
                FOREIGN KEY (plan_id) REFERENCES plans(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_subjects_plan ON subjects(plan_id);
            CREATE INDEX IF NOT EXISTS idx_topics_subject ON topics(subject_id);
            CREATE INDEX IF NOT EXISTS idx_records_plan ON study_records(plan_id);
            CREATE INDEX IF NOT EXISTS idx_records_topic ON study_records(plan_id, subject, topic);
            CREATE INDEX IF NOT EXISTS idx_reviews_record ON review_records(study_record_id);
            CREATE INDEX IF NOT EXISTS idx_reviews_schedule ON review_records(status, scheduled_date);
            CREATE INDEX IF NOT EXISTS idx_mock_exams_plan ON mock_exams(plan_id);
            "#,
        )?;
        Ok(())
    }

    // Plan operations
    pub fn create_plan(&self, name: &str, observations: Option<&str>) -> Result<i64> {
        if self.plan_id_by_name(name)?.is_some() {
            return Err(Error::Duplicate(format!("plan '{}'", name)));
        }
        self.conn.execute(
            "INSERT INTO plans (name, observations) VALUES (?1, ?2)",
            params![name, observations],
        )?;
        let id = self.conn.last_insert_rowid();
        tracing::info!(plan_id = id, name, "created plan");
        Ok(id)
    }

    pub fn plan_id_by_name(&self, name: &str) -> Result<Option<i64>> {
        Ok(self
            .conn
            .query_row("SELECT id FROM plans WHERE name = ?1", params![name], |row| {
                row.get(0)
            })
            .optional()?)
    }

    pub fn get_plan(&self, id: i64) -> Result<Option<Plan>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, name, observations, created_at FROM plans WHERE id = ?1",
                params![id],
                plan_from_row,
            )
            .optional()?)
    }

    pub fn list_plans(&self) -> Result<Vec<Plan>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, observations, created_at FROM plans ORDER BY name")?;
        let plans = stmt
            .query_map([], plan_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(plans)
    }

    pub fn delete_plan(&self, id: i64) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM plans WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    /// A plan with its subjects and topics in the order they were added.
    pub fn read_plan(&self, id: i64) -> Result<Option<PlanData>> {
        let Some(plan) = self.get_plan(id)? else {
            return Ok(None);
        };

        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, plan_id, name, color, importance, knowledge
            FROM subjects WHERE plan_id = ?1 ORDER BY id
            "#,
        )?;
        let mut subjects = stmt
            .query_map(params![id], |row| {
                Ok(Subject {
                    id: row.get(0)?,
                    plan_id: row.get(1)?,
                    name: row.get(2)?,
                    color: row.get(3)?,
                    importance: row.get(4)?,
                    knowledge: row.get(5)?,
                    topics: vec![],
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        for subject in &mut subjects {
            subject.topics = self.get_topics(subject.id)?;
        }

        Ok(Some(PlanData { plan, subjects }))
    }

    // Subject operations
    pub fn add_subject(
        &self,
        plan_id: i64,
        name: &str,
        color: &str,
        importance: u8,
        knowledge: u8,
    ) -> Result<i64> {
        if self.subject_id(plan_id, name)?.is_some() {
            return Err(Error::Duplicate(format!("subject '{}'", name)));
        }
        self.conn.execute(
            r#"
            INSERT INTO subjects (plan_id, name, color, importance, knowledge)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![plan_id, name, color, importance, knowledge],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn subject_id(&self, plan_id: i64, name: &str) -> Result<Option<i64>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id FROM subjects WHERE plan_id = ?1 AND name = ?2",
                params![plan_id, name],
                |row| row.get(0),
            )
            .optional()?)
    }

    pub fn rate_subject(&self, plan_id: i64, name: &str, importance: u8, knowledge: u8) -> Result<bool> {
        let rows = self.conn.execute(
            "UPDATE subjects SET importance = ?1, knowledge = ?2 WHERE plan_id = ?3 AND name = ?4",
            params![importance, knowledge, plan_id, name],
        )?;
        Ok(rows > 0)
    }

    pub fn delete_subject(&self, plan_id: i64, name: &str) -> Result<bool> {
        let rows = self.conn.execute(
            "DELETE FROM subjects WHERE plan_id = ?1 AND name = ?2",
            params![plan_id, name],
        )?;
        Ok(rows > 0)
    }

    // Topic operations
    pub fn add_topic(&self, subject_id: i64, label: &str, user_weight: Option<u8>) -> Result<i64> {
        let exists: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM topics WHERE subject_id = ?1 AND label = ?2",
                params![subject_id, label],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_some() {
            return Err(Error::Duplicate(format!("topic '{}'", label)));
        }

        self.conn.execute(
            "INSERT INTO topics (subject_id, label, user_weight) VALUES (?1, ?2, ?3)",
            params![subject_id, label, user_weight],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_topics(&self, subject_id: i64) -> Result<Vec<Topic>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, subject_id, label, user_weight FROM topics WHERE subject_id = ?1 ORDER BY id",
        )?;
        let topics = stmt
            .query_map(params![subject_id], |row| {
                Ok(Topic {
                    id: row.get(0)?,
                    subject_id: row.get(1)?,
                    label: row.get(2)?,
                    user_weight: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(topics)
    }

    pub fn set_topic_weight(&self, subject_id: i64, label: &str, user_weight: Option<u8>) -> Result<bool> {
        let rows = self.conn.execute(
            "UPDATE topics SET user_weight = ?1 WHERE subject_id = ?2 AND label = ?3",
            params![user_weight, subject_id, label],
        )?;
        Ok(rows > 0)
    }

    pub fn delete_topic(&self, subject_id: i64, label: &str) -> Result<bool> {
        let rows = self.conn.execute(
            "DELETE FROM topics WHERE subject_id = ?1 AND label = ?2",
            params![subject_id, label],
        )?;
        Ok(rows > 0)
    }

    // Study record operations

    /// Store a new record and schedule its reviews.
    pub fn write_record(&self, plan_id: i64, record: &NewStudyRecord) -> Result<i64> {
        record.validate()?;
        let tx = self.conn.unchecked_transaction()?;

        self.conn.execute(
            r#"
            INSERT INTO study_records
                (plan_id, date, subject, topic, duration_minutes, correct, total,
                 category, notes, review_periods, theory_finished)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
            params![
                plan_id,
                record.date,
                record.subject,
                record.topic,
                record.duration_minutes,
                record.correct,
                record.total,
                record.category,
                record.notes,
                serde_json::to_string(&record.review_periods)?,
                record.theory_finished,
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        self.schedule_record_reviews(id)?;

        tx.commit()?;
        tracing::debug!(plan_id, record_id = id, subject = %record.subject, topic = %record.topic, "stored study record");
        Ok(id)
    }

    /// Replace a record's fields. Its reviews are rescheduled from scratch.
    pub fn update_record(&self, id: i64, record: &NewStudyRecord) -> Result<bool> {
        record.validate()?;
        let tx = self.conn.unchecked_transaction()?;

        let rows = self.conn.execute(
            r#"
            UPDATE study_records
            SET date = ?1, subject = ?2, topic = ?3, duration_minutes = ?4, correct = ?5,
                total = ?6, category = ?7, notes = ?8, review_periods = ?9, theory_finished = ?10
            WHERE id = ?11
            "#,
            params![
                record.date,
                record.subject,
                record.topic,
                record.duration_minutes,
                record.correct,
                record.total,
                record.category,
                record.notes,
                serde_json::to_string(&record.review_periods)?,
                record.theory_finished,
                id,
            ],
        )?;
        if rows == 0 {
            return Ok(false);
        }

        self.conn.execute(
            "DELETE FROM review_records WHERE study_record_id = ?1",
            params![id],
        )?;
        self.schedule_record_reviews(id)?;

        tx.commit()?;
        Ok(true)
    }

    fn schedule_record_reviews(&self, record_id: i64) -> Result<()> {
        let record = self
            .get_record(record_id)?
            .ok_or_else(|| Error::NotFound(format!("study record {}", record_id)))?;
        for r in review::schedule_reviews(&record)? {
            self.insert_review(&r)?;
        }
        Ok(())
    }

    pub fn get_record(&self, id: i64) -> Result<Option<StudyRecord>> {
        Ok(self
            .conn
            .query_row(
                &format!("SELECT {} FROM study_records WHERE id = ?1", RECORD_COLUMNS),
                params![id],
                record_from_row,
            )
            .optional()?)
    }

    /// Records of a plan, newest first.
    pub fn list_records(&self, plan_id: i64, subject: Option<&str>) -> Result<Vec<StudyRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            r#"
            SELECT {} FROM study_records
            WHERE plan_id = ?1 AND (?2 IS NULL OR subject = ?2)
            ORDER BY date DESC, id DESC
            "#,
            RECORD_COLUMNS
        ))?;
        let records = stmt
            .query_map(params![plan_id, subject], record_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    pub fn delete_record(&self, id: i64) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM study_records WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    // Review operations
    fn insert_review(&self, review: &ReviewRecord) -> Result<i64> {
        self.conn.execute(
            r#"
            INSERT INTO review_records
                (study_record_id, subject, topic, period, scheduled_date, status, completed_date)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                review.study_record_id,
                review.subject,
                review.topic,
                review.period,
                review.scheduled_date,
                review.status.as_str(),
                review.completed_date,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn list_reviews(&self, plan_id: i64, status: Option<ReviewStatus>) -> Result<Vec<ReviewRecord>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT rr.id, rr.study_record_id, rr.subject, rr.topic, rr.period,
                   rr.scheduled_date, rr.status, rr.completed_date
            FROM review_records rr
            JOIN study_records r ON rr.study_record_id = r.id
            WHERE r.plan_id = ?1 AND (?2 IS NULL OR rr.status = ?2)
            ORDER BY rr.scheduled_date, rr.id
            "#,
        )?;
        let reviews = stmt
            .query_map(params![plan_id, status.map(|s| s.as_str())], review_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(reviews)
    }

    /// Pending reviews scheduled on or before `today`.
    pub fn due_reviews(&self, plan_id: i64, today: NaiveDate) -> Result<Vec<ReviewRecord>> {
        Ok(self
            .list_reviews(plan_id, Some(ReviewStatus::Pending))?
            .into_iter()
            .filter(|r| review::is_due(r, today))
            .collect())
    }

    pub fn set_review_status(&self, id: i64, status: ReviewStatus, on: NaiveDate) -> Result<bool> {
        let completed_date = match status {
            ReviewStatus::Completed => Some(on),
            ReviewStatus::Pending | ReviewStatus::Skipped => None,
        };
        let rows = self.conn.execute(
            "UPDATE review_records SET status = ?1, completed_date = ?2 WHERE id = ?3",
            params![status.as_str(), completed_date, id],
        )?;
        Ok(rows > 0)
    }

    // Mock exam operations
    pub fn add_mock_exam(&self, plan_id: i64, exam: &MockExam) -> Result<i64> {
        self.conn.execute(
            r#"
            INSERT INTO mock_exams (plan_id, date, name, board, time_spent, comments, subjects)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                plan_id,
                exam.date,
                exam.name,
                exam.board,
                exam.time_spent,
                exam.comments,
                serde_json::to_string(&exam.subjects)?,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn list_mock_exams(&self, plan_id: i64) -> Result<Vec<MockExam>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, plan_id, date, name, board, time_spent, comments, subjects
            FROM mock_exams WHERE plan_id = ?1 ORDER BY date DESC, id DESC
            "#,
        )?;
        let exams = stmt
            .query_map(params![plan_id], |row| {
                let subjects: String = row.get(7)?;
                Ok(MockExam {
                    id: row.get(0)?,
                    plan_id: row.get(1)?,
                    date: row.get(2)?,
                    name: row.get(3)?,
                    board: row.get(4)?,
                    time_spent: row.get(5)?,
                    comments: row.get(6)?,
                    subjects: json_column::<Vec<MockExamSubject>>(7, &subjects)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(exams)
    }

    pub fn delete_mock_exam(&self, id: i64) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM mock_exams WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    // Cycle state
    pub fn load_cycle(&self, plan_id: i64) -> Result<Option<CycleState>> {
        let state: Option<String> = self
            .conn
            .query_row(
                "SELECT state FROM cycles WHERE plan_id = ?1",
                params![plan_id],
                |row| row.get(0),
            )
            .optional()?;
        match state {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    pub fn save_cycle(&self, plan_id: i64, state: &CycleState) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO cycles (plan_id, state, updated_at) VALUES (?1, ?2, datetime('now'))
            ON CONFLICT(plan_id) DO UPDATE SET state = excluded.state, updated_at = excluded.updated_at
            "#,
            params![plan_id, serde_json::to_string(state)?],
        )?;
        Ok(())
    }

    pub fn delete_cycle(&self, plan_id: i64) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM cycles WHERE plan_id = ?1", params![plan_id])?;
        Ok(rows > 0)
    }

    // Import helpers; the caller owns the transaction.
    pub(crate) fn begin(&self) -> Result<rusqlite::Transaction<'_>> {
        Ok(self.conn.unchecked_transaction()?)
    }

    pub(crate) fn insert_record_as_is(&self, plan_id: i64, record: &StudyRecord) -> Result<i64> {
        self.conn.execute(
            r#"
            INSERT INTO study_records
                (plan_id, date, subject, topic, duration_minutes, correct, total,
                 category, notes, review_periods, theory_finished)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
            params![
                plan_id,
                record.date,
                record.subject,
                record.topic,
                record.duration_minutes,
                record.correct,
                record.total,
                record.category,
                record.notes,
                serde_json::to_string(&record.review_periods)?,
                record.theory_finished,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub(crate) fn insert_review_as_is(&self, review: &ReviewRecord) -> Result<i64> {
        self.insert_review(review)
    }

    pub fn get_stats(&self, plan_id: i64, today: NaiveDate) -> Result<PlanStats> {
        let (total_minutes, total_questions, correct_questions, study_days, record_count): (
            i64,
            i64,
            i64,
            i64,
            i64,
        ) = self.conn.query_row(
            r#"
            SELECT COALESCE(SUM(duration_minutes), 0), COALESCE(SUM(total), 0),
                   COALESCE(SUM(correct), 0), COUNT(DISTINCT date), COUNT(*)
            FROM study_records WHERE plan_id = ?1
            "#,
            params![plan_id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
        )?;

        let mut stmt = self.conn.prepare(
            r#"
            SELECT subject, SUM(duration_minutes), SUM(total), SUM(correct)
            FROM study_records WHERE plan_id = ?1
            GROUP BY subject ORDER BY subject
            "#,
        )?;
        let subjects = stmt
            .query_map(params![plan_id], |row| {
                let questions: i64 = row.get(2)?;
                let correct: i64 = row.get(3)?;
                Ok(SubjectStats {
                    subject: row.get(0)?,
                    minutes: row.get(1)?,
                    questions,
                    correct,
                    hit_rate: percentage(correct, questions),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let topics_total: i64 = self.conn.query_row(
            r#"
            SELECT COUNT(*) FROM topics t JOIN subjects s ON t.subject_id = s.id
            WHERE s.plan_id = ?1
            "#,
            params![plan_id],
            |row| row.get(0),
        )?;

        let topics_finished: i64 = self.conn.query_row(
            r#"
            SELECT COUNT(*) FROM topics t JOIN subjects s ON t.subject_id = s.id
            WHERE s.plan_id = ?1 AND EXISTS (
                SELECT 1 FROM study_records r
                WHERE r.plan_id = s.plan_id AND r.subject = s.name
                  AND r.topic = t.label AND r.theory_finished = 1
            )
            "#,
            params![plan_id],
            |row| row.get(0),
        )?;

        let pending = self.list_reviews(plan_id, Some(ReviewStatus::Pending))?;
        let due_reviews = pending.iter().filter(|r| review::is_due(r, today)).count() as i64;

        let mock_exams: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM mock_exams WHERE plan_id = ?1",
            params![plan_id],
            |row| row.get(0),
        )?;

        let mut stmt = self.conn.prepare(
            r#"
            SELECT category, SUM(duration_minutes) FROM study_records
            WHERE plan_id = ?1 GROUP BY category ORDER BY category
            "#,
        )?;
        let categories = stmt
            .query_map(params![plan_id], |row| {
                Ok(CategoryStats {
                    category: row.get(0)?,
                    minutes: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        // Monday to Sunday around `today`
        let week_start = today - Days::new(u64::from(today.weekday().num_days_from_monday()));
        let week_end = week_start + Days::new(6);
        let (week_minutes, week_questions): (i64, i64) = self.conn.query_row(
            r#"
            SELECT COALESCE(SUM(duration_minutes), 0), COALESCE(SUM(total), 0)
            FROM study_records WHERE plan_id = ?1 AND date BETWEEN ?2 AND ?3
            "#,
            params![plan_id, week_start, week_end],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT date FROM study_records WHERE plan_id = ?1")?;
        let studied = stmt
            .query_map(params![plan_id], |row| row.get::<_, NaiveDate>(0))?
            .collect::<rusqlite::Result<BTreeSet<_>>>()?;

        let (weekly_questions_goal, days) = match self.load_cycle(plan_id)? {
            Some(state) => (state.weekly_questions_goal, state.study_days),
            None => (cycle::DEFAULT_WEEKLY_QUESTIONS_GOAL, cycle::default_study_days()),
        };

        Ok(PlanStats {
            total_minutes,
            total_questions,
            correct_questions,
            hit_rate: percentage(correct_questions, total_questions),
            study_days,
            records: record_count,
            subjects,
            topics_total,
            topics_finished,
            syllabus_progress: percentage(topics_finished, topics_total),
            pending_reviews: pending.len() as i64,
            due_reviews,
            mock_exams,
            study_streak: study_streak(&studied, &days, today),
            categories,
            week_start,
            week_minutes,
            week_questions,
            weekly_questions_goal,
        })
    }
}

const RECORD_COLUMNS: &str = "id, plan_id, date, subject, topic, duration_minutes, correct, total, \
     category, notes, review_periods, theory_finished";

fn plan_from_row(row: &Row<'_>) -> rusqlite::Result<Plan> {
    Ok(Plan {
        id: row.get(0)?,
        name: row.get(1)?,
        observations: row.get(2)?,
        created_at: row.get(3)?,
    })
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<StudyRecord> {
    let periods: String = row.get(10)?;
    Ok(StudyRecord {
        id: row.get(0)?,
        plan_id: row.get(1)?,
        date: row.get(2)?,
        subject: row.get(3)?,
        topic: row.get(4)?,
        duration_minutes: row.get(5)?,
        correct: row.get(6)?,
        total: row.get(7)?,
        category: row.get(8)?,
        notes: row.get(9)?,
        review_periods: json_column(10, &periods)?,
        theory_finished: row.get(11)?,
    })
}

fn review_from_row(row: &Row<'_>) -> rusqlite::Result<ReviewRecord> {
    let status: String = row.get(6)?;
    Ok(ReviewRecord {
        id: row.get(0)?,
        study_record_id: row.get(1)?,
        subject: row.get(2)?,
        topic: row.get(3)?,
        period: row.get(4)?,
        scheduled_date: row.get(5)?,
        status: ReviewStatus::from_str(&status).unwrap_or(ReviewStatus::Pending),
        completed_date: row.get(7)?,
    })
}

fn json_column<T: serde::de::DeserializeOwned>(index: usize, text: &str) -> rusqlite::Result<T> {
    serde_json::from_str(text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(e)))
}

fn percentage(part: i64, whole: i64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

pub const STREAK_WINDOW_DAYS: u64 = 30;

/// Days until today without a missed study day, looking back at most
/// `STREAK_WINDOW_DAYS` and never before the first record. Days outside
/// `study_days` count without needing a record; a study day without one
/// (today included) ends the streak.
pub fn study_streak(
    studied: &BTreeSet<NaiveDate>,
    study_days: &[Weekday],
    today: NaiveDate,
) -> u32 {
    let Some(&first) = studied.iter().next() else {
        return 0;
    };

    let mut streak = 0;
    for back in 0..STREAK_WINDOW_DAYS {
        let Some(day) = today.checked_sub_days(Days::new(back)) else {
            break;
        };
        if day < first {
            break;
        }
        if study_days.contains(&day.weekday()) && !studied.contains(&day) {
            break;
        }
        streak += 1;
    }
    streak
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectStats {
    pub subject: String,
    pub minutes: i64,
    pub questions: i64,
    pub correct: i64,
    pub hit_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStats {
    pub total_minutes: i64,
    pub total_questions: i64,
    pub correct_questions: i64,
    pub hit_rate: f64,
    pub study_days: i64,
    pub records: i64,
    pub subjects: Vec<SubjectStats>,
    pub topics_total: i64,
    pub topics_finished: i64,
    pub syllabus_progress: f64,
    pub pending_reviews: i64,
    pub due_reviews: i64,
    pub mock_exams: i64,
    pub study_streak: u32,
    pub categories: Vec<CategoryStats>,
    /// Monday of the week `week_minutes` and `week_questions` cover
    pub week_start: NaiveDate,
    pub week_minutes: i64,
    pub week_questions: i64,
    pub weekly_questions_goal: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryStats {
    pub category: String,
    pub minutes: i64,
}
