//! Portable export/import of a whole plan as one JSON document.
//!
//! The document carries the syllabus, every study record with its reviews,
//! mock exams and the saved cycle. Row ids are not portable: on import the
//! plan, subjects and records get fresh ids and reviews are re-pointed at the
//! new record ids.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::cycle::CycleState;
use crate::db::Database;
use crate::error::{Error, Result};
use crate::models::{MockExam, PlanData, ReviewRecord, StudyRecord};

/// Export format version
pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanExport {
    pub format_version: u32,
    /// RFC 3339 timestamp of export
    pub exported_at: String,
    pub app_version: String,
    pub plan: PlanData,
    pub records: Vec<StudyRecord>,
    pub reviews: Vec<ReviewRecord>,
    pub mock_exams: Vec<MockExam>,
    pub cycle: Option<CycleState>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportResult {
    pub plan_id: i64,
    pub plan_name: String,
    pub subjects: usize,
    pub topics: usize,
    pub records: usize,
    pub reviews: usize,
    pub mock_exams: usize,
    /// Reviews whose record was missing from the export
    pub orphaned_reviews: usize,
}

pub fn export_plan(db: &Database, plan_id: i64) -> Result<PlanExport> {
    let plan = db
        .read_plan(plan_id)?
        .ok_or_else(|| Error::NotFound(format!("plan {}", plan_id)))?;

    let mut records = db.list_records(plan_id, None)?;
    // Oldest first so an import recreates records in their original order
    records.reverse();

    Ok(PlanExport {
        format_version: FORMAT_VERSION,
        exported_at: Utc::now().to_rfc3339(),
        app_version: env!("CARGO_PKG_VERSION").to_string(),
        plan,
        records,
        reviews: db.list_reviews(plan_id, None)?,
        mock_exams: db.list_mock_exams(plan_id)?,
        cycle: db.load_cycle(plan_id)?,
    })
}

/// Recreate an exported plan, optionally under a new name. Fails without
/// writing anything if the name is taken.
pub fn import_plan(db: &Database, export: &PlanExport, rename: Option<&str>) -> Result<ImportResult> {
    if export.format_version != FORMAT_VERSION {
        return Err(Error::UnsupportedFormat {
            found: export.format_version,
            expected: FORMAT_VERSION,
        });
    }

    let name = rename.unwrap_or(&export.plan.plan.name);
    let tx = db.begin()?;

    let plan_id = db.create_plan(name, export.plan.plan.observations.as_deref())?;

    let mut topics = 0;
    for subject in &export.plan.subjects {
        let subject_id = db.add_subject(
            plan_id,
            &subject.name,
            &subject.color,
            subject.importance,
            subject.knowledge,
        )?;
        for topic in &subject.topics {
            db.add_topic(subject_id, &topic.label, topic.user_weight)?;
            topics += 1;
        }
    }

    let mut record_ids: HashMap<i64, i64> = HashMap::new();
    for record in &export.records {
        let new_id = db.insert_record_as_is(plan_id, record)?;
        record_ids.insert(record.id, new_id);
    }

    let mut reviews = 0;
    let mut orphaned_reviews = 0;
    for review in &export.reviews {
        match record_ids.get(&review.study_record_id) {
            Some(&new_id) => {
                db.insert_review_as_is(&ReviewRecord {
                    study_record_id: new_id,
                    ..review.clone()
                })?;
                reviews += 1;
            }
            None => orphaned_reviews += 1,
        }
    }

    for exam in &export.mock_exams {
        db.add_mock_exam(plan_id, exam)?;
    }

    if let Some(cycle) = &export.cycle {
        db.save_cycle(plan_id, cycle)?;
    }

    tx.commit()?;

    if orphaned_reviews > 0 {
        tracing::warn!(orphaned_reviews, "skipped reviews without a matching record");
    }
    tracing::info!(plan_id, name, records = record_ids.len(), "imported plan");

    Ok(ImportResult {
        plan_id,
        plan_name: name.to_string(),
        subjects: export.plan.subjects.len(),
        topics,
        records: record_ids.len(),
        reviews,
        mock_exams: export.mock_exams.len(),
        orphaned_reviews,
    })
}

pub fn write_export(export: &PlanExport, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(export)?;
    fs::write(path, json)?;
    Ok(())
}

pub fn read_export(path: &Path) -> Result<PlanExport> {
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}
