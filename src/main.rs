mod backup;
mod config;
mod cycle;
mod db;
mod error;
mod logging;
mod models;
mod review;
mod scoring;

use chrono::{Local, NaiveDate, Weekday};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;

use config::Config;
use cycle::{CompletionEvent, CycleParams, CycleState};
use db::Database;
use error::{Error, Result};
use models::{
    validate_rating, JsonOutput, MockExam, MockExamSubject, NewStudyRecord, PlanData,
    ReviewStatus, DEFAULT_COLOR, DEFAULT_RATING,
};

#[derive(Parser)]
#[command(name = "studycycle")]
#[command(about = "Plan weekly study cycles and decide what to study next")]
#[command(version)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database
    Init,

    /// Manage study plans
    #[command(subcommand)]
    Plan(PlanCommands),

    /// Manage the subjects of a plan
    #[command(subcommand)]
    Subject(SubjectCommands),

    /// Manage the topics of a subject
    #[command(subcommand)]
    Topic(TopicCommands),

    /// Log and browse study sessions
    #[command(subcommand)]
    Record(RecordCommands),

    /// Scheduled reviews of past study sessions
    #[command(subcommand)]
    Review(ReviewCommands),

    /// Mock exam results
    #[command(subcommand)]
    Exam(ExamCommands),

    /// Generate and follow the weekly study cycle
    #[command(subcommand)]
    Cycle(CycleCommands),

    /// Rank every topic of a plan by study priority
    Scores {
        plan: String,

        /// Only show the first N topics
        #[arg(long, short)]
        limit: Option<usize>,
    },

    /// Recommend the topic to study next
    Next {
        plan: String,

        /// Restrict the recommendation to one subject
        #[arg(long, short)]
        subject: Option<String>,
    },

    /// Show plan statistics
    Stats { plan: String },

    /// Export a plan to a JSON file
    Export { plan: String, file: PathBuf },

    /// Import a plan from a JSON file
    Import {
        file: PathBuf,

        /// Import under a different plan name
        #[arg(long, short)]
        name: Option<String>,
    },
}

#[derive(Subcommand)]
enum PlanCommands {
    /// Create a plan
    Add {
        name: String,

        /// Free-form notes
        #[arg(long, short)]
        observations: Option<String>,
    },

    /// List all plans
    List,

    /// Show a plan with its subjects and topics
    Show { plan: String },

    /// Delete a plan and everything recorded for it
    Delete { plan: String },
}

#[derive(Subcommand)]
enum SubjectCommands {
    /// Add a subject to a plan
    Add {
        plan: String,
        name: String,

        /// Display color, e.g. #3B82F6
        #[arg(long, short)]
        color: Option<String>,

        /// How much the subject matters for the exam (1-5)
        #[arg(long, short, default_value_t = DEFAULT_RATING as i64)]
        importance: i64,

        /// How well you already know it (1-5)
        #[arg(long, short, default_value_t = DEFAULT_RATING as i64)]
        knowledge: i64,
    },

    /// Update importance and knowledge of a subject
    Rate {
        plan: String,
        name: String,

        #[arg(long, short)]
        importance: i64,

        #[arg(long, short)]
        knowledge: i64,
    },

    /// Delete a subject and its topics
    Delete { plan: String, name: String },
}

#[derive(Subcommand)]
enum TopicCommands {
    /// Add a topic to a subject
    Add {
        plan: String,
        subject: String,
        label: String,

        /// Relevance of the topic (1-5)
        #[arg(long, short)]
        weight: Option<i64>,
    },

    /// Set a topic's relevance; omit the value to reset it to the default
    Weight {
        plan: String,
        subject: String,
        label: String,
        weight: Option<i64>,
    },

    /// Delete a topic
    Delete {
        plan: String,
        subject: String,
        label: String,
    },
}

#[derive(Subcommand)]
enum RecordCommands {
    /// Log a study session
    Add {
        plan: String,

        #[arg(long, short)]
        subject: String,

        #[arg(long, short)]
        topic: String,

        /// Minutes studied
        #[arg(long, short)]
        minutes: u32,

        /// Study date (YYYY-MM-DD), defaults to today
        #[arg(long, short)]
        date: Option<String>,

        /// Questions answered correctly
        #[arg(long, default_value_t = 0)]
        correct: u32,

        /// Questions answered
        #[arg(long, default_value_t = 0)]
        total: u32,

        #[arg(long, default_value = "Theory")]
        category: String,

        #[arg(long, short)]
        notes: Option<String>,

        /// Comma-separated review periods, e.g. 1d,1w,1m
        #[arg(long, short)]
        review: Option<String>,

        /// Mark the topic's theory as finished
        #[arg(long)]
        theory_finished: bool,
    },

    /// Change fields of a logged session; its reviews are rescheduled
    Edit {
        id: i64,

        #[arg(long)]
        subject: Option<String>,

        #[arg(long)]
        topic: Option<String>,

        #[arg(long)]
        minutes: Option<u32>,

        #[arg(long)]
        date: Option<String>,

        #[arg(long)]
        correct: Option<u32>,

        #[arg(long)]
        total: Option<u32>,

        #[arg(long)]
        category: Option<String>,

        #[arg(long)]
        notes: Option<String>,

        #[arg(long)]
        review: Option<String>,

        #[arg(long)]
        theory_finished: Option<bool>,
    },

    /// List logged sessions, newest first
    List {
        plan: String,

        #[arg(long, short)]
        subject: Option<String>,
    },

    /// Delete a logged session and its reviews
    Delete { id: i64 },
}

#[derive(Subcommand)]
enum ReviewCommands {
    /// Pending reviews due today or earlier
    Due {
        plan: String,

        /// Reference date (YYYY-MM-DD), defaults to today
        #[arg(long, short)]
        date: Option<String>,
    },

    /// List all reviews of a plan
    List {
        plan: String,

        /// pending/completed/skipped
        #[arg(long, short)]
        status: Option<String>,
    },

    /// Mark a review as done
    Done { id: i64 },

    /// Skip a review
    Skip { id: i64 },
}

#[derive(Subcommand)]
enum ExamCommands {
    /// Record a mock exam result
    Add {
        plan: String,
        name: String,

        /// Exam date (YYYY-MM-DD), defaults to today
        #[arg(long, short)]
        date: Option<String>,

        /// Examining board
        #[arg(long, short)]
        board: Option<String>,

        /// Time taken, free-form
        #[arg(long)]
        time: Option<String>,

        #[arg(long, short)]
        comments: Option<String>,

        /// Per-subject result as NAME:WEIGHT:CORRECT/TOTAL (repeatable)
        #[arg(long = "subject", short = 's')]
        subjects: Vec<String>,
    },

    /// List mock exams of a plan
    List { plan: String },

    /// Delete a mock exam
    Delete { id: i64 },
}

#[derive(Subcommand)]
enum CycleCommands {
    /// Build a new cycle from the plan's subjects, replacing the current one
    Generate {
        plan: String,

        /// Weekly study hours
        #[arg(long)]
        hours: Option<u32>,

        /// Minimum session length in minutes
        #[arg(long)]
        min: Option<u32>,

        /// Maximum session length in minutes
        #[arg(long)]
        max: Option<u32>,

        /// Comma-separated subjects to include (default: all)
        #[arg(long, short)]
        subjects: Option<String>,

        /// Questions to solve per week
        #[arg(long)]
        questions_goal: Option<u32>,

        /// Comma-separated weekdays the study streak expects study on, e.g. mon,tue,wed
        #[arg(long)]
        study_days: Option<String>,
    },

    /// Show the cycle and progress through the current lap
    Show { plan: String },

    /// Log study time against a session (default: the next open session)
    Done {
        plan: String,
        session: Option<String>,

        /// Minutes studied, defaults to the full session
        #[arg(long, short)]
        minutes: Option<u32>,
    },

    /// Append a session to the cycle
    AddSession {
        plan: String,
        subject: String,

        #[arg(long, short)]
        minutes: u32,

        #[arg(long, short)]
        color: Option<String>,
    },

    /// Remove a session from the cycle
    RemoveSession { plan: String, session: String },

    /// Delete the cycle and its progress
    Reset { plan: String },
}

fn main() {
    logging::init_logging();
    let cli = Cli::parse();
    let json = cli.json;

    if let Err(e) = run(cli) {
        if json {
            if let Ok(out) = serde_json::to_string(&JsonOutput::<()>::err(e.to_string())) {
                println!("{}", out);
            }
        } else {
            eprintln!("Error: {}", e);
        }
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let db_path = config.db_path();
    tracing::debug!(path = %db_path.display(), "opening database");
    let db = Database::open(&db_path)?;
    db.init()?;

    let today = Local::now().date_naive();

    match cli.command {
        Commands::Init => {
            if cli.json {
                print_json(serde_json::json!({ "database": db_path }))?;
            } else {
                println!("Database initialized at: {}", db_path.display());
            }
        }

        Commands::Plan(cmd) => match cmd {
            PlanCommands::Add { name, observations } => {
                let id = db.create_plan(&name, observations.as_deref())?;
                if cli.json {
                    print_json(serde_json::json!({ "id": id, "name": name }))?;
                } else {
                    println!("Created plan '{}' with ID: {}", name, id);
                }
            }

            PlanCommands::List => {
                let plans = db.list_plans()?;
                if cli.json {
                    print_json(&plans)?;
                } else if plans.is_empty() {
                    println!("No plans found.");
                } else {
                    println!("{:<5} {:<30} CREATED", "ID", "NAME");
                    println!("{}", "-".repeat(60));
                    for plan in plans {
                        println!("{:<5} {:<30} {}", plan.id, truncate(&plan.name, 28), plan.created_at);
                    }
                }
            }

            PlanCommands::Show { plan } => {
                let data = load_plan(&db, &plan)?;
                if cli.json {
                    print_json(&data)?;
                } else {
                    println!("Plan: {} (ID: {})", data.plan.name, data.plan.id);
                    if let Some(obs) = &data.plan.observations {
                        println!("Notes: {}", obs);
                    }
                    println!("Created: {}", data.plan.created_at);
                    println!(
                        "Syllabus: {} subjects, {} topics",
                        data.subjects.len(),
                        data.topic_count()
                    );
                    println!();
                    if data.subjects.is_empty() {
                        println!("No subjects yet.");
                    }
                    for subject in &data.subjects {
                        println!(
                            "{} [importance {}/5, knowledge {}/5, {}]",
                            subject.name, subject.importance, subject.knowledge, subject.color
                        );
                        for topic in &subject.topics {
                            println!("  - {} (weight {}/5)", topic.label, topic.weight());
                        }
                    }
                }
            }

            PlanCommands::Delete { plan } => {
                let id = plan_id(&db, &plan)?;
                db.delete_plan(id)?;
                if cli.json {
                    print_json(())?;
                } else {
                    println!("Plan '{}' deleted.", plan);
                }
            }
        },

        Commands::Subject(cmd) => match cmd {
            SubjectCommands::Add {
                plan,
                name,
                color,
                importance,
                knowledge,
            } => {
                let pid = plan_id(&db, &plan)?;
                let importance = validate_rating("importance", importance)?;
                let knowledge = validate_rating("knowledge", knowledge)?;
                let color = color.unwrap_or_else(|| DEFAULT_COLOR.to_string());
                let id = db.add_subject(pid, &name, &color, importance, knowledge)?;
                if cli.json {
                    print_json(serde_json::json!({ "id": id, "name": name }))?;
                } else {
                    println!("Added subject '{}' to plan '{}'.", name, plan);
                }
            }

            SubjectCommands::Rate {
                plan,
                name,
                importance,
                knowledge,
            } => {
                let pid = plan_id(&db, &plan)?;
                let importance = validate_rating("importance", importance)?;
                let knowledge = validate_rating("knowledge", knowledge)?;
                if !db.rate_subject(pid, &name, importance, knowledge)? {
                    return Err(Error::NotFound(format!("subject '{}'", name)));
                }
                if cli.json {
                    print_json(())?;
                } else {
                    println!(
                        "Subject '{}' now has importance {}/5 and knowledge {}/5.",
                        name, importance, knowledge
                    );
                }
            }

            SubjectCommands::Delete { plan, name } => {
                let pid = plan_id(&db, &plan)?;
                if !db.delete_subject(pid, &name)? {
                    return Err(Error::NotFound(format!("subject '{}'", name)));
                }
                if cli.json {
                    print_json(())?;
                } else {
                    println!("Subject '{}' deleted.", name);
                }
            }
        },

        Commands::Topic(cmd) => match cmd {
            TopicCommands::Add {
                plan,
                subject,
                label,
                weight,
            } => {
                let sid = subject_id(&db, &plan, &subject)?;
                let weight = weight.map(|w| validate_rating("weight", w)).transpose()?;
                let id = db.add_topic(sid, &label, weight)?;
                if cli.json {
                    print_json(serde_json::json!({ "id": id, "label": label }))?;
                } else {
                    println!("Added topic '{}' to {}.", label, subject);
                }
            }

            TopicCommands::Weight {
                plan,
                subject,
                label,
                weight,
            } => {
                let sid = subject_id(&db, &plan, &subject)?;
                let weight = weight.map(|w| validate_rating("weight", w)).transpose()?;
                if !db.set_topic_weight(sid, &label, weight)? {
                    return Err(Error::NotFound(format!("topic '{}'", label)));
                }
                if cli.json {
                    print_json(())?;
                } else {
                    match weight {
                        Some(w) => println!("Topic '{}' weight set to {}/5.", label, w),
                        None => println!("Topic '{}' weight reset to default.", label),
                    }
                }
            }

            TopicCommands::Delete {
                plan,
                subject,
                label,
            } => {
                let sid = subject_id(&db, &plan, &subject)?;
                if !db.delete_topic(sid, &label)? {
                    return Err(Error::NotFound(format!("topic '{}'", label)));
                }
                if cli.json {
                    print_json(())?;
                } else {
                    println!("Topic '{}' deleted.", label);
                }
            }
        },

        Commands::Record(cmd) => match cmd {
            RecordCommands::Add {
                plan,
                subject,
                topic,
                minutes,
                date,
                correct,
                total,
                category,
                notes,
                review: periods,
                theory_finished,
            } => {
                let data = load_plan(&db, &plan)?;
                check_syllabus(&data, &subject, &topic)?;

                let record = NewStudyRecord {
                    date: date.as_deref().map(parse_date).transpose()?.unwrap_or(today),
                    subject,
                    topic,
                    duration_minutes: minutes,
                    correct,
                    total,
                    category,
                    notes,
                    review_periods: periods
                        .as_deref()
                        .map(review::parse_periods)
                        .transpose()?
                        .unwrap_or_default(),
                    theory_finished,
                };
                let id = db.write_record(data.plan.id, &record)?;
                if cli.json {
                    print_json(db.get_record(id)?)?;
                } else {
                    println!(
                        "Logged {} on {} / {} (ID: {}).",
                        format_minutes(record.duration_minutes),
                        record.subject,
                        record.topic,
                        id
                    );
                    if !record.review_periods.is_empty() {
                        println!("Reviews scheduled: {}", record.review_periods.join(", "));
                    }
                }
            }

            RecordCommands::Edit {
                id,
                subject,
                topic,
                minutes,
                date,
                correct,
                total,
                category,
                notes,
                review: periods,
                theory_finished,
            } => {
                let existing = db
                    .get_record(id)?
                    .ok_or_else(|| Error::NotFound(format!("study record {}", id)))?;
                let pid = existing.plan_id;
                let mut record = NewStudyRecord::from(existing);

                if let Some(subject) = subject {
                    record.subject = subject;
                }
                if let Some(topic) = topic {
                    record.topic = topic;
                }
                if let Some(minutes) = minutes {
                    record.duration_minutes = minutes;
                }
                if let Some(date) = date {
                    record.date = parse_date(&date)?;
                }
                if let Some(correct) = correct {
                    record.correct = correct;
                }
                if let Some(total) = total {
                    record.total = total;
                }
                if let Some(category) = category {
                    record.category = category;
                }
                if let Some(notes) = notes {
                    record.notes = Some(notes);
                }
                if let Some(periods) = periods {
                    record.review_periods = review::parse_periods(&periods)?;
                }
                if let Some(finished) = theory_finished {
                    record.theory_finished = finished;
                }

                if let Some(data) = db.read_plan(pid)? {
                    check_syllabus(&data, &record.subject, &record.topic)?;
                }
                db.update_record(id, &record)?;
                if cli.json {
                    print_json(db.get_record(id)?)?;
                } else {
                    println!("Study record {} updated.", id);
                }
            }

            RecordCommands::List { plan, subject } => {
                let pid = plan_id(&db, &plan)?;
                let records = db.list_records(pid, subject.as_deref())?;
                if cli.json {
                    print_json(&records)?;
                } else if records.is_empty() {
                    println!("No study records found.");
                } else {
                    println!(
                        "{:<5} {:<10} {:<20} {:<25} {:>7} {:>9}",
                        "ID", "DATE", "SUBJECT", "TOPIC", "TIME", "QUESTIONS"
                    );
                    println!("{}", "-".repeat(82));
                    for r in records {
                        let questions = if r.total == 0 {
                            String::from("-")
                        } else {
                            format!("{}/{}", r.correct, r.total)
                        };
                        println!(
                            "{:<5} {:<10} {:<20} {:<25} {:>7} {:>9}",
                            r.id,
                            r.date,
                            truncate(&r.subject, 18),
                            truncate(&r.topic, 23),
                            format_minutes(r.duration_minutes),
                            questions
                        );
                    }
                }
            }

            RecordCommands::Delete { id } => {
                if !db.delete_record(id)? {
                    return Err(Error::NotFound(format!("study record {}", id)));
                }
                if cli.json {
                    print_json(())?;
                } else {
                    println!("Study record {} deleted.", id);
                }
            }
        },

        Commands::Review(cmd) => match cmd {
            ReviewCommands::Due { plan, date } => {
                let pid = plan_id(&db, &plan)?;
                let on = date.as_deref().map(parse_date).transpose()?.unwrap_or(today);
                let due = db.due_reviews(pid, on)?;
                if cli.json {
                    print_json(&due)?;
                } else if due.is_empty() {
                    println!("No reviews due.");
                } else {
                    println!("{:<5} {:<10} {:<6} {:<20} TOPIC", "ID", "SCHEDULED", "AFTER", "SUBJECT");
                    println!("{}", "-".repeat(70));
                    for r in due {
                        println!(
                            "{:<5} {:<10} {:<6} {:<20} {}",
                            r.id,
                            r.scheduled_date,
                            r.period,
                            truncate(&r.subject, 18),
                            r.topic
                        );
                    }
                }
            }

            ReviewCommands::List { plan, status } => {
                let pid = plan_id(&db, &plan)?;
                let status = status
                    .map(|s| {
                        ReviewStatus::from_str(&s).ok_or_else(|| {
                            Error::InvalidConfig(format!(
                                "unknown review status '{}' (expected pending, completed or skipped)",
                                s
                            ))
                        })
                    })
                    .transpose()?;
                let reviews = db.list_reviews(pid, status)?;
                if cli.json {
                    print_json(&reviews)?;
                } else if reviews.is_empty() {
                    println!("No reviews found.");
                } else {
                    println!("{:<5} {:<10} {:<10} {:<20} TOPIC", "ID", "SCHEDULED", "STATUS", "SUBJECT");
                    println!("{}", "-".repeat(70));
                    for r in reviews {
                        println!(
                            "{:<5} {:<10} {:<10} {:<20} {}",
                            r.id,
                            r.scheduled_date,
                            r.status.as_str(),
                            truncate(&r.subject, 18),
                            r.topic
                        );
                    }
                }
            }

            ReviewCommands::Done { id } => {
                set_review(&db, id, ReviewStatus::Completed, today, cli.json)?;
            }

            ReviewCommands::Skip { id } => {
                set_review(&db, id, ReviewStatus::Skipped, today, cli.json)?;
            }
        },

        Commands::Exam(cmd) => match cmd {
            ExamCommands::Add {
                plan,
                name,
                date,
                board,
                time,
                comments,
                subjects,
            } => {
                let pid = plan_id(&db, &plan)?;
                let exam = MockExam {
                    id: 0,
                    plan_id: pid,
                    date: date.as_deref().map(parse_date).transpose()?.unwrap_or(today),
                    name,
                    board,
                    time_spent: time,
                    comments,
                    subjects: subjects
                        .iter()
                        .map(|s| parse_exam_subject(s))
                        .collect::<Result<Vec<_>>>()?,
                };
                let id = db.add_mock_exam(pid, &exam)?;
                if cli.json {
                    print_json(serde_json::json!({
                        "id": id,
                        "hit_rate": exam.hit_rate(),
                        "weighted_score": exam.weighted_score()
                    }))?;
                } else {
                    println!(
                        "Recorded '{}' (ID: {}): {}/{} correct ({:.1}%), weighted {:.1}%.",
                        exam.name,
                        id,
                        exam.total_correct(),
                        exam.total_questions(),
                        exam.hit_rate(),
                        exam.weighted_score()
                    );
                }
            }

            ExamCommands::List { plan } => {
                let pid = plan_id(&db, &plan)?;
                let exams = db.list_mock_exams(pid)?;
                if cli.json {
                    print_json(&exams)?;
                } else if exams.is_empty() {
                    println!("No mock exams found.");
                } else {
                    println!("{:<5} {:<10} {:<30} {:>9} {:>9}", "ID", "DATE", "NAME", "HIT RATE", "WEIGHTED");
                    println!("{}", "-".repeat(68));
                    for e in exams {
                        println!(
                            "{:<5} {:<10} {:<30} {:>8.1}% {:>8.1}%",
                            e.id,
                            e.date,
                            truncate(&e.name, 28),
                            e.hit_rate(),
                            e.weighted_score()
                        );
                    }
                }
            }

            ExamCommands::Delete { id } => {
                if !db.delete_mock_exam(id)? {
                    return Err(Error::NotFound(format!("mock exam {}", id)));
                }
                if cli.json {
                    print_json(())?;
                } else {
                    println!("Mock exam {} deleted.", id);
                }
            }
        },

        Commands::Cycle(cmd) => run_cycle(&db, &config, cmd, cli.json)?,

        Commands::Scores { plan, limit } => {
            let data = load_plan(&db, &plan)?;
            let records = db.list_records(data.plan.id, None)?;
            let mut scores = scoring::score_topics(&records, &data.topic_refs(), today);
            if let Some(limit) = limit {
                scores.truncate(limit);
            }

            if cli.json {
                print_json(&scores)?;
            } else if scores.is_empty() {
                println!("No topics found.");
            } else {
                println!(
                    "{:>6} {:<20} {:<25} {:>5} {:>6} {:>6}",
                    "SCORE", "SUBJECT", "TOPIC", "HIT", "TIMES", "DAYS"
                );
                println!("{}", "-".repeat(74));
                for s in scores {
                    let days = if s.metrics.days_since_last_study == scoring::NEVER_STUDIED_DAYS {
                        String::from("never")
                    } else {
                        s.metrics.days_since_last_study.to_string()
                    };
                    println!(
                        "{:>6.3} {:<20} {:<25} {:>4.0}% {:>6} {:>6}",
                        s.score,
                        truncate(s.subject(), 18),
                        truncate(s.topic(), 23),
                        s.metrics.hit_rate * 100.0,
                        s.metrics.study_count,
                        days
                    );
                }
            }
        }

        Commands::Next { plan, subject } => {
            let data = load_plan(&db, &plan)?;
            let records = db.list_records(data.plan.id, None)?;
            let scores = scoring::score_topics(&records, &data.topic_refs(), today);
            let rec = scoring::recommend(&scores, subject.as_deref());

            if cli.json {
                print_json(&rec)?;
            } else {
                match &rec.topic {
                    Some(t) => {
                        println!("=== Study Next ===");
                        println!();
                        println!("Subject: {}", t.subject());
                        println!("Topic: {}", t.topic());
                        println!("Score: {:.3}", t.score);
                        println!();
                        println!("{}", rec.justification);
                    }
                    None => println!("{}", rec.justification),
                }
            }
        }

        Commands::Stats { plan } => {
            let pid = plan_id(&db, &plan)?;
            let stats = db.get_stats(pid, today)?;
            if cli.json {
                print_json(&stats)?;
            } else {
                println!("=== {} ===", plan);
                println!("Study time: {}", format_minutes(stats.total_minutes.max(0) as u32));
                println!("Study days: {}", stats.study_days);
                println!("Sessions logged: {}", stats.records);
                println!(
                    "Questions: {}/{} ({:.1}%)",
                    stats.correct_questions, stats.total_questions, stats.hit_rate
                );
                println!(
                    "Syllabus: {}/{} topics finished ({:.1}%)",
                    stats.topics_finished, stats.topics_total, stats.syllabus_progress
                );
                println!(
                    "Reviews: {} pending, {} due",
                    stats.pending_reviews, stats.due_reviews
                );
                println!("Mock exams: {}", stats.mock_exams);
                println!("Study streak: {} days", stats.study_streak);
                println!(
                    "This week (from {}): {}, {}/{} questions",
                    stats.week_start,
                    format_minutes(stats.week_minutes.max(0) as u32),
                    stats.week_questions,
                    stats.weekly_questions_goal
                );
                if !stats.categories.is_empty() {
                    println!();
                    println!("{:<25} {:>8}", "CATEGORY", "TIME");
                    println!("{}", "-".repeat(34));
                    for c in &stats.categories {
                        println!(
                            "{:<25} {:>8}",
                            truncate(&c.category, 23),
                            format_minutes(c.minutes.max(0) as u32)
                        );
                    }
                }
                if !stats.subjects.is_empty() {
                    println!();
                    println!("{:<25} {:>8} {:>11} {:>7}", "SUBJECT", "TIME", "QUESTIONS", "HIT");
                    println!("{}", "-".repeat(54));
                    for s in &stats.subjects {
                        println!(
                            "{:<25} {:>8} {:>11} {:>6.1}%",
                            truncate(&s.subject, 23),
                            format_minutes(s.minutes.max(0) as u32),
                            format!("{}/{}", s.correct, s.questions),
                            s.hit_rate
                        );
                    }
                }
            }
        }

        Commands::Export { plan, file } => {
            let pid = plan_id(&db, &plan)?;
            let export = backup::export_plan(&db, pid)?;
            backup::write_export(&export, &file)?;
            if cli.json {
                print_json(serde_json::json!({
                    "file": file,
                    "records": export.records.len(),
                    "reviews": export.reviews.len(),
                    "mock_exams": export.mock_exams.len()
                }))?;
            } else {
                println!(
                    "Exported '{}' ({} records, {} reviews, {} mock exams) to {}",
                    plan,
                    export.records.len(),
                    export.reviews.len(),
                    export.mock_exams.len(),
                    file.display()
                );
            }
        }

        Commands::Import { file, name } => {
            let export = backup::read_export(&file)?;
            let result = backup::import_plan(&db, &export, name.as_deref())?;
            if cli.json {
                print_json(&result)?;
            } else {
                println!(
                    "Imported plan '{}' (ID: {}): {} subjects, {} topics, {} records, {} reviews, {} mock exams.",
                    result.plan_name,
                    result.plan_id,
                    result.subjects,
                    result.topics,
                    result.records,
                    result.reviews,
                    result.mock_exams
                );
                if result.orphaned_reviews > 0 {
                    println!("Skipped {} reviews without a matching record.", result.orphaned_reviews);
                }
            }
        }
    }

    Ok(())
}

fn run_cycle(db: &Database, config: &Config, cmd: CycleCommands, json: bool) -> Result<()> {
    match cmd {
        CycleCommands::Generate {
            plan,
            hours,
            min,
            max,
            subjects,
            questions_goal,
            study_days,
        } => {
            let data = load_plan(db, &plan)?;
            let params = CycleParams::new(
                hours.unwrap_or(config.cycle.weekly_hours),
                min.unwrap_or(config.cycle.min_session_minutes),
                max.unwrap_or(config.cycle.max_session_minutes),
            )?;

            let only = subjects.map(|s| split_list(&s));
            if let Some(names) = &only {
                for name in names {
                    if data.subject(name).is_none() {
                        return Err(Error::NotFound(format!("subject '{}'", name)));
                    }
                }
            }

            let settings = data.subject_settings(only.as_deref());
            let sessions = cycle::generate_cycle(&params, &settings, &data.subject_colors());
            let mut state = CycleState::new(params, sessions);
            state.weekly_questions_goal = questions_goal.unwrap_or(config.cycle.weekly_questions_goal);
            state.study_days = match study_days {
                Some(list) => parse_weekdays(&list)?,
                None => config.cycle.study_days.clone(),
            };
            db.save_cycle(data.plan.id, &state)?;

            if json {
                print_json(serde_json::json!({
                    "allocations": cycle::allocate(&params, &settings),
                    "sessions": &state.sessions
                }))?;
            } else if state.sessions.is_empty() {
                println!("No session fits the weekly budget. Add subjects or lower the session length.");
            } else {
                println!(
                    "Generated {} sessions ({}) for '{}'.",
                    state.sessions.len(),
                    format_minutes(state.total_minutes()),
                    plan
                );
                print_sessions(&state);
            }
        }

        CycleCommands::Show { plan } => {
            let pid = plan_id(db, &plan)?;
            let state = load_cycle(db, pid)?;
            if json {
                print_json(serde_json::json!({
                    "cycle": &state,
                    "next_session": state.next_session().map(|s| &s.id),
                    "lap_percentage": state.lap_percentage()
                }))?;
            } else if state.sessions.is_empty() {
                println!("The cycle is empty.");
            } else {
                println!(
                    "Lap {}: {:.0}% done, {} cycles completed",
                    state.completed_cycles + 1,
                    state.lap_percentage(),
                    state.completed_cycles
                );
                print_sessions(&state);
            }
        }

        CycleCommands::Done {
            plan,
            session,
            minutes,
        } => {
            let pid = plan_id(db, &plan)?;
            let mut state = load_cycle(db, pid)?;
            let id = match session {
                Some(id) => id,
                None => state
                    .next_session()
                    .map(|s| s.id.clone())
                    .ok_or_else(|| Error::NotFound("open session".to_string()))?,
            };
            let event = state.complete_session(&id, minutes)?;
            db.save_cycle(pid, &state)?;

            if json {
                print_json(&event)?;
            } else {
                match event {
                    CompletionEvent::Progressed {
                        session_id,
                        completed_minutes,
                        remaining_minutes,
                    } => {
                        if remaining_minutes == 0 {
                            println!("Session {} complete ({}).", session_id, format_minutes(completed_minutes));
                        } else {
                            println!(
                                "Session {}: {} done, {} left.",
                                session_id,
                                format_minutes(completed_minutes),
                                format_minutes(remaining_minutes)
                            );
                        }
                        if let Some(next) = state.next_session() {
                            println!("Next: {} ({})", next.subject, next.id);
                        }
                    }
                    CompletionEvent::LapCompleted { completed_cycles } => {
                        println!("Cycle complete! {} laps finished. Starting over.", completed_cycles);
                    }
                }
            }
        }

        CycleCommands::AddSession {
            plan,
            subject,
            minutes,
            color,
        } => {
            if minutes == 0 {
                return Err(Error::InvalidConfig("session length must be positive".to_string()));
            }
            let data = load_plan(db, &plan)?;
            let mut state = load_cycle(db, data.plan.id)?;
            let color = color.or_else(|| data.subject(&subject).map(|s| s.color.clone()));
            let session = state.add_session(&subject, minutes, color.as_deref()).clone();
            db.save_cycle(data.plan.id, &state)?;

            if json {
                print_json(&session)?;
            } else {
                println!("Added session {} ({}, {}).", session.id, session.subject, format_minutes(minutes));
            }
        }

        CycleCommands::RemoveSession { plan, session } => {
            let pid = plan_id(db, &plan)?;
            let mut state = load_cycle(db, pid)?;
            let (removed, event) = state.remove_session(&session)?;
            db.save_cycle(pid, &state)?;

            if json {
                print_json(serde_json::json!({
                    "removed": &removed,
                    "event": &event
                }))?;
            } else {
                println!("Removed session {} ({}).", removed.id, removed.subject);
                if let Some(CompletionEvent::LapCompleted { completed_cycles }) = event {
                    println!("Cycle complete! {} laps finished. Starting over.", completed_cycles);
                }
            }
        }

        CycleCommands::Reset { plan } => {
            let pid = plan_id(db, &plan)?;
            if !db.delete_cycle(pid)? {
                return Err(Error::NotFound(format!("cycle for plan '{}'", plan)));
            }
            if json {
                print_json(())?;
            } else {
                println!("Cycle for '{}' deleted.", plan);
            }
        }
    }

    Ok(())
}

fn print_sessions(state: &CycleState) {
    let next = state.next_session().map(|s| s.id.as_str());
    println!("{:<2} {:<25} {:<20} {:>8} {:>8}", "", "SESSION", "SUBJECT", "PLANNED", "DONE");
    println!("{}", "-".repeat(67));
    for s in &state.sessions {
        let marker = if state.is_session_complete(s) {
            "x"
        } else if Some(s.id.as_str()) == next {
            ">"
        } else {
            ""
        };
        println!(
            "{:<2} {:<25} {:<20} {:>8} {:>8}",
            marker,
            truncate(&s.id, 23),
            truncate(&s.subject, 18),
            format_minutes(s.duration_minutes),
            format_minutes(state.session_progress(&s.id))
        );
    }
}

fn set_review(db: &Database, id: i64, status: ReviewStatus, on: NaiveDate, json: bool) -> Result<()> {
    if !db.set_review_status(id, status, on)? {
        return Err(Error::NotFound(format!("review {}", id)));
    }
    if json {
        print_json(())?;
    } else {
        println!("Review {} marked {}.", id, status.as_str());
    }
    Ok(())
}

fn print_json<T: Serialize>(data: T) -> Result<()> {
    println!("{}", serde_json::to_string(&JsonOutput::ok(data))?);
    Ok(())
}

fn plan_id(db: &Database, name: &str) -> Result<i64> {
    db.plan_id_by_name(name)?
        .ok_or_else(|| Error::NotFound(format!("plan '{}'", name)))
}

fn load_plan(db: &Database, name: &str) -> Result<PlanData> {
    let id = plan_id(db, name)?;
    db.read_plan(id)?
        .ok_or_else(|| Error::NotFound(format!("plan '{}'", name)))
}

fn subject_id(db: &Database, plan: &str, subject: &str) -> Result<i64> {
    let pid = plan_id(db, plan)?;
    db.subject_id(pid, subject)?
        .ok_or_else(|| Error::NotFound(format!("subject '{}'", subject)))
}

fn load_cycle(db: &Database, plan_id: i64) -> Result<CycleState> {
    db.load_cycle(plan_id)?
        .ok_or_else(|| Error::NotFound("cycle (run `cycle generate` first)".to_string()))
}

// Records must name a subject of the plan. Unknown topics are allowed but
// will not show up in the scores.
fn check_syllabus(data: &PlanData, subject: &str, topic: &str) -> Result<()> {
    let s = data
        .subject(subject)
        .ok_or_else(|| Error::NotFound(format!("subject '{}'", subject)))?;
    if !s.topics.iter().any(|t| t.label == topic) {
        tracing::warn!(subject, topic, "topic is not part of the syllabus");
    }
    Ok(())
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map_err(|_| Error::InvalidDate(s.to_string()))
}

fn parse_exam_subject(s: &str) -> Result<MockExamSubject> {
    let invalid = || {
        Error::InvalidConfig(format!(
            "invalid exam subject '{}' (expected NAME:WEIGHT:CORRECT/TOTAL)",
            s
        ))
    };

    let mut parts = s.rsplitn(3, ':');
    let score = parts.next().ok_or_else(invalid)?;
    let weight = parts.next().ok_or_else(invalid)?;
    let name = parts.next().ok_or_else(invalid)?.trim();
    let (correct, total) = score.split_once('/').ok_or_else(invalid)?;

    let weight: u32 = weight.trim().parse().map_err(|_| invalid())?;
    let correct: u32 = correct.trim().parse().map_err(|_| invalid())?;
    let total: u32 = total.trim().parse().map_err(|_| invalid())?;
    if name.is_empty() || correct > total {
        return Err(invalid());
    }

    Ok(MockExamSubject {
        name: name.to_string(),
        weight,
        total,
        correct,
    })
}

fn parse_weekdays(s: &str) -> Result<Vec<Weekday>> {
    let mut days: Vec<Weekday> = Vec::new();
    for name in split_list(s) {
        let day: Weekday = name
            .parse()
            .map_err(|_| Error::InvalidConfig(format!("unknown weekday '{}'", name)))?;
        if !days.contains(&day) {
            days.push(day);
        }
    }
    Ok(days)
}

fn split_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect()
}

fn format_minutes(minutes: u32) -> String {
    match (minutes / 60, minutes % 60) {
        (0, m) => format!("{}m", m),
        (h, 0) => format!("{}h", h),
        (h, m) => format!("{}h{:02}m", h, m),
    }
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}
