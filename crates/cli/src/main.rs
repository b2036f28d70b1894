//! Hifz CLI - memorization progression and exam gating.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::Level;
use hifz_core::{
    ContinuationMode, DurationUnit, ExamCode, Gender, OfficialCode, PartNumber, PartRange,
    PlanDuration, RegistrationWindows, RequestKind, RunMode, Student, Track, Window,
};
use hifz_engine::{GatingEngine, PlanSpec, Stage};
use hifz_storage::{JsonStorage, Storage};

#[derive(Parser)]
#[command(name = "hifz")]
#[command(about = "Memorization progression and exam gating", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a new student
    AddStudent {
        /// Display name
        name: String,
        /// Track: regular or intensive
        #[arg(long, default_value = "regular")]
        track: String,
        /// Gender: male or female
        #[arg(long, default_value = "male")]
        gender: String,
        /// Contact email
        #[arg(long)]
        email: Option<String>,
    },
    /// Create a memorization plan
    Plan {
        /// Student ID
        student: String,
        /// Parts already recited, e.g. 1-7
        #[arg(long)]
        parts: Option<String>,
        /// Official exams already passed, e.g. F1,F2
        #[arg(long)]
        officials: Option<String>,
        /// Resume point: start, end, or a part number
        #[arg(long, default_value = "start")]
        resume: String,
        /// Deadline unit: day or week
        #[arg(long, default_value = "week")]
        unit: String,
        /// Deadline step size
        #[arg(long, default_value = "1")]
        value: u32,
        /// Approve immediately
        #[arg(long)]
        approved: bool,
    },
    /// Show a student's plan and gate state
    Show {
        /// Student ID
        student: String,
    },
    /// Request a part exam
    RequestPart {
        /// Student ID
        student: String,
        /// Part number (1-30)
        part: u8,
        /// Exam date (YYYY-MM-DD)
        #[arg(long)]
        date: String,
        /// Re-sit an already-recited part
        #[arg(long)]
        redo: bool,
    },
    /// Request an official exam
    RequestOfficial {
        /// Student ID
        student: String,
        /// Official code, e.g. F1 or T2
        code: String,
        /// Trial sitting date (YYYY-MM-DD)
        #[arg(long)]
        trial: String,
        /// Official sitting date (YYYY-MM-DD)
        #[arg(long)]
        official: Option<String>,
    },
    /// Approve or reject a pending exam request
    Resolve {
        /// Request ID
        request: String,
        /// Reject instead of approving
        #[arg(long)]
        reject: bool,
    },
    /// Grade an approved exam request by score
    Grade {
        /// Request ID
        request: String,
        /// Score (0-100)
        score: f64,
        /// Sitting for official requests: trial or official
        #[arg(long, default_value = "official")]
        stage: String,
    },
    /// Record an exam result directly
    Record {
        /// Student ID
        student: String,
        /// Exam code, e.g. J05 or F1
        code: String,
        /// Record as failed (default is passed)
        #[arg(long)]
        failed: bool,
        /// Count the attempt as official
        #[arg(long)]
        official: bool,
        /// Score, if graded numerically
        #[arg(long)]
        score: Option<f64>,
        /// Exam date (YYYY-MM-DD), defaults to today
        #[arg(long)]
        date: Option<String>,
    },
    /// Delete an exam record (cascades to its request)
    DeleteExam {
        /// Exam record ID
        exam: String,
    },
    /// Update registration blackout windows
    Registration {
        /// Close part registration from this date
        #[arg(long)]
        part_from: Option<String>,
        /// Reopen part registration after this date
        #[arg(long)]
        part_until: Option<String>,
        /// Close official registration from this date
        #[arg(long)]
        official_from: Option<String>,
        /// Reopen official registration after this date
        #[arg(long)]
        official_until: Option<String>,
    },
    /// Sweep active plans and send overdue reminders
    Remind {
        /// Sweep date (YYYY-MM-DD), defaults to today
        #[arg(long)]
        date: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .init();

    let cli = Cli::parse();

    let storage_path = std::path::PathBuf::from(".hifz");
    let storage = JsonStorage::new(&storage_path).await?;
    let mut engine = GatingEngine::new(storage);
    let today = chrono::Utc::now().date_naive();

    match cli.command {
        Commands::AddStudent { name, track, gender, email } => {
            let mut student = Student::new(name, parse_track(&track)?, parse_gender(&gender)?);
            student.email = email;
            engine.storage_mut().save_student(&student).await?;
            engine.storage_mut().commit("Add student").await?;
            println!("Added student: {} - {}", student.id, student.name);
        }
        Commands::Plan { student, parts, officials, resume, unit, value, approved } => {
            let prior_parts = parts.as_deref().map(parse_range).transpose()?;
            let spec = PlanSpec {
                student_id: student.parse()?,
                prior_parts,
                prior_officials: parse_officials(officials.as_deref())?,
                continuation: parse_resume(&resume)?,
                duration: PlanDuration { unit: parse_unit(&unit)?, value },
                approved,
            };
            let plan = engine.create_plan(spec, today).await?;
            println!("Created plan: {}", plan.id);
            println!("  Current part: {}", plan.current_part);
            println!("  Due: {}", plan.due_date);
            if plan.paused_for_official {
                println!("  Paused for: {}", codes_line(&plan.outstanding_official));
            }
        }
        Commands::Show { student } => {
            let student_id = student.parse()?;
            let Some(status) = engine.get_active_plan(student_id, today).await? else {
                println!("No approved plan");
                return Ok(());
            };
            let plan = status.plan;
            println!("Plan: {}", plan.id);
            println!("  Current part: {}", plan.current_part);
            println!("  Window: {} .. {}", plan.start_date, plan.due_date);
            println!("  Paused: {}", plan.paused_for_official);
            if !plan.outstanding_official.is_empty() {
                println!("  Outstanding: {}", codes_line(&plan.outstanding_official));
            }
            println!("  Overdue: {}", status.overdue);
        }
        Commands::RequestPart { student, part, date, redo } => {
            let part = PartNumber::new(part)
                .ok_or_else(|| anyhow::anyhow!("part must be 1-30"))?;
            let run_mode = if redo { RunMode::Redo } else { RunMode::Normal };
            let kind = RequestKind::Part { part, date: date.parse()?, run_mode };
            let request = engine.submit_exam_request(student.parse()?, kind, today).await?;
            println!("Filed request: {} (pending approval)", request.id);
        }
        Commands::RequestOfficial { student, code, trial, official } => {
            let kind = RequestKind::Official {
                code: code.parse::<OfficialCode>()?,
                trial_date: trial.parse()?,
                official_date: official.as_deref().map(str::parse).transpose()?,
            };
            let request = engine.submit_exam_request(student.parse()?, kind, today).await?;
            println!("Filed request: {} (pending approval)", request.id);
        }
        Commands::Resolve { request, reject } => {
            let id = request.parse()?;
            let request = if reject {
                engine.reject_request(id).await?
            } else {
                engine.approve_request(id).await?
            };
            let verdict = if reject { "rejected" } else { "approved" };
            println!("Request {} {}", request.id, verdict);
        }
        Commands::Grade { request, score, stage } => {
            let record = engine
                .grade_request(request.parse()?, score, parse_stage(&stage)?)
                .await?;
            let outcome = if record.passed { "PASS" } else { "FAIL" };
            println!("Graded {}: {} ({})", record.code, outcome, score);
        }
        Commands::Record { student, code, failed, official, score, date } => {
            let taken_on = match date {
                Some(d) => d.parse()?,
                None => today,
            };
            let record = engine
                .record_exam_result(
                    student.parse()?,
                    code.parse::<ExamCode>()?,
                    !failed,
                    official,
                    score,
                    taken_on,
                    None,
                )
                .await?;
            println!("Recorded {}: passed={} official={}", record.code, record.passed, record.official);
        }
        Commands::DeleteExam { exam } => {
            engine.delete_exam_result(exam.parse()?).await?;
            println!("Exam record deleted");
        }
        Commands::Registration { part_from, part_until, official_from, official_until } => {
            let windows = RegistrationWindows {
                part: parse_window(part_from.as_deref(), part_until.as_deref())?,
                official: parse_window(official_from.as_deref(), official_until.as_deref())?,
            };
            engine.update_registration(windows).await?;
            println!("Registration windows updated");
        }
        Commands::Remind { date } => {
            let on = match date {
                Some(d) => d.parse()?,
                None => today,
            };
            let sent = engine.send_due_reminders(on).await?;
            println!("Reminders sent: {}", sent.len());
        }
    }

    Ok(())
}

fn parse_track(s: &str) -> Result<Track> {
    match s.to_lowercase().as_str() {
        "regular" => Ok(Track::Regular),
        "intensive" => Ok(Track::Intensive),
        _ => Err(anyhow::anyhow!("track must be regular or intensive")),
    }
}

fn parse_gender(s: &str) -> Result<Gender> {
    match s.to_lowercase().as_str() {
        "male" => Ok(Gender::Male),
        "female" => Ok(Gender::Female),
        _ => Err(anyhow::anyhow!("gender must be male or female")),
    }
}

fn parse_unit(s: &str) -> Result<DurationUnit> {
    match s.to_lowercase().as_str() {
        "day" => Ok(DurationUnit::Day),
        "week" => Ok(DurationUnit::Week),
        _ => Err(anyhow::anyhow!("unit must be day or week")),
    }
}

fn parse_stage(s: &str) -> Result<Stage> {
    match s.to_lowercase().as_str() {
        "trial" => Ok(Stage::Trial),
        "official" => Ok(Stage::Official),
        _ => Err(anyhow::anyhow!("stage must be trial or official")),
    }
}

fn parse_resume(s: &str) -> Result<ContinuationMode> {
    match s.to_lowercase().as_str() {
        "start" => Ok(ContinuationMode::FromStart),
        "end" => Ok(ContinuationMode::FromEnd),
        n => {
            let part = n
                .parse::<u8>()
                .ok()
                .and_then(PartNumber::new)
                .ok_or_else(|| anyhow::anyhow!("resume must be start, end, or a part 1-30"))?;
            Ok(ContinuationMode::Specific(part))
        }
    }
}

fn parse_range(s: &str) -> Result<PartRange> {
    let (a, b) = s
        .split_once('-')
        .ok_or_else(|| anyhow::anyhow!("range must look like 1-7"))?;
    let start = a.trim().parse::<u8>().ok().and_then(PartNumber::new);
    let end = b.trim().parse::<u8>().ok().and_then(PartNumber::new);
    match (start, end) {
        (Some(start), Some(end)) => Ok(PartRange::new(start, end)),
        _ => Err(anyhow::anyhow!("range bounds must be parts 1-30")),
    }
}

fn parse_officials(s: Option<&str>) -> Result<Vec<OfficialCode>> {
    let Some(s) = s else {
        return Ok(Vec::new());
    };
    s.split(',')
        .map(|c| c.trim().parse::<OfficialCode>().map_err(Into::into))
        .collect()
}

fn parse_window(from: Option<&str>, until: Option<&str>) -> Result<Option<Window>> {
    let Some(from) = from else {
        return Ok(None);
    };
    Ok(Some(Window {
        from: from.parse()?,
        until: until.map(str::parse).transpose()?,
    }))
}

fn codes_line(codes: &std::collections::BTreeSet<OfficialCode>) -> String {
    codes.iter().map(|c| c.to_string()).collect::<Vec<_>>().join(", ")
}
