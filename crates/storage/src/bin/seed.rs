use std::fmt;

use chrono::{DateTime, Utc};
use qbank_core::model::{
    Choice, ChoiceId, ChoiceLabel, Difficulty, Question, QuestionId, QuestionStatus, TagSlug,
};
use storage::repository::{QuestionRepository, Storage};

#[derive(Debug, Clone)]
struct Args {
    db_url: String,
    questions: u32,
    now: Option<DateTime<Utc>>,
}

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidDbUrl { raw: String },
    InvalidQuestions { raw: String },
    InvalidNow { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::InvalidQuestions { raw } => write!(f, "invalid --questions value: {raw}"),
            ArgsError::InvalidNow { raw } => {
                write!(f, "invalid --now value (expected RFC3339): {raw}")
            }
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

impl Args {
    fn parse() -> Result<Self, ArgsError> {
        let mut db_url =
            std::env::var("QBANK_DB_URL").unwrap_or_else(|_| "sqlite:dev.sqlite3".into());
        let mut questions = std::env::var("QBANK_QUESTIONS")
            .ok()
            .and_then(|value| value.parse::<u32>().ok())
            .unwrap_or(10);
        let mut now: Option<DateTime<Utc>> = None;

        let mut args = std::env::args().skip(1);
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(&mut args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = value;
                }
                "--questions" => {
                    let value = require_value(&mut args, "--questions")?;
                    questions = value
                        .parse::<u32>()
                        .map_err(|_| ArgsError::InvalidQuestions { raw: value.clone() })?;
                }
                "--now" => {
                    let value = require_value(&mut args, "--now")?;
                    let parsed = DateTime::parse_from_rfc3339(&value)
                        .map_err(|_| ArgsError::InvalidNow { raw: value.clone() })?
                        .with_timezone(&Utc);
                    now = Some(parsed);
                }
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(Self {
            db_url,
            questions,
            now,
        })
    }
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p storage --bin seed -- [options]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --db <sqlite_url>         SQLite URL (default: sqlite:dev.sqlite3)");
    eprintln!("  --questions <n>           Number of sample questions to upsert (default: 10)");
    eprintln!("  --now <rfc3339>           Fixed creation time for deterministic seeding");
    eprintln!("  -h, --help                Show this help");
    eprintln!();
    eprintln!("Environment (same as flags):");
    eprintln!("  QBANK_DB_URL, QBANK_QUESTIONS");
}

const SAMPLES: &[(&str, &str, &str, &str, Difficulty)] = &[
    (
        "first-heart-sound",
        "Closure of which valves produces the first heart sound?",
        "S1 is produced by closure of the mitral and tricuspid valves.",
        "cardiology",
        Difficulty::Easy,
    ),
    (
        "nephron-dilute-urine",
        "Which nephron segment is impermeable to water and dilutes the filtrate?",
        "The thick ascending limb reabsorbs solute but not water.",
        "renal",
        Difficulty::Medium,
    ),
    (
        "pressure-units",
        "One pascal is equivalent to which combination of SI base units?",
        "Pa = kg/(m*s^2), i.e. one newton per square metre.",
        "physics",
        Difficulty::Easy,
    ),
    (
        "acid-base-compensation",
        "A chronic respiratory acidosis is compensated primarily by which organ?",
        "The kidneys retain bicarbonate over days to offset retained CO2.",
        "renal",
        Difficulty::Hard,
    ),
    (
        "frank-starling",
        "Increasing preload increases stroke volume by which mechanism?",
        "Greater end-diastolic fibre stretch improves actin-myosin overlap.",
        "cardiology",
        Difficulty::Medium,
    ),
];

fn build_sample_question(index: u32, now: DateTime<Utc>) -> Result<Question, Box<dyn std::error::Error>> {
    let (slug, stem, explanation, tag, difficulty) = SAMPLES[(index as usize) % SAMPLES.len()];
    let option_texts = ["option one", "option two", "option three", "option four"];

    let choices = option_texts
        .iter()
        .enumerate()
        .map(|(i, text)| Choice {
            id: ChoiceId::new(u64::from(index) * 10 + i as u64 + 1),
            label: ChoiceLabel::ALL[i],
            text: (*text).to_string(),
            is_correct: i == (index as usize) % option_texts.len(),
            explanation_md: (i == 0).then(|| "Distractor rationale.".to_string()),
            sort_order: i as u32,
        })
        .collect();

    let question = Question::new(
        QuestionId::new(u64::from(index) + 1),
        format!("{slug}-{}", index + 1),
        stem,
        explanation,
        difficulty,
        QuestionStatus::Published,
        choices,
        vec![TagSlug::new(tag)?],
        now,
    )?;
    Ok(question)
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse().map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    let storage = Storage::sqlite(&args.db_url).await?;
    let now = args.now.unwrap_or_else(Utc::now);

    for i in 0..args.questions {
        let question = build_sample_question(i, now)?;
        storage.questions.upsert_question(&question).await?;
    }

    println!(
        "Seeded {} published questions into {}",
        args.questions, args.db_url
    );

    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
