use std::fmt;

use chrono::{DateTime, Duration, Utc};
use persona_core::model::{AssessmentId, AssessmentResult, UserId};
use persona_core::profile::derive_pair;
use persona_core::scoring::ScoreVector;
use storage::repository::Storage;

#[derive(Debug, Clone)]
struct Args {
    db_url: String,
    user_id: UserId,
    tests: Vec<AssessmentId>,
    results: u32,
    now: Option<DateTime<Utc>>,
}

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidUserId { raw: String },
    InvalidTests { raw: String },
    InvalidResults { raw: String },
    InvalidDbUrl { raw: String },
    InvalidNow { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidUserId { raw } => write!(f, "invalid --user value: {raw}"),
            ArgsError::InvalidTests { raw } => write!(f, "invalid --tests value: {raw}"),
            ArgsError::InvalidResults { raw } => write!(f, "invalid --results value: {raw}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
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

fn parse_tests(raw: &str) -> Result<Vec<AssessmentId>, ArgsError> {
    let tests: Vec<AssessmentId> = raw
        .split(',')
        .filter_map(|part| part.parse::<AssessmentId>().ok())
        .collect();
    if tests.is_empty() {
        return Err(ArgsError::InvalidTests { raw: raw.to_owned() });
    }
    Ok(tests)
}

impl Args {
    fn parse() -> Result<Self, ArgsError> {
        let mut db_url = std::env::var("PERSONA_DB_URL")
            .unwrap_or_else(|_| "sqlite:persona.sqlite3?mode=rwc".into());
        let mut user_id = std::env::var("PERSONA_USER_ID")
            .ok()
            .and_then(|value| value.parse::<UserId>().ok())
            .unwrap_or_else(UserId::random);
        let mut tests = std::env::var("PERSONA_SEED_TESTS")
            .ok()
            .and_then(|value| parse_tests(&value).ok())
            .unwrap_or_else(|| vec![AssessmentId::new("big-five")]);
        let mut results = std::env::var("PERSONA_SEED_RESULTS")
            .ok()
            .and_then(|value| value.parse::<u32>().ok())
            .unwrap_or(3);
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
                "--user" => {
                    let value = require_value(&mut args, "--user")?;
                    user_id = value
                        .parse()
                        .map_err(|_| ArgsError::InvalidUserId { raw: value.clone() })?;
                }
                "--tests" => {
                    let value = require_value(&mut args, "--tests")?;
                    tests = parse_tests(&value)?;
                }
                "--results" => {
                    let value = require_value(&mut args, "--results")?;
                    results = value
                        .parse::<u32>()
                        .map_err(|_| ArgsError::InvalidResults { raw: value.clone() })?;
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
            user_id,
            tests,
            results,
            now,
        })
    }
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p storage --bin seed -- [options]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --db <sqlite_url>         SQLite URL (default: sqlite:persona.sqlite3?mode=rwc)");
    eprintln!("  --user <uuid>             User to seed (default: random)");
    eprintln!("  --tests <id,id,...>       Assessment ids to grant (default: big-five)");
    eprintln!("  --results <n>             Sample results appended per test (default: 3)");
    eprintln!("  --now <rfc3339>           Fixed current time for deterministic seeding");
    eprintln!("  -h, --help                Show this help");
    eprintln!();
    eprintln!("Environment (same as flags):");
    eprintln!("  PERSONA_DB_URL, PERSONA_USER_ID, PERSONA_SEED_TESTS, PERSONA_SEED_RESULTS");
}

fn sample_scores(seed: u32) -> ScoreVector {
    let categories = [
        "openness",
        "conscientiousness",
        "extraversion",
        "agreeableness",
        "neuroticism",
    ];
    categories
        .iter()
        .zip(0_i32..)
        .map(|(name, offset)| {
            let raw = i32::try_from(seed % 7).unwrap_or(0) + offset;
            ((*name).to_owned(), raw % 11 - 5)
        })
        .collect()
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse().map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    let storage = Storage::sqlite(&args.db_url).await?;
    let now = args.now.unwrap_or_else(Utc::now);

    for test in &args.tests {
        storage.access.set_access(args.user_id, test, true).await?;

        for i in 0..args.results {
            let completed_at = now - Duration::days(i64::from(i) * 3);
            let scores = sample_scores(i);
            let (primary, secondary) = derive_pair(&scores);
            let result = AssessmentResult::from_persisted(
                args.user_id,
                test.clone(),
                test.to_string(),
                scores.clone(),
                scores.percentage_score(),
                Vec::new(),
                Some(primary.category.as_str().to_owned()),
                secondary.map(|p| p.category.as_str().to_owned()),
                Some(300 + i * 17),
                completed_at,
            )?;
            let _ = storage.results.append_result(&result).await?;
        }
    }

    println!(
        "Seeded user {} with access to {} tests and {} results each into {}",
        args.user_id,
        args.tests.len(),
        args.results,
        args.db_url
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
