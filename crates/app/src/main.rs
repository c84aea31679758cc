use std::fmt;
use std::path::PathBuf;

use persona_core::model::{AssessmentId, UserId};
use services::{AppServices, AssessmentCatalog, Clock, FeedbackService, LogFeedback};
use tracing::debug;
use tracing_subscriber::EnvFilter;

mod quiz;

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    MissingArgument { command: &'static str, what: &'static str },
    UnknownArg(String),
    UnknownCommand(String),
    InvalidUserId { raw: String },
    InvalidAssessmentId { raw: String },
    InvalidLimit { raw: String },
    InvalidDbUrl { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::MissingArgument { command, what } => {
                write!(f, "{command} requires {what}")
            }
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::UnknownCommand(cmd) => write!(f, "unknown command: {cmd}"),
            ArgsError::InvalidUserId { raw } => write!(f, "invalid --user value: {raw}"),
            ArgsError::InvalidAssessmentId { raw } => write!(f, "invalid assessment id: {raw}"),
            ArgsError::InvalidLimit { raw } => write!(f, "invalid --limit value: {raw}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
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

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    List,
    Take(AssessmentId),
    Resume(AssessmentId),
    Retake(AssessmentId),
    History { limit: u32 },
    Stats,
    Grant { assessment_id: AssessmentId, granted: bool },
}

struct Args {
    db_url: String,
    user_id: Option<UserId>,
    catalog_path: PathBuf,
    verbose: bool,
    command: Command,
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  persona [options] list");
    eprintln!("  persona [options] take <assessment_id>");
    eprintln!("  persona [options] resume <assessment_id>");
    eprintln!("  persona [options] retake <assessment_id>");
    eprintln!("  persona [options] history [--limit <n>]");
    eprintln!("  persona [options] stats");
    eprintln!("  persona [options] grant <assessment_id> [--revoke]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --db <sqlite_url>     default: sqlite://persona.sqlite3");
    eprintln!("  --user <uuid>         current user; anonymous when absent");
    eprintln!("  --catalog <path>      default: assets/catalog.json");
    eprintln!("  -v, --verbose         debug logging");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  PERSONA_DB_URL, PERSONA_USER_ID, PERSONA_CATALOG, RUST_LOG");
}

fn parse_assessment_id(raw: Option<&String>, command: &'static str) -> Result<AssessmentId, ArgsError> {
    let raw = raw.ok_or(ArgsError::MissingArgument {
        command,
        what: "an assessment id",
    })?;
    raw.parse()
        .map_err(|_| ArgsError::InvalidAssessmentId { raw: raw.clone() })
}

impl Args {
    fn parse(argv: impl IntoIterator<Item = String>) -> Result<Self, ArgsError> {
        let mut db_url = std::env::var("PERSONA_DB_URL")
            .ok()
            .map_or_else(|| "sqlite://persona.sqlite3".into(), normalize_sqlite_url);
        let mut user_id = std::env::var("PERSONA_USER_ID")
            .ok()
            .and_then(|value| value.parse::<UserId>().ok());
        let mut catalog_path = std::env::var("PERSONA_CATALOG")
            .map_or_else(|_| PathBuf::from("assets/catalog.json"), PathBuf::from);
        let mut verbose = false;
        let mut limit: u32 = 20;
        let mut revoke = false;
        let mut positional: Vec<String> = Vec::new();

        let mut args = argv.into_iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(&mut args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = normalize_sqlite_url(value);
                }
                "--user" => {
                    let value = require_value(&mut args, "--user")?;
                    let parsed = value
                        .parse::<UserId>()
                        .map_err(|_| ArgsError::InvalidUserId { raw: value.clone() })?;
                    user_id = Some(parsed);
                }
                "--catalog" => {
                    catalog_path = PathBuf::from(require_value(&mut args, "--catalog")?);
                }
                "--limit" => {
                    let value = require_value(&mut args, "--limit")?;
                    limit = value
                        .parse()
                        .map_err(|_| ArgsError::InvalidLimit { raw: value.clone() })?;
                }
                "--revoke" => revoke = true,
                "--verbose" | "-v" => verbose = true,
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                flag if flag.starts_with('-') => return Err(ArgsError::UnknownArg(arg)),
                _ => positional.push(arg),
            }
        }

        let command = match positional.first().map(String::as_str) {
            None | Some("list") => Command::List,
            Some("take") => Command::Take(parse_assessment_id(positional.get(1), "take")?),
            Some("resume") => Command::Resume(parse_assessment_id(positional.get(1), "resume")?),
            Some("retake") => Command::Retake(parse_assessment_id(positional.get(1), "retake")?),
            Some("history") => Command::History { limit },
            Some("stats") => Command::Stats,
            Some("grant") => Command::Grant {
                assessment_id: parse_assessment_id(positional.get(1), "grant")?,
                granted: !revoke,
            },
            Some(other) => return Err(ArgsError::UnknownCommand(other.to_owned())),
        };

        Ok(Self {
            db_url,
            user_id,
            catalog_path,
            verbose,
            command,
        })
    }
}

fn normalize_sqlite_url(raw: String) -> String {
    if raw == "sqlite::memory:" || raw.starts_with("sqlite://") {
        return raw;
    }

    let trimmed = raw.trim().to_string();
    let path_str = trimmed
        .strip_prefix("sqlite:")
        .unwrap_or(trimmed.as_str())
        .to_string();
    let path = std::path::Path::new(&path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

fn prepare_sqlite_file(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    if db_url == "sqlite::memory:" {
        return Ok(());
    }

    let path = db_url
        .strip_prefix("sqlite://")
        .ok_or_else(|| ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        })?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        }
        .into());
    }

    let path = std::path::Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn load_catalog(path: &std::path::Path) -> Result<AssessmentCatalog, Box<dyn std::error::Error>> {
    let json = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read catalog {}: {e}", path.display()))?;
    Ok(AssessmentCatalog::from_json_str(&json)?)
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let parsed = Args::parse(std::env::args().skip(1)).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;
    init_logging(parsed.verbose);

    let catalog = load_catalog(&parsed.catalog_path)?;
    debug!(
        assessments = catalog.len(),
        path = %parsed.catalog_path.display(),
        "catalog loaded"
    );

    // Open + migrate SQLite at startup. Keep this in the binary glue so core/services stay pure.
    prepare_sqlite_file(&parsed.db_url)?;
    let feedback = std::sync::Arc::new(FeedbackService::new(std::sync::Arc::new(LogFeedback)));
    feedback.initialize();
    let app = AppServices::new_sqlite(&parsed.db_url, Clock::system(), catalog)
        .await?
        .with_feedback(std::sync::Arc::clone(&feedback));

    let identity = parsed.user_id;
    let outcome = match parsed.command {
        Command::List => {
            quiz::list(&app);
            Ok(())
        }
        Command::Take(id) => quiz::take(&app, identity, &id, quiz::StartMode::ResumeOrFresh).await,
        Command::Resume(id) => quiz::take(&app, identity, &id, quiz::StartMode::ResumeOnly).await,
        Command::Retake(id) => quiz::take(&app, identity, &id, quiz::StartMode::Fresh).await,
        Command::History { limit } => {
            quiz::history(&app, identity, limit).await;
            Ok(())
        }
        Command::Stats => {
            quiz::stats(&app, identity).await;
            Ok(())
        }
        Command::Grant {
            assessment_id,
            granted,
        } => {
            let user_id = identity.ok_or(ArgsError::MissingArgument {
                command: "grant",
                what: "--user",
            })?;
            app.set_access(user_id, &assessment_id, granted).await?;
            println!(
                "{} access to {assessment_id} for {user_id}",
                if granted { "Granted" } else { "Revoked" }
            );
            Ok(())
        }
    };

    feedback.dispose();
    outcome
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        // At this layer (binary glue), printing once is fine.
        eprintln!("{err}");
        std::process::exit(2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Args, ArgsError> {
        Args::parse(args.iter().map(|s| (*s).to_owned()))
    }

    #[test]
    fn parses_command_and_flags_in_any_order() {
        let user = UserId::random();
        let args = parse(&[
            "take",
            "big-five",
            "--user",
            &user.to_string(),
            "--db",
            "sqlite://tmp/p.sqlite3",
            "-v",
        ])
        .unwrap();
        assert_eq!(args.command, Command::Take(AssessmentId::new("big-five")));
        assert_eq!(args.user_id, Some(user));
        assert_eq!(args.db_url, "sqlite://tmp/p.sqlite3");
        assert!(args.verbose);
    }

    #[test]
    fn missing_assessment_id_is_reported() {
        assert!(matches!(
            parse(&["take"]),
            Err(ArgsError::MissingArgument { command: "take", .. })
        ));
    }

    #[test]
    fn rejects_unknown_inputs() {
        assert!(matches!(parse(&["dance"]), Err(ArgsError::UnknownCommand(_))));
        assert!(matches!(parse(&["--nope"]), Err(ArgsError::UnknownArg(_))));
        assert!(matches!(
            parse(&["--user", "not-a-uuid"]),
            Err(ArgsError::InvalidUserId { .. })
        ));
        assert!(matches!(
            parse(&["--db"]),
            Err(ArgsError::MissingValue { flag: "--db" })
        ));
    }

    #[test]
    fn grant_honors_revoke() {
        let args = parse(&["grant", "big-five", "--revoke"]).unwrap();
        assert_eq!(
            args.command,
            Command::Grant {
                assessment_id: AssessmentId::new("big-five"),
                granted: false
            }
        );
    }

    #[test]
    fn relative_sqlite_paths_become_absolute() {
        let url = normalize_sqlite_url("sqlite:data/p.sqlite3".into());
        assert!(url.starts_with("sqlite:///"));
        assert!(url.ends_with("data/p.sqlite3"));
        assert_eq!(normalize_sqlite_url("sqlite::memory:".into()), "sqlite::memory:");
    }
}
