use std::fmt;
use std::path::PathBuf;

use portal_core::model::{CourseOutline, CourseRecord};
use storage::repository::Storage;

#[derive(Debug, Clone)]
struct Args {
    db_url: String,
    outlines: Vec<PathBuf>,
    progress: Option<u8>,
}

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidDbUrl { raw: String },
    InvalidProgress { raw: String },
    NoOutlines,
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::InvalidProgress { raw } => {
                write!(f, "invalid --progress value (expected 0-100): {raw}")
            }
            ArgsError::NoOutlines => write!(f, "at least one --course <outline.json> is required"),
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
            std::env::var("PORTAL_DB_URL").unwrap_or_else(|_| "sqlite:portal.sqlite3".into());
        let mut outlines = Vec::new();
        let mut progress = None;

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
                "--course" => {
                    outlines.push(PathBuf::from(require_value(&mut args, "--course")?));
                }
                "--progress" => {
                    let value = require_value(&mut args, "--progress")?;
                    let parsed = value
                        .parse::<u8>()
                        .ok()
                        .filter(|p| *p <= 100)
                        .ok_or_else(|| ArgsError::InvalidProgress { raw: value.clone() })?;
                    progress = Some(parsed);
                }
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        if outlines.is_empty() {
            return Err(ArgsError::NoOutlines);
        }

        Ok(Self {
            db_url,
            outlines,
            progress,
        })
    }
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p storage --bin seed -- --course <outline.json> [options]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --db <sqlite_url>         SQLite URL (default: sqlite:portal.sqlite3)");
    eprintln!("  --course <path>           Course outline JSON to cache (repeatable)");
    eprintln!("  --progress <0-100>        Seed every course at this course percentage");
    eprintln!("  -h, --help                Show this help");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  PORTAL_DB_URL");
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse().map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    let storage = Storage::sqlite(&args.db_url).await?;

    for path in &args.outlines {
        let raw = std::fs::read_to_string(path)?;
        let outline = CourseOutline::from_json(&raw)?;
        let mut record = match storage.courses.get_course(outline.course_id()).await? {
            Some(existing) => existing,
            None => CourseRecord::from_outline(&outline),
        };
        if let Some(progress) = args.progress {
            record = record.with_progress(progress, record.completed_modules);
        }
        storage.courses.replace_course(&record).await?;
        println!(
            "Seeded course {} ({}%, {}) into {}",
            record.id,
            record.progress,
            record.status.as_wire(),
            args.db_url
        );
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
