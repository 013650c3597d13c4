use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use portal_core::model::CourseOutline;
use services::{
    AttemptBackend, BeaconTransport, Clock, HttpAttemptBackend, HttpBeacon, LessonState,
    PlayerServices, PlayerSession, SyncConfig, TracingObserver,
};
use storage::repository::Storage;
use tracing_subscriber::EnvFilter;

mod replay;

use replay::{DryRunBackend, DryRunBeacon, ReplayEnd};

const BEACON_GRACE: Duration = Duration::from_secs(2);
const LIVE_POLL: Duration = Duration::from_millis(100);

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    MissingFlag { flag: &'static str },
    UnknownArg(String),
    InvalidDbUrl { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::MissingFlag { flag } => write!(f, "{flag} is required"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
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

fn print_usage() {
    eprintln!("Usage:");
    eprintln!(
        "  cargo run -p app -- replay --course <outline.json> --events <steps.jsonl> [--db <sqlite_url>] [--dry-run] [--realtime]"
    );
    eprintln!("  cargo run -p app -- courses [--db <sqlite_url>]");
    eprintln!();
    eprintln!("Defaults:");
    eprintln!("  replay keeps the course cache in memory unless --db is given");
    eprintln!("  replay simulates time unless --realtime is given");
    eprintln!("  courses uses --db sqlite:portal.sqlite3");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  PORTAL_DB_URL, PORTAL_API_BASE_URL, PORTAL_ACCESS_TOKEN, PORTAL_SCORM_ORIGIN,");
    eprintln!("  PORTAL_PERSIST_DELAY_MS, PORTAL_CONFIRM_DELAY_MS, RUST_LOG");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Replay,
    Courses,
}

impl Command {
    fn from_arg(arg: &str) -> Option<Self> {
        match arg {
            "replay" => Some(Self::Replay),
            "courses" => Some(Self::Courses),
            _ => None,
        }
    }
}

struct ReplayArgs {
    db_url: Option<String>,
    course: PathBuf,
    events: PathBuf,
    dry_run: bool,
    realtime: bool,
}

struct CoursesArgs {
    db_url: String,
}

fn parse_db(args: &mut impl Iterator<Item = String>) -> Result<String, ArgsError> {
    let value = require_value(args, "--db")?;
    if value.trim().is_empty() {
        return Err(ArgsError::InvalidDbUrl { raw: value });
    }
    Ok(normalize_sqlite_url(value))
}

impl ReplayArgs {
    fn parse(args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut db_url = std::env::var("PORTAL_DB_URL").ok().map(normalize_sqlite_url);
        let mut course = None;
        let mut events = None;
        let mut dry_run = false;
        let mut realtime = false;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => db_url = Some(parse_db(args)?),
                "--course" => course = Some(PathBuf::from(require_value(args, "--course")?)),
                "--events" => events = Some(PathBuf::from(require_value(args, "--events")?)),
                "--dry-run" => dry_run = true,
                "--realtime" => realtime = true,
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(Self {
            db_url,
            course: course.ok_or(ArgsError::MissingFlag { flag: "--course" })?,
            events: events.ok_or(ArgsError::MissingFlag { flag: "--events" })?,
            dry_run,
            realtime,
        })
    }
}

impl CoursesArgs {
    fn parse(args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut db_url = normalize_sqlite_url(
            std::env::var("PORTAL_DB_URL").unwrap_or_else(|_| "sqlite:portal.sqlite3".into()),
        );

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => db_url = parse_db(args)?,
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(Self { db_url })
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
            .unwrap_or_else(|_| std::path::PathBuf::from("."))
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

async fn open_storage(db_url: Option<&str>) -> Result<Storage, Box<dyn std::error::Error>> {
    match db_url {
        Some(url) => {
            prepare_sqlite_file(url)?;
            Ok(Storage::sqlite(url).await?)
        }
        None => Ok(Storage::in_memory()),
    }
}

async fn replay(args: ReplayArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = SyncConfig::from_env();
    let outline = CourseOutline::from_json(&std::fs::read_to_string(&args.course)?)?;
    let steps = replay::parse_steps(&std::fs::read_to_string(&args.events)?)?;
    let storage = open_storage(args.db_url.as_deref()).await?;

    let mut live_beacon: Option<HttpBeacon> = None;
    let (backend, beacon): (Arc<dyn AttemptBackend>, Arc<dyn BeaconTransport>) = if args.dry_run {
        (Arc::new(DryRunBackend::default()), Arc::new(DryRunBeacon))
    } else {
        let http = HttpAttemptBackend::new(&config);
        let beacon = http.beacon();
        live_beacon = Some(beacon.clone());
        (Arc::new(http), Arc::new(beacon))
    };

    let default_origin = format!("https://{}", config.scorm_origin);
    let clock = if args.realtime {
        Clock::system()
    } else {
        // Simulated time: `wait` steps advance this clock.
        Clock::fixed(Utc::now())
    };
    let services = PlayerServices {
        config,
        clock,
        backend,
        beacon,
        courses: Arc::clone(&storage.courses),
        observer: Arc::new(TracingObserver),
    };

    let session = PlayerSession::open(services, outline).await?;
    let (session, end) = if args.realtime {
        replay::run_live(session, steps, &default_origin, LIVE_POLL).await?
    } else {
        let mut session = session;
        let end = replay::run_steps(&mut session, steps, &default_origin).await?;
        (session, end)
    };

    if let Some(beacon) = live_beacon {
        beacon.settle(BEACON_GRACE).await;
    }

    let signal = session.signal();
    println!("course:   {}", session.course_id());
    println!("position: {}", session.position());
    println!(
        "lesson:   {}% ({})",
        signal.percentage(),
        signal.status().as_wire()
    );
    match session.lesson_state() {
        LessonState::CourseComplete => println!("state:    course complete"),
        LessonState::Unavailable { reason, .. } => println!("state:    unavailable ({reason})"),
        LessonState::Closed { .. } | LessonState::Ready { .. } => println!("state:    open"),
    }
    match end {
        ReplayEnd::Unloaded {
            beacon_sent: Some(sent),
        } => println!("unload:   beacon {}", if sent { "sent" } else { "skipped" }),
        ReplayEnd::Unloaded { beacon_sent: None } => println!("unload:   handled by event loop"),
        ReplayEnd::Left => {}
    }
    if let Some(record) = storage.courses.get_course(session.course_id()).await? {
        println!(
            "cache:    {}% {} ({}/{} modules)",
            record.progress,
            record.status.as_wire(),
            record.completed_modules,
            record.total_modules
        );
    }
    Ok(())
}

async fn list_courses(args: CoursesArgs) -> Result<(), Box<dyn std::error::Error>> {
    let storage = open_storage(Some(&args.db_url)).await?;
    let courses = storage.courses.list_courses().await?;
    if courses.is_empty() {
        println!("no cached courses in {}", args.db_url);
        return Ok(());
    }
    for course in courses {
        println!(
            "{:<24} {:>3}% {:<12} {}/{} modules  {}",
            course.id.as_str(),
            course.progress,
            course.status.as_wire(),
            course.completed_modules,
            course.total_modules,
            course.title
        );
    }
    Ok(())
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut argv = std::env::args().skip(1);

    let cmd = match argv.next() {
        None => {
            print_usage();
            return Ok(());
        }
        Some(first) if first == "--help" || first == "-h" => {
            print_usage();
            return Ok(());
        }
        Some(first) => Command::from_arg(&first).ok_or_else(|| {
            eprintln!("unknown subcommand: {first}");
            print_usage();
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "unknown subcommand")
        })?,
    };

    let report = |e: ArgsError| {
        eprintln!("{e}");
        print_usage();
        e
    };
    match cmd {
        Command::Replay => replay(ReplayArgs::parse(&mut argv).map_err(report)?).await,
        Command::Courses => list_courses(CoursesArgs::parse(&mut argv).map_err(report)?).await,
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    init_tracing();
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
