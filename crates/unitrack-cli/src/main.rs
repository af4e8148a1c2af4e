use std::fs;
use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use log::LevelFilter;
use tokio::sync::mpsc;
use unitrack::extract::{extract_curriculum_section, extract_grade_report, extract_semester_routine};
use unitrack::{Credentials, PortalConfig, PortalScraper, ProgressEvent};

#[derive(Parser)]
#[command(name = "unitrack")]
#[command(about = "A student portal scraper that reports completed and unlocked courses", long_about = None)]
struct Cli {
    #[arg(
        short = 'l',
        long = "log-level",
        value_enum,
        default_value = "info",
        global = true,
        help = "Set the logging level"
    )]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => LevelFilter::Off,
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, ValueEnum)]
enum PageKind {
    /// A curriculum section page (course table with prerequisites)
    Curriculum,
    /// The grade report by curriculum
    Grades,
    /// A semester registration page
    Routine,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in to the portal and build the full academic report
    Report {
        #[arg(short = 'u', long, env = "UNITRACK_USERNAME", help = "Portal username")]
        username: String,

        #[arg(
            short = 'p',
            long,
            env = "UNITRACK_PASSWORD",
            hide_env_values = true,
            help = "Portal password"
        )]
        password: String,

        #[arg(long, default_value = unitrack::BASE_URL, help = "Portal base URL")]
        base_url: String,

        #[arg(
            short = 'o',
            long = "output",
            value_enum,
            default_value = "text",
            help = "Output format"
        )]
        format: OutputFormat,
    },
    /// Run one page extractor over a saved HTML file
    Parse {
        #[arg(value_enum, help = "Which page the file holds")]
        kind: PageKind,

        #[arg(help = "Path to the saved HTML page")]
        file: PathBuf,

        #[arg(
            long,
            default_value = "",
            help = "Semester label (current semester for grades, routine label otherwise)"
        )]
        semester: String,

        #[arg(
            short = 'o',
            long = "output",
            value_enum,
            default_value = "json",
            help = "Output format"
        )]
        format: OutputFormat,
    },
}

fn serialize_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            log::error!("Error serializing to JSON: {}", e);
            process::exit(1);
        }
    }
}

async fn report(credentials: Credentials, base_url: String, format: OutputFormat) {
    let config = PortalConfig {
        base_url,
        ..Default::default()
    };
    let scraper = PortalScraper::new(&config).unwrap_or_else(|e| {
        log::error!("Error creating scraper: {}", e);
        process::exit(1);
    });

    let (tx, mut rx) = mpsc::unbounded_channel::<ProgressEvent>();
    let scrape = async move {
        let mut tx = tx;
        scraper.run(&credentials, &mut tx).await
    };
    let printer = async move {
        while let Some(event) = rx.recv().await {
            if let ProgressEvent::Running { message } = &event {
                eprintln!("  ▸ {}", message);
            }
        }
    };

    let (result, ()) = tokio::join!(scrape, printer);
    let report = result.unwrap_or_else(|e| {
        log::error!("Error building report: {}", e);
        process::exit(1);
    });

    match format {
        OutputFormat::Json => serialize_json(&report),
        OutputFormat::Text => print!("{}", report),
    }
}

fn parse_page(kind: PageKind, html: &str, semester: &str, format: OutputFormat) {
    match kind {
        PageKind::Curriculum => {
            let section = extract_curriculum_section(html);
            match format {
                OutputFormat::Json => serialize_json(&section.value),
                OutputFormat::Text => {
                    for (code, course) in &section.value {
                        println!("{:<10} {}", code, course);
                    }
                }
            }
            log_skipped(section.skipped.len());
        }
        PageKind::Grades => {
            let grades = extract_grade_report(html, semester);
            match format {
                OutputFormat::Json => serialize_json(&grades.value),
                OutputFormat::Text => {
                    for (title, bucket) in [
                        ("Completed", &grades.value.completed),
                        ("Current semester", &grades.value.current_semester),
                        ("Pre-registered", &grades.value.pre_registered),
                    ] {
                        println!("── {} ({})", title, bucket.len());
                        for (code, entry) in bucket {
                            println!("  {:<10} {}", code, entry);
                        }
                    }
                }
            }
            log_skipped(grades.skipped.len());
        }
        PageKind::Routine => {
            let routine = extract_semester_routine(html, semester).unwrap_or_else(|e| {
                log::error!("Error parsing registration page: {}", e);
                process::exit(1);
            });
            match format {
                OutputFormat::Json => serialize_json(&routine.value),
                OutputFormat::Text => {
                    for (day, slots) in &routine.value {
                        for (time, slot) in slots {
                            println!("{:<9} {:<21} {}", day, time, slot);
                        }
                    }
                }
            }
            log_skipped(routine.skipped.len());
        }
    }
}

fn log_skipped(count: usize) {
    if count > 0 {
        log::warn!("{} row(s) could not be read and were skipped", count);
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(cli.log_level.clone().into())
        .init();

    match cli.command {
        Commands::Report {
            username,
            password,
            base_url,
            format,
        } => {
            log::info!("Building report from {}...", base_url);
            report(Credentials::new(username, password), base_url, format).await;
        }

        Commands::Parse {
            kind,
            file,
            semester,
            format,
        } => {
            let html = fs::read_to_string(&file).unwrap_or_else(|e| {
                log::error!("Error reading {}: {}", file.display(), e);
                process::exit(1);
            });
            parse_page(kind, &html, &semester, format);
        }
    }
}
