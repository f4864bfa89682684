// gridpen CLI - headless session operations
// Drives the session engine against scripted editors; no widget toolkit required.

mod smoke;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use gridpen_config::Settings;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_ERROR: u8 = 1;

#[derive(Parser)]
#[command(name = "gpen")]
#[command(about = "Embedded rich-text session engine (CLI mode, headless)")]
#[command(version, long_version = long_version())]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the session lifecycle scenario against a scripted editor backend
    #[command(after_help = "\
Examples:
  gpen smoke
  gpen smoke --json
  gpen smoke --max-sessions 4 --verbose")]
    Smoke(smoke::SmokeArgs),

    /// Print the effective session settings
    #[command(after_help = "\
Examples:
  gpen settings
  gpen settings --json
  gpen settings --path ./settings.json")]
    Settings {
        /// Emit settings as JSON
        #[arg(long)]
        json: bool,

        /// Read settings from a specific file instead of the config directory
        #[arg(long)]
        path: Option<PathBuf>,
    },
}

fn long_version() -> &'static str {
    if cfg!(debug_assertions) {
        concat!(
            env!("CARGO_PKG_VERSION"),
            " (", env!("GIT_COMMIT_HASH"), ")",
            "\nengine:  gridpen-engine ", env!("CARGO_PKG_VERSION"),
            "\nbuild:   debug",
            "\ntarget:  ", env!("TARGET"),
        )
    } else {
        concat!(
            env!("CARGO_PKG_VERSION"),
            " (", env!("GIT_COMMIT_HASH"), ")",
            "\nengine:  gridpen-engine ", env!("CARGO_PKG_VERSION"),
            "\nbuild:   release",
            "\ntarget:  ", env!("TARGET"),
        )
    }
}

fn main() -> ExitCode {
    env_logger::init();
    log::debug!("gpen {} ({})", env!("CARGO_PKG_VERSION"), env!("GIT_COMMIT_HASH"));

    let cli = Cli::parse();
    match cli.command {
        Commands::Smoke(args) => smoke::run(&args),
        Commands::Settings { json, path } => run_settings(json, path.as_deref()),
    }
}

fn run_settings(json: bool, path: Option<&Path>) -> ExitCode {
    let settings = match path {
        Some(p) => Settings::load_from(p),
        None => Settings::load(),
    };

    if json {
        match serde_json::to_string_pretty(&settings) {
            Ok(text) => println!("{}", text),
            Err(e) => {
                eprintln!("error: failed to serialize settings: {}", e);
                return ExitCode::from(EXIT_ERROR);
            }
        }
    } else {
        let source = match path {
            Some(p) => p.display().to_string(),
            None => Settings::config_path_display(),
        };
        let s = settings.session;
        println!("Settings file: {}", source);
        println!();
        println!("session.maxActiveSessions     {}", s.max_active_sessions);
        println!("session.maxMemoryUsageMB      {}", s.max_memory_usage_mb);
        println!("session.sessionTTLms          {}", s.session_ttl_ms);
        println!("session.cleanupIntervalMs     {}", s.cleanup_interval_ms);
        println!("session.enableMetrics         {}", s.enable_metrics);
        println!("session.enableMemoryTracking  {}", s.enable_memory_tracking);
    }

    ExitCode::from(EXIT_SUCCESS)
}
