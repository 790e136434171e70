use std::path::PathBuf;
use std::process::ExitCode;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use shift_rotation_lib::application::commands;
use shift_rotation_lib::config::AppConfig;
use shift_rotation_lib::error::AppError;
use shift_rotation_lib::AppServices;

#[derive(Parser)]
#[command(name = "rotation_tools")]
#[command(version = "0.1.0")]
#[command(about = "Inspect the shift rotation database and drive the sync queue", long_about = None)]
struct Cli {
    /// Configuration file (defaults are used when it does not exist)
    #[arg(short, long, default_value = "rotation.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Shifts of one person over a date range
    Shift {
        code: String,

        #[arg(long)]
        from: NaiveDate,

        /// Defaults to `from`
        #[arg(long)]
        to: Option<NaiveDate>,
    },
    /// Monthly schedule of every active person
    Month {
        year: i32,
        /// 1-12
        month: u32,
    },
    /// Statistics for one month, for everyone or one person
    Stats {
        /// 1-12
        month: u32,
        year: i32,

        #[arg(long)]
        person: Option<String>,
    },
    /// Put a person on leave over a date range (Sundays stay rest)
    Leave {
        code: String,

        #[arg(long)]
        from: NaiveDate,

        #[arg(long)]
        to: NaiveDate,

        /// Remove the leave instead
        #[arg(long)]
        clear: bool,
    },
    /// Drain pending mutations to the remote authority
    Sync {
        /// Only list what is pending
        #[arg(long)]
        dry_run: bool,
    },
    /// Write a configuration file with the default values
    InitConfig {
        #[arg(short, long)]
        force: bool,
    },
}

async fn run(cli: Cli) -> Result<(), AppError> {
    if let Commands::InitConfig { force } = cli.command {
        if cli.config.exists() && !force {
            eprintln!("{} already exists (use --force to overwrite)", cli.config.display());
            return Ok(());
        }
        AppConfig::default().save_to_file(&cli.config)?;
        println!("wrote {}", cli.config.display());
        return Ok(());
    }

    let config = AppConfig::load_or_default(&cli.config)?;
    let services = AppServices::open(&config).await?;

    match cli.command {
        Commands::Shift { code, from, to } => {
            let shifts = commands::get_shifts(&services, &code, from, to.unwrap_or(from)).await?;
            for s in shifts {
                println!("{}  {}  {}", s.date, s.shift_code, s.origin.as_str());
            }
        }
        Commands::Month { year, month } => {
            let schedule = commands::monthly_schedule(&services, year, month).await?;
            print_json(&schedule);
        }
        Commands::Stats { month, year, person } => match person {
            Some(code) => print_json(&commands::person_statistics(&services, &code, month, year).await?),
            None => print_json(&commands::statistics(&services, month, year).await?),
        },
        Commands::Leave { code, from, to, clear } => {
            if clear {
                let removed = commands::clear_leave_period(&services, &code, from, to).await?;
                println!("{removed} leave rows removed");
            } else {
                for s in commands::record_leave_period(&services, &code, from, to).await? {
                    println!("{}  {}", s.date, s.shift_code);
                }
            }
        }
        Commands::Sync { dry_run } => {
            if dry_run {
                for item in commands::pending_mutations(&services).await? {
                    println!(
                        "#{} {} {} attempts={} {}",
                        item.sequence,
                        item.entity_type().as_str(),
                        item.action().as_str(),
                        item.attempts,
                        item.last_error.as_deref().unwrap_or("")
                    );
                }
            } else {
                // a one-shot run assumes the network is there
                commands::set_online(&services, true);
                let report = commands::manual_sync(&services).await?;
                print_json(&report);
            }
        }
        Commands::InitConfig { .. } => {}
    }
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{text}"),
        Err(e) => eprintln!("failed to encode output: {e}"),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
