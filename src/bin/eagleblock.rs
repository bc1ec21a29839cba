// EagleBlock CLI - Command-line interface for the blocker
// Runs the protection daemon and exposes the accountability-delayed operations

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use eagleblock::config_file::Config;
use eagleblock::overlay::OverlayPresenter;
use eagleblock::process::{ProcessQuery, SystemProcesses};
use eagleblock::store::Category;
use eagleblock::timers::{TimerDriver, TimerEvent};
use eagleblock::ui::{LogPresenter, NotificationPresenter};
use eagleblock::{config, CoreOptions, CorePorts, DelayChange, DisableRequest, EagleBlockCore};
use log::{error, info, warn};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// How often the daemon re-reads changes made by one-shot commands
const SYNC_INTERVAL: Duration = Duration::from_secs(5);

/// Block distracting websites and apps behind an accountability delay
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Block distracting websites and apps behind an accountability delay",
    long_about = "Block distracting websites and apps behind an accountability delay.

Turning a protection on is immediate. Turning it off, shortening the delay, or
removing something from a block list only happens after the current delay has
passed, and pending changes survive restarts.

When `eagleblock run` flags a blocked app, `eagleblock override <process>`
keeps it open once every 8 hours; otherwise it is closed after 20 seconds.

CONFIGURATION:
  Optional settings live in config.toml in the platform config directory
  (e.g. %APPDATA%\\eagleblock\\config.toml). Environment overrides:
    EAGLEBLOCK_DATA_DIR            data directory
    EAGLEBLOCK_APP_POLL_SECS       blocked-app poll interval (2-60)
    EAGLEBLOCK_SETTINGS_POLL_SECS  settings-protection poll interval (2-120)"
)]
struct Args {
    /// Data directory (overrides config file and environment)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the protection daemon until Ctrl+C
    Run {
        /// Log overlays instead of showing desktop notifications
        #[arg(long)]
        no_notifications: bool,
    },
    /// Show the current value and pending change of a setting
    Status { setting_id: String },
    /// Turn a protection on (immediate)
    Enable { key: String },
    /// Turn a protection off after the accountability delay
    Disable { key: String },
    /// Change the accountability delay in milliseconds
    Delay { milliseconds: u64 },
    /// Cancel a pending change
    Cancel { setting_id: String },
    /// Keep a flagged app open using the manual override (once every 8 hours)
    Override { process_name: String },
    /// Add an application to the block list
    BlockApp {
        display_name: String,
        process_name: String,
    },
    /// Add a website to the block list (writes the hosts file)
    BlockSite { domain: String },
    /// Start the deletion delay for a blocked item (category: app or site)
    PrimeDelete { category: String, item: String },
    /// Remove an application whose deletion delay has passed
    UnblockApp { process_name: String },
    /// Remove a website whose deletion delay has passed
    UnblockSite { domain: String },
    /// List running processes with their window titles
    Processes,
}

fn load_config(args: &Args) -> Result<Config> {
    let cfg = Config::load().context("Failed to load configuration")?;
    let mut cfg = config::apply_env_overrides(cfg);

    // Precedence: CLI arg > env var > config file
    if let Some(ref dir) = args.data_dir {
        info!("Data directory set via --data-dir: {}", dir.display());
        cfg.data_dir = dir.clone();
    }
    Ok(cfg)
}

fn parse_category(category: &str) -> Result<Category> {
    match category.to_lowercase().as_str() {
        "app" => Ok(Category::App),
        "site" => Ok(Category::Site),
        other => anyhow::bail!("Unknown category '{}' (expected app or site)", other),
    }
}

fn format_duration(ms: u64) -> String {
    let secs = ms / 1000;
    format!("{} min {} sec", secs / 60, secs % 60)
}

fn run_daemon(core: &EagleBlockCore, events: mpsc::Receiver<TimerEvent>) -> Result<()> {
    let running = Arc::new(AtomicBool::new(true));
    ctrlc::set_handler({
        let running = running.clone();
        move || {
            info!("Ctrl+C received, shutting down");
            running.store(false, Ordering::SeqCst);
        }
    })
    .context("Failed to set Ctrl+C handler")?;

    core.start();
    info!("EagleBlock is running - press Ctrl+C to quit");

    let mut last_sync = Instant::now();

    // Timer events arrive here; between them the current overlay is enforced
    while running.load(Ordering::SeqCst) {
        match events.recv_timeout(Duration::from_secs(1)) {
            Ok(TimerEvent::Resolved(setting_id)) => info!("Pending change for {} applied", setting_id),
            Ok(TimerEvent::BlockTableChanged) => info!("Block lists changed"),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        if last_sync.elapsed() >= SYNC_INTERVAL {
            core.sync();
            last_sync = Instant::now();
        }

        if let Some(outcome) = core.enforce_current_overlay() {
            if !outcome.is_closed() {
                warn!("Blocked app could not be closed; the next check flags it again");
            }
        }
    }

    core.shutdown();
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logger
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let cfg = match load_config(&args) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("{:#}", e);
            error!("Fix or remove {} and try again.", Config::config_path().display());
            std::process::exit(1);
        }
    };

    if let Command::Processes = args.command {
        let processes = SystemProcesses::new().list_processes()?;
        for p in processes.iter().filter(|p| !p.window_title.is_empty()) {
            println!("{:>8}  {:<32} {}", p.pid, p.name, p.window_title);
        }
        println!("{} processes", processes.len());
        return Ok(());
    }

    let notifications = match args.command {
        Command::Run { no_notifications } => cfg.notifications && !no_notifications,
        _ => false,
    };
    let presenter: Arc<dyn OverlayPresenter> = if notifications {
        Arc::new(NotificationPresenter)
    } else {
        Arc::new(LogPresenter)
    };

    // One-shot commands only record their change; the daemon does the ticking
    let mut options = CoreOptions::from_config(&cfg);
    if !matches!(args.command, Command::Run { .. }) {
        options.timer_driver = TimerDriver::External;
        options.surveillance.driver = TimerDriver::External;
    }

    let (tx, rx) = mpsc::channel();
    let core = EagleBlockCore::new(options, CorePorts::system(presenter), tx)
        .context("Failed to initialize EagleBlock")?;

    if !matches!(args.command, Command::Run { .. }) {
        // See pending changes recorded by the daemon or earlier commands
        core.timers().sync_with_store();
    }

    match args.command {
        Command::Run { .. } => run_daemon(&core, rx)?,
        Command::Status { setting_id } => {
            let status = core.get_timer_status(&setting_id);
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Command::Enable { key } => {
            core.enable_protection(&key)?;
            println!("{} enabled", key);
        }
        Command::Disable { key } => match core.request_disable(&key)? {
            DisableRequest::AlreadyOff => println!("{} is already off", key),
            DisableRequest::AlreadyPending(ms) => {
                println!("{} switches off in {}", key, format_duration(ms))
            }
            DisableRequest::Started(ms) => println!(
                "{} switches off in {} (keep `eagleblock run` going)",
                key,
                format_duration(ms)
            ),
        },
        Command::Delay { milliseconds } => match core.start_delay_timeout_change(milliseconds)? {
            DelayChange::Applied(ms) => println!("Delay is now {}", format_duration(ms)),
            DelayChange::Pending { wait_ms } => println!(
                "Delay changes to {} in {}",
                format_duration(milliseconds),
                format_duration(wait_ms)
            ),
        },
        Command::Cancel { setting_id } => {
            if core.cancel_delay_change(&setting_id)? {
                println!("Pending change for {} cancelled", setting_id);
            } else {
                println!("No pending change for {}", setting_id);
            }
        }
        Command::Override { process_name } => {
            if core.request_manual_close(&process_name)? {
                println!(
                    "Override for {} sent; the running daemon closes its overlay",
                    process_name
                );
            } else {
                println!("The manual override was used less than 8 hours ago");
            }
        }
        Command::BlockApp {
            display_name,
            process_name,
        } => {
            if core.block_app(&display_name, &process_name)? {
                println!("{} blocked", display_name);
            } else {
                println!("{} is already blocked", process_name);
            }
        }
        Command::BlockSite { domain } => {
            core.block_website(&domain)?;
            println!("{} blocked", domain);
        }
        Command::PrimeDelete { category, item } => {
            let setting_id = core.prime_block_for_deletion(parse_category(&category)?, &item)?;
            let delay = core.store().delay_timeout_ms();
            println!(
                "{} can be removed in {} ({})",
                item,
                format_duration(delay),
                setting_id
            );
        }
        Command::UnblockApp { process_name } => {
            if core.unblock_app(&process_name)? {
                println!("{} unblocked", process_name);
            } else {
                println!("{} cannot be removed yet; run prime-delete first", process_name);
            }
        }
        Command::UnblockSite { domain } => {
            if core.unblock_website(&domain)? {
                println!("{} unblocked", domain);
            } else {
                println!("{} cannot be removed yet; run prime-delete first", domain);
            }
        }
        Command::Processes => unreachable!("handled above"),
    }

    Ok(())
}
