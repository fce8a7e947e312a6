//! rlinit - init daemon
//!
//! Loads the object table, boots the default runlevel and then serves
//! signals until asked to shut down.
//!
//! The supervisor core is synchronous and runs on one blocking thread. The
//! tokio side only turns signals into requests for it, except for SIGINT,
//! which aborts the core's in-flight wait through its task handle.

use std::path::PathBuf;
use std::sync::mpsc;

use clap::Parser;
use log::info;

use rlinit::manager::{ManagerError, TaskHandle};
use rlinit::objects::load_registry;
use rlinit::pid1::{self, InitSignal, ShutdownType, SignalHandler};
use rlinit::settings::{Settings, DEFAULT_CONFIG_DIR};
use rlinit::{ConsoleReporter, Manager};

#[derive(Parser)]
#[command(name = "rlinit")]
#[command(about = "Priority and runlevel ordered init daemon")]
struct Args {
    /// Directory holding rlinit.conf and objects/
    #[arg(long, env = "RLINIT_CONFIG_DIR", default_value = DEFAULT_CONFIG_DIR)]
    config_dir: PathBuf,

    /// Runlevel to boot instead of the configured default
    #[arg(long, short = 'r')]
    runlevel: Option<String>,

    /// Load objects but do not run the start pass
    #[arg(long)]
    no_boot: bool,

    /// Debug logging
    #[arg(long, short = 'v')]
    verbose: bool,
}

/// Work for the supervisor core
#[derive(Debug)]
enum Request {
    Reap,
    Shutdown(ShutdownType),
    Dump,
    Rescan,
    Switch(String),
}

fn init_logging(is_pid1: bool, verbose: bool) -> Result<(), log::SetLoggerError> {
    let level = if verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    let mut dispatch = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{} rlinit[{}] {}",
                chrono::Local::now().format("%H:%M:%S"),
                record.level(),
                message
            ))
        })
        .level(level)
        .chain(std::io::stderr());

    // Kernel log survives better than anything else during early boot
    if is_pid1 {
        if let Ok(kmsg) = std::fs::OpenOptions::new().write(true).open("/dev/kmsg") {
            dispatch = dispatch.chain(
                fern::Dispatch::new()
                    .level(log::LevelFilter::Warn)
                    .chain(kmsg),
            );
        }
    }

    dispatch.apply()
}

/// Log a failed request and carry on, unless the supervisor cannot continue
fn survive<T>(result: Result<T, ManagerError>) -> Result<Option<T>, ManagerError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_fatal() => Err(e),
        Err(e) => {
            log::warn!("{}", e);
            Ok(None)
        }
    }
}

/// Supervisor loop. Returns the requested shutdown once the stop pass ran.
fn run_core(
    mut manager: Manager,
    requests: mpsc::Receiver<Request>,
    boot: bool,
) -> Result<Option<ShutdownType>, ManagerError> {
    if boot {
        let summary = manager.run_all(true)?;
        info!(
            "Runlevel {} reached: {} started, {} warnings, {} failed",
            manager.runlevel(),
            summary.succeeded,
            summary.warned,
            summary.failed
        );
    }

    while let Ok(request) = requests.recv() {
        log::debug!("Handling {:?}", request);
        match request {
            Request::Reap => {
                let pids: Vec<u32> = pid1::reap_zombies().iter().map(|r| r.pid).collect();
                if !pids.is_empty() {
                    survive(manager.handle_exits(&pids))?;
                }
            }
            Request::Shutdown(kind) => {
                info!("Stopping all objects for {}", kind.as_str());
                if let Err(e) = manager.run_all(false) {
                    log::error!("Stop pass failed: {}", e);
                }
                return Ok(Some(kind));
            }
            Request::Dump => {
                for line in manager.status_lines() {
                    info!("{}", line);
                }
            }
            Request::Rescan => {
                survive(manager.run_all(true))?;
            }
            Request::Switch(runlevel) => {
                if let Some(summary) = survive(manager.switch_runlevel(&runlevel))? {
                    info!("Now in runlevel {} ({:?})", runlevel, summary.outcome);
                }
            }
        }
    }

    Ok(None)
}

/// SIGINT: abort what the core is waiting on, or reboot when it is idle
fn interrupt(task: &TaskHandle, requests: &mpsc::Sender<Request>) {
    if task.interrupt() {
        info!("Aborted in-flight operation");
    } else {
        info!("Received SIGINT, initiating reboot");
        let _ = requests.send(Request::Shutdown(ShutdownType::Reboot));
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let is_pid1 = pid1::is_pid1();

    init_logging(is_pid1, args.verbose)?;

    let mut settings = match Settings::load(&args.config_dir) {
        Ok(s) => s,
        Err(e) => {
            log::error!("Failed to load settings: {}", e);
            if is_pid1 {
                pid1::emergency_shell();
            }
            return Err(e.into());
        }
    };
    if let Some(runlevel) = args.runlevel {
        settings.default_runlevel = runlevel;
    }

    if let Err(e) = pid1::init(&settings) {
        log::error!("Init setup failed: {}", e);
    }

    let registry = match load_registry(&settings.objects_dir) {
        Ok(r) => r,
        Err(e) => {
            log::error!("Failed to load objects: {}", e);
            if is_pid1 {
                pid1::emergency_shell();
            }
            return Err(e.into());
        }
    };

    let manager = Manager::new(registry, settings.exec_context(), Box::new(ConsoleReporter));
    let task = manager.task_handle();

    // Signals first, so nothing sent during boot is lost
    let mut signals = SignalHandler::new()?.spawn_forwarder();

    let (tx, rx) = mpsc::channel();
    let boot = !args.no_boot;
    if boot {
        if let Some(banner) = settings.banner() {
            println!("{}\n", banner);
        }
    }
    let core = tokio::task::spawn_blocking(move || run_core(manager, rx, boot));

    let default_runlevel = settings.default_runlevel.clone();
    let rescue_runlevel = settings.rescue_runlevel.clone();
    tokio::spawn(async move {
        while let Some(sig) = signals.recv().await {
            let request = match sig {
                InitSignal::Child => Request::Reap,
                InitSignal::Int => {
                    interrupt(&task, &tx);
                    continue;
                }
                InitSignal::Term => {
                    info!("Received SIGTERM, initiating poweroff");
                    Request::Shutdown(ShutdownType::Poweroff)
                }
                InitSignal::Usr2 => {
                    info!("Received SIGUSR2, initiating reboot");
                    Request::Shutdown(ShutdownType::Reboot)
                }
                InitSignal::Usr1 => Request::Dump,
                InitSignal::Hup => Request::Rescan,
                InitSignal::DefaultRunlevel => Request::Switch(default_runlevel.clone()),
                InitSignal::RescueRunlevel => Request::Switch(rescue_runlevel.clone()),
            };
            if tx.send(request).is_err() {
                break;
            }
        }
    });

    match core.await? {
        Ok(Some(kind)) if is_pid1 => pid1::shutdown(kind).await,
        Ok(Some(kind)) => {
            info!("All objects stopped ({} requested), exiting", kind.as_str());
            Ok(())
        }
        Ok(None) => Ok(()),
        Err(e) => {
            log::error!("Supervisor failed: {}", e);
            if is_pid1 {
                pid1::emergency_shell();
            }
            Err(e.into())
        }
    }
}
