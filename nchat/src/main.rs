//! `nchat`: terminal chat client.
//!
//! Loads every profile in the application directory, logs in, and runs a
//! line-oriented console until `quit`, end of input, or Ctrl-C.
//!
//! ```bash
//! # First run: create a dummy profile
//! cargo run --bin nchat -- --setup --protocol Dummy
//!
//! # Use a separate application directory
//! cargo run --bin nchat -- -d /tmp/nchat-demo
//!
//! # Export the message cache as JSON and exit
//! cargo run --bin nchat -- --export ./nchat-export
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::mpsc;
use tracing_appender::non_blocking::WorkerGuard;

use nchat::app::App;
use nchat::cache::{CacheError, MessageCache};
use nchat::config::{self, CliArgs, ClientConfig};
use nchat::console::Command;
use nchat::dispatch::{self, Dispatcher};
use nchat::lock::{DirLock, LockError};
use nchat::profile::{AppDir, ProfileError};
use nchat::protocol::registry::ProtocolRegistry;
use nchat::protocol::{Protocol, ProtocolError, split_profile_id};
use nchat_proto::service::ServiceMessage;

/// Fatal startup and shutdown errors.
#[derive(Debug, thiserror::Error)]
enum AppError {
    #[error(transparent)]
    Lock(#[from] LockError),

    #[error(transparent)]
    Profile(#[from] ProfileError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("console input unavailable: {0}")]
    Io(#[from] std::io::Error),

    #[error("unknown protocol {0:?} (available: {1})")]
    UnknownProtocol(String, String),

    #[error("setup aborted")]
    SetupAborted,

    #[error("no profiles loaded; run with --setup to create one")]
    NoProfiles,
}

type InputLines = mpsc::UnboundedReceiver<String>;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = CliArgs::parse();

    // CLI args > config file > defaults.
    let config = match ClientConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Warning: failed to load config file: {e}");
            match config::resolve_confdir(&cli) {
                Ok(dir) => ClientConfig::with_confdir(dir),
                Err(e) => {
                    eprintln!("nchat: {e}");
                    return ExitCode::FAILURE;
                }
            }
        }
    };

    let app_dir = AppDir::new(&config.confdir);
    if let Err(e) = app_dir.ensure() {
        eprintln!("nchat: {e}");
        return ExitCode::FAILURE;
    }

    // Logs go to a file; stdout belongs to the console.
    let log_path = cli.log_file.clone().unwrap_or_else(|| app_dir.log_path());
    let _log_guard = init_logging(&cli.log_level, &log_path);

    tracing::info!(confdir = %app_dir.root().display(), "nchat starting");

    let mut dir_lock = match DirLock::try_acquire(app_dir.root()) {
        Ok(lock) => lock,
        Err(e) => {
            tracing::error!(error = %e, "application directory in use");
            eprintln!("nchat: {e}");
            return ExitCode::FAILURE;
        }
    };

    let result = run(&cli, &config, &app_dir).await;
    dir_lock.release();

    match result {
        Ok(()) => {
            tracing::info!("nchat exiting");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "nchat failed");
            eprintln!("nchat: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initialize file-based logging.
///
/// Returns a [`WorkerGuard`] that must be held until shutdown to ensure all
/// buffered log entries are flushed.
fn init_logging(level: &str, log_path: &Path) -> Option<WorkerGuard> {
    let log_dir = log_path.parent()?;
    let file_name = log_path.file_name()?.to_str()?;

    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .init();

    Some(guard)
}

/// Everything after the application directory is locked.
async fn run(cli: &CliArgs, config: &ClientConfig, app_dir: &AppDir) -> Result<(), AppError> {
    app_dir.check_version()?;

    if let Some(profile_id) = &cli.remove {
        app_dir.remove_profile(profile_id)?;
        println!("removed profile {profile_id}");
        return Ok(());
    }

    if let Some(out_dir) = &cli.export {
        let cache = MessageCache::open(&app_dir.cache_dir())?;
        let summary = cache.export(out_dir)?;
        println!(
            "exported {} profiles, {} chats, {} messages to {}",
            summary.profiles,
            summary.chats,
            summary.messages,
            out_dir.display()
        );
        return Ok(());
    }

    let registry = ProtocolRegistry::with_builtin();
    let mut input = spawn_input_reader()?;
    let mut protocols: BTreeMap<String, Arc<dyn Protocol>> = BTreeMap::new();

    if cli.setup {
        let protocol = setup_profile(cli, config, app_dir, &registry, &mut input).await?;
        protocols.insert(protocol.profile_id(), protocol);
    }

    for profile_id in app_dir.list_profiles()? {
        if protocols.contains_key(&profile_id) {
            continue;
        }
        if let Some(protocol) = load_profile(config, app_dir, &registry, &profile_id) {
            protocols.insert(profile_id, protocol);
        }
    }
    if protocols.is_empty() {
        return Err(AppError::NoProfiles);
    }

    let cache = if config.cache_enabled {
        Some(Arc::new(MessageCache::open(&app_dir.cache_dir())?))
    } else {
        None
    };

    let (tx, mut rx) = mpsc::unbounded_channel();
    let ui_handler = dispatch::message_handler(tx);
    let handler = match &cache {
        Some(cache) => cache.subscribe(ui_handler),
        None => ui_handler,
    };

    let mut dispatcher = Dispatcher::new(App::new(&config.timestamp_format), cache.clone())
        .with_history_limit(config.history_limit);
    for protocol in protocols.into_values() {
        protocol.set_message_handler(Arc::clone(&handler));
        dispatcher.add_protocol(protocol);
    }

    for protocol in dispatcher.protocols() {
        let profile_id = protocol.profile_id();
        match protocol.login() {
            Ok(()) => tracing::info!(profile_id = %profile_id, "login started"),
            Err(e) => {
                tracing::warn!(profile_id = %profile_id, error = %e, "login failed");
                eprintln!("Warning: login failed for {profile_id}: {e}");
            }
        }
    }

    let flush_task = cache
        .as_ref()
        .map(|cache| cache.spawn_flush_task(config.cache_flush_interval));

    println!("nchat ready, type `help` for commands");
    event_loop(&mut dispatcher, &mut rx, &mut input).await;
    if let Some(task) = flush_task {
        task.abort();
    }
    shutdown(&mut dispatcher, &mut rx, cache.as_deref());
    Ok(())
}

/// Create a new profile with the backend named by `--protocol`, or ask.
async fn setup_profile(
    cli: &CliArgs,
    config: &ClientConfig,
    app_dir: &AppDir,
    registry: &ProtocolRegistry,
    input: &mut InputLines,
) -> Result<Arc<dyn Protocol>, AppError> {
    let available = registry.names().join(", ");
    let name = if let Some(name) = &cli.protocol {
        name.clone()
    } else {
        println!("protocols: {available}");
        println!("select protocol:");
        let line = input.recv().await.ok_or(AppError::SetupAborted)?;
        line.trim().to_string()
    };

    let protocol = registry
        .create(&name, config)
        .ok_or_else(|| AppError::UnknownProtocol(name.clone(), available))?;
    let profile_id = protocol.setup_profile(&app_dir.profiles_dir())?;
    tracing::info!(profile_id = %profile_id, "profile set up");
    println!("created profile {profile_id}");
    Ok(protocol)
}

/// Instantiate and load one on-disk profile. Failures are logged and skipped.
fn load_profile(
    config: &ClientConfig,
    app_dir: &AppDir,
    registry: &ProtocolRegistry,
    profile_id: &str,
) -> Option<Arc<dyn Protocol>> {
    let name = split_profile_id(profile_id)?.0;
    let Some(protocol) = registry.create(name, config) else {
        tracing::warn!(profile_id, protocol = name, "backend not available, skipping profile");
        eprintln!("Warning: no backend for {profile_id}, skipped");
        return None;
    };
    if let Err(e) = protocol.load_profile(&app_dir.profiles_dir(), profile_id) {
        tracing::warn!(profile_id, error = %e, "failed to load profile");
        eprintln!("Warning: failed to load {profile_id}: {e}");
        return None;
    }
    tracing::info!(profile_id, "profile loaded");
    Some(protocol)
}

/// Read stdin lines on a dedicated thread.
///
/// A blocking read on the runtime's pool would hold up runtime shutdown
/// until the next line arrives. The channel closes at end of input.
fn spawn_input_reader() -> std::io::Result<InputLines> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::Builder::new()
        .name("console-input".into())
        .spawn(move || {
            for line in std::io::stdin().lines() {
                match line {
                    Ok(line) => {
                        if tx.send(line).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "console input failed");
                        break;
                    }
                }
            }
        })?;
    Ok(rx)
}

/// Route notifications and console lines until the user quits.
async fn event_loop(
    dispatcher: &mut Dispatcher,
    rx: &mut mpsc::UnboundedReceiver<ServiceMessage>,
    input: &mut InputLines,
) {
    loop {
        tokio::select! {
            Some(message) = rx.recv() => {
                dispatcher.handle(message);
                dispatcher.drain(rx);
            }
            line = input.recv() => {
                let Some(line) = line else {
                    tracing::info!("end of input");
                    return;
                };
                match Command::parse(&line) {
                    Ok(Some(command)) => {
                        if dispatcher.execute(command).is_break() {
                            return;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => dispatcher.app_mut().push_system_message(e.to_string()),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted");
                return;
            }
        }
        print_system_messages(dispatcher);
    }
}

fn print_system_messages(dispatcher: &mut Dispatcher) {
    for line in dispatcher.app_mut().drain_system_messages() {
        println!("{line}");
    }
}

/// Log out and close every profile, then persist the cache.
fn shutdown(
    dispatcher: &mut Dispatcher,
    rx: &mut mpsc::UnboundedReceiver<ServiceMessage>,
    cache: Option<&MessageCache>,
) {
    for protocol in dispatcher.protocols() {
        if let Err(e) = protocol.logout() {
            tracing::warn!(profile_id = %protocol.profile_id(), error = %e, "logout failed");
        }
    }
    // Workers are stopped; apply whatever they answered while draining.
    dispatcher.drain(rx);

    for protocol in dispatcher.protocols() {
        let profile_id = protocol.profile_id();
        if let Err(e) = protocol.close_profile() {
            tracing::warn!(profile_id = %profile_id, error = %e, "close failed");
        }
    }

    if let Some(cache) = cache {
        match cache.flush() {
            Ok(written) => tracing::info!(profiles = written, "message cache flushed"),
            Err(e) => {
                tracing::error!(error = %e, "failed to flush message cache");
                eprintln!("Warning: failed to flush message cache: {e}");
            }
        }
    }
    print_system_messages(dispatcher);
}
