//! # Wiimote Pad
//!
//! Use Nintendo Wii Remotes as ordinary Linux gamepads.
//!
//! Each remote gets its own virtual gamepad, named
//! "Nintendo Wii Remote in gamepad mode", that any joystick-aware program
//! can read.

use anyhow::{Context, Result};
use std::process::ExitCode;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use wiimote_pad::bridge::{self, DeviceSpec, SystemBinder};
use wiimote_pad::cli::Invocation;
use wiimote_pad::config::Config;
use wiimote_pad::controller::discovery;
use wiimote_pad::error::BridgeError;

/// Log file name inside `logging.log_dir`.
const LOG_FILE_NAME: &str = "wiimote-pad.log";

/// Main entry point for Wiimote Pad
///
/// # Control Flow
///
/// 1. **Initialization**
///    - Parse the command line and load the configuration
///    - Set up logging with tracing subscriber
///    - Install SIGINT/SIGTERM handling
///
/// 2. **Association**
///    - Use the named device nodes, or discover `/dev/input/js*`
///    - Pair each Wii Remote with a new virtual gamepad
///
/// 3. **Main Loop**
///    - Wait on every remote at once, translate whatever arrives
///
/// 4. **Graceful Shutdown**
///    - Destroy every virtual gamepad exactly once
///    - Log loop statistics
///
/// # Exit Status
///
/// 0 on a clean shutdown, otherwise the errno of the failure
/// (`ENODEV` when no Wii Remote could be used).
///
/// # Examples
///
/// ```bash
/// wiimote-pad --dpad port /dev/input/js0 --dpad land /dev/input/js1
/// ```
///
/// Expected output:
/// ```text
/// INFO wiimote_pad: Wiimote Pad v0.1.0 starting...
/// INFO wiimote_pad::bridge::lifecycle: using device 10 from root
///     /sys/devices/.../0005:057E:0306.000A for /dev/input/js0 (portrait d-pad)
/// INFO wiimote_pad::bridge::multiplexer: Serving 2 device(s)
/// ```
#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let invocation = Invocation::parse();

    let config = match load_config(&invocation) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("wiimote-pad: {:#}", e);
            return exit_code(&e);
        }
    };

    let _guard = match init_logging(&config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("wiimote-pad: {:#}", e);
            return exit_code(&e);
        }
    };

    info!("Wiimote Pad v{} starting...", env!("CARGO_PKG_VERSION"));

    match serve(&invocation, &config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            exit_code(&e)
        }
    }
}

fn load_config(invocation: &Invocation) -> Result<Config> {
    match &invocation.args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display())),
        None => Ok(Config::default()),
    }
}

/// Console logging plus, when configured, a plain-text log file.
fn init_logging(config: &Config) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .context("Invalid log level")?;

    let (file_layer, guard) = match config.log_dir() {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::never(dir, LOG_FILE_NAME);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();

    Ok(guard)
}

async fn serve(invocation: &Invocation, config: &Config) -> Result<()> {
    let selection = invocation.selection(config.gamepad.orientation);
    let specs = if selection.devices.is_empty() {
        let settings = &config.discovery;
        let nodes = discovery::candidates(&settings.input_dir, &settings.node_prefix)?;
        nodes
            .into_iter()
            .map(|path| DeviceSpec::new(path, selection.orientation))
            .collect()
    } else {
        selection.devices
    };

    let binder = SystemBinder {
        watch: config.controller.watch,
    };
    let mut table = bridge::build_table(&binder, &specs, config)?;

    let cancel = CancellationToken::new();
    spawn_signal_handler(cancel.clone());
    info!("Press Ctrl+C to exit");

    let outcome = bridge::run(&mut table, &cancel, config.policy.on_write_failure).await;
    let released = table.teardown();

    let stats = outcome?;
    info!(
        "Released {} device(s) after {} cycles, {} events translated, {} discarded",
        released, stats.cycles, stats.events, stats.discarded
    );
    Ok(())
}

/// Cancels `token` on SIGINT or SIGTERM.
fn spawn_signal_handler(token: CancellationToken) {
    tokio::spawn(async move {
        let mut terminate = match signal(SignalKind::terminate()) {
            Ok(stream) => Some(stream),
            Err(e) => {
                warn!("Cannot listen for SIGTERM: {}", e);
                None
            }
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("Received Ctrl+C, shutting down..."),
            Some(_) = async {
                match terminate.as_mut() {
                    Some(stream) => stream.recv().await,
                    None => std::future::pending().await,
                }
            } => info!("Received SIGTERM, shutting down..."),
        }
        token.cancel();
    });
}

fn exit_code(error: &anyhow::Error) -> ExitCode {
    ExitCode::from(exit_status(error))
}

/// Errno carried by the error chain, `EIO` when there is none.
fn exit_status(error: &anyhow::Error) -> u8 {
    let errno = error
        .downcast_ref::<BridgeError>()
        .map(BridgeError::errno)
        .unwrap_or(libc::EIO);
    errno.clamp(1, 255) as u8
}
