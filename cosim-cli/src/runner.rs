//! Run a simulated device from the command line arguments

use std::path::PathBuf;
use std::time::Duration;

use cosim_node::common::device_config::{DeviceConfig, LoadError};
use cosim_node::{Bridge, ErrorPolicy, RunExit, ScriptConfig, ScriptEngine, SimStack};
use snafu::{ResultExt as _, Snafu};

use crate::command::Args;

/// Error returned when running a simulated device fails
#[derive(Debug, Snafu)]
pub enum RunError {
    /// The device config could not be loaded
    #[snafu(display("Failed to load device config {}: {source}", path.display()))]
    Config {
        /// Path of the config file
        path: PathBuf,
        /// The underlying error
        source: LoadError,
    },
    /// The script failed to load, or raised an error while the device was running
    #[snafu(display("{source}"))]
    Device {
        /// The underlying error
        source: cosim_node::Error,
    },
    /// The tokio runtime could not be created
    #[snafu(display("Failed to start runtime: {source}"))]
    Runtime {
        /// The underlying IO error
        source: std::io::Error,
    },
}

/// Wait for Ctrl-C, or SIGTERM on unix
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
                return;
            }
            Err(e) => log::warn!("Unable to listen for SIGTERM: {e}"),
        }
    }
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Unable to listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
}

/// Load the device and script named in `args`, then run until interrupted
///
/// On shutdown, the script stops receiving events, and any outstanding timer wait is drained so
/// that `OnTick` runs one last time.
pub fn run(args: &Args) -> Result<(), RunError> {
    let config = DeviceConfig::load(&args.config).context(ConfigSnafu { path: &args.config })?;
    let stack = SimStack::new(&config, args.node_id).context(ConfigSnafu { path: &args.config })?;
    stack.event_loop().set_error_policy(if args.keep_going {
        ErrorPolicy::Log
    } else {
        ErrorPolicy::Abort
    });

    let bridge = Bridge::new(stack.clone(), args.write_policy.into());
    let script_config = ScriptConfig {
        lib_path: args.lib_path.clone(),
    };
    let engine = ScriptEngine::new(bridge.clone(), &script_config).context(DeviceSnafu)?;
    engine.load_file(&args.script).context(DeviceSnafu)?;

    stack.init().context(DeviceSnafu)?;
    if let Some(period) = args.sync_period_ms {
        stack.start_sync_producer(Duration::from_millis(period));
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context(RuntimeSnafu)?;
    let result = runtime.block_on(stack.event_loop().run(shutdown_signal()));

    bridge.shutdown();
    stack.stop();
    match result.context(DeviceSnafu)? {
        RunExit::Shutdown => log::info!("Shutdown requested"),
        RunExit::Idle => log::info!("No timers left to run"),
    }
    let drained = stack.event_loop().drain().context(DeviceSnafu)?;
    log::debug!("Drained {drained} tasks");
    Ok(())
}
