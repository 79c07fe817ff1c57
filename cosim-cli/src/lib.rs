//! Command-line runner for simulated devices
//!
//! # cosim
//!
//! Loads a device config TOML file and a Lua device script, then runs the simulated device in
//! real time until interrupted with Ctrl-C or SIGTERM.
//!
//! Usage example: `cosim motor.toml motor.lua --node-id 5 --sync-period-ms 10`
//!
//! Log output is controlled with the `RUST_LOG` environment variable, e.g. `RUST_LOG=debug`. Extra
//! Lua module paths are read from `COSIM_LIB_PATH`, or given with `--lib-path`.

pub mod command;
pub mod runner;
