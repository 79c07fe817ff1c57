//! A library to simulate a CANopen node whose behavior is written in Lua
//!
//! Cosim-node hosts a device script next to a CANopen stack. The stack owns the object
//! dictionary and the event loop; the script reacts to the stack's events, and reads and writes
//! objects by name. It provides the following features:
//!
//! * A name registry, mapping script visible names to objects of one of the eight integer types,
//!   with exact width and signedness checking on every access.
//! * Per-object write callbacks, run synchronously when an object is written either by the script
//!   itself or by the network.
//! * A periodic timer which calls the script's `OnTick` hook.
//! * Forwarding of the stack's init and SYNC events to the `OnInit` and `OnSync` hooks.
//! * Emergency reporting and heartbeat configuration from the script.
//! * [`SimStack`], an in-process stack built from a
//!   [DeviceConfig](common::device_config::DeviceConfig) TOML file, with an [`EventLoop`] that can
//!   run in real time on tokio, or be stepped through virtual time in tests.
//!
//! # Getting Started
//!
//! ```no_run
//! use cosim_node::common::{device_config::DeviceConfig, NodeId};
//! use cosim_node::{Bridge, ScriptConfig, ScriptEngine, SimStack, WritePolicy};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = DeviceConfig::load("device.toml")?;
//! let stack = SimStack::new(&config, NodeId::new(5)?)?;
//! let bridge = Bridge::new(stack.clone(), WritePolicy::PerObject);
//! let engine = ScriptEngine::new(bridge, &ScriptConfig::from_env())?;
//! engine.load_file("device.lua")?;
//! stack.init()?;
//! stack.event_loop().advance(std::time::Duration::from_secs(1))?;
//! # Ok(())
//! # }
//! ```
//!
//! # Threading
//!
//! Everything about a simulated device lives on one thread. Hooks, callbacks and timer tasks all
//! run on the stack's event loop, and may freely re-enter the bridge. Multiple devices can be
//! simulated in one process by creating one stack, bridge and engine per device.
#![warn(missing_docs, missing_debug_implementations)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod bridge;
pub mod dispatcher;
mod error;
pub mod event_loop;
pub mod object_dict;
pub mod od_access;
pub mod registry;
pub mod scheduler;
pub mod script;
pub mod sim;
pub mod stack;

// Re-export the common crate for convenience
pub use cosim_common as common;

pub use bridge::{Bridge, ScriptHooks, WritePolicy};
pub use error::Error;
pub use event_loop::{ErrorPolicy, EventLoop, RunExit};
pub use registry::DynValue;
pub use script::{ScriptConfig, ScriptEngine};
pub use sim::{Emergency, NmtState, SimStack};
pub use stack::{CanOpenStack, StackListener};
