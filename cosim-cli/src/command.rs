use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use cosim_node::common::NodeId;
use cosim_node::script::LIB_PATH_ENV;
use cosim_node::WritePolicy;

/// Run a simulated CANopen device defined by a Lua script
#[derive(Debug, Parser)]
#[command(name = "cosim", version)]
pub struct Args {
    /// Path to the device config TOML file
    #[arg(value_hint = clap::ValueHint::FilePath)]
    pub config: PathBuf,
    /// Path to the Lua device script
    #[arg(value_hint = clap::ValueHint::FilePath)]
    pub script: PathBuf,
    /// Node ID of the simulated device (1-127, or 255 for unconfigured)
    #[arg(short, long, default_value = "1", value_parser = parse_node_id)]
    pub node_id: NodeId,
    /// Generate SYNC messages with this period, driving the script's OnSync hook
    #[arg(long)]
    pub sync_period_ms: Option<u64>,
    /// How object writes are delivered to the script
    #[arg(long, value_enum, default_value_t = WritePolicyArg::PerObject)]
    pub write_policy: WritePolicyArg,
    /// Lua search path appended to package.path
    #[arg(long, env = LIB_PATH_ENV)]
    pub lib_path: Option<String>,
    /// Log script errors raised by timers and events, instead of exiting
    #[arg(long)]
    pub keep_going: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, ValueEnum)]
pub enum WritePolicyArg {
    /// Run the callback registered for the written object with ObjectCallback
    PerObject,
    /// Call the script's OnWrite(index, sub) hook for every write
    CatchAll,
}

impl From<WritePolicyArg> for WritePolicy {
    fn from(value: WritePolicyArg) -> Self {
        match value {
            WritePolicyArg::PerObject => WritePolicy::PerObject,
            WritePolicyArg::CatchAll => WritePolicy::CatchAll,
        }
    }
}

fn parse_node_id(s: &str) -> Result<NodeId, String> {
    let raw = if let Some(hex) = s.strip_prefix("0x") {
        u8::from_str_radix(hex, 16)
    } else {
        s.parse::<u8>()
    }
    .map_err(|e| e.to_string())?;
    NodeId::new(raw).map_err(|e| e.to_string())
}
