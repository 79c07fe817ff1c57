//! Run a simulated CANopen device defined by a Lua script
use clap::Parser;
use cosim_cli::{command::Args, runner::run};

fn main() {
    env_logger::init();
    let args = Args::parse();

    if let Err(e) = run(&args) {
        log::error!("{e}");
        std::process::exit(1);
    }
}
