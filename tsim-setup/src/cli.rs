use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "tsim-setup", about = "Materialize captured router facts as Linux network namespaces")]
pub struct Cli {
    /// Directory of `*_facts.txt` captures; defaults to $TRACEROUTE_SIMULATOR_RAW_FACTS.
    #[arg(long, env = "TRACEROUTE_SIMULATOR_RAW_FACTS")]
    pub raw_facts_dir: PathBuf,

    /// Increase verbosity; repeat for more (-v info, -vv debug).
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,

    /// Set up routers in parallel batches instead of one at a time.
    #[arg(short = 'p', long)]
    pub parallel: bool,

    /// Only operate on routers whose name contains this substring.
    #[arg(long)]
    pub limit: Option<String>,

    /// Tear down a previous run's namespaces and registry instead of creating one.
    #[arg(long)]
    pub cleanup: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Parse the facts directory and print the resulting model; does not touch the kernel
    /// and does not require root.
    DebugDump {
        /// Restrict output to a single router.
        #[arg(long)]
        router: Option<String>,
    },
}
