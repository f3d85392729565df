mod cli;
mod debug_dump;

use anyhow::{bail, Context, Result};
use clap::Parser;
use cli::{Cli, Command};
use netsim_registry::SharedRegistry;
use netsim_topology::{Interrupt, TopologyEngine, SIGINT_EXIT_CODE};
use nix::unistd::geteuid;
use tracing::{info, warn};

fn main() -> Result<()> {
    let cli = Cli::parse();
    netsim_logging::init(cli.verbose)?;

    if let Some(Command::DebugDump { router }) = &cli.command {
        return debug_dump::run(&cli.raw_facts_dir, router.as_deref());
    }

    if !geteuid().is_root() {
        bail!("tsim-setup must be run as root (except for `debug-dump`)");
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build the async runtime")?;
    runtime.block_on(run(cli))
}

#[allow(clippy::print_stdout)]
async fn run(cli: Cli) -> Result<()> {
    if cli.verbose >= 1 {
        match &cli.limit {
            Some(pattern) => info!(pattern, "loading router facts (filtered)"),
            None => info!("loading router facts"),
        }
    }

    let mut routers = netsim_facts::load_facts(&cli.raw_facts_dir).context("failed to load raw facts")?;
    if let Some(pattern) = &cli.limit {
        routers.retain(|r| r.name.contains(pattern.as_str()));
    }
    info!(count = routers.len(), "loaded routers");

    if cli.cleanup {
        let registry = SharedRegistry::attach_or_create().context("failed to open shared registry")?;
        let engine = TopologyEngine::new(routers, registry, cli.verbose);
        engine.cleanup();
        println!("cleanup complete");
        return Ok(());
    }

    let interrupt = Interrupt::new();
    interrupt.install();

    let registry = SharedRegistry::create().context("failed to create shared registry")?;
    let router_count = routers.len();
    let engine = TopologyEngine::new(routers, registry, cli.verbose);

    if cli.verbose >= 1 || !cli.parallel {
        println!("Setting up {router_count} routers...");
    }

    let stats = engine.run(cli.parallel, &interrupt).await?;

    if interrupt.is_set() {
        warn!("setup interrupted by user");
        std::process::exit(SIGINT_EXIT_CODE);
    }

    print_summary(&stats);
    Ok(())
}

#[allow(clippy::print_stdout)]
fn print_summary(stats: &netsim_topology::Stats) {
    println!("Setup complete:");
    println!("  namespaces created : {}", stats.namespaces_created);
    println!("  bridges created    : {}", stats.bridges_created);
    println!("  interfaces created : {}", stats.interfaces_created);
    println!("  routes added       : {}", stats.routes_added);
    println!("  rules added        : {}", stats.rules_added);
}
