//! Materializes a parsed router topology as real Linux network namespaces: a hidden mesh
//! namespace with one bridge per subnet, and one namespace per router connected to those
//! bridges by veth pairs, with routes, policy rules, and netfilter state replayed from the
//! captured facts.

mod engine;
mod error;
mod hidden_mesh;
mod interrupt;
mod naming;
mod netlink_ops;
mod netns;
mod router_setup;

pub use engine::{Stats, TopologyEngine};
pub use error::TopologyError;
pub use interrupt::{Interrupt, SIGINT_EXIT_CODE};
pub use naming::{bridge_name_for_subnet, subnet_for_address, veth_names, HIDDEN_NS};
pub use netns::namespace_exists;
