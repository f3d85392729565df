//! `netns-reader` — given `CAP_SYS_ADMIN`, lets an unprivileged user run a small whitelist of
//! read-only commands inside a network namespace without ever invoking a shell.
//!
//! ```text
//! netns-reader <namespace> <command> [args...]
//! netns-reader --list
//! ```

mod error;
mod whitelist;

use std::ffi::CString;
use std::path::Path;

use anyhow::Result;
use clap::Parser;
use error::ReaderError;
use nix::sched::{setns, CloneFlags};
use nix::unistd::{getgid, getuid, setgid, setuid};
use tracing::warn;

const NETNS_DIR: &str = "/var/run/netns";

#[derive(Parser)]
#[command(about = "Enter a network namespace and exec a whitelisted read-only command")]
struct Cli {
    /// List known network namespaces and exit.
    #[arg(long)]
    list: bool,

    #[arg(required_unless_present = "list")]
    namespace: Option<String>,

    #[arg(required_unless_present = "list")]
    command: Option<String>,

    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

fn main() -> Result<()> {
    netsim_logging::init(0)?;
    let cli = Cli::parse();

    if cli.list {
        return list_namespaces();
    }

    let namespace = cli.namespace.expect("clap enforces presence unless --list");
    let command = cli.command.expect("clap enforces presence unless --list");

    validate_namespace(&namespace)?;
    let cmd_path = whitelist::command_path(&command)?;
    whitelist::validate_args(&command, &cli.args)?;

    enter_namespace_and_exec(&namespace, &command, cmd_path, &cli.args)
}

fn validate_namespace(name: &str) -> Result<(), ReaderError> {
    if name.contains('/') || name.contains("..") {
        return Err(ReaderError::InvalidNamespaceName(name.to_string()));
    }
    if !Path::new(NETNS_DIR).join(name).exists() {
        return Err(ReaderError::UnknownNamespace(name.to_string()));
    }
    Ok(())
}

fn list_namespaces() -> Result<()> {
    let entries = std::fs::read_dir(NETNS_DIR).map_err(ReaderError::ListNamespaces)?;
    for entry in entries.flatten() {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if !name.starts_with('.') {
            println!("{name}");
        }
    }
    Ok(())
}

fn enter_namespace_and_exec(namespace: &str, command: &str, cmd_path: &str, args: &[String]) -> Result<()> {
    let ns_path = Path::new(NETNS_DIR).join(namespace);
    let ns_file = std::fs::File::open(&ns_path)
        .map_err(|e| ReaderError::OpenNamespace(ns_path.display().to_string(), e))?;

    setns(&ns_file, CloneFlags::CLONE_NEWNET)
        .map_err(|e| ReaderError::EnterNamespace(namespace.to_string(), e))?;
    drop(ns_file);

    let real_uid = getuid();
    let real_gid = getgid();
    setgid(real_gid)
        .and_then(|()| setuid(real_uid))
        .map_err(|e| ReaderError::DropPrivileges(real_uid.as_raw(), real_gid.as_raw(), e))?;

    let path = CString::new(cmd_path).expect("whitelisted paths contain no NUL bytes");
    let mut exec_args = vec![CString::new(command.as_bytes()).expect("command has no NUL bytes")];
    for arg in args {
        exec_args.push(CString::new(arg.as_bytes()).expect("arg has no NUL bytes"));
    }

    warn!(namespace, command, "execing whitelisted command, this process image ends now");
    let err = nix::unistd::execv(&path, &exec_args).unwrap_err();
    Err(ReaderError::Exec(cmd_path.to_string(), err).into())
}
