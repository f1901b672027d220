#![forbid(unsafe_code)]

//! Process guard for the relay server.

use anyhow::{Result, bail};
use nix::unistd::Uid;

/// Refuses to continue when `process` runs with uid 0. The relay forwards
/// arbitrary URLs, so it should never hold root privileges.
pub fn ensure_not_root(process: &str) -> Result<()> {
    ensure_not_root_for(Uid::current(), process)
}

fn ensure_not_root_for(uid: Uid, process: &str) -> Result<()> {
    if uid.is_root() {
        bail!("{process} refuses to run as root; start it from an unprivileged account");
    }
    Ok(())
}
