// src/exec/transport.rs

//! How a shell script reaches a host: `sh -c` locally, `ssh` otherwise.

use tokio::process::Command;

use crate::dag::Host;

/// Build the command that runs `script` on `host`.
pub fn shell_command(host: &Host, script: &str) -> Command {
    if host.is_local() {
        let mut c = if cfg!(windows) {
            let mut c = Command::new("cmd");
            c.arg("/C").arg(script);
            c
        } else {
            let mut c = Command::new("sh");
            c.arg("-c").arg(script);
            c
        };
        c.kill_on_drop(true);
        return c;
    }

    let mut c = Command::new("ssh");
    c.arg("-o").arg("BatchMode=yes");
    if let Some(port) = host.port {
        c.arg("-p").arg(port.to_string());
    }
    c.arg(ssh_destination(host)).arg("--").arg(script);
    c.kill_on_drop(true);
    c
}

/// `user@address`, or just the address.
pub fn ssh_destination(host: &Host) -> String {
    let address = host.address.as_deref().unwrap_or(host.name.as_str());
    match host.user.as_deref() {
        Some(user) => format!("{user}@{address}"),
        None => address.to_string(),
    }
}
