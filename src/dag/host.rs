// src/dag/host.rs

use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;

/// Role carried by the distinguished control host.
pub const CONTROL_ROLE: &str = "control";

/// A target machine.
///
/// The engine only compares and displays hosts; everything else here is
/// consumed by the transport in [`crate::exec::transport`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Host {
    pub name: String,
    pub address: Option<String>,
    pub user: Option<String>,
    pub port: Option<u16>,
    pub roles: BTreeSet<String>,
}

impl Host {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: None,
            user: None,
            port: None,
            roles: BTreeSet::new(),
        }
    }

    /// The synthetic local host used when no control host is configured.
    pub fn local_control() -> Self {
        Self::new(CONTROL_ROLE).with_role(CONTROL_ROLE)
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.insert(role.into());
        self
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }

    /// Hosts without an address, or addressed as loopback, run locally.
    pub fn is_local(&self) -> bool {
        match self.address.as_deref() {
            None => true,
            Some(addr) => matches!(addr, "localhost" | "127.0.0.1" | "::1"),
        }
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
