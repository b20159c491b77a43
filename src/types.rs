use std::fmt;

/// Replication id advertised by this process. Fixed for its whole lifetime.
pub const MASTER_REPLID: &str = "8371b4fb1155b71f4a04d3e1bc3e18c4a990aeeb";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Master,
    Replica,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // "slave" is the name the protocol still uses on the wire.
        match self {
            Role::Master => f.write_str("master"),
            Role::Replica => f.write_str("slave"),
        }
    }
}

/// Replication identity of this process.
///
/// Built mutable at startup, changed at most once by a successful replica
/// handshake, then frozen behind an `Arc` before any client is served.
#[derive(Debug, Clone)]
pub struct ServerState {
    pub role: Role,
    pub master_replid: String,
    pub master_repl_offset: u64,
}

impl ServerState {
    pub fn new() -> Self {
        Self {
            role: Role::Master,
            master_replid: MASTER_REPLID.to_string(),
            master_repl_offset: 0,
        }
    }

    /// Key/value pairs shown by `INFO <section>`, or `None` for an unknown
    /// section. `section` must already be lowercased.
    pub fn info_section(&self, section: &str) -> Option<Vec<(&'static str, String)>> {
        match section {
            "replication" => Some(vec![
                ("role", self.role.to_string()),
                ("master_replid", self.master_replid.clone()),
                ("master_repl_offset", self.master_repl_offset.to_string()),
            ]),
            _ => None,
        }
    }
}
