use std::fmt;
use std::str::FromStr;

use clap::Parser;

/// Startup flags.
#[derive(Parser, Debug)]
#[command(name = "redis-lite")]
#[command(about = "A small RESP server that can bootstrap as a replica")]
#[command(version)]
pub struct Config {
    /// Port to listen on
    #[arg(long, default_value_t = 6379)]
    pub port: u16,

    /// Address to bind the listener to
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Start as a replica of this master, given as "<host> <port>"
    #[arg(long, value_name = "HOST PORT")]
    pub replicaof: Option<MasterAddr>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MasterAddr {
    pub host: String,
    pub port: u16,
}

impl FromStr for MasterAddr {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split_whitespace().collect();
        let [host, port] = parts.as_slice() else {
            return Err(format!("invalid input '{}' in --replicaof", s));
        };
        let port = port
            .parse::<u16>()
            .map_err(|_| format!("invalid master port '{}' in --replicaof", port))?;
        Ok(MasterAddr {
            host: host.to_string(),
            port,
        })
    }
}

impl fmt::Display for MasterAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}
