//! Replica side of replication: the startup handshake with a master.
//!
//! The handshake runs once, before the listener accepts clients:
//!
//! 1. `PING`
//! 2. `REPLCONF listening-port <port>`
//! 3. `REPLCONF capa psync2`
//! 4. `PSYNC ? -1`
//!
//! Replies are logged but not validated. Any I/O failure aborts startup.

use anyhow::Context;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::{info, warn};

use crate::config::MasterAddr;
use crate::connection::Connection;
use crate::error::ServerError;
use crate::rdb;
use crate::resp::Reply;
use crate::types::{Role, ServerState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HandshakeStep {
    Ping,
    ListeningPort,
    Capabilities,
    Psync,
    Done,
}

impl HandshakeStep {
    /// Command sent in this step, as space-separated words.
    fn request(self, listening_port: u16) -> Option<String> {
        match self {
            HandshakeStep::Ping => Some("PING".to_string()),
            HandshakeStep::ListeningPort => {
                Some(format!("REPLCONF listening-port {}", listening_port))
            }
            HandshakeStep::Capabilities => Some("REPLCONF capa psync2".to_string()),
            HandshakeStep::Psync => Some("PSYNC ? -1".to_string()),
            HandshakeStep::Done => None,
        }
    }

    fn next(self) -> Self {
        match self {
            HandshakeStep::Ping => HandshakeStep::ListeningPort,
            HandshakeStep::ListeningPort => HandshakeStep::Capabilities,
            HandshakeStep::Capabilities => HandshakeStep::Psync,
            HandshakeStep::Psync | HandshakeStep::Done => HandshakeStep::Done,
        }
    }
}

/// The connection to the master once the handshake is done.
pub struct MasterLink<S = TcpStream> {
    conn: Connection<S>,
}

/// Connects to `master` and performs the handshake, flipping `state` to
/// replica on success.
pub async fn connect_to_master(
    master: &MasterAddr,
    listening_port: u16,
    state: &mut ServerState,
) -> anyhow::Result<MasterLink> {
    info!("Connecting to master at {}", master);
    let stream = TcpStream::connect((master.host.as_str(), master.port))
        .await
        .with_context(|| format!("failed to connect to master at {}", master))?;

    let link = handshake(stream, listening_port, state)
        .await
        .with_context(|| format!("handshake with master at {} failed", master))?;
    info!("Finished handshake with master.");
    Ok(link)
}

/// Drives the four handshake steps over `stream`.
pub async fn handshake<S>(
    stream: S,
    listening_port: u16,
    state: &mut ServerState,
) -> Result<MasterLink<S>, ServerError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut conn = Connection::new(stream);
    let mut step = HandshakeStep::Ping;

    while let Some(request) = step.request(listening_port) {
        conn.write_array(&request).await?;
        info!(?step, "sent {}", request);

        match conn.read_reply().await? {
            Reply::Error(msg) => warn!(?step, "master replied with error: {}", msg),
            reply => info!(?step, "master replied {}", reply),
        }
        step = step.next();
    }

    state.role = Role::Replica;
    Ok(MasterLink { conn })
}

impl<S: AsyncRead + AsyncWrite + Unpin> MasterLink<S> {
    /// Reads the snapshot transfer that follows `FULLRESYNC`.
    pub async fn receive_snapshot(&mut self) -> Result<Vec<u8>, ServerError> {
        self.conn.read_bulk_transfer().await
    }

    /// Receives the snapshot, logs what it holds without loading it, then
    /// ignores the rest of the stream until the master goes away.
    pub async fn run(mut self) -> Result<(), ServerError> {
        let snapshot = self.receive_snapshot().await?;
        match rdb::inspect_snapshot(&snapshot) {
            Ok(summary) => info!(
                bytes = snapshot.len(),
                version = %summary.version,
                aux = summary.aux.len(),
                keys = summary.keys,
                "received snapshot from master (not loaded)"
            ),
            Err(e) => warn!(bytes = snapshot.len(), "unreadable snapshot from master: {}", e),
        }

        let ignored = self.conn.discard_until_eof().await?;
        info!(ignored, "master closed the replication link");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Db;
    use crate::handler::handle_client;
    use crate::types::MASTER_REPLID;
    use std::sync::Arc;
    use tokio::io::duplex;
    use tokio::net::TcpListener;

    /// Answers each request in turn, checking what the replica sent.
    async fn mock_master<S>(stream: S, script: Vec<(&'static str, &'static str)>)
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut conn = Connection::new(stream);
        for (expected, reply) in script {
            let request = conn.read_request().await.unwrap().unwrap();
            let mut words = vec![request.command.clone()];
            words.extend(request.args);
            assert_eq!(words.join(" "), expected);
            conn.write(reply.as_bytes()).await.unwrap();
        }
    }

    fn standard_script() -> Vec<(&'static str, &'static str)> {
        vec![
            ("ping", "+PONG\r\n"),
            ("replconf listening-port 6380", "+OK\r\n"),
            ("replconf capa psync2", "+OK\r\n"),
            (
                "psync ? -1",
                "+FULLRESYNC 8371b4fb1155b71f4a04d3e1bc3e18c4a990aeeb 0\r\n",
            ),
        ]
    }

    #[test]
    fn steps_run_in_order() {
        let mut step = HandshakeStep::Ping;
        let mut sent = Vec::new();
        while let Some(request) = step.request(7000) {
            sent.push(request);
            step = step.next();
        }
        assert_eq!(
            sent,
            [
                "PING",
                "REPLCONF listening-port 7000",
                "REPLCONF capa psync2",
                "PSYNC ? -1"
            ]
        );
        assert_eq!(step.next(), HandshakeStep::Done);
    }

    #[tokio::test]
    async fn handshake_against_mock_master_flips_role() {
        let (replica, master) = duplex(1024);
        let master = tokio::spawn(mock_master(master, standard_script()));

        let mut state = ServerState::new();
        handshake(replica, 6380, &mut state).await.unwrap();
        master.await.unwrap();

        assert_eq!(state.role, Role::Replica);
        assert_eq!(state.master_replid, MASTER_REPLID);
    }

    #[tokio::test]
    async fn error_replies_are_not_fatal() {
        let (replica, master) = duplex(1024);
        let mut script = standard_script();
        script[2].1 = "-ERR unknown capability\r\n";
        tokio::spawn(mock_master(master, script));

        let mut state = ServerState::new();
        assert!(handshake(replica, 6380, &mut state).await.is_ok());
        assert_eq!(state.role, Role::Replica);
    }

    #[tokio::test]
    async fn master_hanging_up_aborts_the_handshake() {
        let (replica, master) = duplex(1024);
        let mut script = standard_script();
        script.truncate(1);
        let master = tokio::spawn(mock_master(master, script));

        let mut state = ServerState::new();
        let result = handshake(replica, 6380, &mut state).await;
        master.await.unwrap();

        assert!(matches!(result, Err(ServerError::Io(_))));
        assert_eq!(state.role, Role::Master);
    }

    #[tokio::test]
    async fn unreachable_master_is_an_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let master = MasterAddr {
            host: "127.0.0.1".into(),
            port,
        };
        let mut state = ServerState::new();
        assert!(connect_to_master(&master, 6380, &mut state).await.is_err());
        assert_eq!(state.role, Role::Master);
    }

    #[tokio::test]
    async fn link_reads_snapshot_then_drains() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut conn = Connection::new(stream);
            for (_, reply) in standard_script() {
                conn.read_request().await.unwrap().unwrap();
                conn.write(reply.as_bytes()).await.unwrap();
            }
            conn.write_bulk_transfer(&rdb::empty_snapshot().unwrap())
                .await
                .unwrap();
            conn.write(b"*1\r\n$4\r\nPING\r\n").await.unwrap();
        });

        let master = MasterAddr {
            host: "127.0.0.1".into(),
            port,
        };
        let mut state = ServerState::new();
        let link = connect_to_master(&master, 6380, &mut state).await.unwrap();
        assert_eq!(state.role, Role::Replica);
        link.run().await.unwrap();
    }

    #[tokio::test]
    async fn replica_bootstraps_against_real_master() {
        let (replica, master) = duplex(4096);
        tokio::spawn(handle_client(master, Db::new(), Arc::new(ServerState::new())));

        let mut state = ServerState::new();
        let mut link = handshake(replica, 6380, &mut state).await.unwrap();
        let snapshot = link.receive_snapshot().await.unwrap();

        assert_eq!(state.role, Role::Replica);
        assert_eq!(rdb::inspect_snapshot(&snapshot).unwrap().keys, 0);
    }
}
