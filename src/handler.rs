use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

use crate::commands::*;
use crate::connection::Connection;
use crate::db::Db;
use crate::error::{CommandError, ServerError};
use crate::rdb;
use crate::resp::Request;
use crate::types::ServerState;

/// Serves one client until it disconnects.
///
/// Command errors are reported and the loop continues. A malformed frame is
/// reported and then ends the connection, as does any transport failure.
pub async fn handle_client<S>(stream: S, db: Db, state: Arc<ServerState>) -> Result<(), ServerError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut conn = Connection::new(stream);

    loop {
        let request = match conn.read_request().await {
            Ok(Some(request)) => request,
            Ok(None) => return Ok(()),
            Err(e @ ServerError::Parse(_)) => {
                // Best effort: the peer may already be gone.
                let _ = conn.write_error(&e.to_string()).await;
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        debug!(command = %request.command, args = request.args.len(), "received");

        if let Err(e) = check_arity(&request.command, &request.args) {
            conn.write_error(&e.to_string()).await?;
            continue;
        }

        if request.command == "psync" {
            send_full_resync(&mut conn, &request.args, &state).await?;
            continue;
        }

        match execute(&request, &db, &state) {
            Ok(reply) => conn.write(reply.as_bytes()).await?,
            Err(e) => conn.write_error(&e.to_string()).await?,
        }
    }
}

/// Runs every command whose reply is a single encoded frame.
fn execute(request: &Request, db: &Db, state: &ServerState) -> Result<String, CommandError> {
    let args = &request.args;
    match request.command.as_str() {
        "ping" => Ok(handle_ping(args)),
        "echo" => Ok(handle_echo(args)),
        "set" => handle_set(args, &mut db.lock()),
        "get" => Ok(handle_get(args, &db.lock())),
        "info" => handle_info(args, state),
        "replconf" => Ok(handle_replconf(args)),
        other => Err(CommandError::UnknownCommand(other.to_string())),
    }
}

/// `+FULLRESYNC <replid> <offset>` followed by the placeholder snapshot.
/// Nothing is streamed afterwards.
async fn send_full_resync<S>(
    conn: &mut Connection<S>,
    args: &[String],
    state: &ServerState,
) -> Result<(), ServerError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    conn.write(handle_psync(args, state).as_bytes()).await?;

    let snapshot = match rdb::empty_snapshot() {
        Ok(snapshot) => snapshot,
        Err(e) => {
            let e = ServerError::from(e);
            let _ = conn.write_error(&e.to_string()).await;
            return Err(e);
        }
    };
    conn.write_bulk_transfer(&snapshot).await?;
    debug!(bytes = snapshot.len(), "sent empty snapshot");
    Ok(())
}
