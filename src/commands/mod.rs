use crate::db::InMemoryDB;
use crate::error::CommandError;
use crate::resp::*;
use crate::types::ServerState;

/// Minimum number of arguments (not counting the command name) per command.
const MIN_ARGS: &[(&str, usize)] = &[
    ("ping", 0),
    ("echo", 1),
    ("get", 1),
    ("set", 2),
    ("info", 1),
    ("replconf", 2),
    ("psync", 2),
];

/// Rejects a known command called with too few arguments. Unknown commands
/// pass and are reported by the dispatcher.
pub fn check_arity(command: &str, args: &[String]) -> Result<(), CommandError> {
    match MIN_ARGS.iter().find(|(name, _)| *name == command) {
        Some((_, min)) if args.len() < *min => Err(CommandError::WrongArity(command.to_string())),
        _ => Ok(()),
    }
}

pub fn handle_ping(_args: &[String]) -> String {
    encode_simple_string("PONG")
}

pub fn handle_echo(args: &[String]) -> String {
    encode_bulk_string(&args.join(" "))
}

/// `SET key value [PX millis]`
pub fn handle_set(args: &[String], db: &mut InMemoryDB) -> Result<String, CommandError> {
    let ttl_ms = match &args[2..] {
        [] => 0,
        // 0 keeps the key forever; a negative TTL stores an already expired key.
        [option, millis] if option.eq_ignore_ascii_case("px") => millis
            .parse::<i64>()
            .map_err(|_| CommandError::NotInteger)?,
        _ => return Err(CommandError::Syntax),
    };
    db.set(args[0].clone(), args[1].clone(), ttl_ms);
    Ok(encode_simple_string("OK"))
}

pub fn handle_get(args: &[String], db: &InMemoryDB) -> String {
    match db.get(&args[0]) {
        Some(val) => encode_bulk_string(&val),
        None => encode_null_bulk_string(),
    }
}

pub fn handle_info(args: &[String], state: &ServerState) -> Result<String, CommandError> {
    let section = args[0].to_lowercase();
    let entries = state
        .info_section(&section)
        .ok_or_else(|| CommandError::UnknownSection(section.clone()))?;

    let mut body = format!("# {}\r\n", section);
    for (key, value) in entries {
        body.push_str(&format!("{}:{}\r\n", key, value));
    }
    Ok(encode_bulk_string(&body))
}

pub fn handle_replconf(_args: &[String]) -> String {
    encode_simple_string("OK")
}

/// First half of the PSYNC reply; the snapshot transfer follows it.
pub fn handle_psync(_args: &[String], state: &ServerState) -> String {
    encode_simple_string(&format!(
        "FULLRESYNC {} {}",
        state.master_replid, state.master_repl_offset
    ))
}
