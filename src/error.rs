use thiserror::Error;

/// Problems with an incoming request frame or a reply read from a master.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RespError {
    #[error("expected '{expected}' but found '{found}'")]
    UnexpectedPrefix { expected: char, found: char },

    #[error("invalid length '{0}'")]
    InvalidLength(String),

    #[error("bulk string of {0} bytes exceeds the limit")]
    TooLarge(usize),

    #[error("bulk string is not terminated by CRLF")]
    MissingTerminator,

    #[error("empty command")]
    EmptyCommand,

    #[error("header line longer than {} bytes", crate::resp::MAX_LINE_LEN)]
    LineTooLong,

    #[error("array of {0} elements exceeds the limit")]
    TooManyArgs(usize),

    #[error("argument is not valid UTF-8")]
    InvalidUtf8,
}

/// Errors that end a connection (or, during startup, the process).
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Error parsing input: {0}")]
    Parse(#[from] RespError),

    #[error("Error creating empty rdb file: {0}")]
    Encoding(#[from] hex::FromHexError),
}

/// A command failed but the connection stays open. The message is sent to
/// the client after `-ERR `.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("wrong number of arguments for '{0}' command")]
    WrongArity(String),

    #[error("syntax error")]
    Syntax,

    #[error("value is not an integer or out of range")]
    NotInteger,

    #[error("unknown section '{0}'")]
    UnknownSection(String),

    #[error("unknown command '{0}'")]
    UnknownCommand(String),
}
