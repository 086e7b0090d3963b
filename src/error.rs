use std::fmt;
use std::io;

/// Errors raised while reading or evaluating.
///
/// The language has a single error kind: a message, optionally annotated with the
/// readable form of the object that caused it. The object is printed when the error
/// is raised, because the collector may move or reclaim it before anyone reports it.
#[derive(Debug, Clone, PartialEq)]
pub enum LispError {
    /// A language-level error (bad syntax, type violation, arity, unbound variable ...).
    Eval {
        object: Option<String>,
        message: String,
    },

    /// Allocation failed even after a collection. Carries the requested size in bytes.
    OutOfMemory(usize),

    /// I/O error from a stream.
    Io(String),
}

impl LispError {
    pub fn new(message: impl Into<String>) -> Self {
        LispError::Eval {
            object: None,
            message: message.into(),
        }
    }

    pub fn with_object(object: String, message: impl Into<String>) -> Self {
        LispError::Eval {
            object: Some(object),
            message: message.into(),
        }
    }

    /// The message without the object annotation.
    pub fn message(&self) -> String {
        match self {
            LispError::Eval { message, .. } => message.clone(),
            LispError::OutOfMemory(size) => format!("out of memory, {} bytes", size),
            LispError::Io(msg) => msg.clone(),
        }
    }
}

impl fmt::Display for LispError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LispError::Eval {
                object: Some(object),
                message,
            } => write!(f, "{} {}", object, message),
            LispError::Eval { object: None, message } => write!(f, "{}", message),
            LispError::OutOfMemory(size) => write!(f, "out of memory, {} bytes", size),
            LispError::Io(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for LispError {}

impl From<io::Error> for LispError {
    fn from(e: io::Error) -> Self {
        LispError::Io(format!("read() failed, {}", e))
    }
}

pub type LispResult<T> = Result<T, LispError>;
