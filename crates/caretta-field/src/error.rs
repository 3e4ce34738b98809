use std::fmt;

use crate::forms::ValidationIssue;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// A form rule blocked submission; `field` is the target to jump to.
    Validation { field: String },
    /// The backend answered with a non-2xx status.
    Api { status: u16 },
    /// The request never produced a usable response.
    Transport,
    Config,
    Io,
    Other,
}

#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    msg: String,
}

impl Error {
    pub fn msg<M: Into<String>>(msg: M) -> Self {
        Self {
            kind: ErrorKind::Other,
            msg: msg.into(),
        }
    }

    pub fn with_kind<M: Into<String>>(kind: ErrorKind, msg: M) -> Self {
        Self {
            kind,
            msg: msg.into(),
        }
    }

    pub fn api<M: Into<String>>(status: u16, msg: M) -> Self {
        Self::with_kind(ErrorKind::Api { status }, msg)
    }

    pub fn transport<M: Into<String>>(msg: M) -> Self {
        Self::with_kind(ErrorKind::Transport, msg)
    }

    pub fn config<M: Into<String>>(msg: M) -> Self {
        Self::with_kind(ErrorKind::Config, msg)
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub fn message(&self) -> &str {
        &self.msg
    }

    pub fn is_validation(&self) -> bool {
        matches!(self.kind, ErrorKind::Validation { .. })
    }

    pub fn status(&self) -> Option<u16> {
        match self.kind {
            ErrorKind::Api { status } => Some(status),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ErrorKind::Validation { field } => write!(f, "{} (field: {field})", self.msg),
            _ => write!(f, "{}", self.msg),
        }
    }
}

impl std::error::Error for Error {}

impl From<ValidationIssue> for Error {
    fn from(issue: ValidationIssue) -> Self {
        Self::with_kind(
            ErrorKind::Validation {
                field: issue.field.to_string(),
            },
            issue.message,
        )
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::with_kind(ErrorKind::Io, err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::config(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::msg(format!("json error: {err}"))
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Self::transport(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
