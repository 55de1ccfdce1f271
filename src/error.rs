use std::{fmt::Display, result};

pub type Result<T, E = Error> = result::Result<T, E>;

#[derive(Debug)]
pub enum Error {
    Unspecified(String),
    Unimplemented(String),
    Unhandled(Box<dyn std::error::Error + Send + Sync>),
    IoError(std::io::Error),
    /// Device returned a response that we could not properly handle
    BadResponse(String),
    /// Device or driver does not support configuration/functionality
    NotSupported(String),
    /// Timed out during an operation; any bytes already received are attached
    Timeout { message: String, partial: Vec<u8> },
    /// Resource string did not match the VISA grammar
    InvalidResource(String),
    /// No device answered the resource string, or discovery found nothing
    ResourceNotFound(String),
    /// The resource, or a channel/endpoint it needs, is already owned elsewhere
    ResourceBusy(String),
    /// The underlying transport was lost (socket reset, USB pipe stall, serial I/O error)
    ConnectionLost(String),
    /// ONC/RPC rejected the call: version mismatch between client and server
    RpcMismatch { low: u32, high: u32 },
    /// ONC/RPC rejected the call: authentication failure
    RpcAuthError(String),
    /// ONC/RPC accepted the call but the procedure is not implemented
    RpcProcUnavailable,
    /// ONC/RPC accepted the call but could not decode the arguments
    RpcGarbageArgs,
    /// A fatal protocol error invalidated the session; it must be closed
    SessionInvalidated(String),
    /// The session was already marked unusable by a prior transport error
    SessionUnusable,
}
impl Error {
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout {
            message: message.into(),
            partial: Vec::new(),
        }
    }

    pub fn timeout_with_partial(message: impl Into<String>, partial: Vec<u8>) -> Self {
        Self::Timeout {
            message: message.into(),
            partial,
        }
    }
}
impl std::error::Error for Error {}
impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Unspecified(desc) => write!(f, "Unspecified error: {desc}"),
            Error::Unimplemented(desc) => write!(f, "Unimplemented: {desc}"),
            Error::Unhandled(e) => write!(f, "Unhandled error: {e}"),
            Error::IoError(e) => write!(f, "IO error: {e}"),
            Error::BadResponse(e) => write!(f, "Bad response: {e}"),
            Error::NotSupported(e) => write!(f, "Not supported: {e}"),
            Error::Timeout { message, partial } => {
                write!(f, "Timed out: {message} ({} bytes already received)", partial.len())
            }
            Error::InvalidResource(s) => write!(f, "Invalid resource string: {s}"),
            Error::ResourceNotFound(s) => write!(f, "Resource not found: {s}"),
            Error::ResourceBusy(s) => write!(f, "Resource busy: {s}"),
            Error::ConnectionLost(s) => write!(f, "Connection lost: {s}"),
            Error::RpcMismatch { low, high } => {
                write!(f, "RPC version mismatch, server supports {low}..{high}")
            }
            Error::RpcAuthError(s) => write!(f, "RPC authentication error: {s}"),
            Error::RpcProcUnavailable => write!(f, "RPC procedure unavailable"),
            Error::RpcGarbageArgs => write!(f, "RPC server could not decode arguments"),
            Error::SessionInvalidated(s) => write!(f, "Session invalidated: {s}"),
            Error::SessionUnusable => write!(f, "Session is unusable after a prior error"),
        }
    }
}
impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::IoError(value)
    }
}
