//! Error types for the DHCP server.
//!
//! All fallible operations in this crate return [`Result<T>`], which uses
//! the [`Error`] enum for error variants. Expected negative outcomes of
//! allocation (no matching pool, exhausted range, unknown client) are
//! ordinary variants here, not panics: the dispatch layer reports them
//! through the message-error hook and keeps serving.

use std::net::Ipv4Addr;

use macaddr::MacAddr6;

/// Errors that can occur during DHCP server operation.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// File system or network I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error (configuration file).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Malformed DHCP message received.
    ///
    /// This includes datagrams shorter than 244 bytes, a magic cookie
    /// other than 99.130.83.99, and truncated option length or data.
    #[error("Invalid DHCP message: {0}")]
    InvalidMessage(String),

    /// A message could not be serialized to wire format.
    ///
    /// Raised when the message-type option is missing or a sname/file
    /// string does not fit its fixed-width field. These only occur for
    /// programming errors since the server sets required fields itself.
    #[error("Cannot encode DHCP message: {0}")]
    Encode(String),

    /// A message the server cannot act on.
    ///
    /// Wrong opcode (not BOOTREQUEST), a missing or unrecognized message
    /// type, or a server-only message type handed to the send path.
    #[error("Unsupported DHCP message: {0}")]
    UnsupportedMessage(String),

    /// No configured subnet pool matches the candidate address.
    ///
    /// The candidate is the relay-agent address for relayed messages,
    /// otherwise the server's own listening address.
    #[error("No subnet pool serves {0}")]
    NoSubnet(Ipv4Addr),

    /// Relay-agent identifiers matched no configured pool id.
    #[error("Relay agent information matches no pool ({0})")]
    UnknownRelay(String),

    /// Every address in the pool's range is leased or reserved.
    #[error("No free addresses in pool {0}")]
    PoolExhausted(u32),

    /// A REQUEST arrived from a MAC with no reservation and no lease.
    ///
    /// Fresh allocation only happens on DISCOVER, so this client has
    /// nothing to acknowledge.
    #[error("No lease or reservation for {mac} in pool {pool}")]
    NoLease { mac: MacAddr6, pool: u32 },

    /// Invalid server configuration.
    ///
    /// Returned by [`Config::validate`](crate::Config::validate) when the
    /// configuration contains invalid values (e.g., range_start > range_end).
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Socket creation or configuration error.
    ///
    /// Typically occurs when binding to port 67 without administrator
    /// privileges.
    #[error("Socket error: {0}")]
    Socket(String),
}

/// A specialized Result type for DHCP operations.
pub type Result<T> = std::result::Result<T, Error>;
