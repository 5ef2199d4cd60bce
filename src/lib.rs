//! # dhcpool
//!
//! A DHCP server library implementing RFC 2131 with multiple subnet
//! pools and relay agent (option 82) pool selection.
//!
//! ## Features
//!
//! - DHCP protocol flow: DISCOVER, OFFER, REQUEST, ACK, NAK, RELEASE, DECLINE, INFORM
//! - Multiple address pools selected by relay agent information or subnet
//! - Static MAC-to-IP reservations with precedence over leases
//! - Circuit-id and remote-id mappings for relayed clients
//! - Pluggable message handling through the [`DhcpHandler`] trait
//! - Async/await with Tokio
//!
//! ## Quick Start
//!
//! ```no_run
//! use dhcpool::{Allocator, Config, DhcpServer};
//!
//! #[tokio::main]
//! async fn main() -> dhcpool::Result<()> {
//!     let config = Config::load_or_create("dhcpool.json")?;
//!     let server = DhcpServer::new(config.server_ip, Allocator::from_config(&config));
//!
//!     server.start().await?;
//!     tokio::signal::ctrl_c().await?;
//!     server.stop().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`Config`] - Server configuration (pools, reservations, relay mappings)
//! - [`DhcpServer`] - UDP front end that decodes and dispatches messages
//! - [`Allocator`] - Pool selection and address allocation engine
//! - [`SubnetPool`] - One address range with its subnet parameters
//! - [`DhcpMessage`] - DHCP message decoding and encoding
//! - [`DhcpOptions`] - The option table per RFC 2132

pub mod allocator;
pub mod config;
pub mod error;
pub mod message;
pub mod options;
pub mod pool;
pub mod server;

pub use allocator::Allocator;
pub use config::Config;
pub use error::{Error, Result};
pub use message::DhcpMessage;
pub use options::{DhcpOptions, MessageType, OptionCode, RelayAgentInfo};
pub use pool::SubnetPool;
pub use server::{DhcpHandler, DhcpServer, Reply};
