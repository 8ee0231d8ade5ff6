//! # leaselet
//!
//! A minimal DHCP server for handing out IP leases on a single network
//! segment, built for rapid-deployment access points that should not
//! depend on an external DHCP daemon.
//!
//! ## Features
//!
//! - DISCOVER/OFFER/REQUEST/ACK/NAK plus RELEASE, DECLINE, and INFORM
//! - Two-state lease table (OFFERED/BOUND) with lazy expiry
//! - Static MAC-to-IP reservations from a line-oriented file
//! - Declined-address blacklisting
//! - Clean shutdown that interrupts the receive loop
//! - Alternate supervisor mode that drives an external dnsmasq instead
//!
//! ## Quick Start
//!
//! ```no_run
//! use leaselet::{Config, DhcpServer};
//!
//! #[tokio::main]
//! async fn main() -> leaselet::Result<()> {
//!     let config = Config::load_or_create("config.json")?;
//!     let server = DhcpServer::new(config)?;
//!     server.run().await
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`Config`] - server configuration (pool bounds, lease TTL, bind endpoint)
//! - [`DhcpMessage`] - packet decoding and encoding
//! - [`DhcpOption`] - the option registry
//! - [`LeasePool`] - address allocation and expiry
//! - [`Engine`] - the exchange state machine
//! - [`DhcpServer`] - the UDP server loop
//! - [`DnsmasqSupervisor`] - the external-daemon alternate mode

pub mod config;
pub mod daemon;
pub mod engine;
pub mod error;
pub mod lease;
pub mod options;
pub mod packet;
pub mod server;

pub use config::{Config, StaticLease};
pub use daemon::DnsmasqSupervisor;
pub use engine::Engine;
pub use error::{Error, Result};
pub use lease::{Lease, LeasePool, LeaseState, MacAddr};
pub use options::{DhcpOption, MessageType};
pub use packet::DhcpMessage;
pub use server::{DhcpServer, ShutdownHandle};
