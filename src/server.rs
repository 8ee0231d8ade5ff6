//! UDP server loop.
//!
//! One worker owns the socket and processes datagrams sequentially:
//! receive, decode, run the exchange engine under the pool lock, encode,
//! send. DHCP exchanges are short and infrequent, so a synchronous cycle
//! avoids lease-table races without giving anything up.
//!
//! The receive call is the loop's only suspension point. A
//! [`ShutdownHandle`] interrupts it through a watch channel so the loop
//! exits promptly instead of hanging in `recv_from` forever.
//!
//! Per-packet errors (malformed datagrams, send failures) are logged and
//! the loop moves on; one bad packet never terminates the service.

use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;
use std::time::{Duration, Instant};

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::{Mutex, watch};
use tracing::{error, info, warn};

use crate::config::Config;
use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::lease::LeasePool;
use crate::options::MessageType;
use crate::packet::DhcpMessage;

/// Port replies are unicast to relay agents on.
const DHCP_SERVER_PORT: u16 = 67;

/// Port clients listen on.
const DHCP_CLIENT_PORT: u16 = 68;

/// Receive buffer, sized for a full Ethernet frame.
const RECV_BUFFER_SIZE: usize = 1500;

/// The DHCP server: socket, exchange engine, and the lock-guarded lease
/// table.
pub struct DhcpServer {
    config: Arc<Config>,
    engine: Engine,
    pool: Mutex<LeasePool>,
    socket: UdpSocket,
    shutdown: watch::Sender<bool>,
}

/// Requests the server loop to stop.
///
/// Cloneable and cheap; typically wired to a ctrl-c handler.
#[derive(Clone)]
pub struct ShutdownHandle(watch::Sender<bool>);

impl ShutdownHandle {
    /// Signals the loop to exit at its next scheduling point.
    pub fn shutdown(&self) {
        let _ = self.0.send(true);
    }
}

impl DhcpServer {
    /// Builds the server: validates configuration, loads static
    /// reservations, and binds the socket.
    ///
    /// # Errors
    ///
    /// Configuration problems ([`Error::InvalidConfig`]) and socket
    /// failures ([`Error::Socket`]) are fatal here, before any datagram
    /// is served.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let reservations: Vec<_> = config
            .load_static_leases()?
            .into_iter()
            .map(|lease| (lease.mac, lease.ip))
            .collect();

        let config = Arc::new(config);
        let pool = LeasePool::new(
            config.pool_start,
            config.pool_end,
            Duration::from_secs(config.lease_ttl as u64),
            reservations,
        );

        let socket = Self::create_socket(&config)?;
        let (shutdown, _) = watch::channel(false);

        info!(
            "DHCP server on {}:{}, pool {} - {} ({} addresses), lease {}s",
            config.bind_address,
            config.bind_port,
            config.pool_start,
            config.pool_end,
            config.pool_size(),
            config.lease_ttl
        );

        Ok(Self {
            engine: Engine::new(Arc::clone(&config)),
            config,
            pool: Mutex::new(pool),
            socket,
            shutdown,
        })
    }

    fn create_socket(config: &Config) -> Result<UdpSocket> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
            .map_err(|error| Error::Socket(format!("failed to create socket: {}", error)))?;

        socket
            .set_reuse_address(true)
            .map_err(|error| Error::Socket(format!("failed to set SO_REUSEADDR: {}", error)))?;

        socket
            .set_broadcast(true)
            .map_err(|error| Error::Socket(format!("failed to set SO_BROADCAST: {}", error)))?;

        socket
            .set_nonblocking(true)
            .map_err(|error| Error::Socket(format!("failed to set non-blocking: {}", error)))?;

        let bind_addr = SocketAddrV4::new(config.bind_address, config.bind_port);
        socket
            .bind(&bind_addr.into())
            .map_err(|error| Error::Socket(format!("failed to bind to {}: {}", bind_addr, error)))?;

        let std_socket: std::net::UdpSocket = socket.into();
        UdpSocket::from_std(std_socket)
            .map_err(|error| Error::Socket(format!("failed to convert to tokio socket: {}", error)))
    }

    /// Returns a handle that stops [`run`](Self::run).
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle(self.shutdown.clone())
    }

    /// Runs the receive/dispatch/reply loop until shutdown is signaled.
    pub async fn run(&self) -> Result<()> {
        let mut shutdown = self.shutdown.subscribe();
        if *shutdown.borrow_and_update() {
            return Ok(());
        }

        let mut buffer = [0u8; RECV_BUFFER_SIZE];

        info!("DHCP server ready and listening");

        loop {
            tokio::select! {
                received = self.socket.recv_from(&mut buffer) => match received {
                    Ok((size, source)) => {
                        if let Err(problem) = self.process_datagram(&buffer[..size], source).await {
                            warn!("dropping packet from {}: {}", source, problem);
                        }
                    }
                    Err(problem) => {
                        error!("error receiving packet: {}", problem);
                    }
                },
                _ = shutdown.changed() => {
                    info!("shutdown signal received, stopping server loop");
                    return Ok(());
                }
            }
        }
    }

    async fn process_datagram(&self, data: &[u8], source: SocketAddr) -> Result<()> {
        let message = DhcpMessage::decode(data)?;

        let reply = {
            let mut pool = self.pool.lock().await;
            self.engine.handle(&mut pool, &message, Instant::now())
        };

        if let Some(reply) = reply {
            let destination = Self::reply_destination(&reply, &message);
            self.socket.send_to(&reply.encode(), destination).await?;
        } else {
            tracing::debug!("no reply for datagram from {}", source);
        }

        Ok(())
    }

    /// Chooses where a reply goes.
    ///
    /// Relayed requests (giaddr set) go back to the relay on the server
    /// port. NAKs, broadcast-flagged requests, and clients without a
    /// configured address are broadcast; everything else is unicast to
    /// the client's address on the client port.
    fn reply_destination(reply: &DhcpMessage, request: &DhcpMessage) -> SocketAddr {
        let is_nak = reply.message_type() == Some(MessageType::Nak);

        if request.giaddr != Ipv4Addr::UNSPECIFIED {
            SocketAddr::new(IpAddr::V4(request.giaddr), DHCP_SERVER_PORT)
        } else if is_nak || request.is_broadcast() || request.ciaddr == Ipv4Addr::UNSPECIFIED {
            SocketAddr::new(IpAddr::V4(Ipv4Addr::BROADCAST), DHCP_CLIENT_PORT)
        } else {
            SocketAddr::new(IpAddr::V4(request.ciaddr), DHCP_CLIENT_PORT)
        }
    }

    /// The active configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }
}
