//! Exchange state machine: inbound message + lease table -> reply.
//!
//! [`Engine::handle`] is the whole protocol surface of the server:
//!
//! | Inbound  | On success        | On failure       |
//! |----------|-------------------|------------------|
//! | DISCOVER | OFFER             | silence          |
//! | REQUEST  | ACK               | NAK              |
//! | RELEASE  | silence           | -                |
//! | DECLINE  | silence           | -                |
//! | INFORM   | ACK (no yiaddr)   | -                |
//!
//! Messages with an op other than BOOTREQUEST or without a message type
//! option are discarded silently; that covers reply echoes and plain
//! BOOTP traffic. The engine holds no socket so the full exchange flow is
//! testable in-process; the server loop owns transport and addressing.

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};

use crate::config::Config;
use crate::lease::{LeasePool, LeaseState};
use crate::options::{DhcpOption, MessageType};
use crate::packet::{BOOTREQUEST, DhcpMessage};

/// The exchange state machine.
///
/// Pure function of the inbound message and the lease-table outcome; all
/// state lives in the [`LeasePool`] passed to [`handle`](Self::handle).
pub struct Engine {
    config: Arc<Config>,
}

impl Engine {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    /// Maps one decoded message to an optional reply, consulting and
    /// mutating the lease table.
    ///
    /// The caller must hold the pool lock for the whole call so each
    /// exchange's read-modify-write is atomic.
    pub fn handle(
        &self,
        pool: &mut LeasePool,
        message: &DhcpMessage,
        now: Instant,
    ) -> Option<DhcpMessage> {
        if message.op != BOOTREQUEST {
            return None;
        }

        let Some(message_type) = message.message_type() else {
            // Reply echoes and plain BOOTP carry no message type.
            return None;
        };

        match message_type {
            MessageType::Discover => self.handle_discover(pool, message, now),
            MessageType::Request => self.handle_request(pool, message, now),
            MessageType::Release => self.handle_release(pool, message),
            MessageType::Decline => self.handle_decline(pool, message, now),
            MessageType::Inform => self.handle_inform(message),
            MessageType::Offer | MessageType::Ack | MessageType::Nak => {
                warn!("ignoring server-to-client {} message", message_type);
                None
            }
        }
    }

    fn handle_discover(
        &self,
        pool: &mut LeasePool,
        message: &DhcpMessage,
        now: Instant,
    ) -> Option<DhcpMessage> {
        let mac = message.mac();

        match pool.get_or_assign(mac, message.requested_ip(), LeaseState::Offered, now) {
            Some(ip) => {
                info!("OFFER {} to {}", ip, mac);
                Some(self.reply(message, MessageType::Offer, ip, self.lease_options()))
            }
            None => {
                // The client retries or times out on its own.
                warn!("pool exhausted, no offer for {}", mac);
                None
            }
        }
    }

    fn handle_request(
        &self,
        pool: &mut LeasePool,
        message: &DhcpMessage,
        now: Instant,
    ) -> Option<DhcpMessage> {
        let mac = message.mac();

        if let Some(server_id) = message.server_identifier()
            && server_id != self.config.server_ip
        {
            info!("REQUEST from {} is for server {}, ignoring", mac, server_id);
            return None;
        }

        let requested = message
            .requested_ip()
            .or((message.ciaddr != Ipv4Addr::UNSPECIFIED).then_some(message.ciaddr));

        match pool.confirm(mac, requested, now) {
            Some(ip) => {
                info!("ACK {} to {} (lease {}s)", ip, mac, self.config.lease_ttl);
                Some(self.reply(message, MessageType::Ack, ip, self.lease_options()))
            }
            None => {
                warn!("NAK to {} (requested {:?})", mac, requested);
                Some(self.reply(
                    message,
                    MessageType::Nak,
                    Ipv4Addr::UNSPECIFIED,
                    vec![DhcpOption::ServerIdentifier(self.config.server_ip)],
                ))
            }
        }
    }

    fn handle_release(&self, pool: &mut LeasePool, message: &DhcpMessage) -> Option<DhcpMessage> {
        let mac = message.mac();
        pool.release(mac);
        info!("RELEASE from {} for {}", mac, message.ciaddr);
        None
    }

    fn handle_decline(
        &self,
        pool: &mut LeasePool,
        message: &DhcpMessage,
        now: Instant,
    ) -> Option<DhcpMessage> {
        let mac = message.mac();

        let declined = message
            .requested_ip()
            .or((message.ciaddr != Ipv4Addr::UNSPECIFIED).then_some(message.ciaddr));

        if let Some(ip) = declined {
            pool.decline(mac, ip, now);
            warn!("DECLINE from {} for {}, address blacklisted", mac, ip);
        } else {
            warn!("DECLINE from {} names no address, ignoring", mac);
        }

        None
    }

    /// INFORM: configuration only, no lease mutation, yiaddr left unset.
    fn handle_inform(&self, message: &DhcpMessage) -> Option<DhcpMessage> {
        let mac = message.mac();
        info!("INFORM reply to {}", mac);
        Some(self.reply(
            message,
            MessageType::Ack,
            Ipv4Addr::UNSPECIFIED,
            self.inform_options(),
        ))
    }

    fn reply(
        &self,
        request: &DhcpMessage,
        message_type: MessageType,
        yiaddr: Ipv4Addr,
        options: Vec<DhcpOption>,
    ) -> DhcpMessage {
        DhcpMessage::reply_to(request, message_type, yiaddr, self.config.server_ip, options)
    }

    /// Options carried by OFFER and ACK replies.
    fn lease_options(&self) -> Vec<DhcpOption> {
        vec![
            DhcpOption::ServerIdentifier(self.config.server_ip),
            DhcpOption::IpAddressLeaseTime(self.config.lease_ttl),
            DhcpOption::SubnetMask(self.config.subnet_mask),
            DhcpOption::Router(self.config.server_ip),
            DhcpOption::DomainNameServer(self.config.dns_server),
        ]
    }

    /// Options carried by an INFORM reply: configuration without a lease
    /// time, since no address is being assigned.
    fn inform_options(&self) -> Vec<DhcpOption> {
        vec![
            DhcpOption::ServerIdentifier(self.config.server_ip),
            DhcpOption::SubnetMask(self.config.subnet_mask),
            DhcpOption::Router(self.config.server_ip),
            DhcpOption::DomainNameServer(self.config.dns_server),
        ]
    }
}
