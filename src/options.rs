//! DHCP options as defined in RFC 2132.
//!
//! Each option is a TLV: code (1 byte), length (1 byte), data. This module
//! implements the small registry the server emits and consumes; anything
//! else is preserved opaquely as [`DhcpOption::Unknown`] so packets
//! round-trip without loss.
//!
//! # References
//!
//! - RFC 2132: DHCP Options and BOOTP Vendor Extensions

use std::net::Ipv4Addr;

use crate::error::{Error, Result};

/// DHCP option codes handled by this server.
///
/// Only codes in the registry are defined; unknown codes are carried via
/// [`DhcpOption::Unknown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OptionCode {
    /// Padding (no operation). Skippable filler between options.
    Pad = 0,
    /// Subnet mask (RFC 2132 §3.3).
    SubnetMask = 1,
    /// Router/gateway address (RFC 2132 §3.5).
    Router = 3,
    /// DNS server address (RFC 2132 §3.8).
    DomainNameServer = 6,
    /// Requested IP address (RFC 2132 §9.1).
    RequestedIpAddress = 50,
    /// IP address lease time in seconds (RFC 2132 §9.2).
    IpAddressLeaseTime = 51,
    /// DHCP message type (RFC 2132 §9.6).
    MessageType = 53,
    /// Server identifier (RFC 2132 §9.7).
    ServerIdentifier = 54,
    /// Parameter request list (RFC 2132 §9.8).
    ParameterRequestList = 55,
    /// End of options marker.
    End = 255,
}

impl TryFrom<u8> for OptionCode {
    type Error = u8;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Pad),
            1 => Ok(Self::SubnetMask),
            3 => Ok(Self::Router),
            6 => Ok(Self::DomainNameServer),
            50 => Ok(Self::RequestedIpAddress),
            51 => Ok(Self::IpAddressLeaseTime),
            53 => Ok(Self::MessageType),
            54 => Ok(Self::ServerIdentifier),
            55 => Ok(Self::ParameterRequestList),
            255 => Ok(Self::End),
            other => Err(other),
        }
    }
}

/// DHCP message types (Option 53) as defined in RFC 2132 §9.6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    /// Client broadcast to locate servers.
    Discover = 1,
    /// Server response to DISCOVER with an IP offer.
    Offer = 2,
    /// Client request for offered parameters.
    Request = 3,
    /// Client indicates the address is already in use.
    Decline = 4,
    /// Server acknowledgement with configuration.
    Ack = 5,
    /// Server negative acknowledgement.
    Nak = 6,
    /// Client releases its IP address.
    Release = 7,
    /// Client requests configuration without IP allocation.
    Inform = 8,
}

impl TryFrom<u8> for MessageType {
    type Error = u8;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Discover),
            2 => Ok(Self::Offer),
            3 => Ok(Self::Request),
            4 => Ok(Self::Decline),
            5 => Ok(Self::Ack),
            6 => Ok(Self::Nak),
            7 => Ok(Self::Release),
            8 => Ok(Self::Inform),
            other => Err(other),
        }
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Discover => write!(f, "DISCOVER"),
            Self::Offer => write!(f, "OFFER"),
            Self::Request => write!(f, "REQUEST"),
            Self::Decline => write!(f, "DECLINE"),
            Self::Ack => write!(f, "ACK"),
            Self::Nak => write!(f, "NAK"),
            Self::Release => write!(f, "RELEASE"),
            Self::Inform => write!(f, "INFORM"),
        }
    }
}

/// A parsed DHCP option.
///
/// Each variant corresponds to one registry code. Unknown options keep
/// their raw code and bytes so they survive an encode round-trip, but are
/// never interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DhcpOption {
    /// Subnet mask (Option 1).
    SubnetMask(Ipv4Addr),
    /// Default gateway (Option 3). This server hands out a single router.
    Router(Ipv4Addr),
    /// DNS server (Option 6). This server hands out a single address.
    DomainNameServer(Ipv4Addr),
    /// Client's requested IP address (Option 50).
    RequestedIpAddress(Ipv4Addr),
    /// Lease time in seconds (Option 51).
    IpAddressLeaseTime(u32),
    /// DHCP message type (Option 53).
    MessageType(MessageType),
    /// Server identifier - IP of the DHCP server (Option 54).
    ServerIdentifier(Ipv4Addr),
    /// List of option codes the client wants (Option 55). Read, not
    /// interpreted beyond presence.
    ParameterRequestList(Vec<u8>),
    /// Unknown option with raw code and data, preserved for round-trip.
    Unknown(u8, Vec<u8>),
}

fn ipv4_option(data: &[u8], what: &str) -> Result<Ipv4Addr> {
    if data.len() != 4 {
        return Err(Error::Decode(format!(
            "{} option must be 4 bytes, got {}",
            what,
            data.len()
        )));
    }
    Ok(Ipv4Addr::new(data[0], data[1], data[2], data[3]))
}

impl DhcpOption {
    /// Returns the RFC 2132 option code for this option.
    pub fn code(&self) -> u8 {
        match self {
            Self::SubnetMask(_) => OptionCode::SubnetMask as u8,
            Self::Router(_) => OptionCode::Router as u8,
            Self::DomainNameServer(_) => OptionCode::DomainNameServer as u8,
            Self::RequestedIpAddress(_) => OptionCode::RequestedIpAddress as u8,
            Self::IpAddressLeaseTime(_) => OptionCode::IpAddressLeaseTime as u8,
            Self::MessageType(_) => OptionCode::MessageType as u8,
            Self::ServerIdentifier(_) => OptionCode::ServerIdentifier as u8,
            Self::ParameterRequestList(_) => OptionCode::ParameterRequestList as u8,
            Self::Unknown(code, _) => *code,
        }
    }

    /// Parses a DHCP option from its code and raw data.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decode`] if the data length is invalid for a known
    /// option (e.g. a subnet mask must be exactly 4 bytes). Unknown codes
    /// never fail; they pass through opaque.
    pub fn parse(code: u8, data: &[u8]) -> Result<Self> {
        match OptionCode::try_from(code) {
            Ok(OptionCode::SubnetMask) => Ok(Self::SubnetMask(ipv4_option(data, "subnet mask")?)),
            Ok(OptionCode::Router) => Ok(Self::Router(ipv4_option(data, "router")?)),
            Ok(OptionCode::DomainNameServer) => {
                Ok(Self::DomainNameServer(ipv4_option(data, "DNS server")?))
            }
            Ok(OptionCode::RequestedIpAddress) => Ok(Self::RequestedIpAddress(ipv4_option(
                data,
                "requested IP address",
            )?)),
            Ok(OptionCode::IpAddressLeaseTime) => {
                if data.len() != 4 {
                    return Err(Error::Decode(format!(
                        "lease time option must be 4 bytes, got {}",
                        data.len()
                    )));
                }
                let seconds = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
                Ok(Self::IpAddressLeaseTime(seconds))
            }
            Ok(OptionCode::MessageType) => {
                if data.len() != 1 {
                    return Err(Error::Decode(format!(
                        "message type option must be 1 byte, got {}",
                        data.len()
                    )));
                }
                let message_type = MessageType::try_from(data[0])
                    .map_err(|value| Error::Decode(format!("unknown message type: {}", value)))?;
                Ok(Self::MessageType(message_type))
            }
            Ok(OptionCode::ServerIdentifier) => {
                Ok(Self::ServerIdentifier(ipv4_option(data, "server identifier")?))
            }
            Ok(OptionCode::ParameterRequestList) => Ok(Self::ParameterRequestList(data.to_vec())),
            Ok(OptionCode::Pad) | Ok(OptionCode::End) => Err(Error::Decode(
                "pad/end must not be parsed as options".to_string(),
            )),
            Err(unknown_code) => Ok(Self::Unknown(unknown_code, data.to_vec())),
        }
    }

    /// Encodes the option to its wire format (code + length + data).
    pub fn encode(&self) -> Vec<u8> {
        fn ipv4(code: OptionCode, addr: &Ipv4Addr) -> Vec<u8> {
            let mut result = vec![code as u8, 4];
            result.extend_from_slice(&addr.octets());
            result
        }

        match self {
            Self::SubnetMask(addr) => ipv4(OptionCode::SubnetMask, addr),
            Self::Router(addr) => ipv4(OptionCode::Router, addr),
            Self::DomainNameServer(addr) => ipv4(OptionCode::DomainNameServer, addr),
            Self::RequestedIpAddress(addr) => ipv4(OptionCode::RequestedIpAddress, addr),
            Self::IpAddressLeaseTime(seconds) => {
                let mut result = vec![OptionCode::IpAddressLeaseTime as u8, 4];
                result.extend_from_slice(&seconds.to_be_bytes());
                result
            }
            Self::MessageType(message_type) => {
                vec![OptionCode::MessageType as u8, 1, *message_type as u8]
            }
            Self::ServerIdentifier(addr) => ipv4(OptionCode::ServerIdentifier, addr),
            Self::ParameterRequestList(codes) => {
                let len = codes.len().min(255);
                let mut result = vec![OptionCode::ParameterRequestList as u8, len as u8];
                result.extend_from_slice(&codes[..len]);
                result
            }
            Self::Unknown(code, data) => {
                let len = data.len().min(255);
                let mut result = vec![*code, len as u8];
                result.extend_from_slice(&data[..len]);
                result
            }
        }
    }
}
