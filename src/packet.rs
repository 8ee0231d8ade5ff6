//! DHCP packet decoding and encoding per RFC 2131.
//!
//! A DHCP packet is a fixed 236-byte header followed by a 4-byte magic
//! cookie and variable-length TLV options. This module decodes incoming
//! datagrams into [`DhcpMessage`] and encodes replies back to bytes.
//!
//! # Packet Structure
//!
//! ```text
//! 0                   1                   2                   3
//! 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |     op (1)    |   htype (1)   |   hlen (1)    |   hops (1)    |
//! +---------------+---------------+---------------+---------------+
//! |                            xid (4)                            |
//! +-------------------------------+-------------------------------+
//! |           secs (2)            |           flags (2)           |
//! +-------------------------------+-------------------------------+
//! |                          ciaddr (4)                           |
//! +---------------------------------------------------------------+
//! |                          yiaddr (4)                           |
//! +---------------------------------------------------------------+
//! |                          siaddr (4)                           |
//! +---------------------------------------------------------------+
//! |                          giaddr (4)                           |
//! +---------------------------------------------------------------+
//! |                          chaddr (16)                          |
//! +---------------------------------------------------------------+
//! |                          sname (64)                           |
//! +---------------------------------------------------------------+
//! |                          file (128)                           |
//! +---------------------------------------------------------------+
//! |                    magic cookie (4) = 99.130.83.99            |
//! +---------------------------------------------------------------+
//! |                          options (variable)                   |
//! +---------------------------------------------------------------+
//! ```
//!
//! All multi-byte integers are big-endian. Decoding is lossless: unknown
//! options are retained opaquely and survive a re-encode.

use std::net::Ipv4Addr;

use crate::error::{Error, Result};
use crate::lease::MacAddr;
use crate::options::{DhcpOption, MessageType, OptionCode};

/// DHCP magic cookie that identifies DHCP packets (vs plain BOOTP).
pub const DHCP_MAGIC_COOKIE: [u8; 4] = [99, 130, 83, 99];

const CHADDR_OFFSET: usize = 28;
const CHADDR_SIZE: usize = 16;
const SNAME_OFFSET: usize = CHADDR_OFFSET + CHADDR_SIZE;
const SNAME_SIZE: usize = 64;
const FILE_OFFSET: usize = SNAME_OFFSET + SNAME_SIZE;
const FILE_SIZE: usize = 128;
const MAGIC_COOKIE_OFFSET: usize = FILE_OFFSET + FILE_SIZE;

/// Size of the fixed header including the magic cookie.
const FIXED_HEADER_SIZE: usize = MAGIC_COOKIE_OFFSET + DHCP_MAGIC_COOKIE.len();

/// Minimum encoded packet size per RFC 2131 §2.
///
/// DHCP datagrams are padded to 300 bytes for compatibility with BOOTP
/// relay agents.
const MIN_PACKET_SIZE: usize = 300;

/// Initial capacity for the encode buffer (RFC 791 minimum MTU).
const ENCODE_CAPACITY: usize = 576;

/// BOOTP/DHCP operation code for client requests.
pub const BOOTREQUEST: u8 = 1;

/// BOOTP/DHCP operation code for server replies.
pub const BOOTREPLY: u8 = 2;

/// Hardware type for Ethernet.
pub const HTYPE_ETHERNET: u8 = 1;

/// Hardware address length for Ethernet (6 bytes).
pub const HLEN_ETHERNET: u8 = 6;

/// Broadcast flag bit in the `flags` field.
const FLAG_BROADCAST: u16 = 0x8000;

/// A decoded DHCP message.
///
/// Represents both client requests and server replies. Constructed fresh
/// per received datagram via [`decode`](Self::decode) and never mutated
/// afterwards; replies are built with [`reply_to`](Self::reply_to).
#[derive(Debug, Clone)]
pub struct DhcpMessage {
    /// Operation code: [`BOOTREQUEST`] (1) or [`BOOTREPLY`] (2).
    pub op: u8,

    /// Hardware address type. [`HTYPE_ETHERNET`] (1) for Ethernet.
    pub htype: u8,

    /// Hardware address length. [`HLEN_ETHERNET`] (6) for Ethernet.
    pub hlen: u8,

    /// Hop count, incremented by relay agents.
    pub hops: u8,

    /// Transaction ID chosen by the client, echoed verbatim in replies.
    pub xid: u32,

    /// Seconds elapsed since the client began address acquisition.
    pub secs: u16,

    /// Flags. Bit 15 (0x8000) = broadcast flag.
    pub flags: u16,

    /// Client IP address (set by the client when already configured).
    pub ciaddr: Ipv4Addr,

    /// "Your" IP address - the address being assigned to the client.
    pub yiaddr: Ipv4Addr,

    /// Server IP address (next server, in BOOTP terms).
    pub siaddr: Ipv4Addr,

    /// Gateway IP address - set by relay agents.
    pub giaddr: Ipv4Addr,

    /// Client hardware address; the first `hlen` bytes are significant.
    pub chaddr: [u8; 16],

    /// Server host name field (not interpreted).
    pub sname: [u8; 64],

    /// Boot file name field (not interpreted).
    pub file: [u8; 128],

    /// DHCP options in wire order.
    pub options: Vec<DhcpOption>,
}

impl DhcpMessage {
    /// Decodes a DHCP message from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decode`] if:
    /// - the packet is shorter than 240 bytes (fixed header + cookie)
    /// - the magic cookie is not 99.130.83.99
    /// - an option's declared length overruns the buffer
    ///
    /// Unknown option codes never fail; they are retained opaquely.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < FIXED_HEADER_SIZE {
            return Err(Error::Decode(format!(
                "packet too short: {} bytes (minimum {})",
                data.len(),
                FIXED_HEADER_SIZE
            )));
        }

        let cookie = &data[MAGIC_COOKIE_OFFSET..FIXED_HEADER_SIZE];
        if cookie != DHCP_MAGIC_COOKIE {
            return Err(Error::Decode("bad magic cookie".to_string()));
        }

        let op = data[0];
        let htype = data[1];
        let hlen = data[2];
        let hops = data[3];

        let xid = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
        let secs = u16::from_be_bytes([data[8], data[9]]);
        let flags = u16::from_be_bytes([data[10], data[11]]);

        let ciaddr = Ipv4Addr::new(data[12], data[13], data[14], data[15]);
        let yiaddr = Ipv4Addr::new(data[16], data[17], data[18], data[19]);
        let siaddr = Ipv4Addr::new(data[20], data[21], data[22], data[23]);
        let giaddr = Ipv4Addr::new(data[24], data[25], data[26], data[27]);

        let mut chaddr = [0u8; 16];
        chaddr.copy_from_slice(&data[CHADDR_OFFSET..CHADDR_OFFSET + CHADDR_SIZE]);

        let mut sname = [0u8; 64];
        sname.copy_from_slice(&data[SNAME_OFFSET..SNAME_OFFSET + SNAME_SIZE]);

        let mut file = [0u8; 128];
        file.copy_from_slice(&data[FILE_OFFSET..FILE_OFFSET + FILE_SIZE]);

        let options = Self::decode_options(&data[FIXED_HEADER_SIZE..])?;

        Ok(Self {
            op,
            htype,
            hlen,
            hops,
            xid,
            secs,
            flags,
            ciaddr,
            yiaddr,
            siaddr,
            giaddr,
            chaddr,
            sname,
            file,
            options,
        })
    }

    fn decode_options(data: &[u8]) -> Result<Vec<DhcpOption>> {
        let mut options = Vec::new();
        let mut index = 0;

        while index < data.len() {
            let code = data[index];

            if code == OptionCode::Pad as u8 {
                index += 1;
                continue;
            }

            if code == OptionCode::End as u8 {
                break;
            }

            if index + 1 >= data.len() {
                return Err(Error::Decode("option length missing".to_string()));
            }

            let length = data[index + 1] as usize;

            if index + 2 + length > data.len() {
                return Err(Error::Decode("option data truncated".to_string()));
            }

            let option = DhcpOption::parse(code, &data[index + 2..index + 2 + length])?;
            options.push(option);

            index += 2 + length;
        }

        Ok(options)
    }

    /// Encodes the message to bytes for transmission.
    ///
    /// Fixed fields are written verbatim (unset ones are zero-filled by
    /// construction), followed by the magic cookie, each option in TLV
    /// form, and the End marker. The buffer is padded to 300 bytes.
    pub fn encode(&self) -> Vec<u8> {
        let mut packet = Vec::with_capacity(ENCODE_CAPACITY);

        packet.push(self.op);
        packet.push(self.htype);
        packet.push(self.hlen);
        packet.push(self.hops);

        packet.extend_from_slice(&self.xid.to_be_bytes());
        packet.extend_from_slice(&self.secs.to_be_bytes());
        packet.extend_from_slice(&self.flags.to_be_bytes());

        packet.extend_from_slice(&self.ciaddr.octets());
        packet.extend_from_slice(&self.yiaddr.octets());
        packet.extend_from_slice(&self.siaddr.octets());
        packet.extend_from_slice(&self.giaddr.octets());

        packet.extend_from_slice(&self.chaddr);
        packet.extend_from_slice(&self.sname);
        packet.extend_from_slice(&self.file);

        packet.extend_from_slice(&DHCP_MAGIC_COOKIE);

        for option in &self.options {
            packet.extend_from_slice(&option.encode());
        }

        packet.push(OptionCode::End as u8);

        while packet.len() < MIN_PACKET_SIZE {
            packet.push(0);
        }

        packet
    }

    /// Returns the DHCP message type (Option 53) if present.
    ///
    /// Messages without it (plain BOOTP traffic) are discarded by the
    /// exchange engine.
    pub fn message_type(&self) -> Option<MessageType> {
        self.options.iter().find_map(|option| match option {
            DhcpOption::MessageType(message_type) => Some(*message_type),
            _ => None,
        })
    }

    /// Returns the requested IP address (Option 50) if present.
    pub fn requested_ip(&self) -> Option<Ipv4Addr> {
        self.options.iter().find_map(|option| match option {
            DhcpOption::RequestedIpAddress(ip) => Some(*ip),
            _ => None,
        })
    }

    /// Returns the server identifier (Option 54) if present.
    ///
    /// Clients include this in REQUEST to indicate which server's offer
    /// they are accepting.
    pub fn server_identifier(&self) -> Option<Ipv4Addr> {
        self.options.iter().find_map(|option| match option {
            DhcpOption::ServerIdentifier(ip) => Some(*ip),
            _ => None,
        })
    }

    /// Returns the parameter request list (Option 55) if present.
    pub fn parameter_request_list(&self) -> Option<&[u8]> {
        self.options.iter().find_map(|option| match option {
            DhcpOption::ParameterRequestList(codes) => Some(codes.as_slice()),
            _ => None,
        })
    }

    /// Returns the client hardware address as a [`MacAddr`].
    ///
    /// Only the first six chaddr bytes are significant for Ethernet; other
    /// hardware types are treated the same way since the lease key is
    /// defined as a 6-byte address.
    pub fn mac(&self) -> MacAddr {
        let mut mac = [0u8; 6];
        mac.copy_from_slice(&self.chaddr[..6]);
        MacAddr::new(mac)
    }

    /// Returns true if the broadcast flag (bit 15) is set.
    ///
    /// When set, replies must be broadcast instead of unicast.
    pub fn is_broadcast(&self) -> bool {
        (self.flags & FLAG_BROADCAST) != 0
    }

    /// Creates a reply message to a client request.
    ///
    /// The message type is placed first in the option list. The
    /// transaction ID, flags, giaddr, chaddr, and hardware type/length
    /// are copied from the request so the client can correlate the reply.
    pub fn reply_to(
        request: &DhcpMessage,
        message_type: MessageType,
        yiaddr: Ipv4Addr,
        server_ip: Ipv4Addr,
        options: Vec<DhcpOption>,
    ) -> Self {
        let mut all_options = vec![DhcpOption::MessageType(message_type)];
        all_options.extend(options);

        Self {
            op: BOOTREPLY,
            htype: request.htype,
            hlen: request.hlen,
            hops: 0,
            xid: request.xid,
            secs: 0,
            flags: request.flags,
            ciaddr: Ipv4Addr::UNSPECIFIED,
            yiaddr,
            siaddr: server_ip,
            giaddr: request.giaddr,
            chaddr: request.chaddr,
            sname: [0u8; 64],
            file: [0u8; 128],
            options: all_options,
        }
    }
}
