//! DHCP message codec per RFC 2131.
//!
//! A DHCP message is a fixed 236-byte header followed by a 4-byte magic
//! cookie and a variable-length option stream. This module decodes
//! datagrams into [`DhcpMessage`] values and encodes responses back to
//! wire format.
//!
//! # Message Structure
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
//! All multi-byte integers and addresses are network byte order.
//!
//! # References
//!
//! - RFC 2131: Dynamic Host Configuration Protocol

use std::net::Ipv4Addr;

use macaddr::MacAddr6;

use crate::error::{Error, Result};
use crate::options::{DhcpOptions, MessageType, OptionCode};

/// DHCP magic cookie that opens the option section.
///
/// The four bytes read as the dotted quad 99.130.83.99, a protocol
/// constant rather than a routable address.
pub const MAGIC_COOKIE: [u8; 4] = [99, 130, 83, 99];

/// Offset of the 16-byte hardware address field.
const CHADDR_OFFSET: usize = 28;
const CHADDR_SIZE: usize = 16;

/// Offset of the null-terminated server host name field.
const SNAME_OFFSET: usize = CHADDR_OFFSET + CHADDR_SIZE;
const SNAME_SIZE: usize = 64;

/// Offset of the null-terminated boot file name field.
const FILE_OFFSET: usize = SNAME_OFFSET + SNAME_SIZE;
const FILE_SIZE: usize = 128;

/// Offset of the magic cookie; the fixed header ends here.
const MAGIC_COOKIE_OFFSET: usize = FILE_OFFSET + FILE_SIZE;

/// Offset where the option stream begins.
const OPTIONS_OFFSET: usize = MAGIC_COOKIE_OFFSET + MAGIC_COOKIE.len();

/// Smallest well-formed message: fixed header, magic cookie, and at
/// least a message-type option followed by the End marker.
pub const MIN_MESSAGE_SIZE: usize = OPTIONS_OFFSET + 4;

/// Encoded messages are padded to the classic BOOTP minimum.
const MIN_ENCODED_SIZE: usize = 300;

/// Initial capacity for the encode buffer.
///
/// 576 bytes is the minimum MTU every host must accept per RFC 791.
const ENCODE_CAPACITY: usize = 576;

/// BOOTP/DHCP operation code for client requests.
pub const BOOTREQUEST: u8 = 1;

/// BOOTP/DHCP operation code for server replies.
pub const BOOTREPLY: u8 = 2;

/// Hardware type for Ethernet.
pub const HTYPE_ETHERNET: u8 = 1;

/// Hardware address length for Ethernet (6 bytes).
pub const HLEN_ETHERNET: u8 = 6;

/// One decoded DHCP message, request or reply.
///
/// Use [`decode`](Self::decode) for datagrams off the wire and
/// [`reply_to`](Self::reply_to) to start a response from a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DhcpMessage {
    /// Operation code: [`BOOTREQUEST`] (1) or [`BOOTREPLY`] (2).
    pub op: u8,

    /// Hardware address type, [`HTYPE_ETHERNET`] (1) in practice.
    ///
    /// Carried verbatim; the server never rejects other types.
    pub htype: u8,

    /// Hardware address length, [`HLEN_ETHERNET`] (6) in practice.
    pub hlen: u8,

    /// Hop count, incremented by relay agents.
    pub hops: u8,

    /// Transaction id chosen by the client, echoed in replies.
    pub xid: u32,

    /// Seconds elapsed since the client began acquiring an address.
    pub secs: u16,

    /// Flags. Bit 15 (0x8000) is the broadcast flag.
    pub flags: u16,

    /// Client IP address (set by clients renewing an address).
    pub ciaddr: Ipv4Addr,

    /// "Your" IP address: the address being offered or assigned.
    pub yiaddr: Ipv4Addr,

    /// Next-server IP address.
    pub siaddr: Ipv4Addr,

    /// Relay agent address, zero when the client is on-link.
    pub giaddr: Ipv4Addr,

    /// Client hardware address. Padded to 16 bytes on the wire.
    pub chaddr: MacAddr6,

    /// Server host name, null-terminated in its 64-byte field.
    pub sname: String,

    /// Boot file name, null-terminated in its 128-byte field.
    pub file: String,

    /// The option table.
    pub options: DhcpOptions,
}

impl DhcpMessage {
    /// Decodes a DHCP message from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidMessage`] if:
    /// - The datagram is shorter than [`MIN_MESSAGE_SIZE`] (244 bytes)
    /// - The magic cookie is not 99.130.83.99
    /// - The option stream is malformed (truncated length or data)
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < MIN_MESSAGE_SIZE {
            return Err(Error::InvalidMessage(format!(
                "Message too short: {} bytes (minimum {})",
                data.len(),
                MIN_MESSAGE_SIZE
            )));
        }

        let magic_cookie_end = MAGIC_COOKIE_OFFSET + MAGIC_COOKIE.len();
        if data[MAGIC_COOKIE_OFFSET..magic_cookie_end] != MAGIC_COOKIE {
            return Err(Error::InvalidMessage("Invalid magic cookie".to_string()));
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

        let mut mac = [0u8; 6];
        mac.copy_from_slice(&data[CHADDR_OFFSET..CHADDR_OFFSET + 6]);
        let chaddr = MacAddr6::from(mac);

        let sname = read_fixed_string(&data[SNAME_OFFSET..SNAME_OFFSET + SNAME_SIZE]);
        let file = read_fixed_string(&data[FILE_OFFSET..FILE_OFFSET + FILE_SIZE]);

        let options = DhcpOptions::decode(&data[OPTIONS_OFFSET..])?;

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

    /// Encodes the message for transmission.
    ///
    /// The buffer is at least 300 bytes, padded with zeros past the End
    /// marker per classic BOOTP expectations.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Encode`] if the message-type option is not set,
    /// or if `sname`/`file` do not fit their fixed-width fields with a
    /// terminating null.
    pub fn encode(&self) -> Result<Vec<u8>> {
        if !self.options.contains(OptionCode::MessageType) {
            return Err(Error::Encode(
                "message-type option is not set".to_string(),
            ));
        }

        let mut buffer = Vec::with_capacity(ENCODE_CAPACITY);

        buffer.push(self.op);
        buffer.push(self.htype);
        buffer.push(self.hlen);
        buffer.push(self.hops);

        buffer.extend_from_slice(&self.xid.to_be_bytes());
        buffer.extend_from_slice(&self.secs.to_be_bytes());
        buffer.extend_from_slice(&self.flags.to_be_bytes());

        buffer.extend_from_slice(&self.ciaddr.octets());
        buffer.extend_from_slice(&self.yiaddr.octets());
        buffer.extend_from_slice(&self.siaddr.octets());
        buffer.extend_from_slice(&self.giaddr.octets());

        buffer.extend_from_slice(self.chaddr.as_bytes());
        buffer.resize(CHADDR_OFFSET + CHADDR_SIZE, 0);

        write_fixed_string(&mut buffer, &self.sname, SNAME_SIZE, "sname")?;
        write_fixed_string(&mut buffer, &self.file, FILE_SIZE, "file")?;

        buffer.extend_from_slice(&MAGIC_COOKIE);

        self.options.encode_into(&mut buffer);

        if buffer.len() < MIN_ENCODED_SIZE {
            buffer.resize(MIN_ENCODED_SIZE, 0);
        }

        Ok(buffer)
    }

    /// Starts a reply message from a client request.
    ///
    /// Works for OFFER, ACK, and NAK; the message type is set in the
    /// fresh option table. The caller fills in `yiaddr`, `ciaddr`, and
    /// any further options.
    ///
    /// # Preserved Fields
    ///
    /// Copied from the request: `xid`, `htype`, `hlen`, `flags`,
    /// `giaddr`, and `chaddr`. Everything else starts zeroed.
    pub fn reply_to(request: &DhcpMessage, message_type: MessageType) -> Self {
        let mut options = DhcpOptions::new();
        options.set_message_type(message_type);

        Self {
            op: BOOTREPLY,
            htype: request.htype,
            hlen: request.hlen,
            hops: 0,
            xid: request.xid,
            secs: 0,
            flags: request.flags,
            ciaddr: Ipv4Addr::UNSPECIFIED,
            yiaddr: Ipv4Addr::UNSPECIFIED,
            siaddr: Ipv4Addr::UNSPECIFIED,
            giaddr: request.giaddr,
            chaddr: request.chaddr,
            sname: String::new(),
            file: String::new(),
            options,
        }
    }

    /// Returns true if the broadcast flag (bit 15) is set.
    pub fn is_broadcast(&self) -> bool {
        (self.flags & 0x8000) != 0
    }
}

impl std::fmt::Display for DhcpMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.options.message_type() {
            Some(message_type) => write!(f, "[{}]", message_type)?,
            None => write!(f, "[?]")?,
        }
        write!(f, " {} xid {:#010x}", self.chaddr, self.xid)?;
        if !self.ciaddr.is_unspecified() {
            write!(f, " from {}", self.ciaddr)?;
        }
        if !self.yiaddr.is_unspecified() {
            write!(f, " => {}", self.yiaddr)?;
        }
        Ok(())
    }
}

/// Reads a null-terminated string out of a fixed-width header field.
fn read_fixed_string(field: &[u8]) -> String {
    let len = field
        .iter()
        .position(|byte| *byte == 0)
        .unwrap_or(field.len());
    String::from_utf8_lossy(&field[..len]).into_owned()
}

/// Writes a string left-justified into a fixed-width field, zero padded.
fn write_fixed_string(
    buffer: &mut Vec<u8>,
    value: &str,
    width: usize,
    field: &str,
) -> Result<()> {
    let bytes = value.as_bytes();
    if bytes.len() >= width {
        return Err(Error::Encode(format!(
            "{} value of {} bytes does not fit in {} bytes with its terminator",
            field,
            bytes.len(),
            width
        )));
    }

    let start = buffer.len();
    buffer.extend_from_slice(bytes);
    buffer.resize(start + width, 0);
    Ok(())
}
