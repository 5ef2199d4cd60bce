//! DHCP option table and relay-agent sub-options.
//!
//! Options are TLV-encoded: a 1-byte code, a 1-byte length, and
//! variable-length data, terminated by the End (255) marker. Rather than
//! enumerating every RFC 2132 option, [`DhcpOptions`] stores raw bytes
//! keyed by code and interprets them on demand through typed accessors.
//! Only the handful of codes the server itself reads or writes are named
//! in [`OptionCode`]; everything else passes through untouched.
//!
//! # References
//!
//! - RFC 2132: DHCP Options and BOOTP Vendor Extensions
//! - RFC 3046: DHCP Relay Agent Information Option (Option 82)

use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use crate::error::{Error, Result};

/// Option codes interpreted by this server.
///
/// Codes not listed here are still carried by [`DhcpOptions`] as raw
/// bytes; this enum only names the ones the protocol engine touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OptionCode {
    /// Padding (no operation), skipped during decode and never stored.
    Pad = 0,
    /// Subnet mask of the responding network (RFC 2132 §3.3).
    SubnetMask = 1,
    /// Router/gateway address (RFC 2132 §3.5).
    Router = 3,
    /// Address the client asks for or confirms (RFC 2132 §9.1).
    RequestedIpAddress = 50,
    /// Lease time in seconds (RFC 2132 §9.2).
    LeaseTime = 51,
    /// DHCP message type (RFC 2132 §9.6).
    MessageType = 53,
    /// Server identifier (RFC 2132 §9.7).
    ServerIdentifier = 54,
    /// Free-form text, carried on NAKs to explain the refusal (RFC 2132 §9.9).
    Message = 56,
    /// Relay agent information (RFC 3046).
    RelayAgentInfo = 82,
    /// End of options marker.
    End = 255,
}

impl From<OptionCode> for u8 {
    fn from(code: OptionCode) -> Self {
        code as u8
    }
}

/// DHCP message types (Option 53) as defined in RFC 2132 §9.6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    /// Client broadcast to locate servers.
    Discover = 1,
    /// Server answer to DISCOVER carrying an offered address.
    Offer = 2,
    /// Client asks for the offered (or previously held) address.
    Request = 3,
    /// Client reports the offered address is already in use.
    Decline = 4,
    /// Server confirms the address assignment.
    Ack = 5,
    /// Server refuses the request.
    Nak = 6,
    /// Client gives its address back.
    Release = 7,
    /// Client asks for configuration without an address.
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

/// The option table of one DHCP message.
///
/// Maps 8-bit option codes to raw values. Each code appears at most once;
/// setting a code that is already present overwrites it, and a duplicate
/// code on the wire keeps the last value seen. Entries encode in ascending
/// code order, so encoding is deterministic.
///
/// Typed accessors return `None` both when the code is absent and when the
/// stored bytes do not have the width the type requires; an unset code is
/// never reported as a default value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DhcpOptions {
    entries: BTreeMap<u8, Vec<u8>>,
}

impl DhcpOptions {
    /// Creates an empty option table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses an option stream, normally starting at message offset 240.
    ///
    /// Pad bytes are skipped, decoding stops at the End marker or at the
    /// end of the buffer, and a duplicate code overwrites the earlier
    /// value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidMessage`] if an option's length byte is
    /// missing or announces more data than the buffer holds.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut entries = BTreeMap::new();
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
                return Err(Error::InvalidMessage("Option length missing".to_string()));
            }

            let length = data[index + 1] as usize;

            if index + 2 + length > data.len() {
                return Err(Error::InvalidMessage("Option data truncated".to_string()));
            }

            entries.insert(code, data[index + 2..index + 2 + length].to_vec());

            index += 2 + length;
        }

        Ok(Self { entries })
    }

    /// Appends all entries as (code, length, value) triples plus the End
    /// marker.
    pub fn encode_into(&self, buffer: &mut Vec<u8>) {
        for (code, value) in &self.entries {
            buffer.push(*code);
            buffer.push(value.len() as u8);
            buffer.extend_from_slice(value);
        }
        buffer.push(OptionCode::End as u8);
    }

    /// Returns true if no options are set.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of options set.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the code is present.
    pub fn contains(&self, code: impl Into<u8>) -> bool {
        self.entries.contains_key(&code.into())
    }

    /// Raw bytes stored under a code.
    pub fn get(&self, code: impl Into<u8>) -> Option<&[u8]> {
        self.entries.get(&code.into()).map(Vec::as_slice)
    }

    /// Stores raw bytes under a code, replacing any previous value.
    ///
    /// A value must fit the wire format's 1-byte length field.
    pub fn set(&mut self, code: impl Into<u8>, value: Vec<u8>) {
        debug_assert!(value.len() <= u8::MAX as usize);
        self.entries.insert(code.into(), value);
    }

    /// Removes a code, returning its raw value if it was present.
    pub fn remove(&mut self, code: impl Into<u8>) -> Option<Vec<u8>> {
        self.entries.remove(&code.into())
    }

    /// Iterates over (code, raw value) pairs in ascending code order.
    pub fn iter(&self) -> impl Iterator<Item = (u8, &[u8])> {
        self.entries.iter().map(|(code, value)| (*code, value.as_slice()))
    }

    pub fn get_u8(&self, code: impl Into<u8>) -> Option<u8> {
        match self.get(code)? {
            [value] => Some(*value),
            _ => None,
        }
    }

    pub fn set_u8(&mut self, code: impl Into<u8>, value: u8) {
        self.set(code, vec![value]);
    }

    pub fn get_u16(&self, code: impl Into<u8>) -> Option<u16> {
        let raw: [u8; 2] = self.get(code)?.try_into().ok()?;
        Some(u16::from_be_bytes(raw))
    }

    pub fn set_u16(&mut self, code: impl Into<u8>, value: u16) {
        self.set(code, value.to_be_bytes().to_vec());
    }

    pub fn get_u32(&self, code: impl Into<u8>) -> Option<u32> {
        let raw: [u8; 4] = self.get(code)?.try_into().ok()?;
        Some(u32::from_be_bytes(raw))
    }

    pub fn set_u32(&mut self, code: impl Into<u8>, value: u32) {
        self.set(code, value.to_be_bytes().to_vec());
    }

    pub fn get_addr(&self, code: impl Into<u8>) -> Option<Ipv4Addr> {
        let raw: [u8; 4] = self.get(code)?.try_into().ok()?;
        Some(Ipv4Addr::from(raw))
    }

    pub fn set_addr(&mut self, code: impl Into<u8>, addr: Ipv4Addr) {
        self.set(code, addr.octets().to_vec());
    }

    pub fn get_str(&self, code: impl Into<u8>) -> Option<String> {
        String::from_utf8(self.get(code)?.to_vec()).ok()
    }

    pub fn set_str(&mut self, code: impl Into<u8>, value: &str) {
        self.set(code, value.as_bytes().to_vec());
    }

    /// The DHCP message type (Option 53), if present and recognized.
    pub fn message_type(&self) -> Option<MessageType> {
        MessageType::try_from(self.get_u8(OptionCode::MessageType)?).ok()
    }

    /// Sets the message type. Mandatory before a message can be encoded.
    pub fn set_message_type(&mut self, message_type: MessageType) {
        self.set_u8(OptionCode::MessageType, message_type as u8);
    }

    /// The address a client asks for or confirms (Option 50).
    pub fn requested_ip(&self) -> Option<Ipv4Addr> {
        self.get_addr(OptionCode::RequestedIpAddress)
    }

    /// The server a REQUEST is addressed to (Option 54).
    pub fn server_identifier(&self) -> Option<Ipv4Addr> {
        self.get_addr(OptionCode::ServerIdentifier)
    }

    /// Lease time in seconds (Option 51).
    pub fn lease_time(&self) -> Option<u32> {
        self.get_u32(OptionCode::LeaseTime)
    }

    /// Sets the lease time in seconds.
    pub fn set_lease_time(&mut self, seconds: u32) {
        self.set_u32(OptionCode::LeaseTime, seconds);
    }

    /// Free-form message text (Option 56), carried on NAKs.
    pub fn message_text(&self) -> Option<String> {
        self.get_str(OptionCode::Message)
    }

    /// Relay agent information (Option 82) decoded into its sub-options.
    pub fn relay_agent_info(&self) -> Option<RelayAgentInfo> {
        Some(RelayAgentInfo::decode(self.get(OptionCode::RelayAgentInfo)?))
    }
}

/// Relay-agent circuit-id sub-option type (RFC 3046 §3.1).
pub const SUB_OPTION_CIRCUIT_ID: u8 = 1;

/// Relay-agent remote-id sub-option type (RFC 3046 §3.2).
pub const SUB_OPTION_REMOTE_ID: u8 = 2;

/// Relay agent information carried in Option 82.
///
/// Relays insert this between client and server; the allocation engine
/// matches the identifiers against its configured pool tables. Both
/// sub-options are optional on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayAgentInfo {
    /// Circuit the client was heard on (e.g. a VLAN or port name).
    pub circuit_id: Option<String>,
    /// Identifier of the remote host, often the relay's own MAC.
    pub remote_id: Option<String>,
}

impl RelayAgentInfo {
    /// Parses the raw Option 82 payload.
    ///
    /// Sub-options are (type, length, value) triples; unknown sub-types
    /// are skipped and a truncated trailer ends parsing without error.
    /// Order of the sub-options does not matter.
    pub fn decode(payload: &[u8]) -> Self {
        let mut circuit_id = None;
        let mut remote_id = None;
        let mut index = 0;

        while index + 2 <= payload.len() {
            let sub_type = payload[index];
            let length = payload[index + 1] as usize;
            let end = (index + 2 + length).min(payload.len());
            let value = &payload[index + 2..end];

            match sub_type {
                SUB_OPTION_CIRCUIT_ID => {
                    circuit_id = Some(String::from_utf8_lossy(value).into_owned());
                }
                SUB_OPTION_REMOTE_ID => {
                    remote_id = Some(String::from_utf8_lossy(value).into_owned());
                }
                _ => {}
            }

            index += 2 + length;
        }

        Self {
            circuit_id,
            remote_id,
        }
    }
}

impl std::fmt::Display for RelayAgentInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "circuit-id {}, remote-id {}",
            self.circuit_id.as_deref().unwrap_or("-"),
            self.remote_id.as_deref().unwrap_or("-")
        )
    }
}
