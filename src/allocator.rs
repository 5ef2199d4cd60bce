//! Address allocation across subnet pools.
//!
//! The [`Allocator`] implements [`DhcpHandler`]: it picks the pool a
//! client belongs to, resolves an address with reservations taking
//! precedence over recorded leases, and builds the OFFER/ACK/NAK
//! replies. Pool selection uses relay agent information when present,
//! otherwise the subnet of `giaddr` or of the server itself.

use std::collections::HashMap;
use std::net::Ipv4Addr;

use macaddr::MacAddr6;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::message::DhcpMessage;
use crate::options::{MessageType, OptionCode, RelayAgentInfo};
use crate::pool::SubnetPool;
use crate::server::{DhcpHandler, Reply};

/// Lease duration offered to clients unless configured otherwise.
pub const DEFAULT_LEASE_SECONDS: u32 = 60;

/// Random draws attempted before falling back to a linear sweep.
const MAX_RANDOM_DRAWS: usize = 32;

/// The allocation engine behind the server.
pub struct Allocator {
    server_ip: Ipv4Addr,
    pools: Vec<SubnetPool>,
    circuit_ids: HashMap<String, u32>,
    remote_ids: HashMap<String, u32>,
    lease_seconds: u32,
    release_frees_lease: bool,
    nak_unknown_requests: bool,
}

impl Allocator {
    /// Creates an allocator serving `pools`, with no relay mappings and
    /// default policies.
    pub fn new(server_ip: Ipv4Addr, pools: Vec<SubnetPool>) -> Self {
        Self {
            server_ip,
            pools,
            circuit_ids: HashMap::new(),
            remote_ids: HashMap::new(),
            lease_seconds: DEFAULT_LEASE_SECONDS,
            release_frees_lease: false,
            nak_unknown_requests: false,
        }
    }

    /// Sets the relay agent mappings from circuit-id and remote-id
    /// strings to pool ids. The remote-id table is consulted first.
    pub fn with_relay_tables(
        mut self,
        circuit_ids: HashMap<String, u32>,
        remote_ids: HashMap<String, u32>,
    ) -> Self {
        self.circuit_ids = circuit_ids;
        self.remote_ids = remote_ids;
        self
    }

    pub fn with_lease_seconds(mut self, seconds: u32) -> Self {
        self.lease_seconds = seconds;
        self
    }

    /// When enabled, a RELEASE whose `ciaddr` matches the client's
    /// recorded lease frees that address for reuse.
    pub fn with_release_frees_lease(mut self, enabled: bool) -> Self {
        self.release_frees_lease = enabled;
        self
    }

    /// When enabled, a REQUEST from a client with no lease or
    /// reservation is answered with a NAK instead of silence.
    pub fn with_nak_unknown_requests(mut self, enabled: bool) -> Self {
        self.nak_unknown_requests = enabled;
        self
    }

    /// Builds the allocator described by a [`Config`].
    pub fn from_config(config: &Config) -> Self {
        let pools = config
            .pools
            .iter()
            .map(|pool| {
                let mut subnet = SubnetPool::new(
                    pool.id,
                    pool.network,
                    pool.subnet_mask,
                    pool.range_start,
                    pool.range_end,
                    pool.gateway,
                );
                for reservation in &pool.reservations {
                    subnet.add_reservation(reservation.mac, reservation.ip);
                }
                subnet
            })
            .collect();

        Self {
            server_ip: config.server_ip,
            pools,
            circuit_ids: config.relay.circuit_ids.clone(),
            remote_ids: config.relay.remote_ids.clone(),
            lease_seconds: config.lease_seconds,
            release_frees_lease: config.release_frees_lease,
            nak_unknown_requests: config.nak_unknown_requests,
        }
    }

    fn pool_by_id(&self, id: u32) -> Option<&SubnetPool> {
        self.pools.iter().find(|pool| pool.id() == id)
    }

    /// Resolves relay agent information to a pool, remote-id first.
    fn pool_for_relay(&self, info: &RelayAgentInfo) -> Option<&SubnetPool> {
        let id = info
            .remote_id
            .as_deref()
            .and_then(|remote_id| self.remote_ids.get(remote_id))
            .or_else(|| {
                info.circuit_id
                    .as_deref()
                    .and_then(|circuit_id| self.circuit_ids.get(circuit_id))
            })?;

        self.pool_by_id(*id)
    }

    /// Picks the pool serving `message`.
    ///
    /// Relay agent information, when present, is authoritative: if its
    /// ids match no mapping the message is an error rather than falling
    /// through to subnet matching. Without it, the subnet of `giaddr`
    /// (or of the server, for on-link clients) decides.
    fn select_pool(&self, message: &DhcpMessage) -> Result<&SubnetPool> {
        if let Some(info) = message.options.relay_agent_info() {
            return self
                .pool_for_relay(&info)
                .ok_or_else(|| Error::UnknownRelay(info.to_string()));
        }

        let candidate = if message.giaddr.is_unspecified() {
            self.server_ip
        } else {
            message.giaddr
        };

        self.pools
            .iter()
            .find(|pool| pool.in_subnet(candidate))
            .ok_or(Error::NoSubnet(candidate))
    }

    /// Resolves the address for `mac` in `pool`: reservation first,
    /// then recorded lease, then (for DISCOVER) a fresh allocation.
    fn resolve_address(
        &self,
        pool: &SubnetPool,
        mac: MacAddr6,
        allocate_fresh: bool,
    ) -> Result<Ipv4Addr> {
        if let Some(address) = pool.reservation_for(mac) {
            return Ok(address);
        }

        if let Some(address) = pool.lease_for(mac) {
            return Ok(address);
        }

        if allocate_fresh {
            self.fresh_address(pool, mac)
        } else {
            Err(Error::NoLease {
                mac,
                pool: pool.id(),
            })
        }
    }

    /// Allocates and records a fresh lease for `mac`.
    ///
    /// Tries a bounded number of random draws, then sweeps the range in
    /// order so a nearly-full pool still terminates.
    fn fresh_address(&self, pool: &SubnetPool, mac: MacAddr6) -> Result<Ipv4Addr> {
        for _ in 0..MAX_RANDOM_DRAWS {
            let candidate = pool.random_address();
            if pool.is_free(candidate) {
                pool.record_lease(mac, candidate);
                return Ok(candidate);
            }
        }

        let address = pool.first_free().ok_or(Error::PoolExhausted(pool.id()))?;
        pool.record_lease(mac, address);
        Ok(address)
    }

    fn offer(&self, message: &DhcpMessage) -> Result<Reply> {
        let pool = self.select_pool(message)?;
        let address = self.resolve_address(pool, message.chaddr, true)?;

        let mut offer = DhcpMessage::reply_to(message, MessageType::Offer);
        offer.yiaddr = address;
        offer.options.set_lease_time(self.lease_seconds);

        info!("OFFER {} to {}", address, message.chaddr);

        Ok(Reply::new(offer, pool.subnet_mask(), pool.gateway()))
    }

    fn acknowledge(&self, message: &DhcpMessage) -> Result<Reply> {
        let pool = self.select_pool(message)?;
        let address = self.resolve_address(pool, message.chaddr, false)?;

        let mut ack = DhcpMessage::reply_to(message, MessageType::Ack);
        ack.yiaddr = address;
        ack.ciaddr = message.ciaddr;
        ack.options.set_lease_time(self.lease_seconds);

        info!("ACK {} to {}", address, message.chaddr);

        Ok(Reply::new(ack, pool.subnet_mask(), pool.gateway()))
    }

    fn negative_acknowledge(&self, message: &DhcpMessage, reason: &str) -> Reply {
        let mut nak = DhcpMessage::reply_to(message, MessageType::Nak);
        nak.options.set_str(OptionCode::Message, reason);

        warn!("NAK to {}: {}", message.chaddr, reason);

        Reply::new(nak, Ipv4Addr::UNSPECIFIED, Ipv4Addr::UNSPECIFIED)
    }
}

impl DhcpHandler for Allocator {
    fn on_discover(&self, message: &DhcpMessage) -> Option<Reply> {
        match self.offer(message) {
            Ok(reply) => Some(reply),
            Err(error) => {
                warn!("Cannot offer to {}: {}", message.chaddr, error);
                None
            }
        }
    }

    fn on_request(&self, message: &DhcpMessage) -> Option<Reply> {
        match self.acknowledge(message) {
            Ok(reply) => Some(reply),
            Err(error @ Error::NoLease { .. }) if self.nak_unknown_requests => {
                Some(self.negative_acknowledge(message, &error.to_string()))
            }
            Err(error) => {
                warn!("Cannot acknowledge {}: {}", message.chaddr, error);
                None
            }
        }
    }

    fn on_release(&self, message: &DhcpMessage) {
        if !self.release_frees_lease {
            info!(
                "RELEASE from {} for {} (leases are retained)",
                message.chaddr, message.ciaddr
            );
            return;
        }

        for pool in &self.pools {
            if pool.lease_for(message.chaddr) == Some(message.ciaddr) {
                pool.release_lease(message.chaddr);
                info!("RELEASE from {} freed {}", message.chaddr, message.ciaddr);
                return;
            }
        }

        warn!(
            "RELEASE from {} for {} matches no lease",
            message.chaddr, message.ciaddr
        );
    }

    fn on_decline(&self, message: &DhcpMessage) {
        warn!(
            "DECLINE from {} for {}",
            message.chaddr,
            message
                .options
                .requested_ip()
                .unwrap_or(Ipv4Addr::UNSPECIFIED)
        );
    }

    fn on_inform(&self, message: &DhcpMessage) {
        info!("INFORM from {} at {}", message.chaddr, message.ciaddr);
    }

    fn on_response_sent(&self, message: &DhcpMessage, destination: std::net::SocketAddr) {
        info!("Sent {} to {}", message, destination);
    }

    fn on_socket_error(&self, error: &std::io::Error) {
        error!("Socket error: {}", error);
    }

    fn on_message_error(&self, error: &Error) {
        warn!("Dropping message: {}", error);
    }
}
