//! Subnet pools: the address ranges the server hands out.
//!
//! A [`SubnetPool`] owns one contiguous IPv4 range plus the subnet
//! parameters (mask, gateway) stamped on every offer from that range.
//! Static reservations pin a MAC to a fixed address; dynamic leases are
//! recorded in a concurrent map so the allocation path never takes a
//! lock across pools.

use std::collections::HashMap;
use std::net::Ipv4Addr;

use dashmap::DashMap;
use macaddr::MacAddr6;
use rand::Rng;

/// One address pool bound to a subnet.
#[derive(Debug)]
pub struct SubnetPool {
    id: u32,
    network: Ipv4Addr,
    subnet_mask: Ipv4Addr,
    range_start: Ipv4Addr,
    range_end: Ipv4Addr,
    gateway: Ipv4Addr,
    reservations: HashMap<MacAddr6, Ipv4Addr>,
    leases: DashMap<MacAddr6, Ipv4Addr>,
}

impl SubnetPool {
    /// Creates a pool handing out `range_start..=range_end` on the
    /// subnet `network`/`subnet_mask`, with `gateway` as the router
    /// offered to clients.
    pub fn new(
        id: u32,
        network: Ipv4Addr,
        subnet_mask: Ipv4Addr,
        range_start: Ipv4Addr,
        range_end: Ipv4Addr,
        gateway: Ipv4Addr,
    ) -> Self {
        Self {
            id,
            network,
            subnet_mask,
            range_start,
            range_end,
            gateway,
            reservations: HashMap::new(),
            leases: DashMap::new(),
        }
    }

    /// Pins `mac` to `address`. Reserved addresses are never handed to
    /// any other client, and the owner always gets this address back.
    pub fn add_reservation(&mut self, mac: MacAddr6, address: Ipv4Addr) {
        self.reservations.insert(mac, address);
    }

    /// The pool identifier referenced by relay agent mappings.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// The subnet mask stamped on offers from this pool.
    pub fn subnet_mask(&self) -> Ipv4Addr {
        self.subnet_mask
    }

    /// The router address stamped on offers from this pool.
    pub fn gateway(&self) -> Ipv4Addr {
        self.gateway
    }

    /// Returns true if `address` falls inside the dynamic range,
    /// endpoints included.
    pub fn contains(&self, address: Ipv4Addr) -> bool {
        let address = u32::from(address);
        address >= u32::from(self.range_start) && address <= u32::from(self.range_end)
    }

    /// Returns true if `address` belongs to this pool's subnet, i.e.
    /// masking it yields the same network as masking `network` does.
    pub fn in_subnet(&self, address: Ipv4Addr) -> bool {
        let mask = u32::from(self.subnet_mask);
        (u32::from(address) & mask) == (u32::from(self.network) & mask)
    }

    /// The reserved address for `mac`, if one is configured.
    pub fn reservation_for(&self, mac: MacAddr6) -> Option<Ipv4Addr> {
        self.reservations.get(&mac).copied()
    }

    /// Returns true if `address` is the target of any reservation.
    pub fn is_reserved(&self, address: Ipv4Addr) -> bool {
        self.reservations.values().any(|reserved| *reserved == address)
    }

    /// The address currently leased to `mac`, if any.
    pub fn lease_for(&self, mac: MacAddr6) -> Option<Ipv4Addr> {
        self.leases.get(&mac).map(|entry| *entry)
    }

    /// Records that `address` is leased to `mac`, replacing any
    /// previous lease held by that client.
    pub fn record_lease(&self, mac: MacAddr6, address: Ipv4Addr) {
        self.leases.insert(mac, address);
    }

    /// Drops the lease held by `mac`, returning the freed address.
    pub fn release_lease(&self, mac: MacAddr6) -> Option<Ipv4Addr> {
        self.leases.remove(&mac).map(|(_, address)| address)
    }

    /// Returns true if `address` is leased to some client.
    pub fn is_leased(&self, address: Ipv4Addr) -> bool {
        self.leases.iter().any(|entry| *entry.value() == address)
    }

    /// Returns true if `address` is neither leased nor reserved.
    pub fn is_free(&self, address: Ipv4Addr) -> bool {
        !self.is_leased(address) && !self.is_reserved(address)
    }

    /// Draws a uniformly random address from the dynamic range.
    ///
    /// The draw ignores lease state; callers check [`is_free`](Self::is_free)
    /// and retry or fall back to [`first_free`](Self::first_free).
    pub fn random_address(&self) -> Ipv4Addr {
        let start = u32::from(self.range_start);
        let end = u32::from(self.range_end);
        Ipv4Addr::from(rand::rng().random_range(start..=end))
    }

    /// Scans the range in order and returns the lowest free address,
    /// or `None` when the pool is fully occupied.
    pub fn first_free(&self) -> Option<Ipv4Addr> {
        let start = u32::from(self.range_start);
        let end = u32::from(self.range_end);
        (start..=end)
            .map(Ipv4Addr::from)
            .find(|candidate| self.is_free(*candidate))
    }
}
