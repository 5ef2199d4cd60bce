use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::net::Ipv4Addr;
use std::path::Path;

use macaddr::MacAddr6;

use crate::allocator::DEFAULT_LEASE_SECONDS;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server_ip: Ipv4Addr,
    #[serde(default = "default_lease_seconds")]
    pub lease_seconds: u32,
    #[serde(default)]
    pub release_frees_lease: bool,
    #[serde(default)]
    pub nak_unknown_requests: bool,
    pub pools: Vec<PoolConfig>,
    #[serde(default)]
    pub relay: RelayConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    pub id: u32,
    pub network: Ipv4Addr,
    pub subnet_mask: Ipv4Addr,
    pub range_start: Ipv4Addr,
    pub range_end: Ipv4Addr,
    pub gateway: Ipv4Addr,
    #[serde(default)]
    pub reservations: Vec<Reservation>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reservation {
    pub mac: MacAddr6,
    pub ip: Ipv4Addr,
}

/// Relay agent mappings from option-82 identifiers to pool ids.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default)]
    pub circuit_ids: HashMap<String, u32>,
    #[serde(default)]
    pub remote_ids: HashMap<String, u32>,
}

fn default_lease_seconds() -> u32 {
    DEFAULT_LEASE_SECONDS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_ip: Ipv4Addr::new(192, 168, 0, 3),
            lease_seconds: DEFAULT_LEASE_SECONDS,
            release_frees_lease: false,
            nak_unknown_requests: false,
            pools: vec![
                PoolConfig {
                    id: 1,
                    network: Ipv4Addr::new(192, 168, 0, 0),
                    subnet_mask: Ipv4Addr::new(255, 255, 255, 0),
                    range_start: Ipv4Addr::new(192, 168, 0, 190),
                    range_end: Ipv4Addr::new(192, 168, 0, 199),
                    gateway: Ipv4Addr::new(192, 168, 0, 1),
                    reservations: Vec::new(),
                },
                PoolConfig {
                    id: 2,
                    network: Ipv4Addr::new(192, 168, 2, 0),
                    subnet_mask: Ipv4Addr::new(255, 255, 255, 0),
                    range_start: Ipv4Addr::new(192, 168, 2, 150),
                    range_end: Ipv4Addr::new(192, 168, 2, 160),
                    gateway: Ipv4Addr::new(192, 168, 2, 1),
                    reservations: vec![Reservation {
                        mac: MacAddr6::new(0x20, 0x87, 0x56, 0x1B, 0x89, 0x20),
                        ip: Ipv4Addr::new(192, 168, 2, 156),
                    }],
                },
            ],
            relay: RelayConfig {
                circuit_ids: HashMap::from([
                    ("Vlan1".to_string(), 1),
                    ("Vlan2".to_string(), 2),
                ]),
                remote_ids: HashMap::from([
                    ("d4-f5-27-63-b8-b3".to_string(), 2),
                    ("Vlan2".to_string(), 2),
                ]),
            },
        }
    }
}

impl Config {
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = serde_json::from_str(&content)?;
            config.validate()?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save(path)?;
            Ok(config)
        }
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.pools.is_empty() {
            return Err(Error::InvalidConfig(
                "at least one pool is required".to_string(),
            ));
        }

        if self.lease_seconds == 0 {
            return Err(Error::InvalidConfig(
                "lease_seconds must be greater than 0".to_string(),
            ));
        }

        let mut seen_ids = HashSet::new();
        for pool in &self.pools {
            if !seen_ids.insert(pool.id) {
                return Err(Error::InvalidConfig(format!(
                    "duplicate pool id {}",
                    pool.id
                )));
            }

            let start = u32::from(pool.range_start);
            let end = u32::from(pool.range_end);

            if start > end {
                return Err(Error::InvalidConfig(format!(
                    "pool {}: range_start must be less than or equal to range_end",
                    pool.id
                )));
            }

            let mask = u32::from(pool.subnet_mask);
            let network = u32::from(pool.network) & mask;

            if start & mask != network || end & mask != network {
                return Err(Error::InvalidConfig(format!(
                    "pool {}: address range is outside subnet {}/{}",
                    pool.id, pool.network, pool.subnet_mask
                )));
            }

            let server = u32::from(self.server_ip);
            if server >= start && server <= end {
                return Err(Error::InvalidConfig(format!(
                    "server_ip must not be within the range of pool {}",
                    pool.id
                )));
            }

            let gateway = u32::from(pool.gateway);
            if gateway >= start && gateway <= end {
                return Err(Error::InvalidConfig(format!(
                    "pool {}: gateway must not be within the address range",
                    pool.id
                )));
            }

            for reservation in &pool.reservations {
                if u32::from(reservation.ip) & mask != network {
                    return Err(Error::InvalidConfig(format!(
                        "pool {}: reservation {} for {} is outside subnet {}/{}",
                        pool.id,
                        reservation.ip,
                        reservation.mac,
                        pool.network,
                        pool.subnet_mask
                    )));
                }
            }
        }

        for (circuit_id, pool_id) in &self.relay.circuit_ids {
            if !self.has_pool(*pool_id) {
                return Err(Error::InvalidConfig(format!(
                    "circuit id {:?} maps to unknown pool {}",
                    circuit_id, pool_id
                )));
            }
        }

        for (remote_id, pool_id) in &self.relay.remote_ids {
            if !self.has_pool(*pool_id) {
                return Err(Error::InvalidConfig(format!(
                    "remote id {:?} maps to unknown pool {}",
                    remote_id, pool_id
                )));
            }
        }

        Ok(())
    }

    fn has_pool(&self, id: u32) -> bool {
        self.pools.iter().any(|pool| pool.id == id)
    }
}
