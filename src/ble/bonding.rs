//! Bonding Service
//!
//! Security policy plus a thin adapter over the persistent bond store.
//! Bonded peers are kept in a bounded [`BondTable`] whose postcard image is
//! what the platform writes to flash.

use defmt::{debug, info, warn, Format};
use heapless::Vec;
use serde::{Deserialize, Serialize};

use crate::ble::events::{BleEvent, EventHandler};
use crate::core::config::{SecurityPolicy, MAX_BONDED_PEERS};
use crate::core::error::{BondError, FirmwareError};
use crate::core::hal::BondStore;

/// Upper bound of the serialized bond table.
pub const BOND_IMAGE_SIZE: usize = 192;

/// Key material of one bonded peer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Format, Serialize, Deserialize)]
pub struct BondRecord {
    /// Encrypted diversifier of the master identification
    pub ediv: u16,
    /// Random number of the master identification
    pub rand: [u8; 8],
    /// Long term key
    pub ltk: [u8; 16],
    /// LTK flags (authenticated, LE secure connections)
    pub ltk_flags: u8,
    /// Identity address of the peer
    pub peer_addr: [u8; 6],
    pub peer_addr_type: u8,
}

impl BondRecord {
    pub fn matches_master(&self, ediv: u16, rand: &[u8; 8]) -> bool {
        self.ediv == ediv && &self.rand == rand
    }
}

/// Bonded peers, oldest first.
#[derive(Debug, Clone, Default)]
pub struct BondTable {
    peers: Vec<BondRecord, MAX_BONDED_PEERS>,
}

impl BondTable {
    pub const fn new() -> Self {
        Self { peers: Vec::new() }
    }

    /// Add a peer, replacing an older bond with the same identity address.
    /// When full, the oldest bond is evicted.
    pub fn insert(&mut self, record: BondRecord) {
        if let Some(pos) = self
            .peers
            .iter()
            .position(|p| p.peer_addr == record.peer_addr && p.peer_addr_type == record.peer_addr_type)
        {
            self.peers.remove(pos);
        } else if self.peers.is_full() {
            warn!("BONDING: bond table full - evicting oldest bond");
            self.peers.remove(0);
        }
        // Room was made above
        let _ = self.peers.push(record);
    }

    pub fn find_by_master(&self, ediv: u16, rand: &[u8; 8]) -> Option<&BondRecord> {
        self.peers.iter().find(|p| p.matches_master(ediv, rand))
    }

    pub fn find_by_peer(&self, peer_addr: &[u8; 6]) -> Option<&BondRecord> {
        self.peers.iter().find(|p| &p.peer_addr == peer_addr)
    }

    pub fn clear(&mut self) {
        self.peers.clear();
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BondRecord> {
        self.peers.iter()
    }

    /// Serialize into `buf`, returning the used prefix.
    pub fn encode<'a>(&self, buf: &'a mut [u8]) -> Result<&'a mut [u8], BondError> {
        postcard::to_slice(&self.peers, buf).map_err(|_| BondError::Encode)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, BondError> {
        let peers = postcard::from_bytes(bytes).map_err(|_| BondError::Decode)?;
        Ok(Self { peers })
    }
}

pub struct BondManager<B> {
    store: B,
    policy: SecurityPolicy,
}

impl<B: BondStore> BondManager<B> {
    pub const fn new(store: B, policy: SecurityPolicy) -> Self {
        Self { store, policy }
    }

    /// Boot-time initialization; wipes all bonds when requested.
    pub fn init(&mut self, erase_bonds: bool) -> Result<(), FirmwareError> {
        if erase_bonds {
            info!("BONDING: erasing all bonds");
            self.store.erase_all()?;
        }
        info!(
            "BONDING: bond={} mitm={} io={} keys {}..{}",
            self.policy.bond, self.policy.mitm, self.policy.io_caps, self.policy.min_key_size, self.policy.max_key_size
        );
        Ok(())
    }

    pub fn policy(&self) -> &SecurityPolicy {
        &self.policy
    }

    pub fn store(&self) -> &B {
        &self.store
    }
}

impl<B: BondStore, C> EventHandler<C> for BondManager<B> {
    fn on_ble_event(&mut self, event: &BleEvent, _ctx: &mut C) -> Result<(), FirmwareError> {
        if let BleEvent::Bonded { conn_handle, record } = *event {
            if !self.policy.bond {
                debug!("BONDING: bonding disabled, keys of link {} not stored", conn_handle);
                return Ok(());
            }
            self.store.store(record)?;
            info!("BONDING: stored bond for link {}", conn_handle);
        }
        Ok(())
    }
}
