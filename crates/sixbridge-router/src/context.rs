//! Host-side cache of 6LoWPAN compression contexts.
//!
//! Each context id owns a slot with a version counter that survives removal,
//! so the node can tell a re-added context from a stale copy. Every mutation
//! returns the [`ContextPacket`] to push to the node.

use std::net::Ipv6Addr;

use sixbridge_core::constants::{MAX_PREFIX_LEN, MAXIMUM_CONTEXTS};
use sixbridge_core::{ContextPacket, serial_add};

use crate::error::RouterError;

/// A cached compression context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextEntry {
    pub prefix: Ipv6Addr,
    /// Prefix length in bits.
    pub len: u8,
    /// Whether the context may be used for compression.
    pub comp: bool,
    /// Valid lifetime in minutes; 0 withdraws the context.
    pub lifetime: u16,
}

#[derive(Debug, Clone, Copy, Default)]
struct ContextSlot {
    version: u16,
    entry: Option<ContextEntry>,
}

impl ContextSlot {
    fn bump(&mut self) -> u16 {
        // serial_add only rejects increments of half the space or more.
        self.version = serial_add(self.version, 1).unwrap_or(self.version.wrapping_add(1));
        self.version
    }
}

#[derive(Debug, Default)]
pub struct ContextCache {
    slots: [ContextSlot; MAXIMUM_CONTEXTS],
}

impl ContextCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, cid: u8) -> Option<&ContextEntry> {
        self.slots.get(usize::from(cid))?.entry.as_ref()
    }

    /// Current version of `cid`'s slot, whether occupied or not.
    pub fn version(&self, cid: u8) -> Option<u16> {
        self.slots.get(usize::from(cid)).map(|slot| slot.version)
    }

    /// Ids of occupied slots, ascending.
    pub fn active(&self) -> impl Iterator<Item = u8> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.entry.is_some())
            .filter_map(|(cid, _)| u8::try_from(cid).ok())
    }

    /// Create or replace the context for `cid`.
    pub fn update(&mut self, cid: u8, entry: ContextEntry) -> Result<ContextPacket, RouterError> {
        if entry.len > MAX_PREFIX_LEN {
            return Err(RouterError::Config(format!(
                "context prefix length {} exceeds {}",
                entry.len, MAX_PREFIX_LEN
            )));
        }
        let slot = self.slot_mut(cid)?;
        let version = slot.bump();
        slot.entry = Some(entry);
        Ok(record(cid, version, &entry))
    }

    /// Re-announce an existing context under a new version.
    pub fn renew(&mut self, cid: u8) -> Result<ContextPacket, RouterError> {
        let slot = self.slot_mut(cid)?;
        let entry = slot.entry.ok_or(RouterError::ContextNotFound(cid))?;
        let version = slot.bump();
        Ok(record(cid, version, &entry))
    }

    /// Withdraw a context: announce it with lifetime 0, then free the slot.
    pub fn remove(&mut self, cid: u8) -> Result<ContextPacket, RouterError> {
        let slot = self.slot_mut(cid)?;
        let mut entry = slot.entry.take().ok_or(RouterError::ContextNotFound(cid))?;
        entry.lifetime = 0;
        let version = slot.bump();
        Ok(record(cid, version, &entry))
    }

    /// Put back the entry a failed update replaced. The version is kept so
    /// it never repeats for different contents.
    pub fn restore(&mut self, cid: u8, entry: Option<ContextEntry>) {
        if let Some(slot) = self.slots.get_mut(usize::from(cid)) {
            slot.entry = entry;
        }
    }

    fn slot_mut(&mut self, cid: u8) -> Result<&mut ContextSlot, RouterError> {
        self.slots
            .get_mut(usize::from(cid))
            .ok_or(RouterError::InvalidContextId(cid))
    }
}

fn record(cid: u8, version: u16, entry: &ContextEntry) -> ContextPacket {
    ContextPacket {
        version,
        cid,
        prefix: entry.prefix,
        len: entry.len,
        comp: entry.comp,
        lifetime: entry.lifetime,
    }
}
