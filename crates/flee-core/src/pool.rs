//! IPv4 address pool for tunnel endpoints.
//!
//! Addresses are handed out in ascending order starting right above the
//! block's base address, up to and including the top address of the block.
//! Released addresses are handed out again, lowest first, before the
//! allocation frontier moves on. Callers rely on this order to pre-assign
//! well-known low addresses, e.g. the first one to the server endpoint:
//!
//! ```text
//! 192.168.0.0/24: take -> .1, take -> .2, release .1, take -> .1, take -> .3
//! ```

use std::{
    collections::{BTreeSet, HashSet},
    net::Ipv4Addr,
    sync::{Mutex, MutexGuard, PoisonError},
};

use ipnetwork::Ipv4Network;
use log::debug;

use crate::error::{Error, Result};

#[derive(Debug, Default)]
struct PoolState {
    /// offset of the highest address the frontier has reached
    cursor: u32,
    allocated: HashSet<u32>,
    /// freed offsets, all below the cursor
    released: BTreeSet<u32>,
    reserved: HashSet<u32>,
}

/// Allocator over one CIDR block. All operations serialise on one lock, so a
/// pool can be shared between tunnel setup and teardown threads.
#[derive(Debug)]
pub struct AddressPool {
    base: u32,
    prefix: u8,
    size: u64,
    state: Mutex<PoolState>,
}

impl AddressPool {
    /// The block is normalised to its network address, so `192.168.0.1/24`
    /// and `192.168.0.0/24` describe the same pool.
    pub fn new(network: Ipv4Network) -> Self {
        let prefix = network.prefix();
        Self {
            base: u32::from(network.network()),
            prefix,
            size: 1u64 << (32 - u32::from(prefix)),
            state: Mutex::new(PoolState::default()),
        }
    }

    /// Create from CIDR notation, e.g. "10.1.1.0/24".
    pub fn from_cidr(cidr: &str) -> Result<Self> {
        let network: Ipv4Network = cidr
            .parse()
            .map_err(|e| Error::BadCidr(format!("{}: {}", cidr, e)))?;
        Ok(Self::new(network))
    }

    pub fn network(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.base)
    }

    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    pub fn contains(&self, ip: Ipv4Addr) -> bool {
        self.offset(ip).is_some()
    }

    /// Allocate the lowest free address.
    pub fn take(&self) -> Result<Ipv4Addr> {
        let mut state = self.lock();

        if let Some(offset) = state.released.iter().next().copied() {
            state.released.remove(&offset);
            state.allocated.insert(offset);
            debug!("reusing address {}", self.addr(offset));
            return Ok(self.addr(offset));
        }

        while u64::from(state.cursor) + 1 < self.size {
            state.cursor += 1;
            let offset = state.cursor;
            if state.reserved.contains(&offset) || state.allocated.contains(&offset) {
                continue;
            }
            state.allocated.insert(offset);
            debug!("allocated address {}", self.addr(offset));
            return Ok(self.addr(offset));
        }

        Err(Error::OutOfAddresses)
    }

    /// Return an allocated address to the pool. Returns false if it was not
    /// allocated.
    pub fn release(&self, ip: Ipv4Addr) -> bool {
        let Some(offset) = self.offset(ip) else {
            return false;
        };
        let mut state = self.lock();
        if !state.allocated.remove(&offset) {
            return false;
        }
        if !state.reserved.contains(&offset) {
            state.released.insert(offset);
        }
        debug!("released address {}", ip);
        true
    }

    /// Keep `ip` away from [`take`](Self::take) for good, e.g. a gateway
    /// address assigned out of band. Returns false if `ip` is outside the block.
    pub fn reserve(&self, ip: Ipv4Addr) -> bool {
        let Some(offset) = self.offset(ip) else {
            return false;
        };
        let mut state = self.lock();
        state.released.remove(&offset);
        state.reserved.insert(offset);
        debug!("reserved address {}", ip);
        true
    }

    pub fn is_allocated(&self, ip: Ipv4Addr) -> bool {
        self.offset(ip)
            .map_or(false, |offset| self.lock().allocated.contains(&offset))
    }

    pub fn is_reserved(&self, ip: Ipv4Addr) -> bool {
        self.offset(ip)
            .map_or(false, |offset| self.lock().reserved.contains(&offset))
    }

    pub fn allocated_count(&self) -> usize {
        self.lock().allocated.len()
    }

    fn lock(&self) -> MutexGuard<'_, PoolState> {
        // every update leaves the state consistent, so a poisoned lock is still usable
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn offset(&self, ip: Ipv4Addr) -> Option<u32> {
        let offset = u32::from(ip).wrapping_sub(self.base);
        (u64::from(offset) < self.size).then_some(offset)
    }

    fn addr(&self, offset: u32) -> Ipv4Addr {
        Ipv4Addr::from(self.base + offset)
    }
}
