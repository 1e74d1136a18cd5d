#![no_std]
#![warn(rust_2018_idioms)]

//! Secure Partition Manager core.
//!
//! The mechanism by which client code, secure or non-secure, invokes
//! isolated secure partitions through a trap boundary: partition
//! bookkeeping, the synchronous request/reply protocol, caller-identity
//! and memory-access validation, and the per-partition lifecycle state
//! machine. Hardware isolation programming and device drivers stay behind
//! the [`boot::Platform`] trait.

#[cfg(not(test))]
pub mod allocator;
pub mod boot;
pub mod call;
pub mod config;
pub mod connection;
pub mod dispatch;
pub mod error;
pub mod io;
pub mod logger;
pub mod mm;
pub mod ns_client;
#[cfg(not(test))]
pub mod panic;
pub mod partition;
pub mod svc;
#[macro_use]
pub mod r#macro;
#[cfg(test)]
pub mod test_utils;

extern crate alloc;

#[macro_use]
extern crate lazy_static;

#[macro_use]
extern crate log;

use crate::config::INVALID_PARTITION_IDX;
use crate::connection::ConnectionPool;
use crate::mm::MemoryValidator;
use crate::ns_client::NsClientTable;
use crate::partition::PartitionDb;

/// The Secure Partition Manager. One instance owns all persistent SPM
/// state; the embedding trap entry holds it across traps and hands each
/// trap frame to [`Spm::handle_trap`].
///
/// The single-trap-at-a-time guarantee of the hardware is the concurrency
/// model. An embedding that introduces real parallelism must wrap the
/// whole instance in a mutual-exclusion primitive.
pub struct Spm {
    pub partitions: PartitionDb,
    pub clients: NsClientTable,
    pub memory: MemoryValidator,
    pub connections: ConnectionPool,
    /// Index of the partition whose execution context is current.
    pub(crate) running_idx: usize,
    /// Set while a non-secure-originated request is active in the secure
    /// domain; checked and cleared together with trap entry/exit.
    pub(crate) secure_lock: bool,
    pub(crate) boot_data: Option<&'static [u8]>,
}

impl Spm {
    pub fn new() -> Self {
        Self {
            partitions: PartitionDb::new(),
            clients: NsClientTable::new(),
            memory: MemoryValidator::new(),
            connections: ConnectionPool::new(),
            running_idx: INVALID_PARTITION_IDX,
            secure_lock: false,
            boot_data: None,
        }
    }

    pub fn running_partition_idx(&self) -> usize {
        self.running_idx
    }

    pub fn in_secure_domain(&self) -> bool {
        self.secure_lock
    }
}

impl Default for Spm {
    fn default() -> Self {
        Self::new()
    }
}
