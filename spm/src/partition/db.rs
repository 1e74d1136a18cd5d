//! The partition table: fixed capacity, populated once at boot, indexed
//! by validated indices afterwards.

extern crate alloc;

use alloc::vec::Vec;

use super::{Partition, PartitionConfig, PartitionState, ServiceConfig};
use crate::config::{CORE_ID, MAX_PARTITIONS, NON_SECURE_ID};
use crate::error::ConfigError;

pub struct PartitionDb {
    entries: Vec<Partition>,
}

impl PartitionDb {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Drop all state and repopulate: the two built-in pseudo-partitions
    /// first, then every statically-configured user partition. On error
    /// the table is left empty, never half-initialized.
    pub fn init(&mut self, configs: &'static [PartitionConfig]) -> Result<(), ConfigError> {
        if 2 + configs.len() > MAX_PARTITIONS {
            return Err(ConfigError::TooManyPartitions);
        }

        let mut entries = Vec::with_capacity(2 + configs.len());
        // The built-ins have no init to wait for and start Idle.
        entries.push(Partition::new(
            PartitionConfig::builtin(NON_SECURE_ID),
            PartitionState::Idle,
        ));
        entries.push(Partition::new(
            PartitionConfig::builtin(CORE_ID),
            PartitionState::Idle,
        ));
        for config in configs {
            if entries.iter().any(|p| p.id() == config.id) {
                return Err(ConfigError::DuplicatePartitionId);
            }
            entries.push(Partition::new(*config, PartitionState::Uninit));
        }

        self.entries = entries;
        Ok(())
    }

    pub fn count(&self) -> usize {
        self.entries.len()
    }

    /// Linear scan; the table is boot-time-sized and small.
    pub fn find_index(&self, partition_id: u32) -> Option<usize> {
        self.entries.iter().position(|p| p.id() == partition_id)
    }

    /// Which partition advertises this service id.
    pub fn find_service(&self, sid: u32) -> Option<(usize, ServiceConfig)> {
        for (idx, partition) in self.entries.iter().enumerate() {
            if let Some(service) = partition.config.services.iter().find(|s| s.sid == sid) {
                return Some((idx, *service));
            }
        }
        None
    }

    /// The callers of the accessors hold indices obtained from
    /// `find_index` or a trusted internal path; out-of-range access is a
    /// core bug and panics.
    pub fn get(&self, idx: usize) -> &Partition {
        &self.entries[idx]
    }

    pub fn get_mut(&mut self, idx: usize) -> &mut Partition {
        &mut self.entries[idx]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Partition> {
        self.entries.iter()
    }

    pub fn indices(&self) -> core::ops::Range<usize> {
        0..self.entries.len()
    }
}

impl Default for PartitionDb {
    fn default() -> Self {
        Self::new()
    }
}
