//! One-time bring-up: establish the isolation boundary, populate the
//! partition table, give every partition its init attempt, then hand
//! execution to the non-secure world.

use crate::call::RequestArgs;
use crate::config::{CORE_ID, NON_SECURE_ID, SFN_HANDLE_BASE};
use crate::error::{ConfigError, Error, InitError};
use crate::mm::{MemoryRegionLimits, Region, RegionBounds};
use crate::partition::state::PartitionState;
use crate::partition::{Message, MsgInfo, Partition, PartitionConfig};
use crate::Spm;

/// Table index of the non-secure pseudo-partition; fixed by the insert
/// order of `PartitionDb::init`.
pub const NS_PARTITION_IDX: usize = 0;
/// Table index of the core pseudo-partition.
pub const CORE_PARTITION_IDX: usize = 1;

/// Everything the SPM consumes from the platform. Isolation hardware
/// programming and the shape of the memory map live behind this trait;
/// the core never touches a register.
pub trait Platform {
    fn init_isolation_hw(&mut self) -> Result<(), Error>;
    fn setup_isolation_hw(&mut self) -> Result<(), Error>;
    /// Per-partition isolation setup, applied before the partition's init
    /// entry runs.
    fn configure_default_isolation(&mut self, partition: &Partition) -> Result<(), Error>;

    fn memory_limits(&self) -> MemoryRegionLimits;
    fn regions(&self) -> &[Region];
    fn scratch(&self) -> Option<RegionBounds>;
    fn boot_data(&self) -> Option<&'static [u8]>;

    fn get_ns_vector_table(&self) -> usize;
    fn get_ns_initial_stack_pointer(&self) -> usize;
    fn get_ns_entry_point(&self) -> usize;
}

/// Where the embedder starts the non-secure world after bring-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NsEntry {
    pub vector_table: usize,
    pub stack_pointer: usize,
    pub entry_point: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootError {
    Isolation(Error),
    Config(ConfigError),
    Init(InitError),
}

/// First-word magic of the bootloader-populated record area.
pub const BOOT_DATA_MAGIC: u16 = 0x2016;

/// Walk the TLV record area for a record of `major_type` and copy it out.
pub fn find_boot_record(area: &[u8], major_type: u16, buf: &mut [u8]) -> Result<usize, Error> {
    if area.len() < 4 {
        return Err(Error::NotFound);
    }
    let magic = u16::from_le_bytes([area[0], area[1]]);
    if magic != BOOT_DATA_MAGIC {
        return Err(Error::NotFound);
    }
    let total = (u16::from_le_bytes([area[2], area[3]]) as usize).min(area.len());

    let mut off = 4;
    while off + 4 <= total {
        let ty = u16::from_le_bytes([area[off], area[off + 1]]);
        let len = u16::from_le_bytes([area[off + 2], area[off + 3]]) as usize;
        let data = off + 4;
        if data + len > total {
            break;
        }
        if ty == major_type {
            if buf.len() < len {
                return Err(Error::InvalidLength);
            }
            buf[..len].copy_from_slice(&area[data..data + len]);
            return Ok(len);
        }
        off = data + len;
    }
    Err(Error::NotFound)
}

/// The startup sequence. The isolation boundary exists before any
/// partition code runs; every init failure closes that partition and the
/// rest still get their attempt.
pub fn bring_up(
    spm: &mut Spm,
    platform: &mut dyn Platform,
    configs: &'static [PartitionConfig],
) -> Result<NsEntry, BootError> {
    platform.init_isolation_hw().map_err(BootError::Isolation)?;

    spm.partitions.init(configs).map_err(BootError::Config)?;
    spm.memory.set_limits(platform.memory_limits());
    spm.memory.set_regions(platform.regions());
    if let Some(scratch) = platform.scratch() {
        spm.memory.set_scratch(scratch);
    }
    spm.boot_data = platform.boot_data();
    spm.clients.configure_default();

    platform.setup_isolation_hw().map_err(BootError::Isolation)?;

    // init calls run in the privileged bootstrap context
    spm.running_idx = CORE_PARTITION_IDX;
    spm.partitions
        .get_mut(CORE_PARTITION_IDX)
        .runtime
        .state = PartitionState::Running;

    let init_result = spm.run_all_inits(platform);
    spm.partitions
        .get_mut(CORE_PARTITION_IDX)
        .runtime
        .state = PartitionState::Idle;
    init_result.map_err(BootError::Init)?;

    // hand off: the non-secure pseudo-partition is the running context now
    spm.partitions
        .get_mut(NS_PARTITION_IDX)
        .runtime
        .state = PartitionState::Running;
    spm.running_idx = NS_PARTITION_IDX;

    info!("bring-up complete, {} partitions", spm.partitions.count());
    Ok(NsEntry {
        vector_table: platform.get_ns_vector_table(),
        stack_pointer: platform.get_ns_initial_stack_pointer(),
        entry_point: platform.get_ns_entry_point(),
    })
}

impl Spm {
    /// Give every configured partition its init attempt, each issued
    /// through the regular request path with the core as the caller.
    /// Best-effort: a failure closes that partition and the pass
    /// continues; the aggregate is reported at the end.
    pub fn run_all_inits(&mut self, platform: &mut dyn Platform) -> Result<(), InitError> {
        let mut failed = 0;

        for idx in self.partitions.indices() {
            let partition = self.partitions.get(idx);
            let id = partition.id();
            if id == NON_SECURE_ID || id == CORE_ID {
                continue;
            }
            let entry = match partition.config.init_entry {
                Some(entry) => entry,
                None => {
                    self.partitions.get_mut(idx).set_state(PartitionState::Idle);
                    continue;
                }
            };

            if platform
                .configure_default_isolation(self.partitions.get(idx))
                .is_err()
            {
                error!("isolation setup failed for partition {:#x}", id);
                self.partitions.get_mut(idx).runtime.state = PartitionState::Closed;
                failed += 1;
                continue;
            }

            let msg = Message {
                info: MsgInfo {
                    handle: SFN_HANDLE_BASE + idx,
                    client_id: CORE_ID as i32,
                    ..Default::default()
                },
                connection_slot: None,
                signal: 0,
            };
            let mut req = RequestArgs::bare(msg);
            req.init = true;
            if self.begin_request(idx, req).is_err() {
                self.partitions.get_mut(idx).runtime.state = PartitionState::Closed;
                failed += 1;
                continue;
            }

            let status = entry();
            if status < 0 {
                warn!("partition {:#x} init failed: {}", id, status);
                let _ = self.fail_request();
                failed += 1;
            } else {
                let _ = self.complete_request(status as isize);
            }
        }

        if failed > 0 {
            Err(InitError { failed })
        } else {
            Ok(())
        }
    }
}
