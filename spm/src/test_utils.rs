//! Shared test harness: a mock platform, canned partition tables, and a
//! driver that feeds single operations to the dispatcher the way the trap
//! entry would.

extern crate alloc;

use crate::boot::{bring_up, Platform};
use crate::dispatch::{Outcome, TrapFrame};
use crate::error::Error;
use crate::mm::{MemoryRegionLimits, Region, RegionAttr, RegionBounds};
use crate::partition::{flags, signal, Partition, PartitionConfig, ServiceConfig};
use crate::Spm;

// Synthetic non-secure world bounds for address-level checks.
pub const NS_CODE: RegionBounds = RegionBounds::new(0x0020_0000, 0x0040_0000);
pub const NS_DATA: RegionBounds = RegionBounds::new(0x2010_0000, 0x2020_0000);
pub const VENEERS: RegionBounds = RegionBounds::new(0x0010_f000, 0x0011_0000);

pub const SID_ECHO: u32 = 0x9000;
pub const SID_STORE: u32 = 0x9100;
pub const SID_SECURE_ONLY: u32 = 0x9101;

pub const IPC_PARTITION_ID: u32 = 256;
pub const SFN_PARTITION_ID: u32 = 257;

pub const ECHO_SIGNAL: u32 = signal::SERVICE_BASE;
pub const IPC_IRQ: u32 = 1 << 27;

static IPC_SERVICES: &[ServiceConfig] = &[ServiceConfig {
    sid: SID_ECHO,
    minor_version: 1,
    signal: ECHO_SIGNAL,
    allow_ns: true,
}];

static SFN_SERVICES: &[ServiceConfig] = &[
    ServiceConfig {
        sid: SID_STORE,
        minor_version: 2,
        signal: 0,
        allow_ns: true,
    },
    ServiceConfig {
        sid: SID_SECURE_ONLY,
        minor_version: 1,
        signal: 0,
        allow_ns: false,
    },
];

fn ok_init() -> i32 {
    0
}

fn bad_init() -> i32 {
    -1
}

pub static BASIC_CONFIG: &[PartitionConfig] = &[
    PartitionConfig {
        id: IPC_PARTITION_ID,
        flags: flags::APP_ROT | flags::IPC_MODEL,
        init_entry: None,
        services: IPC_SERVICES,
        irq_signals: IPC_IRQ,
        layout: None,
    },
    PartitionConfig {
        id: SFN_PARTITION_ID,
        flags: flags::APP_ROT,
        init_entry: Some(ok_init),
        services: SFN_SERVICES,
        irq_signals: 0,
        layout: None,
    },
];

/// One partition whose init succeeds, one whose init fails.
pub static INIT_MIX_CONFIG: &[PartitionConfig] = &[
    PartitionConfig {
        id: 300,
        flags: flags::APP_ROT,
        init_entry: Some(ok_init),
        services: &[],
        irq_signals: 0,
        layout: None,
    },
    PartitionConfig {
        id: 301,
        flags: flags::APP_ROT,
        init_entry: Some(bad_init),
        services: &[],
        irq_signals: 0,
        layout: None,
    },
];

#[derive(Default)]
pub struct TestPlatform {
    /// Fail per-partition isolation setup for this id.
    pub fail_isolation_for: Option<u32>,
}

impl Platform for TestPlatform {
    fn init_isolation_hw(&mut self) -> Result<(), Error> {
        Ok(())
    }

    fn setup_isolation_hw(&mut self) -> Result<(), Error> {
        Ok(())
    }

    fn configure_default_isolation(&mut self, partition: &Partition) -> Result<(), Error> {
        if self.fail_isolation_for == Some(partition.id()) {
            return Err(Error::AccessDenied);
        }
        Ok(())
    }

    fn memory_limits(&self) -> MemoryRegionLimits {
        MemoryRegionLimits {
            ns_code: NS_CODE,
            ns_data: NS_DATA,
            veneer: VENEERS,
        }
    }

    fn regions(&self) -> &[Region] {
        &[]
    }

    fn scratch(&self) -> Option<RegionBounds> {
        None
    }

    fn boot_data(&self) -> Option<&'static [u8]> {
        None
    }

    fn get_ns_vector_table(&self) -> usize {
        NS_CODE.start
    }

    fn get_ns_initial_stack_pointer(&self) -> usize {
        NS_DATA.limit
    }

    fn get_ns_entry_point(&self) -> usize {
        NS_CODE.start + 0x100
    }
}

pub fn boot_basic() -> Spm {
    let mut spm = Spm::new();
    let mut platform = TestPlatform::default();
    bring_up(&mut spm, &mut platform, BASIC_CONFIG).unwrap();
    spm
}

/// Drive one decoded operation through the dispatcher.
pub fn svc(spm: &mut Spm, op: usize, args: &[usize]) -> (Outcome, TrapFrame) {
    let mut frame = TrapFrame::default();
    frame.r[..args.len()].copy_from_slice(args);
    let outcome = spm.dispatch(op, &mut frame);
    (outcome, frame)
}

/// Make a host-memory range addressable to everyone, so tests can hand
/// real buffers across the boundary.
pub fn cover(spm: &mut Spm, ptr: usize, len: usize) {
    spm.memory.add_region(Region {
        bounds: RegionBounds::new(ptr, ptr + len),
        attr: RegionAttr {
            read: true,
            write: true,
            ns: true,
            unpriv: true,
        },
    });
}

pub fn addr_of<T>(value: &T) -> usize {
    value as *const T as usize
}

pub fn addr_of_mut<T>(value: &mut T) -> usize {
    value as *mut T as usize
}

pub fn idx_of(spm: &Spm, id: u32) -> usize {
    spm.partitions.find_index(id).unwrap()
}
