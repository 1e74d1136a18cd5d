//! Partition descriptors: static identity from the build-time manifest
//! plus the runtime state the dispatcher drives.

pub mod db;
pub mod state;

pub use self::db::PartitionDb;
pub use self::state::PartitionState;

use crate::config::{INVALID_PARTITION_IDX, MAX_IOVEC};
use crate::mm::{RegionBounds, Share};

/// Partition attribute flag bits.
pub mod flags {
    pub const APP_ROT: u32 = 1 << 0;
    pub const PSA_ROT: u32 = 1 << 1;
    /// Speaks the message-based protocol (connect/call/../reply) instead
    /// of direct function requests.
    pub const IPC_MODEL: u32 = 1 << 2;
}

/// Signal space. The doorbell is shared; RoT-service signals and platform
/// IRQ signals come from the static manifest.
pub mod signal {
    pub const DOORBELL: u32 = 1 << 3;
    /// First bit usable for RoT-service signals.
    pub const SERVICE_BASE: u32 = 1 << 4;
}

/// Status a partition entry point reports; negative means failure.
pub type EntryFn = fn() -> i32;

/// One advertised RoT service.
#[derive(Debug, Clone, Copy)]
pub struct ServiceConfig {
    pub sid: u32,
    pub minor_version: u32,
    /// Signal bit asserted on the owning partition when a request lands.
    pub signal: u32,
    /// Reachable from the non-secure world.
    pub allow_ns: bool,
}

/// Memory layout of one partition, populated at isolation levels above
/// the minimal one.
#[derive(Debug, Clone, Copy, Default)]
pub struct PartitionLayout {
    pub code: RegionBounds,
    pub ro: RegionBounds,
    pub rw: RegionBounds,
    pub zi: RegionBounds,
    pub stack: RegionBounds,
}

/// Static configuration of one partition, fixed for the life of a boot.
#[derive(Debug, Clone, Copy)]
pub struct PartitionConfig {
    pub id: u32,
    pub flags: u32,
    pub init_entry: Option<EntryFn>,
    pub services: &'static [ServiceConfig],
    pub irq_signals: u32,
    pub layout: Option<PartitionLayout>,
}

impl PartitionConfig {
    pub const fn builtin(id: u32) -> Self {
        Self {
            id,
            flags: 0,
            init_entry: None,
            services: &[],
            irq_signals: 0,
            layout: None,
        }
    }
}

/// One input or output buffer passed across the trust boundary.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IoVec {
    pub base: usize,
    pub len: usize,
}

/// The record a service retrieves with `get`; layout is part of the
/// secure-side ABI.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct MsgInfo {
    pub handle: usize,
    pub client_id: i32,
    pub in_size: [usize; MAX_IOVEC],
    pub out_size: [usize; MAX_IOVEC],
    pub rhandle: usize,
}

/// Message state held while a request is in flight on a partition.
#[derive(Debug, Clone, Copy)]
pub struct Message {
    pub info: MsgInfo,
    /// Pool slot when the request arrived through a connection.
    pub connection_slot: Option<usize>,
    pub signal: u32,
}

/// Saved execution context of a partition while it is not running. Only
/// the dispatcher writes it, and only while that partition's index is the
/// one being serviced.
#[derive(Debug, Clone, Copy, Default)]
pub struct SavedContext {
    pub sp: usize,
    pub lr: usize,
}

/// Per-partition runtime state.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeState {
    pub state: PartitionState,
    /// Who is blocked waiting on this partition, or `INVALID_PARTITION_IDX`.
    pub caller_partition_idx: usize,
    /// Identity of the originating client, propagated across nested calls.
    pub caller_client_id: i32,
    pub invec: [IoVec; MAX_IOVEC],
    pub in_len: usize,
    /// Read cursor per input vector.
    pub in_consumed: [usize; MAX_IOVEC],
    pub outvec: [IoVec; MAX_IOVEC],
    pub out_len: usize,
    /// Bytes produced per output vector.
    pub out_written: [usize; MAX_IOVEC],
    /// Caller-side output-vector array, for the length write-back at reply.
    pub out_array_ptr: usize,
    pub share: Share,
    pub signals: u32,
    /// Mask the partition went to sleep on, when `Suspended`.
    pub waiting_mask: u32,
    pub msg: Option<Message>,
    pub ctx: SavedContext,
}

impl RuntimeState {
    const fn new(state: PartitionState) -> Self {
        Self {
            state,
            caller_partition_idx: INVALID_PARTITION_IDX,
            caller_client_id: 0,
            invec: [IoVec { base: 0, len: 0 }; MAX_IOVEC],
            in_len: 0,
            in_consumed: [0; MAX_IOVEC],
            outvec: [IoVec { base: 0, len: 0 }; MAX_IOVEC],
            out_len: 0,
            out_written: [0; MAX_IOVEC],
            out_array_ptr: 0,
            share: Share::None,
            signals: 0,
            waiting_mask: 0,
            msg: None,
            ctx: SavedContext { sp: 0, lr: 0 },
        }
    }

    /// Drop all per-request state once a reply has been delivered.
    pub fn clear_request(&mut self) {
        self.invec = [IoVec::default(); MAX_IOVEC];
        self.in_len = 0;
        self.in_consumed = [0; MAX_IOVEC];
        self.outvec = [IoVec::default(); MAX_IOVEC];
        self.out_len = 0;
        self.out_written = [0; MAX_IOVEC];
        self.out_array_ptr = 0;
        self.caller_partition_idx = INVALID_PARTITION_IDX;
        self.caller_client_id = 0;
        self.msg = None;
    }
}

/// One entry of the partition table.
#[derive(Debug, Clone, Copy)]
pub struct Partition {
    pub config: PartitionConfig,
    pub runtime: RuntimeState,
}

impl Partition {
    pub fn new(config: PartitionConfig, state: PartitionState) -> Self {
        Self {
            config,
            runtime: RuntimeState::new(state),
        }
    }

    pub fn id(&self) -> u32 {
        self.config.id
    }

    pub fn is_ipc(&self) -> bool {
        self.config.flags & flags::IPC_MODEL != 0
    }

    pub fn is_psa_rot(&self) -> bool {
        self.config.flags & flags::PSA_ROT != 0
    }

    pub fn state(&self) -> PartitionState {
        self.runtime.state
    }

    pub fn set_state(&mut self, next: PartitionState) -> bool {
        if !self.runtime.state.can_transition_to(next) {
            return false;
        }
        self.runtime.state = next;
        true
    }
}
