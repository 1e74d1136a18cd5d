//! The synchronous request/reply state-machine driver.
//!
//! Both the trap handlers and the boot-time init pass drive partition
//! switches through `begin_request`/`complete_request`, so every call in
//! the system observes the same transition discipline: caller
//! `Running → Blocked`, callee `→ Running`, and the reverse on reply.

use crate::config::{CORE_ID, INVALID_PARTITION_IDX, MAX_IOVEC, NON_SECURE_ID};
use crate::error::Error;
use crate::partition::state::PartitionState;
use crate::partition::{IoVec, Message, SavedContext};
use crate::Spm;

/// Identity and privilege of the context a trap arrived from.
#[derive(Debug, Clone, Copy)]
pub(crate) struct CallerInfo {
    pub idx: usize,
    pub is_ns: bool,
    pub privileged: bool,
    pub client_id: i32,
}

/// Everything `begin_request` installs on the callee.
pub(crate) struct RequestArgs {
    pub invec: [IoVec; MAX_IOVEC],
    pub in_len: usize,
    pub outvec: [IoVec; MAX_IOVEC],
    pub out_len: usize,
    pub out_array_ptr: usize,
    pub msg: Message,
    /// Boot-time init call: the callee starts from `Uninit`.
    pub init: bool,
}

impl RequestArgs {
    pub fn bare(msg: Message) -> Self {
        Self {
            invec: [IoVec::default(); MAX_IOVEC],
            in_len: 0,
            outvec: [IoVec::default(); MAX_IOVEC],
            out_len: 0,
            out_array_ptr: 0,
            msg,
            init: false,
        }
    }
}

impl Spm {
    pub(crate) fn caller(&self) -> CallerInfo {
        let idx = self.running_idx;
        let partition = self.partitions.get(idx);
        let is_ns = partition.id() == NON_SECURE_ID;
        let privileged = partition.id() == CORE_ID || partition.is_psa_rot();
        let client_id = if is_ns {
            self.clients.current_client_id()
        } else {
            partition.id() as i32
        };
        CallerInfo {
            idx,
            is_ns,
            privileged,
            client_id,
        }
    }

    /// Hand execution to `callee_idx`. The handler has already validated
    /// the request; a refusal here means the state machine itself was
    /// about to be violated.
    pub(crate) fn begin_request(
        &mut self,
        callee_idx: usize,
        req: RequestArgs,
    ) -> Result<(), Error> {
        let caller_idx = self.running_idx;
        if caller_idx == callee_idx || caller_idx == INVALID_PARTITION_IDX {
            return Err(Error::SecurityViolation);
        }

        let caller_is_ns = self.partitions.get(caller_idx).id() == NON_SECURE_ID;
        if caller_is_ns && self.secure_lock {
            return Err(Error::SecurityViolation);
        }

        let callee_state = self.partitions.get(callee_idx).state();
        let entry_ok = match callee_state {
            PartitionState::Idle => true,
            PartitionState::Uninit => req.init,
            // woken out of `wait` by a matching signal, unless a message
            // is still in flight on it
            PartitionState::Suspended => {
                let rt = &self.partitions.get(callee_idx).runtime;
                rt.msg.is_none() && rt.waiting_mask & req.msg.signal != 0
            }
            _ => false,
        };
        if !entry_ok {
            return Err(Error::Busy);
        }

        if !self.partitions.get_mut(caller_idx).set_state(PartitionState::Blocked) {
            return Err(Error::SecurityViolation);
        }
        if !self.partitions.get_mut(callee_idx).set_state(PartitionState::Running) {
            // roll the caller back; nothing else has changed yet
            self.partitions.get_mut(caller_idx).runtime.state = PartitionState::Running;
            return Err(Error::SecurityViolation);
        }

        let client_id = req.msg.info.client_id;
        let callee = self.partitions.get_mut(callee_idx);
        callee.runtime.caller_partition_idx = caller_idx;
        callee.runtime.caller_client_id = client_id;
        callee.runtime.invec = req.invec;
        callee.runtime.in_len = req.in_len;
        callee.runtime.in_consumed = [0; MAX_IOVEC];
        callee.runtime.outvec = req.outvec;
        callee.runtime.out_len = req.out_len;
        callee.runtime.out_written = [0; MAX_IOVEC];
        callee.runtime.out_array_ptr = req.out_array_ptr;
        callee.runtime.signals |= req.msg.signal;
        callee.runtime.waiting_mask = 0;
        callee.runtime.msg = Some(req.msg);

        self.running_idx = callee_idx;
        if caller_is_ns {
            self.secure_lock = true;
        }
        Ok(())
    }

    /// Deliver the reply: the running callee goes back to `Idle`, the
    /// blocked caller resumes with `status`. Returns the caller's index.
    pub(crate) fn complete_request(&mut self, status: isize) -> Result<usize, Error> {
        let callee_idx = self.running_idx;
        let callee = self.partitions.get(callee_idx);
        if callee.state() != PartitionState::Running {
            return Err(Error::SecurityViolation);
        }
        let caller_idx = callee.runtime.caller_partition_idx;
        if caller_idx == INVALID_PARTITION_IDX {
            return Err(Error::SecurityViolation);
        }

        // bytes-written counts go back into the caller's out_vec array
        let rt = &callee.runtime;
        if rt.out_array_ptr != 0 {
            for i in 0..rt.out_len {
                let len_ptr = rt.out_array_ptr
                    + i * core::mem::size_of::<IoVec>()
                    + core::mem::offset_of!(IoVec, len);
                unsafe { mem_write::<usize>(len_ptr, rt.out_written[i]) };
            }
        }

        if let Some(msg) = callee.runtime.msg {
            if let Some(slot) = msg.connection_slot {
                if let Some(conn) = self.connections.lookup_mut(crate::connection::handle_of(slot))
                {
                    conn.in_call = false;
                }
            }
        }

        let callee = self.partitions.get_mut(callee_idx);
        callee.runtime.clear_request();
        callee.runtime.state = PartitionState::Idle;

        if !self.partitions.get_mut(caller_idx).set_state(PartitionState::Running) {
            return Err(Error::SecurityViolation);
        }
        self.running_idx = caller_idx;
        if self.partitions.get(caller_idx).id() == NON_SECURE_ID {
            self.secure_lock = false;
        }
        trace!("reply {} -> partition idx {}", status, caller_idx);
        Ok(caller_idx)
    }

    /// Unwind a request whose callee failed terminally (init failure):
    /// the callee is closed for the rest of this boot, the caller resumes.
    pub(crate) fn fail_request(&mut self) -> Result<usize, Error> {
        let callee_idx = self.running_idx;
        let caller_idx = self.partitions.get(callee_idx).runtime.caller_partition_idx;
        if caller_idx == INVALID_PARTITION_IDX {
            return Err(Error::SecurityViolation);
        }

        let callee = self.partitions.get_mut(callee_idx);
        callee.runtime.clear_request();
        callee.runtime.state = PartitionState::Closed;

        if !self.partitions.get_mut(caller_idx).set_state(PartitionState::Running) {
            return Err(Error::SecurityViolation);
        }
        self.running_idx = caller_idx;
        if self.partitions.get(caller_idx).id() == NON_SECURE_ID {
            self.secure_lock = false;
        }
        Ok(caller_idx)
    }

    /// Re-enter a partition parked in `wait` once a matching signal has
    /// been asserted. Returns the asserted subset the resumed `wait`
    /// reports.
    pub fn resume_suspended(&mut self, idx: usize) -> Result<u32, Error> {
        let partition = self.partitions.get(idx);
        if partition.state() != PartitionState::Suspended {
            return Err(Error::Busy);
        }
        let asserted = partition.runtime.signals & partition.runtime.waiting_mask;
        if asserted == 0 {
            return Err(Error::Busy);
        }
        let partition = self.partitions.get_mut(idx);
        partition.runtime.state = PartitionState::Running;
        partition.runtime.waiting_mask = 0;
        self.running_idx = idx;
        Ok(asserted)
    }

    /// Record a parked context's stack pointer and link register. Only
    /// the embedding shim writes this, and only for the context it is
    /// switching away from; the single-trap-at-a-time guarantee is what
    /// keeps this a single-writer field.
    pub fn save_context(&mut self, idx: usize, ctx: SavedContext) {
        self.partitions.get_mut(idx).runtime.ctx = ctx;
    }

    pub fn saved_context(&self, idx: usize) -> SavedContext {
        self.partitions.get(idx).runtime.ctx
    }

    /// Assert a platform IRQ signal on a partition; the partition
    /// acknowledges it later with `eoi`.
    pub fn post_irq(&mut self, partition_id: u32, sig: u32) -> Result<(), Error> {
        let idx = self
            .partitions
            .find_index(partition_id)
            .ok_or(Error::NotFound)?;
        let partition = self.partitions.get_mut(idx);
        if sig == 0 || sig & !partition.config.irq_signals != 0 {
            return Err(Error::InvalidParameter);
        }
        partition.runtime.signals |= sig;
        Ok(())
    }
}

/// Read a `T` out of caller-owned memory.
///
/// # Safety
///
/// The range `[ptr, ptr + size_of::<T>())` must have passed the memory
/// validator for the relevant caller first.
pub(crate) unsafe fn mem_read<T: Copy>(ptr: usize) -> T {
    (ptr as *const T).read_unaligned()
}

/// Write a `T` into caller-owned memory.
///
/// # Safety
///
/// Same contract as [`mem_read`], for write access.
pub(crate) unsafe fn mem_write<T: Copy>(ptr: usize, value: T) {
    (ptr as *mut T).write_unaligned(value);
}

/// Byte copy between validated ranges.
///
/// # Safety
///
/// Both ranges must have passed the memory validator and must not overlap.
pub(crate) unsafe fn mem_copy(src: usize, dst: usize, len: usize) {
    core::ptr::copy_nonoverlapping(src as *const u8, dst as *mut u8, len);
}
