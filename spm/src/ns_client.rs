//! Non-secure client identity bookkeeping.
//!
//! The non-secure scheduler owns its execution contexts; the SPM only maps
//! them onto a bounded pool of opaque client identifiers through the four
//! hand-off hooks (alloc/free/load/store). Slot 0 is the default context
//! used when the non-secure side never opts into multi-context
//! identification.

use crate::config::{NS_CLIENT_ID_START, NS_CLIENT_SLOTS};

pub const DEFAULT_SLOT: usize = 0;

const NO_SLOT: usize = usize::MAX;

/// Execution mode of the non-secure caller at the hand-off hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecMode {
    Thread,
    Handler,
}

/// Failure reasons for `alloc_context`, kept apart so a contract violation
/// is never mistaken for plain pool exhaustion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocError {
    /// Called from thread mode; the hand-off contract requires handler mode.
    ThreadMode,
    Exhausted,
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    id: i32,
    in_use: bool,
    next_free: usize,
}

pub struct NsClientTable {
    slots: [Slot; NS_CLIENT_SLOTS],
    free_head: usize,
    active: Option<usize>,
    next_id: i32,
}

impl NsClientTable {
    pub fn new() -> Self {
        let mut slots = [Slot {
            id: 0,
            in_use: false,
            next_free: NO_SLOT,
        }; NS_CLIENT_SLOTS];

        // Slot 0 is the default context and never sits on the free list.
        for i in 1..NS_CLIENT_SLOTS - 1 {
            slots[i].next_free = i + 1;
        }

        Self {
            slots,
            free_head: if NS_CLIENT_SLOTS > 1 { 1 } else { NO_SLOT },
            active: None,
            next_id: NS_CLIENT_ID_START,
        }
    }

    fn fresh_id(&mut self) -> i32 {
        let id = self.next_id;
        self.next_id = match id.checked_sub(1) {
            Some(next) if next < 0 => next,
            // would leave the negative range: reset to the start value
            _ => NS_CLIENT_ID_START,
        };
        id
    }

    /// Establish the default context. Called once at boot, before any
    /// non-secure code runs.
    pub fn configure_default(&mut self) {
        let id = self.fresh_id();
        self.slots[DEFAULT_SLOT].id = id;
        self.slots[DEFAULT_SLOT].in_use = true;
        self.active = Some(DEFAULT_SLOT);
    }

    /// Pop a free slot and assign it a fresh identifier. Only legal from
    /// handler (trap) context.
    pub fn alloc_context(&mut self, mode: ExecMode) -> Result<usize, AllocError> {
        if mode == ExecMode::Thread {
            return Err(AllocError::ThreadMode);
        }
        let slot = self.free_head;
        if slot == NO_SLOT {
            return Err(AllocError::Exhausted);
        }
        self.free_head = self.slots[slot].next_free;
        self.slots[slot].id = self.fresh_id();
        self.slots[slot].in_use = true;
        self.slots[slot].next_free = NO_SLOT;
        Ok(slot)
    }

    pub fn free_context(&mut self, slot: usize) -> bool {
        if slot == DEFAULT_SLOT || slot >= NS_CLIENT_SLOTS || !self.slots[slot].in_use {
            return false;
        }
        self.slots[slot].in_use = false;
        self.slots[slot].next_free = self.free_head;
        self.free_head = slot;
        if self.active == Some(slot) {
            self.active = Some(DEFAULT_SLOT);
        }
        true
    }

    pub fn load_context(&mut self, slot: usize) -> bool {
        if slot >= NS_CLIENT_SLOTS || !self.slots[slot].in_use {
            return false;
        }
        self.active = Some(slot);
        true
    }

    /// Confirm-and-deactivate: the slot must currently be the active one.
    pub fn store_context(&mut self, slot: usize) -> bool {
        if slot >= NS_CLIENT_SLOTS || self.active != Some(slot) {
            return false;
        }
        self.active = None;
        true
    }

    pub fn current_client_id(&self) -> i32 {
        match self.active {
            Some(slot) => self.slots[slot].id,
            None => 0,
        }
    }

    /// Veneer-boundary form of `alloc_context`: plain success/failure plus
    /// an out-parameter, matching the non-secure-callable convention of
    /// the other three hooks.
    pub fn handoff_alloc(&mut self, mode: ExecMode, out_slot: &mut usize) -> bool {
        match self.alloc_context(mode) {
            Ok(slot) => {
                *out_slot = slot;
                true
            }
            Err(err) => {
                warn!("ns context alloc refused: {:?}", err);
                false
            }
        }
    }
}

impl Default for NsClientTable {
    fn default() -> Self {
        Self::new()
    }
}
