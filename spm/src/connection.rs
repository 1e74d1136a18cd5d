//! Connection pool backing `connect`/`call`/`close` handles.

use crate::config::{HANDLE_BASE, MAX_CONNECTIONS};

#[derive(Debug, Clone, Copy)]
pub struct Connection {
    pub sid: u32,
    pub partition_idx: usize,
    pub client_id: i32,
    /// Reverse handle the service attached with `set_rhandle`.
    pub rhandle: usize,
    /// A request on this connection is currently in flight.
    pub in_call: bool,
}

pub struct ConnectionPool {
    slots: [Option<Connection>; MAX_CONNECTIONS],
}

impl ConnectionPool {
    pub fn new() -> Self {
        Self {
            slots: [None; MAX_CONNECTIONS],
        }
    }

    pub fn alloc(&mut self, conn: Connection) -> Option<usize> {
        let slot = self.slots.iter().position(|s| s.is_none())?;
        self.slots[slot] = Some(conn);
        Some(handle_of(slot))
    }

    pub fn lookup(&self, handle: usize) -> Option<&Connection> {
        self.slots.get(slot_of(handle)?)?.as_ref()
    }

    pub fn lookup_mut(&mut self, handle: usize) -> Option<&mut Connection> {
        self.slots.get_mut(slot_of(handle)?)?.as_mut()
    }

    pub fn free(&mut self, handle: usize) -> Option<Connection> {
        self.slots.get_mut(slot_of(handle)?)?.take()
    }
}

impl Default for ConnectionPool {
    fn default() -> Self {
        Self::new()
    }
}

pub fn handle_of(slot: usize) -> usize {
    HANDLE_BASE + slot
}

fn slot_of(handle: usize) -> Option<usize> {
    let slot = handle.checked_sub(HANDLE_BASE)?;
    (slot < MAX_CONNECTIONS).then_some(slot)
}
