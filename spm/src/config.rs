//! Compile-time capacities and reserved identifiers.

/// Capacity of the partition table, the two built-in pseudo-partitions
/// included.
pub const MAX_PARTITIONS: usize = 8;

/// Upper bound on `in_len + out_len` for one request.
pub const MAX_IOVEC: usize = 4;

/// Concurrent connections across all services.
pub const MAX_CONNECTIONS: usize = 8;

/// Non-secure client context slots, the default slot included.
pub const NS_CLIENT_SLOTS: usize = 8;

/// First non-secure client id handed out; allocation counts downwards and
/// resets here if the decrement would leave the negative range.
pub const NS_CLIENT_ID_START: i32 = -1;

/// Partition id of the non-secure world, modelled as one pseudo-partition.
pub const NON_SECURE_ID: u32 = 0;

/// Partition id of the SPM core itself; caller identity for boot-time
/// init calls issued before any non-secure execution starts.
pub const CORE_ID: u32 = 1;

/// Matches no real partition.
pub const INVALID_PARTITION_ID: u32 = u32::MAX;

/// Matches no slot in the partition table.
pub const INVALID_PARTITION_IDX: usize = usize::MAX;

/// The reserved connection handle: `close(NULL_HANDLE)` is a no-op.
pub const NULL_HANDLE: usize = 0;

/// Live connection handles are `HANDLE_BASE + pool slot`.
pub const HANDLE_BASE: usize = 0x2800_0000;

/// Message handles for requests that bypass the connection pool
/// (sfn-model requests and boot-time init calls).
pub const SFN_HANDLE_BASE: usize = 0x5f00_0000;

pub const SPM_HEAP_SIZE: usize = 64 * 1024;
