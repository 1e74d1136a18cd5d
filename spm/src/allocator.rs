use core::mem::MaybeUninit;
use core::ptr::addr_of_mut;
use linked_list_allocator::LockedHeap;

use crate::config::SPM_HEAP_SIZE;

static mut HEAP: [MaybeUninit<u8>; SPM_HEAP_SIZE] = [MaybeUninit::uninit(); SPM_HEAP_SIZE];

#[global_allocator]
static ALLOCATOR: LockedHeap = LockedHeap::empty();

/// # Safety
///
/// Must run exactly once, before the first allocation.
pub unsafe fn init() {
    ALLOCATOR.lock().init_from_slice(&mut *addr_of_mut!(HEAP));
}

pub fn get_used_size() -> usize {
    ALLOCATOR.lock().used()
}
