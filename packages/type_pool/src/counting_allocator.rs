//! Host allocator test double that counts the traffic reaching the real allocator.

use std::alloc::Layout;
use std::cell::Cell;
use std::ptr::NonNull;

use crate::{HostAllocator, SystemAllocator};

#[derive(Debug, Default)]
pub(crate) struct CountingAllocator {
    allocations: Cell<usize>,
    deallocations: Cell<usize>,
}

impl CountingAllocator {
    pub(crate) fn allocations(&self) -> usize {
        self.allocations.get()
    }

    pub(crate) fn deallocations(&self) -> usize {
        self.deallocations.get()
    }

    pub(crate) fn live(&self) -> usize {
        self.allocations
            .get()
            .checked_sub(self.deallocations.get())
            .expect("more deallocations than allocations")
    }
}

// SAFETY: All blocks come from `SystemAllocator`, which upholds the contract.
unsafe impl HostAllocator for CountingAllocator {
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
        self.allocations.set(self.allocations.get().wrapping_add(1));
        SystemAllocator.allocate(layout)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        self.deallocations
            .set(self.deallocations.get().wrapping_add(1));

        // SAFETY: Forwarding safety requirements to the caller.
        unsafe {
            SystemAllocator.deallocate(ptr, layout);
        }
    }
}
