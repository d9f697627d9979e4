use std::alloc::{self, Layout};
use std::fmt::Debug;
use std::ptr::NonNull;

/// The allocator that owns the memory of instances when no pool recycles them.
///
/// Every [`TypeDescriptor`][crate::TypeDescriptor] refers to one host allocator. Pools fall
/// through to it when they have no cached slot to hand out and spill to it (via the saved
/// deallocation hook) when they cannot keep a released slot.
///
/// # Safety
///
/// Instances are constructed in and referenced through the blocks this allocator returns, so
/// implementations must guarantee that every block returned by
/// [`allocate()`][Self::allocate]:
///
/// * is valid for reads and writes of `layout.size()` bytes,
/// * is aligned to `layout.align()`,
/// * is not aliased by any other live block or reference until it is passed to
///   [`deallocate()`][Self::deallocate].
///
/// Implementing the trait therefore requires `unsafe`:
///
/// ```compile_fail
/// use std::alloc::Layout;
/// use std::ptr::NonNull;
///
/// use type_pool::HostAllocator;
///
/// #[derive(Debug)]
/// struct Dangling;
///
/// impl HostAllocator for Dangling {
///     fn allocate(&self, _layout: Layout) -> Option<NonNull<u8>> {
///         Some(NonNull::dangling())
///     }
///
///     unsafe fn deallocate(&self, _ptr: NonNull<u8>, _layout: Layout) {}
/// }
/// ```
pub unsafe trait HostAllocator: Debug {
    /// Allocates a raw block of memory matching `layout`.
    ///
    /// The contents of the block are uninitialized. Returns `None` if the allocation failed.
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>>;

    /// Returns a block of memory to the allocator.
    ///
    /// # Safety
    ///
    /// The caller must ensure that `ptr` was returned by [`allocate()`][Self::allocate] of the
    /// same allocator with the same `layout` and has not been deallocated since.
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout);
}

/// A [`HostAllocator`] backed by the Rust global allocator.
///
/// This is the default allocator of a [`TypeDescriptor`][crate::TypeDescriptor].
#[derive(Clone, Copy, Debug, Default)]
#[expect(clippy::exhaustive_structs, reason = "intentionally an empty struct")]
pub struct SystemAllocator;

// SAFETY: The global allocator returns blocks that fit `layout` and are not aliased.
unsafe impl HostAllocator for SystemAllocator {
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
        assert!(layout.size() > 0, "cannot allocate zero-sized instances");

        // SAFETY: Layout is guaranteed non-zero-sized by the assertion above.
        NonNull::new(unsafe { alloc::alloc(layout) })
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        // SAFETY: Forwarding safety requirements to the caller.
        unsafe {
            alloc::dealloc(ptr.as_ptr(), layout);
        }
    }
}
