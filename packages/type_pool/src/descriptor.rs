use std::alloc::{Layout, handle_alloc_error};
use std::any::{TypeId, type_name};
use std::cell::RefCell;
use std::fmt;
use std::ptr::{self, NonNull};
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::{HostAllocator, Pool, PoolCore, TypeDescriptorBuilder};

/// Global counter for generating unique descriptor IDs.
static DESCRIPTOR_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Generates a unique descriptor ID.
pub(crate) fn generate_descriptor_id() -> u64 {
    DESCRIPTOR_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Tears down the contents of an instance without releasing its memory.
///
/// Receives a pointer to an initialized instance. After the call, the memory block is
/// considered uninitialized.
pub type Finalizer = unsafe fn(NonNull<u8>);

/// Routine that releases the memory block of a finalized instance.
///
/// This is the replaceable part of the destruction path of a type. Installing a pool for a
/// type swaps the hook for one that recycles the block. The pool keeps the previous hook and
/// calls it for every block it does not keep.
#[derive(Clone, Default)]
#[non_exhaustive]
pub enum DeallocHook {
    /// Return the block to the host allocator of the type. This is the default.
    #[default]
    Host,

    /// Call a host-provided routine. The routine receives a finalized block that it now owns
    /// and is expected to eventually release it, typically via
    /// [`TypeDescriptor::free_to_host()`].
    Custom(Rc<dyn Fn(&TypeDescriptor, NonNull<u8>)>),
}

impl DeallocHook {
    /// Creates a [`DeallocHook::Custom`] from a closure.
    #[must_use]
    pub fn custom(f: impl Fn(&TypeDescriptor, NonNull<u8>) + 'static) -> Self {
        Self::Custom(Rc::new(f))
    }

    /// # Safety
    ///
    /// The caller must ensure that `ptr` is a finalized block of `descriptor` that the caller
    /// owns. Ownership of the block passes to the hook.
    pub(crate) unsafe fn invoke(&self, descriptor: &TypeDescriptor, ptr: NonNull<u8>) {
        match self {
            // SAFETY: Forwarding safety requirements to the caller.
            Self::Host => unsafe { descriptor.free_to_host(ptr) },
            Self::Custom(f) => f(descriptor, ptr),
        }
    }
}

impl fmt::Debug for DeallocHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Host => write!(f, "Host"),
            Self::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

/// What the type currently does with released blocks.
#[derive(Clone, Debug)]
enum HookSlot {
    Direct(DeallocHook),

    /// A pool recycles the blocks. The pool owns the saved original hook and puts it back
    /// before it goes away, so the weak reference is always upgradeable while installed.
    Intercepted(Weak<PoolCore>),
}

/// Describes one fixed-size object type and owns its construction and destruction path.
///
/// All code that creates instances of the type is expected to obtain memory via
/// [`allocate()`][Self::allocate] and all code that destroys instances is expected to go
/// through [`destroy()`][Self::destroy] (or [`free()`][Self::free] for blocks whose contents
/// were already moved out). These two entry points are where a [`Pool`] intercepts the type,
/// so callers do not need to know whether pooling is active.
///
/// Use [`Instance<T>`][crate::Instance] for a typed handle that routes through these entry
/// points automatically.
///
/// # Examples
///
/// ```
/// use type_pool::TypeDescriptor;
///
/// let descriptor = TypeDescriptor::builder()
///     .name("Integer")
///     .layout_of::<[u64; 2]>()
///     .build();
///
/// let block = descriptor.allocate();
///
/// // SAFETY: The block is valid for writes of the descriptor layout.
/// unsafe { block.cast::<[u64; 2]>().write([1, 2]) };
///
/// // SAFETY: The block was obtained from this descriptor and holds an initialized instance.
/// unsafe { descriptor.destroy(block) };
/// ```
///
/// # Thread safety
///
/// Descriptors are neither [`Send`] nor [`Sync`]. Pooling is designed for hosts in which only
/// one thread manipulates objects at a time.
pub struct TypeDescriptor {
    id: u64,
    name: String,
    layout: Layout,

    /// Present if the descriptor was built from a Rust type, which enables typed handles.
    type_id: Option<TypeId>,

    finalizer: Option<Finalizer>,
    allocator: Rc<dyn HostAllocator>,
    dealloc_hook: RefCell<HookSlot>,
}

impl TypeDescriptor {
    /// Creates a builder for configuring and constructing a [`TypeDescriptor`].
    #[inline]
    pub fn builder() -> TypeDescriptorBuilder {
        TypeDescriptorBuilder::new()
    }

    pub(crate) fn new_inner(
        name: String,
        layout: Layout,
        type_id: Option<TypeId>,
        finalizer: Option<Finalizer>,
        allocator: Rc<dyn HostAllocator>,
        dealloc_hook: DeallocHook,
    ) -> Self {
        assert!(
            layout.size() > 0,
            "TypeDescriptor must have non-zero instance size"
        );

        Self {
            id: generate_descriptor_id(),
            name,
            layout,
            type_id,
            finalizer,
            allocator,
            dealloc_hook: RefCell::new(HookSlot::Direct(dealloc_hook)),
        }
    }

    /// Unique identifier of the descriptor within the process.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Human-readable name of the type.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Memory layout of one instance.
    #[must_use]
    pub fn layout(&self) -> Layout {
        self.layout
    }

    #[must_use]
    pub(crate) fn type_id(&self) -> Option<TypeId> {
        self.type_id
    }

    /// Whether a pool currently intercepts this type.
    ///
    /// This remains `true` while the pool is disabled. A disabled pool passes all requests
    /// through but still holds the type, so no second pool can be installed.
    #[must_use]
    pub fn is_pooled(&self) -> bool {
        matches!(*self.dealloc_hook.borrow(), HookSlot::Intercepted(_))
    }

    /// Returns a handle to the pool that intercepts this type, if any.
    #[must_use]
    pub fn pool(&self) -> Option<Pool> {
        match &*self.dealloc_hook.borrow() {
            HookSlot::Direct(_) => None,
            HookSlot::Intercepted(core) => core.upgrade().map(Pool::from_core),
        }
    }

    /// Obtains memory for a new instance of the type.
    ///
    /// If a pool intercepts the type, the memory may be a recycled block. Either way, the
    /// contents are uninitialized and the caller must construct the instance in place.
    ///
    /// # Panics
    ///
    /// Calls [`handle_alloc_error()`] if the host allocator is out of memory.
    #[must_use]
    pub fn allocate(&self) -> NonNull<u8> {
        match self.pool() {
            Some(pool) => pool.acquire(),
            None => self.allocate_from_host(),
        }
    }

    /// Obtains memory for a new instance straight from the host allocator, bypassing any pool.
    pub(crate) fn allocate_from_host(&self) -> NonNull<u8> {
        self.allocator
            .allocate(self.layout)
            .unwrap_or_else(|| handle_alloc_error(self.layout))
    }

    /// Finalizes an instance and releases its memory block through the deallocation hook.
    ///
    /// # Safety
    ///
    /// The caller must ensure that `ptr` was obtained from [`allocate()`][Self::allocate] of
    /// this descriptor, holds an initialized instance and is not used after this call.
    pub unsafe fn destroy(&self, ptr: NonNull<u8>) {
        // SAFETY: Forwarding safety requirements to the caller.
        unsafe {
            self.finalize(ptr);
        }

        // SAFETY: The contents were finalized above. Remaining requirements forwarded to caller.
        unsafe {
            self.free(ptr);
        }
    }

    /// Tears down the contents of an instance without releasing its memory block.
    ///
    /// # Safety
    ///
    /// The caller must ensure that `ptr` holds an initialized instance of this type. The
    /// contents are uninitialized after the call.
    pub unsafe fn finalize(&self, ptr: NonNull<u8>) {
        if let Some(finalizer) = self.finalizer {
            // SAFETY: Forwarding safety requirements to the caller.
            unsafe {
                finalizer(ptr);
            }
        }
    }

    /// Releases the memory block of a finalized instance through the deallocation hook.
    ///
    /// If a pool intercepts the type, the block may be kept for reuse.
    ///
    /// # Safety
    ///
    /// The caller must ensure that `ptr` was obtained from [`allocate()`][Self::allocate] of
    /// this descriptor, that its contents are finalized (or were never initialized) and that
    /// it is not used after this call.
    pub unsafe fn free(&self, ptr: NonNull<u8>) {
        // Clone the hook out so that the routine we call may reenter the descriptor.
        let hook = self.dealloc_hook.borrow().clone();

        match hook {
            // SAFETY: Forwarding safety requirements to the caller.
            HookSlot::Direct(hook) => unsafe { hook.invoke(self, ptr) },
            HookSlot::Intercepted(core) => {
                let core = core
                    .upgrade()
                    .expect("a pool restores the original hook before it is dropped");

                // SAFETY: Forwarding safety requirements to the caller.
                unsafe { core.recycle(ptr) };
            }
        }
    }

    /// Returns a memory block to the host allocator, bypassing the deallocation hook.
    ///
    /// This is what [`DeallocHook::Host`] does. Custom hooks call it to finish releasing.
    ///
    /// # Safety
    ///
    /// The caller must ensure that `ptr` was obtained from [`allocate()`][Self::allocate] of
    /// this descriptor, that its contents are finalized and that it is not used after this call.
    pub unsafe fn free_to_host(&self, ptr: NonNull<u8>) {
        // SAFETY: Every block of this descriptor comes from this allocator with this layout,
        // whether it went through a pool or not. Remaining requirements forwarded to caller.
        unsafe {
            self.allocator.deallocate(ptr, self.layout);
        }
    }

    /// Returns the direct hook, or `None` if a pool already intercepts the type.
    pub(crate) fn direct_hook(&self) -> Option<DeallocHook> {
        match &*self.dealloc_hook.borrow() {
            HookSlot::Direct(hook) => Some(hook.clone()),
            HookSlot::Intercepted(_) => None,
        }
    }

    /// Routes released blocks to `core` from now on.
    ///
    /// # Panics
    ///
    /// Panics if the type is already intercepted. Callers check [`direct_hook()`] first.
    pub(crate) fn intercept(&self, core: Weak<PoolCore>) {
        let previous = self.dealloc_hook.replace(HookSlot::Intercepted(core));

        assert!(
            matches!(previous, HookSlot::Direct(_)),
            "type '{}' was intercepted by two pools at once",
            self.name
        );
    }

    /// Puts back the hook that was in place before a pool intercepted the type.
    pub(crate) fn restore(&self, hook: DeallocHook) {
        *self.dealloc_hook.borrow_mut() = HookSlot::Direct(hook);
    }
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("id", &self.id)
            .field("name", &self.name)
            .field("layout", &self.layout)
            .field("allocator", &self.allocator)
            .field("pooled", &self.is_pooled())
            .finish_non_exhaustive()
    }
}

/// Finalizer that drops a `T` in place.
///
/// # Safety
///
/// The caller must ensure that `ptr` points to an initialized `T`.
pub(crate) unsafe fn drop_as<T>(ptr: NonNull<u8>) {
    // SAFETY: Forwarding safety requirements to the caller.
    unsafe {
        ptr::drop_in_place(ptr.cast::<T>().as_ptr());
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::cell::Cell;
    use std::mem;

    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use super::*;
    use crate::SystemAllocator;

    assert_impl_all!(TypeDescriptor: fmt::Debug);
    assert_not_impl_any!(TypeDescriptor: Send, Sync);
    assert_not_impl_any!(DeallocHook: Send, Sync);

    #[test]
    fn ids_are_unique() {
        let a = TypeDescriptor::builder().layout_of::<u32>().build();
        let b = TypeDescriptor::builder().layout_of::<u32>().build();

        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn unpooled_descriptor_uses_direct_hook() {
        let descriptor = TypeDescriptor::builder().layout_of::<u64>().build();

        assert!(!descriptor.is_pooled());
        assert!(descriptor.pool().is_none());
        assert!(matches!(descriptor.direct_hook(), Some(DeallocHook::Host)));
    }

    #[test]
    fn destroy_runs_finalizer_then_hook() {
        thread_local! {
            static FINALIZED: Cell<usize> = const { Cell::new(0) };
        }

        unsafe fn count_finalize(_ptr: NonNull<u8>) {
            FINALIZED.with(|f| f.set(f.get().wrapping_add(1)));
        }

        let released = Rc::new(Cell::new(0_usize));
        let released_clone = Rc::clone(&released);

        let descriptor = TypeDescriptor::builder()
            .layout_of::<u64>()
            .finalizer(count_finalize)
            .dealloc_hook(DeallocHook::custom(move |descriptor, ptr| {
                // The finalizer must already have run by the time the hook sees the block.
                assert_eq!(FINALIZED.with(Cell::get), 1);
                released_clone.set(released_clone.get().wrapping_add(1));

                // SAFETY: The hook owns the finalized block.
                unsafe { descriptor.free_to_host(ptr) };
            }))
            .build();

        let block = descriptor.allocate();

        // SAFETY: Block was allocated by the descriptor and is valid for u64 writes.
        unsafe {
            block.cast::<u64>().write(7);
            descriptor.destroy(block);
        }

        assert_eq!(FINALIZED.with(Cell::get), 1);
        assert_eq!(released.get(), 1);
    }

    #[test]
    fn free_skips_finalizer() {
        struct Flag(Rc<Cell<bool>>);

        impl Drop for Flag {
            fn drop(&mut self) {
                self.0.set(true);
            }
        }

        let dropped = Rc::new(Cell::new(false));
        let descriptor = TypeDescriptor::builder().layout_of::<Flag>().build();
        let block = descriptor.allocate();

        // SAFETY: Block is valid for Flag writes; we move the value back out before freeing.
        let value = unsafe {
            block.cast::<Flag>().write(Flag(Rc::clone(&dropped)));
            let value = block.cast::<Flag>().read();
            descriptor.free(block);
            value
        };

        assert!(!dropped.get());
        drop(value);
        assert!(dropped.get());
    }

    #[test]
    fn drop_as_drops_value() {
        let tracker = Rc::new(());
        let mut value = Some(Rc::clone(&tracker));
        assert_eq!(Rc::strong_count(&tracker), 2);

        // SAFETY: value is an initialized Option<Rc<()>> and we forget it afterwards.
        unsafe { drop_as::<Option<Rc<()>>>(NonNull::from(&mut value).cast()) };
        mem::forget(value);

        assert_eq!(Rc::strong_count(&tracker), 1);
    }

    #[test]
    fn debug_output_names_type() {
        let descriptor = TypeDescriptor::builder()
            .name("Rational")
            .layout_of::<[u64; 4]>()
            .allocator(Rc::new(SystemAllocator))
            .build();

        let debug_output = format!("{descriptor:?}");
        assert!(debug_output.contains("Rational"));
        assert!(debug_output.contains("pooled: false"));
    }

    #[test]
    fn dealloc_hook_debug_hides_closure() {
        assert_eq!(format!("{:?}", DeallocHook::Host), "Host");
        assert_eq!(
            format!("{:?}", DeallocHook::custom(|_, _| {})),
            "Custom(..)"
        );
    }
}
