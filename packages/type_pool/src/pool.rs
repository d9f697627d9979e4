use std::any::type_name;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::ptr::NonNull;
use std::rc::Rc;

use tracing::{debug, trace, warn};

use crate::metrics::{
    ACQUIRE_HITS, ACQUIRE_MISSES, FLUSHED_SLOTS, RELEASE_RECYCLED, RELEASE_SPILLED,
};
use crate::{
    DeallocHook, GrowthPolicy, PoolBuilder, PoolScope, PoolStats, SlotStack, TypeDescriptor,
};

/// A freelist of raw memory slots that recycles the instances of one type.
///
/// While a pool exists, it intercepts the construction and destruction path of its
/// [`TypeDescriptor`]:
///
/// * [`TypeDescriptor::allocate()`] hands out the most recently released slot if there is
///   one and only falls through to the host allocator when the pool is empty.
/// * [`TypeDescriptor::destroy()`] still finalizes the instance, but then keeps the memory
///   block in the pool instead of releasing it, as long as the pool has room.
///
/// Pooling recycles only memory. Instances are always finalized on release and must always be
/// constructed in place after acquisition, so callers cannot tell a recycled slot from a
/// fresh allocation.
///
/// # Enabled and disabled
///
/// A disabled pool caches nothing and passes every request straight to the host allocator
/// and the original deallocation hook, exactly as if no pool existed. It still holds on to the
/// type, so no second pool can be installed for it. Use [`disable()`][Self::disable] during
/// host shutdown or other phases in which recycling must not happen.
///
/// # Lifetime
///
/// `Pool` is a cheap handle; clones refer to the same pool. When the last handle is dropped,
/// the pool releases all cached slots through the original deallocation hook and puts that
/// hook back on the type.
///
/// # Examples
///
/// ```
/// use type_pool::{Pool, TypeDescriptor};
///
/// let descriptor = TypeDescriptor::builder().layout_of::<u64>().build();
/// let pool = Pool::builder().capacity(4).install(&descriptor).unwrap();
///
/// let block = descriptor.allocate();
/// // SAFETY: The block is valid for u64 writes and holds an initialized u64 afterwards.
/// unsafe {
///     block.cast::<u64>().write(42);
///     descriptor.destroy(block);
/// }
///
/// // The block was kept by the pool and is handed out again.
/// assert_eq!(pool.len(), 1);
/// assert_eq!(descriptor.allocate(), block);
/// assert_eq!(pool.len(), 0);
/// # unsafe { descriptor.free(block) };
/// ```
///
/// # Thread safety
///
/// The pool is neither [`Send`] nor [`Sync`]. All operations on a pool and its type are
/// expected to happen on one thread, which is what makes them lock-free.
#[derive(Clone, Debug)]
pub struct Pool {
    core: Rc<PoolCore>,
}

impl Pool {
    /// Creates a builder for installing a new pool for a type.
    ///
    /// Most callers should use [`PoolRegistry::create_or_get_pool()`][1] instead, which
    /// returns the existing pool if the type already has one.
    ///
    /// [1]: crate::PoolRegistry::create_or_get_pool
    #[inline]
    pub fn builder() -> PoolBuilder {
        PoolBuilder::new()
    }

    pub(crate) fn from_core(core: Rc<PoolCore>) -> Self {
        Self { core }
    }

    /// Obtains memory for a new instance of the pooled type.
    ///
    /// If the pool is enabled and holds a cached slot, the most recently released slot is
    /// returned. Otherwise, fresh memory is obtained from the host allocator. Either way,
    /// the contents are uninitialized.
    ///
    /// This never grows the pool.
    ///
    /// # Panics
    ///
    /// Calls [`std::alloc::handle_alloc_error()`] if the host allocator is out of memory.
    #[must_use]
    pub fn acquire(&self) -> NonNull<u8> {
        self.core.acquire()
    }

    /// Finalizes an instance and keeps its memory for reuse if the pool has room.
    ///
    /// If the pool is disabled or full (and its growth policy does not allow it to grow), the
    /// memory is released through the original deallocation hook instead.
    ///
    /// This is equivalent to [`TypeDescriptor::destroy()`] on the pooled type.
    ///
    /// # Safety
    ///
    /// The caller must ensure that `ptr` was obtained from [`acquire()`][Self::acquire] or
    /// from [`TypeDescriptor::allocate()`] of the pooled type, holds an initialized instance and
    /// is not used after this call.
    pub unsafe fn release(&self, ptr: NonNull<u8>) {
        // SAFETY: Forwarding safety requirements to the caller.
        unsafe {
            self.core.descriptor.finalize(ptr);
        }

        // SAFETY: The contents were finalized above. Remaining requirements forwarded to caller.
        unsafe {
            self.core.recycle(ptr);
        }
    }

    /// Switches the pool to pass-through mode and releases all cached slots through the
    /// original deallocation hook.
    ///
    /// Calling this on a disabled pool has no effect.
    pub fn disable(&self) {
        let was_enabled = self.core.enabled.replace(false);
        let flushed = self.core.flush();

        if was_enabled {
            debug!(type_name = self.core.descriptor.name(), flushed, "pool disabled");
        }
    }

    /// Switches the pool back from pass-through mode to recycling slots.
    ///
    /// Calling this on an enabled pool has no effect.
    pub fn enable(&self) {
        if !self.core.enabled.replace(true) {
            debug!(type_name = self.core.descriptor.name(), "pool enabled");
        }
    }

    /// Returns a handle to this pool, guaranteed to be enabled.
    ///
    /// A disabled pool is enabled in place, starting with no cached slots and its initial
    /// capacity. An enabled pool is returned as it is. There is never more than one pool per
    /// type, so this does not create a second pool next to the existing one.
    #[must_use]
    pub fn new_enabled(&self) -> Self {
        if !self.core.enabled.get() {
            self.core
                .slots
                .borrow_mut()
                .reset_empty(self.core.initial_capacity);

            self.enable();
        }

        self.clone()
    }

    /// Whether the pool is recycling slots.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.core.enabled.get()
    }

    /// The number of cached slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.core.slots.borrow().len()
    }

    /// Whether the pool holds no cached slots.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.core.slots.borrow().is_empty()
    }

    /// The number of slots the pool is willing to cache before it grows or spills.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.core.slots.borrow().allocated()
    }

    /// The type this pool recycles instances of.
    #[must_use]
    pub fn descriptor(&self) -> &Rc<TypeDescriptor> {
        &self.core.descriptor
    }

    /// Who keeps this pool alive.
    #[must_use]
    pub fn scope(&self) -> PoolScope {
        self.core.scope.get()
    }

    pub(crate) fn set_scope(&self, scope: PoolScope) {
        self.core.scope.set(scope);
    }

    /// The growth policy the pool applies when a slot is released into a full pool.
    #[must_use]
    pub fn growth_policy(&self) -> GrowthPolicy {
        self.core.growth_policy
    }

    /// Takes a snapshot of the state and history of the pool.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        let slots = self.core.slots.borrow();
        let counters = &self.core.counters;

        PoolStats {
            type_name: self.core.descriptor.name().to_string(),
            enabled: self.core.enabled.get(),
            scope: self.core.scope.get(),
            size: slots.len(),
            allocated: slots.allocated(),
            hits: counters.hits.get(),
            misses: counters.misses.get(),
            recycled: counters.recycled.get(),
            spilled: counters.spilled.get(),
            flushed: counters.flushed.get(),
        }
    }

    /// Whether two handles refer to the same pool.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.core, &other.core)
    }
}

#[derive(Debug, Default)]
struct Counters {
    hits: Cell<u64>,
    misses: Cell<u64>,
    recycled: Cell<u64>,
    spilled: Cell<u64>,
    flushed: Cell<u64>,
}

fn bump(counter: &Cell<u64>) {
    counter.set(counter.get().wrapping_add(1));
}

/// The shared state behind all [`Pool`] handles of one pool.
///
/// The type descriptor refers to this weakly while the pool intercepts it.
pub(crate) struct PoolCore {
    descriptor: Rc<TypeDescriptor>,

    /// The deallocation hook of the type before this pool intercepted it. Every slot the pool
    /// does not keep goes here, and it is put back on the type when the pool is dropped.
    saved_hook: DeallocHook,

    enabled: Cell<bool>,
    scope: Cell<PoolScope>,

    /// Capacity restored by `new_enabled()`.
    initial_capacity: usize,
    growth_policy: GrowthPolicy,

    /// Never borrowed across a call into foreign code (finalizers, hooks, host allocator),
    /// so reentrant pool operations from such code always find it available.
    slots: RefCell<SlotStack>,

    counters: Counters,
}

impl PoolCore {
    pub(crate) fn new(
        descriptor: Rc<TypeDescriptor>,
        saved_hook: DeallocHook,
        slots: SlotStack,
        growth_policy: GrowthPolicy,
        scope: PoolScope,
    ) -> Self {
        Self {
            descriptor,
            saved_hook,
            enabled: Cell::new(true),
            scope: Cell::new(scope),
            initial_capacity: slots.allocated(),
            growth_policy,
            slots: RefCell::new(slots),
            counters: Counters::default(),
        }
    }

    fn acquire(&self) -> NonNull<u8> {
        if self.enabled.get() {
            let cached = self
                .slots
                .try_borrow_mut()
                .ok()
                .and_then(|mut slots| slots.pop());

            if let Some(slot) = cached {
                bump(&self.counters.hits);
                ACQUIRE_HITS.with(|e| e.observe_once());
                return slot;
            }
        }

        bump(&self.counters.misses);
        ACQUIRE_MISSES.with(|e| e.observe_once());

        self.descriptor.allocate_from_host()
    }

    /// Keeps a finalized block for reuse or hands it to the saved hook.
    ///
    /// # Safety
    ///
    /// The caller must ensure that `ptr` is a finalized block of the pooled type that the
    /// caller owns. Ownership of the block passes to the pool.
    pub(crate) unsafe fn recycle(&self, ptr: NonNull<u8>) {
        let kept = self.enabled.get()
            && self
                .slots
                .try_borrow_mut()
                .is_ok_and(|mut slots| self.push_or_grow(&mut slots, ptr));

        if kept {
            bump(&self.counters.recycled);
            RELEASE_RECYCLED.with(|e| e.observe_once());
            return;
        }

        bump(&self.counters.spilled);
        RELEASE_SPILLED.with(|e| e.observe_once());
        trace!(
            type_name = self.descriptor.name(),
            enabled = self.enabled.get(),
            "slot spilled to the original deallocation hook"
        );

        // SAFETY: Forwarding safety requirements to the caller.
        unsafe {
            self.saved_hook.invoke(&self.descriptor, ptr);
        }
    }

    /// Returns whether the slot was kept.
    fn push_or_grow(&self, slots: &mut SlotStack, ptr: NonNull<u8>) -> bool {
        if slots.is_full() {
            let Some(target) = self.growth_policy.next_capacity(slots.allocated()) else {
                return false;
            };

            // Growth failure is not an error for the caller, we simply do not keep the slot.
            if let Err(error) = slots.grow_to(target) {
                warn!(
                    type_name = self.descriptor.name(),
                    target,
                    %error,
                    "cannot grow pool, releasing slot instead"
                );
                return false;
            }

            trace!(
                type_name = self.descriptor.name(),
                capacity = target,
                "pool grown"
            );
        }

        slots.push(ptr).is_ok()
    }

    /// Releases all cached slots through the saved hook. Returns how many there were.
    #[cfg_attr(test, mutants::skip)] // Can be mutated to an infinite loop.
    fn flush(&self) -> usize {
        let mut flushed = 0_usize;

        loop {
            // The borrow ends with this statement, before the hook runs.
            let Some(slot) = self.slots.borrow_mut().pop() else {
                break;
            };

            // SAFETY: Cached slots are finalized blocks of the pooled type owned by the pool.
            unsafe {
                self.saved_hook.invoke(&self.descriptor, slot);
            }

            bump(&self.counters.flushed);

            // Cannot overflow because every slot is a distinct live memory block.
            flushed = flushed.wrapping_add(1);
        }

        if flushed > 0 {
            FLUSHED_SLOTS.with(|e| e.batch(flushed).observe_once());
        }

        flushed
    }
}

impl Drop for PoolCore {
    fn drop(&mut self) {
        // Put the original hook back first, so anything the flush triggers bypasses the pool.
        self.descriptor.restore(self.saved_hook.clone());

        let flushed = self.flush();

        debug!(
            type_name = self.descriptor.name(),
            flushed,
            "pool torn down"
        );
    }
}

impl fmt::Debug for PoolCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("type_name", &self.descriptor.name())
            .field("saved_hook", &self.saved_hook)
            .field("enabled", &self.enabled.get())
            .field("scope", &self.scope.get())
            .field("initial_capacity", &self.initial_capacity)
            .field("growth_policy", &self.growth_policy)
            .field("slots", &self.slots)
            .field("counters", &self.counters)
            .finish()
    }
}
