use std::collections::TryReserveError;
use std::ptr::NonNull;

/// A capacity-bounded stack of raw memory slots.
///
/// The stack does not know what the slots are for and never touches their contents. It only
/// remembers their addresses. The most recently pushed slot is the first one to be popped,
/// which keeps recently touched memory hot in the cache.
#[derive(Debug)]
pub(crate) struct SlotStack {
    /// Cached slots. The length of this Vec is the number of cached slots.
    elements: Vec<NonNull<u8>>,

    /// The number of slots the stack is willing to hold. We track this separately from the
    /// capacity of `elements` because the Vec may decide to over-allocate.
    allocated: usize,

    /// Makes every `grow_to()` fail, to exercise the recovery paths of callers.
    #[cfg(test)]
    fail_growth: bool,
}

impl SlotStack {
    /// Creates an empty stack, reserving backing storage for `capacity` slots up front.
    pub(crate) fn with_capacity(capacity: usize) -> Result<Self, TryReserveError> {
        let mut elements = Vec::new();
        elements.try_reserve_exact(capacity)?;

        Ok(Self {
            elements,
            allocated: capacity,
            #[cfg(test)]
            fail_growth: false,
        })
    }

    /// The number of cached slots.
    #[must_use]
    #[cfg_attr(test, mutants::skip)] // Can be mutated to infinitely growing memory use.
    pub(crate) fn len(&self) -> usize {
        self.elements.len()
    }

    #[must_use]
    pub(crate) fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// The number of slots the stack can hold before a push is refused.
    #[must_use]
    pub(crate) fn allocated(&self) -> usize {
        self.allocated
    }

    #[must_use]
    pub(crate) fn is_full(&self) -> bool {
        self.elements.len() >= self.allocated
    }

    /// Pushes a slot onto the stack.
    ///
    /// Hands the slot back if the stack is full or if the backing storage cannot be extended.
    pub(crate) fn push(&mut self, slot: NonNull<u8>) -> Result<(), NonNull<u8>> {
        if self.is_full() {
            return Err(slot);
        }

        // Normally a no-op because storage was reserved in advance.
        if self.elements.try_reserve(1).is_err() {
            return Err(slot);
        }

        self.elements.push(slot);

        debug_assert!(self.elements.len() <= self.allocated);
        Ok(())
    }

    /// Pops the most recently pushed slot, if any.
    pub(crate) fn pop(&mut self) -> Option<NonNull<u8>> {
        self.elements.pop()
    }

    /// Raises the slot limit to `capacity`, reserving the backing storage for it.
    ///
    /// On failure the stack is left unchanged.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is smaller than the current limit.
    pub(crate) fn grow_to(&mut self, capacity: usize) -> Result<(), TryReserveError> {
        assert!(
            capacity >= self.allocated,
            "slot stack cannot shrink from {} to {capacity} by growing",
            self.allocated
        );

        #[cfg(test)]
        if self.fail_growth {
            return Vec::<u8>::new().try_reserve(usize::MAX);
        }

        // Cannot underflow because len() <= allocated <= capacity.
        let additional = capacity.wrapping_sub(self.elements.len());
        self.elements.try_reserve_exact(additional)?;
        self.allocated = capacity;

        Ok(())
    }

    /// Sets the slot limit of an empty stack back to `capacity`, releasing surplus storage.
    ///
    /// # Panics
    ///
    /// Panics if the stack is not empty.
    pub(crate) fn reset_empty(&mut self, capacity: usize) {
        assert!(
            self.elements.is_empty(),
            "cannot reset a slot stack that still holds {} slots",
            self.elements.len()
        );

        self.elements.shrink_to(capacity);
        self.allocated = capacity;
    }

    #[cfg(test)]
    pub(crate) fn fail_growth(&mut self) {
        self.fail_growth = true;
    }
}
