use std::rc::Rc;

use tracing::debug;

use crate::{
    Error, GrowthPolicy, Pool, PoolCore, PoolScope, Result, SlotStack, TypeDescriptor,
};

/// Number of slots a pool caches unless told otherwise.
pub(crate) const DEFAULT_CAPACITY: usize = 128;

/// Builder for installing a [`Pool`] for a type.
///
/// This is the low-level installation path. Installing a second pool for a type that already
/// has one is a programming error and is refused. Prefer
/// [`PoolRegistry::create_or_get_pool()`][1], which returns the existing pool instead.
///
/// # Examples
///
/// ```
/// use new_zealand::nz;
/// use type_pool::{GrowthPolicy, Pool, PoolScope, TypeDescriptor};
///
/// let descriptor = TypeDescriptor::builder().layout_of::<[u64; 4]>().build();
///
/// let pool = Pool::builder()
///     .capacity(16)
///     .growth_policy(GrowthPolicy::Geometric { limit: nz!(256) })
///     .scope(PoolScope::Scoped)
///     .install(&descriptor)
///     .unwrap();
///
/// assert!(descriptor.is_pooled());
/// assert_eq!(pool.capacity(), 16);
///
/// drop(pool);
/// assert!(!descriptor.is_pooled());
/// ```
///
/// [1]: crate::PoolRegistry::create_or_get_pool
#[derive(Debug)]
#[must_use]
pub struct PoolBuilder {
    capacity: usize,
    growth_policy: GrowthPolicy,
    scope: PoolScope,
}

impl PoolBuilder {
    #[inline]
    pub(crate) fn new() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            growth_policy: GrowthPolicy::default(),
            scope: PoolScope::default(),
        }
    }

    /// Sets the number of slots the pool caches initially.
    ///
    /// The backing storage for this many slots is reserved when the pool is installed.
    /// Defaults to 128.
    #[inline]
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Sets the [growth policy][GrowthPolicy] of the pool.
    #[inline]
    pub fn growth_policy(mut self, policy: GrowthPolicy) -> Self {
        self.growth_policy = policy;
        self
    }

    /// Records who keeps the pool alive. This is informational for a pool installed through
    /// the builder, because the caller owns the returned handle either way.
    #[inline]
    pub fn scope(mut self, scope: PoolScope) -> Self {
        self.scope = scope;
        self
    }

    /// Installs the pool, intercepting the construction and destruction path of `descriptor`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DoublePoolInstallation`] if the type already has a pool and
    /// [`Error::Allocation`] if the backing storage cannot be reserved. In both cases the
    /// type is left untouched.
    pub fn install(self, descriptor: &Rc<TypeDescriptor>) -> Result<Pool> {
        let saved_hook =
            descriptor
                .direct_hook()
                .ok_or_else(|| Error::DoublePoolInstallation {
                    type_name: descriptor.name().to_string(),
                })?;

        let slots =
            SlotStack::with_capacity(self.capacity).map_err(|source| Error::Allocation {
                type_name: descriptor.name().to_string(),
                capacity: self.capacity,
                source,
            })?;

        let core = Rc::new(PoolCore::new(
            Rc::clone(descriptor),
            saved_hook,
            slots,
            self.growth_policy,
            self.scope,
        ));

        descriptor.intercept(Rc::downgrade(&core));

        debug!(
            type_name = descriptor.name(),
            capacity = self.capacity,
            growth_policy = ?self.growth_policy,
            scope = ?self.scope,
            "pool installed"
        );

        Ok(Pool::from_core(core))
    }
}
