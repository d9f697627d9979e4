use std::mem;
use std::rc::Rc;

use foldhash::{HashMap, HashMapExt};
use tracing::debug;

use crate::{GrowthPolicy, Pool, PoolScope, PoolStats, Result, TypeDescriptor};

/// Owns the process-wide pools of a host and is the single place pools are created from.
///
/// The host constructs one registry at startup and shuts it down explicitly (or drops it) at
/// teardown. There is no ambient global state: a type is only pooled while some registry or
/// caller holds its pool.
///
/// # Examples
///
/// ```
/// use type_pool::{Instance, PoolRegistry, PoolScope, TypeDescriptor};
///
/// let descriptor = TypeDescriptor::builder()
///     .name("Integer")
///     .layout_of::<u128>()
///     .build();
///
/// let mut registry = PoolRegistry::new();
/// let pool = registry
///     .create_or_get_pool(&descriptor, 100, PoolScope::Global)
///     .unwrap();
///
/// // Ordinary construction and destruction now recycle memory through the pool.
/// let value = Instance::new(&descriptor, 42_u128);
/// drop(value);
/// assert_eq!(pool.len(), 1);
///
/// // Asking again returns the same pool, the capacity request is ignored.
/// let same = registry
///     .create_or_get_pool(&descriptor, 5, PoolScope::Global)
///     .unwrap();
/// assert!(same.ptr_eq(&pool));
/// assert_eq!(same.capacity(), 100);
///
/// drop((pool, same));
/// registry.shutdown();
/// assert!(!descriptor.is_pooled());
/// ```
#[derive(Debug)]
pub struct PoolRegistry {
    /// Global pools keyed by descriptor ID.
    /// We use foldhash for better performance with small hash tables.
    pools: HashMap<u64, Pool>,

    /// Growth policy applied to pools created by this registry.
    growth_policy: GrowthPolicy,
}

impl PoolRegistry {
    /// Creates a registry with default configuration.
    ///
    /// For custom configuration, use [`PoolRegistry::builder()`].
    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Creates a builder for configuring a registry.
    #[inline]
    pub fn builder() -> PoolRegistryBuilder {
        PoolRegistryBuilder::new()
    }

    /// Returns the pool of a type, creating and installing it if the type has none.
    ///
    /// If the type already has a pool, that pool is returned unchanged and `capacity` is
    /// ignored. This is true even if the existing pool is disabled. Use
    /// [`Pool::new_enabled()`] on the result if an active pool is required.
    ///
    /// With [`PoolScope::Global`], the registry keeps the pool alive until it is
    /// [removed][Self::remove] or the registry is shut down. With [`PoolScope::Scoped`], the
    /// pool lives as long as the caller holds the returned handle.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Allocation`][crate::Error::Allocation] if a new pool was needed and
    /// its backing storage could not be reserved.
    pub fn create_or_get_pool(
        &mut self,
        descriptor: &Rc<TypeDescriptor>,
        capacity: usize,
        scope: PoolScope,
    ) -> Result<Pool> {
        let pool = match descriptor.pool() {
            Some(existing) => existing,
            None => Pool::builder()
                .capacity(capacity)
                .growth_policy(self.growth_policy)
                .scope(scope)
                .install(descriptor)?,
        };

        if scope == PoolScope::Global {
            self.pools.entry(descriptor.id()).or_insert_with(|| {
                pool.set_scope(PoolScope::Global);
                pool.clone()
            });
        }

        Ok(pool)
    }

    /// Returns the global pool of a type, if this registry holds one.
    #[must_use]
    pub fn get(&self, descriptor: &TypeDescriptor) -> Option<&Pool> {
        self.pools.get(&descriptor.id())
    }

    /// Releases the registry's hold on the global pool of a type and returns it.
    ///
    /// The pool is torn down once the returned handle and all other handles are dropped.
    pub fn remove(&mut self, descriptor: &TypeDescriptor) -> Option<Pool> {
        self.pools.remove(&descriptor.id())
    }

    /// The number of global pools held by the registry.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pools.len()
    }

    /// Whether the registry holds no global pools.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    /// Switches every global pool to pass-through mode, releasing all cached slots.
    ///
    /// Call this when the host enters a phase in which recycling must not happen, such as
    /// the early stages of its own shutdown.
    pub fn disable_all(&self) {
        for pool in self.pools.values() {
            pool.disable();
        }
    }

    /// Takes a snapshot of every global pool, sorted by type name.
    #[must_use]
    pub fn stats(&self) -> Vec<PoolStats> {
        let mut stats: Vec<_> = self.pools.values().map(Pool::stats).collect();
        stats.sort_by(|a, b| a.type_name().cmp(b.type_name()));
        stats
    }

    /// Tears down the registry, releasing its hold on every global pool.
    ///
    /// Pools that nobody else holds a handle to are torn down immediately, restoring the
    /// original deallocation behavior of their types.
    pub fn shutdown(self) {
        drop(self);
    }
}

impl Default for PoolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for PoolRegistry {
    fn drop(&mut self) {
        let pools = mem::take(&mut self.pools);

        debug!(pool_count = pools.len(), "pool registry shutting down");

        // Dropping the handles tears down every pool that is not held elsewhere.
        drop(pools);
    }
}

/// Builder for creating an instance of [`PoolRegistry`].
#[derive(Debug)]
#[must_use]
pub struct PoolRegistryBuilder {
    growth_policy: GrowthPolicy,
}

impl PoolRegistryBuilder {
    #[inline]
    fn new() -> Self {
        Self {
            growth_policy: GrowthPolicy::default(),
        }
    }

    /// Sets the [growth policy][GrowthPolicy] of pools created by the registry.
    #[inline]
    pub fn growth_policy(mut self, policy: GrowthPolicy) -> Self {
        self.growth_policy = policy;
        self
    }

    /// Builds the registry.
    #[must_use]
    pub fn build(self) -> PoolRegistry {
        PoolRegistry {
            pools: HashMap::new(),
            growth_policy: self.growth_policy,
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::fmt::Debug;

    use new_zealand::nz;
    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use super::*;
    use crate::counting_allocator::CountingAllocator;
    use crate::Error;

    assert_impl_all!(PoolRegistry: Debug, Default);
    assert_not_impl_any!(PoolRegistry: Send, Sync);

    fn descriptor(name: &str) -> Rc<TypeDescriptor> {
        TypeDescriptor::builder().name(name).layout_of::<u64>().build()
    }

    fn recycle_one(descriptor: &TypeDescriptor) {
        let block = descriptor.allocate();
        // SAFETY: Uninitialized u64 block from this descriptor; u64 needs no finalization.
        unsafe { descriptor.free(block) };
    }

    #[test]
    fn new_registry_is_empty() {
        let registry = PoolRegistry::new();

        assert!(registry.is_empty());
        assert_eq!(registry.len(), 0);
        assert!(registry.stats().is_empty());
    }

    #[test]
    fn global_pool_is_registered() {
        let descriptor = descriptor("Integer");
        let mut registry = PoolRegistry::new();

        let pool = registry
            .create_or_get_pool(&descriptor, 4, PoolScope::Global)
            .expect("small pool installs");

        assert_eq!(registry.len(), 1);
        assert!(registry.get(&descriptor).expect("registered").ptr_eq(&pool));
        assert_eq!(pool.scope(), PoolScope::Global);
    }

    #[test]
    fn second_request_returns_first_pool() {
        let descriptor = descriptor("Integer");
        let mut registry = PoolRegistry::new();

        let first = registry
            .create_or_get_pool(&descriptor, 4, PoolScope::Global)
            .expect("small pool installs");
        let second = registry
            .create_or_get_pool(&descriptor, 64, PoolScope::Global)
            .expect("existing pool is returned");

        assert!(first.ptr_eq(&second));
        assert_eq!(second.capacity(), 4);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn scoped_pool_is_not_registered_and_dies_with_handle() {
        let descriptor = descriptor("Rational");
        let mut registry = PoolRegistry::new();

        let pool = registry
            .create_or_get_pool(&descriptor, 4, PoolScope::Scoped)
            .expect("small pool installs");

        assert!(registry.is_empty());
        assert!(descriptor.is_pooled());
        assert_eq!(pool.scope(), PoolScope::Scoped);

        drop(pool);
        assert!(!descriptor.is_pooled());
    }

    #[test]
    fn scoped_pool_is_promoted_by_global_request() {
        let descriptor = descriptor("Rational");
        let mut registry = PoolRegistry::new();

        let scoped = registry
            .create_or_get_pool(&descriptor, 4, PoolScope::Scoped)
            .expect("small pool installs");
        let global = registry
            .create_or_get_pool(&descriptor, 4, PoolScope::Global)
            .expect("existing pool is returned");

        assert!(scoped.ptr_eq(&global));
        assert_eq!(scoped.scope(), PoolScope::Global);
        assert_eq!(registry.len(), 1);

        drop((scoped, global));
        assert!(descriptor.is_pooled());
    }

    #[test]
    fn existing_disabled_pool_is_returned_as_is() {
        let descriptor = descriptor("Integer");
        let mut registry = PoolRegistry::new();

        let pool = registry
            .create_or_get_pool(&descriptor, 4, PoolScope::Global)
            .expect("small pool installs");
        pool.disable();

        let again = registry
            .create_or_get_pool(&descriptor, 4, PoolScope::Global)
            .expect("existing pool is returned");

        assert!(!again.is_enabled());
        assert!(again.new_enabled().is_enabled());
    }

    #[test]
    fn registry_uses_configured_growth_policy() {
        let descriptor = descriptor("Integer");
        let policy = GrowthPolicy::Geometric { limit: nz!(32) };
        let mut registry = PoolRegistry::builder().growth_policy(policy).build();

        let pool = registry
            .create_or_get_pool(&descriptor, 4, PoolScope::Global)
            .expect("small pool installs");

        assert_eq!(pool.growth_policy(), policy);
    }

    #[test]
    fn allocation_failure_is_reported() {
        let descriptor = descriptor("Huge");
        let mut registry = PoolRegistry::new();

        let result = registry.create_or_get_pool(&descriptor, usize::MAX, PoolScope::Global);

        assert!(matches!(result, Err(Error::Allocation { .. })));
        assert!(registry.is_empty());
        assert!(!descriptor.is_pooled());
    }

    #[test]
    fn remove_releases_hold() {
        let descriptor = descriptor("Integer");
        let mut registry = PoolRegistry::new();

        drop(
            registry
                .create_or_get_pool(&descriptor, 4, PoolScope::Global)
                .expect("small pool installs"),
        );
        assert!(descriptor.is_pooled());

        let removed = registry.remove(&descriptor).expect("was registered");
        assert!(registry.is_empty());
        assert!(descriptor.is_pooled());

        drop(removed);
        assert!(!descriptor.is_pooled());
    }

    #[test]
    fn disable_all_flushes_every_pool() {
        let allocator = Rc::new(CountingAllocator::default());
        let integer = TypeDescriptor::builder()
            .name("Integer")
            .layout_of::<u64>()
            .allocator(Rc::<CountingAllocator>::clone(&allocator))
            .build();
        let rational = TypeDescriptor::builder()
            .name("Rational")
            .layout_of::<[u64; 2]>()
            .allocator(Rc::<CountingAllocator>::clone(&allocator))
            .build();

        let mut registry = PoolRegistry::new();
        for descriptor in [&integer, &rational] {
            drop(
                registry
                    .create_or_get_pool(descriptor, 4, PoolScope::Global)
                    .expect("small pool installs"),
            );
            recycle_one(descriptor);
        }
        assert_eq!(allocator.live(), 2);

        registry.disable_all();

        assert_eq!(allocator.live(), 0);
        assert!(registry.stats().iter().all(|stats| !stats.enabled()));
    }

    #[test]
    fn stats_are_sorted_by_type_name() {
        let mut registry = PoolRegistry::new();
        let descriptors = [descriptor("Rational"), descriptor("Integer")];

        for descriptor in &descriptors {
            drop(
                registry
                    .create_or_get_pool(descriptor, 4, PoolScope::Global)
                    .expect("small pool installs"),
            );
        }

        let names: Vec<_> = registry
            .stats()
            .iter()
            .map(|stats| stats.type_name().to_string())
            .collect();

        assert_eq!(names, vec!["Integer", "Rational"]);
    }

    #[test]
    fn shutdown_tears_down_pools() {
        let allocator = Rc::new(CountingAllocator::default());
        let descriptor = TypeDescriptor::builder()
            .layout_of::<u64>()
            .allocator(Rc::<CountingAllocator>::clone(&allocator))
            .build();

        let mut registry = PoolRegistry::new();
        drop(
            registry
                .create_or_get_pool(&descriptor, 4, PoolScope::Global)
                .expect("small pool installs"),
        );
        recycle_one(&descriptor);
        assert_eq!(allocator.live(), 1);

        registry.shutdown();

        assert!(!descriptor.is_pooled());
        assert_eq!(allocator.live(), 0);
    }
}
