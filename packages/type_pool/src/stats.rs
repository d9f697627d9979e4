use std::fmt;

use crate::PoolScope;

/// A point-in-time snapshot of the state and history of one [`Pool`][crate::Pool].
///
/// # Examples
///
/// ```
/// use type_pool::{PoolRegistry, PoolScope, TypeDescriptor};
///
/// let descriptor = TypeDescriptor::builder()
///     .name("Integer")
///     .layout_of::<u64>()
///     .build();
///
/// let mut registry = PoolRegistry::new();
/// let pool = registry
///     .create_or_get_pool(&descriptor, 100, PoolScope::Global)
///     .unwrap();
///
/// let stats = pool.stats();
/// assert_eq!(stats.size(), 0);
/// assert_eq!(stats.allocated(), 100);
/// assert_eq!(
///     stats.to_string(),
///     "Integer: pool holds 0/100 slots, 0 hits, 0 misses"
/// );
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PoolStats {
    pub(crate) type_name: String,
    pub(crate) enabled: bool,
    pub(crate) scope: PoolScope,
    pub(crate) size: usize,
    pub(crate) allocated: usize,
    pub(crate) hits: u64,
    pub(crate) misses: u64,
    pub(crate) recycled: u64,
    pub(crate) spilled: u64,
    pub(crate) flushed: u64,
}

impl PoolStats {
    /// Name of the pooled type.
    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Whether the pool was recycling slots or passing everything through.
    #[must_use]
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Who keeps the pool alive.
    #[must_use]
    pub fn scope(&self) -> PoolScope {
        self.scope
    }

    /// Number of cached slots.
    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of slots the pool is willing to cache.
    #[must_use]
    pub fn allocated(&self) -> usize {
        self.allocated
    }

    /// Acquisitions served from cached slots.
    #[must_use]
    pub fn hits(&self) -> u64 {
        self.hits
    }

    /// Acquisitions that fell through to the host allocator.
    #[must_use]
    pub fn misses(&self) -> u64 {
        self.misses
    }

    /// Released slots that were kept for reuse.
    #[must_use]
    pub fn recycled(&self) -> u64 {
        self.recycled
    }

    /// Released slots that went to the original deallocation hook instead.
    #[must_use]
    pub fn spilled(&self) -> u64 {
        self.spilled
    }

    /// Cached slots handed to the original deallocation hook by disabling the pool.
    #[must_use]
    pub fn flushed(&self) -> u64 {
        self.flushed
    }
}

impl fmt::Display for PoolStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: pool holds {}/{} slots, {} hits, {} misses",
            self.type_name, self.size, self.allocated, self.hits, self.misses
        )
    }
}
