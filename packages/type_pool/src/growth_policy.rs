use std::num::NonZero;

/// Determines what a pool does with a released slot when its backing storage is full.
///
/// By default, the pool keeps its initial capacity and releases the slot to the host.
///
/// # Examples
///
/// ```
/// use new_zealand::nz;
/// use type_pool::{GrowthPolicy, PoolRegistry};
///
/// let registry = PoolRegistry::builder()
///     .growth_policy(GrowthPolicy::Geometric { limit: nz!(1024) })
///     .build();
/// ```
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[non_exhaustive]
pub enum GrowthPolicy {
    /// The pool never grows. When it is full, released slots spill to the host allocator.
    /// This is the default.
    #[default]
    Bounded,

    /// The pool doubles its capacity when full, until the capacity reaches `limit`.
    /// Beyond the limit, released slots spill to the host allocator.
    Geometric {
        /// Maximum number of slots the pool will ever cache.
        limit: NonZero<usize>,
    },
}

impl GrowthPolicy {
    /// Returns the capacity a full pool of `allocated` slots should grow to,
    /// or `None` if it should spill instead.
    #[must_use]
    pub(crate) fn next_capacity(self, allocated: usize) -> Option<usize> {
        match self {
            Self::Bounded => None,
            Self::Geometric { limit } => {
                let target = allocated.saturating_mul(2).max(1).min(limit.get());
                (target > allocated).then_some(target)
            }
        }
    }
}
