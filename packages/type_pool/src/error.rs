use std::collections::TryReserveError;

use thiserror::Error;

/// Errors that can occur when installing a pool for a type.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The backing storage for the cached slots of a new pool could not be reserved.
    ///
    /// This is only reported when a pool is created. Failure to grow the backing storage of
    /// an existing pool is absorbed by releasing the instance to the host allocator instead.
    #[error("cannot reserve backing storage for {capacity} slots of type '{type_name}'")]
    Allocation {
        /// Name of the type the pool was requested for.
        type_name: String,

        /// The number of slots that could not be reserved.
        capacity: usize,

        /// The reason the reservation failed.
        #[source]
        source: TryReserveError,
    },

    /// A pool was installed for a type that is already intercepted by another pool.
    ///
    /// This is a programming error. Use [`PoolRegistry::create_or_get_pool()`][1] to obtain
    /// the existing pool instead of installing a new one.
    ///
    /// [1]: crate::PoolRegistry::create_or_get_pool
    #[error("type '{type_name}' is already managed by a pool")]
    DoublePoolInstallation {
        /// Name of the type that already has a pool.
        type_name: String,
    },
}

/// A specialized `Result` type for pool operations, returning the crate's
/// [`Error`] type as the error value.
pub(crate) type Result<T> = std::result::Result<T, Error>;
