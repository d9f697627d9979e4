#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Per-type freelist pools that recycle the memory of hot, short-lived objects.
//!
//! A [`TypeDescriptor`] describes one type: its name, memory layout, finalizer and the host
//! allocator its instances come from. Installing a [`Pool`] for the descriptor intercepts its
//! construction and destruction path. After that:
//!
//! - destroying an instance finalizes it and keeps its memory block on a LIFO freelist instead
//!   of returning it to the host allocator, as long as the freelist has room;
//! - constructing an instance reuses the most recently released block, falling back to the
//!   host allocator when the freelist is empty.
//!
//! Memory kept in a pool is only ever used for instances of the same type, so a recycled block
//! always has the right size and alignment.
//!
//! # Key Features
//!
//! - **One pool per type**: a type has at most one pool at any time; asking for another returns
//!   the existing one
//! - **Enable and disable**: a disabled pool hands all of its cached memory back and passes
//!   traffic straight through to the host allocator
//! - **Global or scoped pools**: the [`PoolRegistry`] keeps global pools alive, scoped pools
//!   live exactly as long as the last [`Pool`] handle
//! - **Optional growth**: with [`GrowthPolicy::Geometric`] the freelist doubles instead of
//!   spilling when it fills up
//! - **Typed handles**: [`Instance<T>`] owns a `T` constructed through a descriptor and
//!   destroys it on drop
//!
//! Pools are single-threaded. Neither pools nor descriptors can be sent to another thread.
//!
//! # Examples
//!
//! ```rust
//! use type_pool::{Instance, PoolRegistry, PoolScope, TypeDescriptor};
//!
//! let descriptor = TypeDescriptor::builder()
//!     .name("Integer")
//!     .layout_of::<u128>()
//!     .build();
//!
//! let mut registry = PoolRegistry::new();
//! let pool = registry
//!     .create_or_get_pool(&descriptor, 100, PoolScope::Global)
//!     .unwrap();
//!
//! // The first instance comes from the host allocator.
//! let first = Instance::new(&descriptor, 1_u128);
//! let first_address = first.ptr();
//! drop(first);
//! assert_eq!(pool.len(), 1);
//!
//! // The second instance reuses the memory of the first.
//! let second = Instance::new(&descriptor, 2_u128);
//! assert_eq!(second.ptr(), first_address);
//! assert!(pool.is_empty());
//! drop(second);
//!
//! // Disabling the pool returns all cached memory to the host allocator.
//! pool.disable();
//! assert!(pool.is_empty());
//! assert!(!pool.is_enabled());
//! ```
//!
//! # Working with opaque types
//!
//! Types that are not Rust types can be described by layout and finalizer alone, and their
//! memory driven through [`TypeDescriptor::allocate()`] and [`TypeDescriptor::destroy()`]:
//!
//! ```rust
//! use std::alloc::Layout;
//!
//! use type_pool::{Pool, TypeDescriptor};
//!
//! let descriptor = TypeDescriptor::builder()
//!     .name("Rational")
//!     .layout(Layout::from_size_align(32, 8).unwrap())
//!     .build();
//!
//! let pool = Pool::builder().capacity(4).install(&descriptor).unwrap();
//!
//! let block = descriptor.allocate();
//! // SAFETY: The block came from this descriptor and is not used afterwards.
//! unsafe { descriptor.destroy(block) };
//!
//! assert_eq!(pool.len(), 1);
//! ```

mod descriptor;
mod descriptor_builder;
mod error;
mod growth_policy;
mod host;
mod instance;
mod metrics;
mod pool;
mod pool_builder;
mod registry;
mod scope;
mod slots;
mod stats;

#[cfg(test)]
mod counting_allocator;

pub use descriptor::{DeallocHook, Finalizer, TypeDescriptor};
pub(crate) use descriptor::drop_as;
pub use descriptor_builder::*;
pub use error::Error;
pub(crate) use error::Result;
pub use growth_policy::*;
pub use host::*;
pub use instance::Instance;
pub use pool::Pool;
pub(crate) use pool::PoolCore;
pub use pool_builder::*;
pub use registry::{PoolRegistry, PoolRegistryBuilder};
pub use scope::*;
pub(crate) use slots::*;
pub use stats::*;
