//! Metrics for pool effectiveness.
//!
//! The events are counters, so they carry no units in their names.

use nm::Event;

thread_local! {
    /// An acquisition was served from cached slots.
    pub(crate) static ACQUIRE_HITS: Event = Event::builder()
        .name("type_pool_acquire_hits")
        .build();

    /// An acquisition fell through to the host allocator.
    pub(crate) static ACQUIRE_MISSES: Event = Event::builder()
        .name("type_pool_acquire_misses")
        .build();

    /// A released slot was kept for reuse.
    pub(crate) static RELEASE_RECYCLED: Event = Event::builder()
        .name("type_pool_release_recycled")
        .build();

    /// A released slot went through the saved deallocation hook instead of being kept.
    pub(crate) static RELEASE_SPILLED: Event = Event::builder()
        .name("type_pool_release_spilled")
        .build();

    /// Cached slots released when a pool was disabled or torn down.
    pub(crate) static FLUSHED_SLOTS: Event = Event::builder()
        .name("type_pool_flushed_slots")
        .build();
}
