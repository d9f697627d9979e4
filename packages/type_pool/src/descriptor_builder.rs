use std::alloc::Layout;
use std::any::{TypeId, type_name};
use std::mem;
use std::rc::Rc;

use crate::{DeallocHook, Finalizer, HostAllocator, SystemAllocator, TypeDescriptor, drop_as};

/// Builder for creating an instance of [`TypeDescriptor`].
///
/// The instance layout is mandatory and is set either with `.layout()` for opaque types or
/// with `.layout_of::<T>()` for Rust types. All other settings are optional.
///
/// # Examples
///
/// Describing a Rust type. The finalizer drops the value and typed
/// [`Instance<T>`][crate::Instance] handles are enabled:
///
/// ```
/// use type_pool::TypeDescriptor;
///
/// let descriptor = TypeDescriptor::builder().layout_of::<String>().build();
/// ```
///
/// Describing an opaque type with a custom allocator:
///
/// ```
/// use std::alloc::Layout;
/// use std::rc::Rc;
///
/// use type_pool::{SystemAllocator, TypeDescriptor};
///
/// let descriptor = TypeDescriptor::builder()
///     .name("mpz")
///     .layout(Layout::from_size_align(16, 8).unwrap())
///     .allocator(Rc::new(SystemAllocator))
///     .build();
/// ```
#[derive(Debug)]
#[must_use]
pub struct TypeDescriptorBuilder {
    name: Option<String>,
    layout: Option<Layout>,
    type_id: Option<TypeId>,
    finalizer: Option<Finalizer>,
    allocator: Option<Rc<dyn HostAllocator>>,
    dealloc_hook: DeallocHook,
}

impl TypeDescriptorBuilder {
    #[inline]
    pub(crate) fn new() -> Self {
        Self {
            name: None,
            layout: None,
            type_id: None,
            finalizer: None,
            allocator: None,
            dealloc_hook: DeallocHook::default(),
        }
    }

    /// Sets the human-readable name of the type, used in logs, errors and statistics.
    ///
    /// Defaults to the Rust type name when `.layout_of::<T>()` is used.
    #[inline]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the memory layout of an opaque instance.
    ///
    /// This clears any finalizer and typed-handle support configured by an earlier
    /// `.layout_of::<T>()` call.
    #[inline]
    pub fn layout(mut self, layout: Layout) -> Self {
        assert!(
            layout.size() > 0,
            "TypeDescriptor must have non-zero instance size"
        );

        self.layout = Some(layout);
        self.type_id = None;
        self.finalizer = None;
        self
    }

    /// Describes the Rust type `T`: its layout, a finalizer that drops the value in place
    /// and support for typed [`Instance<T>`][crate::Instance] handles.
    #[inline]
    pub fn layout_of<T: 'static>(mut self) -> Self {
        let layout = Layout::new::<T>();
        assert!(
            layout.size() > 0,
            "TypeDescriptor must have non-zero instance size"
        );

        self.layout = Some(layout);
        self.type_id = Some(TypeId::of::<T>());
        self.finalizer = mem::needs_drop::<T>().then_some(drop_as::<T> as Finalizer);
        self.name.get_or_insert_with(|| type_name::<T>().to_string());
        self
    }

    /// Sets the routine that tears down the contents of an instance.
    ///
    /// A custom finalizer disables typed [`Instance<T>`][crate::Instance] handles, because the
    /// descriptor can no longer vouch for how a `T` is dropped.
    #[inline]
    pub fn finalizer(mut self, finalizer: Finalizer) -> Self {
        self.finalizer = Some(finalizer);
        self.type_id = None;
        self
    }

    /// Sets the host allocator that provides memory when no pool recycles it.
    ///
    /// Defaults to [`SystemAllocator`].
    #[inline]
    pub fn allocator(mut self, allocator: Rc<dyn HostAllocator>) -> Self {
        self.allocator = Some(allocator);
        self
    }

    /// Sets the initial deallocation hook of the type.
    ///
    /// Defaults to [`DeallocHook::Host`]. A pool installed later saves this hook and uses it
    /// for every block it does not keep.
    #[inline]
    pub fn dealloc_hook(mut self, hook: DeallocHook) -> Self {
        self.dealloc_hook = hook;
        self
    }

    /// Builds the descriptor.
    ///
    /// # Panics
    ///
    /// Panics if no layout has been set using either [`layout`](Self::layout) or
    /// [`layout_of`](Self::layout_of).
    #[must_use]
    pub fn build(self) -> Rc<TypeDescriptor> {
        let layout = self.layout.expect(
            "Layout must be set using .layout() or .layout_of::<T>() before calling .build()",
        );

        let allocator = self
            .allocator
            .unwrap_or_else(|| Rc::new(SystemAllocator));

        let name = self.name.unwrap_or_else(|| {
            format!("opaque({} bytes, align {})", layout.size(), layout.align())
        });

        Rc::new(TypeDescriptor::new_inner(
            name,
            layout,
            self.type_id,
            self.finalizer,
            allocator,
            self.dealloc_hook,
        ))
    }
}
