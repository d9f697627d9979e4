use std::any::{TypeId, type_name};
use std::fmt;
use std::marker::PhantomData;
use std::mem::ManuallyDrop;
use std::ops::{Deref, DerefMut};
use std::ptr::{self, NonNull};
use std::rc::Rc;

use crate::TypeDescriptor;

/// An owned `T` whose memory comes from and returns to the construction and destruction path
/// of a [`TypeDescriptor`].
///
/// This is the typed equivalent of calling [`TypeDescriptor::allocate()`] and
/// [`TypeDescriptor::destroy()`] by hand. If a [`Pool`][crate::Pool] intercepts the type, the
/// memory is recycled; otherwise it comes from and goes back to the host allocator. The handle
/// behaves the same either way.
///
/// # Examples
///
/// ```
/// use type_pool::{Instance, Pool, TypeDescriptor};
///
/// let descriptor = TypeDescriptor::builder().layout_of::<String>().build();
/// let pool = Pool::builder().capacity(8).install(&descriptor).unwrap();
///
/// let mut greeting = Instance::new(&descriptor, "Hello".to_string());
/// greeting.push_str(", world");
/// assert_eq!(*greeting, "Hello, world");
///
/// // The String is dropped, the memory block stays in the pool.
/// drop(greeting);
/// assert_eq!(pool.len(), 1);
/// ```
pub struct Instance<T> {
    descriptor: Rc<TypeDescriptor>,
    ptr: NonNull<T>,

    // We own a T and drop it.
    _owns: PhantomData<T>,
}

impl<T: 'static> Instance<T> {
    /// Constructs a new instance in memory obtained from the descriptor.
    ///
    /// # Panics
    ///
    /// Panics if the descriptor was not built with `.layout_of::<T>()` for this `T`.
    #[must_use]
    pub fn new(descriptor: &Rc<TypeDescriptor>, value: T) -> Self {
        assert_eq!(
            descriptor.type_id(),
            Some(TypeId::of::<T>()),
            "descriptor '{}' does not describe {}",
            descriptor.name(),
            type_name::<T>()
        );

        let ptr = descriptor.allocate().cast::<T>();

        // SAFETY: The descriptor describes T, so the `HostAllocator` contract and the pool
        // (which only holds blocks of this descriptor) guarantee a valid, aligned block for a T.
        unsafe {
            ptr.write(value);
        }

        Self {
            descriptor: Rc::clone(descriptor),
            ptr,
            _owns: PhantomData,
        }
    }
}

impl<T> Instance<T> {
    /// Moves the value out and releases the memory block without finalizing it.
    #[must_use]
    pub fn into_inner(self) -> T {
        let this = ManuallyDrop::new(self);

        // SAFETY: The block holds an initialized T that we own. We read it out exactly once
        // and never finalize the block, so the value is not dropped twice.
        let value = unsafe { this.ptr.read() };

        // SAFETY: The descriptor is moved out of the ManuallyDrop exactly once.
        let descriptor = unsafe { ptr::read(&this.descriptor) };

        // SAFETY: The block came from this descriptor, its value was moved out above and the
        // block is never used again.
        unsafe {
            descriptor.free(this.ptr.cast());
        }

        value
    }

    /// The type descriptor that owns the memory of this instance.
    #[must_use]
    pub fn descriptor(&self) -> &Rc<TypeDescriptor> {
        &self.descriptor
    }

    /// A pointer to the value, valid until the instance is dropped.
    #[must_use]
    pub fn ptr(&self) -> NonNull<T> {
        self.ptr
    }
}

impl<T> Deref for Instance<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        // SAFETY: The block holds an initialized T for as long as the instance exists.
        unsafe { self.ptr.as_ref() }
    }
}

impl<T> DerefMut for Instance<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        // SAFETY: The block holds an initialized T and we have exclusive access to the instance.
        unsafe { self.ptr.as_mut() }
    }
}

impl<T> Drop for Instance<T> {
    fn drop(&mut self) {
        // SAFETY: The block was allocated by this descriptor, holds an initialized T and is
        // never used again.
        unsafe {
            self.descriptor.destroy(self.ptr.cast());
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Instance<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("type_name", &self.descriptor.name())
            .field("value", &**self)
            .finish()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::alloc::Layout;
    use std::cell::Cell;

    use static_assertions::assert_not_impl_any;

    use super::*;
    use crate::Pool;
    use crate::counting_allocator::CountingAllocator;

    assert_not_impl_any!(Instance<u64>: Send, Sync, Clone);

    /// Counts how many times values were dropped.
    struct DropCounter {
        drops: Rc<Cell<usize>>,
    }

    impl Drop for DropCounter {
        fn drop(&mut self) {
            self.drops.set(self.drops.get().wrapping_add(1));
        }
    }

    #[test]
    fn value_is_accessible() {
        let descriptor = TypeDescriptor::builder().layout_of::<Vec<u32>>().build();

        let mut instance = Instance::<Vec<u32>>::new(&descriptor, vec![1, 2]);
        instance.push(3);

        assert_eq!(*instance, vec![1, 2, 3]);
        assert!(Rc::ptr_eq(instance.descriptor(), &descriptor));
        // SAFETY: The pointer is valid while the instance exists.
        assert_eq!(unsafe { instance.ptr().as_ref() }.len(), 3);
    }

    #[test]
    fn drop_finalizes_exactly_once() {
        let descriptor = TypeDescriptor::builder().layout_of::<DropCounter>().build();
        let _pool = Pool::builder()
            .capacity(4)
            .install(&descriptor)
            .expect("small pool installs");
        let drops = Rc::new(Cell::new(0));

        let instance = Instance::new(
            &descriptor,
            DropCounter {
                drops: Rc::clone(&drops),
            },
        );
        drop(instance);

        assert_eq!(drops.get(), 1);
    }

    #[test]
    fn into_inner_moves_value_out_without_dropping() {
        let allocator = Rc::new(CountingAllocator::default());
        let descriptor = TypeDescriptor::builder()
            .layout_of::<DropCounter>()
            .allocator(Rc::<CountingAllocator>::clone(&allocator))
            .build();
        let drops = Rc::new(Cell::new(0));

        let instance = Instance::new(
            &descriptor,
            DropCounter {
                drops: Rc::clone(&drops),
            },
        );
        let value = instance.into_inner();

        assert_eq!(drops.get(), 0);
        assert_eq!(allocator.live(), 0);
        assert_eq!(Rc::strong_count(&descriptor), 1);

        drop(value);
        assert_eq!(drops.get(), 1);
    }

    #[test]
    fn into_inner_recycles_block() {
        let descriptor = TypeDescriptor::builder().layout_of::<String>().build();
        let pool = Pool::builder()
            .capacity(4)
            .install(&descriptor)
            .expect("small pool installs");

        let instance = Instance::new(&descriptor, "moved".to_string());
        let block = instance.ptr().cast::<u8>();
        let value = instance.into_inner();

        assert_eq!(value, "moved");
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.acquire(), block);

        // SAFETY: Block came from the pool and is uninitialized.
        unsafe { descriptor.free(block) };
    }

    #[test]
    fn nested_instances_of_pooled_type_are_recycled() {
        struct Node {
            child: Option<Instance<Node>>,
        }

        let descriptor = TypeDescriptor::builder().layout_of::<Node>().build();
        let pool = Pool::builder()
            .capacity(4)
            .install(&descriptor)
            .expect("small pool installs");

        let leaf = Instance::new(&descriptor, Node { child: None });
        let root = Instance::new(&descriptor, Node { child: Some(leaf) });

        // Finalizing the root destroys the leaf, which reenters the pool mid-release.
        drop(root);

        assert_eq!(pool.len(), 2);
    }

    #[test]
    #[should_panic]
    fn mismatched_type_panics() {
        let descriptor = TypeDescriptor::builder().layout_of::<u64>().build();
        let _instance = Instance::new(&descriptor, 1_i64);
    }

    #[test]
    #[should_panic]
    fn opaque_descriptor_panics() {
        let descriptor = TypeDescriptor::builder()
            .layout(Layout::new::<u64>())
            .build();
        let _instance = Instance::new(&descriptor, 1_u64);
    }

    #[test]
    fn debug_shows_value() {
        let descriptor = TypeDescriptor::builder()
            .name("Integer")
            .layout_of::<u64>()
            .build();
        let instance = Instance::new(&descriptor, 7_u64);

        let debug_output = format!("{instance:?}");
        assert!(debug_output.contains("Instance<u64>"));
        assert!(debug_output.contains("Integer"));
        assert!(debug_output.contains('7'));
    }
}
