//! Basic usage example for `type_pool`.
//!
//! This example shows a pool recycling the memory of a hot, short-lived type, what disabling
//! the pool does and what the pool statistics look like along the way.

use std::rc::Rc;

use type_pool::{Instance, PoolRegistry, PoolScope, TypeDescriptor};

/// A short-lived value of the kind that is created and destroyed in tight loops.
#[derive(Debug)]
struct Rational {
    numerator: i64,
    denominator: i64,
}

fn main() {
    let descriptor: Rc<TypeDescriptor> = TypeDescriptor::builder()
        .name("Rational")
        .layout_of::<Rational>()
        .build();

    let mut registry = PoolRegistry::new();
    let pool = registry
        .create_or_get_pool(&descriptor, 100, PoolScope::Global)
        .expect("a pool of 100 slots fits in memory");

    println!("Installed pool for {}", descriptor.name());

    // Each iteration destroys the previous value, so after the first round every
    // construction reuses the block released by the one before.
    let mut sum = 0_i64;
    for i in 1..=1000_i64 {
        let value = Instance::new(
            &descriptor,
            Rational {
                numerator: i,
                denominator: 2,
            },
        );
        sum = sum.wrapping_add(value.numerator.wrapping_div(value.denominator));
    }

    println!("Sum of halves: {sum}");
    println!("{}", pool.stats());

    // A burst of live values overflows the pool; the excess goes back to the allocator.
    let burst = (0..150_i64)
        .map(|i| {
            Instance::new(
                &descriptor,
                Rational {
                    numerator: i,
                    denominator: 1,
                },
            )
        })
        .collect::<Vec<_>>();
    println!("Holding {} live values", burst.len());
    drop(burst);

    println!("{}", pool.stats());

    pool.disable();
    println!("After disabling: {}", pool.stats());

    let reenabled = pool.new_enabled();
    println!("After re-enabling: {}", reenabled.stats());

    drop((pool, reenabled));
    registry.shutdown();

    println!(
        "Registry shut down, type is pooled: {}",
        descriptor.is_pooled()
    );
}
