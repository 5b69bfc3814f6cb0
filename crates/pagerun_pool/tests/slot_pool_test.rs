//! Integration test for slot pools under random acquire/release traffic.

use std::collections::HashSet;
use std::convert::Infallible;

use pagerun_core::ConfigFile;
use pagerun_pool::{SlotPool, SlotPoolConfig};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Stand-in for a GPU fence: remembers which slot created it.
#[derive(Debug, PartialEq, Eq)]
struct Fence {
    created_for: usize,
    signaled: bool,
}

#[test]
fn test_slots_are_unique_while_held() {
    let config = SlotPoolConfig::from_toml_str(
        r"
        slots_per_batch = 8
        initial_batches = 1
        ",
    )
    .unwrap();
    let mut pool = SlotPool::new(&config, |index| {
        Ok::<_, Infallible>(Fence {
            created_for: index,
            signaled: false,
        })
    })
    .unwrap();

    let mut rng = ChaCha8Rng::seed_from_u64(11);
    let mut held = Vec::new();
    let mut peak = 0;

    for _ in 0..5_000 {
        if !held.is_empty() && rng.gen_bool(0.48) {
            let slot = held.swap_remove(rng.gen_range(0..held.len()));
            pool.get_mut(slot).unwrap().signaled = true;
            assert!(pool.release(slot));
            assert!(!pool.is_in_use(slot));
            assert!(pool.resources()[slot.index()].signaled);
        } else {
            let slot = pool.acquire().unwrap();
            let fence = pool.get(slot).unwrap();
            assert_eq!(fence.created_for, slot.index());
            held.push(slot);
        }

        peak = peak.max(held.len());
        assert_eq!(pool.in_use(), held.len());
    }

    let unique: HashSet<_> = held.iter().map(|slot| slot.index()).collect();
    assert_eq!(unique.len(), held.len());

    // Growth happens in whole batches and only when every slot is taken.
    assert_eq!(pool.capacity() % 8, 0);
    assert!(pool.capacity() >= peak);
    assert!(pool.capacity() < peak + 8 || pool.capacity() == 8);
    assert_eq!(pool.stats().pages.allocations, held.len());
}

#[test]
fn test_command_buffer_preset_prewarms() {
    let config = SlotPoolConfig::command_buffers();
    let pool = SlotPool::new(&config, |index| Ok::<_, Infallible>(index)).unwrap();
    assert_eq!(pool.capacity(), config.slots_per_batch);
    assert_eq!(pool.available(), config.slots_per_batch);
    assert_eq!(pool.resources()[3], 3);
}
