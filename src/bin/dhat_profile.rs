//! DHAT heap profiler for compositekit.
//!
//! Run with: cargo run --bin dhat_profile --release --features dhat-heap
//! View results: Open dhat-heap.json in <https://nnethercote.github.io/dh_view/dh_view.html>

#[global_allocator]
static ALLOC: dhat::Alloc = dhat::Alloc;

use compositekit::collections::{StrongMap, WeakMapOfStrongSets, WeakSet};
use compositekit::key::{Key, ObjectRef};
use compositekit::shape::KeyShape;

/// Simple XorShift64 RNG for deterministic workloads.
struct XorShift64 {
    state: u64,
}

impl XorShift64 {
    fn new(seed: u64) -> Self {
        Self { state: seed.max(1) }
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }
}

/// Objects come and go; entries keyed by them must not accumulate.
fn profile_weak_set_churn() {
    println!("=== Profiling WeakSet churn ===");
    let operations = 100_000;
    let live = 1_024;

    let mut set = WeakSet::new(KeyShape::weak(&["left", "right"]).unwrap()).unwrap();
    let mut objects: Vec<ObjectRef> = (0..live).map(ObjectRef::new).collect();
    let mut rng = XorShift64::new(42);

    for i in 0..operations {
        let a = (rng.next_u64() % live as u64) as usize;
        let b = (rng.next_u64() % live as u64) as usize;
        let _ = set.add(&[Key::from(&objects[a]), Key::from(&objects[b])]);

        // Replace one object, reclaiming everything keyed by it.
        if i % 8 == 0 {
            objects[a] = ObjectRef::new(i);
        }
    }
    set.purge();

    println!("  Final size: {}", set.len());
}

fn profile_strong_map_hotset() {
    println!("=== Profiling StrongMap hotset ===");
    let operations = 100_000;
    let universe = 16_384u64;

    let mut map = StrongMap::new(KeyShape::strong(&["ns", "id"]).unwrap()).unwrap();
    let mut rng = XorShift64::new(7);

    for _ in 0..operations {
        let id = rng.next_u64() % universe;
        let keys = [Key::from("hot"), Key::from(id as i64)];
        if map.get(&keys).is_none() {
            let _ = map.set(&keys, id);
        }
        if id % 3 == 0 {
            map.delete(&keys);
        }
    }

    println!("  Final size: {}", map.len());
}

fn profile_two_level_churn() {
    println!("=== Profiling WeakMapOfStrongSets churn ===");
    let operations = 50_000;
    let owners = 256;

    let mut sets = WeakMapOfStrongSets::new(
        KeyShape::weak(&["owner"]).unwrap(),
        KeyShape::strong(&["tag"]).unwrap(),
    )
    .unwrap();
    let mut objects: Vec<ObjectRef> = (0..owners).map(ObjectRef::new).collect();
    let mut rng = XorShift64::new(99);

    for i in 0..operations {
        let owner = (rng.next_u64() % owners as u64) as usize;
        let tag = (rng.next_u64() % 64) as i64;
        let _ = sets.add(&[Key::from(&objects[owner])], &[Key::from(tag)]);
        if i % 16 == 0 {
            objects[owner] = ObjectRef::new(i);
        }
    }
    sets.purge();

    println!("  Final outer entries: {}", sets.map_size());
    println!("  Final size: {}", sets.size());
}

fn main() {
    let _profiler = dhat::Profiler::new_heap();

    println!("compositekit DHAT Heap Profiling");
    println!("================================\n");

    profile_weak_set_churn();
    profile_strong_map_hotset();
    profile_two_level_churn();

    println!("\n================================");
    println!("Profile written to dhat-heap.json");
}
