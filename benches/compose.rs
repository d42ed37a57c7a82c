use compositekit::collections::{StrongMap, WeakMapOfStrongSets, WeakSet};
use compositekit::composer::CompositeWeakKeyCache;
use compositekit::key::{Key, ObjectRef};
use compositekit::shape::KeyShape;
use criterion::{BatchSize, Criterion, criterion_group, criterion_main};

fn objects(n: usize) -> Vec<ObjectRef> {
    (0..n).map(ObjectRef::new).collect()
}

fn bench_compose_hit(c: &mut Criterion) {
    c.bench_function("compose_key_hit", |b| {
        let shape = KeyShape::weak_strong(&["owner"], &["field"]).unwrap();
        let mut cache = CompositeWeakKeyCache::new(shape).unwrap();
        let owners = objects(1024);
        let mut held = Vec::with_capacity(owners.len());
        for owner in &owners {
            held.push(
                cache
                    .compose_key(&[Key::from(owner)], &[Key::from("title")])
                    .unwrap(),
            );
        }
        b.iter(|| {
            for owner in &owners {
                let key = cache.compose_key(
                    &[Key::from(std::hint::black_box(owner))],
                    &[Key::from("title")],
                );
                let _ = std::hint::black_box(key);
            }
        })
    });
}

fn bench_compose_and_evict(c: &mut Criterion) {
    c.bench_function("compose_key_then_evict", |b| {
        b.iter_batched(
            || {
                let shape = KeyShape::weak(&["owner"]).unwrap();
                (CompositeWeakKeyCache::new(shape).unwrap(), objects(1024))
            },
            |(mut cache, owners)| {
                for owner in &owners {
                    let _ = cache.compose_key(&[Key::from(owner)], &[]);
                }
                drop(owners);
                std::hint::black_box(cache.purge());
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_weak_set_add_has(c: &mut Criterion) {
    c.bench_function("weak_set_add_has", |b| {
        b.iter_batched(
            || {
                let set = WeakSet::new(KeyShape::weak(&["a", "b"]).unwrap()).unwrap();
                (set, objects(256))
            },
            |(mut set, owners)| {
                for pair in owners.windows(2) {
                    let keys = [Key::from(&pair[0]), Key::from(&pair[1])];
                    let _ = set.add(&keys);
                    let _ = std::hint::black_box(set.has(&keys));
                }
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_strong_map_set_get(c: &mut Criterion) {
    c.bench_function("strong_map_set_get", |b| {
        b.iter_batched(
            || StrongMap::new(KeyShape::strong(&["ns", "id"]).unwrap()).unwrap(),
            |mut map| {
                for i in 0..1024i64 {
                    let keys = [Key::from("ns"), Key::from(std::hint::black_box(i))];
                    let _ = map.set(&keys, i);
                    let _ = std::hint::black_box(map.get(&keys));
                }
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_two_level_add_delete(c: &mut Criterion) {
    c.bench_function("two_level_add_delete", |b| {
        b.iter_batched(
            || {
                let sets = WeakMapOfStrongSets::new(
                    KeyShape::weak(&["owner"]).unwrap(),
                    KeyShape::strong(&["tag"]).unwrap(),
                )
                .unwrap();
                (sets, objects(64))
            },
            |(mut sets, owners)| {
                for owner in &owners {
                    for tag in 0..16i64 {
                        let _ = sets.add(&[Key::from(owner)], &[Key::from(tag)]);
                    }
                }
                for owner in &owners {
                    for tag in 0..16i64 {
                        sets.delete(&[Key::from(owner)], &[Key::from(tag)]);
                    }
                }
                std::hint::black_box(sets.map_size());
            },
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(
    benches,
    bench_compose_hit,
    bench_compose_and_evict,
    bench_weak_set_add_has,
    bench_strong_map_set_get,
    bench_two_level_add_delete,
);
criterion_main!(benches);
