use anchor_map::{AnchorMap, Cursor};
use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use std::time::Duration;

fn lcg(mut s: u64) -> impl Iterator<Item = u64> {
    std::iter::from_fn(move || {
        s = s.wrapping_mul(6364136223846793005).wrapping_add(1);
        Some(s)
    })
}

fn key(n: u64) -> String {
    format!("k{:016x}", n)
}

// 10k pseudo-random indices below `n`.
fn picks(n: usize) -> impl Iterator<Item = usize> {
    let mut s = 0x9e3779b97f4a7c15u64;
    (0..10_000).map(move |_| {
        s = s.wrapping_mul(2862933555777941757).wrapping_add(3037000493);
        (s as usize) % n
    })
}

fn filled(seed: u64, n: usize) -> (AnchorMap<String, u64>, Vec<String>) {
    let mut m = AnchorMap::new();
    let keys: Vec<String> = lcg(seed).take(n).map(key).collect();
    for (i, k) in keys.iter().enumerate() {
        let _ = m.insert(k.clone(), i as u64).unwrap();
    }
    (m, keys)
}

fn bench_insert_fresh_100k(c: &mut Criterion) {
    let mut g = c.benchmark_group("insert_fresh_100k");
    g.bench_function("anchor_map", |b| {
        b.iter_batched(
            AnchorMap::<String, u64>::new,
            |mut m| {
                for (i, x) in lcg(1).take(100_000).enumerate() {
                    let _ = m.insert(key(x), i as u64).unwrap();
                }
                black_box(m)
            },
            BatchSize::SmallInput,
        )
    });
    g.bench_function("hashbrown", |b| {
        b.iter_batched(
            hashbrown::HashMap::<String, u64>::new,
            |mut m| {
                for (i, x) in lcg(1).take(100_000).enumerate() {
                    m.entry(key(x)).or_insert(i as u64);
                }
                black_box(m)
            },
            BatchSize::SmallInput,
        )
    });
    g.finish();
}

fn bench_insert_reserved_100k(c: &mut Criterion) {
    c.bench_function("anchor_map::insert_reserved_100k", |b| {
        b.iter_batched(
            || {
                let mut m = AnchorMap::<String, u64>::new();
                m.reserve(100_000).unwrap();
                m
            },
            |mut m| {
                for (i, x) in lcg(3).take(100_000).enumerate() {
                    let _ = m.insert(key(x), i as u64).unwrap();
                }
                black_box(m)
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_erase_random_10k(c: &mut Criterion) {
    c.bench_function("anchor_map::erase_random_10k_of_110k", |b| {
        b.iter_batched(
            || {
                let (m, _) = filled(5, 110_000);
                let cursors: Vec<Cursor> = m.cursors().collect();
                let mut seen = std::collections::HashSet::with_capacity(10_000);
                let doomed: Vec<Cursor> = picks(cursors.len())
                    .filter(|i| seen.insert(*i))
                    .map(|i| cursors[i])
                    .collect();
                (m, doomed)
            },
            |(mut m, doomed)| {
                for c in doomed {
                    let _ = m.erase(c);
                }
                black_box(m)
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_find_hit_10k(c: &mut Criterion) {
    let (m, keys) = filled(7, 100_000);
    let queries: Vec<String> = picks(keys.len()).map(|i| keys[i].clone()).collect();
    let hb: hashbrown::HashMap<String, u64> = m.iter().map(|(k, v)| (k.clone(), *v)).collect();

    let mut g = c.benchmark_group("find_hit_10k_on_100k");
    g.bench_function("anchor_map", |b| {
        b.iter(|| {
            for k in &queries {
                black_box(m.find(k));
            }
        })
    });
    g.bench_function("hashbrown", |b| {
        b.iter(|| {
            for k in &queries {
                black_box(hb.get(k));
            }
        })
    });
    g.finish();
}

fn bench_find_miss_10k(c: &mut Criterion) {
    c.bench_function("anchor_map::find_miss_10k_on_100k", |b| {
        let (m, _) = filled(11, 100_000);
        let mut miss = lcg(0xdead_beef);
        b.iter(|| {
            for _ in 0..10_000 {
                let k = key(miss.next().unwrap());
                black_box(m.find(&k));
            }
        })
    });
}

fn bench_cursor_access_increment(c: &mut Criterion) {
    c.bench_function("anchor_map::cursor_access_increment_10k", |b| {
        b.iter_batched(
            || {
                let (m, _) = filled(123, 100_000);
                let cursors: Vec<Cursor> = m.cursors().collect();
                let targets: Vec<Cursor> = picks(cursors.len()).map(|i| cursors[i]).collect();
                (m, targets)
            },
            |(mut m, targets)| {
                for c in targets {
                    if let Some(v) = c.value_mut(&mut m) {
                        *v = v.wrapping_add(1);
                    }
                }
                black_box(m)
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_iter_and_clone(c: &mut Criterion) {
    let (m, _) = filled(999, 100_000);
    c.bench_function("anchor_map::iter_all_100k", |b| {
        b.iter(|| {
            let mut sum = 0u64;
            for (_k, v) in m.iter() {
                sum = sum.wrapping_add(*v);
            }
            black_box(sum)
        })
    });

    c.bench_function("anchor_map::clone_100k", |b| b.iter(|| black_box(m.clone())));
}

fn bench_config() -> Criterion {
    Criterion::default()
        .sample_size(12)
        .measurement_time(Duration::from_secs(5))
        .warm_up_time(Duration::from_secs(1))
}

criterion_group! {
    name = benches_insert;
    config = bench_config();
    targets = bench_insert_fresh_100k, bench_insert_reserved_100k
}
criterion_group! {
    name = benches_ops;
    config = bench_config();
    targets = bench_erase_random_10k,
              bench_find_hit_10k,
              bench_find_miss_10k,
              bench_cursor_access_increment,
              bench_iter_and_clone
}
criterion_main!(benches_insert, benches_ops);
