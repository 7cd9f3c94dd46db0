use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::{seq::SliceRandom, thread_rng, Rng};
use restaurant_search::cache::{create_cache_key, ResponseCache};
use serde_json::json;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

// Mixed read/write load on the response cache from several threads
pub fn cache_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("response_cache");

    let locations = (0..100).map(|i| format!("neighborhood {}", i)).collect::<Vec<_>>();
    let terms = ["", "pizza", "sushi", "tacos", "vegan", "ramen"];
    let keys = locations
        .iter()
        .flat_map(|location| {
            terms.iter().map(move |term| {
                create_cache_key("searchPlaces", &json!({ "location": location, "term": term }))
            })
        })
        .collect::<Vec<_>>();

    for threads in [1usize, 4, 8].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(threads), threads, |b, &threads| {
            b.iter(|| {
                let cache = Arc::new(ResponseCache::new(Duration::from_secs(300)));
                let payload = Arc::new((0..1024).map(|_| thread_rng().gen::<u8>()).collect::<Vec<_>>());

                let mut handles = vec![];
                for _ in 0..threads {
                    let cache = Arc::clone(&cache);
                    let keys = keys.clone();
                    let payload = Arc::clone(&payload);

                    handles.push(thread::spawn(move || {
                        let mut rng = thread_rng();
                        for _ in 0..250 {
                            let key = keys.choose(&mut rng).unwrap();
                            if rng.gen_bool(0.3) {
                                // 30% writes
                                cache.set(key.clone(), Arc::clone(&payload));
                            } else {
                                let _ = cache.get(key);
                            }
                        }
                    }));
                }

                for handle in handles {
                    handle.join().unwrap();
                }

                black_box(cache.stats())
            });
        });
    }

    group.finish();
}

fn key_benchmark(c: &mut Criterion) {
    let params = json!({
        "location": { "latitude": 37.77, "longitude": -122.42 },
        "term": "italian",
        "radius": 1500.0
    });
    c.bench_function("create_cache_key", |b| {
        b.iter(|| create_cache_key("searchPlaces", black_box(&params)))
    });
}

criterion_group!(benches, cache_benchmark, key_benchmark);
criterion_main!(benches);
