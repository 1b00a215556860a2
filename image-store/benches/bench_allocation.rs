use std::sync::Arc;

use criterion::{criterion_group, criterion_main, Criterion};
use image_store::{BlobStore, ImageKey, InMemoryBlobStore, NameAllocator, UploadName};


fn crowded_allocator(rt: &tokio::runtime::Runtime, taken: u64) -> NameAllocator {
    let store = Arc::new(InMemoryBlobStore::new());
    rt.block_on(async {
        for i in 0..taken {
            store.put_if_absent(&format!("photo({i}).png"), b"x").await.unwrap();
            store.put_if_absent(&format!("photograph({i}).png"), b"x").await.unwrap();
        }
    });
    NameAllocator::new(store)
}

fn allocation_benchmark(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let allocator = crowded_allocator(&rt, 1000);
    let name = UploadName::new("photo", "png").unwrap();

    c.bench_function("used disambiguators, 1000 taken", |b| {
        b.to_async(&rt)
            .iter(|| async { allocator.used_disambiguators(&name).await.unwrap() })
    });

    c.bench_function("allocate into crowded namespace", |b| {
        b.to_async(&rt)
            .iter(|| async { allocator.allocate(&name, b"\x89PNG").await.unwrap() })
    });
}

fn key_parse_benchmark(c: &mut Criterion) {
    c.bench_function("parse key", |b| {
        b.iter(|| ImageKey::parse(criterion::black_box("holiday-photo(1234).png")))
    });
}

criterion_group!(benches, allocation_benchmark, key_parse_benchmark);
criterion_main!(benches);
