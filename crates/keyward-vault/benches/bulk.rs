use criterion::{Criterion, black_box, criterion_group, criterion_main};
use keyward_vault::{
    ContentKey, DEFAULT_CHUNK_SIZE, decrypt_stream, encrypt_stream, generate_device_identity,
    unwrap_with_device, wrap_for_device,
};
use std::io::Cursor;

fn bench_encrypt_stream(c: &mut Criterion) {
    let key = ContentKey::generate();
    let data = vec![0u8; 1024 * 1024]; // 1 MiB

    c.bench_function("bulk_encrypt_1mib", |b| {
        b.iter(|| {
            let mut out = Vec::with_capacity(data.len() + 4096);
            encrypt_stream(
                &key,
                Cursor::new(black_box(&data)),
                &mut out,
                DEFAULT_CHUNK_SIZE,
            )
        })
    });
}

fn bench_decrypt_stream(c: &mut Criterion) {
    let key = ContentKey::generate();
    let data = vec![0u8; 1024 * 1024];
    let mut ciphertext = Vec::new();
    encrypt_stream(&key, Cursor::new(&data), &mut ciphertext, DEFAULT_CHUNK_SIZE).unwrap();

    c.bench_function("bulk_decrypt_1mib", |b| {
        b.iter(|| {
            let mut out = Vec::with_capacity(data.len());
            decrypt_stream(&key, Cursor::new(black_box(&ciphertext)), &mut out)
        })
    });
}

fn bench_wrap(c: &mut Criterion) {
    let key = ContentKey::generate();
    let (_, device_public) = generate_device_identity();

    c.bench_function("wrap_for_device", |b| {
        b.iter(|| wrap_for_device(black_box(&key), black_box(&device_public)))
    });
}

fn bench_unwrap(c: &mut Criterion) {
    let key = ContentKey::generate();
    let (device_private, device_public) = generate_device_identity();
    let wrapped = wrap_for_device(&key, &device_public);

    c.bench_function("unwrap_with_device", |b| {
        b.iter(|| unwrap_with_device(black_box(&wrapped), black_box(&device_private)))
    });
}

criterion_group!(
    benches,
    bench_encrypt_stream,
    bench_decrypt_stream,
    bench_wrap,
    bench_unwrap
);
criterion_main!(benches);
