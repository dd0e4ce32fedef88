use geo::polygon;

use criterion::{criterion_group, criterion_main, Criterion};
use geoblob::codec::{self, TextFormat};
use geoblob::handle::GeometryHandle;

fn create_data() -> Vec<Vec<u8>> {
    // An L shape
    let poly = polygon![
        (x: 0.0, y: 0.0),
        (x: 4.0, y: 0.0),
        (x: 4.0, y: 1.0),
        (x: 1.0, y: 1.0),
        (x: 1.0, y: 4.0),
        (x: 0.0, y: 4.0),
        (x: 0.0, y: 0.0),
    ];
    let blob = codec::encode(&GeometryHandle::new(geo::Geometry::Polygon(poly), 4326));
    vec![blob; 1000]
}

pub fn criterion_benchmark(c: &mut Criterion) {
    let data = create_data();

    c.bench_function("decode blobs to handles", |b| {
        b.iter(|| {
            for blob in &data {
                let _handle = codec::decode(blob).unwrap();
            }
        })
    });
    c.bench_function("decode then encode blobs", |b| {
        b.iter(|| {
            let _out: Vec<Vec<u8>> = data
                .iter()
                .map(|blob| codec::encode(&codec::decode(blob).unwrap().unwrap()))
                .collect();
        })
    });
    c.bench_function("render blobs as WKT", |b| {
        b.iter(|| {
            let _out: Vec<String> = data
                .iter()
                .map(|blob| {
                    let handle = codec::decode(blob).unwrap().unwrap();
                    codec::to_text(&handle, TextFormat::Wkt, None).unwrap()
                })
                .collect();
        })
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
