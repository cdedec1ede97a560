// benches/codec.rs
use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;

use cinet_protocol::{AlertMask, DeviceStatus, Identity, MessageCodec, PositionFix};

fn codec() -> MessageCodec {
    let key = Identity::parse_device_key("06.EA.83.A3").unwrap();
    let identity = Identity::new(key, "0001576627", "Python Simulator", "Millitag", "O2 - UK");
    MessageCodec::new(identity, "fredfred").unwrap()
}

fn fix() -> PositionFix {
    PositionFix {
        latitude: 53.8272,
        longitude: -1.6647,
        speed_kmh: 42.0,
        heading_deg: Some(270.0),
        hdop: 0.9,
        satellites: 9,
        valid: true,
        ..PositionFix::default()
    }
}

// One report: field packing, both checksums and 12 Blowfish blocks.
fn bench_build(c: &mut Criterion) {
    let mut codec = codec();
    let (fix, status) = (fix(), DeviceStatus::default());
    c.bench_function("build_report", |b| {
        b.iter(|| codec.build(black_box(&fix), black_box(&status), AlertMask::TAMPER))
    });
}

fn bench_open(c: &mut Criterion) {
    let mut codec = codec();
    let msg = codec.build(&fix(), &DeviceStatus::default(), AlertMask::empty());
    c.bench_function("open_report", |b| b.iter(|| codec.open(black_box(&msg)).unwrap()));
}

// Key derivation runs once per passphrase change; keep an eye on it anyway.
fn bench_derive(c: &mut Criterion) {
    c.bench_function("derive_key_1000_rounds", |b| {
        b.iter(|| cinet_protocol::derive_key(black_box("fredfred")))
    });
}

criterion_group!(benches, bench_build, bench_open, bench_derive);
criterion_main!(benches);
