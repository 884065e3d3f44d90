// Copyright 2023 Gregory Szorc.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Benchmarks over a synthetic recording built with [jfr_reader::testing].
//!
//! Run with `cargo bench --features test-support`.

use criterion::{criterion_group, criterion_main, Criterion};
use jfr_reader::{
    byte_stream::MappedFile,
    chunk::ChunkReader,
    error::Result,
    event::ChunkEvent,
    recording::{ParserConfig, Recording},
    testing::{ChunkBuilder, ClassSpec, FieldSpec, MetadataBuilder},
};

const EVENT_COUNT: usize = 2_000;

fn synthetic_recording() -> Vec<u8> {
    let mut builder = ChunkBuilder::new().metadata(
        MetadataBuilder::new()
            .class(ClassSpec::new("long", 1))
            .class(
                ClassSpec::new("jdk.test.Sample", 2)
                    .field(FieldSpec::new("startTime", 1))
                    .field(FieldSpec::new("duration", 1))
                    .field(FieldSpec::new("value", 1)),
            ),
        1,
    );

    for i in 0..EVENT_COUNT {
        let mut fields = vec![];
        jfr_reader::testing::write_varint(&mut fields, i as u64);
        jfr_reader::testing::write_varint(&mut fields, 1);
        jfr_reader::testing::write_varint(&mut fields, i as u64 * 2);

        builder = builder.event(2, &fields);
    }

    builder.build()
}

fn iter_chunks(data: &[u8]) -> Result<usize> {
    let mapped = MappedFile::from_bytes(data)?;
    let recording = Recording::from_mapped(mapped, ParserConfig::default());

    Ok(recording.chunks().count())
}

fn iter_event_records(data: &[u8]) -> Result<usize> {
    let mapped = MappedFile::from_bytes(data)?;
    let recording = Recording::from_mapped(mapped, ParserConfig::default());

    let mut count = 0;

    for chunk in recording.chunks() {
        for er in chunk?.iter_event_records() {
            er?;
            count += 1;
        }
    }

    Ok(count)
}

fn resolve_metadata(data: &[u8]) -> Result<usize> {
    let mapped = MappedFile::from_bytes(data)?;
    let recording = Recording::from_mapped(mapped, ParserConfig::default());

    let mut count = 0;

    for chunk in recording.chunks() {
        count += chunk?.metadata()?.class_map.len();
    }

    Ok(count)
}

fn resolve_values(data: &[u8]) -> Result<usize> {
    let mapped = MappedFile::from_bytes(data)?;
    let recording = Recording::from_mapped(mapped, ParserConfig::default());

    let mut count = 0;

    for chunk in recording.chunks() {
        let chunk = chunk?;
        let resolver = chunk.resolver()?;

        for er in chunk.iter_event_records() {
            let er = er?;

            if er.is_special_event() {
                continue;
            }

            let _ = er.resolve_value(&resolver)?;
            count += 1;
        }
    }

    Ok(count)
}

pub fn bench_synthetic(c: &mut Criterion) {
    let data = synthetic_recording();

    let mut group = c.benchmark_group("synthetic recording");

    group.bench_function("iter-chunks", |b| b.iter(|| iter_chunks(&data).unwrap()));
    group.bench_function("iter-event-records", |b| {
        b.iter(|| iter_event_records(&data).unwrap())
    });
    group.bench_function("resolve-metadata", |b| {
        b.iter(|| resolve_metadata(&data).unwrap())
    });
    group.bench_function("resolve-values", |b| {
        b.iter(|| resolve_values(&data).unwrap())
    });

    group.finish();
}

criterion_group!(synthetic, bench_synthetic);
criterion_main!(synthetic);
