// Copyright 2023 Gregory Szorc.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Fixture builders for tests.
//!
//! Hand-crafting valid chunk bytes inline in every test is tedious and the
//! hex blobs are unreadable. This module builds them programmatically:
//! [MetadataBuilder] assembles a metadata event (string table + class/field
//! element tree), [CheckpointBuilder] assembles a checkpoint/constant-pool
//! event, and [ChunkBuilder] assembles a complete chunk around them.
//!
//! A chunk built without a [CheckpointBuilder] has `constant_pool_position ==
//! 0`, same as before checkpoint fixtures existed.

use crate::{chunk::MAGIC, event::EVENT_TYPE_CONSTANT_POOL};

/// Append `value` to `out` as an unsigned LEB-128 varint.
///
/// Matches the decoding in [crate::common::leb128_i64]: each byte holds 7
/// bits of payload, with the high bit set on every byte but the last.
pub fn write_varint(out: &mut Vec<u8>, mut value: u64) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;

        if value == 0 {
            out.push(byte);
            break;
        } else {
            out.push(byte | 0x80);
        }
    }
}

/// A single named, attributed node in the metadata element tree.
struct ElementSpec {
    name: i32,
    attributes: Vec<(i32, i32)>,
    children: Vec<ElementSpec>,
}

impl ElementSpec {
    fn write(&self, out: &mut Vec<u8>) {
        write_varint(out, self.name as u64);
        write_varint(out, self.attributes.len() as u64);

        for (k, v) in &self.attributes {
            write_varint(out, *k as u64);
            write_varint(out, *v as u64);
        }

        write_varint(out, self.children.len() as u64);

        for child in &self.children {
            child.write(out);
        }
    }
}

/// A field to declare on a fixture class.
pub struct FieldSpec {
    pub name: String,
    pub type_id: i64,
    pub dimension: Option<i64>,
    pub constant_pool: bool,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, type_id: i64) -> Self {
        Self {
            name: name.into(),
            type_id,
            dimension: None,
            constant_pool: false,
        }
    }

    pub fn array(mut self) -> Self {
        self.dimension = Some(1);
        self
    }

    /// Mark this field's value as a constant pool index rather than inline data.
    pub fn constant_pool(mut self) -> Self {
        self.constant_pool = true;
        self
    }
}

/// A class to declare in a fixture's metadata.
pub struct ClassSpec {
    pub name: String,
    pub id: i64,
    pub fields: Vec<FieldSpec>,
    pub event: bool,
}

impl ClassSpec {
    pub fn new(name: impl Into<String>, id: i64) -> Self {
        Self {
            name: name.into(),
            id,
            fields: vec![],
            event: false,
        }
    }

    pub fn field(mut self, field: FieldSpec) -> Self {
        self.fields.push(field);
        self
    }

    /// Mark this class as extending `jdk.jfr.Event`, so dispatch recognizes
    /// it as an event type rather than a plain value type.
    pub fn event(mut self) -> Self {
        self.event = true;
        self
    }
}

/// Builds a metadata event's bytes from a set of class declarations.
#[derive(Default)]
pub struct MetadataBuilder {
    classes: Vec<ClassSpec>,
}

impl MetadataBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn class(mut self, class: ClassSpec) -> Self {
        self.classes.push(class);
        self
    }

    /// Render the full metadata event, including its own event header.
    pub fn build(self, metadata_id: i64) -> Vec<u8> {
        let mut strings: Vec<String> = vec![];
        let mut intern = |s: &str| -> i32 {
            if let Some(pos) = strings.iter().position(|existing| existing == s) {
                pos as i32
            } else {
                strings.push(s.to_string());
                (strings.len() - 1) as i32
            }
        };

        let root_name = intern("root");
        let metadata_name = intern("metadata");
        let region_name = intern("region");
        let class_name = intern("class");
        let field_name = intern("field");
        let name_key = intern("name");
        let id_key = intern("id");
        let class_key = intern("class");
        let dimension_key = intern("dimension");
        let constant_pool_key = intern("constantPool");
        let constant_pool_value = intern("true");
        let super_type_key = intern("superType");
        let event_super_type_value = intern("jdk.jfr.Event");
        let locale_key = intern("locale");
        let gmt_offset_key = intern("gmtOffset");
        let locale_value = intern("en_US");
        let gmt_offset_value = intern("0");

        let class_elements = self
            .classes
            .iter()
            .map(|class| {
                let name_value = intern(&class.name);
                let id_value = intern(&class.id.to_string());

                let field_elements = class
                    .fields
                    .iter()
                    .map(|field| {
                        let field_name_value = intern(&field.name);
                        let field_type_value = intern(&field.type_id.to_string());

                        let mut attributes = vec![
                            (name_key, field_name_value),
                            (class_key, field_type_value),
                        ];

                        if let Some(dimension) = field.dimension {
                            let dimension_value = intern(&dimension.to_string());
                            attributes.push((dimension_key, dimension_value));
                        }

                        if field.constant_pool {
                            attributes.push((constant_pool_key, constant_pool_value));
                        }

                        ElementSpec {
                            name: field_name,
                            attributes,
                            children: vec![],
                        }
                    })
                    .collect();

                let mut class_attributes = vec![(name_key, name_value), (id_key, id_value)];
                if class.event {
                    class_attributes.push((super_type_key, event_super_type_value));
                }

                ElementSpec {
                    name: class_name,
                    attributes: class_attributes,
                    children: field_elements,
                }
            })
            .collect();

        let root = ElementSpec {
            name: root_name,
            attributes: vec![],
            children: vec![
                ElementSpec {
                    name: metadata_name,
                    attributes: vec![],
                    children: class_elements,
                },
                ElementSpec {
                    name: region_name,
                    attributes: vec![
                        (locale_key, locale_value),
                        (gmt_offset_key, gmt_offset_value),
                    ],
                    children: vec![],
                },
            ],
        };

        let mut string_table = vec![];
        for s in &strings {
            // Utf8ByteArray encoding.
            string_table.push(3u8);
            write_varint(&mut string_table, s.len() as u64);
            string_table.extend(s.as_bytes());
        }

        let mut tree = vec![];
        root.write(&mut tree);

        let mut fields = vec![];
        write_varint(&mut fields, 0); // start_time_nanoseconds
        write_varint(&mut fields, 0); // duration_nanoseconds
        write_varint(&mut fields, metadata_id as u64);
        write_varint(&mut fields, strings.len() as u64); // string_count
        fields.extend(string_table);
        fields.extend(tree);

        write_event(crate::event::EVENT_TYPE_METADATA, &fields)
    }
}

/// Render `fields` into a complete event: `size`, `event_type`, then `fields`
/// verbatim. `size` covers the whole event including itself, so its width is
/// resolved by iterating to a fixed point.
pub fn write_event(event_type: i64, fields: &[u8]) -> Vec<u8> {
    let mut type_bytes = vec![];
    write_varint(&mut type_bytes, event_type as u64);

    let mut size_len = 1usize;

    loop {
        let total = size_len + type_bytes.len() + fields.len();

        let mut size_bytes = vec![];
        write_varint(&mut size_bytes, total as u64);

        if size_bytes.len() == size_len {
            let mut out = size_bytes;
            out.extend(&type_bytes);
            out.extend(fields);

            return out;
        }

        size_len = size_bytes.len();
    }
}

/// One class's worth of constant pool entries in a [CheckpointBuilder].
pub struct ConstantPoolClass {
    pub class_id: i64,
    /// `(index, raw LEB-128-encoded value)` pairs.
    ///
    /// Values are pre-encoded rather than typed since a constant's wire
    /// representation depends on the referenced class (primitive varint,
    /// nested object, etc.); callers encode with [write_varint] for the
    /// common primitive case.
    pub values: Vec<(i64, Vec<u8>)>,
}

/// Builds a single checkpoint (constant pool) event's bytes.
///
/// Only ever builds a single, chain-terminating checkpoint (`delta == 0`):
/// fixtures needing multiple checkpoints per chunk aren't modeled.
#[derive(Default)]
pub struct CheckpointBuilder {
    pools: Vec<ConstantPoolClass>,
}

impl CheckpointBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a class's constant pool entries.
    pub fn pool(mut self, class_id: i64, values: Vec<(i64, Vec<u8>)>) -> Self {
        self.pools.push(ConstantPoolClass { class_id, values });
        self
    }

    /// Render the full checkpoint event, including its own event header.
    pub fn build(self) -> Vec<u8> {
        let mut tail = vec![];
        write_varint(&mut tail, EVENT_TYPE_CONSTANT_POOL as u64);
        write_varint(&mut tail, 0); // start_time_nanoseconds
        write_varint(&mut tail, 0); // duration_nanoseconds
        write_varint(&mut tail, 0); // delta: this is the only/last checkpoint
        tail.push(0u8); // mask: CheckpointType::GENERIC

        write_varint(&mut tail, self.pools.len() as u64);

        for pool in &self.pools {
            write_varint(&mut tail, pool.class_id as u64);
            write_varint(&mut tail, pool.values.len() as u64);

            for (index, value) in &pool.values {
                write_varint(&mut tail, *index as u64);
                tail.extend(value);
            }
        }

        let mut size_len = 1usize;

        loop {
            let total = size_len + tail.len();

            let mut size_bytes = vec![];
            write_varint(&mut size_bytes, total as u64);

            if size_bytes.len() == size_len {
                let mut out = size_bytes;
                out.extend(&tail);

                return out;
            }

            size_len = size_bytes.len();
        }
    }
}

/// Assembles a complete chunk's bytes around a metadata event, an optional
/// checkpoint event, and zero or more regular event records.
#[derive(Default)]
pub struct ChunkBuilder {
    events: Vec<Vec<u8>>,
    metadata_event_index: Option<usize>,
    checkpoint: Option<Vec<u8>>,
}

impl ChunkBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the chunk's metadata event. A chunk needs exactly one.
    pub fn metadata(mut self, metadata: MetadataBuilder, metadata_id: i64) -> Self {
        self.metadata_event_index = Some(self.events.len());
        self.events.push(metadata.build(metadata_id));
        self
    }

    /// Set the chunk's checkpoint (constant pool) event.
    pub fn checkpoint(mut self, checkpoint: CheckpointBuilder) -> Self {
        self.checkpoint = Some(checkpoint.build());
        self
    }

    /// Append a regular event record with the given type ID and field bytes.
    pub fn event(mut self, event_type: i64, fields: &[u8]) -> Self {
        self.events.push(write_event(event_type, fields));
        self
    }

    /// Render the complete chunk, including its 68-byte header.
    pub fn build(self) -> Vec<u8> {
        let metadata_event_index = self
            .metadata_event_index
            .expect("chunk fixture requires a metadata event");

        let mut body: Vec<u8> = vec![];
        let mut constant_pool_position = 0u64;

        if let Some(checkpoint) = &self.checkpoint {
            constant_pool_position = 68 + body.len() as u64;
            body.extend(checkpoint);
        }

        let mut metadata_position = None;

        for (i, event) in self.events.iter().enumerate() {
            if i == metadata_event_index {
                metadata_position = Some(68 + body.len());
            }
            body.extend(event);
        }

        let metadata_position = metadata_position.unwrap() as u64;
        let chunk_size = (68 + body.len()) as u64;

        let mut header = vec![];
        header.extend(MAGIC);
        header.extend(2u16.to_be_bytes()); // major
        header.extend(0u16.to_be_bytes()); // minor
        header.extend(chunk_size.to_be_bytes());
        header.extend(constant_pool_position.to_be_bytes());
        header.extend(metadata_position.to_be_bytes());
        header.extend(0u64.to_be_bytes()); // nanoseconds_since_epoch
        header.extend(0u64.to_be_bytes()); // duration_nanoseconds
        header.extend(0u64.to_be_bytes()); // start_ticks
        header.extend(1_000_000_000u64.to_be_bytes()); // ticks_per_second
        header.extend(0u32.to_be_bytes()); // state_and_flags: finished, not final

        assert_eq!(header.len(), 68);

        header.extend(body);
        header
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::chunk::{ChunkReader, SliceReader};
    use crate::event::ChunkEvent;

    #[test]
    fn builds_parseable_chunk_with_no_events() {
        let chunk_bytes = ChunkBuilder::new()
            .metadata(
                MetadataBuilder::new().class(ClassSpec::new("int", 1)),
                1,
            )
            .build();

        let (remaining, chunk) = SliceReader::new(&chunk_bytes).unwrap();
        assert!(remaining.is_empty());

        let metadata = chunk.metadata().unwrap();
        assert_eq!(metadata.class_map.len(), 1);
    }

    #[test]
    fn builds_chunk_with_a_typed_event() {
        let mut fields = vec![];
        write_varint(&mut fields, 1234); // start time
        write_varint(&mut fields, 5); // duration

        let chunk_bytes = ChunkBuilder::new()
            .metadata(
                MetadataBuilder::new()
                    .class(ClassSpec::new("long", 1))
                    .class(
                        ClassSpec::new("jdk.test.Event", 2)
                            .field(FieldSpec::new("startTime", 1))
                            .field(FieldSpec::new("duration", 1)),
                    ),
                1,
            )
            .event(2, &fields)
            .build();

        let (_, chunk) = SliceReader::new(&chunk_bytes).unwrap();

        let records = chunk
            .iter_event_records()
            .collect::<crate::error::Result<Vec<_>>>()
            .unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[1].header.event_type, 2);
        assert_eq!(records[1].start_duration().unwrap(), (1234, 5));
    }
}
