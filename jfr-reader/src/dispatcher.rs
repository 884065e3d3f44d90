// Copyright 2023 Gregory Szorc.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Routes decoded events to registered handlers.
//!
//! [Dispatcher] owns the table built by a parser's `handle(...)` calls and
//! frozen once `run()` starts. For each non-special event record in a
//! chunk, it resolves the record's class, skips it if no handler matches,
//! and otherwise decodes the event and invokes every matching handler in
//! registration order.

use crate::{
    chunk::{ChunkHeader, ChunkListener, ChunkReader},
    context::ParsingContext,
    error::Result,
    metadata::ClassElement,
    resolver::EventResolver,
    types::typed::{FieldSpec, JfrType},
    value::ResolvedObject,
};
use rustc_hash::{FxHashMap, FxHashSet};

/// Chunk-level timing context exposed to handlers.
#[derive(Clone, Copy, Debug)]
pub struct ChunkInfo<'a> {
    header: &'a ChunkHeader,
}

impl<'a> ChunkInfo<'a> {
    pub fn start_time_nanos(&self) -> i64 {
        self.header.nanoseconds_since_epoch as i64
    }

    pub fn duration_nanos(&self) -> i64 {
        self.header.duration_nanoseconds as i64
    }

    pub fn size(&self) -> u64 {
        self.header.chunk_size
    }
}

/// Passed to every handler invocation.
///
/// Exposes where the dispatcher is in the byte stream and the timing
/// context of the chunk currently being read, without exposing the
/// resolver machinery used to produce it.
pub struct Control<'a> {
    chunk_info: ChunkInfo<'a>,
    stream_position: u64,
}

impl<'a> Control<'a> {
    pub fn stream_position(&self) -> u64 {
        self.stream_position
    }

    pub fn chunk_info(&self) -> ChunkInfo<'a> {
        self.chunk_info
    }
}

type TypedInvoke = Box<dyn FnMut(&ResolvedObject, &Control) -> Result<()> + Send>;
type UntypedInvoke = Box<dyn FnMut(&ClassElement, &ResolvedObject, &Control) -> Result<()> + Send>;

enum HandlerEntry {
    Typed {
        type_name: &'static str,
        fields: &'static [FieldSpec],
        invoke: TypedInvoke,
    },
    Untyped(UntypedInvoke),
}

impl HandlerEntry {
    fn matches(&self, class_name: &str) -> bool {
        match self {
            Self::Typed { type_name, .. } => *type_name == class_name,
            Self::Untyped(_) => true,
        }
    }
}

/// The handler registry and the logic to route decoded events to it.
///
/// Built incrementally by a parser's `handle(...)`, then driven read-only
/// from `run()`.
#[derive(Default)]
pub struct Dispatcher {
    handlers: Vec<HandlerEntry>,
    listener: Option<Box<dyn ChunkListener + Send>>,
}

impl Dispatcher {
    /// Install a low-level [ChunkListener] observing this dispatcher's chunks.
    ///
    /// Replaces any previously installed listener.
    pub fn set_listener(&mut self, listener: impl ChunkListener + Send + 'static) {
        self.listener = Some(Box::new(listener));
    }

    pub fn register_typed<T: JfrType + 'static>(
        &mut self,
        mut callback: impl FnMut(T, &Control) -> Result<()> + Send + 'static,
    ) {
        self.handlers.push(HandlerEntry::Typed {
            type_name: T::TYPE_NAME,
            fields: T::FIELDS,
            invoke: Box::new(move |object, control| {
                let value = T::from_resolved(object)?;
                callback(value, control)
            }),
        });
    }

    pub fn register_untyped(
        &mut self,
        callback: impl FnMut(&ClassElement, &ResolvedObject, &Control) -> Result<()> + Send + 'static,
    ) {
        self.handlers.push(HandlerEntry::Untyped(Box::new(callback)));
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Dispatch every non-special event record in `chunk` to matching
    /// handlers, in file order.
    ///
    /// An event whose class matches no registered handler is skipped
    /// without being decoded beyond its header.
    pub fn dispatch_chunk<'a>(
        &mut self,
        chunk: &impl ChunkReader<'a>,
        context: &ParsingContext,
    ) -> Result<()> {
        if let Some(listener) = &mut self.listener {
            if !listener.on_chunk_start(chunk.header()) {
                return Ok(());
            }
        }

        let metadata = chunk.metadata()?;

        if let Some(listener) = &mut self.listener {
            if !listener.on_metadata(&metadata) {
                return Ok(());
            }
        }

        // Event types are only classes whose super chain reaches
        // `jdk.jfr.Event`; computed up front because `metadata` is consumed
        // by `EventResolver::new` below.
        let event_type_ids: FxHashSet<i64> = metadata
            .class_map
            .keys()
            .copied()
            .filter(|id| metadata.is_event_type(*id))
            .collect();

        let mut constant_pool_events = Vec::new();

        for event in chunk.iter_constant_pool_events() {
            let event = event?;

            if let Some(listener) = &mut self.listener {
                if !listener.on_checkpoint(&event) {
                    return Ok(());
                }
            }

            constant_pool_events.push(event);
        }

        let resolver = EventResolver::new(chunk.header(), metadata, constant_pool_events.into_iter())?;
        let constants = resolver.constant_pool_values()?;
        let chunk_info = ChunkInfo {
            header: chunk.header(),
        };

        let mut stream_position = ChunkHeader::HEADER_SIZE;
        let mut class_fingerprints: FxHashMap<i64, u64> = FxHashMap::default();

        for record in chunk.iter_event_records() {
            let record = record?;
            stream_position += record.full_data().len() as u64;

            if record.is_special_event() {
                continue;
            }

            if let Some(listener) = &mut self.listener {
                if !listener.on_event(&record) {
                    return Ok(());
                }
            }

            let class = match resolver.get_class(record.header.event_type) {
                Some(class) => class,
                None => continue,
            };

            if !event_type_ids.contains(&record.header.event_type) {
                continue;
            }

            if !self.handlers.iter().any(|h| h.matches(class.name.as_ref())) {
                continue;
            }

            let object = record
                .resolve_generic(&resolver, &constants)?
                .into_resolved();
            let control = Control {
                chunk_info,
                stream_position,
            };

            for handler in &mut self.handlers {
                match handler {
                    HandlerEntry::Typed {
                        type_name,
                        fields,
                        invoke,
                    } if *type_name == class.name.as_ref() => {
                        context.validate_typed_fields(
                            class,
                            record.header.event_type,
                            &mut class_fingerprints,
                            &|id| resolver.get_class(id),
                            type_name,
                            fields,
                        )?;
                        invoke(&object, &control)?;
                    }
                    HandlerEntry::Untyped(invoke) => {
                        invoke(class, &object, &control)?;
                    }
                    _ => {}
                }
            }
        }

        Ok(())
    }
}
