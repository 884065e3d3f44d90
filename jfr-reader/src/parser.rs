// Copyright 2023 Gregory Szorc.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Typed and untyped parser front ends.
//!
//! Both share one lifecycle: `handle(...)` registers a callback, `run()`
//! drains the recording one chunk at a time invoking matching handlers via
//! [Dispatcher], and `close()` releases the memory mapping. Registering a
//! handler after `run()` has started is rejected with [Error::AlreadyRun].
//!
//! [EventIterator] adapts the untyped front end into a pull-based sequence:
//! a background thread runs the dispatcher and feeds a bounded channel that
//! the caller drains.

use crate::{
    context::ParsingContext,
    dispatcher::{Control, Dispatcher},
    error::{Error, Result},
    metadata::ClassElement,
    recording::{ParserConfig, Recording},
    types::typed::JfrType,
    value::ResolvedObject,
};
use std::{
    path::Path,
    sync::{mpsc, Arc},
    time::Instant,
};

fn drain(recording: &Recording, dispatcher: &mut Dispatcher, context: &ParsingContext) -> Result<()> {
    let start = Instant::now();

    for chunk in recording.chunks() {
        let chunk = chunk?;
        dispatcher.dispatch_chunk(&chunk, context)?;
    }

    context.record_uptime(start.elapsed());

    Ok(())
}

/// Typed front end: `handle::<T>(callback)` registers a callback keyed on a
/// `#[derive(JfrType)]` struct; matching events are projected into `T`
/// before the callback is invoked.
pub struct TypedParser {
    recording: Recording,
    context: Arc<ParsingContext>,
    dispatcher: Dispatcher,
    ran: bool,
}

impl TypedParser {
    fn new(recording: Recording, context: Arc<ParsingContext>) -> Self {
        Self {
            recording,
            context,
            dispatcher: Dispatcher::default(),
            ran: false,
        }
    }

    /// Register a callback for events of type `T`.
    ///
    /// Rejected with [Error::AlreadyRun] once [Self::run] has been called.
    pub fn handle<T: JfrType + 'static>(
        &mut self,
        callback: impl FnMut(T, &Control) -> Result<()> + Send + 'static,
    ) -> Result<()> {
        if self.ran {
            return Err(Error::AlreadyRun);
        }

        self.dispatcher.register_typed(callback);

        Ok(())
    }

    /// Drain the recording, invoking registered handlers in file order.
    pub fn run(&mut self) -> Result<()> {
        if self.ran {
            return Err(Error::AlreadyRun);
        }

        self.ran = true;

        drain(&self.recording, &mut self.dispatcher, &self.context)
    }

    /// Release the recording's memory mapping. Idempotent.
    pub fn close(self) {}
}

/// Untyped front end: `handle(callback)` receives the raw class metadata and
/// a fully resolved [ResolvedObject] for every matching event.
pub struct UntypedParser {
    recording: Recording,
    context: Arc<ParsingContext>,
    dispatcher: Dispatcher,
    ran: bool,
}

impl UntypedParser {
    fn new(recording: Recording, context: Arc<ParsingContext>) -> Self {
        Self {
            recording,
            context,
            dispatcher: Dispatcher::default(),
            ran: false,
        }
    }

    /// Register a callback invoked for every event, regardless of type.
    ///
    /// Rejected with [Error::AlreadyRun] once [Self::run] has been called.
    pub fn handle(
        &mut self,
        callback: impl FnMut(&ClassElement, &ResolvedObject, &Control) -> Result<()> + Send + 'static,
    ) -> Result<()> {
        if self.ran {
            return Err(Error::AlreadyRun);
        }

        self.dispatcher.register_untyped(callback);

        Ok(())
    }

    /// Drain the recording, invoking registered handlers in file order.
    pub fn run(&mut self) -> Result<()> {
        if self.ran {
            return Err(Error::AlreadyRun);
        }

        self.ran = true;

        drain(&self.recording, &mut self.dispatcher, &self.context)
    }

    /// Release the recording's memory mapping. Idempotent.
    pub fn close(self) {}

    /// Convert this parser into a pull-based [EventIterator].
    ///
    /// The dispatcher runs on a dedicated thread, filling a bounded queue
    /// (`ParserConfig::max_iterator_buffer` deep) that [EventIterator::next]
    /// drains.
    pub fn into_iterator(mut self) -> EventIterator {
        let (tx, rx) = mpsc::sync_channel(self.recording.config().max_iterator_buffer);

        self.dispatcher.register_untyped(move |class, object, _control| {
            tx.send(UntypedEvent {
                class_name: class.name.to_string(),
                fields: object
                    .fields()
                    .iter()
                    .enumerate()
                    .map(|(i, v)| {
                        (
                            class
                                .fields
                                .get(i)
                                .map(|f| f.name.to_string())
                                .unwrap_or_default(),
                            format!("{v:?}"),
                        )
                    })
                    .collect(),
            })
            .map_err(|e| Error::Handler(e.to_string()))
        });

        let handle = std::thread::spawn(move || {
            drain(&self.recording, &mut self.dispatcher, &self.context)
        });

        EventIterator {
            rx,
            join_handle: Some(handle),
            error: None,
        }
    }
}

/// A single event as delivered through [EventIterator].
///
/// Field values are rendered to their `Debug` text rather than kept as
/// borrowed [crate::value::ResolvedValue]s, since the producer thread's
/// chunk data does not outlive the chunk it was read from.
#[derive(Clone, Debug)]
pub struct UntypedEvent {
    pub class_name: String,
    pub fields: Vec<(String, String)>,
}

/// Pull-based view over an [UntypedParser]'s event stream.
///
/// The producer runs on a background thread and blocks when the queue is
/// full; [Self::next] blocks when the queue is empty. Any parse error is
/// captured and returned from the first call that would otherwise report
/// end of stream.
pub struct EventIterator {
    rx: mpsc::Receiver<UntypedEvent>,
    join_handle: Option<std::thread::JoinHandle<Result<()>>>,
    error: Option<Error>,
}

impl EventIterator {
    /// Whether another event is available without consuming it.
    ///
    /// This still requires receiving from the channel to know; callers
    /// that only want to know "is there more" should prefer the `Iterator`
    /// impl directly and check for `None`.
    pub fn has_next(&self) -> bool {
        !matches!(
            self.rx.try_recv(),
            Err(mpsc::TryRecvError::Disconnected) | Err(mpsc::TryRecvError::Empty)
        )
    }

    /// The parse error that ended the stream, if any.
    ///
    /// Populated once the producer thread has finished; call after the
    /// `Iterator` impl yields `None`.
    pub fn parsing_error(&mut self) -> Option<&Error> {
        if self.error.is_none() {
            if let Some(handle) = self.join_handle.take() {
                if let Ok(Err(e)) = handle.join() {
                    self.error = Some(e);
                }
            }
        }

        self.error.as_ref()
    }

    /// Interrupt the producer and drop any buffered events. Idempotent.
    pub fn close(&mut self) {
        // Dropping the receiver end causes the producer's next `send` to
        // fail, which it already treats as a handler error and unwinds on.
        if let Some(handle) = self.join_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for EventIterator {
    fn drop(&mut self) {
        self.close();
    }
}

impl Iterator for EventIterator {
    type Item = UntypedEvent;

    /// Block for the next event, or `None` at end of stream.
    fn next(&mut self) -> Option<UntypedEvent> {
        self.rx.recv().ok()
    }
}

impl ParsingContext {
    /// Open `path` and construct a [TypedParser] sharing this context.
    pub fn new_typed_parser(self: &Arc<Self>, path: impl AsRef<Path>) -> Result<TypedParser> {
        let recording = Recording::open(path)?;

        Ok(TypedParser::new(recording, Arc::clone(self)))
    }

    /// Open `path` and construct an [UntypedParser] sharing this context.
    pub fn new_untyped_parser(
        self: &Arc<Self>,
        path: impl AsRef<Path>,
        config: ParserConfig,
    ) -> Result<UntypedParser> {
        let recording = Recording::open_with_config(path, config)?;

        Ok(UntypedParser::new(recording, Arc::clone(self)))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::byte_stream::MappedFile;
    use crate::testing::{
        write_varint, CheckpointBuilder, ChunkBuilder, ClassSpec, FieldSpec, MetadataBuilder,
    };
    use crate::primitive::Primitive;
    use crate::types::typed::JfrType;
    use crate::value::ResolvedValue;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    };
    use std::time::Duration;

    #[derive(JfrType, Debug)]
    #[jfr(type_name = "jdk.test.Event")]
    struct TestEvent {
        start_time: i64,
        duration: i64,
    }

    fn sample_recording() -> Recording {
        let mut fields = vec![];
        write_varint(&mut fields, 1234);
        write_varint(&mut fields, 5);

        let chunk_bytes = ChunkBuilder::new()
            .metadata(
                MetadataBuilder::new()
                    .class(ClassSpec::new("long", 1))
                    .class(
                        ClassSpec::new("jdk.test.Event", 2)
                            .event()
                            .field(FieldSpec::new("startTime", 1))
                            .field(FieldSpec::new("duration", 1)),
                    ),
                1,
            )
            .event(2, &fields)
            .build();

        let mapped = MappedFile::from_bytes(&chunk_bytes).unwrap();

        Recording::from_mapped(mapped, ParserConfig::default())
    }

    #[test]
    fn typed_parser_decodes_matching_events() {
        let context = Arc::new(ParsingContext::new());
        let recording = sample_recording();
        let mut parser = TypedParser::new(recording, context);

        let seen = Arc::new(Mutex::new(vec![]));
        let seen_clone = Arc::clone(&seen);

        parser
            .handle::<TestEvent>(move |event, _control| {
                seen_clone.lock().unwrap().push((event.start_time, event.duration));
                Ok(())
            })
            .unwrap();

        parser.run().unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![(1234, 5)]);
    }

    #[test]
    fn typed_parser_rejects_handler_registration_after_run() {
        let context = Arc::new(ParsingContext::new());
        let mut parser = TypedParser::new(sample_recording(), context);

        parser.run().unwrap();

        let result = parser.handle::<TestEvent>(|_, _| Ok(()));
        assert!(matches!(result, Err(Error::AlreadyRun)));
    }

    #[test]
    fn untyped_parser_invokes_handler_for_every_event() {
        let context = Arc::new(ParsingContext::new());
        let mut parser = UntypedParser::new(sample_recording(), context);

        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = Arc::clone(&count);

        parser
            .handle(move |class, _object, _control| {
                assert_eq!(class.name.as_ref(), "jdk.test.Event");
                count_clone.fetch_add(1, Ordering::Relaxed);
                Ok(())
            })
            .unwrap();

        parser.run().unwrap();

        assert_eq!(count.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn untyped_parser_event_iterator_drains_events() {
        let context = Arc::new(ParsingContext::new());
        let parser = UntypedParser::new(sample_recording(), context);

        let mut iter = parser.into_iterator();
        let event = iter.next().expect("one event");
        assert_eq!(event.class_name, "jdk.test.Event");
        assert!(iter.next().is_none());
        assert!(iter.parsing_error().is_none());
    }

    #[test]
    fn untyped_parser_resolves_shared_constant_pool_entry() {
        // S2: two events reference the same constant pool entry; both must
        // dereference to the same value and the pool is parsed once per chunk.
        let mut thread_ref_a = vec![];
        write_varint(&mut thread_ref_a, 7); // constant pool index
        let mut thread_ref_b = vec![];
        write_varint(&mut thread_ref_b, 7);

        let mut thread_value = vec![];
        write_varint(&mut thread_value, 42); // jdk.types.Thread.id

        let chunk_bytes = ChunkBuilder::new()
            .metadata(
                MetadataBuilder::new()
                    .class(ClassSpec::new("long", 1))
                    .class(ClassSpec::new("jdk.types.Thread", 9).field(FieldSpec::new("id", 1)))
                    .class(
                        ClassSpec::new("jdk.test.ThreadEvent", 2)
                            .event()
                            .field(FieldSpec::new("thread", 9).constant_pool()),
                    ),
                1,
            )
            .checkpoint(CheckpointBuilder::new().pool(9, vec![(7, thread_value)]))
            .event(2, &thread_ref_a)
            .event(2, &thread_ref_b)
            .build();

        let mapped = MappedFile::from_bytes(&chunk_bytes).unwrap();
        let recording = Recording::from_mapped(mapped, ParserConfig::default());
        let context = Arc::new(ParsingContext::new());
        let mut parser = UntypedParser::new(recording, context);

        let seen = Arc::new(Mutex::new(vec![]));
        let seen_clone = Arc::clone(&seen);

        parser
            .handle(move |_class, object, _control| {
                let thread = object.field("thread").expect("thread field");
                let id = match thread {
                    ResolvedValue::Object(o) => match o.field("id") {
                        Some(ResolvedValue::Primitive(Primitive::Long(v))) => *v,
                        other => panic!("unexpected id value: {other:?}"),
                    },
                    other => panic!("unexpected thread value: {other:?}"),
                };
                seen_clone.lock().unwrap().push(id);
                Ok(())
            })
            .unwrap();

        parser.run().unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![42, 42]);
    }

    #[test]
    fn event_iterator_applies_backpressure_without_losing_events() {
        // S6: a slow consumer paired with a small buffer must still see every
        // event exactly once, in order, with the producer never getting far
        // ahead of the consumer.
        const EVENT_COUNT: i64 = 200;

        let mut builder = ChunkBuilder::new().metadata(
            MetadataBuilder::new()
                .class(ClassSpec::new("int", 1))
                .class(ClassSpec::new("jdk.test.Counted", 2).event().field(FieldSpec::new("seq", 1))),
            1,
        );

        for i in 0..EVENT_COUNT {
            let mut fields = vec![];
            write_varint(&mut fields, i as u64);
            builder = builder.event(2, &fields);
        }

        let chunk_bytes = builder.build();
        let mapped = MappedFile::from_bytes(&chunk_bytes).unwrap();
        let config = ParserConfig::builder().max_iterator_buffer(4).build();
        let recording = Recording::from_mapped(mapped, config);
        let context = Arc::new(ParsingContext::new());
        let parser = UntypedParser::new(recording, context);

        let mut received = vec![];

        for event in parser.into_iterator() {
            received.push(
                event
                    .fields
                    .iter()
                    .find(|(name, _)| name == "seq")
                    .map(|(_, v)| v.clone())
                    .unwrap(),
            );
        }

        assert_eq!(received.len(), EVENT_COUNT as usize);

        let parsed: Vec<i64> = received
            .iter()
            .map(|v| {
                v.chars()
                    .filter(|c| c.is_ascii_digit())
                    .collect::<String>()
                    .parse()
                    .unwrap()
            })
            .collect();

        assert_eq!(parsed, (0..EVENT_COUNT).collect::<Vec<_>>());
    }

    #[test]
    fn context_uptime_accumulates_across_parser_runs() {
        let context = Arc::new(ParsingContext::new());

        let mut first = TypedParser::new(sample_recording(), Arc::clone(&context));
        first.run().unwrap();

        let mut second = TypedParser::new(sample_recording(), Arc::clone(&context));
        second.run().unwrap();

        assert!(context.uptime() >= Duration::ZERO);
    }
}
