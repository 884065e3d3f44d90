// Copyright 2023 Gregory Szorc.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Multi-chunk recording file handling.
//!
//! This module defines types that provide a high-level interface for reading
//! JFR data from multiple chunks. We refer to multi-chunk inputs as a
//! *recording*.
//!
//! [Recording] memory-maps the whole file once via [crate::byte_stream::MappedFile]
//! and splits it into [crate::chunk::SliceReader] instances by walking each
//! chunk's declared size, so opening a recording never depends on its size
//! beyond what the OS is willing to page in.

use crate::{
    chunk::{ChunkHeader, ChunkReader, SliceReader},
    byte_stream::MappedFile,
    error::{Error, Result},
    event::EventRecord,
};
use std::path::Path;

/// How the untyped front end should materialize an event's fields.
///
/// `Auto` currently aliases to `SparseAccess`.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ParsingStrategy {
    /// Resolve fields on first access, via [crate::event::GenericEvent].
    /// Classes with more than [ParserConfig::sparse_access_threshold] fields
    /// use this representation; simpler classes are resolved eagerly anyway
    /// since the threshold exists to bound the cost of the alternative.
    #[default]
    SparseAccess,
    /// Always resolve every field of every event up front, into a
    /// [crate::value::ResolvedObject].
    FullIteration,
    /// Aliases to [Self::SparseAccess].
    Auto,
}

/// Behavior knobs for opening and iterating a recording.
///
/// None of these affect the bytes produced; they trade memory and latency
/// for each other. All fields have sensible defaults, constructed via
/// [ParserConfig::default] or the builder methods.
#[derive(Clone, Copy, Debug)]
pub struct ParserConfig {
    /// Eagerly resolve a chunk's constants pool values when its resolver is
    /// constructed, rather than the first time a constant reference is
    /// followed.
    ///
    /// Eager resolution pays the traversal cost once per chunk up front;
    /// lazy resolution spreads it across whichever events actually touch
    /// the constants pool. Chunks with few constants pool hits read faster
    /// lazily; chunks where most events reference the pool (stack traces,
    /// thread identities) tend to do the same work either way.
    pub eager_constant_pool: bool,

    /// Field-materialization strategy for the untyped front end.
    pub strategy: ParsingStrategy,

    /// Field count above which [ParsingStrategy::SparseAccess] resolves a
    /// class lazily rather than eagerly.
    pub sparse_access_threshold: usize,

    /// Size in bytes of each memory-mapped segment when splicing a
    /// recording too large to map in one call.
    ///
    /// [crate::byte_stream::MappedFile] currently maps the whole file in a
    /// single mapping (see `DESIGN.md`); this knob is retained for callers
    /// and is validated but otherwise unused until segment splicing lands.
    pub segment_size: u64,

    /// Maximum number of buffered events in an `EventIterator`'s queue.
    pub max_iterator_buffer: usize,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            eager_constant_pool: false,
            strategy: ParsingStrategy::SparseAccess,
            sparse_access_threshold: 10,
            segment_size: 1024 * 1024 * 1024,
            max_iterator_buffer: 256,
        }
    }
}

impl ParserConfig {
    pub fn builder() -> ParserConfigBuilder {
        ParserConfigBuilder::default()
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ParserConfigBuilder {
    config: ParserConfig,
}

impl ParserConfigBuilder {
    pub fn eager_constant_pool(mut self, value: bool) -> Self {
        self.config.eager_constant_pool = value;
        self
    }

    pub fn strategy(mut self, value: ParsingStrategy) -> Self {
        self.config.strategy = value;
        self
    }

    pub fn sparse_access_threshold(mut self, value: usize) -> Self {
        self.config.sparse_access_threshold = value;
        self
    }

    pub fn segment_size(mut self, value: u64) -> Self {
        self.config.segment_size = value;
        self
    }

    pub fn max_iterator_buffer(mut self, value: usize) -> Self {
        self.config.max_iterator_buffer = value;
        self
    }

    pub fn build(self) -> ParserConfig {
        self.config
    }
}

/// A memory-mapped, multi-chunk JFR recording.
pub struct Recording {
    mapped: MappedFile,
    config: ParserConfig,
}

impl Recording {
    /// Open a recording from a path, using the default [ParserConfig].
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_config(path, ParserConfig::default())
    }

    pub fn open_with_config(path: impl AsRef<Path>, config: ParserConfig) -> Result<Self> {
        let mapped = MappedFile::open(path)?;

        Ok(Self { mapped, config })
    }

    /// Construct an instance directly from already-mapped bytes.
    ///
    /// Exposed for callers (and tests) that have a [MappedFile] by other means.
    pub fn from_mapped(mapped: MappedFile, config: ParserConfig) -> Self {
        Self { mapped, config }
    }

    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    /// Iterate over chunks in this recording, in file order.
    ///
    /// Each item borrows from the recording's backing mapping, so the
    /// iterator's lifetime is tied to `&self`.
    pub fn chunks(&self) -> ChunkIterator<'_> {
        ChunkIterator {
            remaining: self.mapped.as_slice(),
            chunk_index: 0,
        }
    }

    /// Iterate over every non-special event record across all chunks.
    ///
    /// Yields `(chunk_index, event)` pairs. Constant pool and metadata
    /// events are skipped since they are consumed internally by each
    /// chunk's resolver.
    pub fn iter_events(&self) -> impl Iterator<Item = Result<(usize, EventRecord<'_>)>> + '_ {
        self.chunks().enumerate().flat_map(|(chunk_index, chunk)| {
            let events: Vec<Result<(usize, EventRecord)>> = match chunk {
                Ok(chunk) => chunk
                    .iter_event_records()
                    .filter(|r| !matches!(r, Ok(e) if e.is_special_event()))
                    .map(move |r| r.map(|e| (chunk_index, e)))
                    .collect(),
                Err(e) => vec![Err(e)],
            };

            events
        })
    }
}

/// Iterates the chunks of a [Recording] in file order.
pub struct ChunkIterator<'a> {
    remaining: &'a [u8],
    chunk_index: usize,
}

impl<'a> Iterator for ChunkIterator<'a> {
    type Item = Result<SliceReader<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining.is_empty() {
            return None;
        }

        if (self.remaining.len() as u64) < ChunkHeader::HEADER_SIZE {
            self.remaining = &[];
            return Some(Err(Error::MalformedHeader(
                "not enough data remaining for a chunk header".to_string(),
            )));
        }

        let span = tracing::debug_span!("chunk", index = self.chunk_index);
        let _enter = span.enter();

        // Parse just the header first so a body-only failure below can still
        // resync at the next chunk boundary using its declared size. If even
        // the header can't be read, there is no boundary to resync to and
        // the whole pass ends here.
        let header = match ChunkHeader::parse(self.remaining) {
            Ok((_, header)) => header,
            Err(e) => {
                tracing::warn!(error = ?e, "failed to parse chunk header");
                self.remaining = &[];

                return Some(Err(Error::MalformedHeader(format!("{e:?}"))));
            }
        };

        match SliceReader::new(self.remaining) {
            Ok((remaining, chunk)) => {
                tracing::debug!(
                    size = chunk.chunk_size(),
                    "mapped chunk from recording"
                );

                self.remaining = remaining;
                self.chunk_index += 1;

                Some(Ok(chunk))
            }
            Err(e) => {
                let have = self.remaining.len() as u64;

                let error = if have < header.chunk_size {
                    Error::Eof
                } else {
                    Error::MalformedChunk(e.to_string())
                };

                tracing::warn!(
                    error = %error,
                    chunk_size = header.chunk_size,
                    "chunk body failed to parse, resyncing at next chunk boundary"
                );

                self.remaining = if have >= header.chunk_size {
                    &self.remaining[header.chunk_size as usize..]
                } else {
                    &[]
                };
                self.chunk_index += 1;

                Some(Err(error))
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testing::{ChunkBuilder, ClassSpec, MetadataBuilder};

    #[test]
    fn empty_recording_has_no_chunks() {
        let mapped = MappedFile::from_bytes(&[]).unwrap();
        let recording = Recording::from_mapped(mapped, ParserConfig::default());

        assert_eq!(recording.chunks().count(), 0);
    }

    fn sample_chunk() -> Vec<u8> {
        ChunkBuilder::new()
            .metadata(MetadataBuilder::new().class(ClassSpec::new("int", 1)), 1)
            .build()
    }

    #[test]
    fn truncated_chunk_resyncs_and_still_delivers_earlier_chunks() {
        // S5: byte-truncate the last chunk of a 3-chunk recording. The first
        // two chunks must still be delivered; the third surfaces as a
        // MalformedChunk/Eof error rather than aborting the whole recording
        // before it starts.
        let mut bytes = vec![];
        bytes.extend(sample_chunk());
        bytes.extend(sample_chunk());
        bytes.extend(sample_chunk());

        let truncated_len = bytes.len() - 10;
        bytes.truncate(truncated_len);

        let mapped = MappedFile::from_bytes(&bytes).unwrap();
        let recording = Recording::from_mapped(mapped, ParserConfig::default());

        let results: Vec<_> = recording.chunks().collect();

        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(results[1].is_ok());
        assert!(matches!(
            results[2],
            Err(Error::MalformedChunk(_)) | Err(Error::Eof)
        ));
    }
}
