// Copyright 2023 Gregory Szorc.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Cross-recording parsing context.
//!
//! A [ParsingContext] is the only state a caller may deliberately share
//! across multiple parser sessions. Two things are worth keeping around
//! longer than a single `run()`:
//!
//! * Whether a structurally-identical class (same [crate::fingerprint::Fingerprint])
//!   has already been checked against a typed handler's declared fields. A
//!   long recording sees the same event shapes in every chunk; without the
//!   cache each chunk would redundantly re-validate the same classes.
//! * Cumulative parsing time, for callers who share one context across many
//!   short-lived sessions and want a running total.

use crate::{
    error::{Error, Result},
    fingerprint::Fingerprint,
    metadata::ClassElement,
    types::typed::FieldSpec,
};
use rustc_hash::FxHashMap;
use std::{
    sync::atomic::{AtomicU64, Ordering},
    sync::RwLock,
    time::Duration,
};

type ValidationCache = RwLock<FxHashMap<(u64, &'static str), Result<(), String>>>;

/// Caches, per `(fingerprint, handler type name)`, whether that class is
/// known to carry every field the handler declares.
#[derive(Default)]
pub struct ParsingContext {
    validated: ValidationCache,
    uptime_nanos: AtomicU64,
}

impl ParsingContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `elapsed` to the cumulative uptime counter.
    pub fn record_uptime(&self, elapsed: Duration) {
        self.uptime_nanos
            .fetch_add(elapsed.as_nanos() as u64, Ordering::Relaxed);
    }

    /// Cumulative parsing time across every session that has shared this context.
    pub fn uptime(&self) -> Duration {
        Duration::from_nanos(self.uptime_nanos.load(Ordering::Relaxed))
    }

    /// Validate that `class` carries every field name in `fields`, consulting
    /// and updating the cache keyed by `class`'s structural fingerprint.
    ///
    /// `lookup` resolves a field's referenced type within the current chunk;
    /// it is only used to compute the fingerprint when this class/handler
    /// pair has not been seen before.
    ///
    /// `class_fingerprints` is a caller-owned, chunk-scoped cache from class
    /// ID to already-computed fingerprint. Class IDs are only stable within a
    /// single chunk, so callers must start a fresh map per chunk; within that
    /// scope it lets a chunk with many events of the same type pay the cost
    /// of walking the class graph once rather than once per event.
    pub fn validate_typed_fields<'a>(
        &self,
        class: &ClassElement<'a>,
        class_id: i64,
        class_fingerprints: &mut FxHashMap<i64, u64>,
        lookup: &impl Fn(i64) -> Option<&'a ClassElement<'a>>,
        type_name: &'static str,
        fields: &'static [FieldSpec],
    ) -> Result<()> {
        let fingerprint = if let Some(cached) = class_fingerprints.get(&class_id) {
            *cached
        } else {
            let computed = Fingerprint::compute(class, lookup).as_u64();
            class_fingerprints.insert(class_id, computed);
            computed
        };
        let key = (fingerprint, type_name);

        if let Some(cached) = self
            .validated
            .read()
            .expect("parsing context lock poisoned")
            .get(&key)
            .cloned()
        {
            return cached.map_err(Error::Configuration);
        }

        let missing: Vec<&str> = fields
            .iter()
            .map(|f| f.name)
            .filter(|name| !class.fields.iter().any(|f| f.name.as_ref() == *name))
            .collect();

        let result = if missing.is_empty() {
            Ok(())
        } else {
            Err(format!(
                "class {} is missing fields declared on {}: {}",
                class.name,
                type_name,
                missing.join(", ")
            ))
        };

        self.validated
            .write()
            .expect("parsing context lock poisoned")
            .insert(key, result.clone());

        result.map_err(Error::Configuration)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::borrow::Cow;

    fn class<'a>(id: i64, name: &'a str, fields: Vec<&'a str>) -> ClassElement<'a> {
        ClassElement {
            annotations: vec![],
            fields: fields
                .into_iter()
                .map(|n| crate::metadata::FieldElement {
                    annotations: vec![],
                    name: Cow::Owned(n.to_string()),
                    type_id: 0,
                    dimension: None,
                    constant_pool: None,
                })
                .collect(),
            settings: vec![],
            name: Cow::Owned(name.to_string()),
            super_type: None,
            simple_type: None,
            id,
        }
    }

    #[test]
    fn missing_field_reported_once_then_cached() {
        let context = ParsingContext::new();
        let c = class(1, "jdk.Sample", vec!["startTime"]);
        let fields: &'static [FieldSpec] = &[
            FieldSpec { name: "startTime" },
            FieldSpec { name: "duration" },
        ];
        let mut class_fingerprints = FxHashMap::default();

        let first =
            context.validate_typed_fields(&c, c.id, &mut class_fingerprints, &|_| None, "Sample", fields);
        assert!(first.is_err());
        assert_eq!(class_fingerprints.len(), 1);

        // Second call hits both the fingerprint cache and the validation cache.
        let second =
            context.validate_typed_fields(&c, c.id, &mut class_fingerprints, &|_| None, "Sample", fields);
        assert!(second.is_err());
        assert_eq!(class_fingerprints.len(), 1);
    }

    #[test]
    fn structurally_identical_classes_share_validation_cache_across_chunks() {
        // S3: two chunks declare the same event shape under different type
        // ids. The per-chunk fingerprint cache is keyed by id (so it never
        // conflates the two), but the validation verdict cache is keyed by
        // structural fingerprint, so it collapses to one entry regardless.
        let context = ParsingContext::new();
        let fields: &'static [FieldSpec] = &[FieldSpec { name: "startTime" }];

        let chunk_one_class = class(42, "jdk.ExecutionSample", vec!["startTime"]);
        let chunk_two_class = class(57, "jdk.ExecutionSample", vec!["startTime"]);

        let mut chunk_one_fingerprints = FxHashMap::default();
        context
            .validate_typed_fields(
                &chunk_one_class,
                42,
                &mut chunk_one_fingerprints,
                &|_| None,
                "ExecutionSample",
                fields,
            )
            .unwrap();

        let mut chunk_two_fingerprints = FxHashMap::default();
        context
            .validate_typed_fields(
                &chunk_two_class,
                57,
                &mut chunk_two_fingerprints,
                &|_| None,
                "ExecutionSample",
                fields,
            )
            .unwrap();

        assert_eq!(chunk_one_fingerprints.len(), 1);
        assert_eq!(chunk_two_fingerprints.len(), 1);
        assert_eq!(
            context.validated.read().unwrap().len(),
            1,
            "structurally identical classes under different ids should share one validation entry"
        );
    }

    #[test]
    fn uptime_accumulates_across_sessions() {
        let context = ParsingContext::new();
        context.record_uptime(Duration::from_millis(5));
        context.record_uptime(Duration::from_millis(7));

        assert_eq!(context.uptime(), Duration::from_millis(12));
    }
}
