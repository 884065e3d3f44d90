// Copyright 2023 Gregory Szorc.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Structural fingerprints of class definitions.
//!
//! Class IDs are only meaningful within the chunk that defines them: the
//! same event type gets a different numeric ID in every chunk. To recognize
//! "this is the same `jdk.ExecutionSample` I saw two chunks ago" a caller
//! needs a chunk-independent identity for a class. [Fingerprint] is that
//! identity: a hash over the class's name and the names/array-ness of its
//! fields, recursing into referenced field types and breaking cycles by
//! tracking classes currently being visited.
//!
//! Two classes with equal fingerprints are structurally interchangeable for
//! parsing purposes, even if their metadata was parsed from different
//! chunks and have unrelated numeric IDs.

use crate::metadata::{AnnotationElement, ClassElement};
use rustc_hash::FxHasher;
use std::hash::{Hash, Hasher};

/// Annotations that change how a field is decoded or interpreted, and so
/// must be part of a class's structural identity. Purely cosmetic
/// annotations (`@Label`, `@Description`, `@Category`) are deliberately
/// excluded: two classes differing only in documentation text should still
/// share a compiled reader.
const FINGERPRINT_ANNOTATIONS: &[&str] = &[
    "jdk.jfr.Timestamp",
    "jdk.jfr.Timespan",
    "jdk.jfr.Frequency",
    "jdk.jfr.Unsigned",
    "jdk.jfr.DataAmount",
    "jdk.jfr.MemoryAddress",
];

fn hash_annotations<'a>(
    annotations: &[AnnotationElement<'a>],
    lookup: &impl Fn(i64) -> Option<&'a ClassElement<'a>>,
    hasher: &mut FxHasher,
) {
    for annotation in annotations {
        let Some(class) = lookup(annotation.type_id) else {
            continue;
        };

        if !FINGERPRINT_ANNOTATIONS.contains(&class.name.as_ref()) {
            continue;
        }

        class.name.hash(hasher);
        for (k, v) in &annotation.values {
            k.hash(hasher);
            v.hash(hasher);
        }
    }
}

/// A structural identity for a class definition, stable across chunks.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct Fingerprint(u64);

impl Fingerprint {
    /// Compute the fingerprint of `class`, resolving referenced field types
    /// via `lookup`.
    pub fn compute<'a>(
        class: &ClassElement<'a>,
        lookup: &impl Fn(i64) -> Option<&'a ClassElement<'a>>,
    ) -> Self {
        let mut hasher = FxHasher::default();
        let mut visiting = Vec::new();

        hash_class(class, lookup, &mut visiting, &mut hasher);

        Self(hasher.finish())
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

fn hash_class<'a>(
    class: &ClassElement<'a>,
    lookup: &impl Fn(i64) -> Option<&'a ClassElement<'a>>,
    visiting: &mut Vec<i64>,
    hasher: &mut FxHasher,
) {
    class.name.hash(hasher);

    // Cycle: we've already started hashing this class's fields further up
    // the call stack. The name hash above is enough of a marker; recursing
    // again would loop forever (e.g. ThreadGroup.parent: ThreadGroup).
    if visiting.contains(&class.id) {
        return;
    }

    visiting.push(class.id);

    class.fields.len().hash(hasher);

    for field in &class.fields {
        field.name.hash(hasher);
        field.is_array_type().hash(hasher);
        field.constant_pool.is_some().hash(hasher);
        hash_annotations(&field.annotations, lookup, hasher);

        match lookup(field.type_id) {
            Some(referenced) => hash_class(referenced, lookup, visiting, hasher),
            None => field.type_id.hash(hasher),
        }
    }

    hash_annotations(&class.annotations, lookup, hasher);

    visiting.pop();
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::metadata::FieldElement;
    use std::borrow::Cow;

    fn class<'a>(id: i64, name: &'a str, fields: Vec<FieldElement<'a>>) -> ClassElement<'a> {
        ClassElement {
            annotations: vec![],
            fields,
            settings: vec![],
            name: Cow::Borrowed(name),
            super_type: None,
            simple_type: None,
            id,
        }
    }

    fn field<'a>(name: &'a str, type_id: i64) -> FieldElement<'a> {
        FieldElement {
            annotations: vec![],
            name: Cow::Borrowed(name),
            type_id,
            dimension: None,
            constant_pool: None,
        }
    }

    #[test]
    fn identical_shape_same_fingerprint_despite_different_ids() {
        let int_a = class(10, "int", vec![]);
        let a = class(1, "jdk.Sample", vec![field("value", 10)]);

        let int_b = class(99, "int", vec![]);
        let b = class(7, "jdk.Sample", vec![field("value", 99)]);

        let fp_a = Fingerprint::compute(&a, &|id| if id == 10 { Some(&int_a) } else { None });
        let fp_b = Fingerprint::compute(&b, &|id| if id == 99 { Some(&int_b) } else { None });

        assert_eq!(fp_a, fp_b);
    }

    #[test]
    fn different_field_name_changes_fingerprint() {
        let a = class(1, "jdk.Sample", vec![field("value", 10)]);
        let b = class(1, "jdk.Sample", vec![field("other", 10)]);

        let fp_a = Fingerprint::compute(&a, &|_| None);
        let fp_b = Fingerprint::compute(&b, &|_| None);

        assert_ne!(fp_a, fp_b);
    }

    #[test]
    fn timestamp_annotation_changes_fingerprint() {
        let timestamp_class = class(50, "jdk.jfr.Timestamp", vec![]);
        let lookup = |id: i64| if id == 50 { Some(&timestamp_class) } else { None };

        let plain_field = field("startTime", 10);
        let mut annotated_field = field("startTime", 10);
        annotated_field.annotations.push(AnnotationElement {
            type_id: 50,
            values: vec![(Cow::Borrowed("value"), Cow::Borrowed("TICKS"))],
        });

        let a = class(1, "jdk.Sample", vec![plain_field]);
        let b = class(1, "jdk.Sample", vec![annotated_field]);

        let fp_a = Fingerprint::compute(&a, &lookup);
        let fp_b = Fingerprint::compute(&b, &lookup);

        assert_ne!(fp_a, fp_b);
    }

    #[test]
    fn cosmetic_annotation_does_not_change_fingerprint() {
        let label_class = class(60, "jdk.jfr.Label", vec![]);
        let lookup = |id: i64| if id == 60 { Some(&label_class) } else { None };

        let plain_field = field("startTime", 10);
        let mut annotated_field = field("startTime", 10);
        annotated_field.annotations.push(AnnotationElement {
            type_id: 60,
            values: vec![(Cow::Borrowed("value"), Cow::Borrowed("Start Time"))],
        });

        let a = class(1, "jdk.Sample", vec![plain_field]);
        let b = class(1, "jdk.Sample", vec![annotated_field]);

        let fp_a = Fingerprint::compute(&a, &lookup);
        let fp_b = Fingerprint::compute(&b, &lookup);

        assert_eq!(fp_a, fp_b);
    }

    #[test]
    fn cyclic_field_reference_terminates() {
        // ThreadGroup.parent: ThreadGroup
        let mut group = class(1, "jdk.types.ThreadGroup", vec![field("parent", 1)]);
        group.fields[0].type_id = 1;

        let fp = Fingerprint::compute(&group, &|id| if id == 1 { Some(&group) } else { None });

        // Just needs to not hang; value is incidental.
        let _ = fp;
    }
}
