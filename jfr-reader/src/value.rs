// Copyright 2023 Gregory Szorc.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Dynamic values produced by resolving event and constant pool data.
//!
//! [Value] is the generic representation of a single field's worth of data:
//! a primitive, a nested object, an array, or an unresolved reference into a
//! constants pool. [Object] holds the fields of a resolved class instance in
//! the same order as the class's field definitions.
//!
//! Resolving a [Value] tree only decodes bytes against class metadata; it
//! does not by itself chase constant pool references, since a caller may not
//! need to follow every one. [Value::resolve_constants] performs that
//! expansion given a [crate::resolver::ConstantResolver], producing a
//! [ResolvedValue] tree with every reference replaced by its target (or
//! [ResolvedValue::Missing] if the pool has no such entry).

use crate::{metadata::ClassElement, primitive::Primitive, resolver::ConstantResolver};

/// A resolved class instance: its definition plus its field values in
/// declaration order.
#[derive(Clone, Debug)]
pub struct Object<'resolver, 'chunk> {
    class: &'resolver ClassElement<'chunk>,
    fields: Vec<Value<'resolver, 'chunk>>,
}

impl<'resolver, 'chunk> Object<'resolver, 'chunk> {
    pub fn new(class: &'resolver ClassElement<'chunk>, fields: Vec<Value<'resolver, 'chunk>>) -> Self {
        Self { class, fields }
    }

    pub fn class(&self) -> &'resolver ClassElement<'chunk> {
        self.class
    }

    /// Field values in the same order as [ClassElement::fields].
    pub fn fields(&self) -> &[Value<'resolver, 'chunk>] {
        &self.fields
    }

    /// Look up a field's value by name.
    pub fn field(&self, name: &str) -> Option<&Value<'resolver, 'chunk>> {
        self.class
            .fields
            .iter()
            .position(|f| f.name.as_ref() == name)
            .and_then(|i| self.fields.get(i))
    }

    pub fn resolve_constants<CR: ConstantResolver<'chunk>>(
        self,
        resolver: &'resolver CR,
    ) -> ResolvedObject<'resolver, 'chunk> {
        ResolvedObject {
            class: self.class,
            fields: self
                .fields
                .into_iter()
                .map(|v| v.resolve_constants(resolver))
                .collect(),
        }
    }
}

/// A single decoded field value.
///
/// Values that are stored in a constants pool are left as [Value::ConstantPool]
/// references until a caller asks to follow them via [Self::resolve_constants].
#[derive(Clone, Debug)]
pub enum Value<'resolver, 'chunk> {
    Primitive(Primitive<'chunk>),
    Object(Object<'resolver, 'chunk>),
    Array(Vec<Value<'resolver, 'chunk>>),
    /// An unresolved reference into the constants pool for `class_id`.
    ConstantPool { class_id: i64, constant_index: i64 },
}

impl<'resolver, 'chunk> Value<'resolver, 'chunk> {
    /// Obtain the [Primitive] if this value holds one directly.
    pub fn as_primitive(&self) -> Option<&Primitive<'chunk>> {
        if let Self::Primitive(v) = self {
            Some(v)
        } else {
            None
        }
    }

    pub fn as_object(&self) -> Option<&Object<'resolver, 'chunk>> {
        if let Self::Object(v) = self {
            Some(v)
        } else {
            None
        }
    }

    /// Recursively follow constants pool references, producing a fully
    /// materialized value tree.
    pub fn resolve_constants<CR: ConstantResolver<'chunk>>(
        self,
        resolver: &'resolver CR,
    ) -> ResolvedValue<'resolver, 'chunk> {
        match self {
            Self::Primitive(p) => ResolvedValue::Primitive(p),
            Self::Object(o) => ResolvedValue::Object(o.resolve_constants(resolver)),
            Self::Array(els) => ResolvedValue::Array(
                els.into_iter()
                    .map(|v| v.resolve_constants(resolver))
                    .collect(),
            ),
            Self::ConstantPool {
                class_id,
                constant_index,
            } => match resolver.get_recursive(class_id, constant_index) {
                ResolvedConstantValue::Null => ResolvedValue::Null,
                ResolvedConstantValue::Missing => ResolvedValue::Missing,
                ResolvedConstantValue::Value(v) => v,
            },
        }
    }
}

/// A resolved class instance with constants pool references already followed.
#[derive(Clone, Debug)]
pub struct ResolvedObject<'resolver, 'chunk> {
    class: &'resolver ClassElement<'chunk>,
    fields: Vec<ResolvedValue<'resolver, 'chunk>>,
}

impl<'resolver, 'chunk> ResolvedObject<'resolver, 'chunk> {
    pub fn class(&self) -> &'resolver ClassElement<'chunk> {
        self.class
    }

    pub fn fields(&self) -> &[ResolvedValue<'resolver, 'chunk>] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&ResolvedValue<'resolver, 'chunk>> {
        self.class
            .fields
            .iter()
            .position(|f| f.name.as_ref() == name)
            .and_then(|i| self.fields.get(i))
    }
}

/// A fully resolved value: every constants pool reference has been followed.
#[derive(Clone, Debug)]
pub enum ResolvedValue<'resolver, 'chunk> {
    /// Constant pool index 0, which always denotes the null value.
    Null,
    /// The referenced constant pool entry does not exist.
    ///
    /// Shouldn't happen in well-formed recordings, but chunks can be
    /// truncated or written concurrently with reading.
    Missing,
    Primitive(Primitive<'chunk>),
    Object(ResolvedObject<'resolver, 'chunk>),
    Array(Vec<ResolvedValue<'resolver, 'chunk>>),
}

/// The result of a single, non-recursive constants pool lookup.
#[derive(Clone, Debug)]
pub enum ConstantValue<'resolver, 'chunk> {
    Null,
    Missing,
    Value(&'resolver Value<'resolver, 'chunk>),
}

/// The result of a constants pool lookup with references recursively followed.
#[derive(Clone, Debug)]
pub enum ResolvedConstantValue<'resolver, 'chunk> {
    Null,
    Missing,
    Value(ResolvedValue<'resolver, 'chunk>),
}

/// The result of a constants pool lookup mapped through a caller-provided function.
pub enum ConstantValueMapped<T> {
    Null,
    Missing,
    Value(crate::error::Result<T>),
}
