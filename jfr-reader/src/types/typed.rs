// Copyright 2023 Gregory Szorc.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Typed front end for resolved event/type values.
//!
//! `#[derive(JfrType)]` (from the `jfr-reader-derive` crate, re-exported
//! here as [JfrType] when the `derive` feature is enabled) generates an
//! implementation of [JfrType] for a plain struct, binding each field to
//! the same-named field of a JFR class via [FromValue]. This lets callers
//! register a handler keyed on a Rust type instead of walking
//! [crate::value::ResolvedObject] field lookups by hand.

use crate::{
    error::{Error, Result},
    primitive::Primitive,
    value::ResolvedValue,
};

#[cfg(feature = "derive")]
pub use jfr_reader_derive::JfrType;

/// Describes one field of a [JfrType] implementor.
#[derive(Clone, Copy, Debug)]
pub struct FieldSpec {
    /// The field's name as it appears in the JFR class metadata.
    pub name: &'static str,
}

/// Implemented by structs that mirror a JFR class via `#[derive(JfrType)]`.
pub trait JfrType: Sized {
    /// The JFR class name this type binds to, e.g. `jdk.ExecutionSample`.
    const TYPE_NAME: &'static str;

    /// Field descriptors in declaration order.
    const FIELDS: &'static [FieldSpec];

    /// Construct an instance from a resolved object.
    ///
    /// Callers are responsible for checking the object's class matches
    /// [Self::TYPE_NAME]; this only reads fields by name.
    fn from_resolved(object: &crate::value::ResolvedObject) -> Result<Self>;
}

/// Implemented for types [JfrType]'s derive macro can extract from a single field value.
pub trait FromValue: Sized {
    fn from_value(value: &ResolvedValue) -> Result<Self>;
}

impl FromValue for bool {
    fn from_value(value: &ResolvedValue) -> Result<Self> {
        match value {
            ResolvedValue::Primitive(Primitive::Boolean(v)) => Ok(*v),
            other => Err(Error::Deserialize(format!(
                "expected boolean, found {other:?}"
            ))),
        }
    }
}

impl FromValue for i8 {
    fn from_value(value: &ResolvedValue) -> Result<Self> {
        match value {
            ResolvedValue::Primitive(Primitive::Byte(v)) => Ok(*v),
            other => Err(Error::Deserialize(format!("expected byte, found {other:?}"))),
        }
    }
}

impl FromValue for i16 {
    fn from_value(value: &ResolvedValue) -> Result<Self> {
        match value {
            ResolvedValue::Primitive(Primitive::Short(v)) => Ok(*v),
            other => Err(Error::Deserialize(format!("expected short, found {other:?}"))),
        }
    }
}

impl FromValue for i32 {
    fn from_value(value: &ResolvedValue) -> Result<Self> {
        match value {
            ResolvedValue::Primitive(Primitive::Integer(v)) => Ok(*v),
            other => Err(Error::Deserialize(format!(
                "expected integer, found {other:?}"
            ))),
        }
    }
}

impl FromValue for i64 {
    fn from_value(value: &ResolvedValue) -> Result<Self> {
        match value {
            ResolvedValue::Primitive(Primitive::Long(v)) => Ok(*v),
            other => Err(Error::Deserialize(format!("expected long, found {other:?}"))),
        }
    }
}

impl FromValue for f32 {
    fn from_value(value: &ResolvedValue) -> Result<Self> {
        match value {
            ResolvedValue::Primitive(Primitive::Float(v)) => Ok(*v),
            other => Err(Error::Deserialize(format!("expected float, found {other:?}"))),
        }
    }
}

impl FromValue for f64 {
    fn from_value(value: &ResolvedValue) -> Result<Self> {
        match value {
            ResolvedValue::Primitive(Primitive::Double(v)) => Ok(*v),
            other => Err(Error::Deserialize(format!(
                "expected double, found {other:?}"
            ))),
        }
    }
}

impl FromValue for char {
    fn from_value(value: &ResolvedValue) -> Result<Self> {
        match value {
            ResolvedValue::Primitive(Primitive::Character(v)) => Ok(*v),
            other => Err(Error::Deserialize(format!(
                "expected character, found {other:?}"
            ))),
        }
    }
}

impl FromValue for String {
    fn from_value(value: &ResolvedValue) -> Result<Self> {
        match value {
            ResolvedValue::Primitive(Primitive::NullString) => Ok(String::new()),
            ResolvedValue::Primitive(Primitive::String(v)) => Ok(v.to_string()),
            ResolvedValue::Null | ResolvedValue::Missing => Ok(String::new()),
            other => Err(Error::Deserialize(format!(
                "expected string, found {other:?}"
            ))),
        }
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    fn from_value(value: &ResolvedValue) -> Result<Self> {
        match value {
            ResolvedValue::Array(els) => els.iter().map(T::from_value).collect(),
            other => Err(Error::Deserialize(format!("expected array, found {other:?}"))),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &ResolvedValue) -> Result<Self> {
        match value {
            ResolvedValue::Null | ResolvedValue::Missing => Ok(None),
            other => Ok(Some(T::from_value(other)?)),
        }
    }
}
