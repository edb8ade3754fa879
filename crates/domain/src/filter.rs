//! Filter DSL for list endpoints
//!
//! A filter serializes to a JSON object mapping each field name to an
//! operator object, e.g. `{"folder": {"eq": "/docs"}, "size": {"gt": 10}}`.
//! Equality-class operators (`eq`, `contains`, `in`, `prefix`) are
//! mutually exclusive per field: setting one replaces the previous one.
//! Range operators (`gt`, `gte`, `lt`, `lte`) coexist with each other and
//! with the equality operator. Fields never set are omitted.
//!
//! Typed filters wrap a private [`FilterDocument`] and expose one accessor
//! per field returning a [`StringField`] or [`RangeField`].

use std::collections::BTreeMap;

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EqualityOp {
    Eq,
    Contains,
    In,
    Prefix,
}

impl EqualityOp {
    fn key(self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Contains => "contains",
            Self::In => "in",
            Self::Prefix => "prefix",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
struct FieldOperators {
    equality: Option<(EqualityOp, Value)>,
    gt: Option<Value>,
    gte: Option<Value>,
    lt: Option<Value>,
    lte: Option<Value>,
}

impl FieldOperators {
    fn is_empty(&self) -> bool {
        self.equality.is_none()
            && self.gt.is_none()
            && self.gte.is_none()
            && self.lt.is_none()
            && self.lte.is_none()
    }
}

impl Serialize for FieldOperators {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        if let Some((op, value)) = &self.equality {
            map.serialize_entry(op.key(), value)?;
        }
        for (key, bound) in
            [("gt", &self.gt), ("gte", &self.gte), ("lt", &self.lt), ("lte", &self.lte)]
        {
            if let Some(value) = bound {
                map.serialize_entry(key, value)?;
            }
        }
        map.end()
    }
}

/// Field-name to operator map backing every typed filter
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterDocument {
    fields: BTreeMap<&'static str, FieldOperators>,
}

impl FilterDocument {
    pub fn is_empty(&self) -> bool {
        self.fields.values().all(FieldOperators::is_empty)
    }

    /// Accessor for a string-valued field
    pub(crate) fn string_field(&mut self, name: &'static str) -> StringField<'_> {
        StringField { ops: self.fields.entry(name).or_default() }
    }

    /// Accessor for an ordered field (timestamps, sizes)
    pub(crate) fn range_field(&mut self, name: &'static str) -> RangeField<'_> {
        RangeField { ops: self.fields.entry(name).or_default() }
    }
}

impl Serialize for FilterDocument {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        for (name, ops) in self.fields.iter().filter(|(_, ops)| !ops.is_empty()) {
            map.serialize_entry(name, ops)?;
        }
        map.end()
    }
}

/// Equality-class operators on a string field
pub struct StringField<'a> {
    ops: &'a mut FieldOperators,
}

impl StringField<'_> {
    fn set(self, op: EqualityOp, value: Value) -> Self {
        self.ops.equality = Some((op, value));
        self
    }

    pub fn eq(self, value: impl Into<String>) -> Self {
        self.set(EqualityOp::Eq, Value::String(value.into()))
    }

    pub fn contains(self, value: impl Into<String>) -> Self {
        self.set(EqualityOp::Contains, Value::String(value.into()))
    }

    /// `in`: the field equals one of `values`
    pub fn one_of<I, S>(self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let values = values.into_iter().map(|v| Value::String(v.into())).collect();
        self.set(EqualityOp::In, Value::Array(values))
    }

    pub fn prefix(self, value: impl Into<String>) -> Self {
        self.set(EqualityOp::Prefix, Value::String(value.into()))
    }

    /// Drop whatever equality operator is set
    pub fn clear(self) -> Self {
        self.ops.equality = None;
        self
    }
}

/// Equality and range operators on an ordered field
pub struct RangeField<'a> {
    ops: &'a mut FieldOperators,
}

impl RangeField<'_> {
    pub fn eq(self, value: impl Into<Value>) -> Self {
        self.ops.equality = Some((EqualityOp::Eq, value.into()));
        self
    }

    pub fn gt(self, value: impl Into<Value>) -> Self {
        self.ops.gt = Some(value.into());
        self
    }

    pub fn gte(self, value: impl Into<Value>) -> Self {
        self.ops.gte = Some(value.into());
        self
    }

    pub fn lt(self, value: impl Into<Value>) -> Self {
        self.ops.lt = Some(value.into());
        self
    }

    pub fn lte(self, value: impl Into<Value>) -> Self {
        self.ops.lte = Some(value.into());
        self
    }

    pub fn clear(self) -> Self {
        *self.ops = FieldOperators::default();
        self
    }
}
