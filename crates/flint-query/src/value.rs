use std::fmt;
use std::str::FromStr;

use bson::oid::ObjectId;
use bson::{Bson, Decimal128, Document};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::Error;

/// An application value that can appear as an operand in a filter.
///
/// Implement this for application enums and newtypes that are stored as a
/// single BSON value (e.g. a status enum stored as its name).
pub trait QueryValue {
    fn into_bson(self) -> Bson;
}

/// Convert an application value into the wire representation.
///
/// Every operator and every reducer goes through here, so identifier values
/// always reach the wire as native `ObjectId`s.
pub fn normalize<V: QueryValue>(value: V) -> Bson {
    value.into_bson()
}

/// Field value types that pattern operators (`contains`, `starts_with`, ...)
/// may be applied to.
pub trait Text: QueryValue {}

impl Text for String {}
impl Text for Option<String> {}
impl Text for Vec<String> {}

/// Array-valued field types, for `all` and `size`.
pub trait Array {
    type Item;
}

impl<T> Array for Vec<T> {
    type Item = T;
}

impl<T> Array for Option<Vec<T>> {
    type Item = T;
}

// ── QueryValue impls ────────────────────────────────────────────

impl QueryValue for Bson {
    fn into_bson(self) -> Bson {
        self
    }
}

impl QueryValue for Document {
    fn into_bson(self) -> Bson {
        Bson::Document(self)
    }
}

impl QueryValue for String {
    fn into_bson(self) -> Bson {
        Bson::String(self)
    }
}

impl QueryValue for &str {
    fn into_bson(self) -> Bson {
        Bson::String(self.to_string())
    }
}

impl QueryValue for bool {
    fn into_bson(self) -> Bson {
        Bson::Boolean(self)
    }
}

impl QueryValue for i32 {
    fn into_bson(self) -> Bson {
        Bson::Int32(self)
    }
}

impl QueryValue for i64 {
    fn into_bson(self) -> Bson {
        Bson::Int64(self)
    }
}

impl QueryValue for u32 {
    fn into_bson(self) -> Bson {
        Bson::Int64(i64::from(self))
    }
}

impl QueryValue for f32 {
    fn into_bson(self) -> Bson {
        Bson::Double(f64::from(self))
    }
}

impl QueryValue for f64 {
    fn into_bson(self) -> Bson {
        Bson::Double(self)
    }
}

impl QueryValue for ObjectId {
    fn into_bson(self) -> Bson {
        Bson::ObjectId(self)
    }
}

impl QueryValue for bson::DateTime {
    fn into_bson(self) -> Bson {
        Bson::DateTime(self)
    }
}

impl QueryValue for Decimal128 {
    fn into_bson(self) -> Bson {
        Bson::Decimal128(self)
    }
}

impl QueryValue for Id {
    fn into_bson(self) -> Bson {
        Bson::ObjectId(self.0)
    }
}

impl<T: QueryValue> QueryValue for Option<T> {
    fn into_bson(self) -> Bson {
        match self {
            Some(v) => v.into_bson(),
            None => Bson::Null,
        }
    }
}

impl<T: QueryValue> QueryValue for Vec<T> {
    fn into_bson(self) -> Bson {
        Bson::Array(self.into_iter().map(normalize).collect())
    }
}

// ── Identifier ──────────────────────────────────────────────────

/// Application-level record identifier.
///
/// Carried around as a hex string by application code and serialized that
/// way, but always emitted to the database as a native `ObjectId`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Id(ObjectId);

impl Id {
    pub fn new() -> Self {
        Id(ObjectId::new())
    }

    pub fn object_id(&self) -> ObjectId {
        self.0
    }
}

impl Default for Id {
    fn default() -> Self {
        Self::new()
    }
}

impl From<ObjectId> for Id {
    fn from(oid: ObjectId) -> Self {
        Id(oid)
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_hex())
    }
}

impl FromStr for Id {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ObjectId::parse_str(s)
            .map(Id)
            .map_err(|_| Error::InvalidId(s.to_string()))
    }
}

/// Decode the wire representation back into an identifier.
impl TryFrom<Bson> for Id {
    type Error = Error;

    fn try_from(value: Bson) -> Result<Self, Self::Error> {
        match value {
            Bson::ObjectId(oid) => Ok(Id(oid)),
            Bson::String(s) => s.parse(),
            other => Err(Error::InvalidId(other.to_string())),
        }
    }
}

impl Serialize for Id {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Id {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ── Numeric conversion ──────────────────────────────────────────

/// Target type for an explicit numeric conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NumericType {
    Int32,
    Int64,
    Double,
    Decimal,
}

impl NumericType {
    /// Aggregation operator performing this conversion server-side.
    pub fn operator(self) -> &'static str {
        match self {
            NumericType::Int32 => "$toInt",
            NumericType::Int64 => "$toLong",
            NumericType::Double => "$toDouble",
            NumericType::Decimal => "$toDecimal",
        }
    }

    pub fn from_operator(op: &str) -> Option<Self> {
        match op {
            "$toInt" => Some(NumericType::Int32),
            "$toLong" => Some(NumericType::Int64),
            "$toDouble" => Some(NumericType::Double),
            "$toDecimal" => Some(NumericType::Decimal),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            NumericType::Int32 => "int32",
            NumericType::Int64 => "int64",
            NumericType::Double => "double",
            NumericType::Decimal => "decimal",
        }
    }
}

/// Re-type a numeric value.
///
/// Widening is exact. Narrowing to an integer truncates toward zero and
/// fails if the result does not fit. Null passes through unchanged.
pub fn convert_numeric(value: &Bson, target: NumericType) -> Result<Bson, Error> {
    if matches!(value, Bson::Null) {
        return Ok(Bson::Null);
    }

    match target {
        NumericType::Int32 => {
            let n = to_decimal(value)?.trunc();
            n.to_i32()
                .map(Bson::Int32)
                .ok_or_else(|| overflow(value, target))
        }
        NumericType::Int64 => {
            let n = to_decimal(value)?.trunc();
            n.to_i64()
                .map(Bson::Int64)
                .ok_or_else(|| overflow(value, target))
        }
        NumericType::Double => match value {
            Bson::Double(d) => Ok(Bson::Double(*d)),
            Bson::Int32(i) => Ok(Bson::Double(f64::from(*i))),
            Bson::Int64(i) => Ok(Bson::Double(*i as f64)),
            _ => to_decimal(value)?
                .to_f64()
                .map(Bson::Double)
                .ok_or_else(|| overflow(value, target)),
        },
        NumericType::Decimal => Ok(Bson::Decimal128(to_decimal128(to_decimal(value)?)?)),
    }
}

/// Exact decimal view of a numeric BSON value.
pub fn to_decimal(value: &Bson) -> Result<Decimal, Error> {
    match value {
        Bson::Int32(i) => Ok(Decimal::from(*i)),
        Bson::Int64(i) => Ok(Decimal::from(*i)),
        Bson::Double(d) => Decimal::try_from(*d).map_err(|e| Error::Decimal(e.to_string())),
        Bson::Decimal128(d) => parse_decimal(&d.to_string()),
        other => Err(Error::NotNumeric(other.element_type())),
    }
}

pub fn to_decimal128(value: Decimal) -> Result<Decimal128, Error> {
    value
        .to_string()
        .parse::<Decimal128>()
        .map_err(|e| Error::Decimal(e.to_string()))
}

fn parse_decimal(s: &str) -> Result<Decimal, Error> {
    Decimal::from_str(s)
        .or_else(|_| Decimal::from_scientific(s))
        .map_err(|e| Error::Decimal(format!("{s}: {e}")))
}

fn overflow(value: &Bson, target: NumericType) -> Error {
    Error::NumericOverflow {
        value: value.to_string(),
        target: target.name(),
    }
}
