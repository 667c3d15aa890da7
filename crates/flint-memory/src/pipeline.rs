use std::cmp::Ordering;

use bson::{Bson, Document};
use flint_query::{NumericType, convert_numeric, to_decimal, to_decimal128};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use tracing::debug;

use crate::compare::{compare, total_cmp, values_equal};
use crate::error::MemoryError;
use crate::eval::matches;

/// Run an aggregation pipeline over a snapshot of documents.
pub(crate) fn run(
    mut docs: Vec<Document>,
    pipeline: &[Document],
) -> Result<Vec<Document>, MemoryError> {
    for stage in pipeline {
        let mut entries = stage.iter();
        let (Some((name, body)), None) = (entries.next(), entries.next()) else {
            return Err(MemoryError::InvalidPipeline(
                "each stage must have exactly one key".into(),
            ));
        };
        let Bson::Document(body) = body else {
            return Err(MemoryError::InvalidPipeline(format!("{name} needs a document")));
        };

        let input = docs.len();
        docs = match name.as_str() {
            "$match" => {
                let mut kept = Vec::with_capacity(docs.len());
                for doc in docs {
                    if matches(&doc, body)? {
                        kept.push(doc);
                    }
                }
                kept
            }
            "$group" => group(&docs, body)?,
            "$project" => docs
                .iter()
                .map(|doc| project(doc, body))
                .collect::<Result<_, _>>()?,
            other => {
                return Err(MemoryError::InvalidPipeline(format!(
                    "unsupported stage {other}"
                )));
            }
        };
        debug!(stage = %name, input, output = docs.len(), "stage executed");
    }
    Ok(docs)
}

// ── Expressions ─────────────────────────────────────────────────

/// Evaluate an aggregation expression. `None` means the value is missing.
fn evaluate(doc: &Document, expr: &Bson) -> Result<Option<Bson>, MemoryError> {
    match expr {
        Bson::String(s) if s.starts_with('$') => Ok(field_value(doc, &s[1..])),
        Bson::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(evaluate(doc, item)?.unwrap_or(Bson::Null));
            }
            Ok(Some(Bson::Array(out)))
        }
        Bson::Document(d) => match d.iter().next() {
            Some((op, arg)) if op.starts_with('$') && d.len() == 1 => operator(doc, op, arg),
            _ => {
                let mut out = Document::new();
                for (k, v) in d {
                    if let Some(v) = evaluate(doc, v)? {
                        out.insert(k.clone(), v);
                    }
                }
                Ok(Some(Bson::Document(out)))
            }
        },
        literal => Ok(Some(literal.clone())),
    }
}

/// Value of a `$path` reference. Once the path crosses an array the result
/// is an array of the values found in its sub-documents, however many there
/// are.
fn field_value(doc: &Document, path: &str) -> Option<Bson> {
    let segments: Vec<&str> = path.split('.').collect();
    let (head, rest) = segments.split_first()?;
    descend(doc.get(*head)?, rest)
}

fn descend(value: &Bson, segments: &[&str]) -> Option<Bson> {
    let Some((head, rest)) = segments.split_first() else {
        return Some(value.clone());
    };
    match value {
        Bson::Document(d) => descend(d.get(*head)?, rest),
        Bson::Array(items) => Some(Bson::Array(
            items
                .iter()
                .filter(|item| matches!(item, Bson::Document(_)))
                .filter_map(|item| descend(item, segments))
                .collect(),
        )),
        _ => None,
    }
}

fn operands<'a>(op: &str, arg: &'a Bson, n: usize) -> Result<&'a [Bson], MemoryError> {
    match arg {
        Bson::Array(items) if items.len() == n => Ok(items),
        _ => Err(MemoryError::InvalidPipeline(format!(
            "{op} needs {n} arguments"
        ))),
    }
}

fn truthy(value: Option<&Bson>) -> bool {
    match value {
        None | Some(Bson::Null) | Some(Bson::Undefined) | Some(Bson::Boolean(false)) => false,
        Some(n @ (Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) | Bson::Decimal128(_))) => {
            to_decimal(n).map_or(true, |d| !d.is_zero())
        }
        Some(_) => true,
    }
}

/// Missing sorts before every present value, null included.
fn compare_operands(a: Option<&Bson>, b: Option<&Bson>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(x), Some(y)) => total_cmp(x, y),
    }
}

fn operator(doc: &Document, op: &str, arg: &Bson) -> Result<Option<Bson>, MemoryError> {
    if let Some(target) = NumericType::from_operator(op) {
        return match evaluate(doc, arg)? {
            Some(value) => Ok(Some(convert_numeric(&value, target)?)),
            None => Ok(Some(Bson::Null)),
        };
    }
    match op {
        "$literal" => Ok(Some(arg.clone())),
        "$cond" => {
            let [test, then, otherwise] = operands(op, arg, 3)? else {
                return Err(MemoryError::InvalidPipeline("$cond needs 3 arguments".into()));
            };
            let branch = if truthy(evaluate(doc, test)?.as_ref()) {
                then
            } else {
                otherwise
            };
            evaluate(doc, branch)
        }
        "$eq" | "$ne" | "$gt" | "$gte" | "$lt" | "$lte" => {
            let [left, right] = operands(op, arg, 2)? else {
                return Err(MemoryError::InvalidPipeline(format!("{op} needs 2 arguments")));
            };
            let (left, right) = (evaluate(doc, left)?, evaluate(doc, right)?);
            let ord = compare_operands(left.as_ref(), right.as_ref());
            let result = match op {
                "$eq" => ord == Ordering::Equal,
                "$ne" => ord != Ordering::Equal,
                "$gt" => ord == Ordering::Greater,
                "$gte" => ord != Ordering::Less,
                "$lt" => ord == Ordering::Less,
                _ => ord != Ordering::Greater,
            };
            Ok(Some(Bson::Boolean(result)))
        }
        other => Err(MemoryError::InvalidPipeline(format!(
            "unsupported expression operator {other}"
        ))),
    }
}

// ── $group ──────────────────────────────────────────────────────

/// Running numeric total, widened as inputs require.
#[derive(Debug, Clone)]
enum Total {
    Int { value: i64, wide: bool },
    Double(f64),
    Decimal(Decimal),
}

impl Default for Total {
    fn default() -> Self {
        Total::Int {
            value: 0,
            wide: false,
        }
    }
}

impl Total {
    fn add(&mut self, value: &Bson) -> Result<(), MemoryError> {
        // Non-numeric values are ignored.
        if !is_numeric(value) {
            return Ok(());
        }
        let next = match (&*self, value) {
            (_, Bson::Decimal128(_)) | (Total::Decimal(_), _) => {
                Total::Decimal(self.as_decimal()? + to_decimal(value)?)
            }
            (Total::Double(sum), _) => Total::Double(sum + to_f64(value)),
            (Total::Int { .. }, Bson::Double(d)) => Total::Double(self.as_f64() + d),
            (Total::Int { value: sum, wide }, Bson::Int32(i)) => {
                match sum.checked_add(i64::from(*i)) {
                    Some(v) => Total::Int { value: v, wide: *wide },
                    None => Total::Double(*sum as f64 + f64::from(*i)),
                }
            }
            (Total::Int { value: sum, .. }, Bson::Int64(i)) => match sum.checked_add(*i) {
                Some(v) => Total::Int { value: v, wide: true },
                None => Total::Double(*sum as f64 + *i as f64),
            },
            _ => return Ok(()),
        };
        *self = next;
        Ok(())
    }

    fn as_decimal(&self) -> Result<Decimal, MemoryError> {
        Ok(match self {
            Total::Int { value, .. } => Decimal::from(*value),
            Total::Double(d) => to_decimal(&Bson::Double(*d))?,
            Total::Decimal(d) => *d,
        })
    }

    fn as_f64(&self) -> f64 {
        match self {
            Total::Int { value, .. } => *value as f64,
            Total::Double(d) => *d,
            Total::Decimal(d) => d.to_f64().unwrap_or(f64::NAN),
        }
    }

    fn into_bson(self) -> Result<Bson, MemoryError> {
        Ok(match self {
            Total::Int { value, wide: false } => match i32::try_from(value) {
                Ok(v) => Bson::Int32(v),
                Err(_) => Bson::Int64(value),
            },
            Total::Int { value, wide: true } => Bson::Int64(value),
            Total::Double(d) => Bson::Double(d),
            Total::Decimal(d) => Bson::Decimal128(to_decimal128(d)?),
        })
    }
}

fn to_f64(value: &Bson) -> f64 {
    match value {
        Bson::Int32(i) => f64::from(*i),
        Bson::Int64(i) => *i as f64,
        Bson::Double(d) => *d,
        _ => 0.0,
    }
}

fn is_numeric(value: &Bson) -> bool {
    matches!(
        value,
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) | Bson::Decimal128(_)
    )
}

#[derive(Debug, Clone)]
enum Accumulator {
    Sum(Total),
    Avg { total: Total, count: u64 },
    Min(Option<Bson>),
    Max(Option<Bson>),
}

impl Accumulator {
    fn new(op: &str) -> Result<Self, MemoryError> {
        Ok(match op {
            "$sum" => Accumulator::Sum(Total::default()),
            "$avg" => Accumulator::Avg {
                total: Total::default(),
                count: 0,
            },
            "$min" => Accumulator::Min(None),
            "$max" => Accumulator::Max(None),
            other => {
                return Err(MemoryError::InvalidPipeline(format!(
                    "unsupported accumulator {other}"
                )));
            }
        })
    }

    fn push(&mut self, value: Option<Bson>) -> Result<(), MemoryError> {
        // Missing and null never contribute.
        let Some(value) = value.filter(|v| !matches!(v, Bson::Null | Bson::Undefined)) else {
            return Ok(());
        };
        match self {
            Accumulator::Sum(total) => total.add(&value)?,
            Accumulator::Avg { total, count } => {
                if is_numeric(&value) {
                    total.add(&value)?;
                    *count += 1;
                }
            }
            Accumulator::Min(current) => {
                if current.as_ref().is_none_or(|c| total_cmp(&value, c) == Ordering::Less) {
                    *current = Some(value);
                }
            }
            Accumulator::Max(current) => {
                if current.as_ref().is_none_or(|c| total_cmp(&value, c) == Ordering::Greater) {
                    *current = Some(value);
                }
            }
        }
        Ok(())
    }

    fn finish(self) -> Result<Bson, MemoryError> {
        match self {
            Accumulator::Sum(total) => total.into_bson(),
            Accumulator::Avg { count: 0, .. } => Ok(Bson::Null),
            Accumulator::Avg {
                total: Total::Decimal(sum),
                count,
            } => Ok(Bson::Decimal128(to_decimal128(sum / Decimal::from(count))?)),
            Accumulator::Avg { total, count } => Ok(Bson::Double(total.as_f64() / count as f64)),
            Accumulator::Min(v) | Accumulator::Max(v) => Ok(v.unwrap_or(Bson::Null)),
        }
    }
}

struct Bucket {
    key: Bson,
    accumulators: Vec<Accumulator>,
}

/// Parse `{ alias: { $acc: expr } }` specs, in declaration order.
fn accumulator_specs(body: &Document) -> Result<Vec<(&str, &str, &Bson)>, MemoryError> {
    let mut specs = Vec::new();
    for (alias, spec) in body {
        if alias == "_id" {
            continue;
        }
        let Bson::Document(spec) = spec else {
            return Err(MemoryError::InvalidPipeline(format!(
                "accumulator for {alias} must be a document"
            )));
        };
        let mut entries = spec.iter();
        let (Some((op, expr)), None) = (entries.next(), entries.next()) else {
            return Err(MemoryError::InvalidPipeline(format!(
                "accumulator for {alias} must have exactly one operator"
            )));
        };
        specs.push((alias.as_str(), op.as_str(), expr));
    }
    Ok(specs)
}

/// Buckets are emitted in order of first appearance.
fn group(docs: &[Document], body: &Document) -> Result<Vec<Document>, MemoryError> {
    let key_expr = body
        .get("_id")
        .ok_or_else(|| MemoryError::InvalidPipeline("$group needs an _id".into()))?;
    let specs = accumulator_specs(body)?;

    let mut buckets: Vec<Bucket> = Vec::new();
    for doc in docs {
        let key = evaluate(doc, key_expr)?.unwrap_or(Bson::Null);
        let index = match buckets.iter().position(|b| values_equal(&b.key, &key)) {
            Some(i) => i,
            None => {
                let accumulators = specs
                    .iter()
                    .map(|(_, op, _)| Accumulator::new(op))
                    .collect::<Result<_, _>>()?;
                buckets.push(Bucket { key, accumulators });
                buckets.len() - 1
            }
        };
        for ((_, _, expr), acc) in specs.iter().zip(buckets[index].accumulators.iter_mut()) {
            acc.push(evaluate(doc, expr)?)?;
        }
    }

    buckets
        .into_iter()
        .map(|bucket| {
            let mut out = Document::new();
            out.insert("_id", bucket.key);
            for ((alias, _, _), acc) in specs.iter().zip(bucket.accumulators) {
                out.insert(*alias, acc.finish()?);
            }
            Ok(out)
        })
        .collect()
}

// ── $project ────────────────────────────────────────────────────

fn inclusion(spec: &Bson) -> Option<bool> {
    match spec {
        Bson::Boolean(b) => Some(*b),
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) => {
            Some(compare(spec, &Bson::Int32(0)) != Some(Ordering::Equal))
        }
        _ => None,
    }
}

fn project(doc: &Document, body: &Document) -> Result<Document, MemoryError> {
    let mut out = Document::new();
    let keep_id = body.get("_id").and_then(inclusion).unwrap_or(true);
    if keep_id {
        if let Some(id) = doc.get("_id") {
            out.insert("_id", id.clone());
        }
    }
    for (key, spec) in body {
        if key == "_id" {
            continue;
        }
        match inclusion(spec) {
            Some(true) => {
                if let Some(value) = doc.get(key) {
                    out.insert(key.clone(), value.clone());
                }
            }
            Some(false) => {
                return Err(MemoryError::InvalidPipeline(format!(
                    "exclusion of {key} is not supported"
                )));
            }
            None => {
                if let Some(value) = evaluate(doc, spec)? {
                    out.insert(key.clone(), value);
                }
            }
        }
    }
    Ok(out)
}
