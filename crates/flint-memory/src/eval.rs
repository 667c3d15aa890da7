use std::cmp::Ordering;

use bson::{Bson, Document};
use regex::Regex;

use crate::compare::{compare, values_equal};
use crate::error::MemoryError;

/// Evaluate whether a document matches a filter document.
///
/// Top-level entries are conjoined. Empty `$and` and `$nor` match everything.
/// An empty `$or` matches nothing.
pub(crate) fn matches(doc: &Document, filter: &Document) -> Result<bool, MemoryError> {
    for (key, value) in filter {
        let hit = match key.as_str() {
            "$and" => {
                let mut all = true;
                for child in children(key, value)? {
                    if !matches(doc, child)? {
                        all = false;
                        break;
                    }
                }
                all
            }
            "$or" => any_child(doc, key, value)?,
            "$nor" => !any_child(doc, key, value)?,
            k if k.starts_with('$') => {
                return Err(MemoryError::InvalidFilter(format!(
                    "unsupported top-level operator {k}"
                )));
            }
            path => field_matches(doc, path, value)?,
        };
        if !hit {
            return Ok(false);
        }
    }
    Ok(true)
}

fn children<'a>(key: &str, value: &'a Bson) -> Result<Vec<&'a Document>, MemoryError> {
    let Bson::Array(items) = value else {
        return Err(MemoryError::InvalidFilter(format!("{key} needs an array")));
    };
    items
        .iter()
        .map(|item| match item {
            Bson::Document(d) => Ok(d),
            _ => Err(MemoryError::InvalidFilter(format!(
                "{key} entries must be documents"
            ))),
        })
        .collect()
}

fn any_child(doc: &Document, key: &str, value: &Bson) -> Result<bool, MemoryError> {
    for child in children(key, value)? {
        if matches(doc, child)? {
            return Ok(true);
        }
    }
    Ok(false)
}

// ── Path resolution ─────────────────────────────────────────────

fn lookup<'a>(value: &'a Bson, segments: &[&str], out: &mut Vec<&'a Bson>) {
    let Some((head, rest)) = segments.split_first() else {
        out.push(value);
        return;
    };
    match value {
        Bson::Document(d) => {
            if let Some(v) = d.get(*head) {
                lookup(v, rest, out);
            }
        }
        // A path continuing through an array reaches into each element.
        Bson::Array(items) => {
            for item in items {
                if let Bson::Document(_) = item {
                    lookup(item, segments, out);
                }
            }
        }
        _ => {}
    }
}

/// Every value reachable at a dotted `path`. Empty when the field is missing.
fn resolve<'a>(doc: &'a Document, path: &str) -> Vec<&'a Bson> {
    let segments: Vec<&str> = path.split('.').collect();
    let mut out = Vec::new();
    if let Some((head, rest)) = segments.split_first() {
        if let Some(v) = doc.get(*head) {
            lookup(v, rest, &mut out);
        }
    }
    out
}

/// Resolved values plus the elements of any that are arrays.
fn expand<'a>(values: &[&'a Bson]) -> Vec<&'a Bson> {
    let mut out = Vec::with_capacity(values.len());
    for value in values {
        out.push(*value);
        if let Bson::Array(items) = value {
            out.extend(items.iter());
        }
    }
    out
}

// ── Field conditions ────────────────────────────────────────────

fn is_operator_doc(value: &Bson) -> Option<&Document> {
    match value {
        Bson::Document(d) if d.keys().next().is_some_and(|k| k.starts_with('$')) => Some(d),
        _ => None,
    }
}

fn field_matches(doc: &Document, path: &str, condition: &Bson) -> Result<bool, MemoryError> {
    let values = resolve(doc, path);
    match is_operator_doc(condition) {
        Some(ops) => operators_match(&values, ops),
        None => Ok(eq_matches(&values, condition)),
    }
}

fn eq_matches(values: &[&Bson], expected: &Bson) -> bool {
    // Null matches missing fields as well as explicit nulls.
    if matches!(expected, Bson::Null) && values.is_empty() {
        return true;
    }
    expand(values).iter().any(|v| values_equal(v, expected))
}

fn range_matches(values: &[&Bson], bound: &Bson, predicate: fn(Ordering) -> bool) -> bool {
    expand(values)
        .iter()
        .any(|v| compare(v, bound).is_some_and(predicate))
}

fn in_matches(values: &[&Bson], op: &str, candidates: &Bson) -> Result<bool, MemoryError> {
    let Bson::Array(candidates) = candidates else {
        return Err(MemoryError::InvalidFilter(format!("{op} needs an array")));
    };
    Ok(candidates.iter().any(|c| eq_matches(values, c)))
}

fn regex_matches(
    values: &[&Bson],
    pattern: &Bson,
    options: Option<&Bson>,
) -> Result<bool, MemoryError> {
    let Bson::String(pattern) = pattern else {
        return Err(MemoryError::InvalidFilter("$regex needs a string".into()));
    };
    let flags = match options {
        Some(Bson::String(o)) if o.contains('i') => "(?i)",
        _ => "",
    };
    let re = Regex::new(&format!("{flags}{pattern}"))?;
    Ok(expand(values)
        .iter()
        .any(|v| matches!(v, Bson::String(s) if re.is_match(s))))
}

fn size_of(value: &Bson) -> Option<usize> {
    match value {
        Bson::Int32(n) => usize::try_from(*n).ok(),
        Bson::Int64(n) => usize::try_from(*n).ok(),
        _ => None,
    }
}

fn elem_matches(values: &[&Bson], condition: &Bson) -> Result<bool, MemoryError> {
    let Bson::Document(condition) = condition else {
        return Err(MemoryError::InvalidFilter("$elemMatch needs a document".into()));
    };
    for value in values {
        let Bson::Array(items) = value else {
            continue;
        };
        for item in items {
            let hit = match item {
                Bson::Document(element) => matches(element, condition)?,
                scalar => operators_match(&[scalar], condition)?,
            };
            if hit {
                return Ok(true);
            }
        }
    }
    Ok(false)
}

/// All operators in `{ $op: value, ... }` must hold for the resolved values.
fn operators_match(values: &[&Bson], ops: &Document) -> Result<bool, MemoryError> {
    for (op, arg) in ops {
        let hit = match op.as_str() {
            "$eq" => eq_matches(values, arg),
            "$ne" => !eq_matches(values, arg),
            "$gt" => range_matches(values, arg, |o| o == Ordering::Greater),
            "$gte" => range_matches(values, arg, |o| o != Ordering::Less),
            "$lt" => range_matches(values, arg, |o| o == Ordering::Less),
            "$lte" => range_matches(values, arg, |o| o != Ordering::Greater),
            "$in" => in_matches(values, op, arg)?,
            "$nin" => !in_matches(values, op, arg)?,
            "$regex" => regex_matches(values, arg, ops.get("$options"))?,
            "$options" => true,
            "$not" => match arg {
                Bson::Document(inner) => !operators_match(values, inner)?,
                _ => return Err(MemoryError::InvalidFilter("$not needs a document".into())),
            },
            "$all" => match arg {
                Bson::Array(required) => required.iter().all(|r| eq_matches(values, r)),
                _ => return Err(MemoryError::InvalidFilter("$all needs an array".into())),
            },
            "$size" => {
                let n = size_of(arg)
                    .ok_or_else(|| MemoryError::InvalidFilter("$size needs an integer".into()))?;
                values
                    .iter()
                    .any(|v| matches!(v, Bson::Array(items) if items.len() == n))
            }
            "$exists" => match arg {
                Bson::Boolean(expected) => *expected != values.is_empty(),
                _ => return Err(MemoryError::InvalidFilter("$exists needs a boolean".into())),
            },
            "$elemMatch" => elem_matches(values, arg)?,
            other => {
                return Err(MemoryError::InvalidFilter(format!(
                    "unsupported operator {other}"
                )));
            }
        };
        if !hit {
            return Ok(false);
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use bson::doc;

    use super::*;

    fn author() -> Document {
        doc! {
            "name": "John",
            "age": 30,
            "tags": ["a", "b"],
            "books": [
                { "title": "book1", "price": 10_i64 },
                { "title": "book2", "price": 20_i64 },
            ],
        }
    }

    #[test]
    fn implicit_and_explicit_eq() {
        assert!(matches(&author(), &doc! { "name": "John" }).unwrap());
        assert!(matches(&author(), &doc! { "age": { "$eq": 30_i64 } }).unwrap());
        assert!(!matches(&author(), &doc! { "name": "Jane" }).unwrap());
    }

    #[test]
    fn null_matches_missing() {
        assert!(matches(&author(), &doc! { "nickname": null }).unwrap());
        assert!(!matches(&author(), &doc! { "name": null }).unwrap());
    }

    #[test]
    fn dotted_path_reaches_into_arrays() {
        assert!(matches(&author(), &doc! { "books.title": "book2" }).unwrap());
        assert!(matches(&author(), &doc! { "books.price": { "$gt": 15 } }).unwrap());
        assert!(!matches(&author(), &doc! { "books.price": { "$gt": 25 } }).unwrap());
    }

    #[test]
    fn not_inverts_operators() {
        let f = doc! { "age": { "$not": { "$gt": 20, "$lt": 40 } } };
        assert!(!matches(&author(), &f).unwrap());
        let f = doc! { "age": { "$not": { "$gt": 30 } } };
        assert!(matches(&author(), &f).unwrap());
    }

    #[test]
    fn regex_honors_case_option() {
        let f = doc! { "name": { "$regex": "^jo", "$options": "i" } };
        assert!(matches(&author(), &f).unwrap());
        let f = doc! { "name": { "$regex": "^jo" } };
        assert!(!matches(&author(), &f).unwrap());
    }

    #[test]
    fn array_operators() {
        assert!(matches(&author(), &doc! { "tags": { "$all": ["b", "a"] } }).unwrap());
        assert!(matches(&author(), &doc! { "tags": { "$size": 2 } }).unwrap());
        assert!(!matches(&author(), &doc! { "tags": { "$size": 3 } }).unwrap());
        assert!(matches(&author(), &doc! { "tags": "a" }).unwrap());
    }

    #[test]
    fn elem_match_requires_one_element_to_satisfy_all() {
        let f = doc! { "books": { "$elemMatch": { "$and": [
            { "title": "book1" }, { "price": { "$gte": 20 } }
        ] } } };
        assert!(!matches(&author(), &f).unwrap());
        let f = doc! { "books": { "$elemMatch": { "$and": [
            { "title": "book2" }, { "price": { "$gte": 20 } }
        ] } } };
        assert!(matches(&author(), &f).unwrap());
    }

    #[test]
    fn logical_combinators() {
        assert!(matches(&author(), &doc! { "$or": [{ "age": 1 }, { "age": 30 }] }).unwrap());
        assert!(!matches(&author(), &doc! { "$nor": [{ "age": 30 }] }).unwrap());
        assert!(!matches(&author(), &doc! { "$or": [] }).unwrap());
        assert!(matches(&author(), &doc! { "$and": [] }).unwrap());
    }

    #[test]
    fn unknown_operator_is_rejected() {
        let err = matches(&author(), &doc! { "age": { "$near": 1 } }).unwrap_err();
        assert!(std::matches!(err, MemoryError::InvalidFilter(_)));
    }
}
