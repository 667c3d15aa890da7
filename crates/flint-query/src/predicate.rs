//! Field predicates.
//!
//! Every operator builds one node, appends it to the scope unless it is
//! empty, and returns it. Operands always pass through [`normalize`].

use bson::{Bson, Document};
use tracing::trace;

use crate::field::Field;
use crate::filter::{FilterNode, Scope, operator_doc};
use crate::operator::{CASE_INSENSITIVE, Operator};
use crate::value::{Array, QueryValue, Text, normalize};

#[derive(Clone, Copy)]
enum Bounds {
    Exclusive,
    Inclusive,
}

impl Bounds {
    fn operators(self) -> (Operator, Operator) {
        match self {
            Bounds::Exclusive => (Operator::Gt, Operator::Lt),
            Bounds::Inclusive => (Operator::Gte, Operator::Lte),
        }
    }
}

#[derive(Clone, Copy)]
enum Anchor {
    None,
    Start,
    End,
}

/// The operand is a regex fragment, not a literal: metacharacters keep
/// their meaning.
fn pattern(value: &str, anchor: Anchor) -> String {
    match anchor {
        Anchor::None => value.to_string(),
        Anchor::Start => format!("^{value}"),
        Anchor::End => format!("{value}$"),
    }
}

fn regex_doc(pattern: String, ignore_case: bool) -> Document {
    let mut doc = operator_doc(Operator::Regex, pattern);
    if ignore_case {
        doc.insert(Operator::Options.as_str(), CASE_INSENSITIVE);
    }
    doc
}

fn not(body: Document) -> Document {
    operator_doc(Operator::Not, body)
}

impl<O> Scope<O> {
    fn field_node<V>(&mut self, field: &Field<O, V>, value: impl Into<Bson>) -> FilterNode {
        self.push(FilterNode::new(field.path(), value))
    }

    fn compare<V: QueryValue>(
        &mut self,
        field: &Field<O, V>,
        op: Operator,
        value: V,
    ) -> FilterNode {
        self.field_node(field, operator_doc(op, normalize(value)))
    }

    fn range<V: QueryValue>(
        &mut self,
        field: &Field<O, V>,
        lower: Option<V>,
        upper: Option<V>,
        bounds: Bounds,
        negate: bool,
    ) -> FilterNode {
        let (lower_op, upper_op) = bounds.operators();
        let mut ops = Document::new();
        if let Some(lo) = lower {
            ops.insert(lower_op.as_str(), normalize(lo));
        }
        if let Some(hi) = upper {
            ops.insert(upper_op.as_str(), normalize(hi));
        }

        if ops.is_empty() {
            trace!(field = field.path(), "range without bounds, predicate omitted");
            return FilterNode::empty();
        }

        let body = if negate { not(ops) } else { ops };
        self.field_node(field, body)
    }

    fn membership<V, I>(&mut self, field: &Field<O, V>, op: Operator, values: I) -> FilterNode
    where
        V: QueryValue,
        I: IntoIterator,
        I::Item: Into<V>,
    {
        let values: Vec<Bson> = values.into_iter().map(|v| normalize(v.into())).collect();
        self.field_node(field, operator_doc(op, values))
    }

    // ── Equality & comparison ───────────────────────────────────

    /// `{ path: value }`
    pub fn eq<V: QueryValue>(&mut self, field: &Field<O, V>, value: impl Into<V>) -> FilterNode {
        self.field_node(field, normalize(value.into()))
    }

    pub fn ne<V: QueryValue>(&mut self, field: &Field<O, V>, value: impl Into<V>) -> FilterNode {
        self.compare(field, Operator::Ne, value.into())
    }

    pub fn lt<V: QueryValue>(&mut self, field: &Field<O, V>, value: impl Into<V>) -> FilterNode {
        self.compare(field, Operator::Lt, value.into())
    }

    pub fn lte<V: QueryValue>(&mut self, field: &Field<O, V>, value: impl Into<V>) -> FilterNode {
        self.compare(field, Operator::Lte, value.into())
    }

    pub fn gt<V: QueryValue>(&mut self, field: &Field<O, V>, value: impl Into<V>) -> FilterNode {
        self.compare(field, Operator::Gt, value.into())
    }

    pub fn gte<V: QueryValue>(&mut self, field: &Field<O, V>, value: impl Into<V>) -> FilterNode {
        self.compare(field, Operator::Gte, value.into())
    }

    // ── Ranges ──────────────────────────────────────────────────

    /// Exclusive range. A missing bound drops that side; with both bounds
    /// missing nothing is appended.
    pub fn between<V: QueryValue>(
        &mut self,
        field: &Field<O, V>,
        lower: Option<V>,
        upper: Option<V>,
    ) -> FilterNode {
        self.range(field, lower, upper, Bounds::Exclusive, false)
    }

    /// Exclusive range under `$not`.
    pub fn not_between<V: QueryValue>(
        &mut self,
        field: &Field<O, V>,
        lower: Option<V>,
        upper: Option<V>,
    ) -> FilterNode {
        self.range(field, lower, upper, Bounds::Exclusive, true)
    }

    pub fn between_inclusive<V: QueryValue>(
        &mut self,
        field: &Field<O, V>,
        lower: Option<V>,
        upper: Option<V>,
    ) -> FilterNode {
        self.range(field, lower, upper, Bounds::Inclusive, false)
    }

    pub fn not_between_inclusive<V: QueryValue>(
        &mut self,
        field: &Field<O, V>,
        lower: Option<V>,
        upper: Option<V>,
    ) -> FilterNode {
        self.range(field, lower, upper, Bounds::Inclusive, true)
    }

    // ── Membership ──────────────────────────────────────────────

    /// `{ path: { $in: [...] } }`
    pub fn is_in<V, I>(&mut self, field: &Field<O, V>, values: I) -> FilterNode
    where
        V: QueryValue,
        I: IntoIterator,
        I::Item: Into<V>,
    {
        self.membership(field, Operator::In, values)
    }

    /// `$in` with a single operand, emitted as-is (typically an array value).
    pub fn is_in_value<V: QueryValue>(
        &mut self,
        field: &Field<O, V>,
        value: impl Into<V>,
    ) -> FilterNode {
        self.compare(field, Operator::In, value.into())
    }

    pub fn not_in<V, I>(&mut self, field: &Field<O, V>, values: I) -> FilterNode
    where
        V: QueryValue,
        I: IntoIterator,
        I::Item: Into<V>,
    {
        self.membership(field, Operator::NotIn, values)
    }

    pub fn not_in_value<V: QueryValue>(
        &mut self,
        field: &Field<O, V>,
        value: impl Into<V>,
    ) -> FilterNode {
        self.compare(field, Operator::NotIn, value.into())
    }

    // ── Patterns ────────────────────────────────────────────────

    /// Unanchored regex match on `value`.
    pub fn contains<V: Text>(&mut self, field: &Field<O, V>, value: &str) -> FilterNode {
        self.field_node(field, regex_doc(pattern(value, Anchor::None), false))
    }

    pub fn contains_ignore_case<V: Text>(
        &mut self,
        field: &Field<O, V>,
        value: &str,
    ) -> FilterNode {
        self.field_node(field, regex_doc(pattern(value, Anchor::None), true))
    }

    pub fn contains_not<V: Text>(&mut self, field: &Field<O, V>, value: &str) -> FilterNode {
        self.field_node(field, not(regex_doc(pattern(value, Anchor::None), false)))
    }

    pub fn contains_not_ignore_case<V: Text>(
        &mut self,
        field: &Field<O, V>,
        value: &str,
    ) -> FilterNode {
        self.field_node(field, not(regex_doc(pattern(value, Anchor::None), true)))
    }

    pub fn starts_with<V: Text>(&mut self, field: &Field<O, V>, value: &str) -> FilterNode {
        self.field_node(field, regex_doc(pattern(value, Anchor::Start), false))
    }

    pub fn starts_with_ignore_case<V: Text>(
        &mut self,
        field: &Field<O, V>,
        value: &str,
    ) -> FilterNode {
        self.field_node(field, regex_doc(pattern(value, Anchor::Start), true))
    }

    pub fn ends_with<V: Text>(&mut self, field: &Field<O, V>, value: &str) -> FilterNode {
        self.field_node(field, regex_doc(pattern(value, Anchor::End), false))
    }

    pub fn ends_with_ignore_case<V: Text>(
        &mut self,
        field: &Field<O, V>,
        value: &str,
    ) -> FilterNode {
        self.field_node(field, regex_doc(pattern(value, Anchor::End), true))
    }

    /// Regular-expression match; `pattern` is passed through verbatim.
    pub fn matches<V: Text>(&mut self, field: &Field<O, V>, pattern: &str) -> FilterNode {
        self.field_node(field, regex_doc(pattern.to_string(), false))
    }

    // ── Arrays & presence ───────────────────────────────────────

    /// Array field containing every one of `values`.
    pub fn all<V, I>(&mut self, field: &Field<O, V>, values: I) -> FilterNode
    where
        V: Array,
        V::Item: QueryValue,
        I: IntoIterator,
        I::Item: Into<V::Item>,
    {
        let values: Vec<Bson> = values.into_iter().map(|v| normalize(v.into())).collect();
        self.field_node(field, operator_doc(Operator::All, values))
    }

    pub fn size<V: Array>(&mut self, field: &Field<O, V>, len: i32) -> FilterNode {
        self.field_node(field, operator_doc(Operator::Size, len))
    }

    pub fn exists<V>(&mut self, field: &Field<O, V>, present: bool) -> FilterNode {
        self.field_node(field, operator_doc(Operator::Exists, present))
    }
}

#[cfg(test)]
mod tests {
    use bson::doc;

    use super::*;
    use crate::filter::{Filter, filter};
    use crate::value::Id;

    struct Author;

    fn age() -> Field<Author, i32> {
        Field::new("age")
    }

    fn name() -> Field<Author, String> {
        Field::new("name")
    }

    fn only(f: &Filter<Author>) -> &Document {
        assert_eq!(f.nodes().len(), 1, "expected one node, got {:?}", f.nodes());
        f.nodes()[0].as_document()
    }

    #[test]
    fn between_both_bounds() {
        let f = filter(|s| s.between(&age(), Some(3), Some(5)));
        assert_eq!(only(&f), &doc! { "age": { "$gt": 3, "$lt": 5 } });
    }

    #[test]
    fn between_single_bound() {
        let f = filter(|s| s.between(&age(), None, Some(5)));
        assert_eq!(only(&f), &doc! { "age": { "$lt": 5 } });

        let f = filter(|s| s.between(&age(), Some(5), None));
        assert_eq!(only(&f), &doc! { "age": { "$gt": 5 } });
    }

    #[test]
    fn ranges_without_bounds_are_dropped() {
        let f = filter(|s| {
            let node = s.between(&age(), None, None);
            assert!(node.is_empty());
            s.not_between(&age(), None, None);
            s.between_inclusive(&age(), None, None);
            s.not_between_inclusive(&age(), None, None);
            assert_eq!(s.len(), 0);
        });
        assert!(f.is_empty());
    }

    #[test]
    fn not_between_wraps_in_not() {
        let f = filter(|s| s.not_between(&age(), Some(3), Some(5)));
        assert_eq!(only(&f), &doc! { "age": { "$not": { "$gt": 3, "$lt": 5 } } });

        let f = filter(|s| s.not_between(&age(), None, Some(5)));
        assert_eq!(only(&f), &doc! { "age": { "$not": { "$lt": 5 } } });
    }

    #[test]
    fn inclusive_ranges() {
        let f = filter(|s| s.between_inclusive(&age(), Some(3), Some(5)));
        assert_eq!(only(&f), &doc! { "age": { "$gte": 3, "$lte": 5 } });

        let f = filter(|s| s.not_between_inclusive(&age(), Some(3), None));
        assert_eq!(only(&f), &doc! { "age": { "$not": { "$gte": 3 } } });
    }

    #[test]
    fn comparisons() {
        let f = filter(|s| {
            s.ne(&age(), 1);
            s.lt(&age(), 2);
            s.lte(&age(), 3);
            s.gt(&age(), 4);
            s.gte(&age(), 5);
        });
        let docs: Vec<_> = f.nodes().iter().map(|n| n.as_document().clone()).collect();
        assert_eq!(
            docs,
            vec![
                doc! { "age": { "$ne": 1 } },
                doc! { "age": { "$lt": 2 } },
                doc! { "age": { "$lte": 3 } },
                doc! { "age": { "$gt": 4 } },
                doc! { "age": { "$gte": 5 } },
            ]
        );
    }

    #[test]
    fn operator_returns_the_appended_node() {
        filter(|s| {
            let node = s.eq(&name(), "John");
            assert_eq!(node.as_document(), &doc! { "name": "John" });
            assert_eq!(s.nodes(), &[node]);
        });
    }

    #[test]
    fn identifier_is_normalized() {
        let id_field: Field<Author, Id> = Field::new("_id");
        let id = Id::new();
        let f = filter(|s| s.eq(&id_field, id));
        assert_eq!(only(&f), &doc! { "_id": id.object_id() });

        let f = filter(|s| s.is_in(&id_field, [id]));
        assert_eq!(only(&f), &doc! { "_id": { "$in": [id.object_id()] } });
    }

    #[test]
    fn membership() {
        let f = filter(|s| s.is_in(&age(), [1, 2]));
        assert_eq!(only(&f), &doc! { "age": { "$in": [1, 2] } });

        let f = filter(|s| s.not_in(&name(), vec!["a", "b"]));
        assert_eq!(only(&f), &doc! { "name": { "$nin": ["a", "b"] } });

        let tags: Field<Author, Vec<String>> = Field::new("tags");
        let f = filter(|s| s.is_in_value(&tags, vec!["x".to_string()]));
        assert_eq!(only(&f), &doc! { "tags": { "$in": ["x"] } });
    }

    #[test]
    fn patterns() {
        let f = filter(|s| s.contains(&name(), "oh"));
        assert_eq!(only(&f), &doc! { "name": { "$regex": "oh" } });

        let f = filter(|s| s.contains_ignore_case(&name(), "OH"));
        assert_eq!(only(&f), &doc! { "name": { "$regex": "OH", "$options": "i" } });

        let f = filter(|s| s.contains_not(&name(), "oh"));
        assert_eq!(only(&f), &doc! { "name": { "$not": { "$regex": "oh" } } });

        let f = filter(|s| s.contains_not_ignore_case(&name(), "oh"));
        assert_eq!(
            only(&f),
            &doc! { "name": { "$not": { "$regex": "oh", "$options": "i" } } }
        );

        let f = filter(|s| s.starts_with(&name(), "Jo"));
        assert_eq!(only(&f), &doc! { "name": { "$regex": "^Jo" } });

        let f = filter(|s| s.ends_with(&name(), "hn"));
        assert_eq!(only(&f), &doc! { "name": { "$regex": "hn$" } });

        let f = filter(|s| s.starts_with_ignore_case(&name(), "jo"));
        assert_eq!(only(&f), &doc! { "name": { "$regex": "^jo", "$options": "i" } });
    }

    #[test]
    fn pattern_operands_keep_regex_syntax() {
        let f = filter(|s| s.contains(&name(), "J.hn"));
        assert_eq!(only(&f), &doc! { "name": { "$regex": "J.hn" } });

        let f = filter(|s| s.starts_with(&name(), "(Jo|Ja)"));
        assert_eq!(only(&f), &doc! { "name": { "$regex": "^(Jo|Ja)" } });

        let f = filter(|s| s.matches(&name(), "^J.*n$"));
        assert_eq!(only(&f), &doc! { "name": { "$regex": "^J.*n$" } });
    }

    #[test]
    fn arrays_and_presence() {
        let tags: Field<Author, Vec<String>> = Field::new("tags");
        let f = filter(|s| s.all(&tags, ["a", "b"]));
        assert_eq!(only(&f), &doc! { "tags": { "$all": ["a", "b"] } });

        let f = filter(|s| s.size(&tags, 2));
        assert_eq!(only(&f), &doc! { "tags": { "$size": 2 } });

        let f = filter(|s| s.exists(&age(), false));
        assert_eq!(only(&f), &doc! { "age": { "$exists": false } });
    }
}
