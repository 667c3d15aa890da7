use std::fmt;
use std::marker::PhantomData;

use bson::{Bson, Document};

use crate::field::Embedded;
use crate::operator::Operator;

/// One entry of a filter expression: a single-key document whose key is a
/// field path or a logical keyword.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterNode(Document);

impl FilterNode {
    pub fn new(key: impl Into<String>, value: impl Into<Bson>) -> Self {
        let mut doc = Document::new();
        doc.insert(key, value);
        FilterNode(doc)
    }

    /// A node that matches nothing in particular and is never appended.
    pub fn empty() -> Self {
        FilterNode(Document::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The field path or keyword this node is keyed by.
    pub fn key(&self) -> Option<&str> {
        self.0.keys().next().map(String::as_str)
    }

    pub fn as_document(&self) -> &Document {
        &self.0
    }

    pub fn into_document(self) -> Document {
        self.0
    }
}

impl From<FilterNode> for Document {
    fn from(node: FilterNode) -> Self {
        node.0
    }
}

impl From<FilterNode> for Bson {
    fn from(node: FilterNode) -> Self {
        Bson::Document(node.0)
    }
}

/// Build a `{ $op: value }` operator document.
pub(crate) fn operator_doc(op: Operator, value: impl Into<Bson>) -> Document {
    let mut doc = Document::new();
    doc.insert(op.as_str(), value);
    doc
}

/// `{ $op: [children...] }` for a logical keyword.
fn wrap(op: Operator, nodes: Vec<FilterNode>) -> Document {
    operator_doc(
        op,
        nodes.into_iter().map(Bson::from).collect::<Vec<_>>(),
    )
}

/// Run `block` against a fresh scope and return what it collected.
fn collect<O, R>(block: impl FnOnce(&mut Scope<O>) -> R) -> Vec<FilterNode> {
    let mut scope = Scope::new();
    block(&mut scope);
    scope.nodes
}

// ── Scope ───────────────────────────────────────────────────────

/// Append-only list of nodes collected by one block (the root, an `and`/
/// `or`/`nor` body, or an `elem_match` body) over records of type `O`.
pub struct Scope<O> {
    nodes: Vec<FilterNode>,
    _owner: PhantomData<fn() -> O>,
}

impl<O> Scope<O> {
    fn new() -> Self {
        Scope {
            nodes: Vec::new(),
            _owner: PhantomData,
        }
    }

    pub fn nodes(&self) -> &[FilterNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Append `node` unless it is empty, and hand it back to the caller.
    pub(crate) fn push(&mut self, node: FilterNode) -> FilterNode {
        if !node.is_empty() {
            self.nodes.push(node.clone());
        }
        node
    }

    /// `{ $and: [...] }` over everything `block` adds. Appended even when
    /// the block adds nothing; nested wrappers are never flattened.
    pub fn and<R>(&mut self, block: impl FnOnce(&mut Scope<O>) -> R) {
        self.logical(Operator::And, block);
    }

    pub fn or<R>(&mut self, block: impl FnOnce(&mut Scope<O>) -> R) {
        self.logical(Operator::Or, block);
    }

    pub fn nor<R>(&mut self, block: impl FnOnce(&mut Scope<O>) -> R) {
        self.logical(Operator::Nor, block);
    }

    fn logical<R>(&mut self, op: Operator, block: impl FnOnce(&mut Scope<O>) -> R) {
        let children = collect(block);
        self.nodes.push(FilterNode(wrap(op, children)));
    }

    /// `{ path: { $elemMatch: { $and: [...] } } }`, with `block` scoped over
    /// the embedded element type so its fields are relative to the element.
    pub fn elem_match<D, R>(
        &mut self,
        embedded: &D,
        block: impl FnOnce(&mut Scope<D::Element>) -> R,
    ) where
        D: Embedded<O>,
    {
        let children = collect(block);
        let body = operator_doc(Operator::ElemMatch, wrap(Operator::And, children));
        self.nodes.push(FilterNode::new(embedded.path(), body));
    }
}

// ── Root ────────────────────────────────────────────────────────

/// A finished filter expression over records of type `O`: the top-level
/// nodes of the root block, conjoined when executed.
pub struct Filter<O> {
    nodes: Vec<FilterNode>,
    _owner: PhantomData<fn() -> O>,
}

/// Open a root scope, run `block`, and return the finished filter.
///
/// No combinator is injected: operators called directly on the root become
/// independent top-level nodes.
///
/// Range operators whose bounds are both `None` add nothing. A filter built
/// entirely from such calls is empty and matches every record, which is what
/// optional search forms rely on.
pub fn filter<O, R>(block: impl FnOnce(&mut Scope<O>) -> R) -> Filter<O> {
    Filter::build(block)
}

impl<O> Filter<O> {
    pub fn build<R>(block: impl FnOnce(&mut Scope<O>) -> R) -> Self {
        Filter {
            nodes: collect(block),
            _owner: PhantomData,
        }
    }

    pub fn nodes(&self) -> &[FilterNode] {
        &self.nodes
    }

    pub fn into_nodes(self) -> Vec<FilterNode> {
        self.nodes
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Render the conjunction of the top-level nodes as one document.
    pub fn to_document(&self) -> Document {
        match self.nodes.as_slice() {
            [] => Document::new(),
            [node] => node.as_document().clone(),
            nodes => operator_doc(
                Operator::And,
                nodes.iter().cloned().map(Bson::from).collect::<Vec<_>>(),
            ),
        }
    }
}

impl<O> Clone for Filter<O> {
    fn clone(&self) -> Self {
        Filter {
            nodes: self.nodes.clone(),
            _owner: PhantomData,
        }
    }
}

impl<O> fmt::Debug for Filter<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Filter").field("nodes", &self.nodes).finish()
    }
}

#[cfg(test)]
mod tests {
    use bson::doc;

    use super::*;
    use crate::field::{EmbeddedDocuments, Field};

    struct Author;
    struct Book;

    #[test]
    fn nested_and_is_not_flattened() {
        let x: Field<Author, i32> = Field::new("x");
        let f = filter(|root| {
            root.and(|outer| {
                outer.and(|inner| inner.eq(&x, 1));
            })
        });
        assert_eq!(
            f.nodes()[0].as_document(),
            &doc! { "$and": [{ "$and": [{ "x": 1 }] }] }
        );
    }

    #[test]
    fn empty_combinator_is_still_appended() {
        let f: Filter<Author> = filter(|root| root.or(|_| {}));
        assert_eq!(f.nodes().len(), 1);
        assert_eq!(f.nodes()[0].as_document(), &doc! { "$or": [] });
    }

    #[test]
    fn root_operators_stay_independent() {
        let x: Field<Author, i32> = Field::new("x");
        let y: Field<Author, i32> = Field::new("y");
        let f = filter(|root| {
            root.eq(&x, 1);
            root.eq(&y, 2);
        });
        assert_eq!(f.nodes().len(), 2);
        assert_eq!(f.nodes()[0].key(), Some("x"));
        assert_eq!(
            f.to_document(),
            doc! { "$and": [{ "x": 1 }, { "y": 2 }] }
        );
    }

    #[test]
    fn single_node_renders_as_itself() {
        let x: Field<Author, i32> = Field::new("x");
        let f = filter(|root| root.gt(&x, 3));
        assert_eq!(f.to_document(), doc! { "x": { "$gt": 3 } });
    }

    #[test]
    fn empty_filter_renders_empty_document() {
        let f: Filter<Author> = filter(|_| {});
        assert!(f.is_empty());
        assert_eq!(f.to_document(), Document::new());
    }

    #[test]
    fn elem_match_scopes_relative_paths() {
        let books: EmbeddedDocuments<Author, Book> = EmbeddedDocuments::new("books");
        let title: Field<Book, String> = Field::new("title");
        let f = filter(|root| {
            root.elem_match(&books, |book| book.eq(&title, "book1"));
        });
        assert_eq!(
            f.to_document(),
            doc! { "books": { "$elemMatch": { "$and": [{ "title": "book1" }] } } }
        );
    }
}
