use std::fmt;
use std::marker::PhantomData;

/// Field metadata for an application record type.
///
/// `field_name` maps a property name to the wire field name. The default
/// follows the usual document mapping convention: `id` is stored as `_id`,
/// everything else keeps its property name.
pub trait Record {
    /// Collection the execution collaborator reads this record from.
    const COLLECTION: &'static str;

    fn field_name(property: &str) -> String {
        match property {
            "id" => "_id".to_string(),
            other => other.to_string(),
        }
    }
}

fn join_path(outer: &str, inner: &str) -> String {
    let mut path = String::with_capacity(outer.len() + 1 + inner.len());
    path.push_str(outer);
    path.push('.');
    path.push_str(inner);
    path
}

// ── Field ───────────────────────────────────────────────────────

/// A typed reference to a field of `O` holding values of type `V`.
///
/// The path is the dotted wire path. Owner and value types are phantom, so a
/// field can only be compared against operands of its own value type and only
/// used inside a scope over its own owner.
pub struct Field<O, V> {
    path: String,
    _marker: PhantomData<fn() -> (O, V)>,
}

impl<O, V> Field<O, V> {
    /// Reference a field by its wire path, bypassing `Record::field_name`.
    pub fn new(path: impl Into<String>) -> Self {
        Field {
            path: path.into(),
            _marker: PhantomData,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// `$path`, the form aggregation expressions use to read a field.
    pub fn reference(&self) -> String {
        format!("${}", self.path)
    }
}

impl<O: Record, V> Field<O, V> {
    pub fn of(property: &str) -> Self {
        Field::new(O::field_name(property))
    }
}

impl<O, V> Clone for Field<O, V> {
    fn clone(&self) -> Self {
        Field::new(self.path.clone())
    }
}

impl<O, V> PartialEq for Field<O, V> {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl<O, V> Eq for Field<O, V> {}

impl<O, V> fmt::Debug for Field<O, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Field").field(&self.path).finish()
    }
}

// ── Embedded documents ──────────────────────────────────────────

/// A field of `O` that can be opened with `elem_match`, scoping the nested
/// block over `Self::Element`.
pub trait Embedded<O> {
    type Element;

    fn path(&self) -> &str;
}

/// A single embedded sub-document of type `E` inside `O`.
pub struct EmbeddedDocument<O, E> {
    path: String,
    _marker: PhantomData<fn() -> (O, E)>,
}

/// An array of embedded sub-documents of type `E` inside `O`.
pub struct EmbeddedDocuments<O, E> {
    path: String,
    _marker: PhantomData<fn() -> (O, E)>,
}

macro_rules! embedded_impl {
    ($ty:ident, $field_value:ty) => {
        impl<O, E> $ty<O, E> {
            pub fn new(path: impl Into<String>) -> Self {
                $ty {
                    path: path.into(),
                    _marker: PhantomData,
                }
            }

            pub fn path(&self) -> &str {
                &self.path
            }

            /// Reach through to a field of the embedded type.
            pub fn field<V>(&self, inner: &Field<E, V>) -> Field<O, V> {
                Field::new(join_path(&self.path, inner.path()))
            }

            /// Descend into a sub-document nested inside the embedded type.
            pub fn embedded<F>(&self, inner: &EmbeddedDocument<E, F>) -> EmbeddedDocument<O, F> {
                EmbeddedDocument::new(join_path(&self.path, inner.path()))
            }

            /// Descend into an array of sub-documents nested inside the embedded type.
            pub fn documents<F>(
                &self,
                inner: &EmbeddedDocuments<E, F>,
            ) -> EmbeddedDocuments<O, F> {
                EmbeddedDocuments::new(join_path(&self.path, inner.path()))
            }

            /// The embedded field itself, for whole-value predicates such as
            /// `exists` or `size`.
            pub fn as_field(&self) -> Field<O, $field_value> {
                Field::new(self.path.clone())
            }
        }

        impl<O: Record, E> $ty<O, E> {
            pub fn of(property: &str) -> Self {
                $ty::new(O::field_name(property))
            }
        }

        impl<O, E> Embedded<O> for $ty<O, E> {
            type Element = E;

            fn path(&self) -> &str {
                &self.path
            }
        }

        impl<O, E> Clone for $ty<O, E> {
            fn clone(&self) -> Self {
                $ty::new(self.path.clone())
            }
        }

        impl<O, E> fmt::Debug for $ty<O, E> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_tuple(stringify!($ty)).field(&self.path).finish()
            }
        }
    };
}

embedded_impl!(EmbeddedDocument, E);
embedded_impl!(EmbeddedDocuments, Vec<E>);

#[cfg(test)]
mod tests {
    use super::*;

    struct Author;
    struct Book;
    struct Publisher;

    impl Record for Author {
        const COLLECTION: &'static str = "authors";
    }

    impl Record for Book {
        const COLLECTION: &'static str = "books";

        fn field_name(property: &str) -> String {
            match property {
                "isbn" => "isbn_13".to_string(),
                other => other.to_string(),
            }
        }
    }

    #[test]
    fn id_maps_to_underscore_id() {
        let id: Field<Author, String> = Field::of("id");
        assert_eq!(id.path(), "_id");
        let name: Field<Author, String> = Field::of("name");
        assert_eq!(name.path(), "name");
    }

    #[test]
    fn record_rename_applies() {
        let isbn: Field<Book, String> = Field::of("isbn");
        assert_eq!(isbn.path(), "isbn_13");
    }

    #[test]
    fn embedded_paths_compose() {
        let books: EmbeddedDocuments<Author, Book> = EmbeddedDocuments::of("books");
        let publisher: EmbeddedDocument<Book, Publisher> = EmbeddedDocument::new("publisher");
        let city: Field<Publisher, String> = Field::new("city");

        let through = books.embedded(&publisher).field(&city);
        assert_eq!(through.path(), "books.publisher.city");
        assert_eq!(through.reference(), "$books.publisher.city");
    }

    #[test]
    fn as_field_keeps_path() {
        let books: EmbeddedDocuments<Author, Book> = EmbeddedDocuments::new("books");
        assert_eq!(books.as_field().path(), "books");
    }
}
