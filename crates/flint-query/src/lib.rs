//! Typed builders for document-database filters and aggregation pipelines.
//!
//! ```
//! use flint_query::{Field, GroupType, Record, filter};
//!
//! struct Author;
//!
//! impl Record for Author {
//!     const COLLECTION: &'static str = "authors";
//! }
//!
//! let name: Field<Author, String> = Field::of("name");
//! let age: Field<Author, i32> = Field::of("age");
//! let status: Field<Author, String> = Field::of("status");
//!
//! let pipeline = filter(|root| root.and(|s| s.eq(&name, "John")))
//!     .group(&status, GroupType::Single)
//!     .sum(|r| {
//!         r.field(&age).alias("sum");
//!     })
//!     .unwrap();
//!
//! assert_eq!(pipeline.to_pipeline().len(), 3);
//! ```

mod aggregate;
mod error;
mod executor;
mod field;
mod filter;
mod operator;
mod predicate;
mod value;

pub use aggregate::{
    Aggregation, COUNT_ALIAS, GroupKey, GroupType, Grouped, ReducerField, ReducerKind,
    ReducerScope, Stage,
};
pub use error::Error;
pub use executor::Executor;
pub use field::{Embedded, EmbeddedDocument, EmbeddedDocuments, Field, Record};
pub use filter::{Filter, FilterNode, Scope, filter};
pub use operator::{CASE_INSENSITIVE, Operator};
pub use value::{
    Array, Id, NumericType, QueryValue, Text, convert_numeric, normalize, to_decimal,
    to_decimal128,
};
