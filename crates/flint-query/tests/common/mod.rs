#![allow(dead_code)]

use bson::Bson;
use flint_query::{EmbeddedDocument, EmbeddedDocuments, Field, Id, QueryValue, Record};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Active,
    Retirement,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Active => "ACTIVE",
            Status::Retirement => "RETIREMENT",
        }
    }
}

impl QueryValue for Status {
    fn into_bson(self) -> Bson {
        Bson::String(self.as_str().to_string())
    }
}

pub struct Author;
pub struct Book;
pub struct Publisher;

impl Record for Author {
    const COLLECTION: &'static str = "authors";
}

impl Record for Book {
    const COLLECTION: &'static str = "books";
}

impl Record for Publisher {
    const COLLECTION: &'static str = "publishers";
}

impl Author {
    pub fn id() -> Field<Author, Id> {
        Field::of("id")
    }

    pub fn name() -> Field<Author, String> {
        Field::of("name")
    }

    pub fn age() -> Field<Author, i32> {
        Field::of("age")
    }

    pub fn weight() -> Field<Author, f64> {
        Field::of("weight")
    }

    pub fn status() -> Field<Author, Status> {
        Field::of("status")
    }

    pub fn nickname() -> Field<Author, Option<String>> {
        Field::of("nickname")
    }

    pub fn tags() -> Field<Author, Vec<String>> {
        Field::of("tags")
    }

    pub fn books() -> EmbeddedDocuments<Author, Book> {
        EmbeddedDocuments::of("books")
    }

    pub fn agent() -> EmbeddedDocument<Author, Publisher> {
        EmbeddedDocument::of("agent")
    }
}

impl Book {
    pub fn id() -> Field<Book, Id> {
        Field::of("id")
    }

    pub fn title() -> Field<Book, String> {
        Field::of("title")
    }

    pub fn price() -> Field<Book, i64> {
        Field::of("price")
    }

    pub fn publisher() -> EmbeddedDocument<Book, Publisher> {
        EmbeddedDocument::of("publisher")
    }
}

impl Publisher {
    pub fn name() -> Field<Publisher, String> {
        Field::of("name")
    }

    pub fn city() -> Field<Publisher, String> {
        Field::of("city")
    }
}
