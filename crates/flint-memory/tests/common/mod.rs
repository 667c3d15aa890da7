#![allow(dead_code)]

use bson::{Bson, Document, doc};
use flint_memory::MemoryDatabase;
use flint_query::{EmbeddedDocument, EmbeddedDocuments, Field, Id, QueryValue, Record};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Active,
    Retirement,
}

impl QueryValue for Status {
    fn into_bson(self) -> Bson {
        let name = match self {
            Status::Active => "ACTIVE",
            Status::Retirement => "RETIREMENT",
        };
        Bson::String(name.to_string())
    }
}

pub struct Author;
pub struct Book;
pub struct Agent;

impl Record for Author {
    const COLLECTION: &'static str = "authors";
}

impl Record for Book {
    const COLLECTION: &'static str = "books";
}

impl Record for Agent {
    const COLLECTION: &'static str = "agents";
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

    pub fn agent() -> EmbeddedDocument<Author, Agent> {
        EmbeddedDocument::of("agent")
    }
}

impl Book {
    pub fn title() -> Field<Book, String> {
        Field::of("title")
    }

    pub fn price() -> Field<Book, i64> {
        Field::of("price")
    }
}

impl Agent {
    pub fn fee() -> Field<Agent, i64> {
        Field::of("fee")
    }
}

fn author(age: i32, status: Status, nickname: Option<&str>, books: Vec<Document>) -> Document {
    let mut d = doc! {
        "_id": Id::new().object_id(),
        "name": "John",
        "age": age,
        "weight": f64::from(age) * 2.5,
        "status": status.into_bson(),
        "tags": ["writer"],
        "books": books,
        "agent": { "name": "Kim", "fee": i64::from(age) * 10 },
    };
    if let Some(nickname) = nickname {
        d.insert("nickname", nickname);
    }
    d
}

fn book(title: &str, price: i64) -> Document {
    doc! { "title": title, "price": price }
}

/// Four authors named John, aged 10 to 40. The youngest is retired.
pub fn seed() -> MemoryDatabase {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();

    let db = MemoryDatabase::new();
    db.insert_many(
        Author::COLLECTION,
        [
            author(10, Status::Retirement, Some("Johnny"), vec![book("book1", 10_000)]),
            author(
                20,
                Status::Active,
                Some("Jay"),
                vec![book("book1", 5_000), book("book2", 20_000)],
            ),
            author(30, Status::Active, None, vec![book("book3", 15_000)]),
            author(40, Status::Active, None, vec![]),
        ],
    )
    .unwrap();
    db
}

/// `(group key, value)` pairs sorted by key.
pub fn by_key(rows: Vec<Document>, alias: &str) -> Vec<(String, Bson)> {
    let mut pairs: Vec<(String, Bson)> = rows
        .into_iter()
        .map(|row| {
            let key = row.get_str("_id").unwrap().to_string();
            (key, row.get(alias).cloned().unwrap())
        })
        .collect();
    pairs.sort_by(|a, b| a.0.cmp(&b.0));
    pairs
}
