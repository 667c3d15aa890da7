use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use arc_swap::ArcSwap;
use bson::oid::ObjectId;
use bson::{Bson, Document};
use flint_query::{COUNT_ALIAS, Executor, Field, Grouped, Record};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::MemoryError;
use crate::eval::matches;
use crate::pipeline;

type Documents = imbl::Vector<Document>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionConfig {
    pub name: String,
}

impl CollectionConfig {
    pub fn new(name: impl Into<String>) -> Self {
        CollectionConfig { name: name.into() }
    }
}

/// In-memory document collections.
///
/// Each collection is an immutable vector behind an `ArcSwap`. Readers take
/// a snapshot without locking; writers publish a new version. A missing
/// collection reads as empty.
#[derive(Default)]
pub struct MemoryDatabase {
    collections: RwLock<HashMap<String, Arc<ArcSwap<Documents>>>>,
}

fn poisoned<T>(err: std::sync::PoisonError<T>) -> MemoryError {
    MemoryError::Poisoned(err.to_string())
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_collection(&self, config: &CollectionConfig) -> Result<(), MemoryError> {
        let mut collections = self.collections.write().map_err(poisoned)?;
        if collections.contains_key(&config.name) {
            return Err(MemoryError::CollectionExists(config.name.clone()));
        }
        collections.insert(
            config.name.clone(),
            Arc::new(ArcSwap::from_pointee(Documents::new())),
        );
        debug!(collection = %config.name, "collection created");
        Ok(())
    }

    /// Returns whether the collection existed.
    pub fn drop_collection(&self, name: &str) -> Result<bool, MemoryError> {
        let mut collections = self.collections.write().map_err(poisoned)?;
        Ok(collections.remove(name).is_some())
    }

    pub fn list_collections(&self) -> Result<Vec<String>, MemoryError> {
        let collections = self.collections.read().map_err(poisoned)?;
        let mut names: Vec<String> = collections.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    fn handle(&self, name: &str) -> Result<Arc<ArcSwap<Documents>>, MemoryError> {
        if let Some(handle) = self.collections.read().map_err(poisoned)?.get(name) {
            return Ok(Arc::clone(handle));
        }
        let mut collections = self.collections.write().map_err(poisoned)?;
        Ok(Arc::clone(collections.entry(name.to_string()).or_insert_with(|| {
            Arc::new(ArcSwap::from_pointee(Documents::new()))
        })))
    }

    fn snapshot(&self, name: &str) -> Result<Arc<Documents>, MemoryError> {
        let collections = self.collections.read().map_err(poisoned)?;
        Ok(match collections.get(name) {
            Some(handle) => handle.load_full(),
            None => Arc::new(Documents::new()),
        })
    }

    pub fn insert_one(&self, collection: &str, document: Document) -> Result<Bson, MemoryError> {
        let mut ids = self.insert_many(collection, [document])?;
        Ok(ids.pop().unwrap_or(Bson::Null))
    }

    /// Insert documents, creating the collection on first use. Documents
    /// without an `_id` get a fresh `ObjectId` as their first field.
    /// Returns the `_id` of each inserted document.
    pub fn insert_many(
        &self,
        collection: &str,
        documents: impl IntoIterator<Item = Document>,
    ) -> Result<Vec<Bson>, MemoryError> {
        let prepared: Vec<Document> = documents.into_iter().map(with_id).collect();
        let ids: Vec<Bson> = prepared
            .iter()
            .map(|d| d.get("_id").cloned().unwrap_or(Bson::Null))
            .collect();

        let handle = self.handle(collection)?;
        handle.rcu(|current| {
            let mut next = Documents::clone(current);
            next.extend(prepared.iter().cloned());
            next
        });
        debug!(collection, inserted = ids.len(), "documents inserted");
        Ok(ids)
    }

    /// Number of matching records per group key, in first-seen order.
    pub fn count_by_group<O: Record>(
        &self,
        grouped: &Grouped<O>,
    ) -> Result<Vec<(Bson, u64)>, MemoryError> {
        let aggregation = grouped.clone().count(|_| {})?;
        aggregation
            .execute(self)?
            .into_iter()
            .map(|mut row| {
                let key = row.remove("_id").unwrap_or(Bson::Null);
                let count = match row.get(COUNT_ALIAS) {
                    Some(Bson::Int32(n)) => u64::try_from(*n).ok(),
                    Some(Bson::Int64(n)) => u64::try_from(*n).ok(),
                    _ => None,
                };
                let count = count.ok_or_else(|| {
                    MemoryError::InvalidPipeline(format!("missing {COUNT_ALIAS} in group result"))
                })?;
                Ok((key, count))
            })
            .collect()
    }

    /// Sum of `field` per group key, in first-seen order.
    pub fn sum_by_group<O: Record, V>(
        &self,
        grouped: &Grouped<O>,
        field: &Field<O, V>,
    ) -> Result<Vec<(Bson, Bson)>, MemoryError> {
        const SUM_ALIAS: &str = "sum";
        let aggregation = grouped.clone().sum(|r| {
            r.field(field).alias(SUM_ALIAS);
        })?;
        aggregation
            .execute(self)?
            .into_iter()
            .map(|mut row| {
                let key = row.remove("_id").unwrap_or(Bson::Null);
                let sum = row.remove(SUM_ALIAS).ok_or_else(|| {
                    MemoryError::InvalidPipeline(format!("missing {SUM_ALIAS} in group result"))
                })?;
                Ok((key, sum))
            })
            .collect()
    }
}

fn with_id(document: Document) -> Document {
    if document.contains_key("_id") {
        return document;
    }
    let mut out = Document::new();
    out.insert("_id", ObjectId::new());
    out.extend(document);
    out
}

impl Executor for MemoryDatabase {
    type Error = MemoryError;

    fn find(&self, collection: &str, filter: &Document) -> Result<Vec<Document>, MemoryError> {
        let snapshot = self.snapshot(collection)?;
        let mut found = Vec::new();
        for doc in snapshot.iter() {
            if matches(doc, filter)? {
                found.push(doc.clone());
            }
        }
        debug!(collection, scanned = snapshot.len(), matched = found.len(), "find");
        Ok(found)
    }

    fn count(&self, collection: &str, filter: &Document) -> Result<u64, MemoryError> {
        let snapshot = self.snapshot(collection)?;
        let mut n = 0_u64;
        for doc in snapshot.iter() {
            if matches(doc, filter)? {
                n += 1;
            }
        }
        debug!(collection, matched = n, "count");
        Ok(n)
    }

    fn aggregate(
        &self,
        collection: &str,
        pipeline: &[Document],
    ) -> Result<Vec<Document>, MemoryError> {
        let snapshot = self.snapshot(collection)?;
        debug!(collection, stages = pipeline.len(), "aggregate");
        pipeline::run(snapshot.iter().cloned().collect(), pipeline)
    }
}
