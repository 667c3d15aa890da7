use bson::Document;

use crate::aggregate::Aggregation;
use crate::field::Record;
use crate::filter::Filter;

/// The database side: runs finished filters and stage sequences.
///
/// A filter document is the conjunction of its entries. Aggregation results
/// come back keyed by the declared aliases, with the group key in `_id` when
/// the pipeline was grouped.
pub trait Executor {
    type Error: std::error::Error;

    fn find(&self, collection: &str, filter: &Document) -> Result<Vec<Document>, Self::Error>;

    fn count(&self, collection: &str, filter: &Document) -> Result<u64, Self::Error>;

    fn aggregate(
        &self,
        collection: &str,
        pipeline: &[Document],
    ) -> Result<Vec<Document>, Self::Error>;
}

impl<O: Record> Filter<O> {
    pub fn find<E: Executor>(&self, executor: &E) -> Result<Vec<Document>, E::Error> {
        executor.find(O::COLLECTION, &self.to_document())
    }

    pub fn count_matching<E: Executor>(&self, executor: &E) -> Result<u64, E::Error> {
        executor.count(O::COLLECTION, &self.to_document())
    }
}

impl<O: Record> Aggregation<O> {
    pub fn execute<E: Executor>(&self, executor: &E) -> Result<Vec<Document>, E::Error> {
        executor.aggregate(O::COLLECTION, &self.to_pipeline())
    }
}
