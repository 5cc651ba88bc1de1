//! Query side of the build index
//!
//! Free text goes against every scalar in the document; field queries use the
//! JSON paths of the build document, e.g. `build.target.channel:beta`.

use serde_json::Value;
use tantivy::collector::TopDocs;
use tantivy::query::QueryParser;
use tantivy::schema::Value as _;
use tantivy::{Index, IndexReader, TantivyDocument};

use super::error::IndexError;
use super::index::TantivyBuildIndex;
use super::schema::BuildIndexSchema;
use crate::identity::BuildHash;
use crate::record_store::RecordId;

/// One matching build
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub record_id: RecordId,
    pub hash: BuildHash,
    pub score: f32,
    pub document: Value,
}

/// Search over an index built by [`TantivyBuildIndex`]
pub struct BuildSearch {
    index: Index,
    reader: IndexReader,
    schema: BuildIndexSchema,
}

impl BuildSearch {
    /// Create a search instance sharing the index of a writer
    pub fn from_index(index: &TantivyBuildIndex) -> Self {
        Self {
            index: index.index().clone(),
            reader: index.reader().clone(),
            schema: index.schema().clone(),
        }
    }

    /// Search for builds matching a query, best first
    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, IndexError> {
        self.reader.reload()?;
        let searcher = self.reader.searcher();

        let query_parser = QueryParser::for_index(&self.index, vec![self.schema.body, self.schema.build]);
        let query = query_parser
            .parse_query(query)
            .map_err(|e| IndexError::permanent(format!("bad query: {}", e)))?;

        let top_docs = searcher.search(&query, &TopDocs::with_limit(limit))?;

        let mut results = Vec::with_capacity(top_docs.len());
        for (score, doc_address) in top_docs {
            let doc: TantivyDocument = searcher.doc(doc_address)?;

            let record_id = doc
                .get_first(self.schema.record_id)
                .and_then(|v| v.as_u64())
                .ok_or_else(|| IndexError::permanent("document missing record_id"))?;

            let hash = doc
                .get_first(self.schema.build_hash)
                .and_then(|v| v.as_str())
                .and_then(BuildHash::parse)
                .ok_or_else(|| IndexError::permanent(format!("record {} has no valid build_hash", record_id)))?;

            let build_json = doc
                .get_first(self.schema.build_json)
                .and_then(|v| v.as_str())
                .ok_or_else(|| IndexError::permanent(format!("record {} has no build_json", record_id)))?;
            let document: Value = serde_json::from_str(build_json)
                .map_err(|e| IndexError::permanent(format!("record {}: {}", record_id, e)))?;

            results.push(SearchHit {
                record_id,
                hash,
                score,
                document,
            });
        }

        Ok(results)
    }
}
