//! Tantivy schema for build search documents

use tantivy::schema::{
    Field, IndexRecordOption, JsonObjectOptions, Schema, SchemaBuilder, TextFieldIndexing,
    TextOptions, FAST, INDEXED, STORED, STRING,
};

/// Schema for indexing build records
#[derive(Clone)]
pub struct BuildIndexSchema {
    pub schema: Schema,

    /// Storage id of the record; the upsert key
    pub record_id: Field,

    /// Content identifier (`v1:<hex>`), exact match only
    pub build_hash: Field,

    /// The build document as a JSON field, so `build.target.platform:win64` works
    pub build: Field,

    /// Build document as JSON text (stored only, for retrieval)
    pub build_json: Field,

    /// Every scalar value of the document, for free-text queries
    pub body: Field,

    /// Unix timestamp the record was created
    pub created_at: Field,
}

impl BuildIndexSchema {
    pub fn new() -> Self {
        let mut builder = SchemaBuilder::new();

        let indexing = TextFieldIndexing::default()
            .set_tokenizer("default")
            .set_index_option(IndexRecordOption::WithFreqsAndPositions);

        let record_id = builder.add_u64_field("record_id", INDEXED | STORED | FAST);
        let build_hash = builder.add_text_field("build_hash", STRING | STORED);
        let build = builder.add_json_field(
            "build",
            JsonObjectOptions::default().set_indexing_options(indexing.clone()),
        );
        let build_json = builder.add_text_field("build_json", STORED);
        let body = builder.add_text_field("body", TextOptions::default().set_indexing_options(indexing));
        let created_at = builder.add_u64_field("created_at", STORED);

        Self {
            schema: builder.build(),
            record_id,
            build_hash,
            build,
            build_json,
            body,
            created_at,
        }
    }

    /// Get the schema
    pub fn schema(&self) -> Schema {
        self.schema.clone()
    }
}

impl Default for BuildIndexSchema {
    fn default() -> Self {
        Self::new()
    }
}
