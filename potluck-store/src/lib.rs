//! # potluck-store
//!
//! The document store capability set the social core is written against: per-document CRUD,
//! equality/ordering queries with live feeds, pre-allocated ids, atomic multi-document batches
//! and a store-side clock. [`SledStore`] implements it on an embedded `sled` tree.

mod batch;
mod error;
mod feed;
mod path;
mod query;
mod sled_store;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use potluck_common::Timestamp;

pub use batch::{Changes, FieldChange, Write, WriteBatch};
pub use error::{Result, StoreError};
pub use feed::Listener;
pub use path::{CollectionPath, DocumentPath};
pub use query::{compare_values, Direction, Query};
pub use sled_store::SledStore;

pub type Fields = Map<String, Value>;

#[derive(Clone, Debug, PartialEq)]
pub struct Document {
    pub path: DocumentPath,
    pub fields: Fields,
}

impl Document {
    pub fn id(&self) -> &str {
        self.path.id()
    }

    /// Deserializes the fields, with the path's id injected as `id`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        let mut fields = self.fields.clone();
        fields.insert("id".into(), Value::String(self.id().to_string()));
        Ok(serde_json::from_value(Value::Object(fields))?)
    }
}

/// Serializes `value` into document fields. The `id` field is dropped since ids live in paths.
pub fn encode<T: Serialize>(value: &T) -> Result<Fields> {
    match serde_json::to_value(value)? {
        Value::Object(mut fields) => {
            fields.remove("id");
            Ok(fields)
        }
        other => Err(StoreError::InvalidDocument(format!(
            "expected an object, got {other}"
        ))),
    }
}

pub fn decode_all<T: DeserializeOwned>(documents: &[Document]) -> Result<Vec<T>> {
    documents.iter().map(Document::decode).collect()
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, path: &DocumentPath) -> Result<Option<Document>>;

    /// Creates or fully replaces the document.
    async fn set(&self, path: &DocumentPath, fields: Fields) -> Result<()>;

    /// Fails with [`StoreError::NotFound`] when the document does not exist.
    async fn update(&self, path: &DocumentPath, changes: Changes) -> Result<()>;

    async fn delete(&self, path: &DocumentPath) -> Result<()>;

    async fn query(&self, query: &Query) -> Result<Vec<Document>>;

    /// Live variant of [`DocumentStore::query`]. The first delivery is the current result set.
    async fn listen(&self, query: Query) -> Result<Listener>;

    fn new_id(&self, collection: &CollectionPath) -> String;

    /// Applies every write or none of them.
    async fn commit(&self, batch: WriteBatch) -> Result<()>;

    /// The store's clock. Strictly increasing across calls on the same store.
    async fn server_timestamp(&self) -> Result<Timestamp>;
}
