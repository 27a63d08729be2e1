use std::path::Path;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use sled::transaction::{ConflictableTransactionError, ConflictableTransactionResult, TransactionError};
use sled::{Db, Tree};
use tokio::sync::watch;
use tracing::{debug, warn};
use uuid::Uuid;

use potluck_common::Timestamp;

use crate::{
    Changes, CollectionPath, Document, DocumentPath, DocumentStore, Fields, Listener, Query, Result,
    StoreError, Write, WriteBatch,
};

const DOCUMENTS_TREE: &str = "documents";

/// Document store on a single `sled` tree, keyed by document path with JSON-encoded fields.
#[derive(Clone)]
pub struct SledStore {
    db: Db,
    documents: Tree,
    clock: Arc<AtomicI64>,
}

impl SledStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_db(sled::open(path)?)
    }

    /// A store whose files are removed when it is dropped.
    pub fn temporary() -> Result<Self> {
        Self::from_db(sled::Config::new().temporary(true).open()?)
    }

    fn from_db(db: Db) -> Result<Self> {
        Ok(Self {
            documents: db.open_tree(DOCUMENTS_TREE)?,
            db,
            clock: Arc::new(AtomicI64::new(0)),
        })
    }

    pub async fn flush(&self) -> Result<()> {
        self.db.flush_async().await?;
        Ok(())
    }
}

fn encode_fields(fields: &Fields) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(fields)?)
}

fn decode_fields(bytes: &[u8]) -> Result<Fields> {
    Ok(serde_json::from_slice(bytes)?)
}

fn run_query(tree: &Tree, query: &Query) -> Result<Vec<Document>> {
    let prefix = query.collection.key_prefix();
    let mut documents = Vec::new();
    for entry in tree.scan_prefix(prefix.as_bytes()) {
        let (key, value) = entry?;
        // Sub-collection documents share the prefix but sit deeper in the tree.
        if key[prefix.len()..].contains(&b'/') {
            continue;
        }
        let fields = decode_fields(&value)?;
        if query.matches(&fields) {
            documents.push(Document {
                path: DocumentPath::from_key(&key)?,
                fields,
            });
        }
    }
    query.sort(&mut documents);
    Ok(documents)
}

fn abort(error: StoreError) -> ConflictableTransactionError<StoreError> {
    ConflictableTransactionError::Abort(error)
}

#[async_trait]
impl DocumentStore for SledStore {
    async fn get(&self, path: &DocumentPath) -> Result<Option<Document>> {
        match self.documents.get(path.as_str().as_bytes())? {
            Some(bytes) => Ok(Some(Document {
                path: path.clone(),
                fields: decode_fields(&bytes)?,
            })),
            None => Ok(None),
        }
    }

    async fn set(&self, path: &DocumentPath, fields: Fields) -> Result<()> {
        self.documents
            .insert(path.as_str().as_bytes(), encode_fields(&fields)?)?;
        Ok(())
    }

    async fn update(&self, path: &DocumentPath, changes: Changes) -> Result<()> {
        let mut batch = WriteBatch::new();
        batch.update(path.clone(), changes);
        self.commit(batch).await
    }

    async fn delete(&self, path: &DocumentPath) -> Result<()> {
        self.documents.remove(path.as_str().as_bytes())?;
        Ok(())
    }

    async fn query(&self, query: &Query) -> Result<Vec<Document>> {
        run_query(&self.documents, query)
    }

    async fn listen(&self, query: Query) -> Result<Listener> {
        // Subscribe before the initial read so no write between the two is missed.
        let mut subscriber = self.documents.watch_prefix(query.collection.key_prefix().as_bytes());
        let initial = run_query(&self.documents, &query)?;
        let (deliveries, receiver) = watch::channel(None);
        deliveries.send_replace(Some(Ok(initial.clone())));

        let tree = self.documents.clone();
        let task = tokio::spawn(async move {
            let mut last = initial;
            while (&mut subscriber).await.is_some() {
                let delivery = match run_query(&tree, &query) {
                    Ok(documents) if documents == last => continue,
                    Ok(documents) => {
                        last = documents.clone();
                        Ok(documents)
                    }
                    Err(error) => {
                        warn!(collection = %query.collection, %error, "live query failed");
                        Err(Arc::new(error))
                    }
                };
                if deliveries.send(Some(delivery)).is_err() {
                    break;
                }
            }
            debug!(collection = %query.collection, "live query closed");
        });
        Ok(Listener::new(receiver, task))
    }

    fn new_id(&self, _collection: &CollectionPath) -> String {
        Uuid::new_v4().simple().to_string()
    }

    async fn commit(&self, batch: WriteBatch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let encoded = batch
            .writes()
            .iter()
            .map(|write| match write {
                Write::Set { fields, .. } => encode_fields(fields).map(Some),
                _ => Ok(None),
            })
            .collect::<Result<Vec<_>>>()?;

        self.documents
            .transaction(|tx| -> ConflictableTransactionResult<(), StoreError> {
                for (write, bytes) in batch.writes().iter().zip(&encoded) {
                    let key = write.path().as_str().as_bytes();
                    match (write, bytes) {
                        (Write::Set { .. }, Some(bytes)) => {
                            tx.insert(key, bytes.as_slice())?;
                        }
                        (Write::Update { path, changes }, _) => {
                            let current = tx
                                .get(key)?
                                .ok_or_else(|| abort(StoreError::NotFound(path.to_string())))?;
                            let mut fields = decode_fields(&current).map_err(abort)?;
                            changes.apply_to(&mut fields);
                            tx.insert(key, encode_fields(&fields).map_err(abort)?)?;
                        }
                        (Write::Delete { .. }, _) => {
                            tx.remove(key)?;
                        }
                        (Write::Set { path, .. }, None) => {
                            return Err(abort(StoreError::InvalidDocument(path.to_string())));
                        }
                    }
                }
                Ok(())
            })
            .map_err(|error| match error {
                TransactionError::Abort(error) => error,
                TransactionError::Storage(error) => StoreError::Sled(error),
            })
    }

    async fn server_timestamp(&self) -> Result<Timestamp> {
        let now = chrono::Utc::now().timestamp_micros();
        let previous = self
            .clock
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now.max(last + 1))
            })
            .unwrap_or_else(|last| last);
        Ok(Timestamp(now.max(previous + 1)))
    }
}
