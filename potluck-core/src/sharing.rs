//! Recipe shares, stored as two mirrored records: a `ReceivedRecord` in the recipient's subtree and
//! a `SentRecord` in the sender's, each pointing at the other.
//!
//! The store has no transactions spanning both owners, so a share is three separate writes.
//! Between the second and third write the received record has no `counterpartSentId`; if the
//! process dies there the record stays unlinked until [`SharingExchange::repair_orphans`] runs.

use std::sync::Arc;
use std::time::Duration;

use futures::future::try_join_all;
use futures::stream::{BoxStream, StreamExt};
use serde_json::Value;
use tracing::{debug, info, warn};

use potluck_common::documents::fields;
use potluck_common::{
    ReceivedRecord, ReceivedRecordId, Reaction, RecipeId, SentRecord, SentRecordId, SentShare,
    ShareReceipt, UserId,
};
use potluck_store::{decode_all, encode, Changes, Direction, DocumentStore, Query, StoreError};

use crate::{paths, Error, Result};

#[derive(Clone)]
pub struct SharingExchange {
    store: Arc<dyn DocumentStore>,
}

fn received_query(owner: &UserId) -> Result<Query> {
    Ok(Query::new(paths::received_recipes(owner)?).order_by(fields::TIMESTAMP, Direction::Descending))
}

impl SharingExchange {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Does not check that the users are friends; callers gate sharing on the friend list.
    pub async fn send(
        &self,
        from_user: &UserId,
        to_user: &UserId,
        recipe_id: RecipeId,
    ) -> Result<ShareReceipt> {
        let timestamp = self.store.server_timestamp().await?;

        let inbox = paths::received_recipes(to_user)?;
        let received = ReceivedRecord {
            id: ReceivedRecordId(self.store.new_id(&inbox)),
            from_user_id: from_user.clone(),
            recipe_id,
            reaction: None,
            timestamp,
            counterpart_sent_id: None,
        };
        let received_path = inbox.doc(&received.id)?;
        self.store.set(&received_path, encode(&received)?).await?;

        let link = async {
            let outbox = paths::sent_recipes(from_user)?;
            let sent = SentRecord {
                id: SentRecordId(self.store.new_id(&outbox)),
                to_user_id: to_user.clone(),
                recipe_id,
                timestamp,
                counterpart_received_id: received.id.clone(),
                reaction: None,
            };
            self.store.set(&outbox.doc(&sent.id)?, encode(&sent)?).await?;
            self.store
                .update(
                    &received_path,
                    Changes::new().set(fields::COUNTERPART_SENT_ID, sent.id.as_ref()),
                )
                .await?;
            Ok::<_, StoreError>(sent.id)
        };
        let sent_id = match link.await {
            Ok(sent_id) => sent_id,
            Err(error) => {
                warn!(
                    record_id = %received.id,
                    %from_user,
                    %to_user,
                    %error,
                    "share left a received record without its sent counterpart"
                );
                return Err(error.into());
            }
        };

        info!(%from_user, %to_user, %recipe_id, received_id = %received.id, sent_id = %sent_id, "recipe shared");
        Ok(ShareReceipt {
            received_id: received.id,
            sent_id,
        })
    }

    /// Saves the reaction on the caller's received record, then copies it onto the sender's
    /// record when the two are linked. An unlinked record keeps the reaction on its side only.
    pub async fn react(
        &self,
        by_user: &UserId,
        received_id: &ReceivedRecordId,
        reaction: Reaction,
    ) -> Result<()> {
        let path = paths::received_recipes(by_user)?.doc(received_id)?;
        self.store
            .update(&path, Changes::new().set(fields::REACTION, reaction.as_str()))
            .await
            .map_err(|error| match error {
                StoreError::NotFound(_) => {
                    Error::NotFound(format!("received recipe {received_id}"))
                }
                other => other.into(),
            })?;

        let record: ReceivedRecord = match self.store.get(&path).await? {
            Some(doc) => doc.decode()?,
            None => return Err(Error::NotFound(format!("received recipe {received_id}"))),
        };
        let Some(sent_id) = record.counterpart_sent_id else {
            debug!(record_id = %received_id, "no sent counterpart yet, reaction not propagated");
            return Ok(());
        };

        let sent_path = paths::sent_recipes(&record.from_user_id)?.doc(&sent_id)?;
        match self
            .store
            .update(&sent_path, Changes::new().set(fields::REACTION, reaction.as_str()))
            .await
        {
            Ok(()) => {
                info!(record_id = %received_id, %sent_id, %reaction, "reaction saved and propagated");
                Ok(())
            }
            Err(StoreError::NotFound(_)) => {
                warn!(record_id = %received_id, %sent_id, "sent counterpart is missing, reaction kept on the received side");
                Ok(())
            }
            Err(error) => Err(error.into()),
        }
    }

    /// Newest first.
    pub async fn list_received(&self, by_user: &UserId) -> Result<Vec<ReceivedRecord>> {
        let documents = self.store.query(&received_query(by_user)?).await?;
        Ok(decode_all(&documents)?)
    }

    /// Newest first. Each reaction is read from the recipient's record, which is authoritative
    /// whether or not propagation has happened. If that record is gone the propagated copy is used.
    pub async fn list_sent(&self, by_user: &UserId) -> Result<Vec<SentShare>> {
        let query = Query::new(paths::sent_recipes(by_user)?)
            .order_by(fields::TIMESTAMP, Direction::Descending);
        let records: Vec<SentRecord> = decode_all(&self.store.query(&query).await?)?;
        try_join_all(records.into_iter().map(|record| self.resolve_reaction(record))).await
    }

    /// Live variant of [`SharingExchange::list_received`].
    pub async fn listen_received(
        &self,
        by_user: &UserId,
    ) -> Result<BoxStream<'static, Result<Vec<ReceivedRecord>>>> {
        let listener = self.store.listen(received_query(by_user)?).await?;
        Ok(listener
            .into_stream()
            .map(|delivery| -> Result<Vec<ReceivedRecord>> { Ok(decode_all(&delivery?)?) })
            .boxed())
    }

    /// Links received records left without a counterpart by an interrupted share.
    ///
    /// Only records older than `older_than` are touched, so shares still in flight are left
    /// alone. If the sender's record was never written it is recreated from the received record.
    /// Returns how many records were linked.
    pub async fn repair_orphans(&self, by_user: &UserId, older_than: Duration) -> Result<usize> {
        let now = self.store.server_timestamp().await?;
        let age = i64::try_from(older_than.as_micros()).unwrap_or(i64::MAX);
        let cutoff = now.saturating_sub_micros(age);

        let mut repaired = 0;
        for record in self.list_received(by_user).await? {
            if record.counterpart_sent_id.is_some() || record.timestamp >= cutoff {
                continue;
            }
            let outbox = paths::sent_recipes(&record.from_user_id)?;
            let existing = self
                .store
                .query(
                    &Query::new(outbox.clone())
                        .where_eq(fields::COUNTERPART_RECEIVED_ID, record.id.as_ref()),
                )
                .await?;
            let sent_id = match existing.first() {
                Some(doc) => SentRecordId(doc.id().to_string()),
                None => {
                    let sent = SentRecord {
                        id: SentRecordId(self.store.new_id(&outbox)),
                        to_user_id: by_user.clone(),
                        recipe_id: record.recipe_id,
                        timestamp: record.timestamp,
                        counterpart_received_id: record.id.clone(),
                        reaction: record.reaction,
                    };
                    self.store.set(&outbox.doc(&sent.id)?, encode(&sent)?).await?;
                    debug!(record_id = %record.id, sent_id = %sent.id, "recreated missing sent record");
                    sent.id
                }
            };
            self.store
                .update(
                    &paths::received_recipes(by_user)?.doc(&record.id)?,
                    Changes::new().set(fields::COUNTERPART_SENT_ID, Value::from(sent_id.as_ref())),
                )
                .await?;
            info!(record_id = %record.id, %sent_id, "linked orphaned received record");
            repaired += 1;
        }
        Ok(repaired)
    }

    async fn resolve_reaction(&self, record: SentRecord) -> Result<SentShare> {
        let path = paths::received_recipes(&record.to_user_id)?.doc(&record.counterpart_received_id)?;
        let reaction = match self.store.get(&path).await? {
            Some(doc) => doc.decode::<ReceivedRecord>()?.reaction,
            None => {
                debug!(sent_id = %record.id, "received counterpart missing, using propagated reaction");
                record.reaction
            }
        };
        Ok(SentShare { record, reaction })
    }
}
