//! Friend requests and the symmetric `friendIds` lists on user documents.
//!
//! `send_request` checks its guards and then writes, so two users sending each other a request
//! at the same moment can both succeed. Closing that race needs a document keyed by the user pair,
//! which would change the stored schema.

use std::sync::Arc;

use futures::stream::{BoxStream, StreamExt};
use serde_json::Value;
use tracing::{debug, info};

use potluck_common::documents::fields;
use potluck_common::{FriendRequest, RequestId, RequestStatus, UserId, Username};
use potluck_store::{decode_all, encode, Changes, Direction, DocumentPath, DocumentStore, Query, WriteBatch};

use crate::users::{find_by_username, load_user};
use crate::{paths, Error, Result};

#[derive(Clone)]
pub struct FriendGraph {
    store: Arc<dyn DocumentStore>,
}

fn id_value(id: &UserId) -> Value {
    Value::from(id.as_ref())
}

fn status_value(status: RequestStatus) -> Value {
    Value::from(status.as_str())
}

impl FriendGraph {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub async fn send_request(&self, by_user: &UserId, to_username: &str) -> Result<RequestId> {
        let not_found = || Error::NotFound(format!("no user named `{to_username}`"));
        let username = Username::parse(to_username).ok_or_else(not_found)?;
        let target = find_by_username(&*self.store, &username)
            .await?
            .ok_or_else(not_found)?;
        if &target.id == by_user {
            return Err(Error::InvalidOperation(
                "cannot send a friend request to yourself".into(),
            ));
        }
        let sender = load_user(&*self.store, by_user).await?;
        if sender.friend_ids.contains(&target.id) {
            return Err(Error::Conflict(format!("already friends with `{username}`")));
        }
        if self.pending_between(by_user, &target.id).await? {
            return Err(Error::Conflict(format!(
                "a friend request between you and `{username}` is already pending"
            )));
        }

        let created_at = self.store.server_timestamp().await?;
        let requests = paths::friend_requests()?;
        let request = FriendRequest {
            id: RequestId(self.store.new_id(&requests)),
            from_user_id: sender.id,
            to_user_id: target.id,
            status: RequestStatus::Pending,
            from_username: sender.username,
            from_full_name: sender.full_name,
            from_profile_image_ref: sender.profile_image_ref,
            to_username: target.username,
            to_full_name: target.full_name,
            to_profile_image_ref: target.profile_image_ref,
            created_at,
        };
        self.store
            .set(&requests.doc(&request.id)?, encode(&request)?)
            .await?;
        info!(
            request_id = %request.id,
            from = %request.from_user_id,
            to = %request.to_user_id,
            "friend request sent"
        );
        Ok(request.id)
    }

    /// Marks the request accepted and links both users in one atomic batch.
    pub async fn accept(&self, request_id: &RequestId, by_user: &UserId) -> Result<()> {
        let (path, request) = self.load_request(request_id).await?;
        if &request.to_user_id != by_user {
            return Err(Error::Unauthorized(
                "only the recipient can accept a friend request".into(),
            ));
        }
        ensure_pending(&request)?;

        let mut batch = WriteBatch::new();
        batch
            .update(
                path,
                Changes::new().set(fields::STATUS, status_value(RequestStatus::Accepted)),
            )
            .update(
                paths::user(&request.from_user_id)?,
                Changes::new().array_union(fields::FRIEND_IDS, [id_value(&request.to_user_id)]),
            )
            .update(
                paths::user(&request.to_user_id)?,
                Changes::new().array_union(fields::FRIEND_IDS, [id_value(&request.from_user_id)]),
            );
        self.store.commit(batch).await?;
        info!(%request_id, from = %request.from_user_id, to = %request.to_user_id, "friend request accepted");
        Ok(())
    }

    /// Does not check who is rejecting; any caller holding the id can reject.
    pub async fn reject(&self, request_id: &RequestId, by_user: &UserId) -> Result<()> {
        let (path, request) = self.load_request(request_id).await?;
        ensure_pending(&request)?;
        if &request.to_user_id != by_user {
            debug!(%request_id, %by_user, "friend request rejected by someone other than its recipient");
        }
        self.store
            .update(
                &path,
                Changes::new().set(fields::STATUS, status_value(RequestStatus::Rejected)),
            )
            .await?;
        info!(%request_id, %by_user, "friend request rejected");
        Ok(())
    }

    /// Withdraws a pending request by deleting it.
    pub async fn cancel(&self, request_id: &RequestId, by_user: &UserId) -> Result<()> {
        let (path, request) = self.load_request(request_id).await?;
        if &request.from_user_id != by_user {
            return Err(Error::Unauthorized(
                "only the sender can cancel a friend request".into(),
            ));
        }
        ensure_pending(&request)?;
        self.store.delete(&path).await?;
        info!(%request_id, %by_user, "friend request cancelled");
        Ok(())
    }

    pub async fn list_incoming(&self, by_user: &UserId) -> Result<Vec<FriendRequest>> {
        let documents = self.store.query(&pending_query(fields::TO_USER_ID, by_user)?).await?;
        Ok(decode_all(&documents)?)
    }

    pub async fn list_outgoing(&self, by_user: &UserId) -> Result<Vec<FriendRequest>> {
        let documents = self.store.query(&pending_query(fields::FROM_USER_ID, by_user)?).await?;
        Ok(decode_all(&documents)?)
    }

    /// Every delivery is the complete, newest-first list of pending incoming requests.
    pub async fn subscribe_incoming(
        &self,
        by_user: &UserId,
    ) -> Result<BoxStream<'static, Result<Vec<FriendRequest>>>> {
        self.subscribe(pending_query(fields::TO_USER_ID, by_user)?).await
    }

    pub async fn subscribe_outgoing(
        &self,
        by_user: &UserId,
    ) -> Result<BoxStream<'static, Result<Vec<FriendRequest>>>> {
        self.subscribe(pending_query(fields::FROM_USER_ID, by_user)?).await
    }

    /// Unlinks both users atomically. Removing a link that is not there is a no-op.
    pub async fn remove_friend(&self, user_a: &UserId, user_b: &UserId) -> Result<()> {
        let mut batch = WriteBatch::new();
        batch
            .update(
                paths::user(user_a)?,
                Changes::new().array_remove(fields::FRIEND_IDS, [id_value(user_b)]),
            )
            .update(
                paths::user(user_b)?,
                Changes::new().array_remove(fields::FRIEND_IDS, [id_value(user_a)]),
            );
        self.store.commit(batch).await?;
        info!(%user_a, %user_b, "friendship removed");
        Ok(())
    }

    async fn subscribe(&self, query: Query) -> Result<BoxStream<'static, Result<Vec<FriendRequest>>>> {
        let listener = self.store.listen(query).await?;
        Ok(listener
            .into_stream()
            .map(|delivery| -> Result<Vec<FriendRequest>> { Ok(decode_all(&delivery?)?) })
            .boxed())
    }

    async fn load_request(&self, request_id: &RequestId) -> Result<(DocumentPath, FriendRequest)> {
        let path = paths::friend_requests()?.doc(request_id)?;
        match self.store.get(&path).await? {
            Some(doc) => Ok((path, doc.decode()?)),
            None => Err(Error::NotFound(format!("friend request {request_id}"))),
        }
    }

    async fn pending_between(&self, a: &UserId, b: &UserId) -> Result<bool> {
        for (from, to) in [(a, b), (b, a)] {
            let query = Query::new(paths::friend_requests()?)
                .where_eq(fields::FROM_USER_ID, id_value(from))
                .where_eq(fields::TO_USER_ID, id_value(to))
                .where_eq(fields::STATUS, status_value(RequestStatus::Pending));
            if !self.store.query(&query).await?.is_empty() {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

fn pending_query(owner_field: &str, user: &UserId) -> Result<Query> {
    Ok(Query::new(paths::friend_requests()?)
        .where_eq(owner_field, id_value(user))
        .where_eq(fields::STATUS, status_value(RequestStatus::Pending))
        .order_by(fields::CREATED_AT, Direction::Descending))
}

fn ensure_pending(request: &FriendRequest) -> Result<()> {
    match request.status {
        RequestStatus::Pending => Ok(()),
        status => Err(Error::InvalidOperation(format!(
            "friend request {} is already {}",
            request.id,
            status.as_str()
        ))),
    }
}
