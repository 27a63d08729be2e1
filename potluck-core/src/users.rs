use std::collections::BTreeSet;
use std::sync::Arc;

use futures::future::try_join_all;
use serde_json::Value;
use tracing::{debug, info};

use potluck_common::documents::fields;
use potluck_common::{NewUser, RecipeId, User, UserId, Username};
use potluck_store::{encode, Changes, DocumentStore, Query};

use crate::{paths, Error, Result};

/// The user operations the social features depend on. Registration normally happens in the
/// account flow; it lives here so the username uniqueness rule has one owner.
#[derive(Clone)]
pub struct UserDirectory {
    store: Arc<dyn DocumentStore>,
}

impl UserDirectory {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub async fn register(&self, new_user: NewUser) -> Result<UserId> {
        let username = Username::parse(&new_user.username).ok_or_else(|| {
            Error::InvalidOperation(format!("`{}` is not a valid username", new_user.username))
        })?;
        if find_by_username(&*self.store, &username).await?.is_some() {
            return Err(Error::Conflict(format!("username `{username}` is taken")));
        }
        let users = paths::users()?;
        let user = User {
            id: UserId(self.store.new_id(&users)),
            username,
            full_name: new_user.full_name,
            email: new_user.email,
            friend_ids: BTreeSet::new(),
            favorites: BTreeSet::new(),
            profile_image_ref: new_user.profile_image_ref,
        };
        self.store.set(&users.doc(&user.id)?, encode(&user)?).await?;
        info!(user_id = %user.id, username = %user.username, "registered user");
        Ok(user.id)
    }

    pub async fn get(&self, id: &UserId) -> Result<User> {
        load_user(&*self.store, id).await
    }

    pub async fn find_by_username(&self, username: &str) -> Result<Option<User>> {
        match Username::parse(username) {
            Some(username) => find_by_username(&*self.store, &username).await,
            None => Ok(None),
        }
    }

    /// Friends ordered by username. Ids whose user document is gone are skipped.
    pub async fn friends(&self, id: &UserId) -> Result<Vec<User>> {
        let user = self.get(id).await?;
        let lookups = user
            .friend_ids
            .iter()
            .map(|friend_id| try_load_user(&*self.store, friend_id));
        let mut friends = Vec::with_capacity(user.friend_ids.len());
        for (friend_id, friend) in user.friend_ids.iter().zip(try_join_all(lookups).await?) {
            match friend {
                Some(friend) => friends.push(friend),
                None => debug!(user_id = %id, %friend_id, "friend id without a user document"),
            }
        }
        friends.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(friends)
    }

    pub async fn add_favorite(&self, id: &UserId, recipe_id: RecipeId) -> Result<()> {
        let changes = Changes::new().array_union(fields::FAVORITES, [Value::from(recipe_id.0)]);
        self.store.update(&paths::user(id)?, changes).await?;
        Ok(())
    }

    pub async fn remove_favorite(&self, id: &UserId, recipe_id: RecipeId) -> Result<()> {
        let changes = Changes::new().array_remove(fields::FAVORITES, [Value::from(recipe_id.0)]);
        self.store.update(&paths::user(id)?, changes).await?;
        Ok(())
    }
}

pub(crate) async fn try_load_user(store: &dyn DocumentStore, id: &UserId) -> Result<Option<User>> {
    match store.get(&paths::user(id)?).await? {
        Some(doc) => Ok(Some(doc.decode()?)),
        None => Ok(None),
    }
}

pub(crate) async fn load_user(store: &dyn DocumentStore, id: &UserId) -> Result<User> {
    try_load_user(store, id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("user {id}")))
}

pub(crate) async fn find_by_username(
    store: &dyn DocumentStore,
    username: &Username,
) -> Result<Option<User>> {
    let query = Query::new(paths::users()?).where_eq(fields::USERNAME, username.as_str());
    match store.query(&query).await?.first() {
        Some(doc) => Ok(Some(doc.decode()?)),
        None => Ok(None),
    }
}
