use potluck_common::documents::collections;
use potluck_common::UserId;
use potluck_store::{CollectionPath, DocumentPath, Result};

pub(crate) fn users() -> Result<CollectionPath> {
    CollectionPath::root(collections::USERS)
}

pub(crate) fn user(id: &UserId) -> Result<DocumentPath> {
    users()?.doc(id)
}

pub(crate) fn friend_requests() -> Result<CollectionPath> {
    CollectionPath::root(collections::FRIEND_REQUESTS)
}

pub(crate) fn received_recipes(owner: &UserId) -> Result<CollectionPath> {
    user(owner)?.collection(collections::RECEIVED_RECIPES)
}

pub(crate) fn sent_recipes(owner: &UserId) -> Result<CollectionPath> {
    user(owner)?.collection(collections::SENT_RECIPES)
}
