//! HTTP surface over `potluck-core`. Routes follow `/:user/private/{get,post}/...`, where `:user`
//! is the calling user's id.

pub mod config;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::Path;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use serde_json::Value;
use tracing::{debug, error, info};

use potluck_common::{NewUser, Registered};
use potluck_core::{
    Error, FriendGraph, LocalNotification, NotificationCoordinator, Notifier, SharingExchange,
    UserDirectory,
};
use potluck_store::DocumentStore;

pub type Result<T> = std::result::Result<T, AppError>;

pub struct AppError(anyhow::Error);

impl AppError {
    fn status(&self) -> StatusCode {
        match self.0.downcast_ref::<Error>() {
            Some(Error::NotFound(_)) => StatusCode::NOT_FOUND,
            Some(Error::Unauthorized(_)) => StatusCode::FORBIDDEN,
            Some(Error::Conflict(_)) => StatusCode::CONFLICT,
            Some(Error::InvalidOperation(_)) => StatusCode::BAD_REQUEST,
            Some(Error::Store(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            None if self.0.is::<serde_json::Error>() => StatusCode::BAD_REQUEST,
            None => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %format!("{:#}", self.0), "request failed");
        } else {
            debug!(%status, error = %self.0, "request rejected");
        }
        (status, self.0.to_string()).into_response()
    }
}

// Lets handlers use `?` on anything convertible to `anyhow::Error`.
impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

/// Writes scheduled notifications to the log. The server has no device to deliver them to.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn schedule(&self, notification: LocalNotification) {
        info!(
            identifier = %notification.identifier,
            recipe_id = %notification.recipe_id,
            from_user_id = %notification.from_user_id,
            body = %notification.body,
            "{}",
            notification.title
        );
    }
}

#[derive(Clone)]
pub struct State {
    users: UserDirectory,
    friends: FriendGraph,
    sharing: SharingExchange,
    notifications: NotificationCoordinator,
    orphan_repair_age: Duration,
}

impl State {
    /// Must be called inside a tokio runtime, which hosts the notification coordinator.
    pub fn new(
        store: Arc<dyn DocumentStore>,
        notifier: Arc<dyn Notifier>,
        orphan_repair_age: Duration,
    ) -> Self {
        Self {
            users: UserDirectory::new(store.clone()),
            friends: FriendGraph::new(store.clone()),
            sharing: SharingExchange::new(store.clone()),
            notifications: NotificationCoordinator::spawn(store, notifier),
            orphan_repair_age,
        }
    }
}

pub fn app(state: State) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/users", post(register))
        .route("/users/by-username/:username", get(find_user))
        .route("/:user/private/get/profile", get(private::get_profile))
        .route("/:user/private/get/friends", get(private::get_friends))
        .route("/:user/private/get/incoming-requests", get(private::get_incoming_requests))
        .route("/:user/private/get/outgoing-requests", get(private::get_outgoing_requests))
        .route("/:user/private/get/received-recipes", get(private::get_received_recipes))
        .route("/:user/private/get/sent-recipes", get(private::get_sent_recipes))
        .route("/:user/private/post/send-friend-request", post(private::post_send_friend_request))
        .route("/:user/private/post/accept-friend-request", post(private::post_accept_friend_request))
        .route("/:user/private/post/deny-friend-request", post(private::post_deny_friend_request))
        .route("/:user/private/post/cancel-friend-request", post(private::post_cancel_friend_request))
        .route("/:user/private/post/unfriend", post(private::post_unfriend))
        .route("/:user/private/post/share-recipe", post(private::post_share_recipe))
        .route("/:user/private/post/react", post(private::post_react))
        .route("/:user/private/post/add-favorite", post(private::post_add_favorite))
        .route("/:user/private/post/remove-favorite", post(private::post_remove_favorite))
        .route("/:user/private/post/repair-orphans", post(private::post_repair_orphans))
        .route("/session/start/:user", post(session::start))
        .route("/session/stop", post(session::stop))
        .route("/session/clear", post(session::clear))
        .route("/session/unseen", get(session::unseen))
        .layer(Extension(state))
}

/// Resolves when `signal` fires. A signal that fails to install is logged and never resolves.
pub async fn shutdown_signal(signal: impl Future<Output = std::io::Result<()>>) {
    match signal.await {
        Ok(()) => info!("shutting down"),
        Err(error) => {
            error!(%error, "failed to listen for the shutdown signal");
            std::future::pending::<()>().await;
        }
    }
}

async fn root() -> &'static str {
    "potluck"
}

async fn register(Extension(state): Extension<State>, Json(payload): Json<Value>) -> Result<impl IntoResponse> {
    let new_user: NewUser = serde_json::from_value(payload)?;
    let user_id = state.users.register(new_user).await?;
    Ok((StatusCode::CREATED, Json(Registered { user_id })))
}

async fn find_user(Extension(state): Extension<State>, Path(username): Path<String>) -> Result<impl IntoResponse> {
    let user = state
        .users
        .find_by_username(&username)
        .await?
        .ok_or_else(|| Error::NotFound(format!("no user named `{username}`")))?;
    Ok(Json(user))
}

mod private {
    use axum::extract::Path;
    use axum::response::IntoResponse;
    use axum::{Extension, Json};
    use serde_json::Value;

    use potluck_common::{
        Favorite, React, Reaction, Repaired, RequestAction, RequestCreated, SendFriendRequest,
        ShareRecipe, Unfriend, UserId,
    };

    use crate::{Result, State};

    pub async fn get_profile(Extension(state): Extension<State>, Path(user): Path<String>) -> Result<impl IntoResponse> {
        Ok(Json(state.users.get(&UserId(user)).await?))
    }

    pub async fn get_friends(Extension(state): Extension<State>, Path(user): Path<String>) -> Result<impl IntoResponse> {
        Ok(Json(state.users.friends(&UserId(user)).await?))
    }

    pub async fn get_incoming_requests(Extension(state): Extension<State>, Path(user): Path<String>) -> Result<impl IntoResponse> {
        Ok(Json(state.friends.list_incoming(&UserId(user)).await?))
    }

    pub async fn get_outgoing_requests(Extension(state): Extension<State>, Path(user): Path<String>) -> Result<impl IntoResponse> {
        Ok(Json(state.friends.list_outgoing(&UserId(user)).await?))
    }

    pub async fn get_received_recipes(Extension(state): Extension<State>, Path(user): Path<String>) -> Result<impl IntoResponse> {
        Ok(Json(state.sharing.list_received(&UserId(user)).await?))
    }

    pub async fn get_sent_recipes(Extension(state): Extension<State>, Path(user): Path<String>) -> Result<impl IntoResponse> {
        Ok(Json(state.sharing.list_sent(&UserId(user)).await?))
    }

    pub async fn post_send_friend_request(Extension(state): Extension<State>, Path(user): Path<String>, Json(payload): Json<Value>) -> Result<impl IntoResponse> {
        let request: SendFriendRequest = serde_json::from_value(payload)?;
        let request_id = state.friends.send_request(&UserId(user), &request.username).await?;
        Ok(Json(RequestCreated { request_id }))
    }

    pub async fn post_accept_friend_request(Extension(state): Extension<State>, Path(user): Path<String>, Json(payload): Json<Value>) -> Result<impl IntoResponse> {
        let action: RequestAction = serde_json::from_value(payload)?;
        state.friends.accept(&action.request_id, &UserId(user)).await?;
        Ok(())
    }

    pub async fn post_deny_friend_request(Extension(state): Extension<State>, Path(user): Path<String>, Json(payload): Json<Value>) -> Result<impl IntoResponse> {
        let action: RequestAction = serde_json::from_value(payload)?;
        state.friends.reject(&action.request_id, &UserId(user)).await?;
        Ok(())
    }

    pub async fn post_cancel_friend_request(Extension(state): Extension<State>, Path(user): Path<String>, Json(payload): Json<Value>) -> Result<impl IntoResponse> {
        let action: RequestAction = serde_json::from_value(payload)?;
        state.friends.cancel(&action.request_id, &UserId(user)).await?;
        Ok(())
    }

    pub async fn post_unfriend(Extension(state): Extension<State>, Path(user): Path<String>, Json(payload): Json<Value>) -> Result<impl IntoResponse> {
        let unfriend: Unfriend = serde_json::from_value(payload)?;
        state.friends.remove_friend(&UserId(user), &unfriend.friend_id).await?;
        Ok(())
    }

    pub async fn post_share_recipe(Extension(state): Extension<State>, Path(user): Path<String>, Json(payload): Json<Value>) -> Result<impl IntoResponse> {
        let share: ShareRecipe = serde_json::from_value(payload)?;
        let receipt = state.sharing.send(&UserId(user), &share.to_user_id, share.recipe_id).await?;
        Ok(Json(receipt))
    }

    pub async fn post_react(Extension(state): Extension<State>, Path(user): Path<String>, Json(payload): Json<Value>) -> Result<impl IntoResponse> {
        let react: React = serde_json::from_value(payload)?;
        let reaction: Reaction = react.reaction.parse().map_err(potluck_core::Error::from)?;
        state.sharing.react(&UserId(user), &react.received_id, reaction).await?;
        Ok(())
    }

    pub async fn post_add_favorite(Extension(state): Extension<State>, Path(user): Path<String>, Json(payload): Json<Value>) -> Result<impl IntoResponse> {
        let favorite: Favorite = serde_json::from_value(payload)?;
        state.users.add_favorite(&UserId(user), favorite.recipe_id).await?;
        Ok(())
    }

    pub async fn post_remove_favorite(Extension(state): Extension<State>, Path(user): Path<String>, Json(payload): Json<Value>) -> Result<impl IntoResponse> {
        let favorite: Favorite = serde_json::from_value(payload)?;
        state.users.remove_favorite(&UserId(user), favorite.recipe_id).await?;
        Ok(())
    }

    pub async fn post_repair_orphans(Extension(state): Extension<State>, Path(user): Path<String>) -> Result<impl IntoResponse> {
        let repaired = state.sharing.repair_orphans(&UserId(user), state.orphan_repair_age).await?;
        Ok(Json(Repaired { repaired }))
    }
}

/// The single notification session this process hosts.
mod session {
    use axum::extract::Path;
    use axum::response::IntoResponse;
    use axum::{Extension, Json};

    use potluck_common::{UnseenShare, UserId};

    use crate::{Result, State};

    pub async fn start(Extension(state): Extension<State>, Path(user): Path<String>) -> Result<impl IntoResponse> {
        state.notifications.start(&UserId(user)).await?;
        Ok(())
    }

    pub async fn stop(Extension(state): Extension<State>) -> Result<impl IntoResponse> {
        state.notifications.stop().await?;
        Ok(())
    }

    pub async fn clear(Extension(state): Extension<State>) -> Result<impl IntoResponse> {
        state.notifications.clear().await?;
        Ok(())
    }

    pub async fn unseen(Extension(state): Extension<State>) -> Json<UnseenShare> {
        Json(UnseenShare {
            has_unseen_share: state.notifications.has_unseen_share(),
        })
    }
}

#[cfg(test)]
mod tests {
    use potluck_store::StoreError;

    use super::*;

    fn status_of(error: impl Into<anyhow::Error>) -> StatusCode {
        AppError::from(error).status()
    }

    #[test]
    fn core_errors_map_to_status_codes() {
        assert_eq!(status_of(Error::NotFound("x".into())), StatusCode::NOT_FOUND);
        assert_eq!(status_of(Error::Unauthorized("x".into())), StatusCode::FORBIDDEN);
        assert_eq!(status_of(Error::Conflict("x".into())), StatusCode::CONFLICT);
        assert_eq!(status_of(Error::InvalidOperation("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_of(Error::Store(StoreError::InvalidPath("a//b".into()))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn shutdown_follows_the_signal() {
        shutdown_signal(async { Ok(()) }).await;
    }

    #[tokio::test]
    async fn broken_signal_keeps_serving() {
        let signal = async { Err(std::io::Error::new(std::io::ErrorKind::Other, "no handler")) };
        let waited = tokio::time::timeout(Duration::from_millis(100), shutdown_signal(signal)).await;
        assert!(waited.is_err());
    }

    #[test]
    fn malformed_payloads_are_bad_requests() {
        let error = serde_json::from_str::<NewUser>("{}").unwrap_err();
        assert_eq!(status_of(error), StatusCode::BAD_REQUEST);
        assert_eq!(status_of(anyhow::anyhow!("boom")), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
