//! Async HTTP bindings for `potluck-server`. Every call takes the server's base `Url` and, for
//! per-user routes, the id of the user making the call.

pub mod client {
    use anyhow::Result;
    use reqwest::{Client, Response};
    use serde::de::DeserializeOwned;
    use serde::Serialize;

    use potluck_common::{
        Favorite, FriendRequest, NewUser, React, Reaction, ReceivedRecordId, RecipeId, Registered,
        Repaired, RequestAction, RequestCreated, RequestId, SendFriendRequest, SentShare,
        ShareReceipt, ShareRecipe, UnseenShare, Unfriend, Url, User, UserId, ReceivedRecord,
    };

    fn private(server: &Url, user: &UserId, route: &str) -> String {
        server.join(format!("/{user}/private/{route}"))
    }

    async fn read<T: DeserializeOwned>(response: Response) -> Result<T> {
        Ok(response.error_for_status()?.json::<T>().await?)
    }

    async fn get_private<T: DeserializeOwned>(client: &Client, server: &Url, user: &UserId, route: &str) -> Result<T> {
        read(client.get(private(server, user, route)).send().await?).await
    }

    async fn post_private(client: &Client, server: &Url, user: &UserId, route: &str, body: &impl Serialize) -> Result<Response> {
        Ok(client
            .post(private(server, user, route))
            .json(body)
            .send()
            .await?
            .error_for_status()?)
    }

    pub async fn register(client: &Client, server: &Url, new_user: &NewUser) -> Result<UserId> {
        let registered: Registered = read(client.post(server.join("/users")).json(new_user).send().await?).await?;
        Ok(registered.user_id)
    }

    pub async fn find_user(client: &Client, server: &Url, username: &str) -> Result<User> {
        read(client.get(server.join(format!("/users/by-username/{username}"))).send().await?).await
    }

    pub async fn get_profile(client: &Client, server: &Url, user: &UserId) -> Result<User> {
        get_private(client, server, user, "get/profile").await
    }

    pub async fn get_friends(client: &Client, server: &Url, user: &UserId) -> Result<Vec<User>> {
        get_private(client, server, user, "get/friends").await
    }

    pub async fn incoming_friend_requests(client: &Client, server: &Url, user: &UserId) -> Result<Vec<FriendRequest>> {
        get_private(client, server, user, "get/incoming-requests").await
    }

    pub async fn outgoing_friend_requests(client: &Client, server: &Url, user: &UserId) -> Result<Vec<FriendRequest>> {
        get_private(client, server, user, "get/outgoing-requests").await
    }

    pub async fn send_friend_request(client: &Client, server: &Url, user: &UserId, username: &str) -> Result<RequestId> {
        let body = SendFriendRequest { username: username.to_string() };
        let created: RequestCreated = read(post_private(client, server, user, "post/send-friend-request", &body).await?).await?;
        Ok(created.request_id)
    }

    pub async fn accept_friend_request(client: &Client, server: &Url, user: &UserId, request_id: &RequestId) -> Result<()> {
        let body = RequestAction { request_id: request_id.clone() };
        post_private(client, server, user, "post/accept-friend-request", &body).await?;
        Ok(())
    }

    pub async fn deny_friend_request(client: &Client, server: &Url, user: &UserId, request_id: &RequestId) -> Result<()> {
        let body = RequestAction { request_id: request_id.clone() };
        post_private(client, server, user, "post/deny-friend-request", &body).await?;
        Ok(())
    }

    pub async fn cancel_friend_request(client: &Client, server: &Url, user: &UserId, request_id: &RequestId) -> Result<()> {
        let body = RequestAction { request_id: request_id.clone() };
        post_private(client, server, user, "post/cancel-friend-request", &body).await?;
        Ok(())
    }

    pub async fn unfriend(client: &Client, server: &Url, user: &UserId, friend: &UserId) -> Result<()> {
        let body = Unfriend { friend_id: friend.clone() };
        post_private(client, server, user, "post/unfriend", &body).await?;
        Ok(())
    }

    pub async fn share_recipe(client: &Client, server: &Url, user: &UserId, to: &UserId, recipe_id: RecipeId) -> Result<ShareReceipt> {
        let body = ShareRecipe { to_user_id: to.clone(), recipe_id };
        read(post_private(client, server, user, "post/share-recipe", &body).await?).await
    }

    /// Takes the reaction as text; the server rejects names it does not know.
    pub async fn react(client: &Client, server: &Url, user: &UserId, received_id: &ReceivedRecordId, reaction: &str) -> Result<()> {
        let body = React { received_id: received_id.clone(), reaction: reaction.to_string() };
        post_private(client, server, user, "post/react", &body).await?;
        Ok(())
    }

    pub async fn received_recipes(client: &Client, server: &Url, user: &UserId) -> Result<Vec<ReceivedRecord>> {
        get_private(client, server, user, "get/received-recipes").await
    }

    pub async fn sent_recipes(client: &Client, server: &Url, user: &UserId) -> Result<Vec<SentShare>> {
        get_private(client, server, user, "get/sent-recipes").await
    }

    pub async fn add_favorite(client: &Client, server: &Url, user: &UserId, recipe_id: RecipeId) -> Result<()> {
        post_private(client, server, user, "post/add-favorite", &Favorite { recipe_id }).await?;
        Ok(())
    }

    pub async fn remove_favorite(client: &Client, server: &Url, user: &UserId, recipe_id: RecipeId) -> Result<()> {
        post_private(client, server, user, "post/remove-favorite", &Favorite { recipe_id }).await?;
        Ok(())
    }

    pub async fn repair_orphans(client: &Client, server: &Url, user: &UserId) -> Result<usize> {
        let response = client.post(private(server, user, "post/repair-orphans")).send().await?;
        let repaired: Repaired = read(response).await?;
        Ok(repaired.repaired)
    }

    pub async fn start_session(client: &Client, server: &Url, user: &UserId) -> Result<()> {
        client.post(server.join(format!("/session/start/{user}"))).send().await?.error_for_status()?;
        Ok(())
    }

    pub async fn stop_session(client: &Client, server: &Url) -> Result<()> {
        client.post(server.join("/session/stop")).send().await?.error_for_status()?;
        Ok(())
    }

    pub async fn clear_unseen(client: &Client, server: &Url) -> Result<()> {
        client.post(server.join("/session/clear")).send().await?.error_for_status()?;
        Ok(())
    }

    pub async fn has_unseen_share(client: &Client, server: &Url) -> Result<bool> {
        let unseen: UnseenShare = read(client.get(server.join("/session/unseen")).send().await?).await?;
        Ok(unseen.has_unseen_share)
    }

    /// Convenience for callers holding a parsed [`Reaction`].
    pub async fn react_with(client: &Client, server: &Url, user: &UserId, received_id: &ReceivedRecordId, reaction: Reaction) -> Result<()> {
        react(client, server, user, received_id, reaction.as_str()).await
    }
}
