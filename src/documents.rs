//! Persisted document shapes. Field names are the stored schema and must not change.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::{ReceivedRecordId, RecipeId, Reaction, RequestId, SentRecordId, Timestamp, UserId, Username};

pub mod collections {
    pub const USERS: &str = "users";
    pub const FRIEND_REQUESTS: &str = "friendRequests";
    pub const RECEIVED_RECIPES: &str = "receivedRecipes";
    pub const SENT_RECIPES: &str = "sentRecipes";
}

pub mod fields {
    pub const USERNAME: &str = "username";
    pub const FRIEND_IDS: &str = "friendIds";
    pub const FAVORITES: &str = "favorites";
    pub const FROM_USER_ID: &str = "fromUserId";
    pub const TO_USER_ID: &str = "toUserId";
    pub const STATUS: &str = "status";
    pub const CREATED_AT: &str = "createdAt";
    pub const TIMESTAMP: &str = "timestamp";
    pub const REACTION: &str = "reaction";
    pub const COUNTERPART_SENT_ID: &str = "counterpartSentId";
    pub const COUNTERPART_RECEIVED_ID: &str = "counterpartReceivedId";
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(default)]
    pub id: UserId,
    pub username: Username,
    pub full_name: String,
    pub email: String,
    #[serde(default)]
    pub friend_ids: BTreeSet<UserId>,
    #[serde(default)]
    pub favorites: BTreeSet<RecipeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_image_ref: Option<String>,
}

#[derive(Eq, PartialEq, Hash, Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Accepted,
    Rejected,
}

impl RequestStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Accepted => "accepted",
            RequestStatus::Rejected => "rejected",
        }
    }
}

/// A friend request, with both users' public fields copied in at creation time.
#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FriendRequest {
    #[serde(default)]
    pub id: RequestId,
    pub from_user_id: UserId,
    pub to_user_id: UserId,
    pub status: RequestStatus,
    pub from_username: Username,
    pub from_full_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_profile_image_ref: Option<String>,
    pub to_username: Username,
    pub to_full_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_profile_image_ref: Option<String>,
    pub created_at: Timestamp,
}

/// Recipient-owned half of a share, stored under `users/{recipient}/receivedRecipes`.
#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReceivedRecord {
    #[serde(default)]
    pub id: ReceivedRecordId,
    pub from_user_id: UserId,
    pub recipe_id: RecipeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reaction: Option<Reaction>,
    pub timestamp: Timestamp,
    /// Absent until the sender's record exists and has been linked back.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub counterpart_sent_id: Option<SentRecordId>,
}

/// Sender-owned half of a share, stored under `users/{sender}/sentRecipes`.
#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SentRecord {
    #[serde(default)]
    pub id: SentRecordId,
    pub to_user_id: UserId,
    pub recipe_id: RecipeId,
    pub timestamp: Timestamp,
    pub counterpart_received_id: ReceivedRecordId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reaction: Option<Reaction>,
}

/// A sent record together with the recipient's reaction as currently stored on their side.
#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SentShare {
    pub record: SentRecord,
    pub reaction: Option<Reaction>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn received_record_omits_absent_optionals() {
        let record = ReceivedRecord {
            id: ReceivedRecordId::from("r1"),
            from_user_id: UserId::from("alice"),
            recipe_id: RecipeId(42),
            reaction: None,
            timestamp: Timestamp(7),
            counterpart_sent_id: None,
        };
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "id": "r1",
                "fromUserId": "alice",
                "recipeId": 42,
                "timestamp": 7,
            })
        );
    }

    #[test]
    fn user_defaults_missing_sets() {
        let user: User = serde_json::from_value(serde_json::json!({
            "id": "u1",
            "username": "anna",
            "fullName": "Anna",
            "email": "anna@example.com",
        }))
        .unwrap();
        assert!(user.friend_ids.is_empty());
        assert!(user.favorites.is_empty());
        assert_eq!(user.profile_image_ref, None);
    }
}
