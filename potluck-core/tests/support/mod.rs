#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::{sleep, timeout};

use potluck_common::{NewUser, UserId};
use potluck_core::{FriendGraph, LocalNotification, NotificationCoordinator, Notifier, Phase, SharingExchange, UserDirectory};
use potluck_store::{DocumentStore, SledStore};

pub struct Harness {
    pub store: Arc<dyn DocumentStore>,
    pub users: UserDirectory,
    pub friends: FriendGraph,
    pub sharing: SharingExchange,
}

impl Harness {
    pub fn new() -> anyhow::Result<Self> {
        let store: Arc<dyn DocumentStore> = Arc::new(SledStore::temporary()?);
        Ok(Self {
            users: UserDirectory::new(store.clone()),
            friends: FriendGraph::new(store.clone()),
            sharing: SharingExchange::new(store.clone()),
            store,
        })
    }

    pub async fn user(&self, username: &str) -> anyhow::Result<UserId> {
        Ok(self
            .users
            .register(NewUser {
                username: username.to_string(),
                full_name: format!("{username} Cook"),
                email: format!("{username}@example.com"),
                profile_image_ref: None,
            })
            .await?)
    }

    /// Sends and accepts a request from `a` to `b`.
    pub async fn befriend(&self, a: &UserId, b: &UserId) -> anyhow::Result<()> {
        let b_name = self.users.get(b).await?.username;
        let request = self.friends.send_request(a, b_name.as_str()).await?;
        self.friends.accept(&request, b).await?;
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    scheduled: Mutex<Vec<LocalNotification>>,
}

impl RecordingNotifier {
    pub fn scheduled(&self) -> Vec<LocalNotification> {
        self.scheduled.lock().unwrap().clone()
    }

    pub async fn wait_for_count(&self, count: usize) -> anyhow::Result<()> {
        timeout(Duration::from_secs(5), async {
            while self.scheduled.lock().unwrap().len() < count {
                sleep(Duration::from_millis(10)).await;
            }
        })
        .await?;
        Ok(())
    }
}

impl Notifier for RecordingNotifier {
    fn schedule(&self, notification: LocalNotification) {
        self.scheduled.lock().unwrap().push(notification);
    }
}

pub async fn wait_for_phase(coordinator: &NotificationCoordinator, phase: Phase) -> anyhow::Result<()> {
    timeout(Duration::from_secs(5), async {
        loop {
            if coordinator.phase().await? == phase {
                return anyhow::Ok(());
            }
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await?
}

pub async fn wait_for_unseen(coordinator: &NotificationCoordinator, expected: bool) -> anyhow::Result<()> {
    let mut unseen = coordinator.watch_unseen();
    timeout(Duration::from_secs(5), unseen.wait_for(|value| *value == expected)).await??;
    Ok(())
}
