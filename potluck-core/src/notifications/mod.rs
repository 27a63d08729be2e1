//! Turns the signed-in user's received-recipe feed into local notifications and an "unseen share"
//! flag.
//!
//! A single task owns the feed and all state. [`NotificationCoordinator`] is a handle that sends it
//! commands, so feed deliveries and `clear()` calls are applied one at a time in arrival order.

mod state;

use std::sync::Arc;

use futures::stream::{BoxStream, StreamExt};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

use potluck_common::{ReceivedRecord, RecipeId, UserId};
use potluck_store::DocumentStore;

pub use state::{Phase, SubscriptionState};

use crate::sharing::SharingExchange;
use crate::users::load_user;
use crate::{Error, Result};

const COMMAND_BUFFER: usize = 32;

/// Schedules a notification on the device. Delivery is up to the platform.
pub trait Notifier: Send + Sync {
    fn schedule(&self, notification: LocalNotification);
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalNotification {
    /// The received record id, so rescheduling the same share replaces rather than duplicates.
    pub identifier: String,
    pub title: String,
    pub body: String,
    pub recipe_id: RecipeId,
    pub from_user_id: UserId,
}

enum Command {
    Start {
        user: UserId,
        reply: oneshot::Sender<Result<()>>,
    },
    Stop {
        reply: oneshot::Sender<()>,
    },
    Clear {
        reply: oneshot::Sender<()>,
    },
    Phase {
        reply: oneshot::Sender<Phase>,
    },
}

#[derive(Clone)]
pub struct NotificationCoordinator {
    commands: mpsc::Sender<Command>,
    unseen: watch::Receiver<bool>,
}

fn shut_down() -> Error {
    Error::InvalidOperation("notification coordinator has shut down".into())
}

impl NotificationCoordinator {
    /// Spawns the owning task on the current tokio runtime. It exits once every handle is dropped.
    pub fn spawn(store: Arc<dyn DocumentStore>, notifier: Arc<dyn Notifier>) -> Self {
        let (commands, receiver) = mpsc::channel(COMMAND_BUFFER);
        let (unseen_tx, unseen) = watch::channel(false);
        let actor = Actor {
            sharing: SharingExchange::new(store.clone()),
            store,
            notifier,
            state: SubscriptionState::new(),
            session: None,
            unseen: unseen_tx,
        };
        tokio::spawn(actor.run(receiver));
        Self { commands, unseen }
    }

    /// Subscribes to `user`'s received recipes, replacing any subscription for another user.
    pub async fn start(&self, user: &UserId) -> Result<()> {
        let (reply, response) = oneshot::channel();
        self.send(Command::Start {
            user: user.clone(),
            reply,
        })
        .await?;
        response.await.map_err(|_| shut_down())?
    }

    pub async fn stop(&self) -> Result<()> {
        let (reply, response) = oneshot::channel();
        self.send(Command::Stop { reply }).await?;
        response.await.map_err(|_| shut_down())
    }

    /// Marks every share as seen. The subscription itself is untouched.
    pub async fn clear(&self) -> Result<()> {
        let (reply, response) = oneshot::channel();
        self.send(Command::Clear { reply }).await?;
        response.await.map_err(|_| shut_down())
    }

    pub async fn phase(&self) -> Result<Phase> {
        let (reply, response) = oneshot::channel();
        self.send(Command::Phase { reply }).await?;
        response.await.map_err(|_| shut_down())
    }

    pub fn has_unseen_share(&self) -> bool {
        *self.unseen.borrow()
    }

    /// A receiver that changes whenever the unseen flag does.
    pub fn watch_unseen(&self) -> watch::Receiver<bool> {
        self.unseen.clone()
    }

    async fn send(&self, command: Command) -> Result<()> {
        self.commands.send(command).await.map_err(|_| shut_down())
    }
}

struct Session {
    user: UserId,
    feed: BoxStream<'static, Result<Vec<ReceivedRecord>>>,
}

struct Actor {
    sharing: SharingExchange,
    store: Arc<dyn DocumentStore>,
    notifier: Arc<dyn Notifier>,
    state: SubscriptionState,
    session: Option<Session>,
    unseen: watch::Sender<bool>,
}

async fn next_delivery(session: &mut Option<Session>) -> Option<Result<Vec<ReceivedRecord>>> {
    match session {
        Some(session) => session.feed.next().await,
        None => std::future::pending().await,
    }
}

impl Actor {
    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle(command).await,
                    None => break,
                },
                delivery = next_delivery(&mut self.session) => self.on_delivery(delivery).await,
            }
        }
        debug!("notification coordinator stopped");
    }

    async fn handle(&mut self, command: Command) {
        match command {
            Command::Start { user, reply } => {
                let _ = reply.send(self.start(user).await);
            }
            Command::Stop { reply } => {
                self.stop();
                let _ = reply.send(());
            }
            Command::Clear { reply } => {
                self.unseen.send_replace(false);
                let _ = reply.send(());
            }
            Command::Phase { reply } => {
                let _ = reply.send(self.state.phase());
            }
        }
    }

    async fn start(&mut self, user: UserId) -> Result<()> {
        if let Some(session) = &self.session {
            if session.user == user {
                debug!(user_id = %user, "already subscribed");
                return Ok(());
            }
        }
        self.stop();
        self.unseen.send_replace(false);
        self.state.establish();
        match self.sharing.listen_received(&user).await {
            Ok(feed) => {
                info!(user_id = %user, "subscribed to received recipes");
                self.session = Some(Session { user, feed });
                Ok(())
            }
            Err(error) => {
                self.state.stop();
                Err(error)
            }
        }
    }

    fn stop(&mut self) {
        if let Some(session) = self.session.take() {
            info!(user_id = %session.user, "unsubscribed from received recipes");
        }
        self.state.stop();
    }

    async fn on_delivery(&mut self, delivery: Option<Result<Vec<ReceivedRecord>>>) {
        let records = match delivery {
            Some(Ok(records)) => records,
            Some(Err(error)) => {
                error!(%error, "received-recipe feed error, keeping current state");
                return;
            }
            None => {
                warn!("received-recipe feed ended");
                self.session = None;
                return;
            }
        };

        let added: Vec<ReceivedRecord> = self.state.observe(&records).into_iter().cloned().collect();
        if added.is_empty() {
            return;
        }
        self.unseen.send_replace(true);
        let store = self.store.clone();
        for record in added {
            let notification = compose(&*store, &record).await;
            debug!(record_id = %record.id, recipe_id = %record.recipe_id, "scheduling notification");
            self.notifier.schedule(notification);
        }
    }
}

/// Builds the notification for one new share. Falls back to a generic body when the sender
/// cannot be loaded.
async fn compose(store: &dyn DocumentStore, record: &ReceivedRecord) -> LocalNotification {
    let body = match load_user(store, &record.from_user_id).await {
        Ok(sender) => format!("@{} shared a recipe with you", sender.username),
        Err(error) => {
            warn!(user_id = %record.from_user_id, %error, "could not resolve sender for notification");
            "A friend shared a recipe with you".to_string()
        }
    };
    LocalNotification {
        identifier: record.id.to_string(),
        title: "New shared recipe".to_string(),
        body,
        recipe_id: record.recipe_id,
        from_user_id: record.from_user_id.clone(),
    }
}
