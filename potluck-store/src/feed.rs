use std::sync::Arc;

use futures::stream::{self, BoxStream, StreamExt};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::{Document, Result, StoreError};

pub(crate) type Snapshot = Option<std::result::Result<Vec<Document>, Arc<StoreError>>>;

/// Handle on a live query. Each delivery is the full result set; dropping the handle cancels it.
///
/// Only the latest result is held. A consumer that falls behind skips straight to the newest
/// snapshot instead of replaying the ones in between.
pub struct Listener {
    deliveries: watch::Receiver<Snapshot>,
    task: JoinHandle<()>,
}

impl Listener {
    pub(crate) fn new(deliveries: watch::Receiver<Snapshot>, task: JoinHandle<()>) -> Self {
        Self { deliveries, task }
    }

    /// Waits for the next delivery. `None` once the feed has shut down and the last result was read.
    pub async fn next(&mut self) -> Option<Result<Vec<Document>>> {
        self.deliveries.changed().await.ok()?;
        let snapshot = self.deliveries.borrow_and_update().clone()?;
        Some(snapshot.map_err(StoreError::Feed))
    }

    pub fn into_stream(self) -> BoxStream<'static, Result<Vec<Document>>> {
        stream::unfold(self, |mut listener| async move {
            listener.next().await.map(|delivery| (delivery, listener))
        })
        .boxed()
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.task.abort();
    }
}
