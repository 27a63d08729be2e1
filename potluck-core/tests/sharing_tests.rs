mod support;

use std::time::Duration;

use futures::StreamExt;
use tokio::time::timeout;

use potluck_common::{
    ReceivedRecord, ReceivedRecordId, Reaction, RecipeId, SentRecord, SentRecordId, Timestamp, UserId,
};
use potluck_core::Error;
use potluck_store::{encode, CollectionPath, DocumentStore};

use support::Harness;

fn inbox(owner: &UserId) -> anyhow::Result<CollectionPath> {
    Ok(CollectionPath::root("users")?.doc(owner)?.collection("receivedRecipes")?)
}

fn outbox(owner: &UserId) -> anyhow::Result<CollectionPath> {
    Ok(CollectionPath::root("users")?.doc(owner)?.collection("sentRecipes")?)
}

/// Writes a received record the way an interrupted share leaves it: no sent record, no link.
async fn orphan(h: &Harness, from: &UserId, to: &UserId, recipe: i64, timestamp: Timestamp) -> anyhow::Result<ReceivedRecordId> {
    let inbox = inbox(to)?;
    let record = ReceivedRecord {
        id: ReceivedRecordId(h.store.new_id(&inbox)),
        from_user_id: from.clone(),
        recipe_id: RecipeId(recipe),
        reaction: None,
        timestamp,
        counterpart_sent_id: None,
    };
    h.store.set(&inbox.doc(&record.id)?, encode(&record)?).await?;
    Ok(record.id)
}

async fn sent_record(h: &Harness, owner: &UserId, id: &SentRecordId) -> anyhow::Result<SentRecord> {
    let doc = h.store.get(&outbox(owner)?.doc(id)?).await?.expect("sent record exists");
    Ok(doc.decode()?)
}

// ==================== sending ====================

#[tokio::test]
async fn share_writes_a_linked_pair() -> anyhow::Result<()> {
    let h = Harness::new()?;
    let anna = h.user("anna").await?;
    let ben = h.user("ben").await?;
    h.befriend(&anna, &ben).await?;

    let receipt = h.sharing.send(&anna, &ben, RecipeId(42)).await?;

    let received = h.sharing.list_received(&ben).await?;
    assert_eq!(received.len(), 1);
    let record = &received[0];
    assert_eq!(record.id, receipt.received_id);
    assert_eq!(record.from_user_id, anna);
    assert_eq!(record.recipe_id, RecipeId(42));
    assert_eq!(record.reaction, None);
    assert_eq!(record.counterpart_sent_id.as_ref(), Some(&receipt.sent_id));

    let sent = h.sharing.list_sent(&anna).await?;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].record.id, receipt.sent_id);
    assert_eq!(sent[0].record.to_user_id, ben);
    assert_eq!(sent[0].record.counterpart_received_id, receipt.received_id);
    assert_eq!(sent[0].record.timestamp, record.timestamp);
    assert_eq!(sent[0].reaction, None);

    assert!(h.sharing.list_received(&anna).await?.is_empty());
    assert!(h.sharing.list_sent(&ben).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn lists_are_newest_first() -> anyhow::Result<()> {
    let h = Harness::new()?;
    let anna = h.user("anna").await?;
    let ben = h.user("ben").await?;
    for recipe in [1, 2, 3] {
        h.sharing.send(&anna, &ben, RecipeId(recipe)).await?;
    }

    let received: Vec<_> = h.sharing.list_received(&ben).await?.into_iter().map(|r| r.recipe_id).collect();
    assert_eq!(received, [RecipeId(3), RecipeId(2), RecipeId(1)]);
    let sent: Vec<_> = h.sharing.list_sent(&anna).await?.into_iter().map(|s| s.record.recipe_id).collect();
    assert_eq!(sent, [RecipeId(3), RecipeId(2), RecipeId(1)]);
    Ok(())
}

// ==================== reacting ====================

#[tokio::test]
async fn reaction_is_propagated_to_the_sender() -> anyhow::Result<()> {
    let h = Harness::new()?;
    let anna = h.user("anna").await?;
    let ben = h.user("ben").await?;
    let receipt = h.sharing.send(&anna, &ben, RecipeId(42)).await?;

    h.sharing.react(&ben, &receipt.received_id, Reaction::Like).await?;

    assert_eq!(h.sharing.list_received(&ben).await?[0].reaction, Some(Reaction::Like));
    assert_eq!(sent_record(&h, &anna, &receipt.sent_id).await?.reaction, Some(Reaction::Like));
    assert_eq!(h.sharing.list_sent(&anna).await?[0].reaction, Some(Reaction::Like));

    h.sharing.react(&ben, &receipt.received_id, Reaction::Yum).await?;
    assert_eq!(h.sharing.list_sent(&anna).await?[0].reaction, Some(Reaction::Yum));
    Ok(())
}

#[tokio::test]
async fn list_sent_reads_the_recipients_side() -> anyhow::Result<()> {
    let h = Harness::new()?;
    let anna = h.user("anna").await?;
    let ben = h.user("ben").await?;
    let receipt = h.sharing.send(&anna, &ben, RecipeId(42)).await?;

    // reaction saved on the received side only, as if propagation never ran
    let path = inbox(&ben)?.doc(&receipt.received_id)?;
    h.store
        .update(&path, potluck_store::Changes::new().set("reaction", "love"))
        .await?;

    assert_eq!(sent_record(&h, &anna, &receipt.sent_id).await?.reaction, None);
    assert_eq!(h.sharing.list_sent(&anna).await?[0].reaction, Some(Reaction::Love));
    Ok(())
}

#[tokio::test]
async fn list_sent_falls_back_when_the_received_record_is_gone() -> anyhow::Result<()> {
    let h = Harness::new()?;
    let anna = h.user("anna").await?;
    let ben = h.user("ben").await?;
    let receipt = h.sharing.send(&anna, &ben, RecipeId(42)).await?;
    h.sharing.react(&ben, &receipt.received_id, Reaction::Dislike).await?;

    h.store.delete(&inbox(&ben)?.doc(&receipt.received_id)?).await?;

    assert_eq!(h.sharing.list_sent(&anna).await?[0].reaction, Some(Reaction::Dislike));
    Ok(())
}

#[tokio::test]
async fn reacting_to_an_orphan_stays_local() -> anyhow::Result<()> {
    let h = Harness::new()?;
    let anna = h.user("anna").await?;
    let ben = h.user("ben").await?;
    let now = h.store.server_timestamp().await?;
    let record_id = orphan(&h, &anna, &ben, 7, now).await?;

    h.sharing.react(&ben, &record_id, Reaction::Yum).await?;

    assert_eq!(h.sharing.list_received(&ben).await?[0].reaction, Some(Reaction::Yum));
    assert!(h.sharing.list_sent(&anna).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn reacting_when_the_sent_record_is_gone_still_succeeds() -> anyhow::Result<()> {
    let h = Harness::new()?;
    let anna = h.user("anna").await?;
    let ben = h.user("ben").await?;
    let receipt = h.sharing.send(&anna, &ben, RecipeId(42)).await?;
    h.store.delete(&outbox(&anna)?.doc(&receipt.sent_id)?).await?;

    h.sharing.react(&ben, &receipt.received_id, Reaction::Love).await?;

    assert_eq!(h.sharing.list_received(&ben).await?[0].reaction, Some(Reaction::Love));
    assert!(h.sharing.list_sent(&anna).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn reacting_to_a_missing_record_is_not_found() -> anyhow::Result<()> {
    let h = Harness::new()?;
    let anna = h.user("anna").await?;
    let ben = h.user("ben").await?;
    let receipt = h.sharing.send(&anna, &ben, RecipeId(42)).await?;

    let err = h
        .sharing
        .react(&ben, &ReceivedRecordId::from("missing"), Reaction::Like)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)), "{err}");

    // the record only exists in ben's subtree
    let err = h.sharing.react(&anna, &receipt.received_id, Reaction::Like).await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)), "{err}");
    Ok(())
}

#[test]
fn unknown_reaction_is_an_invalid_operation() {
    let err: Error = "meh".parse::<Reaction>().unwrap_err().into();
    assert!(matches!(err, Error::InvalidOperation(_)), "{err}");
    assert_eq!(" yum".parse::<Reaction>(), Ok(Reaction::Yum));
}

// ==================== live feed ====================

#[tokio::test]
async fn listen_received_follows_new_shares() -> anyhow::Result<()> {
    let h = Harness::new()?;
    let anna = h.user("anna").await?;
    let ben = h.user("ben").await?;
    h.sharing.send(&anna, &ben, RecipeId(1)).await?;

    let mut feed = h.sharing.listen_received(&ben).await?;
    assert_eq!(feed.next().await.expect("initial delivery")?.len(), 1);

    let receipt = h.sharing.send(&anna, &ben, RecipeId(2)).await?;
    let latest = loop {
        let delivery = timeout(Duration::from_secs(5), feed.next()).await?.expect("feed open")?;
        // the record appears unlinked first, then again once its counterpart is set
        if delivery.iter().any(|r| r.counterpart_sent_id.is_some() && r.id == receipt.received_id) {
            break delivery;
        }
    };
    assert_eq!(latest.len(), 2);
    assert_eq!(latest[0].recipe_id, RecipeId(2));
    Ok(())
}

// ==================== orphan repair ====================

#[tokio::test]
async fn repair_recreates_a_missing_sent_record() -> anyhow::Result<()> {
    let h = Harness::new()?;
    let anna = h.user("anna").await?;
    let ben = h.user("ben").await?;
    let then = h.store.server_timestamp().await?;
    let record_id = orphan(&h, &anna, &ben, 9, then).await?;

    let repaired = h.sharing.repair_orphans(&ben, Duration::ZERO).await?;
    assert_eq!(repaired, 1);

    let record = &h.sharing.list_received(&ben).await?[0];
    let sent_id = record.counterpart_sent_id.clone().expect("linked");
    let sent = sent_record(&h, &anna, &sent_id).await?;
    assert_eq!(sent.to_user_id, ben);
    assert_eq!(sent.recipe_id, RecipeId(9));
    assert_eq!(sent.timestamp, then);
    assert_eq!(sent.counterpart_received_id, record_id);

    // already linked, nothing left to do
    assert_eq!(h.sharing.repair_orphans(&ben, Duration::ZERO).await?, 0);
    Ok(())
}

#[tokio::test]
async fn repair_links_an_existing_sent_record() -> anyhow::Result<()> {
    let h = Harness::new()?;
    let anna = h.user("anna").await?;
    let ben = h.user("ben").await?;
    let receipt = h.sharing.send(&anna, &ben, RecipeId(42)).await?;

    // undo the final back-link step
    h.store
        .update(
            &inbox(&ben)?.doc(&receipt.received_id)?,
            potluck_store::Changes::new().delete("counterpartSentId"),
        )
        .await?;
    assert_eq!(h.sharing.list_received(&ben).await?[0].counterpart_sent_id, None);

    assert_eq!(h.sharing.repair_orphans(&ben, Duration::ZERO).await?, 1);

    let record = &h.sharing.list_received(&ben).await?[0];
    assert_eq!(record.counterpart_sent_id.as_ref(), Some(&receipt.sent_id));
    assert_eq!(h.sharing.list_sent(&anna).await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn repair_leaves_recent_records_alone() -> anyhow::Result<()> {
    let h = Harness::new()?;
    let anna = h.user("anna").await?;
    let ben = h.user("ben").await?;
    let now = h.store.server_timestamp().await?;
    orphan(&h, &anna, &ben, 3, now).await?;

    assert_eq!(h.sharing.repair_orphans(&ben, Duration::from_secs(3600)).await?, 0);
    assert_eq!(h.sharing.list_received(&ben).await?[0].counterpart_sent_id, None);
    assert!(h.sharing.list_sent(&anna).await?.is_empty());
    Ok(())
}
