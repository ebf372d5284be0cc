use pawmatch_contracts::Harness;
use pawmatch_model::{
    ConversationId, Message, MatchStatus, MessageType, OutgoingMessage, SwipeVerdict, UserId,
};
use pawmatch_node::store::{DocumentStore, Fields, StoreError};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;

#[tokio::test]
async fn repeated_likes_leave_one_match() {
    let harness = Harness::new();
    harness.seed_profile("p1", "Rex").await;

    for _ in 0..3 {
        harness.swipe("u1", "p1", SwipeVerdict::Liked).await.unwrap();
    }
    harness.swipe("u1", "p1", SwipeVerdict::Superliked).await.unwrap();

    assert_eq!(harness.matches_between("u1", "p1").await.len(), 1);
}

#[tokio::test]
async fn mutual_likes_open_exactly_one_conversation() {
    let harness = Harness::new();
    harness.seed_profile("p1", "Rex").await;
    harness.seed_profile("u1", "Alex").await;

    harness.swipe("u1", "p1", SwipeVerdict::Liked).await.unwrap();
    let outcome = harness.swipe("p1", "u1", SwipeVerdict::Liked).await.unwrap();
    assert_eq!(outcome.record.status, MatchStatus::Matched);

    let matched: Vec<_> = harness
        .matches_between("u1", "p1")
        .await
        .into_iter()
        .filter(|m| m.status == MatchStatus::Matched)
        .collect();
    assert_eq!(matched.len(), 1);
    assert_eq!(harness.store.count("conversations"), 1);

    harness.swipe("p1", "u1", SwipeVerdict::Liked).await.unwrap();
    harness.swipe("u1", "p1", SwipeVerdict::Liked).await.unwrap();
    assert_eq!(harness.store.count("conversations"), 1);
}

#[tokio::test]
async fn a_pass_blocks_the_conversation_forever() {
    let harness = Harness::new();
    harness.seed_profile("p1", "Rex").await;
    harness.seed_profile("u1", "Alex").await;

    harness.swipe("u1", "p1", SwipeVerdict::Liked).await.unwrap();
    harness.swipe("p1", "u1", SwipeVerdict::Passed).await.unwrap();
    harness.swipe("p1", "u1", SwipeVerdict::Liked).await.unwrap();
    harness.swipe("u1", "p1", SwipeVerdict::Superliked).await.unwrap();

    assert_eq!(harness.store.count("conversations"), 0);
    assert_eq!(harness.store.count("messages"), 0);
}

#[tokio::test]
async fn failed_bootstrap_creates_nothing() {
    for failing in ["conversations", "messages", "pets", "users"] {
        let harness = Harness::new();
        harness.seed_profile("p1", "Rex").await;
        harness.seed_like("p1", "u1").await;

        harness.store.fail_writes_to(failing);
        let result = harness.swipe("u1", "p1", SwipeVerdict::Liked).await;
        assert!(result.is_err(), "batch touching {failing} should fail");

        assert_eq!(harness.store.count("conversations"), 0, "{failing}");
        assert_eq!(harness.store.count("messages"), 0, "{failing}");
        assert_eq!(harness.where_eq("matches", "status", "matched").await, 0);
        let pet = harness.store.get("pets", "p1").await.unwrap().unwrap();
        assert!(pet.data.get("matches").is_none());
    }
}

#[tokio::test]
async fn read_state_never_regresses_across_pushes() {
    let harness = Harness::new();
    harness.seed_profile("p1", "Rex").await;
    harness.seed_like("p1", "u1").await;
    let outcome = harness.swipe("u1", "p1", SwipeVerdict::Liked).await.unwrap();
    let conversation = outcome.conversation_id.unwrap();

    for body in ["woof", "wag", "bark"] {
        let draft = OutgoingMessage::text(conversation.clone(), body).unwrap();
        harness
            .messages
            .send_message(&UserId::from("p1"), draft)
            .await
            .unwrap();
    }

    let (tx, mut rx) = mpsc::unbounded_channel();
    let _subscription = harness.messages.subscribe_messages(
        UserId::from("u1"),
        conversation.clone(),
        move |messages: Vec<Message>| {
            let _ = tx.send(messages);
        },
        |_| {},
    );

    let mut seen_read: HashMap<String, bool> = HashMap::new();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while let Ok(Some(batch)) = tokio::time::timeout_at(deadline, rx.recv()).await {
        for message in &batch {
            if seen_read.get(message.id.as_str()).copied() == Some(true) {
                assert!(message.read, "{} went back to unread", message.id);
            }
            seen_read.insert(message.id.to_string(), message.read);
        }
        if batch.iter().all(|m| m.read) {
            break;
        }
        // An out-of-band writer flipping a flag back must not leak through.
        if let Some(read) = batch.iter().find(|m| m.read) {
            harness
                .store
                .update("messages", read.id.as_str(), Fields::new().set("read", false))
                .await
                .unwrap();
        }
    }
    assert!(seen_read.values().any(|read| *read));
}

#[tokio::test]
async fn unread_count_ignores_order_and_own_messages() {
    let harness = Harness::new();
    harness.seed_profile("p1", "Rex").await;
    harness.seed_like("p1", "u1").await;
    let outcome = harness.swipe("u1", "p1", SwipeVerdict::Liked).await.unwrap();
    let conversation = outcome.conversation_id.unwrap();

    let send = |sender: &'static str, body: &'static str| {
        let conversation = conversation.clone();
        let messages = harness.messages.clone();
        async move {
            let draft = OutgoingMessage::text(conversation, body).unwrap();
            messages.send_message(&UserId::from(sender), draft).await.unwrap()
        }
    };
    let a = send("p1", "one").await;
    send("u1", "mine").await;
    send("p1", "two").await;
    send("p1", "three").await;
    harness.messages.mark_message_as_read(&a.id).await.unwrap();

    // seed + two + three
    let unread = harness
        .conversations
        .unread_count(&conversation, &UserId::from("u1"))
        .await;
    assert_eq!(unread, 3);
    assert_eq!(
        harness
            .conversations
            .unread_count(&conversation, &UserId::from("p1"))
            .await,
        1
    );
}

#[tokio::test]
async fn cancelled_listeners_stay_silent() {
    let harness = Harness::new();
    harness.seed_profile("p1", "Rex").await;
    harness.seed_like("p1", "u1").await;
    let outcome = harness.swipe("u1", "p1", SwipeVerdict::Liked).await.unwrap();
    let conversation = outcome.conversation_id.unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let list_tx = tx.clone();
    let messages = harness.messages.subscribe_messages(
        UserId::from("p1"),
        conversation.clone(),
        move |_| {
            let _ = tx.send("messages");
        },
        |_| {},
    );
    let conversations = harness.conversations.subscribe_conversations(
        UserId::from("u1"),
        move |_| {
            let _ = list_tx.send("conversations");
        },
        |_| {},
    );
    let mut initial = vec![rx.recv().await.unwrap(), rx.recv().await.unwrap()];
    initial.sort();
    assert_eq!(initial, vec!["conversations", "messages"]);

    messages.cancel();
    conversations.cancel();
    let draft = OutgoingMessage::new(
        conversation,
        "https://cdn/rex.png",
        MessageType::Image,
        None,
    )
    .unwrap();
    harness
        .messages
        .send_message(&UserId::from("u1"), draft)
        .await
        .unwrap();

    assert_eq!(rx.recv().await, None);
    assert_eq!(harness.store.listener_count(), 0);
}

#[tokio::test]
async fn swipe_replay_completes_a_pending_like() {
    let harness = Harness::new();
    harness.seed_profile("p1", "Rex").await;

    let first = harness.swipe("u1", "p1", SwipeVerdict::Liked).await.unwrap();
    assert_eq!(first.record.status, MatchStatus::Liked);
    assert!(first.conversation_id.is_none());

    harness.seed_like("p1", "u1").await;
    let replay = harness.swipe("u1", "p1", SwipeVerdict::Liked).await.unwrap();

    assert_eq!(replay.record.id, first.record.id);
    assert_eq!(replay.record.status, MatchStatus::Matched);
    assert_eq!(harness.store.count("conversations"), 1);
    assert_eq!(harness.store.count("messages"), 1);

    let conversation: ConversationId = replay.conversation_id.unwrap();
    let seed = harness.messages.get_messages(&conversation).await.unwrap();
    assert_eq!(seed.len(), 1);
    assert_eq!(seed[0].sender_id, UserId::from("p1"));
    assert!(!seed[0].read);
}

#[tokio::test]
async fn unknown_counterpart_writes_nothing() {
    let harness = Harness::new();
    let err = harness
        .swipe("u1", "ghost", SwipeVerdict::Liked)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("ghost"));
    assert_eq!(harness.store.count("matches"), 0);

    harness.store.fail_writes_to("matches");
    harness.seed_profile("p1", "Rex").await;
    let err = harness.swipe("u1", "p1", SwipeVerdict::Liked).await.unwrap_err();
    assert!(matches!(
        err,
        pawmatch_node::matching::MatchError::Store(StoreError::Rejected(_))
    ));
}
