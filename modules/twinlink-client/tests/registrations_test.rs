//! Registration and consumption tests: change and live message delivery
//! through TwinClient, driven by messages injected into MockTransport.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::mpsc;
use twinlink_client::testing::{change_event, live_message, thing_id, MockTransport};
use twinlink_client::{ClientConfig, ClientError, FnHandler, MessageFilter, Selector, TwinClient};
use twinlink_signals::{Change, ChangeAction, Channel, JsonPointer, LiveMessage};

const WAIT: Duration = Duration::from_millis(500);
const QUIET: Duration = Duration::from_millis(100);

fn client(transport: &Arc<MockTransport>) -> TwinClient {
    TwinClient::new(transport.clone(), ClientConfig::default()).unwrap()
}

/// Handler that forwards `(tag, revision)` for every change it sees.
fn recorder(
    tag: &'static str,
    tx: &mpsc::UnboundedSender<(&'static str, i64)>,
) -> FnHandler<impl Fn(Change) -> anyhow::Result<()> + Send + Sync> {
    let tx = tx.clone();
    FnHandler::new(move |change: Change| {
        tx.send((tag, change.revision)).ok();
        Ok(())
    })
}

async fn next<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> Option<T> {
    tokio::time::timeout(WAIT, rx.recv()).await.ok().flatten()
}

async fn nothing_more<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> bool {
    tokio::time::timeout(QUIET, rx.recv()).await.is_err()
}

// ---------------------------------------------------------------------------
// Registration ids
// ---------------------------------------------------------------------------

#[tokio::test]
async fn duplicate_registration_id_is_rejected() {
    let transport = MockTransport::new();
    let client = client(&transport);
    let twin = client.twin();
    let (tx, _rx) = mpsc::unbounded_channel();

    twin.register_for_thing_changes("r1", recorder("first", &tx)).unwrap();
    let err = twin
        .register_for_thing_changes("r1", recorder("second", &tx))
        .unwrap_err();
    assert_eq!(err, ClientError::DuplicateRegistrationId("r1".into()));
}

#[tokio::test]
async fn distinct_registrations_both_receive_once() {
    let transport = MockTransport::new();
    let client = client(&transport);
    let twin = client.twin();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let entity = thing_id("ns:e");

    twin.register_for_changes("r1", Selector::thing(entity.clone()), recorder("r1", &tx))
        .unwrap();
    twin.register_for_changes("r2", Selector::thing(entity.clone()), recorder("r2", &tx))
        .unwrap();
    twin.start_consumption();

    transport.receive(change_event(Channel::Twin, &entity, "attributeModified", "/attributes/a", 7));

    let mut seen = vec![next(&mut rx).await.unwrap(), next(&mut rx).await.unwrap()];
    seen.sort();
    assert_eq!(seen, vec![("r1", 7), ("r2", 7)]);
    assert!(nothing_more(&mut rx).await);
}

#[tokio::test]
async fn deregister_is_idempotent_and_stops_delivery() {
    let transport = MockTransport::new();
    let client = client(&transport);
    let twin = client.twin();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let entity = thing_id("ns:e");

    twin.register_for_thing_changes("r1", recorder("r1", &tx)).unwrap();
    twin.start_consumption();

    transport.receive(change_event(Channel::Twin, &entity, "thingModified", "/", 1));
    assert_eq!(next(&mut rx).await, Some(("r1", 1)));

    assert!(twin.deregister("r1"));
    assert!(!twin.deregister("r1"));

    transport.receive(change_event(Channel::Twin, &entity, "thingModified", "/", 2));
    assert!(nothing_more(&mut rx).await);

    // The id is free again.
    twin.register_for_thing_changes("r1", recorder("again", &tx)).unwrap();
    transport.receive(change_event(Channel::Twin, &entity, "thingModified", "/", 3));
    assert_eq!(next(&mut rx).await, Some(("again", 3)));
}

#[tokio::test]
async fn twin_and_live_namespaces_are_independent() {
    let transport = MockTransport::new();
    let client = client(&transport);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let entity = thing_id("ns:e");

    client
        .twin()
        .register_for_thing_changes("shared", recorder("twin", &tx))
        .unwrap();
    client
        .live()
        .register_for_thing_changes("shared", recorder("live", &tx))
        .unwrap();
    client
        .live()
        .register_for_messages(
            "shared",
            MessageFilter::all(),
            FnHandler::new(|_: LiveMessage| Ok(())),
        )
        .unwrap();

    client.live().start_consumption();
    transport.receive(change_event(Channel::Twin, &entity, "thingModified", "/", 1));
    transport.receive(change_event(Channel::Live, &entity, "thingModified", "/", 2));

    assert_eq!(next(&mut rx).await, Some(("live", 2)));
    assert!(nothing_more(&mut rx).await);

    assert!(client.twin().deregister("shared"));
    assert!(client.live().deregister("shared"));
    assert!(!client.live().deregister("shared"));
}

// ---------------------------------------------------------------------------
// Consumption
// ---------------------------------------------------------------------------

#[tokio::test]
async fn events_before_start_are_dropped() {
    let transport = MockTransport::new();
    let client = client(&transport);
    let twin = client.twin();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let entity = thing_id("ns:e");

    twin.register_for_thing_changes("r1", recorder("r1", &tx)).unwrap();
    assert!(!twin.is_consuming());

    transport.receive(change_event(Channel::Twin, &entity, "thingCreated", "/", 1));
    assert!(nothing_more(&mut rx).await);

    assert!(twin.start_consumption());
    assert!(!twin.start_consumption());
    transport.receive(change_event(Channel::Twin, &entity, "thingModified", "/", 2));
    assert_eq!(next(&mut rx).await, Some(("r1", 2)));

    assert!(twin.stop_consumption());
    transport.receive(change_event(Channel::Twin, &entity, "thingModified", "/", 3));
    assert!(nothing_more(&mut rx).await);
}

#[tokio::test]
async fn replies_are_not_gated_by_consumption() {
    let transport = MockTransport::new();
    transport.autorespond();
    let client = client(&transport);

    assert!(!client.twin().is_consuming());
    client.twin().delete(thing_id("ns:e"), &[]).await.unwrap();
}

// ---------------------------------------------------------------------------
// Selectors
// ---------------------------------------------------------------------------

#[tokio::test]
async fn attribute_registration_sees_overlapping_paths_only() {
    let transport = MockTransport::new();
    let client = client(&transport);
    let twin = client.twin();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let entity = thing_id("ns:e");

    twin.for_id(entity.clone())
        .register_for_attribute_changes(
            "location",
            &JsonPointer::parse("location").unwrap(),
            recorder("location", &tx),
        )
        .unwrap();
    twin.start_consumption();

    transport.receive(change_event(Channel::Twin, &entity, "attributeModified", "/attributes/location/lat", 1));
    transport.receive(change_event(Channel::Twin, &entity, "attributeModified", "/attributes/color", 2));
    transport.receive(change_event(Channel::Twin, &entity, "featureModified", "/features/lamp", 3));
    transport.receive(change_event(Channel::Twin, &entity, "thingDeleted", "/", 4));
    transport.receive(change_event(Channel::Twin, &thing_id("ns:other"), "thingDeleted", "/", 5));

    assert_eq!(next(&mut rx).await, Some(("location", 1)));
    assert_eq!(next(&mut rx).await, Some(("location", 4)));
    assert!(nothing_more(&mut rx).await);
}

#[tokio::test]
async fn feature_registration_and_change_action() {
    let transport = MockTransport::new();
    let client = client(&transport);
    let twin = client.twin();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let entity = thing_id("ns:e");

    twin.for_id(entity.clone())
        .register_for_feature_changes(
            "lamp",
            "lamp",
            FnHandler::new(move |change: Change| {
                tx.send((change.action, change.path.to_string())).ok();
                Ok(())
            }),
        )
        .unwrap();
    twin.start_consumption();

    transport.receive(change_event(
        Channel::Twin,
        &entity,
        "featurePropertyCreated",
        "/features/lamp/properties/on",
        1,
    ));
    transport.receive(change_event(Channel::Twin, &entity, "featureDeleted", "/features/fan", 2));

    assert_eq!(
        next(&mut rx).await,
        Some((ChangeAction::Created, "/features/lamp/properties/on".to_string()))
    );
    assert!(nothing_more(&mut rx).await);
}

// ---------------------------------------------------------------------------
// Handler isolation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failing_handlers_do_not_affect_others() {
    let transport = MockTransport::new();
    let client = client(&transport);
    let twin = client.twin();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let entity = thing_id("ns:e");

    let panicky_tx = tx.clone();
    twin.register_for_thing_changes(
        "panicky",
        FnHandler::new(move |change: Change| {
            if change.revision == 1 {
                panic!("handler bug");
            }
            panicky_tx.send(("panicky", change.revision)).ok();
            Ok(())
        }),
    )
    .unwrap();
    twin.register_for_thing_changes(
        "failing",
        FnHandler::new(|_: Change| Err(anyhow::anyhow!("downstream unavailable"))),
    )
    .unwrap();
    twin.register_for_thing_changes("healthy", recorder("healthy", &tx))
        .unwrap();
    twin.start_consumption();

    transport.receive(change_event(Channel::Twin, &entity, "thingModified", "/", 1));
    transport.receive(change_event(Channel::Twin, &entity, "thingModified", "/", 2));

    let mut seen = Vec::new();
    for _ in 0..3 {
        seen.push(next(&mut rx).await.unwrap());
    }
    seen.sort();
    assert_eq!(seen, vec![("healthy", 1), ("healthy", 2), ("panicky", 2)]);
}

#[tokio::test]
async fn per_registration_order_is_preserved() {
    let transport = MockTransport::new();
    let client = client(&transport);
    let twin = client.twin();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let entity = thing_id("ns:e");

    twin.register_for_thing_changes("ordered", recorder("ordered", &tx))
        .unwrap();
    twin.start_consumption();

    for revision in 1..=20 {
        transport.receive(change_event(Channel::Twin, &entity, "attributeModified", "/attributes/n", revision));
    }
    for revision in 1..=20 {
        assert_eq!(next(&mut rx).await, Some(("ordered", revision)));
    }
}

// ---------------------------------------------------------------------------
// Live messages
// ---------------------------------------------------------------------------

#[tokio::test]
async fn live_messages_reach_matching_registrations() {
    let transport = MockTransport::new();
    let client = client(&transport);
    let live = client.live();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let entity = thing_id("ns:e");

    live.register_for_messages(
        "alarms",
        MessageFilter::thing(entity.clone()).with_subject("alarm"),
        FnHandler::new(move |message: LiveMessage| {
            tx.send(message.payload).ok();
            Ok(())
        }),
    )
    .unwrap();

    transport.receive(live_message(&entity, "alarm", json!({ "level": 1 })));
    assert!(nothing_more(&mut rx).await);

    live.start_consumption();
    transport.receive(live_message(&entity, "heartbeat", json!({})));
    transport.receive(live_message(&thing_id("ns:other"), "alarm", json!({ "level": 9 })));
    transport.receive(live_message(&entity, "alarm", json!({ "level": 2 })));

    assert_eq!(next(&mut rx).await, Some(Some(json!({ "level": 2 }))));
    assert!(nothing_more(&mut rx).await);
}

// ---------------------------------------------------------------------------
// Stream-fed transports and shutdown
// ---------------------------------------------------------------------------

#[tokio::test]
async fn consume_pumps_a_stream_into_the_dispatcher() {
    let transport = MockTransport::new();
    let client = client(&transport);
    let twin = client.twin();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let entity = thing_id("ns:e");

    twin.register_for_thing_changes("r1", recorder("r1", &tx)).unwrap();
    twin.start_consumption();

    let messages = (1..=3)
        .map(|revision| change_event(Channel::Twin, &entity, "thingModified", "/", revision))
        .collect::<Vec<_>>();
    client.consume(futures::stream::iter(messages));

    for revision in 1..=3 {
        assert_eq!(next(&mut rx).await, Some(("r1", revision)));
    }
}

#[tokio::test]
async fn close_drops_registrations_and_stops_consumption() {
    let transport = MockTransport::new();
    let client = client(&transport);
    let twin = client.twin();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let entity = thing_id("ns:e");

    twin.register_for_thing_changes("r1", recorder("r1", &tx)).unwrap();
    twin.start_consumption();
    client.close();

    assert!(!twin.is_consuming());
    assert!(!twin.deregister("r1"));
    transport.receive(change_event(Channel::Twin, &entity, "thingModified", "/", 1));
    assert!(nothing_more(&mut rx).await);
}
