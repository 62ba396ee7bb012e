//! Walk through the client against an in-memory backend: register, start
//! consumption, issue a few commands and watch the changes arrive.
//!
//! Usage: cargo run -p twinlink-client --features test-support --bin twinlink-demo

use std::time::Duration;

use anyhow::Result;
use serde_json::json;
use tracing::info;

use twinlink_client::testing::{change_event, live_message, MockTransport};
use twinlink_client::{telemetry, ClientConfig, FnHandler, MessageFilter, TwinClient};
use twinlink_signals::{Change, Channel, JsonPointer, LiveMessage, ModifyOption, Thing, ThingId};

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init_tracing()?;

    let config = ClientConfig::from_env()?;
    let transport = MockTransport::new();
    transport.autorespond();

    let client = TwinClient::new(transport.clone(), config)?;
    let twin = client.twin();
    let live = client.live();
    let sensor = ThingId::parse("org.example:sensor-1")?;

    twin.register_for_thing_changes(
        "printer",
        FnHandler::new(|change: Change| {
            info!(
                thing_id = %change.thing_id,
                path = %change.path,
                revision = change.revision,
                action = ?change.action,
                "Change received"
            );
            Ok(())
        }),
    )?;
    live.register_for_messages(
        "alarms",
        MessageFilter::all().with_subject("alarm"),
        FnHandler::new(|message: LiveMessage| {
            info!(thing_id = %message.thing_id, payload = ?message.payload, "Alarm received");
            Ok(())
        }),
    )?;
    twin.start_consumption();
    live.start_consumption();

    let thing = Thing::new(sensor.clone())
        .with_attribute(&JsonPointer::parse("location/room")?, "lab");
    let created = twin.create(thing, &[]).await?;
    info!(created = ?created.map(|t| t.thing_id.to_string()), "Thing created");

    let handle = twin.for_id(sensor.clone());
    handle
        .put_attribute(
            &JsonPointer::parse("temperature")?,
            21.5,
            &[ModifyOption::exists(false), ModifyOption::timeout(Duration::from_secs(5))],
        )
        .await?;

    // A backend would emit these after applying the commands above.
    transport.receive(change_event(Channel::Twin, &sensor, "thingCreated", "/", 1));
    transport.receive(change_event(
        Channel::Twin,
        &sensor,
        "attributeCreated",
        "/attributes/temperature",
        2,
    ));
    transport.receive(live_message(&sensor, "alarm", json!({ "level": "high" })));

    let answer = live
        .message(sensor.clone(), "reboot")
        .payload(json!({ "delaySeconds": 3 }))
        .send_and_await()
        .await?;
    info!(answer = ?answer, "Live message answered");

    let retrieved = handle.retrieve().await?;
    info!(thing_id = %retrieved.thing_id, "Thing retrieved");

    // Give the handler workers a moment before shutting down.
    tokio::time::sleep(Duration::from_millis(50)).await;
    info!(
        sent = transport.sent_count(),
        pending = client.pending_commands(),
        "Demo finished"
    );
    client.close();
    Ok(())
}
