//! End-to-end tests of the quote pipeline: command intake, dispatcher,
//! response relay and hub fan-out, wired over in-memory queues with a
//! scripted quote provider.

#![allow(clippy::panic)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use chat_gateway::bot::{CommandDispatcher, Quote, QuoteError, QuoteProvider, ResponseRelay};
use chat_gateway::domain::{ChannelId, ChatMessage, Envelope, EnvelopeEvent};
use chat_gateway::hub::{Connection, Hub, Mailbox};
use chat_gateway::queue::{MemoryQueue, MessageQueue};
use chat_gateway::service::{BroadcastGateway, CommandIntake};

#[derive(Debug, Default)]
struct ScriptedProvider {
    prices: HashMap<String, f64>,
}

#[async_trait]
impl QuoteProvider for ScriptedProvider {
    async fn fetch_quote(&self, stock_code: &str) -> Result<Quote, QuoteError> {
        if stock_code == "SLOW" {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
        self.prices
            .get(stock_code)
            .map(|price| Quote {
                symbol: stock_code.to_string(),
                price: *price,
            })
            .ok_or_else(|| QuoteError::Malformed("N/D".to_string()))
    }
}

struct Pipeline {
    hub: Hub,
    gateway: BroadcastGateway,
    intake: CommandIntake,
    replies: Arc<MemoryQueue>,
}

fn pipeline() -> Pipeline {
    let hub = Hub::spawn(64);
    let gateway = BroadcastGateway::new(hub.clone());
    let commands: Arc<dyn MessageQueue> = Arc::new(MemoryQueue::new("stock_commands"));
    let replies = Arc::new(MemoryQueue::new("stock_responses"));

    let provider = ScriptedProvider {
        prices: HashMap::from([("ACME".to_string(), 12.5)]),
    };
    let _dispatcher = CommandDispatcher::new(
        Arc::clone(&commands),
        Arc::clone(&replies) as Arc<dyn MessageQueue>,
        Arc::new(provider),
        "stock_bot",
        Duration::from_millis(100),
    )
    .spawn();
    let _relay =
        ResponseRelay::new(Arc::clone(&replies) as Arc<dyn MessageQueue>, gateway.clone()).spawn();

    Pipeline {
        hub,
        gateway,
        intake: CommandIntake::new(commands),
        replies,
    }
}

async fn join(hub: &Hub, channel: &str) -> Mailbox {
    let (conn, mut mailbox) = Connection::new("alice@example.com", None, 16);
    let id = conn.id();
    hub.register(conn).await;
    hub.join(id, ChannelId::from(channel)).await;
    let types = [next(&mut mailbox).await, next(&mut mailbox).await];
    assert_eq!(types.map(|e| e.type_str()), ["connected", "channel_joined"]);
    mailbox
}

async fn next(mailbox: &mut Mailbox) -> Arc<Envelope> {
    let Ok(Some(env)) = tokio::time::timeout(Duration::from_secs(2), mailbox.recv()).await else {
        panic!("timed out waiting for an envelope");
    };
    env
}

fn chat_content(env: &Envelope) -> (&str, &str) {
    let EnvelopeEvent::NewMessage(msg) = env.event() else {
        panic!("expected new_message, got {}", env.type_str());
    };
    (msg.user_email.as_str(), msg.content.as_str())
}

#[tokio::test]
async fn stock_command_round_trips_to_channel() {
    let p = pipeline();
    let mut member = join(&p.hub, "c1").await;
    let mut bystander = join(&p.hub, "c2").await;

    let queued = p
        .intake
        .intercept(&ChannelId::from("c1"), "alice@example.com", "/stock=ACME")
        .await;
    assert!(matches!(queued, Ok(Some(_))));

    let env = next(&mut member).await;
    assert_eq!(env.channel_id(), Some(&ChannelId::from("c1")));
    assert_eq!(chat_content(&env), ("stock_bot", "ACME quote is $12.50"));

    p.hub.flush().await;
    assert!(bystander.is_empty());
}

#[tokio::test]
async fn failed_and_timed_out_lookups_reply_with_failure_text() {
    let p = pipeline();
    let mut member = join(&p.hub, "c1").await;

    for code in ["NOPE", "SLOW"] {
        let content = format!("/stock={code}");
        let queued = p
            .intake
            .intercept(&ChannelId::from("c1"), "alice@example.com", &content)
            .await;
        assert!(matches!(queued, Ok(Some(_))));

        let env = next(&mut member).await;
        let expected = format!("Error fetching stock data for {code}");
        assert_eq!(chat_content(&env), ("stock_bot", expected.as_str()));
    }
}

#[tokio::test]
async fn malformed_reply_is_dropped_without_broadcast() {
    let p = pipeline();
    let mut member = join(&p.hub, "c1").await;

    tokio_test::assert_ok!(p.replies.publish(b"c1|alice|stock_bot".to_vec()).await);
    tokio_test::assert_ok!(
        p.replies
            .publish(b"c1|alice|stock_bot|still here".to_vec())
            .await
    );

    let env = next(&mut member).await;
    assert_eq!(chat_content(&env), ("stock_bot", "still here"));
    p.hub.flush().await;
    assert!(member.is_empty());
}

#[tokio::test]
async fn chat_messages_fan_out_alongside_bot_replies() {
    let p = pipeline();
    let mut member = join(&p.hub, "c1").await;

    let message = ChatMessage {
        id: "m1".to_string(),
        channel_id: ChannelId::from("c1"),
        user_email: "bob@example.com".to_string(),
        content: "hi all".to_string(),
        created_at: Utc::now(),
    };
    p.gateway.message_created(message.clone()).await;

    let env = next(&mut member).await;
    assert_eq!(env.event(), &EnvelopeEvent::NewMessage(message));
    assert_eq!(env.channel_id(), Some(&ChannelId::from("c1")));
}
