//! Live WebSocket scenarios against a real server bound to a random port

use actix_web::{web, App, HttpServer};
use chat_relay_service::{config::Config, routes, state::AppState, storage::Storage};
use crypto_core::IdentityKeypair;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::{
    connect_async, tungstenite::protocol::Message, MaybeTlsStream, WebSocketStream,
};

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct TestServer {
    addr: String,
    state: web::Data<AppState>,
    http: reqwest::Client,
}

impl TestServer {
    fn start() -> Self {
        let state = web::Data::new(AppState::new(Config::default(), Storage::memory()));
        let data = state.clone();
        let server = HttpServer::new(move || {
            App::new()
                .app_data(data.clone())
                .configure(routes::configure)
        })
        .workers(1)
        .bind(("127.0.0.1", 0))
        .unwrap();
        let port = server.addrs()[0].port();
        actix_rt::spawn(server.run());

        Self {
            addr: format!("127.0.0.1:{port}"),
            state,
            http: reqwest::Client::new(),
        }
    }

    async fn post(&self, path: &str, body: Value) -> Value {
        self.http
            .post(format!("http://{}{path}", self.addr))
            .json(&body)
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap()
    }

    async fn get(&self, path: &str) -> Value {
        self.http
            .get(format!("http://{}{path}", self.addr))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap()
    }

    async fn register(&self, username: &str) -> String {
        let identity = self
            .post("/api/identity", json!({ "username": username }))
            .await;
        identity["id"].as_str().unwrap().to_string()
    }

    async fn connect(&self) -> Ws {
        let (ws, _) = connect_async(format!("ws://{}/ws", self.addr))
            .await
            .unwrap();
        ws
    }

    /// Connect and announce an identity that has no other live connection
    async fn connect_as(&self, user: &str) -> Ws {
        let mut ws = self.connect().await;
        let ack = announce(&mut ws, user).await;
        assert_eq!(ack["replaced"], false);
        ws
    }
}

async fn send(ws: &mut Ws, event: Value) {
    ws.send(Message::Text(event.to_string().into()))
        .await
        .unwrap();
}

async fn next_event(ws: &mut Ws) -> Value {
    loop {
        let frame = timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for an event")
            .expect("socket closed")
            .unwrap();
        if let Message::Text(text) = frame {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

async fn assert_silent(ws: &mut Ws) {
    if let Ok(Some(Ok(Message::Text(text)))) = timeout(Duration::from_millis(300), ws.next()).await {
        panic!("unexpected event: {text}");
    }
}

async fn announce(ws: &mut Ws, user: &str) -> Value {
    send(ws, json!({ "type": "announce-identity", "userId": user })).await;
    let ack = next_event(ws).await;
    assert_eq!(ack["type"], "identity-announced");
    assert_eq!(ack["userId"], user);
    ack
}

#[actix_web::test]
async fn test_live_message_then_history() {
    let server = TestServer::start();
    let alice = server.register("alice").await;
    let bob = server.register("bob").await;
    let mut alice_ws = server.connect_as(&alice).await;
    let mut bob_ws = server.connect_as(&bob).await;

    send(
        &mut alice_ws,
        json!({ "type": "send-direct", "to": bob, "from": alice, "body": "hi" }),
    )
    .await;

    let received = next_event(&mut bob_ws).await;
    assert_eq!(
        received,
        json!({
            "type": "receive-direct",
            "from": alice,
            "body": "hi",
            "mediaUrl": null,
            "mediaType": null
        })
    );

    let report = next_event(&mut alice_ws).await;
    assert_eq!(report["type"], "delivery-report");
    assert_eq!(report["delivered"], true);
    assert_eq!(report["deliveredCount"], 1);
    assert_silent(&mut alice_ws).await;

    let ack = server
        .post(
            "/api/history/append",
            json!({ "from": alice, "to": bob, "body": "hi" }),
        )
        .await;
    assert_eq!(ack["msg"], "Message added successfully");

    let history = server
        .post("/api/history/fetch", json!({ "from": bob, "to": alice }))
        .await;
    let entries = history.as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["fromSelf"], false);
    assert_eq!(entries[0]["body"], "hi");
}

#[actix_web::test]
async fn test_encrypted_direct_message_round_trip() {
    let server = TestServer::start();
    let alice = server.register("alice").await;
    let bob = server.register("bob").await;

    let bob_keys = IdentityKeypair::generate().unwrap();
    server
        .post(
            &format!("/api/identity/{bob}/public-key"),
            json!({ "publicKey": bob_keys.public_key_base64() }),
        )
        .await;

    let mut alice_ws = server.connect_as(&alice).await;
    let mut bob_ws = server.connect_as(&bob).await;

    let bob_identity = server.get(&format!("/api/identity/{bob}")).await;
    let ciphertext =
        crypto_core::encrypt_for(bob_identity["publicKey"].as_str(), "meet at noon").unwrap();
    assert_ne!(ciphertext, "meet at noon");

    send(
        &mut alice_ws,
        json!({ "type": "send-direct", "to": bob, "from": alice, "body": ciphertext }),
    )
    .await;

    let received = next_event(&mut bob_ws).await;
    assert_eq!(received["body"], ciphertext.as_str());
    let body = received["body"].as_str().unwrap();
    assert_eq!(bob_keys.decrypt_own(body), "meet at noon");
}

#[actix_web::test]
async fn test_group_fan_out() {
    let server = TestServer::start();
    let alice = server.register("alice").await;
    let bob = server.register("bob").await;
    let carol = server.register("carol").await;
    let offline = server.register("dave").await;
    let mut alice_ws = server.connect_as(&alice).await;
    let mut bob_ws = server.connect_as(&bob).await;
    let mut carol_ws = server.connect_as(&carol).await;

    let group_id = "6f1c7a52-2f8b-4d0e-9d43-3f7f6f2f9b10";
    send(
        &mut alice_ws,
        json!({
            "type": "send-group",
            "groupId": group_id,
            "from": alice,
            "members": [alice, bob, bob, carol, offline],
            "body": "standup in 5"
        }),
    )
    .await;

    for ws in [&mut bob_ws, &mut carol_ws] {
        let event = next_event(ws).await;
        assert_eq!(event["type"], "receive-group");
        assert_eq!(event["groupId"], group_id);
        assert_eq!(event["from"], alice.as_str());
        assert_eq!(event["body"], "standup in 5");
        assert_silent(ws).await;
    }

    let report = next_event(&mut alice_ws).await;
    assert_eq!(report["type"], "delivery-report");
    assert_eq!(report["deliveredCount"], 2);
    assert_silent(&mut alice_ws).await;
}

#[actix_web::test]
async fn test_malformed_group_members_deliver_nothing() {
    let server = TestServer::start();
    let alice = server.register("alice").await;
    let bob = server.register("bob").await;
    let mut alice_ws = server.connect_as(&alice).await;
    let mut bob_ws = server.connect_as(&bob).await;

    send(
        &mut alice_ws,
        json!({
            "type": "send-group",
            "groupId": "6f1c7a52-2f8b-4d0e-9d43-3f7f6f2f9b10",
            "from": alice,
            "members": bob,
            "body": "x"
        }),
    )
    .await;

    let report = next_event(&mut alice_ws).await;
    assert_eq!(report["deliveredCount"], 0);
    assert_silent(&mut bob_ws).await;
}

#[actix_web::test]
async fn test_protocol_errors_are_reported_to_sender() {
    let server = TestServer::start();
    let alice = server.register("alice").await;
    let bob = server.register("bob").await;
    let mut ws = server.connect().await;

    ws.send(Message::Text("not json".to_string().into())).await.unwrap();
    assert_eq!(next_event(&mut ws).await["type"], "error");

    // Sending before announcing
    send(
        &mut ws,
        json!({ "type": "send-direct", "to": bob, "from": alice, "body": "hi" }),
    )
    .await;
    let error = next_event(&mut ws).await;
    assert_eq!(error["error"], "Announce an identity before sending");

    announce(&mut ws, &alice).await;

    // Speaking for someone else
    send(
        &mut ws,
        json!({ "type": "send-direct", "to": alice, "from": bob, "body": "hi" }),
    )
    .await;
    let error = next_event(&mut ws).await;
    assert_eq!(error["error"], "Sender does not match the announced identity");

    send(
        &mut ws,
        json!({ "type": "send-direct", "to": bob, "from": alice, "body": "" }),
    )
    .await;
    let error = next_event(&mut ws).await;
    assert_eq!(error["error"], "Message must have a body or media");
}

#[actix_web::test]
async fn test_disconnect_releases_presence() {
    let server = TestServer::start();
    let alice = server.register("alice").await;
    let bob = server.register("bob").await;
    let mut alice_ws = server.connect_as(&alice).await;
    let mut bob_ws = server.connect_as(&bob).await;
    assert_eq!(server.state.presence.online_count().await, 2);

    bob_ws.close(None).await.unwrap();
    drop(bob_ws);

    let mut released = false;
    for _ in 0..50 {
        if server.state.presence.online_count().await == 1 {
            released = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(released, "bob was never released");

    send(
        &mut alice_ws,
        json!({ "type": "send-direct", "to": bob, "from": alice, "body": "still there?" }),
    )
    .await;
    let report = next_event(&mut alice_ws).await;
    assert_eq!(report["delivered"], false);
}

#[actix_web::test]
async fn test_last_announce_wins() {
    let server = TestServer::start();
    let alice = server.register("alice").await;
    let bob = server.register("bob").await;
    let mut alice_ws = server.connect_as(&alice).await;
    let mut old_ws = server.connect_as(&bob).await;

    let mut new_ws = server.connect().await;
    let ack = announce(&mut new_ws, &bob).await;
    assert_eq!(ack["replaced"], true);

    send(
        &mut alice_ws,
        json!({ "type": "send-direct", "to": bob, "from": alice, "body": "which one?" }),
    )
    .await;

    assert_eq!(next_event(&mut new_ws).await["body"], "which one?");
    assert_silent(&mut old_ws).await;
}

#[actix_web::test]
async fn test_media_is_delivered_unchanged() {
    let server = TestServer::start();
    let alice = server.register("alice").await;
    let bob = server.register("bob").await;
    let mut alice_ws = server.connect_as(&alice).await;
    let mut bob_ws = server.connect_as(&bob).await;

    send(
        &mut alice_ws,
        json!({
            "type": "send-direct",
            "to": bob,
            "from": alice,
            "mediaUrl": "/uploads/image/a b.webp",
            "mediaType": "image"
        }),
    )
    .await;
    let received = next_event(&mut bob_ws).await;
    assert_eq!(
        received,
        json!({
            "type": "receive-direct",
            "from": alice,
            "body": "",
            "mediaUrl": "/uploads/image/a b.webp",
            "mediaType": "image"
        })
    );
    next_event(&mut alice_ws).await;

    let group_id = "6f1c7a52-2f8b-4d0e-9d43-3f7f6f2f9b10";
    send(
        &mut alice_ws,
        json!({
            "type": "send-group",
            "groupId": group_id,
            "from": alice,
            "members": [alice, bob],
            "body": "clip",
            "mediaUrl": "/uploads/video/c.mp4",
            "mediaType": "video"
        }),
    )
    .await;
    let received = next_event(&mut bob_ws).await;
    assert_eq!(
        received,
        json!({
            "type": "receive-group",
            "groupId": group_id,
            "from": alice,
            "body": "clip",
            "mediaUrl": "/uploads/video/c.mp4",
            "mediaType": "video"
        })
    );
}
