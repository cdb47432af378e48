//! End-to-end tests of the polling transport through `Server::handle_request`,
//! including the upgrade to a socket connection.

#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

use futures::{SinkExt, StreamExt};
use realtime_protocol::config::EngineConfig;
use realtime_protocol::core::codec::{Frame, FrameCodec};
use realtime_protocol::service::{EngineRequest, EngineResponse, Server};
use realtime_protocol::{CloseReason, SessionState};
use serde_json::Value;
use std::time::Duration;
use tokio::io::DuplexStream;
use tokio_util::codec::Framed;

fn server() -> Server {
    let server = Server::new(EngineConfig::default_with_overrides(|c| {
        c.server.ping_interval = Duration::from_millis(300);
        c.server.ping_timeout = Duration::from_millis(200);
        c.server.connect_timeout = Duration::from_millis(1000);
        c.server.namespaces = vec!["/custom".into()];
    }))
    .expect("valid config");

    for path in ["/", "/custom"] {
        let nsp = server.of(path).unwrap();
        nsp.on("message", |socket, args, _| {
            let _ = socket.emit("message-back", args);
        });
        nsp.on("message-with-ack", |_, args, ack| {
            if let Some(ack) = ack {
                let _ = ack.send(args);
            }
        });
    }
    server
}

fn query(sid: &str) -> String {
    format!("EIO=4&transport=polling&sid={sid}")
}

async fn get(server: &Server, sid: &str) -> EngineResponse {
    server.handle_request(EngineRequest::get(query(sid))).await
}

async fn post(server: &Server, sid: &str, body: &str) -> EngineResponse {
    server
        .handle_request(EngineRequest::post(query(sid), body.to_string()))
        .await
}

fn body(res: &EngineResponse) -> &str {
    res.text().expect("utf-8 body")
}

async fn handshake(server: &Server) -> (String, Value) {
    let res = server
        .handle_request(EngineRequest::get("EIO=4&transport=polling"))
        .await;
    assert_eq!(res.status, 200);
    let text = body(&res);
    assert!(text.starts_with('0'), "{text}");
    let open: Value = serde_json::from_str(&text[1..]).unwrap();
    (open["sid"].as_str().unwrap().to_string(), open)
}

async fn connected(server: &Server) -> String {
    let (sid, _) = handshake(server).await;
    assert_eq!(post(server, &sid, "40").await.status, 200);
    let res = get(server, &sid).await;
    assert!(body(&res).starts_with("40{"));
    sid
}

#[tokio::test]
async fn handshake_returns_open_payload() {
    let server = server();
    let (sid, open) = handshake(&server).await;

    let keys: Vec<&str> = open.as_object().unwrap().keys().map(String::as_str).collect();
    assert_eq!(keys, ["sid", "upgrades", "pingInterval", "pingTimeout", "maxPayload"]);
    assert_eq!(open["upgrades"], serde_json::json!(["websocket"]));
    assert_eq!(open["pingInterval"], 300);
    assert_eq!(open["pingTimeout"], 200);
    assert_eq!(open["maxPayload"], 1_000_000);
    assert!(server.session(&sid).is_some());
}

#[tokio::test]
async fn handshake_requires_version_and_transport() {
    let server = server();
    for q in [
        "transport=polling",
        "EIO=abc&transport=polling",
        "EIO=4",
        "EIO=4&transport=abc",
    ] {
        let res = server.handle_request(EngineRequest::get(q)).await;
        assert_eq!(res.status, 400, "{q}");
    }
    assert_eq!(server.session_count(), 0);
}

#[tokio::test]
async fn post_or_put_without_sid_is_rejected() {
    let server = server();
    for method in ["POST", "PUT"] {
        let res = server
            .handle_request(EngineRequest::new(method, "EIO=4&transport=polling", ""))
            .await;
        assert_eq!(res.status, 400, "{method}");
    }
}

#[tokio::test]
async fn connect_main_namespace() {
    let server = server();
    let (sid, _) = handshake(&server).await;

    let res = post(&server, &sid, "40").await;
    assert_eq!(res.status, 200);
    assert_eq!(body(&res), "");

    let res = get(&server, &sid).await;
    let packets: Vec<&str> = body(&res).split('\x1e').collect();
    assert_eq!(packets.len(), 2);
    assert!(packets[0].starts_with("40{\"sid\":"));
    assert_eq!(packets[1], r#"42["auth",{}]"#);
}

#[tokio::test]
async fn connect_custom_namespace_with_auth() {
    let server = server();
    let (sid, _) = handshake(&server).await;

    post(&server, &sid, r#"40/custom,{"token":"abc"}"#).await;
    let res = get(&server, &sid).await;
    let packets: Vec<&str> = body(&res).split('\x1e').collect();
    assert!(packets[0].starts_with("40/custom,{\"sid\":"));
    assert_eq!(packets[1], r#"42/custom,["auth",{"token":"abc"}]"#);
}

#[tokio::test]
async fn connect_invalid_namespace() {
    let server = server();
    let (sid, _) = handshake(&server).await;

    post(&server, &sid, "40/random").await;
    let res = get(&server, &sid).await;
    assert_eq!(body(&res), r#"44/random,{"message":"Invalid namespace"}"#);
}

#[tokio::test]
async fn event_and_ack_round_trip() {
    let server = server();
    let sid = connected(&server).await;

    post(&server, &sid, r#"42["message",1,"2",{"3":[false]}]"#).await;
    let res = get(&server, &sid).await;
    assert_eq!(body(&res), r#"42["message-back",1,"2",{"3":[false]}]"#);

    post(&server, &sid, r#"42456["message-with-ack",1,"2",{"3":[false]}]"#).await;
    let res = get(&server, &sid).await;
    assert_eq!(body(&res), r#"43456[1,"2",{"3":[false]}]"#);
}

#[tokio::test]
async fn binary_ack_carries_attachments_as_base64() {
    let server = server();
    let sid = connected(&server).await;

    let request = "452-789[\"message-with-ack\",{\"_placeholder\":true,\"num\":0},{\"_placeholder\":true,\"num\":1}]\x1ebAQIDBA==\x1ebBQYHCA==";
    assert_eq!(post(&server, &sid, request).await.status, 200);

    let res = get(&server, &sid).await;
    assert_eq!(
        body(&res),
        "462-789[{\"_placeholder\":true,\"num\":0},{\"_placeholder\":true,\"num\":1}]\x1ebAQIDBA==\x1ebBQYHCA=="
    );
}

#[tokio::test(start_paused = true)]
async fn heartbeat_ping_and_pong() {
    let server = server();
    let (sid, _) = handshake(&server).await;

    let res = get(&server, &sid).await;
    assert_eq!(body(&res), "2");
    let res = post(&server, &sid, "3").await;
    assert_eq!(res.status, 200);

    let res = get(&server, &sid).await;
    assert_eq!(body(&res), "2");
}

#[tokio::test(start_paused = true)]
async fn missing_pong_closes_session() {
    let server = server();
    let (sid, _) = handshake(&server).await;

    let res = get(&server, &sid).await;
    assert_eq!(body(&res), "2");

    tokio::time::sleep(Duration::from_millis(300)).await;
    let res = get(&server, &sid).await;
    assert_eq!(res.status, 400);
    assert_eq!(server.metrics().snapshot().ping_timeouts, 1);
}

#[tokio::test]
async fn client_close_releases_pending_poll_with_noop() {
    let server = server();
    let (sid, _) = handshake(&server).await;

    let pending = {
        let server = server.clone();
        let sid = sid.clone();
        tokio::spawn(async move { get(&server, &sid).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(post(&server, &sid, "1").await.status, 200);
    let res = pending.await.unwrap();
    assert_eq!(res.status, 200);
    assert_eq!(body(&res), "6");

    assert_eq!(get(&server, &sid).await.status, 400);
}

#[tokio::test]
async fn overlapping_poll_is_rejected() {
    let server = server();
    let (sid, _) = handshake(&server).await;

    let pending = {
        let server = server.clone();
        let sid = sid.clone();
        tokio::spawn(async move { get(&server, &sid).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(get(&server, &sid).await.status, 400);
    let session = server.session(&sid).unwrap();
    assert_eq!(session.state(), SessionState::Open);

    server.close();
    let res = pending.await.unwrap();
    assert_eq!(body(&res), "1");
}

#[tokio::test]
async fn server_shutdown_is_delivered_on_next_poll() {
    let server = server();
    let sid = connected(&server).await;

    server.close();
    assert_eq!(server.session(&sid).unwrap().state(), SessionState::Closing);

    let res = get(&server, &sid).await;
    assert_eq!(res.status, 200);
    assert_eq!(body(&res), "1");
    assert_eq!(server.session_count(), 0);
    assert_eq!(get(&server, &sid).await.status, 400);
}

#[tokio::test(start_paused = true)]
async fn unclaimed_close_is_torn_down_after_ping_timeout() {
    let server = server();
    let sid = connected(&server).await;

    server.close();
    assert_eq!(server.session_count(), 1);
    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(server.session_count(), 0);
    assert!(server.session(&sid).is_none());
}

#[tokio::test]
async fn oversized_body_is_rejected_without_closing() {
    let server = server();
    let sid = connected(&server).await;

    let huge = format!("4{}", "a".repeat(1_000_001));
    let res = post(&server, &sid, &huge).await;
    assert_eq!(res.status, 413);
    assert!(server.session(&sid).is_some());
}

#[tokio::test]
async fn excessive_attachment_count_closes_session() {
    let server = Server::new(EngineConfig::default_with_overrides(|c| {
        c.transport.max_attachments = 2;
    }))
    .expect("valid config");
    let sid = connected(&server).await;

    post(
        &server,
        &sid,
        r#"453-["message",{"_placeholder":true,"num":0}]"#,
    )
    .await;
    assert!(server.session(&sid).is_none());
    assert_eq!(post(&server, &sid, "bAQID").await.status, 400);
}

#[tokio::test]
async fn malformed_packet_closes_session() {
    for payload in ["4abc", "42{}", r#"42abc["message"]"#] {
        let server = server();
        let sid = connected(&server).await;

        post(&server, &sid, payload).await;
        assert_eq!(get(&server, &sid).await.status, 400, "{payload}");
    }
}

fn dial(server: &Server, sid: &str) -> Framed<DuplexStream, FrameCodec> {
    let (server_io, client_io) = tokio::io::duplex(64 * 1024);
    let server = server.clone();
    let q = format!("EIO=4&transport=websocket&sid={sid}");
    tokio::spawn(async move {
        let _ = server
            .handle_socket(&q, Framed::new(server_io, FrameCodec::default()))
            .await;
    });
    Framed::new(client_io, FrameCodec::default())
}

async fn recv(ws: &mut Framed<DuplexStream, FrameCodec>) -> Frame {
    tokio::time::timeout(Duration::from_secs(2), ws.next())
        .await
        .expect("frame in time")
        .expect("stream open")
        .expect("valid frame")
}

#[tokio::test]
async fn upgrade_to_socket() {
    let server = server();
    let sid = connected(&server).await;

    let mut ws = dial(&server, &sid);
    ws.send(Frame::Text("2probe".into())).await.unwrap();
    assert_eq!(recv(&mut ws).await, Frame::Text("3probe".into()));
    ws.send(Frame::Text("5".into())).await.unwrap();

    ws.send(Frame::Text(r#"42["message",1]"#.into())).await.unwrap();
    assert_eq!(
        recv(&mut ws).await,
        Frame::Text(r#"42["message-back",1]"#.into())
    );

    assert_eq!(get(&server, &sid).await.status, 400);
    assert_eq!(server.metrics().snapshot().upgrades_completed, 1);

    let mut second = dial(&server, &sid);
    let end = tokio::time::timeout(Duration::from_secs(2), second.next())
        .await
        .unwrap();
    assert!(end.is_none());
}

#[tokio::test]
async fn probe_releases_pending_poll() {
    let server = server();
    let (sid, _) = handshake(&server).await;

    let pending = {
        let server = server.clone();
        let sid = sid.clone();
        tokio::spawn(async move { get(&server, &sid).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    let mut ws = dial(&server, &sid);
    ws.send(Frame::Text("2probe".into())).await.unwrap();
    assert_eq!(recv(&mut ws).await, Frame::Text("3probe".into()));
    assert_eq!(body(&pending.await.unwrap()), "6");
}

#[tokio::test]
async fn probe_and_upgrade_may_be_pipelined() {
    let server = server();
    let (sid, _) = handshake(&server).await;

    let mut ws = dial(&server, &sid);
    ws.send(Frame::Text("2probe".into())).await.unwrap();
    ws.send(Frame::Text("5".into())).await.unwrap();
    assert_eq!(recv(&mut ws).await, Frame::Text("3probe".into()));

    ws.send(Frame::Text("40".into())).await.unwrap();
    match recv(&mut ws).await {
        Frame::Text(text) => assert!(text.starts_with("40{"), "{text}"),
        other => panic!("unexpected frame {other:?}"),
    }
}

#[tokio::test]
async fn upgrade_of_unknown_session_is_refused() {
    let server = server();
    let mut ws = dial(&server, "missing");
    let end = tokio::time::timeout(Duration::from_secs(2), ws.next())
        .await
        .unwrap();
    assert!(end.is_none());
    assert!(server.metrics().snapshot().rejected_requests >= 1);
}

#[tokio::test]
async fn server_close_during_upgrade_is_delivered_on_next_poll() {
    let server = server();
    let sid = connected(&server).await;

    let mut ws = dial(&server, &sid);
    ws.send(Frame::Text("2probe".into())).await.unwrap();
    assert_eq!(recv(&mut ws).await, Frame::Text("3probe".into()));
    let session = server.session(&sid).unwrap();
    assert_eq!(session.state(), SessionState::Upgrading);

    session.close(CloseReason::ServerClose);
    let end = tokio::time::timeout(Duration::from_secs(2), ws.next())
        .await
        .unwrap();
    assert!(end.is_none());

    let res = get(&server, &sid).await;
    assert_eq!(res.status, 200);
    assert_eq!(body(&res), "1");
    assert!(session.is_closed());
    assert_eq!(server.metrics().snapshot().upgrades_completed, 0);
}
