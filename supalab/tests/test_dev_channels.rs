use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use supalab::commands::session;
use supalab::context::AppContext;
use supalab::repl::process_line;
use supalab::state::SessionState;
use supalab::utils::ui::Ui;
use supalab_core::config::ConfigMap;
use supalab_core::realtime::message::PhoenixMessage;
use tokio::net::TcpListener;
use tokio_tungstenite::{accept_async, tungstenite::Message};

/// Realtime server that accepts every join and echoes broadcasts back.
async fn start_fake() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let ws = accept_async(stream).await.unwrap();
        let (mut tx, mut rx) = ws.split();
        while let Some(Ok(frame)) = rx.next().await {
            let Message::Text(text) = frame else {
                continue;
            };
            let msg: PhoenixMessage = serde_json::from_str(&text).unwrap();
            let event = msg.event.clone();
            let out = match event.as_str() {
                "phx_join" | "phx_leave" | "heartbeat" => Some(PhoenixMessage {
                    topic: msg.topic.clone(),
                    event: "phx_reply".to_string(),
                    payload: json!({"status": "ok", "response": {}}),
                    msg_ref: msg.msg_ref.clone(),
                    join_ref: msg.join_ref.clone(),
                }),
                "broadcast" => Some(PhoenixMessage {
                    msg_ref: None,
                    ..msg
                }),
                _ => None,
            };
            if let Some(out) = out {
                let text = serde_json::to_string(&out).unwrap();
                if tx.send(Message::Text(text.into())).await.is_err() {
                    return;
                }
            }
        }
    });

    format!("http://{addr}")
}

async fn connected(url: &str) -> AppContext {
    let mut config = ConfigMap::new();
    config.insert("url", url);
    config.insert("api_key", "anon-key");
    let ctx = AppContext::new(Arc::new(Ui::capturing()), SessionState::new(config, false));
    session::connect(&ctx).await.unwrap();
    ctx.ui().take_captured();
    ctx
}

/// Wait until a captured line satisfies `pred`.
async fn wait_for_line(ctx: &AppContext, pred: impl Fn(&str) -> bool) -> bool {
    for _ in 0..50 {
        if ctx.ui().captured().iter().any(|l| pred(l)) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

#[tokio::test]
async fn test_listen_send_and_list() {
    let url = start_fake().await;
    let ctx = connected(&url).await;

    process_line(&ctx, "dev lchan room").await;
    ctx.tasks().join_all().await;
    assert_eq!(ctx.ui().take_captured(), vec!["Listening to test on room."]);

    process_line(&ctx, "dev schan room hello").await;
    ctx.tasks().join_all().await;
    assert!(
        wait_for_line(&ctx, |l| l == r#"room: broadcast test {"message":"hello"}"#).await,
        "echo not printed: {:?}",
        ctx.ui().captured()
    );
    assert!(ctx.ui().take_captured().contains(&"Sent test to room.".to_string()));

    process_line(&ctx, "dev lschan").await;
    let table = ctx.ui().take_captured().join("\n");
    assert!(table.contains("realtime:room"));
    assert!(table.contains("joined"));
    assert!(table.contains("broadcast:test"));

    process_line(&ctx, "dev unsub room").await;
    ctx.tasks().join_all().await;
    assert_eq!(ctx.ui().take_captured(), vec!["Unsubscribed from room."]);

    process_line(&ctx, "dev lschan").await;
    assert_eq!(ctx.ui().take_captured(), vec!["No channels."]);

    process_line(&ctx, "exit").await;
    assert_eq!(ctx.ui().take_captured(), vec!["Bye."]);
}

#[tokio::test]
async fn test_realtime_errors_are_reported() {
    let ctx = AppContext::new(Arc::new(Ui::capturing()), SessionState::default());

    process_line(&ctx, "dev sub room").await;
    ctx.tasks().join_all().await;
    assert_eq!(ctx.ui().take_captured(), vec!["subscribe(): Not connected"]);

    process_line(&ctx, "dev schan room").await;
    assert_eq!(
        ctx.ui().take_captured(),
        vec!["sendchan <channel> [event] <message>"]
    );
}
