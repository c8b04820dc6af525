//! Realtime sub-commands of `dev`.
//!
//! Joining a channel waits for the server's reply, so everything except
//! `lschan` runs as a named background task and reports through the `Ui`.

use anyhow::{Context, Result};
use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;
use supalab_core::functions::parse_payload;
use supalab_core::realtime::{
    ChannelCallback, ChannelEvent, ChannelOptions, PostgresChangesFilter, PresenceEvent,
    RealtimeClient,
};
use supalab_core::utils::args::parse_args;
use tabled::{builder::Builder, settings::Style};

use crate::context::AppContext;

pub const DEFAULT_EVENT: &str = "test";

/// Join options taken from the config: `broadcast_self`, `broadcast_ack`,
/// `presence_key` and `private_channels`.
pub fn channel_options(app_context: &AppContext) -> ChannelOptions {
    let state = app_context.state();
    let config = &state.config;
    ChannelOptions {
        broadcast_ack: config.get_bool("broadcast_ack").unwrap_or(false),
        broadcast_self: config.get_bool("broadcast_self").unwrap_or(true),
        presence_key: config
            .get_text("presence_key")
            .unwrap_or_default()
            .to_string(),
        private: config.get_bool("private_channels").unwrap_or(false),
        postgres_changes: Vec::new(),
    }
}

/// Render a channel event as one line.
pub fn describe_event(channel: &str, event: &ChannelEvent) -> String {
    match event {
        ChannelEvent::Broadcast { event, payload } => {
            format!("{channel}: broadcast {event} {payload}")
        }
        ChannelEvent::Presence(PresenceEvent::Sync(presences)) => {
            let keys: Vec<&str> = presences.keys().map(String::as_str).collect();
            format!("{channel}: presence sync [{}]", keys.join(", "))
        }
        ChannelEvent::Presence(PresenceEvent::Join { key, new_presences }) => {
            format!("{channel}: presence join {key} {}", Value::from(new_presences.clone()))
        }
        ChannelEvent::Presence(PresenceEvent::Leave { key, left_presences }) => {
            format!("{channel}: presence leave {key} {}", Value::from(left_presences.clone()))
        }
        ChannelEvent::PostgresChanges(data) => {
            let kind = data.get("type").and_then(Value::as_str).unwrap_or("change");
            let schema = data.get("schema").and_then(Value::as_str).unwrap_or_default();
            let table = data.get("table").and_then(Value::as_str).unwrap_or_default();
            let record = data
                .get("record")
                .filter(|r| !r.is_null())
                .or_else(|| data.get("old_record"))
                .cloned()
                .unwrap_or(Value::Null);
            format!("{channel}: {kind} {schema}.{table} {record}")
        }
        ChannelEvent::System(payload) => format!("{channel}: system {payload}"),
    }
}

fn printer(app_context: &AppContext) -> ChannelCallback {
    let ui = app_context.ui().clone();
    Arc::new(move |channel: &str, event: ChannelEvent| {
        ui.println(describe_event(channel, &event));
    })
}

/// Run `op` against the realtime connection in a background task; errors
/// are reported under `label`.
fn spawn_realtime<F, Fut>(app_context: &AppContext, task_name: String, label: &'static str, op: F)
where
    F: FnOnce(AppContext, RealtimeClient) -> Fut + Send + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    let ctx = app_context.clone();
    app_context.tasks().spawn(task_name, async move {
        let result = async {
            let backend = ctx.backend().context("Not connected")?;
            let realtime = backend.realtime(ctx.jwt()).await?;
            op(ctx.clone(), realtime).await
        }
        .await;
        if let Err(e) = result {
            ctx.handle_error(label, &e, false);
        }
    });
}

fn usage(app_context: &AppContext, text: &str) {
    app_context.ui().println(text);
}

/// `sub <channel>`: join the channel and print its system events.
pub fn subscribe(app_context: &AppContext, args: &str) {
    let Some(name) = parse_args(args).into_iter().next() else {
        return usage(app_context, "subscribe <channel>");
    };
    let options = channel_options(app_context);
    spawn_realtime(
        app_context,
        format!("subscribe {name}"),
        "subscribe()",
        move |ctx, realtime| async move {
            realtime.subscribe(&name, options).await?;
            realtime.on_system(&name, printer(&ctx))?;
            ctx.ui().println(format!("Subscribed to {name}."));
            Ok(())
        },
    );
}

/// `unsub <channel>`: leave the channel.
pub fn unsubscribe(app_context: &AppContext, args: &str) {
    let Some(name) = parse_args(args).into_iter().next() else {
        return usage(app_context, "unsubscribe <channel>");
    };
    spawn_realtime(
        app_context,
        format!("unsubscribe {name}"),
        "unsubscribe()",
        move |ctx, realtime| async move {
            realtime.unsubscribe(&name).await?;
            ctx.ui().println(format!("Unsubscribed from {name}."));
            Ok(())
        },
    );
}

/// `lschan`: table of the joined channels with their state and bindings.
pub async fn list_channels(app_context: &AppContext) -> Result<()> {
    let channels = match app_context.backend() {
        Some(backend) => match backend.current_realtime().await {
            Some(realtime) => realtime.channels(),
            None => Vec::new(),
        },
        None => Vec::new(),
    };
    if channels.is_empty() {
        app_context.ui().println("No channels.");
        return Ok(());
    }

    let mut builder = Builder::default();
    builder.push_record(vec!["Name", "Topic", "State", "Events"]);
    for channel in channels {
        builder.push_record(vec![
            channel.name,
            channel.topic,
            channel.state.to_string(),
            channel.events.join("\n"),
        ]);
    }
    let mut table = builder.build();
    table.with(Style::rounded());
    app_context.ui().println(table.to_string());
    Ok(())
}

/// `lchan <channel> [event]`
pub fn listen_channel(app_context: &AppContext, args: &str) {
    let mut args = parse_args(args).into_iter();
    let Some(name) = args.next() else {
        return usage(app_context, "listenchan <channel> [event]");
    };
    let event = args.next().unwrap_or_else(|| DEFAULT_EVENT.to_string());
    let options = channel_options(app_context);
    spawn_realtime(
        app_context,
        format!("listen {name}:{event}"),
        "listen_channel()",
        move |ctx, realtime| async move {
            realtime.subscribe(&name, options).await?;
            realtime.on_broadcast(&name, &event, printer(&ctx))?;
            ctx.ui()
                .println(format!("Listening to {event} on {name}."));
            Ok(())
        },
    );
}

/// `schan <channel> [event] <message>`: the event is only taken when three
/// or more arguments are given; the message is always the last one.
pub fn parse_send_args(args: &[String]) -> Option<(String, String, String)> {
    match args {
        [] | [_] => None,
        [channel, message] => Some((channel.clone(), DEFAULT_EVENT.to_string(), message.clone())),
        [channel, event, .., message] => Some((channel.clone(), event.clone(), message.clone())),
    }
}

/// Broadcast `{"message": <message>}` on the channel.
pub fn send_channel(app_context: &AppContext, args: &str) {
    let Some((name, event, message)) = parse_send_args(&parse_args(args)) else {
        return usage(app_context, "sendchan <channel> [event] <message>");
    };
    let options = channel_options(app_context);
    spawn_realtime(
        app_context,
        format!("send {name}:{event}"),
        "send_channel()",
        move |ctx, realtime| async move {
            realtime.subscribe(&name, options).await?;
            realtime
                .send_broadcast(&name, &event, json!({ "message": message }))
                .await?;
            ctx.ui().println(format!("Sent {event} to {name}."));
            Ok(())
        },
    );
}

/// Channel name used for `ldb` listeners.
pub fn db_channel_name(filter: &PostgresChangesFilter) -> String {
    format!(
        "db-changes-{}-{}",
        filter.schema,
        filter.table.as_deref().unwrap_or("*")
    )
}

/// `ldb [schema.]table`
pub fn listen_db(app_context: &AppContext, args: &str) {
    let Some(table) = parse_args(args).into_iter().next() else {
        return usage(app_context, "listendb [schema.]table");
    };
    let filter = PostgresChangesFilter::for_table(&table);
    let name = db_channel_name(&filter);
    let options = channel_options(app_context).with_postgres_changes(filter.clone());
    spawn_realtime(
        app_context,
        format!("listendb {filter}"),
        "listen_db()",
        move |ctx, realtime| async move {
            realtime.subscribe(&name, options).await?;
            realtime.on_postgres_changes(&name, filter.clone(), printer(&ctx))?;
            ctx.ui().println(format!("Listening to changes of {filter}."));
            Ok(())
        },
    );
}

/// `pres <channel>`: print presence sync, join and leave events.
pub fn presence(app_context: &AppContext, args: &str) {
    let Some(name) = parse_args(args).into_iter().next() else {
        return usage(app_context, "presence <channel>");
    };
    let options = channel_options(app_context);
    spawn_realtime(
        app_context,
        format!("presence {name}"),
        "presence()",
        move |ctx, realtime| async move {
            realtime.subscribe(&name, options).await?;
            realtime.on_presence(&name, printer(&ctx))?;
            ctx.ui().println(format!("Listening to presence on {name}."));
            Ok(())
        },
    );
}

/// `track <channel> <json>`
pub fn track(app_context: &AppContext, args: &str) {
    let mut args = parse_args(args).into_iter();
    let (Some(name), Some(raw)) = (args.next(), args.next()) else {
        return usage(app_context, "track <channel> <json>");
    };
    let payload = parse_payload(&supalab_core::config::unescape_spaces(&raw));
    let options = channel_options(app_context);
    spawn_realtime(
        app_context,
        format!("track {name}"),
        "track()",
        move |ctx, realtime| async move {
            realtime.subscribe(&name, options).await?;
            realtime.track(&name, payload).await?;
            ctx.ui().println(format!("Tracking on {name}."));
            Ok(())
        },
    );
}
