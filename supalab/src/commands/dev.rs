use anyhow::Result;
use serde_json::Value;
use std::sync::Arc;
use supalab_core::beep::{parse_beep_args, BeepCommand, BeepSink};
use supalab_core::utils::args::split_subcommand;
use supalab_core::utils::format::{display_value, info_line};

use super::{channels, edge};
use crate::context::AppContext;

pub const DEV_USAGE: [&str; 13] = [
    "   explore [path...]",
    "   edge <endpoint> [payload]",
    "   ping [args]",
    "   subscribe|sub <channel>",
    "   unsubscribe|unsub <channel>",
    "   listchannels|lschan",
    "   listenchan|lchan <channel> [event]",
    "   sendchan|schan <channel> [event] <message>",
    "   listendb|ldb [schema.]table",
    "   presence|pres <channel>",
    "   track <channel> <json>",
    "   beep [interval] [duration] [message]",
    "   beep stop [id]",
];

const INDENT: &str = "   ";

/// `dev [sub-command] [args]`
pub async fn dev(app_context: &AppContext, args: Option<&str>) -> Result<()> {
    let args = args.unwrap_or_default().trim_start();
    if args.is_empty() {
        let ui = app_context.ui();
        ui.println("dev?");
        ui.print_lines(DEV_USAGE);
        return Ok(());
    }

    let (sub, rest) = split_subcommand(args);
    let rest = rest.trim();
    match sub {
        "explore" => explore(app_context, rest),
        "edge" => {
            if let Err(e) = edge::edge_function(app_context, rest).await {
                app_context.handle_error("edge_function()", &e, false);
            }
        }
        "ping" => app_context.ui().println(format!("ping {rest}")),
        "subscribe" | "sub" => channels::subscribe(app_context, rest),
        "unsubscribe" | "unsub" => channels::unsubscribe(app_context, rest),
        "listchannels" | "lschan" => channels::list_channels(app_context).await?,
        "listenchan" | "lchan" => channels::listen_channel(app_context, rest),
        "sendchan" | "schan" => channels::send_channel(app_context, rest),
        "listendb" | "ldb" => channels::listen_db(app_context, rest),
        "presence" | "pres" => channels::presence(app_context, rest),
        "track" => channels::track(app_context, rest),
        "beep" => beep(app_context, rest),
        other => app_context.ui().println(format!("{other}?")),
    }
    Ok(())
}

/// Lines for `value`: containers nest one indent per level.
pub fn explore_lines(value: &Value, indent: &str) -> Vec<String> {
    let nested = format!("{indent}{INDENT}");
    let entry = |label: String, item: &Value, lines: &mut Vec<String>| match item {
        Value::Object(_) | Value::Array(_) => {
            lines.push(format!("{indent}{label}:"));
            lines.extend(explore_lines(item, &nested));
        }
        scalar => lines.push(format!("{indent}{label}: {}", display_value(scalar))),
    };

    let mut lines = Vec::new();
    match value {
        Value::Object(map) => {
            for (key, item) in map {
                entry(key.clone(), item, &mut lines);
            }
        }
        Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                entry(i.to_string(), item, &mut lines);
            }
        }
        scalar => lines.push(format!("{indent}{}", display_value(scalar))),
    }
    lines
}

/// Follow `path` as far as it resolves. Returns the value reached and
/// whether at least one segment matched; an empty path always matches.
pub fn walk<'a>(root: &'a Value, path: &[&str]) -> (&'a Value, bool) {
    let mut current = root;
    let mut resolved = 0;
    for segment in path {
        let next = match current {
            Value::Object(map) => map.get(*segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        };
        match next {
            Some(value) => {
                current = value;
                resolved += 1;
            }
            None => break,
        }
    }
    (current, path.is_empty() || resolved > 0)
}

/// `explore [path...]`: show the last auth response.
fn explore(app_context: &AppContext, args: &str) {
    let session = {
        let state = app_context.state();
        match (&state.auth_session, state.authenticated) {
            (Some(session), true) => Some(session.to_value()),
            _ => None,
        }
    };
    let Some(session) = session else {
        app_context.ui().println("login?");
        return;
    };

    let path: Vec<&str> = args.split_whitespace().collect();
    let (value, found) = walk(&session, &path);
    if !found {
        app_context
            .ui()
            .println(info_line(format!("{} not found", path.join(" "))));
    }
    app_context.ui().print_lines(explore_lines(value, ""));
}

fn beep(app_context: &AppContext, args: &str) {
    let ui = app_context.ui();
    match parse_beep_args(args) {
        BeepCommand::Start(spec) => {
            let sink_ui = ui.clone();
            let sink: BeepSink = Arc::new(move |line| sink_ui.println(line));
            let (id, handle) = app_context.beeps().start(spec, sink);
            app_context.tasks().spawn(format!("beep {id}"), async move {
                let _ = handle.await;
            });
        }
        BeepCommand::Stop(id) => {
            if !app_context.beeps().stop(id) {
                ui.println(info_line(format!("No beep {id} running.")));
            }
        }
        BeepCommand::StopAll => app_context.beeps().stop_all(),
    }
}
