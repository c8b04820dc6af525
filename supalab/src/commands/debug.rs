use anyhow::Result;
use secrecy::ExposeSecret;
use supalab_core::utils::format::format_config;
use supalab_core::utils::sensitive_data::mask_sensitive_value;

use crate::context::AppContext;

const DEFAULT_FILTERS: [&str; 7] = [
    "url",
    "api_key",
    "email",
    "jwt_token",
    "running",
    "authenticated",
    "config",
];

fn show(name: &str, value: Option<String>) -> String {
    format!("{name} = {}", value.unwrap_or_else(|| "None".to_string()))
}

/// `debug [filters]`: dump session state. `tasks` and `threads` are only
/// shown when asked for.
pub fn debug(app_context: &AppContext, args: Option<&str>) -> Result<()> {
    let requested: Vec<&str> = args.unwrap_or_default().split_whitespace().collect();
    let filters: Vec<&str> = if requested.is_empty() {
        DEFAULT_FILTERS.to_vec()
    } else {
        requested
    };

    let mut lines = Vec::new();
    for filter in filters {
        let state = app_context.state();
        match filter {
            "url" => lines.push(show("url", Some(state.url.clone()))),
            "api_key" => lines.push(show(
                "api_key",
                state.api_key.as_deref().map(mask_sensitive_value),
            )),
            "email" => lines.push(show(
                "email",
                state.config_text("email").map(str::to_string),
            )),
            "jwt_token" | "jwt" => lines.push(show(
                "jwt_token",
                state
                    .jwt
                    .as_ref()
                    .map(|jwt| mask_sensitive_value(jwt.expose_secret())),
            )),
            "running" => lines.push(show("running", Some(state.running.to_string()))),
            "authenticated" => lines.push(show(
                "authenticated",
                Some(state.authenticated.to_string()),
            )),
            "config" => {
                lines.push("config:".to_string());
                lines.extend(format_config(&state.config, "   "));
            }
            "tasks" => {
                drop(state);
                lines.push("tasks:".to_string());
                let alive = app_context.tasks().alive();
                if alive.is_empty() {
                    lines.push("   None".to_string());
                }
                for (id, name) in alive {
                    lines.push(format!("   {id}: {name}"));
                }
            }
            "threads" => {
                drop(state);
                lines.extend(thread_lines(app_context));
            }
            other => lines.push(format!("{other}?")),
        }
    }

    app_context.ui().print_lines(lines);
    Ok(())
}

fn thread_lines(app_context: &AppContext) -> Vec<String> {
    let mut lines = vec!["threads:".to_string()];
    if let Ok(handle) = tokio::runtime::Handle::try_current() {
        let metrics = handle.metrics();
        lines.push(format!("   runtime workers: {}", metrics.num_workers()));
        lines.push(format!("   alive tasks: {}", metrics.num_alive_tasks()));
    }
    for name in app_context.threads() {
        lines.push(format!("   {name}"));
    }
    lines
}
