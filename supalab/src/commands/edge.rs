use anyhow::{Context, Result};
use secrecy::SecretString;
use serde_json::json;
use supalab_core::config::unescape_spaces;
use supalab_core::functions::{parse_payload, EdgeResponse};
use supalab_core::utils::args::parse_args;

use crate::context::AppContext;

/// `dev edge <endpoint> [payload]`
pub async fn edge_function(app_context: &AppContext, args: &str) -> Result<()> {
    let args = parse_args(args);
    let Some(endpoint) = args.first() else {
        app_context.ui().println("edge <endpoint> [payload]");
        return Ok(());
    };
    let payload = args
        .get(1)
        .map(|raw| parse_payload(&unescape_spaces(raw)))
        .unwrap_or_else(|| json!({}));

    let backend = app_context.backend().context("Not connected")?;
    let bearer = match app_context.jwt() {
        Some(jwt) => jwt,
        None => SecretString::from(backend.client().api_key().to_string()),
    };

    let response = backend
        .client()
        .functions
        .invoke(endpoint, &payload, &bearer)
        .await?;
    show_response(app_context, &response);
    Ok(())
}

fn show_response(app_context: &AppContext, response: &EdgeResponse) {
    let ui = app_context.ui();
    if app_context.verbose() || !response.ok {
        ui.print_lines(response.report());
    } else if let (true, Some(json)) = (response.is_json(), response.json.as_ref()) {
        ui.println(json.to_string());
    } else {
        ui.println(&response.content_type);
        ui.println(&response.text);
    }
}
