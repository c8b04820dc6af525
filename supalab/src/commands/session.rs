use anyhow::{Context, Result};
use secrecy::{ExposeSecret, SecretString};
use supalab_core::auth::SignOutScope;
use supalab_core::logo::banner_lines;
use supalab_core::realtime::RealtimeConfig;
use supalab_core::utils::format::{error_line, show_time};
use supalab_core::utils::sensitive_data::mask_password;
use supalab_core::SupabaseClient;
use tracing::{debug, info, warn};

use crate::context::{AppContext, Backend};

/// Build the backend from the `url` and `api_key` config keys.
pub async fn connect(app_context: &AppContext) -> Result<()> {
    let ui = app_context.ui();
    let (url, api_key) = {
        let state = app_context.state();
        let url = state
            .config_text("url")
            .map(str::to_string)
            .unwrap_or_else(|| state.url.clone());
        (url, state.config_text("api_key").map(str::to_string))
    };

    ui.println(format!("Connecting to {url}"));
    let Some(api_key) = api_key else {
        ui.println(error_line("No api_key configuration found."));
        return Ok(());
    };

    {
        let mut state = app_context.state_mut();
        state.config.insert("url", url.as_str());
        state.config.insert("api_key", api_key.as_str());
        state.url = url.clone();
        state.api_key = Some(api_key.clone());
    }

    let client = SupabaseClient::new(&url, &api_key)?;
    app_context.set_backend(Some(Backend::new(client, RealtimeConfig::default())));
    ui.println("Ready to login.");
    Ok(())
}

/// `email` and `password` from the config, only when both are set.
fn config_credentials(app_context: &AppContext) -> Option<(String, SecretString)> {
    let state = app_context.state();
    let email = state.config.get("email")?.to_string();
    let password = state.config.get("password")?.to_string();
    Some((email, SecretString::from(password)))
}

async fn prompt_email() -> Result<String> {
    let email = tokio::task::spawn_blocking(|| {
        dialoguer::Input::<String>::new()
            .with_prompt("Email")
            .allow_empty(true)
            .interact_text()
    })
    .await??;
    Ok(email)
}

async fn prompt_password() -> Result<SecretString> {
    let password = tokio::task::spawn_blocking(|| {
        dialoguer::Password::new()
            .with_prompt("Password")
            .allow_empty_password(true)
            .interact()
    })
    .await??;
    Ok(SecretString::from(password))
}

/// `login`: credentials come from the config when both `email` and
/// `password` are set; whatever is missing is asked for.
pub async fn login(app_context: &AppContext) -> Result<()> {
    let (mut email, mut password) = config_credentials(app_context)
        .unwrap_or_else(|| (String::new(), SecretString::from(String::new())));

    if email.is_empty() {
        email = prompt_email().await.context("Failed to read email")?;
    }
    if password.expose_secret().is_empty() {
        password = prompt_password().await.context("Failed to read password")?;
    }
    sign_in(app_context, email.trim(), &password).await
}

/// Sign in and keep the token for later calls. A rejected sign-in is
/// printed with the password masked and leaves the session signed out.
pub async fn sign_in(app_context: &AppContext, email: &str, password: &SecretString) -> Result<()> {
    let ui = app_context.ui();
    if email.is_empty() || password.expose_secret().is_empty() {
        ui.println("Invalid email or password.");
        return Ok(());
    }
    let Some(backend) = app_context.backend() else {
        ui.println(error_line("Not connected."));
        return Ok(());
    };

    ui.println("Logging in...");
    match backend
        .client()
        .auth
        .sign_in_with_password(email, password)
        .await
    {
        Ok(session) => {
            let jwt = SecretString::from(session.access_token.clone());
            let user_email = session
                .user
                .email
                .clone()
                .unwrap_or_else(|| email.to_string());
            let last_login = session
                .user
                .last_sign_in_at
                .as_deref()
                .map(show_time)
                .unwrap_or_default();
            {
                let mut state = app_context.state_mut();
                state.jwt = Some(SecretString::from(session.access_token.clone()));
                state.auth_session = Some(session);
                state.authenticated = true;
            }
            if let Some(realtime) = backend.current_realtime().await {
                realtime.set_auth(Some(jwt))?;
            }
            info!("Signed in as {}", user_email);
            ui.println(format!("{user_email} logged in."));
            ui.println(format!("Last login: {last_login}"));
        }
        Err(e) => {
            ui.println("No response received.");
            ui.println(format!(
                "sign_in({}, {}): {}",
                email,
                mask_password(password.expose_secret()),
                e.detail()
            ));
            app_context.state_mut().authenticated = false;
        }
    }
    Ok(())
}

/// `logout`: the local session is dropped even when the server call fails.
pub async fn sign_out(app_context: &AppContext) -> Result<()> {
    app_context.ui().println("Logging out.");

    let result = match (app_context.backend(), app_context.jwt()) {
        (Some(backend), Some(jwt)) => {
            if let Some(realtime) = backend.current_realtime().await {
                if let Err(e) = realtime.unsubscribe_all().await {
                    debug!("Leaving channels on logout: {}", e);
                }
                realtime.set_access_token(None);
            }
            backend
                .client()
                .auth
                .sign_out(&jwt, SignOutScope::Local)
                .await
                .map_err(anyhow::Error::from)
        }
        _ => Ok(()),
    };

    app_context.state_mut().clear_auth();
    result
}

/// Leave the REPL: sign out, stop beeps and background tasks, close the
/// realtime connection.
pub async fn exit_completely(app_context: &AppContext, cr: bool) {
    let ui = app_context.ui();
    if cr {
        ui.println("\r");
    }
    if app_context.is_authenticated() {
        if let Err(e) = sign_out(app_context).await {
            app_context.handle_error("sign_out()", &e, false);
        }
    }
    app_context.beeps().stop_all();
    if let Some(backend) = app_context.backend() {
        backend.close_realtime().await;
    }
    app_context.tasks().abort_all();
    ui.println("Bye.");
    app_context.state_mut().running = false;
}

/// Re-check the signed-in user after every command. Any failure ends the
/// session: the token is dropped so later calls fall back to the api key.
pub async fn check_session(app_context: &AppContext) {
    if !app_context.is_authenticated() {
        return;
    }
    let (Some(backend), Some(jwt)) = (app_context.backend(), app_context.jwt()) else {
        app_context.state_mut().clear_auth();
        return;
    };
    let Err(e) = backend.client().auth.get_user_once(&jwt).await else {
        return;
    };
    if e.is_session_expired() {
        info!("Session is no longer valid: {}", e);
    } else {
        warn!("Session check failed: {}", e);
    }
    app_context.state_mut().clear_auth();
    if let Some(realtime) = backend.current_realtime().await {
        realtime.set_access_token(None);
    }
}

/// Print the banner unless `suppress_header` is set.
pub fn show_info(app_context: &AppContext) {
    let suppress = app_context
        .state()
        .config
        .get_bool("suppress_header")
        .unwrap_or(false);
    if !suppress {
        let ui = app_context.ui();
        ui.print_lines(banner_lines(env!("CARGO_PKG_VERSION"), ui.colored()));
    }
}

/// `print [text]`
pub fn print(app_context: &AppContext, args: Option<&str>) {
    app_context.ui().println(args.unwrap_or_default());
}
