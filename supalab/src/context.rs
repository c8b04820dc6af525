use secrecy::{ExposeSecret, SecretString};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use supalab_core::beep::BeepRegistry;
use supalab_core::realtime::{RealtimeClient, RealtimeConfig, RealtimeError};
use supalab_core::SupabaseClient;
use tokio::sync::Mutex as AsyncMutex;

use crate::state::SessionState;
use crate::tasks::TaskRegistry;
use crate::utils::ui::Ui;

/// Connections to one Supabase project. The realtime socket is opened on
/// first use.
pub struct Backend {
    client: SupabaseClient,
    /// Opened by the first realtime command
    realtime: AsyncMutex<Option<RealtimeClient>>,
    realtime_config: RealtimeConfig,
}

impl Backend {
    pub fn new(client: SupabaseClient, realtime_config: RealtimeConfig) -> Self {
        Self {
            client,
            realtime: AsyncMutex::new(None),
            realtime_config,
        }
    }

    /// REST clients for auth and edge functions.
    pub fn client(&self) -> &SupabaseClient {
        &self.client
    }

    /// The realtime connection, opening it if needed. `token` is used for
    /// joins made from now on.
    pub async fn realtime(
        &self,
        token: Option<SecretString>,
    ) -> Result<RealtimeClient, RealtimeError> {
        let mut slot = self.realtime.lock().await;
        let client = match slot.as_ref() {
            Some(client) if client.is_connected() => client.clone(),
            _ => {
                let client = RealtimeClient::connect(
                    self.client.url(),
                    self.client.api_key(),
                    self.realtime_config.clone(),
                )
                .await?;
                *slot = Some(client.clone());
                client
            }
        };
        client.set_access_token(token);
        Ok(client)
    }

    /// The realtime connection if one is open.
    pub async fn current_realtime(&self) -> Option<RealtimeClient> {
        self.realtime
            .lock()
            .await
            .as_ref()
            .filter(|c| c.is_connected())
            .cloned()
    }

    /// Leave all channels and drop the connection.
    pub async fn close_realtime(&self) {
        if let Some(client) = self.realtime.lock().await.take() {
            client.close().await;
        }
    }
}

/// Shared handles every command works with. Cloning is cheap; background
/// tasks get their own clone.
#[derive(Clone)]
pub struct AppContext {
    ui: Arc<Ui>,
    state: Arc<RwLock<SessionState>>,
    /// Set by `connect`; commands needing the project fail without it
    backend: Arc<RwLock<Option<Arc<Backend>>>>,
    beeps: BeepRegistry,
    tasks: TaskRegistry,
    /// Names of the threads the REPL started itself
    threads: Arc<Mutex<Vec<String>>>,
}

impl AppContext {
    pub fn new(ui: Arc<Ui>, state: SessionState) -> Self {
        AppContext {
            ui,
            state: Arc::new(RwLock::new(state)),
            backend: Arc::new(RwLock::new(None)),
            beeps: BeepRegistry::new(),
            tasks: TaskRegistry::new(),
            threads: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Where all command output goes.
    pub fn ui(&self) -> &Arc<Ui> {
        &self.ui
    }

    /// Read access to the session. Do not hold across an `.await`.
    pub fn state(&self) -> RwLockReadGuard<'_, SessionState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Write access to the session. Do not hold across an `.await`.
    pub fn state_mut(&self) -> RwLockWriteGuard<'_, SessionState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    /// The project connection, `None` until `connect` succeeded.
    pub fn backend(&self) -> Option<Arc<Backend>> {
        self.backend
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Replace the project connection.
    pub fn set_backend(&self, backend: Option<Backend>) {
        *self.backend.write().unwrap_or_else(|e| e.into_inner()) = backend.map(Arc::new);
    }

    /// Running `dev beep` timers.
    pub fn beeps(&self) -> &BeepRegistry {
        &self.beeps
    }

    /// Named background tasks, listed by `debug tasks`.
    pub fn tasks(&self) -> &TaskRegistry {
        &self.tasks
    }

    /// Remember a thread started for the REPL so `debug threads` can list
    /// it.
    pub fn register_thread(&self, name: impl Into<String>) {
        self.threads
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(name.into());
    }

    pub fn threads(&self) -> Vec<String> {
        self.threads
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Prompt for the next line.
    pub fn prompt(&self) -> String {
        self.state().prompt().to_string()
    }

    pub fn verbose(&self) -> bool {
        self.state().verbose()
    }

    pub fn is_running(&self) -> bool {
        self.state().running
    }

    /// True from a successful sign-in until logout or a failed session check.
    pub fn is_authenticated(&self) -> bool {
        self.state().authenticated
    }

    /// The access token of the signed-in user. `None` once the session has
    /// ended, even if a token is still stored.
    pub fn jwt(&self) -> Option<SecretString> {
        let state = self.state();
        if !state.authenticated {
            return None;
        }
        state
            .jwt
            .as_ref()
            .map(|jwt| SecretString::from(jwt.expose_secret().to_owned()))
    }

    /// Print `<context>: <error>`, and the whole error chain when verbose.
    pub fn handle_error(&self, context: &str, err: &anyhow::Error, force_verbose: bool) {
        self.ui.println(format!("{context}: {err}"));
        if force_verbose || self.verbose() {
            self.ui.println(format!("{err:?}"));
        }
    }
}
