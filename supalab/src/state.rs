use secrecy::SecretString;
use supalab_core::auth::AuthSession;
use supalab_core::config::ConfigMap;
use supalab_core::DEFAULT_URL;

pub const DEFAULT_AUTH_PROMPT: &str = "> ";
pub const DEFAULT_SESSION_PROMPT: &str = ">> ";

/// Everything the REPL knows about the current session.
#[derive(Debug)]
pub struct SessionState {
    pub url: String,
    pub api_key: Option<String>,
    pub jwt: Option<SecretString>,
    /// Last successful sign-in response
    pub auth_session: Option<AuthSession>,
    pub authenticated: bool,
    pub running: bool,
    pub config: ConfigMap,
    pub auth_prompt: String,
    pub session_prompt: String,
    pub verbose: bool,
}

impl SessionState {
    pub fn new(config: ConfigMap, verbose: bool) -> Self {
        let auth_prompt = config
            .get_text("auth_prompt")
            .unwrap_or(DEFAULT_AUTH_PROMPT)
            .to_string();
        let session_prompt = config
            .get_text("session_prompt")
            .unwrap_or(DEFAULT_SESSION_PROMPT)
            .to_string();
        Self {
            url: DEFAULT_URL.to_string(),
            api_key: None,
            jwt: None,
            auth_session: None,
            authenticated: false,
            running: true,
            config,
            auth_prompt,
            session_prompt,
            verbose,
        }
    }

    /// The prompt for the next line: the session prompt once logged in.
    pub fn prompt(&self) -> &str {
        if self.authenticated {
            &self.session_prompt
        } else {
            &self.auth_prompt
        }
    }

    /// The `verbose` config key wins over the command line flag.
    pub fn verbose(&self) -> bool {
        self.config.get_bool("verbose").unwrap_or(self.verbose)
    }

    pub fn config_text(&self, key: &str) -> Option<&str> {
        self.config.get_text(key)
    }

    /// Forget everything tied to the signed-in user.
    pub fn clear_auth(&mut self) {
        self.jwt = None;
        self.auth_session = None;
        self.authenticated = false;
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new(ConfigMap::new(), false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_follows_authentication() {
        let mut state = SessionState::default();
        assert_eq!(state.prompt(), "> ");
        state.authenticated = true;
        assert_eq!(state.prompt(), ">> ");
        state.clear_auth();
        assert_eq!(state.prompt(), "> ");
    }

    #[test]
    fn test_custom_prompts_and_verbose_override() {
        let mut config = ConfigMap::new();
        config.insert("auth_prompt", "lab> ");
        config.insert("verbose", false);
        let state = SessionState::new(config, true);
        assert_eq!(state.prompt(), "lab> ");
        assert!(!state.verbose());
        assert_eq!(state.url, DEFAULT_URL);
    }
}
