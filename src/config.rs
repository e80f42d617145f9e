use popin_core::api::{DEFAULT_BASE_URL, DEFAULT_DEVICE};

/// Environment variable that overrides [`ClientConfig::base_url`].
pub const BASE_URL_ENV: &str = "POPIN_BASE_URL";

#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// API root, e.g. `https://dev.popin.to/api/v1`.
    pub base_url: String,
    pub sandbox_mode: bool,
    /// Device tag sent at registration.
    pub device: String,
    pub user_agent: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            sandbox_mode: false,
            device: DEFAULT_DEVICE.to_string(),
            user_agent: None,
        }
    }
}

impl ClientConfig {
    /// Defaults, with `POPIN_BASE_URL` applied when set and non-empty.
    pub fn from_env() -> Self {
        let config = Self::default();
        match std::env::var(BASE_URL_ENV) {
            Ok(url) if !url.trim().is_empty() => config.with_base_url(url.trim()),
            _ => config,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_sandbox_mode(mut self, sandbox_mode: bool) -> Self {
        self.sandbox_mode = sandbox_mode;
        self
    }

    pub fn with_device(mut self, device: impl Into<String>) -> Self {
        self.device = device.into();
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }
}
