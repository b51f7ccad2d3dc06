use tokio::time::Duration;
use war_api::prelude::*;

pub const API_URL: &str = "https://api.memewar.fun";
pub const SOCKET_URL: &str = "https://api.memewar.fun";
pub const RPC_URL: &str = "https://api.devnet.solana.com";

pub const POLL_INTERVAL_MS: u64 = 5_000;
pub const REFETCH_DELAY_MS: u64 = 2_000;
pub const CONFIRM_TIMEOUT_MS: u64 = 60_000;
pub const CONFIRM_POLL_MS: u64 = 2_000;
pub const NOTICE_MS: u64 = 6_000;

#[derive(Clone, Debug, PartialEq)]
pub struct ClientConfig {
    pub api_url: String,
    pub socket_url: String,
    pub rpc_url: String,
    /// How often the baseline is re-fetched.
    pub poll_interval: Duration,
    pub trade_highlight: Duration,
    pub chat_highlight: Duration,
    /// Delay between submitting a transaction and re-fetching the war.
    pub refetch_delay: Duration,
    /// After this a tracked transaction stops counting as pending.
    pub confirm_timeout: Duration,
    pub confirm_poll: Duration,
    /// How long a notice stays visible.
    pub notice_ttl: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: API_URL.to_string(),
            socket_url: SOCKET_URL.to_string(),
            rpc_url: RPC_URL.to_string(),
            poll_interval: Duration::from_millis(POLL_INTERVAL_MS),
            trade_highlight: Duration::from_millis(TRADE_HIGHLIGHT_MS),
            chat_highlight: Duration::from_millis(CHAT_HIGHLIGHT_MS),
            refetch_delay: Duration::from_millis(REFETCH_DELAY_MS),
            confirm_timeout: Duration::from_millis(CONFIRM_TIMEOUT_MS),
            confirm_poll: Duration::from_millis(CONFIRM_POLL_MS),
            notice_ttl: Duration::from_millis(NOTICE_MS),
        }
    }
}

impl ClientConfig {
    /// Defaults overridden by `MEMEWAR_API_URL`, `MEMEWAR_SOCKET_URL`, `RPC`
    /// and `MEMEWAR_POLL_MS`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        let lookup = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(url) = lookup("MEMEWAR_API_URL") {
            // The socket lives on the api host unless told otherwise.
            config.socket_url = url.clone();
            config.api_url = url;
        }
        if let Some(url) = lookup("MEMEWAR_SOCKET_URL") {
            config.socket_url = url;
        }
        if let Some(url) = lookup("RPC") {
            config.rpc_url = url;
        }
        if let Some(raw) = lookup("MEMEWAR_POLL_MS") {
            match raw.parse::<u64>() {
                Ok(ms) if ms > 0 => config.poll_interval = Duration::from_millis(ms),
                _ => tracing::warn!("Ignoring invalid MEMEWAR_POLL_MS {:?}", raw),
            }
        }
        config
    }
}
