//! Client configuration.

use std::str::FromStr;
use std::time::Duration;

use ethers::types::Address;
use serde::{Deserialize, Serialize};

use crate::constants::*;
use crate::error::{Result, YellowError};
use crate::types::session::Allowance;

/// Automatic reconnection settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconnectConfig {
    /// Whether to reconnect after an unexpected drop
    pub enabled: bool,
    /// Attempts before giving up
    pub max_attempts: u32,
    /// Delay before the first attempt; doubles on each subsequent attempt
    pub initial_delay_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: DEFAULT_RECONNECT_ATTEMPTS,
            initial_delay_ms: DEFAULT_RECONNECT_DELAY_MS,
        }
    }
}

impl ReconnectConfig {
    /// Delay before reconnect `attempt` (1-based): `initial · 2^(attempt − 1)`.
    ///
    /// Saturates instead of overflowing for very large attempt numbers.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(63);
        let factor = 1u64 << exponent;
        Duration::from_millis(self.initial_delay_ms.saturating_mul(factor))
    }
}

/// Yellow ClearNode client configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct YellowConfig {
    /// WebSocket URL for the ClearNode
    pub ws_url: String,
    /// Ethereum RPC URL
    pub rpc_url: String,
    /// Chain ID of the custody deployment
    pub chain_id: u64,
    /// Custody contract address
    pub custody_address: String,
    /// Adjudicator contract address
    pub adjudicator_address: String,
    /// ClearNode broker address (counterparty in every channel)
    pub broker_address: String,
    /// Challenge duration in seconds
    pub challenge_duration: u64,
    /// Application name presented during authentication
    pub application: String,
    /// Application scope presented during authentication
    pub scope: String,
    /// Session key lifetime in seconds
    pub session_ttl_secs: u64,
    /// Allowances requested for the session key
    pub allowances: Vec<Allowance>,
    /// Default correlated request timeout
    pub request_timeout_ms: u64,
    /// Socket open timeout
    pub connect_timeout_ms: u64,
    /// Reconnection policy
    pub reconnect: ReconnectConfig,
    /// Chains accepted for channels and intents
    pub supported_chains: Vec<u64>,
}

impl Default for YellowConfig {
    fn default() -> Self {
        Self {
            ws_url: "wss://clearnet-sandbox.yellow.com/ws".into(),
            rpc_url: "https://1rpc.io/sepolia".into(),
            chain_id: 11155111, // Sepolia
            custody_address: "0x019B65A265EB3363822f2752141b3dF16131b262".into(),
            adjudicator_address: "0x7c7ccbc98469190849BCC6c926307794fDfB11F2".into(),
            broker_address: "0x0000000000000000000000000000000000000000".into(),
            challenge_duration: DEFAULT_CHALLENGE_DURATION,
            application: "yellow-intents".into(),
            scope: "yellow.intents".into(),
            session_ttl_secs: DEFAULT_SESSION_TTL_SECS,
            allowances: vec![Allowance {
                asset: "usdc".into(),
                amount: "1000000000".into(),
            }],
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            reconnect: ReconnectConfig::default(),
            supported_chains: DEFAULT_SUPPORTED_CHAINS.to_vec(),
        }
    }
}

impl YellowConfig {
    /// Creates config for Sepolia testnet.
    pub fn sepolia() -> Self {
        Self::default()
    }

    /// Creates config for Arbitrum One against the production ClearNode.
    pub fn arbitrum() -> Self {
        Self {
            ws_url: "wss://clearnet.yellow.com/ws".into(),
            rpc_url: "https://arb1.arbitrum.io/rpc".into(),
            chain_id: 42161,
            challenge_duration: 86400, // 24 hours for mainnet
            ..Self::default()
        }
    }

    /// Loads configuration from the environment.
    ///
    /// Reads a `.env` file if present, then overlays `YELLOW_*` variables on
    /// top of the defaults. Unparseable numeric values are rejected.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        Self::default().overlay(|key| std::env::var(key).ok())
    }

    /// Overlays values looked up by `get` (keyed by `YELLOW_*` names).
    pub fn overlay(mut self, get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        fn parse<T: FromStr>(key: &str, raw: String) -> Result<T> {
            raw.trim()
                .parse()
                .map_err(|_| YellowError::ConfigError(format!("{key} is not a valid number: {raw}")))
        }

        if let Some(v) = get("YELLOW_WS_URL") {
            self.ws_url = v;
        }
        if let Some(v) = get("YELLOW_RPC_URL") {
            self.rpc_url = v;
        }
        if let Some(v) = get("YELLOW_CHAIN_ID") {
            self.chain_id = parse("YELLOW_CHAIN_ID", v)?;
        }
        if let Some(v) = get("YELLOW_CUSTODY_ADDRESS") {
            self.custody_address = v;
        }
        if let Some(v) = get("YELLOW_ADJUDICATOR_ADDRESS") {
            self.adjudicator_address = v;
        }
        if let Some(v) = get("YELLOW_BROKER_ADDRESS") {
            self.broker_address = v;
        }
        if let Some(v) = get("YELLOW_APPLICATION") {
            self.application = v;
        }
        if let Some(v) = get("YELLOW_REQUEST_TIMEOUT_MS") {
            self.request_timeout_ms = parse("YELLOW_REQUEST_TIMEOUT_MS", v)?;
        }
        if let Some(v) = get("YELLOW_RECONNECT_ATTEMPTS") {
            self.reconnect.max_attempts = parse("YELLOW_RECONNECT_ATTEMPTS", v)?;
        }
        if let Some(v) = get("YELLOW_RECONNECT_DELAY_MS") {
            self.reconnect.initial_delay_ms = parse("YELLOW_RECONNECT_DELAY_MS", v)?;
        }
        if let Some(v) = get("YELLOW_RECONNECT") {
            self.reconnect.enabled = v != "false" && v != "0";
        }
        Ok(self)
    }

    /// Checks that the configuration is coherent.
    pub fn validate(&self) -> Result<()> {
        let ws = url::Url::parse(&self.ws_url)
            .map_err(|e| YellowError::ConfigError(format!("invalid ws_url '{}': {e}", self.ws_url)))?;
        if !matches!(ws.scheme(), "ws" | "wss") {
            return Err(YellowError::ConfigError(format!(
                "ws_url must use ws:// or wss://, got {}",
                ws.scheme()
            )));
        }

        let rpc = url::Url::parse(&self.rpc_url)
            .map_err(|e| YellowError::ConfigError(format!("invalid rpc_url '{}': {e}", self.rpc_url)))?;
        if !matches!(rpc.scheme(), "http" | "https" | "ws" | "wss") {
            return Err(YellowError::ConfigError(format!(
                "rpc_url has unsupported scheme {}",
                rpc.scheme()
            )));
        }

        if self.chain_id == 0 {
            return Err(YellowError::ConfigError("chain_id must be positive".into()));
        }

        let custody = self.custody()?;
        if custody.is_zero() {
            return Err(YellowError::ConfigError("custody_address must not be zero".into()));
        }
        let adjudicator = self.adjudicator()?;
        if adjudicator.is_zero() {
            return Err(YellowError::ConfigError("adjudicator_address must not be zero".into()));
        }
        parse_address("broker_address", &self.broker_address)?;

        if self.reconnect.enabled && self.reconnect.initial_delay_ms == 0 {
            return Err(YellowError::ConfigError(
                "reconnect.initial_delay_ms must be positive when reconnect is enabled".into(),
            ));
        }
        if self.request_timeout_ms == 0 {
            return Err(YellowError::ConfigError("request_timeout_ms must be positive".into()));
        }
        if self.session_ttl_secs == 0 {
            return Err(YellowError::ConfigError("session_ttl_secs must be positive".into()));
        }
        Ok(())
    }

    /// Parsed custody contract address.
    pub fn custody(&self) -> Result<Address> {
        parse_address("custody_address", &self.custody_address)
    }

    /// Parsed adjudicator contract address.
    pub fn adjudicator(&self) -> Result<Address> {
        parse_address("adjudicator_address", &self.adjudicator_address)
    }

    /// Parsed broker address.
    pub fn broker(&self) -> Result<Address> {
        parse_address("broker_address", &self.broker_address)
    }

    /// Default correlated request timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Socket open timeout.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Returns true if `chain_id` is accepted.
    pub fn supports_chain(&self, chain_id: u64) -> bool {
        self.supported_chains.contains(&chain_id)
    }
}

fn parse_address(field: &str, value: &str) -> Result<Address> {
    Address::from_str(value.trim())
        .map_err(|e| YellowError::ConfigError(format!("invalid {field} '{value}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_config_default() {
        let config = YellowConfig::default();
        assert!(config.ws_url.contains("sandbox"));
        assert_eq!(config.chain_id, 11155111);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_arbitrum_preset() {
        let config = YellowConfig::arbitrum();
        assert_eq!(config.chain_id, 42161);
        assert!(config.supports_chain(42161));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_scheme() {
        let config = YellowConfig {
            ws_url: "https://clearnet.yellow.com".into(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(YellowError::ConfigError(_))));
    }

    #[test]
    fn test_validate_rejects_bad_address() {
        let config = YellowConfig {
            custody_address: "0x1234".into(),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = YellowConfig {
            adjudicator_address: "0x0000000000000000000000000000000000000000".into(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_chain() {
        let config = YellowConfig {
            chain_id: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_overlay() {
        let env: HashMap<&str, &str> = [
            ("YELLOW_WS_URL", "ws://localhost:9000"),
            ("YELLOW_CHAIN_ID", "42161"),
            ("YELLOW_RECONNECT", "false"),
        ]
        .into_iter()
        .collect();

        let config = YellowConfig::default()
            .overlay(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.ws_url, "ws://localhost:9000");
        assert_eq!(config.chain_id, 42161);
        assert!(!config.reconnect.enabled);
    }

    #[test]
    fn test_overlay_rejects_garbage_number() {
        let result = YellowConfig::default().overlay(|k| {
            (k == "YELLOW_CHAIN_ID").then(|| "arbitrum".to_string())
        });
        assert!(matches!(result, Err(YellowError::ConfigError(_))));
    }

    #[test]
    fn test_backoff_schedule() {
        let reconnect = ReconnectConfig {
            enabled: true,
            max_attempts: 5,
            initial_delay_ms: 250,
        };
        assert_eq!(reconnect.delay_for_attempt(1), Duration::from_millis(250));
        assert_eq!(reconnect.delay_for_attempt(2), Duration::from_millis(500));
        assert_eq!(reconnect.delay_for_attempt(4), Duration::from_millis(2000));
    }

    proptest::proptest! {
        #[test]
        fn prop_backoff_strictly_increasing(initial in 1u64..10_000, k in 1u32..40) {
            let reconnect = ReconnectConfig { enabled: true, max_attempts: 50, initial_delay_ms: initial };
            let current = reconnect.delay_for_attempt(k);
            let next = reconnect.delay_for_attempt(k + 1);
            proptest::prop_assert!(current >= Duration::from_millis(initial));
            proptest::prop_assert!(next > current);
            proptest::prop_assert_eq!(current, Duration::from_millis(initial * (1u64 << (k - 1))));
        }
    }
}
