//! Protocol constants for the Yellow ClearNode client.

// ═══════════════════════════════════════════════════════════════════════════════
// RELAY METHODS
// ═══════════════════════════════════════════════════════════════════════════════

/// Opens the authentication handshake.
pub const METHOD_AUTH_REQUEST: &str = "auth_request";

/// Relay reply carrying the challenge to sign.
pub const METHOD_AUTH_CHALLENGE: &str = "auth_challenge";

/// Completes the authentication handshake.
pub const METHOD_AUTH_VERIFY: &str = "auth_verify";

/// Negotiates a new channel.
pub const METHOD_CREATE_CHANNEL: &str = "create_channel";

/// Negotiates a channel allocation change.
pub const METHOD_RESIZE_CHANNEL: &str = "resize_channel";

/// Negotiates a cooperative close.
pub const METHOD_CLOSE_CHANNEL: &str = "close_channel";

/// Off-chain transfer between ledger accounts.
pub const METHOD_TRANSFER: &str = "transfer";

/// Submits a cross-chain intent for solver matching.
pub const METHOD_SUBMIT_INTENT: &str = "submit_intent";

/// Queries the caller's channels and ledger balances.
pub const METHOD_GET_LEDGER_BALANCES: &str = "get_ledger_balances";

// ═══════════════════════════════════════════════════════════════════════════════
// EIP-712 AUTH DOMAIN
// ═══════════════════════════════════════════════════════════════════════════════

/// EIP-712 domain name used to sign the auth challenge.
pub const AUTH_DOMAIN_NAME: &str = "Yellow ClearNode";

/// EIP-712 domain version used to sign the auth challenge.
pub const AUTH_DOMAIN_VERSION: &str = "1";

/// EIP-712 primary type of the auth challenge.
pub const AUTH_PRIMARY_TYPE: &str = "AuthChallenge";

// ═══════════════════════════════════════════════════════════════════════════════
// STATE INTENTS
// ═══════════════════════════════════════════════════════════════════════════════

/// State intent of a freshly created channel.
pub const INTENT_INITIALIZE: &str = "INITIALIZE";

/// State intent of an ordinary off-chain update.
pub const INTENT_OPERATE: &str = "OPERATE";

/// State intent of an allocation change.
pub const INTENT_RESIZE: &str = "RESIZE";

/// State intent of a closing state.
pub const INTENT_FINALIZE: &str = "FINALIZE";

// ═══════════════════════════════════════════════════════════════════════════════
// DEFAULTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Default correlated request timeout.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;

/// Default socket open timeout.
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;

/// Default reconnect attempts before giving up.
pub const DEFAULT_RECONNECT_ATTEMPTS: u32 = 5;

/// Default delay before the first reconnect attempt.
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 1_000;

/// Default lifetime of an ephemeral session key.
pub const DEFAULT_SESSION_TTL_SECS: u64 = 3_600;

/// Default dispute window in seconds.
pub const DEFAULT_CHALLENGE_DURATION: u64 = 3_600;

/// Estimated solver fill time used when a quote omits it.
pub const DEFAULT_QUOTE_ESTIMATED_TIME_SECS: u64 = 60;

/// Largest integer a JSON consumer can hold without precision loss (2^53 − 1).
pub const MAX_SAFE_INTEGER: u64 = 9_007_199_254_740_991;

/// Chains the client supports out of the box (Ethereum, Sepolia, Polygon, Base, Arbitrum, Optimism).
pub const DEFAULT_SUPPORTED_CHAINS: &[u64] = &[1, 11_155_111, 137, 8453, 42_161, 10];
