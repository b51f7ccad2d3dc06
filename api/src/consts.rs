/// The shared socket room every war's events are broadcast on.
pub const GAME_ROOM: &str = "game";

/// Inbound socket event carrying a trade.
pub const GAME_UPDATE_EVENT: &str = "gameUpdate";

/// Inbound socket event carrying a chat message.
pub const CHAT_UPDATE_EVENT: &str = "chatUpdate";

/// Outbound control event joining a room.
pub const SUBSCRIBE_EVENT: &str = "subscribeToGame";

/// Outbound control event leaving a room.
pub const UNSUBSCRIBE_EVENT: &str = "unsubscribeFromGame";

/// How long a freshly merged deposit stays highlighted.
pub const TRADE_HIGHLIGHT_MS: u64 = 3_500;

/// How long a freshly merged chat message stays highlighted.
pub const CHAT_HIGHLIGHT_MS: u64 = 2_000;

/// Wallet placeholder for events that arrive without one.
pub const UNKNOWN_WALLET: &str = "unknown";

/// Storage key of the chat authentication token.
pub const AUTH_TOKEN_KEY: &str = "memewar.authToken";

/// Seed of the war state PDA.
pub const WAR: &[u8] = b"war";

/// Seed of the per-user state PDA.
pub const USER_STATE: &[u8] = b"user_state";

/// Number of competing sides in a war.
pub const SIDES: usize = 2;
