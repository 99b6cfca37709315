/// Maximum number of cache entries retained per subject.
pub const DEFAULT_CACHE_CAPACITY: usize = 150;

/// Interval between batched last-seen broadcasts, in milliseconds.
pub const DEFAULT_LAST_SEEN_INTERVAL_MS: u64 = 500;

/// Prefix marking an outgoing message as an action (`/me waves`).
pub const ACTION_PREFIX: &str = "/me ";

/// Default IRC-over-TLS port.
pub const DEFAULT_IRC_PORT: u16 = 6697;

/// Category log for every message that mentioned the operator.
pub const CATEGORY_MENTIONS: &str = "mentions";

/// Prefix of the per-friend activity category logs.
pub const CATEGORY_FRIEND_PREFIX: &str = "friend-";

/// Environment variable naming the configuration file path.
pub const CONFIG_PATH_ENV: &str = "VERANDA_CONFIG";
