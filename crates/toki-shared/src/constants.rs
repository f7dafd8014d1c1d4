/// REST base URL used when nothing is configured
pub const DEFAULT_API_URL: &str = "http://localhost:4500/api";

/// Event channel endpoint used when nothing is configured
pub const DEFAULT_SOCKET_URL: &str = "http://localhost:4500";

/// REST request timeout in seconds
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 15;

/// Capacity of the engine's inbound message queue
pub const DEFAULT_EVENT_BUFFER: usize = 256;

/// Peer search needs at least this many characters
pub const MIN_SEARCH_LEN: usize = 2;

/// Registry status text after a failed refresh
pub const CONVERSATIONS_LOAD_FAILED: &str = "Failed to load conversations";
