// Store and stream constants (no magic values)

/// Page size requested by a partition's initial fetch
pub const DEFAULT_LIMIT: u32 = 200;

/// Offset requested by a partition's initial fetch
pub const DEFAULT_OFFSET: u32 = 0;

/// Rows per page in a view
pub const DEFAULT_PAGE_SIZE: usize = 10;

/// Error shown on every partition when the push stream fails
pub const BACKEND_UNREACHABLE: &str = "Backend unreachable.";

/// Cache key segment for queries without a tool filter
pub const ALL_TOOLS_KEY: &str = "all";

/// First reconnect delay for the push stream (1s)
pub const DEFAULT_RECONNECT_BASE_DELAY_MS: u64 = 1000;

/// Upper bound for a single reconnect delay (30s)
pub const DEFAULT_RECONNECT_MAX_DELAY_MS: u64 = 30_000;

/// Exponential growth per failed attempt
pub const DEFAULT_RECONNECT_BACKOFF_FACTOR: f64 = 2.0;

/// Consecutive failed reconnects before the stream gives up
pub const DEFAULT_RECONNECT_MAX_ATTEMPTS: u32 = 10;
