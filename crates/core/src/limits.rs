//! Size and shape limits for tracked events.
//!
//! The `#[validate]` derive macro requires literal values in attributes,
//! so field limits are duplicated there; the classify and track tests pin
//! the two together.

/// Maximum request body size for a single tracked event (64KB).
pub const MAX_EVENT_SIZE_BYTES: usize = 64 * 1024;

/// Maximum serialized `metadata` size (16KB).
pub const MAX_METADATA_BYTES: usize = 16 * 1024;

/// Capacity of every bounded recency list on a customer profile.
pub const RECENCY_LIST_CAPACITY: usize = 10;

/// Identifier fields (productId, checkoutId, formId, visitorId).
pub const MAX_ID_LEN: usize = 256;

/// Session correlation token.
pub const MAX_SESSION_ID_LEN: usize = 128;

/// URLs and referrers. Matches the HTTP Referer header limit.
pub const MAX_URL_LEN: usize = 2048;

/// Page titles and free-text labels.
pub const MAX_TEXT_LEN: usize = 1000;

/// User agent string stored on events.
pub const MAX_USER_AGENT_LEN: usize = 512;

/// Search query strings.
pub const MAX_QUERY_LEN: usize = 500;

/// Default number of rows returned by product reports.
pub const DEFAULT_REPORT_LIMIT: usize = 10;

/// Default number of rows returned by detailed page duration reports.
pub const DEFAULT_DETAIL_LIMIT: usize = 50;

/// Default window for time-based analytics, in days.
pub const DEFAULT_TIME_WINDOW_DAYS: i64 = 7;

/// Upper bound for any caller-supplied limit.
pub const MAX_QUERY_LIMIT: usize = 1000;
