//! Centralized default constants for prd.
//!
//! All crates reference these constants instead of defining their own
//! magic numbers.

// =============================================================================
// RETRY POLICY
// =============================================================================

/// Attempts allowed for transient failures (408, 5xx, network) before re-raising.
pub const N_RETRIES: u32 = 3;

/// Hard ceiling on a single rate-limit (429) backoff wait.
pub const RATE_LIMIT_CEILING_SECS: u64 = 60;

/// Ceiling on a single transient-failure backoff wait.
pub const TRANSIENT_CEILING_SECS: u64 = 30;

/// Base delay for exponential backoff.
pub const BACKOFF_BASE_MS: u64 = 500;

/// Lower bound of the multiplier applied to a `Retry-After` value.
pub const RETRY_AFTER_JITTER_MIN: f64 = 0.5;

/// Upper bound of the multiplier applied to a `Retry-After` value.
pub const RETRY_AFTER_JITTER_MAX: f64 = 5.0;

// =============================================================================
// REMOTE API
// =============================================================================

/// Maximum number of remote requests in flight during bulk pull/push.
pub const MAX_IN_FLIGHT: usize = 5;

/// Page size requested from list endpoints.
pub const PAGE_SIZE: usize = 100;

/// Per-request timeout in seconds.
pub const REQUEST_TIMEOUT_SECS: u64 = 60;

// =============================================================================
// LOCAL LAYOUT
// =============================================================================

/// Project configuration file at the repository root.
pub const CONFIG_FILE: &str = "prd_config.yaml";

/// Cross-environment mapping file inside an organization directory.
pub const MAPPING_FILE: &str = "mapping.yaml";

/// Organization object file inside an organization directory.
pub const ORGANIZATION_FILE: &str = "organization.json";

/// Directory holding schema formula sidecars, next to `schema.json`.
pub const FORMULA_DIR: &str = "formula";

/// Name of the implicit subdirectory when none is configured.
pub const DEFAULT_SUBDIR: &str = "default";
