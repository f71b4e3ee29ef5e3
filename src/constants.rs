//! Global constants: table names, schema field names, rate-control defaults,
//! placeholder vocabulary and timestamp formats.

/// Binary name used in logs and metadata
pub const BINARY_NAME: &str = "profilesync";

/// Package version from Cargo.toml (set at compile time)
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================================================
// Store Table Names
// ============================================================================

/// Main profile table, head row = most recently reconciled profile
pub const PROFILES_TABLE: &str = "ProfilesData";

/// Seen-count table, one row per identity key
pub const NICK_LIST_TABLE: &str = "NickList";

/// Run metrics table, one row per metric name (last write wins)
pub const DASHBOARD_TABLE: &str = "Dashboard";

/// Timing records, newest first
pub const TIMING_LOG_TABLE: &str = "TimingLog";

/// NickList column headers
pub const NICK_LIST_HEADERS: [&str; 4] = ["Nick Name", "Times Seen", "First Seen", "Last Seen"];

/// TimingLog column headers
pub const TIMING_LOG_HEADERS: [&str; 4] = ["Nickname", "Timestamp", "Source", "Run Number"];

// ============================================================================
// Schema Field Names
// ============================================================================

pub const FIELD_IMAGE: &str = "IMAGE";
pub const FIELD_NICK: &str = "NICK NAME";
pub const FIELD_TAGS: &str = "TAGS";
pub const FIELD_LAST_POST: &str = "LAST POST";
pub const FIELD_LAST_POST_TIME: &str = "LAST POST TIME";
pub const FIELD_FRIEND: &str = "FRIEND";
pub const FIELD_CITY: &str = "CITY";
pub const FIELD_GENDER: &str = "GENDER";
pub const FIELD_MARRIED: &str = "MARRIED";
pub const FIELD_AGE: &str = "AGE";
pub const FIELD_JOINED: &str = "JOINED";
pub const FIELD_FOLLOWERS: &str = "FOLLOWERS";
pub const FIELD_STATUS: &str = "STATUS";
pub const FIELD_POSTS: &str = "POSTS";
pub const FIELD_PROFILE_LINK: &str = "PROFILE LINK";
pub const FIELD_INTRO: &str = "INTRO";
pub const FIELD_SOURCE: &str = "SOURCE";
pub const FIELD_CAPTURED_AT: &str = "DATETIME SCRAP";

// ============================================================================
// Normalization Constants
// ============================================================================

/// Literal "no value" markers emitted by upstream scrapers, compared
/// case-insensitively and treated as equivalent to the empty string.
/// Without this, every site state change manufactures spurious diffs.
pub const EMPTY_PLACEHOLDERS: [&str; 7] = ["not set", "n/a", "na", "none", "null", "-", "nil"];

/// Minimum identity length accepted from a record source
pub const MIN_IDENTITY_LEN: usize = 3;

// ============================================================================
// Rate Control Constants
// ============================================================================

/// Default lower pacing bound between store mutations (seconds)
pub const BASE_MIN_DELAY_SECS: f64 = 1.0;

/// Default upper pacing bound between store mutations (seconds)
pub const BASE_MAX_DELAY_SECS: f64 = 2.0;

/// Hard ceiling for the lower pacing bound (seconds)
pub const MIN_DELAY_CEILING_SECS: f64 = 3.0;

/// Hard ceiling for the upper pacing bound (seconds)
pub const MAX_DELAY_CEILING_SECS: f64 = 6.0;

/// Per-penalty backoff growth applied on a quota hit
pub const PENALTY_GROWTH_STEP: f64 = 0.2;

/// Maximum cumulative backoff growth factor above base
pub const PENALTY_GROWTH_CAP: f64 = 1.0;

/// Shrink factor applied to both bounds on an idle-gated success
pub const SUCCESS_DECAY: f64 = 0.95;

/// Minimum idle time before a success is allowed to shrink the bounds
pub const SUCCESS_DECAY_IDLE_SECS: u64 = 10;

/// Proactive widening applied at every batch boundary
pub const BATCH_BOUNDARY_GROWTH: f64 = 1.10;

/// Default number of records between proactive slowdowns
pub const DEFAULT_BATCH_SIZE_HINT: usize = 10;

/// Successful calls required before the one-shot batch tuning fires
pub const TUNE_SAMPLE_SIZE: usize = 10;

/// Batch-size growth applied by the one-shot tuning (percent)
pub const TUNE_BATCH_GROWTH_PCT: usize = 20;

/// Bound relaxation applied by the one-shot tuning
pub const TUNE_RELAX: f64 = 0.90;

// ============================================================================
// Time Constants
// ============================================================================

/// Capture timestamps are recorded in PKT (UTC+5)
pub const PKT_UTC_OFFSET_SECS: i32 = 5 * 3600;

/// Capture timestamp format, e.g. "07-Mar-25 04:12 PM"
pub const CAPTURE_TIME_FORMAT: &str = "%d-%b-%y %I:%M %p";

/// Current wall clock in PKT
pub fn pkt_now() -> chrono::DateTime<chrono::FixedOffset> {
    let offset = chrono::FixedOffset::east_opt(PKT_UTC_OFFSET_SECS).expect("valid fixed offset");
    chrono::Utc::now().with_timezone(&offset)
}

/// Current wall clock formatted for the capture-timestamp field
pub fn capture_timestamp() -> String {
    pkt_now().format(CAPTURE_TIME_FORMAT).to_string()
}
