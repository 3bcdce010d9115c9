// =============================================================================
// Linkup Backend Constants
// =============================================================================
// This file contains all constants used throughout the backend to enable
// easy tuning and configuration from a single location.

use std::time::Duration;

// =============================================================================
// MATCHING / SESSION LIFECYCLE
// =============================================================================

/// How long an unmatched connection request stays alive before it is
/// auto-cancelled and the user is told no match was found.
pub const SEARCH_TIMEOUT: Duration = Duration::from_secs(40);

/// How often the matchmaker worker scans for compatible searching requests.
pub const MATCHMAKER_POLL_INTERVAL: Duration = Duration::from_secs(5);

// =============================================================================
// MESSAGE LOG
// =============================================================================

/// Page size for message history fetches.
pub const MESSAGES_PER_PAGE: i64 = 50;

// =============================================================================
// CHANGE NOTIFICATIONS
// =============================================================================

/// Postgres NOTIFY channel carrying row-level change events.
pub const CHANGE_CHANNEL: &str = "linkup_changes";

/// Capacity of the in-process broadcast bus that fans change events out to
/// subscribers. A subscriber that falls behind sees a Lagged error and must
/// re-query the store instead of replaying the gap.
pub const CHANGE_BUS_CAPACITY: usize = 256;

// =============================================================================
// SERVER CONFIGURATION
// =============================================================================

/// Default HTTP port when PORT is not set.
pub const DEFAULT_SERVER_PORT: u16 = 3001;

/// Default max connections for the database pool.
pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 10;
