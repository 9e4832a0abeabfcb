//! Constants used throughout the context core crate.

/// Subjects registered when no explicit list is configured.
pub const DEFAULT_SUBJECTS: &[&str] = &["Patient", "Location", "User"];

/// Event names subscribed remotely when no explicit list is configured.
pub const DEFAULT_REMOTE_EVENTS: &[&str] = &[ctx_types::CONTEXT_CHANGED_EVENT];

/// Default interval between poll passes, in milliseconds.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2_000;

/// Lower bound for the poll interval, in milliseconds.
pub const MIN_POLL_INTERVAL_MS: u64 = 10;

/// Property key prefix under which remembered selections are stored.
pub const SELECTION_PROPERTY_PREFIX: &str = "context.selection.";
