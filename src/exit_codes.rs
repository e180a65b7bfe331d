//! Stable exit codes for the snippet-verdict CLI.

/// Every checked snippet matched its label (or there was nothing to check).
pub const OK: i32 = 0;
/// At least one snippet's observed outcome contradicts its label.
pub const MISMATCH: i32 = 1;
/// The run itself failed: bad arguments, unreadable input directory,
/// invalid or unapproved config, or the report could not be written.
pub const TOOLING_ERROR: i32 = 2;
