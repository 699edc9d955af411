/// Max entries in one add-days / remove-days / exclude-dates call.
pub const MAX_BATCH_SIZE: usize = 1000;

/// Max assignments in one confirmation request or cascade selection.
pub const MAX_SELECTION_SIZE: usize = 500;

/// Widest date range the day generator will expand (about ten years).
pub const MAX_RANGE_DAYS: i64 = 3660;

pub const MAX_NOTES_LEN: usize = 4096;
pub const MAX_REASON_LEN: usize = 1024;
pub const MAX_CLIENT_NAME_LEN: usize = 256;
pub const MAX_SCHEDULE_STATUS_LEN: usize = 64;
pub const MAX_RECIPIENT_NAME_LEN: usize = 256;

/// RFC 5321 path limit.
pub const MAX_EMAIL_LEN: usize = 254;

/// Confirmation requests expire this many days after creation.
pub const CONFIRMATION_TTL_DAYS: i64 = 7;
