use chrono::NaiveDate;

/// Max bytes in a guest name or unit identifier.
pub const MAX_ID_LEN: usize = 256;

/// Max nights in a single stay, including extensions.
pub const MAX_NIGHTS: u32 = 365;

/// Earliest accepted check-in date.
pub const MIN_CHECK_IN: NaiveDate = match NaiveDate::from_ymd_opt(2000, 1, 1) {
    Some(d) => d,
    None => panic!("invalid MIN_CHECK_IN"),
};

/// Latest accepted check-in date.
pub const MAX_CHECK_IN: NaiveDate = match NaiveDate::from_ymd_opt(2199, 12, 31) {
    Some(d) => d,
    None => panic!("invalid MAX_CHECK_IN"),
};

/// Max bytes in one request line on the wire.
pub const MAX_LINE_LEN: usize = 8 * 1024;

/// Max payload bytes in one WAL frame. A longer length prefix can only come
/// from a damaged log.
pub const MAX_WAL_FRAME_LEN: usize = 64 * 1024;
