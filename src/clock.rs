//! Timestamp formats used by the displays and the session artifacts.

use chrono::{Local, NaiveDateTime};

pub fn now() -> NaiveDateTime {
    Local::now().naive_local()
}

/// `[HH:MM:SS.mmm] ` prefix for display and log lines.
pub fn stamp(at: NaiveDateTime) -> String {
    format!("[{}] ", at.format("%H:%M:%S%.3f"))
}

/// `18-Oct-26`, the date used in artifact names and headers.
pub fn file_date(at: NaiveDateTime) -> String {
    at.format("%d-%b-%y").to_string()
}

/// `14-03-09`, the time used in artifact names.
pub fn file_time(at: NaiveDateTime) -> String {
    at.format("%H-%M-%S").to_string()
}

/// `14:03:09`, the time used in artifact headers.
pub fn header_time(at: NaiveDateTime) -> String {
    at.format("%H:%M:%S").to_string()
}
