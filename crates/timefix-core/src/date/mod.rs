pub mod json;

use chrono::{DateTime, Datelike, Local};

use crate::error::FixError;

/// EXIF datetime layout, local time without zone.
pub const EXIF_DATETIME_FORMAT: &str = "%Y:%m:%d %H:%M:%S";

/// Convert a string of epoch seconds into an EXIF datetime in local time.
/// The local year must fit the four-digit `YYYY` field.
pub fn parse_epoch_seconds(raw: &str) -> Result<String, FixError> {
    let epoch: i64 = raw
        .trim()
        .parse()
        .map_err(|_| FixError::InvalidTimestamp(raw.to_string()))?;

    // Convert UTC epoch to local naive datetime
    let utc = DateTime::from_timestamp(epoch, 0)
        .ok_or_else(|| FixError::InvalidTimestamp(raw.to_string()))?;
    let local = utc.with_timezone(&Local);
    if !(0..=9999).contains(&local.year()) {
        return Err(FixError::InvalidTimestamp(raw.to_string()));
    }
    Ok(local.format(EXIF_DATETIME_FORMAT).to_string())
}

/// Like [`parse_epoch_seconds`], but logs and swallows the failure.
pub fn normalize_timestamp(raw: &str) -> Option<String> {
    match parse_epoch_seconds(raw) {
        Ok(stamp) => Some(stamp),
        Err(e) => {
            log::warn!("Could not convert timestamp '{}' to datetime: {}", raw, e);
            None
        }
    }
}
