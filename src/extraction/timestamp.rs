//! Display conversion for log timestamps

use chrono::{FixedOffset, NaiveDateTime, TimeZone, Utc};

const SOURCE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Renders UTC log timestamps as wall-clock time at a fixed offset
#[derive(Debug, Clone, Copy)]
pub struct LocalClock {
    offset: FixedOffset,
}

impl LocalClock {
    /// Returns `None` if the offset is outside +/-23 hours
    pub fn with_offset_hours(hours: i32) -> Option<Self> {
        if !(-23..=23).contains(&hours) {
            return None;
        }
        FixedOffset::east_opt(hours * 3600).map(|offset| LocalClock { offset })
    }

    /// Convert `YYYY-MM-DD HH:MM:SS[.fff]` (UTC) into local `HH:MM:SS`.
    ///
    /// Unparseable input falls back to the characters at positions 11..19,
    /// which is where the time sits in the expected layout.
    pub fn format(&self, raw: &str) -> String {
        let clean = raw.split('.').next().unwrap_or(raw);

        match NaiveDateTime::parse_from_str(clean, SOURCE_FORMAT) {
            Ok(naive) => Utc
                .from_utc_datetime(&naive)
                .with_timezone(&self.offset)
                .format("%H:%M:%S")
                .to_string(),
            Err(e) => {
                log::debug!("Unparseable log timestamp {:?}: {}", raw, e);
                raw.chars().skip(11).take(8).collect()
            }
        }
    }
}
