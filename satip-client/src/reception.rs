//! Parses the SAT>IP `tuner=` tuple out of an RTCP APP payload (C7).

/// Reception quality as reported by a server's RTCP APP payload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReceptionStatus {
    pub frontend_id: i32,
    pub signal_strength_dbm: f64,
    pub signal_strength: i32,
    pub has_lock: bool,
    pub signal_quality: i32,
}

/// Locate `;tuner=` in `payload` and parse the comma-separated tuple
/// that follows: `feID, level, lock, quality, …`. `payload` need not be
/// NUL-terminated or UTF-8-clean beyond the tuple itself — bytes before
/// the match and after the parsed fields are ignored.
///
/// Returns `None` if the marker is absent or the tuple has fewer than
/// four fields.
pub fn parse_tuner_status(payload: &[u8]) -> Option<ReceptionStatus> {
    let text = String::from_utf8_lossy(payload);
    let marker = ";tuner=";
    let start = text.find(marker)? + marker.len();
    let rest = &text[start..];
    // stop at the next ';' so any trailing "...;pids=..." is excluded
    let tuple_str = rest.split(';').next().unwrap_or(rest);
    let fields: Vec<&str> = tuple_str.split(',').collect();
    if fields.len() < 4 {
        return None;
    }

    let fe_id: i32 = fields[0].trim().parse().ok()?;
    let level_raw: i32 = fields[1].trim().parse().unwrap_or(-1);
    let lock_raw: i32 = fields[2].trim().parse().unwrap_or(0);
    let quality_raw: i32 = fields[3].trim().parse().unwrap_or(-1);

    let has_lock = lock_raw != 0;

    let level = level_raw.clamp(0, 255);
    let signal_strength_dbm = if level_raw > 0 {
        40.0 * (level as f64 - 32.0) / 192.0 - 65.0
    } else {
        0.0
    };
    let signal_strength = if level_raw >= 0 {
        (level as f64 * 100.0 / 255.0).round() as i32
    } else {
        -1
    };

    let quality = quality_raw.clamp(0, 15);
    let signal_quality = if has_lock && quality_raw >= 0 {
        (quality as f64 * 100.0 / 15.0).round() as i32
    } else {
        0
    };

    Some(ReceptionStatus {
        frontend_id: fe_id,
        signal_strength_dbm,
        signal_strength,
        has_lock,
        signal_quality,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spec_example_round_trips() {
        let payload = b"ver=1.0;tuner=7,224,1,15,...";
        let status = parse_tuner_status(payload).expect("should parse");
        assert_eq!(status.frontend_id, 7);
        assert!(status.has_lock);
        assert_eq!(status.signal_strength, 88);
        assert!((status.signal_strength_dbm - (-25.0)).abs() < 1e-9);
        assert_eq!(status.signal_quality, 100);
    }

    #[test]
    fn no_marker_returns_none() {
        assert!(parse_tuner_status(b"ver=1.0;pids=100,200").is_none());
    }

    #[test]
    fn zero_level_gives_zero_dbm() {
        let status = parse_tuner_status(b"ver=1.0;tuner=1,0,0,0").unwrap();
        assert_eq!(status.signal_strength_dbm, 0.0);
        assert!(!status.has_lock);
    }

    #[test]
    fn unlocked_quality_is_zero_even_with_positive_value() {
        let status = parse_tuner_status(b"ver=1.0;tuner=1,100,0,15").unwrap();
        assert!(!status.has_lock);
        assert_eq!(status.signal_quality, 0);
    }

    #[test]
    fn trailing_fields_after_tuple_are_ignored() {
        let status = parse_tuner_status(b"ver=1.1;src=1;tuner=2,128,1,10;pids=100,200").unwrap();
        assert_eq!(status.frontend_id, 2);
        assert!(status.has_lock);
    }

    #[test]
    fn too_few_fields_returns_none() {
        assert!(parse_tuner_status(b"tuner=1,2").is_none());
    }
}
