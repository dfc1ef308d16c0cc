//! Derived display values shared with the reporting layer.

/// Separator of multi-valued foreign keys stored in a single column.
/// Reporting queries split on this exact string.
pub const MULTI_VALUE_DELIMITER: &str = ", ";

/// Format a duration as `m:ss`, truncating to whole seconds.
pub fn format_duration(duration_ms: u64) -> String {
    let total_secs = duration_ms / 1000;
    format!("{}:{:02}", total_secs / 60, total_secs % 60)
}

/// Parse an `m:ss` string back into milliseconds.
pub fn parse_duration(formatted: &str) -> Option<u64> {
    let (minutes, seconds) = formatted.split_once(':')?;
    if seconds.len() != 2 {
        return None;
    }
    let minutes: u64 = minutes.parse().ok()?;
    let seconds: u64 = seconds.parse().ok()?;
    if seconds >= 60 {
        return None;
    }
    Some((minutes * 60 + seconds) * 1000)
}

/// Join ids into the delimited single-column form, dropping repeats but
/// keeping first-seen order. Returns `None` for an empty list.
pub fn encode_multi_valued<'a, I>(ids: I) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut unique: Vec<&str> = Vec::new();
    for id in ids {
        if !unique.contains(&id) {
            unique.push(id);
        }
    }
    if unique.is_empty() {
        None
    } else {
        Some(unique.join(MULTI_VALUE_DELIMITER))
    }
}

/// Recover the id list from its encoded form.
pub fn split_multi_valued(encoded: &str) -> Vec<&str> {
    if encoded.is_empty() {
        return Vec::new();
    }
    encoded.split(MULTI_VALUE_DELIMITER).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration_known_values() {
        assert_eq!(format_duration(221_000), "3:41");
        assert_eq!(format_duration(65_000), "1:05");
        assert_eq!(format_duration(59_999), "0:59");
        assert_eq!(format_duration(0), "0:00");
        assert_eq!(format_duration(3_600_000), "60:00");
    }

    #[test]
    fn test_format_duration_round_trips_within_a_second() {
        for duration_ms in (0..7_200_000u64).step_by(997) {
            let parsed = parse_duration(&format_duration(duration_ms)).unwrap();
            assert_eq!(parsed, duration_ms / 1000 * 1000);
            assert!(duration_ms - parsed < 1000);
        }
    }

    #[test]
    fn test_parse_duration_rejects_malformed() {
        assert_eq!(parse_duration("3:4"), None);
        assert_eq!(parse_duration("3:60"), None);
        assert_eq!(parse_duration("341"), None);
        assert_eq!(parse_duration("a:01"), None);
    }

    #[test]
    fn test_encode_then_split_preserves_order() {
        for n in 1..=8 {
            let ids: Vec<String> = (0..n).map(|i| format!("artist{}", n - i)).collect();
            let encoded = encode_multi_valued(ids.iter().map(String::as_str)).unwrap();
            assert_eq!(split_multi_valued(&encoded), ids);
        }
    }

    #[test]
    fn test_encode_drops_repeats_and_empty_lists() {
        assert_eq!(
            encode_multi_valued(["b", "a", "b"]).as_deref(),
            Some("b, a")
        );
        assert_eq!(encode_multi_valued(Vec::<&str>::new()), None);
        assert!(split_multi_valued("").is_empty());
    }
}
