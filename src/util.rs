pub fn rounded_mean(sum: f64, count: u64) -> Option<i64> {
    match count {
        positive if positive > 0 => Some((sum / count as f64 + 0.5).floor() as i64),
        _ => None,
    }
}

/// Formats seconds as MM:SS. Minutes keep growing past 99.
pub fn format_time(total_secs: u64) -> String {
    format!("{:02}:{:02}", total_secs / 60, total_secs % 60)
}

/// Formats an optional distance as "N cm", or "-- cm" when absent
pub fn format_distance(distance: Option<f64>) -> String {
    match distance {
        Some(d) if d.fract() == 0.0 => format!("{} cm", d as i64),
        Some(d) => format!("{:.1} cm", d),
        None => "-- cm".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rounded_mean() {
        assert_eq!(rounded_mean(60.0, 3), Some(20));
        assert_eq!(rounded_mean(25.0, 2), Some(13));
        assert_eq!(rounded_mean(24.9, 2), Some(12));
    }

    #[test]
    fn test_rounded_mean_no_samples() {
        assert_eq!(rounded_mean(0.0, 0), None);
        assert_eq!(rounded_mean(10.0, 0), None);
    }

    #[test]
    fn test_format_time() {
        assert_eq!(format_time(0), "00:00");
        assert_eq!(format_time(59), "00:59");
        assert_eq!(format_time(61), "01:01");
        assert_eq!(format_time(6000), "100:00");
    }

    #[test]
    fn test_format_distance() {
        assert_eq!(format_distance(Some(20.0)), "20 cm");
        assert_eq!(format_distance(Some(12.34)), "12.3 cm");
        assert_eq!(format_distance(None), "-- cm");
    }
}
