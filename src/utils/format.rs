//! Formatting utilities.

const UNITS: [&str; 9] = ["B", "KB", "MB", "GB", "TB", "PB", "EB", "ZB", "YB"];

/// Format a byte count as a human-readable size using decimal (1000-based) units.
///
/// Two decimal places at most, trailing zeros dropped: 1500 -> "1.5 KB",
/// 1000000 -> "1 MB", 1234567 -> "1.23 MB".
pub fn pretty_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0 B".to_string();
    }

    let mut exp = 0;
    let mut scaled = bytes;
    while scaled >= 1000 && exp < UNITS.len() - 1 {
        scaled /= 1000;
        exp += 1;
    }

    let value = bytes as f64 / 1000f64.powi(exp as i32);
    let mut formatted = format!("{:.2}", value);
    if formatted.contains('.') {
        formatted = formatted
            .trim_end_matches('0')
            .trim_end_matches('.')
            .to_string();
    }

    format!("{} {}", formatted, UNITS[exp])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pretty_size() {
        assert_eq!(pretty_size(0), "0 B");
        assert_eq!(pretty_size(1), "1 B");
        assert_eq!(pretty_size(999), "999 B");
        assert_eq!(pretty_size(1000), "1 KB");
        assert_eq!(pretty_size(1500), "1.5 KB");
        assert_eq!(pretty_size(1_000_000), "1 MB");
        assert_eq!(pretty_size(1_500_000), "1.5 MB");
        assert_eq!(pretty_size(1_234_567), "1.23 MB");
        assert_eq!(pretty_size(2_000_000_000), "2 GB");
    }

    #[test]
    fn test_pretty_size_largest_unit() {
        assert_eq!(pretty_size(u64::MAX), "18.45 EB");
    }
}
