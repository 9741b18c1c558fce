//! Small helpers shared by result builders.

/// Keep the last `max_chars` characters of `s`.
///
/// Trailing output usually carries the error, so the head is dropped.
pub fn tail(s: &str, max_chars: usize) -> String {
    let count = s.chars().count();
    if count <= max_chars {
        return s.to_string();
    }
    s.chars().skip(count - max_chars).collect()
}

/// Round to a fixed number of decimal places.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Round seconds to millisecond precision.
pub fn round_millis(secs: f64) -> f64 {
    round_to(secs, 3)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tail_keeps_end() {
        assert_eq!(tail("abcdef", 3), "def");
        assert_eq!(tail("abc", 10), "abc");
        assert_eq!(tail("", 4), "");
    }

    #[test]
    fn test_tail_respects_char_boundaries() {
        assert_eq!(tail("héllo wörld", 5), "wörld");
    }

    #[test]
    fn test_round_millis() {
        assert_eq!(round_millis(1.23456), 1.235);
        assert_eq!(round_to(0.75049, 2), 0.75);
    }
}
