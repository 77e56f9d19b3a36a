//! Memory limit parsing.
//!
//! Converts human-readable sizes such as `512M`, `2G` or `0x400k` into bytes
//! using binary prefixes. Parsing is lenient: anything that does not start
//! with digits yields a magnitude of 0 instead of an error.

/// Parse a memory limit string into a byte count.
///
/// - A leading `+` is ignored.
/// - `0x` selects hexadecimal, a leading `0` selects octal, otherwise decimal.
/// - The magnitude is the longest run of valid digits after the prefix.
/// - The last letter (after dropping trailing `b`s) selects the unit:
///   `k`, `m`, `g` or `t`, each a further factor of 1024.
pub fn parse_memory_limit(input: &str) -> u64 {
    let lowered = input.trim().to_ascii_lowercase();
    let unsigned = lowered.trim_start_matches('+');

    let magnitude = if let Some(hex) = unsigned.strip_prefix("0x") {
        leading_digits(hex, 16)
    } else if unsigned.starts_with('0') {
        leading_digits(unsigned, 8)
    } else {
        leading_digits(unsigned, 10)
    };

    let exponent = match lowered.trim_end_matches('b').chars().last() {
        Some('t') => 4,
        Some('g') => 3,
        Some('m') => 2,
        Some('k') => 1,
        _ => 0,
    };

    (0..exponent).fold(magnitude, |bytes, _| bytes.saturating_mul(1024))
}

fn leading_digits(input: &str, radix: u32) -> u64 {
    input
        .chars()
        .map_while(|c| c.to_digit(radix))
        .fold(0u64, |acc, digit| {
            acc.saturating_mul(u64::from(radix)).saturating_add(u64::from(digit))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    const KIB: u64 = 1024;
    const MIB: u64 = 1024 * 1024;
    const GIB: u64 = 1024 * 1024 * 1024;

    #[test]
    fn test_parse_megabytes() {
        assert_eq!(parse_memory_limit("512M"), 512 * MIB);
    }

    #[test]
    fn test_parse_gigabytes() {
        assert_eq!(parse_memory_limit("1G"), GIB);
        assert_eq!(parse_memory_limit("2g"), 2 * GIB);
    }

    #[test]
    fn test_parse_kilobytes() {
        assert_eq!(parse_memory_limit("2K"), 2 * KIB);
    }

    #[test]
    fn test_parse_terabytes() {
        assert_eq!(parse_memory_limit("1T"), 1024 * GIB);
    }

    #[test]
    fn test_parse_plain_bytes() {
        assert_eq!(parse_memory_limit("100"), 100);
    }

    #[test]
    fn test_trailing_b_is_ignored() {
        assert_eq!(parse_memory_limit("128MB"), 128 * MIB);
        assert_eq!(parse_memory_limit("4kb"), 4 * KIB);
    }

    #[test]
    fn test_leading_plus_is_ignored() {
        assert_eq!(parse_memory_limit("+64M"), 64 * MIB);
    }

    #[test]
    fn test_hex_magnitude() {
        assert_eq!(parse_memory_limit("0x10"), 16);
        assert_eq!(parse_memory_limit("0x10K"), 16 * KIB);
    }

    #[test]
    fn test_octal_magnitude() {
        assert_eq!(parse_memory_limit("010"), 8);
        assert_eq!(parse_memory_limit("010M"), 8 * MIB);
    }

    #[test]
    fn test_malformed_input_parses_to_zero() {
        assert_eq!(parse_memory_limit("lots"), 0);
        assert_eq!(parse_memory_limit(""), 0);
        assert_eq!(parse_memory_limit("-5M"), 0);
    }

    #[test]
    fn test_overflow_saturates() {
        assert_eq!(parse_memory_limit("99999999999999999999T"), u64::MAX);
    }
}
