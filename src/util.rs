//! Small parsing and formatting helpers shared across endpoints.

const SIZE_UNITS: [&str; 6] = ["B", "KiB", "MiB", "GiB", "TiB", "PiB"];

/// Renders a byte count as a human readable binary size with a two digit
/// decimal precision. Negative sizes are prefixed with '-'.
pub fn human_size(size: f64) -> String {
    let (prefix, mut size) = if size < 0.0 { ("-", -size) } else { ("", size) };
    let mut power = 0;
    while size >= 1024.0 && power < SIZE_UNITS.len() - 1 {
        size /= 1024.0;
        power += 1;
    }
    format!("{}{:.2} {}", prefix, size, SIZE_UNITS[power])
}

/// Parses the boolean spellings accepted on the wire and in the
/// environment: 1/t/true and 0/f/false, case insensitive.
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "t" | "true" => Some(true),
        "0" | "f" | "false" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn human_size_units() {
        assert_eq!(human_size(0.0), "0.00 B");
        assert_eq!(human_size(512.0), "512.00 B");
        assert_eq!(human_size(1024.0), "1.00 KiB");
        assert_eq!(human_size(1024.0 * 1024.0 * 1.5), "1.50 MiB");
        assert_eq!(human_size(f64::powi(1024.0, 4)), "1.00 TiB");
    }

    #[test]
    fn human_size_negative() {
        assert_eq!(human_size(-2048.0), "-2.00 KiB");
    }

    #[test]
    fn human_size_caps_at_pebibytes() {
        assert_eq!(human_size(f64::powi(1024.0, 6)), "1024.00 PiB");
    }

    #[test]
    fn bool_spellings() {
        assert_eq!(parse_bool("true"), Some(true));
        assert_eq!(parse_bool("T"), Some(true));
        assert_eq!(parse_bool("1"), Some(true));
        assert_eq!(parse_bool("FALSE"), Some(false));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("yes"), None);
        assert_eq!(parse_bool(""), None);
    }
}
