/// Parse a boolean flag from a string value, or return the given default value otherwise.
pub fn parse_boolean_flag(value: Option<String>, default: bool) -> bool {
    let value = match value {
        Some(v) => v,
        None => return default,
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => default,
    }
}

/// Mask a sensitive free-text value for audit logs and staff-facing summaries.
///
/// At most 2 characters are visible at each end, with at least 3 masking characters in between.
/// Short values are masked entirely. Never use the masked form for computing anything.
pub fn mask_sensitive(value: &str) -> String {
    let chars = value.chars().collect::<Vec<_>>();
    let n = chars.len();
    let visible = match n {
        0..=4 => 0,
        5..=6 => 1,
        _ => 2,
    };
    let masked = (n - 2 * visible).max(3);
    let prefix = chars[..visible].iter().collect::<String>();
    let suffix = chars[n - visible..].iter().collect::<String>();
    format!("{prefix}{}{suffix}", "*".repeat(masked))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn boolean_flags() {
        assert!(parse_boolean_flag(Some("yes".into()), false));
        assert!(!parse_boolean_flag(Some("off".into()), true));
        assert!(parse_boolean_flag(None, true));
        assert!(!parse_boolean_flag(Some("garbage".into()), false));
    }

    #[test]
    fn masking_keeps_at_most_two_chars_each_end() {
        assert_eq!(mask_sensitive("alice@example.com"), "al*************om");
        assert_eq!(mask_sensitive("secret"), "s****t");
        assert_eq!(mask_sensitive("abc"), "***");
        assert_eq!(mask_sensitive(""), "***");
    }

    #[test]
    fn masking_always_has_three_mask_chars() {
        // 7 chars: 2 visible each end would leave only 3 masked
        let masked = mask_sensitive("1234567");
        assert_eq!(masked, "12***67");
        assert!(masked.matches('*').count() >= 3);
    }
}
