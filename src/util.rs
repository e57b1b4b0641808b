//! Utility functions that are useful in many cases.

/// Parse an integer literal.
///
/// The literal is assumed to be decimal. If a 0x prefix is found, it is
/// parsed as hexadecimal instead. A leading - negates the value. Anything
/// else, including overflow, yields `None`.
///
/// ```rust
/// use aicadsp::util::parse_num;
/// assert_eq!(parse_num("123"), Some(123));
/// assert_eq!(parse_num("0x10"), Some(16));
/// assert_eq!(parse_num("-0xF"), Some(-15));
/// assert_eq!(parse_num("-5"), Some(-5));
/// assert_eq!(parse_num("foo"), None);
/// ```
pub fn parse_num(text: &str) -> Option<i32> {
    let mut stripped = text;
    let sign = if stripped.starts_with("-") {
        stripped = &stripped[1..];
        -1
    } else {
        1
    };
    let base: u32 = if stripped.starts_with("0x") || stripped.starts_with("0X") {
        stripped = &stripped[2..];
        16
    } else {
        10
    };
    if stripped.is_empty() {
        return None;
    }
    let mut result: i32 = 0;
    for chr in stripped.chars() {
        let digit = match chr.to_digit(base) {
            Some(d) => d as i32,
            None => return None,
        };
        result = match result
            .checked_mul(base as i32)
            .and_then(|r| r.checked_add(digit))
        {
            Some(r) => r,
            None => return None,
        };
    }
    Some(sign * result)
}

#[cfg(test)]
mod tests {
    use super::parse_num;

    #[test]
    fn rejects_hex_digits_in_decimal() {
        assert_eq!(parse_num("1f"), None);
    }

    #[test]
    fn rejects_bare_prefix() {
        assert_eq!(parse_num("0x"), None);
        assert_eq!(parse_num("-"), None);
        assert_eq!(parse_num(""), None);
    }

    #[test]
    fn rejects_overflow() {
        assert_eq!(parse_num("99999999999999999999"), None);
    }
}
