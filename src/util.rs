//! Miscellaneous utility functions.

/// Strips `prefix` from the start of `text`, ignoring ASCII case.
pub fn strip_prefix_ignore_case<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let head = text.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        Some(&text[prefix.len()..])
    } else {
        None
    }
}

/// Splits a line into whitespace separated fields.
pub fn fields(line: &str) -> Vec<&str> {
    line.split_whitespace().collect()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn prefixes() {
        assert_eq!(
            strip_prefix_ignore_case("TrafCOD-version=100", "trafcod-version="),
            Some("100")
        );
        assert_eq!(strip_prefix_ignore_case("Seq", "sequence"), None);
        assert_eq!(strip_prefix_ignore_case("structure: 4", "Structure:"), Some(" 4"));
    }
}
