//! Lexing of TrafCOD identifiers.
//!
//! A TrafCOD identifier embeds an optional two digit stream number and an optional
//! `N` negation marker in the variable name, e.g. `G01N` is the negation of the
//! variable `G` of stream 1. Detectors use a dedicated form, `D<stream><sub>`.

use crate::error::ParseError;

/// An identifier split into its parts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identifier {
    /// The variable name, without stream number and negation marker.
    pub name: String,
    /// The embedded stream number.
    pub stream: Option<u8>,
    /// Whether the identifier carried an `N` negation marker.
    pub negated: bool,
    /// The number of bytes consumed from the input, including leading whitespace.
    pub len: usize,
}

impl Identifier {
    /// Parses the identifier at the start of `text`.
    ///
    /// Leading whitespace is skipped and the identifier ends at the first character
    /// that is not an ASCII letter or digit. Letters are case-insensitive.
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        let start = text.len() - text.trim_start().len();
        let raw_len = text[start..]
            .find(|c: char| !c.is_ascii_alphanumeric())
            .unwrap_or(text.len() - start);
        let len = start + raw_len;
        let raw = text[start..len].to_ascii_uppercase();
        if raw.is_empty() {
            return Err(ParseError::MissingVariable);
        }
        let ident = Self::parse_raw(&raw, len)?;
        // Reject identifiers that do not print back to the same variable, e.g. `NN00`
        let text = format_identifier(&ident.name, ident.stream, ident.negated);
        match Self::parse_raw(&text, text.len()) {
            Ok(again) if again.same_variable(&ident) => Ok(ident),
            _ => Err(ParseError::BadVariableName(raw)),
        }
    }

    fn parse_raw(raw: &str, len: usize) -> Result<Self, ParseError> {
        match Self::parse_detector(raw, len) {
            Some(ident) => Ok(ident),
            None => Self::parse_general(raw, len),
        }
    }

    /// Returns true if both identifiers name the same variable with the same negation.
    fn same_variable(&self, other: &Self) -> bool {
        self.name == other.name && self.stream == other.stream && self.negated == other.negated
    }

    /// Parses `D[N]ddd[N]`: two stream digits followed by the detector sub number.
    fn parse_detector(raw: &str, len: usize) -> Option<Self> {
        let rest = raw.as_bytes().strip_prefix(b"D")?;
        let (lead_n, rest) = match rest.strip_prefix(b"N") {
            Some(rest) => (true, rest),
            None => (false, rest),
        };
        let (trail_n, digits) = match rest.strip_suffix(b"N") {
            Some(digits) => (true, digits),
            None => (false, rest),
        };
        match *digits {
            [a, b, sub] if digits.iter().all(u8::is_ascii_digit) => Some(Self {
                name: format!("D{}", sub as char),
                stream: Some(10 * (a - b'0') + (b - b'0')),
                negated: lead_n || trail_n,
                len,
            }),
            _ => None,
        }
    }

    fn parse_general(raw: &str, len: usize) -> Result<Self, ParseError> {
        if raw.starts_with(|c: char| c.is_ascii_digit()) {
            return Err(ParseError::BadVariableName(raw.to_string()));
        }
        let mut chars = raw.as_bytes().to_vec();
        let mut name = String::with_capacity(chars.len());
        let mut stream = None;
        let mut pos = 0;
        while pos < chars.len() {
            let c = chars[pos];
            let digit_pair = stream.is_none()
                && pos + 1 < chars.len()
                && c.is_ascii_digit()
                && chars[pos + 1].is_ascii_digit();
            if !digit_pair {
                name.push(c as char);
                pos += 1;
                continue;
            }
            if pos == 0 || (pos == 1 && chars[0] == b'N') {
                return Err(ParseError::BadVariableName(raw.to_string()));
            }
            if chars[pos - 1] == b'N' {
                // Negation marker in front of the stream; move it behind the identifier
                name.pop();
                chars.remove(pos - 1);
                chars.push(b'N');
                pos -= 1;
            }
            stream = Some(10 * (chars[pos] - b'0') + (chars[pos + 1] - b'0'));
            pos += 2;
        }
        let negated = chars.last() == Some(&b'N');
        if negated {
            name.pop();
        }
        if name.is_empty() {
            return Err(ParseError::BadVariableName(raw.to_string()));
        }
        Ok(Self {
            name,
            stream,
            negated,
            len,
        })
    }
}

/// Returns true if `name` is the name of a detector variable (`D` and one digit).
pub fn is_detector_name(name: &str) -> bool {
    matches!(name.as_bytes(), [b'D', sub] if sub.is_ascii_digit())
}

/// Writes a variable name and stream back into identifier form.
///
/// The stream is inserted in front of the first digit of the name, or appended if
/// the name has no digits. Detectors are written as `D<stream><sub>`.
pub fn format_identifier(name: &str, stream: Option<u8>, negated: bool) -> String {
    let mut text = String::with_capacity(name.len() + 3);
    match stream {
        Some(stream) if is_detector_name(name) => {
            text.push('D');
            text.push_str(&format!("{:02}", stream));
            text.push_str(&name[1..]);
        }
        Some(stream) => {
            let pos = name.find(|c: char| c.is_ascii_digit()).unwrap_or(name.len());
            text.push_str(&name[..pos]);
            text.push_str(&format!("{:02}", stream));
            text.push_str(&name[pos..]);
        }
        None => text.push_str(name),
    }
    if negated {
        text.push('N');
    }
    text
}
