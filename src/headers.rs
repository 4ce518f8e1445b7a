use std::collections::hash_map::Entry;
use std::collections::HashMap;

use thiserror::Error;

const CRLF: &[u8] = b"\r\n";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum HeaderError {
    #[error("malformed header line: missing field name or colon")]
    MalformedHeaderLine,

    #[error("invalid spacing before colon in header line")]
    InvalidSpacing,

    #[error("invalid character in header field name")]
    InvalidHeaderFieldName,
}

/// Case-insensitive header store.
///
/// Field names are canonicalized to lower case on insert; repeated fields
/// parsed from the wire are joined into one value with `", "` in insertion
/// order. Values are kept with leading and trailing spaces and tabs removed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Headers {
    entries: HashMap<String, String>,
}

impl Headers {
    pub fn new() -> Self {
        Self { entries: HashMap::new() }
    }

    /// Case-insensitive lookup.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    /// Case-insensitive insert or replace. Unlike [`Headers::parse`], a
    /// colliding name replaces the stored value instead of joining.
    pub fn set(&mut self, name: &str, value: &str) {
        self.entries.insert(name.to_ascii_lowercase(), value.to_string());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value.as_str()))
    }

    /// Parses at most one field line from the start of `data`.
    ///
    /// Returns `(2, true)` when `data` begins with the header-section
    /// terminator CRLF, `(0, false)` when no CRLF is present yet (more data
    /// needed), and `(line_end + 2, false)` after storing one field.
    pub fn parse(&mut self, data: &[u8]) -> Result<(usize, bool), HeaderError> {
        if data.starts_with(CRLF) {
            return Ok((2, true));
        }

        let Some(line_end) = find_crlf(data) else {
            return Ok((0, false));
        };
        let line = &data[..line_end];

        let Some(colon) = line.iter().position(|&b| b == b':') else {
            return Err(HeaderError::MalformedHeaderLine);
        };
        if colon == 0 {
            return Err(HeaderError::MalformedHeaderLine);
        }
        if line[colon - 1] == b' ' {
            return Err(HeaderError::InvalidSpacing);
        }

        let name = trim(&line[..colon]);
        if !is_valid_field_name(name) {
            return Err(HeaderError::InvalidHeaderFieldName);
        }
        let value = std::str::from_utf8(trim(&line[colon + 1..]))
            .map_err(|_| HeaderError::MalformedHeaderLine)?;

        // the token grammar restricts names to ASCII
        let key: String = name.iter().map(|b| b.to_ascii_lowercase() as char).collect();
        match self.entries.entry(key) {
            Entry::Occupied(mut entry) => {
                let joined = entry.get_mut();
                joined.push_str(", ");
                joined.push_str(value);
            }
            Entry::Vacant(entry) => {
                entry.insert(value.to_string());
            }
        }

        Ok((line_end + 2, false))
    }
}

pub(crate) fn find_crlf(data: &[u8]) -> Option<usize> {
    data.windows(2).position(|window| window == CRLF)
}

fn trim(mut bytes: &[u8]) -> &[u8] {
    while let [b' ' | b'\t', rest @ ..] = bytes {
        bytes = rest;
    }
    while let [rest @ .., b' ' | b'\t'] = bytes {
        bytes = rest;
    }
    bytes
}

fn is_valid_field_name(name: &[u8]) -> bool {
    !name.is_empty() && name.iter().all(|&b| is_valid_field_char(b))
}

fn is_valid_field_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_single_header() {
        let mut headers = Headers::new();
        let (n, done) = headers.parse(b"Host: localhost:42069\r\n").unwrap();

        assert_eq!(n, 23);
        assert!(!done);
        assert_eq!(headers.get("host"), Some("localhost:42069"));
    }

    #[test]
    fn value_whitespace_is_trimmed() {
        let mut headers = Headers::new();
        let data = b"Content-Type:   application/json   \r\n";
        let (n, done) = headers.parse(data).unwrap();

        assert_eq!(n, data.len());
        assert!(!done);
        assert_eq!(headers.get("content-type"), Some("application/json"));
    }

    #[test]
    fn parses_fields_one_at_a_time() {
        let mut headers = Headers::new();
        headers.set("Already-Present", "value");

        let (n, done) = headers.parse(b"Content-Type: text/html\r\n").unwrap();
        assert_eq!(n, 25);
        assert!(!done);

        let (n, done) = headers.parse(b"Content-Length: 256\r\n").unwrap();
        assert_eq!(n, 21);
        assert!(!done);

        assert_eq!(headers.get("already-present"), Some("value"));
        assert_eq!(headers.get("content-type"), Some("text/html"));
        assert_eq!(headers.get("content-length"), Some("256"));
        assert_eq!(headers.len(), 3);
    }

    #[test]
    fn leading_crlf_terminates_the_section() {
        let mut headers = Headers::new();
        let (n, done) = headers.parse(b"\r\nContent after headers").unwrap();

        assert_eq!(n, 2);
        assert!(done);
        assert!(headers.is_empty());
    }

    #[test]
    fn rejects_space_before_colon() {
        let mut headers = Headers::new();
        let err = headers.parse(b"Host : localhost:42069\r\n").unwrap_err();

        assert_eq!(err, HeaderError::InvalidSpacing);
    }

    #[test]
    fn incomplete_line_needs_more_data() {
        let mut headers = Headers::new();
        let (n, done) = headers.parse(b"Host: localhost:42069").unwrap();

        assert_eq!(n, 0);
        assert!(!done);
        assert!(headers.is_empty());
    }

    #[test]
    fn empty_chunk_needs_more_data() {
        let mut headers = Headers::new();
        let (n, done) = headers.parse(b"").unwrap();

        assert_eq!(n, 0);
        assert!(!done);
    }

    #[test]
    fn rejects_line_without_colon() {
        let mut headers = Headers::new();
        let err = headers.parse(b"MalformedHeader\r\n").unwrap_err();

        assert_eq!(err, HeaderError::MalformedHeaderLine);
    }

    #[test]
    fn rejects_empty_field_name() {
        let mut headers = Headers::new();
        let err = headers.parse(b": some-value\r\n").unwrap_err();

        assert_eq!(err, HeaderError::MalformedHeaderLine);
    }

    #[test]
    fn rejects_non_token_characters_in_field_name() {
        let mut headers = Headers::new();
        let err = headers.parse(b"H@st: localhost\r\n").unwrap_err();

        assert_eq!(err, HeaderError::InvalidHeaderFieldName);
    }

    #[test]
    fn repeated_fields_join_with_comma() {
        let mut headers = Headers::new();
        headers.parse(b"Set-Person: lane-loves-go\r\n").unwrap();
        headers.parse(b"Set-Person: prime-loves-zig\r\n").unwrap();

        assert_eq!(headers.get("set-person"), Some("lane-loves-go, prime-loves-zig"));
        assert_eq!(headers.len(), 1);
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let mut headers = Headers::new();
        headers.parse(b"Host: localhost\r\n").unwrap();

        assert_eq!(headers.get("HOST"), Some("localhost"));
        assert_eq!(headers.get("Host"), Some("localhost"));
        assert_eq!(headers.get("host"), Some("localhost"));
    }

    #[test]
    fn set_replaces_instead_of_joining() {
        let mut headers = Headers::new();
        headers.set("Content-Type", "text/plain");
        headers.set("content-type", "text/html");

        assert_eq!(headers.get("content-type"), Some("text/html"));
        assert_eq!(headers.len(), 1);
    }
}
