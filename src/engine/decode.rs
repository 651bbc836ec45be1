use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine as _;
use regex::Regex;
use std::sync::LazyLock;

// Standard alphabet; trailing `=` optional, as browsers' atob accepts.
const FORGIVING: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

static CODE_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)CODE:\s*([0-9]{4})").unwrap());

// The marker itself may be hidden under rot13.
static ROT13_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)PBQR:\s*([0-9]{4})").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    Base64,
    Rot13,
}

impl Codec {
    pub fn parse(name: &str) -> Option<Self> {
        if name.eq_ignore_ascii_case("base64") {
            Some(Codec::Base64)
        } else if name.eq_ignore_ascii_case("rot13") {
            Some(Codec::Rot13)
        } else {
            None
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Codec::Base64 => "Base64",
            Codec::Rot13 => "ROT13",
        }
    }

    /// `None` means the input could not be decoded.
    pub fn decode(&self, input: &str) -> Option<String> {
        match self {
            Codec::Base64 => decode_base64(input),
            Codec::Rot13 => Some(rot13(input)),
        }
    }
}

pub fn rot13(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            'a'..='z' => (((c as u8 - b'a') + 13) % 26 + b'a') as char,
            'A'..='Z' => (((c as u8 - b'A') + 13) % 26 + b'A') as char,
            _ => c,
        })
        .collect()
}

/// Whitespace is ignored; the payload must be valid base64 carrying UTF-8.
pub fn decode_base64(text: &str) -> Option<String> {
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = FORGIVING.decode(compact).ok()?;
    String::from_utf8(bytes).ok()
}

/// The four digits following a `CODE:` or `PBQR:` marker, if any.
pub fn find_code_marker(text: &str) -> Option<&str> {
    CODE_MARKER
        .captures(text)
        .or_else(|| ROT13_MARKER.captures(text))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}
