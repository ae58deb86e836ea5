//! Core types for the voicemail session
//!
//! Identifiers, the session state enum, DTMF digits and the mailbox handle.

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Session ID type
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(format!("voicemail-{}", uuid::Uuid::new_v4()))
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of the telephony channel a session drives
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct ChannelId(pub String);

impl ChannelId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// State of a voicemail session
///
/// The names double as keys of the digit-action table in configuration, so
/// they serialize in lowercase. `auth` is accepted as an alias of
/// `authenticating`.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Listeners installed, channel being answered
    Init,
    /// Mailbox initialization in progress
    #[serde(alias = "auth")]
    Authenticating,
    /// Recording, saving and the closing prompt
    Ready,
    /// Terminal; listeners removed
    Done,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Authenticating => "authenticating",
            Self::Ready => "ready",
            Self::Done => "done",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// DTMF digit received from a keypad
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub enum DtmfDigit {
    Digit0,
    Digit1,
    Digit2,
    Digit3,
    Digit4,
    Digit5,
    Digit6,
    Digit7,
    Digit8,
    Digit9,
    Star,
    Pound,
    A,
    B,
    C,
    D,
}

impl DtmfDigit {
    pub fn to_char(self) -> char {
        match self {
            Self::Digit0 => '0',
            Self::Digit1 => '1',
            Self::Digit2 => '2',
            Self::Digit3 => '3',
            Self::Digit4 => '4',
            Self::Digit5 => '5',
            Self::Digit6 => '6',
            Self::Digit7 => '7',
            Self::Digit8 => '8',
            Self::Digit9 => '9',
            Self::Star => '*',
            Self::Pound => '#',
            Self::A => 'A',
            Self::B => 'B',
            Self::C => 'C',
            Self::D => 'D',
        }
    }

    pub fn from_char(c: char) -> Option<Self> {
        match c {
            '0' => Some(Self::Digit0),
            '1' => Some(Self::Digit1),
            '2' => Some(Self::Digit2),
            '3' => Some(Self::Digit3),
            '4' => Some(Self::Digit4),
            '5' => Some(Self::Digit5),
            '6' => Some(Self::Digit6),
            '7' => Some(Self::Digit7),
            '8' => Some(Self::Digit8),
            '9' => Some(Self::Digit9),
            '*' => Some(Self::Star),
            '#' => Some(Self::Pound),
            'A' | 'a' => Some(Self::A),
            'B' | 'b' => Some(Self::B),
            'C' | 'c' => Some(Self::C),
            'D' | 'd' => Some(Self::D),
            _ => None,
        }
    }
}

impl fmt::Display for DtmfDigit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_char())
    }
}

impl Serialize for DtmfDigit {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_char().to_string())
    }
}

// YAML reads `1:` as an integer key and `"#":` as a string key, so accept both.
impl<'de> Deserialize<'de> for DtmfDigit {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct DigitVisitor;

        impl<'de> de::Visitor<'de> for DigitVisitor {
            type Value = DtmfDigit;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a single DTMF digit (0-9, *, #, A-D)")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<DtmfDigit, E> {
                let mut chars = v.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => DtmfDigit::from_char(c)
                        .ok_or_else(|| E::invalid_value(de::Unexpected::Str(v), &self)),
                    _ => Err(E::invalid_value(de::Unexpected::Str(v), &self)),
                }
            }

            fn visit_char<E: de::Error>(self, v: char) -> Result<DtmfDigit, E> {
                DtmfDigit::from_char(v).ok_or_else(|| E::invalid_value(de::Unexpected::Char(v), &self))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<DtmfDigit, E> {
                char::from_digit(v as u32, 10)
                    .filter(|_| v < 10)
                    .and_then(DtmfDigit::from_char)
                    .ok_or_else(|| E::invalid_value(de::Unexpected::Unsigned(v), &self))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<DtmfDigit, E> {
                if v < 0 {
                    return Err(E::invalid_value(de::Unexpected::Signed(v), &self));
                }
                self.visit_u64(v as u64)
            }
        }

        deserializer.deserialize_any(DigitVisitor)
    }
}

/// Mailbox handle produced by authentication
///
/// The writer uses it to decide where the message goes and which greeting
/// context applies (`busy` versus unavailable).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mailbox {
    pub domain: String,
    pub mailbox_number: String,
    /// Whether the owner was busy (as opposed to not answering)
    pub busy: bool,
}

impl Mailbox {
    pub fn new(domain: impl Into<String>, mailbox_number: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            mailbox_number: mailbox_number.into(),
            busy: false,
        }
    }

    pub fn set_busy(&mut self, busy: bool) {
        self.busy = busy;
    }
}

impl fmt::Display for Mailbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.mailbox_number, self.domain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dtmf_char_mapping() {
        for c in "0123456789*#ABCD".chars() {
            let digit = DtmfDigit::from_char(c).expect("valid DTMF char");
            assert_eq!(digit.to_char(), c);
        }
        assert_eq!(DtmfDigit::from_char('b'), Some(DtmfDigit::B));
        assert_eq!(DtmfDigit::from_char('x'), None);
        assert_eq!(DtmfDigit::from_char(' '), None);
    }

    #[test]
    fn test_session_state_names() {
        assert_eq!(SessionState::Authenticating.to_string(), "authenticating");
        assert!(SessionState::Done.is_terminal());
        assert!(!SessionState::Ready.is_terminal());

        let state: SessionState = serde_yaml::from_str("auth").unwrap();
        assert_eq!(state, SessionState::Authenticating);
    }

    #[test]
    fn test_dtmf_digit_deserialize() {
        let pound: DtmfDigit = serde_yaml::from_str("'#'").unwrap();
        assert_eq!(pound, DtmfDigit::Pound);

        let one: DtmfDigit = serde_yaml::from_str("1").unwrap();
        assert_eq!(one, DtmfDigit::Digit1);

        assert!(serde_yaml::from_str::<DtmfDigit>("12").is_err());
        assert!(serde_yaml::from_str::<DtmfDigit>("'##'").is_err());
        assert!(serde_yaml::from_str::<DtmfDigit>("x").is_err());
    }
}
