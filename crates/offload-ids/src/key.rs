//! Allocation keys

use std::fmt;

/// Key a client uses to refer to a layout resource.
///
/// Resources are named either by an integer chosen by the client or by a
/// string name. The two kinds never compare equal, so `Int(1)` and
/// `Str("1")` receive distinct ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IdKey {
    Int(i32),
    Str(String),
}

impl IdKey {
    /// Integer value, if this is an integer key
    pub fn as_int(&self) -> Option<i32> {
        match self {
            IdKey::Int(value) => Some(*value),
            IdKey::Str(_) => None,
        }
    }
}

impl From<i32> for IdKey {
    fn from(value: i32) -> Self {
        IdKey::Int(value)
    }
}

impl From<&str> for IdKey {
    fn from(name: &str) -> Self {
        IdKey::Str(name.to_string())
    }
}

impl From<String> for IdKey {
    fn from(name: String) -> Self {
        IdKey::Str(name)
    }
}

impl fmt::Display for IdKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdKey::Int(value) => write!(f, "#{}", value),
            IdKey::Str(name) => write!(f, "\"{}\"", name),
        }
    }
}
