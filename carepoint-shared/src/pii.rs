use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Wrapper for credentials and other secrets. `Debug` and `Display` print a
/// placeholder so bearer tokens never reach `tracing` output, while
/// serialization writes the real value (the session record needs it).
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Masked<T>(pub T);

impl<T> fmt::Debug for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "********")
    }
}

impl<T> fmt::Display for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "********")
    }
}

impl<T: Serialize> Serialize for Masked<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.0.serialize(serializer)
    }
}

impl<T> Masked<T> {
    /// Borrow the secret. Call sites should be the few places that send it.
    pub fn expose(&self) -> &T {
        &self.0
    }
}

impl From<String> for Masked<String> {
    fn from(value: String) -> Self {
        Masked(value)
    }
}

impl From<&str> for Masked<String> {
    fn from(value: &str) -> Self {
        Masked(value.to_string())
    }
}
