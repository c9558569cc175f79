use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Wraps customer-identifying values (emails, phone numbers, account numbers)
/// so they never reach log output in clear text.
///
/// Serialization is untouched: API responses and stored documents carry the real value.
#[derive(Clone, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct Masked<T>(pub T);

impl<T: AsRef<str>> Masked<T> {
    /// Keeps the first character and the domain/last two characters visible.
    pub fn hint(&self) -> String {
        let raw = self.0.as_ref();
        if let Some((local, domain)) = raw.split_once('@') {
            let first = local.chars().next().map(String::from).unwrap_or_default();
            return format!("{}***@{}", first, domain);
        }
        let count = raw.chars().count();
        if count <= 4 {
            return "****".to_string();
        }
        let tail: String = raw.chars().skip(count - 2).collect();
        format!("****{}", tail)
    }
}

impl<T: AsRef<str>> fmt::Debug for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.hint())
    }
}

impl<T: AsRef<str>> fmt::Display for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.hint())
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
    pub fn into_inner(self) -> T {
        self.0
    }

    pub fn expose(&self) -> &T {
        &self.0
    }
}
