use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Literal written to the stores for any value that is not available.
pub const NOT_AVAILABLE: &str = "N/A";

/// A value that was either reported or is explicitly unavailable.
///
/// Stored as the bare value or as the literal `"N/A"`. Decoding is lenient:
/// `null`, `"N/A"` and anything that does not decode as `T` all become
/// [`Figure::Unavailable`], so a non-numeric market cap reads as missing
/// instead of failing the whole store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Figure<T> {
    Known(T),
    Unavailable,
}

impl<T> Default for Figure<T> {
    fn default() -> Self {
        Figure::Unavailable
    }
}

impl<T> Figure<T> {
    pub fn is_known(&self) -> bool {
        matches!(self, Figure::Known(_))
    }

    pub fn as_ref(&self) -> Figure<&T> {
        match self {
            Figure::Known(v) => Figure::Known(v),
            Figure::Unavailable => Figure::Unavailable,
        }
    }

    pub fn known(&self) -> Option<&T> {
        match self {
            Figure::Known(v) => Some(v),
            Figure::Unavailable => None,
        }
    }

    pub fn into_option(self) -> Option<T> {
        match self {
            Figure::Known(v) => Some(v),
            Figure::Unavailable => None,
        }
    }
}

impl<T: Copy> Figure<T> {
    pub fn get(&self) -> Option<T> {
        self.known().copied()
    }
}

impl Figure<f64> {
    /// Known only when the number is finite.
    pub fn finite(v: f64) -> Self {
        if v.is_finite() {
            Figure::Known(v)
        } else {
            Figure::Unavailable
        }
    }

    pub fn finite_value(&self) -> Option<f64> {
        self.get().filter(|v| v.is_finite())
    }
}

impl Figure<String> {
    /// Trimmed text, `None` when unavailable or blank.
    pub fn text(&self) -> Option<&str> {
        self.known()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty() && *s != NOT_AVAILABLE)
    }
}

impl<T> From<Option<T>> for Figure<T> {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => Figure::Known(v),
            None => Figure::Unavailable,
        }
    }
}

impl<T: Serialize> Serialize for Figure<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Figure::Known(v) => v.serialize(serializer),
            Figure::Unavailable => serializer.serialize_str(NOT_AVAILABLE),
        }
    }
}

impl<'de, T: DeserializeOwned> Deserialize<'de> for Figure<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        Ok(match raw {
            Value::Null => Figure::Unavailable,
            Value::String(ref s) if s == NOT_AVAILABLE => Figure::Unavailable,
            other => serde_json::from_value(other)
                .map(Figure::Known)
                .unwrap_or(Figure::Unavailable),
        })
    }
}
