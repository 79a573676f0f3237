use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

/// Version number of a stored document, used for optimistic concurrency control.
///
/// A freshly inserted document is at version 1; every successful write
/// increments it by one.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Version(i64);

impl Version {
    /// Creates a new version from a raw value.
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the version of a document that has not been stored yet.
    pub fn initial() -> Self {
        Self(0)
    }

    /// Returns the version assigned on insert.
    pub fn first() -> Self {
        Self(1)
    }

    /// Returns the next version.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns the raw version value.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Version {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<Version> for i64 {
    fn from(version: Version) -> Self {
        version.0
    }
}

/// A stored document: a JSON body plus the bookkeeping the store maintains.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Collection the document belongs to (e.g. "products").
    pub collection: String,

    /// Id, unique within the collection.
    pub id: String,

    /// Current version.
    pub version: Version,

    /// When the document was first inserted.
    pub created_at: DateTime<Utc>,

    /// When the document was last written.
    pub updated_at: DateTime<Utc>,

    /// The document body.
    pub body: serde_json::Value,
}

impl Document {
    /// Deserializes the body into a typed value.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.body.clone())
    }

    /// Consumes the document and deserializes its body.
    pub fn into_decoded<T: DeserializeOwned>(self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.body)
    }

    /// Reads an integer at a dot-separated path inside the body.
    pub fn integer_at(&self, path: &str) -> Option<i64> {
        value_at(&self.body, path).and_then(serde_json::Value::as_i64)
    }
}

/// Resolves a dot-separated path (`"seller.region"`) inside a JSON value.
pub(crate) fn value_at<'a>(value: &'a serde_json::Value, path: &str) -> Option<&'a serde_json::Value> {
    path.split('.')
        .try_fold(value, |current, segment| current.get(segment))
}

/// Mutable counterpart of [`value_at`].
pub(crate) fn value_at_mut<'a>(
    value: &'a mut serde_json::Value,
    path: &str,
) -> Option<&'a mut serde_json::Value> {
    path.split('.')
        .try_fold(value, |current, segment| current.get_mut(segment))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(body: serde_json::Value) -> Document {
        Document {
            collection: "products".to_string(),
            id: "p1".to_string(),
            version: Version::first(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            body,
        }
    }

    #[test]
    fn version_initial_and_first() {
        assert_eq!(Version::initial().as_i64(), 0);
        assert_eq!(Version::initial().next(), Version::first());
        assert!(Version::first() < Version::new(2));
    }

    #[test]
    fn integer_at_follows_nested_paths() {
        let d = doc(json!({"available_stock": 7, "seller": {"rating": 4}}));
        assert_eq!(d.integer_at("available_stock"), Some(7));
        assert_eq!(d.integer_at("seller.rating"), Some(4));
        assert_eq!(d.integer_at("seller.missing"), None);
    }

    #[test]
    fn decode_into_typed_body() {
        #[derive(Deserialize)]
        struct Body {
            title: String,
        }
        let d = doc(json!({"title": "Aman rice"}));
        let body: Body = d.decode().unwrap();
        assert_eq!(body.title, "Aman rice");
    }
}
