use serde_json::Value;

use crate::document::value_at;

/// A predicate on a document body. Paths are dot-separated.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// The value at `path` equals `value`.
    Eq { path: String, value: Value },

    /// The array at `path` contains `value`.
    Contains { path: String, value: Value },

    /// The number at `path` lies within the inclusive bounds.
    Range {
        path: String,
        min: Option<i64>,
        max: Option<i64>,
    },

    /// Some string at one of `paths` contains `needle`, ignoring case.
    Text { paths: Vec<String>, needle: String },

    /// At least one of the nested filters matches. Empty never matches.
    Any(Vec<Filter>),
}

impl Filter {
    /// Returns true if the body satisfies this predicate.
    pub fn matches(&self, body: &Value) -> bool {
        match self {
            Filter::Eq { path, value } => value_at(body, path) == Some(value),
            Filter::Contains { path, value } => value_at(body, path)
                .and_then(Value::as_array)
                .is_some_and(|items| items.contains(value)),
            Filter::Range { path, min, max } => value_at(body, path)
                .and_then(Value::as_f64)
                .is_some_and(|n| {
                    min.is_none_or(|min| n >= min as f64) && max.is_none_or(|max| n <= max as f64)
                }),
            Filter::Text { paths, needle } => {
                let needle = needle.to_lowercase();
                paths.iter().any(|path| {
                    value_at(body, path)
                        .and_then(Value::as_str)
                        .is_some_and(|text| text.to_lowercase().contains(&needle))
                })
            }
            Filter::Any(filters) => filters.iter().any(|f| f.matches(body)),
        }
    }
}

/// Splits a dot-separated path into segments, as Postgres `#>` expects.
pub(crate) fn path_segments(path: &str) -> Vec<String> {
    path.split('.').map(str::to_string).collect()
}

/// Builder for filtered range queries over one collection.
///
/// Results are ordered by insertion time, oldest first unless
/// [`DocumentQuery::newest_first`] is set.
#[derive(Debug, Clone, Default)]
pub struct DocumentQuery {
    /// All filters must match.
    pub filters: Vec<Filter>,

    /// Order by creation time descending.
    pub newest_first: bool,

    /// Maximum number of documents to return.
    pub limit: Option<usize>,

    /// Number of documents to skip.
    pub offset: Option<usize>,
}

impl DocumentQuery {
    /// Creates a query matching every document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requires the value at `path` to equal `value`.
    pub fn eq(mut self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Eq {
            path: path.into(),
            value: value.into(),
        });
        self
    }

    /// Requires the array at `path` to contain `value`.
    pub fn contains(mut self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Contains {
            path: path.into(),
            value: value.into(),
        });
        self
    }

    /// Requires the number at `path` to lie within the inclusive bounds.
    pub fn range(mut self, path: impl Into<String>, min: Option<i64>, max: Option<i64>) -> Self {
        self.filters.push(Filter::Range {
            path: path.into(),
            min,
            max,
        });
        self
    }

    /// Requires one of `paths` to hold a string containing `needle`, ignoring case.
    pub fn text<P: Into<String>>(
        mut self,
        paths: impl IntoIterator<Item = P>,
        needle: impl Into<String>,
    ) -> Self {
        self.filters.push(Filter::Text {
            paths: paths.into_iter().map(Into::into).collect(),
            needle: needle.into(),
        });
        self
    }

    /// Requires at least one of `filters` to match.
    pub fn any(mut self, filters: Vec<Filter>) -> Self {
        self.filters.push(Filter::Any(filters));
        self
    }

    /// Orders results newest first.
    pub fn newest_first(mut self) -> Self {
        self.newest_first = true;
        self
    }

    /// Limits the number of results.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skips the first `offset` results.
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Returns true if the body satisfies every filter.
    pub fn matches(&self, body: &Value) -> bool {
        self.filters.iter().all(|f| f.matches(body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn eq_filter_matches_nested_path() {
        let body = json!({"status": "approved", "seller": {"region": "Dhaka"}});
        let query = DocumentQuery::new()
            .eq("status", "approved")
            .eq("seller.region", "Dhaka");
        assert!(query.matches(&body));

        let other = DocumentQuery::new().eq("seller.region", "Khulna");
        assert!(!other.matches(&body));
    }

    #[test]
    fn contains_filter_requires_array() {
        let body = json!({"seller_ids": ["s1", "s2"], "buyer": "b1"});
        assert!(DocumentQuery::new().contains("seller_ids", "s2").matches(&body));
        assert!(!DocumentQuery::new().contains("seller_ids", "s3").matches(&body));
        assert!(!DocumentQuery::new().contains("buyer", "b1").matches(&body));
    }

    #[test]
    fn empty_query_matches_everything() {
        assert!(DocumentQuery::new().matches(&json!({})));
    }

    #[test]
    fn range_filter_is_inclusive_and_numeric() {
        let body = json!({"price": 500, "title": "Rice"});
        assert!(DocumentQuery::new().range("price", Some(500), Some(500)).matches(&body));
        assert!(!DocumentQuery::new().range("price", None, Some(499)).matches(&body));
        assert!(DocumentQuery::new().range("price", Some(100), None).matches(&body));
        assert!(!DocumentQuery::new().range("title", None, None).matches(&body));
    }

    #[test]
    fn text_filter_ignores_case_across_paths() {
        let body = json!({"title": "Aromatic Rice", "crop_type": "Grain", "stock": 4});
        assert!(DocumentQuery::new().text(["title", "crop_type"], "rice").matches(&body));
        assert!(DocumentQuery::new().text(["title", "crop_type"], "GRA").matches(&body));
        assert!(!DocumentQuery::new().text(["title"], "grain").matches(&body));
        assert!(!DocumentQuery::new().text(["stock"], "4").matches(&body));
    }

    #[test]
    fn any_filter_is_a_disjunction() {
        let body = json!({"buyer": {"id": "u1"}, "seller_ids": ["s1"]});
        let either = |id: &str| {
            DocumentQuery::new().any(vec![
                Filter::Eq {
                    path: "buyer.id".into(),
                    value: json!(id),
                },
                Filter::Contains {
                    path: "seller_ids".into(),
                    value: json!(id),
                },
            ])
        };
        assert!(either("u1").matches(&body));
        assert!(either("s1").matches(&body));
        assert!(!either("x").matches(&body));
        assert!(!DocumentQuery::new().any(vec![]).matches(&body));
    }

    #[test]
    fn path_segments_split_on_dots() {
        assert_eq!(path_segments("buyer.id"), vec!["buyer", "id"]);
    }
}
