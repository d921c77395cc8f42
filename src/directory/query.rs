//! Relative request paths for the directory REST API.

use url::form_urlencoded;

/// Builder for a relative directory path with OData query options.
///
/// Option names are emitted verbatim; values are percent-encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryQuery {
    version: String,
    resource: String,
    options: Vec<(&'static str, String)>,
}

impl DirectoryQuery {
    /// Start a query against `resource` (e.g. `users` or `groups/{id}`) on
    /// the given API version.
    #[must_use]
    pub fn new(version: &str, resource: impl Into<String>) -> Self {
        Self {
            version: version.to_string(),
            resource: resource.into(),
            options: Vec::new(),
        }
    }

    /// Restrict the returned attributes.
    #[must_use]
    pub fn select<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let fields: Vec<String> = fields
            .into_iter()
            .map(|f| f.as_ref().to_string())
            .filter(|f| !f.is_empty())
            .collect();
        if !fields.is_empty() {
            self.options.push(("$select", fields.join(",")));
        }
        self
    }

    /// Add a `$filter` expression. An empty expression is ignored.
    #[must_use]
    pub fn filter(mut self, expression: impl Into<String>) -> Self {
        let expression = expression.into();
        if !expression.is_empty() {
            self.options.push(("$filter", expression));
        }
        self
    }

    /// Add an `$expand` expression.
    #[must_use]
    pub fn expand(mut self, expression: impl Into<String>) -> Self {
        self.options.push(("$expand", expression.into()));
        self
    }

    /// Add a `$search` expression.
    #[must_use]
    pub fn search(mut self, expression: impl Into<String>) -> Self {
        self.options.push(("$search", expression.into()));
        self
    }

    /// Request the collection count, required by advanced filters.
    #[must_use]
    pub fn count(mut self) -> Self {
        self.options.push(("$count", "true".to_string()));
        self
    }

    /// Render the relative path, e.g. `/v1.0/users?$select=id`.
    #[must_use]
    pub fn build(&self) -> String {
        let mut path = format!("/{}/{}", self.version, self.resource);
        for (i, (name, value)) in self.options.iter().enumerate() {
            path.push(if i == 0 { '?' } else { '&' });
            path.push_str(name);
            path.push('=');
            path.push_str(&encode_value(value));
        }
        path
    }
}

impl std::fmt::Display for DirectoryQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.build())
    }
}

fn encode_value(value: &str) -> String {
    // A literal '+' is emitted as %2B, so every remaining '+' is a space.
    form_urlencoded::byte_serialize(value.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}
