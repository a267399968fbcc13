use indexmap::IndexMap;

/// Submitted form data.
///
/// Keys posted as `name[]` are stored under `name` and remembered as
/// arrays; nested keys such as `time_quote[h]` are kept verbatim.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormInput {
    values: IndexMap<String, Vec<String>>,
    arrays: Vec<String>,
}

impl FormInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut input = Self::new();
        for (key, value) in pairs {
            input.push(key, value);
        }
        input
    }

    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let key = match key.strip_suffix("[]") {
            Some(base) => {
                if !self.arrays.iter().any(|k| k == base) {
                    self.arrays.push(base.to_string());
                }
                base.to_string()
            }
            None => key,
        };
        self.values.entry(key).or_default().push(value.into());
    }

    /// First value posted under `name` (with or without a `[]` suffix).
    pub fn get(&self, name: &str) -> Option<&str> {
        self.get_all(name).first().map(String::as_str)
    }

    pub fn get_all(&self, name: &str) -> &[String] {
        self.values
            .get(normalize(name))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn has(&self, name: &str) -> bool {
        self.values.contains_key(normalize(name))
    }

    /// True when the key was posted as an array or carries several values.
    pub fn is_array(&self, name: &str) -> bool {
        let name = normalize(name);
        self.arrays.iter().any(|k| k == name) || self.get_all(name).len() > 1
    }

    /// Non-empty value parsed as an integer.
    pub fn get_i64(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(|v| v.trim().parse().ok())
    }

    /// Every non-empty value parsed as an integer, skipping garbage.
    pub fn get_all_i64(&self, name: &str) -> Vec<i64> {
        self.get_all(name)
            .iter()
            .filter_map(|v| v.trim().parse().ok())
            .collect()
    }

    /// Trimmed value if present and not blank.
    pub fn filled(&self, name: &str) -> Option<&str> {
        self.get(name).map(str::trim).filter(|v| !v.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

fn normalize(name: &str) -> &str {
    name.strip_suffix("[]").unwrap_or(name)
}
