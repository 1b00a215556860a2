use std::collections::BTreeSet;
use std::fmt;

use crate::error::NameError;

pub const DEFAULT_EXTENSIONS: [&str; 3] = ["png", "jpg", "svg"];

/// Extensions an upload may carry. Matching is exact and case-sensitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionAllowList {
    extensions: BTreeSet<String>,
}

impl ExtensionAllowList {
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            extensions: extensions.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_allowed(&self, extension: &str) -> bool {
        self.extensions.contains(extension)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.extensions.iter().map(String::as_str)
    }
}

impl Default for ExtensionAllowList {
    fn default() -> Self {
        Self::new(DEFAULT_EXTENSIONS)
    }
}

/// A validated `(base, extension)` pair, ready to be turned into a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadName {
    base: String,
    extension: String,
}

impl UploadName {
    /// Validates both parts. The extension is not checked against any allow-list here.
    pub fn new(base: impl Into<String>, extension: impl Into<String>) -> Result<Self, NameError> {
        let base = base.into();
        let extension = extension.into();

        if base.is_empty() {
            return Err(NameError::EmptyBaseName);
        }
        if !is_storable(&base) || base.contains('.') {
            return Err(NameError::InvalidBaseName(base));
        }
        if extension.is_empty() || !is_storable(&extension) {
            return Err(NameError::InvalidExtension(extension));
        }
        Ok(Self { base, extension })
    }

    /// Splits a client filename at its first `.`; everything after it is the extension.
    ///
    /// `"a.b.c"` therefore has the extension `"b.c"`, which no allow-list entry matches.
    pub fn parse(filename: &str, allowed: &ExtensionAllowList) -> Result<Self, NameError> {
        let (base, extension) = filename
            .split_once('.')
            .ok_or_else(|| NameError::MissingExtension(filename.to_string()))?;
        if !allowed.is_allowed(extension) {
            return Err(NameError::InvalidExtension(extension.to_string()));
        }
        Self::new(base, extension)
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }
}

fn is_storable(part: &str) -> bool {
    !part.contains(['/', '\\']) && !part.chars().any(char::is_control)
}

/// A store key of the form `base(N).extension`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageKey {
    key: String,
    base_len: usize,
    index: u64,
}

impl ImageKey {
    pub fn new(name: &UploadName, index: u64) -> Self {
        Self {
            key: format!("{}({}).{}", name.base, index, name.extension),
            base_len: name.base.len(),
            index,
        }
    }

    /// Structural parse of a stored key; `None` for anything not shaped like one.
    ///
    /// The base may itself contain parentheses, so the disambiguator is taken
    /// from the last `(` before the first `.`.
    pub fn parse(key: &str) -> Option<Self> {
        let (stem, extension) = key.split_once('.')?;
        if extension.is_empty() {
            return None;
        }
        let stem = stem.strip_suffix(')')?;
        let open = stem.rfind('(')?;
        let digits = &stem[open + 1..];
        if open == 0 || digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let index = digits.parse().ok()?;
        Some(Self {
            key: key.to_string(),
            base_len: open,
            index,
        })
    }

    pub fn base(&self) -> &str {
        &self.key[..self.base_len]
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn extension(&self) -> &str {
        // `base(` + digits + `).`
        let suffix_start = self.key[self.base_len..]
            .find(").")
            .map(|pos| self.base_len + pos + 2)
            .unwrap_or(self.key.len());
        &self.key[suffix_start..]
    }

    /// Whether this key belongs to exactly `name`'s base and extension.
    pub fn matches(&self, name: &UploadName) -> bool {
        self.base() == name.base() && self.extension() == name.extension()
    }

    pub fn as_str(&self) -> &str {
        &self.key
    }

    pub fn into_string(self) -> String {
        self.key
    }
}

impl fmt::Display for ImageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}
