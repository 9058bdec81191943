use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use thiserror::Error;

/// Stable handle identifying an [`crate::ontology::Ontology`] within a store.
///
/// Identifiers are allocated once per process and never reused, so a
/// `TermRef` captured before an ontology is dropped can never silently
/// alias a different ontology later.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OntologyId(pub(crate) u32);

impl OntologyId {
    /// Returns the raw numeric identifier.
    #[must_use]
    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl Display for OntologyId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "o{}", self.0)
    }
}

/// Index of a term inside its owning ontology's arena.
///
/// Term slots are tombstoned on deletion and indices are never reused.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TermId(pub(crate) u32);

impl TermId {
    /// Returns the raw arena index.
    #[must_use]
    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl Display for TermId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

/// Fully qualified handle to a term: the owning ontology plus the arena slot.
///
/// This is the currency of the reasoning layer; everything outside an
/// [`crate::ontology::Ontology`] addresses terms through `TermRef` handles
/// rather than references, so mutually referential term graphs carry no
/// ownership cycles.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TermRef {
    pub ontology: OntologyId,
    pub term: TermId,
}

impl TermRef {
    /// Builds a handle from its two parts.
    #[must_use]
    pub fn new(ontology: OntologyId, term: TermId) -> Self {
        Self { ontology, term }
    }
}

impl Display for TermRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.ontology, self.term)
    }
}

/// Value object ensuring that supplied text is a usable term name.
///
/// Names must be unique within their ontology, so the constructor rejects
/// text that could not round-trip through the flat triples format: empty
/// strings and anything containing a tab or line break.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TermName {
    value: String,
}

impl TermName {
    /// Validates and constructs a new [`TermName`].
    pub fn new(value: impl Into<String>) -> Result<Self, NameError> {
        let value = value.into();
        if value.is_empty() {
            return Err(NameError::Empty);
        }
        if value.chars().any(|c| c == '\t' || c == '\n' || c == '\r') {
            return Err(NameError::Unprintable { value });
        }
        Ok(Self { value })
    }

    /// Returns the underlying textual representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.value
    }
}

impl Display for TermName {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

impl FromStr for TermName {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_owned())
    }
}

impl TryFrom<String> for TermName {
    type Error = NameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

/// Errors produced when validating a [`TermName`].
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum NameError {
    /// Term names must be non-empty.
    #[error("term names must not be empty")]
    Empty,
    /// The supplied text contains tab or line-break characters.
    #[error("term name contains unprintable separators: {value:?}")]
    Unprintable { value: String },
}

#[cfg(test)]
mod tests {
    use super::{NameError, TermName};

    #[test]
    fn accepts_plain_names() {
        let name = TermName::new("sub-type-of").expect("valid name");
        assert_eq!(name.as_str(), "sub-type-of");
    }

    #[test]
    fn accepts_generated_triple_names() {
        let name = TermName::new("(socrates, man, instance-of)").expect("valid name");
        assert_eq!(name.as_str(), "(socrates, man, instance-of)");
    }

    #[test]
    fn rejects_empty_names() {
        let err = TermName::new("").expect_err("empty name");
        assert_eq!(err, NameError::Empty);
    }

    #[test]
    fn rejects_separator_characters() {
        let err = TermName::new("a\tb").expect_err("tab in name");
        assert!(matches!(err, NameError::Unprintable { value } if value == "a\tb"));
    }
}
