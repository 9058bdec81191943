//! Bootstraps the built-in core vocabulary.
//!
//! The core ontology ships as a flat-format resource compiled into the
//! binary. [`init_core`] parses it into a fresh ontology and binds the
//! well-known terms the reasoning layer depends on.

use thiserror::Error;

use super::io::{parse_flat, ParseError};
use super::store::{OntologyHandle, OntologyStore};
use super::value_objects::{TermName, TermRef};

const CORE_SOURCE: &str = include_str!("../../resources/core.onto");

/// Errors raised while loading the core vocabulary.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// The bundled resource failed to parse.
    #[error(transparent)]
    Parse(#[from] ParseError),
    /// A well-known term is missing from the resource.
    #[error("core vocabulary is missing the term {name:?}")]
    MissingTerm { name: String },
}

/// Handles to the well-known terms of the core vocabulary.
///
/// Every reasoning domain holds one of these; handles compare by identity,
/// so checking whether some relation "is" `is-a` is a `TermRef` comparison
/// after remote links are resolved.
#[derive(Clone)]
pub struct CoreOntology {
    pub handle: OntologyHandle,
    pub any: TermRef,
    pub type_term: TermRef,
    pub relation: TermRef,
    pub boolean: TermRef,
    pub is_a: TermRef,
    pub instance_of: TermRef,
    pub sub_type_of: TermRef,
    pub domain: TermRef,
    pub co_domain: TermRef,
    pub and: TermRef,
    pub or: TermRef,
    pub implies: TermRef,
    pub true_value: TermRef,
    pub false_value: TermRef,
    pub set: TermRef,
    pub member_of: TermRef,
    pub subset_of: TermRef,
    pub size: TermRef,
}

impl CoreOntology {
    /// True when the resolved relation is one of the logical connectives.
    #[must_use]
    pub fn is_connective(&self, relation: TermRef) -> bool {
        relation == self.and || relation == self.or || relation == self.implies
    }
}

fn required(handle: &OntologyHandle, name: &str) -> Result<TermRef, BootstrapError> {
    let parsed = TermName::new(name).map_err(|_| BootstrapError::MissingTerm {
        name: name.to_owned(),
    })?;
    handle
        .term_by_name(&parsed)
        .ok_or_else(|| BootstrapError::MissingTerm {
            name: name.to_owned(),
        })
}

/// Parses the bundled core vocabulary into `store` and binds its terms.
pub fn init_core(store: &OntologyStore) -> Result<CoreOntology, BootstrapError> {
    let handle = parse_flat(store, CORE_SOURCE)?;
    tracing::debug!(ontology = %handle.id(), "loaded core vocabulary");
    Ok(CoreOntology {
        any: required(&handle, "any")?,
        type_term: required(&handle, "type")?,
        relation: required(&handle, "relation")?,
        boolean: required(&handle, "boolean")?,
        is_a: required(&handle, "is-a")?,
        instance_of: required(&handle, "instance-of")?,
        sub_type_of: required(&handle, "sub-type-of")?,
        domain: required(&handle, "domain")?,
        co_domain: required(&handle, "co-domain")?,
        and: required(&handle, "and")?,
        or: required(&handle, "or")?,
        implies: required(&handle, "implies")?,
        true_value: required(&handle, "true")?,
        false_value: required(&handle, "false")?,
        set: required(&handle, "set")?,
        member_of: required(&handle, "member-of")?,
        subset_of: required(&handle, "subset-of")?,
        size: required(&handle, "size")?,
        handle,
    })
}

#[cfg(test)]
mod tests {
    use super::super::store::OntologyStore;
    use super::init_core;

    #[test]
    fn core_vocabulary_loads() {
        let store = OntologyStore::new();
        let core = init_core(&store).expect("core vocabulary");
        assert_eq!(core.handle.read(|o| o.name().to_owned()), "core");
        assert_ne!(core.true_value, core.false_value);
        assert!(core.is_connective(core.and));
        assert!(!core.is_connective(core.is_a));
    }

    #[test]
    fn each_store_gets_its_own_core() {
        let store = OntologyStore::new();
        let first = init_core(&store).unwrap();
        let second = init_core(&store).unwrap();
        assert_ne!(first.handle.id(), second.handle.id());
    }
}
