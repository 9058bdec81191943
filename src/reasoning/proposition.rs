//! Canonical proposition trees.
//!
//! Terms drawn from different ontologies may denote the same statement
//! through remote links and reified triples. [`canonicalize`] collapses a
//! term into a [`Prop`] tree over resolved handles, giving the reasoning
//! layer a value it can order, hash and compare structurally. The truth
//! cache and solution dedup both key on these trees.

use crate::ontology::{OntologyError, OntologyStore, TermKind, TermRef};

/// A term viewed as a logical proposition.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Prop {
    /// A resolved constant.
    Atom(TermRef),
    /// A resolved variable slot.
    Variable(TermRef),
    /// A compound statement over three sub-propositions.
    Triple {
        subject: Box<Prop>,
        object: Box<Prop>,
        relation: Box<Prop>,
    },
}

impl Prop {
    /// True when no variable occurs anywhere in the tree.
    #[must_use]
    pub fn is_ground(&self) -> bool {
        match self {
            Prop::Atom(_) => true,
            Prop::Variable(_) => false,
            Prop::Triple {
                subject,
                object,
                relation,
            } => subject.is_ground() && object.is_ground() && relation.is_ground(),
        }
    }

    /// Top-level components when the proposition is a compound statement.
    #[must_use]
    pub fn as_triple(&self) -> Option<(&Prop, &Prop, &Prop)> {
        match self {
            Prop::Triple {
                subject,
                object,
                relation,
            } => Some((subject, object, relation)),
            _ => None,
        }
    }
}

/// Collapses a term into its canonical proposition tree.
///
/// Remote links are chased first. Reified triples and fully bound patterns
/// both canonicalize to [`Prop::Triple`], so a statement asserted directly
/// and one written as a `(source,relation,target)` token compare equal.
/// Partially bound patterns are opaque and canonicalize as atoms.
pub fn canonicalize(store: &OntologyStore, term: TermRef) -> Result<Prop, OntologyError> {
    let (resolved, term) = store.resolve(term)?;
    Ok(match term.kind {
        TermKind::Atom => Prop::Atom(resolved),
        TermKind::Variable => Prop::Variable(resolved),
        TermKind::Triple(t) => Prop::Triple {
            subject: Box::new(canonicalize(store, t.subject)?),
            object: Box::new(canonicalize(store, t.object)?),
            relation: Box::new(canonicalize(store, t.relation)?),
        },
        TermKind::Pattern {
            subject: Some(s),
            object: Some(o),
            relation: Some(r),
        } => Prop::Triple {
            subject: Box::new(canonicalize(store, s)?),
            object: Box::new(canonicalize(store, o)?),
            relation: Box::new(canonicalize(store, r)?),
        },
        TermKind::Pattern { .. } => Prop::Atom(resolved),
        TermKind::Remote { .. } => unreachable!("resolve returns non-remote terms"),
    })
}

/// Renders a proposition with resolved term names.
pub fn render(store: &OntologyStore, prop: &Prop) -> Result<String, OntologyError> {
    Ok(match prop {
        Prop::Atom(t) => store.resolve_name(*t)?.as_str().to_owned(),
        Prop::Variable(t) => format!("?{}", store.resolve_name(*t)?),
        Prop::Triple {
            subject,
            object,
            relation,
        } => format!(
            "({}, {}, {})",
            render(store, subject)?,
            render(store, object)?,
            render(store, relation)?
        ),
    })
}

/// Cached evaluation state of a ground proposition.
///
/// `Proving` marks a proposition currently on the evaluation stack; seeing
/// it again means the proof depends on itself, which counts as false.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Truth {
    True,
    False,
    Proving,
}

/// One statement an inference query established as true.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Proposition {
    prop: Prop,
}

impl Proposition {
    pub(crate) fn new(prop: Prop) -> Self {
        Self { prop }
    }

    /// The canonical proposition tree.
    #[must_use]
    pub fn prop(&self) -> &Prop {
        &self.prop
    }

    /// Resolved component handles when the statement is a flat triple.
    #[must_use]
    pub fn components(&self) -> Option<(TermRef, TermRef, TermRef)> {
        let (s, o, r) = self.prop.as_triple()?;
        match (s, o, r) {
            (&Prop::Atom(s), &Prop::Atom(o), &Prop::Atom(r)) => Some((s, o, r)),
            _ => None,
        }
    }

    /// Human-readable rendering with resolved names.
    pub fn render(&self, store: &OntologyStore) -> Result<String, OntologyError> {
        render(store, &self.prop)
    }
}

#[cfg(test)]
mod tests {
    use crate::ontology::{parse_flat, OntologyStore, TermName};

    use super::{canonicalize, render, Prop};

    #[test]
    fn pattern_and_reified_triple_canonicalize_alike() {
        let store = OntologyStore::new();
        let onto = parse_flat(&store, "#name: t\na rel b\n(a,rel,b) said-by c\n").unwrap();
        let reified = onto
            .term_by_name(&TermName::new("(a, b, rel)").unwrap())
            .unwrap();
        let pattern = onto
            .term_by_name(&TermName::new("(a,rel,b)").unwrap())
            .unwrap();
        let left = canonicalize(&store, reified).unwrap();
        let right = canonicalize(&store, pattern).unwrap();
        assert_eq!(left, right);
        assert!(left.is_ground());
        assert_eq!(render(&store, &left).unwrap(), "(a, b, rel)");
    }

    #[test]
    fn remote_views_collapse_to_their_origin() {
        let store = OntologyStore::new();
        let base = store.create_ontology("base", "");
        let other = store.create_ontology("other", "");
        let origin = base.create_term("origin", "").unwrap();
        let borrowed = other.import_term(&store, origin).unwrap();
        assert_eq!(
            canonicalize(&store, borrowed).unwrap(),
            Prop::Atom(origin)
        );
    }

    #[test]
    fn variables_are_not_ground() {
        let store = OntologyStore::new();
        let onto = store.create_ontology("v", "");
        let v = onto.create_variable("X", "").unwrap();
        let prop = canonicalize(&store, v).unwrap();
        assert_eq!(prop, Prop::Variable(v));
        assert!(!prop.is_ground());
        assert_eq!(render(&store, &prop).unwrap(), "?X");
    }
}
