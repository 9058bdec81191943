//! Reusable operations over ontologies: `is-a` reachability and transitive
//! closure materialisation.

use std::collections::BTreeSet;
use std::sync::Mutex;

use thiserror::Error;

use super::bootstrap::CoreOntology;
use super::entities::{OntologyError, TermKind};
use super::store::{OntologyHandle, OntologyStore};
use super::value_objects::TermRef;

/// Errors raised by ontology-level operations.
#[derive(Debug, Error)]
pub enum OpsError {
    /// Both terms of an `is-a` query must live in the same ontology.
    #[error("is-a query spans ontologies: {subject} vs {object}")]
    CrossOntology { subject: TermRef, object: TermRef },
    /// A handle named a dead or missing term.
    #[error("operation referenced an invalid term {term}")]
    InvalidTerm { term: TermRef },
    /// An underlying ontology mutation or lookup failed.
    #[error(transparent)]
    Ontology(#[from] OntologyError),
}

/// Query seam for ontology-level reasoning helpers.
pub trait OntologyOps {
    /// True when `object` is reachable from `subject` over `is-a` edges.
    /// Every term `is-a` itself.
    fn is_a(&self, subject: TermRef, object: TermRef) -> Result<bool, OpsError>;

    /// Materialises the transitive closure of `relation` over `onto` into a
    /// new ontology. A pair `(x, z)` is asserted when `x is-a subject`,
    /// `z is-a object` and `z` is reachable from `x` over `relation` edges;
    /// terms satisfying both filters also get a reflexive pair.
    fn transitive_closure(
        &self,
        onto: &OntologyHandle,
        subject: TermRef,
        object: TermRef,
        relation: TermRef,
    ) -> Result<OntologyHandle, OpsError>;
}

#[derive(Default)]
struct IsaMemo {
    true_pairs: BTreeSet<(TermRef, TermRef)>,
    false_pairs: BTreeSet<(TermRef, TermRef)>,
}

/// Default [`OntologyOps`] implementation with a process-lifetime memo.
///
/// Results are memoised both ways, so repeated queries over a settled
/// ontology are set lookups. The memo is never invalidated; callers mutate
/// their ontologies first and query afterwards.
pub struct DefaultOps<'a> {
    store: &'a OntologyStore,
    core: CoreOntology,
    memo: Mutex<IsaMemo>,
}

impl<'a> DefaultOps<'a> {
    /// Builds an operations helper over `store` using `core`'s vocabulary.
    #[must_use]
    pub fn new(store: &'a OntologyStore, core: CoreOntology) -> Self {
        Self {
            store,
            core,
            memo: Mutex::new(IsaMemo::default()),
        }
    }

    /// True when `relation` resolves to the given core relation, either by
    /// identity or by name. Flat files declare their own local `is-a` atom,
    /// so name matching is part of the contract.
    fn matches_core(&self, relation: TermRef, canonical: TermRef) -> Result<bool, OpsError> {
        let (resolved, term) = self.store.resolve(relation)?;
        if resolved == canonical {
            return Ok(true);
        }
        let canonical_name = self.store.resolve_name(canonical)?;
        Ok(term.name == canonical_name)
    }

    /// Outgoing `is-a` successors of `at` within its own ontology.
    fn isa_successors(&self, at: TermRef) -> Result<Vec<TermRef>, OpsError> {
        let handle = self.store.get(at.ontology)?;
        let mut out = Vec::new();
        for triple in handle.get_triples(Some(at), None, None) {
            if self.matches_core(triple.relation, self.core.is_a)? {
                out.push(triple.object);
            }
        }
        Ok(out)
    }
}

impl OntologyOps for DefaultOps<'_> {
    fn is_a(&self, subject: TermRef, object: TermRef) -> Result<bool, OpsError> {
        if subject.ontology != object.ontology {
            return Err(OpsError::CrossOntology { subject, object });
        }
        if subject == object {
            return Ok(true);
        }
        {
            let memo = self.memo.lock().expect("is-a memo poisoned");
            if memo.true_pairs.contains(&(subject, object)) {
                return Ok(true);
            }
            if memo.false_pairs.contains(&(subject, object)) {
                return Ok(false);
            }
        }
        let mut visited = BTreeSet::new();
        let mut stack = vec![subject];
        let mut found = false;
        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            if current == object {
                found = true;
                break;
            }
            stack.extend(self.isa_successors(current)?);
        }
        let mut memo = self.memo.lock().expect("is-a memo poisoned");
        if found {
            memo.true_pairs.insert((subject, object));
        } else {
            memo.false_pairs.insert((subject, object));
        }
        Ok(found)
    }

    fn transitive_closure(
        &self,
        onto: &OntologyHandle,
        subject: TermRef,
        object: TermRef,
        relation: TermRef,
    ) -> Result<OntologyHandle, OpsError> {
        let closure = self.store.create_ontology(
            format!("{}-closure", onto.read(|o| o.name().to_owned())),
            String::new(),
        );
        let local_rel = closure.import_term(self.store, relation)?;

        // reflexive pairs for terms passing both filters
        let atoms: Vec<TermRef> = onto.read(|o| {
            o.terms()
                .filter(|t| matches!(t.kind, TermKind::Atom))
                .map(|t| TermRef::new(onto.id(), t.id))
                .collect()
        });
        for t in &atoms {
            if self.is_a(*t, subject)? && self.is_a(*t, object)? {
                let local = closure.import_term(self.store, *t)?;
                if !closure.contains_triple(local, local, local_rel) {
                    closure.create_triple(local, local, local_rel)?;
                }
            }
        }

        // transitive pairs
        for triple in onto.get_triples(None, None, None) {
            if !self.matches_core(triple.relation, relation)? {
                continue;
            }
            if !self.is_a(triple.subject, subject)? {
                continue;
            }
            let origin = closure.import_term(self.store, triple.subject)?;
            let mut visited = BTreeSet::new();
            let mut stack = vec![triple.object];
            while let Some(current) = stack.pop() {
                if !visited.insert(current) {
                    continue;
                }
                if self.is_a(current, object)? {
                    let local = closure.import_term(self.store, current)?;
                    if !closure.contains_triple(origin, local, local_rel) {
                        closure.create_triple(origin, local, local_rel)?;
                    }
                }
                let handle = self.store.get(current.ontology)?;
                for next in handle.get_triples(Some(current), None, None) {
                    if self.matches_core(next.relation, relation)? {
                        stack.push(next.object);
                    }
                }
            }
        }
        Ok(closure)
    }
}

#[cfg(test)]
mod tests {
    use super::super::bootstrap::init_core;
    use super::super::io::parse_flat;
    use super::super::store::OntologyStore;
    use super::super::value_objects::TermName;
    use super::{DefaultOps, OntologyOps, OpsError};

    const CHAIN: &str = "\
#name: chain
a is-a node
b is-a node
c is-a node
a next b
b next c
";

    fn term(onto: &super::OntologyHandle, name: &str) -> super::TermRef {
        onto.term_by_name(&TermName::new(name).unwrap()).unwrap()
    }

    #[test]
    fn is_a_is_reflexive_and_transitive() {
        let store = OntologyStore::new();
        let core = init_core(&store).unwrap();
        let onto = parse_flat(&store, "#name: t\nx is-a y\ny is-a z\n").unwrap();
        let ops = DefaultOps::new(&store, core);
        let (x, y, z) = (term(&onto, "x"), term(&onto, "y"), term(&onto, "z"));
        assert!(ops.is_a(x, x).unwrap());
        assert!(ops.is_a(x, y).unwrap());
        assert!(ops.is_a(x, z).unwrap());
        assert!(!ops.is_a(z, x).unwrap());
        // memoised answers agree with the first pass
        assert!(ops.is_a(x, z).unwrap());
        assert!(!ops.is_a(z, x).unwrap());
    }

    #[test]
    fn is_a_rejects_cross_ontology_queries() {
        let store = OntologyStore::new();
        let core = init_core(&store).unwrap();
        let left = parse_flat(&store, "#name: l\nx is-a y\n").unwrap();
        let right = parse_flat(&store, "#name: r\nx is-a y\n").unwrap();
        let ops = DefaultOps::new(&store, core);
        let err = ops
            .is_a(term(&left, "x"), term(&right, "y"))
            .unwrap_err();
        assert!(matches!(err, OpsError::CrossOntology { .. }));
    }

    #[test]
    fn is_a_survives_cycles() {
        let store = OntologyStore::new();
        let core = init_core(&store).unwrap();
        let onto = parse_flat(&store, "#name: c\np is-a q\nq is-a p\n").unwrap();
        let ops = DefaultOps::new(&store, core);
        assert!(ops.is_a(term(&onto, "p"), term(&onto, "q")).unwrap());
        assert!(ops.is_a(term(&onto, "q"), term(&onto, "p")).unwrap());
        let lone = onto.create_term("lone", "").unwrap();
        assert!(!ops.is_a(term(&onto, "p"), lone).unwrap());
    }

    #[test]
    fn closure_of_a_chain() {
        let store = OntologyStore::new();
        let core = init_core(&store).unwrap();
        let onto = parse_flat(&store, CHAIN).unwrap();
        let ops = DefaultOps::new(&store, core);
        let node = term(&onto, "node");
        let next = term(&onto, "next");
        let closure = ops.transitive_closure(&onto, node, node, next).unwrap();

        let mut pairs: Vec<(String, String)> = closure
            .get_triples(None, None, None)
            .into_iter()
            .map(|t| {
                (
                    store.resolve_name(t.subject).unwrap().as_str().to_owned(),
                    store.resolve_name(t.object).unwrap().as_str().to_owned(),
                )
            })
            .collect();
        pairs.sort();
        let expected: Vec<(String, String)> = [
            ("a", "a"),
            ("a", "b"),
            ("a", "c"),
            ("b", "b"),
            ("b", "c"),
            ("c", "c"),
        ]
        .into_iter()
        .map(|(s, o)| (s.to_owned(), o.to_owned()))
        .collect();
        assert_eq!(pairs, expected);
    }
}
