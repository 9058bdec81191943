//! Core domain entities: terms, triples and the ontology arena that owns
//! them.
//!
//! An [`Ontology`] owns its terms in an arena indexed by [`TermId`]. Deleted
//! slots are tombstoned and identifiers are never reused, so handles held by
//! other ontologies or by the reasoning layer stay unambiguous. Triples are
//! themselves terms, which lets statements appear as the subject or object
//! of other statements.

use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, HashSet};
use std::hash::{Hash, Hasher};

use thiserror::Error;

use super::events::{Change, ChangeVeto, SharedObserver};
use super::value_objects::{NameError, OntologyId, TermId, TermName, TermRef};

/// What a term stands for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TermKind {
    /// A plain symbolic constant.
    Atom,
    /// A placeholder the interpreter substitutes candidate values for.
    Variable,
    /// A view onto a term owned by another ontology.
    Remote { target: TermRef },
    /// A term standing for a parenthesised tuple whose components may be
    /// left open. A fully bound pattern reads as a compound statement.
    Pattern {
        subject: Option<TermRef>,
        object: Option<TermRef>,
        relation: Option<TermRef>,
    },
    /// A reified statement; the triple's own term id points back at this
    /// slot.
    Triple(Triple),
}

/// A named entry in an ontology's arena.
#[derive(Clone, Debug)]
pub struct Term {
    pub id: TermId,
    pub name: TermName,
    pub description: String,
    pub kind: TermKind,
}

impl Term {
    /// True for terms the interpreter treats as substitutable slots.
    #[must_use]
    pub fn is_variable(&self) -> bool {
        matches!(self.kind, TermKind::Variable)
    }
}

/// An assertion that `subject` stands in `relation` to `object`.
///
/// Equality and hashing are structural over the three components; the
/// reified `term` slot is deliberately excluded so that a probe triple
/// built with a placeholder id still matches the stored one.
#[derive(Clone, Debug)]
pub struct Triple {
    pub subject: TermRef,
    pub object: TermRef,
    pub relation: TermRef,
    /// Arena slot of the term reifying this statement.
    pub term: TermId,
}

impl Triple {
    /// Builds a probe carrying a placeholder term id, usable for lookups
    /// because equality ignores the `term` field.
    #[must_use]
    pub fn probe(subject: TermRef, object: TermRef, relation: TermRef) -> Self {
        Self {
            subject,
            object,
            relation,
            term: TermId(u32::MAX),
        }
    }

    /// Structural hash honouring the contract
    /// `h(subject) + 31 * h(object) + 31 * 31 * h(relation)`.
    #[must_use]
    pub fn structural_hash(&self) -> u64 {
        fn component(r: &TermRef) -> u64 {
            let mut h = DefaultHasher::new();
            r.hash(&mut h);
            h.finish()
        }
        component(&self.subject)
            .wrapping_add(component(&self.object).wrapping_mul(31))
            .wrapping_add(component(&self.relation).wrapping_mul(961))
    }
}

impl PartialEq for Triple {
    fn eq(&self, other: &Self) -> bool {
        self.subject == other.subject
            && self.object == other.object
            && self.relation == other.relation
    }
}

impl Eq for Triple {}

impl Hash for Triple {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.structural_hash());
    }
}

/// Errors raised by ontology mutations and lookups.
#[derive(Debug, Error)]
pub enum OntologyError {
    /// A term with the requested name already exists in this ontology.
    #[error("term {name} already exists in ontology {ontology}")]
    AlreadyExists { ontology: OntologyId, name: TermName },
    /// The identical triple is already asserted.
    #[error("triple already asserted in ontology {ontology}")]
    DuplicateTriple { ontology: OntologyId },
    /// A triple component belongs to a different ontology.
    #[error("term {term} does not belong to ontology {ontology}")]
    ForeignTerm { ontology: OntologyId, term: TermRef },
    /// A handle names a tombstoned or out-of-range arena slot.
    #[error("no term {term} in ontology {ontology}")]
    NoSuchTerm { ontology: OntologyId, term: TermId },
    /// A name lookup found nothing.
    #[error("no term named {name} in ontology {ontology}")]
    UnknownTerm { ontology: OntologyId, name: TermName },
    /// A store lookup was asked for an ontology it does not hold.
    #[error("no ontology {ontology} in store")]
    UnknownOntology { ontology: OntologyId },
    /// The supplied name failed validation.
    #[error(transparent)]
    InvalidName(#[from] NameError),
    /// An observer rejected the mutation.
    #[error(transparent)]
    Vetoed(#[from] ChangeVeto),
}

/// A named collection of terms and the triples asserted over them.
#[derive(Clone)]
pub struct Ontology {
    id: OntologyId,
    name: String,
    description: String,
    terms: Vec<Option<Term>>,
    names: BTreeMap<TermName, TermId>,
    triples: HashSet<Triple>,
    by_subject: BTreeMap<TermId, HashSet<Triple>>,
    by_object: BTreeMap<TermId, HashSet<Triple>>,
    by_relation: BTreeMap<TermId, HashSet<Triple>>,
    remote_cache: BTreeMap<TermRef, TermId>,
    observers: Vec<SharedObserver>,
}

impl Ontology {
    pub(crate) fn new(id: OntologyId, name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            description: description.into(),
            terms: Vec::new(),
            names: BTreeMap::new(),
            triples: HashSet::new(),
            by_subject: BTreeMap::new(),
            by_object: BTreeMap::new(),
            by_relation: BTreeMap::new(),
            remote_cache: BTreeMap::new(),
            observers: Vec::new(),
        }
    }

    /// The handle this ontology is registered under.
    #[must_use]
    pub fn id(&self) -> OntologyId {
        self.id
    }

    /// Human-readable ontology name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Free-text description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Registers an observer for subsequent mutations.
    pub fn add_observer(&mut self, observer: SharedObserver) {
        self.observers.push(observer);
    }

    fn approve(&self, change: &Change) -> Result<(), ChangeVeto> {
        for observer in &self.observers {
            observer.will_change(change)?;
        }
        Ok(())
    }

    fn notify(&self, change: &Change) {
        for observer in &self.observers {
            observer.changed(change);
        }
    }

    /// Re-announces a change applied elsewhere to this ontology's
    /// observers. Used to forward mutations of imported terms.
    pub(crate) fn relay(&self, change: &Change) {
        self.notify(change);
    }

    /// Local remote view of a foreign term, when one has been imported.
    #[must_use]
    pub(crate) fn remote_view_of(&self, target: TermRef) -> Option<TermId> {
        self.remote_cache.get(&target).copied()
    }

    fn alloc(&mut self, name: TermName, description: String, kind: TermKind) -> TermId {
        let id = TermId(self.terms.len() as u32);
        self.names.insert(name.clone(), id);
        self.terms.push(Some(Term {
            id,
            name,
            description,
            kind,
        }));
        id
    }

    fn create_named(
        &mut self,
        name: TermName,
        description: impl Into<String>,
        kind: TermKind,
    ) -> Result<TermId, OntologyError> {
        if self.names.contains_key(&name) {
            return Err(OntologyError::AlreadyExists {
                ontology: self.id,
                name,
            });
        }
        let change = Change::TermCreated {
            ontology: self.id,
            name: name.clone(),
        };
        self.approve(&change)?;
        let id = self.alloc(name, description.into(), kind);
        self.notify(&change);
        Ok(id)
    }

    /// Creates a plain atom term.
    pub fn create_term(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Result<TermId, OntologyError> {
        let name = TermName::new(name)?;
        self.create_named(name, description, TermKind::Atom)
    }

    /// Creates a variable term for the interpreter to bind.
    pub fn create_variable(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Result<TermId, OntologyError> {
        let name = TermName::new(name)?;
        self.create_named(name, description, TermKind::Variable)
    }

    /// Creates a pattern term whose components may be left open.
    pub fn create_pattern(
        &mut self,
        name: impl Into<String>,
        subject: Option<TermRef>,
        object: Option<TermRef>,
        relation: Option<TermRef>,
    ) -> Result<TermId, OntologyError> {
        let name = TermName::new(name)?;
        self.create_named(
            name,
            String::new(),
            TermKind::Pattern {
                subject,
                object,
                relation,
            },
        )
    }

    /// Creates or retrieves a remote view of `target`.
    ///
    /// Repeated imports of the same target return the cached term without
    /// firing events, so import is idempotent.
    pub fn import_remote(
        &mut self,
        target: TermRef,
        name: impl Into<String>,
    ) -> Result<TermId, OntologyError> {
        if let Some(&existing) = self.remote_cache.get(&target) {
            return Ok(existing);
        }
        let name = TermName::new(name)?;
        let id = self.create_named(name, String::new(), TermKind::Remote { target })?;
        self.remote_cache.insert(target, id);
        Ok(id)
    }

    /// Asserts `subject relation object`, reifying the statement as a term
    /// under a generated `"(subject, object, relation)"` name.
    pub fn create_triple(
        &mut self,
        subject: TermRef,
        object: TermRef,
        relation: TermRef,
    ) -> Result<TermId, OntologyError> {
        self.create_triple_with(subject, object, relation, None, String::new())
    }

    /// Asserts a triple reified under a caller-supplied name and
    /// description.
    pub fn create_named_triple(
        &mut self,
        subject: TermRef,
        object: TermRef,
        relation: TermRef,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Result<TermId, OntologyError> {
        let name = TermName::new(name)?;
        self.create_triple_with(subject, object, relation, Some(name), description.into())
    }

    fn create_triple_with(
        &mut self,
        subject: TermRef,
        object: TermRef,
        relation: TermRef,
        name: Option<TermName>,
        description: String,
    ) -> Result<TermId, OntologyError> {
        for component in [subject, object, relation] {
            if component.ontology != self.id {
                return Err(OntologyError::ForeignTerm {
                    ontology: self.id,
                    term: component,
                });
            }
            if self.get_term(component.term).is_none() {
                return Err(OntologyError::NoSuchTerm {
                    ontology: self.id,
                    term: component.term,
                });
            }
        }
        let probe = Triple::probe(subject, object, relation);
        if self.triples.contains(&probe) {
            return Err(OntologyError::DuplicateTriple { ontology: self.id });
        }
        let name = match name {
            Some(given) => given,
            None => TermName::new(format!(
                "({}, {}, {})",
                self.term_name(subject.term)?,
                self.term_name(object.term)?,
                self.term_name(relation.term)?,
            ))?,
        };
        if self.names.contains_key(&name) {
            return Err(OntologyError::AlreadyExists {
                ontology: self.id,
                name,
            });
        }
        let mut triple = probe;
        let change = Change::TripleAdded {
            ontology: self.id,
            triple: triple.clone(),
        };
        self.approve(&change)?;
        let id = self.alloc(name, description, TermKind::Atom);
        triple.term = id;
        if let Some(slot) = self.terms.get_mut(id.0 as usize).and_then(Option::as_mut) {
            slot.kind = TermKind::Triple(triple.clone());
        }
        self.index_triple(&triple);
        self.triples.insert(triple);
        self.notify(&change);
        Ok(id)
    }

    fn index_triple(&mut self, triple: &Triple) {
        self.by_subject
            .entry(triple.subject.term)
            .or_default()
            .insert(triple.clone());
        self.by_object
            .entry(triple.object.term)
            .or_default()
            .insert(triple.clone());
        self.by_relation
            .entry(triple.relation.term)
            .or_default()
            .insert(triple.clone());
    }

    fn unindex_triple(&mut self, triple: &Triple) {
        for (index, key) in [
            (&mut self.by_subject, triple.subject.term),
            (&mut self.by_object, triple.object.term),
            (&mut self.by_relation, triple.relation.term),
        ] {
            if let Some(set) = index.get_mut(&key) {
                set.remove(triple);
                if set.is_empty() {
                    index.remove(&key);
                }
            }
        }
    }

    /// Looks up a live term by arena slot.
    #[must_use]
    pub fn get_term(&self, id: TermId) -> Option<&Term> {
        self.terms.get(id.0 as usize).and_then(Option::as_ref)
    }

    fn term_name(&self, id: TermId) -> Result<&TermName, OntologyError> {
        self.get_term(id)
            .map(|t| &t.name)
            .ok_or(OntologyError::NoSuchTerm {
                ontology: self.id,
                term: id,
            })
    }

    /// Resolves a name to its arena slot.
    #[must_use]
    pub fn term_by_name(&self, name: &TermName) -> Option<TermId> {
        self.names.get(name).copied()
    }

    /// Iterates over live terms in arena order.
    pub fn terms(&self) -> impl Iterator<Item = &Term> {
        self.terms.iter().filter_map(Option::as_ref)
    }

    /// Number of live terms.
    #[must_use]
    pub fn term_count(&self) -> usize {
        self.terms().count()
    }

    /// True if the exact statement is asserted.
    #[must_use]
    pub fn contains_triple(&self, subject: TermRef, object: TermRef, relation: TermRef) -> bool {
        self.triples
            .contains(&Triple::probe(subject, object, relation))
    }

    /// Returns the triples matching the given component filters.
    ///
    /// `None` acts as a wildcard. The scan starts from the most selective
    /// populated index and filters the remaining constraints; results are
    /// sorted by reified term id so iteration order is stable.
    #[must_use]
    pub fn get_triples(
        &self,
        subject: Option<TermId>,
        object: Option<TermId>,
        relation: Option<TermId>,
    ) -> Vec<Triple> {
        let empty: HashSet<Triple> = HashSet::new();
        let mut pools: Vec<&HashSet<Triple>> = Vec::new();
        if let Some(s) = subject {
            pools.push(self.by_subject.get(&s).unwrap_or(&empty));
        }
        if let Some(o) = object {
            pools.push(self.by_object.get(&o).unwrap_or(&empty));
        }
        if let Some(r) = relation {
            pools.push(self.by_relation.get(&r).unwrap_or(&empty));
        }
        let pool: Box<dyn Iterator<Item = &Triple>> = match pools.iter().min_by_key(|p| p.len()) {
            Some(smallest) => Box::new(smallest.iter()),
            None => Box::new(self.triples.iter()),
        };
        let mut matched: Vec<Triple> = pool
            .filter(|t| subject.map_or(true, |s| t.subject.term == s))
            .filter(|t| object.map_or(true, |o| t.object.term == o))
            .filter(|t| relation.map_or(true, |r| t.relation.term == r))
            .cloned()
            .collect();
        matched.sort_by_key(|t| t.term);
        matched
    }

    /// All asserted triples, sorted by reified term id.
    #[must_use]
    pub fn all_triples(&self) -> Vec<Triple> {
        self.get_triples(None, None, None)
    }

    /// Retracts the exact statement if it is asserted.
    ///
    /// Returns `true` when a triple was removed. The reified term is
    /// tombstoned along with it.
    pub fn delete_triple(
        &mut self,
        subject: TermRef,
        object: TermRef,
        relation: TermRef,
    ) -> Result<bool, OntologyError> {
        let probe = Triple::probe(subject, object, relation);
        let Some(existing) = self.triples.get(&probe).cloned() else {
            return Ok(false);
        };
        let change = Change::TripleRemoved {
            ontology: self.id,
            triple: existing.clone(),
        };
        self.approve(&change)?;
        self.remove_triple_internal(&existing);
        self.notify(&change);
        Ok(true)
    }

    fn remove_triple_internal(&mut self, triple: &Triple) {
        self.triples.remove(triple);
        self.unindex_triple(triple);
        self.tombstone(triple.term);
    }

    fn tombstone(&mut self, id: TermId) {
        if let Some(slot) = self.terms.get_mut(id.0 as usize) {
            if let Some(term) = slot.take() {
                self.names.remove(&term.name);
                if let TermKind::Remote { target } = term.kind {
                    self.remote_cache.remove(&target);
                }
            }
        }
    }

    /// Deletes a term along with every statement mentioning it.
    ///
    /// Removal cascades: a triple whose reified term is itself a component
    /// of further triples takes those with it. Deleting a dead slot is a
    /// no-op.
    pub fn delete_term(&mut self, id: TermId) -> Result<(), OntologyError> {
        if self.get_term(id).is_none() {
            return Ok(());
        }
        let change = Change::TermDeleted {
            term: TermRef::new(self.id, id),
        };
        self.approve(&change)?;
        let mut worklist = vec![id];
        while let Some(current) = worklist.pop() {
            let mentioning: Vec<Triple> = [&self.by_subject, &self.by_object, &self.by_relation]
                .into_iter()
                .filter_map(|index| index.get(&current))
                .flat_map(|set| set.iter().cloned())
                .collect();
            for triple in mentioning {
                worklist.push(triple.term);
                self.remove_triple_internal(&triple);
            }
            match self.get_term(current).map(|t| t.kind.clone()) {
                Some(TermKind::Triple(triple)) => self.remove_triple_internal(&triple),
                Some(_) => self.tombstone(current),
                None => {}
            }
        }
        self.notify(&change);
        Ok(())
    }

    /// Arena slots used as a component of at least one asserted triple.
    #[must_use]
    pub fn component_terms(&self) -> HashSet<TermId> {
        self.triples
            .iter()
            .flat_map(|t| [t.subject.term, t.object.term, t.relation.term])
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::super::events::test_support::RecordingObserver;
    use super::super::value_objects::{OntologyId, TermId, TermName, TermRef};
    use super::{Ontology, OntologyError, TermKind, Triple};

    fn fresh() -> Ontology {
        Ontology::new(OntologyId(0), "test", "test ontology")
    }

    fn r(o: &Ontology, id: TermId) -> TermRef {
        TermRef::new(o.id(), id)
    }

    #[test]
    fn triple_equality_ignores_reified_slot() {
        let mut o = fresh();
        let a = o.create_term("a", "").unwrap();
        let b = o.create_term("b", "").unwrap();
        let rel = o.create_term("rel", "").unwrap();
        let (a, b, rel) = (r(&o, a), r(&o, b), r(&o, rel));
        o.create_triple(a, b, rel).unwrap();

        let probe = Triple::probe(a, b, rel);
        let stored = o.get_triples(None, None, None).pop().unwrap();
        assert_eq!(probe, stored);
        assert_eq!(probe.structural_hash(), stored.structural_hash());
        assert!(o.contains_triple(a, b, rel));
    }

    #[test]
    fn triples_accept_caller_supplied_names() {
        let mut o = fresh();
        let a = o.create_term("a", "").unwrap();
        let rel = o.create_term("rel", "").unwrap();
        let (ar, relr) = (r(&o, a), r(&o, rel));
        let reified = o
            .create_named_triple(ar, ar, relr, "self-link", "a relates to itself")
            .unwrap();
        let term = o.get_term(reified).unwrap();
        assert_eq!(term.name.as_str(), "self-link");
        assert_eq!(term.description, "a relates to itself");
        assert!(o.contains_triple(ar, ar, relr));
    }

    #[test]
    fn duplicate_triple_is_rejected() {
        let mut o = fresh();
        let a = o.create_term("a", "").unwrap();
        let b = o.create_term("b", "").unwrap();
        let rel = o.create_term("rel", "").unwrap();
        let (a, b, rel) = (r(&o, a), r(&o, b), r(&o, rel));
        o.create_triple(a, b, rel).unwrap();
        let err = o.create_triple(a, b, rel).unwrap_err();
        assert!(matches!(err, OntologyError::DuplicateTriple { .. }));
    }

    #[test]
    fn foreign_components_are_rejected() {
        let mut o = fresh();
        let a = o.create_term("a", "").unwrap();
        let foreign = TermRef::new(OntologyId(99), a);
        let a = r(&o, a);
        let err = o.create_triple(foreign, a, a).unwrap_err();
        assert!(matches!(err, OntologyError::ForeignTerm { .. }));
    }

    #[test]
    fn wildcard_queries_use_component_filters() {
        let mut o = fresh();
        let a = o.create_term("a", "").unwrap();
        let b = o.create_term("b", "").unwrap();
        let c = o.create_term("c", "").unwrap();
        let rel = o.create_term("rel", "").unwrap();
        let other = o.create_term("other", "").unwrap();
        let (ar, br, cr) = (r(&o, a), r(&o, b), r(&o, c));
        let (relr, otherr) = (r(&o, rel), r(&o, other));
        o.create_triple(ar, br, relr).unwrap();
        o.create_triple(ar, cr, relr).unwrap();
        o.create_triple(br, cr, otherr).unwrap();

        assert_eq!(o.get_triples(Some(a), None, None).len(), 2);
        assert_eq!(o.get_triples(None, Some(c), None).len(), 2);
        assert_eq!(o.get_triples(None, None, Some(rel)).len(), 2);
        assert_eq!(o.get_triples(Some(a), Some(c), Some(rel)).len(), 1);
        assert_eq!(o.get_triples(Some(c), None, None).len(), 0);
        assert_eq!(o.get_triples(None, None, None).len(), 3);
    }

    #[test]
    fn delete_term_purges_every_mention() {
        let mut o = fresh();
        let a = o.create_term("a", "").unwrap();
        let b = o.create_term("b", "").unwrap();
        let rel = o.create_term("rel", "").unwrap();
        let (ar, br, relr) = (r(&o, a), r(&o, b), r(&o, rel));
        o.create_triple(ar, br, relr).unwrap();
        o.create_triple(br, ar, relr).unwrap();

        o.delete_term(a).unwrap();
        assert!(o.get_term(a).is_none());
        assert!(o.get_triples(None, None, None).is_empty());
        assert!(o.get_term(b).is_some());
        // slots are never reused
        let d = o.create_term("d", "").unwrap();
        assert!(d > rel);
    }

    #[test]
    fn delete_triple_retracts_and_tombstones() {
        let mut o = fresh();
        let a = o.create_term("a", "").unwrap();
        let b = o.create_term("b", "").unwrap();
        let rel = o.create_term("rel", "").unwrap();
        let (ar, br, relr) = (r(&o, a), r(&o, b), r(&o, rel));
        let reified = o.create_triple(ar, br, relr).unwrap();

        assert!(o.delete_triple(ar, br, relr).unwrap());
        assert!(!o.delete_triple(ar, br, relr).unwrap());
        assert!(o.get_term(reified).is_none());
    }

    #[test]
    fn import_is_idempotent() {
        let mut o = fresh();
        let target = TermRef::new(OntologyId(7), TermId(3));
        let first = o.import_remote(target, "borrowed").unwrap();
        let second = o.import_remote(target, "borrowed-again").unwrap();
        assert_eq!(first, second);
        assert!(matches!(
            o.get_term(first).unwrap().kind,
            TermKind::Remote { target: t } if t == target
        ));
    }

    #[test]
    fn veto_aborts_before_mutation() {
        let mut o = fresh();
        let a = o.create_term("a", "").unwrap();
        let rel = o.create_term("rel", "").unwrap();
        o.add_observer(Arc::new(RecordingObserver {
            veto: true,
            ..Default::default()
        }));
        let (ar, relr) = (r(&o, a), r(&o, rel));
        let err = o.create_triple(ar, ar, relr).unwrap_err();
        assert!(matches!(err, OntologyError::Vetoed(_)));
        assert!(o.get_triples(None, None, None).is_empty());
        assert_eq!(o.term_count(), 2);
    }

    #[test]
    fn observers_see_applied_changes() {
        let mut o = fresh();
        let observer = Arc::new(RecordingObserver::default());
        o.add_observer(observer.clone());
        o.create_term("a", "").unwrap();
        let seen = observer.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(matches!(
            &seen[0],
            super::super::events::Change::TermCreated { name, .. }
                if *name == TermName::new("a").unwrap()
        ));
    }
}
