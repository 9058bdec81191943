//! Reasoning domains: a queryable aggregate of ontologies.
//!
//! A domain holds a set of explicitly added ontologies plus every ontology
//! they depend on through remote term links. Dependencies are tracked per
//! dependent, so removing an ontology only drops the dependencies nothing
//! else still needs. Queries run against the union of member facts plus the
//! derived closure ontologies enabled in the settings.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use thiserror::Error;

use crate::config::ReasonerSettings;
use crate::ontology::{
    init_core, BootstrapError, Change, ChangeVeto, CoreOntology, OntologyError, OntologyHandle,
    OntologyId, OntologyStore, SharedObserver, TermKind, TermRef,
};

use super::closures::{instance_of_closure, is_relation, sub_type_closure};
use super::interpreter::MatchIterator;
use super::proposition::{Prop, Truth};

/// Errors raised while assembling or querying a reasoning domain.
#[derive(Debug, Error)]
pub enum ReasonError {
    /// An axiom or query term was expected to denote a statement.
    #[error("term {term} does not denote a statement")]
    NotATriple { term: TermRef },
    /// A handle named a dead or unresolvable term.
    #[error("invalid term {term}")]
    InvalidTerm { term: TermRef },
    /// An underlying ontology operation failed.
    #[error(transparent)]
    Ontology(#[from] OntologyError),
    /// A domain observer rejected a membership change.
    #[error(transparent)]
    Vetoed(#[from] ChangeVeto),
}

/// One fact or rule the interpreter may try against a query.
#[derive(Clone, Debug)]
pub(crate) struct Axiom {
    /// Reified statement term.
    pub term: TermRef,
    /// Canonical proposition tree of the statement.
    pub prop: Prop,
    /// Ground axioms are usable as scan facts.
    pub constant: bool,
}

/// An aggregate of ontologies closed under remote term dependencies.
pub struct ReasoningDomain {
    store: Arc<OntologyStore>,
    core: CoreOntology,
    settings: ReasonerSettings,
    explicit: BTreeSet<OntologyId>,
    members: BTreeMap<OntologyId, OntologyHandle>,
    needed_by: BTreeMap<OntologyId, BTreeSet<OntologyId>>,
    scratch: OntologyHandle,
    observers: Vec<SharedObserver>,
    axioms: OnceLock<Vec<Axiom>>,
    sub_closure: OnceLock<OntologyHandle>,
    instance_closure: OnceLock<OntologyHandle>,
    truth: Mutex<BTreeMap<Prop, Truth>>,
    virtuals: Mutex<BTreeMap<(TermRef, TermRef, TermRef), TermRef>>,
    counter: AtomicU32,
}

impl ReasoningDomain {
    /// Builds a domain over an existing store and core vocabulary.
    ///
    /// The core ontology is always an implicit member.
    #[must_use]
    pub fn new(store: Arc<OntologyStore>, core: CoreOntology, settings: ReasonerSettings) -> Self {
        let scratch = store.create_ontology("scratch", "query workspace");
        let mut members = BTreeMap::new();
        members.insert(core.handle.id(), core.handle.clone());
        Self {
            store,
            core,
            settings,
            explicit: BTreeSet::new(),
            members,
            needed_by: BTreeMap::new(),
            scratch,
            observers: Vec::new(),
            axioms: OnceLock::new(),
            sub_closure: OnceLock::new(),
            instance_closure: OnceLock::new(),
            truth: Mutex::new(BTreeMap::new()),
            virtuals: Mutex::new(BTreeMap::new()),
            counter: AtomicU32::new(0),
        }
    }

    /// Creates a fresh store, loads the core vocabulary and builds a domain
    /// on top.
    pub fn bootstrap(settings: ReasonerSettings) -> Result<Self, BootstrapError> {
        let store = Arc::new(OntologyStore::new());
        let core = init_core(&store)?;
        Ok(Self::new(store, core, settings))
    }

    /// The backing store.
    #[must_use]
    pub fn store(&self) -> &Arc<OntologyStore> {
        &self.store
    }

    /// The core vocabulary handles.
    #[must_use]
    pub fn core(&self) -> &CoreOntology {
        &self.core
    }

    /// The active settings.
    #[must_use]
    pub fn settings(&self) -> &ReasonerSettings {
        &self.settings
    }

    /// Identifiers of all current members, core included.
    #[must_use]
    pub fn member_ids(&self) -> BTreeSet<OntologyId> {
        self.members.keys().copied().collect()
    }

    /// Ontologies that depend on `id` through remote term links.
    #[must_use]
    pub fn dependents_of(&self, id: OntologyId) -> BTreeSet<OntologyId> {
        self.needed_by.get(&id).cloned().unwrap_or_default()
    }

    /// Registers an observer for membership changes.
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

    /// Ontologies an ontology references through remote terms.
    fn deps_of(handle: &OntologyHandle) -> BTreeSet<OntologyId> {
        handle.read(|o| {
            o.terms()
                .filter_map(|t| match t.kind {
                    TermKind::Remote { target } if target.ontology != o.id() => {
                        Some(target.ontology)
                    }
                    _ => None,
                })
                .collect()
        })
    }

    fn rebuild_dependents(&mut self) {
        self.needed_by.clear();
        for (id, handle) in &self.members {
            for dep in Self::deps_of(handle) {
                if self.members.contains_key(&dep) {
                    self.needed_by.entry(dep).or_default().insert(*id);
                }
            }
        }
    }

    /// Adds an ontology and everything it depends on.
    ///
    /// Adding a member twice is a no-op. Observers see one change per newly
    /// joining ontology before anything is applied; a veto aborts the whole
    /// addition. Membership should settle before the first query, since the
    /// derived axiom set is built once.
    pub fn add_ontology(&mut self, handle: &OntologyHandle) -> Result<(), ReasonError> {
        if self.explicit.contains(&handle.id()) {
            return Ok(());
        }
        let mut joining: Vec<OntologyHandle> = Vec::new();
        let mut stack = vec![handle.clone()];
        let mut seen: BTreeSet<OntologyId> = BTreeSet::new();
        while let Some(h) = stack.pop() {
            if !seen.insert(h.id()) {
                continue;
            }
            for dep in Self::deps_of(&h) {
                if !self.members.contains_key(&dep) && !seen.contains(&dep) {
                    stack.push(self.store.get(dep)?);
                }
            }
            if !self.members.contains_key(&h.id()) {
                joining.push(h);
            }
        }
        let changes: Vec<Change> = joining
            .iter()
            .map(|h| Change::OntologyAdded { ontology: h.id() })
            .collect();
        for change in &changes {
            self.approve(change)?;
        }
        for h in joining {
            tracing::debug!(ontology = %h.id(), "ontology joined domain");
            self.members.insert(h.id(), h);
        }
        self.explicit.insert(handle.id());
        self.rebuild_dependents();
        for change in &changes {
            self.notify(change);
        }
        Ok(())
    }

    /// Removes an explicitly added ontology.
    ///
    /// Dependencies stay while some other member still needs them and leave
    /// with the last dependent. Removing a non-member or the core ontology
    /// is a no-op.
    pub fn remove_ontology(&mut self, id: OntologyId) -> Result<(), ReasonError> {
        if !self.explicit.contains(&id) {
            return Ok(());
        }
        let mut retained: BTreeSet<OntologyId> = BTreeSet::new();
        retained.insert(self.core.handle.id());
        let mut stack: Vec<OntologyId> = self
            .explicit
            .iter()
            .copied()
            .filter(|m| *m != id)
            .collect();
        while let Some(m) = stack.pop() {
            if !retained.insert(m) {
                continue;
            }
            if let Some(handle) = self.members.get(&m) {
                stack.extend(Self::deps_of(handle));
            }
        }
        let leaving: Vec<OntologyId> = self
            .members
            .keys()
            .copied()
            .filter(|m| !retained.contains(m))
            .collect();
        let changes: Vec<Change> = leaving
            .iter()
            .map(|&ontology| Change::OntologyRemoved { ontology })
            .collect();
        for change in &changes {
            self.approve(change)?;
        }
        self.explicit.remove(&id);
        for m in &leaving {
            tracing::debug!(ontology = %m, "ontology left domain");
            self.members.remove(m);
        }
        self.rebuild_dependents();
        for change in &changes {
            self.notify(change);
        }
        Ok(())
    }

    fn member_handles(&self) -> Vec<OntologyHandle> {
        self.members.values().cloned().collect()
    }

    fn ensure_sub_closure(&self) -> Result<&OntologyHandle, ReasonError> {
        if self.sub_closure.get().is_none() {
            let built = sub_type_closure(&self.store, &self.core, &self.member_handles())?;
            let _ = self.sub_closure.set(built);
        }
        Ok(self.sub_closure.get().expect("sub-type closure initialised"))
    }

    fn ensure_instance_closure(&self) -> Result<&OntologyHandle, ReasonError> {
        if self.instance_closure.get().is_none() {
            let built = instance_of_closure(&self.store, &self.core, &self.member_handles())?;
            let _ = self.instance_closure.set(built);
        }
        Ok(self
            .instance_closure
            .get()
            .expect("instance-of closure initialised"))
    }

    /// The axiom set, built once on first use.
    ///
    /// Axioms are the member statements not nested inside other statements,
    /// plus the closure ontologies enabled in the settings, in
    /// `(ontology, term)` order.
    pub(crate) fn ensure_axioms(&self) -> Result<&[Axiom], ReasonError> {
        if self.axioms.get().is_none() {
            let mut sources = self.member_handles();
            if self.settings.inference.sub_type_closure {
                sources.push(self.ensure_sub_closure()?.clone());
            }
            if self.settings.inference.instance_of_closure {
                sources.push(self.ensure_instance_closure()?.clone());
            }
            let mut axioms = Vec::new();
            for handle in &sources {
                let components = handle.read(|o| o.component_terms());
                for triple in handle.get_triples(None, None, None) {
                    if components.contains(&triple.term) {
                        continue;
                    }
                    let term = TermRef::new(handle.id(), triple.term);
                    let prop = self.canonical_prop(term)?;
                    let constant = prop.is_ground();
                    axioms.push(Axiom {
                        term,
                        prop,
                        constant,
                    });
                }
            }
            axioms.sort_by_key(|a| (a.term.ontology, a.term.term));
            tracing::debug!(count = axioms.len(), "axiom set built");
            let _ = self.axioms.set(axioms);
        }
        Ok(self.axioms.get().expect("axiom set initialised"))
    }

    /// Resolves a term and maps it onto the core vocabulary by name.
    ///
    /// Flat files declare their own local atoms for `instance-of`, `is-a`
    /// and friends; canonical handles fold those onto the core terms so
    /// structural comparison sees one vocabulary.
    pub(crate) fn canonical_ref(&self, term: TermRef) -> Result<TermRef, ReasonError> {
        let (resolved, t) = self.store.resolve(term)?;
        if resolved.ontology == self.core.handle.id() {
            return Ok(resolved);
        }
        if matches!(t.kind, TermKind::Atom) {
            if let Some(shared) = self.core.handle.term_by_name(&t.name) {
                return Ok(shared);
            }
        }
        Ok(resolved)
    }

    /// Canonical proposition tree with atoms folded onto the core
    /// vocabulary.
    pub(crate) fn canonical_prop(&self, term: TermRef) -> Result<Prop, ReasonError> {
        let (resolved, t) = self.store.resolve(term)?;
        Ok(match t.kind {
            TermKind::Atom => Prop::Atom(self.canonical_ref(resolved)?),
            TermKind::Variable => Prop::Variable(resolved),
            TermKind::Triple(triple) => Prop::Triple {
                subject: Box::new(self.canonical_prop(triple.subject)?),
                object: Box::new(self.canonical_prop(triple.object)?),
                relation: Box::new(self.canonical_prop(triple.relation)?),
            },
            TermKind::Pattern {
                subject: Some(s),
                object: Some(o),
                relation: Some(r),
            } => Prop::Triple {
                subject: Box::new(self.canonical_prop(s)?),
                object: Box::new(self.canonical_prop(o)?),
                relation: Box::new(self.canonical_prop(r)?),
            },
            TermKind::Pattern { .. } => Prop::Atom(resolved),
            TermKind::Remote { .. } => unreachable!("resolve returns non-remote terms"),
        })
    }

    fn fresh_name(&self, prefix: &str) -> String {
        format!("_{prefix}{}", self.counter.fetch_add(1, Ordering::Relaxed))
    }

    /// Scratch pattern term denoting `(subject, object, relation)`.
    ///
    /// Components are imported into the scratch ontology; the same three
    /// components always yield the same term.
    pub(crate) fn virtual_triple(
        &self,
        subject: TermRef,
        object: TermRef,
        relation: TermRef,
    ) -> Result<TermRef, ReasonError> {
        let s = self.scratch.import_term(&self.store, subject)?;
        let o = self.scratch.import_term(&self.store, object)?;
        let r = self.scratch.import_term(&self.store, relation)?;
        let key = (s, o, r);
        if let Some(&existing) = self
            .virtuals
            .lock()
            .expect("virtual term cache poisoned")
            .get(&key)
        {
            return Ok(existing);
        }
        let term =
            self.scratch
                .create_pattern_term(self.fresh_name("p"), Some(s), Some(o), Some(r))?;
        self.virtuals
            .lock()
            .expect("virtual term cache poisoned")
            .insert(key, term);
        Ok(term)
    }

    /// A fresh scratch variable for an unconstrained query slot.
    pub(crate) fn fresh_variable(&self) -> Result<TermRef, ReasonError> {
        Ok(self.scratch.create_variable(self.fresh_name("v"), "")?)
    }

    pub(crate) fn truth_of(&self, prop: &Prop) -> Option<Truth> {
        self.truth
            .lock()
            .expect("truth cache poisoned")
            .get(prop)
            .copied()
    }

    pub(crate) fn set_truth(&self, prop: Prop, truth: Truth) {
        self.truth
            .lock()
            .expect("truth cache poisoned")
            .insert(prop, truth);
    }

    /// Drops cache entries an abandoned query left mid-proof, so they do
    /// not read as false to later queries.
    pub(crate) fn forget_unproven(&self, props: &[Prop]) {
        let mut cache = self.truth.lock().expect("truth cache poisoned");
        for prop in props {
            if cache.get(prop) == Some(&Truth::Proving) {
                cache.remove(prop);
            }
        }
    }

    /// Boolean constants as terms.
    pub(crate) fn bool_term(&self, value: bool) -> TermRef {
        if value {
            self.core.true_value
        } else {
            self.core.false_value
        }
    }

    /// Declared candidate type of a relation's subject or object slot, read
    /// from `domain` and `co-domain` facts.
    pub(crate) fn declared_type(
        &self,
        relation: TermRef,
        object_side: bool,
    ) -> Result<Option<TermRef>, ReasonError> {
        let marker = if object_side {
            self.core.co_domain
        } else {
            self.core.domain
        };
        for handle in self.member_handles() {
            for triple in handle.get_triples(None, None, None) {
                if !is_relation(&self.store, triple.relation, marker)? {
                    continue;
                }
                if self.canonical_ref(triple.subject)? == self.canonical_ref(relation)? {
                    return Ok(Some(self.canonical_ref(triple.object)?));
                }
            }
        }
        Ok(None)
    }

    /// Known instances of a type, read from the instance-of closure.
    pub(crate) fn instances_of(&self, ty: TermRef) -> Result<Vec<TermRef>, ReasonError> {
        let closure = self.ensure_instance_closure()?.clone();
        let ty = self.canonical_ref(ty)?;
        let mut out = BTreeSet::new();
        for triple in closure.get_triples(None, None, None) {
            if self.canonical_ref(triple.object)? == ty {
                out.insert(self.canonical_ref(triple.subject)?);
            }
        }
        Ok(out.into_iter().collect())
    }

    /// Every resolved atom owned by a member ontology.
    pub(crate) fn all_atoms(&self) -> Vec<TermRef> {
        let mut out = BTreeSet::new();
        for handle in self.member_handles() {
            handle.read(|o| {
                for term in o.terms() {
                    if matches!(term.kind, TermKind::Atom) {
                        out.insert(TermRef::new(o.id(), term.id));
                    }
                }
            });
        }
        out.into_iter().collect()
    }

    /// Queries the domain for statements matching the given components.
    ///
    /// `None` slots become fresh variables; the iterator lazily yields each
    /// distinct statement the interpreter can establish, within the
    /// configured budgets.
    pub fn get_matching(
        &self,
        subject: Option<TermRef>,
        object: Option<TermRef>,
        relation: Option<TermRef>,
    ) -> Result<MatchIterator<'_>, ReasonError> {
        let subject = match subject {
            Some(t) => t,
            None => self.fresh_variable()?,
        };
        let object = match object {
            Some(t) => t,
            None => self.fresh_variable()?,
        };
        let relation = match relation {
            Some(t) => t,
            None => self.fresh_variable()?,
        };
        let query = self.virtual_triple(subject, object, relation)?;
        MatchIterator::new(self, query)
    }

    /// Returns whether the fully bound statement has at least one proof.
    pub fn is_true(
        &self,
        subject: TermRef,
        object: TermRef,
        relation: TermRef,
    ) -> Result<bool, ReasonError> {
        let mut matches = self.get_matching(Some(subject), Some(object), Some(relation))?;
        Ok(matches.try_next()?.is_some())
    }
}
