//! Registry owning every ontology in a process.
//!
//! The store hands out [`OntologyHandle`]s wrapping an `Arc<Mutex<Ontology>>`,
//! so handles are cheap to clone and safe to share across threads. All
//! cross-ontology operations lock one ontology at a time, which keeps the
//! locking order trivial.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use super::entities::{Ontology, OntologyError, Term, TermKind, Triple};
use super::events::{Change, OntologyObserver, SharedObserver};
use super::value_objects::{OntologyId, TermId, TermName, TermRef};

/// Relays mutations of an imported term to the importing ontology's
/// observers. Holds the importer weakly so a dropped ontology silences its
/// forwarders.
struct RemoteForwarder {
    importer: Weak<Mutex<Ontology>>,
    watched: TermRef,
}

impl OntologyObserver for RemoteForwarder {
    fn changed(&self, change: &Change) {
        if !change.involves(self.watched) {
            return;
        }
        if let Some(cell) = self.importer.upgrade() {
            cell.lock().expect("ontology lock poisoned").relay(change);
        }
    }
}

/// Process-wide ontology registry.
#[derive(Default)]
pub struct OntologyStore {
    next_id: AtomicU32,
    ontologies: Mutex<std::collections::BTreeMap<OntologyId, Arc<Mutex<Ontology>>>>,
}

impl OntologyStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn registry(&self) -> MutexGuard<'_, std::collections::BTreeMap<OntologyId, Arc<Mutex<Ontology>>>> {
        self.ontologies.lock().expect("ontology registry poisoned")
    }

    /// Registers a fresh, empty ontology and returns its handle.
    pub fn create_ontology(
        &self,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> OntologyHandle {
        let id = OntologyId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let cell = Arc::new(Mutex::new(Ontology::new(id, name, description)));
        self.registry().insert(id, cell.clone());
        tracing::debug!(ontology = %id, "created ontology");
        OntologyHandle { id, cell }
    }

    /// Looks up a registered ontology.
    pub fn get(&self, id: OntologyId) -> Result<OntologyHandle, OntologyError> {
        self.registry()
            .get(&id)
            .cloned()
            .map(|cell| OntologyHandle { id, cell })
            .ok_or(OntologyError::UnknownOntology { ontology: id })
    }

    /// Drops an ontology from the registry.
    ///
    /// Handles already held stay usable; the identifier is never reused.
    pub fn drop_ontology(&self, id: OntologyId) {
        self.registry().remove(&id);
    }

    /// Follows remote links until a non-remote term is reached.
    ///
    /// Returns the final handle together with a clone of its term. Remote
    /// chains are expected to be short; a cycle is reported as an unknown
    /// term rather than looping forever.
    pub fn resolve(&self, mut at: TermRef) -> Result<(TermRef, Term), OntologyError> {
        let mut visited = BTreeSet::new();
        loop {
            if !visited.insert(at) {
                return Err(OntologyError::NoSuchTerm {
                    ontology: at.ontology,
                    term: at.term,
                });
            }
            let handle = self.get(at.ontology)?;
            let term = handle.read(|o| {
                o.get_term(at.term)
                    .cloned()
                    .ok_or(OntologyError::NoSuchTerm {
                        ontology: at.ontology,
                        term: at.term,
                    })
            })?;
            match term.kind {
                TermKind::Remote { target } => at = target,
                _ => return Ok((at, term)),
            }
        }
    }

    /// Resolved name of a term, chasing remote links.
    pub fn resolve_name(&self, at: TermRef) -> Result<TermName, OntologyError> {
        self.resolve(at).map(|(_, term)| term.name)
    }
}

/// Cheap, clonable reference to one ontology in a store.
#[derive(Clone)]
pub struct OntologyHandle {
    id: OntologyId,
    cell: Arc<Mutex<Ontology>>,
}

impl std::fmt::Debug for OntologyHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("OntologyHandle").field(&self.id).finish()
    }
}

impl OntologyHandle {
    /// The handle's ontology identifier.
    #[must_use]
    pub fn id(&self) -> OntologyId {
        self.id
    }

    /// Runs a closure with shared access to the ontology.
    pub fn read<R>(&self, f: impl FnOnce(&Ontology) -> R) -> R {
        f(&self.cell.lock().expect("ontology lock poisoned"))
    }

    /// Runs a closure with exclusive access to the ontology.
    pub fn write<R>(&self, f: impl FnOnce(&mut Ontology) -> R) -> R {
        f(&mut self.cell.lock().expect("ontology lock poisoned"))
    }

    fn refer(&self, term: TermId) -> TermRef {
        TermRef::new(self.id, term)
    }

    /// Registers a mutation observer.
    pub fn add_observer(&self, observer: SharedObserver) {
        self.write(|o| o.add_observer(observer));
    }

    /// Creates an atom term.
    pub fn create_term(
        &self,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Result<TermRef, OntologyError> {
        self.write(|o| o.create_term(name, description)).map(|t| self.refer(t))
    }

    /// Creates a variable term.
    pub fn create_variable(
        &self,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Result<TermRef, OntologyError> {
        self.write(|o| o.create_variable(name, description)).map(|t| self.refer(t))
    }

    /// Creates a pattern term with optionally open components.
    pub fn create_pattern_term(
        &self,
        name: impl Into<String>,
        subject: Option<TermRef>,
        object: Option<TermRef>,
        relation: Option<TermRef>,
    ) -> Result<TermRef, OntologyError> {
        self.write(|o| o.create_pattern(name, subject, object, relation))
            .map(|t| self.refer(t))
    }

    /// Asserts a triple, returning the handle of its reified term.
    pub fn create_triple(
        &self,
        subject: TermRef,
        object: TermRef,
        relation: TermRef,
    ) -> Result<TermRef, OntologyError> {
        self.write(|o| o.create_triple(subject, object, relation))
            .map(|t| self.refer(t))
    }

    /// Asserts a triple reified under a caller-supplied name and
    /// description.
    pub fn create_named_triple(
        &self,
        subject: TermRef,
        object: TermRef,
        relation: TermRef,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Result<TermRef, OntologyError> {
        self.write(|o| o.create_named_triple(subject, object, relation, name, description))
            .map(|t| self.refer(t))
    }

    /// Finds a term by name, creating a fresh atom when absent.
    pub fn get_or_create_term(&self, name: &str) -> Result<TermRef, OntologyError> {
        let parsed = TermName::new(name)?;
        self.write(|o| match o.term_by_name(&parsed) {
            Some(existing) => Ok(existing),
            None => o.create_term(name, ""),
        })
        .map(|t| self.refer(t))
    }

    /// Looks up a term by name.
    #[must_use]
    pub fn term_by_name(&self, name: &TermName) -> Option<TermRef> {
        self.read(|o| o.term_by_name(name)).map(|t| self.refer(t))
    }

    /// Imports a foreign term, returning a local remote view of it.
    ///
    /// Importing a term this ontology already owns hands the handle back
    /// unchanged; importing the same foreign term twice returns the same
    /// local term.
    pub fn import_term(
        &self,
        store: &OntologyStore,
        foreign: TermRef,
    ) -> Result<TermRef, OntologyError> {
        if foreign.ontology == self.id {
            return Ok(foreign);
        }
        let (target, term) = store.resolve(foreign)?;
        if target.ontology == self.id {
            return Ok(target);
        }
        let owner = store.get(target.ontology)?;
        let qualified = format!("{}.{}", owner.read(|o| o.name().to_owned()), term.name);
        let cached = self.read(|o| o.remote_view_of(target));
        let local = self.write(|o| o.import_remote(target, qualified))?;
        if cached.is_none() {
            owner.add_observer(Arc::new(RemoteForwarder {
                importer: Arc::downgrade(&self.cell),
                watched: target,
            }));
        }
        Ok(self.refer(local))
    }

    /// Matching triples for the given component filters; `None` is a
    /// wildcard. Filters referring to foreign terms match nothing, since
    /// every asserted component is local.
    #[must_use]
    pub fn get_triples(
        &self,
        subject: Option<TermRef>,
        object: Option<TermRef>,
        relation: Option<TermRef>,
    ) -> Vec<Triple> {
        for filter in [subject, object, relation].into_iter().flatten() {
            if filter.ontology != self.id {
                return Vec::new();
            }
        }
        self.read(|o| {
            o.get_triples(
                subject.map(|s| s.term),
                object.map(|s| s.term),
                relation.map(|s| s.term),
            )
        })
    }

    /// True if the exact statement is asserted here.
    #[must_use]
    pub fn contains_triple(&self, subject: TermRef, object: TermRef, relation: TermRef) -> bool {
        self.read(|o| o.contains_triple(subject, object, relation))
    }

    /// Deletes a term and every statement mentioning it.
    pub fn delete_term(&self, term: TermRef) -> Result<(), OntologyError> {
        if term.ontology != self.id {
            return Err(OntologyError::ForeignTerm {
                ontology: self.id,
                term,
            });
        }
        self.write(|o| o.delete_term(term.term))
    }

    /// Retracts a statement; returns whether it was present.
    pub fn delete_triple(
        &self,
        subject: TermRef,
        object: TermRef,
        relation: TermRef,
    ) -> Result<bool, OntologyError> {
        self.write(|o| o.delete_triple(subject, object, relation))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::super::entities::TermKind;
    use super::super::events::test_support::RecordingObserver;
    use super::super::events::Change;
    use super::OntologyStore;

    #[test]
    fn ids_are_unique_and_monotonic() {
        let store = OntologyStore::new();
        let a = store.create_ontology("a", "");
        let b = store.create_ontology("b", "");
        assert!(a.id() < b.id());
        store.drop_ontology(a.id());
        let c = store.create_ontology("c", "");
        assert!(b.id() < c.id());
    }

    #[test]
    fn resolve_chases_remote_chains() {
        let store = OntologyStore::new();
        let base = store.create_ontology("base", "");
        let mid = store.create_ontology("mid", "");
        let top = store.create_ontology("top", "");

        let origin = base.create_term("origin", "").unwrap();
        let via = mid.import_term(&store, origin).unwrap();
        let leaf = top.import_term(&store, via).unwrap();

        let (resolved, term) = store.resolve(leaf).unwrap();
        assert_eq!(resolved, origin);
        assert_eq!(term.name.as_str(), "origin");
        // the second hop resolved before caching, so the remote points
        // straight at the origin
        assert!(matches!(
            top.read(|o| o.get_term(leaf.term).unwrap().kind.clone()),
            TermKind::Remote { target } if target == origin
        ));
    }

    #[test]
    fn import_of_local_term_is_identity() {
        let store = OntologyStore::new();
        let onto = store.create_ontology("only", "");
        let t = onto.create_term("t", "").unwrap();
        assert_eq!(onto.import_term(&store, t).unwrap(), t);
    }

    #[test]
    fn imported_terms_forward_target_changes() {
        let store = OntologyStore::new();
        let base = store.create_ontology("base", "");
        let user = store.create_ontology("user", "");
        let origin = base.create_term("origin", "").unwrap();
        let kind = base.create_term("kind", "").unwrap();
        user.import_term(&store, origin).unwrap();

        let observer = Arc::new(RecordingObserver::default());
        user.add_observer(observer.clone());
        base.create_triple(origin, origin, kind).unwrap();
        base.create_term("unrelated", "").unwrap();

        let seen = observer.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(matches!(&seen[0], Change::TripleAdded { .. }));
    }

    #[test]
    fn get_or_create_reuses_existing_terms() {
        let store = OntologyStore::new();
        let onto = store.create_ontology("o", "");
        let first = onto.get_or_create_term("thing").unwrap();
        let second = onto.get_or_create_term("thing").unwrap();
        assert_eq!(first, second);
    }
}
