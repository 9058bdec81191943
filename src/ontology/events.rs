//! Change notification for ontology mutations.
//!
//! Every mutation goes through a commit protocol: the change is computed,
//! announced to observers which may veto it, applied, and then announced
//! again as an accomplished fact. A veto raised during the pre phase aborts
//! the mutation before any state is touched.

use std::fmt::{self, Display, Formatter};
use std::sync::Arc;

use thiserror::Error;

use super::entities::Triple;
use super::value_objects::{OntologyId, TermName, TermRef};

/// Description of a pending or applied ontology mutation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Change {
    /// A term is being created under the given name.
    TermCreated {
        ontology: OntologyId,
        name: TermName,
    },
    /// A term and every triple mentioning it are being removed.
    TermDeleted { term: TermRef },
    /// A triple is being asserted.
    TripleAdded { ontology: OntologyId, triple: Triple },
    /// A triple is being retracted.
    TripleRemoved { ontology: OntologyId, triple: Triple },
    /// An ontology is about to join a reasoning domain.
    OntologyAdded { ontology: OntologyId },
    /// An ontology is about to leave a reasoning domain.
    OntologyRemoved { ontology: OntologyId },
}

impl Change {
    /// True when the change concerns the given term, either directly or as
    /// a component of the affected triple.
    #[must_use]
    pub fn involves(&self, term: TermRef) -> bool {
        match self {
            Change::TermDeleted { term: deleted } => *deleted == term,
            Change::TripleAdded { triple, .. } | Change::TripleRemoved { triple, .. } => {
                [triple.subject, triple.object, triple.relation].contains(&term)
            }
            _ => false,
        }
    }
}

impl Display for Change {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Change::TermCreated { ontology, name } => {
                write!(f, "create term {name} in {ontology}")
            }
            Change::TermDeleted { term } => write!(f, "delete term {term}"),
            Change::TripleAdded { ontology, .. } => write!(f, "add triple in {ontology}"),
            Change::TripleRemoved { ontology, .. } => write!(f, "remove triple in {ontology}"),
            Change::OntologyAdded { ontology } => write!(f, "add ontology {ontology}"),
            Change::OntologyRemoved { ontology } => write!(f, "remove ontology {ontology}"),
        }
    }
}

/// Raised by an observer to reject a proposed change.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("change vetoed: {reason}")]
pub struct ChangeVeto {
    pub reason: String,
}

impl ChangeVeto {
    /// Builds a veto carrying a human-readable reason.
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Observer of ontology mutations.
///
/// `will_change` runs before the mutation is applied and may veto it;
/// `changed` runs after the mutation succeeded and is purely informational.
pub trait OntologyObserver: Send + Sync {
    /// Called before the change is applied. Returning an error aborts it.
    fn will_change(&self, change: &Change) -> Result<(), ChangeVeto> {
        let _ = change;
        Ok(())
    }

    /// Called after the change has been applied.
    fn changed(&self, change: &Change) {
        let _ = change;
    }
}

/// Shared, clonable observer handle.
pub type SharedObserver = Arc<dyn OntologyObserver>;

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Mutex;

    use super::{Change, ChangeVeto, OntologyObserver};

    /// Observer that records every change and optionally vetoes all of them.
    #[derive(Default)]
    pub struct RecordingObserver {
        pub veto: bool,
        pub seen: Mutex<Vec<Change>>,
    }

    impl OntologyObserver for RecordingObserver {
        fn will_change(&self, change: &Change) -> Result<(), ChangeVeto> {
            if self.veto {
                return Err(ChangeVeto::new(format!("rejected: {change}")));
            }
            Ok(())
        }

        fn changed(&self, change: &Change) {
            self.seen
                .lock()
                .expect("observer log poisoned")
                .push(change.clone());
        }
    }
}
