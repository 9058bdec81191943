//! Ontology layer: terms, triples, stores and the flat triples format.

pub mod bootstrap;
pub mod entities;
pub mod events;
pub mod io;
pub mod ops;
pub mod store;
pub mod value_objects;

pub use bootstrap::{init_core, BootstrapError, CoreOntology};
pub use entities::{Ontology, OntologyError, Term, TermKind, Triple};
pub use events::{Change, ChangeVeto, OntologyObserver, SharedObserver};
pub use io::{parse_flat, ParseError};
pub use ops::{DefaultOps, OntologyOps, OpsError};
pub use store::{OntologyHandle, OntologyStore};
pub use value_objects::{NameError, OntologyId, TermId, TermName, TermRef};
