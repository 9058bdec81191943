//! In-memory triple store with a backtracking inference engine.
//!
//! The crate has two layers. The [`ontology`] layer stores typed symbolic
//! terms and subject-object-relation triples in named ontologies, with
//! structural triple identity, observer-vetoed mutation and remote term
//! imports across ontologies. The [`reasoning`] layer aggregates
//! ontologies into a [`reasoning::ReasoningDomain`], materialises the
//! sub-type and instance closures, and answers pattern queries with a
//! stack-machine interpreter driven by tagged actions.
//!
//! ```
//! use ontomem::config::ReasonerSettings;
//! use ontomem::ontology::parse_flat;
//! use ontomem::reasoning::ReasoningDomain;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut domain = ReasoningDomain::bootstrap(ReasonerSettings::default())?;
//! let facts = parse_flat(
//!     domain.store(),
//!     "#name: mortality\nsocrates instance-of man\nman sub-type-of mortal\n",
//! )?;
//! let socrates = facts.get_or_create_term("socrates")?;
//! let mortal = facts.get_or_create_term("mortal")?;
//! domain.add_ontology(&facts)?;
//!
//! let mut matches = domain.get_matching(Some(socrates), Some(mortal), None)?;
//! assert!(matches.try_next()?.is_some());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod ontology;
pub mod reasoning;
