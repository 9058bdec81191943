//! Reasoning layer: domains, closures and the proof interpreter.

pub mod closures;
pub mod domain;
pub mod interpreter;
pub mod proposition;

pub use domain::{ReasonError, ReasoningDomain};
pub use interpreter::MatchIterator;
pub use proposition::{canonicalize, Prop, Proposition, Truth};
