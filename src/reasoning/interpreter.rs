//! Backtracking proof interpreter.
//!
//! Queries run on an explicit frame stack. Each frame carries a tagged
//! action plus its environment: the variable bindings, the axiom under
//! trial and the query proposition. An action completes by writing a
//! boolean term into the result slot of the frame below it; choice points
//! re-push themselves with an advanced index before trying the next
//! alternative, which is all the backtracking there is. Budgets cap the
//! step count and stack depth, and exceeding either ends the query as
//! exhausted rather than as an error.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::ontology::{TermKind, TermRef};

use super::domain::{Axiom, ReasonError, ReasoningDomain};
use super::proposition::{Prop, Proposition, Truth};

/// Where a variable sits inside a statement.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Side {
    Subject,
    Object,
    Relation,
}

/// One deterministic move of the interpreter.
#[derive(Clone, Debug)]
enum Action {
    /// Top-level driver: try each axiom against the query in turn.
    EachAxiom { index: usize, any: bool },
    /// Substitute bindings, then either prove or branch on a free variable.
    ExpandVariables,
    /// Choice point over candidate values for one variable.
    ValueIterator {
        variable: TermRef,
        candidates: Vec<TermRef>,
        index: usize,
        any: bool,
    },
    /// Record a solution when the proof below came back true.
    EmitIfTrue,
    /// Decide how the current axiom can support the query.
    CheckImplication,
    /// Structural identity of axiom and query.
    Equivalent,
    /// Retry with the axiom narrowed to one side of a connective.
    FocusAxiom { object_side: bool, then: Box<Action> },
    /// Ordered disjunction of two strategies.
    OrElse { first: Box<Action>, second: Box<Action> },
    /// Waiting for the first arm of an [`Action::OrElse`].
    OrPending { second: Box<Action> },
    /// Conjunction of two strategies.
    Both { first: Box<Action>, second: Box<Action> },
    /// Waiting for the first arm of an [`Action::Both`].
    BothPending { second: Box<Action> },
    /// Evaluate the query through the truth cache.
    CheckTrueFalse,
    /// Write the finished evaluation into the truth cache.
    StoreTruth,
    /// Bottom-up evaluation of a nested statement.
    EvaluateFully,
    /// Decompose a statement whose direct scan failed.
    EvaluateParts,
    /// Splice an evaluated subject back into its statement.
    ReplaceSubject,
    /// Splice an evaluated object back into its statement.
    ReplaceObject,
    /// Match a flat ground statement against the constant axioms.
    ScanAxioms,
}

impl Action {
    fn describe(&self) -> &'static str {
        match self {
            Action::EachAxiom { .. } => "each-axiom",
            Action::ExpandVariables => "expand-variables",
            Action::ValueIterator { .. } => "value-iterator",
            Action::EmitIfTrue => "emit-if-true",
            Action::CheckImplication => "check-implication",
            Action::Equivalent => "equivalent",
            Action::FocusAxiom { .. } => "focus-axiom",
            Action::OrElse { .. } => "or-else",
            Action::OrPending { .. } => "or-pending",
            Action::Both { .. } => "both",
            Action::BothPending { .. } => "both-pending",
            Action::CheckTrueFalse => "check-true-false",
            Action::StoreTruth => "store-truth",
            Action::EvaluateFully => "evaluate-fully",
            Action::EvaluateParts => "evaluate-parts",
            Action::ReplaceSubject => "replace-subject",
            Action::ReplaceObject => "replace-object",
            Action::ScanAxioms => "scan-axioms",
        }
    }
}

/// Interpreter frame: an action plus the environment it runs in.
#[derive(Clone, Debug)]
struct Frame {
    action: Action,
    bindings: BTreeMap<TermRef, TermRef>,
    axiom: TermRef,
    prop: TermRef,
    result: Option<TermRef>,
}

impl Frame {
    fn child(&self, action: Action) -> Self {
        Self {
            action,
            bindings: self.bindings.clone(),
            axiom: self.axiom,
            prop: self.prop,
            result: None,
        }
    }
}

/// Lazy stream of statements matching a query.
///
/// Obtained from [`ReasoningDomain::get_matching`]. Each `next` call runs
/// the interpreter until another distinct statement is established or the
/// search space or budget is exhausted.
pub struct MatchIterator<'d> {
    domain: &'d ReasoningDomain,
    axioms: &'d [Axiom],
    stack: Vec<Frame>,
    out: VecDeque<Proposition>,
    emitted: BTreeSet<Prop>,
    steps: usize,
    exhausted: bool,
    budget_exhausted: bool,
    trace: VecDeque<String>,
    proving: Vec<Prop>,
}

impl<'d> MatchIterator<'d> {
    pub(crate) fn new(domain: &'d ReasoningDomain, query: TermRef) -> Result<Self, ReasonError> {
        let axioms = domain.ensure_axioms()?;
        let root = Frame {
            action: Action::EachAxiom { index: 0, any: false },
            bindings: BTreeMap::new(),
            axiom: query,
            prop: query,
            result: None,
        };
        Ok(Self {
            domain,
            axioms,
            stack: vec![root],
            out: VecDeque::new(),
            emitted: BTreeSet::new(),
            steps: 0,
            exhausted: false,
            budget_exhausted: false,
            trace: VecDeque::new(),
            proving: Vec::new(),
        })
    }

    /// True when a budget, rather than the search space, ended the query.
    #[must_use]
    pub fn budget_exhausted(&self) -> bool {
        self.budget_exhausted
    }

    /// Recent stack snapshots, oldest first.
    #[must_use]
    pub fn trace(&self) -> Vec<String> {
        self.trace.iter().cloned().collect()
    }

    /// Fallible pull, for callers that want errors without the iterator
    /// wrapping.
    pub fn try_next(&mut self) -> Result<Option<Proposition>, ReasonError> {
        loop {
            if let Some(found) = self.out.pop_front() {
                return Ok(Some(found));
            }
            if self.exhausted || self.stack.is_empty() {
                self.exhausted = true;
                return Ok(None);
            }
            if let Err(err) = self.step() {
                self.exhausted = true;
                self.domain.forget_unproven(&self.proving);
                self.proving.clear();
                return Err(err);
            }
        }
    }

    fn give_up(&mut self) {
        tracing::debug!(steps = self.steps, "query budget exhausted");
        self.budget_exhausted = true;
        self.exhausted = true;
        self.stack.clear();
        // dropped frames include the pending truth-cache writes
        self.domain.forget_unproven(&self.proving);
        self.proving.clear();
    }

    fn push(&mut self, frame: Frame) {
        if self.exhausted {
            return;
        }
        if self.stack.len() >= self.domain.settings().max_depth {
            self.give_up();
            return;
        }
        self.stack.push(frame);
    }

    fn complete(&mut self, result: TermRef) {
        if let Some(top) = self.stack.last_mut() {
            top.result = Some(result);
        }
    }

    fn snapshot(&mut self) {
        let keep = self.domain.settings().stacks_to_keep;
        if keep == 0 {
            return;
        }
        let line = self
            .stack
            .iter()
            .map(|f| f.action.describe())
            .collect::<Vec<_>>()
            .join(" ");
        if self.trace.len() == keep {
            self.trace.pop_front();
        }
        self.trace.push_back(line);
    }

    fn is_true(&self, term: Option<TermRef>) -> Result<bool, ReasonError> {
        match term {
            Some(t) => Ok(self.domain.canonical_ref(t)? == self.domain.core().true_value),
            None => Ok(false),
        }
    }

    fn truth_value(&self, term: TermRef) -> Result<Option<bool>, ReasonError> {
        let resolved = self.domain.canonical_ref(term)?;
        let core = self.domain.core();
        Ok(if resolved == core.true_value {
            Some(true)
        } else if resolved == core.false_value {
            Some(false)
        } else {
            None
        })
    }

    /// Resolved components when the term denotes a statement.
    fn as_statement(
        &self,
        term: TermRef,
    ) -> Result<Option<(TermRef, TermRef, TermRef)>, ReasonError> {
        let (_, t) = self.domain.store().resolve(term)?;
        Ok(match t.kind {
            TermKind::Triple(t) => Some((t.subject, t.object, t.relation)),
            TermKind::Pattern {
                subject: Some(s),
                object: Some(o),
                relation: Some(r),
            } => Some((s, o, r)),
            _ => None,
        })
    }

    /// Substitutes bindings through a term, building scratch statements for
    /// any component that changed.
    fn expand(
        &self,
        term: TermRef,
        bindings: &BTreeMap<TermRef, TermRef>,
    ) -> Result<TermRef, ReasonError> {
        let (resolved, t) = self.domain.store().resolve(term)?;
        if t.is_variable() {
            return Ok(bindings.get(&resolved).copied().unwrap_or(resolved));
        }
        let Some((s, o, r)) = self.as_statement(resolved)? else {
            return Ok(resolved);
        };
        let (es, eo, er) = (
            self.expand(s, bindings)?,
            self.expand(o, bindings)?,
            self.expand(r, bindings)?,
        );
        let store = self.domain.store();
        if es == store.resolve(s)?.0 && eo == store.resolve(o)?.0 && er == store.resolve(r)?.0 {
            return Ok(resolved);
        }
        self.domain.virtual_triple(es, eo, er)
    }

    /// First variable left in a fully expanded term, searching subject,
    /// object, then relation.
    fn first_unbound(&self, term: TermRef) -> Result<Option<TermRef>, ReasonError> {
        let (resolved, t) = self.domain.store().resolve(term)?;
        if t.is_variable() {
            return Ok(Some(resolved));
        }
        let Some((s, o, r)) = self.as_statement(resolved)? else {
            return Ok(None);
        };
        for component in [s, o, r] {
            if let Some(found) = self.first_unbound(component)? {
                return Ok(Some(found));
            }
        }
        Ok(None)
    }

    /// The relation the variable is paired with in the innermost statement
    /// mentioning it, and which slot the variable occupies.
    fn paired_relation(
        &self,
        term: TermRef,
        variable: TermRef,
    ) -> Result<Option<(TermRef, Side)>, ReasonError> {
        let Some((s, o, r)) = self.as_statement(term)? else {
            return Ok(None);
        };
        let store = self.domain.store();
        if store.resolve(s)?.0 == variable {
            return Ok(Some((store.resolve(r)?.0, Side::Subject)));
        }
        if store.resolve(o)?.0 == variable {
            return Ok(Some((store.resolve(r)?.0, Side::Object)));
        }
        if store.resolve(r)?.0 == variable {
            return Ok(Some((variable, Side::Relation)));
        }
        for component in [s, o] {
            if let Some(found) = self.paired_relation(component, variable)? {
                return Ok(Some(found));
            }
        }
        Ok(None)
    }

    /// Candidate values for a variable. A variable in relation position
    /// ranges over the known relations; one in subject or object position
    /// is narrowed to the instances of the relation's declared domain or
    /// co-domain. Without any pairing, every member atom is a candidate.
    fn candidates_for(
        &self,
        variable: TermRef,
        axiom: TermRef,
        prop: TermRef,
    ) -> Result<Vec<TermRef>, ReasonError> {
        let paired = match self.paired_relation(axiom, variable)? {
            Some(found) => Some(found),
            None => self.paired_relation(prop, variable)?,
        };
        match paired {
            Some((_, Side::Relation)) => self.domain.instances_of(self.domain.core().relation),
            Some((relation, side)) => {
                match self.domain.declared_type(relation, side == Side::Object)? {
                    Some(ty) => self.domain.instances_of(ty),
                    None => Ok(self.domain.all_atoms()),
                }
            }
            None => Ok(self.domain.all_atoms()),
        }
    }

    /// How the current axiom can support the query, beyond identity.
    fn decomposition(&self, axiom: TermRef) -> Result<Option<Action>, ReasonError> {
        let Some((s, o, r)) = self.as_statement(axiom)? else {
            return Ok(None);
        };
        let core = self.domain.core();
        let relation = self.domain.canonical_ref(r)?;
        let focus = |object_side| Action::FocusAxiom {
            object_side,
            then: Box::new(Action::CheckImplication),
        };
        let subject_compound = self.as_statement(s)?.is_some();
        let object_compound = self.as_statement(o)?.is_some();
        Ok(if relation == core.and {
            match (subject_compound, object_compound) {
                // a conjunction supports whatever either side supports
                (true, true) => Some(Action::OrElse {
                    first: Box::new(focus(false)),
                    second: Box::new(focus(true)),
                }),
                (true, false) => Some(focus(false)),
                (false, true) => Some(focus(true)),
                (false, false) => None,
            }
        } else if relation == core.or {
            match (subject_compound, object_compound) {
                // a disjunction supports only what both sides support
                (true, true) => Some(Action::Both {
                    first: Box::new(focus(false)),
                    second: Box::new(focus(true)),
                }),
                (true, false) => Some(focus(false)),
                (false, true) => Some(focus(true)),
                (false, false) => None,
            }
        } else if relation == core.implies {
            Some(focus(true))
        } else {
            None
        })
    }

    /// Whether the query itself nests statements or connectives, making a
    /// bottom-up evaluation worth trying alongside identity.
    fn prop_is_nested(&self, prop: TermRef) -> Result<bool, ReasonError> {
        let Some((s, o, r)) = self.as_statement(prop)? else {
            return Ok(false);
        };
        if self.as_statement(s)?.is_some() || self.as_statement(o)?.is_some() {
            return Ok(true);
        }
        Ok(self.domain.core().is_connective(self.domain.canonical_ref(r)?))
    }

    fn step(&mut self) -> Result<(), ReasonError> {
        self.steps += 1;
        if self.steps > self.domain.settings().max_tries {
            self.give_up();
            return Ok(());
        }
        self.snapshot();
        let Some(frame) = self.stack.pop() else {
            self.exhausted = true;
            return Ok(());
        };
        match frame.action.clone() {
            Action::EachAxiom { index, any } => {
                let any = any || self.is_true(frame.result)?;
                if index >= self.axioms.len() {
                    self.complete(self.domain.bool_term(any));
                    return Ok(());
                }
                let axiom = self.axioms[index].term;
                let next = Frame {
                    action: Action::EachAxiom {
                        index: index + 1,
                        any,
                    },
                    result: None,
                    ..frame.clone()
                };
                self.push(next);
                self.push(Frame {
                    action: Action::ExpandVariables,
                    bindings: BTreeMap::new(),
                    axiom,
                    prop: frame.prop,
                    result: None,
                });
            }
            Action::ExpandVariables => {
                let axiom = self.expand(frame.axiom, &frame.bindings)?;
                let prop = self.expand(frame.prop, &frame.bindings)?;
                let unbound = match self.first_unbound(axiom)? {
                    Some(v) => Some(v),
                    None => self.first_unbound(prop)?,
                };
                let ground = Frame {
                    bindings: frame.bindings.clone(),
                    axiom,
                    prop,
                    result: None,
                    action: Action::EmitIfTrue,
                };
                match unbound {
                    None => {
                        self.push(ground.child(Action::EmitIfTrue));
                        self.push(ground.child(Action::CheckImplication));
                    }
                    Some(variable) => {
                        let candidates = self.candidates_for(variable, axiom, prop)?;
                        self.push(Frame {
                            action: Action::ValueIterator {
                                variable,
                                candidates,
                                index: 0,
                                any: false,
                            },
                            ..ground
                        });
                    }
                }
            }
            Action::ValueIterator {
                variable,
                candidates,
                index,
                any,
            } => {
                let any = any || self.is_true(frame.result)?;
                let mut at = index;
                while at < candidates.len() {
                    let (_, term) = self.domain.store().resolve(candidates[at])?;
                    if matches!(term.kind, TermKind::Atom) {
                        break;
                    }
                    at += 1;
                }
                if at >= candidates.len() {
                    self.complete(self.domain.bool_term(any));
                    return Ok(());
                }
                let chosen = candidates[at];
                self.push(Frame {
                    action: Action::ValueIterator {
                        variable,
                        candidates,
                        index: at + 1,
                        any,
                    },
                    result: None,
                    ..frame.clone()
                });
                let mut bindings = frame.bindings.clone();
                bindings.insert(variable, chosen);
                self.push(Frame {
                    action: Action::ExpandVariables,
                    bindings,
                    axiom: frame.axiom,
                    prop: frame.prop,
                    result: None,
                });
            }
            Action::EmitIfTrue => {
                let result = frame
                    .result
                    .unwrap_or_else(|| self.domain.bool_term(false));
                if self.is_true(Some(result))? {
                    let prop = self.domain.canonical_prop(frame.prop)?;
                    if prop.is_ground() && self.emitted.insert(prop.clone()) {
                        self.out.push_back(Proposition::new(prop));
                    }
                }
                self.complete(result);
            }
            Action::CheckImplication => {
                if self.as_statement(frame.axiom)?.is_none() {
                    return Err(ReasonError::NotATriple { term: frame.axiom });
                }
                let direct = if self.prop_is_nested(frame.prop)? {
                    Action::OrElse {
                        first: Box::new(Action::Equivalent),
                        second: Box::new(Action::CheckTrueFalse),
                    }
                } else {
                    Action::Equivalent
                };
                let action = match self.decomposition(frame.axiom)? {
                    Some(strategy) => Action::OrElse {
                        first: Box::new(direct),
                        second: Box::new(strategy),
                    },
                    None => direct,
                };
                self.push(frame.child(action));
            }
            Action::Equivalent => {
                let same = self.domain.canonical_prop(frame.axiom)?
                    == self.domain.canonical_prop(frame.prop)?;
                self.complete(self.domain.bool_term(same));
            }
            Action::FocusAxiom { object_side, then } => {
                let Some((s, o, _)) = self.as_statement(frame.axiom)? else {
                    return Err(ReasonError::NotATriple { term: frame.axiom });
                };
                let axiom = if object_side { o } else { s };
                self.push(Frame {
                    action: *then,
                    bindings: frame.bindings.clone(),
                    axiom,
                    prop: frame.prop,
                    result: None,
                });
            }
            Action::OrElse { first, second } => {
                self.push(frame.child(Action::OrPending { second }));
                self.push(frame.child(*first));
            }
            Action::OrPending { second } => {
                if self.is_true(frame.result)? {
                    self.complete(self.domain.bool_term(true));
                } else {
                    self.push(frame.child(*second));
                }
            }
            Action::Both { first, second } => {
                self.push(frame.child(Action::BothPending { second }));
                self.push(frame.child(*first));
            }
            Action::BothPending { second } => {
                if self.is_true(frame.result)? {
                    self.push(frame.child(*second));
                } else {
                    self.complete(self.domain.bool_term(false));
                }
            }
            Action::CheckTrueFalse => {
                let prop = self.domain.canonical_prop(frame.prop)?;
                match self.domain.truth_of(&prop) {
                    Some(Truth::True) => self.complete(self.domain.bool_term(true)),
                    // a proof depending on itself counts as false
                    Some(Truth::False | Truth::Proving) => {
                        self.complete(self.domain.bool_term(false));
                    }
                    None => {
                        self.proving.push(prop.clone());
                        self.domain.set_truth(prop, Truth::Proving);
                        self.push(frame.child(Action::StoreTruth));
                        self.push(Frame {
                            action: Action::EvaluateFully,
                            bindings: frame.bindings.clone(),
                            axiom: frame.prop,
                            prop: frame.prop,
                            result: None,
                        });
                    }
                }
            }
            Action::StoreTruth => {
                let verdict = self.is_true(frame.result)?;
                let prop = self.domain.canonical_prop(frame.prop)?;
                self.domain
                    .set_truth(prop, if verdict { Truth::True } else { Truth::False });
                self.complete(self.domain.bool_term(verdict));
            }
            Action::EvaluateFully => {
                if self.as_statement(frame.axiom)?.is_none() {
                    // atoms evaluate to themselves
                    let (resolved, _) = self.domain.store().resolve(frame.axiom)?;
                    self.complete(resolved);
                    return Ok(());
                }
                // an asserted statement is true as stated; decompose only
                // when the direct scan fails
                self.push(frame.child(Action::OrElse {
                    first: Box::new(Action::ScanAxioms),
                    second: Box::new(Action::EvaluateParts),
                }));
            }
            Action::EvaluateParts => {
                let Some((s, o, r)) = self.as_statement(frame.axiom)? else {
                    return Err(ReasonError::NotATriple { term: frame.axiom });
                };
                if self.as_statement(s)?.is_some() {
                    self.push(frame.child(Action::ReplaceSubject));
                    self.push(Frame {
                        action: Action::EvaluateFully,
                        bindings: frame.bindings.clone(),
                        axiom: s,
                        prop: frame.prop,
                        result: None,
                    });
                    return Ok(());
                }
                if self.as_statement(o)?.is_some() {
                    self.push(frame.child(Action::ReplaceObject));
                    self.push(Frame {
                        action: Action::EvaluateFully,
                        bindings: frame.bindings.clone(),
                        axiom: o,
                        prop: frame.prop,
                        result: None,
                    });
                    return Ok(());
                }
                let relation = self.domain.canonical_ref(r)?;
                if self.domain.core().is_connective(relation) {
                    if let (Some(left), Some(right)) =
                        (self.truth_value(s)?, self.truth_value(o)?)
                    {
                        let core = self.domain.core();
                        let verdict = if relation == core.and {
                            left && right
                        } else if relation == core.or {
                            left || right
                        } else {
                            !left || right
                        };
                        self.complete(self.domain.bool_term(verdict));
                        return Ok(());
                    }
                }
                self.complete(self.domain.bool_term(false));
            }
            Action::ReplaceSubject | Action::ReplaceObject => {
                let Some((s, o, r)) = self.as_statement(frame.axiom)? else {
                    return Err(ReasonError::NotATriple { term: frame.axiom });
                };
                let evaluated = frame.result.ok_or(ReasonError::InvalidTerm {
                    term: frame.axiom,
                })?;
                let rebuilt = if matches!(frame.action, Action::ReplaceSubject) {
                    self.domain.virtual_triple(evaluated, o, r)?
                } else {
                    self.domain.virtual_triple(s, evaluated, r)?
                };
                self.push(Frame {
                    action: Action::EvaluateFully,
                    bindings: frame.bindings.clone(),
                    axiom: rebuilt,
                    prop: frame.prop,
                    result: None,
                });
            }
            Action::ScanAxioms => {
                let wanted = self.domain.canonical_prop(frame.axiom)?;
                let found = self
                    .axioms
                    .iter()
                    .any(|a| a.constant && a.prop == wanted);
                self.complete(self.domain.bool_term(found));
            }
        }
        Ok(())
    }
}

impl Iterator for MatchIterator<'_> {
    type Item = Result<Proposition, ReasonError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.try_next() {
            Ok(Some(found)) => Some(Ok(found)),
            Ok(None) => None,
            Err(err) => Some(Err(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::config::ReasonerSettings;
    use crate::ontology::parse_flat;
    use crate::reasoning::ReasoningDomain;

    #[test]
    fn giving_up_clears_in_flight_truth_marks() {
        // enough steps to enter the truth evaluation of the conjunction,
        // too few to finish it
        let settings = ReasonerSettings {
            max_tries: 12,
            ..ReasonerSettings::default()
        };
        let mut domain = ReasoningDomain::bootstrap(settings).expect("bootstrap");
        let onto =
            parse_flat(domain.store(), "#name: facts\na rel b\nc rel d\n").expect("facts");
        domain.add_ontology(&onto).expect("add ontology");

        let a = onto.get_or_create_term("a").expect("a");
        let b = onto.get_or_create_term("b").expect("b");
        let c = onto.get_or_create_term("c").expect("c");
        let d = onto.get_or_create_term("d").expect("d");
        let rel = onto.get_or_create_term("rel").expect("rel");
        let and = onto.get_or_create_term("and").expect("and");
        let left = onto
            .create_pattern_term("(a,rel,b)", Some(a), Some(b), Some(rel))
            .expect("left side");
        let right = onto
            .create_pattern_term("(c,rel,d)", Some(c), Some(d), Some(rel))
            .expect("right side");

        let query = domain.virtual_triple(left, right, and).expect("query term");
        let wanted = domain.canonical_prop(query).expect("query prop");

        let mut matches = domain
            .get_matching(Some(left), Some(right), Some(and))
            .expect("query");
        assert!(matches.try_next().expect("step").is_none());
        assert!(matches.budget_exhausted());
        // the abandoned proof must not poison later queries
        assert!(domain.truth_of(&wanted).is_none());
    }
}
