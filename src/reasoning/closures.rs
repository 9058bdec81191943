//! Derived closure ontologies.
//!
//! A reasoning domain materialises two helper ontologies before answering
//! queries: the reflexive-transitive closure of `sub-type-of`, and the
//! `instance-of` facts widened along that closure. Axioms drawn from these
//! make hierarchy queries direct matches instead of recursive proofs.

use std::collections::{BTreeMap, BTreeSet};

use crate::ontology::{
    CoreOntology, OntologyError, OntologyHandle, OntologyStore, TermKind, TermRef,
};

/// True when `relation` denotes the same relation as the core term
/// `canonical`, by identity after resolution or by resolved name. Flat
/// files declare their own local relation atoms, so name equivalence is
/// part of the contract.
pub(crate) fn is_relation(
    store: &OntologyStore,
    relation: TermRef,
    canonical: TermRef,
) -> Result<bool, OntologyError> {
    let (resolved, term) = store.resolve(relation)?;
    if resolved == canonical {
        return Ok(true);
    }
    Ok(term.name == store.resolve_name(canonical)?)
}

/// Resolved `(subject, object)` pairs of every member fact whose relation
/// matches `canonical`.
fn facts(
    store: &OntologyStore,
    members: &[OntologyHandle],
    canonical: TermRef,
) -> Result<Vec<(TermRef, TermRef)>, OntologyError> {
    let mut out = Vec::new();
    for member in members {
        for triple in member.get_triples(None, None, None) {
            if is_relation(store, triple.relation, canonical)? {
                let (s, _) = store.resolve(triple.subject)?;
                let (o, _) = store.resolve(triple.object)?;
                out.push((s, o));
            }
        }
    }
    Ok(out)
}

/// Every resolved atom term owned by the member ontologies.
fn member_atoms(members: &[OntologyHandle]) -> BTreeSet<TermRef> {
    let mut out = BTreeSet::new();
    for member in members {
        member.read(|o| {
            for term in o.terms() {
                if matches!(term.kind, TermKind::Atom) {
                    out.insert(TermRef::new(o.id(), term.id));
                }
            }
        });
    }
    out
}

/// Terms reachable from `from` over the edge map, including `from` itself.
fn reachable(edges: &BTreeMap<TermRef, BTreeSet<TermRef>>, from: TermRef) -> BTreeSet<TermRef> {
    let mut seen = BTreeSet::new();
    let mut stack = vec![from];
    while let Some(current) = stack.pop() {
        if !seen.insert(current) {
            continue;
        }
        if let Some(next) = edges.get(&current) {
            stack.extend(next.iter().copied());
        }
    }
    seen
}

fn edge_map(pairs: &[(TermRef, TermRef)]) -> BTreeMap<TermRef, BTreeSet<TermRef>> {
    let mut edges: BTreeMap<TermRef, BTreeSet<TermRef>> = BTreeMap::new();
    for &(s, o) in pairs {
        edges.entry(s).or_default().insert(o);
    }
    edges
}

fn assert_pair(
    store: &OntologyStore,
    closure: &OntologyHandle,
    relation: TermRef,
    subject: TermRef,
    object: TermRef,
) -> Result<(), OntologyError> {
    let s = closure.import_term(store, subject)?;
    let o = closure.import_term(store, object)?;
    if !closure.contains_triple(s, o, relation) {
        closure.create_triple(s, o, relation)?;
    }
    Ok(())
}

/// Materialises the reflexive-transitive closure of `sub-type-of`.
///
/// Participants are the subjects and objects of `sub-type-of` facts plus
/// the objects of `instance-of` facts, which is exactly the set of terms
/// used as types anywhere in the domain.
pub(crate) fn sub_type_closure(
    store: &OntologyStore,
    core: &CoreOntology,
    members: &[OntologyHandle],
) -> Result<OntologyHandle, OntologyError> {
    let closure = store.create_ontology("sub-type-closure", "derived sub-type-of closure");
    let rel = closure.import_term(store, core.sub_type_of)?;

    let sub_facts = facts(store, members, core.sub_type_of)?;
    let inst_facts = facts(store, members, core.instance_of)?;
    let edges = edge_map(&sub_facts);

    let mut participants: BTreeSet<TermRef> = BTreeSet::new();
    for &(s, o) in &sub_facts {
        participants.insert(s);
        participants.insert(o);
    }
    for &(_, t) in &inst_facts {
        participants.insert(t);
    }

    for &p in &participants {
        for target in reachable(&edges, p) {
            assert_pair(store, &closure, rel, p, target)?;
        }
    }
    tracing::debug!(
        ontology = %closure.id(),
        participants = participants.len(),
        "materialised sub-type closure"
    );
    Ok(closure)
}

/// Materialises `instance-of` facts widened along the sub-type hierarchy.
///
/// Each `(i, t, instance-of)` fact yields `(i, s, instance-of)` for every
/// supertype `s` reachable from `t`. Every member atom is additionally an
/// instance of `any`.
pub(crate) fn instance_of_closure(
    store: &OntologyStore,
    core: &CoreOntology,
    members: &[OntologyHandle],
) -> Result<OntologyHandle, OntologyError> {
    let closure = store.create_ontology("instance-closure", "derived instance-of closure");
    let rel = closure.import_term(store, core.instance_of)?;

    let sub_facts = facts(store, members, core.sub_type_of)?;
    let inst_facts = facts(store, members, core.instance_of)?;
    let edges = edge_map(&sub_facts);

    for &(instance, ty) in &inst_facts {
        for supertype in reachable(&edges, ty) {
            assert_pair(store, &closure, rel, instance, supertype)?;
        }
    }
    for atom in member_atoms(members) {
        assert_pair(store, &closure, rel, atom, core.any)?;
    }
    tracing::debug!(
        ontology = %closure.id(),
        facts = inst_facts.len(),
        "materialised instance-of closure"
    );
    Ok(closure)
}

#[cfg(test)]
mod tests {
    use crate::ontology::{init_core, parse_flat, OntologyStore, TermName, TermRef};

    use super::{instance_of_closure, sub_type_closure};

    const SOCRATES: &str = "\
#name: mortality
socrates instance-of man
man sub-type-of mortal
";

    fn named(onto: &crate::ontology::OntologyHandle, name: &str) -> TermRef {
        onto.term_by_name(&TermName::new(name).unwrap()).unwrap()
    }

    #[test]
    fn sub_type_closure_is_reflexive_and_transitive() {
        let store = OntologyStore::new();
        let core = init_core(&store).unwrap();
        let onto = parse_flat(&store, "#name: h\na sub-type-of b\nb sub-type-of c\n").unwrap();
        let closure = sub_type_closure(&store, &core, &[onto.clone()]).unwrap();

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
        assert_eq!(
            pairs,
            vec![
                ("a".into(), "a".into()),
                ("a".into(), "b".into()),
                ("a".into(), "c".into()),
                ("b".into(), "b".into()),
                ("b".into(), "c".into()),
                ("c".into(), "c".into()),
            ]
        );
    }

    #[test]
    fn instances_are_widened_along_the_hierarchy() {
        let store = OntologyStore::new();
        let core = init_core(&store).unwrap();
        let onto = parse_flat(&store, SOCRATES).unwrap();
        let closure = instance_of_closure(&store, &core, &[onto.clone()]).unwrap();

        let socrates = named(&onto, "socrates");
        let man = named(&onto, "man");
        let mortal = named(&onto, "mortal");

        let holds = |s: TermRef, o: TermRef| {
            closure.get_triples(None, None, None).iter().any(|t| {
                store.resolve(t.subject).unwrap().0 == s && store.resolve(t.object).unwrap().0 == o
            })
        };
        assert!(holds(socrates, man));
        assert!(holds(socrates, mortal));
        assert!(holds(socrates, core.any));
        assert!(holds(man, core.any));
        assert!(!holds(mortal, man));
    }
}
