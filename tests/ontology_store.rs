use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use rstest::rstest;

use ontomem::ontology::{
    parse_flat, OntologyStore, TermKind, TermName, TermRef, Triple,
};

fn hash_ref(r: &TermRef) -> u64 {
    let mut h = DefaultHasher::new();
    r.hash(&mut h);
    h.finish()
}

#[test]
fn structural_hash_follows_the_component_contract() {
    let store = OntologyStore::new();
    let onto = store.create_ontology("contract", "");
    let s = onto.create_term("s", "").expect("subject");
    let o = onto.create_term("o", "").expect("object");
    let r = onto.create_term("r", "").expect("relation");
    onto.create_triple(s, o, r).expect("triple");

    let stored = onto.get_triples(None, None, None).pop().expect("stored triple");
    let expected = hash_ref(&s)
        .wrapping_add(hash_ref(&o).wrapping_mul(31))
        .wrapping_add(hash_ref(&r).wrapping_mul(31 * 31));
    assert_eq!(stored.structural_hash(), expected);
    assert_eq!(Triple::probe(s, o, r), stored);
    assert_eq!(Triple::probe(s, o, r).structural_hash(), expected);
}

#[rstest]
#[case(Some("a"), None, None, 2)]
#[case(None, Some("b"), None, 2)]
#[case(None, None, Some("rel"), 2)]
#[case(Some("a"), Some("b"), Some("rel"), 1)]
#[case(Some("b"), Some("a"), Some("rel"), 0)]
#[case(None, None, None, 3)]
fn wildcard_queries_match_by_component(
    #[case] subject: Option<&str>,
    #[case] object: Option<&str>,
    #[case] relation: Option<&str>,
    #[case] expected: usize,
) {
    let store = OntologyStore::new();
    let onto = parse_flat(&store, "#name: q\na rel b\na rel c\nc other b\n").expect("parse");
    let named = |n: &str| {
        onto.term_by_name(&TermName::new(n).expect("name"))
            .expect("term")
    };
    let matches = onto.get_triples(
        subject.map(named),
        object.map(named),
        relation.map(named),
    );
    assert_eq!(matches.len(), expected);
}

#[test]
fn import_term_is_idempotent_across_handles() {
    let store = OntologyStore::new();
    let base = store.create_ontology("base", "");
    let user = store.create_ontology("user", "");
    let origin = base.create_term("origin", "").expect("origin");

    let first = user.import_term(&store, origin).expect("first import");
    let second = user.import_term(&store, origin).expect("second import");
    assert_eq!(first, second);
    assert_eq!(store.resolve(first).expect("resolve").0, origin);

    // importing through a clone of the handle still hits the cache
    let third = user.clone().import_term(&store, origin).expect("third import");
    assert_eq!(first, third);
}

#[test]
fn deleting_a_term_empties_every_index() {
    let store = OntologyStore::new();
    let onto = parse_flat(&store, "#name: d\nhub rel spoke\nspoke rel hub\nhub rel other\n")
        .expect("parse");
    let hub = onto
        .term_by_name(&TermName::new("hub").expect("name"))
        .expect("hub");

    onto.delete_term(hub).expect("delete");

    assert!(onto.get_triples(None, None, None).is_empty());
    assert!(onto.get_triples(Some(hub), None, None).is_empty());
    assert!(onto.get_triples(None, Some(hub), None).is_empty());
    assert!(onto
        .term_by_name(&TermName::new("hub").expect("name"))
        .is_none());
    // unrelated terms survive
    assert!(onto
        .term_by_name(&TermName::new("spoke").expect("name"))
        .is_some());
}

#[test]
fn reified_statements_can_be_components() {
    let store = OntologyStore::new();
    let onto = store.create_ontology("nested", "");
    let tom = onto.create_term("tom", "").expect("tom");
    let bill = onto.create_term("bill", "").expect("bill");
    let father = onto.create_term("father-of", "").expect("father-of");
    let believes = onto.create_term("believed-by", "").expect("believed-by");
    let alice = onto.create_term("alice", "").expect("alice");

    let fact = onto.create_triple(tom, bill, father).expect("inner");
    onto.create_triple(fact, alice, believes).expect("outer");

    let kind = onto.read(|o| o.get_term(fact.term).expect("fact term").kind.clone());
    assert!(matches!(kind, TermKind::Triple(_)));

    // deleting the inner statement's subject cascades through the outer one
    onto.delete_term(tom).expect("delete tom");
    assert!(onto.get_triples(None, None, None).is_empty());
    assert!(onto.read(|o| o.get_term(fact.term).is_none()));
}
