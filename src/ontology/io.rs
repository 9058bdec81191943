//! Flat triples format.
//!
//! The format has three kinds of lines. Blank lines are skipped. Comment
//! lines start with `#`; the special comments `#name:` and `#description:`
//! name the ontology when they appear before the first payload line.
//! Payload lines hold three whitespace-separated fields: `subject relation
//! object`. A field of the form `(source,relation,target)` names a pattern
//! term standing for the whole statement, and may nest.

use thiserror::Error;

use super::entities::OntologyError;
use super::store::{OntologyHandle, OntologyStore};
use super::value_objects::{TermName, TermRef};

/// Errors raised while reading the flat triples format.
#[derive(Debug, Error)]
pub enum ParseError {
    /// A payload line held fewer than three fields.
    #[error("line {line_no}: expected `subject relation object`, got {line:?}")]
    MissingField { line_no: usize, line: String },
    /// A parenthesised token did not split into three components.
    #[error("line {line_no}: malformed pattern token {token:?}")]
    BadPattern { line_no: usize, token: String },
    /// The underlying ontology rejected a term or triple.
    #[error(transparent)]
    Ontology(#[from] OntologyError),
}

/// Parses one ontology from flat-format text, registering it in `store`.
///
/// Terms are created on first mention; statements already asserted are
/// skipped, so the format tolerates repetition.
pub fn parse_flat(store: &OntologyStore, text: &str) -> Result<OntologyHandle, ParseError> {
    let mut name = String::new();
    let mut description = String::new();
    let mut onto: Option<OntologyHandle> = None;

    for (idx, raw) in text.lines().enumerate() {
        let line = raw.trim();
        let line_no = idx + 1;
        if line.is_empty() {
            continue;
        }
        if let Some(rest) = line.strip_prefix('#') {
            if onto.is_none() {
                if let Some(v) = rest.strip_prefix("name:") {
                    name = v.trim().to_owned();
                } else if let Some(v) = rest.strip_prefix("description:") {
                    description = v.trim().to_owned();
                }
            }
            continue;
        }
        let handle = onto
            .get_or_insert_with(|| store.create_ontology(name.clone(), description.clone()));

        let mut fields = line.split_whitespace();
        let (Some(subject), Some(relation), Some(object)) =
            (fields.next(), fields.next(), fields.next())
        else {
            return Err(ParseError::MissingField {
                line_no,
                line: line.to_owned(),
            });
        };
        let subject = resolve_term(handle, subject, line_no)?;
        let object = resolve_term(handle, object, line_no)?;
        let relation = resolve_term(handle, relation, line_no)?;
        if !handle.contains_triple(subject, object, relation) {
            handle.create_triple(subject, object, relation)?;
        }
    }

    Ok(onto.unwrap_or_else(|| store.create_ontology(name, description)))
}

/// Finds or creates the term a field names.
fn resolve_term(
    handle: &OntologyHandle,
    token: &str,
    line_no: usize,
) -> Result<TermRef, ParseError> {
    if let Ok(parsed) = TermName::new(token) {
        if let Some(existing) = handle.term_by_name(&parsed) {
            return Ok(existing);
        }
    }
    if token.starts_with('(') && token.ends_with(')') {
        let parts = split_components(&token[1..token.len() - 1]);
        let [source, relation, target] = parts.as_slice() else {
            return Err(ParseError::BadPattern {
                line_no,
                token: token.to_owned(),
            });
        };
        let subject = resolve_term(handle, source, line_no)?;
        let object = resolve_term(handle, target, line_no)?;
        let rel = resolve_term(handle, relation, line_no)?;
        return Ok(handle.create_pattern_term(token, Some(subject), Some(object), Some(rel))?);
    }
    Ok(handle.get_or_create_term(token)?)
}

/// Splits a pattern body on top-level commas, honouring nesting.
fn split_components(body: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut current = String::new();
    for c in body.chars() {
        match c {
            '(' => {
                depth += 1;
                current.push(c);
            }
            ')' => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            ',' if depth == 0 => {
                parts.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }
    parts.push(current);
    parts
}

#[cfg(test)]
mod tests {
    use super::super::entities::TermKind;
    use super::super::store::OntologyStore;
    use super::super::value_objects::TermName;
    use super::{parse_flat, split_components, ParseError};

    const SAMPLE: &str = "\
#name: family
#description: toy genealogy

father-of is-a relation
tom father-of bill

# repeated statements are tolerated
tom father-of bill
(tom,father-of,bill) believed-by alice
";

    #[test]
    fn parses_headers_terms_and_triples() {
        let store = OntologyStore::new();
        let onto = parse_flat(&store, SAMPLE).unwrap();
        assert_eq!(onto.read(|o| o.name().to_owned()), "family");
        assert_eq!(
            onto.read(|o| o.description().to_owned()),
            "toy genealogy"
        );
        let tom = onto.term_by_name(&TermName::new("tom").unwrap()).unwrap();
        let bill = onto.term_by_name(&TermName::new("bill").unwrap()).unwrap();
        let father = onto
            .term_by_name(&TermName::new("father-of").unwrap())
            .unwrap();
        assert!(onto.contains_triple(tom, bill, father));
    }

    #[test]
    fn pattern_tokens_become_fully_bound_patterns() {
        let store = OntologyStore::new();
        let onto = parse_flat(&store, SAMPLE).unwrap();
        let pat = onto
            .term_by_name(&TermName::new("(tom,father-of,bill)").unwrap())
            .unwrap();
        let kind = onto.read(|o| o.get_term(pat.term).unwrap().kind.clone());
        let TermKind::Pattern {
            subject: Some(s),
            object: Some(o),
            relation: Some(r),
        } = kind
        else {
            panic!("expected bound pattern, got {kind:?}");
        };
        assert_eq!(
            onto.term_by_name(&TermName::new("tom").unwrap()),
            Some(s)
        );
        assert_eq!(
            onto.term_by_name(&TermName::new("bill").unwrap()),
            Some(o)
        );
        assert_eq!(
            onto.term_by_name(&TermName::new("father-of").unwrap()),
            Some(r)
        );
    }

    #[test]
    fn short_lines_are_rejected() {
        let store = OntologyStore::new();
        let err = parse_flat(&store, "just two").unwrap_err();
        assert!(matches!(err, ParseError::MissingField { line_no: 1, .. }));
    }

    #[test]
    fn split_honours_nested_parens() {
        assert_eq!(
            split_components("a,(b,c,d),e"),
            vec!["a".to_owned(), "(b,c,d)".to_owned(), "e".to_owned()]
        );
    }
}
