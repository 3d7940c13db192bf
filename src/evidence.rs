//! Test evidence
//!
//! Turns raw test cases reported by a test runner into the per-requirement
//! observations the ledger consumes. A test is linked to a requirement when
//! it lists the identifier explicitly or cites it in its title.

use crate::models::TestObservation;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// One test as reported by the test runner
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    pub title: String,

    /// Requirements the test is declared to cover (tags, annotations)
    #[serde(default)]
    pub requirement_ids: Vec<String>,

    /// The test failed on its last run
    pub failed: bool,

    /// Code under test exists for the linked requirements
    #[serde(default)]
    pub implementation_present: bool,

    /// Assertion source lines, when the runner can extract them
    #[serde(default)]
    pub assertions: Vec<String>,
}

impl TestCase {
    pub fn failing(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            failed: true,
            ..Self::default()
        }
    }

    pub fn passing(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            failed: false,
            ..Self::default()
        }
    }

    pub fn covering(mut self, id: impl Into<String>) -> Self {
        self.requirement_ids.push(id.into());
        self
    }

    pub fn with_assertion(mut self, assertion: impl Into<String>) -> Self {
        self.assertions.push(assertion.into());
        self
    }

    /// Nothing in the test could fail. Only judged when assertions were
    /// reported at all.
    pub fn is_trivial(&self) -> bool {
        !self.assertions.is_empty() && self.assertions.iter().all(|a| is_trivial_assertion(a))
    }
}

/// Observations keyed by requirement id, plus tests that cite nothing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Evidence {
    pub observations: BTreeMap<String, TestObservation>,
    pub uncited_tests: Vec<String>,
}

/// Matcher for one requirement id as a whole token.
///
/// Identifiers are usually hyphenated, so a hyphen only ends the token when
/// no word character follows it: "REQ-1" is cited by "[REQ-1]" and
/// "REQ-1: ..." but not by "REQ-10", "REQ-1-a" or "SUB-REQ-1".
struct Citation {
    id: String,
    pattern: Regex,
}

impl Citation {
    fn new(id: &str) -> Option<Self> {
        if id.is_empty() {
            return None;
        }
        let pattern = format!(
            r"(?:^|[^A-Za-z0-9_-]|(?:^|[^A-Za-z0-9_])-){}(?:$|[^A-Za-z0-9_-]|-(?:$|[^A-Za-z0-9_]))",
            regex::escape(id)
        );
        Regex::new(&pattern).ok().map(|pattern| Self {
            id: id.to_string(),
            pattern,
        })
    }

    fn cited_by(&self, title: &str) -> bool {
        self.pattern.is_match(title)
    }
}

/// Whether `title` mentions `id` as a whole token
pub fn title_cites(title: &str, id: &str) -> bool {
    Citation::new(id).is_some_and(|citation| citation.cited_by(title))
}

/// Aggregate test cases into one observation per known requirement
pub fn collect_evidence(requirement_ids: &[String], cases: &[TestCase]) -> Evidence {
    let mut observations: BTreeMap<String, TestObservation> = requirement_ids
        .iter()
        .map(|id| (id.clone(), TestObservation::default()))
        .collect();
    let citations: Vec<Citation> = requirement_ids
        .iter()
        .filter_map(|id| Citation::new(id))
        .collect();
    let mut uncited_tests = Vec::new();

    for case in cases {
        let mut cites_any = false;
        for citation in &citations {
            let id = &citation.id;
            let cited = citation.cited_by(&case.title);
            if !cited && !case.requirement_ids.contains(id) {
                continue;
            }
            cites_any |= cited;
            if let Some(observation) = observations.get_mut(id) {
                if case.failed {
                    observation.has_failing_test = true;
                } else if !case.implementation_present {
                    observation.has_passing_test_without_impl = true;
                }
                observation.title_cites_id |= cited;
                observation.trivial_assertions |= case.is_trivial();
            }
        }
        if !cites_any {
            uncited_tests.push(case.title.clone());
        }
    }

    Evidence {
        observations,
        uncited_tests,
    }
}

// =============================================================================
// Trivial Assertion Detection
// =============================================================================

fn constant_truth() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?ix)^\s*(?:
                assert!?\s*\(?\s*true\s*\)?
              | assert_?true\s*\(\s*true\s*\)
              | assert\s+true
              | expect\s*\(\s*true\s*\)\s*\.\s*to_?be_?truthy\s*\(\s*\)
            )\s*;?\s*$",
        )
        .expect("Invalid regex pattern")
    })
}

fn self_comparison() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?x)^\s*(?:
                (?:assert_eq!|assertEquals|assert\.equal|assert\.strictEqual)\s*\(\s*(?P<a>[^,]+?)\s*,\s*(?P<b>[^,]+?)\s*\)
              | expect\s*\(\s*(?P<c>.+?)\s*\)\s*\.\s*(?:toBe|toEqual|toStrictEqual)\s*\(\s*(?P<d>.+?)\s*\)
              | assert\s+(?P<e>.+?)\s*==\s*(?P<f>.+?)
            )\s*;?\s*$",
        )
        .expect("Invalid regex pattern")
    })
}

/// An assertion that holds no matter what the code under test does
pub fn is_trivial_assertion(line: &str) -> bool {
    if constant_truth().is_match(line) {
        return true;
    }
    let Some(caps) = self_comparison().captures(line) else {
        return false;
    };
    [("a", "b"), ("c", "d"), ("e", "f")].iter().any(|(l, r)| {
        match (caps.name(l), caps.name(r)) {
            (Some(left), Some(right)) => left.as_str().trim() == right.as_str().trim(),
            _ => false,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_title_citation_respects_token_boundaries() {
        assert!(title_cites("REQ-1: rejects expired tokens", "REQ-1"));
        assert!(title_cites("[REQ-1] rejects expired tokens", "REQ-1"));
        assert!(title_cites("rejects expired tokens (REQ-1)", "REQ-1"));
        assert!(!title_cites("REQ-10: rejects expired tokens", "REQ-1"));
        assert!(!title_cites("XREQ-1 rejects", "REQ-1"));
        assert!(!title_cites("REQ-1-a: rejects expired tokens", "REQ-1"));
        assert!(!title_cites("SUB-REQ-1 rejects", "REQ-1"));
        assert!(title_cites("REQ-1 - rejects expired tokens", "REQ-1"));
        assert!(title_cites("REQ-1-: rejects expired tokens", "REQ-1"));
        assert!(!title_cites("anything", ""));
    }

    #[test]
    fn test_trivial_assertions() {
        assert!(is_trivial_assertion("assert!(true);"));
        assert!(is_trivial_assertion("assert True"));
        assert!(is_trivial_assertion("assert_eq!(x, x);"));
        assert!(is_trivial_assertion("expect(1).toBe(1)"));
        assert!(is_trivial_assertion("assert 1 == 1"));
        assert!(is_trivial_assertion("assertTrue(true);"));

        assert!(!is_trivial_assertion("assert_eq!(login(user), Ok(session));"));
        assert!(!is_trivial_assertion("expect(render(page)).toBe('<p>')"));
        assert!(!is_trivial_assertion("assert response.status == 401"));
    }

    #[test]
    fn test_collect_evidence() {
        let requirements = ids(&["REQ-1", "REQ-2", "REQ-3"]);
        let cases = vec![
            TestCase::failing("REQ-1 rejects expired tokens")
                .with_assertion("assert_eq!(check(token), Err(Expired));"),
            TestCase::passing("REQ-2 accepts fresh tokens"),
            TestCase::failing("accepts refresh").covering("REQ-3"),
            TestCase::failing("renders the login page"),
        ];

        let evidence = collect_evidence(&requirements, &cases);

        let req1 = evidence.observations["REQ-1"];
        assert!(req1.has_failing_test && req1.title_cites_id && !req1.trivial_assertions);

        let req2 = evidence.observations["REQ-2"];
        assert!(req2.has_passing_test_without_impl);

        let req3 = evidence.observations["REQ-3"];
        assert!(req3.has_failing_test);
        assert!(!req3.title_cites_id);

        assert_eq!(
            evidence.uncited_tests,
            vec!["accepts refresh".to_string(), "renders the login page".to_string()]
        );
    }

    #[test]
    fn test_sub_requirement_does_not_cite_parent() {
        let requirements = ids(&["REQ-1", "REQ-1-a"]);
        let cases = vec![TestCase::failing("[REQ-1-a] trims whitespace")];
        let evidence = collect_evidence(&requirements, &cases);

        assert!(evidence.observations["REQ-1-a"].title_cites_id);
        assert_eq!(evidence.observations["REQ-1"], TestObservation::default());
        assert!(evidence.uncited_tests.is_empty());
    }

    #[test]
    fn test_trivial_test_flags_requirement() {
        let requirements = ids(&["REQ-1"]);
        let cases = vec![TestCase::failing("REQ-1 works").with_assertion("assert!(true)")];
        let evidence = collect_evidence(&requirements, &cases);
        assert!(evidence.observations["REQ-1"].trivial_assertions);
    }

    #[test]
    fn test_passing_with_implementation_is_not_anomalous() {
        let requirements = ids(&["REQ-1"]);
        let mut case = TestCase::passing("REQ-1 works");
        case.implementation_present = true;
        let evidence = collect_evidence(&requirements, &[case]);
        assert_eq!(evidence.observations["REQ-1"], TestObservation {
            title_cites_id: true,
            ..TestObservation::default()
        });
    }
}
