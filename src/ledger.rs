//! Requirement ledger
//!
//! Tracks every requirement identifier of a change and how well it is backed
//! by tests. Records are created by `record`, mutated only through the ledger
//! and never removed while the change is open.

use crate::models::{CoverageStatus, RequirementRecord, TestObservation};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub type LedgerResult<T> = Result<T, LedgerError>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("Requirement not found: {0}")]
    UnknownRequirement(String),

    #[error("Invalid requirement id '{0}': must be non-empty without whitespace")]
    InvalidId(String),
}

/// Coverage records for one change, in the order they were recorded
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequirementLedger {
    records: Vec<RequirementRecord>,

    /// Titles of tests that cite no requirement at all
    #[serde(default)]
    uncited_tests: BTreeSet<String>,
}

impl RequirementLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a requirement. Returns `false` if it was already present.
    pub fn record(&mut self, id: &str) -> LedgerResult<bool> {
        let id = id.trim();
        if id.is_empty() || id.chars().any(char::is_whitespace) {
            return Err(LedgerError::InvalidId(id.to_string()));
        }
        if self.get(id).is_some() {
            return Ok(false);
        }
        self.records.push(RequirementRecord::new(id));
        Ok(true)
    }

    /// A failing test was observed for `id`
    pub fn mark_covered(&mut self, id: &str) -> LedgerResult<()> {
        self.get_mut(id)?.status = CoverageStatus::FailingTestPresent;
        Ok(())
    }

    /// A test for `id` passes with nothing implemented
    pub fn mark_anomalous(&mut self, id: &str) -> LedgerResult<()> {
        self.get_mut(id)?.status = CoverageStatus::PassingWithoutImplementation;
        Ok(())
    }

    pub fn mark_cited(&mut self, id: &str, cited: bool) -> LedgerResult<()> {
        self.get_mut(id)?.cited = cited;
        Ok(())
    }

    pub fn mark_trivial(&mut self, id: &str, trivial: bool) -> LedgerResult<()> {
        self.get_mut(id)?.trivial_assertions = trivial;
        Ok(())
    }

    /// Replace what is known about `id` with a fresh observation.
    ///
    /// A passing test without implementation wins over a failing one, so a
    /// single meaningless test is never hidden by a meaningful sibling.
    pub fn apply_observation(&mut self, id: &str, observation: TestObservation) -> LedgerResult<()> {
        if observation.has_passing_test_without_impl {
            self.mark_anomalous(id)?;
        } else if observation.has_failing_test {
            self.mark_covered(id)?;
        } else {
            self.get_mut(id)?.status = CoverageStatus::Uncovered;
        }
        self.mark_cited(id, observation.title_cites_id)?;
        self.mark_trivial(id, observation.trivial_assertions)
    }

    /// Add titles of tests that cite no requirement. Titles already known
    /// stay until a full snapshot replaces them.
    pub fn add_uncited_tests<I, S>(&mut self, titles: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.uncited_tests.extend(titles.into_iter().map(Into::into));
    }

    /// Replace the uncited tests with those of a complete test run
    pub fn replace_uncited_tests<I, S>(&mut self, titles: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.uncited_tests = titles.into_iter().map(Into::into).collect();
    }

    pub fn uncited_tests(&self) -> impl Iterator<Item = &str> {
        self.uncited_tests.iter().map(String::as_str)
    }

    pub fn status(&self, id: &str) -> LedgerResult<CoverageStatus> {
        self.get(id)
            .map(|r| r.status)
            .ok_or_else(|| LedgerError::UnknownRequirement(id.to_string()))
    }

    /// True when every requirement has a failing test. An empty ledger is
    /// never covered.
    pub fn all_covered(&self) -> bool {
        !self.records.is_empty()
            && self
                .records
                .iter()
                .all(|r| r.status == CoverageStatus::FailingTestPresent)
    }

    /// Every requirement is gated-ready and every test cites one
    pub fn ready_for_implementation(&self) -> bool {
        !self.records.is_empty()
            && self.records.iter().all(RequirementRecord::is_gated_ready)
            && self.uncited_tests.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&RequirementRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    fn get_mut(&mut self, id: &str) -> LedgerResult<&mut RequirementRecord> {
        self.records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| LedgerError::UnknownRequirement(id.to_string()))
    }

    pub fn records(&self) -> &[RequirementRecord] {
        &self.records
    }

    pub fn ids_with_status(&self, status: CoverageStatus) -> Vec<String> {
        self.records
            .iter()
            .filter(|r| r.status == status)
            .map(|r| r.id.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_is_idempotent() {
        let mut ledger = RequirementLedger::new();
        assert!(ledger.record("REQ-1").unwrap());
        ledger.mark_covered("REQ-1").unwrap();

        assert!(!ledger.record("REQ-1").unwrap());
        assert_eq!(ledger.len(), 1);
        assert_eq!(
            ledger.status("REQ-1").unwrap(),
            CoverageStatus::FailingTestPresent
        );
    }

    #[test]
    fn test_empty_ledger_is_not_covered() {
        assert!(!RequirementLedger::new().all_covered());
    }

    #[test]
    fn test_all_covered() {
        let mut ledger = RequirementLedger::new();
        ledger.record("REQ-1").unwrap();
        ledger.record("REQ-2").unwrap();
        ledger.mark_covered("REQ-1").unwrap();
        assert!(!ledger.all_covered());

        ledger.mark_covered("REQ-2").unwrap();
        assert!(ledger.all_covered());

        ledger.mark_anomalous("REQ-2").unwrap();
        assert!(!ledger.all_covered());
        assert_eq!(
            ledger.ids_with_status(CoverageStatus::PassingWithoutImplementation),
            vec!["REQ-2".to_string()]
        );
    }

    #[test]
    fn test_unknown_requirement() {
        let mut ledger = RequirementLedger::new();
        assert_eq!(
            ledger.mark_covered("REQ-9"),
            Err(LedgerError::UnknownRequirement("REQ-9".to_string()))
        );
        assert!(ledger.status("REQ-9").is_err());
    }

    #[test]
    fn test_invalid_ids_rejected() {
        let mut ledger = RequirementLedger::new();
        assert!(matches!(ledger.record("  "), Err(LedgerError::InvalidId(_))));
        assert!(matches!(ledger.record("REQ 1"), Err(LedgerError::InvalidId(_))));
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_apply_observation_prefers_anomaly() {
        let mut ledger = RequirementLedger::new();
        ledger.record("REQ-1").unwrap();

        let observation = TestObservation {
            has_failing_test: true,
            has_passing_test_without_impl: true,
            title_cites_id: true,
            trivial_assertions: false,
        };
        ledger.apply_observation("REQ-1", observation).unwrap();

        let record = ledger.get("REQ-1").unwrap();
        assert_eq!(record.status, CoverageStatus::PassingWithoutImplementation);
        assert!(record.cited);
    }

    #[test]
    fn test_citation_and_trivial_flags() {
        let mut ledger = RequirementLedger::new();
        ledger.record("REQ-1").unwrap();
        ledger.mark_covered("REQ-1").unwrap();
        assert!(!ledger.ready_for_implementation());

        ledger.mark_cited("REQ-1", true).unwrap();
        assert!(ledger.ready_for_implementation());

        ledger.mark_trivial("REQ-1", true).unwrap();
        assert!(!ledger.get("REQ-1").unwrap().is_gated_ready());
        assert!(!ledger.ready_for_implementation());

        ledger.mark_trivial("REQ-1", false).unwrap();
        ledger.add_uncited_tests(["renders the page"]);
        assert!(!ledger.ready_for_implementation());

        assert!(ledger.mark_cited("REQ-9", true).is_err());
    }

    #[test]
    fn test_uncited_tests_merge_until_replaced() {
        let mut ledger = RequirementLedger::new();
        ledger.add_uncited_tests(["renders the page"]);
        ledger.add_uncited_tests(Vec::<String>::new());
        ledger.add_uncited_tests(["loads the footer"]);
        assert_eq!(
            ledger.uncited_tests().collect::<Vec<_>>(),
            vec!["loads the footer", "renders the page"]
        );

        ledger.replace_uncited_tests(Vec::<String>::new());
        assert_eq!(ledger.uncited_tests().count(), 0);
    }

    #[test]
    fn test_empty_ledger_is_not_ready() {
        assert!(!RequirementLedger::new().ready_for_implementation());
    }

    #[test]
    fn test_apply_observation_without_tests_uncovers() {
        let mut ledger = RequirementLedger::new();
        ledger.record("REQ-1").unwrap();
        ledger.mark_covered("REQ-1").unwrap();

        ledger
            .apply_observation("REQ-1", TestObservation::default())
            .unwrap();
        assert_eq!(ledger.status("REQ-1").unwrap(), CoverageStatus::Uncovered);
    }
}
