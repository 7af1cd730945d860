//! Severity-classified problems
//!
//! Every per-service outcome that is not a plain success is a [`Problem`].
//! Problems from concurrent units are merged into a [`ProblemSet`] whose
//! severity is the maximum of its members; merging is commutative and
//! associative with respect to that severity.

use crate::ids::ServiceName;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Ordered failure level
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    None,
    Warning,
    Error,
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Severity::None => "NONE",
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
            Severity::Fatal => "FATAL",
        };
        f.write_str(name)
    }
}

/// A single problem reported by some unit of work
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Problem {
    pub severity: Severity,
    pub message: String,

    /// Service the problem belongs to, if any
    #[serde(default)]
    pub service: Option<ServiceName>,

    /// Suggested fix
    #[serde(default)]
    pub remediation: Option<String>,
}

impl Problem {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            service: None,
            remediation: None,
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Severity::Error, message)
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::new(Severity::Fatal, message)
    }

    pub fn for_service(mut self, service: impl Into<ServiceName>) -> Self {
        self.service = Some(service.into());
        self
    }

    pub fn with_remediation(mut self, remediation: impl Into<String>) -> Self {
        self.remediation = Some(remediation.into());
        self
    }
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.service {
            Some(service) => write!(f, "[{}] {}: {}", self.severity, service, self.message)?,
            None => write!(f, "[{}] {}", self.severity, self.message)?,
        }
        if let Some(remediation) = &self.remediation {
            write!(f, " ({})", remediation)?;
        }
        Ok(())
    }
}

/// Collection of problems from many units of work
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProblemSet {
    problems: Vec<Problem>,
}

impl ProblemSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Combine two sets
    pub fn merge(mut self, other: ProblemSet) -> Self {
        self.problems.extend(other.problems);
        self
    }

    /// Maximum severity of any member; `None` when empty
    pub fn max_severity(&self) -> Severity {
        self.problems
            .iter()
            .map(|p| p.severity)
            .max()
            .unwrap_or(Severity::None)
    }

    pub fn exceeds(&self, threshold: Severity) -> bool {
        self.max_severity() > threshold
    }

    pub fn iter(&self) -> impl Iterator<Item = &Problem> {
        self.problems.iter()
    }

    pub fn len(&self) -> usize {
        self.problems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.problems.is_empty()
    }
}

impl From<Problem> for ProblemSet {
    fn from(problem: Problem) -> Self {
        Self {
            problems: vec![problem],
        }
    }
}

impl FromIterator<Problem> for ProblemSet {
    fn from_iter<T: IntoIterator<Item = Problem>>(iter: T) -> Self {
        Self {
            problems: iter.into_iter().collect(),
        }
    }
}

impl fmt::Display for ProblemSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, problem) in self.problems.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}", problem)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn severity_strategy() -> impl Strategy<Value = Severity> {
        prop_oneof![
            Just(Severity::None),
            Just(Severity::Warning),
            Just(Severity::Error),
            Just(Severity::Fatal),
        ]
    }

    fn set_of(severities: &[Severity]) -> ProblemSet {
        severities
            .iter()
            .map(|s| Problem::new(*s, format!("{}", s)))
            .collect()
    }

    #[test]
    fn test_severity_order() {
        assert!(Severity::None < Severity::Warning);
        assert!(Severity::Warning < Severity::Error);
        assert!(Severity::Error < Severity::Fatal);
    }

    #[test]
    fn test_empty_set_has_no_severity() {
        let set = ProblemSet::new();
        assert_eq!(set.max_severity(), Severity::None);
        assert!(!set.exceeds(Severity::Warning));
    }

    #[test]
    fn test_warning_does_not_exceed_warning() {
        let set = set_of(&[Severity::Warning, Severity::None]);
        assert!(!set.exceeds(Severity::Warning));
        assert!(set_of(&[Severity::Error]).exceeds(Severity::Warning));
    }

    #[test]
    fn test_display_includes_service_and_remediation() {
        let problem = Problem::fatal("has only one server group")
            .for_service("orca")
            .with_remediation("deploy a second version first");
        assert_eq!(
            problem.to_string(),
            "[FATAL] orca: has only one server group (deploy a second version first)"
        );
    }

    proptest! {
        #[test]
        fn prop_merge_is_commutative(
            a in proptest::collection::vec(severity_strategy(), 0..6),
            b in proptest::collection::vec(severity_strategy(), 0..6),
        ) {
            let ab = set_of(&a).merge(set_of(&b));
            let ba = set_of(&b).merge(set_of(&a));
            prop_assert_eq!(ab.max_severity(), ba.max_severity());
            prop_assert_eq!(ab.len(), ba.len());
        }

        #[test]
        fn prop_merge_is_associative(
            a in proptest::collection::vec(severity_strategy(), 0..4),
            b in proptest::collection::vec(severity_strategy(), 0..4),
            c in proptest::collection::vec(severity_strategy(), 0..4),
        ) {
            let left = set_of(&a).merge(set_of(&b)).merge(set_of(&c));
            let right = set_of(&a).merge(set_of(&b).merge(set_of(&c)));
            prop_assert_eq!(left.max_severity(), right.max_severity());
        }
    }
}
