//! Bracket matching: passenger count to the one bracket that contains it.
//!
//! Brackets are lower-inclusive and upper-exclusive. The last bracket may be
//! unbounded. A `BracketSet` only exists if its brackets partition the
//! non-negative integers with no gap and no overlap.

use crate::config::BracketSpec;
use crate::error::{Result, TraderError};
use std::fmt;

/// A disjoint passenger-count range for one tradable outcome.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Bracket {
    pub label: String,
    /// Inclusive lower bound
    pub lower: u64,
    /// Exclusive upper bound, `None` for unbounded
    pub upper: Option<u64>,
}

impl Bracket {
    pub fn new(label: impl Into<String>, lower: u64, upper: Option<u64>) -> Self {
        Self {
            label: label.into(),
            lower,
            upper,
        }
    }

    /// Lower-inclusive, upper-exclusive containment.
    pub fn contains(&self, count: u64) -> bool {
        count >= self.lower && self.upper.map_or(true, |upper| count < upper)
    }
}

impl fmt::Display for Bracket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.upper {
            Some(upper) => write!(f, "{} [{}, {})", self.label, self.lower, upper),
            None => write!(f, "{} [{}, inf)", self.label, self.lower),
        }
    }
}

/// Validated, ordered partition of the passenger-count domain.
#[derive(Debug, Clone)]
pub struct BracketSet {
    brackets: Vec<Bracket>,
}

impl BracketSet {
    /// Build a set from configuration, rejecting gaps, overlaps, and
    /// duplicate labels.
    pub fn from_specs(specs: &[BracketSpec]) -> Result<Self> {
        let brackets = specs
            .iter()
            .map(|s| Bracket::new(s.label.clone(), s.lower, s.upper))
            .collect();
        Self::new(brackets)
    }

    pub fn new(mut brackets: Vec<Bracket>) -> Result<Self> {
        if brackets.is_empty() {
            return Err(TraderError::Config("bracket set is empty".into()));
        }

        brackets.sort_by_key(|b| b.lower);

        if brackets[0].lower != 0 {
            return Err(TraderError::Config(format!(
                "first bracket '{}' starts at {}, not 0",
                brackets[0].label, brackets[0].lower
            )));
        }

        for (idx, bracket) in brackets.iter().enumerate() {
            if let Some(upper) = bracket.upper {
                if upper <= bracket.lower {
                    return Err(TraderError::Config(format!(
                        "bracket '{}' has upper {} <= lower {}",
                        bracket.label, upper, bracket.lower
                    )));
                }
            }

            match (bracket.upper, brackets.get(idx + 1)) {
                (Some(upper), Some(next)) if upper != next.lower => {
                    let kind = if upper < next.lower { "gap" } else { "overlap" };
                    return Err(TraderError::Config(format!(
                        "{} between '{}' (upper {}) and '{}' (lower {})",
                        kind, bracket.label, upper, next.label, next.lower
                    )));
                }
                (None, Some(next)) => {
                    return Err(TraderError::Config(format!(
                        "unbounded bracket '{}' overlaps '{}'",
                        bracket.label, next.label
                    )));
                }
                (Some(upper), None) => {
                    return Err(TraderError::Config(format!(
                        "last bracket '{}' ends at {}; counts above are unmatched",
                        bracket.label, upper
                    )));
                }
                _ => {}
            }

            if brackets[..idx].iter().any(|b| b.label == bracket.label) {
                return Err(TraderError::Config(format!(
                    "duplicate bracket label '{}'",
                    bracket.label
                )));
            }
        }

        Ok(Self { brackets })
    }

    /// Find the single bracket containing `count`.
    ///
    /// Every bracket is tested so that a misconfiguration producing zero or
    /// multiple matches is reported instead of resolved by picking one.
    pub fn match_count(&self, count: u64) -> Result<&Bracket> {
        let mut matched = self.brackets.iter().filter(|b| b.contains(count));
        let first = matched.next();
        let extra = matched.count();
        match (first, extra) {
            (Some(bracket), 0) => Ok(bracket),
            (None, _) => Err(TraderError::BracketMatch { count, matches: 0 }),
            (Some(_), extra) => Err(TraderError::BracketMatch {
                count,
                matches: extra + 1,
            }),
        }
    }

    /// Position of a bracket in ascending order.
    pub fn index_of(&self, label: &str) -> Option<usize> {
        self.brackets.iter().position(|b| b.label == label)
    }

    /// Number of brackets between two labels, `None` if either is unknown.
    pub fn distance(&self, a: &str, b: &str) -> Option<usize> {
        Some(self.index_of(a)?.abs_diff(self.index_of(b)?))
    }

    /// Bracket with exactly these bounds.
    pub fn find_by_bounds(&self, lower: u64, upper: Option<u64>) -> Option<&Bracket> {
        self.brackets
            .iter()
            .find(|b| b.lower == lower && b.upper == upper)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Bracket> {
        self.brackets.iter()
    }

    pub fn len(&self) -> usize {
        self.brackets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.brackets.is_empty()
    }
}
