use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::WitnessError;

/// Unordered pair of witnesses, stored in canonical (sorted) order.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WitnessPair {
    first: String,
    second: String,
}

impl WitnessPair {
    pub fn new(a: impl Into<String>, b: impl Into<String>) -> Self {
        let (a, b) = (a.into(), b.into());
        if a <= b {
            Self { first: a, second: b }
        } else {
            Self { first: b, second: a }
        }
    }

    pub fn first(&self) -> &str {
        &self.first
    }

    pub fn second(&self) -> &str {
        &self.second
    }

    /// `"a|b"` with `a < b`.
    pub fn pair_key(&self) -> String {
        format!("{}|{}", self.first, self.second)
    }

    pub fn contains(&self, witness_id: &str) -> bool {
        self.first == witness_id || self.second == witness_id
    }

    /// Every distinct pair among `witnesses`.
    pub fn all_pairs(witnesses: &[String]) -> Vec<WitnessPair> {
        let mut pairs = Vec::new();
        for (i, a) in witnesses.iter().enumerate() {
            for b in &witnesses[i + 1..] {
                if a != b {
                    pairs.push(WitnessPair::new(a.clone(), b.clone()));
                }
            }
        }
        pairs.sort();
        pairs.dedup();
        pairs
    }
}

impl fmt::Display for WitnessPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.first, self.second)
    }
}

impl FromStr for WitnessPair {
    type Err = WitnessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('|') {
            Some((a, b)) if !a.is_empty() && !b.is_empty() && a != b && !b.contains('|') => {
                Ok(WitnessPair::new(a, b))
            }
            _ => Err(WitnessError::InvalidPairKey(s.to_owned())),
        }
    }
}
