use std::fmt;
use std::str::FromStr;

use log::trace;
use simple_error::SimpleError;

use crate::error::{CoocError, LineError, Result};


/// How raw candidate scores turn into contribution weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reweighting {
    /// Weight at rank r (1-indexed) is 1/r, regardless of the scores.
    Reciprocal,
    /// Weight at rank r is score(r) / score(1).
    Divide,
}

impl Reweighting {
    /// Exactly one of the two flags must be set.
    pub fn from_flags(divide: bool, reciprocal: bool) -> Result<Reweighting> {
        match (divide, reciprocal) {
            (true, false) => Ok(Reweighting::Divide),
            (false, true) => Ok(Reweighting::Reciprocal),
            (false, false) => Err(CoocError::Config("no reweighting method selected, pick one of divide or reciprocal".into())),
            (true, true) => Err(CoocError::Config("divide and reciprocal are mutually exclusive".into())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Reweighting::Reciprocal => "reciprocal",
            Reweighting::Divide => "divide",
        }
    }

    /// Weights for an already filtered, best first candidate list.
    pub fn weights(&self, candidates: &[Candidate]) -> std::result::Result<Vec<f64>, LineError> {
        let bench = match candidates.first() {
            Some(first) => first.score,
            None => return Err(LineError::NoCandidates),
        };
        match self {
            Reweighting::Reciprocal => {
                Ok((1..=candidates.len()).map(|rank| 1.0 / rank as f64).collect())
            },
            Reweighting::Divide => {
                if bench == 0.0 || !bench.is_finite() {
                    return Err(LineError::BadNumber(bench.to_string()));
                }
                Ok(candidates.iter().map(|c| c.score / bench).collect())
            },
        }
    }
}

impl FromStr for Reweighting {
    type Err = SimpleError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if s == "reciprocal" {
            Ok(Reweighting::Reciprocal)
        } else if s == "divide" {
            Ok(Reweighting::Divide)
        } else {
            Err(SimpleError::new("Must be reciprocal or divide"))
        }
    }
}

impl fmt::Display for Reweighting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A ranked context candidate for one target position.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub token: String,
    pub score: f64,
}

impl Candidate {
    pub fn new<S: Into<String>>(token: S, score: f64) -> Candidate {
        Candidate { token: token.into(), score }
    }
}

/// Drop candidates whose text equals the target, keeping at most `limit` of the rest.
pub fn select_candidates(target: &str, candidates: Vec<Candidate>, limit: usize) -> Vec<Candidate> {
    candidates
        .into_iter()
        .filter(|candidate| {
            let is_self = candidate.token == target;
            if is_self {
                trace!("dropping self pair ({}, {})", target, candidate.token);
            }
            !is_self
        })
        .take(limit)
        .collect()
}

/// Filter, then weight. Returns (context, weight) contributions for `target`.
pub fn contributions(
    target: &str,
    candidates: Vec<Candidate>,
    limit: usize,
    reweighting: Reweighting,
) -> std::result::Result<Vec<(String, f64)>, LineError> {
    let kept = select_candidates(target, candidates, limit);
    let weights = reweighting.weights(&kept)?;
    Ok(kept.into_iter().map(|c| c.token).zip(weights).collect())
}
