use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    /// Not exactly four decimal digits.
    Malformed,
    Rejected,
    /// At least one code key matched; `newly_found` lists those not already found.
    Accepted { newly_found: Vec<String> },
}

/// Discovered code keys plus the one-shot victory latch.
#[derive(Debug, Default)]
pub struct Progress {
    found: BTreeSet<String>,
    announced: bool,
}

pub fn is_code_shaped(code: &str) -> bool {
    code.len() == 4 && code.bytes().all(|b| b.is_ascii_digit())
}

impl Progress {
    pub fn submit(&mut self, codes: &BTreeMap<String, String>, code: &str) -> Submission {
        if !is_code_shaped(code) {
            return Submission::Malformed;
        }
        let matching: Vec<&String> = codes
            .iter()
            .filter(|(_, value)| value.as_str() == code)
            .map(|(key, _)| key)
            .collect();
        if matching.is_empty() {
            return Submission::Rejected;
        }
        let newly_found = matching
            .into_iter()
            .filter(|key| self.found.insert((*key).clone()))
            .cloned()
            .collect();
        Submission::Accepted { newly_found }
    }

    pub fn is_found(&self, key: &str) -> bool {
        self.found.contains(key)
    }

    pub fn found(&self) -> &BTreeSet<String> {
        &self.found
    }

    pub fn is_complete(&self, codes: &BTreeMap<String, String>) -> bool {
        !codes.is_empty() && codes.keys().all(|k| self.found.contains(k))
    }

    /// True exactly once: the first call after every code has been found.
    pub fn take_victory(&mut self, codes: &BTreeMap<String, String>) -> bool {
        if self.announced || !self.is_complete(codes) {
            return false;
        }
        self.announced = true;
        true
    }

    pub fn clear(&mut self) {
        self.found.clear();
        self.announced = false;
    }
}
