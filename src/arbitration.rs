//! OCR arbitration: which providers to call, and which result wins.
//!
//! Pure functions, no async and no network, so every policy decision is
//! testable from canned `OcrResult`s.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::ocr::{OcrProviderKind, OcrResult};

/// Provider preference mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OcrPreference {
    /// Call only this provider, and only if it is available.
    PreferSingle(OcrProviderKind),
    /// Call this provider; on failure or unavailability call the other one.
    PreferWithFallback(OcrProviderKind),
    /// Call every available provider and keep the best result.
    RunBoth,
}

impl Default for OcrPreference {
    /// Structured-math OCR first, general vision OCR as fallback.
    fn default() -> Self {
        Self::PreferWithFallback(OcrProviderKind::Mathpix)
    }
}

/// Preference names as used in environment configuration: `both`,
/// `<provider>` (with fallback) or `<provider>_only`.
impl FromStr for OcrPreference {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s == "both" {
            return Ok(Self::RunBoth);
        }

        match s.strip_suffix("_only") {
            Some(kind) => Ok(Self::PreferSingle(kind.parse()?)),
            None => Ok(Self::PreferWithFallback(s.parse()?)),
        }
    }
}

/// Attempt plan derived from a preference and provider availability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Plan {
    /// Nothing can be called.
    Skip,
    /// Call `first`; call `then` only if `first` did not succeed.
    Sequential {
        first: OcrProviderKind,
        then: Option<OcrProviderKind>,
    },
    /// Call all of these (in priority order) without short-circuiting.
    All(Vec<OcrProviderKind>),
}

/// Decide which providers to call. `available` reports the availability
/// cached at construction.
pub fn plan<F>(preference: OcrPreference, available: F) -> Plan
where
    F: Fn(OcrProviderKind) -> bool,
{
    match preference {
        OcrPreference::PreferSingle(kind) => {
            if available(kind) {
                Plan::Sequential {
                    first: kind,
                    then: None,
                }
            } else {
                Plan::Skip
            }
        }
        OcrPreference::PreferWithFallback(kind) => {
            let other = kind.other();
            match (available(kind), available(other)) {
                (true, true) => Plan::Sequential {
                    first: kind,
                    then: Some(other),
                },
                (true, false) => Plan::Sequential {
                    first: kind,
                    then: None,
                },
                (false, true) => Plan::Sequential {
                    first: other,
                    then: None,
                },
                (false, false) => Plan::Skip,
            }
        }
        OcrPreference::RunBoth => {
            let kinds: Vec<OcrProviderKind> = [OcrProviderKind::Mathpix, OcrProviderKind::GoogleVision]
                .into_iter()
                .filter(|k| available(*k))
                .collect();
            if kinds.is_empty() {
                Plan::Skip
            } else {
                Plan::All(kinds)
            }
        }
    }
}

/// Pick the winning result from attempts ordered by priority.
///
/// Any success beats every failure; among successes the higher confidence
/// wins and ties keep the earlier attempt. Without a success the last
/// attempted failure is returned so its error stays visible. `None` only when
/// nothing was attempted.
pub fn select(attempts: Vec<OcrResult>) -> Option<OcrResult> {
    let mut best: Option<OcrResult> = None;
    let mut last_failure: Option<OcrResult> = None;

    for attempt in attempts {
        if !attempt.is_success() {
            last_failure = Some(attempt);
            continue;
        }

        let replace = match &best {
            None => true,
            Some(current) => score(&attempt) > score(current),
        };
        if replace {
            best = Some(attempt);
        }
    }

    best.or(last_failure)
}

fn score(result: &OcrResult) -> f64 {
    result.confidence().unwrap_or(0.0)
}
