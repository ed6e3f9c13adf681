use orderbook::now_millis;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Path an instrument points back to (e.g. `/stocks/stk`).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Reference(String);

impl Reference {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Only ASCII alphanumerics, `_`, `/`, `-`, `\` and `../` segments are allowed.
    pub fn is_well_formed(&self) -> bool {
        let mut rest = self.0.as_str();
        while !rest.is_empty() {
            if let Some(tail) = rest.strip_prefix("../") {
                rest = tail;
                continue;
            }
            let mut chars = rest.chars();
            match chars.next() {
                Some(c) if c.is_ascii_alphanumeric() || matches!(c, '_' | '/' | '-' | '\\') => {
                    rest = chars.as_str()
                }
                _ => return false,
            }
        }
        true
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Metadata for a tradable instrument.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Instrument {
    pub name: String,
    pub code: String,
    pub description: String,
    /// Unix millis
    pub issue_ts: u64,
    pub total_supply: f64,
    pub circulating_supply: f64,
    pub reference: Reference,
}

impl Instrument {
    pub fn new(
        name: impl Into<String>,
        code: impl Into<String>,
        description: impl Into<String>,
        total_supply: f64,
        circulating_supply: f64,
        reference: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            code: code.into(),
            description: description.into(),
            issue_ts: now_millis(),
            total_supply,
            circulating_supply,
            reference: Reference::new(reference),
        }
    }
}
