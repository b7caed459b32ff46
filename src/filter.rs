use crate::decode::extract_header;
use crate::source::RawMessage;
use std::collections::BTreeMap;

/// Header name to substrings whose presence in that header drops a message.
///
/// Matching is case-insensitive on both sides. Rules are checked in header
/// name order so the reported match is stable between runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExclusionRules {
    rules: BTreeMap<String, Vec<String>>,
}

/// The rule that excluded a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exclusion {
    pub header: String,
    pub value: String,
}

impl ExclusionRules {
    pub fn new<I, K, V>(rules: I) -> Self
    where
        I: IntoIterator<Item = (K, Vec<V>)>,
        K: Into<String>,
        V: AsRef<str>,
    {
        let rules: BTreeMap<String, Vec<String>> = rules
            .into_iter()
            .map(|(header, needles)| {
                let needles = needles
                    .into_iter()
                    .map(|n| n.as_ref().to_lowercase())
                    .filter(|n| !n.is_empty())
                    .collect();
                (header.into(), needles)
            })
            .collect();
        Self { rules }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.values().all(Vec::is_empty)
    }

    /// First header whose value contains a configured substring.
    pub fn matches(&self, msg: &RawMessage) -> Option<Exclusion> {
        for (header, needles) in &self.rules {
            let value = extract_header(msg, header);
            if value.is_empty() {
                continue;
            }
            let lowered = value.to_lowercase();
            if needles.iter().any(|n| lowered.contains(n.as_str())) {
                return Some(Exclusion {
                    header: header.clone(),
                    value,
                });
            }
        }
        None
    }
}
