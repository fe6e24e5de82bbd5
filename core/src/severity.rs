//! Mistake category to display severity lookup.

use std::{collections::BTreeMap, fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize};

/// How a problem of a given category is shown to the user.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Ord, PartialOrd)]
pub enum Severity {
    Error,
    Warning,
    Information,
    Hint,
    /// Drop the problem entirely.
    #[serde(alias = "Suppressed")]
    Disable,
}

impl Default for Severity {
    fn default() -> Self {
        Severity::Information
    }
}

impl Severity {
    pub fn is_disabled(self) -> bool {
        matches!(self, Severity::Disable)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Error => "Error",
            Severity::Warning => "Warning",
            Severity::Information => "Information",
            Severity::Hint => "Hint",
            Severity::Disable => "Disable",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "Error" => Ok(Severity::Error),
            "Warning" => Ok(Severity::Warning),
            "Information" => Ok(Severity::Information),
            "Hint" => Ok(Severity::Hint),
            "Disable" | "Suppressed" => Ok(Severity::Disable),
            other => Err(format!("unknown severity `{other}`")),
        }
    }
}

/// Resolve the severity for `category`, falling back to `default` when unmapped.
pub fn severity_of(
    category: &str,
    mapping: &BTreeMap<String, Severity>,
    default: Severity,
) -> Severity {
    mapping.get(category).copied().unwrap_or(default)
}

/// Reads a category map, dropping entries whose severity name is not recognised
/// instead of rejecting the whole settings file.
pub(crate) fn lenient_severity_map<'de, D>(
    deserializer: D,
) -> Result<BTreeMap<String, Severity>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: BTreeMap<String, serde_json::Value> = BTreeMap::deserialize(deserializer)?;
    let mut mapping = BTreeMap::new();
    for (category, value) in raw {
        let parsed = value
            .as_str()
            .ok_or_else(|| format!("expected a string, got {value}"))
            .and_then(|name| name.parse::<Severity>());
        match parsed {
            Ok(severity) => {
                mapping.insert(category, severity);
            }
            Err(reason) => {
                tracing::warn!(%category, %reason, "ignoring category severity");
            }
        }
    }
    Ok(mapping)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping() -> BTreeMap<String, Severity> {
        let mut map = BTreeMap::new();
        map.insert("Spelling".to_string(), Severity::Error);
        map.insert("Cliches".to_string(), Severity::Disable);
        map
    }

    #[test]
    fn mapped_category_wins_over_default() {
        assert_eq!(
            severity_of("Spelling", &mapping(), Severity::Information),
            Severity::Error
        );
    }

    #[test]
    fn unmapped_category_uses_default() {
        assert_eq!(
            severity_of("Passive voice", &mapping(), Severity::Information),
            Severity::Information
        );
    }

    #[test]
    fn disable_mapping_reports_disabled() {
        assert!(severity_of("Cliches", &mapping(), Severity::Hint).is_disabled());
    }

    #[test]
    fn suppressed_is_an_alias_for_disable() {
        let parsed: Severity = serde_json::from_str("\"Suppressed\"").unwrap();
        assert_eq!(parsed, Severity::Disable);
        assert_eq!("Suppressed".parse::<Severity>(), Ok(Severity::Disable));
    }
}
