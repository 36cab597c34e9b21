use serde::{Deserialize, Serialize};

/// Knobs for the query-to-operator transformation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Push single-table WHERE conjuncts into scans and join conjuncts into joins.
    /// When off every WHERE conjunct stays in a Filter above the FROM clause.
    pub predicate_push_down: bool,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            predicate_push_down: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        assert!(PlannerConfig::default().predicate_push_down);
        let config: PlannerConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, PlannerConfig::default());
        let config: PlannerConfig =
            serde_json::from_str(r#"{"predicate_push_down": false}"#).unwrap();
        assert!(!config.predicate_push_down);
    }
}
