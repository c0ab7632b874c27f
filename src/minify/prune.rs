use std::collections::HashSet;

use geojson::JsonValue;
use serde::Deserialize;

use crate::geofile::feature::Properties;

/// Removes blacklisted properties and, when a whitelist is given, every property not on it.
/// A name on both lists is removed.
#[derive(Debug, Clone, Default)]
pub struct Pruner {
    blacklist: Option<HashSet<String>>,
    whitelist: Option<HashSet<String>>,
}

impl Pruner {
    pub fn new<I, S>(blacklist: Option<I>, whitelist: Option<I>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let to_set = |names: I| {
            names
                .into_iter()
                .map(|name| name.as_ref().trim().to_owned())
                .collect::<HashSet<String>>()
        };
        Self {
            blacklist: blacklist.map(to_set),
            whitelist: whitelist.map(to_set),
        }
    }

    pub fn is_active(&self) -> bool {
        self.blacklist.is_some() || self.whitelist.is_some()
    }

    pub fn keeps(&self, key: &str) -> bool {
        let blacklisted = self
            .blacklist
            .as_ref()
            .map_or(false, |blacklist| blacklist.contains(key));
        let whitelisted = self
            .whitelist
            .as_ref()
            .map_or(true, |whitelist| whitelist.contains(key));
        !blacklisted && whitelisted
    }

    pub fn prune(&self, properties: Properties) -> Properties {
        if !self.is_active() {
            return properties;
        }
        properties
            .into_iter()
            .filter(|(key, _)| self.keeps(key))
            .collect()
    }
}

/// Which property values count as empty.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum EmptyPropertyRule {
    /// Only `null` is empty.
    #[default]
    Null,
    /// `null`, `""`, `0` and `false` are empty.
    Falsy,
}

impl EmptyPropertyRule {
    pub fn is_empty(&self, value: &JsonValue) -> bool {
        match self {
            EmptyPropertyRule::Null => value.is_null(),
            EmptyPropertyRule::Falsy => match value {
                JsonValue::Null => true,
                JsonValue::Bool(flag) => !flag,
                JsonValue::String(text) => text.is_empty(),
                JsonValue::Number(number) => number.as_f64().map_or(false, |n| n == 0.0),
                JsonValue::Array(_) | JsonValue::Object(_) => false,
            },
        }
    }
}

/// Drops empty property entries and counts the features it has seen.
#[derive(Debug, Default)]
pub struct EmptyPropertyPruner {
    rule: EmptyPropertyRule,
    count: usize,
}

impl EmptyPropertyPruner {
    pub fn new(rule: EmptyPropertyRule) -> Self {
        Self { rule, count: 0 }
    }

    /// Number of features passed through `prune` so far.
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn prune(&mut self, properties: Option<Properties>) -> Option<Properties> {
        self.count += 1;
        properties.map(|properties| {
            properties
                .into_iter()
                .filter(|(_, value)| !self.rule.is_empty(value))
                .collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::json;

    use crate::geofile::feature::Properties;

    use super::{EmptyPropertyPruner, EmptyPropertyRule, Pruner};

    fn properties(value: serde_json::Value) -> Properties {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_blacklist_wins_over_whitelist() {
        let pruner = Pruner::new(Some(["a", "b"]), Some(["b", "c"]));
        let pruned = pruner.prune(properties(json!({"a": 1, "b": 2, "c": 3, "d": 4})));
        assert_eq!(pruned, properties(json!({"c": 3})));
    }

    #[test]
    fn test_names_are_trimmed_once() {
        let pruner = Pruner::new(Some([" name ", "area"]), None);
        let pruned = pruner.prune(properties(json!({"name": "x", "area": 2, "id": 1})));
        assert_eq!(pruned, properties(json!({"id": 1})));
        // Keys themselves are matched exactly.
        assert!(pruner.keeps(" name"));
    }

    #[test]
    fn test_whitelist_only_keeps_listed() {
        let pruner = Pruner::new(None, Some(["id"]));
        let pruned = pruner.prune(properties(json!({"name": "x", "id": 1})));
        assert_eq!(pruned, properties(json!({"id": 1})));
    }

    #[test]
    fn test_inactive_pruner_returns_input() {
        let pruner = Pruner::new::<Vec<String>, String>(None, None);
        assert!(!pruner.is_active());
        let input = properties(json!({"b": 1, "a": 2}));
        assert_eq!(pruner.prune(input.clone()), input);
    }

    #[rstest]
    #[case(EmptyPropertyRule::Null, json!({"a": "x", "b": 2}))]
    #[case(EmptyPropertyRule::Falsy, json!({"a": "x"}))]
    fn test_empty_property_rules(
        #[case] rule: EmptyPropertyRule,
        #[case] expected: serde_json::Value,
    ) {
        let input = match rule {
            EmptyPropertyRule::Null => json!({"a": "x", "b": 2, "c": null}),
            EmptyPropertyRule::Falsy => {
                json!({"a": "x", "b": 0, "c": null, "d": "", "e": false})
            }
        };
        let mut pruner = EmptyPropertyPruner::new(rule);
        assert_eq!(
            pruner.prune(Some(properties(input))),
            Some(properties(expected))
        );
    }

    #[test]
    fn test_empty_pruner_counts_features() {
        let mut pruner = EmptyPropertyPruner::new(EmptyPropertyRule::Null);
        pruner.prune(None);
        pruner.prune(Some(properties(json!({"a": null}))));
        assert_eq!(pruner.count(), 2);
    }
}
