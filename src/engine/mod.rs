use std::{
    cmp::Reverse,
    collections::{BTreeMap, HashMap},
};

use crate::{
    context::Context,
    error::Result,
    model::{ActionTable, Model},
    rule::Rule,
    value::Value,
};

pub mod config;

pub use config::{EngineBuilder, EngineConfig};

/// Rule index: target -> priority -> rules, largest condition first.
#[derive(Debug, Default)]
pub struct Engine {
    rules: HashMap<String, BTreeMap<i32, Vec<Rule>>>,
    config: EngineConfig,
}

impl Engine {
    pub fn new(rules: impl IntoIterator<Item = Rule>) -> Self {
        let mut engine = Self::default();
        engine.load(rules);
        engine
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            rules: HashMap::new(),
            config,
        }
    }

    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    /// Compile and load each model in turn.
    pub fn from_models(
        models: impl IntoIterator<Item = Model>,
        actions: &ActionTable,
    ) -> Result<Self> {
        let mut engine = Self::default();
        for model in models {
            engine.load(model.into_rules(actions)?);
        }
        Ok(engine)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// A context with no facts, resolving against this engine.
    pub fn context(&self) -> Context<'_> {
        Context::new(self, std::iter::empty::<(String, Value)>())
    }

    /// Append `rules` to their (target, priority) buckets, then order every
    /// bucket by descending condition size. The sort is stable, so rules of
    /// equal size keep their load order.
    pub fn load(&mut self, rules: impl IntoIterator<Item = Rule>) {
        for rule in rules {
            if !rule.is_valid() {
                log::warn!(
                    "rule for '{}' references its own target: {}",
                    rule.target(),
                    rule.qualifier()
                );
            }
            self.rules
                .entry(rule.target().to_string())
                .or_default()
                .entry(rule.priority())
                .or_default()
                .push(rule);
        }

        for buckets in self.rules.values_mut() {
            for bucket in buckets.values_mut() {
                bucket.sort_by_key(|rule| Reverse(rule.qualifier().size()));
            }
        }
    }

    pub fn targets(&self) -> impl Iterator<Item = &str> {
        self.rules.keys().map(String::as_str)
    }

    /// Rules for `target` in dispatch order: highest priority first.
    pub fn rules_for(&self, target: &str) -> impl Iterator<Item = &Rule> {
        self.rules
            .get(target)
            .into_iter()
            .flat_map(|buckets| buckets.values().rev().flatten())
    }

    /// Matching rules of the highest-priority bucket that has any match.
    pub fn candidates<'a>(&'a self, target: &str, ctx: &Context<'_>) -> Result<Vec<&'a Rule>> {
        let Some(buckets) = self.rules.get(target) else {
            return Ok(Vec::new());
        };

        for (priority, bucket) in buckets.iter().rev() {
            let mut matched = Vec::new();
            for rule in bucket {
                if rule.is_candidate(ctx)? {
                    matched.push(rule);
                }
            }
            if !matched.is_empty() {
                log::debug!(
                    "{} candidate(s) for '{target}' at priority {priority}",
                    matched.len()
                );
                return Ok(matched);
            }
        }

        Ok(Vec::new())
    }

    /// Fire the first candidate for `target`. `None` when nothing matched
    /// or the rule produced a null value.
    pub fn lookup(&self, target: &str, ctx: &Context<'_>) -> Result<Option<Value>> {
        let candidates = self.candidates(target, ctx)?;
        let Some(rule) = candidates.first() else {
            log::debug!("no rule matched '{target}'");
            return Ok(None);
        };

        let value = rule.fire(ctx)?;
        Ok((!value.is_null()).then_some(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(condition: &str, value: &str, priority: i32) -> Rule {
        Rule::new(condition, "t", value, priority).unwrap()
    }

    #[test]
    fn buckets_sort_by_descending_size() {
        let engine = Engine::new([
            rule("a = 1", "small", 1),
            rule("(a = 1) AND (b = 2)", "large", 1),
            rule("c = 3", "small-too", 1),
        ]);
        let order: Vec<_> = engine
            .rules_for("t")
            .map(|r| r.value().to_string())
            .collect();
        assert_eq!(order, ["large", "small", "small-too"]);
    }

    #[test]
    fn rules_iterate_highest_priority_first() {
        let engine = Engine::new([rule("a = 1", "low", 0), rule("a = 1", "high", 7)]);
        let order: Vec<_> = engine
            .rules_for("t")
            .map(|r| r.priority())
            .collect();
        assert_eq!(order, [7, 0]);
        assert_eq!(engine.targets().collect::<Vec<_>>(), ["t"]);
    }

    #[test]
    fn candidates_stop_at_first_matching_priority() {
        let engine = Engine::new([
            rule("a = 2", "p10", 10),
            rule("a = 1", "p5", 5),
            rule("a = 1", "p5-bis", 5),
            rule("a = 1", "p1", 1),
        ]);
        let ctx = Context::new(&engine, [("a", 1)]);
        let found: Vec<_> = engine
            .candidates("t", &ctx)
            .unwrap()
            .into_iter()
            .map(|r| r.value().to_string())
            .collect();
        assert_eq!(found, ["p5", "p5-bis"]);
    }

    #[test]
    fn higher_priority_match_hides_lower_ones() {
        let engine = Engine::new([rule("a = 1", "p10", 10), rule("a = 1", "p5", 5)]);
        let ctx = Context::new(&engine, [("a", 1)]);
        let found = engine.candidates("t", &ctx).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].priority(), 10);
    }

    #[test]
    fn lookup_without_match_is_absent() {
        let engine = Engine::new([rule("a = 2", "x", 1)]);
        let ctx = Context::new(&engine, [("a", 1)]);
        assert_eq!(engine.lookup("t", &ctx).unwrap(), None);
        assert_eq!(engine.lookup("unknown", &ctx).unwrap(), None);
    }

    #[test]
    fn lookup_fires_the_first_candidate() {
        let engine = Engine::new([
            rule("a = 1", "first", 3),
            rule("(a = 1) OR (a = 2)", "bigger", 3),
        ]);
        let ctx = Context::new(&engine, [("a", 1)]);
        assert_eq!(engine.lookup("t", &ctx).unwrap(), Some(Value::from("bigger")));
    }

    #[test]
    fn null_result_is_absent() {
        let engine = Engine::new([Rule::new("a = 1", "t", Value::Null, 1).unwrap()]);
        let ctx = Context::new(&engine, [("a", 1)]);
        assert_eq!(engine.lookup("t", &ctx).unwrap(), None);
    }
}
