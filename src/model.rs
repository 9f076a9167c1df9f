use std::{collections::HashMap, fmt};

use serde::{Deserialize, Serialize};

use crate::{
    context::Context,
    error::{Result, RuleError},
    rule::{Action, Rule},
    value::Value,
};

/// One rule as authored, before its condition is parsed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleRecord {
    #[serde(alias = "lhs", alias = "left", alias = "left_hand_side")]
    pub condition: String,

    /// Positional values for the condition's placeholders.
    #[serde(default)]
    pub bindings: Vec<serde_json::Value>,

    #[serde(alias = "key", alias = "rhs_key", alias = "right_hand_side_key")]
    pub target: String,

    #[serde(
        default,
        alias = "val",
        alias = "rhs_value",
        alias = "right_hand_side_value"
    )]
    pub value: serde_json::Value,

    /// Name of an entry in the [`ActionTable`].
    #[serde(
        default,
        alias = "ass",
        alias = "assignment",
        alias = "assignment_class"
    )]
    pub action: Option<String>,

    #[serde(default, alias = "pri")]
    pub priority: i32,
}

impl RuleRecord {
    pub fn compile(&self, actions: &ActionTable) -> Result<Rule> {
        let bindings: Vec<Value> = self.bindings.iter().cloned().map(Value::from).collect();
        let mut rule = Rule::with_bindings(
            &self.condition,
            &bindings,
            self.target.clone(),
            Value::from(self.value.clone()),
            self.priority,
        )?;

        if let Some(name) = &self.action {
            let action = actions.get(name).ok_or_else(|| RuleError::Model {
                message: format!("rule for '{}' names unknown action '{name}'", self.target),
            })?;
            rule.set_action(action);
        }

        Ok(rule)
    }
}

/// Named actions that rule records refer to.
#[derive(Clone, Default)]
pub struct ActionTable {
    actions: HashMap<String, Action>,
}

impl ActionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, name: impl Into<String>, action: F) -> &mut Self
    where
        F: Fn(&Rule, &Context<'_>) -> Result<Value> + Send + Sync + 'static,
    {
        self.actions.insert(name.into(), std::sync::Arc::new(action));
        self
    }

    pub fn get(&self, name: &str) -> Option<Action> {
        self.actions.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.actions.contains_key(name)
    }
}

impl fmt::Debug for ActionTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.actions.keys().collect();
        names.sort();
        f.debug_struct("ActionTable").field("actions", &names).finish()
    }
}

/// An ordered list of rule records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Model {
    records: Vec<RuleRecord>,
}

impl Model {
    pub fn new(records: Vec<RuleRecord>) -> Self {
        Self { records }
    }

    /// Parse a JSON array of rule records.
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| RuleError::Model {
            message: e.to_string(),
        })
    }

    pub fn push(&mut self, record: RuleRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[RuleRecord] {
        &self.records
    }

    pub fn into_rules(self, actions: &ActionTable) -> Result<Vec<Rule>> {
        self.records
            .iter()
            .map(|record| record.compile(actions))
            .collect()
    }
}
