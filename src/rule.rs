use std::{fmt, sync::Arc};

use crate::{
    context::Context,
    error::Result,
    qualifier::Qualifier,
    value::Value,
};

/// Computes a rule's result from the rule and the context it fired in.
pub type Action = Arc<dyn Fn(&Rule, &Context<'_>) -> Result<Value> + Send + Sync>;

/// A condition paired with the value it produces for `target`.
#[derive(Clone)]
pub struct Rule {
    qualifier: Arc<Qualifier>,
    target: String,
    value: Value,
    action: Option<Action>,
    priority: i32,
}

impl Rule {
    pub fn new(
        condition: &str,
        target: impl Into<String>,
        value: impl Into<Value>,
        priority: i32,
    ) -> Result<Self> {
        Self::with_bindings(condition, &[], target, value, priority)
    }

    /// Like [`Rule::new`], substituting `bindings` into the condition's
    /// placeholders first.
    pub fn with_bindings(
        condition: &str,
        bindings: &[Value],
        target: impl Into<String>,
        value: impl Into<Value>,
        priority: i32,
    ) -> Result<Self> {
        let qualifier = Qualifier::parse_with(condition, bindings)?;
        Ok(Self::from_qualifier(qualifier, target, value, priority))
    }

    pub fn from_qualifier(
        qualifier: Arc<Qualifier>,
        target: impl Into<String>,
        value: impl Into<Value>,
        priority: i32,
    ) -> Self {
        Self {
            qualifier,
            target: target.into(),
            value: value.into(),
            action: None,
            priority,
        }
    }

    pub fn with_action<F>(mut self, action: F) -> Self
    where
        F: Fn(&Rule, &Context<'_>) -> Result<Value> + Send + Sync + 'static,
    {
        self.action = Some(Arc::new(action));
        self
    }

    pub(crate) fn set_action(&mut self, action: Action) {
        self.action = Some(action);
    }

    pub fn qualifier(&self) -> &Arc<Qualifier> {
        &self.qualifier
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn has_action(&self) -> bool {
        self.action.is_some()
    }

    /// False when the condition reads the attribute this rule defines.
    pub fn is_valid(&self) -> bool {
        self.qualifier
            .qualifier_keys()
            .iter()
            .all(|key| key.split('.').next() != Some(self.target.as_str()))
    }

    pub fn is_candidate(&self, ctx: &Context<'_>) -> Result<bool> {
        ctx.evaluate(&self.qualifier)
    }

    pub fn fire(&self, ctx: &Context<'_>) -> Result<Value> {
        log::debug!("firing {self:?}");
        match &self.action {
            Some(action) => action(self, ctx),
            None => Ok(self.value.clone()),
        }
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("qualifier", &self.qualifier.to_string())
            .field("target", &self.target)
            .field("value", &self.value)
            .field("action", &self.action.is_some())
            .field("priority", &self.priority)
            .finish()
    }
}
