use crate::{
    engine::EngineConfig,
    error::{Result, RuleError},
};

/// Attributes whose lookup is in progress, outermost first.
#[derive(Debug, Clone, Default)]
pub struct ResolvingStack {
    stack: Vec<String>,
}

impl ResolvingStack {
    /// Push `name`, failing if it is already being resolved or the stack is
    /// at its depth limit.
    pub fn enter(&mut self, name: &str, config: &EngineConfig) -> Result<()> {
        if config.detect_cycles {
            if let Some(pos) = self.stack.iter().position(|n| n == name) {
                let mut chain = self.stack[pos..].to_vec();
                chain.push(name.to_string());
                return Err(RuleError::Cycle { chain });
            }
        }

        if self.stack.len() >= config.max_lookup_depth {
            return Err(RuleError::DepthExceeded {
                limit: config.max_lookup_depth,
                target: name.to_string(),
            });
        }

        self.stack.push(name.to_string());
        Ok(())
    }

    pub fn leave(&mut self) -> Option<String> {
        self.stack.pop()
    }

    pub fn current(&self) -> Option<&str> {
        self.stack.last().map(String::as_str)
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn is_resolving(&self, name: &str) -> bool {
        self.stack.iter().any(|n| n == name)
    }
}
