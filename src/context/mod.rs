use std::{
    cell::RefCell,
    collections::HashMap,
    fmt,
    sync::Arc,
};

use crate::{
    engine::Engine,
    error::{EvalError, Result},
    qualifier::Qualifier,
    value::{KeyValueCoding, Value},
};

pub mod resolving;

pub use resolving::ResolvingStack;

/// Facts plus memoized rule lookups for one evaluation.
///
/// Attribute reads go to the facts first and fall back to the engine. Every
/// looked-up result, absent ones included, and every evaluated condition is
/// cached until the next [`Context::set`].
pub struct Context<'e> {
    engine: &'e Engine,
    facts: HashMap<String, Value>,
    /// Keyed by qualifier identity; the `Arc` keeps the address alive.
    qualifier_cache: RefCell<HashMap<usize, (Arc<Qualifier>, bool)>>,
    lookup_cache: RefCell<HashMap<String, Option<Value>>>,
    resolving: RefCell<ResolvingStack>,
}

impl<'e> Context<'e> {
    pub fn new<K, V>(engine: &'e Engine, facts: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        Self {
            engine,
            facts: facts
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            qualifier_cache: RefCell::default(),
            lookup_cache: RefCell::default(),
            resolving: RefCell::default(),
        }
    }

    pub fn engine(&self) -> &'e Engine {
        self.engine
    }

    /// Fact `name` if present, else the engine's (cached) answer for it.
    pub fn get(&self, name: &str) -> Result<Option<Value>> {
        if let Some(fact) = self.facts.get(name) {
            return Ok(Some(fact.clone()));
        }
        if let Some(cached) = self.lookup_cache.borrow().get(name) {
            log::trace!("lookup cache hit: {name}");
            return Ok(cached.clone());
        }

        self.resolving
            .borrow_mut()
            .enter(name, self.engine.config())?;
        let result = self.engine.lookup(name, self);
        self.resolving.borrow_mut().leave();

        let value = result?;
        self.lookup_cache
            .borrow_mut()
            .insert(name.to_string(), value.clone());
        Ok(value)
    }

    /// Store a fact. Both caches are dropped, whatever `name` is.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.facts.insert(name.into(), value.into());
        self.invalidate_caches();
    }

    pub fn invalidate_caches(&self) {
        self.qualifier_cache.borrow_mut().clear();
        self.lookup_cache.borrow_mut().clear();
    }

    pub fn contains(&self, name: &str) -> bool {
        self.facts.contains_key(name)
    }

    pub fn facts(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.facts.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Evaluate `qualifier` against this context, memoizing it and each of
    /// its connective sub-conditions.
    pub fn evaluate(&self, qualifier: &Arc<Qualifier>) -> Result<bool> {
        let id = Arc::as_ptr(qualifier) as usize;
        if let Some((_, hit)) = self.qualifier_cache.borrow().get(&id) {
            log::trace!("qualifier cache hit: {qualifier}");
            return Ok(*hit);
        }

        let result = match qualifier.as_ref() {
            Qualifier::And(terms) => {
                let mut all = true;
                for term in terms {
                    if !self.evaluate(term)? {
                        all = false;
                        break;
                    }
                }
                all
            }
            Qualifier::Or(terms) => {
                let mut any = false;
                for term in terms {
                    if self.evaluate(term)? {
                        any = true;
                        break;
                    }
                }
                any
            }
            Qualifier::Not(inner) => !self.evaluate(inner)?,
            leaf => leaf.evaluate(self)?,
        };

        self.qualifier_cache
            .borrow_mut()
            .insert(id, (qualifier.clone(), result));
        Ok(result)
    }
}

impl KeyValueCoding for Context<'_> {
    fn type_name(&self) -> &str {
        "Context"
    }

    /// Unknown attributes read as null.
    fn value_for_key(&self, key: &str) -> Result<Option<Value>, EvalError> {
        match self.get(key) {
            Ok(value) => Ok(Some(value.unwrap_or_default())),
            Err(err) => Err(EvalError::Lookup(Box::new(err))),
        }
    }
}

impl fmt::Debug for Context<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("facts", &self.facts)
            .field("cached_lookups", &self.lookup_cache.borrow().len())
            .field("cached_qualifiers", &self.qualifier_cache.borrow().len())
            .finish()
    }
}
