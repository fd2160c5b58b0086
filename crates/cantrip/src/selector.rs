//! Selectors: objects that project a subvalue out of a value.
//!
//! Three kinds exist. Indexed selectors perform positional access, keyed
//! selectors walk string keys in order, and generic selectors delegate to
//! rule-based selection. Construction validates shape (`empty selector`,
//! `invalid index`); application produces the type-specific selection
//! errors.

use smallvec::SmallVec;

use crate::{
    result::{EvalResult, ExecResult},
    value::Value,
};

/// Positional selector; the index must convert to an integer at apply time.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedSelector {
    pub index: Value,
}

impl IndexedSelector {
    /// Builds an indexed selector. A Nil index is invalid.
    pub fn new(index: Value) -> ExecResult<Self> {
        if index.is_nil() {
            return Err(EvalResult::invalid_index());
        }
        Ok(Self { index })
    }
}

/// Key-path selector; applies each key in order.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyedSelector {
    pub keys: SmallVec<[Value; 1]>,
}

impl KeyedSelector {
    /// Builds a keyed selector from a non-empty key path.
    pub fn new(keys: impl IntoIterator<Item = Value>) -> ExecResult<Self> {
        let keys: SmallVec<[Value; 1]> = keys.into_iter().collect();
        if keys.is_empty() {
            return Err(EvalResult::empty_selector());
        }
        Ok(Self { keys })
    }
}

/// Rule-based selector; meaning is value-defined.
#[derive(Debug, Clone, PartialEq)]
pub struct GenericSelector {
    pub rules: Vec<Value>,
}

impl GenericSelector {
    /// Builds a generic selector from a non-empty rule list.
    pub fn new(rules: Vec<Value>) -> ExecResult<Self> {
        if rules.is_empty() {
            return Err(EvalResult::empty_selector());
        }
        Ok(Self { rules })
    }
}

/// Any selector.
#[derive(Debug, Clone, PartialEq)]
pub enum Selector {
    Indexed(IndexedSelector),
    Keyed(KeyedSelector),
    Generic(GenericSelector),
}

impl Selector {
    /// Convenience constructor for a single-index selector.
    pub fn indexed(index: Value) -> ExecResult<Self> {
        Ok(Self::Indexed(IndexedSelector::new(index)?))
    }

    /// Convenience constructor for a key-path selector.
    pub fn keyed(keys: impl IntoIterator<Item = Value>) -> ExecResult<Self> {
        Ok(Self::Keyed(KeyedSelector::new(keys)?))
    }

    /// Convenience constructor for a rule selector.
    pub fn generic(rules: Vec<Value>) -> ExecResult<Self> {
        Ok(Self::Generic(GenericSelector::new(rules)?))
    }

    /// Applies this selector to `target`, producing the selected subvalue.
    pub fn apply(&self, target: &Value) -> ExecResult<Value> {
        match self {
            Self::Indexed(selector) => target.select_index(&selector.index),
            Self::Keyed(selector) => {
                let mut current = target.clone();
                for key in &selector.keys {
                    current = current.select_key(key)?;
                }
                Ok(current)
            }
            Self::Generic(selector) => target.select_rules(&selector.rules),
        }
    }
}
