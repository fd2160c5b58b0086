//! Lexical scopes.
//!
//! A scope holds three name spaces — variables, constants, and commands —
//! plus an optional parent and an optional locals overlay installed for the
//! duration of a call. Scope trees are strict DAGs: children point at
//! parents, parents never at children.
//!
//! Resolution order for value names inside a scope: locals → constants →
//! variables → parent (recursive). Command resolution is local-first, then
//! parent. Constants cannot be redefined, variables cannot shadow a constant
//! in the same scope, and a local shadows everything for the enclosing call.
//!
//! The engine is single-threaded and cooperative, so interior mutability via
//! `RefCell` needs no locking: there is never a concurrent mutator.

use std::{cell::RefCell, rc::Rc};

use ahash::AHashMap;

use crate::{
    command::Command,
    result::{EvalResult, ExecResult},
    value::{QualifiedValue, Value},
};

type Names<T> = AHashMap<Rc<str>, T>;

/// A lexical environment holding variables, constants, and commands.
pub struct Scope {
    parent: Option<Rc<Scope>>,
    variables: RefCell<Names<Value>>,
    constants: RefCell<Names<Value>>,
    commands: RefCell<Names<Rc<dyn Command>>>,
    locals: RefCell<Option<Names<Value>>>,
}

impl std::fmt::Debug for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scope")
            .field("variables", &self.variables.borrow().len())
            .field("constants", &self.constants.borrow().len())
            .field("commands", &self.commands.borrow().len())
            .field("has_parent", &self.parent.is_some())
            .finish()
    }
}

impl Scope {
    /// Creates a root scope with no parent.
    #[must_use]
    pub fn root() -> Rc<Self> {
        Rc::new(Self {
            parent: None,
            variables: RefCell::new(Names::default()),
            constants: RefCell::new(Names::default()),
            commands: RefCell::new(Names::default()),
            locals: RefCell::new(None),
        })
    }

    /// Creates a child scope of `parent`.
    #[must_use]
    pub fn child(parent: &Rc<Self>) -> Rc<Self> {
        Rc::new(Self {
            parent: Some(parent.clone()),
            variables: RefCell::new(Names::default()),
            constants: RefCell::new(Names::default()),
            commands: RefCell::new(Names::default()),
            locals: RefCell::new(None),
        })
    }

    #[must_use]
    pub fn parent(&self) -> Option<&Rc<Self>> {
        self.parent.as_ref()
    }

    // --- commands ---

    /// Registers a command under `name`, replacing any previous binding.
    pub fn register_command(&self, name: impl Into<Rc<str>>, command: Rc<dyn Command>) {
        self.commands.borrow_mut().insert(name.into(), command);
    }

    /// Resolves a command name through the scope chain, local-first.
    #[must_use]
    pub fn resolve_command(&self, name: &str) -> Option<Rc<dyn Command>> {
        if let Some(command) = self.commands.borrow().get(name) {
            return Some(command.clone());
        }
        self.parent.as_ref().and_then(|parent| parent.resolve_command(name))
    }

    // --- variables and constants ---

    /// Sets a variable in this scope. Fails when the name is bound to a
    /// constant here.
    pub fn set_variable(&self, name: &str, value: Value) -> ExecResult<()> {
        if self.constants.borrow().contains_key(name) {
            return Err(EvalResult::cannot_redefine_constant(name));
        }
        self.variables.borrow_mut().insert(Rc::from(name), value);
        Ok(())
    }

    /// Removes a variable binding from this scope, returning its value.
    pub fn unset_variable(&self, name: &str) -> ExecResult<Value> {
        self.variables
            .borrow_mut()
            .remove(name)
            .ok_or_else(|| EvalResult::cannot_get_variable(name))
    }

    /// Defines a constant in this scope. A constant can never be redefined,
    /// and cannot be defined over an existing variable.
    pub fn define_constant(&self, name: &str, value: Value) -> ExecResult<()> {
        if self.constants.borrow().contains_key(name) {
            return Err(EvalResult::cannot_redefine_constant(name));
        }
        if self.variables.borrow().contains_key(name) {
            return Err(EvalResult::cannot_define_constant(name));
        }
        self.constants.borrow_mut().insert(Rc::from(name), value);
        Ok(())
    }

    /// Defines a local in the current overlay, creating the overlay when
    /// this is the first local of the call.
    pub fn define_local(&self, name: &str, value: Value) -> ExecResult<()> {
        let mut locals = self.locals.borrow_mut();
        let map = locals.get_or_insert_with(Names::default);
        if map.contains_key(name) {
            return Err(EvalResult::cannot_redefine_local(name));
        }
        map.insert(Rc::from(name), value);
        Ok(())
    }

    /// Installs a pre-built locals overlay, returning the previous one so a
    /// caller can restore it when the activation ends.
    pub fn install_locals(&self, locals: AHashMap<Rc<str>, Value>) -> Option<AHashMap<Rc<str>, Value>> {
        self.locals.borrow_mut().replace(locals)
    }

    /// Removes the locals overlay, restoring `previous` (if any).
    pub fn clear_locals(&self, previous: Option<AHashMap<Rc<str>, Value>>) {
        *self.locals.borrow_mut() = previous;
    }

    /// Looks a value name up without failing: locals, then constants, then
    /// variables, then the parent chain.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<Value> {
        if let Some(locals) = self.locals.borrow().as_ref()
            && let Some(value) = locals.get(name)
        {
            return Some(value.clone());
        }
        if let Some(value) = self.constants.borrow().get(name) {
            return Some(value.clone());
        }
        if let Some(value) = self.variables.borrow().get(name) {
            return Some(value.clone());
        }
        self.parent.as_ref().and_then(|parent| parent.lookup(name))
    }

    /// Resolves a value name, failing with the canonical message when the
    /// name is unbound.
    pub fn resolve_variable(&self, name: &str) -> ExecResult<Value> {
        self.lookup(name).ok_or_else(|| EvalResult::cannot_resolve_variable(name))
    }

    /// Resolves a qualified value: the source resolves first (a literal name
    /// through the variable lookup, a tuple element-wise), then each selector
    /// applies in order.
    pub fn resolve_qualified(&self, qualified: &QualifiedValue) -> ExecResult<Value> {
        let mut value = self.resolve_source(&qualified.source)?;
        for selector in &qualified.selectors {
            value = selector.apply(&value)?;
        }
        Ok(value)
    }

    /// Resolves a value used as a variable reference: a tuple element-wise,
    /// a qualified value through [`Self::resolve_qualified`], anything else
    /// by its string form.
    pub(crate) fn resolve_source(&self, source: &Value) -> ExecResult<Value> {
        match source {
            Value::Tuple(items) => {
                let resolved: Vec<Value> = items.iter().map(|item| self.resolve_source(item)).collect::<ExecResult<_>>()?;
                Ok(Value::tuple(resolved))
            }
            Value::Qualified(inner) => self.resolve_qualified(inner),
            _ => {
                let name = source.as_string().map_err(|_| EvalResult::error("invalid variable name"))?;
                self.resolve_variable(&name)
            }
        }
    }
}
