//! The runtime value model.
//!
//! Values are immutable once constructed; containers share structure through
//! `Rc` and operations build new values instead of mutating. Selection (the
//! subvalue algebra) is implemented here, with the selector objects
//! themselves in [`crate::selector`].

use std::rc::Rc;

use indexmap::IndexMap;

use crate::{
    command::Command,
    parse::Script,
    result::{EvalResult, ExecResult},
    selector::{GenericSelector, IndexedSelector, KeyedSelector, Selector},
};

/// String-keyed mapping with insertion-order iteration.
pub type Dictionary = IndexMap<Rc<str>, Value, ahash::RandomState>;

/// A parsed script as a value: the tree plus, when known, the verbatim
/// source text it was parsed from.
#[derive(Debug, Clone)]
pub struct ScriptValue {
    pub script: Rc<Script>,
    pub source: Option<Rc<str>>,
}

impl ScriptValue {
    #[must_use]
    pub fn new(script: Script, source: Option<Rc<str>>) -> Self {
        Self {
            script: Rc::new(script),
            source,
        }
    }
}

impl PartialEq for ScriptValue {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.script, &other.script) || self.script == other.script
    }
}

/// An opaque wrapper carrying a command handle.
///
/// Two command values are equal only when they carry the same handle.
#[derive(Clone)]
pub struct CommandValue {
    pub command: Rc<dyn Command>,
}

impl std::fmt::Debug for CommandValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CommandValue(..)")
    }
}

impl PartialEq for CommandValue {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.command, &other.command)
    }
}

/// A named value with deferred selectors attached.
///
/// The source is a String (a variable name) or a Tuple of names; resolution
/// happens through a scope, after which the selectors apply in order.
#[derive(Debug, Clone, PartialEq)]
pub struct QualifiedValue {
    pub source: Value,
    pub selectors: Vec<Selector>,
}

impl QualifiedValue {
    /// Returns a new qualified value with `selector` appended. Successive
    /// keyed selectors merge into a single multi-key selector so that
    /// equivalent access paths canonicalize to the same shape.
    #[must_use]
    pub fn with_selector(&self, selector: Selector) -> Self {
        let mut selectors = self.selectors.clone();
        if let (Some(Selector::Keyed(last)), Selector::Keyed(next)) = (selectors.last_mut(), &selector) {
            let mut keys = last.keys.clone();
            keys.extend(next.keys.iter().cloned());
            *last = KeyedSelector { keys };
        } else {
            selectors.push(selector);
        }
        Self {
            source: self.source.clone(),
            selectors,
        }
    }
}

/// A runtime value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Nil,
    Boolean(bool),
    Integer(i64),
    Real(f64),
    String(Rc<str>),
    List(Rc<[Value]>),
    Dictionary(Rc<Dictionary>),
    Tuple(Rc<[Value]>),
    Script(ScriptValue),
    Qualified(Rc<QualifiedValue>),
    Command(CommandValue),
}

impl Value {
    #[must_use]
    pub fn string(s: impl Into<Rc<str>>) -> Self {
        Self::String(s.into())
    }

    #[must_use]
    pub fn boolean(b: bool) -> Self {
        Self::Boolean(b)
    }

    #[must_use]
    pub fn integer(i: i64) -> Self {
        Self::Integer(i)
    }

    #[must_use]
    pub fn real(r: f64) -> Self {
        Self::Real(r)
    }

    #[must_use]
    pub fn list(items: impl Into<Rc<[Value]>>) -> Self {
        Self::List(items.into())
    }

    #[must_use]
    pub fn tuple(items: impl Into<Rc<[Value]>>) -> Self {
        Self::Tuple(items.into())
    }

    #[must_use]
    pub fn dictionary(map: Dictionary) -> Self {
        Self::Dictionary(Rc::new(map))
    }

    #[must_use]
    pub fn script(script: Script, source: Option<Rc<str>>) -> Self {
        Self::Script(ScriptValue::new(script, source))
    }

    #[must_use]
    pub fn command(command: Rc<dyn Command>) -> Self {
        Self::Command(CommandValue { command })
    }

    #[must_use]
    pub fn qualified(source: Self, selectors: Vec<Selector>) -> Self {
        Self::Qualified(Rc::new(QualifiedValue { source, selectors }))
    }

    #[must_use]
    pub fn is_nil(&self) -> bool {
        matches!(self, Self::Nil)
    }

    /// A short noun for the value's kind, used in messages.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Nil => "nil",
            Self::Boolean(_) => "boolean",
            Self::Integer(_) => "integer",
            Self::Real(_) => "real",
            Self::String(_) => "string",
            Self::List(_) => "list",
            Self::Dictionary(_) => "dictionary",
            Self::Tuple(_) => "tuple",
            Self::Script(_) => "script",
            Self::Qualified(_) => "qualified value",
            Self::Command(_) => "command",
        }
    }

    /// The canonical string form.
    ///
    /// Booleans are `true`/`false`, integers decimal, reals the shortest
    /// round-trip form, strings verbatim, scripts their stored source text.
    /// Everything else has no string representation and signals so.
    pub fn as_string(&self) -> ExecResult<Rc<str>> {
        match self {
            Self::Boolean(true) => Ok(Rc::from("true")),
            Self::Boolean(false) => Ok(Rc::from("false")),
            Self::Integer(i) => Ok(Rc::from(i.to_string())),
            Self::Real(r) => Ok(Rc::from(format_real(*r))),
            Self::String(s) => Ok(s.clone()),
            Self::Script(script) => script.source.clone().ok_or_else(EvalResult::no_string_representation),
            _ => Err(EvalResult::no_string_representation()),
        }
    }

    /// Indexed selection: bounds-checked positional access.
    pub fn select_index(&self, index: &Self) -> ExecResult<Self> {
        match self {
            Self::String(s) => {
                let i = checked_index(index, s.chars().count())?;
                let c = s.chars().nth(i).expect("index checked against char count");
                Ok(Self::string(c.to_string()))
            }
            Self::List(items) => {
                let i = checked_index(index, items.len())?;
                Ok(items[i].clone())
            }
            Self::Tuple(items) => {
                let selected: Vec<Self> = items.iter().map(|item| item.select_index(index)).collect::<ExecResult<_>>()?;
                Ok(Self::tuple(selected))
            }
            Self::Qualified(q) => {
                let selector = Selector::Indexed(IndexedSelector::new(index.clone())?);
                Ok(Self::Qualified(Rc::new(q.with_selector(selector))))
            }
            _ => Err(EvalResult::error("value is not index-selectable")),
        }
    }

    /// Keyed selection: looks the key up by its string form.
    pub fn select_key(&self, key: &Self) -> ExecResult<Self> {
        match self {
            Self::Dictionary(map) => {
                let k = key.as_string()?;
                map.get(&*k)
                    .cloned()
                    .ok_or_else(|| EvalResult::error(format!("unknown key \"{k}\"")))
            }
            Self::Tuple(items) => {
                let selected: Vec<Self> = items.iter().map(|item| item.select_key(key)).collect::<ExecResult<_>>()?;
                Ok(Self::tuple(selected))
            }
            Self::Qualified(q) => {
                let selector = Selector::Keyed(KeyedSelector::new(vec![key.clone()])?);
                Ok(Self::Qualified(Rc::new(q.with_selector(selector))))
            }
            _ => Err(EvalResult::error("value is not key-selectable")),
        }
    }

    /// Rule-based (generic) selection.
    ///
    /// Only qualified values accept arbitrary rules in the core; tuples
    /// distribute element-wise.
    pub fn select_rules(&self, rules: &[Self]) -> ExecResult<Self> {
        match self {
            Self::Tuple(items) => {
                let selected: Vec<Self> = items.iter().map(|item| item.select_rules(rules)).collect::<ExecResult<_>>()?;
                Ok(Self::tuple(selected))
            }
            Self::Qualified(q) => {
                let selector = Selector::Generic(GenericSelector::new(rules.to_vec())?);
                Ok(Self::Qualified(Rc::new(q.with_selector(selector))))
            }
            _ => Err(EvalResult::error("value is not selectable")),
        }
    }

    /// Applies a selector to this value.
    pub fn select(&self, selector: &Selector) -> ExecResult<Self> {
        selector.apply(self)
    }

    // --- typed conversions (command ABI) ---

    pub fn to_boolean(&self) -> ExecResult<bool> {
        if let Self::Boolean(b) = self {
            return Ok(*b);
        }
        let s = self.as_string()?;
        match &*s {
            "true" => Ok(true),
            "false" => Ok(false),
            _ => Err(EvalResult::invalid_boolean(&s)),
        }
    }

    pub fn to_integer(&self) -> ExecResult<i64> {
        if let Self::Integer(i) = self {
            return Ok(*i);
        }
        let s = self.as_string()?;
        s.parse::<i64>().map_err(|_| EvalResult::invalid_integer(&s))
    }

    /// Numeric conversion accepting integers, reals, and numeric strings.
    pub fn to_number(&self) -> ExecResult<f64> {
        match self {
            Self::Integer(i) => Ok(*i as f64),
            Self::Real(r) => Ok(*r),
            _ => {
                let s = self.as_string()?;
                parse_real(&s).ok_or_else(|| EvalResult::invalid_number(&s))
            }
        }
    }

    pub fn to_list(&self) -> ExecResult<Rc<[Self]>> {
        match self {
            Self::List(items) | Self::Tuple(items) => Ok(items.clone()),
            _ => Err(EvalResult::error("invalid list")),
        }
    }

    pub fn to_dictionary(&self) -> ExecResult<Rc<Dictionary>> {
        match self {
            Self::Dictionary(map) => Ok(map.clone()),
            _ => Err(EvalResult::error("invalid dictionary")),
        }
    }

    pub fn to_tuple(&self) -> ExecResult<Rc<[Self]>> {
        match self {
            Self::Tuple(items) => Ok(items.clone()),
            _ => Err(EvalResult::error("invalid tuple")),
        }
    }

    /// Script conversion for commands that take a body.
    pub fn to_script(&self) -> ExecResult<ScriptValue> {
        match self {
            Self::Script(script) => Ok(script.clone()),
            _ => Err(EvalResult::body_must_be_script()),
        }
    }
}

/// Converts a selector index value to a checked position within `len`.
fn checked_index(index: &Value, len: usize) -> ExecResult<usize> {
    let i = index.to_integer()?;
    if i < 0 || i as usize >= len {
        return Err(EvalResult::index_out_of_range(i));
    }
    Ok(i as usize)
}

/// Formats a real in its shortest round-trip decimal form.
#[must_use]
pub fn format_real(r: f64) -> String {
    let mut buffer = ryu::Buffer::new();
    buffer.format(r).to_string()
}

/// Parses a numeric literal (integer or real). Returns `None` for text that
/// is not a plain decimal number — `inf`/`nan` spellings are not numbers in
/// this language.
#[must_use]
pub fn parse_real(s: &str) -> Option<f64> {
    let body = s.strip_prefix(['+', '-']).unwrap_or(s);
    if body.is_empty() || !body.starts_with(|c: char| c.is_ascii_digit() || c == '.') {
        return None;
    }
    s.parse::<f64>().ok()
}

/// True when the text spells a number (used for implicit number-command
/// resolution of sentence heads).
#[must_use]
pub fn is_numeric_literal(s: &str) -> bool {
    s.parse::<i64>().is_ok() || parse_real(s).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dict(pairs: &[(&str, Value)]) -> Value {
        let mut map = Dictionary::default();
        for (k, v) in pairs {
            map.insert(Rc::from(*k), v.clone());
        }
        Value::dictionary(map)
    }

    #[test]
    fn string_forms() {
        assert_eq!(&*Value::boolean(true).as_string().unwrap(), "true");
        assert_eq!(&*Value::integer(-7).as_string().unwrap(), "-7");
        assert_eq!(&*Value::real(2.5).as_string().unwrap(), "2.5");
        assert_eq!(&*Value::string("abc").as_string().unwrap(), "abc");
    }

    #[test]
    fn nil_and_containers_have_no_string_form() {
        for value in [Value::Nil, Value::list(vec![]), Value::tuple(vec![]), dict(&[])] {
            let err = value.as_string().unwrap_err();
            assert_eq!(err.message(), Some("value has no string representation"));
        }
    }

    #[test]
    fn list_index_selection() {
        let list = Value::list(vec![Value::string("a"), Value::string("b")]);
        assert_eq!(list.select_index(&Value::integer(1)).unwrap(), Value::string("b"));
        let err = list.select_index(&Value::integer(2)).unwrap_err();
        assert_eq!(err.message(), Some("index out of range \"2\""));
        let err = list.select_index(&Value::integer(-1)).unwrap_err();
        assert_eq!(err.message(), Some("index out of range \"-1\""));
    }

    #[test]
    fn string_index_selection_counts_chars() {
        let s = Value::string("héllo");
        assert_eq!(s.select_index(&Value::integer(1)).unwrap(), Value::string("é"));
    }

    #[test]
    fn dictionary_key_selection() {
        let d = dict(&[("a", Value::integer(1)), ("b", Value::integer(2))]);
        assert_eq!(d.select_key(&Value::string("b")).unwrap(), Value::integer(2));
        let err = d.select_key(&Value::string("missing")).unwrap_err();
        assert_eq!(err.message(), Some("unknown key \"missing\""));
    }

    #[test]
    fn tuple_selectors_distribute() {
        let t = Value::tuple(vec![
            Value::list(vec![Value::integer(1), Value::integer(2)]),
            Value::list(vec![Value::integer(3), Value::integer(4)]),
        ]);
        let selected = t.select_index(&Value::integer(1)).unwrap();
        assert_eq!(selected, Value::tuple(vec![Value::integer(2), Value::integer(4)]));
    }

    #[test]
    fn qualified_keyed_selectors_coalesce() {
        let q = Value::qualified(Value::string("name"), vec![]);
        let once = q.select_key(&Value::string("k1")).unwrap();
        let twice = once.select_key(&Value::string("k2")).unwrap();
        let expected = Value::qualified(
            Value::string("name"),
            vec![Selector::Keyed(
                KeyedSelector::new(vec![Value::string("k1"), Value::string("k2")]).unwrap(),
            )],
        );
        assert_eq!(twice, expected);
    }

    #[test]
    fn conversions() {
        assert!(Value::string("true").to_boolean().unwrap());
        assert_eq!(Value::string("42").to_integer().unwrap(), 42);
        assert_eq!(Value::integer(2).to_number().unwrap(), 2.0);
        let err = Value::string("abc").to_integer().unwrap_err();
        assert_eq!(err.message(), Some("invalid integer \"abc\""));
        let err = Value::string("yes").to_boolean().unwrap_err();
        assert_eq!(err.message(), Some("invalid boolean \"yes\""));
    }

    #[test]
    fn numeric_literal_detection() {
        assert!(is_numeric_literal("42"));
        assert!(is_numeric_literal("-1.5"));
        assert!(is_numeric_literal("1e3"));
        assert!(!is_numeric_literal("abc"));
        assert!(!is_numeric_literal("inf"));
        assert!(!is_numeric_literal("nan"));
        assert!(!is_numeric_literal(""));
    }
}
