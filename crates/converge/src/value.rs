//! Task identity, field values and cross-task references

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Stable identity of a task: its kind plus its name
///
/// Keys order lexicographically by kind, then name. That ordering is the
/// tie-breaker for execution order, so it must never depend on insertion
/// order or hashing.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TaskKey {
    /// Task kind (e.g. "iam_role", "dns_record")
    pub kind: String,
    /// Task name, unique within its kind
    pub name: String,
}

impl TaskKey {
    /// Create a key from kind and name
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Parse a key written as `kind/name`
    pub fn parse(text: &str) -> Option<Self> {
        let (kind, name) = text.split_once('/')?;
        if kind.is_empty() || name.is_empty() {
            return None;
        }
        Some(Self::new(kind, name))
    }

    /// Reference one of this task's attributes
    pub fn attr(&self, attr: impl Into<String>) -> TaskRef {
        TaskRef::new(self.clone(), attr)
    }
}

impl fmt::Display for TaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.name)
    }
}

impl TryFrom<String> for TaskKey {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("expected `kind/name`, got `{value}`"))
    }
}

impl From<TaskKey> for String {
    fn from(key: TaskKey) -> Self {
        key.to_string()
    }
}

/// A reference to an attribute another task produces (e.g. a role's ARN)
///
/// In configuration this is written as `{ ref = "iam_role/masters", attr = "arn" }`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TaskRef {
    /// The referenced task
    #[serde(rename = "ref")]
    pub task: TaskKey,
    /// Attribute name, format-neutral snake case (`id`, `name`, `arn`, `self_link`)
    pub attr: String,
}

impl TaskRef {
    pub fn new(task: TaskKey, attr: impl Into<String>) -> Self {
        Self {
            task,
            attr: attr.into(),
        }
    }
}

impl fmt::Display for TaskRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.task, self.attr)
    }
}

/// A string setting that is either given directly or taken from another task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Link {
    Ref(TaskRef),
    Literal(String),
}

impl From<Link> for Value {
    fn from(link: Link) -> Self {
        match link {
            Link::Ref(r) => Value::Ref(r),
            Link::Literal(s) => Value::from(s),
        }
    }
}

impl From<&Link> for Value {
    fn from(link: &Link) -> Self {
        link.clone().into()
    }
}

/// One field value of a task
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// A concrete value
    Literal(serde_json::Value),
    /// A value produced by another task, not yet resolved
    Ref(TaskRef),
    /// A reference whose value only exists after the referenced task is applied
    Unknown,
}

impl Value {
    /// The concrete value, if resolved
    pub fn as_literal(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Literal(v) => Some(v),
            _ => None,
        }
    }

    /// The concrete string value, if this is a literal string
    pub fn as_str(&self) -> Option<&str> {
        self.as_literal().and_then(serde_json::Value::as_str)
    }

    pub fn as_task_ref(&self) -> Option<&TaskRef> {
        match self {
            Self::Ref(r) => Some(r),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(serde_json::Value::String(s)) => write!(f, "{s}"),
            Self::Literal(v) => write!(f, "{v}"),
            Self::Ref(r) => write!(f, "${{{r}}}"),
            Self::Unknown => write!(f, "(known after apply)"),
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        Self::Literal(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Literal(value.into())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Literal(value.into())
    }
}

impl From<&String> for Value {
    fn from(value: &String) -> Self {
        Self::Literal(value.as_str().into())
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Literal(value.into())
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Self::Literal(value.into())
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Literal(value.into())
    }
}

impl From<Vec<String>> for Value {
    fn from(value: Vec<String>) -> Self {
        Self::Literal(value.into())
    }
}

impl From<&Vec<String>> for Value {
    fn from(value: &Vec<String>) -> Self {
        value.clone().into()
    }
}

impl From<BTreeMap<String, String>> for Value {
    fn from(value: BTreeMap<String, String>) -> Self {
        Self::Literal(serde_json::Value::Object(
            value.into_iter().map(|(k, v)| (k, v.into())).collect(),
        ))
    }
}

impl From<&BTreeMap<String, String>> for Value {
    fn from(value: &BTreeMap<String, String>) -> Self {
        value.clone().into()
    }
}

impl From<TaskRef> for Value {
    fn from(value: TaskRef) -> Self {
        Self::Ref(value)
    }
}

/// Named field values of one task
///
/// A field missing from the map is unset: the engine does not manage it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fields(BTreeMap<String, Value>);

impl Fields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style set
    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    /// Builder-style set that leaves the field unset for `None`
    pub fn with_opt<T: Into<Value>>(mut self, name: &str, value: Option<T>) -> Self {
        if let Some(value) = value {
            self.insert(name, value);
        }
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.0.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Concrete value of a field, if set and resolved
    pub fn literal(&self, name: &str) -> Option<&serde_json::Value> {
        self.get(name).and_then(Value::as_literal)
    }

    /// Concrete string value of a field
    pub fn str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut Value)> {
        self.0.iter_mut().map(|(k, v)| (k.as_str(), v))
    }

    /// Every unresolved reference held by these fields
    pub fn references(&self) -> impl Iterator<Item = &TaskRef> {
        self.0.values().filter_map(Value::as_task_ref)
    }

    /// Overwrite fields with those from `other`
    pub fn merge(&mut self, other: Fields) {
        self.0.extend(other.0);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, Value)> for Fields {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for Fields {
    type Item = (String, Value);
    type IntoIter = std::collections::btree_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Desired state of a task
#[derive(Debug, Clone, PartialEq)]
pub enum Desired {
    /// The resource should exist with these fields
    Present(Fields),
    /// Deletion marker: the resource should not exist
    Absent,
}

impl Desired {
    pub fn fields(&self) -> Option<&Fields> {
        match self {
            Self::Present(fields) => Some(fields),
            Self::Absent => None,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    pub fn references(&self) -> impl Iterator<Item = &TaskRef> {
        self.fields().into_iter().flat_map(Fields::references)
    }
}
