//! Records, identifiers, kinds and the kind registry.
//!
//! Every persisted record is a flat JSON document carrying a `type` field
//! equal to its kind's fixed discriminator. The discriminator is stamped at
//! serialization time and is never independently settable by callers. The
//! unique key of a record is `"{type}_{id}"`.
//!
//! Foreign keys follow the `fk_<name>` convention in the stored document but
//! are declared explicitly per kind as [`ForeignKey`] triples; the resolver
//! in the store walks those declarations rather than guessing from names.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::query::QUERY_DIVIDER;
use crate::{LarderError, Result};

/// The flat persisted representation of a record.
pub type Document = Map<String, Value>;

/// The base discriminator matching every kind when filtering.
pub const ALL: &str = "all";

/// The separator between type tag and id in a unique key.
pub const UNIQUE_SEP: char = '_';

/// Formats the unique key addressing one record.
pub fn unique_format(kind: &str, id: &Id) -> String {
    format!("{kind}{UNIQUE_SEP}{id}")
}

// ------------- Id -------------

/// A record identifier: a number, a text, or the generate-next sentinel.
///
/// [`Id::Auto`] is replaced with the next available numeric id for the
/// record's kind when the record is written.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Id {
    Auto,
    Number(i64),
    Text(String),
}

impl Id {
    pub fn from_value(value: &Value) -> Result<Id> {
        match value {
            Value::Null => Ok(Id::Auto),
            Value::Number(n) => n
                .as_i64()
                .map(Id::Number)
                .ok_or_else(|| LarderError::Argument(format!("`{n}` is not a usable numeric id"))),
            Value::String(s) => Ok(Id::Text(s.clone())),
            other => Err(LarderError::Argument(format!(
                "`{other}` is not a usable id; expected a string or an integer"
            ))),
        }
    }

    pub fn as_value(&self) -> Value {
        match self {
            Id::Auto => Value::Null,
            Id::Number(n) => Value::from(*n),
            Id::Text(t) => Value::String(t.clone()),
        }
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Id::Auto => write!(f, "auto"),
            Id::Number(n) => write!(f, "{n}"),
            Id::Text(t) => write!(f, "{t}"),
        }
    }
}

impl From<i64> for Id {
    fn from(n: i64) -> Id {
        Id::Number(n)
    }
}
impl From<&str> for Id {
    fn from(s: &str) -> Id {
        Id::Text(s.to_owned())
    }
}
impl From<String> for Id {
    fn from(s: String) -> Id {
        Id::Text(s)
    }
}

impl Serialize for Id {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Id::Auto => serializer.serialize_none(),
            Id::Number(n) => serializer.serialize_i64(*n),
            Id::Text(t) => serializer.serialize_str(t),
        }
    }
}

impl<'de> Deserialize<'de> for Id {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Id, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Id::from_value(&value).map_err(serde::de::Error::custom)
    }
}

// ------------- Foreign keys -------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Cardinality {
    One,
    Many,
}

/// A declared foreign-key field: the raw document field holding key(s) or a
/// query, the companion field it resolves into, and its declared cardinality.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ForeignKey {
    pub raw: &'static str,
    pub resolved: &'static str,
    pub cardinality: Cardinality,
}

pub const fn foreign_key(
    raw: &'static str,
    resolved: &'static str,
    cardinality: Cardinality,
) -> ForeignKey {
    ForeignKey { raw, resolved, cardinality }
}

// ------------- Record -------------

/// A concrete record kind with a fixed discriminator.
///
/// Implementors are plain serde structs; [`Record::document`] always stamps
/// the `type` field with [`Record::KIND`], so the discriminator cannot be
/// set by callers.
pub trait Record: Serialize + DeserializeOwned {
    const KIND: &'static str;
    const FOREIGN_KEYS: &'static [ForeignKey] = &[];

    fn id(&self) -> &Id;

    fn document(&self) -> Result<Document> {
        match serde_json::to_value(self)? {
            Value::Object(mut map) => {
                map.insert("type".to_owned(), Value::String(Self::KIND.to_owned()));
                Ok(map)
            }
            _ => Err(LarderError::Argument(
                "a record must serialize to an object".to_owned(),
            )),
        }
    }

    fn from_document(doc: &Document) -> Result<Self> {
        Ok(serde_json::from_value(Value::Object(doc.clone()))?)
    }

    /// The unique key addressing this record.
    fn unique(&self) -> String {
        unique_format(Self::KIND, self.id())
    }

    /// The routing prefix for queries over this kind.
    fn query_prefix() -> String {
        format!("{}{}", Self::KIND, QUERY_DIVIDER)
    }
}

// ------------- Kind registry -------------

/// The registered declaration of one record kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Kind {
    pub tag: &'static str,
    pub foreign_keys: &'static [ForeignKey],
    /// Verifies that a raw document deserializes into the kind's struct,
    /// gatekeeping bulk writes that bypass the typed API.
    pub check: fn(&Document) -> Result<()>,
}

impl Kind {
    pub fn of<T: Record>() -> Kind {
        Kind {
            tag: T::KIND,
            foreign_keys: T::FOREIGN_KEYS,
            check: check_shape::<T>,
        }
    }
}

fn check_shape<T: Record>(doc: &Document) -> Result<()> {
    T::from_document(doc).map(|_| ())
}

/// Keeper of registered kinds, in registration order.
#[derive(Debug, Default)]
pub struct KindKeeper {
    kept: Vec<Kind>,
}

impl KindKeeper {
    pub fn new() -> Self {
        Self { kept: Vec::new() }
    }
    /// First-write-wins: a duplicate discriminator is a no-op and returns false.
    pub fn keep(&mut self, kind: Kind) -> bool {
        if self.kept.iter().any(|k| k.tag == kind.tag) {
            return false;
        }
        self.kept.push(kind);
        true
    }
    pub fn get(&self, tag: &str) -> Option<&Kind> {
        self.kept.iter().find(|k| k.tag == tag)
    }
    pub fn contains(&self, tag: &str) -> bool {
        self.get(tag).is_some()
    }
    pub fn tags(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.kept.iter().map(|k| k.tag)
    }
    pub fn len(&self) -> usize {
        self.kept.len()
    }
    pub fn is_empty(&self) -> bool {
        self.kept.is_empty()
    }
}

// ------------- Tag -------------

/// The built-in kind, always registered in every store.
///
/// A tag holds one arbitrary JSON payload in `data`. When `fk_data` is set,
/// resolution overwrites `data` with the resolved content. Reading a tag
/// through the store yields the payload directly rather than a record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub id: Id,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub fk_data: Value,
}

impl Tag {
    pub fn new(id: impl Into<Id>, data: Value) -> Tag {
        Tag { id: id.into(), data, fk_data: Value::Null }
    }
    /// A tag whose payload is produced by resolving `fk_data`.
    pub fn with_reference(id: impl Into<Id>, fk_data: Value) -> Tag {
        Tag { id: id.into(), data: Value::Null, fk_data }
    }
}

impl Record for Tag {
    const KIND: &'static str = "tag";
    const FOREIGN_KEYS: &'static [ForeignKey] =
        &[foreign_key("fk_data", "data", Cardinality::One)];

    fn id(&self) -> &Id {
        &self.id
    }
}

// ------------- Fetched records -------------

/// A companion field after resolution.
#[derive(Clone, Debug, PartialEq)]
pub enum Linked {
    Unresolved,
    One(Box<Fetched>),
    Many(Vec<Fetched>),
}

impl Linked {
    pub fn to_value(&self) -> Value {
        match self {
            Linked::Unresolved => Value::Null,
            Linked::One(fetched) => fetched.to_value(),
            Linked::Many(items) => Value::Array(items.iter().map(Fetched::to_value).collect()),
        }
    }
}

/// A record constructed from its stored document, with resolved companions.
#[derive(Clone, Debug, PartialEq)]
pub struct Entry {
    kind: Kind,
    id: Id,
    doc: Document,
    links: Vec<(&'static str, Linked)>,
}

impl Entry {
    pub(crate) fn new(kind: Kind, id: Id, doc: Document, links: Vec<(&'static str, Linked)>) -> Entry {
        Entry { kind, id, doc, links }
    }

    pub fn kind(&self) -> &'static str {
        self.kind.tag
    }
    pub fn id(&self) -> &Id {
        &self.id
    }
    pub fn unique(&self) -> String {
        unique_format(self.kind.tag, &self.id)
    }
    /// The raw persisted document this record was constructed from.
    pub fn document(&self) -> &Document {
        &self.doc
    }
    pub fn link(&self, resolved: &str) -> Option<&Linked> {
        self.links.iter().find(|(name, _)| *name == resolved).map(|(_, l)| l)
    }

    /// Recovers the caller's typed struct from the raw document.
    pub fn decode<T: Record>(&self) -> Result<T> {
        if T::KIND != self.kind.tag {
            return Err(LarderError::Argument(format!(
                "cannot decode a `{}` record as `{}`",
                self.kind.tag,
                T::KIND
            )));
        }
        T::from_document(&self.doc)
    }

    /// The resolved view: raw `fk_<name>` fields are replaced by their
    /// `<name>` companions, referents deep-serialized recursively.
    pub fn to_value(&self) -> Value {
        let mut out = Map::new();
        for (key, value) in &self.doc {
            if let Some(fk) = self.kind.foreign_keys.iter().find(|f| f.raw == key.as_str()) {
                let mut resolved = self
                    .link(fk.resolved)
                    .map(Linked::to_value)
                    .unwrap_or(Value::Null);
                if resolved.is_null() {
                    resolved = self.doc.get(fk.resolved).cloned().unwrap_or(Value::Null);
                }
                out.insert(fk.resolved.to_owned(), resolved);
            } else if !out.contains_key(key) {
                out.insert(key.clone(), value.clone());
            }
        }
        Value::Object(out)
    }

    /// Single-line JSON of the resolved view.
    pub fn compact(&self) -> String {
        self.to_value().to_string()
    }
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let pretty = serde_json::to_string_pretty(&self.to_value()).unwrap_or_else(|_| "{}".into());
        write!(f, "{pretty}")
    }
}

/// What a read returns: a constructed record, or the unwrapped payload when
/// the record is a [`Tag`].
#[derive(Clone, Debug, PartialEq)]
pub enum Fetched {
    Entry(Entry),
    Data(Value),
}

impl Fetched {
    pub fn as_entry(&self) -> Option<&Entry> {
        match self {
            Fetched::Entry(entry) => Some(entry),
            Fetched::Data(_) => None,
        }
    }
    pub fn as_data(&self) -> Option<&Value> {
        match self {
            Fetched::Data(value) => Some(value),
            Fetched::Entry(_) => None,
        }
    }
    pub fn to_value(&self) -> Value {
        match self {
            Fetched::Entry(entry) => entry.to_value(),
            Fetched::Data(value) => value.clone(),
        }
    }
}

impl fmt::Display for Fetched {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let pretty = serde_json::to_string_pretty(&self.to_value()).unwrap_or_else(|_| "{}".into());
        write!(f, "{pretty}")
    }
}
