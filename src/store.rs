//! The storage facade: CRUD over the persistent key→document mapping, the
//! kind registry, id generation, the session recovery bin, query routing and
//! foreign-key resolution.
//!
//! A store owns exactly one connection, one registry and one bin; it is a
//! single-writer, single-process handle with no locking and no atomicity
//! across keys within one call.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::PathBuf;

use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::archive::{read_archive, write_archive, ARCHIVE_EXT};
use crate::persist::{PersistenceMode, Persistor};
use crate::query;
use crate::record::{
    unique_format, Document, Entry, Fetched, Id, Kind, KindKeeper, Linked, Record, Tag, ALL,
};
use crate::settings::Settings;
use crate::{LarderError, Result};

// ------------- Store -------------

pub struct Store {
    persistor: Persistor,
    kinds: KindKeeper,
    bin: HashMap<String, Document>,
    name: String,
    data_dir: PathBuf,
}

impl Store {
    /// Opens (or creates) the named file-backed store under the data
    /// directory. A store whose database file does not exist yet first tries
    /// to restore its default archive and otherwise starts empty.
    pub fn open(name: &str, settings: &Settings) -> Result<Store> {
        fs::create_dir_all(&settings.data_dir)?;
        let path = settings.data_dir.join(format!("{name}.db"));
        let fresh = !path.is_file();
        let mut store = Store {
            persistor: Persistor::new(PersistenceMode::File(path))?,
            kinds: KindKeeper::new(),
            bin: HashMap::new(),
            name: name.to_owned(),
            data_dir: settings.data_dir.clone(),
        };
        store.kinds.keep(Kind::of::<Tag>());
        if fresh {
            if let Err(e) = store.restore(None) {
                debug!(name, error = %e, "no usable archive, starting empty");
                store.persistor.wipe()?;
            } else {
                info!(name, "store restored from archive");
            }
        }
        Ok(store)
    }

    /// A store without a database file; archives still go to the data
    /// directory.
    pub fn in_memory(settings: &Settings) -> Result<Store> {
        let mut store = Store {
            persistor: Persistor::new(PersistenceMode::InMemory)?,
            kinds: KindKeeper::new(),
            bin: HashMap::new(),
            name: "memory".to_owned(),
            data_dir: settings.data_dir.clone(),
        };
        store.kinds.keep(Kind::of::<Tag>());
        Ok(store)
    }

    /// Registers a record kind. First write wins: a duplicate discriminator
    /// is a no-op and returns false.
    pub fn register<T: Record>(&mut self) -> bool {
        self.kinds.keep(Kind::of::<T>())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The session recovery bin: deleted documents by their former key.
    pub fn bin(&self) -> &HashMap<String, Document> {
        &self.bin
    }

    // ------------- Reads -------------

    /// Fetches by routable query (first match) or by direct key.
    ///
    /// A missing key is a reference error; a found document without a usable
    /// `type` is a shape error. Tags unwrap to their payload.
    pub fn get(&self, query: &str) -> Result<Fetched> {
        if query::params(query).is_some() {
            if let Some(found) = self.query_all(query)?.into_iter().next() {
                return Ok(found);
            }
        }
        let doc = self
            .persistor
            .read(query)?
            .ok_or_else(|| LarderError::MissingKey { key: query.to_owned() })?;
        self.construct(doc)
    }

    /// Fetches and decodes into the caller's typed struct.
    pub fn get_as<T: Record>(&self, query: &str) -> Result<T> {
        match self.get(query)? {
            Fetched::Entry(entry) => entry.decode::<T>(),
            Fetched::Data(_) => Err(LarderError::Argument(
                "a tag unwraps to its payload; read it with `get`".to_owned(),
            )),
        }
    }

    /// Never errors: any failure to resolve collapses into `None`.
    pub fn exists(&self, query: &str) -> Option<Fetched> {
        self.get(query).ok()
    }

    /// Keys of every record of the given kind; `None`, `"all"` or an
    /// unregistered filter yield every key.
    pub fn keys(&self, kind: Option<&str>) -> Result<Vec<String>> {
        let filter = self.kind_filter(kind);
        if filter == ALL {
            return self.persistor.keys();
        }
        let mut keys = Vec::new();
        for (key, doc) in self.persistor.entries()? {
            if doc.get("type").and_then(Value::as_str) == Some(filter) {
                keys.push(key);
            }
        }
        Ok(keys)
    }

    /// Resolved records of the given kind, tags unwrapped.
    pub fn values(&self, kind: Option<&str>) -> Result<Vec<Fetched>> {
        Ok(self
            .items(kind)?
            .into_iter()
            .map(|(_, fetched)| fetched)
            .collect())
    }

    /// Key→record pairs of the given kind, tags unwrapped.
    pub fn items(&self, kind: Option<&str>) -> Result<Vec<(String, Fetched)>> {
        let mut items = Vec::new();
        for key in self.keys(kind)? {
            let fetched = self.get(&key)?;
            items.push((key, fetched));
        }
        Ok(items)
    }

    pub fn count(&self, kind: &str) -> Result<usize> {
        if self.kind_filter(Some(kind)) == ALL {
            return self.persistor.len();
        }
        Ok(self.keys(Some(kind))?.len())
    }

    /// One greater than the highest numeric id of the kind, or 0 when none
    /// exist. Scans raw documents, so tag ids are seen despite unwrapping.
    pub fn next_id(&self, kind: &str) -> Result<i64> {
        let mut highest: i64 = -1;
        for (_, doc) in self.persistor.entries()? {
            if doc.get("type").and_then(Value::as_str) == Some(kind) {
                if let Some(id) = doc.get("id").and_then(Value::as_i64) {
                    highest = highest.max(id);
                }
            }
        }
        Ok(highest + 1)
    }

    pub fn is_unique_id(&self, kind: &str, id: &Id) -> bool {
        self.exists(&unique_format(kind, id)).is_none()
    }

    /// Every record of the routed kind satisfying the condition expression.
    ///
    /// A non-routable string yields nothing. The routed kind is matched
    /// either by direct existence of the type-key (a single record or a
    /// collection behind a tag) or by scanning all records of the
    /// discriminator. Zero matches never error; grammar errors do.
    pub fn query_all(&self, query: &str) -> Result<Vec<Fetched>> {
        let Some((kind, conditions)) = query::params(query) else {
            return Ok(Vec::new());
        };
        let mut results = Vec::new();
        if let Some(found) = self.exists(kind) {
            match found {
                Fetched::Data(Value::Array(items)) => {
                    for item in items {
                        let fetched = Fetched::Data(item);
                        if query::check_conditions(&condition_target(&fetched), conditions)? {
                            results.push(fetched);
                        }
                    }
                }
                single => {
                    if query::check_conditions(&condition_target(&single), conditions)? {
                        results.push(single);
                    }
                }
            }
        } else if kind == ALL {
            for fetched in self.values(None)? {
                if query::check_conditions(&condition_target(&fetched), conditions)? {
                    results.push(fetched);
                }
            }
        } else {
            self.ensure_registered(kind)?;
            for fetched in self.values(Some(kind))? {
                if query::check_conditions(&condition_target(&fetched), conditions)? {
                    results.push(fetched);
                }
            }
        }
        Ok(results)
    }

    // ------------- Writes -------------

    /// Writes the record's document under the given key, or under the
    /// record's own unique key when `None`. A generate-next id is replaced
    /// with the next available id for the kind before the key is finalized.
    /// Returns the final key; overwrites any prior value.
    pub fn set<T: Record>(&self, key: Option<&str>, record: &T) -> Result<String> {
        self.ensure_registered(T::KIND)?;
        let mut doc = record.document()?;
        let id = match record.id() {
            Id::Auto => {
                let next = self.next_id(T::KIND)?;
                doc.insert("id".to_owned(), Value::from(next));
                Id::Number(next)
            }
            other => other.clone(),
        };
        let key = match key {
            Some(key) => key.to_owned(),
            None => unique_format(T::KIND, &id),
        };
        self.persistor.write(&key, &doc)?;
        Ok(key)
    }

    /// Writes the record only when nothing exists at the target key yet:
    /// at most one write per key across repeated calls.
    pub fn make_once<T: Record>(&self, key: Option<&str>, record: &T) -> Result<bool> {
        self.ensure_registered(T::KIND)?;
        let target = match key {
            Some(key) => key.to_owned(),
            None => {
                if matches!(record.id(), Id::Auto) {
                    return Err(LarderError::Argument(
                        "cannot derive a key from a generate-next id".to_owned(),
                    ));
                }
                record.unique()
            }
        };
        if self.persistor.contains(&target)? {
            return Ok(false);
        }
        self.set(Some(&target), record)?;
        Ok(true)
    }

    /// Deletes one or more keys; each existing key's document moves into the
    /// session bin first. Missing keys are silently skipped.
    pub fn delete<'a, I>(&mut self, keys: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a str>,
    {
        for key in keys {
            if let Some(doc) = self.persistor.remove(key)? {
                debug!(key, "deleted into session bin");
                self.bin.insert(key.to_owned(), doc);
            }
        }
        Ok(())
    }

    /// Forgets every document held in the session bin.
    pub fn empty_bin(&mut self) {
        self.bin.clear();
    }

    /// Empties the store. Wiped documents do not enter the bin.
    pub fn wipe(&mut self) -> Result<()> {
        info!(name = %self.name, "wiping store");
        self.persistor.wipe()
    }

    // ------------- Backup and restore -------------

    /// Dumps every key→document pair into a compressed archive named after
    /// the store (or `name`). Returns the archive path.
    pub fn backup(&self, name: Option<&str>) -> Result<PathBuf> {
        fs::create_dir_all(&self.data_dir)?;
        let path = self.archive_path(name);
        let mut entries = Map::new();
        for (key, doc) in self.persistor.entries()? {
            entries.insert(key, Value::Object(doc));
        }
        write_archive(&path, &entries)?;
        info!(path = %path.display(), "store backed up");
        Ok(path)
    }

    /// Replaces the whole store with the archive's contents; errors when the
    /// archive does not exist.
    pub fn restore(&mut self, name: Option<&str>) -> Result<()> {
        let path = self.archive_path(name);
        let entries = read_archive(&path)?;
        info!(path = %path.display(), entries = entries.len(), "restoring store");
        self.import(entries, true)
    }

    /// Bulk load. With `overwrite` the store is emptied first (the
    /// destructive restore path); otherwise entries merge into existing
    /// contents. Every document must carry the `type` of a registered kind
    /// and deserialize into that kind's struct.
    pub fn import(&mut self, entries: Map<String, Value>, overwrite: bool) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        if overwrite {
            self.persistor.wipe()?;
        }
        for (key, value) in entries {
            let Value::Object(doc) = value else {
                return Err(LarderError::Argument(format!(
                    "`{key}` does not map to a JSON object"
                )));
            };
            let tag = doc
                .get("type")
                .and_then(Value::as_str)
                .filter(|t| !t.is_empty())
                .ok_or(LarderError::UntypedDocument)?
                .to_owned();
            let kind = *self
                .kinds
                .get(&tag)
                .ok_or_else(|| LarderError::UnregisteredKind { kind: tag.clone() })?;
            (kind.check)(&doc)?;
            self.persistor.write(&key, &doc)?;
        }
        Ok(())
    }

    /// Rewrites the store grouped by kind in registration order with tags
    /// always last, ascending id within each group. Performs many individual
    /// writes, not one atomic swap; `backup_first` snapshots the store into
    /// a `before_sort` archive.
    pub fn sort(&mut self, backup_first: bool) -> Result<()> {
        if backup_first {
            self.backup(Some("before_sort"))?;
        }
        let entries = self.persistor.entries()?;
        let mut tags: Vec<&'static str> =
            self.kinds.tags().filter(|tag| *tag != Tag::KIND).collect();
        tags.push(Tag::KIND);
        let mut ordered: Vec<(String, Document)> = Vec::with_capacity(entries.len());
        for tag in tags {
            let mut group: Vec<(String, Document)> = entries
                .iter()
                .filter(|(_, doc)| doc.get("type").and_then(Value::as_str) == Some(tag))
                .cloned()
                .collect();
            group.sort_by_key(|(_, doc)| id_order(doc));
            ordered.extend(group);
        }
        // documents of since-unregistered kinds keep a place at the end
        for (key, doc) in &entries {
            if !ordered.iter().any(|(ordered_key, _)| ordered_key == key) {
                ordered.push((key.clone(), doc.clone()));
            }
        }
        info!(entries = ordered.len(), "rewriting store in sorted order");
        self.persistor.wipe()?;
        for (key, doc) in ordered {
            self.persistor.write(&key, &doc)?;
        }
        Ok(())
    }

    /// The whole store as one JSON object of key→document pairs.
    pub fn to_json(&self) -> Result<Value> {
        let mut map = Map::new();
        for (key, doc) in self.persistor.entries()? {
            map.insert(key, Value::Object(doc));
        }
        Ok(Value::Object(map))
    }

    // ------------- Private utils -------------

    fn ensure_registered(&self, tag: &str) -> Result<()> {
        if self.kinds.contains(tag) {
            Ok(())
        } else {
            Err(LarderError::UnregisteredKind { kind: tag.to_owned() })
        }
    }

    // an unregistered filter falls back to everything
    fn kind_filter<'a>(&self, kind: Option<&'a str>) -> &'a str {
        match kind {
            Some(tag) if self.kinds.contains(tag) => tag,
            _ => ALL,
        }
    }

    fn archive_path(&self, name: Option<&str>) -> PathBuf {
        let stem = name.unwrap_or(&self.name);
        self.data_dir.join(format!("{stem}.{ARCHIVE_EXT}"))
    }

    /// Validates the trust invariant and instantiates the document into its
    /// registered kind; tags unwrap to their resolved payload.
    fn construct(&self, doc: Document) -> Result<Fetched> {
        let tag = doc
            .get("type")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .ok_or(LarderError::UntypedDocument)?
            .to_owned();
        let kind = *self
            .kinds
            .get(&tag)
            .ok_or_else(|| LarderError::UnregisteredKind { kind: tag.clone() })?;
        let entry = self.resolve(kind, doc)?;
        if kind.tag == Tag::KIND {
            Ok(Fetched::Data(unwrap_tag(&entry)))
        } else {
            Ok(Fetched::Entry(entry))
        }
    }

    // ------------- Foreign-key resolution -------------

    /// Constructs a record from its raw document, resolving every declared
    /// foreign-key field. Resolution happens only in memory; nothing
    /// resolved is ever persisted.
    fn resolve(&self, kind: Kind, doc: Document) -> Result<Entry> {
        let id = Id::from_value(doc.get("id").unwrap_or(&Value::Null))?;
        let mut links = Vec::with_capacity(kind.foreign_keys.len());
        for fk in kind.foreign_keys {
            let linked = match doc.get(fk.raw) {
                None | Some(Value::Null) => Linked::Unresolved,
                Some(Value::String(s)) if s.is_empty() => Linked::Unresolved,
                Some(Value::Array(keys)) if keys.is_empty() => Linked::Unresolved,
                Some(Value::String(s)) => {
                    if query::params(s).is_some() {
                        // a query always yields a collection, even an empty one
                        Linked::Many(self.query_all(s)?)
                    } else {
                        let referent = self
                            .exists(s)
                            .ok_or_else(|| LarderError::MissingKey { key: s.clone() })?;
                        Linked::One(Box::new(referent))
                    }
                }
                Some(Value::Array(keys)) => {
                    let mut referents = Vec::with_capacity(keys.len());
                    for key in keys {
                        let key = key.as_str().ok_or_else(|| {
                            LarderError::Argument(format!(
                                "foreign keys under `{}` must be strings",
                                fk.raw
                            ))
                        })?;
                        let referent = self
                            .exists(key)
                            .ok_or_else(|| LarderError::MissingKey { key: key.to_owned() })?;
                        referents.push(referent);
                    }
                    Linked::Many(referents)
                }
                Some(other) => {
                    return Err(LarderError::Argument(format!(
                        "`{}` must hold a key, a list of keys, or a query, not `{other}`",
                        fk.raw
                    )));
                }
            };
            links.push((fk.resolved, linked));
        }
        Ok(Entry::new(kind, id, doc, links))
    }
}

impl fmt::Display for Store {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let pretty = self
            .to_json()
            .ok()
            .and_then(|json| serde_json::to_string_pretty(&json).ok())
            .unwrap_or_else(|| "{}".to_owned());
        write!(f, "{pretty}")
    }
}

// ------------- Helpers -------------

// the document a condition expression is checked against: the raw document
// for records, the payload for tags
fn condition_target(fetched: &Fetched) -> Document {
    match fetched {
        Fetched::Entry(entry) => entry.document().clone(),
        Fetched::Data(Value::Object(map)) => map.clone(),
        Fetched::Data(other) => {
            let mut map = Document::new();
            map.insert("data".to_owned(), other.clone());
            map
        }
    }
}

fn unwrap_tag(entry: &Entry) -> Value {
    match entry.link("data") {
        Some(Linked::Unresolved) | None => entry
            .document()
            .get("data")
            .cloned()
            .unwrap_or(Value::Null),
        Some(linked) => linked.to_value(),
    }
}

fn id_order(doc: &Document) -> (u8, i64, String) {
    match doc.get("id") {
        Some(Value::Number(n)) => (0, n.as_i64().unwrap_or(i64::MAX), String::new()),
        Some(Value::String(s)) => (1, 0, s.clone()),
        _ => (2, 0, String::new()),
    }
}
