// used for persistence
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::path::PathBuf;

use crate::record::Document;
use crate::{LarderError, Result};

/// Where the key→document mapping lives.
#[derive(Clone, Debug)]
pub enum PersistenceMode {
    InMemory,
    File(PathBuf),
}

// ------------- Persistence -------------

/// The file-backed key→document mapping.
///
/// One table, one row per record; documents are stored as single-line JSON
/// text. Iteration follows rowid order, which is what makes [`sort`] in the
/// store observable.
///
/// [`sort`]: crate::store::Store::sort
pub struct Persistor {
    db: Connection,
}

impl Persistor {
    pub fn new(mode: PersistenceMode) -> Result<Persistor> {
        let db = match mode {
            PersistenceMode::InMemory => Connection::open_in_memory()?,
            PersistenceMode::File(path) => Connection::open(path)?,
        };
        db.execute_batch(
            "
            create table if not exists Entry (
                Entry_Key text not null,
                Document text not null,
                constraint unique_and_referenceable_Entry_Key primary key (
                    Entry_Key
                )
            );
            ",
        )?;
        Ok(Persistor { db })
    }

    pub fn read(&self, key: &str) -> Result<Option<Document>> {
        let mut statement = self.db.prepare_cached(
            "
                select Document
                    from Entry
                    where Entry_Key = ?
            ",
        )?;
        let text: Option<String> = statement
            .query_row(params![key], |row| row.get(0))
            .optional()?;
        match text {
            Some(text) => Ok(Some(decode_document(&text)?)),
            None => Ok(None),
        }
    }

    pub fn write(&self, key: &str, doc: &Document) -> Result<()> {
        let text = serde_json::to_string(doc)?;
        let mut statement = self.db.prepare_cached(
            "
                insert into Entry (
                    Entry_Key,
                    Document
                ) values (?, ?)
                on conflict (Entry_Key) do update set Document = excluded.Document
            ",
        )?;
        statement.execute(params![key, text])?;
        Ok(())
    }

    /// Removes a key, handing back the document it held.
    pub fn remove(&self, key: &str) -> Result<Option<Document>> {
        let prior = self.read(key)?;
        if prior.is_some() {
            let mut statement = self.db.prepare_cached(
                "
                    delete from Entry
                        where Entry_Key = ?
                ",
            )?;
            statement.execute(params![key])?;
        }
        Ok(prior)
    }

    pub fn contains(&self, key: &str) -> Result<bool> {
        let mut statement = self.db.prepare_cached(
            "
                select 1
                    from Entry
                    where Entry_Key = ?
            ",
        )?;
        let found: Option<i64> = statement
            .query_row(params![key], |row| row.get(0))
            .optional()?;
        Ok(found.is_some())
    }

    pub fn keys(&self) -> Result<Vec<String>> {
        let mut statement = self.db.prepare_cached(
            "
                select Entry_Key
                    from Entry
                    order by rowid
            ",
        )?;
        let keys = statement
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(keys)
    }

    pub fn entries(&self) -> Result<Vec<(String, Document)>> {
        let mut statement = self.db.prepare_cached(
            "
                select Entry_Key, Document
                    from Entry
                    order by rowid
            ",
        )?;
        let rows = statement
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<std::result::Result<Vec<(String, String)>, _>>()?;
        let mut entries = Vec::with_capacity(rows.len());
        for (key, text) in rows {
            entries.push((key, decode_document(&text)?));
        }
        Ok(entries)
    }

    pub fn len(&self) -> Result<usize> {
        let mut statement = self.db.prepare_cached(
            "
                select count(*)
                    from Entry
            ",
        )?;
        let count: i64 = statement.query_row([], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Empties the mapping.
    pub fn wipe(&self) -> Result<()> {
        self.db.execute("delete from Entry", [])?;
        Ok(())
    }
}

fn decode_document(text: &str) -> Result<Document> {
    match serde_json::from_str::<Value>(text)? {
        Value::Object(map) => Ok(map),
        _ => Err(LarderError::Persistence(
            "stored document is not a JSON object".to_owned(),
        )),
    }
}
