//! MongoDB backend over the driver's synchronous API.
//!
//! The driver ships its own `bson` major version; documents cross over through their shared
//! binary encoding.

use bson::{Bson, Document as BsonDocument, doc};
use mongodb::bson as driver_bson;
use mongodb::error::{Error as DriverError, ErrorKind};
use mongodb::sync::{Client, Collection as DriverCollection};

use crate::catalog::{FindSpec, IndexOptions, UpdateOptions, Verbosity};
use crate::errors::DbError;
use crate::index::default_index_name;
use crate::num;
use crate::query::{Cursor, DeleteReport, IndexDescription, IndexReport, InsertReport, UpdateReport, direction};
use crate::store::{DocumentStore, Namespace};

fn map_err(e: &DriverError) -> DbError {
    match e.kind.as_ref() {
        ErrorKind::ServerSelection { .. }
        | ErrorKind::Authentication { .. }
        | ErrorKind::DnsResolve { .. }
        | ErrorKind::ConnectionPoolCleared { .. }
        | ErrorKind::Io(_) => DbError::Connection(e.to_string()),
        _ => DbError::Operation(e.to_string()),
    }
}

fn driver_result<T>(r: Result<T, DriverError>) -> Result<T, DbError> {
    r.map_err(|e| map_err(&e))
}

fn to_driver(doc: &BsonDocument) -> Result<driver_bson::Document, DbError> {
    let mut bytes = Vec::new();
    doc.to_writer(&mut bytes)?;
    driver_bson::Document::from_reader(bytes.as_slice()).map_err(|e| DbError::Operation(e.to_string()))
}

fn from_driver(doc: &driver_bson::Document) -> Result<BsonDocument, DbError> {
    let mut bytes = Vec::new();
    doc.to_writer(&mut bytes).map_err(|e| DbError::Operation(e.to_string()))?;
    Ok(BsonDocument::from_reader(bytes.as_slice())?)
}

fn value_from_driver(v: driver_bson::Bson) -> Result<Bson, DbError> {
    let mut wrapped = from_driver(&driver_bson::doc! { "v": v })?;
    Ok(wrapped.remove("v").unwrap_or(Bson::Null))
}

fn i64_of(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

pub struct MongoStore {
    client: Client,
}

impl std::fmt::Debug for MongoStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MongoStore").finish_non_exhaustive()
    }
}

impl MongoStore {
    /// Builds a client for `uri`. The server is not contacted until [`DocumentStore::ping`].
    ///
    /// # Errors
    /// `DbError::Connection` when the URI cannot be parsed or resolved.
    pub fn connect(uri: &str) -> Result<Self, DbError> {
        let client = Client::with_uri_str(uri).map_err(|e| DbError::Connection(e.to_string()))?;
        Ok(Self { client })
    }

    fn collection(&self, ns: &Namespace) -> DriverCollection<driver_bson::Document> {
        self.client.database(&ns.database).collection(&ns.collection)
    }

    fn command(&self, database: &str, cmd: &BsonDocument) -> Result<BsonDocument, DbError> {
        let reply = driver_result(self.client.database(database).run_command(to_driver(cmd)?).run())?;
        from_driver(&reply)
    }
}

fn find_command(ns: &Namespace, spec: &FindSpec) -> BsonDocument {
    let mut cmd = doc! { "find": ns.collection.clone(), "filter": spec.filter.clone() };
    if let Some(p) = &spec.projection {
        cmd.insert("projection", p.clone());
    }
    if let Some(s) = &spec.sort {
        cmd.insert("sort", s.clone());
    }
    if let Some(n) = spec.skip {
        cmd.insert("skip", i64_of(n));
    }
    if let Some(n) = spec.limit.filter(|n| *n != 0) {
        cmd.insert("limit", n.saturating_abs());
    }
    cmd
}

impl DocumentStore for MongoStore {
    fn kind(&self) -> &'static str {
        "mongodb"
    }

    fn ping(&self) -> Result<(), DbError> {
        self.command("admin", &doc! { "ping": 1 }).map(|_| ())
    }

    fn find(&self, ns: &Namespace, spec: &FindSpec) -> Result<Cursor, DbError> {
        let coll = self.collection(ns);
        let mut action = coll.find(to_driver(&spec.filter)?);
        if let Some(p) = &spec.projection {
            action = action.projection(to_driver(p)?);
        }
        if let Some(s) = &spec.sort {
            action = action.sort(to_driver(s)?);
        }
        if let Some(n) = spec.skip {
            action = action.skip(n);
        }
        if let Some(n) = spec.limit {
            action = action.limit(n);
        }
        let mut docs = Vec::new();
        for d in driver_result(action.run())? {
            docs.push(from_driver(&driver_result(d)?)?);
        }
        Ok(Cursor::new(docs))
    }

    fn count_documents(&self, ns: &Namespace, filter: &BsonDocument) -> Result<u64, DbError> {
        driver_result(self.collection(ns).count_documents(to_driver(filter)?).run())
    }

    fn insert_many(&self, ns: &Namespace, docs: Vec<BsonDocument>) -> Result<InsertReport, DbError> {
        let docs = docs.iter().map(to_driver).collect::<Result<Vec<_>, _>>()?;
        let result = driver_result(self.collection(ns).insert_many(docs).run())?;
        let mut ids: Vec<(usize, driver_bson::Bson)> = result.inserted_ids.into_iter().collect();
        ids.sort_by_key(|(i, _)| *i);
        let inserted_ids = ids.into_iter().map(|(_, id)| value_from_driver(id)).collect::<Result<_, _>>()?;
        Ok(InsertReport { inserted_ids })
    }

    fn update_one(
        &self,
        ns: &Namespace,
        filter: &BsonDocument,
        update: &BsonDocument,
        options: &UpdateOptions,
    ) -> Result<UpdateReport, DbError> {
        let result = driver_result(
            self.collection(ns)
                .update_one(to_driver(filter)?, to_driver(update)?)
                .upsert(options.upsert)
                .run(),
        )?;
        Ok(UpdateReport {
            matched: result.matched_count,
            modified: result.modified_count,
            upserted_id: result.upserted_id.map(value_from_driver).transpose()?,
        })
    }

    fn delete_one(&self, ns: &Namespace, filter: &BsonDocument) -> Result<DeleteReport, DbError> {
        let result = driver_result(self.collection(ns).delete_one(to_driver(filter)?).run())?;
        Ok(DeleteReport { deleted: result.deleted_count })
    }

    fn aggregate(&self, ns: &Namespace, pipeline: &[BsonDocument]) -> Result<Vec<BsonDocument>, DbError> {
        let pipeline = pipeline.iter().map(to_driver).collect::<Result<Vec<_>, _>>()?;
        let mut out = Vec::new();
        for d in driver_result(self.collection(ns).aggregate(pipeline).run())? {
            out.push(from_driver(&driver_result(d)?)?);
        }
        Ok(out)
    }

    fn create_index(
        &self,
        ns: &Namespace,
        keys: &BsonDocument,
        options: &IndexOptions,
    ) -> Result<IndexReport, DbError> {
        let name = match &options.name {
            Some(n) => n.clone(),
            None => {
                let pairs = keys
                    .iter()
                    .map(|(f, v)| {
                        direction(v)
                            .map(|d| (f.clone(), d))
                            .ok_or_else(|| DbError::op(format!("unsupported index direction {v} for {f}")))
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                default_index_name(&pairs)
            }
        };
        let mut index = doc! { "key": keys.clone(), "name": name.clone() };
        if options.unique {
            index.insert("unique", true);
        }
        let reply = self.command(
            &ns.database,
            &doc! { "createIndexes": ns.collection.clone(), "indexes": [index] },
        )?;
        let count = |k: &str| reply.get(k).and_then(num::bson_to_i64).unwrap_or(0);
        Ok(IndexReport { name, created: count("numIndexesAfter") > count("numIndexesBefore") })
    }

    fn list_indexes(&self, ns: &Namespace) -> Result<Vec<IndexDescription>, DbError> {
        let mut out = Vec::new();
        for model in driver_result(self.collection(ns).list_indexes().run())? {
            let model = driver_result(model)?;
            let opts = model.options.unwrap_or_default();
            out.push(IndexDescription {
                name: opts.name.unwrap_or_default(),
                key: from_driver(&model.keys)?,
                unique: opts.unique == Some(true),
            });
        }
        Ok(out)
    }

    fn explain(&self, ns: &Namespace, spec: &FindSpec, verbosity: Verbosity) -> Result<BsonDocument, DbError> {
        let mut reply = self.command(
            &ns.database,
            &doc! { "explain": find_command(ns, spec), "verbosity": verbosity.as_str() },
        )?;
        reply.remove("ok");
        Ok(reply)
    }

    fn shutdown(&self) {
        log::debug!("mongodb client released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn documents_cross_versions() {
        let d = doc! { "title": "Animal Farm", "price": 9.99, "tags": ["a", 1], "nested": { "x": true } };
        assert_eq!(from_driver(&to_driver(&d).unwrap()).unwrap(), d);
    }

    #[test]
    fn explain_find_command_shape() {
        let ns = Namespace::new("plp_bookstore", "books");
        let cmd = find_command(&ns, &FindSpec::new(doc! {"title": "x"}).skip(5).limit(-5));
        assert_eq!(cmd.get_str("find").unwrap(), "books");
        assert_eq!(cmd.get_i64("skip").unwrap(), 5);
        assert_eq!(cmd.get_i64("limit").unwrap(), 5);
    }
}
