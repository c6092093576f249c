//! Named operations and the bookstore catalog.
//!
//! An [`Operation`] is immutable once built; its parameters are stored exactly as given and handed
//! to the store untouched.

use bson::{Document as BsonDocument, doc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const BOOKS: &str = "books";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationKind {
    Find,
    UpdateOne,
    DeleteOne,
    Aggregate,
    CreateIndex,
    Explain,
}

impl OperationKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Find => "find",
            Self::UpdateOne => "updateOne",
            Self::DeleteOne => "deleteOne",
            Self::Aggregate => "aggregate",
            Self::CreateIndex => "createIndex",
            Self::Explain => "explain",
        }
    }

    #[must_use]
    pub const fn is_write(self) -> bool {
        matches!(self, Self::UpdateOne | Self::DeleteOne | Self::CreateIndex)
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters of a find: filter plus optional projection, sort and pagination.
///
/// `limit` follows the store's convention: `0` means no limit and a negative value uses its
/// absolute value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindSpec {
    pub filter: BsonDocument,
    pub projection: Option<BsonDocument>,
    pub sort: Option<BsonDocument>,
    pub skip: Option<u64>,
    pub limit: Option<i64>,
}

impl FindSpec {
    #[must_use]
    pub fn new(filter: BsonDocument) -> Self {
        Self { filter, ..Self::default() }
    }

    #[must_use]
    pub fn projection(mut self, projection: BsonDocument) -> Self {
        self.projection = Some(projection);
        self
    }

    #[must_use]
    pub fn sort(mut self, sort: BsonDocument) -> Self {
        self.sort = Some(sort);
        self
    }

    #[must_use]
    pub const fn skip(mut self, n: u64) -> Self {
        self.skip = Some(n);
        self
    }

    #[must_use]
    pub const fn limit(mut self, n: i64) -> Self {
        self.limit = Some(n);
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateOptions {
    pub upsert: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexOptions {
    pub name: Option<String>,
    pub unique: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verbosity {
    QueryPlanner,
    #[default]
    ExecutionStats,
    AllPlansExecution,
}

impl Verbosity {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::QueryPlanner => "queryPlanner",
            Self::ExecutionStats => "executionStats",
            Self::AllPlansExecution => "allPlansExecution",
        }
    }

    #[must_use]
    pub const fn includes_stats(self) -> bool {
        !matches!(self, Self::QueryPlanner)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum OperationSpec {
    Find(FindSpec),
    UpdateOne { filter: BsonDocument, update: BsonDocument, options: UpdateOptions },
    DeleteOne { filter: BsonDocument },
    Aggregate { pipeline: Vec<BsonDocument> },
    CreateIndex { keys: BsonDocument, options: IndexOptions },
    Explain { find: FindSpec, verbosity: Verbosity },
}

impl OperationSpec {
    #[must_use]
    pub const fn kind(&self) -> OperationKind {
        match self {
            Self::Find(_) => OperationKind::Find,
            Self::UpdateOne { .. } => OperationKind::UpdateOne,
            Self::DeleteOne { .. } => OperationKind::DeleteOne,
            Self::Aggregate { .. } => OperationKind::Aggregate,
            Self::CreateIndex { .. } => OperationKind::CreateIndex,
            Self::Explain { .. } => OperationKind::Explain,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    name: String,
    collection: String,
    spec: OperationSpec,
}

impl Operation {
    #[must_use]
    pub fn new(name: impl Into<String>, collection: impl Into<String>, spec: OperationSpec) -> Self {
        Self { name: name.into(), collection: collection.into(), spec }
    }

    #[must_use]
    pub fn find(name: impl Into<String>, collection: impl Into<String>, find: FindSpec) -> Self {
        Self::new(name, collection, OperationSpec::Find(find))
    }

    #[must_use]
    pub fn update_one(
        name: impl Into<String>,
        collection: impl Into<String>,
        filter: BsonDocument,
        update: BsonDocument,
    ) -> Self {
        Self::new(name, collection, OperationSpec::UpdateOne { filter, update, options: UpdateOptions::default() })
    }

    #[must_use]
    pub fn delete_one(name: impl Into<String>, collection: impl Into<String>, filter: BsonDocument) -> Self {
        Self::new(name, collection, OperationSpec::DeleteOne { filter })
    }

    #[must_use]
    pub fn aggregate(
        name: impl Into<String>,
        collection: impl Into<String>,
        pipeline: Vec<BsonDocument>,
    ) -> Self {
        Self::new(name, collection, OperationSpec::Aggregate { pipeline })
    }

    #[must_use]
    pub fn create_index(name: impl Into<String>, collection: impl Into<String>, keys: BsonDocument) -> Self {
        Self::new(name, collection, OperationSpec::CreateIndex { keys, options: IndexOptions::default() })
    }

    #[must_use]
    pub fn explain(
        name: impl Into<String>,
        collection: impl Into<String>,
        find: FindSpec,
        verbosity: Verbosity,
    ) -> Self {
        Self::new(name, collection, OperationSpec::Explain { find, verbosity })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    #[must_use]
    pub const fn kind(&self) -> OperationKind {
        self.spec.kind()
    }

    #[must_use]
    pub const fn spec(&self) -> &OperationSpec {
        &self.spec
    }

    /// The operation's filter, if its kind has one.
    #[must_use]
    pub const fn filter(&self) -> Option<&BsonDocument> {
        match &self.spec {
            OperationSpec::Find(f) | OperationSpec::Explain { find: f, .. } => Some(&f.filter),
            OperationSpec::UpdateOne { filter, .. } | OperationSpec::DeleteOne { filter } => Some(filter),
            OperationSpec::Aggregate { .. } | OperationSpec::CreateIndex { .. } => None,
        }
    }
}

/// The bookstore query catalog, in the order it is meant to run.
#[must_use]
pub fn bookstore_catalog() -> Vec<Operation> {
    vec![
        // Basic CRUD
        Operation::find("fiction_books", BOOKS, FindSpec::new(doc! { "genre": "Fiction" })),
        Operation::find(
            "published_after_2000",
            BOOKS,
            FindSpec::new(doc! { "published_year": { "$gt": 2000 } }),
        ),
        Operation::find("books_by_orwell", BOOKS, FindSpec::new(doc! { "author": "George Orwell" })),
        Operation::update_one(
            "reprice_animal_farm",
            BOOKS,
            doc! { "title": "Animal Farm" },
            doc! { "$set": { "price": 9.99 } },
        ),
        Operation::delete_one("delete_moby_dick", BOOKS, doc! { "title": "Moby Dick" }),
        // Advanced queries
        Operation::find(
            "in_stock_after_2010",
            BOOKS,
            FindSpec::new(doc! { "in_stock": true, "published_year": { "$gt": 2010 } }),
        ),
        Operation::find(
            "fiction_title_author_price",
            BOOKS,
            FindSpec::new(doc! { "genre": "Fiction" })
                .projection(doc! { "title": 1, "author": 1, "price": 1, "_id": 0 }),
        ),
        Operation::find("price_ascending", BOOKS, FindSpec::new(doc! {}).sort(doc! { "price": 1 })),
        Operation::find("price_descending", BOOKS, FindSpec::new(doc! {}).sort(doc! { "price": -1 })),
        Operation::find("first_page", BOOKS, FindSpec::new(doc! {}).limit(5)),
        Operation::find("second_page", BOOKS, FindSpec::new(doc! {}).skip(5).limit(5)),
        // Aggregation
        Operation::aggregate(
            "avg_price_by_genre",
            BOOKS,
            vec![doc! { "$group": { "_id": "$genre", "avgPrice": { "$avg": "$price" } } }],
        ),
        Operation::aggregate(
            "most_prolific_author",
            BOOKS,
            vec![
                doc! { "$group": { "_id": "$author", "count": { "$sum": 1 } } },
                doc! { "$sort": { "count": -1 } },
                doc! { "$limit": 1 },
            ],
        ),
        Operation::aggregate(
            "books_by_decade",
            BOOKS,
            vec![
                doc! { "$project": {
                    "decade": { "$concat": [
                        { "$toString": { "$subtract": [
                            { "$subtract": ["$published_year", { "$mod": ["$published_year", 10] }] },
                            0
                        ] } },
                        "s"
                    ] }
                } },
                doc! { "$group": { "_id": "$decade", "count": { "$sum": 1 } } },
                doc! { "$sort": { "_id": 1 } },
            ],
        ),
        // Indexing
        Operation::create_index("index_title", BOOKS, doc! { "title": 1 }),
        Operation::create_index("index_author_year", BOOKS, doc! { "author": 1, "published_year": -1 }),
        Operation::explain(
            "explain_title_lookup",
            BOOKS,
            FindSpec::new(doc! { "title": "Animal Farm" }),
            Verbosity::ExecutionStats,
        ),
        Operation::explain(
            "explain_author_year_lookup",
            BOOKS,
            FindSpec::new(doc! { "author": "George Orwell", "published_year": 1945 }),
            Verbosity::ExecutionStats,
        ),
    ]
}
