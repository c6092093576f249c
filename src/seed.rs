//! The sample `books` collection the catalog was written against.

use bson::{Document as BsonDocument, doc};

use crate::catalog::BOOKS;
use crate::connection::Connection;
use crate::errors::DbError;
use crate::query::InsertReport;

#[must_use]
pub fn sample_books() -> Vec<BsonDocument> {
    vec![
        doc! { "title": "To Kill a Mockingbird", "author": "Harper Lee", "genre": "Fiction", "published_year": 1960, "price": 12.99, "in_stock": true, "pages": 336, "publisher": "J. B. Lippincott & Co." },
        doc! { "title": "1984", "author": "George Orwell", "genre": "Dystopian", "published_year": 1949, "price": 10.99, "in_stock": true, "pages": 328, "publisher": "Secker & Warburg" },
        doc! { "title": "The Great Gatsby", "author": "F. Scott Fitzgerald", "genre": "Fiction", "published_year": 1925, "price": 9.99, "in_stock": true, "pages": 180, "publisher": "Charles Scribner's Sons" },
        doc! { "title": "Brave New World", "author": "Aldous Huxley", "genre": "Dystopian", "published_year": 1932, "price": 11.50, "in_stock": false, "pages": 311, "publisher": "Chatto & Windus" },
        doc! { "title": "The Hobbit", "author": "J.R.R. Tolkien", "genre": "Fantasy", "published_year": 1937, "price": 14.99, "in_stock": true, "pages": 310, "publisher": "George Allen & Unwin" },
        doc! { "title": "The Catcher in the Rye", "author": "J.D. Salinger", "genre": "Fiction", "published_year": 1951, "price": 8.99, "in_stock": true, "pages": 224, "publisher": "Little, Brown and Company" },
        doc! { "title": "Pride and Prejudice", "author": "Jane Austen", "genre": "Romance", "published_year": 1813, "price": 7.99, "in_stock": true, "pages": 432, "publisher": "T. Egerton" },
        doc! { "title": "The Lord of the Rings", "author": "J.R.R. Tolkien", "genre": "Fantasy", "published_year": 1954, "price": 19.99, "in_stock": true, "pages": 1178, "publisher": "Allen & Unwin" },
        doc! { "title": "Animal Farm", "author": "George Orwell", "genre": "Political Satire", "published_year": 1945, "price": 7.99, "in_stock": false, "pages": 112, "publisher": "Secker & Warburg" },
        doc! { "title": "The Alchemist", "author": "Paulo Coelho", "genre": "Fiction", "published_year": 1988, "price": 10.99, "in_stock": true, "pages": 197, "publisher": "HarperOne" },
        doc! { "title": "Moby Dick", "author": "Herman Melville", "genre": "Adventure", "published_year": 1851, "price": 12.50, "in_stock": false, "pages": 635, "publisher": "Harper & Brothers" },
        doc! { "title": "Wuthering Heights", "author": "Emily Brontë", "genre": "Gothic Fiction", "published_year": 1847, "price": 9.99, "in_stock": true, "pages": 342, "publisher": "Thomas Cautley Newby" },
    ]
}

/// Inserts [`sample_books`] into `books` of the connection's database.
///
/// # Errors
/// Propagates store errors, e.g. a duplicate `_id` when the documents carry one.
pub fn seed_books(conn: &Connection) -> Result<InsertReport, DbError> {
    let report = conn.store().insert_many(&conn.namespace(BOOKS), sample_books())?;
    log::info!("seeded {} books into {}", report.inserted_ids.len(), conn.namespace(BOOKS));
    Ok(report)
}
