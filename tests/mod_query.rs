use bookstore_queries::collection::Collection;
use bookstore_queries::query::{
    Filter, FindOptions, Order, Projection, compare_bson, count_docs, eval_filter, find_docs, parse_filter,
    parse_projection, parse_sort,
};
use bookstore_queries::{DocumentStore, FindSpec, Namespace, engine::Engine, seed::sample_books};
use bson::{Bson, doc};

fn books() -> Collection {
    let col = Collection::new("books".into());
    for b in sample_books() {
        col.insert_document(b).unwrap();
    }
    col
}

fn titles(docs: &[bson::Document]) -> Vec<String> {
    docs.iter().map(|d| d.get_str("title").unwrap().to_string()).collect()
}

#[test]
fn implicit_equality_and_ranges() {
    let col = books();
    let f = parse_filter(&doc! {"genre": "Fiction"}).unwrap();
    assert_eq!(count_docs(&col, &f), 4);
    let f = parse_filter(&doc! {"published_year": {"$gt": 2000}}).unwrap();
    assert_eq!(count_docs(&col, &f), 0);
    let f = parse_filter(&doc! {"published_year": {"$gte": 1945, "$lt": 1955}}).unwrap();
    assert_eq!(count_docs(&col, &f), 4);
    let f = parse_filter(&doc! {"in_stock": true, "published_year": {"$gt": 1950}}).unwrap();
    assert_eq!(count_docs(&col, &f), 4);
}

#[test]
fn ranges_stay_within_type_bracket() {
    let col = Collection::new("mixed".into());
    col.insert_document(doc! {"v": 5}).unwrap();
    col.insert_document(doc! {"v": "5"}).unwrap();
    col.insert_document(doc! {"v": 7.5}).unwrap();
    let f = parse_filter(&doc! {"v": {"$gt": 1}}).unwrap();
    assert_eq!(count_docs(&col, &f), 2);
    let f = parse_filter(&doc! {"v": {"$gte": ""}}).unwrap();
    assert_eq!(count_docs(&col, &f), 1);
}

#[test]
fn arrays_match_any_element() {
    let d = doc! {"tags": ["classic", "dystopia"], "meta": {"rating": 4}};
    assert!(eval_filter(&d, &parse_filter(&doc! {"tags": "dystopia"}).unwrap()));
    assert!(eval_filter(&d, &parse_filter(&doc! {"tags": {"$in": ["x", "classic"]}}).unwrap()));
    assert!(!eval_filter(&d, &parse_filter(&doc! {"tags": {"$nin": ["classic"]}}).unwrap()));
    assert!(eval_filter(&d, &parse_filter(&doc! {"meta.rating": {"$lte": 4}}).unwrap()));
    assert!(eval_filter(&d, &parse_filter(&doc! {"missing": null}).unwrap()));
    assert!(eval_filter(&d, &parse_filter(&doc! {"missing": {"$exists": false}}).unwrap()));

    let r = doc! {"reviews": [{"rating": 3}, {"rating": 5}], "tags": ["a", "b"]};
    assert!(eval_filter(&r, &parse_filter(&doc! {"reviews.rating": 5}).unwrap()));
    assert!(eval_filter(&r, &parse_filter(&doc! {"reviews.rating": {"$gt": 4}}).unwrap()));
    assert!(!eval_filter(&r, &parse_filter(&doc! {"reviews.rating": {"$gt": 5}}).unwrap()));
    assert!(eval_filter(&r, &parse_filter(&doc! {"reviews.rating": {"$exists": true}}).unwrap()));
    assert!(eval_filter(&r, &parse_filter(&doc! {"reviews.1.rating": 5}).unwrap()));
    assert!(!eval_filter(&r, &parse_filter(&doc! {"reviews.0.rating": 5}).unwrap()));
    assert!(eval_filter(&r, &parse_filter(&doc! {"tags.1": "b"}).unwrap()));
}

#[test]
fn logical_operators() {
    let col = books();
    let f = parse_filter(&doc! {"$or": [{"author": "George Orwell"}, {"genre": "Fantasy"}]}).unwrap();
    assert_eq!(count_docs(&col, &f), 4);
    let f = parse_filter(&doc! {"$nor": [{"genre": "Fiction"}, {"in_stock": false}]}).unwrap();
    assert_eq!(count_docs(&col, &f), 5);
    let f = parse_filter(&doc! {"price": {"$not": {"$gt": 10}}}).unwrap();
    assert_eq!(count_docs(&col, &f), 5);
    assert!(matches!(parse_filter(&doc! {}).unwrap(), Filter::True));
}

#[test]
fn malformed_filters_are_rejected() {
    assert!(parse_filter(&doc! {"$where": "1"}).unwrap_err().is_operation());
    assert!(parse_filter(&doc! {"a": {"$in": 1}}).is_err());
    assert!(parse_filter(&doc! {"$or": []}).is_err());
    assert!(parse_filter(&doc! {"a": {"$size": 1}}).is_err());
}

#[test]
fn oversized_in_lists_are_rejected() {
    let too_many: Vec<i32> = (0..=1000).collect();
    assert!(parse_filter(&doc! {"n": {"$in": too_many.clone()}}).unwrap_err().is_operation());
    assert!(parse_filter(&doc! {"n": {"$nin": too_many}}).unwrap_err().is_operation());

    let at_limit: Vec<i32> = (0..1000).collect();
    let f = parse_filter(&doc! {"n": {"$in": at_limit}}).unwrap();
    assert!(eval_filter(&doc! {"n": 999}, &f));
}

#[test]
fn embedded_documents_compare_field_names_first() {
    use std::cmp::Ordering;
    let a9 = Bson::Document(doc! {"a": 9});
    let b1 = Bson::Document(doc! {"b": 1});
    assert_eq!(compare_bson(&a9, &b1), Ordering::Less);
    assert_eq!(compare_bson(&b1, &a9), Ordering::Greater);
    assert_eq!(compare_bson(&Bson::Document(doc! {"a": 1}), &Bson::Document(doc! {"a": 2})), Ordering::Less);
}

#[test]
fn projection_forms() {
    let p = parse_projection(&doc! {"title": 1, "author": 1, "price": 1, "_id": 0}).unwrap();
    assert_eq!(
        p,
        Projection::Include { fields: vec!["title".into(), "author".into(), "price".into()], keep_id: false }
    );
    let p = parse_projection(&doc! {"pages": 0}).unwrap();
    assert_eq!(p, Projection::Exclude { fields: vec!["pages".into()] });
    let err = parse_projection(&doc! {"title": 1, "pages": 0}).unwrap_err();
    assert!(err.to_string().contains("Cannot do exclusion on field pages"));
}

#[test]
fn sort_and_paginate() {
    let col = books();
    let opts = FindOptions { sort: Some(parse_sort(&doc! {"price": -1, "title": 1}).unwrap()), ..Default::default() };
    let (cursor, _) = find_docs(&col, &Filter::True, &opts);
    let docs = cursor.to_vec();
    assert_eq!(docs.first().unwrap().get_str("title").unwrap(), "The Lord of the Rings");
    assert_eq!(docs.last().unwrap().get_f64("price").unwrap(), 7.99);
    for w in docs.windows(2) {
        assert!(w[0].get_f64("price").unwrap() >= w[1].get_f64("price").unwrap());
    }

    let opts = FindOptions { skip: Some(10), limit: Some(5), ..Default::default() };
    let (cursor, stats) = find_docs(&col, &Filter::True, &opts);
    assert_eq!(cursor.len(), 2);
    assert_eq!(stats.n_returned, 2);
    assert_eq!(stats.docs_examined, 12);
}

#[test]
fn missing_sort_keys_come_first() {
    let col = Collection::new("s".into());
    col.insert_document(doc! {"name": "b", "rank": 2}).unwrap();
    col.insert_document(doc! {"name": "a"}).unwrap();
    col.insert_document(doc! {"name": "c", "rank": 1}).unwrap();
    let opts = FindOptions { sort: Some(parse_sort(&doc! {"rank": 1}).unwrap()), ..Default::default() };
    let (cursor, _) = find_docs(&col, &Filter::True, &opts);
    let names: Vec<String> = cursor.map(|d| d.get_str("name").unwrap().to_string()).collect();
    assert_eq!(names, ["a", "c", "b"]);
    assert_eq!(parse_sort(&doc! {"rank": -1}).unwrap()[0].order, Order::Desc);
}

#[test]
fn engine_find_limit_conventions() {
    let engine = Engine::new("query-tests");
    let ns = Namespace::new("plp_bookstore", "books");
    engine.insert_many(&ns, sample_books()).unwrap();
    let all = engine.find(&ns, &FindSpec::new(doc! {}).limit(0)).unwrap();
    assert_eq!(all.len(), 12);
    let three = engine.find(&ns, &FindSpec::new(doc! {}).limit(-3)).unwrap();
    assert_eq!(three.len(), 3);
    let projected = engine
        .find(&ns, &FindSpec::new(doc! {"genre": "Fiction"}).projection(doc! {"title": 1, "_id": 0}))
        .unwrap()
        .to_vec();
    assert_eq!(
        titles(&projected),
        ["To Kill a Mockingbird", "The Great Gatsby", "The Catcher in the Rye", "The Alchemist"]
    );
    assert!(projected.iter().all(|d| d.len() == 1));
}

#[test]
fn missing_collection_reads_empty() {
    let engine = Engine::new("query-missing");
    let ns = Namespace::new("plp_bookstore", "nothing");
    assert_eq!(engine.find(&ns, &FindSpec::new(doc! {})).unwrap().len(), 0);
    assert_eq!(engine.count_documents(&ns, &doc! {}).unwrap(), 0);
    assert!(engine.collection(&ns).is_none());
}

#[test]
fn inserted_ids_are_generated_and_unique() {
    let col = Collection::new("ids".into());
    let a = col.insert_document(doc! {"x": 1}).unwrap();
    assert!(matches!(a, Bson::ObjectId(_)));
    col.insert_document(doc! {"_id": 7, "x": 2}).unwrap();
    let err = col.insert_document(doc! {"_id": 7, "x": 3}).unwrap_err();
    assert!(err.to_string().contains("duplicate key"));
    let first = col.get_all_documents().remove(0);
    assert_eq!(first.keys().next().unwrap(), "_id");
}

#[cfg(feature = "regex")]
#[test]
fn regex_filters() {
    let col = books();
    let f = parse_filter(&doc! {"title": {"$regex": "^the", "$options": "i"}}).unwrap();
    assert_eq!(count_docs(&col, &f), 5);
}
