use bookstore_queries::{
    BOOKS, FindSpec, Operation, OperationKind, OperationSpec, Verbosity, bookstore_catalog,
};
use bson::doc;
use std::collections::HashSet;

#[test]
fn catalog_shape_and_order() {
    use OperationKind::{Aggregate, CreateIndex, DeleteOne, Explain, Find, UpdateOne};
    let catalog = bookstore_catalog();
    let kinds: Vec<OperationKind> = catalog.iter().map(Operation::kind).collect();
    assert_eq!(
        kinds,
        [
            Find, Find, Find, UpdateOne, DeleteOne, Find, Find, Find, Find, Find, Find, Aggregate, Aggregate,
            Aggregate, CreateIndex, CreateIndex, Explain, Explain,
        ]
    );
    assert!(catalog.iter().all(|op| op.collection() == BOOKS));
    let names: HashSet<&str> = catalog.iter().map(Operation::name).collect();
    assert_eq!(names.len(), catalog.len());
    assert_eq!(catalog[0].name(), "fiction_books");
    assert_eq!(catalog[17].name(), "explain_author_year_lookup");
}

#[test]
fn parameters_are_kept_verbatim() {
    let catalog = bookstore_catalog();
    assert_eq!(catalog[1].filter(), Some(&doc! {"published_year": {"$gt": 2000}}));
    assert_eq!(catalog[5].filter(), Some(&doc! {"in_stock": true, "published_year": {"$gt": 2010}}));
    assert!(catalog[11].filter().is_none());

    let OperationSpec::Find(page) = catalog[10].spec() else { panic!("second_page is a find") };
    assert_eq!((page.skip, page.limit), (Some(5), Some(5)));
    let OperationSpec::CreateIndex { keys, options } = catalog[15].spec() else { panic!("expected createIndex") };
    let fields: Vec<&str> = keys.keys().map(String::as_str).collect();
    assert_eq!(fields, ["author", "published_year"]);
    assert_eq!(keys.get_i32("published_year").unwrap(), -1);
    assert!(!options.unique);
    let OperationSpec::Explain { verbosity, .. } = catalog[16].spec() else { panic!("expected explain") };
    assert_eq!(*verbosity, Verbosity::ExecutionStats);
}

#[test]
fn kinds_render_like_shell_methods() {
    assert_eq!(OperationKind::UpdateOne.to_string(), "updateOne");
    assert_eq!(OperationKind::CreateIndex.as_str(), "createIndex");
    assert!(OperationKind::DeleteOne.is_write());
    assert!(!OperationKind::Explain.is_write());
    assert_eq!(Verbosity::default().as_str(), "executionStats");
    assert!(!Verbosity::QueryPlanner.includes_stats());
}

#[test]
fn builders_construct_independent_specs() {
    let base = FindSpec::new(doc! {"genre": "Fiction"});
    let paged = base.clone().skip(2).limit(3).sort(doc! {"price": 1});
    assert_eq!(base.skip, None);
    assert_eq!(paged.filter, base.filter);
    assert_eq!(paged.sort, Some(doc! {"price": 1}));
    let op = Operation::find("custom", "magazines", paged.clone());
    assert_eq!(op.collection(), "magazines");
    assert_eq!(op.spec(), &OperationSpec::Find(paged));
}
