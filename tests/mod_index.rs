use bookstore_queries::index::default_index_name;
use bookstore_queries::seed::sample_books;
use bookstore_queries::{DocumentStore, FindSpec, IndexOptions, Namespace, Verbosity, engine::Engine};
use bson::{Document, doc};

fn seeded(label: &str) -> (Engine, Namespace) {
    let engine = Engine::new(label);
    let ns = Namespace::new("plp_bookstore", "books");
    engine.insert_many(&ns, sample_books()).unwrap();
    (engine, ns)
}

fn stats(plan: &Document) -> &Document {
    plan.get_document("executionStats").unwrap()
}

fn winning(plan: &Document) -> &Document {
    plan.get_document("queryPlanner").unwrap().get_document("winningPlan").unwrap()
}

#[test]
fn default_names() {
    assert_eq!(default_index_name(&[("title".into(), 1)]), "title_1");
    assert_eq!(
        default_index_name(&[("author".into(), 1), ("published_year".into(), -1)]),
        "author_1_published_year_-1"
    );
}

#[test]
fn create_index_is_idempotent() {
    let (engine, ns) = seeded("index-idempotent");
    let first = engine.create_index(&ns, &doc! {"title": 1}, &IndexOptions::default()).unwrap();
    assert_eq!(first.name, "title_1");
    assert!(first.created);
    let second = engine.create_index(&ns, &doc! {"title": 1}, &IndexOptions::default()).unwrap();
    assert!(!second.created);
    let names: Vec<String> = engine.list_indexes(&ns).unwrap().into_iter().map(|i| i.name).collect();
    assert_eq!(names, ["_id_", "title_1"]);
    let id = engine.create_index(&ns, &doc! {"_id": 1}, &IndexOptions::default()).unwrap();
    assert_eq!(id.name, "_id_");
    assert!(!id.created);
}

#[test]
fn conflicting_declarations_fail() {
    let (engine, ns) = seeded("index-conflicts");
    let named = IndexOptions { name: Some("by_title".into()), unique: false };
    engine.create_index(&ns, &doc! {"title": 1}, &named).unwrap();
    let err = engine.create_index(&ns, &doc! {"author": 1}, &named).unwrap_err();
    assert!(err.to_string().contains("same name"));
    let err = engine.create_index(&ns, &doc! {"title": 1}, &IndexOptions::default()).unwrap_err();
    assert!(err.is_operation());
    assert!(engine.create_index(&ns, &doc! {"title": "text"}, &IndexOptions::default()).is_err());
    assert!(engine.create_index(&ns, &doc! {}, &IndexOptions::default()).is_err());
}

#[test]
fn unique_build_over_duplicates_fails() {
    let (engine, ns) = seeded("index-unique");
    let unique = IndexOptions { name: None, unique: true };
    let err = engine.create_index(&ns, &doc! {"author": 1}, &unique).unwrap_err();
    assert!(err.to_string().contains("E11000"));
    assert_eq!(engine.list_indexes(&ns).unwrap().len(), 1);

    let report = engine.create_index(&ns, &doc! {"title": 1}, &unique).unwrap();
    assert!(report.created);
    let err = engine.insert_many(&ns, vec![doc! {"title": "1984"}]).unwrap_err();
    assert!(err.to_string().contains("title_1"));
    let described = engine.list_indexes(&ns).unwrap();
    assert!(described[1].unique);
    assert_eq!(described[1].key, doc! {"title": 1});
}

#[test]
fn explain_switches_from_collscan_to_index() {
    let (engine, ns) = seeded("index-explain");
    let lookup = FindSpec::new(doc! {"title": "Animal Farm"});
    let before = engine.explain(&ns, &lookup, Verbosity::ExecutionStats).unwrap();
    assert_eq!(winning(&before).get_str("stage").unwrap(), "COLLSCAN");
    assert_eq!(stats(&before).get_i64("totalDocsExamined").unwrap(), 12);
    assert_eq!(stats(&before).get_i64("totalKeysExamined").unwrap(), 0);
    assert_eq!(stats(&before).get_i64("nReturned").unwrap(), 1);

    engine.create_index(&ns, &doc! {"title": 1}, &IndexOptions::default()).unwrap();
    let after = engine.explain(&ns, &lookup, Verbosity::ExecutionStats).unwrap();
    assert_eq!(winning(&after).get_str("stage").unwrap(), "FETCH");
    let ixscan = winning(&after).get_document("inputStage").unwrap();
    assert_eq!(ixscan.get_str("stage").unwrap(), "IXSCAN");
    assert_eq!(ixscan.get_document("keyPattern").unwrap(), &doc! {"title": 1});
    assert_eq!(stats(&after).get_i64("totalKeysExamined").unwrap(), 1);
    assert_eq!(stats(&after).get_i64("totalDocsExamined").unwrap(), 1);
    assert_eq!(stats(&after).get_i64("nReturned").unwrap(), 1);
    assert_eq!(after.get_str("explainVersion").unwrap(), "1");
    let planner = after.get_document("queryPlanner").unwrap();
    assert_eq!(planner.get_str("namespace").unwrap(), "plp_bookstore.books");
    assert_eq!(planner.get_document("parsedQuery").unwrap(), &doc! {"title": "Animal Farm"});
}

#[test]
fn compound_index_serves_equality_pair() {
    let (engine, ns) = seeded("index-compound");
    engine.create_index(&ns, &doc! {"title": 1}, &IndexOptions::default()).unwrap();
    engine.create_index(&ns, &doc! {"author": 1, "published_year": -1}, &IndexOptions::default()).unwrap();
    let spec = FindSpec::new(doc! {"author": "George Orwell", "published_year": 1945});
    let plan = engine.explain(&ns, &spec, Verbosity::ExecutionStats).unwrap();
    let ixscan = winning(&plan).get_document("inputStage").unwrap();
    assert_eq!(ixscan.get_str("indexName").unwrap(), "author_1_published_year_-1");
    assert_eq!(stats(&plan).get_i64("totalKeysExamined").unwrap(), 1);
    assert_eq!(stats(&plan).get_i64("nReturned").unwrap(), 1);

    let found = engine.find(&ns, &spec).unwrap().to_vec();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].get_str("title").unwrap(), "Animal Farm");
}

#[test]
fn range_scans_and_wrapping_stages() {
    let (engine, ns) = seeded("index-range");
    engine.create_index(&ns, &doc! {"published_year": 1}, &IndexOptions::default()).unwrap();
    let spec = FindSpec::new(doc! {"published_year": {"$gt": 1950}}).sort(doc! {"price": 1}).limit(2);
    let plan = engine.explain(&ns, &spec, Verbosity::ExecutionStats).unwrap();
    let limit = winning(&plan);
    assert_eq!(limit.get_str("stage").unwrap(), "LIMIT");
    assert_eq!(limit.get_i64("limitAmount").unwrap(), 2);
    let sort = limit.get_document("inputStage").unwrap();
    assert_eq!(sort.get_str("stage").unwrap(), "SORT");
    assert_eq!(sort.get_document("inputStage").unwrap().get_str("stage").unwrap(), "FETCH");
    assert_eq!(stats(&plan).get_i64("nReturned").unwrap(), 2);

    let all = engine.find(&ns, &FindSpec::new(doc! {"published_year": {"$gt": 1950}})).unwrap();
    assert_eq!(all.len(), 4);
}

#[test]
fn query_planner_verbosity_omits_stats() {
    let (engine, ns) = seeded("index-verbosity");
    let plan = engine
        .explain(&ns, &FindSpec::new(doc! {"genre": "Fiction"}), Verbosity::QueryPlanner)
        .unwrap();
    assert!(!plan.contains_key("executionStats"));
    assert!(plan.get_document("queryPlanner").unwrap().get_array("rejectedPlans").unwrap().is_empty());
    let missing = engine
        .explain(&Namespace::new("plp_bookstore", "none"), &FindSpec::new(doc! {}), Verbosity::AllPlansExecution)
        .unwrap();
    assert_eq!(stats(&missing).get_i64("nReturned").unwrap(), 0);
}

#[test]
fn indexes_follow_writes() {
    let (engine, ns) = seeded("index-writes");
    engine.create_index(&ns, &doc! {"title": 1}, &IndexOptions::default()).unwrap();
    engine
        .update_one(&ns, &doc! {"title": "Animal Farm"}, &doc! {"$set": {"title": "Animal Farm (2nd ed.)"}}, &Default::default())
        .unwrap();
    assert_eq!(engine.find(&ns, &FindSpec::new(doc! {"title": "Animal Farm"})).unwrap().len(), 0);
    assert_eq!(engine.find(&ns, &FindSpec::new(doc! {"title": "Animal Farm (2nd ed.)"})).unwrap().len(), 1);
    engine.delete_one(&ns, &doc! {"title": "Animal Farm (2nd ed.)"}).unwrap();
    let plan = engine
        .explain(&ns, &FindSpec::new(doc! {"title": "Animal Farm (2nd ed.)"}), Verbosity::ExecutionStats)
        .unwrap();
    assert_eq!(stats(&plan).get_i64("nReturned").unwrap(), 0);
}

#[test]
fn large_integer_keys_stay_exact() {
    let engine = Engine::new("index-large-ints");
    let ns = Namespace::new("db", "items");
    let big = 9_007_199_254_740_992_i64;
    engine
        .insert_many(&ns, vec![doc! {"_id": big, "n": big}, doc! {"_id": big + 1, "n": big + 1}])
        .unwrap();
    let spec = FindSpec::new(doc! {"n": {"$gt": big}});
    let scanned = engine.find(&ns, &spec).unwrap().to_vec();
    assert_eq!(scanned.len(), 1);
    engine.create_index(&ns, &doc! {"n": 1}, &IndexOptions { unique: true, ..IndexOptions::default() }).unwrap();
    let indexed = engine.find(&ns, &spec).unwrap().to_vec();
    assert_eq!(indexed, scanned);
    let plan = engine.explain(&ns, &spec, Verbosity::ExecutionStats).unwrap();
    assert_eq!(stats(&plan).get_i64("nReturned").unwrap(), 1);
}

#[test]
fn paths_through_arrays_keep_matches_once_indexed() {
    let engine = Engine::new("index-array-paths");
    let ns = Namespace::new("db", "items");
    let docs = vec![
        doc! {"reviews": [{"rating": 3}, {"rating": 5}]},
        doc! {"reviews": [{"rating": 4}]},
        doc! {"reviews": {"rating": 5}},
    ];
    engine.insert_many(&ns, docs).unwrap();
    let spec = FindSpec::new(doc! {"reviews.rating": 5});
    assert_eq!(engine.find(&ns, &spec).unwrap().len(), 2);
    engine.create_index(&ns, &doc! {"reviews.rating": 1}, &IndexOptions::default()).unwrap();
    assert_eq!(engine.find(&ns, &spec).unwrap().len(), 2);
    let four = FindSpec::new(doc! {"reviews.rating": 4});
    assert_eq!(engine.find(&ns, &four).unwrap().len(), 1);
}
