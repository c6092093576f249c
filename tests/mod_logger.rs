use bookstore_queries::logger::configure_logging;
use bookstore_queries::seed::seed_books;
use bookstore_queries::{BOOKS, FindSpec, Operation, telemetry};
use bson::doc;
use std::path::Path;

fn read(dir: &Path, file: &str) -> String {
    log::logger().flush();
    std::fs::read_to_string(dir.join(file)).unwrap_or_default()
}

// One test: the logger is process-global.
#[test]
fn logging_lifecycle() {
    let first = tempfile::tempdir().unwrap();
    configure_logging(Some(first.path()), Some("info"), Some(2)).unwrap();
    for f in ["app.log", "audit.log", "metrics.log"] {
        assert!(first.path().join(f).is_file(), "{f} missing");
    }

    let cfg_dir = tempfile::tempdir().unwrap();
    let logs = cfg_dir.path().join("logs");
    let cfg_file = cfg_dir.path().join("bookstore.toml");
    std::fs::write(
        &cfg_file,
        format!(
            "uri = \"memory://logger-lifecycle\"\nlog_dir = {:?}\nlog_level = \"debug\"\nslow_query_ms = 0\n",
            logs.display().to_string()
        ),
    )
    .unwrap();
    let (cfg, runner) = bookstore_queries::init(Some(cfg_file.as_path())).unwrap();
    assert_eq!(cfg.slow_query_ms, Some(0));
    assert_eq!(telemetry::slow_query_ms(), 0);
    assert!(logs.join("metrics.log").is_file());

    let conn = runner.connection().unwrap();
    seed_books(conn).unwrap();
    let before = telemetry::snapshot();
    runner.run(&Operation::find("logged_fiction", BOOKS, FindSpec::new(doc! {"genre": "Fiction"}))).unwrap();
    runner
        .run(&Operation::delete_one("logged_delete", BOOKS, doc! {"title": "Moby Dick"}))
        .unwrap();
    let after = telemetry::snapshot();
    assert!(after.operations_slow_total >= before.operations_slow_total + 2);

    let metrics = read(&logs, "metrics.log");
    let line = metrics.lines().find(|l| l.contains("logged_fiction")).unwrap();
    let json: serde_json::Value = serde_json::from_str(&line[line.find('{').unwrap()..]).unwrap();
    assert_eq!(json["kind"], "find");
    assert_eq!(json["affected"], 4);
    assert_eq!(json["ok"], true);

    assert!(read(&logs, "audit.log").contains("logged_delete"));
    assert!(!read(&logs, "audit.log").contains("logged_fiction"));
    assert!(read(&logs, "app.log").contains("slow operation logged_fiction"));
    assert!(!read(first.path(), "metrics.log").contains("logged_fiction"));
}
