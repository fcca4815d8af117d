mod common;

use common::{CollectingSink, as_sink};
use rask_log_pipeline::filter::LevelOverrideTable;
use rask_log_pipeline::{LogLevel, Pipeline, Properties};
use std::sync::atomic::{AtomicUsize, Ordering};

#[test]
fn test_longest_prefix_wins() {
    let table = LevelOverrideTable::new(
        LogLevel::Information,
        [
            ("Microsoft", LogLevel::Warning),
            ("Microsoft.Hosting.Lifetime", LogLevel::Information),
            ("System", LogLevel::Warning),
        ],
    );

    assert_eq!(table.lookup("Microsoft.AspNetCore.Routing"), LogLevel::Warning);
    assert_eq!(table.lookup("Microsoft.Hosting.Lifetime"), LogLevel::Information);
    assert_eq!(table.lookup("Microsoft.Hosting.Lifetime.Host"), LogLevel::Information);
    assert_eq!(table.lookup("System.Net.Http"), LogLevel::Warning);
    assert_eq!(table.lookup("MyApp.Orders"), LogLevel::Information);
}

#[test]
fn test_prefix_must_end_on_namespace_boundary() {
    let table = LevelOverrideTable::new(LogLevel::Information, [("System", LogLevel::Error)]);

    assert_eq!(table.lookup("System"), LogLevel::Error);
    assert_eq!(table.lookup("SystemMonitor"), LogLevel::Information);
}

#[test]
fn test_empty_source_context_uses_default() {
    let table = LevelOverrideTable::new(LogLevel::Warning, [("App", LogLevel::Debug)]);
    assert_eq!(table.lookup(""), LogLevel::Warning);
}

#[test]
fn test_filtered_events_never_build_properties() {
    let sink = CollectingSink::new();
    let pipeline = Pipeline::builder()
        .minimum_level(LogLevel::Information)
        .write_to_shared(as_sink(&sink))
        .build();
    let calls = AtomicUsize::new(0);

    for level in [LogLevel::Debug, LogLevel::Information, LogLevel::Error] {
        pipeline.write(level, "App.Orders", "Order {OrderId} at {Level}", || {
            calls.fetch_add(1, Ordering::SeqCst);
            Properties::new()
                .add("OrderId", 7_i64)
                .add("Level", level.as_str())
        });
    }

    let events = sink.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].level(), LogLevel::Information);
    assert_eq!(events[1].level(), LogLevel::Error);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(pipeline.stats().filtered, 1);
    assert_eq!(pipeline.stats().dispatched, 2);
}

#[test]
fn test_override_admits_below_global_minimum() {
    let sink = CollectingSink::new();
    let pipeline = Pipeline::builder()
        .minimum_level(LogLevel::Warning)
        .override_level("App.Db", LogLevel::Debug)
        .write_to_shared(as_sink(&sink))
        .build();

    pipeline.for_context("App.Db.Query").debug("query ran", Properties::new);
    pipeline.for_context("App.Web").information("request served", Properties::new);

    let events = sink.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].source_context(), "App.Db.Query");
}
