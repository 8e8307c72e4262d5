// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! End-to-end runs of the sync engine over in-memory fakes.

mod common;

use common::*;
use keep_notion_sync::config::FetchMode;
use keep_notion_sync::db::MemoryDb;
use keep_notion_sync::error::SyncError;
use keep_notion_sync::services::keep::RawGroup;
use keep_notion_sync::services::{cancel_pair, CancelSignal, WeatherPageOutcome, WEATHER_UNAVAILABLE};
use serde_json::json;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

fn three_runs() -> ScriptedSource {
    ScriptedSource::new().with_pages(
        "all",
        vec![
            vec![group(vec![
                stats("run_1", "running", "2024-05-01T07:00:00+08:00"),
                stats("run_2", "running", "2024-05-02T07:00:00+08:00"),
            ])],
            vec![group(vec![stats("walk_1", "walking", "2024-05-03 19:30:00")])],
        ],
    )
}

#[tokio::test]
async fn test_second_run_writes_nothing() {
    let source = Arc::new(three_runs());
    let db = Arc::new(MemoryDb::new());
    let engine = engine(
        source.clone(),
        db.clone(),
        Arc::new(FixedWeather),
        options(FetchMode::All, &[]),
    );

    let first = engine.run(&credentials(), &CancelSignal::never()).await.unwrap();
    assert_eq!(first.fetched, 3);
    assert_eq!(first.written, 3);
    assert_eq!(first.duplicate, 0);
    assert_eq!(db.len(), 3);

    let second = engine.run(&credentials(), &CancelSignal::never()).await.unwrap();
    assert_eq!(second.written, 0);
    assert_eq!(second.duplicate, 3);
    assert_eq!(db.len(), 3);
    assert_eq!(db.create_count(), 3);
}

#[tokio::test]
async fn test_malformed_entries_are_skipped() {
    let source = Arc::new(ScriptedSource::new().with_pages(
        "all",
        vec![vec![
            group(vec![
                stats("run_1", "running", "2024-05-01"),
                json!("not an object"),
                json!({ "id": "no_date", "type": "running", "duration": 600 }),
            ]),
            common::group(vec![]),
        ]],
    ));
    let db = Arc::new(MemoryDb::new());
    let engine = engine(
        source,
        db.clone(),
        Arc::new(FixedWeather),
        options(FetchMode::All, &[]),
    );

    let summary = engine.run(&credentials(), &CancelSignal::never()).await.unwrap();

    assert_eq!(summary.fetched, 3);
    assert_eq!(summary.skipped, 2);
    assert_eq!(summary.written, 1);
    assert_eq!(summary.failed, 0);
    assert!(!summary.report_line().contains("with"));
}

#[tokio::test]
async fn test_missing_stats_is_skipped() {
    let mut g = group(vec![stats("run_1", "running", "2024-05-01")]);
    g.logs.push(keep_notion_sync::services::keep::RawLog { stats: None });

    let source = Arc::new(ScriptedSource::new().with_pages("all", vec![vec![g]]));
    let db = Arc::new(MemoryDb::new());
    let engine = engine(
        source,
        db.clone(),
        Arc::new(FixedWeather),
        options(FetchMode::All, &[]),
    );

    let summary = engine.run(&credentials(), &CancelSignal::never()).await.unwrap();
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.written, 1);
}

#[tokio::test]
async fn test_same_activity_in_two_types_is_written_once() {
    let shared = stats("run_1", "running", "2024-05-01");
    let source = Arc::new(
        ScriptedSource::new()
            .with_pages("running", vec![vec![group(vec![shared.clone()])]])
            .with_pages("training", vec![vec![group(vec![shared])]]),
    );
    let db = Arc::new(MemoryDb::new());
    let engine = engine(
        source,
        db.clone(),
        Arc::new(FixedWeather),
        options(FetchMode::PerType, &["running", "training"]),
    );

    let summary = engine.run(&credentials(), &CancelSignal::never()).await.unwrap();

    assert_eq!(summary.fetched, 2);
    assert_eq!(summary.written, 1);
    assert_eq!(summary.duplicate, 1);
    assert_eq!(db.len(), 1);
}

#[tokio::test]
async fn test_records_without_id_use_content_hash() {
    let mut a = stats("", "running", "2024-05-01");
    let mut b = stats("", "running", "2024-05-01");
    a["id"] = json!(null);
    b["id"] = json!(null);
    b["duration"] = json!(2400);

    let source = Arc::new(ScriptedSource::new().with_pages(
        "all",
        vec![vec![group(vec![a.clone(), b])]],
    ));
    let db = Arc::new(MemoryDb::new());
    let engine = engine(
        source,
        db.clone(),
        Arc::new(FixedWeather),
        options(FetchMode::All, &[]),
    );

    let first = engine.run(&credentials(), &CancelSignal::never()).await.unwrap();
    assert_eq!(first.written, 2);

    let second = engine.run(&credentials(), &CancelSignal::never()).await.unwrap();
    assert_eq!(second.written, 0);
    assert_eq!(second.duplicate, 2);
    assert!(db.records().iter().all(|r| r.key.is_weak()));
}

#[tokio::test]
async fn test_weather_failure_uses_sentinel() {
    let source = Arc::new(ScriptedSource::new().with_pages(
        "all",
        vec![vec![group(vec![stats("today_1", "running", &today_str())])]],
    ));
    let db = Arc::new(MemoryDb::new());
    let weather = Arc::new(FailingWeather::default());
    let engine = engine(
        source,
        db.clone(),
        weather.clone(),
        options(FetchMode::All, &[]),
    );

    let summary = engine.run(&credentials(), &CancelSignal::never()).await.unwrap();

    assert_eq!(summary.written, 1);
    assert_eq!(db.records()[0].weather, WEATHER_UNAVAILABLE);
    // Retried with backoff before giving up
    assert_eq!(weather.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_today_gets_current_weather() {
    let source = Arc::new(ScriptedSource::new().with_pages(
        "all",
        vec![vec![group(vec![stats("today_1", "running", &today_str())])]],
    ));
    let db = Arc::new(MemoryDb::new());
    let engine = engine(
        source,
        db.clone(),
        Arc::new(FixedWeather),
        options(FetchMode::All, &[]),
    );

    engine.run(&credentials(), &CancelSignal::never()).await.unwrap();

    let record = &db.records()[0];
    assert_eq!(record.weather, "晴 ~ 21°C");
    assert_eq!(record.pace, 300);
    assert!(!record.has_heart_rate);
}

#[tokio::test]
async fn test_failing_sport_type_is_isolated() {
    let source = Arc::new(
        ScriptedSource::new()
            .with_pages("running", vec![vec![group(vec![stats("run_1", "running", "2024-05-01")])]])
            .failing_type("walking")
            .with_pages("cycling", vec![vec![group(vec![stats("ride_1", "cycling", "2024-05-02")])]]),
    );
    let db = Arc::new(MemoryDb::new());
    let engine = engine(
        source,
        db.clone(),
        Arc::new(FixedWeather),
        options(FetchMode::PerType, &["running", "walking", "cycling"]),
    );

    let summary = engine.run(&credentials(), &CancelSignal::never()).await.unwrap();

    assert_eq!(summary.written, 2);
    assert_eq!(summary.failed_types, vec!["walking".to_string()]);
    let mut types: Vec<String> = db.records().into_iter().map(|r| r.sport_type).collect();
    types.sort();
    assert_eq!(types, vec!["cycling".to_string(), "running".to_string()]);
}

#[tokio::test]
async fn test_every_sport_type_failing_aborts() {
    let source = Arc::new(
        ScriptedSource::new()
            .failing_type("running")
            .failing_type("walking"),
    );
    let db = Arc::new(MemoryDb::new());
    let engine = engine(
        source,
        db.clone(),
        Arc::new(FixedWeather),
        options(FetchMode::PerType, &["running", "walking"]),
    );

    let result = engine.run(&credentials(), &CancelSignal::never()).await;
    assert!(matches!(result, Err(SyncError::Fetch(_))));
    assert!(db.is_empty());
}

#[tokio::test]
async fn test_auth_failure_aborts_before_fetch() {
    let source = Arc::new(three_runs().rejecting_login());
    let db = Arc::new(MemoryDb::new());
    let engine = engine(
        source.clone(),
        db.clone(),
        Arc::new(FixedWeather),
        options(FetchMode::All, &[]),
    );

    let result = engine.run(&credentials(), &CancelSignal::never()).await;

    assert!(matches!(result, Err(SyncError::Auth(_))));
    // Auth errors are not retried
    assert_eq!(source.login_calls.load(Ordering::SeqCst), 1);
    assert_eq!(source.list_calls(), 0);
    assert_eq!(db.create_count(), 0);
}

#[tokio::test]
async fn test_primary_fetch_failure_aborts_after_retries() {
    let source = Arc::new(ScriptedSource::new().failing_type("all"));
    let db = Arc::new(MemoryDb::new());
    let engine = engine(
        source.clone(),
        db.clone(),
        Arc::new(FixedWeather),
        options(FetchMode::All, &[]),
    );

    let result = engine.run(&credentials(), &CancelSignal::never()).await;

    assert!(matches!(result, Err(SyncError::Fetch(_))));
    assert_eq!(source.list_calls(), 3);
    assert_eq!(db.create_count(), 0);
}

#[tokio::test]
async fn test_write_failure_is_counted() {
    let source = Arc::new(ScriptedSource::new().with_pages(
        "all",
        vec![vec![group(vec![
            stats("run_1", "running", "2024-05-01"),
            {
                let mut s = stats("run_2", "running", "2024-05-02");
                s["name"] = json!("坏记录");
                s
            },
        ])]],
    ));
    let db = Arc::new(MemoryDb::new());
    db.reject_title("🏃 坏记录");
    let engine = engine(
        source,
        db.clone(),
        Arc::new(FixedWeather),
        options(FetchMode::All, &[]),
    );

    let summary = engine.run(&credentials(), &CancelSignal::never()).await.unwrap();

    assert_eq!(summary.written, 1);
    assert_eq!(summary.failed, 1);
    // Validation errors are not retried
    assert_eq!(db.create_count(), 2);
    assert!(summary.report_line().ends_with("(with 1 failures)"));
}

#[tokio::test]
async fn test_index_failure_fails_records_not_run() {
    let source = Arc::new(three_runs());
    let db = Arc::new(MemoryDb::new());
    db.fail_queries_with(Some(SyncError::Index("HTTP 502".to_string())));
    let engine = engine(
        source,
        db.clone(),
        Arc::new(FixedWeather),
        options(FetchMode::All, &[]),
    );

    let summary = engine.run(&credentials(), &CancelSignal::never()).await.unwrap();

    assert_eq!(summary.failed, 3);
    assert_eq!(summary.written, 0);
    assert_eq!(db.create_count(), 0);
}

#[tokio::test]
async fn test_prefetched_index_skips_per_record_queries() {
    let source = Arc::new(three_runs());
    let db = Arc::new(MemoryDb::new());
    let mut opts = options(FetchMode::All, &[]);
    opts.prefetch_index = true;
    let engine = engine(source, db.clone(), Arc::new(FixedWeather), opts);

    engine.run(&credentials(), &CancelSignal::never()).await.unwrap();
    let queries_after_first = db.query_count();
    assert_eq!(queries_after_first, 1);

    let second = engine.run(&credentials(), &CancelSignal::never()).await.unwrap();
    assert_eq!(second.duplicate, 3);
    assert_eq!(db.query_count(), queries_after_first + 1);
}

#[tokio::test]
async fn test_cancel_stops_paging_and_writes() {
    let (handle, signal) = cancel_pair();
    let source = Arc::new(three_runs().cancel_after_first_page(handle));
    let db = Arc::new(MemoryDb::new());
    let engine = engine(
        source.clone(),
        db.clone(),
        Arc::new(FixedWeather),
        options(FetchMode::All, &[]),
    );

    let summary = engine.run(&credentials(), &signal).await.unwrap();

    assert_eq!(source.list_calls(), 1);
    assert_eq!(summary.fetched, 2);
    assert_eq!(summary.cancelled, 2);
    assert_eq!(summary.written, 0);
    assert!(db.is_empty());
}

#[tokio::test]
async fn test_weather_page_written_once_per_day() {
    let db = Arc::new(MemoryDb::new());
    let engine = engine(
        Arc::new(ScriptedSource::new()),
        db.clone(),
        Arc::new(FixedWeather),
        options(FetchMode::All, &[]),
    );

    let first = engine.write_weather_page(today()).await.unwrap();
    match first {
        WeatherPageOutcome::Created { weather, .. } => assert_eq!(weather, "晴 ~ 21°C"),
        other => panic!("expected Created, got {:?}", other),
    }

    let second = engine.write_weather_page(today()).await.unwrap();
    assert_eq!(second, WeatherPageOutcome::AlreadyExists);
    assert_eq!(db.len(), 1);

    let tomorrow = today() + chrono::Duration::days(1);
    let third = engine.write_weather_page(tomorrow).await.unwrap();
    match third {
        WeatherPageOutcome::Created { weather, .. } => assert_eq!(weather, "多云 ~ 15~24°C"),
        other => panic!("expected Created, got {:?}", other),
    }
    assert_eq!(db.len(), 2);
}

fn idless_run() -> serde_json::Value {
    let mut s = stats("", "running", "2024-05-01");
    s["id"] = json!(null);
    s
}

#[tokio::test]
async fn test_idless_activity_in_two_types_is_written_once() {
    let source = Arc::new(
        ScriptedSource::new()
            .with_pages("running", vec![vec![group(vec![idless_run()])]])
            .with_pages("training", vec![vec![group(vec![idless_run()])]]),
    );
    let db = Arc::new(MemoryDb::new());
    let engine = engine(
        source,
        db.clone(),
        Arc::new(FixedWeather),
        options(FetchMode::PerType, &["running", "training"]),
    );

    let summary = engine.run(&credentials(), &CancelSignal::never()).await.unwrap();

    assert_eq!(summary.fetched, 2);
    assert_eq!(summary.written, 1);
    assert_eq!(summary.duplicate, 1);
    assert_eq!(db.len(), 1);
}

#[tokio::test]
async fn test_idless_key_survives_fetch_mode_switch() {
    let db = Arc::new(MemoryDb::new());

    let all = engine(
        Arc::new(ScriptedSource::new().with_pages("all", vec![vec![group(vec![idless_run()])]])),
        db.clone(),
        Arc::new(FixedWeather),
        options(FetchMode::All, &[]),
    );
    let first = all.run(&credentials(), &CancelSignal::never()).await.unwrap();
    assert_eq!(first.written, 1);

    let per_type = engine(
        Arc::new(
            ScriptedSource::new().with_pages("training", vec![vec![group(vec![idless_run()])]]),
        ),
        db.clone(),
        Arc::new(FixedWeather),
        options(FetchMode::PerType, &["training"]),
    );
    let second = per_type.run(&credentials(), &CancelSignal::never()).await.unwrap();

    assert_eq!(second.written, 0);
    assert_eq!(second.duplicate, 1);
    assert_eq!(db.len(), 1);
}

#[tokio::test]
async fn test_bad_log_does_not_drop_its_group() {
    let g: RawGroup = serde_json::from_value(json!({
        "logs": [
            { "stats": stats("run_1", "running", "2024-05-01") },
            "garbage",
            { "stats": stats("run_2", "running", "2024-05-02") }
        ]
    }))
    .unwrap();
    assert_eq!(g.logs.len(), 3);

    let source = Arc::new(ScriptedSource::new().with_pages("all", vec![vec![g]]));
    let db = Arc::new(MemoryDb::new());
    let engine = engine(
        source,
        db.clone(),
        Arc::new(FixedWeather),
        options(FetchMode::All, &[]),
    );

    let summary = engine.run(&credentials(), &CancelSignal::never()).await.unwrap();

    assert_eq!(summary.fetched, 3);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.written, 2);
    assert_eq!(db.len(), 2);
}

#[tokio::test]
async fn test_concurrent_same_key_records_create_once() {
    let same: Vec<_> = (0..5)
        .map(|_| stats("run_1", "running", "2024-05-01"))
        .collect();
    let source = Arc::new(ScriptedSource::new().with_pages("all", vec![vec![group(same)]]));
    let db = Arc::new(MemoryDb::new());
    let slow = Arc::new(SlowDestination::new(db.clone(), Duration::from_millis(10)));

    let mut opts = options(FetchMode::All, &[]);
    opts.workers = 4;
    let engine = engine_with_destination(source, slow, Arc::new(FixedWeather), opts);

    let summary = engine.run(&credentials(), &CancelSignal::never()).await.unwrap();

    assert_eq!(summary.fetched, 5);
    assert_eq!(summary.written, 1);
    assert_eq!(summary.duplicate, 4);
    assert_eq!(db.create_count(), 1);
    assert_eq!(db.len(), 1);
}
