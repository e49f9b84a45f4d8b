//! Tests for passes with functions that answer later

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use duke_calc::prelude::*;
use duke_calc::AsyncValue;
use pretty_assertions::assert_eq;

fn engine(setup: impl FnOnce(&mut Worksheet)) -> FormulaEngine {
    let mut sheet = Worksheet::new("s1", "Sheet1");
    setup(&mut sheet);
    let mut book = Workbook::new("u1");
    book.add_sheet(sheet).unwrap();

    let mut engine = FormulaEngine::new(FunctionRegistry::with_builtins());
    engine.load(FormulaDatasetConfig {
        all_unit_data: Some(std::iter::once(book).collect()),
        force_calculate: true,
        ..Default::default()
    });
    engine
}

/// `FETCH(n)` answers `n * 10` after a short sleep and counts its calls
fn fetch(calls: Arc<AtomicUsize>) -> FunctionDef {
    FunctionDef::new("FETCH", 1, Some(1), move |args, _| {
        calls.fetch_add(1, Ordering::SeqCst);
        let n = args[0].as_number().unwrap_or(0.0);
        Value::Pending(AsyncValue::new(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            Value::Number(n * 10.0)
        }))
    })
}

#[tokio::test]
async fn test_pending_resolves_without_reexecution() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut engine = engine(|s| {
        s.set_value("A1", 2.0).unwrap();
        s.set_formula("B1", "=FETCH(A1)+FETCH(3)").unwrap();
        s.set_formula("C1", "=B1+1").unwrap();
    });
    engine.register_function(fetch(calls.clone()));

    let result = engine.calculate_async().await.completed().unwrap();
    assert_eq!(result.value("u1", "s1", 0, 1), Some(&CellValue::Number(50.0)));
    assert_eq!(result.value("u1", "s1", 0, 2), Some(&CellValue::Number(51.0)));
    // One execution per call site; retries reuse the settled results
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_pending_in_sync_pass_is_calc() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut engine = engine(|s| {
        s.set_formula("A1", "=FETCH(1)").unwrap();
    });
    engine.register_function(fetch(calls));

    let result = engine.calculate().completed().unwrap();
    assert_eq!(
        result.value("u1", "s1", 0, 0),
        Some(&CellValue::Error(CellError::Calc))
    );
}

#[tokio::test]
async fn test_invalidate_supersedes_async_pass() {
    let mut engine = engine(|s| {
        s.set_formula("A1", "=WAIT()").unwrap();
    });
    let counter = engine.generation_counter();
    engine.register_function(FunctionDef::new("WAIT", 0, Some(0), move |_, _| {
        let counter = counter.clone();
        Value::Pending(AsyncValue::new(async move {
            // The host edits something while the answer is in flight
            counter.issue();
            Value::Number(1.0)
        }))
    }));

    let outcome = engine.calculate_async().await;
    assert!(outcome.is_superseded());
}

#[tokio::test]
async fn test_evaluate_formula_async() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut engine = engine(|s| {
        s.set_value("A1", 4.0).unwrap();
    });
    engine.register_function(fetch(calls.clone()));

    let value = engine
        .evaluate_formula_async("=FETCH(A1)*2", "u1", "s1", 0, 1)
        .await;
    assert_eq!(value, Value::Number(80.0));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // Without waiting the same formula cannot finish
    assert_eq!(
        engine.evaluate_formula("=FETCH(A1)*2", "u1", "s1", 0, 1),
        Value::Error(CellError::Calc)
    );
}
