//! Tests for incremental recalculation passes

use duke_calc::formula::FastMap;
use duke_calc::prelude::*;
use duke_calc::{CellMatrix, OtherFormulaKey};
use pretty_assertions::assert_eq;

fn load(book: Workbook, tweak: impl FnOnce(&mut FormulaDatasetConfig)) -> FormulaEngine {
    let mut config = FormulaDatasetConfig {
        all_unit_data: Some(std::iter::once(book).collect()),
        ..Default::default()
    };
    tweak(&mut config);

    let mut engine = FormulaEngine::new(FunctionRegistry::with_builtins());
    engine.load(config);
    engine
}

fn completed(outcome: CalculationOutcome) -> CalculationResult {
    match outcome {
        CalculationOutcome::Completed(result) => result,
        CalculationOutcome::Superseded { generation } => panic!("pass {} was superseded", generation),
    }
}

fn cell(address: &str) -> UnitCell {
    let addr = CellAddress::parse(address).unwrap();
    UnitCell::new("u1", "s1", addr.row, addr.col)
}

fn value(result: &CalculationResult, address: &str) -> Option<CellValue> {
    let c = cell(address);
    result.value(&c.unit_id, &c.sheet_id, c.row, c.col).cloned()
}

fn spilled(result: &CalculationResult, address: &str) -> Option<CellValue> {
    let c = cell(address);
    result.array_value(&c.unit_id, &c.sheet_id, c.row, c.col).cloned()
}

fn book(setup: impl FnOnce(&mut Worksheet)) -> Workbook {
    let mut sheet = Worksheet::new("s1", "Sheet1");
    setup(&mut sheet);
    let mut book = Workbook::new("u1");
    book.add_sheet(sheet).unwrap();
    book
}

#[test]
fn test_force_calculate_everything() {
    let book = book(|s| {
        s.set_value("A1", 10.0).unwrap();
        s.set_value("A2", 20.0).unwrap();
        s.set_formula("A3", "=A1+A2").unwrap();
        s.set_formula("A4", "=A3*2").unwrap();
    });
    let mut engine = load(book, |c| c.force_calculate = true);

    let result = completed(engine.calculate());
    assert_eq!(value(&result, "A3"), Some(CellValue::Number(30.0)));
    assert_eq!(value(&result, "A4"), Some(CellValue::Number(60.0)));
    assert_eq!(result.stats.formula_count, 2);
    assert_eq!(result.stats.cells_calculated, 2);
    assert_eq!(result.stats.errors, 0);
}

#[test]
fn test_nothing_dirty_nothing_calculated() {
    let book = book(|s| {
        s.set_value("A1", 1.0).unwrap();
        s.set_formula("B1", "=A1+1").unwrap();
    });
    let mut engine = load(book, |_| {});

    let result = completed(engine.calculate());
    assert_eq!(result.stats.cells_calculated, 0);
    assert_eq!(value(&result, "B1"), None);
}

#[test]
fn test_chain_dirty_propagation() {
    let book = book(|s| {
        s.set_formula("A1", "=B1+1").unwrap();
        s.set_formula("B1", "=C1+1").unwrap();
        s.set_value("C1", 5.0).unwrap();
        s.set_formula("D1", "=99").unwrap();
    });
    let mut engine = load(book, |c| c.dirty_ranges = vec![cell("C1").range()]);

    let result = completed(engine.calculate());
    assert_eq!(value(&result, "B1"), Some(CellValue::Number(6.0)));
    assert_eq!(value(&result, "A1"), Some(CellValue::Number(7.0)));
    // Unrelated formulas are left alone
    assert_eq!(value(&result, "D1"), None);
    assert_eq!(result.stats.cells_calculated, 2);
}

#[test]
fn test_cycles() {
    let book = book(|s| {
        s.set_formula("A1", "=B1").unwrap();
        s.set_formula("B1", "=A1").unwrap();
        s.set_formula("C1", "=A1+1").unwrap();
        s.set_formula("D1", "=D1+1").unwrap();
    });
    let mut engine = load(book, |c| c.force_calculate = true);

    let result = completed(engine.calculate());
    let cycle = Some(CellValue::Error(CellError::Cycle));
    assert_eq!(value(&result, "A1"), cycle);
    assert_eq!(value(&result, "B1"), cycle);
    assert_eq!(value(&result, "D1"), cycle);
    // Reading a cycle propagates its error
    assert_eq!(value(&result, "C1"), cycle);
    assert_eq!(result.stats.circular_references, 3);
    assert_eq!(result.stats.errors, 4);
}

#[test]
fn test_shared_formulas() {
    let book = book(|s| {
        s.set_value("A1", 1.0).unwrap();
        s.set_value("A2", 2.0).unwrap();
        s.set_value("A3", 3.0).unwrap();
        s.set_formula_at(0, 1, FormulaDataItem::shared("=A1*2", "f1"));
        s.set_formula_at(1, 1, FormulaDataItem::occurrence("f1", 0, 1));
        s.set_formula_at(
            2,
            1,
            FormulaDataItem {
                formula_id: Some("f1".into()),
                ..Default::default()
            },
        );
    });
    let mut engine = load(book, |c| c.force_calculate = true);

    let result = completed(engine.calculate());
    assert_eq!(value(&result, "B1"), Some(CellValue::Number(2.0)));
    assert_eq!(value(&result, "B2"), Some(CellValue::Number(4.0)));
    assert_eq!(value(&result, "B3"), Some(CellValue::Number(6.0)));
}

#[test]
fn test_excluded_cells() {
    let book = book(|s| {
        s.set_value("A1", 1.0).unwrap();
        s.set_formula("B1", "=A1+1").unwrap();
        s.set_formula("B2", "=A1+2").unwrap();
    });
    let mut engine = load(book, |c| {
        let mut excluded = CellMatrix::new();
        excluded.insert(1, 1, true);
        let mut sheets = FastMap::default();
        sheets.insert("s1".to_string(), excluded);
        let mut units = FastMap::default();
        units.insert("u1".to_string(), sheets);
        c.excluded_cell = Some(units);
        c.force_calculate = true;
    });

    let result = completed(engine.calculate());
    assert_eq!(value(&result, "B1"), Some(CellValue::Number(2.0)));
    assert_eq!(value(&result, "B2"), None);
}

#[test]
fn test_errors_are_results() {
    let book = book(|s| {
        s.set_formula("A1", "=1/0").unwrap();
        s.set_formula("A2", "=UNKNOWNFN()").unwrap();
        s.set_formula("A3", "=ROWS(C2:F3)").unwrap();
    });
    let mut engine = load(book, |c| c.force_calculate = true);

    let result = completed(engine.calculate());
    assert_eq!(value(&result, "A1"), Some(CellValue::Error(CellError::Div0)));
    assert_eq!(value(&result, "A2"), Some(CellValue::Error(CellError::Name)));
    assert_eq!(value(&result, "A3"), Some(CellValue::Number(2.0)));
    assert_eq!(result.stats.errors, 2);
}

#[test]
fn test_panicking_cell_is_calc() {
    let book = book(|s| {
        s.set_formula("A1", "=EXPLODE()").unwrap();
        s.set_formula("A2", "=A1").unwrap();
        s.set_formula("A3", "=1+1").unwrap();
    });
    let mut engine = load(book, |c| c.force_calculate = true);
    engine.register_function(FunctionDef::new("EXPLODE", 0, Some(0), |_, _| {
        panic!("executor failure")
    }));

    let result = completed(engine.calculate());
    assert_eq!(value(&result, "A1"), Some(CellValue::Error(CellError::Calc)));
    assert_eq!(value(&result, "A3"), Some(CellValue::Number(2.0)));
}

#[test]
fn test_array_spill() {
    let book = book(|s| {
        s.set_formula("A1", "={1;2;3}").unwrap();
    });
    let mut engine = load(book, |c| c.force_calculate = true);

    let result = completed(engine.calculate());
    assert_eq!(value(&result, "A1"), Some(CellValue::Number(1.0)));
    assert_eq!(spilled(&result, "A2"), Some(CellValue::Number(2.0)));
    assert_eq!(spilled(&result, "A3"), Some(CellValue::Number(3.0)));
    assert_eq!(
        engine.config().array_range(&cell("A1")),
        Some(CellRange::parse("A1:A3").unwrap())
    );
}

#[test]
fn test_blocked_spill() {
    let book = book(|s| {
        s.set_formula("A1", "={1;2;3}").unwrap();
        s.set_value("A3", "occupied").unwrap();
    });
    let mut engine = load(book, |c| c.force_calculate = true);

    let result = completed(engine.calculate());
    assert_eq!(value(&result, "A1"), Some(CellValue::Error(CellError::Spill)));
    assert_eq!(spilled(&result, "A2"), None);
}

#[test]
fn test_reader_of_new_spill() {
    let book = book(|s| {
        s.set_formula("A1", "={1;2;3}").unwrap();
        s.set_formula("B1", "=A3*10").unwrap();
    });
    let mut engine = load(book, |c| c.force_calculate = true);

    let result = completed(engine.calculate());
    assert_eq!(value(&result, "B1"), Some(CellValue::Number(30.0)));
}

#[test]
fn test_spill_shrinks_on_edit() {
    let book = book(|s| {
        s.set_formula("A1", "={1;2;3}").unwrap();
        s.set_formula("B1", "=A3").unwrap();
    });
    let mut engine = load(book, |c| c.force_calculate = true);
    completed(engine.calculate());

    engine
        .set_cell(&cell("A1"), CellData::with_formula(FormulaDataItem::new("={4;5}")))
        .unwrap();
    let result = completed(engine.calculate());

    assert_eq!(value(&result, "A1"), Some(CellValue::Number(4.0)));
    assert_eq!(spilled(&result, "A2"), Some(CellValue::Number(5.0)));
    assert_eq!(
        engine.config().array_range(&cell("A1")),
        Some(CellRange::parse("A1:A2").unwrap())
    );
    // A3 is no longer covered
    assert_eq!(value(&result, "B1"), Some(CellValue::Empty));
}

#[test]
fn test_number_format_inference() {
    let book = book(|s| {
        s.set_value("A1", 0.25).unwrap();
        s.set_formula("B1", "=A1*2").unwrap();
        s.set_formula("C1", "=B1+1").unwrap();
        s.set_formula("D1", "=SUM(A1:A2)").unwrap();
    });
    let mut engine = load(book, |c| {
        let mut formats = CellMatrix::new();
        formats.insert(0, 0, "0.00%".to_string());
        let mut sheets = FastMap::default();
        sheets.insert("s1".to_string(), formats);
        c.numfmt_item_map.insert("u1".to_string(), sheets);
        c.force_calculate = true;
    });

    let result = completed(engine.calculate());
    assert_eq!(result.number_format("u1", "s1", 0, 1), Some("0.00%"));
    // Inferred formats chain through formulas
    assert_eq!(result.number_format("u1", "s1", 0, 2), Some("0.00%"));
    // A leading range does not give a format
    assert_eq!(result.number_format("u1", "s1", 0, 3), None);
}

#[test]
fn test_edit_then_recalculate() {
    let book = book(|s| {
        s.set_value("C1", 5.0).unwrap();
        s.set_formula("B1", "=C1+1").unwrap();
        s.set_formula("A1", "=B1+1").unwrap();
    });
    let mut engine = load(book, |c| c.force_calculate = true);
    completed(engine.calculate());

    // The committed pass leaves nothing dirty
    assert_eq!(completed(engine.calculate()).stats.cells_calculated, 0);

    engine.set_cell(&cell("C1"), CellData::with_value(10.0)).unwrap();
    let result = completed(engine.calculate());
    assert_eq!(value(&result, "A1"), Some(CellValue::Number(12.0)));
    assert_eq!(result.stats.cells_calculated, 2);
    assert_eq!(
        engine.unit_data().value("u1", "s1", 0, 0),
        Some(CellValue::Number(12.0))
    );
}

#[test]
fn test_apply_to_snapshot() {
    let book = book(|s| {
        s.set_value("A1", 2.0).unwrap();
        s.set_formula("A2", "=A1^2").unwrap();
    });
    let mut snapshot: UnitData = std::iter::once(book.clone()).collect();
    let mut engine = load(book, |c| c.force_calculate = true);

    let result = completed(engine.calculate());
    result.apply_to(&mut snapshot);
    assert_eq!(snapshot.value("u1", "s1", 1, 0), Some(CellValue::Number(4.0)));
    // The formula survives
    assert!(snapshot.cell("u1", "s1", 1, 0).unwrap().is_formula());
}

#[test]
fn test_dirty_defined_name() {
    let book = book(|s| {
        s.set_formula("A1", "=Rate*2").unwrap();
        s.set_formula("A2", "=5").unwrap();
    });
    let mut engine = load(book, |c| {
        let mut names = FastMap::default();
        names.insert("Rate".to_string(), "=0.25".to_string());
        c.dirty_defined_name_map.insert("u1".to_string(), names);
    });

    let result = completed(engine.calculate());
    assert_eq!(value(&result, "A1"), Some(CellValue::Number(0.5)));
    assert_eq!(value(&result, "A2"), None);
}

#[test]
fn test_other_formulas_and_features() {
    let book = book(|s| {
        s.set_value("A1", 3.0).unwrap();
    });
    let mut engine = load(book, |c| {
        let mut items = FastMap::default();
        items.insert(
            "cf1".to_string(),
            OtherFormulaItem::new("=A1>2", vec![CellRange::parse("C1:C5").unwrap()]),
        );
        let mut sheets = FastMap::default();
        sheets.insert("s1".to_string(), items);
        c.other_formula_data.insert("u1".to_string(), sheets);

        c.feature_dependencies.push(FeatureDependency {
            unit_id: "u1".into(),
            sheet_id: "s1".into(),
            feature_id: "pivot".into(),
            dependencies: vec![cell("A1").range()],
            outputs: vec![cell("E1").range()],
        });
        c.dirty_ranges = vec![cell("A1").range()];
    });

    let result = completed(engine.calculate());
    let key = OtherFormulaKey::new("u1", "s1", "cf1");
    assert_eq!(result.other_values.get(&key), Some(&Value::Boolean(true)));
    assert_eq!(result.dirty_features.len(), 1);
    assert_eq!(result.dirty_features[0].feature_id, "pivot");
}

#[test]
fn test_volatile_recalculates() {
    let book = book(|s| {
        s.set_formula("A1", "=RAND()").unwrap();
        s.set_formula("A2", "=1+1").unwrap();
    });
    let mut engine = load(book, |_| {});

    let result = completed(engine.calculate());
    assert_eq!(result.stats.cells_calculated, 1);
    assert_eq!(result.stats.volatile_cells, 1);

    engine.set_options(CalculationOptions {
        calculate_volatile: false,
        ..Default::default()
    });
    assert_eq!(completed(engine.calculate()).stats.cells_calculated, 0);
}

#[test]
fn test_stale_generation_is_superseded() {
    let book = book(|s| {
        s.set_formula("A1", "=BUMP()").unwrap();
    });
    let mut engine = load(book, |c| c.force_calculate = true);
    let counter = engine.generation_counter();
    engine.register_function(FunctionDef::new("BUMP", 0, Some(0), move |_, _| {
        counter.issue();
        Value::Number(1.0)
    }));

    let outcome = engine.calculate();
    assert!(outcome.is_superseded());

    // A superseded pass commits nothing, so the work is still dirty
    engine.register_function(FunctionDef::new("BUMP", 0, Some(0), |_, _| Value::Number(1.0)));
    let result = completed(engine.calculate());
    assert_eq!(value(&result, "A1"), Some(CellValue::Number(1.0)));
}
