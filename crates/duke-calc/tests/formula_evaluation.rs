//! Tests for one-off formula evaluation through the engine

use duke_calc::prelude::*;
use pretty_assertions::assert_eq;

fn engine() -> FormulaEngine {
    let mut book = Workbook::new("book1");
    let sheet = book.add_sheet(Worksheet::new("sheet1", "Sheet1")).unwrap();
    sheet.set_value("A1", 10.0).unwrap();
    sheet.set_value("A2", 20.0).unwrap();
    sheet.set_value("A3", 30.0).unwrap();
    sheet.set_value("B1", "hello").unwrap();

    let other = book.add_sheet(Worksheet::new("sheet2", "Data Sheet")).unwrap();
    other.set_value("A1", 5.0).unwrap();

    book.define_name(DefinedName::new("Total", "=SUM(Sheet1!$A$1:$A$3)"))
        .unwrap();

    let mut engine = FormulaEngine::new(FunctionRegistry::with_builtins());
    engine.load(FormulaDatasetConfig {
        all_unit_data: Some(std::iter::once(book).collect()),
        ..Default::default()
    });
    engine
}

fn eval(formula: &str) -> Value {
    engine().evaluate_formula(formula, "book1", "sheet1", 0, 0)
}

/// ROWS over references, scalars and nothing at all
#[test]
fn test_rows_scenarios() {
    assert_eq!(eval("=ROWS(C2:F3)"), Value::Number(2.0));
    assert_eq!(eval("=ROWS(A1)"), Value::Number(1.0));
    assert_eq!(eval("=ROWS(\"A5\")"), Value::Number(1.0));
    assert_eq!(eval("=ROWS(TRUE)"), Value::Number(1.0));
    assert_eq!(eval("=ROWS(7)"), Value::Number(1.0));
    assert_eq!(eval("=ROWS()"), Value::Error(CellError::Na));
}

/// Errors are values, not failures
#[test]
fn test_error_values() {
    assert_eq!(eval("=1/0"), Value::Error(CellError::Div0));
    assert_eq!(eval("=UNKNOWNFN()"), Value::Error(CellError::Name));
    assert_eq!(eval("=NoSuchName+1"), Value::Error(CellError::Name));
    assert_eq!(eval("=Missing!A1"), Value::Error(CellError::Ref));
    assert_eq!(eval("=(1/0)+UNKNOWNFN()"), Value::Error(CellError::Div0));
}

#[test]
fn test_arithmetic_and_text() {
    assert_eq!(eval("=1+2*3"), Value::Number(7.0));
    assert_eq!(eval("=2^3^2"), Value::Number(64.0));
    assert_eq!(eval("=\"Hello \"&\"World\""), Value::text("Hello World"));
    assert_eq!(eval("=5>3"), Value::Boolean(true));
    assert_eq!(eval("=50%"), Value::Number(0.5));
}

#[test]
fn test_cell_references() {
    assert_eq!(eval("=A1+A2"), Value::Number(30.0));
    assert_eq!(eval("=SUM(A1:A3)"), Value::Number(60.0));
    assert_eq!(eval("=B1&\"!\""), Value::text("hello!"));
    assert_eq!(eval("='Data Sheet'!A1*2"), Value::Number(10.0));
    // Blank cells read as zero in arithmetic
    assert_eq!(eval("=Z99+1"), Value::Number(1.0));
}

#[test]
fn test_defined_name() {
    assert_eq!(eval("=Total"), Value::Number(60.0));
    assert_eq!(eval("=total/2"), Value::Number(30.0));
}

#[test]
fn test_current_cell() {
    let mut engine = engine();
    assert_eq!(
        engine.evaluate_formula("=ROW()*100+COLUMN()", "book1", "sheet1", 4, 2),
        Value::Number(503.0)
    );

    engine.set_current(9, 0, 100, 10, "sheet1", "book1");
    assert_eq!(engine.evaluate_current("=ROW()"), Value::Number(10.0));
}

#[test]
fn test_custom_function() {
    let mut engine = engine();
    engine.register_function(FunctionDef::new("DOUBLE", 1, Some(1), |args, _| {
        match args[0].as_number() {
            Some(n) => Value::Number(n * 2.0),
            None => Value::Error(CellError::Value),
        }
    }));

    assert_eq!(
        engine.evaluate_formula("=DOUBLE(A2)", "book1", "sheet1", 0, 0),
        Value::Number(40.0)
    );
    assert_eq!(
        engine.evaluate_formula("=DOUBLE()", "book1", "sheet1", 0, 0),
        Value::Error(CellError::Na)
    );
}

#[test]
fn test_deeply_nested_formula_is_calc() {
    let n = 5000;
    let formula = format!("={}1{}", "(".repeat(n), ")".repeat(n));
    assert_eq!(eval(&formula), Value::Error(CellError::Calc));
    assert_eq!(eval("=((((1+2))))*2"), Value::Number(6.0));
}

#[test]
fn test_panicking_function_is_calc() {
    let mut engine = engine();
    engine.register_function(FunctionDef::new("EXPLODE", 0, Some(0), |_, _| {
        panic!("executor failure")
    }));

    assert_eq!(
        engine.evaluate_formula("=EXPLODE()", "book1", "sheet1", 0, 0),
        Value::Error(CellError::Calc)
    );
}
