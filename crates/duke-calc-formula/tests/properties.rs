// Property tests for the formula pipeline.
// CI: 256 cases (default). Soak: PROPTEST_CASES=10000 cargo test --release

use duke_calc_core::{CellError, UnitData, Workbook, Worksheet};
use duke_calc_formula::{parse_formula, shift_formula, FunctionRegistry, Interpreter, RuntimeContext, Value};
use proptest::prelude::*;

fn config() -> ProptestConfig {
    ProptestConfig {
        cases: std::env::var("PROPTEST_CASES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(256),
        failure_persistence: None,
        ..ProptestConfig::default()
    }
}

fn data() -> UnitData {
    let mut sheet = Worksheet::new("s1", "Sheet1");
    for row in 0..5 {
        sheet.set_value_at(row, 0, (row + 1) as f64);
    }
    let mut book = Workbook::new("u1");
    book.add_sheet(sheet).unwrap();
    std::iter::once(book).collect()
}

fn eval(text: &str) -> Value {
    let data = data();
    let registry = FunctionRegistry::with_builtins();
    let mut interpreter = Interpreter::new(&registry, &data, RuntimeContext::new("u1", "s1"));
    interpreter.evaluate_sync(&parse_formula(text))
}

// ---------------------------------------------------------------------------
// Generators
// ---------------------------------------------------------------------------

fn arb_error() -> impl Strategy<Value = CellError> {
    prop::sample::select(CellError::ALL.to_vec())
}

fn arb_operator() -> impl Strategy<Value = &'static str> {
    prop::sample::select(vec!["+", "-", "*", "/", "^", "&", "=", "<>", "<", ">=", "<=", ">"])
}

/// Small arithmetic expressions over literals and A1:A5
fn arb_expression() -> impl Strategy<Value = String> {
    let leaf = prop_oneof![
        (0u32..1000).prop_map(|n| n.to_string()),
        (1u32..=5).prop_map(|r| format!("A{}", r)),
        Just("SUM(A1:A5)".to_string()),
        Just("\"x\"".to_string()),
    ];
    leaf.prop_recursive(3, 16, 2, |inner| {
        (inner.clone(), arb_operator(), inner).prop_map(|(l, op, r)| format!("({}{}{})", l, op, r))
    })
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(config())]

    #[test]
    fn numeric_literal_evaluates_to_itself(whole in 0u32..1_000_000, frac in 0u32..100) {
        let text = format!("{}.{:02}", whole, frac);
        let expected: f64 = text.parse().unwrap();
        prop_assert_eq!(eval(&format!("={}", text)), Value::Number(expected));
    }

    #[test]
    fn evaluation_is_idempotent(expr in arb_expression()) {
        let text = format!("={}", expr);
        let first = eval(&text);
        let second = eval(&text);
        prop_assert_eq!(first, second);
    }

    #[test]
    fn errors_propagate_through_binary_operators(
        error in arb_error(),
        op in arb_operator(),
        n in 0u32..1000,
    ) {
        let left = eval(&format!("={}{}{}", error.as_str(), op, n));
        prop_assert_eq!(left, Value::Error(error));

        let right = eval(&format!("={}{}{}", n, op, error.as_str()));
        prop_assert_eq!(right, Value::Error(error));
    }

    #[test]
    fn rows_of_reference_counts_rows(top in 1u32..50, height in 1u32..50) {
        let text = format!("=ROWS(B{}:C{})", top, top + height - 1);
        prop_assert_eq!(eval(&text), Value::Number(height as f64));
    }

    #[test]
    fn shifting_back_and_forth_is_identity(row in 0u32..100, col in 0u16..20, dy in 0i64..50, dx in 0i64..10) {
        let address = format!(
            "{}{}",
            duke_calc_core::CellAddress::column_to_letters(col),
            row + 1
        );
        let text = format!("=SUM({})*2+$B$2", address);
        let there = shift_formula(&text, dy, dx);
        prop_assert_eq!(shift_formula(&there, -dy, -dx), text);
    }
}
