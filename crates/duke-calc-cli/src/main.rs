//! duke-calc CLI - evaluate and recalculate spreadsheet formulas

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use duke_calc::formula::lexer::LexNode;
use duke_calc::prelude::*;
use duke_calc::{parse_formula, tokenize};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "dukecalc")]
#[command(author, version, about = "Spreadsheet formula engine", long_about = None)]
struct Cli {
    /// Log engine activity (RUST_LOG overrides the level)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Where the workbooks come from
#[derive(clap::Args)]
struct Source {
    /// Dataset configuration (JSON)
    #[arg(short, long, value_name = "FILE", conflicts_with = "units")]
    data: Option<PathBuf>,

    /// Bare workbook snapshot (JSON map of unit id to workbook)
    #[arg(long, value_name = "FILE")]
    units: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a single formula
    Eval {
        /// Formula text, with or without the leading '='
        formula: String,

        #[command(flatten)]
        source: Source,

        /// Unit the formula is evaluated in (defaults to the first loaded)
        #[arg(long)]
        unit: Option<String>,

        /// Sheet the formula is evaluated on (defaults to the first of the unit)
        #[arg(long)]
        sheet: Option<String>,

        /// Current cell, e.g. "C5"
        #[arg(short, long, default_value = "A1")]
        at: String,

        /// Wait for functions that answer later
        #[arg(long = "async")]
        wait: bool,
    },

    /// Print the tokens of a formula
    Tokens {
        /// Formula text
        formula: String,
    },

    /// Print the parsed tree of a formula
    Ast {
        /// Formula text
        formula: String,

        /// Print the full debug tree instead of the normalized formula
        #[arg(long)]
        debug: bool,
    },

    /// Recalculate a snapshot and print the results
    Recalc {
        #[command(flatten)]
        source: Source,

        /// Recalculate every formula, not just dirty ones
        #[arg(short, long)]
        force: bool,

        /// Print results as JSON
        #[arg(long)]
        json: bool,

        /// Wait for functions that answer later
        #[arg(long = "async")]
        wait: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Eval {
            formula,
            source,
            unit,
            sheet,
            at,
            wait,
        } => eval(&formula, &source, unit, sheet, &at, wait).await,
        Commands::Tokens { formula } => {
            print_tokens(&formula);
            Ok(())
        }
        Commands::Ast { formula, debug } => {
            let node = parse_formula(&formula);
            if debug {
                println!("{:#?}", node);
            } else {
                println!("{}", node);
            }
            Ok(())
        }
        Commands::Recalc {
            source,
            force,
            json,
            wait,
        } => recalc(&source, force, json, wait).await,
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read '{}'", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Failed to parse '{}'", path.display()))
}

fn load_config(source: &Source) -> Result<FormulaDatasetConfig> {
    if let Some(path) = &source.data {
        let config: FormulaDatasetConfig = read_json(path)?;
        tracing::info!(path = %path.display(), "loaded dataset configuration");
        return Ok(config);
    }
    if let Some(path) = &source.units {
        let units: UnitData = read_json(path)?;
        tracing::info!(path = %path.display(), units = units.units().count(), "loaded snapshot");
        return Ok(FormulaDatasetConfig {
            all_unit_data: Some(units),
            ..Default::default()
        });
    }
    Ok(FormulaDatasetConfig::default())
}

/// Lowest unit id, so runs are repeatable
fn default_unit(data: &UnitData) -> Option<String> {
    data.units().map(|unit| unit.id()).min().map(str::to_string)
}

async fn eval(
    formula: &str,
    source: &Source,
    unit: Option<String>,
    sheet: Option<String>,
    at: &str,
    wait: bool,
) -> Result<()> {
    let at = CellAddress::parse(at).with_context(|| format!("Invalid cell '{}'", at))?;

    let mut engine = FormulaEngine::new(FunctionRegistry::with_builtins());
    engine.load(load_config(source)?);

    let unit_id = unit
        .or_else(|| default_unit(engine.unit_data()))
        .unwrap_or_default();
    let sheet_id = match sheet {
        Some(sheet) => sheet,
        None => engine
            .unit_data()
            .unit(&unit_id)
            .and_then(|u| u.sheets().next())
            .map(|s| s.id().to_string())
            .unwrap_or_default(),
    };
    tracing::debug!(unit = %unit_id, sheet = %sheet_id, cell = %at, "evaluating");

    let value = if wait {
        engine
            .evaluate_formula_async(formula, &unit_id, &sheet_id, at.row, at.col)
            .await
    } else {
        engine.evaluate_formula(formula, &unit_id, &sheet_id, at.row, at.col)
    };
    println!("{}", value);
    Ok(())
}

fn print_tokens(formula: &str) {
    let tree = tokenize(formula);
    for token in tree.tokens() {
        println!(
            "{:>4}..{:<4} {:?}",
            token.span.start, token.span.end, token.kind
        );
    }
    print_malformed(&tree.nodes);
}

fn print_malformed(nodes: &[LexNode]) {
    for node in nodes {
        match node {
            LexNode::Malformed(m) => {
                eprintln!("malformed at {}..{}: {}", m.span.start, m.span.end, m.reason)
            }
            LexNode::Group(group) => {
                if !group.closed {
                    eprintln!("unclosed group at {}", group.span.start);
                }
                print_malformed(&group.children);
            }
            LexNode::Token(_) => {}
        }
    }
}

async fn recalc(source: &Source, force: bool, json: bool, wait: bool) -> Result<()> {
    if source.data.is_none() && source.units.is_none() {
        bail!("recalc needs --data or --units");
    }
    let mut config = load_config(source)?;
    config.force_calculate |= force;

    let mut engine = FormulaEngine::new(FunctionRegistry::with_builtins());
    engine.load(config);

    let outcome = if wait {
        engine.calculate_async().await
    } else {
        engine.calculate()
    };
    let result = match outcome {
        CalculationOutcome::Completed(result) => result,
        CalculationOutcome::Superseded { generation } => {
            bail!("calculation was superseded by generation {}", generation)
        }
    };

    let rows = result_rows(&result);
    if json {
        let cells: Vec<serde_json::Value> = rows
            .iter()
            .map(|(unit, sheet, address, value)| {
                serde_json::json!({
                    "unit": unit,
                    "sheet": sheet,
                    "cell": address,
                    "value": value,
                })
            })
            .collect();
        let out = serde_json::json!({
            "cells": cells,
            "stats": {
                "formula_count": result.stats.formula_count,
                "cells_calculated": result.stats.cells_calculated,
                "circular_references": result.stats.circular_references,
                "volatile_cells": result.stats.volatile_cells,
                "errors": result.stats.errors,
            },
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&out).context("Failed to render results")?
        );
    } else {
        for (unit, sheet, address, value) in &rows {
            println!("{}/{}!{}\t{}", unit, sheet, address, value);
        }
    }

    let stats = &result.stats;
    eprintln!(
        "Calculated {} of {} formulas ({} circular, {} volatile, {} errors)",
        stats.cells_calculated,
        stats.formula_count,
        stats.circular_references,
        stats.volatile_cells,
        stats.errors
    );
    Ok(())
}

/// Results flattened and sorted by unit, sheet, row, column
fn result_rows(result: &CalculationResult) -> Vec<(String, String, String, CellValue)> {
    let mut cells = Vec::new();
    for (unit_id, sheets) in &result.values {
        for (sheet_id, matrix) in sheets {
            for (row, col, value) in matrix.iter() {
                cells.push((unit_id.clone(), sheet_id.clone(), row, col, value.clone()));
            }
        }
    }
    cells.sort_by(|a, b| (&a.0, &a.1, a.2, a.3).cmp(&(&b.0, &b.1, b.2, b.3)));
    cells
        .into_iter()
        .map(|(unit, sheet, row, col, value)| {
            (unit, sheet, CellAddress::new(row, col).to_a1_string(), value)
        })
        .collect()
}
