use std::path::PathBuf;

use anyhow::{Context, Error};
use time::{format_description::BorrowedFormatItem, macros::format_description};
use tracing::info;

pub mod calculator;
pub mod money;
pub mod reader;
pub mod writer;

pub use calculator::{calculate, CalcConfig, CalcError, OrderReport};
pub use money::{Cents, CentsStyle, MoneyError};
pub use reader::{read_orders, ReaderConfig};
pub use writer::{write_orders, write_orders_to};

pub type Result<T> = std::result::Result<T, Error>;

pub type Row = Vec<String>;
pub type Table = Vec<Row>;

pub const DEFAULT_INPUT: &str = "orders.csv";
pub const DEFAULT_OUTPUT: &str = "ordersReport.csv";

static DATE_FMT: &[BorrowedFormatItem] = format_description!("[year]-[month]-[day]");

#[derive(Debug, Clone)]
pub struct ReportConfig {
    pub input: PathBuf,
    pub output: PathBuf,
    pub reader: ReaderConfig,
    pub calc: CalcConfig,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            input: PathBuf::from(DEFAULT_INPUT),
            output: PathBuf::from(DEFAULT_OUTPUT),
            reader: ReaderConfig::default(),
            calc: CalcConfig::default(),
        }
    }
}

/// Reads the orders, computes the totals and writes the report.
pub fn run(config: &ReportConfig) -> Result<OrderReport> {
    let rows = read_orders(&config.input, &config.reader)?;
    let report = calculate(rows, &config.calc).with_context(|| {
        format!(
            "cannot process orders from '{}'",
            config.input.to_string_lossy()
        )
    })?;
    write_orders(&config.output, &report.rows)?;
    info!(
        "report for {} written to {}",
        config.input.to_string_lossy(),
        config.output.to_string_lossy()
    );
    Ok(report)
}
