use std::num::ParseIntError;

use thiserror::Error;
use tracing::{debug, info};

use crate::{
    money::{Cents, CentsStyle, MoneyError},
    Row, Table,
};

pub const TARGET_ITEM: &str = "Ball Pen";
pub const SUM_LABEL: &str = "Sum";
pub const COUNT_LABEL: &str = "Ball Pens";
pub const TOTAL_HEADER: &str = "Total";

/// Number of columns of an order record before the total is appended.
pub const ORDER_COLUMNS: usize = 5;

const ITEM_INDEX: usize = 2;
const PRICE_INDEX: usize = 3;
const QUANTITY_INDEX: usize = 4;

#[derive(Debug, Error)]
pub enum CalcError {
    #[error("missing header row")]
    MissingHeader,
    #[error("row {row} has {found} columns, expected {}", ORDER_COLUMNS)]
    ColumnCount { row: usize, found: usize },
    #[error("cannot retrieve price of {item}: {source}")]
    Price {
        item: String,
        #[source]
        source: MoneyError,
    },
    #[error("cannot retrieve quantity of {item}: {source}")]
    Quantity {
        item: String,
        #[source]
        source: ParseIntError,
    },
    #[error("total of {item} is out of range")]
    Overflow { item: String },
}

#[derive(Debug, Clone)]
pub struct CalcConfig {
    /// Item whose quantities are counted, matched exactly.
    pub target_item: String,
    pub sum_label: String,
    pub count_label: String,
    pub total_header: String,
    pub cents_style: CentsStyle,
}

impl Default for CalcConfig {
    fn default() -> Self {
        Self {
            target_item: TARGET_ITEM.to_string(),
            sum_label: SUM_LABEL.to_string(),
            count_label: COUNT_LABEL.to_string(),
            total_header: TOTAL_HEADER.to_string(),
            cents_style: CentsStyle::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderReport {
    /// Header plus annotated orders plus the two summary rows.
    pub rows: Table,
    pub sum: Cents,
    pub item_count: i64,
}

/// Appends a total to every order and the two summary rows to the table.
pub fn calculate(mut rows: Table, config: &CalcConfig) -> Result<OrderReport, CalcError> {
    let mut sum = Cents::default();
    let mut item_count: i64 = 0;

    let (header, orders) = rows.split_first_mut().ok_or(CalcError::MissingHeader)?;
    check_columns(0, header)?;
    header.push(config.total_header.clone());

    for (i, row) in orders.iter_mut().enumerate() {
        check_columns(i + 1, row)?;
        let item = &row[ITEM_INDEX];

        let price: Cents = row[PRICE_INDEX]
            .parse()
            .map_err(|source| CalcError::Price {
                item: item.clone(),
                source,
            })?;
        let qty: i64 = row[QUANTITY_INDEX]
            .trim()
            .parse()
            .map_err(|source| CalcError::Quantity {
                item: item.clone(),
                source,
            })?;

        let overflow = || CalcError::Overflow { item: item.clone() };
        let total = price.checked_mul(qty).ok_or_else(overflow)?;
        sum = sum.checked_add(total).ok_or_else(overflow)?;
        if *item == config.target_item {
            item_count = item_count.checked_add(qty).ok_or_else(overflow)?;
        }
        debug!("{} x {} of {} = {}", qty, price, item, total);

        row.push(total.format(config.cents_style));
    }
    info!(
        "{} orders, sum {}, {} {}",
        orders.len(),
        sum,
        item_count,
        config.target_item
    );

    rows.push(summary_row(&config.sum_label, "", &sum.format(config.cents_style)));
    rows.push(summary_row(&config.count_label, &item_count.to_string(), ""));

    Ok(OrderReport {
        rows,
        sum,
        item_count,
    })
}

fn check_columns(row: usize, cells: &Row) -> Result<(), CalcError> {
    if cells.len() != ORDER_COLUMNS {
        return Err(CalcError::ColumnCount {
            row,
            found: cells.len(),
        });
    }
    Ok(())
}

fn summary_row(label: &str, quantity: &str, total: &str) -> Row {
    vec![
        String::new(),
        String::new(),
        label.to_string(),
        String::new(),
        quantity.to_string(),
        total.to_string(),
    ]
}
