use std::{fs, path::Path};

use anyhow::{Context, Error};
use calamine::{open_workbook_auto, Data, ExcelDateTime, Range, Reader};
use time::OffsetDateTime;
use tracing::{debug, info};

use crate::{Result, Row, Table, DATE_FMT};

pub const DEFAULT_DELIMITER: u8 = b';';

const WORKBOOK_EXTENSIONS: [&str; 5] = ["xlsx", "xlsm", "xlsb", "xls", "ods"];

#[derive(Debug, Clone)]
pub struct ReaderConfig {
    /// Field separator for delimited text input.
    pub delimiter: u8,
    /// Worksheet to read from a workbook. The first sheet when unset.
    pub sheet: Option<String>,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            delimiter: DEFAULT_DELIMITER,
            sheet: None,
        }
    }
}

/// Loads the whole order table, header row first.
///
/// Workbook files go through calamine, anything else is parsed as delimited
/// text. A single malformed record fails the whole read.
pub fn read_orders<P: AsRef<Path>>(file_path: P, config: &ReaderConfig) -> Result<Table> {
    let file_path = file_path.as_ref();
    let rows = if is_workbook(file_path) {
        read_workbook(file_path, config.sheet.as_deref())?
    } else {
        read_delimited(file_path, config.delimiter)?
    };
    info!(
        "read {} rows from {}",
        rows.len(),
        file_path.to_string_lossy()
    );
    Ok(rows)
}

fn is_workbook(file_path: &Path) -> bool {
    file_path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| WORKBOOK_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn read_delimited(file_path: &Path, delimiter: u8) -> Result<Table> {
    let data = fs::read(file_path)
        .with_context(|| format!("cannot open '{}'", file_path.to_string_lossy()))?;
    let read_context = || {
        format!(
            "cannot read CSV data from '{}'",
            file_path.to_string_lossy()
        )
    };
    check_quoting(&data, delimiter).with_context(read_context)?;

    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .from_reader(data.as_slice());

    let mut rows = Vec::new();
    for record in rdr.records() {
        let record = record.with_context(read_context)?;
        rows.push(record.iter().map(String::from).collect());
    }
    Ok(rows)
}

#[derive(Debug, Clone, Copy)]
enum QuoteState {
    FieldStart,
    Unquoted,
    Quoted,
    QuoteInQuoted,
}

/// Rejects the quoting mistakes the csv tokenizer lets through: a `"` inside
/// an unquoted field, text right after a closing quote, and a quoted field
/// still open at the end of the input.
fn check_quoting(data: &[u8], delimiter: u8) -> Result<()> {
    let mut state = QuoteState::FieldStart;
    let mut line = 1;
    let mut quote_line = 1;
    for &b in data {
        state = match (state, b) {
            (QuoteState::Quoted, b'"') => QuoteState::QuoteInQuoted,
            (QuoteState::Quoted, _) => QuoteState::Quoted,
            (QuoteState::QuoteInQuoted, b'"') => QuoteState::Quoted,
            (QuoteState::FieldStart, b'"') => {
                quote_line = line;
                QuoteState::Quoted
            }
            (QuoteState::Unquoted, b'"') => {
                return Err(Error::msg(format!(
                    "bare \" in unquoted field on line {}",
                    line
                )))
            }
            (_, b'\n' | b'\r') => QuoteState::FieldStart,
            (_, _) if b == delimiter => QuoteState::FieldStart,
            (QuoteState::QuoteInQuoted, _) => {
                return Err(Error::msg(format!(
                    "extraneous \" after quoted field on line {}",
                    line
                )))
            }
            _ => QuoteState::Unquoted,
        };
        if b == b'\n' {
            line += 1;
        }
    }
    if let QuoteState::Quoted = state {
        return Err(Error::msg(format!(
            "quoted field starting on line {} is never closed",
            quote_line
        )));
    }
    Ok(())
}

fn read_workbook(file_path: &Path, sheet: Option<&str>) -> Result<Table> {
    let mut workbook = open_workbook_auto(file_path)
        .with_context(|| format!("cannot open '{}'", file_path.to_string_lossy()))?;
    let sheet = match sheet {
        Some(name) => name.to_string(),
        None => workbook
            .sheet_names()
            .into_iter()
            .next()
            .context("workbook has no sheets")?,
    };
    debug!("reading sheet {}", sheet);
    let range = workbook
        .worksheet_range(&sheet)
        .with_context(|| format!("cannot read sheet '{}'", sheet))?;
    sheet_to_table(&range, &sheet)
}

/// Sheet ranges are rectangular: short rows come back padded with empty cells.
fn sheet_to_table(range: &Range<Data>, sheet: &str) -> Result<Table> {
    let (first_row, first_col) = range.start().unwrap_or((0, 0));

    range
        .rows()
        .enumerate()
        .map(|(i, r)| -> Result<Row> {
            r.iter()
                .enumerate()
                .map(|(j, cell)| {
                    cell_to_text(cell).with_context(|| {
                        format!(
                            "bad cell at row {}, column {} of sheet '{}'",
                            first_row as usize + i + 1,
                            first_col as usize + j + 1,
                            sheet
                        )
                    })
                })
                .collect()
        })
        .collect()
}

fn cell_to_text(cell: &Data) -> Result<String> {
    let text = match cell {
        Data::Empty => String::new(),
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => f.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) if dt.is_duration() => dt.as_f64().to_string(),
        Data::DateTime(dt) => cell_date(dt)?,
        Data::Error(e) => return Err(Error::msg(format!("cell holds error {}", e))),
    };
    Ok(text)
}

/// First serial past 9999-12-31 in the 1900 date system.
const MAX_DATE_SERIAL: f64 = 2_958_466.;

/// Date cell to `YYYY-MM-DD`, time of day dropped. calamine applies the
/// workbook's 1900 or 1904 date system.
fn cell_date(dt: &ExcelDateTime) -> Result<String> {
    let serial = dt.as_f64();
    if !(0. ..MAX_DATE_SERIAL).contains(&serial) {
        return Err(Error::msg(format!("invalid date serial {}", serial)));
    }
    let datetime = dt
        .as_datetime()
        .with_context(|| format!("date serial {} out of range", serial))?;
    let date = OffsetDateTime::from_unix_timestamp(datetime.and_utc().timestamp())?.date();
    Ok(date.format(DATE_FMT)?)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use calamine::{CellErrorType, ExcelDateTimeType};

    use super::*;

    fn read_text(text: &str) -> Result<Table> {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(text.as_bytes()).unwrap();
        read_orders(file.path(), &ReaderConfig::default())
    }

    fn date_cell(serial: f64, is_1904: bool) -> ExcelDateTime {
        ExcelDateTime::new(serial, ExcelDateTimeType::DateTime, is_1904)
    }

    #[test]
    fn test_read_orders() {
        let rows = read_orders("test-inputs/orders.csv", &ReaderConfig::default()).unwrap();
        assert_eq!(rows.len(), 9);
        assert_eq!(
            rows[0],
            vec!["Date", "Order ID", "Order Item", "Unit Price", "Quantity"]
        );
        assert_eq!(rows[2], vec!["2017-11-17", "2", "Notebook", "12.99", "10"]);
        assert!(rows.iter().all(|r| r.len() == 5));
    }

    #[test]
    fn custom_delimiter() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "a|b\n\"c|d\"|e").unwrap();
        let config = ReaderConfig {
            delimiter: b'|',
            ..Default::default()
        };
        let rows = read_orders(file.path(), &config).unwrap();
        assert_eq!(rows, vec![vec!["a", "b"], vec!["c|d", "e"]]);
    }

    #[test]
    fn quoted_fields() {
        let rows = read_text("Item;Note\r\n\"Pen; blue\";\"say \"\"hi\"\"\nthere\"\r\n").unwrap();
        assert_eq!(
            rows,
            vec![vec!["Item", "Note"], vec!["Pen; blue", "say \"hi\"\nthere"]]
        );
    }

    #[test]
    fn missing_file() {
        let err = read_orders("test-inputs/missing.csv", &ReaderConfig::default()).unwrap_err();
        assert!(err.to_string().contains("cannot open"));
    }

    #[test]
    fn ragged_rows_fail_the_read() {
        let err = read_orders("test-inputs/ragged.csv", &ReaderConfig::default()).unwrap_err();
        assert!(err.to_string().contains("cannot read CSV data"));
    }

    #[test]
    fn unterminated_quote_fails_the_read() {
        let err = read_text(
            "Date;Order ID;Order Item;Unit Price;Quantity\n2017-11-19;8;Ball Pen;1.99;\"60",
        )
        .unwrap_err();
        assert!(err.to_string().contains("cannot read CSV data"));
        assert_eq!(
            err.root_cause().to_string(),
            "quoted field starting on line 2 is never closed"
        );
    }

    #[test]
    fn bare_quote_fails_the_read() {
        let err = read_text(
            "Date;Order ID;Order Item;Unit Price;Quantity\n2017-11-19;8;Ball \"Pen;1.99;60\n",
        )
        .unwrap_err();
        assert_eq!(
            err.root_cause().to_string(),
            "bare \" in unquoted field on line 2"
        );
    }

    #[test]
    fn text_after_closing_quote_fails_the_read() {
        let err = read_text("Item;Quantity\n\"Ball\" Pen;60\n").unwrap_err();
        assert_eq!(
            err.root_cause().to_string(),
            "extraneous \" after quoted field on line 2"
        );
    }

    #[test]
    fn invalid_utf8_fails_the_read() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"Date;Item\n2017-11-17;\xff\xfe\n").unwrap();
        assert!(read_orders(file.path(), &ReaderConfig::default()).is_err());
    }

    #[test]
    fn workbook_extensions() {
        assert!(is_workbook(Path::new("orders.xlsx")));
        assert!(is_workbook(Path::new("ORDERS.ODS")));
        assert!(!is_workbook(Path::new("orders.csv")));
        assert!(!is_workbook(Path::new("orders")));
    }

    #[test]
    fn sheet_rows() {
        let mut range = Range::new((0, 0), (1, 4));
        for (col, h) in ["Date", "Order ID", "Order Item", "Unit Price", "Quantity"]
            .into_iter()
            .enumerate()
        {
            range.set_value((0, col as u32), Data::String(h.to_string()));
        }
        range.set_value((1, 0), Data::DateTime(date_cell(43056., false)));
        range.set_value((1, 1), Data::Int(1));
        range.set_value((1, 2), Data::String("Ball Pen".to_string()));
        range.set_value((1, 3), Data::Float(1.99));
        range.set_value((1, 4), Data::Float(50.));

        let rows = sheet_to_table(&range, "Orders").unwrap();
        assert_eq!(rows[1], vec!["2017-11-17", "1", "Ball Pen", "1.99", "50"]);
    }

    #[test]
    fn short_sheet_row_is_padded_then_rejected() {
        let mut range = Range::new((0, 0), (1, 4));
        for col in 0..5 {
            range.set_value((0, col), Data::String(format!("h{}", col)));
        }
        range.set_value((1, 0), Data::String("2017-11-17".to_string()));
        range.set_value((1, 1), Data::Int(1));
        range.set_value((1, 2), Data::String("Ball Pen".to_string()));
        range.set_value((1, 3), Data::Float(1.99));

        let rows = sheet_to_table(&range, "Orders").unwrap();
        assert_eq!(rows[1], vec!["2017-11-17", "1", "Ball Pen", "1.99", ""]);

        let err = crate::calculate(rows, &Default::default()).unwrap_err();
        assert!(matches!(
            err,
            crate::CalcError::Quantity { item, .. } if item == "Ball Pen"
        ));
    }

    #[test]
    fn wide_sheet_row_is_rejected() {
        let mut range = Range::new((0, 0), (1, 5));
        range.set_value((1, 5), Data::String("stray".to_string()));

        let rows = sheet_to_table(&range, "Orders").unwrap();
        assert!(rows.iter().all(|r| r.len() == 6));
        assert!(matches!(
            crate::calculate(rows, &Default::default()),
            Err(crate::CalcError::ColumnCount { row: 0, found: 6 })
        ));
    }

    #[test]
    fn bad_sheet_cell_names_its_position() {
        let mut range = Range::new((2, 1), (2, 1));
        range.set_value((2, 1), Data::Error(CellErrorType::Value));

        let err = sheet_to_table(&range, "Orders").unwrap_err();
        assert_eq!(
            err.to_string(),
            "bad cell at row 3, column 2 of sheet 'Orders'"
        );
    }

    #[test]
    fn cells_become_text() {
        assert_eq!(cell_to_text(&Data::Empty).unwrap(), "");
        assert_eq!(
            cell_to_text(&Data::String("Ball Pen".to_string())).unwrap(),
            "Ball Pen"
        );
        assert_eq!(cell_to_text(&Data::Int(50)).unwrap(), "50");
        assert_eq!(cell_to_text(&Data::Float(50.)).unwrap(), "50");
        assert_eq!(cell_to_text(&Data::Float(1.99)).unwrap(), "1.99");
        assert_eq!(cell_to_text(&Data::Bool(true)).unwrap(), "true");
        assert!(cell_to_text(&Data::Error(CellErrorType::Value)).is_err());
    }

    #[test]
    fn date_cells() {
        assert_eq!(cell_date(&date_cell(43056., false)).unwrap(), "2017-11-17");
        assert_eq!(cell_date(&date_cell(43056.75, false)).unwrap(), "2017-11-17");
        assert_eq!(cell_date(&date_cell(1., false)).unwrap(), "1900-01-01");
        assert_eq!(cell_date(&date_cell(61., false)).unwrap(), "1900-03-01");
    }

    #[test]
    fn date_cells_in_1904_workbooks() {
        assert_eq!(cell_date(&date_cell(41594., true)).unwrap(), "2017-11-17");
        assert_eq!(cell_date(&date_cell(0., true)).unwrap(), "1904-01-01");
    }

    #[test]
    fn out_of_range_date_cells_are_errors() {
        assert!(cell_date(&date_cell(-1., false)).is_err());
        assert!(cell_date(&date_cell(1e300, false)).is_err());
        assert!(cell_date(&date_cell(f64::NAN, false)).is_err());
        assert!(cell_to_text(&Data::DateTime(date_cell(1e300, true))).is_err());
    }
}
