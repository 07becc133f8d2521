use std::{env, path::PathBuf};

use order_report::{run, ReportConfig, Result};

use anyhow::Error;
use tracing_subscriber::{fmt, EnvFilter};

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder().with_env_filter(filter).init();

    let args: Vec<String> = env::args().collect();
    if args.len() > 3 {
        return Err(Error::msg(
            "Usage: ./order-report [path/to/orders.csv [path/to/report.csv]]",
        ));
    }

    let mut config = ReportConfig::default();
    if let Some(input) = args.get(1) {
        config.input = PathBuf::from(input);
    }
    if let Some(output) = args.get(2) {
        config.output = PathBuf::from(output);
    }

    let report = run(&config)?;
    println!(
        "The order report was written as CSV to file {}",
        config.output.to_string_lossy()
    );
    println!("Sum: {}", report.sum);
    println!("{}: {}", config.calc.count_label, report.item_count);

    Ok(())
}
