use anyhow::Result;
use soilbase::{join_files, CountryBaseline};

pub fn run(_cli: &crate::cli::Cli, args: &crate::cli::JoinArgs) -> Result<()> {
    let config = super::load_config(&args.config)?;
    let key = args.key.as_deref().unwrap_or(&config.join_key);

    let baseline = CountryBaseline::read_csv(&args.baseline)?;
    let report = join_files(&baseline, &args.input, &args.output, key, &config.bounds)?;

    println!("[join] {} rows written to {}", report.total_rows, args.output.display());
    if report.coerced_years > 0 {
        println!("[join] {} year values were not whole years and became empty", report.coerced_years);
    }
    if report.missing_count > 0 {
        println!("[join] {} rows without baseline; keys: {}", report.missing_count, report.missing_keys.join(", "));
        for pair in &report.missing_pairs {
            println!("[join]   year={:?} key={:?}", pair.year, pair.key);
        }
    }
    for anomaly in &report.anomalies {
        println!(
            "[join] anomaly {} {}{}: {} outside [{}, {}]",
            anomaly.country_code,
            anomaly.column,
            anomaly.year.map(|y| format!(" ({y})")).unwrap_or_default(),
            anomaly.value, anomaly.min, anomaly.max
        );
    }
    Ok(())
}
