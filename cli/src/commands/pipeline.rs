use anyhow::Result;
use soilbase::Pipeline;

pub fn run(_cli: &crate::cli::Cli, args: &crate::cli::RunArgs) -> Result<()> {
    let config = super::load_config(&args.config)?;
    let pipeline = Pipeline::with_http(config)?;
    let report = pipeline.run()?;

    println!(
        "[run] baseline {} ({} countries, {} columns)",
        report.baseline_output.display(), report.baseline_rows, report.baseline_columns
    );
    if !report.boundary_gaps.is_empty() {
        println!("[run] no boundaries for: {}", report.boundary_gaps.join(", "));
    }
    for failed in report.failures() {
        println!("[run] {} skipped: {}", failed.variable, failed.error.as_deref().unwrap_or_default());
    }
    for job in &report.joins {
        println!(
            "[run] {} -> {}: {} rows, {} without baseline, {} anomalies",
            job.input.display(), job.output.display(),
            job.report.total_rows, job.report.missing_count, job.report.anomalies.len()
        );
    }

    if let Some(path) = &args.report {
        report.write_json(path)?;
        println!("[run] report written to {}", path.display());
    }
    Ok(())
}
