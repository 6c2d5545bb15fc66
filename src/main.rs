use anyhow::Result;
use std::env;
use std::path::{Path, PathBuf};

use cecl_engine::{build_report, load_table, pipeline, ReportStore, RunConfig};

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: cecl-engine <config.json> [data-file] [--report-db <path>]");
        std::process::exit(2);
    }

    let config_path = PathBuf::from(&args[1]);
    let mut data_path: Option<PathBuf> = None;
    let mut report_db = PathBuf::from("reports.db");

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--report-db" => {
                i += 1;
                let path = args.get(i).ok_or_else(|| {
                    anyhow::anyhow!("--report-db requires a path argument")
                })?;
                report_db = PathBuf::from(path);
            }
            other => data_path = Some(PathBuf::from(other)),
        }
        i += 1;
    }

    run(&config_path, data_path.as_deref(), &report_db)
}

fn run(config_path: &Path, data_path: Option<&Path>, report_db: &Path) -> Result<()> {
    println!("CECL Engine v{}", cecl_engine::VERSION);

    // 1. Load configuration
    let config = RunConfig::from_file(config_path)?;
    println!("✓ Configuration loaded from {}", config_path.display());

    // 2. Ingest raw data
    let table = load_table(&config, data_path)?;
    println!(
        "✓ Ingested {} rows, {} columns",
        table.row_count(),
        table.columns.len()
    );

    // 3. Run the model
    let metrics = pipeline::run(&config, table)?;
    println!("✓ Model run complete");
    println!("  {}", metrics.summary());

    // 4. Persist the report
    let source_file = data_path.map(|p| p.display().to_string());
    let report = build_report(&metrics, "TMM_REPORT", source_file.as_deref());
    let store = ReportStore::open(report_db)?;
    let report_id = store.save(&report)?;
    println!("✓ Report saved to {} with id {}", report_db.display(), report_id);

    Ok(())
}
