//! scan-runner: headless fraud scan driver.
//!
//! Usage:
//!   scan-runner --source ops.db --cases cases.db
//!   scan-runner --source ops.db --cases cases.db --interval 300
//!   scan-runner --detectors invoice_anomaly,fuel_theft
//!   scan-runner --seed-demo --list

use anyhow::Result;
use chrono::{Duration, NaiveDateTime};
use fraudwatch_core::{
    case_store::CaseStore,
    config::DetectorConfig,
    registry::DetectorRegistry,
    runner::ScanRunner,
    source::SourceDb,
    types::DetectorKind,
};
use std::env;

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let source_path = str_arg(&args, "--source", ":memory:");
    let cases_path = str_arg(&args, "--cases", ":memory:");
    let config_path = args
        .windows(2)
        .find(|w| w[0] == "--config")
        .map(|w| w[1].clone());
    let interval_secs: u64 = parse_arg(&args, "--interval", 0);
    let seed_demo = args.iter().any(|a| a == "--seed-demo");
    let list_only = args.iter().any(|a| a == "--list");
    let detector_arg = args
        .windows(2)
        .find(|w| w[0] == "--detectors")
        .map(|w| w[1].clone());

    let config = match config_path {
        Some(path) => DetectorConfig::load(&path)?,
        None => DetectorConfig::default(),
    };
    let registry = DetectorRegistry::with_builtin_detectors(&config);

    if list_only {
        println!("{}", serde_json::to_string_pretty(&registry.metadata())?);
        return Ok(());
    }

    let source = SourceDb::open(&source_path)?;
    source.ensure_schema()?;
    if seed_demo {
        seed_demo_data(&source)?;
    }

    let cases = CaseStore::open(&cases_path)?;
    cases.migrate()?;

    let kinds: Option<Vec<DetectorKind>> = match detector_arg {
        Some(raw) => {
            let mut parsed = Vec::new();
            for part in raw.split(',') {
                match part.trim().parse() {
                    Ok(kind) => parsed.push(kind),
                    Err(e) => log::warn!("ignoring --detectors entry: {e}"),
                }
            }
            Some(parsed)
        }
        None => None,
    };

    let runner = ScanRunner::new(registry, source, cases);

    println!("fraudwatch — scan-runner");
    println!("  source: {source_path}");
    println!("  cases:  {cases_path}");
    println!();

    loop {
        let now = chrono::Local::now().naive_local();
        let report = match &kinds {
            Some(kinds) => runner.run_kinds(now, kinds)?,
            None => runner.run_once(now)?,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);

        let stats = runner.cases().get_statistics(None, None)?;
        println!(
            "cases total={} pending={} confirmed={} amount=${:.2}",
            stats.total_cases, stats.pending, stats.confirmed, stats.total_amount
        );

        if interval_secs == 0 {
            break;
        }
        std::thread::sleep(std::time::Duration::from_secs(interval_secs));
    }

    Ok(())
}

fn str_arg(args: &[String], flag: &str, default: &str) -> String {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].clone())
        .unwrap_or_else(|| default.to_string())
}

fn parse_arg<T: std::str::FromStr>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}

/// A small operational extract with something for every heuristic:
/// round-amount clusters, an oversized discount, after-hours sales,
/// an overcapacity dispatch, a same-day refuel burst, an edit storm,
/// and one row with a date the ERP mangled.
fn seed_demo_data(source: &SourceDb) -> Result<()> {
    let now = chrono::Local::now().naive_local();
    let day = |days_ago: i64, h: u32, m: u32| fmt(now - Duration::days(days_ago), h, m);

    source.insert_client("C001", Some("Comercial Andina"), Some("1790012345001"))?;
    source.insert_client("C002", Some("Transportes Rivera"), Some("0992345678001"))?;
    source.insert_client("C003", Some("Distribuidora Sol"), None)?;

    // Round-amount cluster for C001.
    for (i, total) in [600.0, 800.0, 1200.0].iter().enumerate() {
        source.insert_invoice(
            "FV",
            Some(format!("FV-00010{i}").as_str()),
            Some(day(3 + i as i64, 10, 15).as_str()),
            Some("C001"),
            Some(*total),
            Some(0.0),
            Some(0.0),
            None,
        )?;
    }

    // 40% discount for C002.
    source.insert_invoice(
        "FC",
        Some("FC-000201"),
        Some(day(5, 11, 0).as_str()),
        Some("C002"),
        Some(1000.0),
        Some(0.0),
        Some(120.0),
        Some(400.0),
    )?;

    // After-hours pair for C003, plus one mangled date.
    source.insert_invoice(
        "FV",
        Some("FV-000301"),
        Some(day(2, 22, 30).as_str()),
        Some("C003"),
        Some(350.0),
        Some(0.0),
        Some(42.0),
        None,
    )?;
    source.insert_invoice(
        "FV",
        Some("FV-000302"),
        Some(day(4, 5, 45).as_str()),
        Some("C003"),
        Some(410.0),
        Some(0.0),
        Some(49.2),
        None,
    )?;
    source.insert_invoice(
        "FV",
        Some("FV-000303"),
        Some("31/2/2025 9:5:3"),
        Some("C003"),
        Some(275.0),
        Some(0.0),
        Some(33.0),
        None,
    )?;

    // Overcapacity dispatch and a same-day burst.
    source.insert_dispatch(Some(day(1, 9, 10).as_str()), Some(320.0), Some(1184.0), Some("Diesel"), Some("C002"))?;
    for m in 0u32..4 {
        source.insert_dispatch(
            Some(day(2, 8 + m, 5).as_str()),
            Some(45.0),
            Some(166.5),
            Some("Extra"),
            Some("C001"),
        )?;
    }

    // Edit storm by one user.
    for i in 0u32..25 {
        source.insert_edit(Some("jperez"), Some(day(1, 9, i % 60).as_str()))?;
    }

    log::info!("demo data seeded");
    Ok(())
}

fn fmt(date: NaiveDateTime, h: u32, m: u32) -> String {
    date.date()
        .and_hms_opt(h, m, 0)
        .unwrap_or(date)
        .format("%d/%m/%Y %H:%M:%S")
        .to_string()
}
