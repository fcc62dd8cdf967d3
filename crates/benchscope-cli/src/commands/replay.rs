use std::collections::BTreeMap;
use std::io::{BufRead, BufReader};

use benchscope_core::{Record, Result, StoredRecord};

#[derive(Default)]
struct Summary {
    metrics: usize,
    docs: usize,
    meta_infos: usize,
    skipped: usize,
    /// Metric name to (samples, last reading, unit).
    by_name: BTreeMap<String, (usize, f64, Option<String>)>,
}

/// Summarize the records of a JSON lines metrics file.
pub fn run(path: &str, run_id: Option<&str>, verbose: bool) -> Result<()> {
    let file = std::fs::File::open(path)?;
    let mut summary = Summary::default();

    for (lineno, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let stored: StoredRecord = match serde_json::from_str(&line) {
            Ok(r) => r,
            Err(e) => {
                log::warn!("skipping line {} of [{path}]: {e}", lineno + 1);
                summary.skipped += 1;
                continue;
            }
        };
        if run_id.is_some_and(|id| id != stored.run_id) {
            continue;
        }
        match &stored.record {
            Record::Metric {
                node,
                name,
                reading,
                unit,
                ..
            } => {
                summary.metrics += 1;
                let entry = summary
                    .by_name
                    .entry(name.clone())
                    .or_insert((0, 0.0, unit.clone()));
                entry.0 += 1;
                entry.1 = reading.as_f64();
                if verbose {
                    println!(
                        "{} {:<8} {:<40} {} {}",
                        stored.timestamp_ms,
                        node.as_deref().unwrap_or("cluster"),
                        name,
                        reading.as_f64(),
                        unit.as_deref().unwrap_or("")
                    );
                }
            }
            Record::Doc { .. } => summary.docs += 1,
            Record::MetaInfo { .. } => summary.meta_infos += 1,
        }
    }

    println!(
        "{} metric(s), {} document(s), {} meta-info record(s)",
        summary.metrics, summary.docs, summary.meta_infos
    );
    if summary.skipped > 0 {
        println!("{} unreadable line(s) skipped", summary.skipped);
    }
    if !summary.by_name.is_empty() {
        println!("\n  {:<48} {:>8} {:>16}", "Metric", "Samples", "Last");
        for (name, (samples, last, unit)) in &summary.by_name {
            println!(
                "  {:<48} {:>8} {:>16} {}",
                name,
                samples,
                last,
                unit.as_deref().unwrap_or("")
            );
        }
    }
    Ok(())
}
