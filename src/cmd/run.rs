//! Pipeline execution: `chainrun run <pipeline.toml>`.

use anyhow::{Context, Result};
use std::process::ExitCode;

use chainrun::manager::RunReport;
use chainrun::pipeline::PipelineFile;
use chainrun::settings::Settings;

use crate::RunArgs;

pub async fn cmd_run(args: &RunArgs) -> Result<ExitCode> {
    let pipeline = PipelineFile::load(&args.pipeline)?;

    let mut settings = match args.settings {
        Some(ref path) => Settings::load(path)?,
        None => pipeline.settings.clone(),
    };
    settings
        .apply_env()
        .context("Invalid CHAINRUN_* environment override")?;

    if let Some(ref chain) = args.begin_with {
        settings.begin_with_chain = Some(chain.clone());
    }
    if let Some(ref chain) = args.end_with {
        settings.end_with_chain = Some(chain.clone());
    }
    if let Some(ref chain) = args.single_chain {
        settings = settings.with_single_chain(chain);
    }
    if let Some(ref dir) = args.results_dir {
        settings.results_dir = dir.clone();
    }
    if let Some(ref persist) = args.persist {
        settings.persist = persist.clone();
    }
    if let Some(workers) = args.max_workers {
        settings.max_workers = Some(workers);
    }

    let mut manager = pipeline.build(settings)?;
    let report = manager.run().await;

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialize run report")?
        );
    } else {
        print_report(&report);
        if args.profile {
            print_profile(&report);
        }
    }

    Ok(ExitCode::from(report.exit_code() as u8))
}

fn print_report(report: &RunReport) {
    println!("Run {}", report.run_id);
    for chain in &report.chains {
        let fork = if chain.fork_width > 1 {
            format!(", fork {}", chain.fork_width)
        } else {
            String::new()
        };
        let repeats = if chain.repeats > 0 {
            format!(", {} repeats", chain.repeats)
        } else {
            String::new()
        };
        println!(
            "  {:<24} {:<12} {} links{}{} in {} ms",
            chain.name,
            chain.status.to_string(),
            chain.executed_links,
            fork,
            repeats,
            chain.duration.as_millis()
        );
    }
    match &report.error {
        Some(error) => println!("Run failed: {}", error),
        None => println!(
            "Run completed ({}) in {:.2}s",
            report.status,
            report.duration.as_secs_f64()
        ),
    }
}

fn print_profile(report: &RunReport) {
    println!("Link timings");
    for chain in &report.chains {
        for timing in chain.slowest_links() {
            println!(
                "  {:<24} {:<24} {:.3} ms",
                chain.name,
                timing.name,
                timing.duration.as_secs_f64() * 1000.0
            );
        }
    }
}
