//! Pipeline stage commands.

use std::path::PathBuf;
use std::sync::atomic::Ordering;

use console::style;

use super::super::helpers::{default_handoff, print_json, print_path, spinner, success, warning};
use crate::config::Settings;
use crate::context::AppContext;
use crate::dedup::DedupKeyStrategy;
use crate::pipeline::handoff;
use crate::transform::Category;
use crate::warehouse::{AggregateQuery, GroupBy, WriteMode};

/// Stop extraction after the current page on Ctrl+C.
fn cancel_on_interrupt(ctx: &AppContext) {
    let cancel = ctx.cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, finishing current page");
            cancel.store(true, Ordering::Relaxed);
        }
    });
}

pub async fn cmd_extract(
    settings: Settings,
    limit: Option<usize>,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let output = output.unwrap_or_else(|| default_handoff(&settings, "extracted"));
    let ctx = AppContext::from_settings(settings)?;
    cancel_on_interrupt(&ctx);

    let pb = spinner("Extracting records...");
    let extraction = ctx.pipeline().extract(limit, Some(&output)).await?;
    pb.finish_and_clear();

    for attempt in &extraction.report.attempts {
        println!(
            "  {} {}: reachable={} raw={} normalized={} skipped={} failed_pages={:?}",
            style("→").dim(),
            attempt.source,
            attempt.reachable,
            attempt.raw_records,
            attempt.normalized,
            attempt.skipped,
            attempt.failed_pages
        );
    }

    match extraction.report.served_by {
        Some(ref source) => {
            success(format!(
                "Extracted {} records from {}",
                extraction.records.len(),
                source
            ));
            print_path("Output", &output);
            Ok(())
        }
        None => anyhow::bail!("All sources failed, no records extracted"),
    }
}

pub async fn cmd_transform(
    settings: Settings,
    input: Option<PathBuf>,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let input = input.unwrap_or_else(|| default_handoff(&settings, "extracted"));
    let output = output.unwrap_or_else(|| default_handoff(&settings, "transformed"));
    let ctx = AppContext::from_settings(settings)?;

    let records = handoff::read_records(&input)?;
    let transformed = ctx.pipeline().transform(records);
    handoff::write_records(&output, &transformed.records)?;

    if !transformed.validation.is_valid() {
        warning(format!(
            "{} invalid records dropped",
            transformed.validation.invalid_records
        ));
    }
    success(format!(
        "Transformed {} records ({} duplicates collapsed)",
        transformed.records.len(),
        transformed.duplicates_dropped
    ));
    for (category, count) in &transformed.categories {
        println!("  {} {}: {}", style("→").dim(), category, count);
    }
    print_path("Output", &output);
    Ok(())
}

pub async fn cmd_load(
    settings: Settings,
    input: Option<PathBuf>,
    mode: WriteMode,
) -> anyhow::Result<()> {
    let input = input.unwrap_or_else(|| default_handoff(&settings, "transformed"));
    let ctx = AppContext::from_settings(settings)?;

    let records = handoff::read_records(&input)?;
    if records.is_empty() {
        anyhow::bail!("{} holds no records, warehouse left unchanged", input.display());
    }

    let report = ctx.pipeline().load(records, mode).await?;
    success(format!(
        "Loaded {} records, warehouse holds {}",
        report.written, report.total_rows
    ));
    print_path("Warehouse", ctx.warehouse.path());
    Ok(())
}

pub async fn cmd_run(
    settings: Settings,
    limit: Option<usize>,
    mode: WriteMode,
    json: bool,
) -> anyhow::Result<()> {
    let ctx = AppContext::from_settings(settings)?;
    cancel_on_interrupt(&ctx);

    let pb = spinner("Running pipeline...");
    let report = ctx.pipeline().run(limit, mode).await?;
    pb.finish_and_clear();

    if json {
        print_json(&report)?;
    } else if let Some(ref load) = report.load {
        success(format!(
            "Loaded {} records from {} in {}ms",
            load.written,
            report.extraction.served_by.as_deref().unwrap_or("?"),
            report.elapsed_ms
        ));
        if let Some(ref dedup) = report.dedup {
            println!(
                "  {} Deduplicated: {} -> {} rows",
                style("→").dim(),
                dedup.before,
                dedup.after
            );
        }
    }

    if report.is_empty() {
        anyhow::bail!("All sources failed, warehouse left unchanged");
    }
    Ok(())
}

pub async fn cmd_dedupe(
    settings: Settings,
    check: bool,
    key: Option<DedupKeyStrategy>,
) -> anyhow::Result<()> {
    let strategy = key.unwrap_or(settings.dedup_key);
    let ctx = AppContext::from_settings(settings)?;
    let warehouse = ctx.warehouse.clone();

    if check {
        let groups = tokio::task::spawn_blocking(move || warehouse.duplicate_groups(strategy)).await??;
        if groups.is_empty() {
            success("No duplicates");
        }
        for group in groups {
            println!(
                "  {} {} {}: {} copies",
                style("→").dim(),
                group.beer_id,
                group.name.as_deref().unwrap_or(""),
                group.copies
            );
        }
        return Ok(());
    }

    let report = tokio::task::spawn_blocking(move || warehouse.deduplicate(strategy)).await??;
    success(format!(
        "Removed {} duplicate rows ({} -> {})",
        report.removed, report.before, report.after
    ));
    Ok(())
}

pub async fn cmd_summary(
    settings: Settings,
    group_by: GroupBy,
    category: Option<Category>,
    limit: Option<usize>,
) -> anyhow::Result<()> {
    let ctx = AppContext::from_settings(settings)?;
    let warehouse = ctx.warehouse.clone();
    let query = AggregateQuery {
        group_by,
        category,
        limit,
    };

    let (summary, rows) = tokio::task::spawn_blocking(move || {
        Ok::<_, crate::warehouse::WarehouseError>((warehouse.summary()?, warehouse.aggregate(&query)?))
    })
    .await??;

    println!(
        "{} {} records, {} categories, avg ABV {}",
        style("Warehouse:").bold(),
        summary.total_records,
        summary.distinct_categories,
        summary
            .avg_abv
            .map(|v| format!("{:.2}", v))
            .unwrap_or_else(|| "-".to_string())
    );
    for row in rows {
        println!(
            "  {:<24} {:>6}  abv {:>5}  ibu {:>5}",
            row.key.as_deref().unwrap_or("(none)"),
            row.count,
            row.avg_abv.map(|v| format!("{:.1}", v)).unwrap_or_default(),
            row.avg_ibu.map(|v| format!("{:.0}", v)).unwrap_or_default()
        );
    }
    Ok(())
}
