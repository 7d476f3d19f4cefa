//! Batch processing command for multiple invoice files.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use clap::Args;
use console::style;
use glob::glob;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::debug;

use fapiao_core::batch::{parse_batch, BatchInput};
use fapiao_core::models::invoice::{DocumentResult, ParseStatus, TotalCheck};
use fapiao_core::InvoiceParser;

use super::config::load_config;
use super::process::{format_result, status_label, OutputFormat};

/// Arguments for the batch command.
#[derive(Args)]
pub struct BatchArgs {
    /// Glob pattern matching the input PDFs
    #[arg(required = true)]
    input: String,

    /// Output directory
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Output format for each file
    #[arg(short, long, value_enum, default_value = "json")]
    format: OutputFormat,

    /// Also generate a summary CSV
    #[arg(long)]
    summary: bool,

    /// Documents parsed concurrently (default: batch.width from config)
    #[arg(short = 'j', long)]
    jobs: Option<usize>,
}

pub async fn run(args: BatchArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();

    let config = load_config(config_path)?;
    let width = args.jobs.unwrap_or(config.batch.width);
    if width == 0 {
        anyhow::bail!("--jobs must be at least 1");
    }

    let files: Vec<PathBuf> = glob(&args.input)?
        .filter_map(|r| r.ok())
        .filter(|p| {
            let ext = p.extension().and_then(|e| e.to_str()).unwrap_or("");
            ext.eq_ignore_ascii_case("pdf")
        })
        .collect();

    if files.is_empty() {
        anyhow::bail!("No matching files found for pattern: {}", args.input);
    }

    println!("{} Found {} files to process", style("ℹ").blue(), files.len());

    if let Some(ref output_dir) = args.output_dir {
        fs::create_dir_all(output_dir)?;
    }

    let pb = ProgressBar::new(files.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files {msg}")?
            .progress_chars("=>-"),
    );

    let parser = Arc::new(InvoiceParser::new(config)?);
    let inputs: Vec<BatchInput> = files.iter().map(BatchInput::from_path).collect();

    let results = parse_batch(parser, inputs, width, |progress| {
        pb.set_position(progress.completed as u64);
        pb.set_message(progress.file_name.clone());
    })
    .await;

    pb.finish_with_message("Complete");

    if let Some(output_dir) = &args.output_dir {
        for (path, result) in files.iter().zip(&results) {
            if result.status == ParseStatus::Failed && result.items.is_empty() {
                continue;
            }
            let output_name = path.file_stem().and_then(|s| s.to_str()).unwrap_or("invoice");
            let output_path = output_dir.join(format!("{}.{}", output_name, args.format.extension()));

            fs::write(&output_path, format_result(result, args.format, false)?)?;
            debug!("Wrote output to {}", output_path.display());
        }
    }

    if args.summary {
        let summary_path = args
            .output_dir
            .as_ref()
            .map(|d| d.join("summary.csv"))
            .unwrap_or_else(|| PathBuf::from("summary.csv"));

        write_summary(&summary_path, &results)?;
        println!("{} Summary written to {}", style("✓").green(), summary_path.display());
    }

    let failed: Vec<&DocumentResult> = results.iter().filter(|r| r.status == ParseStatus::Failed).collect();
    let items: usize = results.iter().map(|r| r.items.len()).sum();

    println!();
    println!(
        "{} Processed {} files ({} line items) in {:?}",
        style("✓").green(),
        results.len(),
        items,
        start.elapsed()
    );
    println!(
        "   {} successful, {} failed",
        style(results.len() - failed.len()).green(),
        style(failed.len()).red()
    );

    if !failed.is_empty() {
        println!();
        println!("{}", style("Failed files:").red());
        for result in &failed {
            println!(
                "  - {}: {}",
                result.file_name,
                result.error_message.as_deref().unwrap_or("unknown error")
            );
        }
    }

    Ok(())
}

fn write_summary(path: &Path, results: &[DocumentResult]) -> anyhow::Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;

    wtr.write_record([
        "filename",
        "status",
        "invoice_number",
        "invoice_date",
        "invoice_type",
        "items",
        "failed_items",
        "amount",
        "tax_amount",
        "total_amount",
        "total_check",
        "processing_time_ms",
        "error",
    ])?;

    for result in results {
        let fields = &result.fields;
        let total_check = match result.validation.total_check {
            TotalCheck::Passed { .. } => "passed",
            TotalCheck::Failed { .. } => "failed",
            TotalCheck::Skipped => "skipped",
        };

        wtr.write_record([
            result.file_name.as_str(),
            status_label(result.status),
            fields.invoice_number.as_deref().unwrap_or(""),
            &fields.invoice_date.map(|d| d.to_string()).unwrap_or_default(),
            fields.invoice_type.map(|t| t.label()).unwrap_or(""),
            &result.items.len().to_string(),
            &(result.items.len() - result.successful_items()).to_string(),
            fields.amount.as_deref().unwrap_or(""),
            fields.tax_amount.as_deref().unwrap_or(""),
            fields.total_amount.as_deref().unwrap_or(""),
            total_check,
            &result.processing_time_ms.to_string(),
            result.error_message.as_deref().unwrap_or(""),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_has_one_row_per_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summary.csv");
        let results = vec![
            DocumentResult::failed("a.pdf", "not a PDF"),
            DocumentResult::failed("b.pdf", "no pages"),
        ];

        write_summary(&path, &results).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("filename,status"));
        assert!(lines[1].starts_with("a.pdf,failed"));
        assert!(lines[2].ends_with("no pages"));
    }
}
