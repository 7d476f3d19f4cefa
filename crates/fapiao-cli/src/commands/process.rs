//! Process command - extract line items from a single invoice PDF.

use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use clap::Args;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info};

use fapiao_core::models::invoice::{DocumentResult, LineItem, ParseStatus, TotalCheck};
use fapiao_core::InvoiceParser;

use super::config::load_config;

/// Arguments for the process command.
#[derive(Args)]
pub struct ProcessArgs {
    /// Input PDF file
    #[arg(required = true)]
    input: PathBuf,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "json")]
    format: OutputFormat,

    /// Pretty-print JSON output
    #[arg(long)]
    pretty: bool,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    /// JSON output
    Json,
    /// CSV output, one row per line item
    Csv,
    /// Plain text summary
    Text,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Csv => "csv",
            OutputFormat::Text => "txt",
        }
    }
}

pub async fn run(args: ProcessArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();

    let config = load_config(config_path)?;

    if !args.input.exists() {
        anyhow::bail!("Input file not found: {}", args.input.display());
    }

    let extension = args
        .input
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();
    if extension != "pdf" {
        anyhow::bail!("Unsupported file format: {}", extension);
    }

    info!("Processing file: {}", args.input.display());

    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
    pb.set_message("Parsing invoice...");

    let parser = InvoiceParser::new(config)?;
    let data = fs::read(&args.input)?;
    let file_name = args
        .input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| args.input.display().to_string());

    let result = tokio::task::spawn_blocking(move || parser.parse_document(&file_name, &data)).await?;

    pb.finish_and_clear();

    let output = format_result(&result, args.format, args.pretty)?;

    if let Some(output_path) = &args.output {
        fs::write(output_path, &output)?;
        println!("{} Output written to {}", style("✓").green(), output_path.display());
    } else {
        println!("{}", output);
    }

    if result.status == ParseStatus::Failed {
        eprintln!(
            "{} {}",
            style("✗").red(),
            result.error_message.as_deref().unwrap_or("parsing failed")
        );
    } else if !result.validation.valid {
        eprintln!("{}", style("Validation issues:").yellow());
        for warning in &result.validation.warnings {
            eprintln!("  - {}", warning);
        }
    }

    debug!("Total processing time: {:?}", start.elapsed());

    Ok(())
}

/// Render a document result in the requested format.
pub fn format_result(result: &DocumentResult, format: OutputFormat, pretty: bool) -> anyhow::Result<String> {
    match format {
        OutputFormat::Json if pretty => Ok(serde_json::to_string_pretty(result)?),
        OutputFormat::Json => Ok(serde_json::to_string(result)?),
        OutputFormat::Csv => format_csv(result),
        OutputFormat::Text => Ok(format_text(result)),
    }
}

fn format_csv(result: &DocumentResult) -> anyhow::Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);

    wtr.write_record([
        "invoice_number",
        "invoice_date",
        "line_number",
        "page_number",
        "goods_name",
        "specification",
        "unit",
        "quantity",
        "unit_price",
        "amount",
        "tax_rate",
        "tax_amount",
        "status",
        "error",
    ])?;

    let invoice_number = result.invoice_number.clone().unwrap_or_default();
    let invoice_date = result.invoice_date.map(|d| d.to_string()).unwrap_or_default();

    for item in &result.items {
        wtr.write_record([
            invoice_number.as_str(),
            invoice_date.as_str(),
            &item.line_number.to_string(),
            &item.page_number.to_string(),
            opt(&item.goods_name),
            opt(&item.specification),
            opt(&item.unit),
            opt(&item.quantity),
            opt(&item.unit_price),
            opt(&item.amount),
            &item.tax_rate.map(|r| r.to_string()).unwrap_or_default(),
            opt(&item.tax_amount),
            status_label(item.status),
            opt(&item.error_message),
        ])?;
    }

    let data = String::from_utf8(wtr.into_inner()?)?;
    Ok(data)
}

fn format_text(result: &DocumentResult) -> String {
    let mut output = String::new();
    let fields = &result.fields;

    output.push_str(&format!("File: {}\n", result.file_name));
    output.push_str(&format!("Status: {}\n", status_label(result.status)));
    if let Some(error) = &result.error_message {
        output.push_str(&format!("Error: {}\n", error));
    }
    output.push('\n');

    output.push_str(&format!("Invoice: {}\n", opt(&fields.invoice_number)));
    if let Some(date) = fields.invoice_date {
        output.push_str(&format!("Date: {}\n", date));
    }
    if let Some(kind) = fields.invoice_type {
        output.push_str(&format!("Type: {}\n", kind.label()));
    }
    output.push('\n');

    output.push_str(&format!("Items ({}):\n", result.items.len()));
    for item in &result.items {
        output.push_str(&format_item(item));
    }
    output.push('\n');

    output.push_str("Summary:\n");
    output.push_str(&format!("  Amount: {}\n", opt(&fields.amount)));
    output.push_str(&format!("  Tax:    {}\n", opt(&fields.tax_amount)));
    output.push_str(&format!("  Total:  {}\n", opt(&fields.total_amount)));
    if !fields.tax_rates.is_empty() {
        let rates: Vec<String> = fields.tax_rates.iter().map(|e| e.rate.to_string()).collect();
        output.push_str(&format!("  Rates:  {}\n", rates.join(", ")));
    }
    match &result.validation.total_check {
        TotalCheck::Passed { difference } => {
            output.push_str(&format!("  Check:  passed (difference {})\n", difference))
        }
        TotalCheck::Failed { difference } => {
            output.push_str(&format!("  Check:  FAILED (difference {})\n", difference))
        }
        TotalCheck::Skipped => output.push_str("  Check:  skipped\n"),
    }

    if !result.degraded_fields.is_empty() {
        output.push_str(&format!("\nRead from flattened text: {}\n", result.degraded_fields.join(", ")));
    }

    output
}

fn format_item(item: &LineItem) -> String {
    let mut line = format!(
        "  {:>3}. {} | qty {} x {} = {} | {} tax {}",
        item.line_number,
        opt(&item.goods_name),
        opt(&item.quantity),
        opt(&item.unit_price),
        opt(&item.amount),
        item.tax_rate.map(|r| r.to_string()).unwrap_or_else(|| "-".to_string()),
        opt(&item.tax_amount),
    );
    if let Some(error) = &item.error_message {
        line.push_str(&format!(" [{}]", error));
    }
    line.push('\n');
    line
}

pub fn status_label(status: ParseStatus) -> &'static str {
    match status {
        ParseStatus::Success => "success",
        ParseStatus::Failed => "failed",
    }
}

fn opt(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("")
}
