use anyhow::{Context, Result, bail};
use api::{AppConfig, build_providers, get_credentials, http_client, init_tracing};
use clap::Parser;
use ingest::{ColumnSelector, SheetReader, TableReader};
use pipeline::{EXPORT_FILE_NAME, EntityStatus, PipelineRunner, ProgressEvent, export_csv};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "run_batch")]
#[command(about = "Search the web for every entity in a table and extract one answer each", long_about = None)]
struct Cli {
    /// CSV or TSV file with a header row
    #[arg(long, short, conflicts_with = "sheet", required_unless_present = "sheet")]
    input: Option<PathBuf>,

    /// Public Google Sheet URL
    #[arg(long)]
    sheet: Option<String>,

    /// Column holding the entities (defaults to the first)
    #[arg(long, short, conflicts_with = "position")]
    column: Option<String>,

    /// Zero-based column position, instead of a name
    #[arg(long)]
    position: Option<usize>,

    /// Question template, must contain {entity}
    #[arg(long, short)]
    template: Option<String>,

    #[arg(long, short, default_value = EXPORT_FILE_NAME)]
    output: PathBuf,

    #[arg(long)]
    max_results: Option<usize>,

    #[arg(long)]
    concurrency: Option<usize>,

    #[arg(long)]
    temperature: Option<f32>,

    #[arg(long)]
    max_tokens: Option<u32>,

    #[arg(long)]
    timeout_ms: Option<u64>,

    #[arg(long)]
    max_retries: Option<usize>,

    /// Print the full run report as JSON on stdout
    #[arg(long)]
    json: bool,

    /// Log as JSON
    #[arg(long)]
    log_json: bool,
}

impl Cli {
    fn column(&self) -> ColumnSelector {
        match self.position {
            Some(position) => ColumnSelector::Position(position),
            None => ColumnSelector::from_name(self.column.as_deref()),
        }
    }

    fn apply(&self, config: &mut AppConfig) {
        let pipeline = &mut config.pipeline;
        if let Some(template) = &self.template {
            pipeline.template = template.clone();
        }
        if let Some(value) = self.max_results {
            pipeline.max_results = value;
        }
        if let Some(value) = self.concurrency {
            pipeline.concurrency = value;
        }
        if let Some(value) = self.temperature {
            pipeline.temperature = value;
        }
        if let Some(value) = self.max_tokens {
            pipeline.max_tokens = value;
        }
        if let Some(value) = self.timeout_ms {
            pipeline.timeout_ms = value;
        }
        if let Some(value) = self.max_retries {
            pipeline.retry.max_retries = value;
        }
        config.server.log_json |= self.log_json;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::from_env()?;
    cli.apply(&mut config);
    init_tracing(config.server.log_json);

    let credentials = get_credentials()?;
    let client = http_client()?;
    let providers = build_providers(&config, &credentials, client.clone());

    // Validate before touching the input so a bad template costs nothing
    let runner = PipelineRunner::new(&config.pipeline, providers).context("Invalid configuration")?;

    let column = cli.column();
    let loaded = match (&cli.input, &cli.sheet) {
        (Some(path), _) => TableReader::read_file(path, &column).await?,
        (None, Some(url)) => SheetReader::new(client).read_sheet(url, &column).await?,
        (None, None) => bail!("either --input or --sheet is required"),
    };

    if loaded.has_blanks() {
        eprintln!(
            "Warning: column '{}' has {} missing value(s) at rows {:?}",
            loaded.column,
            loaded.blank_indices.len(),
            loaded.blank_indices
        );
    }

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Interrupted, finishing in-flight entities");
            on_ctrl_c.cancel();
        }
    });

    let print_progress = |event: &ProgressEvent| {
        let marker = match event.status {
            EntityStatus::Success => "✓",
            EntityStatus::Empty => "·",
            EntityStatus::Error => "✗",
        };
        eprintln!(
            "[{}/{}] {} row {} {}",
            event.completed, event.total, marker, event.entity_index, event.status
        );
    };

    let report = runner.run(loaded.rows, &cancel, &print_progress).await;

    let csv = export_csv(&report.table)?;
    tokio::fs::write(&cli.output, csv)
        .await
        .with_context(|| format!("Failed to write {}", cli.output.display()))?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    for warning in &report.warnings {
        eprintln!("Warning: {}", warning);
    }

    let summary = report.summary;
    println!(
        "{} entities: {} success, {} empty, {} error ({} cancelled) -> {}",
        summary.total,
        summary.success_count,
        summary.empty_count,
        summary.error_count,
        summary.cancelled_count,
        cli.output.display()
    );

    Ok(())
}
