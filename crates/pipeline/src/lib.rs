pub mod config;
pub mod export;
pub mod metrics;
pub mod outcome;
pub mod processor;
pub mod progress;
pub mod runner;

pub use config::{ConfigError, PipelineConfig, RetryConfig};
pub use export::{EXPORT_FILE_NAME, export_csv};
pub use metrics::{Metrics, MetricsSnapshot};
pub use outcome::{EntityOutcome, EntityStatus, ErrorKind, ResultTable, RunSummary};
pub use processor::{EntityProcessor, ProcessingState};
pub use progress::{LogProgress, NoProgress, ProgressEvent, ProgressSink};
pub use runner::{PipelineRunner, Providers, RunReport};

use ingest::EntityRow;
use tokio_util::sync::CancellationToken;

/// Validate `config` and run every row to completion.
pub async fn run(
    rows: Vec<EntityRow>,
    config: &PipelineConfig,
    providers: Providers,
    progress: &dyn ProgressSink,
) -> Result<RunReport, ConfigError> {
    let runner = PipelineRunner::new(config, providers)?;
    Ok(runner.run(rows, &CancellationToken::new(), progress).await)
}
