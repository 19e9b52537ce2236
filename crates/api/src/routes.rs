use axum::{
    Json, Router,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use ingest::{ColumnSelector, LoadedRows, SheetReader, TableReader, rows_from_values};
use pipeline::{
    ConfigError, EXPORT_FILE_NAME, LogProgress, PipelineConfig, PipelineRunner, Providers,
    RunReport, export_csv,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};

#[derive(Clone)]
pub struct AppState {
    providers: Providers,
    defaults: PipelineConfig,
    sheets: SheetReader,
    shutdown: CancellationToken,
}

impl AppState {
    pub fn new(
        providers: Providers,
        defaults: PipelineConfig,
        sheets: SheetReader,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            providers,
            defaults,
            sheets,
            shutdown,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/runs", post(create_run))
        .route("/runs/export", post(export_run))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(Arc::new(state))
}

/// Entities come from exactly one of `rows`, `csv` or `sheet_url`; the rest
/// overrides the server's pipeline defaults for this run only.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RunRequest {
    pub rows: Option<Vec<String>>,
    pub csv: Option<String>,
    pub sheet_url: Option<String>,
    pub column: Option<String>,
    pub template: Option<String>,
    pub max_results: Option<usize>,
    pub concurrency: Option<usize>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub timeout_ms: Option<u64>,
}

#[derive(Serialize)]
pub struct RunResponse {
    pub column: String,
    pub blank_indices: Vec<usize>,
    #[serde(flatten)]
    pub report: RunReport,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    search: ProviderHealth,
    completion: ProviderHealth,
}

#[derive(Serialize)]
struct ProviderHealth {
    provider: &'static str,
    calls: u64,
    throttled: u64,
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Config(ConfigError),
    Internal(String),
}

impl From<ConfigError> for ApiError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            Self::Config(err) => (StatusCode::UNPROCESSABLE_ENTITY, err.to_string()),
            Self::Internal(message) => (StatusCode::INTERNAL_SERVER_ERROR, message),
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

impl RunRequest {
    fn config(&self, defaults: &PipelineConfig) -> PipelineConfig {
        let mut config = defaults.clone();
        if let Some(template) = &self.template {
            config.template = template.clone();
        }
        if let Some(max_results) = self.max_results {
            config.max_results = max_results;
        }
        if let Some(concurrency) = self.concurrency {
            config.concurrency = concurrency;
        }
        if let Some(temperature) = self.temperature {
            config.temperature = temperature;
        }
        if let Some(max_tokens) = self.max_tokens {
            config.max_tokens = max_tokens;
        }
        if let Some(timeout_ms) = self.timeout_ms {
            config.timeout_ms = timeout_ms;
        }
        config
    }

    async fn load_rows(&self, sheets: &SheetReader) -> Result<LoadedRows, ApiError> {
        let column = ColumnSelector::from_name(self.column.as_deref());

        let loaded = match (&self.rows, &self.csv, &self.sheet_url) {
            (Some(values), None, None) => {
                let column = self.column.clone().unwrap_or_else(|| "entity".to_string());
                let rows = rows_from_values(values.iter().cloned());
                let blank_indices: Vec<usize> =
                    rows.iter().filter(|r| r.is_blank()).map(|r| r.index).collect();

                // The table readers already report blanks in their own input
                if !blank_indices.is_empty() {
                    warn!(
                        column = %column,
                        blank_rows = blank_indices.len(),
                        "Selected column contains missing values"
                    );
                }

                Ok(LoadedRows {
                    column,
                    headers: Vec::new(),
                    rows,
                    blank_indices,
                })
            }
            (None, Some(csv), None) => TableReader::read_csv(csv.as_bytes(), &column),
            (None, None, Some(url)) => sheets.read_sheet(url, &column).await,
            _ => {
                return Err(ApiError::BadRequest(
                    "provide exactly one of rows, csv or sheet_url".to_string(),
                ));
            }
        };

        loaded.map_err(|e| ApiError::BadRequest(format!("{:#}", e)))
    }
}

async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let providers = &state.providers;
    let search = providers.search_limiter.stats().await;
    let completion = providers.completion_limiter.stats().await;

    Json(HealthResponse {
        status: "ok",
        search: ProviderHealth {
            provider: providers.search_limiter.name(),
            calls: search.calls,
            throttled: search.throttled,
        },
        completion: ProviderHealth {
            provider: providers.completion_limiter.name(),
            calls: completion.calls,
            throttled: completion.throttled,
        },
    })
}

async fn execute(state: &AppState, req: &RunRequest) -> Result<RunResponse, ApiError> {
    // Configuration problems are reported before anything is fetched
    let config = req.config(&state.defaults);
    let runner = PipelineRunner::new(&config, state.providers.clone())?;

    let loaded = req.load_rows(&state.sheets).await?;

    let report = runner
        .run(loaded.rows, &state.shutdown.child_token(), &LogProgress)
        .await;

    info!(run_id = %report.run_id, total = report.summary.total, "Run served");

    Ok(RunResponse {
        column: loaded.column,
        blank_indices: loaded.blank_indices,
        report,
    })
}

async fn create_run(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RunRequest>,
) -> Result<Json<RunResponse>, ApiError> {
    Ok(Json(execute(&state, &req).await?))
}

async fn export_run(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RunRequest>,
) -> Result<Response, ApiError> {
    let response = execute(&state, &req).await?;

    let csv = export_csv(&response.report.table).map_err(|e| {
        warn!(error = %e, "CSV export failed");
        ApiError::Internal(format!("{:#}", e))
    })?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", EXPORT_FILE_NAME),
            ),
        ],
        csv,
    )
        .into_response())
}
