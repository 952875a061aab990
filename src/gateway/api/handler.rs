use axum::Json;
use axum::extract::{Query, State};
use std::sync::Arc;
use std::time::Instant;

use super::types::{GenerateBody, GenerateReply, ScenarioQuery, ScenarioView};
use crate::diagnostics::{KeyStatus, Prober};
use crate::error::AppError;
use crate::gemini::GeminiClient;
use crate::generation::{GenerateInput, Generator};
use crate::logging::{self, LogLevel};
use crate::scenario::ScenarioCatalog;

pub struct AppState {
    pub generator: Generator<GeminiClient>,
    pub prober: Prober<GeminiClient>,
    pub catalog: ScenarioCatalog,
    pub log_level: LogLevel,
}

pub async fn handle_health() -> &'static str {
    "ok"
}

pub async fn handle_scenarios(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ScenarioQuery>,
) -> Json<Vec<ScenarioView>> {
    let start = Instant::now();
    let records = state.catalog.list(query.refresh.unwrap_or(false)).await;
    logging::client_request(state.log_level, "GET", "/api/scenarios", 200, start.elapsed());
    Json(records.into_iter().map(ScenarioView::from).collect())
}

pub async fn handle_generate(
    State(state): State<Arc<AppState>>,
    Json(body): Json<GenerateBody>,
) -> Result<Json<GenerateReply>, AppError> {
    let start = Instant::now();
    let result = generate(&state, body).await;
    let status = match &result {
        Ok(_) => 200,
        Err(e) => e.status_code().as_u16(),
    };
    logging::client_request(state.log_level, "POST", "/api/generate", status, start.elapsed());
    result.map(Json)
}

async fn generate(state: &AppState, body: GenerateBody) -> Result<GenerateReply, AppError> {
    let image = body.subject()?;
    let mut template = body.template_bytes()?;

    let scenario = match body.scenario_id {
        Some(id) => Some(
            state
                .catalog
                .find(id)
                .await
                .ok_or_else(|| AppError::bad_request(format!("场景 {id} 不存在")))?,
        ),
        None => None,
    };
    if template.is_none()
        && let Some(record) = &scenario
    {
        let bytes = state
            .catalog
            .download(record)
            .await
            .map_err(|e| AppError::backend(e.to_string()))?;
        template = Some(bytes);
    }

    let input = GenerateInput {
        ratio_tag: body.ratio_tag(scenario.as_ref()),
        image,
        template,
    };
    let out = state.generator.generate(input).await?;
    Ok(out.into())
}

pub async fn handle_diagnostics(State(state): State<Arc<AppState>>) -> Json<Vec<KeyStatus>> {
    let start = Instant::now();
    let rows = state.prober.probe_all().await;
    logging::client_request(state.log_level, "GET", "/api/diagnostics", 200, start.elapsed());
    Json(rows)
}
