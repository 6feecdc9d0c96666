use std::net::SocketAddr;

use anyhow::Context;
use axum::{http::StatusCode, response::IntoResponse, routing::{get, post}, Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing_subscriber::EnvFilter;

use pydemic::model::neher::seed_parameters;
use pydemic::model::NeherModelSimulation;
use pydemic::{get_model_data, DataFrame, ParameterSet, Simulator};

#[derive(Debug, Deserialize)]
struct RunRequest {
    simulator: Option<String>,
    /// First and last evaluation day, days since 2020-01-01.
    t_start: f64,
    t_end: f64,
    params: ParameterSet,
    /// Extra Poisson trajectories; only used by the Neher model.
    n_stochastic: Option<usize>,
    seed: Option<u64>,
}

#[derive(Debug, Serialize)]
struct RunResponse {
    return_code: i32,
    simulator: String,
    result: DataFrame,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    stochastic: Vec<DataFrame>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pydemic=info")))
        .init();

    let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(8000);

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/models", get(models))
        .route("/run_simulation", post(run_simulation));

    let addr: SocketAddr = format!("{}:{}", host, port).parse().context("invalid HOST/PORT")?;
    tracing::info!(%addr, "pydemic-api listening");

    let listener = tokio::net::TcpListener::bind(addr).await.context("bind failed")?;
    axum::serve(listener, app).await.context("server failed")?;
    Ok(())
}

async fn healthz() -> impl IntoResponse {
    Json(json!({"ok": true}))
}

async fn models() -> impl IntoResponse {
    let names: Vec<&str> = Simulator::ALL.iter().map(Simulator::name).collect();
    Json(json!({"models": names}))
}

async fn run_simulation(Json(req): Json<RunRequest>) -> impl IntoResponse {
    // Simulations are CPU-bound; keep them off the async workers.
    let join = tokio::task::spawn_blocking(move || run_simulation_sync(req));

    match join.await {
        Ok(Ok(resp)) => (StatusCode::OK, Json(resp)).into_response(),
        Ok(Err((code, body))) => (code, Json(body)).into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"return_code": 2, "error": format!("join error: {e}")})),
        )
            .into_response(),
    }
}

fn bad_request(msg: String) -> (StatusCode, serde_json::Value) {
    (StatusCode::BAD_REQUEST, json!({"return_code": 1, "error": msg}))
}

fn run_simulation_sync(req: RunRequest) -> Result<RunResponse, (StatusCode, serde_json::Value)> {
    let name = req.simulator.unwrap_or_else(|| Simulator::SeirPlusPlus.name().to_string());
    let simulator = Simulator::from_name(&name).ok_or_else(|| bad_request(format!("unknown simulator '{name}'")))?;

    if !(req.t_end >= req.t_start) {
        return Err(bad_request(format!("t_end {} precedes t_start {}", req.t_end, req.t_start)));
    }
    let t_eval: Vec<f64> = (0..=(req.t_end - req.t_start).floor() as usize)
        .map(|i| req.t_start + i as f64)
        .collect();

    let result = simulator
        .get_model_data(&t_eval, req.params.clone())
        .map_err(|e| bad_request(format!("simulation failed: {e}")))?;

    let mut stochastic = Vec::new();
    let n_stochastic = req.n_stochastic.unwrap_or(0);
    if simulator == Simulator::Neher && n_stochastic > 0 {
        let seeds = seed_parameters(req.seed.unwrap_or(0), n_stochastic).map_err(|e| bad_request(e.to_string()))?;
        for seed in seeds {
            let params = req.params.clone().with("seed", seed);
            let frame = get_model_data::<NeherModelSimulation>(&t_eval, params)
                .map_err(|e| bad_request(format!("stochastic run failed: {e}")))?;
            stochastic.push(frame);
        }
    }

    tracing::info!(simulator = %simulator, rows = result.len(), n_stochastic = stochastic.len(), "simulation served");
    Ok(RunResponse { return_code: 0, simulator: simulator.name().to_string(), result, stochastic })
}
