use axum::{
    Json, Router,
    http::StatusCode,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tile_packer::PackError;
use tile_packer::config::SolverConfig;
use tile_packer::input::{self, GridFrame};
use tile_packer::solver::Solver;
use tile_packer::types::{Catalog, PieceKind, Solution};
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

/// Upper bound on a single request's search time.
const MAX_TIME_LIMIT_MS: u64 = 30_000;

#[derive(Deserialize, Serialize)]
#[serde(untagged)]
enum GridRequest {
    /// Text rows, `#` open.
    Rows { rows: Vec<String> },
    /// Raw open tile coordinates.
    Tiles { tiles: Vec<(i64, i64)> },
}

#[derive(Deserialize, Serialize)]
struct OptimizeRequest {
    grid: GridRequest,
    #[serde(default)]
    catalog: Option<Vec<PieceKind>>,
    #[serde(default)]
    config: SolverConfig,
}

#[derive(Serialize)]
struct OptimizeResponse {
    #[serde(flatten)]
    solution: Solution,
    improvement: f64,
    origin: (i64, i64),
    elapsed_ms: u64,
}

fn bad_request(e: PackError) -> (StatusCode, String) {
    (StatusCode::BAD_REQUEST, e.to_string())
}

fn run(req: OptimizeRequest) -> Result<OptimizeResponse, PackError> {
    let frame: GridFrame = match req.grid {
        GridRequest::Rows { rows } => input::from_rows(&rows[..])?,
        GridRequest::Tiles { tiles } => input::from_tiles(tiles)?,
    };
    let catalog = match req.catalog {
        Some(kinds) => Catalog::new(kinds)?,
        None => Catalog::space_solar(),
    };

    let mut config = req.config;
    if config.time_limit_ms == 0 || config.time_limit_ms > MAX_TIME_LIMIT_MS {
        config.time_limit_ms = MAX_TIME_LIMIT_MS;
    }

    let outcome = Solver::new(frame.grid, catalog, config)?.solve();
    let solution = outcome.to_solution(frame.origin);
    Ok(OptimizeResponse {
        improvement: solution.improvement(),
        solution,
        origin: frame.origin,
        elapsed_ms: outcome.elapsed.as_millis() as u64,
    })
}

async fn optimize(
    Json(req): Json<OptimizeRequest>,
) -> Result<Json<OptimizeResponse>, (StatusCode, String)> {
    tracing::info!(
        body = serde_json::to_string(&req).unwrap_or_default(),
        "POST /optimize"
    );

    let response = tokio::task::spawn_blocking(move || run(req))
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
        .map_err(bad_request)?;

    tracing::info!(
        score = response.solution.score,
        pieces = response.solution.piece_count(),
        reason = %response.solution.stop_reason,
        "optimize finished"
    );
    Ok(Json(response))
}

fn main() {
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open("development.log")
        .expect("failed to open development.log");

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_target(false)
        .with_ansi(false)
        .with_max_level(Level::INFO)
        .init();

    // Kept alive until exit so pending events flush.
    let _sentry = std::env::var("SENTRY_DSN").ok().map(|dsn| {
        sentry::init((
            dsn,
            sentry::ClientOptions {
                release: sentry::release_name!(),
                ..Default::default()
            },
        ))
    });

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("failed to build tokio runtime")
        .block_on(serve());
}

async fn serve() {
    let port = std::env::var("PORT").unwrap_or_else(|_| "3001".to_string());
    let addr = format!("0.0.0.0:{port}");

    let app = Router::new()
        .route("/up", get(|| async { "ok" }))
        .route("/optimize", post(optimize))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        );

    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap();
    eprintln!("Listening on {addr}");
    axum::serve(listener, app).await.unwrap();
}
