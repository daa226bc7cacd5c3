use serde_json::json;
use shipping_orchestrator::data::generate_rate_requests;
use shipping_orchestrator::models::report::ReportRequest;
use shipping_orchestrator::report::{default_strategies, generate_report, with_ceilings};
use shipping_orchestrator::ShippingEngine;
use tokio::sync::OnceCell;
use vercel_runtime::{run, Body, Error, Request, Response, StatusCode};

static ENGINE: OnceCell<ShippingEngine> = OnceCell::const_new();

/// Upper bound on requests per report, to keep a single invocation short.
const MAX_REQUEST_COUNT: usize = 1000;
const DEFAULT_REQUEST_COUNT: usize = 120;

#[tokio::main]
async fn main() -> Result<(), Error> {
    let _ = tracing_subscriber::fmt().try_init();
    run(handler).await
}

fn json_response(status: StatusCode, payload: serde_json::Value) -> Result<Response<Body>, Error> {
    Ok(Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(Body::Text(payload.to_string()))?)
}

/// POST /api/report: Compare selection strategies over a seeded dataset.
///
/// An empty body uses the default 120 requests and no extra ceilings.
pub async fn handler(req: Request) -> Result<Response<Body>, Error> {
    if *req.method() != http::Method::POST {
        return json_response(
            StatusCode::METHOD_NOT_ALLOWED,
            json!({
                "error": "Method not allowed",
                "message": "Use POST to generate a strategy report"
            }),
        );
    }

    let params: ReportRequest = match req.body() {
        Body::Empty => ReportRequest::default(),
        Body::Text(text) if text.trim().is_empty() => ReportRequest::default(),
        Body::Text(text) => match serde_json::from_str(text) {
            Ok(params) => params,
            Err(e) => {
                return json_response(
                    StatusCode::BAD_REQUEST,
                    json!({ "error": "Invalid request body", "message": e.to_string() }),
                )
            }
        },
        Body::Binary(bytes) => match serde_json::from_slice(bytes) {
            Ok(params) => params,
            Err(e) => {
                return json_response(
                    StatusCode::BAD_REQUEST,
                    json!({ "error": "Invalid request body", "message": e.to_string() }),
                )
            }
        },
    };

    let count = params.request_count.unwrap_or(DEFAULT_REQUEST_COUNT);
    if count == 0 || count > MAX_REQUEST_COUNT {
        return json_response(
            StatusCode::BAD_REQUEST,
            json!({
                "error": "Invalid request_count",
                "message": format!("request_count must be between 1 and {MAX_REQUEST_COUNT}")
            }),
        );
    }

    let engine = match ENGINE.get_or_try_init(ShippingEngine::from_env).await {
        Ok(engine) => engine,
        Err(e) => return json_response(e.status_code(), json!({ "error": e.to_string() })),
    };

    let requests = generate_rate_requests(count);
    let strategies = with_ceilings(default_strategies(), params.max_days, params.max_cost);
    let report = generate_report(&requests, engine, &strategies).await;

    json_response(StatusCode::OK, json!(report))
}
