use serde::Deserialize;
use serde_json::json;
use shipping_orchestrator::models::rate::RateRequest;
use shipping_orchestrator::models::selection::SelectionCriteria;
use shipping_orchestrator::ShippingEngine;
use tokio::sync::OnceCell;
use vercel_runtime::{run, Body, Error, Request, Response, StatusCode};

static ENGINE: OnceCell<ShippingEngine> = OnceCell::const_new();

#[tokio::main]
async fn main() -> Result<(), Error> {
    let _ = tracing_subscriber::fmt().try_init();
    run(handler).await
}

/// Body of POST /api/rates.
#[derive(Debug, Deserialize)]
struct RatesBody {
    #[serde(flatten)]
    request: RateRequest,
    #[serde(default)]
    criteria: Option<SelectionCriteria>,
}

fn json_response(status: StatusCode, payload: serde_json::Value) -> Result<Response<Body>, Error> {
    Ok(Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(Body::Text(payload.to_string()))?)
}

fn body_bytes(body: &Body) -> &[u8] {
    match body {
        Body::Empty => &[],
        Body::Text(text) => text.as_bytes(),
        Body::Binary(bytes) => bytes,
    }
}

/// POST /api/rates: Aggregate rates across providers and pick the best one.
///
/// Criteria default to `cheapest`. The response carries every quoted rate,
/// the providers that failed, and the selection (or `null` when nothing
/// passes the criteria).
pub async fn handler(req: Request) -> Result<Response<Body>, Error> {
    if *req.method() != http::Method::POST {
        return json_response(
            StatusCode::METHOD_NOT_ALLOWED,
            json!({
                "error": "Method not allowed",
                "message": "Use POST with a rate request"
            }),
        );
    }

    let body: RatesBody = match serde_json::from_slice(body_bytes(req.body())) {
        Ok(body) => body,
        Err(e) => {
            return json_response(
                StatusCode::BAD_REQUEST,
                json!({ "error": "Invalid request body", "message": e.to_string() }),
            )
        }
    };

    let engine = match ENGINE.get_or_try_init(ShippingEngine::from_env).await {
        Ok(engine) => engine,
        Err(e) => return json_response(e.status_code(), json!({ "error": e.to_string() })),
    };

    let criteria = body.criteria.unwrap_or_default();
    let aggregated = match engine.get_rates_from_all_providers(&body.request).await {
        Ok(aggregated) => aggregated,
        Err(e) => return json_response(e.status_code(), json!({ "error": e.to_string() })),
    };
    let selection = match engine.select(&aggregated.rates, &criteria) {
        Ok(selection) => selection,
        Err(e) => return json_response(e.status_code(), json!({ "error": e.to_string() })),
    };

    json_response(
        StatusCode::OK,
        json!({
            "source": aggregated.source,
            "rates": aggregated.rates,
            "failures": aggregated.failures,
            "selection": selection,
        }),
    )
}
