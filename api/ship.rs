use serde::Deserialize;
use serde_json::json;
use shipping_orchestrator::models::selection::SelectionCriteria;
use shipping_orchestrator::models::shipment::ShipmentOrder;
use shipping_orchestrator::{ShippingEngine, ShippingError};
use tokio::sync::OnceCell;
use vercel_runtime::{run, Body, Error, Request, Response, StatusCode};

static ENGINE: OnceCell<ShippingEngine> = OnceCell::const_new();

#[tokio::main]
async fn main() -> Result<(), Error> {
    let _ = tracing_subscriber::fmt().try_init();
    run(handler).await
}

/// Body of POST /api/ship.
#[derive(Debug, Deserialize)]
struct ShipBody {
    order: ShipmentOrder,
    /// Without criteria, providers are tried in registry priority order.
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

/// POST /api/ship: Create a shipment, falling back across providers.
///
/// Returns the booked shipment together with every attempt made. When all
/// providers fail, answers 502 with each provider's failure reason.
pub async fn handler(req: Request) -> Result<Response<Body>, Error> {
    if *req.method() != http::Method::POST {
        return json_response(
            StatusCode::METHOD_NOT_ALLOWED,
            json!({
                "error": "Method not allowed",
                "message": "Use POST with an order to create a shipment"
            }),
        );
    }

    let body: ShipBody = match serde_json::from_slice(body_bytes(req.body())) {
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

    match engine
        .create_shipment_with_attempts(&body.order, body.criteria.as_ref())
        .await
    {
        Ok(outcome) => json_response(StatusCode::CREATED, json!(outcome)),
        Err(ShippingError::AllProvidersFailed { failures }) => {
            tracing::error!(order_id = %body.order.order_id, attempts = failures.len(), "every provider failed");
            json_response(
                StatusCode::BAD_GATEWAY,
                json!({ "error": "All providers failed", "failures": failures }),
            )
        }
        Err(e) => json_response(e.status_code(), json!({ "error": e.to_string() })),
    }
}
