use serde_json::json;
use shipping_orchestrator::{version, ShippingEngine};
use tokio::sync::OnceCell;
use vercel_runtime::{run, Body, Error, Request, Response, StatusCode};

static ENGINE: OnceCell<ShippingEngine> = OnceCell::const_new();

#[tokio::main]
async fn main() -> Result<(), Error> {
    let _ = tracing_subscriber::fmt().try_init();
    run(handler).await
}

/// GET /api/health: Liveness plus the providers the engine can route to.
pub async fn handler(_req: Request) -> Result<Response<Body>, Error> {
    let engine = match ENGINE.get_or_try_init(ShippingEngine::from_env).await {
        Ok(engine) => engine,
        Err(e) => {
            tracing::error!(error = %e, "engine failed to start");
            let payload = json!({
                "status": "degraded",
                "version": version(),
                "error": e.to_string(),
            });
            return Ok(Response::builder()
                .status(StatusCode::SERVICE_UNAVAILABLE)
                .header("Content-Type", "application/json")
                .body(Body::Text(payload.to_string()))?);
        }
    };

    let payload = json!({
        "status": "ok",
        "version": version(),
        "provider_count": engine.get_provider_count(),
        "providers": engine.get_available_providers(),
    });

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "application/json")
        .body(Body::Text(payload.to_string()))?)
}
