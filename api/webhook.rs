use serde_json::json;
use shipping_orchestrator::models::provider::ProviderId;
use shipping_orchestrator::{ShippingEngine, ShippingError};
use tokio::sync::OnceCell;
use vercel_runtime::{run, Body, Error, Request, Response, StatusCode};

static ENGINE: OnceCell<ShippingEngine> = OnceCell::const_new();

/// Headers checked for a webhook signature, in order.
const SIGNATURE_HEADERS: [&str; 2] = ["x-webhook-signature", "x-api-key"];

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

fn body_bytes(body: &Body) -> &[u8] {
    match body {
        Body::Empty => &[],
        Body::Text(text) => text.as_bytes(),
        Body::Binary(bytes) => bytes,
    }
}

/// Percent-decoded `provider` parameter of a query string.
fn query_provider(query: &str) -> Option<String> {
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == "provider")
        .map(|(_, value)| value.into_owned())
}

/// Provider id from `?provider=<id>` or the `x-provider-id` header.
fn provider_id(req: &Request) -> Option<ProviderId> {
    req.uri()
        .query()
        .and_then(query_provider)
        .filter(|id| !id.is_empty())
        .or_else(|| {
            req.headers()
                .get("x-provider-id")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        })
        .filter(|id| !id.is_empty())
        .map(ProviderId::from)
}

/// POST /api/webhook?provider=<id>: Ingest a carrier status callback.
///
/// Signature failures are answered with 200 and `accepted: false` so the
/// carrier does not retry a payload that will never verify.
pub async fn handler(req: Request) -> Result<Response<Body>, Error> {
    if *req.method() != http::Method::POST {
        return json_response(
            StatusCode::METHOD_NOT_ALLOWED,
            json!({
                "error": "Method not allowed",
                "message": "Carriers must POST webhook payloads"
            }),
        );
    }

    let Some(provider_id) = provider_id(&req) else {
        return json_response(
            StatusCode::BAD_REQUEST,
            json!({ "error": "Missing provider", "message": "Pass ?provider=<id> or an x-provider-id header" }),
        );
    };

    let signature = SIGNATURE_HEADERS
        .iter()
        .find_map(|name| req.headers().get(*name))
        .and_then(|v| v.to_str().ok());

    let engine = match ENGINE.get_or_try_init(ShippingEngine::from_env).await {
        Ok(engine) => engine,
        Err(e) => return json_response(e.status_code(), json!({ "error": e.to_string() })),
    };

    match engine
        .ingest_webhook(&provider_id, body_bytes(req.body()), signature)
        .await
    {
        Ok(event) => json_response(
            StatusCode::OK,
            json!({
                "accepted": true,
                "tracking_number": event.tracking_number,
                "status": event.status,
                "current_status": engine.shipment_status(&provider_id, &event.tracking_number),
            }),
        ),
        Err(e @ ShippingError::SignatureInvalid { .. }) => {
            tracing::warn!(provider_id = %provider_id, error = %e, "webhook discarded");
            json_response(StatusCode::OK, json!({ "accepted": false }))
        }
        Err(e) => json_response(e.status_code(), json!({ "accepted": false, "error": e.to_string() })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_provider_is_percent_decoded() {
        assert_eq!(query_provider("provider=ship%20rocket&x=1").as_deref(), Some("ship rocket"));
        assert_eq!(query_provider("a=1&provider=blue%2Dcargo").as_deref(), Some("blue-cargo"));
        assert_eq!(query_provider("provider=swift+ship").as_deref(), Some("swift ship"));
        assert_eq!(query_provider("carrier=swiftship"), None);
    }

    #[test]
    fn test_header_is_used_without_a_query_id() {
        let req = http::Request::builder()
            .uri("https://example.com/api/webhook")
            .header("x-provider-id", "parcelpro")
            .body(Body::Empty)
            .unwrap();
        assert_eq!(provider_id(&req), Some(ProviderId::from("parcelpro")));

        let req = http::Request::builder()
            .uri("https://example.com/api/webhook?provider=")
            .header("x-provider-id", "parcelpro")
            .body(Body::Empty)
            .unwrap();
        assert_eq!(provider_id(&req), Some(ProviderId::from("parcelpro")));
    }
}
