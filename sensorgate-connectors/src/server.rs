//! HTTP read API
//!
//! | group                          | route                                              |
//! |--------------------------------|----------------------------------------------------|
//! | `TEMPERATURE`                  | `GET /temperature/:to_unit?from_unit=&from_value=` |
//! | `WEIGHT`                       | `GET /weight/:to_unit?from_unit=&from_value=`      |
//! | `LENGTH`                       | `GET /length/:to_unit?from_unit=&from_value=`      |
//! | `PRODUCT_INFO`                 | `GET /information/product`                         |
//! | `SENSOR_TEMPERATURE`           | `GET /temperature/sensors/:serial`                 |
//! | `SENSOR_INFO`                  | `GET /information/sensors/:serial`                 |
//! | `SENSOR_TEMPERATURE_ANALYTICS` | `GET /analytics/temperature/sensors/:serial?duration=` |
//!
//! Only the groups passed to [`router`] are mounted. Every answer is JSON,
//! failures included:
//!
//! | failure                       | status |
//! |-------------------------------|--------|
//! | invalid argument, bad unit    | 400    |
//! | unknown sensor or route       | 404    |
//! | `Accept` excludes JSON        | 406    |
//! | sensor not readable right now | 503    |
//! | storage or anything else      | 500    |

use std::future::Future;

use axum::extract::{Path, Query, Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use log::{debug, info, warn};
use serde::Deserialize;
use tokio::net::TcpListener;

use sensorgate_core::{ApiGroup, Dimension, ErrorKind, GatewayError, SensorQueryService};

use crate::envelope::{
    ConversionEnvelope, ErrorEnvelope, HistoryEnvelope, ProductEnvelope, ReadingEnvelope, SensorEnvelope,
};
use crate::ConnectorError;

#[derive(Clone)]
pub struct AppState {
    pub service: SensorQueryService,
}

/// Build the router with the enabled API groups
pub fn router(service: SensorQueryService, apis: &[ApiGroup]) -> Router {
    let mut router: Router<AppState> = Router::new();

    for api in apis {
        debug!("enabling API group {:?}", api);
        router = match api {
            ApiGroup::Temperature => router.route("/temperature/:to_unit", get(convert_temperature)),
            ApiGroup::Weight => router.route("/weight/:to_unit", get(convert_weight)),
            ApiGroup::Length => router.route("/length/:to_unit", get(convert_length)),
            ApiGroup::ProductInfo => router.route("/information/product", get(product)),
            ApiGroup::SensorTemperature => router.route("/temperature/sensors/:serial", get(current_temperature)),
            ApiGroup::SensorInfo => router.route("/information/sensors/:serial", get(sensor_info)),
            ApiGroup::SensorTemperatureAnalytics => {
                router.route("/analytics/temperature/sensors/:serial", get(temperature_history))
            }
        };
    }

    router
        .fallback(not_found)
        .layer(middleware::from_fn(require_json))
        .with_state(AppState { service })
}

/// Bind the listening socket
pub async fn bind(addr: &str) -> Result<TcpListener, ConnectorError> {
    TcpListener::bind(addr)
        .await
        .map_err(|e| ConnectorError::ConfigError(format!("cannot bind {}: {}", addr, e)))
}

/// Serve `app` until `shutdown` resolves
pub async fn serve<F>(listener: TcpListener, app: Router, shutdown: F) -> Result<(), ConnectorError>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        info!("HTTP API listening on {}", addr);
    }
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| ConnectorError::ProtocolError(e.to_string()))
}

/// JSON error answer
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self { status, message: message.into() }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        let status = match err.kind() {
            ErrorKind::InvalidArgument => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            warn!("request failed with {}: {}", self.status, self.message);
        } else {
            debug!("request rejected with {}: {}", self.status, self.message);
        }
        (self.status, Json(ErrorEnvelope::new(self.status.as_u16(), self.message))).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct ConversionQuery {
    from_unit: Option<String>,
    from_value: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DurationQuery {
    duration: Option<String>,
}

fn convert(
    state: &AppState,
    dimension: Dimension,
    to_unit: &str,
    query: ConversionQuery,
) -> Result<Json<ConversionEnvelope>, ApiError> {
    let result = state.service.convert(
        dimension,
        query.from_unit.as_deref().unwrap_or_default(),
        query.from_value.as_deref().unwrap_or_default(),
        to_unit,
    )?;
    Ok(Json(ConversionEnvelope::success(result)))
}

async fn convert_temperature(
    State(state): State<AppState>,
    Path(to_unit): Path<String>,
    Query(query): Query<ConversionQuery>,
) -> Result<Json<ConversionEnvelope>, ApiError> {
    convert(&state, Dimension::Temperature, &to_unit, query)
}

async fn convert_weight(
    State(state): State<AppState>,
    Path(to_unit): Path<String>,
    Query(query): Query<ConversionQuery>,
) -> Result<Json<ConversionEnvelope>, ApiError> {
    convert(&state, Dimension::Mass, &to_unit, query)
}

async fn convert_length(
    State(state): State<AppState>,
    Path(to_unit): Path<String>,
    Query(query): Query<ConversionQuery>,
) -> Result<Json<ConversionEnvelope>, ApiError> {
    convert(&state, Dimension::Length, &to_unit, query)
}

async fn product() -> Json<ProductEnvelope> {
    Json(ProductEnvelope::current())
}

async fn current_temperature(
    State(state): State<AppState>,
    Path(serial): Path<String>,
) -> Result<Json<ReadingEnvelope>, ApiError> {
    let reading = state.service.current_reading(&serial)?;
    Ok(Json(ReadingEnvelope::success(serial, reading)))
}

async fn sensor_info(
    State(state): State<AppState>,
    Path(serial): Path<String>,
) -> Result<Json<SensorEnvelope>, ApiError> {
    let record = state.service.sensor(&serial).await?;
    Ok(Json(SensorEnvelope::success(record)))
}

async fn temperature_history(
    State(state): State<AppState>,
    Path(serial): Path<String>,
    Query(query): Query<DurationQuery>,
) -> Result<Json<HistoryEnvelope>, ApiError> {
    let duration = match query.duration.as_deref().map(str::trim) {
        Some(duration) if !duration.is_empty() => duration.to_string(),
        _ => return Err(ApiError::new(StatusCode::BAD_REQUEST, "Missing required duration parameter")),
    };

    let readings = state.service.readings(&serial, &duration).await?;
    Ok(Json(HistoryEnvelope::success(serial, readings)))
}

async fn not_found(request: Request) -> ApiError {
    ApiError::new(
        StatusCode::NOT_FOUND,
        format!("The requested URL [{}] was not found on this server.", request.uri().path()),
    )
}

async fn require_json(request: Request, next: Next) -> Response {
    let accept = request
        .headers()
        .get(header::ACCEPT)
        .map(|value| value.to_str().unwrap_or_default().to_string());

    match accept {
        Some(accept) if !accepts_json(&accept) => ApiError::new(
            StatusCode::NOT_ACCEPTABLE,
            format!("Accept [{}] is not supported; only application/json is served.", accept),
        )
        .into_response(),
        _ => next.run(request).await,
    }
}

/// Whether an `Accept` header value admits `application/json`
pub fn accepts_json(accept: &str) -> bool {
    if accept.trim().is_empty() {
        return true;
    }
    accept
        .split(',')
        .filter_map(|range| range.split(';').next())
        .map(|media| media.trim().to_ascii_lowercase())
        .any(|media| matches!(media.as_str(), "application/json" | "application/*" | "*/*"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_json() {
        assert!(accepts_json(""));
        assert!(accepts_json("application/json"));
        assert!(accepts_json("text/html, application/json;q=0.9"));
        assert!(accepts_json("*/*"));
        assert!(accepts_json("Application/*"));
        assert!(!accepts_json("text/html"));
        assert!(!accepts_json("application/xml, text/plain"));
    }

    #[test]
    fn test_error_status_mapping() {
        let cases = [
            (GatewayError::invalid("duration", "x", "bad"), StatusCode::BAD_REQUEST),
            (GatewayError::UnknownUnit { unit: "furlong".into() }, StatusCode::BAD_REQUEST),
            (GatewayError::NotFound("gone".into()), StatusCode::NOT_FOUND),
            (GatewayError::Unavailable("crc".into()), StatusCode::SERVICE_UNAVAILABLE),
            (GatewayError::Storage("disk".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
    }
}
