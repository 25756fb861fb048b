use std::path::Path;

use axum::{
    async_trait,
    extract::{FromRequest, Request, State},
    http::{header, Method},
    response::{IntoResponse, Response},
    routing::post,
    Form, Json, Router,
};
use jssdk_clock::Clock;
use jssdk_tickets::{AppId, CredentialCache, CredentialError, PermissionResponse, SignaturePacket};
use serde::Deserialize;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeFile,
    trace::TraceLayer,
};

/// A request to sign a page URL for a tenant
///
/// Accepted either as JSON or as URL-encoded form data.
#[derive(Debug, Deserialize)]
pub struct PermissionRequest {
    #[serde(rename = "appId")]
    pub app_id: AppId,
    pub url: String,
}

#[async_trait]
impl<S: Send + Sync> FromRequest<S> for PermissionRequest {
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_form = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map_or(false, is_form_content_type);

        if is_form {
            let Form(body) = Form::<Self>::from_request(req, state)
                .await
                .map_err(IntoResponse::into_response)?;
            Ok(body)
        } else {
            let Json(body) = Json::<Self>::from_request(req, state)
                .await
                .map_err(IntoResponse::into_response)?;
            Ok(body)
        }
    }
}

fn is_form_content_type(content_type: &str) -> bool {
    let essence = content_type.split(';').next().unwrap_or_default().trim();
    essence.eq_ignore_ascii_case("application/x-www-form-urlencoded")
}

/// Builds the service
///
/// With a `static_dir`, its `index.html` is also served for `/` and
/// `/index.html`. No other file in the directory is reachable.
pub fn router<C>(cache: CredentialCache<C>, static_dir: Option<&Path>) -> Router
where
    C: Clock + Clone + Send + Sync + 'static,
{
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    let mut app = Router::new()
        .route("/getPermission", post(get_permission::<C>))
        .route(
            "/getPermissionWithRefresh",
            post(get_permission_with_refresh::<C>),
        );

    if let Some(dir) = static_dir {
        let index = dir.join("index.html");
        app = app
            .route_service("/", ServeFile::new(&index))
            .route_service("/index.html", ServeFile::new(&index));
    }

    app.layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(cache)
}

async fn get_permission<C: Clock>(
    State(cache): State<CredentialCache<C>>,
    request: PermissionRequest,
) -> Json<PermissionResponse> {
    let result = cache.get_permission(&request.app_id, &request.url).await;
    respond(&request, result)
}

async fn get_permission_with_refresh<C: Clock>(
    State(cache): State<CredentialCache<C>>,
    request: PermissionRequest,
) -> Json<PermissionResponse> {
    let result = cache
        .get_permission_with_refresh(&request.app_id, &request.url)
        .await;
    respond(&request, result)
}

// Failures are still answered with 200; `errcode` carries the outcome.
fn respond(
    request: &PermissionRequest,
    result: Result<SignaturePacket, CredentialError>,
) -> Json<PermissionResponse> {
    if let Err(error) = &result {
        tracing::warn!(
            app_id = %request.app_id,
            errcode = error.errcode(),
            error = (error as &dyn std::error::Error),
            "unable to sign url"
        );
    }

    Json(result.into())
}
