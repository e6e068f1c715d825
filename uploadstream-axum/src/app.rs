use axum::{
    body::Body,
    extract::DefaultBodyLimit,
    http::Request,
    middleware,
    routing::get,
    Router,
};
use tokio::net::{TcpListener, ToSocketAddrs};
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::info;

use crate::{auth, routes, AppState};

/// Every route, behind API key authentication, request ids and tracing.
pub fn router(state: AppState) -> Router {
    let files = Router::new()
        .route("/files", get(routes::list_files).post(routes::upload_file))
        .route("/files/{id}", get(routes::download_file).delete(routes::delete_file))
        .route("/files/{id}/metadata", get(routes::file_metadata))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::require_api_key))
        // Uploads are bounded by the declared size, not by a body limit.
        .layer(DefaultBodyLimit::disable())
        .with_state(state);

    files.layer(
        ServiceBuilder::new()
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .layer(
                TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                    let request_id = request
                        .headers()
                        .get("x-request-id")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("-");
                    tracing::info_span!(
                        "http",
                        method = %request.method(),
                        uri = %request.uri(),
                        request_id = %request_id,
                    )
                }),
            )
            .layer(PropagateRequestIdLayer::x_request_id()),
    )
}

/// The HTTP face of the service
#[derive(Clone)]
pub struct HttpApp {
    pub state: AppState,
    pub router: Router,
}

impl HttpApp {
    pub fn new(state: AppState) -> Self {
        Self {
            router: router(state.clone()),
            state,
        }
    }

    /// Serve until the state's shutdown token is cancelled, then stop
    /// accepting connections and let in-flight requests wind down.
    pub async fn listen<A>(self, addr: A) -> anyhow::Result<()>
    where
        A: ToSocketAddrs,
    {
        let listener = TcpListener::bind(addr).await?;
        info!("Listening on http://{}", listener.local_addr()?);

        let shutdown: CancellationToken = self.state.shutdown.clone();
        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;
        Ok(())
    }
}
