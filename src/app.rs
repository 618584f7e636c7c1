use std::net::SocketAddr;

use axum::{middleware, routing::get, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::auth::handlers;
use crate::ratelimit;
use crate::state::AppState;

pub fn build_app(state: AppState) -> Router {
    // Tight tier in front of the credential endpoints, general tier on the
    // rest; a request is counted by exactly one tier.
    let auth_public = handlers::public_routes().layer(middleware::from_fn_with_state(
        state.clone(),
        ratelimit::auth_tier,
    ));
    let auth_protected = handlers::protected_routes().layer(middleware::from_fn_with_state(
        state.clone(),
        ratelimit::general_tier,
    ));
    let misc = Router::new()
        .route("/health", get(handlers::health))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            ratelimit::general_tier,
        ));

    Router::new()
        .nest("/api/v1/auth", auth_public.merge(auth_protected))
        .nest("/api/v1", misc)
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!("http_request", %method, uri = %uri)
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     _latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        if status.is_server_error() {
                            tracing::error!(%status, "response");
                        } else {
                            tracing::info!(%status, "response");
                        }
                    },
                ),
        )
}

pub async fn serve(app: Router) -> anyhow::Result<()> {
    let addr: SocketAddr = format!(
        "{}:{}",
        std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
        std::env::var("APP_PORT").unwrap_or_else(|_| "8080".into())
    )
    .parse()?;

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    // Connect-info is what the rate limiter keys on.
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}
