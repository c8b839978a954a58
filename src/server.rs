use axum::{
    http::{HeaderValue, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};
use tracing::warn;

use crate::admin::AdminService;
use crate::api;
use crate::catalog::MovieCatalog;
use crate::config::Config;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub catalog: Arc<dyn MovieCatalog>,
    pub admin: Arc<dyn AdminService>,
}

impl AppState {
    pub fn new(
        config: Config,
        catalog: Arc<dyn MovieCatalog>,
        admin: Arc<dyn AdminService>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            catalog,
            admin,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let movie_routes = Router::new()
        .route("/movies", get(api::list_movies).post(api::add_movie))
        .route("/movies/search", get(api::search_movies))
        .route("/movies/genre/:genre_id", get(api::movies_by_genre))
        .route("/movies/top10", get(api::top_movies))
        .route("/movies/latest", get(api::latest_movies))
        .route(
            "/movies/:movie_id",
            get(api::get_movie)
                .put(api::update_movie)
                .delete(api::delete_movie),
        )
        .route("/movies/:movie_id/rate", post(api::add_rating))
        .route("/movies/:movie_id/comments", post(api::add_comment));

    Router::new()
        .merge(movie_routes)
        .fallback(fallback_handler)
        .layer(axum::middleware::from_fn(crate::middleware::log_request))
        .layer(cors_layer(&state.config.cors.origin))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(origin: &str) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::header::AUTHORIZATION,
            axum::http::HeaderName::from_static("x-admin-key"),
        ]);

    match HeaderValue::from_str(origin) {
        Ok(origin) => layer.allow_origin(origin),
        Err(e) => {
            warn!("Ignoring invalid CORS origin {:?}: {}", origin, e);
            layer
        }
    }
}

async fn fallback_handler() -> impl IntoResponse {
    StatusCode::NOT_FOUND
}
