use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tracing::{debug, error, info};

use super::error::ApiError;
use super::types::*;
use crate::admin::AdminKey;
use crate::catalog::{Comment, Movie};
use crate::server::AppState;

fn validate_movie(movie: &Movie) -> Result<(), ApiError> {
    if movie.name.trim().is_empty() {
        return Err(ApiError::BadRequest("Movie name must not be empty.".to_string()));
    }
    Ok(())
}

/// POST /movies
pub async fn add_movie(
    State(state): State<AppState>,
    payload: Result<Json<Movie>, JsonRejection>,
) -> Result<(StatusCode, Json<Movie>), ApiError> {
    let Json(movie) = payload?;
    validate_movie(&movie)?;

    let added = state.catalog.add_movie(&movie).await.map_err(|e| {
        error!("Failed to add movie {:?}: {}", movie.name, e);
        ApiError::Internal("Error adding the movie.".to_string())
    })?;

    match added {
        Some(movie) => {
            info!("Added movie {} ({})", movie.id, movie.name);
            Ok((StatusCode::CREATED, Json(movie)))
        }
        None => Err(ApiError::AlreadyExists(
            "The movie already exists in the catalog.".to_string(),
        )),
    }
}

/// PUT /movies/:movie_id
pub async fn update_movie(
    State(state): State<AppState>,
    Path(movie_id): Path<String>,
    payload: Result<Json<Movie>, JsonRejection>,
) -> Result<Json<Movie>, ApiError> {
    let Json(movie) = payload?;
    validate_movie(&movie)?;

    state
        .catalog
        .update_movie(&movie_id, &movie)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound)
}

/// DELETE /movies/:movie_id
pub async fn delete_movie(
    State(state): State<AppState>,
    Path(movie_id): Path<String>,
    AdminKey(key): AdminKey,
) -> Result<Json<MessageResponse>, ApiError> {
    let admin = match key {
        Some(ref key) => state.admin.authenticate(key).await,
        None => None,
    };
    if state.config.admin.enforce_delete && admin.is_none() {
        return Err(ApiError::Unauthorized);
    }

    if !state.catalog.delete_movie(&movie_id).await? {
        return Err(ApiError::NotFound);
    }

    match admin {
        Some(admin) => info!("Movie {} deleted by {}", movie_id, admin.name),
        None => info!("Movie {} deleted", movie_id),
    }
    Ok(Json(MessageResponse::new(MOVIE_DELETED)))
}

/// GET /movies
pub async fn list_movies(State(state): State<AppState>) -> Result<Json<Vec<Movie>>, ApiError> {
    Ok(Json(state.catalog.list_movies().await?))
}

/// GET /movies/search?query=
pub async fn search_movies(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Response, ApiError> {
    let query = params.query.as_deref().map(str::trim).unwrap_or_default();
    if query.is_empty() {
        return Err(ApiError::BadRequest("Search query must not be empty.".to_string()));
    }

    let movies = state.catalog.search_movies(query).await?;
    if movies.is_empty() {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }
    Ok(Json(movies).into_response())
}

/// GET /movies/genre/:genre_id
pub async fn movies_by_genre(
    State(state): State<AppState>,
    Path(genre_id): Path<String>,
) -> Result<Json<Vec<Movie>>, ApiError> {
    Ok(Json(state.catalog.movies_by_genre(&genre_id).await?))
}

/// GET /movies/top10
pub async fn top_movies(State(state): State<AppState>) -> Result<Json<Vec<Movie>>, ApiError> {
    let limit = state.config.catalog.top_limit();
    let mut movies = state.catalog.top_movies(limit).await?;
    movies.truncate(limit);
    Ok(Json(movies))
}

/// GET /movies/latest
pub async fn latest_movies(State(state): State<AppState>) -> Result<Json<Vec<Movie>>, ApiError> {
    let today = chrono::Utc::now().date_naive();
    let movies = state
        .catalog
        .latest_movies(state.config.catalog.latest_limit, today)
        .await?;
    Ok(Json(movies))
}

/// GET /movies/:movie_id
pub async fn get_movie(
    State(state): State<AppState>,
    Path(movie_id): Path<String>,
) -> Result<Json<Movie>, ApiError> {
    state
        .catalog
        .get_movie(&movie_id)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound)
}

/// POST /movies/:movie_id/rate?rating=
pub async fn add_rating(
    State(state): State<AppState>,
    Path(movie_id): Path<String>,
    Query(params): Query<RateParams>,
) -> Result<StatusCode, ApiError> {
    let rating = match u8::try_from(params.rating) {
        Ok(r @ 1..=5) => r,
        _ => {
            return Err(ApiError::BadRequest(
                "Rating must be between 1 and 5.".to_string(),
            ))
        }
    };

    if !state.catalog.add_rating(&movie_id, rating).await? {
        debug!("Rating {} for unknown movie {} ignored", rating, movie_id);
    }
    Ok(StatusCode::OK)
}

/// POST /movies/:movie_id/comments
pub async fn add_comment(
    State(state): State<AppState>,
    Path(movie_id): Path<String>,
    payload: Result<Json<NewComment>, JsonRejection>,
) -> Result<(StatusCode, Json<Comment>), ApiError> {
    let Json(req) = payload?;
    if req.text.trim().is_empty() {
        return Err(ApiError::BadRequest("Comment text must not be empty.".to_string()));
    }
    let author = req
        .author
        .as_deref()
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .unwrap_or("anonymous");

    let comment = Comment::new(author, &req.text);
    if !state.catalog.add_comment(&movie_id, &comment).await? {
        return Err(ApiError::NotFound);
    }
    Ok((StatusCode::CREATED, Json(comment)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::{
        body::{to_bytes, Body},
        http::{Method, Request},
        Router,
    };
    use chrono::NaiveDate;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::admin::ConfigAdminService;
    use crate::catalog::{DbError, DbResult, MemoryCatalog, MovieCatalog};
    use crate::config::{AdminAccount, Config};
    use crate::server::{build_router, AppState};

    fn app_with(config: Config, catalog: Arc<dyn MovieCatalog>) -> Router {
        let admin = Arc::new(ConfigAdminService::new(config.admin.admins.clone()));
        build_router(AppState::new(config, catalog, admin))
    }

    fn app() -> Router {
        app_with(Config::default(), Arc::new(MemoryCatalog::new()))
    }

    async fn send(
        app: &Router,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Vec<u8>) {
        send_with(app, Request::builder().method(method).uri(uri), body).await
    }

    async fn send_with(
        app: &Router,
        builder: axum::http::request::Builder,
        body: Option<Value>,
    ) -> (StatusCode, Vec<u8>) {
        let req = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let resp = app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, bytes.to_vec())
    }

    fn json_body(bytes: &[u8]) -> Value {
        serde_json::from_slice(bytes).unwrap()
    }

    fn heat() -> Value {
        json!({
            "id": "heat",
            "name": "Heat",
            "synopsis": "A group of professional bank robbers.",
            "director": "Michael Mann",
            "genres": ["crime", "thriller"],
            "releaseDate": "1995-12-15",
            "rating": 0.0,
            "votes": 0,
            "comments": []
        })
    }

    async fn create(app: &Router, body: Value) -> Value {
        let (status, bytes) = send(app, Method::POST, "/movies", Some(body)).await;
        assert_eq!(status, StatusCode::CREATED);
        json_body(&bytes)
    }

    #[tokio::test]
    async fn test_create_echoes_movie() {
        let app = app();
        assert_eq!(create(&app, heat()).await, heat());
    }

    #[tokio::test]
    async fn test_create_without_id_assigns_one() {
        let app = app();
        let movie = create(&app, json!({"name": "Alien", "releaseDate": "1979-05-25"})).await;
        let id = movie["id"].as_str().unwrap();
        assert_eq!(id.len(), 20);

        let (status, _) = send(&app, Method::GET, &format!("/movies/{}", id), None).await;
        assert_eq!(status, StatusCode::OK);

        // Same title and year maps to the same id.
        let (status, _) = send(
            &app,
            Method::POST,
            "/movies",
            Some(json!({"name": "alien", "releaseDate": "1979-09-01"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_create_duplicate_is_rejected() {
        let app = app();
        create(&app, heat()).await;

        let mut other = heat();
        other["name"] = json!("Something Else");
        let (status, body) = send(&app, Method::POST, "/movies", Some(other)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(!body.is_empty());

        let (_, body) = send(&app, Method::GET, "/movies/heat", None).await;
        assert_eq!(json_body(&body)["name"], "Heat");
    }

    #[tokio::test]
    async fn test_create_requires_name() {
        let app = app();
        let (status, _) = send(&app, Method::POST, "/movies", Some(json!({"name": "  "}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_malformed_bodies_are_bad_requests() {
        let app = app();
        create(&app, heat()).await;

        let (status, _) = send(&app, Method::POST, "/movies", Some(json!({"id": "x"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = send(&app, Method::PUT, "/movies/heat", Some(json!({"genres": []}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = send(&app, Method::POST, "/movies", Some(json!({"name": 42}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = send(&app, Method::POST, "/movies/heat/comments", Some(json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let req = Request::builder()
            .method(Method::POST)
            .uri("/movies")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let resp = app.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let (_, body) = send(&app, Method::GET, "/movies/heat", None).await;
        assert_eq!(json_body(&body)["name"], "Heat");
    }

    #[tokio::test]
    async fn test_null_server_fields_are_ignored() {
        let app = app();
        let movie = create(
            &app,
            json!({"id": "a", "name": "A", "rating": null, "votes": null, "comments": null}),
        )
        .await;
        assert_eq!(movie["rating"], 0.0);
        assert_eq!(movie["votes"], 0);
    }

    #[tokio::test]
    async fn test_update() {
        let app = app();
        create(&app, heat()).await;

        let mut change = heat();
        change["name"] = json!("Heat (1995)");
        change["genres"] = json!(["crime"]);
        let (status, body) = send(&app, Method::PUT, "/movies/heat", Some(change.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_body(&body), change);

        let (status, _) = send(&app, Method::PUT, "/movies/missing", Some(heat())).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, body) = send(&app, Method::GET, "/movies", None).await;
        let list = json_body(&body);
        assert_eq!(list.as_array().unwrap().len(), 1);
        assert_eq!(list[0]["id"], "heat");
    }

    #[tokio::test]
    async fn test_delete() {
        let app = app();
        create(&app, heat()).await;

        let (status, _) = send(&app, Method::DELETE, "/movies/missing", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = send(&app, Method::DELETE, "/movies/heat", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_body(&body), json!({"message": "Movie deleted successfully"}));

        let (_, body) = send(&app, Method::GET, "/movies", None).await;
        assert_eq!(json_body(&body), json!([]));
    }

    #[tokio::test]
    async fn test_delete_with_admin_enforcement() {
        let mut config = Config::default();
        config.admin.enforce_delete = true;
        config.admin.admins.push(AdminAccount {
            name: "alice".to_string(),
            key_hash: bcrypt::hash("letmein", 4).unwrap(),
        });
        let app = app_with(config, Arc::new(MemoryCatalog::new()));
        create(&app, heat()).await;

        let (status, _) = send(&app, Method::DELETE, "/movies/heat", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let builder = Request::builder()
            .method(Method::DELETE)
            .uri("/movies/heat")
            .header("X-Admin-Key", "nope");
        let (status, _) = send_with(&app, builder, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let builder = Request::builder()
            .method(Method::DELETE)
            .uri("/movies/heat")
            .header("Authorization", "Bearer letmein");
        let (status, _) = send_with(&app, builder, None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_search() {
        let app = app();
        create(&app, heat()).await;
        create(&app, json!({"id": "hh", "name": "Heathers"})).await;
        create(&app, json!({"id": "alien", "name": "Alien"})).await;

        let (status, _) = send(&app, Method::GET, "/movies/search?query=", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = send(&app, Method::GET, "/movies/search", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = send(&app, Method::GET, "/movies/search?query=zzz", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(body.is_empty());

        let (status, body) = send(&app, Method::GET, "/movies/search?query=heat", None).await;
        assert_eq!(status, StatusCode::OK);
        let ids: Vec<String> = json_body(&body)
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["id"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(ids, vec!["heat", "hh"]);
    }

    #[tokio::test]
    async fn test_genre() {
        let app = app();
        create(&app, heat()).await;
        create(&app, json!({"id": "alien", "name": "Alien", "genres": ["horror"]})).await;

        let (status, body) = send(&app, Method::GET, "/movies/genre/horror", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_body(&body)[0]["id"], "alien");

        let (status, body) = send(&app, Method::GET, "/movies/genre/western", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_body(&body), json!([]));
    }

    #[tokio::test]
    async fn test_rating() {
        let app = app();
        create(&app, heat()).await;

        for bad in ["0", "6", "-1", "abc", "3.5"] {
            let uri = format!("/movies/heat/rate?rating={}", bad);
            let (status, _) = send(&app, Method::POST, &uri, None).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "rating={}", bad);
        }
        let (status, _) = send(&app, Method::POST, "/movies/heat/rate", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = send(&app, Method::POST, "/movies/heat/rate?rating=3", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.is_empty());

        let (_, body) = send(&app, Method::GET, "/movies/heat", None).await;
        let movie = json_body(&body);
        assert_eq!(movie["rating"], 3.0);
        assert_eq!(movie["votes"], 1);

        let (status, _) = send(&app, Method::POST, "/movies/missing/rate?rating=3", None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_top10_is_capped() {
        let app = app();
        for i in 0..14 {
            let id = format!("m{}", i);
            create(&app, json!({"id": id, "name": format!("Movie {}", i)})).await;
            let uri = format!("/movies/{}/rate?rating={}", id, i % 5 + 1);
            send(&app, Method::POST, &uri, None).await;
        }

        let (status, body) = send(&app, Method::GET, "/movies/top10", None).await;
        assert_eq!(status, StatusCode::OK);
        let top = json_body(&body);
        let top = top.as_array().unwrap();
        assert_eq!(top.len(), 10);
        assert_eq!(top[0]["rating"], 5.0);
    }

    #[tokio::test]
    async fn test_latest() {
        let app = app();
        create(&app, heat()).await;
        create(&app, json!({"id": "new", "name": "New", "releaseDate": "2020-01-01"})).await;
        create(&app, json!({"id": "tbd", "name": "Unreleased", "releaseDate": "2999-01-01"})).await;

        let (status, body) = send(&app, Method::GET, "/movies/latest", None).await;
        assert_eq!(status, StatusCode::OK);
        let ids: Vec<String> = json_body(&body)
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["id"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(ids, vec!["new", "heat"]);
    }

    #[tokio::test]
    async fn test_get_by_id_includes_comments() {
        let app = app();
        create(&app, heat()).await;

        let (status, _) = send(&app, Method::GET, "/movies/missing", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = send(
            &app,
            Method::POST,
            "/movies/heat/comments",
            Some(json!({"author": "ann", "text": "The diner scene."})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(json_body(&body)["author"], "ann");

        let (status, _) = send(
            &app,
            Method::POST,
            "/movies/heat/comments",
            Some(json!({"text": " "})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            &app,
            Method::POST,
            "/movies/missing/comments",
            Some(json!({"text": "hello"})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = send(&app, Method::GET, "/movies/heat", None).await;
        assert_eq!(status, StatusCode::OK);
        let movie = json_body(&body);
        assert_eq!(movie["comments"].as_array().unwrap().len(), 1);
        assert_eq!(movie["comments"][0]["text"], "The diner scene.");
    }

    struct BrokenCatalog;

    fn broken<T>() -> DbResult<T> {
        Err(DbError::Corrupt("disk on fire".to_string()))
    }

    #[async_trait]
    impl MovieCatalog for BrokenCatalog {
        async fn add_movie(&self, _: &Movie) -> DbResult<Option<Movie>> {
            broken()
        }
        async fn update_movie(&self, _: &str, _: &Movie) -> DbResult<Option<Movie>> {
            broken()
        }
        async fn delete_movie(&self, _: &str) -> DbResult<bool> {
            broken()
        }
        async fn list_movies(&self) -> DbResult<Vec<Movie>> {
            broken()
        }
        async fn search_movies(&self, _: &str) -> DbResult<Vec<Movie>> {
            broken()
        }
        async fn movies_by_genre(&self, _: &str) -> DbResult<Vec<Movie>> {
            broken()
        }
        async fn top_movies(&self, _: usize) -> DbResult<Vec<Movie>> {
            broken()
        }
        async fn latest_movies(&self, _: usize, _: NaiveDate) -> DbResult<Vec<Movie>> {
            broken()
        }
        async fn get_movie(&self, _: &str) -> DbResult<Option<Movie>> {
            broken()
        }
        async fn add_rating(&self, _: &str, _: u8) -> DbResult<bool> {
            broken()
        }
        async fn add_comment(&self, _: &str, _: &Comment) -> DbResult<bool> {
            broken()
        }
    }

    #[tokio::test]
    async fn test_catalog_failures_become_500() {
        let app = app_with(Config::default(), Arc::new(BrokenCatalog));

        let (status, body) = send(&app, Method::POST, "/movies", Some(heat())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, b"Error adding the movie.");

        let (status, _) = send(&app, Method::GET, "/movies", None).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let (status, _) = send(&app, Method::GET, "/movies/heat", None).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let (status, _) = send(&app, Method::DELETE, "/movies/heat", None).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

        // Validation still happens before the catalog is asked.
        let (status, _) = send(&app, Method::POST, "/movies/heat/rate?rating=9", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
