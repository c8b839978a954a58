use async_trait::async_trait;
use chrono::NaiveDate;

use super::model::*;

/// Storage, search, ranking and rating aggregation for movies.
///
/// Missing movies and duplicates are reported through `Option`/`bool`;
/// `DbError` is reserved for failures of the backing store.
#[async_trait]
pub trait MovieCatalog: Send + Sync {
    /// Store a new movie. Returns `None` when a movie with the same id exists.
    async fn add_movie(&self, movie: &Movie) -> DbResult<Option<Movie>>;
    async fn update_movie(&self, id: &str, movie: &Movie) -> DbResult<Option<Movie>>;
    async fn delete_movie(&self, id: &str) -> DbResult<bool>;
    async fn list_movies(&self) -> DbResult<Vec<Movie>>;
    async fn search_movies(&self, query: &str) -> DbResult<Vec<Movie>>;
    async fn movies_by_genre(&self, genre_id: &str) -> DbResult<Vec<Movie>>;
    async fn top_movies(&self, limit: usize) -> DbResult<Vec<Movie>>;
    /// Movies released on or before `today`, newest first.
    async fn latest_movies(&self, limit: usize, today: NaiveDate) -> DbResult<Vec<Movie>>;
    /// Full detail, comments included.
    async fn get_movie(&self, id: &str) -> DbResult<Option<Movie>>;
    async fn add_rating(&self, id: &str, rating: u8) -> DbResult<bool>;
    async fn add_comment(&self, id: &str, comment: &Comment) -> DbResult<bool>;
}

/// Prepare a client-submitted movie for insertion: trim fields, assign an
/// id when none was given and reset the catalog-owned aggregates.
pub fn new_movie(movie: &Movie) -> Movie {
    let mut out = Movie {
        id: movie.id.trim().to_string(),
        name: String::new(),
        synopsis: None,
        director: None,
        genres: Vec::new(),
        release_date: None,
        rating: 0.0,
        votes: 0,
        comments: Vec::new(),
    };
    out.apply_update(movie);
    if out.id.is_empty() {
        out.id = crate::util::movie_id(&out.name, out.release_date);
    }
    out
}

/// Ordering for the top list: best average first, then most votes, then name.
pub fn rank_movies(movies: &mut [Movie]) {
    movies.sort_by(|a, b| {
        b.rating
            .total_cmp(&a.rating)
            .then(b.votes.cmp(&a.votes))
            .then_with(|| a.sort_name().cmp(&b.sort_name()))
            .then_with(|| a.id.cmp(&b.id))
    });
}
