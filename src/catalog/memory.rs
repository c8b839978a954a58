use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::RwLock;
use tracing::debug;

use super::catalog::*;
use super::model::*;

#[derive(Debug, Clone)]
struct Entry {
    movie: Movie,
    ratings: Vec<u8>,
}

/// Catalog kept entirely in process memory. Used when no database is
/// configured, and as the backend for handler tests.
#[derive(Default)]
pub struct MemoryCatalog {
    movies: RwLock<HashMap<String, Entry>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Listing form of a movie: comments are only returned by `get_movie`.
    fn summary(entry: &Entry) -> Movie {
        let mut movie = entry.movie.clone();
        movie.comments.clear();
        movie
    }

    async fn collect<F>(&self, filter: F) -> Vec<Movie>
    where
        F: Fn(&Movie) -> bool,
    {
        let movies = self.movies.read().await;
        movies
            .values()
            .filter(|e| filter(&e.movie))
            .map(Self::summary)
            .collect()
    }
}

#[async_trait]
impl MovieCatalog for MemoryCatalog {
    async fn add_movie(&self, movie: &Movie) -> DbResult<Option<Movie>> {
        let movie = new_movie(movie);
        let mut movies = self.movies.write().await;
        if movies.contains_key(&movie.id) {
            debug!("Movie {} already exists", movie.id);
            return Ok(None);
        }
        movies.insert(
            movie.id.clone(),
            Entry {
                movie: movie.clone(),
                ratings: Vec::new(),
            },
        );
        Ok(Some(movie))
    }

    async fn update_movie(&self, id: &str, movie: &Movie) -> DbResult<Option<Movie>> {
        let mut movies = self.movies.write().await;
        let Some(entry) = movies.get_mut(id) else {
            return Ok(None);
        };
        entry.movie.apply_update(movie);
        Ok(Some(entry.movie.clone()))
    }

    async fn delete_movie(&self, id: &str) -> DbResult<bool> {
        let mut movies = self.movies.write().await;
        Ok(movies.remove(id).is_some())
    }

    async fn list_movies(&self) -> DbResult<Vec<Movie>> {
        let mut movies = self.collect(|_| true).await;
        sort_movies(&mut movies);
        Ok(movies)
    }

    async fn search_movies(&self, query: &str) -> DbResult<Vec<Movie>> {
        let needle = query.to_lowercase();
        let mut movies = self
            .collect(|m| m.search_name().contains(&needle))
            .await;
        sort_movies(&mut movies);
        Ok(movies)
    }

    async fn movies_by_genre(&self, genre_id: &str) -> DbResult<Vec<Movie>> {
        let mut movies = self
            .collect(|m| m.genres.iter().any(|g| g == genre_id))
            .await;
        sort_movies(&mut movies);
        Ok(movies)
    }

    async fn top_movies(&self, limit: usize) -> DbResult<Vec<Movie>> {
        let mut movies = self.collect(|_| true).await;
        rank_movies(&mut movies);
        movies.truncate(limit);
        Ok(movies)
    }

    async fn latest_movies(&self, limit: usize, today: NaiveDate) -> DbResult<Vec<Movie>> {
        let mut movies = self
            .collect(|m| m.release_date.is_some_and(|d| d <= today))
            .await;
        movies.sort_by(|a, b| {
            b.release_date
                .cmp(&a.release_date)
                .then_with(|| a.sort_name().cmp(&b.sort_name()))
                .then_with(|| a.id.cmp(&b.id))
        });
        movies.truncate(limit);
        Ok(movies)
    }

    async fn get_movie(&self, id: &str) -> DbResult<Option<Movie>> {
        let movies = self.movies.read().await;
        Ok(movies.get(id).map(|e| e.movie.clone()))
    }

    async fn add_rating(&self, id: &str, rating: u8) -> DbResult<bool> {
        let mut movies = self.movies.write().await;
        let Some(entry) = movies.get_mut(id) else {
            return Ok(false);
        };
        entry.ratings.push(rating);
        let sum: u64 = entry.ratings.iter().map(|&r| u64::from(r)).sum();
        entry.movie.votes = entry.ratings.len() as i64;
        entry.movie.rating = sum as f64 / entry.ratings.len() as f64;
        Ok(true)
    }

    async fn add_comment(&self, id: &str, comment: &Comment) -> DbResult<bool> {
        let mut movies = self.movies.write().await;
        let Some(entry) = movies.get_mut(id) else {
            return Ok(false);
        };
        entry.movie.comments.push(comment.clone());
        Ok(true)
    }
}
