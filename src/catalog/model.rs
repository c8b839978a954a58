use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::util::make_sort_name;

/// A catalog entry. `rating`, `votes` and `comments` are owned by the
/// catalog; values supplied by clients for them are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Movie {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub synopsis: Option<String>,
    #[serde(default)]
    pub director: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub genres: Vec<String>,
    #[serde(default)]
    pub release_date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub rating: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub votes: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub comments: Vec<Comment>,
}

impl Movie {
    pub fn sort_name(&self) -> String {
        make_sort_name(&self.name)
    }

    /// Lowercased name that searches are matched against.
    pub fn search_name(&self) -> String {
        self.name.to_lowercase()
    }

    /// Copy the client-editable fields of `other` into `self`.
    pub fn apply_update(&mut self, other: &Movie) {
        self.name = other.name.trim().to_string();
        self.synopsis = other.synopsis.clone();
        self.director = other.director.clone();
        self.genres = normalize_genres(&other.genres);
        self.release_date = other.release_date;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub author: String,
    pub text: String,
    pub created: DateTime<Utc>,
}

impl Comment {
    pub fn new(author: &str, text: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            author: author.trim().to_string(),
            text: text.trim().to_string(),
            created: Utc::now(),
        }
    }
}

/// An explicit `null` reads as the type's default.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Trimmed, deduplicated genre ids in their original order.
pub fn normalize_genres(genres: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(genres.len());
    for genre in genres {
        let genre = genre.trim();
        if !genre.is_empty() && !out.iter().any(|g| g == genre) {
            out.push(genre.to_string());
        }
    }
    out
}

/// Order used by listings and search results.
pub fn sort_movies(movies: &mut [Movie]) {
    movies.sort_by_cached_key(|m| (m.sort_name(), m.id.clone()));
}

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

pub type DbResult<T> = Result<T, DbError>;
