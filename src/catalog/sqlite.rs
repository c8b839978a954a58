use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{Sqlite, Transaction};
use tracing::{debug, info};

use super::catalog::*;
use super::model::*;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Movie ids per `IN (...)` genre lookup.
const GENRE_BATCH: usize = 500;

const MOVIE_COLUMNS: &str = "m.id, m.name, m.synopsis, m.director, m.releasedate, m.rating, m.votes";

type MovieRow = (
    String,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
    f64,
    i64,
);

pub struct SqliteRepository {
    pool: SqlitePool,
}

impl SqliteRepository {
    pub async fn new(db_path: &str) -> DbResult<Self> {
        let options = SqliteConnectOptions::from_str(db_path)?
            .create_if_missing(true)
            .foreign_keys(true);

        // Every connection to an in-memory database sees its own empty
        // database, so the pool must hold on to exactly one.
        let pool = if db_path.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None::<Duration>)
                .max_lifetime(None::<Duration>)
                .connect_with(options)
                .await?
        } else {
            SqlitePoolOptions::new()
                .max_connections(5)
                .connect_with(options)
                .await?
        };

        let repo = Self { pool };
        repo.init_schema().await?;

        info!("Database initialized at {}", db_path);

        Ok(repo)
    }

    async fn init_schema(&self) -> DbResult<()> {
        let schema = include_str!("schema.sql");
        sqlx::raw_sql(schema).execute(&self.pool).await?;
        Ok(())
    }

    /// Genres of the given movies, in stored order.
    async fn load_genres(&self, movie_ids: &[&str]) -> DbResult<HashMap<String, Vec<String>>> {
        let mut genres: HashMap<String, Vec<String>> = HashMap::new();

        for chunk in movie_ids.chunks(GENRE_BATCH) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let sql = format!(
                "SELECT movieid, genreid FROM movie_genres WHERE movieid IN ({}) ORDER BY movieid, position",
                placeholders
            );
            let mut query = sqlx::query_as::<_, (String, String)>(&sql);
            for id in chunk {
                query = query.bind(*id);
            }
            for (movie_id, genre_id) in query.fetch_all(&self.pool).await? {
                genres.entry(movie_id).or_default().push(genre_id);
            }
        }
        Ok(genres)
    }

    async fn load_comments(&self, movie_id: &str) -> DbResult<Vec<Comment>> {
        let rows = sqlx::query_as::<_, (String, String, String, String)>(
            "SELECT id, author, text, created FROM comments WHERE movieid = ? ORDER BY created, id",
        )
        .bind(movie_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(id, author, text, created)| -> DbResult<Comment> {
                let created = DateTime::parse_from_rfc3339(&created)
                    .map_err(|e| DbError::Corrupt(format!("comment {}: {}", id, e)))?
                    .with_timezone(&Utc);
                Ok(Comment {
                    id,
                    author,
                    text,
                    created,
                })
            })
            .collect()
    }

    /// Turn movie rows into movies, attaching their genres.
    async fn hydrate(&self, rows: Vec<MovieRow>) -> DbResult<Vec<Movie>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<&str> = rows.iter().map(|row| row.0.as_str()).collect();
        let mut genres = self.load_genres(&ids).await?;

        rows.into_iter()
            .map(|row| {
                let movie_genres = genres.remove(&row.0).unwrap_or_default();
                movie_from_row(row, movie_genres)
            })
            .collect()
    }

    async fn fetch_movies(&self, sql: &str, binds: &[&str]) -> DbResult<Vec<Movie>> {
        let mut query = sqlx::query_as::<_, MovieRow>(sql);
        for value in binds {
            query = query.bind(*value);
        }
        let rows = query.fetch_all(&self.pool).await?;
        self.hydrate(rows).await
    }

    async fn write_genres(
        tx: &mut Transaction<'_, Sqlite>,
        movie_id: &str,
        genres: &[String],
    ) -> DbResult<()> {
        sqlx::query("DELETE FROM movie_genres WHERE movieid = ?")
            .bind(movie_id)
            .execute(&mut **tx)
            .await?;

        for (position, genre) in genres.iter().enumerate() {
            sqlx::query("INSERT INTO movie_genres (movieid, genreid, position) VALUES (?, ?, ?)")
                .bind(movie_id)
                .bind(genre)
                .bind(position as i64)
                .execute(&mut **tx)
                .await?;
        }
        Ok(())
    }
}

fn movie_from_row(row: MovieRow, genres: Vec<String>) -> DbResult<Movie> {
    let (id, name, synopsis, director, releasedate, rating, votes) = row;
    let release_date = match releasedate {
        Some(s) => Some(
            NaiveDate::parse_from_str(&s, DATE_FORMAT)
                .map_err(|e| DbError::Corrupt(format!("movie {}: release date {}: {}", id, s, e)))?,
        ),
        None => None,
    };
    Ok(Movie {
        id,
        name,
        synopsis,
        director,
        genres,
        release_date,
        rating,
        votes,
        comments: Vec::new(),
    })
}

fn format_date(date: Option<NaiveDate>) -> Option<String> {
    date.map(|d| d.format(DATE_FORMAT).to_string())
}

/// SQLite takes a signed 64-bit LIMIT.
fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

/// LIKE pattern matching `query` anywhere, with wildcards in it taken literally.
fn like_pattern(query: &str) -> String {
    let mut pattern = String::with_capacity(query.len() + 2);
    pattern.push('%');
    for c in query.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

#[async_trait]
impl MovieCatalog for SqliteRepository {
    async fn add_movie(&self, movie: &Movie) -> DbResult<Option<Movie>> {
        let movie = new_movie(movie);
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "INSERT INTO movies
            (id, name, sortname, searchname, synopsis, director, releasedate, rating, votes, created)
            VALUES (?, ?, ?, ?, ?, ?, ?, 0, 0, ?)
            ON CONFLICT(id) DO NOTHING",
        )
        .bind(&movie.id)
        .bind(&movie.name)
        .bind(movie.sort_name())
        .bind(movie.search_name())
        .bind(&movie.synopsis)
        .bind(&movie.director)
        .bind(format_date(movie.release_date))
        .bind(Utc::now().to_rfc3339())
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            debug!("Movie {} already exists", movie.id);
            return Ok(None);
        }

        Self::write_genres(&mut tx, &movie.id, &movie.genres).await?;
        tx.commit().await?;

        Ok(Some(movie))
    }

    async fn update_movie(&self, id: &str, movie: &Movie) -> DbResult<Option<Movie>> {
        let mut updated = movie.clone();
        updated.apply_update(movie);

        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            "UPDATE movies SET name = ?, sortname = ?, searchname = ?, synopsis = ?, director = ?, releasedate = ?
            WHERE id = ?",
        )
        .bind(&updated.name)
        .bind(updated.sort_name())
        .bind(updated.search_name())
        .bind(&updated.synopsis)
        .bind(&updated.director)
        .bind(format_date(updated.release_date))
        .bind(id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        Self::write_genres(&mut tx, id, &updated.genres).await?;
        tx.commit().await?;

        self.get_movie(id).await
    }

    async fn delete_movie(&self, id: &str) -> DbResult<bool> {
        let mut tx = self.pool.begin().await?;
        for table in ["movie_genres", "ratings", "comments"] {
            sqlx::query(&format!("DELETE FROM {} WHERE movieid = ?", table))
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }
        let result = sqlx::query("DELETE FROM movies WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_movies(&self) -> DbResult<Vec<Movie>> {
        let sql = format!("SELECT {} FROM movies m ORDER BY m.sortname, m.id", MOVIE_COLUMNS);
        self.fetch_movies(&sql, &[]).await
    }

    async fn search_movies(&self, query: &str) -> DbResult<Vec<Movie>> {
        let sql = format!(
            "SELECT {} FROM movies m WHERE m.searchname LIKE ? ESCAPE '\\' ORDER BY m.sortname, m.id",
            MOVIE_COLUMNS
        );
        let pattern = like_pattern(&query.to_lowercase());
        self.fetch_movies(&sql, &[pattern.as_str()]).await
    }

    async fn movies_by_genre(&self, genre_id: &str) -> DbResult<Vec<Movie>> {
        let sql = format!(
            "SELECT {} FROM movies m JOIN movie_genres g ON g.movieid = m.id
            WHERE g.genreid = ? ORDER BY m.sortname, m.id",
            MOVIE_COLUMNS
        );
        self.fetch_movies(&sql, &[genre_id]).await
    }

    async fn top_movies(&self, limit: usize) -> DbResult<Vec<Movie>> {
        let sql = format!(
            "SELECT {} FROM movies m ORDER BY m.rating DESC, m.votes DESC, m.sortname, m.id LIMIT {}",
            MOVIE_COLUMNS,
            sql_limit(limit)
        );
        self.fetch_movies(&sql, &[]).await
    }

    async fn latest_movies(&self, limit: usize, today: NaiveDate) -> DbResult<Vec<Movie>> {
        let sql = format!(
            "SELECT {} FROM movies m
            WHERE m.releasedate IS NOT NULL AND m.releasedate <= ?
            ORDER BY m.releasedate DESC, m.sortname, m.id LIMIT {}",
            MOVIE_COLUMNS,
            sql_limit(limit)
        );
        let today = today.format(DATE_FORMAT).to_string();
        self.fetch_movies(&sql, &[today.as_str()]).await
    }

    async fn get_movie(&self, id: &str) -> DbResult<Option<Movie>> {
        let sql = format!("SELECT {} FROM movies m WHERE m.id = ?", MOVIE_COLUMNS);
        let Some(mut movie) = self.fetch_movies(&sql, &[id]).await?.pop() else {
            return Ok(None);
        };
        movie.comments = self.load_comments(id).await?;
        Ok(Some(movie))
    }

    async fn add_rating(&self, id: &str, rating: u8) -> DbResult<bool> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "INSERT INTO ratings (movieid, rating, created)
            SELECT ?, ?, ? WHERE EXISTS (SELECT 1 FROM movies WHERE id = ?)",
        )
        .bind(id)
        .bind(i64::from(rating))
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(false);
        }

        sqlx::query(
            "UPDATE movies SET
                votes = (SELECT COUNT(*) FROM ratings WHERE movieid = ?1),
                rating = (SELECT AVG(rating) FROM ratings WHERE movieid = ?1)
            WHERE id = ?1",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn add_comment(&self, id: &str, comment: &Comment) -> DbResult<bool> {
        let result = sqlx::query(
            "INSERT INTO comments (id, movieid, author, text, created)
            SELECT ?, ?, ?, ?, ? WHERE EXISTS (SELECT 1 FROM movies WHERE id = ?)",
        )
        .bind(&comment.id)
        .bind(id)
        .bind(&comment.author)
        .bind(&comment.text)
        .bind(comment.created.to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
