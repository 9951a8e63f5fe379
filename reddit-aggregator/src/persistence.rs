use crate::types::{Post, Result, StoreResult};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use std::collections::HashMap;
use tracing::{debug, info};

/// Upper bound on rows returned by `get_posts_for_subreddit_scores`.
pub const MAX_CANDIDATE_POSTS: i64 = 3000;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS redditpost
        ( id TEXT NOT NULL
        , name TEXT NOT NULL
        , permalink TEXT NOT NULL
        , time_created INTEGER NOT NULL
        , time_stored INTEGER NOT NULL
        , is_active INTEGER NOT NULL
        , is_sticky INTEGER NOT NULL
        , score INTEGER NOT NULL
        , title TEXT NOT NULL
        , url TEXT
        , subreddit_name TEXT NOT NULL
        , subreddit_id TEXT NOT NULL
        , PRIMARY KEY (id, subreddit_id)
    ) WITHOUT ROWID
    "#,
    "CREATE INDEX IF NOT EXISTS reddit_subreddit_name ON redditpost(subreddit_name)",
    "CREATE INDEX IF NOT EXISTS reddit_url ON redditpost(url)",
    "CREATE INDEX IF NOT EXISTS reddit_time_created ON redditpost(time_created)",
    "CREATE INDEX IF NOT EXISTS reddit_time_stored ON redditpost(time_stored)",
    r#"
    CREATE TABLE IF NOT EXISTS source_last_run
        ( id TEXT PRIMARY KEY
        , last_run INTEGER NOT NULL
    ) WITHOUT ROWID
    "#,
];

const SELECT_POST: &str = r#"
    SELECT id, name, permalink, time_created, time_stored, is_active, is_sticky,
           score, title, url, subreddit_name, subreddit_id
    FROM redditpost
"#;

/// Owns the post and source last-run tables. Every call is its own implicit transaction; storage
/// errors are returned as-is and never retried here.
pub struct Persistence {
    db: SqlitePool,
}

impl Persistence {
    /// Wraps an existing pool and makes sure the schema exists.
    pub async fn new(db: SqlitePool) -> Result<Self> {
        let persistence = Self { db };
        persistence.init_tables().await?;
        Ok(persistence)
    }

    /// Opens (creating if needed) the sqlite database file at `path`.
    pub async fn open(path: &str) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let db = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;
        info!("Opened post database at {}", path);
        Self::new(db).await
    }

    /// A private in-memory database. A single connection that is never
    /// recycled, otherwise the data would vanish with it.
    pub async fn open_in_memory() -> Result<Self> {
        let db = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        Self::new(db).await
    }

    pub fn get_db_pool(&self) -> &SqlitePool {
        &self.db
    }

    pub async fn close(&self) {
        self.db.close().await;
    }

    async fn init_tables(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(*statement).execute(&self.db).await?;
        }
        Ok(())
    }

    /// Inserts a new post, updates a known one, or skips a new post whose
    /// url is already stored under any other identity.
    pub async fn store_post(&self, post: &Post) -> Result<StoreResult> {
        let exists: i64 = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM redditpost WHERE id = ? AND subreddit_id = ? LIMIT 1)",
        )
        .bind(&post.id)
        .bind(&post.subreddit_id)
        .fetch_one(&self.db)
        .await?;

        if exists != 0 {
            debug!("Updating post {}/{}", post.subreddit_name, post.id);
            self.update_post(post).await?;
            return Ok(StoreResult::Updated);
        }

        if let Some(url) = post.url.as_deref().filter(|u| !u.is_empty()) {
            let url_taken: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM redditpost WHERE url = ? LIMIT 1)",
            )
            .bind(url)
            .fetch_one(&self.db)
            .await?;
            if url_taken != 0 {
                debug!("Skipping post {}/{}: url already stored", post.subreddit_name, post.id);
                return Ok(StoreResult::Skipped);
            }
        }

        debug!("Inserting post {}/{}", post.subreddit_name, post.id);
        self.insert_post(post).await?;
        Ok(StoreResult::New)
    }

    async fn insert_post(&self, post: &Post) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO redditpost
                (id, name, permalink, time_created, time_stored, is_active, is_sticky,
                 score, title, url, subreddit_name, subreddit_id)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&post.id)
        .bind(&post.name)
        .bind(&post.permalink)
        .bind(post.time_created)
        .bind(post.time_stored)
        .bind(post.is_active)
        .bind(post.is_sticky)
        .bind(post.score)
        .bind(&post.title)
        .bind(post.url.as_deref().filter(|u| !u.is_empty()))
        .bind(&post.subreddit_name)
        .bind(&post.subreddit_id)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    // id, subreddit_id, time_created and time_stored are never rewritten.
    async fn update_post(&self, post: &Post) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE redditpost SET
                  name = ?
                , permalink = ?
                , is_active = ?
                , is_sticky = ?
                , score = ?
                , title = ?
                , url = ?
            WHERE id = ?
              AND subreddit_id = ?
            "#,
        )
        .bind(&post.name)
        .bind(&post.permalink)
        .bind(post.is_active)
        .bind(post.is_sticky)
        .bind(post.score)
        .bind(&post.title)
        .bind(post.url.as_deref().filter(|u| !u.is_empty()))
        .bind(&post.id)
        .bind(&post.subreddit_id)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    pub async fn get_post(&self, id: &str, subreddit_id: &str) -> Result<Option<Post>> {
        let row = sqlx::query(&format!("{SELECT_POST} WHERE id = ? AND subreddit_id = ?"))
            .bind(id)
            .bind(subreddit_id)
            .fetch_optional(&self.db)
            .await?;
        row.as_ref().map(post_from_row).transpose()
    }

    pub async fn get_posts_for_subreddit(&self, subreddit_name: &str) -> Result<Vec<Post>> {
        let rows = sqlx::query(&format!(
            "{SELECT_POST} WHERE subreddit_name = ? ORDER BY time_created, id"
        ))
        .bind(subreddit_name)
        .fetch_all(&self.db)
        .await?;
        rows.iter().map(post_from_row).collect()
    }

    pub async fn count_posts(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM redditpost")
            .fetch_one(&self.db)
            .await?;
        Ok(count)
    }

    /// Records when `source` last completed a harvest cleanly.
    pub async fn upsert_last_run(&self, source: &str, last_run: i64) -> Result<()> {
        sqlx::query("INSERT OR REPLACE INTO source_last_run (id, last_run) VALUES (?, ?)")
            .bind(source)
            .bind(last_run)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    pub async fn get_last_run(&self, source: &str) -> Result<Option<i64>> {
        let last_run: Option<i64> =
            sqlx::query_scalar("SELECT last_run FROM source_last_run WHERE id = ?")
                .bind(source)
                .fetch_optional(&self.db)
                .await?;
        Ok(last_run)
    }

    pub async fn get_last_runs(&self) -> Result<HashMap<String, i64>> {
        let rows = sqlx::query("SELECT id, last_run FROM source_last_run")
            .fetch_all(&self.db)
            .await?;
        rows.iter()
            .map(|row| -> Result<(String, i64)> {
                Ok((row.try_get("id")?, row.try_get("last_run")?))
            })
            .collect()
    }

    /// Score of the post at `percentile` rank among the subreddit's active
    /// posts stored since `min_time`, ranked by score descending: the row at
    /// 0-based offset `floor(percentile * n / 100)`.
    pub async fn get_score_at_percentile(
        &self,
        min_time: i64,
        subreddit_name: &str,
        percentile: f64,
    ) -> Result<i64> {
        // Everything is kept. Negative scores are not worth showing anyway.
        if percentile >= 100.0 {
            return Ok(0);
        }

        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM redditpost
            WHERE subreddit_name = ?
              AND time_stored >= ?
              AND is_active = 1
            "#,
        )
        .bind(subreddit_name)
        .bind(min_time)
        .fetch_one(&self.db)
        .await?;
        if count == 0 {
            return Ok(0);
        }

        let offset = (percentile.max(0.0) * count as f64 / 100.0).floor() as i64;
        let score: i64 = sqlx::query_scalar(
            r#"
            SELECT score
            FROM redditpost
            WHERE subreddit_name = ?
              AND time_stored >= ?
              AND is_active = 1
            ORDER BY score DESC
            LIMIT 1
            OFFSET ?
            "#,
        )
        .bind(subreddit_name)
        .bind(min_time)
        .bind(offset.min(count - 1))
        .fetch_one(&self.db)
        .await?;

        debug!(
            "Score at percentile {} of {} ({} posts, offset {}): {}",
            percentile, subreddit_name, count, offset, score
        );
        Ok(score)
    }

    /// Active posts stored since `min_time` that meet their subreddit's
    /// minimum score, newest first.
    pub async fn get_posts_for_subreddit_scores(
        &self,
        min_time: i64,
        subreddit_min_scores: &HashMap<String, i64>,
    ) -> Result<Vec<Post>> {
        if subreddit_min_scores.is_empty() {
            return Ok(Vec::new());
        }

        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(SELECT_POST);
        query.push(" WHERE (");
        let mut criteria = query.separated(" OR ");
        for (subreddit_name, min_score) in subreddit_min_scores {
            criteria.push("(subreddit_name = ");
            criteria.push_bind_unseparated(subreddit_name.clone());
            criteria.push_unseparated(" AND score >= ");
            criteria.push_bind_unseparated(*min_score);
            criteria.push_unseparated(")");
        }
        query.push(") AND time_stored >= ");
        query.push_bind(min_time);
        query.push(" AND is_active = 1 ORDER BY time_stored DESC, id ASC LIMIT ");
        query.push_bind(MAX_CANDIDATE_POSTS);

        let rows = query.build().fetch_all(&self.db).await?;
        let posts = rows.iter().map(post_from_row).collect::<Result<Vec<_>>>()?;
        debug!("Retrieved {} candidate posts", posts.len());
        Ok(posts)
    }
}

fn post_from_row(row: &SqliteRow) -> Result<Post> {
    Ok(Post {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        permalink: row.try_get("permalink")?,
        time_created: row.try_get("time_created")?,
        time_stored: row.try_get("time_stored")?,
        is_active: row.try_get("is_active")?,
        is_sticky: row.try_get("is_sticky")?,
        score: row.try_get("score")?,
        title: row.try_get("title")?,
        url: row.try_get("url")?,
        subreddit_name: row.try_get("subreddit_name")?,
        subreddit_id: row.try_get("subreddit_id")?,
    })
}
