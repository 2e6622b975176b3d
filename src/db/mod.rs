pub mod models;
pub mod repository;

pub use models::*;
pub use repository::*;

#[cfg(test)]
pub(crate) mod testing {
    /// In-memory SQLite pool with migrations applied.
    ///
    /// Capped at one connection: every connection to `sqlite::memory:` gets
    /// its own private database, so a larger pool would scatter state.
    pub async fn memory_pool() -> sqlx::SqlitePool {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("failed to open in-memory sqlite");

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .expect("failed to run migrations");

        pool
    }
}
