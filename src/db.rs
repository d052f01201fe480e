use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;

pub type DbPool = PgPool;

pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<DbPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(5))
        .idle_timeout(Some(Duration::from_secs(600)))
        .connect(database_url)
        .await
}

pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

/// Connection string with everything before the host (user, password) hidden, for logs.
pub fn redact_database_url(database_url: &str) -> String {
    match database_url.rsplit_once('@') {
        Some((_, host)) => format!("<hidden>@{}", host),
        None => database_url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redact_hides_credentials() {
        assert_eq!(
            redact_database_url("postgres://chat:s3cr@t@db:5432/chat"),
            "<hidden>@db:5432/chat"
        );
    }

    #[test]
    fn test_redact_keeps_url_without_credentials() {
        assert_eq!(redact_database_url("postgres://localhost/chat"), "postgres://localhost/chat");
    }
}
