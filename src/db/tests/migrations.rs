use crate::db::*;
use tempfile::NamedTempFile;

#[tokio::test]
async fn database_creation_applies_schema() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();

    // Verify tables exist
    let mut conn = db.pool.acquire().await.unwrap();

    let tables: Vec<String> =
        sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .fetch_all(&mut *conn)
            .await
            .unwrap();

    assert!(tables.contains(&"torrents".to_string()));
    assert!(tables.contains(&"torrent_files".to_string()));
    assert!(tables.contains(&"schema_version".to_string()));

    db.close().await;
}

#[tokio::test]
async fn reopening_does_not_reapply_migrations() {
    let temp_file = NamedTempFile::new().unwrap();

    let db = Database::new(temp_file.path()).await.unwrap();
    db.close().await;

    let db = Database::new(temp_file.path()).await.unwrap();
    let mut conn = db.pool.acquire().await.unwrap();

    let version: i64 = sqlx::query_scalar("SELECT MAX(version) FROM schema_version")
        .fetch_one(&mut *conn)
        .await
        .unwrap();
    assert_eq!(version, 1, "schema version must stay at v1 after reopen");

    let applied: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM schema_version")
        .fetch_one(&mut *conn)
        .await
        .unwrap();
    assert_eq!(applied, 1, "migration v1 must only be recorded once");

    db.close().await;
}

#[tokio::test]
async fn missing_parent_directory_is_created() {
    let dir = tempfile::TempDir::new().unwrap();
    let nested = dir.path().join("state").join("blackhole.db");

    let db = Database::new(&nested).await.unwrap();

    assert!(nested.exists());
    db.close().await;
}
