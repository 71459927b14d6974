//! Torrent and torrent-file persistence operations.

use crate::error::DatabaseError;
use crate::types::{Torrent, TorrentFile, TorrentStatus};
use crate::{Error, Result};

use super::{Database, TorrentFileRow, TorrentRow};

impl Database {
    /// Insert or update a torrent keyed by info hash
    ///
    /// Called at every lifecycle transition, so a re-dropped descriptor
    /// updates the existing row instead of failing. The original
    /// `created_at` is preserved and any stale error message is cleared.
    pub async fn upsert_torrent(&self, torrent: &Torrent) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let source_path = torrent.source_path.to_string_lossy().into_owned();
        let watch_folder = torrent.watch_folder.to_string_lossy().into_owned();

        sqlx::query(
            r#"
            INSERT INTO torrents (
                info_hash, provider_id, name, folder, source_path, watch_folder,
                size_bytes, magnet, status, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(info_hash) DO UPDATE SET
                provider_id = excluded.provider_id,
                name = excluded.name,
                folder = excluded.folder,
                source_path = excluded.source_path,
                watch_folder = excluded.watch_folder,
                size_bytes = excluded.size_bytes,
                magnet = excluded.magnet,
                status = excluded.status,
                error_message = NULL,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&torrent.info_hash)
        .bind(&torrent.id)
        .bind(&torrent.name)
        .bind(&torrent.folder)
        .bind(&source_path)
        .bind(&watch_folder)
        .bind(torrent.size)
        .bind(&torrent.magnet)
        .bind(torrent.status.as_str())
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to upsert torrent: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Replace the file listing for a torrent
    ///
    /// Runs in a transaction so a reprocessed torrent never shows a mix of
    /// old and new file rows.
    pub async fn upsert_files(&self, info_hash: &str, files: &[TorrentFile]) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to begin transaction: {}",
                e
            )))
        })?;

        sqlx::query("DELETE FROM torrent_files WHERE torrent_hash = ?")
            .bind(info_hash)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to clear torrent files: {}",
                    e
                )))
            })?;

        for file in files {
            sqlx::query(
                r#"
                INSERT INTO torrent_files (torrent_hash, file_id, name, size_bytes, relative_path)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(info_hash)
            .bind(&file.id)
            .bind(&file.name)
            .bind(file.size)
            .bind(&file.relative_path)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to insert torrent file: {}",
                    e
                )))
            })?;
        }

        tx.commit().await.map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to commit torrent files: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Get a torrent with its files by info hash
    pub async fn get_torrent(&self, info_hash: &str) -> Result<Option<Torrent>> {
        let row = sqlx::query_as::<_, TorrentRow>(
            r#"
            SELECT
                info_hash, provider_id, name, folder, source_path, watch_folder,
                size_bytes, magnet, status, error_message, created_at, updated_at
            FROM torrents
            WHERE info_hash = ?
            "#,
        )
        .bind(info_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get torrent: {}",
                e
            )))
        })?;

        match row {
            Some(row) => {
                let files = self.get_files(info_hash).await?;
                Ok(Some(row.into_torrent(files)))
            }
            None => Ok(None),
        }
    }

    /// List torrents with a specific status, oldest first
    pub async fn list_torrents_by_status(&self, status: TorrentStatus) -> Result<Vec<Torrent>> {
        let rows = sqlx::query_as::<_, TorrentRow>(
            r#"
            SELECT
                info_hash, provider_id, name, folder, source_path, watch_folder,
                size_bytes, magnet, status, error_message, created_at, updated_at
            FROM torrents
            WHERE status = ?
            ORDER BY created_at ASC
            "#,
        )
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list torrents by status: {}",
                e
            )))
        })?;

        let mut torrents = Vec::with_capacity(rows.len());
        for row in rows {
            let files = self.get_files(&row.info_hash).await?;
            torrents.push(row.into_torrent(files));
        }

        Ok(torrents)
    }

    /// Mark a torrent failed and record its error message
    pub async fn set_torrent_error(&self, info_hash: &str, error: &str) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            "UPDATE torrents SET status = ?, error_message = ?, updated_at = ? WHERE info_hash = ?",
        )
        .bind(TorrentStatus::Failed.as_str())
        .bind(error)
        .bind(now)
        .bind(info_hash)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to set torrent error: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Update the lifecycle status of a torrent
    pub async fn set_torrent_status(&self, info_hash: &str, status: TorrentStatus) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query("UPDATE torrents SET status = ?, updated_at = ? WHERE info_hash = ?")
            .bind(status.as_str())
            .bind(now)
            .bind(info_hash)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to set torrent status: {}",
                    e
                )))
            })?;

        Ok(())
    }

    /// Fetch the file rows for a torrent, ordered by file id
    async fn get_files(&self, info_hash: &str) -> Result<Vec<TorrentFileRow>> {
        let rows = sqlx::query_as::<_, TorrentFileRow>(
            r#"
            SELECT torrent_hash, file_id, name, size_bytes, relative_path
            FROM torrent_files
            WHERE torrent_hash = ?
            ORDER BY file_id ASC
            "#,
        )
        .bind(info_hash)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get torrent files: {}",
                e
            )))
        })?;

        Ok(rows)
    }
}
