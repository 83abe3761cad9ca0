//! UploadService — upload record store and processing state machine,
//! backed by SQLite for metadata and local disk for the raw audio files.
//!
//! Lifecycle: `submit` persists the raw bytes and inserts a `pending`
//! row; `begin_processing` moves it to `processing` and hands the file
//! to the separation tool on a detached task; `on_tool_completed` makes
//! the terminal transition. Status updates are guarded single-row
//! UPDATEs, so illegal transitions and duplicate completion signals fall
//! out as no-ops instead of races.

use bytes::Bytes;
use chrono::Utc;
use futures::{Stream, StreamExt, pin_mut};
use md5::Context;
use sqlx::SqlitePool;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::analyzer::Analyzer;
use super::{ServiceError, ServiceResult};
use crate::context::RequestContext;
use crate::models::upload::{ProcessingStatus, UploadRecord};

/// Media types accepted for upload. Everything else is rejected before a
/// record is created.
const ACCEPTED_AUDIO_TYPES: [&str; 6] = [
    "audio/mpeg",
    "audio/mp3",
    "audio/wav",
    "audio/x-wav",
    "audio/ogg",
    "audio/mp4",
];

const UPLOAD_COLUMNS: &str = "id, owner_id, original_filename, saved_filename, storage_path, \
     size_bytes, etag, artist, title, status, result_path, created_at";

/// Display metadata accompanying a new upload.
#[derive(Debug, Default, Clone)]
pub struct UploadMetadata {
    pub artist: Option<String>,
    pub title: Option<String>,
}

/// Upload record store + processing state machine.
#[derive(Clone)]
pub struct UploadService {
    /// Shared SQLite pool for record metadata.
    pub db: Arc<SqlitePool>,

    /// Directory holding raw uploaded files.
    pub upload_dir: PathBuf,

    /// Directory holding per-upload processed output.
    pub processed_dir: PathBuf,

    analyzer: Analyzer,
}

impl UploadService {
    pub fn new(
        db: Arc<SqlitePool>,
        upload_dir: impl Into<PathBuf>,
        processed_dir: impl Into<PathBuf>,
        analyzer: Analyzer,
    ) -> Self {
        Self {
            db,
            upload_dir: upload_dir.into(),
            processed_dir: processed_dir.into(),
            analyzer,
        }
    }

    /// Per-upload processed output directory, derived from the id.
    pub fn processed_path_for(&self, upload_id: Uuid) -> PathBuf {
        self.processed_dir.join(format!("upload_{}", upload_id))
    }

    /// Strip anything path-like from a client-supplied filename.
    fn sanitize_filename(name: &str) -> String {
        let base = name
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(name)
            .replace("..", "");
        if base.is_empty() { "audio".into() } else { base }
    }

    /// Persist an uploaded audio stream and create its `pending` record.
    ///
    /// - Rejects media types outside the accepted audio set with
    ///   `Validation` before touching disk or database.
    /// - Streams bytes to a temporary file, computing size and MD5 etag
    ///   on the way through, then fsyncs and renames into place.
    /// - Inserts the row with status `pending` and returns it.
    pub async fn submit<S>(
        &self,
        stream: S,
        content_type: Option<&str>,
        original_filename: &str,
        metadata: UploadMetadata,
        ctx: RequestContext,
    ) -> ServiceResult<UploadRecord>
    where
        S: Stream<Item = io::Result<Bytes>> + Send,
    {
        let declared = content_type.unwrap_or("");
        if !ACCEPTED_AUDIO_TYPES
            .iter()
            .any(|accepted| accepted.eq_ignore_ascii_case(declared))
        {
            return Err(ServiceError::Validation(format!(
                "media type `{}` is not an accepted audio type",
                declared
            )));
        }

        let id = Uuid::new_v4();
        let original = Self::sanitize_filename(original_filename);
        let saved_filename = format!("{}-{}", id, original);
        let final_path = self.upload_dir.join(&saved_filename);

        fs::create_dir_all(&self.upload_dir).await?;
        let tmp_path = self.upload_dir.join(format!(".tmp-{}", id));
        let mut file = File::create(&tmp_path).await?;

        let mut size_bytes: i64 = 0;
        let mut digest = Context::new();
        pin_mut!(stream);
        while let Some(chunk_res) = stream.next().await {
            let chunk = match chunk_res {
                Ok(chunk) => chunk,
                Err(err) => {
                    let _ = fs::remove_file(&tmp_path).await;
                    return Err(ServiceError::Storage(err));
                }
            };
            size_bytes += chunk.len() as i64;
            digest.consume(&chunk);
            if let Err(err) = file.write_all(&chunk).await {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(ServiceError::Storage(err));
            }
        }
        if let Err(err) = file.flush().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(ServiceError::Storage(err));
        }
        if let Err(err) = file.sync_all().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(ServiceError::Storage(err));
        }
        if let Err(err) = fs::rename(&tmp_path, &final_path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(ServiceError::Storage(err));
        }

        let etag = format!("{:x}", digest.compute());
        let default_title = original
            .rsplit_once('.')
            .map(|(stem, _)| stem.to_string())
            .unwrap_or_else(|| original.clone());

        let record = UploadRecord {
            id,
            owner_id: ctx.owner_id,
            original_filename: original,
            saved_filename,
            storage_path: final_path.display().to_string(),
            size_bytes,
            etag: Some(etag),
            artist: metadata.artist.unwrap_or_else(|| "Unknown".into()),
            title: metadata.title.unwrap_or(default_title),
            status: ProcessingStatus::Pending,
            result_path: None,
            created_at: Utc::now(),
        };

        let insert = sqlx::query(
            "INSERT INTO uploads (id, owner_id, original_filename, saved_filename, storage_path, \
             size_bytes, etag, artist, title, status, result_path, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(record.id)
        .bind(record.owner_id)
        .bind(&record.original_filename)
        .bind(&record.saved_filename)
        .bind(&record.storage_path)
        .bind(record.size_bytes)
        .bind(&record.etag)
        .bind(&record.artist)
        .bind(&record.title)
        .bind(record.status)
        .bind(&record.result_path)
        .bind(record.created_at)
        .execute(&*self.db)
        .await;

        if let Err(err) = insert {
            let _ = fs::remove_file(&final_path).await;
            return Err(ServiceError::Sqlx(err));
        }

        info!(
            "stored upload {} ({} bytes) for owner {}",
            record.id, record.size_bytes, record.owner_id
        );
        Ok(record)
    }

    /// Fetch one record.
    pub async fn fetch(&self, upload_id: Uuid) -> ServiceResult<UploadRecord> {
        sqlx::query_as::<_, UploadRecord>(&format!(
            "SELECT {UPLOAD_COLUMNS} FROM uploads WHERE id = ?"
        ))
        .bind(upload_id)
        .fetch_one(&*self.db)
        .await
        .map_err(|err| match err {
            sqlx::Error::RowNotFound => ServiceError::NotFound(upload_id),
            other => ServiceError::Sqlx(other),
        })
    }

    /// List uploads visible to the caller, newest first. Administrators
    /// see every record, owners see their own.
    pub async fn list_for(&self, ctx: RequestContext) -> ServiceResult<Vec<UploadRecord>> {
        let rows = if ctx.is_admin {
            sqlx::query_as::<_, UploadRecord>(&format!(
                "SELECT {UPLOAD_COLUMNS} FROM uploads ORDER BY created_at DESC"
            ))
            .fetch_all(&*self.db)
            .await?
        } else {
            sqlx::query_as::<_, UploadRecord>(&format!(
                "SELECT {UPLOAD_COLUMNS} FROM uploads WHERE owner_id = ? ORDER BY created_at DESC"
            ))
            .bind(ctx.owner_id)
            .fetch_all(&*self.db)
            .await?
        };
        Ok(rows)
    }

    /// Transition `pending -> processing` and kick off the separation
    /// tool on a detached task.
    ///
    /// Idempotent when the upload is already `processing` (a second call
    /// does not spawn a second tool run). A terminal upload rejects with
    /// `InvalidState`. The caller is never blocked on the tool; the final
    /// status lands via [`on_tool_completed`](Self::on_tool_completed).
    pub async fn begin_processing(&self, upload_id: Uuid) -> ServiceResult<()> {
        let claimed = sqlx::query(
            "UPDATE uploads SET status = 'processing' WHERE id = ? AND status = 'pending'",
        )
        .bind(upload_id)
        .execute(&*self.db)
        .await?;

        if claimed.rows_affected() == 0 {
            let record = self.fetch(upload_id).await?;
            return match record.status {
                ProcessingStatus::Processing => {
                    debug!("upload {} already processing, no-op", upload_id);
                    Ok(())
                }
                actual => Err(ServiceError::InvalidState {
                    id: upload_id,
                    actual,
                    required: ProcessingStatus::Pending,
                }),
            };
        }

        let record = self.fetch(upload_id).await?;
        let service = self.clone();
        tokio::spawn(async move {
            service.run_separation(record).await;
        });
        Ok(())
    }

    /// The detached processing pipeline: run the tool, then record the
    /// terminal status. There is no live caller to report failures to, so
    /// they are logged and folded into the upload's status.
    async fn run_separation(&self, record: UploadRecord) {
        let out_dir = self.processed_path_for(record.id);
        if let Err(err) = fs::create_dir_all(&out_dir).await {
            error!("creating {} failed: {}", out_dir.display(), err);
            let _ = self.on_tool_completed(record.id, false, None).await;
            return;
        }

        let input = Path::new(&record.storage_path);
        let result = self.analyzer.separate(input, &out_dir, record.id).await;
        let outcome = match result {
            Ok(()) => {
                self.on_tool_completed(record.id, true, Some(out_dir.display().to_string()))
                    .await
            }
            Err(err) => {
                warn!("separation of upload {} failed: {}", record.id, err);
                self.on_tool_completed(record.id, false, None).await
            }
        };
        if let Err(err) = outcome {
            error!("recording terminal status for {} failed: {}", record.id, err);
        }
    }

    /// Record the tool's terminal signal: `processing -> completed` with
    /// the result path, or `processing -> error`.
    ///
    /// Uploads not currently `processing` are left untouched, which
    /// defends against duplicate completion signals. An `error`
    /// transition leaves the raw file in place for diagnosis. Returns
    /// whether a transition was applied.
    pub async fn on_tool_completed(
        &self,
        upload_id: Uuid,
        success: bool,
        result_path: Option<String>,
    ) -> ServiceResult<bool> {
        let updated = if success {
            sqlx::query(
                "UPDATE uploads SET status = 'completed', result_path = ? \
                 WHERE id = ? AND status = 'processing'",
            )
            .bind(&result_path)
            .bind(upload_id)
            .execute(&*self.db)
            .await?
        } else {
            sqlx::query("UPDATE uploads SET status = 'error' WHERE id = ? AND status = 'processing'")
                .bind(upload_id)
                .execute(&*self.db)
                .await?
        };

        let applied = updated.rows_affected() > 0;
        if applied {
            info!(
                "upload {} -> {}",
                upload_id,
                if success { "completed" } else { "error" }
            );
        } else {
            debug!(
                "ignoring completion signal for upload {} (not processing)",
                upload_id
            );
        }
        Ok(applied)
    }

    /// Update display metadata. Owner or administrator only.
    pub async fn update_metadata(
        &self,
        upload_id: Uuid,
        artist: Option<String>,
        title: Option<String>,
        ctx: RequestContext,
    ) -> ServiceResult<UploadRecord> {
        let record = self.fetch(upload_id).await?;
        if !ctx.can_modify(record.owner_id) {
            return Err(ServiceError::Permission(format!(
                "upload `{}` belongs to another user",
                upload_id
            )));
        }

        sqlx::query("UPDATE uploads SET artist = ?, title = ? WHERE id = ?")
            .bind(artist.as_deref().unwrap_or(&record.artist))
            .bind(title.as_deref().unwrap_or(&record.title))
            .bind(upload_id)
            .execute(&*self.db)
            .await?;

        self.fetch(upload_id).await
    }

    /// Delete a record together with its raw file and processed
    /// directory. Owner or administrator only. File removal is
    /// best-effort; a missing file is not an error.
    pub async fn delete(&self, upload_id: Uuid, ctx: RequestContext) -> ServiceResult<()> {
        let record = self.fetch(upload_id).await?;
        if !ctx.can_modify(record.owner_id) {
            return Err(ServiceError::Permission(format!(
                "upload `{}` belongs to another user",
                upload_id
            )));
        }

        sqlx::query("DELETE FROM uploads WHERE id = ?")
            .bind(upload_id)
            .execute(&*self.db)
            .await?;

        self.remove_backing_files(&record).await;
        info!("deleted upload {}", upload_id);
        Ok(())
    }

    /// Cascade used when an owner account is removed: delete every owned
    /// record and its backing files. The `users` foreign key already
    /// cascades the rows; this also clears the disk.
    pub async fn delete_owned_by(&self, owner_id: Uuid) -> ServiceResult<usize> {
        let records = sqlx::query_as::<_, UploadRecord>(&format!(
            "SELECT {UPLOAD_COLUMNS} FROM uploads WHERE owner_id = ?"
        ))
        .bind(owner_id)
        .fetch_all(&*self.db)
        .await?;

        sqlx::query("DELETE FROM uploads WHERE owner_id = ?")
            .bind(owner_id)
            .execute(&*self.db)
            .await?;

        for record in &records {
            self.remove_backing_files(record).await;
        }
        info!("removed {} uploads owned by {}", records.len(), owner_id);
        Ok(records.len())
    }

    async fn remove_backing_files(&self, record: &UploadRecord) {
        match fs::remove_file(&record.storage_path).await {
            Ok(_) => debug!("removed raw file {}", record.storage_path),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("raw file {} already missing", record.storage_path);
            }
            Err(err) => warn!("failed to remove {}: {}", record.storage_path, err),
        }

        if let Some(result_path) = &record.result_path {
            if let Err(err) = fs::remove_dir_all(result_path).await {
                if err.kind() != ErrorKind::NotFound {
                    warn!("failed to remove {}: {}", result_path, err);
                }
            }
        }
    }
}
