//! ChordService — chord timeline artifact access and the regeneration
//! coordinator.
//!
//! The timeline lives as a single JSON artifact (`chords.json`) inside
//! the upload's processed directory. Loading a missing artifact yields an
//! explicit `Unavailable` result rather than an error: uploads processed
//! before chord extraction existed, or whose analysis yielded nothing,
//! are an expected state. Regeneration replaces the artifact wholesale
//! via write-then-rename, so a reader never observes a partial file.

use std::path::PathBuf;
use tokio::fs;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::analyzer::Analyzer;
use super::upload_service::UploadService;
use super::{ServiceError, ServiceResult};
use crate::context::RequestContext;
use crate::models::chords::ChordTimeline;
use crate::models::upload::{ProcessingStatus, Stem, UploadRecord};

/// Name of the timeline artifact inside a processed directory.
pub const CHORDS_ARTIFACT: &str = "chords.json";

/// Result of a timeline load.
#[derive(Debug, Clone, PartialEq)]
pub enum TimelineLoad {
    Ready(ChordTimeline),
    /// Valid upload, no chord data. Expected, not an error.
    Unavailable { reason: String },
}

#[derive(Clone)]
pub struct ChordService {
    uploads: UploadService,
    analyzer: Analyzer,
}

impl ChordService {
    pub fn new(uploads: UploadService, analyzer: Analyzer) -> Self {
        Self { uploads, analyzer }
    }

    fn artifact_path(record: &UploadRecord) -> Option<PathBuf> {
        record
            .result_path
            .as_ref()
            .map(|dir| PathBuf::from(dir).join(CHORDS_ARTIFACT))
    }

    /// Load the persisted timeline for an upload.
    ///
    /// Unknown ids are `NotFound`; a known upload without usable chord
    /// data (not yet completed, artifact missing, artifact unreadable)
    /// resolves to `Unavailable`.
    pub async fn load(&self, upload_id: Uuid) -> ServiceResult<TimelineLoad> {
        let record = self.uploads.fetch(upload_id).await?;
        self.load_record(&record).await
    }

    async fn load_record(&self, record: &UploadRecord) -> ServiceResult<TimelineLoad> {
        if record.status != ProcessingStatus::Completed {
            return Ok(TimelineLoad::Unavailable {
                reason: format!("upload is {}, not completed", record.status),
            });
        }

        let Some(path) = Self::artifact_path(record) else {
            return Ok(TimelineLoad::Unavailable {
                reason: "no processed output recorded".into(),
            });
        };

        let raw = match fs::read(&path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!("no chord artifact at {}", path.display());
                return Ok(TimelineLoad::Unavailable {
                    reason: "no chords detected".into(),
                });
            }
            Err(err) => return Err(ServiceError::Storage(err)),
        };

        match serde_json::from_slice::<ChordTimeline>(&raw) {
            Ok(timeline) => Ok(TimelineLoad::Ready(timeline)),
            Err(err) => {
                warn!("unreadable chord artifact {}: {}", path.display(), err);
                Ok(TimelineLoad::Unavailable {
                    reason: "chord data unreadable".into(),
                })
            }
        }
    }

    /// Re-run chord extraction against a chosen stem and atomically swap
    /// in the new artifact.
    ///
    /// Requires the upload to be `completed` (`InvalidState` otherwise)
    /// and the caller to be owner or administrator. Runs the tool
    /// synchronously, so the HTTP request blocks until it exits. The tool
    /// writes to a temporary path; only a successful run is renamed over
    /// `chords.json`, so failure leaves any previous timeline in place.
    /// The upload's status is never changed here.
    pub async fn regenerate(
        &self,
        upload_id: Uuid,
        stem: Stem,
        ctx: RequestContext,
    ) -> ServiceResult<ChordTimeline> {
        let record = self.uploads.fetch(upload_id).await?;
        if !ctx.can_modify(record.owner_id) {
            return Err(ServiceError::Permission(format!(
                "upload `{}` belongs to another user",
                upload_id
            )));
        }
        if record.status != ProcessingStatus::Completed {
            return Err(ServiceError::InvalidState {
                id: upload_id,
                actual: record.status,
                required: ProcessingStatus::Completed,
            });
        }
        let Some(result_dir) = record.result_path.as_ref().map(PathBuf::from) else {
            // Completed implies a result path; a bare row is a storage-level defect.
            return Err(ServiceError::ToolFailure(
                "completed upload has no processed output".into(),
            ));
        };

        let tmp_path = result_dir.join(format!(".chords-{}.tmp", Uuid::new_v4()));
        let run = self
            .analyzer
            .extract_chords(&result_dir, stem, &tmp_path)
            .await;

        if let Err(err) = run {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(ServiceError::ToolFailure(err.to_string()));
        }

        // The tool signalled success; its output must exist before we
        // replace the previous artifact.
        let raw = match fs::read(&tmp_path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(ServiceError::ToolFailure(
                    "tool exited successfully but produced no artifact".into(),
                ));
            }
            Err(err) => {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(ServiceError::Storage(err));
            }
        };
        let timeline: ChordTimeline = match serde_json::from_slice(&raw) {
            Ok(timeline) => timeline,
            Err(err) => {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(ServiceError::ToolFailure(format!(
                    "tool produced unreadable chord data: {}",
                    err
                )));
            }
        };

        let final_path = result_dir.join(CHORDS_ARTIFACT);
        if let Err(err) = fs::rename(&tmp_path, &final_path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(ServiceError::Storage(err));
        }

        info!(
            "regenerated chords for upload {} from stem {} ({} events)",
            upload_id,
            stem,
            timeline.len()
        );
        Ok(timeline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::upload_service::tests::{Harness, harness, stub_tool};
    use bytes::Bytes;
    use futures::stream;
    use std::io;

    const CHORDS_JSON: &str = concat!(
        r#"{"duration":30.0,"events":["#,
        r#"{"time":0.0,"chord":"C","confidence":0.9},"#,
        r#"{"time":10.0,"chord":"G","confidence":0.8},"#,
        r#"{"time":20.0,"chord":"Am","confidence":0.7}]}"#
    );

    /// A completed upload with an existing processed directory.
    async fn completed_upload(h: &Harness) -> UploadRecord {
        let record = h
            .service
            .submit(
                stream::iter(vec![Ok::<_, io::Error>(Bytes::from_static(b"payload"))]),
                Some("audio/mpeg"),
                "song.mp3",
                Default::default(),
                h.owner,
            )
            .await
            .expect("submit");

        let result_dir = h.service.processed_path_for(record.id);
        std::fs::create_dir_all(&result_dir).expect("processed dir");

        h.service.begin_processing(record.id).await.unwrap();
        h.service
            .on_tool_completed(record.id, true, Some(result_dir.display().to_string()))
            .await
            .unwrap();
        h.service.fetch(record.id).await.unwrap()
    }

    fn chord_service(h: &Harness, chord_tool: &str) -> ChordService {
        ChordService::new(
            h.service.clone(),
            Analyzer::new("/bin/true", chord_tool.to_string()),
        )
    }

    #[tokio::test]
    async fn load_is_unavailable_before_completion() {
        let h = harness().await;
        let record = h
            .service
            .submit(
                stream::iter(vec![Ok::<_, io::Error>(Bytes::from_static(b"payload"))]),
                Some("audio/mpeg"),
                "song.mp3",
                Default::default(),
                h.owner,
            )
            .await
            .unwrap();

        let service = chord_service(&h, "/bin/true");
        let load = service.load(record.id).await.unwrap();
        assert!(matches!(load, TimelineLoad::Unavailable { .. }));
    }

    #[tokio::test]
    async fn load_reports_missing_artifact_as_unavailable() {
        let h = harness().await;
        let record = completed_upload(&h).await;

        let service = chord_service(&h, "/bin/true");
        match service.load(record.id).await.unwrap() {
            TimelineLoad::Unavailable { reason } => assert_eq!(reason, "no chords detected"),
            other => panic!("expected unavailable, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn load_unknown_upload_is_not_found() {
        let h = harness().await;
        let service = chord_service(&h, "/bin/true");
        let err = service.load(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn load_reads_existing_artifact() {
        let h = harness().await;
        let record = completed_upload(&h).await;
        let artifact = PathBuf::from(record.result_path.as_ref().unwrap()).join(CHORDS_ARTIFACT);
        std::fs::write(&artifact, CHORDS_JSON).unwrap();

        let service = chord_service(&h, "/bin/true");
        match service.load(record.id).await.unwrap() {
            TimelineLoad::Ready(timeline) => {
                assert_eq!(timeline.duration, 30.0);
                assert_eq!(timeline.len(), 3);
                assert_eq!(timeline.events[1].chord, "G");
            }
            other => panic!("expected timeline, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn regenerate_requires_completed_status() {
        let h = harness().await;
        let record = h
            .service
            .submit(
                stream::iter(vec![Ok::<_, io::Error>(Bytes::from_static(b"payload"))]),
                Some("audio/mpeg"),
                "song.mp3",
                Default::default(),
                h.owner,
            )
            .await
            .unwrap();

        let service = chord_service(&h, "/bin/true");
        let err = service
            .regenerate(record.id, Stem::Other, h.owner)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::InvalidState {
                actual: ProcessingStatus::Pending,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn regenerate_enforces_ownership() {
        let h = harness().await;
        let record = completed_upload(&h).await;

        let stranger = RequestContext {
            owner_id: Uuid::new_v4(),
            is_admin: false,
        };
        let service = chord_service(&h, "/bin/true");
        let err = service
            .regenerate(record.id, Stem::Other, stranger)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Permission(_)));
    }

    #[tokio::test]
    async fn regenerate_swaps_artifact_and_round_trips() {
        let h = harness().await;
        let record = completed_upload(&h).await;
        let result_dir = PathBuf::from(record.result_path.as_ref().unwrap());
        std::fs::write(result_dir.join(CHORDS_ARTIFACT), r#"{"duration":1.0,"events":[]}"#)
            .unwrap();

        let tool = stub_tool(
            result_dir.as_path(),
            "write_chords",
            &format!("printf '%s' '{}' > \"$3\"", CHORDS_JSON),
        );
        let service = chord_service(&h, &tool);

        let timeline = service
            .regenerate(record.id, Stem::Bass, h.owner)
            .await
            .expect("regenerate");
        assert_eq!(timeline.len(), 3);

        // No stale read: load returns exactly the artifact just written.
        match service.load(record.id).await.unwrap() {
            TimelineLoad::Ready(loaded) => assert_eq!(loaded, timeline),
            other => panic!("expected timeline, got {:?}", other),
        }

        // Upload status untouched by regeneration.
        let after = h.service.fetch(record.id).await.unwrap();
        assert_eq!(after.status, ProcessingStatus::Completed);
    }

    #[tokio::test]
    async fn failed_regeneration_keeps_previous_artifact() {
        let h = harness().await;
        let record = completed_upload(&h).await;
        let result_dir = PathBuf::from(record.result_path.as_ref().unwrap());
        std::fs::write(result_dir.join(CHORDS_ARTIFACT), CHORDS_JSON).unwrap();

        let tool = stub_tool(result_dir.as_path(), "fail_chords", "exit 1");
        let service = chord_service(&h, &tool);

        let err = service
            .regenerate(record.id, Stem::Vocals, h.owner)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::ToolFailure(_)));

        match service.load(record.id).await.unwrap() {
            TimelineLoad::Ready(timeline) => assert_eq!(timeline.len(), 3),
            other => panic!("expected previous timeline, got {:?}", other),
        }

        // No partial output left behind.
        let leftovers: Vec<_> = std::fs::read_dir(&result_dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(".chords-"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn silent_tool_success_without_artifact_is_a_failure() {
        let h = harness().await;
        let record = completed_upload(&h).await;
        let result_dir = PathBuf::from(record.result_path.as_ref().unwrap());

        let tool = stub_tool(result_dir.as_path(), "noop_chords", "exit 0");
        let service = chord_service(&h, &tool);

        let err = service
            .regenerate(record.id, Stem::All, h.owner)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::ToolFailure(_)));
    }
}
