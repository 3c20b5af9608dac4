use chrono::Utc;
use uuid::Uuid;

use super::error::PortalError;
use super::types::{
    Client, DownloadLink, EvidenceFile, EvidenceRecord, EvidenceReview, EvidenceStatus,
    EvidenceSubmission, IncomingFile, ReviewRequest,
};
use super::PortalService;
use crate::security::auth::Principal;

/// Reduces an uploaded file name to `[A-Za-z0-9_.-]`, whitespace becoming `_`.
pub fn safe_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .filter_map(|c| {
            if c.is_whitespace() {
                Some('_')
            } else if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
                Some(c)
            } else {
                None
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Random per-submission segment of the storage key.
pub fn upload_batch_id() -> String {
    hex::encode(rand::random::<[u8; 4]>())
}

pub fn storage_key(
    client_id: Uuid,
    control_code: &str,
    unix_millis: i64,
    batch: &str,
    index: usize,
    file_name: &str,
) -> String {
    format!(
        "{}/{}/{}-{}-{}-{}",
        client_id,
        control_code,
        unix_millis,
        batch,
        index,
        safe_file_name(file_name)
    )
}

impl PortalService {
    /// Never fails for a visible control; untouched pairs read as `not-started`.
    pub async fn evidence(
        &self,
        principal: &Principal,
        client: &Client,
        control_code: &str,
    ) -> Result<EvidenceRecord, PortalError> {
        self.visible_control(principal, client, control_code).await?;
        Ok(self
            .store
            .find_evidence(client.id, control_code)
            .await?
            .unwrap_or_else(|| EvidenceRecord::not_started(client.id, control_code)))
    }

    /// Uploads every file, then records the submission in one write. A failed
    /// upload aborts before anything is recorded; objects already written stay
    /// in the bucket.
    pub async fn submit_evidence(
        &self,
        principal: &Principal,
        client: &Client,
        control_code: &str,
        files: Vec<IncomingFile>,
    ) -> Result<EvidenceRecord, PortalError> {
        if files.is_empty() {
            return Err(PortalError::Validation("No files provided".to_string()));
        }
        self.visible_control(principal, client, control_code).await?;

        let submitted_at = Utc::now();
        let batch = upload_batch_id();
        let mut stored: Vec<EvidenceFile> = Vec::with_capacity(files.len());
        for (index, file) in files.into_iter().enumerate() {
            let key = storage_key(
                client.id,
                control_code,
                submitted_at.timestamp_millis(),
                &batch,
                index,
                &file.original_name,
            );
            if let Err(e) = self.objects.put(&key, file.bytes, &file.content_type).await {
                log::error!(
                    "Evidence upload for {}/{} failed at {}: {}",
                    client.slug,
                    control_code,
                    file.original_name,
                    e
                );
                if !stored.is_empty() {
                    let orphaned: Vec<&str> =
                        stored.iter().map(|f| f.storage_path.as_str()).collect();
                    log::warn!("Orphaned evidence objects left in storage: {:?}", orphaned);
                }
                return Err(e);
            }
            stored.push(EvidenceFile {
                storage_path: key,
                display_name: file.original_name,
            });
        }

        let file_count = stored.len();
        let record = self
            .store
            .record_submission(EvidenceSubmission {
                client_id: client.id,
                control_code: control_code.to_string(),
                files: stored,
                mode: self.settings.resubmission,
                submitted_at,
            })
            .await?;
        log::info!(
            "Evidence submitted for {}/{} ({} files)",
            client.slug,
            control_code,
            file_count
        );
        Ok(record)
    }

    pub async fn download_links(
        &self,
        client: &Client,
        control_code: &str,
    ) -> Result<Vec<DownloadLink>, PortalError> {
        self.require_control(control_code).await?;
        let record = self.store.find_evidence(client.id, control_code).await?;
        let files = record.map(|r| r.files).unwrap_or_default();
        if files.is_empty() {
            return Err(PortalError::NotFound("No evidence found".to_string()));
        }

        let mut links = Vec::with_capacity(files.len());
        for file in files {
            let url = self
                .objects
                .signed_url(&file.storage_path, self.settings.download_url_ttl)
                .await?;
            links.push(DownloadLink {
                display_name: file.display_name,
                url,
            });
        }
        Ok(links)
    }

    pub async fn review_evidence(
        &self,
        slug: &str,
        control_code: &str,
        req: ReviewRequest,
    ) -> Result<EvidenceRecord, PortalError> {
        let status: EvidenceStatus = req.status.parse().map_err(PortalError::Validation)?;
        if !status.is_review_outcome() {
            return Err(PortalError::Validation(format!(
                "Review status must be approved or needs-clarification, got {status}"
            )));
        }
        let client = self.get_client(slug).await?;
        self.require_control(control_code).await?;

        let record = self
            .store
            .record_review(EvidenceReview {
                client_id: client.id,
                control_code: control_code.to_string(),
                status,
                reviewer_comment: req.comment.map(|c| c.trim().to_string()).filter(|c| !c.is_empty()),
                reviewed_at: Utc::now(),
            })
            .await?;
        log::info!("Evidence for {}/{} reviewed: {}", client.slug, control_code, status);
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::portal::tests::{acme, in_memory_service, in_memory_service_with, linked, staff};
    use crate::portal::types::{FileListMode, SetScopeRequest};
    use crate::portal::PortalSettings;

    fn upload(name: &str) -> IncomingFile {
        IncomingFile {
            original_name: name.to_string(),
            content_type: "application/pdf".to_string(),
            bytes: b"%PDF-1.7".to_vec(),
        }
    }

    fn review(status: &str) -> ReviewRequest {
        ReviewRequest {
            status: status.to_string(),
            comment: None,
        }
    }

    #[test]
    fn test_safe_file_name() {
        assert_eq!(safe_file_name("Access Review Q1.pdf"), "Access_Review_Q1.pdf");
        assert_eq!(safe_file_name("../../etc/passwd"), "passwd");
        assert_eq!(safe_file_name("résumé (final).docx"), "rsum_final.docx");
        assert_eq!(safe_file_name("???"), "file");
        assert_eq!(safe_file_name(""), "file");
    }

    #[test]
    fn test_storage_key_layout() {
        let id = Uuid::nil();
        assert_eq!(
            storage_key(id, "DCF-4", 1700000000000, "0a1b2c3d", 2, "a b.png"),
            format!("{id}/DCF-4/1700000000000-0a1b2c3d-2-a_b.png")
        );
        let batch = upload_batch_id();
        assert_eq!(batch.len(), 8);
        assert!(batch.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[tokio::test]
    async fn test_same_file_name_twice_keeps_both_objects() {
        let (portal, objects) = in_memory_service_with(PortalSettings {
            resubmission: FileListMode::Append,
            ..PortalSettings::default()
        })
        .await;
        let client = acme(&portal).await;
        for _ in 0..2 {
            portal
                .submit_evidence(&staff(), &client, "DCF-4", vec![upload("policy.pdf")])
                .await
                .unwrap();
        }
        let record = portal.evidence(&staff(), &client, "DCF-4").await.unwrap();
        assert_eq!(record.files.len(), 2);
        assert_ne!(record.files[0].storage_path, record.files[1].storage_path);
        assert_eq!(objects.keys().await.len(), 2);
    }

    #[tokio::test]
    async fn test_missing_evidence_reads_not_started() {
        let (portal, _) = in_memory_service().await;
        let client = acme(&portal).await;
        let record = portal.evidence(&staff(), &client, "DCF-4").await.unwrap();
        assert_eq!(record.status, EvidenceStatus::NotStarted);
        assert!(record.files.is_empty());
    }

    #[tokio::test]
    async fn test_submit_requires_files() {
        let (portal, _) = in_memory_service().await;
        let client = acme(&portal).await;
        let err = portal
            .submit_evidence(&staff(), &client, "DCF-4", vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, PortalError::Validation(_)));
    }

    #[tokio::test]
    async fn test_submit_stores_every_file() {
        let (portal, objects) = in_memory_service().await;
        let client = acme(&portal).await;
        let record = portal
            .submit_evidence(
                &staff(),
                &client,
                "DCF-4",
                vec![upload("policy.pdf"), upload("screenshot one.png")],
            )
            .await
            .unwrap();
        assert_eq!(record.status, EvidenceStatus::Submitted);
        assert_eq!(record.files.len(), 2);
        assert_eq!(record.files[1].display_name, "screenshot one.png");
        assert!(record.files[1].storage_path.ends_with("-1-screenshot_one.png"));
        assert_eq!(objects.keys().await.len(), 2);

        let again = portal.evidence(&staff(), &client, "DCF-4").await.unwrap();
        assert_eq!(again, record);
    }

    #[tokio::test]
    async fn test_failed_upload_records_nothing() {
        let (portal, objects) = in_memory_service().await;
        let client = acme(&portal).await;
        objects.fail_writes_containing("broken").await;

        let err = portal
            .submit_evidence(
                &staff(),
                &client,
                "DCF-4",
                vec![upload("fine.pdf"), upload("broken.pdf")],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PortalError::Upstream(_)));
        assert!(portal.store.find_evidence(client.id, "DCF-4").await.unwrap().is_none());
        assert_eq!(objects.keys().await.len(), 1);
    }

    #[tokio::test]
    async fn test_resubmission_replaces_by_default() {
        let (portal, _) = in_memory_service().await;
        let client = acme(&portal).await;
        portal
            .submit_evidence(&staff(), &client, "DCF-4", vec![upload("v1.pdf")])
            .await
            .unwrap();
        let record = portal
            .submit_evidence(&staff(), &client, "DCF-4", vec![upload("v2.pdf")])
            .await
            .unwrap();
        assert_eq!(record.files.len(), 1);
        assert_eq!(record.files[0].display_name, "v2.pdf");
    }

    #[tokio::test]
    async fn test_resubmission_can_append() {
        let settings = PortalSettings {
            resubmission: FileListMode::Append,
            ..Default::default()
        };
        let (portal, _) = in_memory_service_with(settings).await;
        let client = acme(&portal).await;
        portal
            .submit_evidence(&staff(), &client, "DCF-4", vec![upload("v1.pdf")])
            .await
            .unwrap();
        let record = portal
            .submit_evidence(&staff(), &client, "DCF-4", vec![upload("v2.pdf")])
            .await
            .unwrap();
        assert_eq!(record.files.len(), 2);
    }

    #[tokio::test]
    async fn test_linked_client_submits_only_in_scope() {
        let (portal, _) = in_memory_service().await;
        let client = acme(&portal).await;
        let principal = linked(&client);
        let err = portal
            .submit_evidence(&principal, &client, "DCF-4", vec![upload("a.pdf")])
            .await
            .unwrap_err();
        assert!(matches!(err, PortalError::NotFound(_)));

        portal
            .set_scope(
                "acme",
                "DCF-4",
                SetScopeRequest {
                    scope: "in-scope".to_string(),
                    reason_out_of_scope: None,
                },
            )
            .await
            .unwrap();
        assert!(portal
            .submit_evidence(&principal, &client, "DCF-4", vec![upload("a.pdf")])
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_download_links() {
        let (portal, _) = in_memory_service().await;
        let client = acme(&portal).await;
        assert!(matches!(
            portal.download_links(&client, "DCF-4").await.unwrap_err(),
            PortalError::NotFound(_)
        ));

        portal
            .submit_evidence(&staff(), &client, "DCF-4", vec![upload("policy.pdf")])
            .await
            .unwrap();
        let links = portal.download_links(&client, "DCF-4").await.unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].display_name, "policy.pdf");
        assert!(links[0].url.ends_with("expires_in=60"));
    }

    #[tokio::test]
    async fn test_invalid_review_leaves_record_untouched() {
        let (portal, _) = in_memory_service().await;
        let client = acme(&portal).await;
        let before = portal
            .submit_evidence(&staff(), &client, "DCF-4", vec![upload("a.pdf")])
            .await
            .unwrap();
        for status in ["submitted", "draft", "rejected", ""] {
            let err = portal
                .review_evidence("acme", "DCF-4", review(status))
                .await
                .unwrap_err();
            assert!(matches!(err, PortalError::Validation(_)));
        }
        let after = portal.evidence(&staff(), &client, "DCF-4").await.unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_review_then_resubmit() {
        let (portal, _) = in_memory_service().await;
        let client = acme(&portal).await;
        portal
            .submit_evidence(&staff(), &client, "DCF-4", vec![upload("a.pdf")])
            .await
            .unwrap();
        let reviewed = portal
            .review_evidence(
                "acme",
                "DCF-4",
                ReviewRequest {
                    status: "needs-clarification".to_string(),
                    comment: Some("Screenshot is cropped".to_string()),
                },
            )
            .await
            .unwrap();
        assert_eq!(reviewed.status, EvidenceStatus::NeedsClarification);
        assert_eq!(reviewed.reviewer_comment.as_deref(), Some("Screenshot is cropped"));

        let resubmitted = portal
            .submit_evidence(&staff(), &client, "DCF-4", vec![upload("b.pdf")])
            .await
            .unwrap();
        assert_eq!(resubmitted.status, EvidenceStatus::Submitted);

        let approved = portal
            .review_evidence("acme", "DCF-4", review("approved"))
            .await
            .unwrap();
        assert_eq!(approved.status, EvidenceStatus::Approved);
        assert!(approved.reviewer_comment.is_none());
    }

    #[tokio::test]
    async fn test_unknown_control_is_not_found() {
        let (portal, _) = in_memory_service().await;
        let client = acme(&portal).await;
        assert!(matches!(
            portal.evidence(&staff(), &client, "NOPE-1").await.unwrap_err(),
            PortalError::NotFound(_)
        ));
        assert!(matches!(
            portal
                .review_evidence("acme", "NOPE-1", review("approved"))
                .await
                .unwrap_err(),
            PortalError::NotFound(_)
        ));
    }
}
