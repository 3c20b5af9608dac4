use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::error::PortalError;
use super::types::{
    AccessLink, Client, ClientControlScope, Comment, Control, ControlChanges, EvidenceRecord,
    EvidenceReview, EvidenceStatus, EvidenceSubmission, FileListMode,
};

/// Relational backing store for the portal.
///
/// Every method is one logical operation: implementations must apply the
/// multi-row writes (client + seeded scopes, control + initial scope,
/// cascading deletes, link rotation) atomically.
#[async_trait]
pub trait PortalStore: Send + Sync {
    /// Inserts framework controls that are not present yet. Returns how many were added.
    async fn seed_framework_controls(&self, controls: Vec<Control>) -> Result<usize, PortalError>;

    async fn list_clients(&self) -> Result<Vec<Client>, PortalError>;
    async fn find_client_by_slug(&self, slug: &str) -> Result<Option<Client>, PortalError>;
    async fn find_client_by_id(&self, client_id: Uuid) -> Result<Option<Client>, PortalError>;
    async fn create_client(
        &self,
        client: Client,
        seeded_scopes: Vec<ClientControlScope>,
    ) -> Result<Client, PortalError>;
    async fn delete_client(&self, client_id: Uuid) -> Result<(), PortalError>;

    async fn list_controls(&self) -> Result<Vec<Control>, PortalError>;
    async fn find_control(&self, control_code: &str) -> Result<Option<Control>, PortalError>;
    async fn create_custom_control(
        &self,
        control: Control,
        initial_scope: ClientControlScope,
    ) -> Result<Control, PortalError>;
    async fn update_control(
        &self,
        control_code: &str,
        changes: ControlChanges,
    ) -> Result<Control, PortalError>;
    /// Removes the control together with every client's scope, evidence and comment rows for it.
    async fn delete_control(&self, control_code: &str) -> Result<(), PortalError>;

    async fn list_scopes(&self, client_id: Uuid) -> Result<Vec<ClientControlScope>, PortalError>;
    async fn find_scope(
        &self,
        client_id: Uuid,
        control_code: &str,
    ) -> Result<Option<ClientControlScope>, PortalError>;
    async fn upsert_scope(&self, scope: ClientControlScope)
        -> Result<ClientControlScope, PortalError>;

    async fn list_evidence(&self, client_id: Uuid) -> Result<Vec<EvidenceRecord>, PortalError>;
    async fn find_evidence(
        &self,
        client_id: Uuid,
        control_code: &str,
    ) -> Result<Option<EvidenceRecord>, PortalError>;
    async fn record_submission(
        &self,
        submission: EvidenceSubmission,
    ) -> Result<EvidenceRecord, PortalError>;
    async fn record_review(&self, review: EvidenceReview) -> Result<EvidenceRecord, PortalError>;

    async fn insert_comment(&self, comment: Comment) -> Result<Comment, PortalError>;
    /// Oldest first.
    async fn list_comments(
        &self,
        client_id: Uuid,
        control_code: &str,
    ) -> Result<Vec<Comment>, PortalError>;

    /// Deactivates every existing link of the client and stores the new one.
    async fn replace_access_link(&self, link: AccessLink) -> Result<AccessLink, PortalError>;
    async fn find_access_link(&self, token: &str) -> Result<Option<AccessLink>, PortalError>;
    async fn find_access_link_by_id(&self, link_id: Uuid)
        -> Result<Option<AccessLink>, PortalError>;
    async fn revoke_access_links(&self, client_id: Uuid) -> Result<usize, PortalError>;
}

pub(crate) fn merge_submission(
    existing: Option<EvidenceRecord>,
    submission: EvidenceSubmission,
) -> EvidenceRecord {
    let mut record = existing.unwrap_or_else(|| {
        EvidenceRecord::not_started(submission.client_id, &submission.control_code)
    });
    match submission.mode {
        FileListMode::Replace => record.files = submission.files,
        FileListMode::Append => record.files.extend(submission.files),
    }
    record.status = EvidenceStatus::Submitted;
    record.submitted_at = Some(submission.submitted_at);
    record.updated_at = Some(submission.submitted_at);
    record
}

pub(crate) fn merge_review(existing: Option<EvidenceRecord>, review: EvidenceReview) -> EvidenceRecord {
    let mut record = existing
        .unwrap_or_else(|| EvidenceRecord::not_started(review.client_id, &review.control_code));
    record.status = review.status;
    record.reviewer_comment = review.reviewer_comment;
    record.updated_at = Some(review.reviewed_at);
    record
}

fn control_order(a: &Control, b: &Control) -> std::cmp::Ordering {
    (a.is_custom, a.sort_index, a.created_at, &a.control_code).cmp(&(
        b.is_custom,
        b.sort_index,
        b.created_at,
        &b.control_code,
    ))
}

type RowKey = (Uuid, String);

#[derive(Debug, Default)]
struct MemoryState {
    clients: Vec<Client>,
    controls: Vec<Control>,
    scopes: HashMap<RowKey, ClientControlScope>,
    evidence: HashMap<RowKey, EvidenceRecord>,
    comments: Vec<Comment>,
    links: Vec<AccessLink>,
}

/// Process-local store. Each operation runs under one write lock, which gives
/// it the same all-or-nothing behaviour as a database transaction.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPortalStore {
    state: Arc<RwLock<MemoryState>>,
}

impl InMemoryPortalStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PortalStore for InMemoryPortalStore {
    async fn seed_framework_controls(&self, controls: Vec<Control>) -> Result<usize, PortalError> {
        let mut state = self.state.write().await;
        let mut added = 0;
        for control in controls {
            if state
                .controls
                .iter()
                .all(|c| c.control_code != control.control_code)
            {
                state.controls.push(control);
                added += 1;
            }
        }
        state.controls.sort_by(control_order);
        Ok(added)
    }

    async fn list_clients(&self) -> Result<Vec<Client>, PortalError> {
        let state = self.state.read().await;
        let mut clients = state.clients.clone();
        clients.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(clients)
    }

    async fn find_client_by_slug(&self, slug: &str) -> Result<Option<Client>, PortalError> {
        let state = self.state.read().await;
        Ok(state.clients.iter().find(|c| c.slug == slug).cloned())
    }

    async fn find_client_by_id(&self, client_id: Uuid) -> Result<Option<Client>, PortalError> {
        let state = self.state.read().await;
        Ok(state.clients.iter().find(|c| c.id == client_id).cloned())
    }

    async fn create_client(
        &self,
        client: Client,
        seeded_scopes: Vec<ClientControlScope>,
    ) -> Result<Client, PortalError> {
        let mut state = self.state.write().await;
        if state.clients.iter().any(|c| c.slug == client.slug) {
            return Err(PortalError::Conflict(format!(
                "Client slug '{}' already exists",
                client.slug
            )));
        }
        for scope in seeded_scopes {
            state
                .scopes
                .insert((scope.client_id, scope.control_code.clone()), scope);
        }
        state.clients.push(client.clone());
        Ok(client)
    }

    async fn delete_client(&self, client_id: Uuid) -> Result<(), PortalError> {
        let mut state = self.state.write().await;
        state.scopes.retain(|(id, _), _| *id != client_id);
        state.evidence.retain(|(id, _), _| *id != client_id);
        state.comments.retain(|c| c.client_id != client_id);
        state.links.retain(|l| l.client_id != client_id);
        state.clients.retain(|c| c.id != client_id);
        Ok(())
    }

    async fn list_controls(&self) -> Result<Vec<Control>, PortalError> {
        let state = self.state.read().await;
        Ok(state.controls.clone())
    }

    async fn find_control(&self, control_code: &str) -> Result<Option<Control>, PortalError> {
        let state = self.state.read().await;
        Ok(state
            .controls
            .iter()
            .find(|c| c.control_code == control_code)
            .cloned())
    }

    async fn create_custom_control(
        &self,
        control: Control,
        initial_scope: ClientControlScope,
    ) -> Result<Control, PortalError> {
        let mut state = self.state.write().await;
        if state
            .controls
            .iter()
            .any(|c| c.control_code == control.control_code)
        {
            return Err(PortalError::Conflict(format!(
                "Control code '{}' already exists",
                control.control_code
            )));
        }
        state.controls.push(control.clone());
        state.controls.sort_by(control_order);
        state.scopes.insert(
            (initial_scope.client_id, initial_scope.control_code.clone()),
            initial_scope,
        );
        Ok(control)
    }

    async fn update_control(
        &self,
        control_code: &str,
        changes: ControlChanges,
    ) -> Result<Control, PortalError> {
        let mut state = self.state.write().await;
        let control = state
            .controls
            .iter_mut()
            .find(|c| c.control_code == control_code)
            .ok_or_else(|| PortalError::NotFound("Control not found".to_string()))?;
        if let Some(name) = changes.name {
            control.name = name;
        }
        if let Some(description) = changes.description {
            control.description = description;
        }
        Ok(control.clone())
    }

    async fn delete_control(&self, control_code: &str) -> Result<(), PortalError> {
        let mut state = self.state.write().await;
        state.scopes.retain(|(_, code), _| code != control_code);
        state.evidence.retain(|(_, code), _| code != control_code);
        state.comments.retain(|c| c.control_code != control_code);
        state.controls.retain(|c| c.control_code != control_code);
        Ok(())
    }

    async fn list_scopes(&self, client_id: Uuid) -> Result<Vec<ClientControlScope>, PortalError> {
        let state = self.state.read().await;
        Ok(state
            .scopes
            .values()
            .filter(|s| s.client_id == client_id)
            .cloned()
            .collect())
    }

    async fn find_scope(
        &self,
        client_id: Uuid,
        control_code: &str,
    ) -> Result<Option<ClientControlScope>, PortalError> {
        let state = self.state.read().await;
        Ok(state
            .scopes
            .get(&(client_id, control_code.to_string()))
            .cloned())
    }

    async fn upsert_scope(
        &self,
        scope: ClientControlScope,
    ) -> Result<ClientControlScope, PortalError> {
        let mut state = self.state.write().await;
        state
            .scopes
            .insert((scope.client_id, scope.control_code.clone()), scope.clone());
        Ok(scope)
    }

    async fn list_evidence(&self, client_id: Uuid) -> Result<Vec<EvidenceRecord>, PortalError> {
        let state = self.state.read().await;
        Ok(state
            .evidence
            .values()
            .filter(|e| e.client_id == client_id)
            .cloned()
            .collect())
    }

    async fn find_evidence(
        &self,
        client_id: Uuid,
        control_code: &str,
    ) -> Result<Option<EvidenceRecord>, PortalError> {
        let state = self.state.read().await;
        Ok(state
            .evidence
            .get(&(client_id, control_code.to_string()))
            .cloned())
    }

    async fn record_submission(
        &self,
        submission: EvidenceSubmission,
    ) -> Result<EvidenceRecord, PortalError> {
        let mut state = self.state.write().await;
        let key = (submission.client_id, submission.control_code.clone());
        let record = merge_submission(state.evidence.remove(&key), submission);
        state.evidence.insert(key, record.clone());
        Ok(record)
    }

    async fn record_review(&self, review: EvidenceReview) -> Result<EvidenceRecord, PortalError> {
        let mut state = self.state.write().await;
        let key = (review.client_id, review.control_code.clone());
        let record = merge_review(state.evidence.remove(&key), review);
        state.evidence.insert(key, record.clone());
        Ok(record)
    }

    async fn insert_comment(&self, comment: Comment) -> Result<Comment, PortalError> {
        let mut state = self.state.write().await;
        state.comments.push(comment.clone());
        Ok(comment)
    }

    async fn list_comments(
        &self,
        client_id: Uuid,
        control_code: &str,
    ) -> Result<Vec<Comment>, PortalError> {
        let state = self.state.read().await;
        let mut comments: Vec<Comment> = state
            .comments
            .iter()
            .filter(|c| c.client_id == client_id && c.control_code == control_code)
            .cloned()
            .collect();
        comments.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(comments)
    }

    async fn replace_access_link(&self, link: AccessLink) -> Result<AccessLink, PortalError> {
        let mut state = self.state.write().await;
        for existing in state
            .links
            .iter_mut()
            .filter(|l| l.client_id == link.client_id)
        {
            existing.is_active = false;
        }
        state.links.push(link.clone());
        Ok(link)
    }

    async fn find_access_link(&self, token: &str) -> Result<Option<AccessLink>, PortalError> {
        let state = self.state.read().await;
        Ok(state.links.iter().find(|l| l.token == token).cloned())
    }

    async fn find_access_link_by_id(
        &self,
        link_id: Uuid,
    ) -> Result<Option<AccessLink>, PortalError> {
        let state = self.state.read().await;
        Ok(state.links.iter().find(|l| l.id == link_id).cloned())
    }

    async fn revoke_access_links(&self, client_id: Uuid) -> Result<usize, PortalError> {
        let mut state = self.state.write().await;
        let mut revoked = 0;
        for link in state
            .links
            .iter_mut()
            .filter(|l| l.client_id == client_id && l.is_active)
        {
            link.is_active = false;
            revoked += 1;
        }
        Ok(revoked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::portal::types::{EvidenceFile, ScopeValue};
    use chrono::{Duration, Utc};

    fn client(slug: &str) -> Client {
        Client {
            id: Uuid::new_v4(),
            name: slug.to_uppercase(),
            slug: slug.to_string(),
            created_at: Utc::now(),
        }
    }

    fn file(name: &str) -> EvidenceFile {
        EvidenceFile {
            storage_path: format!("x/{name}"),
            display_name: name.to_string(),
        }
    }

    #[tokio::test]
    async fn test_duplicate_slug_conflicts() {
        let store = InMemoryPortalStore::new();
        store.create_client(client("acme"), vec![]).await.unwrap();
        let err = store.create_client(client("acme"), vec![]).await.unwrap_err();
        assert!(matches!(err, PortalError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_upsert_scope_keeps_one_row() {
        let store = InMemoryPortalStore::new();
        let acme = store.create_client(client("acme"), vec![]).await.unwrap();
        for _ in 0..2 {
            store
                .upsert_scope(ClientControlScope {
                    client_id: acme.id,
                    control_code: "DCF-4".to_string(),
                    scope: ScopeValue::InScope,
                    reason_out_of_scope: None,
                    updated_at: Utc::now(),
                })
                .await
                .unwrap();
        }
        assert_eq!(store.list_scopes(acme.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_submission_modes() {
        let store = InMemoryPortalStore::new();
        let client_id = Uuid::new_v4();
        let submit = |files, mode| EvidenceSubmission {
            client_id,
            control_code: "DCF-4".to_string(),
            files,
            mode,
            submitted_at: Utc::now(),
        };

        store
            .record_submission(submit(vec![file("a.pdf")], FileListMode::Replace))
            .await
            .unwrap();
        let appended = store
            .record_submission(submit(vec![file("b.pdf")], FileListMode::Append))
            .await
            .unwrap();
        assert_eq!(appended.files.len(), 2);

        let replaced = store
            .record_submission(submit(vec![file("c.pdf")], FileListMode::Replace))
            .await
            .unwrap();
        assert_eq!(replaced.files, vec![file("c.pdf")]);
        assert_eq!(replaced.status, EvidenceStatus::Submitted);
    }

    #[tokio::test]
    async fn test_review_keeps_files() {
        let store = InMemoryPortalStore::new();
        let client_id = Uuid::new_v4();
        store
            .record_submission(EvidenceSubmission {
                client_id,
                control_code: "DCF-4".to_string(),
                files: vec![file("a.pdf")],
                mode: FileListMode::Replace,
                submitted_at: Utc::now(),
            })
            .await
            .unwrap();
        let reviewed = store
            .record_review(EvidenceReview {
                client_id,
                control_code: "DCF-4".to_string(),
                status: EvidenceStatus::NeedsClarification,
                reviewer_comment: Some("Blurry screenshot".to_string()),
                reviewed_at: Utc::now(),
            })
            .await
            .unwrap();
        assert_eq!(reviewed.files.len(), 1);
        assert_eq!(reviewed.reviewer_comment.as_deref(), Some("Blurry screenshot"));
    }

    #[tokio::test]
    async fn test_replace_access_link_deactivates_previous() {
        let store = InMemoryPortalStore::new();
        let client_id = Uuid::new_v4();
        let link = |token: &str| AccessLink {
            id: Uuid::new_v4(),
            token: token.to_string(),
            client_id,
            is_active: true,
            expires_at: None,
            created_at: Utc::now(),
        };
        store.replace_access_link(link("first")).await.unwrap();
        store.replace_access_link(link("second")).await.unwrap();

        let first = store.find_access_link("first").await.unwrap().unwrap();
        let second = store.find_access_link("second").await.unwrap().unwrap();
        assert!(!first.is_active);
        assert!(second.is_active);
        assert_eq!(store.revoke_access_links(client_id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_comments_are_oldest_first() {
        let store = InMemoryPortalStore::new();
        let client_id = Uuid::new_v4();
        let now = Utc::now();
        for (offset, message) in [(5, "later"), (0, "earlier")] {
            store
                .insert_comment(Comment {
                    id: Uuid::new_v4(),
                    client_id,
                    control_code: "DCF-4".to_string(),
                    author_role: crate::portal::types::AuthorRole::Admin,
                    author_email: None,
                    message: message.to_string(),
                    created_at: now + Duration::seconds(offset),
                    read_by_admin: true,
                    read_by_client: false,
                })
                .await
                .unwrap();
        }
        let thread = store.list_comments(client_id, "DCF-4").await.unwrap();
        assert_eq!(thread[0].message, "earlier");
        assert_eq!(thread[1].message, "later");
    }
}
