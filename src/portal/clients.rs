use chrono::Utc;
use uuid::Uuid;

use super::error::PortalError;
use super::types::{
    Client, ClientControlScope, ClientStats, CreateClientRequest, EvidenceStatus, ScopeValue,
};
use super::PortalService;
use crate::security::auth::Principal;

pub fn is_url_safe_slug(slug: &str) -> bool {
    !slug.is_empty()
        && slug
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

impl PortalService {
    pub async fn list_clients(&self) -> Result<Vec<Client>, PortalError> {
        self.store.list_clients().await
    }

    pub async fn create_client(&self, req: CreateClientRequest) -> Result<Client, PortalError> {
        let name = req.name.trim();
        let slug = req.slug.trim();
        if name.is_empty() {
            return Err(PortalError::Validation("Client name is required".to_string()));
        }
        if !is_url_safe_slug(slug) {
            return Err(PortalError::Validation(
                "Slug may only contain lowercase letters, digits and hyphens".to_string(),
            ));
        }

        let now = Utc::now();
        let client = Client {
            id: Uuid::new_v4(),
            name: name.to_string(),
            slug: slug.to_string(),
            created_at: now,
        };
        let seeded: Vec<ClientControlScope> = self
            .store
            .list_controls()
            .await?
            .into_iter()
            .filter(|c| !c.is_custom)
            .map(|c| ClientControlScope {
                client_id: client.id,
                control_code: c.control_code,
                scope: self.settings.default_scope,
                reason_out_of_scope: None,
                updated_at: now,
            })
            .collect();

        let seeded_count = seeded.len();
        let client = self.store.create_client(client, seeded).await?;
        log::info!(
            "Created client {} ({}) with {} scoped controls",
            client.slug,
            client.id,
            seeded_count
        );
        Ok(client)
    }

    pub async fn get_client(&self, slug: &str) -> Result<Client, PortalError> {
        self.store
            .find_client_by_slug(slug)
            .await?
            .ok_or_else(|| PortalError::NotFound("Client not found".to_string()))
    }

    pub async fn delete_client(&self, slug: &str) -> Result<(), PortalError> {
        let client = self.get_client(slug).await?;
        self.store.delete_client(client.id).await?;
        log::info!("Deleted client {} ({})", client.slug, client.id);
        Ok(())
    }

    /// Resolves `slug` for a client-facing request. Linked clients only ever
    /// see their own engagement.
    pub async fn client_for(&self, principal: &Principal, slug: &str) -> Result<Client, PortalError> {
        let client = self.get_client(slug).await?;
        match principal {
            Principal::Staff(_) => Ok(client),
            Principal::LinkedClient(linked) if linked.client_id == client.id => Ok(client),
            Principal::LinkedClient(_) => Err(PortalError::Forbidden(
                "Access link does not grant access to this client".to_string(),
            )),
        }
    }

    pub async fn client_stats(&self, slug: &str) -> Result<ClientStats, PortalError> {
        let client = self.get_client(slug).await?;
        let controls = self.store.list_controls().await?;
        let scopes = self.resolved_scopes(client.id, &controls).await?;
        let evidence = self.store.list_evidence(client.id).await?;

        let mut stats = ClientStats {
            total_controls: controls.len(),
            ..Default::default()
        };
        for scope in scopes.values() {
            match scope {
                ScopeValue::InScope => stats.in_scope += 1,
                ScopeValue::OutOfScope => stats.out_of_scope += 1,
                ScopeValue::Default => {}
            }
        }
        for record in &evidence {
            match record.status {
                EvidenceStatus::Submitted => stats.submitted += 1,
                EvidenceStatus::NeedsClarification => stats.pending_review += 1,
                _ => {}
            }
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::portal::tests::{in_memory_service, staff};
    use crate::portal::types::{IncomingFile, PostCommentRequest, SetScopeRequest};
    use crate::security::auth::LinkedClient;

    fn request(name: &str, slug: &str) -> CreateClientRequest {
        CreateClientRequest {
            name: name.to_string(),
            slug: slug.to_string(),
        }
    }

    #[test]
    fn test_slug_rules() {
        assert!(is_url_safe_slug("acme-2024"));
        assert!(!is_url_safe_slug(""));
        assert!(!is_url_safe_slug("Acme"));
        assert!(!is_url_safe_slug("acme corp"));
        assert!(!is_url_safe_slug("acme/../x"));
    }

    #[tokio::test]
    async fn test_create_client_seeds_default_scopes() {
        let (portal, _) = in_memory_service().await;
        let client = portal.create_client(request("Acme", "acme")).await.unwrap();
        let scopes = portal.store.list_scopes(client.id).await.unwrap();
        assert_eq!(scopes.len(), 106);
        assert!(scopes.iter().all(|s| s.scope == ScopeValue::Default));
    }

    #[tokio::test]
    async fn test_create_client_rejects_bad_input() {
        let (portal, _) = in_memory_service().await;
        let err = portal.create_client(request("", "acme")).await.unwrap_err();
        assert!(matches!(err, PortalError::Validation(_)));
        let err = portal.create_client(request("Acme", "ACME!")).await.unwrap_err();
        assert!(matches!(err, PortalError::Validation(_)));

        portal.create_client(request("Acme", "acme")).await.unwrap();
        let err = portal.create_client(request("Other", "acme")).await.unwrap_err();
        assert!(matches!(err, PortalError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_delete_client_removes_its_rows() {
        let (portal, _) = in_memory_service().await;
        let client = portal.create_client(request("Acme", "acme")).await.unwrap();
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
        portal
            .submit_evidence(
                &staff(),
                &client,
                "DCF-4",
                vec![IncomingFile {
                    original_name: "policy.pdf".to_string(),
                    content_type: "application/pdf".to_string(),
                    bytes: b"%PDF-1.7".to_vec(),
                }],
            )
            .await
            .unwrap();
        portal
            .post_comment(
                &staff(),
                &client,
                "DCF-4",
                PostCommentRequest {
                    message: "Thanks, reviewing now".to_string(),
                },
            )
            .await
            .unwrap();
        let issued = portal.issue_access_link("acme").await.unwrap();
        let token = issued.link.rsplit('/').next().unwrap().to_string();

        portal.delete_client("acme").await.unwrap();

        assert!(matches!(
            portal.get_client("acme").await.unwrap_err(),
            PortalError::NotFound(_)
        ));
        assert!(portal.store.list_scopes(client.id).await.unwrap().is_empty());
        assert!(portal.store.list_evidence(client.id).await.unwrap().is_empty());
        assert!(portal
            .store
            .list_comments(client.id, "DCF-4")
            .await
            .unwrap()
            .is_empty());
        assert!(matches!(
            portal.exchange_access_link(&token).await.unwrap_err(),
            PortalError::LinkInvalid
        ));
        assert!(matches!(
            portal.delete_client("acme").await.unwrap_err(),
            PortalError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_linked_client_is_confined_to_its_client() {
        let (portal, _) = in_memory_service().await;
        let acme = portal.create_client(request("Acme", "acme")).await.unwrap();
        portal.create_client(request("Globex", "globex")).await.unwrap();

        let linked = Principal::LinkedClient(LinkedClient {
            client_id: acme.id,
            link_id: Uuid::new_v4(),
        });
        assert_eq!(portal.client_for(&linked, "acme").await.unwrap().id, acme.id);
        assert!(matches!(
            portal.client_for(&linked, "globex").await.unwrap_err(),
            PortalError::Forbidden(_)
        ));
        assert!(portal.client_for(&staff(), "globex").await.is_ok());
    }

    #[tokio::test]
    async fn test_stats_for_fresh_client() {
        let (portal, _) = in_memory_service().await;
        portal.create_client(request("Acme", "acme")).await.unwrap();
        let stats = portal.client_stats("acme").await.unwrap();
        assert_eq!(stats.total_controls, 106);
        assert_eq!(stats.in_scope, 0);
        assert_eq!(stats.out_of_scope, 0);
        assert_eq!(stats.submitted, 0);
    }
}
