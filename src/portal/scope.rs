use chrono::Utc;
use std::collections::HashMap;
use uuid::Uuid;

use super::error::PortalError;
use super::types::{
    AdminControlView, Client, ClientControlScope, ClientControlView, Control, ControlDetail,
    EvidenceRecord, EvidenceStatus, ScopeValue, SetScopeRequest,
};
use super::PortalService;
use crate::security::auth::Principal;

impl PortalService {
    /// Effective scope of every control in `controls` for one client. Missing
    /// override rows resolve to the configured default.
    pub(crate) async fn resolved_scopes(
        &self,
        client_id: Uuid,
        controls: &[Control],
    ) -> Result<HashMap<String, ScopeValue>, PortalError> {
        let rows = self.scope_rows(client_id).await?;
        Ok(controls
            .iter()
            .map(|c| {
                let scope = rows
                    .get(&c.control_code)
                    .map(|row| row.scope)
                    .unwrap_or(self.settings.default_scope);
                (c.control_code.clone(), scope)
            })
            .collect())
    }

    async fn scope_rows(
        &self,
        client_id: Uuid,
    ) -> Result<HashMap<String, ClientControlScope>, PortalError> {
        Ok(self
            .store
            .list_scopes(client_id)
            .await?
            .into_iter()
            .map(|row| (row.control_code.clone(), row))
            .collect())
    }

    async fn evidence_by_code(
        &self,
        client_id: Uuid,
    ) -> Result<HashMap<String, EvidenceRecord>, PortalError> {
        Ok(self
            .store
            .list_evidence(client_id)
            .await?
            .into_iter()
            .map(|record| (record.control_code.clone(), record))
            .collect())
    }

    pub async fn resolve_scope(
        &self,
        client_id: Uuid,
        control_code: &str,
    ) -> Result<ScopeValue, PortalError> {
        Ok(self
            .store
            .find_scope(client_id, control_code)
            .await?
            .map(|row| row.scope)
            .unwrap_or(self.settings.default_scope))
    }

    pub async fn set_scope(
        &self,
        slug: &str,
        control_code: &str,
        req: SetScopeRequest,
    ) -> Result<ClientControlScope, PortalError> {
        let scope: ScopeValue = req.scope.parse().map_err(PortalError::Validation)?;
        let client = self.get_client(slug).await?;
        self.require_control(control_code).await?;

        let reason_out_of_scope = match scope {
            ScopeValue::OutOfScope => req
                .reason_out_of_scope
                .map(|r| r.trim().to_string())
                .filter(|r| !r.is_empty()),
            _ => None,
        };
        let row = self
            .store
            .upsert_scope(ClientControlScope {
                client_id: client.id,
                control_code: control_code.to_string(),
                scope,
                reason_out_of_scope,
                updated_at: Utc::now(),
            })
            .await?;
        log::info!("Scope of {} for {} set to {}", control_code, client.slug, scope);
        Ok(row)
    }

    pub async fn require_control(&self, control_code: &str) -> Result<Control, PortalError> {
        self.store
            .find_control(control_code)
            .await?
            .ok_or_else(|| PortalError::NotFound(format!("Control {control_code} not found")))
    }

    /// Looks up a control on behalf of a client-facing request. Linked clients
    /// cannot see controls outside their scope, so those read as missing.
    pub async fn visible_control(
        &self,
        principal: &Principal,
        client: &Client,
        control_code: &str,
    ) -> Result<Control, PortalError> {
        let control = self.require_control(control_code).await?;
        if let Principal::LinkedClient(_) = principal {
            if self.resolve_scope(client.id, control_code).await? != ScopeValue::InScope {
                return Err(PortalError::NotFound(format!(
                    "Control {control_code} not found"
                )));
            }
        }
        Ok(control)
    }

    /// Every control, framework first in catalog order, merged with this
    /// client's scope and evidence status.
    pub async fn admin_controls(&self, slug: &str) -> Result<Vec<AdminControlView>, PortalError> {
        let client = self.get_client(slug).await?;
        let controls = self.store.list_controls().await?;
        let rows = self.scope_rows(client.id).await?;
        let evidence = self.evidence_by_code(client.id).await?;

        Ok(controls
            .into_iter()
            .map(|c| {
                let row = rows.get(&c.control_code);
                let status = evidence
                    .get(&c.control_code)
                    .map(|e| e.status)
                    .unwrap_or_default();
                AdminControlView {
                    scope: row.map(|r| r.scope).unwrap_or(self.settings.default_scope),
                    reason_out_of_scope: row.and_then(|r| r.reason_out_of_scope.clone()),
                    status,
                    control_code: c.control_code,
                    name: c.name,
                    description: c.description,
                    category: c.category,
                    criteria_mapping: c.criteria_mapping,
                    example_evidence: c.example_evidence,
                    is_custom: c.is_custom,
                }
            })
            .collect())
    }

    pub async fn client_controls(&self, client: &Client) -> Result<Vec<ClientControlView>, PortalError> {
        let controls = self.store.list_controls().await?;
        let scopes = self.resolved_scopes(client.id, &controls).await?;
        let evidence = self.evidence_by_code(client.id).await?;

        Ok(controls
            .into_iter()
            .filter(|c| scopes.get(&c.control_code) == Some(&ScopeValue::InScope))
            .map(|c| ClientControlView {
                status: evidence
                    .get(&c.control_code)
                    .map(|e| e.status)
                    .unwrap_or(EvidenceStatus::NotStarted),
                control_code: c.control_code,
                name: c.name,
                description: c.description,
                category: c.category,
                example_evidence: c.example_evidence,
            })
            .collect())
    }

    pub async fn control_detail(
        &self,
        principal: &Principal,
        client: &Client,
        control_code: &str,
    ) -> Result<ControlDetail, PortalError> {
        let control = self.visible_control(principal, client, control_code).await?;
        let evidence = self
            .store
            .find_evidence(client.id, control_code)
            .await?
            .unwrap_or_else(|| EvidenceRecord::not_started(client.id, control_code));
        Ok(ControlDetail {
            control_code: control.control_code,
            name: control.name,
            description: control.description,
            category: control.category,
            example_evidence: control.example_evidence,
            status: evidence.status,
            reviewer_comment: evidence.reviewer_comment,
        })
    }
}
