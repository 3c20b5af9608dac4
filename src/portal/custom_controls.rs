use chrono::Utc;
use uuid::Uuid;

use super::catalog::CUSTOM_CATEGORY;
use super::error::PortalError;
use super::types::{
    ClientControlScope, Control, ControlChanges, CreateCustomControlRequest, ScopeValue,
    UpdateCustomControlRequest,
};
use super::PortalService;

const MAX_CONTROL_CODE_LEN: usize = 64;

impl PortalService {
    /// Adds an engagement-specific control. It is global like every other
    /// control, but starts in scope only for the client that created it.
    pub async fn create_custom_control(
        &self,
        slug: &str,
        req: CreateCustomControlRequest,
    ) -> Result<Control, PortalError> {
        let client = self.get_client(slug).await?;
        let code = req.control_code.trim();
        let name = req.name.trim();
        if code.is_empty() || code.len() > MAX_CONTROL_CODE_LEN {
            return Err(PortalError::Validation(format!(
                "Control code must be between 1 and {MAX_CONTROL_CODE_LEN} characters"
            )));
        }
        if code.contains('/') || code.chars().any(char::is_whitespace) {
            return Err(PortalError::Validation(
                "Control code may not contain slashes or whitespace".to_string(),
            ));
        }
        if name.is_empty() {
            return Err(PortalError::Validation("Control name is required".to_string()));
        }
        if self.store.find_control(code).await?.is_some() {
            return Err(PortalError::Conflict(format!(
                "Control code '{code}' already exists"
            )));
        }

        let now = Utc::now();
        let control = Control {
            id: Uuid::new_v4(),
            control_code: code.to_string(),
            name: name.to_string(),
            description: req.description.trim().to_string(),
            category: CUSTOM_CATEGORY.to_string(),
            criteria_mapping: None,
            example_evidence: None,
            is_custom: true,
            sort_index: 0,
            created_at: now,
        };
        let initial_scope = ClientControlScope {
            client_id: client.id,
            control_code: control.control_code.clone(),
            scope: ScopeValue::InScope,
            reason_out_of_scope: None,
            updated_at: now,
        };
        let control = self.store.create_custom_control(control, initial_scope).await?;
        log::info!("Created custom control {} for {}", control.control_code, client.slug);
        Ok(control)
    }

    async fn require_custom_control(&self, control_code: &str) -> Result<Control, PortalError> {
        let control = self.require_control(control_code).await?;
        if !control.is_custom {
            return Err(PortalError::Forbidden(format!(
                "{control_code} is a framework control and cannot be modified"
            )));
        }
        Ok(control)
    }

    pub async fn update_custom_control(
        &self,
        slug: &str,
        control_code: &str,
        req: UpdateCustomControlRequest,
    ) -> Result<Control, PortalError> {
        self.get_client(slug).await?;
        self.require_custom_control(control_code).await?;

        let name = req.name.map(|n| n.trim().to_string());
        if matches!(name.as_deref(), Some("")) {
            return Err(PortalError::Validation("Control name is required".to_string()));
        }
        let changes = ControlChanges {
            name,
            description: req.description.map(|d| d.trim().to_string()),
        };
        let control = self.store.update_control(control_code, changes).await?;
        log::info!("Updated custom control {}", control_code);
        Ok(control)
    }

    /// Irreversible: drops every client's scope, evidence and comments for the control.
    pub async fn delete_custom_control(
        &self,
        slug: &str,
        control_code: &str,
    ) -> Result<(), PortalError> {
        self.get_client(slug).await?;
        self.require_custom_control(control_code).await?;
        self.store.delete_control(control_code).await?;
        log::info!("Deleted custom control {} (requested via {})", control_code, slug);
        Ok(())
    }
}
