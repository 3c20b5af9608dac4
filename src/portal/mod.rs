//! SOC 2 evidence collection.
//!
//! Staff scope framework and custom controls per client engagement and review
//! what clients upload; clients reach their side of the portal either as staff
//! or through an access link.

pub mod access_links;
pub mod catalog;
pub mod clients;
pub mod comments;
pub mod custom_controls;
pub mod error;
pub mod evidence;
pub mod extract;
pub mod handlers;
pub mod objects;
pub mod scope;
pub mod storage;
pub mod store;
pub mod types;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, patch, post},
    Router,
};

use crate::core::config::AppConfig;
use crate::core::shared::state::AppState;
use crate::core::urls::ApiUrls;

pub use error::PortalError;
use objects::EvidenceObjectStore;
use store::PortalStore;
use types::{FileListMode, ScopeValue};

#[derive(Debug, Clone)]
pub struct PortalSettings {
    pub default_scope: ScopeValue,
    pub download_url_ttl: Duration,
    pub access_link_ttl: Option<chrono::Duration>,
    pub resubmission: FileListMode,
    pub public_base_url: String,
}

impl Default for PortalSettings {
    fn default() -> Self {
        Self {
            default_scope: ScopeValue::Default,
            download_url_ttl: Duration::from_secs(60),
            access_link_ttl: None,
            resubmission: FileListMode::Replace,
            public_base_url: "http://localhost:8080".to_string(),
        }
    }
}

impl PortalSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            default_scope: config.portal.default_scope,
            download_url_ttl: Duration::from_secs(config.portal.download_url_ttl_secs),
            access_link_ttl: config
                .portal
                .access_link_ttl_hours
                .map(|hours| chrono::Duration::hours(hours as i64)),
            resubmission: if config.portal.append_on_resubmit {
                FileListMode::Append
            } else {
                FileListMode::Replace
            },
            public_base_url: config.server.public_base_url.trim_end_matches('/').to_string(),
        }
    }
}

/// Entry point for every portal operation. Cheap to clone.
#[derive(Clone)]
pub struct PortalService {
    store: Arc<dyn PortalStore>,
    objects: Arc<dyn EvidenceObjectStore>,
    settings: PortalSettings,
}

impl PortalService {
    pub fn new(
        store: Arc<dyn PortalStore>,
        objects: Arc<dyn EvidenceObjectStore>,
        settings: PortalSettings,
    ) -> Self {
        Self {
            store,
            objects,
            settings,
        }
    }

    pub fn settings(&self) -> &PortalSettings {
        &self.settings
    }

    /// Copies the framework catalog into the store. Safe to run on every boot.
    pub async fn seed_catalog(&self) -> Result<usize, PortalError> {
        let controls = catalog::framework_controls()?;
        let added = self.store.seed_framework_controls(controls).await?;
        if added > 0 {
            log::info!("Seeded {} framework controls", added);
        }
        Ok(added)
    }
}

pub fn configure_portal_routes(max_upload_bytes: usize) -> Router<Arc<AppState>> {
    use handlers::*;

    Router::new()
        .route(ApiUrls::PING, get(ping))
        .route(
            ApiUrls::ADMIN_CLIENTS,
            get(admin_list_clients).post(admin_create_client),
        )
        .route(
            ApiUrls::ADMIN_CLIENT_BY_SLUG,
            get(admin_get_client).delete(admin_delete_client),
        )
        .route(
            ApiUrls::ADMIN_CLIENT_CONTROLS,
            get(admin_list_controls).post(admin_create_custom_control),
        )
        .route(
            ApiUrls::ADMIN_CLIENT_CONTROL,
            patch(admin_update_custom_control).delete(admin_delete_custom_control),
        )
        .route(ApiUrls::ADMIN_CONTROL_SCOPE, post(admin_set_scope))
        .route(ApiUrls::ADMIN_CLIENT_STATS, get(admin_client_stats))
        .route(ApiUrls::ADMIN_CONTROL_EVIDENCE, get(admin_get_evidence))
        .route(ApiUrls::ADMIN_EVIDENCE_DOWNLOAD, get(admin_download_evidence))
        .route(ApiUrls::ADMIN_CONTROL_REVIEW, post(admin_review_evidence))
        .route(
            ApiUrls::ADMIN_CONTROL_COMMENTS,
            get(admin_list_comments).post(admin_post_comment),
        )
        .route(
            ApiUrls::ADMIN_ACCESS_LINK,
            post(admin_issue_access_link).delete(admin_revoke_access_link),
        )
        .route(ApiUrls::CLIENT_BY_SLUG, get(client_get))
        .route(ApiUrls::CLIENT_CONTROLS, get(client_list_controls))
        .route(ApiUrls::CLIENT_CONTROL, get(client_get_control))
        .route(
            ApiUrls::CLIENT_CONTROL_EVIDENCE,
            get(client_get_evidence)
                .post(client_submit_evidence)
                .layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .route(
            ApiUrls::CLIENT_CONTROL_COMMENTS,
            get(client_list_comments).post(client_post_comment),
        )
        .route(ApiUrls::CLIENT_ACCESS_EXCHANGE, post(exchange_access_link))
}
