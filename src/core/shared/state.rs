use crate::core::config::AppConfig;
use crate::portal::PortalService;
use crate::security::auth::JwtKeys;

/// Shared by every request handler behind an `Arc`.
pub struct AppState {
    pub config: AppConfig,
    pub portal: PortalService,
    pub tokens: JwtKeys,
}

impl AppState {
    pub fn new(config: AppConfig, portal: PortalService) -> Self {
        let tokens = JwtKeys::new(&config.auth.jwt_secret, config.auth.linked_client_ttl_minutes);
        Self {
            config,
            portal,
            tokens,
        }
    }
}
