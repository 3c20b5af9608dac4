use chrono::Utc;
use rand::RngCore;
use uuid::Uuid;

use super::error::PortalError;
use super::types::{AccessLink, Client, IssuedAccessLink};
use super::PortalService;

const TOKEN_BYTES: usize = 32;

pub fn generate_link_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn check_usable(link: &AccessLink) -> Result<(), PortalError> {
    if !link.is_active {
        return Err(PortalError::LinkRevoked);
    }
    if link.expires_at.is_some_and(|at| at <= Utc::now()) {
        return Err(PortalError::LinkExpired);
    }
    Ok(())
}

impl PortalService {
    /// Issues a fresh link and supersedes every earlier one for the client.
    pub async fn issue_access_link(&self, slug: &str) -> Result<IssuedAccessLink, PortalError> {
        let client = self.get_client(slug).await?;
        let now = Utc::now();
        let link = AccessLink {
            id: Uuid::new_v4(),
            token: generate_link_token(),
            client_id: client.id,
            is_active: true,
            expires_at: self.settings.access_link_ttl.map(|ttl| now + ttl),
            created_at: now,
        };
        let link = self.store.replace_access_link(link).await?;
        log::info!("Issued access link {} for {}", link.id, client.slug);
        Ok(IssuedAccessLink {
            link: format!(
                "{}/client-access/{}",
                self.settings.public_base_url, link.token
            ),
            expires_at: link.expires_at,
        })
    }

    pub async fn revoke_access_links(&self, slug: &str) -> Result<usize, PortalError> {
        let client = self.get_client(slug).await?;
        let revoked = self.store.revoke_access_links(client.id).await?;
        log::info!("Revoked {} access link(s) for {}", revoked, client.slug);
        Ok(revoked)
    }

    /// Resolves a link token to its client. The link stays usable afterwards.
    pub async fn exchange_access_link(
        &self,
        token: &str,
    ) -> Result<(Client, AccessLink), PortalError> {
        let link = self
            .store
            .find_access_link(token)
            .await?
            .ok_or(PortalError::LinkInvalid)?;
        check_usable(&link)?;
        let client = self
            .store
            .find_client_by_id(link.client_id)
            .await?
            .ok_or(PortalError::LinkInvalid)?;
        log::info!("Access link {} exchanged for {}", link.id, client.slug);
        Ok((client, link))
    }

    /// Re-checks the link behind a linked-client session.
    pub async fn verify_link_session(
        &self,
        link_id: Uuid,
        client_id: Uuid,
    ) -> Result<AccessLink, PortalError> {
        let link = self
            .store
            .find_access_link_by_id(link_id)
            .await?
            .filter(|l| l.client_id == client_id)
            .ok_or(PortalError::LinkInvalid)?;
        check_usable(&link)?;
        Ok(link)
    }
}
