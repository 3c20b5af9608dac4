use chrono::Utc;
use uuid::Uuid;

use super::error::PortalError;
use super::types::{AuthorRole, Client, Comment, PostCommentRequest};
use super::PortalService;
use crate::security::auth::Principal;

impl PortalService {
    pub async fn post_comment(
        &self,
        principal: &Principal,
        client: &Client,
        control_code: &str,
        req: PostCommentRequest,
    ) -> Result<Comment, PortalError> {
        let message = req.message.trim();
        if message.is_empty() {
            return Err(PortalError::Validation("Message cannot be empty".to_string()));
        }
        self.visible_control(principal, client, control_code).await?;

        let (author_role, author_email) = match principal {
            Principal::Staff(user) => (AuthorRole::Admin, user.email.clone()),
            Principal::LinkedClient(_) => (AuthorRole::Client, None),
        };
        let comment = Comment {
            id: Uuid::new_v4(),
            client_id: client.id,
            control_code: control_code.to_string(),
            author_role,
            author_email,
            message: message.to_string(),
            created_at: Utc::now(),
            read_by_admin: author_role == AuthorRole::Admin,
            read_by_client: author_role == AuthorRole::Client,
        };
        let comment = self.store.insert_comment(comment).await?;
        log::info!(
            "Comment {} by {} on {}/{}",
            comment.id,
            author_role,
            client.slug,
            control_code
        );
        Ok(comment)
    }

    pub async fn list_comments(
        &self,
        principal: &Principal,
        client: &Client,
        control_code: &str,
    ) -> Result<Vec<Comment>, PortalError> {
        self.visible_control(principal, client, control_code).await?;
        self.store.list_comments(client.id, control_code).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::portal::tests::{acme, in_memory_service, linked, staff};
    use crate::portal::types::SetScopeRequest;

    fn say(message: &str) -> PostCommentRequest {
        PostCommentRequest {
            message: message.to_string(),
        }
    }

    #[tokio::test]
    async fn test_blank_message_rejected() {
        let (portal, _) = in_memory_service().await;
        let client = acme(&portal).await;
        for message in ["", "   ", "\n\t"] {
            assert!(matches!(
                portal
                    .post_comment(&staff(), &client, "DCF-4", say(message))
                    .await
                    .unwrap_err(),
                PortalError::Validation(_)
            ));
        }
    }

    #[tokio::test]
    async fn test_thread_flags_and_order() {
        let (portal, _) = in_memory_service().await;
        let client = acme(&portal).await;
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

        let question = portal
            .post_comment(&staff(), &client, "DCF-4", say("Which repo is this?"))
            .await
            .unwrap();
        assert_eq!(question.author_role, AuthorRole::Admin);
        assert_eq!(question.author_email.as_deref(), Some("auditor@example.com"));
        assert!(question.read_by_admin);
        assert!(!question.read_by_client);

        let answer = portal
            .post_comment(&linked(&client), &client, "DCF-4", say("  The monorepo  "))
            .await
            .unwrap();
        assert_eq!(answer.author_role, AuthorRole::Client);
        assert_eq!(answer.message, "The monorepo");
        assert!(answer.author_email.is_none());
        assert!(!answer.read_by_admin);
        assert!(answer.read_by_client);

        let thread = portal.list_comments(&staff(), &client, "DCF-4").await.unwrap();
        assert_eq!(thread.len(), 2);
        assert_eq!(thread[0].id, question.id);
        assert_eq!(thread[1].id, answer.id);
    }

    #[tokio::test]
    async fn test_comments_on_unknown_control() {
        let (portal, _) = in_memory_service().await;
        let client = acme(&portal).await;
        assert!(matches!(
            portal.list_comments(&staff(), &client, "NOPE-1").await.unwrap_err(),
            PortalError::NotFound(_)
        ));
    }
}
