use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::json;
use std::sync::Arc;

use crate::core::shared::state::AppState;
use crate::security::auth::{Principal, StaffUser};

use super::error::PortalError;
use super::extract::{PortalJson, PortalPath};
use super::types::{
    CreateClientRequest, CreateCustomControlRequest, IncomingFile, LinkExchange,
    PostCommentRequest, ReviewRequest, SetScopeRequest, UpdateCustomControlRequest,
};

const UPLOAD_FIELD: &str = "files";

pub async fn ping() -> impl IntoResponse {
    Json(json!({ "message": "pong" }))
}

pub async fn admin_list_clients(
    State(state): State<Arc<AppState>>,
    _staff: StaffUser,
) -> Result<impl IntoResponse, PortalError> {
    let clients = state.portal.list_clients().await?;
    Ok(Json(json!({ "clients": clients })))
}

pub async fn admin_create_client(
    State(state): State<Arc<AppState>>,
    staff: StaffUser,
    PortalJson(req): PortalJson<CreateClientRequest>,
) -> Result<impl IntoResponse, PortalError> {
    let client = state.portal.create_client(req).await?;
    log::debug!("Client {} created by {}", client.slug, staff.subject);
    Ok((StatusCode::CREATED, Json(json!({ "client": client }))))
}

pub async fn admin_get_client(
    State(state): State<Arc<AppState>>,
    _staff: StaffUser,
    PortalPath(slug): PortalPath<String>,
) -> Result<impl IntoResponse, PortalError> {
    let client = state.portal.get_client(&slug).await?;
    Ok(Json(json!({ "client": client })))
}

pub async fn admin_delete_client(
    State(state): State<Arc<AppState>>,
    _staff: StaffUser,
    PortalPath(slug): PortalPath<String>,
) -> Result<impl IntoResponse, PortalError> {
    state.portal.delete_client(&slug).await?;
    Ok(Json(json!({ "success": true })))
}

pub async fn admin_list_controls(
    State(state): State<Arc<AppState>>,
    _staff: StaffUser,
    PortalPath(slug): PortalPath<String>,
) -> Result<impl IntoResponse, PortalError> {
    let controls = state.portal.admin_controls(&slug).await?;
    Ok(Json(controls))
}

pub async fn admin_create_custom_control(
    State(state): State<Arc<AppState>>,
    _staff: StaffUser,
    PortalPath(slug): PortalPath<String>,
    PortalJson(req): PortalJson<CreateCustomControlRequest>,
) -> Result<impl IntoResponse, PortalError> {
    let control = state.portal.create_custom_control(&slug, req).await?;
    Ok((StatusCode::CREATED, Json(json!({ "control": control }))))
}

pub async fn admin_update_custom_control(
    State(state): State<Arc<AppState>>,
    _staff: StaffUser,
    PortalPath((slug, code)): PortalPath<(String, String)>,
    PortalJson(req): PortalJson<UpdateCustomControlRequest>,
) -> Result<impl IntoResponse, PortalError> {
    let control = state.portal.update_custom_control(&slug, &code, req).await?;
    Ok(Json(json!({ "control": control })))
}

pub async fn admin_delete_custom_control(
    State(state): State<Arc<AppState>>,
    _staff: StaffUser,
    PortalPath((slug, code)): PortalPath<(String, String)>,
) -> Result<impl IntoResponse, PortalError> {
    state.portal.delete_custom_control(&slug, &code).await?;
    Ok(Json(json!({ "success": true })))
}

pub async fn admin_set_scope(
    State(state): State<Arc<AppState>>,
    _staff: StaffUser,
    PortalPath((slug, code)): PortalPath<(String, String)>,
    PortalJson(req): PortalJson<SetScopeRequest>,
) -> Result<impl IntoResponse, PortalError> {
    let scope = state.portal.set_scope(&slug, &code, req).await?;
    Ok(Json(json!({ "scope": scope })))
}

pub async fn admin_client_stats(
    State(state): State<Arc<AppState>>,
    _staff: StaffUser,
    PortalPath(slug): PortalPath<String>,
) -> Result<impl IntoResponse, PortalError> {
    let stats = state.portal.client_stats(&slug).await?;
    Ok(Json(stats))
}

pub async fn admin_get_evidence(
    State(state): State<Arc<AppState>>,
    staff: StaffUser,
    PortalPath((slug, code)): PortalPath<(String, String)>,
) -> Result<impl IntoResponse, PortalError> {
    let client = state.portal.get_client(&slug).await?;
    let evidence = state
        .portal
        .evidence(&Principal::Staff(staff), &client, &code)
        .await?;
    Ok(Json(json!({ "evidence": evidence })))
}

pub async fn admin_download_evidence(
    State(state): State<Arc<AppState>>,
    _staff: StaffUser,
    PortalPath((slug, code)): PortalPath<(String, String)>,
) -> Result<impl IntoResponse, PortalError> {
    let client = state.portal.get_client(&slug).await?;
    let files = state.portal.download_links(&client, &code).await?;
    Ok(Json(json!({ "files": files })))
}

pub async fn admin_review_evidence(
    State(state): State<Arc<AppState>>,
    staff: StaffUser,
    PortalPath((slug, code)): PortalPath<(String, String)>,
    PortalJson(req): PortalJson<ReviewRequest>,
) -> Result<impl IntoResponse, PortalError> {
    let evidence = state.portal.review_evidence(&slug, &code, req).await?;
    log::debug!("Review on {}/{} recorded by {}", slug, code, staff.subject);
    Ok(Json(json!({ "evidence": evidence })))
}

pub async fn admin_list_comments(
    State(state): State<Arc<AppState>>,
    staff: StaffUser,
    PortalPath((slug, code)): PortalPath<(String, String)>,
) -> Result<impl IntoResponse, PortalError> {
    let client = state.portal.get_client(&slug).await?;
    let comments = state
        .portal
        .list_comments(&Principal::Staff(staff), &client, &code)
        .await?;
    Ok(Json(comments))
}

pub async fn admin_post_comment(
    State(state): State<Arc<AppState>>,
    staff: StaffUser,
    PortalPath((slug, code)): PortalPath<(String, String)>,
    PortalJson(req): PortalJson<PostCommentRequest>,
) -> Result<impl IntoResponse, PortalError> {
    let client = state.portal.get_client(&slug).await?;
    let comment = state
        .portal
        .post_comment(&Principal::Staff(staff), &client, &code, req)
        .await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

pub async fn admin_issue_access_link(
    State(state): State<Arc<AppState>>,
    _staff: StaffUser,
    PortalPath(slug): PortalPath<String>,
) -> Result<impl IntoResponse, PortalError> {
    let issued = state.portal.issue_access_link(&slug).await?;
    Ok(Json(issued))
}

pub async fn admin_revoke_access_link(
    State(state): State<Arc<AppState>>,
    _staff: StaffUser,
    PortalPath(slug): PortalPath<String>,
) -> Result<impl IntoResponse, PortalError> {
    let revoked = state.portal.revoke_access_links(&slug).await?;
    Ok(Json(json!({ "revoked": revoked })))
}

pub async fn client_get(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    PortalPath(slug): PortalPath<String>,
) -> Result<impl IntoResponse, PortalError> {
    let client = state.portal.client_for(&principal, &slug).await?;
    Ok(Json(json!({ "client": client })))
}

pub async fn client_list_controls(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    PortalPath(slug): PortalPath<String>,
) -> Result<impl IntoResponse, PortalError> {
    let client = state.portal.client_for(&principal, &slug).await?;
    let controls = state.portal.client_controls(&client).await?;
    Ok(Json(controls))
}

pub async fn client_get_control(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    PortalPath((slug, code)): PortalPath<(String, String)>,
) -> Result<impl IntoResponse, PortalError> {
    let client = state.portal.client_for(&principal, &slug).await?;
    let detail = state.portal.control_detail(&principal, &client, &code).await?;
    Ok(Json(detail))
}

pub async fn client_get_evidence(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    PortalPath((slug, code)): PortalPath<(String, String)>,
) -> Result<impl IntoResponse, PortalError> {
    let client = state.portal.client_for(&principal, &slug).await?;
    let evidence = state.portal.evidence(&principal, &client, &code).await?;
    Ok(Json(json!({ "evidence": evidence })))
}

async fn read_uploads(mut multipart: Multipart) -> Result<Vec<IncomingFile>, PortalError> {
    let mut files = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| PortalError::Validation(format!("Malformed upload: {e}")))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let original_name = field.file_name().unwrap_or("file").to_string();
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| PortalError::Validation(format!("Failed to read {original_name}: {e}")))?;
        files.push(IncomingFile {
            original_name,
            content_type,
            bytes: bytes.to_vec(),
        });
    }
    Ok(files)
}

pub async fn client_submit_evidence(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    PortalPath((slug, code)): PortalPath<(String, String)>,
    multipart: Multipart,
) -> Result<impl IntoResponse, PortalError> {
    let client = state.portal.client_for(&principal, &slug).await?;
    let files = read_uploads(multipart).await?;
    let evidence = state
        .portal
        .submit_evidence(&principal, &client, &code, files)
        .await?;
    Ok(Json(json!({ "success": true, "evidence": evidence })))
}

pub async fn client_list_comments(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    PortalPath((slug, code)): PortalPath<(String, String)>,
) -> Result<impl IntoResponse, PortalError> {
    let client = state.portal.client_for(&principal, &slug).await?;
    let comments = state.portal.list_comments(&principal, &client, &code).await?;
    Ok(Json(comments))
}

pub async fn client_post_comment(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    PortalPath((slug, code)): PortalPath<(String, String)>,
    PortalJson(req): PortalJson<PostCommentRequest>,
) -> Result<impl IntoResponse, PortalError> {
    let client = state.portal.client_for(&principal, &slug).await?;
    let comment = state
        .portal
        .post_comment(&principal, &client, &code, req)
        .await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

pub async fn exchange_access_link(
    State(state): State<Arc<AppState>>,
    PortalPath(token): PortalPath<String>,
) -> Result<impl IntoResponse, PortalError> {
    let (client, link) = state.portal.exchange_access_link(&token).await?;
    let (access_token, expires_at) = state.tokens.issue_linked_client_token(client.id, link.id)?;
    Ok(Json(LinkExchange {
        slug: client.slug,
        access_token,
        expires_at,
    }))
}
