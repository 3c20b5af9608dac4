use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ScopeValue {
    #[default]
    Default,
    InScope,
    OutOfScope,
}

impl std::fmt::Display for ScopeValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Default => "default",
            Self::InScope => "in-scope",
            Self::OutOfScope => "out-of-scope",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for ScopeValue {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "default" => Ok(Self::Default),
            "in-scope" => Ok(Self::InScope),
            "out-of-scope" => Ok(Self::OutOfScope),
            _ => Err(format!("Unknown scope: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "kebab-case")]
pub enum EvidenceStatus {
    #[default]
    NotStarted,
    Draft,
    Submitted,
    NeedsClarification,
    Approved,
}

impl EvidenceStatus {
    /// Outcomes a reviewer may record. Everything else is client-driven.
    pub fn is_review_outcome(self) -> bool {
        matches!(self, Self::Approved | Self::NeedsClarification)
    }
}

impl std::fmt::Display for EvidenceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::NotStarted => "not-started",
            Self::Draft => "draft",
            Self::Submitted => "submitted",
            Self::NeedsClarification => "needs-clarification",
            Self::Approved => "approved",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for EvidenceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not-started" => Ok(Self::NotStarted),
            "draft" => Ok(Self::Draft),
            "submitted" => Ok(Self::Submitted),
            "needs-clarification" => Ok(Self::NeedsClarification),
            "approved" => Ok(Self::Approved),
            _ => Err(format!("Unknown evidence status: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuthorRole {
    Admin,
    Client,
}

impl std::fmt::Display for AuthorRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Admin => "admin",
            Self::Client => "client",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for AuthorRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Self::Admin),
            "client" => Ok(Self::Client),
            _ => Err(format!("Unknown author role: {s}")),
        }
    }
}

/// How a new submission treats files already attached to the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileListMode {
    Replace,
    Append,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Control {
    pub id: Uuid,
    pub control_code: String,
    pub name: String,
    pub description: String,
    pub category: String,
    pub criteria_mapping: Option<String>,
    pub example_evidence: Option<String>,
    pub is_custom: bool,
    #[serde(skip)]
    pub sort_index: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct ControlChanges {
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ClientControlScope {
    pub client_id: Uuid,
    pub control_code: String,
    pub scope: ScopeValue,
    pub reason_out_of_scope: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceFile {
    pub storage_path: String,
    pub display_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceRecord {
    pub client_id: Uuid,
    pub control_code: String,
    pub status: EvidenceStatus,
    pub files: Vec<EvidenceFile>,
    pub reviewer_comment: Option<String>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl EvidenceRecord {
    /// Stand-in for a (client, control) pair nobody has touched yet.
    pub fn not_started(client_id: Uuid, control_code: &str) -> Self {
        Self {
            client_id,
            control_code: control_code.to_string(),
            status: EvidenceStatus::NotStarted,
            files: Vec::new(),
            reviewer_comment: None,
            submitted_at: None,
            updated_at: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EvidenceSubmission {
    pub client_id: Uuid,
    pub control_code: String,
    pub files: Vec<EvidenceFile>,
    pub mode: FileListMode,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct EvidenceReview {
    pub client_id: Uuid,
    pub control_code: String,
    pub status: EvidenceStatus,
    pub reviewer_comment: Option<String>,
    pub reviewed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: Uuid,
    pub client_id: Uuid,
    pub control_code: String,
    pub author_role: AuthorRole,
    pub author_email: Option<String>,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub read_by_admin: bool,
    pub read_by_client: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AccessLink {
    pub id: Uuid,
    pub token: String,
    pub client_id: Uuid,
    pub is_active: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AdminControlView {
    pub control_code: String,
    pub name: String,
    pub description: String,
    pub category: String,
    pub criteria_mapping: Option<String>,
    pub example_evidence: Option<String>,
    pub is_custom: bool,
    pub scope: ScopeValue,
    pub reason_out_of_scope: Option<String>,
    pub status: EvidenceStatus,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ClientControlView {
    pub control_code: String,
    pub name: String,
    pub description: String,
    pub category: String,
    pub example_evidence: Option<String>,
    pub status: EvidenceStatus,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ControlDetail {
    pub control_code: String,
    pub name: String,
    pub description: String,
    pub category: String,
    pub example_evidence: Option<String>,
    pub status: EvidenceStatus,
    pub reviewer_comment: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ClientStats {
    pub total_controls: usize,
    pub in_scope: usize,
    pub out_of_scope: usize,
    pub submitted: usize,
    pub pending_review: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DownloadLink {
    pub display_name: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedAccessLink {
    pub link: String,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkExchange {
    pub slug: String,
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}

/// A file as received from the multipart body, before it reaches storage.
#[derive(Debug, Clone)]
pub struct IncomingFile {
    pub original_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Deserialize)]
pub struct CreateClientRequest {
    pub name: String,
    pub slug: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCustomControlRequest {
    pub control_code: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateCustomControlRequest {
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetScopeRequest {
    pub scope: String,
    pub reason_out_of_scope: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReviewRequest {
    pub status: String,
    pub comment: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PostCommentRequest {
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_value_round_trips_wire_names() {
        for name in ["default", "in-scope", "out-of-scope"] {
            let scope: ScopeValue = name.parse().unwrap();
            assert_eq!(scope.to_string(), name);
        }
        assert!("inscope".parse::<ScopeValue>().is_err());
    }

    #[test]
    fn test_evidence_status_serializes_kebab_case() {
        let json = serde_json::to_string(&EvidenceStatus::NeedsClarification).unwrap();
        assert_eq!(json, "\"needs-clarification\"");
        assert_eq!(EvidenceStatus::default(), EvidenceStatus::NotStarted);
    }

    #[test]
    fn test_review_outcomes() {
        assert!(EvidenceStatus::Approved.is_review_outcome());
        assert!(EvidenceStatus::NeedsClarification.is_review_outcome());
        assert!(!EvidenceStatus::Submitted.is_review_outcome());
        assert!(!EvidenceStatus::Draft.is_review_outcome());
    }

    #[test]
    fn test_stats_use_camel_case_keys() {
        let stats = ClientStats {
            total_controls: 3,
            pending_review: 1,
            ..Default::default()
        };
        let value = serde_json::to_value(&stats).unwrap();
        assert_eq!(value["totalControls"], 3);
        assert_eq!(value["pendingReview"], 1);
        assert_eq!(value["outOfScope"], 0);
    }

    #[test]
    fn test_not_started_record_is_empty() {
        let record = EvidenceRecord::not_started(Uuid::nil(), "DCF-4");
        assert_eq!(record.status, EvidenceStatus::NotStarted);
        assert!(record.files.is_empty());
        assert!(record.reviewer_comment.is_none());
    }
}
