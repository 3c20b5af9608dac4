//! Postgres-backed [`PortalStore`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use uuid::Uuid;

use crate::core::shared::schema::{
    client_access_links, client_control_evidence, client_control_scopes, clients,
    control_comments, controls,
};
use crate::core::shared::utils::DbPool;

use super::error::PortalError;
use super::store::{merge_review, merge_submission, PortalStore};
use super::types::{
    AccessLink, Client, ClientControlScope, Comment, Control, ControlChanges, EvidenceFile,
    EvidenceRecord, EvidenceReview, EvidenceSubmission,
};

#[derive(Debug, Clone, Queryable, Insertable)]
#[diesel(table_name = clients)]
pub struct DbClient {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Insertable)]
#[diesel(table_name = controls)]
pub struct DbControl {
    pub control_code: String,
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub category: String,
    pub criteria_mapping: Option<String>,
    pub example_evidence: Option<String>,
    pub is_custom: bool,
    pub sort_index: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, AsChangeset)]
#[diesel(table_name = controls)]
struct DbControlChanges {
    name: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Clone, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = client_control_scopes)]
#[diesel(primary_key(client_id, control_code))]
#[diesel(treat_none_as_null = true)]
pub struct DbScope {
    pub client_id: Uuid,
    pub control_code: String,
    pub scope: String,
    pub reason_out_of_scope: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = client_control_evidence)]
#[diesel(primary_key(client_id, control_code))]
#[diesel(treat_none_as_null = true)]
pub struct DbEvidence {
    pub client_id: Uuid,
    pub control_code: String,
    pub status: String,
    pub files: serde_json::Value,
    pub reviewer_comment: Option<String>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Insertable)]
#[diesel(table_name = control_comments)]
pub struct DbComment {
    pub id: Uuid,
    pub client_id: Uuid,
    pub control_code: String,
    pub author_role: String,
    pub author_email: Option<String>,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub read_by_admin: bool,
    pub read_by_client: bool,
}

#[derive(Debug, Clone, Queryable, Insertable)]
#[diesel(table_name = client_access_links)]
pub struct DbAccessLink {
    pub id: Uuid,
    pub token: String,
    pub client_id: Uuid,
    pub is_active: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

fn corrupt(what: &str, detail: String) -> PortalError {
    PortalError::Database(format!("Stored {what} is invalid: {detail}"))
}

impl From<Client> for DbClient {
    fn from(c: Client) -> Self {
        Self {
            id: c.id,
            name: c.name,
            slug: c.slug,
            created_at: c.created_at,
        }
    }
}

impl From<DbClient> for Client {
    fn from(c: DbClient) -> Self {
        Self {
            id: c.id,
            name: c.name,
            slug: c.slug,
            created_at: c.created_at,
        }
    }
}

impl From<Control> for DbControl {
    fn from(c: Control) -> Self {
        Self {
            control_code: c.control_code,
            id: c.id,
            name: c.name,
            description: c.description,
            category: c.category,
            criteria_mapping: c.criteria_mapping,
            example_evidence: c.example_evidence,
            is_custom: c.is_custom,
            sort_index: c.sort_index,
            created_at: c.created_at,
        }
    }
}

impl From<DbControl> for Control {
    fn from(c: DbControl) -> Self {
        Self {
            id: c.id,
            control_code: c.control_code,
            name: c.name,
            description: c.description,
            category: c.category,
            criteria_mapping: c.criteria_mapping,
            example_evidence: c.example_evidence,
            is_custom: c.is_custom,
            sort_index: c.sort_index,
            created_at: c.created_at,
        }
    }
}

impl From<ClientControlScope> for DbScope {
    fn from(s: ClientControlScope) -> Self {
        Self {
            client_id: s.client_id,
            control_code: s.control_code,
            scope: s.scope.to_string(),
            reason_out_of_scope: s.reason_out_of_scope,
            updated_at: s.updated_at,
        }
    }
}

impl TryFrom<DbScope> for ClientControlScope {
    type Error = PortalError;

    fn try_from(s: DbScope) -> Result<Self, Self::Error> {
        Ok(Self {
            scope: s.scope.parse().map_err(|e| corrupt("scope", e))?,
            client_id: s.client_id,
            control_code: s.control_code,
            reason_out_of_scope: s.reason_out_of_scope,
            updated_at: s.updated_at,
        })
    }
}

impl TryFrom<EvidenceRecord> for DbEvidence {
    type Error = PortalError;

    fn try_from(e: EvidenceRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            files: serde_json::to_value(&e.files)
                .map_err(|err| PortalError::Internal(err.to_string()))?,
            status: e.status.to_string(),
            client_id: e.client_id,
            control_code: e.control_code,
            reviewer_comment: e.reviewer_comment,
            submitted_at: e.submitted_at,
            updated_at: e.updated_at.unwrap_or_else(Utc::now),
        })
    }
}

impl TryFrom<DbEvidence> for EvidenceRecord {
    type Error = PortalError;

    fn try_from(e: DbEvidence) -> Result<Self, Self::Error> {
        let files: Vec<EvidenceFile> =
            serde_json::from_value(e.files).map_err(|err| corrupt("file list", err.to_string()))?;
        Ok(Self {
            status: e.status.parse().map_err(|err| corrupt("status", err))?,
            files,
            client_id: e.client_id,
            control_code: e.control_code,
            reviewer_comment: e.reviewer_comment,
            submitted_at: e.submitted_at,
            updated_at: Some(e.updated_at),
        })
    }
}

impl From<Comment> for DbComment {
    fn from(c: Comment) -> Self {
        Self {
            id: c.id,
            client_id: c.client_id,
            control_code: c.control_code,
            author_role: c.author_role.to_string(),
            author_email: c.author_email,
            message: c.message,
            created_at: c.created_at,
            read_by_admin: c.read_by_admin,
            read_by_client: c.read_by_client,
        }
    }
}

impl TryFrom<DbComment> for Comment {
    type Error = PortalError;

    fn try_from(c: DbComment) -> Result<Self, Self::Error> {
        Ok(Self {
            author_role: c.author_role.parse().map_err(|e| corrupt("author role", e))?,
            id: c.id,
            client_id: c.client_id,
            control_code: c.control_code,
            author_email: c.author_email,
            message: c.message,
            created_at: c.created_at,
            read_by_admin: c.read_by_admin,
            read_by_client: c.read_by_client,
        })
    }
}

impl From<AccessLink> for DbAccessLink {
    fn from(l: AccessLink) -> Self {
        Self {
            id: l.id,
            token: l.token,
            client_id: l.client_id,
            is_active: l.is_active,
            expires_at: l.expires_at,
            created_at: l.created_at,
        }
    }
}

impl From<DbAccessLink> for AccessLink {
    fn from(l: DbAccessLink) -> Self {
        Self {
            id: l.id,
            token: l.token,
            client_id: l.client_id,
            is_active: l.is_active,
            expires_at: l.expires_at,
            created_at: l.created_at,
        }
    }
}

fn unique_violation(err: DieselError, message: String) -> PortalError {
    match err {
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
            PortalError::Conflict(message)
        }
        other => other.into(),
    }
}

fn upsert_evidence(conn: &mut PgConnection, row: DbEvidence) -> Result<DbEvidence, PortalError> {
    use client_control_evidence::dsl;
    Ok(diesel::insert_into(dsl::client_control_evidence)
        .values(&row)
        .on_conflict((dsl::client_id, dsl::control_code))
        .do_update()
        .set(&row)
        .get_result(conn)?)
}

fn find_evidence_for_update(
    conn: &mut PgConnection,
    client_id: Uuid,
    control_code: &str,
) -> Result<Option<EvidenceRecord>, PortalError> {
    use client_control_evidence::dsl;
    dsl::client_control_evidence
        .find((client_id, control_code))
        .for_update()
        .first::<DbEvidence>(conn)
        .optional()?
        .map(EvidenceRecord::try_from)
        .transpose()
}

pub struct PgPortalStore {
    pool: DbPool,
}

impl PgPortalStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn run<T, F>(&self, f: F) -> Result<T, PortalError>
    where
        T: Send + 'static,
        F: FnOnce(&mut PgConnection) -> Result<T, PortalError> + Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool
                .get()
                .map_err(|e| PortalError::Database(e.to_string()))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| PortalError::Internal(format!("Database task failed: {e}")))?
    }
}

#[async_trait]
impl PortalStore for PgPortalStore {
    async fn seed_framework_controls(&self, rows: Vec<Control>) -> Result<usize, PortalError> {
        let rows: Vec<DbControl> = rows.into_iter().map(DbControl::from).collect();
        self.run(move |conn| {
            Ok(diesel::insert_into(controls::table)
                .values(&rows)
                .on_conflict(controls::control_code)
                .do_nothing()
                .execute(conn)?)
        })
        .await
    }

    async fn list_clients(&self) -> Result<Vec<Client>, PortalError> {
        self.run(|conn| {
            let rows: Vec<DbClient> = clients::table
                .order(clients::created_at.desc())
                .load(conn)?;
            Ok(rows.into_iter().map(Client::from).collect())
        })
        .await
    }

    async fn find_client_by_slug(&self, slug: &str) -> Result<Option<Client>, PortalError> {
        let slug = slug.to_string();
        self.run(move |conn| {
            Ok(clients::table
                .filter(clients::slug.eq(slug))
                .first::<DbClient>(conn)
                .optional()?
                .map(Client::from))
        })
        .await
    }

    async fn find_client_by_id(&self, client_id: Uuid) -> Result<Option<Client>, PortalError> {
        self.run(move |conn| {
            Ok(clients::table
                .find(client_id)
                .first::<DbClient>(conn)
                .optional()?
                .map(Client::from))
        })
        .await
    }

    async fn create_client(
        &self,
        client: Client,
        seeded_scopes: Vec<ClientControlScope>,
    ) -> Result<Client, PortalError> {
        let slug = client.slug.clone();
        let row = DbClient::from(client);
        let scopes: Vec<DbScope> = seeded_scopes.into_iter().map(DbScope::from).collect();
        self.run(move |conn| {
            conn.transaction::<_, PortalError, _>(|conn| {
                let created: DbClient = diesel::insert_into(clients::table)
                    .values(&row)
                    .get_result(conn)
                    .map_err(|e| {
                        unique_violation(e, format!("Client slug '{slug}' already exists"))
                    })?;
                diesel::insert_into(client_control_scopes::table)
                    .values(&scopes)
                    .execute(conn)?;
                Ok(Client::from(created))
            })
        })
        .await
    }

    async fn delete_client(&self, client_id: Uuid) -> Result<(), PortalError> {
        self.run(move |conn| {
            diesel::delete(clients::table.find(client_id)).execute(conn)?;
            Ok(())
        })
        .await
    }

    async fn list_controls(&self) -> Result<Vec<Control>, PortalError> {
        self.run(|conn| {
            let rows: Vec<DbControl> = controls::table
                .order((
                    controls::is_custom.asc(),
                    controls::sort_index.asc(),
                    controls::created_at.asc(),
                    controls::control_code.asc(),
                ))
                .load(conn)?;
            Ok(rows.into_iter().map(Control::from).collect())
        })
        .await
    }

    async fn find_control(&self, control_code: &str) -> Result<Option<Control>, PortalError> {
        let control_code = control_code.to_string();
        self.run(move |conn| {
            Ok(controls::table
                .find(control_code)
                .first::<DbControl>(conn)
                .optional()?
                .map(Control::from))
        })
        .await
    }

    async fn create_custom_control(
        &self,
        control: Control,
        initial_scope: ClientControlScope,
    ) -> Result<Control, PortalError> {
        let code = control.control_code.clone();
        let row = DbControl::from(control);
        let scope = DbScope::from(initial_scope);
        self.run(move |conn| {
            conn.transaction::<_, PortalError, _>(|conn| {
                let created: DbControl = diesel::insert_into(controls::table)
                    .values(&row)
                    .get_result(conn)
                    .map_err(|e| {
                        unique_violation(e, format!("Control code '{code}' already exists"))
                    })?;
                diesel::insert_into(client_control_scopes::table)
                    .values(&scope)
                    .execute(conn)?;
                Ok(Control::from(created))
            })
        })
        .await
    }

    async fn update_control(
        &self,
        control_code: &str,
        changes: ControlChanges,
    ) -> Result<Control, PortalError> {
        let control_code = control_code.to_string();
        self.run(move |conn| {
            let target = controls::table.find(control_code);
            let row: DbControl = if changes.name.is_none() && changes.description.is_none() {
                target.first(conn)?
            } else {
                diesel::update(target)
                    .set(DbControlChanges {
                        name: changes.name,
                        description: changes.description,
                    })
                    .get_result(conn)?
            };
            Ok(Control::from(row))
        })
        .await
    }

    async fn delete_control(&self, control_code: &str) -> Result<(), PortalError> {
        let control_code = control_code.to_string();
        self.run(move |conn| {
            conn.transaction::<_, PortalError, _>(|conn| {
                diesel::delete(
                    client_control_scopes::table
                        .filter(client_control_scopes::control_code.eq(&control_code)),
                )
                .execute(conn)?;
                diesel::delete(
                    client_control_evidence::table
                        .filter(client_control_evidence::control_code.eq(&control_code)),
                )
                .execute(conn)?;
                diesel::delete(
                    control_comments::table
                        .filter(control_comments::control_code.eq(&control_code)),
                )
                .execute(conn)?;
                diesel::delete(controls::table.find(&control_code)).execute(conn)?;
                Ok(())
            })
        })
        .await
    }

    async fn list_scopes(&self, client_id: Uuid) -> Result<Vec<ClientControlScope>, PortalError> {
        self.run(move |conn| {
            let rows: Vec<DbScope> = client_control_scopes::table
                .filter(client_control_scopes::client_id.eq(client_id))
                .load(conn)?;
            rows.into_iter().map(ClientControlScope::try_from).collect()
        })
        .await
    }

    async fn find_scope(
        &self,
        client_id: Uuid,
        control_code: &str,
    ) -> Result<Option<ClientControlScope>, PortalError> {
        let control_code = control_code.to_string();
        self.run(move |conn| {
            client_control_scopes::table
                .find((client_id, control_code))
                .first::<DbScope>(conn)
                .optional()?
                .map(ClientControlScope::try_from)
                .transpose()
        })
        .await
    }

    async fn upsert_scope(
        &self,
        scope: ClientControlScope,
    ) -> Result<ClientControlScope, PortalError> {
        let row = DbScope::from(scope);
        self.run(move |conn| {
            use client_control_scopes::dsl;
            let saved: DbScope = diesel::insert_into(dsl::client_control_scopes)
                .values(&row)
                .on_conflict((dsl::client_id, dsl::control_code))
                .do_update()
                .set(&row)
                .get_result(conn)?;
            ClientControlScope::try_from(saved)
        })
        .await
    }

    async fn list_evidence(&self, client_id: Uuid) -> Result<Vec<EvidenceRecord>, PortalError> {
        self.run(move |conn| {
            let rows: Vec<DbEvidence> = client_control_evidence::table
                .filter(client_control_evidence::client_id.eq(client_id))
                .load(conn)?;
            rows.into_iter().map(EvidenceRecord::try_from).collect()
        })
        .await
    }

    async fn find_evidence(
        &self,
        client_id: Uuid,
        control_code: &str,
    ) -> Result<Option<EvidenceRecord>, PortalError> {
        let control_code = control_code.to_string();
        self.run(move |conn| {
            client_control_evidence::table
                .find((client_id, control_code))
                .first::<DbEvidence>(conn)
                .optional()?
                .map(EvidenceRecord::try_from)
                .transpose()
        })
        .await
    }

    async fn record_submission(
        &self,
        submission: EvidenceSubmission,
    ) -> Result<EvidenceRecord, PortalError> {
        self.run(move |conn| {
            conn.transaction::<_, PortalError, _>(|conn| {
                let existing =
                    find_evidence_for_update(conn, submission.client_id, &submission.control_code)?;
                let record = merge_submission(existing, submission);
                let saved = upsert_evidence(conn, DbEvidence::try_from(record)?)?;
                EvidenceRecord::try_from(saved)
            })
        })
        .await
    }

    async fn record_review(&self, review: EvidenceReview) -> Result<EvidenceRecord, PortalError> {
        self.run(move |conn| {
            conn.transaction::<_, PortalError, _>(|conn| {
                let existing =
                    find_evidence_for_update(conn, review.client_id, &review.control_code)?;
                let record = merge_review(existing, review);
                let saved = upsert_evidence(conn, DbEvidence::try_from(record)?)?;
                EvidenceRecord::try_from(saved)
            })
        })
        .await
    }

    async fn insert_comment(&self, comment: Comment) -> Result<Comment, PortalError> {
        let row = DbComment::from(comment);
        self.run(move |conn| {
            let saved: DbComment = diesel::insert_into(control_comments::table)
                .values(&row)
                .get_result(conn)?;
            Comment::try_from(saved)
        })
        .await
    }

    async fn list_comments(
        &self,
        client_id: Uuid,
        control_code: &str,
    ) -> Result<Vec<Comment>, PortalError> {
        let control_code = control_code.to_string();
        self.run(move |conn| {
            let rows: Vec<DbComment> = control_comments::table
                .filter(control_comments::client_id.eq(client_id))
                .filter(control_comments::control_code.eq(control_code))
                .order((control_comments::created_at.asc(), control_comments::id.asc()))
                .load(conn)?;
            rows.into_iter().map(Comment::try_from).collect()
        })
        .await
    }

    async fn replace_access_link(&self, link: AccessLink) -> Result<AccessLink, PortalError> {
        let row = DbAccessLink::from(link);
        self.run(move |conn| {
            conn.transaction::<_, PortalError, _>(|conn| {
                diesel::update(
                    client_access_links::table
                        .filter(client_access_links::client_id.eq(row.client_id)),
                )
                .set(client_access_links::is_active.eq(false))
                .execute(conn)?;
                let saved: DbAccessLink = diesel::insert_into(client_access_links::table)
                    .values(&row)
                    .get_result(conn)?;
                Ok(AccessLink::from(saved))
            })
        })
        .await
    }

    async fn find_access_link(&self, token: &str) -> Result<Option<AccessLink>, PortalError> {
        let token = token.to_string();
        self.run(move |conn| {
            Ok(client_access_links::table
                .filter(client_access_links::token.eq(token))
                .first::<DbAccessLink>(conn)
                .optional()?
                .map(AccessLink::from))
        })
        .await
    }

    async fn find_access_link_by_id(
        &self,
        link_id: Uuid,
    ) -> Result<Option<AccessLink>, PortalError> {
        self.run(move |conn| {
            Ok(client_access_links::table
                .find(link_id)
                .first::<DbAccessLink>(conn)
                .optional()?
                .map(AccessLink::from))
        })
        .await
    }

    async fn revoke_access_links(&self, client_id: Uuid) -> Result<usize, PortalError> {
        self.run(move |conn| {
            Ok(diesel::update(
                client_access_links::table
                    .filter(client_access_links::client_id.eq(client_id))
                    .filter(client_access_links::is_active.eq(true)),
            )
            .set(client_access_links::is_active.eq(false))
            .execute(conn)?)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::portal::types::{AuthorRole, EvidenceStatus, ScopeValue};

    #[test]
    fn test_evidence_row_round_trip() {
        let record = EvidenceRecord {
            client_id: Uuid::new_v4(),
            control_code: "DCF-4".to_string(),
            status: EvidenceStatus::NeedsClarification,
            files: vec![EvidenceFile {
                storage_path: "a/DCF-4/1-0-x.pdf".to_string(),
                display_name: "x.pdf".to_string(),
            }],
            reviewer_comment: Some("Missing page 2".to_string()),
            submitted_at: Some(Utc::now()),
            updated_at: Some(Utc::now()),
        };
        let row = DbEvidence::try_from(record.clone()).unwrap();
        assert_eq!(row.status, "needs-clarification");
        assert_eq!(row.files[0]["storagePath"], "a/DCF-4/1-0-x.pdf");
        assert_eq!(EvidenceRecord::try_from(row).unwrap(), record);
    }

    #[test]
    fn test_corrupt_rows_are_database_errors() {
        let scope = DbScope {
            client_id: Uuid::new_v4(),
            control_code: "DCF-4".to_string(),
            scope: "sometimes".to_string(),
            reason_out_of_scope: None,
            updated_at: Utc::now(),
        };
        assert!(matches!(
            ClientControlScope::try_from(scope).unwrap_err(),
            PortalError::Database(_)
        ));

        let comment = DbComment {
            id: Uuid::new_v4(),
            client_id: Uuid::new_v4(),
            control_code: "DCF-4".to_string(),
            author_role: "robot".to_string(),
            author_email: None,
            message: "hi".to_string(),
            created_at: Utc::now(),
            read_by_admin: false,
            read_by_client: true,
        };
        assert!(Comment::try_from(comment).is_err());
    }

    #[test]
    fn test_scope_and_comment_rows_use_wire_names() {
        let row = DbScope::from(ClientControlScope {
            client_id: Uuid::nil(),
            control_code: "DCF-4".to_string(),
            scope: ScopeValue::OutOfScope,
            reason_out_of_scope: Some("Not applicable".to_string()),
            updated_at: Utc::now(),
        });
        assert_eq!(row.scope, "out-of-scope");

        let row = DbComment::from(Comment {
            id: Uuid::nil(),
            client_id: Uuid::nil(),
            control_code: "DCF-4".to_string(),
            author_role: AuthorRole::Client,
            author_email: None,
            message: "Uploaded".to_string(),
            created_at: Utc::now(),
            read_by_admin: false,
            read_by_client: true,
        });
        assert_eq!(row.author_role, "client");
    }
}
