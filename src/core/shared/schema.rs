diesel::table! {
    clients (id) {
        id -> Uuid,
        name -> Text,
        slug -> Text,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    controls (control_code) {
        control_code -> Text,
        id -> Uuid,
        name -> Text,
        description -> Text,
        category -> Text,
        criteria_mapping -> Nullable<Text>,
        example_evidence -> Nullable<Text>,
        is_custom -> Bool,
        sort_index -> Int4,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    client_control_scopes (client_id, control_code) {
        client_id -> Uuid,
        control_code -> Text,
        scope -> Text,
        reason_out_of_scope -> Nullable<Text>,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    client_control_evidence (client_id, control_code) {
        client_id -> Uuid,
        control_code -> Text,
        status -> Text,
        files -> Jsonb,
        reviewer_comment -> Nullable<Text>,
        submitted_at -> Nullable<Timestamptz>,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    control_comments (id) {
        id -> Uuid,
        client_id -> Uuid,
        control_code -> Text,
        author_role -> Text,
        author_email -> Nullable<Text>,
        message -> Text,
        created_at -> Timestamptz,
        read_by_admin -> Bool,
        read_by_client -> Bool,
    }
}

diesel::table! {
    client_access_links (id) {
        id -> Uuid,
        token -> Text,
        client_id -> Uuid,
        is_active -> Bool,
        expires_at -> Nullable<Timestamptz>,
        created_at -> Timestamptz,
    }
}

diesel::joinable!(client_control_scopes -> clients (client_id));
diesel::joinable!(client_control_scopes -> controls (control_code));
diesel::joinable!(client_control_evidence -> clients (client_id));
diesel::joinable!(client_control_evidence -> controls (control_code));
diesel::joinable!(control_comments -> clients (client_id));
diesel::joinable!(control_comments -> controls (control_code));
diesel::joinable!(client_access_links -> clients (client_id));

diesel::allow_tables_to_appear_in_same_query!(
    clients,
    controls,
    client_control_scopes,
    client_control_evidence,
    control_comments,
    client_access_links,
);
