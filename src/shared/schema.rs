diesel::table! {
    incidents (id) {
        id -> Uuid,
        team_id -> Uuid,
        title -> Varchar,
        description -> Nullable<Text>,
        status -> Varchar,
        priority -> Varchar,
        assigned_to -> Nullable<Uuid>,
        assigned_at -> Nullable<Timestamptz>,
        resolved_at -> Nullable<Timestamptz>,
        closed_at -> Nullable<Timestamptz>,
        metadata -> Jsonb,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    change_requests (id) {
        id -> Uuid,
        team_id -> Uuid,
        title -> Varchar,
        description -> Nullable<Text>,
        status -> Varchar,
        priority -> Varchar,
        assigned_to -> Nullable<Uuid>,
        assigned_at -> Nullable<Timestamptz>,
        implemented_at -> Nullable<Timestamptz>,
        metadata -> Jsonb,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    service_requests (id) {
        id -> Uuid,
        team_id -> Uuid,
        title -> Varchar,
        description -> Nullable<Text>,
        status -> Varchar,
        priority -> Varchar,
        assigned_to -> Nullable<Uuid>,
        assigned_at -> Nullable<Timestamptz>,
        completed_at -> Nullable<Timestamptz>,
        metadata -> Jsonb,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    sla_policies (id) {
        id -> Uuid,
        name -> Varchar,
        client_type -> Varchar,
        priority -> Varchar,
        response_time_hours -> Int4,
        resolution_time_hours -> Int4,
        escalation_time_hours -> Int4,
        is_active -> Bool,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    teams (id) {
        id -> Uuid,
        org_id -> Uuid,
        name -> Varchar,
        client_type -> Varchar,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::allow_tables_to_appear_in_same_query!(
    incidents,
    change_requests,
    service_requests,
    sla_policies,
    teams,
);
