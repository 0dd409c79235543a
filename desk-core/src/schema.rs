use diesel::{allow_tables_to_appear_in_same_query, table};

table! {
    users (id) {
        id -> Uuid,
        name -> Text,
        email -> Text,
        phone -> Nullable<Text>,
        avatar_url -> Nullable<Text>,
        role -> Text,
        store_id -> Nullable<Uuid>,
        created_at -> Timestamptz,
    }
}

table! {
    stores (id) {
        id -> Uuid,
        name -> Text,
        created_at -> Timestamptz,
    }
}

table! {
    notifications (id) {
        id -> BigInt,
        user_id -> Uuid,
        store_id -> Nullable<Uuid>,
        kind -> Text,
        title -> Text,
        body -> Text,
        data -> Nullable<Jsonb>,
        read_at -> Nullable<Timestamptz>,
        created_at -> Timestamptz,
    }
}

table! {
    tickets (id) {
        id -> Uuid,
        store_id -> Uuid,
        customer_id -> Uuid,
        subject -> Text,
        status -> Text,
        acknowledged_at -> Nullable<Timestamptz>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

table! {
    call_logs (id) {
        id -> BigInt,
        store_id -> Uuid,
        caller_number -> Text,
        outcome -> Text,
        created_at -> Timestamptz,
    }
}

allow_tables_to_appear_in_same_query!(users, stores, notifications, tickets, call_logs);
