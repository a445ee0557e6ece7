// Kept in sync by hand with the DDL in store/sqlite.rs.

diesel::table! {
    indices (name) {
        name -> Text,
        created_at -> Text,
    }
}

diesel::table! {
    postings (id) {
        id -> Text,
        index_name -> Text,
        title -> Text,
        company -> Text,
        location -> Text,
        posted_date -> Nullable<Text>,
        job_url -> Text,
        description -> Nullable<Text>,
        language -> Nullable<Text>,
        filtered -> Bool,
        interest -> Bool,
        applied -> Bool,
        interview -> Bool,
        rejected -> Bool,
        hidden -> Bool,
        created_at -> Text,
    }
}

diesel::allow_tables_to_appear_in_same_query!(indices, postings);
