// Diesel table definitions. Kept in sync with repository::migrations.

diesel::table! {
    nfse_documents (id) {
        id -> Integer,
        document_key -> Text,
        structured -> Nullable<Text>,
        rendered -> Nullable<Binary>,
        origin -> Text,
        status -> Integer,
        created_at -> Text,
    }
}

diesel::table! {
    store_credentials (store_id) {
        store_id -> BigInt,
        login -> Text,
        password -> Text,
        status -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    certificates (id) {
        id -> Integer,
        file_name -> Text,
        info -> Text,
        status -> Text,
        content -> Binary,
        created_at -> Text,
    }
}

diesel::table! {
    processing_log (id) {
        id -> Integer,
        level -> Text,
        origin -> Text,
        message -> Text,
        document_key -> Nullable<Text>,
        actor -> Text,
        created_at -> Text,
    }
}
