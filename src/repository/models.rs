//! Diesel row types.

use diesel::prelude::*;

use crate::schema;

#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = schema::nfse_documents)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct DocumentRecord {
    pub id: i32,
    pub document_key: String,
    pub structured: Option<String>,
    pub rendered: Option<Vec<u8>>,
    pub origin: String,
    pub status: i32,
    pub created_at: String,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = schema::nfse_documents)]
pub struct NewDocument<'a> {
    pub document_key: &'a str,
    pub structured: Option<&'a str>,
    pub rendered: Option<&'a [u8]>,
    pub origin: &'a str,
    pub status: i32,
    pub created_at: &'a str,
}

#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = schema::store_credentials)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct CredentialRecord {
    pub store_id: i64,
    pub login: String,
    pub password: String,
    pub status: String,
    pub updated_at: String,
}

#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = schema::certificates)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct CertificateRecord {
    pub id: i32,
    pub file_name: String,
    pub info: String,
    pub status: String,
    pub created_at: String,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = schema::certificates)]
pub struct NewCertificate<'a> {
    pub file_name: &'a str,
    pub info: &'a str,
    pub status: &'a str,
    pub content: &'a [u8],
    pub created_at: &'a str,
}

#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = schema::processing_log)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct LogRecord {
    pub id: i32,
    pub level: String,
    pub origin: String,
    pub message: String,
    pub document_key: Option<String>,
    pub actor: String,
    pub created_at: String,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = schema::processing_log)]
pub struct NewLogEntry<'a> {
    pub level: &'a str,
    pub origin: &'a str,
    pub message: &'a str,
    pub document_key: Option<&'a str>,
    pub actor: &'a str,
    pub created_at: &'a str,
}
