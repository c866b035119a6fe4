use diesel::prelude::*;

use super::schema::registry_kv;

#[derive(Queryable, Debug)]
pub struct Entry {
    pub key: String,
    pub value: String,
    pub revision: i64,
    pub writer: Option<uuid::Uuid>,
}

#[derive(Insertable)]
#[diesel(table_name = registry_kv)]
pub struct NewEntry<'a> {
    pub key: &'a str,
    pub value: &'a str,
    pub revision: i64,
    pub writer: Option<uuid::Uuid>,
}
