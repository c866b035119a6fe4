use diesel::prelude::*;
use uuid::Uuid;

use super::models::{Entry, NewEntry};
use super::schema::registry_kv::dsl;
use super::DbConnection;

pub fn find_entry(key: &str, conn: &mut DbConnection) -> Result<Option<Entry>, anyhow::Error> {
    let entry = dsl::registry_kv
        .find(key)
        .first::<Entry>(conn)
        .optional()?;
    Ok(entry)
}

/// Unconditionally overwrites `key` and returns its new revision.
pub fn write_value(
    key: &str,
    value: &str,
    writer: Option<Uuid>,
    conn: &mut DbConnection,
) -> Result<i64, anyhow::Error> {
    let new_entry = NewEntry {
        key,
        value,
        revision: 1,
        writer,
    };
    let revision = diesel::insert_into(dsl::registry_kv)
        .values(&new_entry)
        .on_conflict(dsl::key)
        .do_update()
        .set((
            dsl::value.eq(value),
            dsl::revision.eq(dsl::revision + 1),
            dsl::writer.eq(writer),
        ))
        .returning(dsl::revision)
        .get_result::<i64>(conn)?;
    Ok(revision)
}

/// Writes `value` only if `key` still holds `expected`, `None` meaning absent.
/// Returns whether the write happened.
pub fn compare_and_swap(
    key: &str,
    expected: Option<&str>,
    value: &str,
    conn: &mut DbConnection,
) -> Result<bool, anyhow::Error> {
    let written = match expected {
        None => diesel::insert_into(dsl::registry_kv)
            .values(&NewEntry {
                key,
                value,
                revision: 1,
                writer: None,
            })
            .on_conflict_do_nothing()
            .execute(conn)?,
        Some(expected) => diesel::update(
            dsl::registry_kv
                .filter(dsl::key.eq(key))
                .filter(dsl::value.eq(expected)),
        )
        .set((
            dsl::value.eq(value),
            dsl::revision.eq(dsl::revision + 1),
        ))
        .execute(conn)?,
    };
    Ok(written == 1)
}

pub fn delete_entries(keys: &[&str], conn: &mut DbConnection) -> Result<usize, anyhow::Error> {
    let deleted = diesel::delete(dsl::registry_kv.filter(dsl::key.eq_any(keys.iter().copied())))
        .execute(conn)?;
    Ok(deleted)
}
