use aws_sdk_dynamodb::types::AttributeValue;
use tracing::{debug, info};

use crate::error::Error;
use crate::record::{KeySchema, Record, describe_key, render_scalar};
use crate::store::{ItemUpdate, TableStore};

/// Fail unless `key` holds exactly the key attributes of `schema`
fn validate_key(schema: &KeySchema, key: &Record) -> Result<(), Error> {
    let missing = schema.missing_in(key);
    if !missing.is_empty() {
        return Err(Error::SchemaMismatch(format!(
            "key is missing attribute(s) {}; table key is {}",
            missing.join(", "),
            schema
        )));
    }
    if let Some(extra) = key.keys().find(|name| !schema.contains(name)) {
        return Err(Error::SchemaMismatch(format!(
            "'{extra}' is not a key attribute; table key is {schema}"
        )));
    }
    Ok(())
}

fn not_found(table: &str, key: &Record) -> Error {
    Error::ItemNotFound {
        table: table.to_string(),
        key: describe_key(key),
    }
}

/// Get the item with primary key `key`
pub async fn get_item<S: TableStore>(store: &S, table: &str, key: Record) -> Result<Record, Error> {
    let schema = store.describe_key_schema(table).await?;
    validate_key(&schema, &key)?;

    let rendered = describe_key(&key);
    store
        .get_item(table, key)
        .await?
        .ok_or_else(|| Error::ItemNotFound {
            table: table.to_string(),
            key: rendered,
        })
}

/// Insert or replace `item`
pub async fn put_item<S: TableStore>(store: &S, table: &str, item: Record) -> Result<(), Error> {
    let schema = store.describe_key_schema(table).await?;
    let missing = schema.missing_in(&item);
    if !missing.is_empty() {
        return Err(Error::MalformedInput(format!(
            "item is missing key attribute(s) {}",
            missing.join(", ")
        )));
    }

    debug!(table, key = %describe_key(&schema.key_of(&item)?), "putting item");
    store.put_item(table, item).await
}

/// Apply `update` to the item with primary key `key`, returning the updated attributes
///
/// The item must exist; key attributes cannot be updated.
pub async fn update_item<S: TableStore>(
    store: &S,
    table: &str,
    key: Record,
    update: ItemUpdate,
) -> Result<Record, Error> {
    if update.is_empty() {
        return Err(Error::InvalidValue("update changes nothing".to_string()));
    }
    let schema = store.describe_key_schema(table).await?;
    validate_key(&schema, &key)?;
    for name in update.set.keys().chain(update.remove.iter()) {
        schema.ensure_not_key(name)?;
    }

    store.update_item(table, key, update).await
}

/// Delete the item with primary key `key`, returning its previous attributes
pub async fn delete_item<S: TableStore>(
    store: &S,
    table: &str,
    key: Record,
) -> Result<Record, Error> {
    let schema = store.describe_key_schema(table).await?;
    validate_key(&schema, &key)?;

    let rendered = describe_key(&key);
    store
        .delete_item(table, key)
        .await?
        .ok_or_else(|| Error::ItemNotFound {
            table: table.to_string(),
            key: rendered,
        })
}

/// Set one attribute of an item addressed by its partition key
#[derive(Clone, Debug)]
pub struct ValueUpdate {
    /// Partition key name; must match the table's
    pub key_name: String,
    /// Partition key value
    pub key_value: AttributeValue,
    /// Attribute to set
    pub attribute: String,
    /// Current value the attribute must have, compared as text
    pub expected: Option<String>,
    /// New value
    pub value: AttributeValue,
}

/// Set `update.attribute` to `update.value` on a single item
///
/// Only tables keyed by a partition key alone are supported. When `expected` is given and
/// the item currently holds a different value for the attribute, nothing is written.
pub async fn set_value<S: TableStore>(
    store: &S,
    table: &str,
    update: ValueUpdate,
) -> Result<Record, Error> {
    let schema = store.describe_key_schema(table).await?;
    schema.ensure_partition(&update.key_name)?;
    if let Some(sort) = schema.sort_key() {
        return Err(Error::SchemaMismatch(format!(
            "table '{table}' also has sort key '{sort}'; use update with a full key"
        )));
    }
    schema.ensure_not_key(&update.attribute)?;

    let key = Record::from([(update.key_name.clone(), update.key_value.clone())]);
    let item = store
        .get_item(table, key.clone())
        .await?
        .ok_or_else(|| not_found(table, &key))?;

    if let (Some(expected), Some(current)) = (&update.expected, item.get(&update.attribute)) {
        let current = render_scalar(current);
        if &current != expected {
            return Err(Error::SchemaMismatch(format!(
                "'{}' of item {} is '{}', expected '{}'",
                update.attribute,
                describe_key(&key),
                current,
                expected
            )));
        }
    }

    let changes = ItemUpdate {
        set: Record::from([(update.attribute.clone(), update.value)]),
        remove: Vec::new(),
    };
    let updated = store.update_item(table, key.clone(), changes).await?;
    info!(table, key = %describe_key(&key), attribute = %update.attribute, "value updated");
    Ok(updated)
}
