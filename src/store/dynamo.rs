use aws_sdk_dynamodb::Client;
use aws_sdk_dynamodb::error::ProvideErrorMetadata;
use aws_sdk_dynamodb::operation::create_table::CreateTableError;
use aws_sdk_dynamodb::types::{
    AttributeDefinition, AttributeValue, DeleteRequest, KeySchemaElement, KeyType,
    ProvisionedThroughput, PutRequest, ReturnValue, ScalarAttributeType, Select, WriteRequest,
};
use aws_smithy_types_convert::stream::PaginationStreamExt;
use futures_util::TryStreamExt;
use std::collections::HashMap;
use tracing::{debug, warn};

use super::{BATCH_WRITE_SIZE, BatchResult, ItemUpdate, ScanPage, TableStore, WriteOp};
use crate::error::Error;
use crate::record::{KeyRole, KeySchema, Record, describe_key};

/// [`TableStore`] backed by the DynamoDB SDK client
#[derive(Clone, Debug)]
pub struct DynamoStore {
    client: Client,
}

impl DynamoStore {
    /// Wrap an existing client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// The underlying SDK client
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Create `table` with string key attributes if it does not exist yet
    ///
    /// Used to prepare tables on local endpoints; an existing table is left untouched.
    pub async fn create_table(&self, table: &str, schema: &KeySchema) -> Result<(), Error> {
        let mut builder = self
            .client
            .create_table()
            .table_name(table)
            .provisioned_throughput(
                ProvisionedThroughput::builder()
                    .read_capacity_units(10)
                    .write_capacity_units(10)
                    .build()?,
            );

        for (name, role) in schema.attributes() {
            let key_type = match role {
                KeyRole::Partition => KeyType::Hash,
                KeyRole::Sort => KeyType::Range,
            };
            builder = builder
                .key_schema(
                    KeySchemaElement::builder()
                        .attribute_name(name)
                        .key_type(key_type)
                        .build()?,
                )
                .attribute_definitions(
                    AttributeDefinition::builder()
                        .attribute_name(name)
                        .attribute_type(ScalarAttributeType::S)
                        .build()?,
                );
        }

        // Ignore ResourceInUseException - table already exists
        match builder.send().await {
            Ok(_) => Ok(()),
            Err(e) => {
                if let Some(CreateTableError::ResourceInUseException(_)) = e.as_service_error() {
                    return Ok(());
                }
                Err(Error::from_sdk(e, table))
            }
        }
    }
}

/// Build the `UpdateItem` expression, names and values for `update`
fn update_expression(
    update: &ItemUpdate,
) -> (
    String,
    HashMap<String, String>,
    HashMap<String, AttributeValue>,
) {
    let mut names = HashMap::new();
    let mut values = HashMap::new();
    let mut set_clauses = Vec::with_capacity(update.set.len());
    let mut remove_clauses = Vec::with_capacity(update.remove.len());

    let mut attributes: Vec<(&String, &AttributeValue)> = update.set.iter().collect();
    attributes.sort_by(|a, b| a.0.cmp(b.0));

    for (index, (name, value)) in attributes.into_iter().enumerate() {
        let placeholder = format!("#s{index}");
        let val = format!(":v{index}");
        set_clauses.push(format!("{placeholder} = {val}"));
        let _ = names.insert(placeholder, name.clone());
        let _ = values.insert(val, value.clone());
    }

    for (index, name) in update.remove.iter().enumerate() {
        let placeholder = format!("#r{index}");
        remove_clauses.push(placeholder.clone());
        let _ = names.insert(placeholder, name.clone());
    }

    let mut expression = String::new();
    if !set_clauses.is_empty() {
        expression.push_str(&format!("SET {}", set_clauses.join(", ")));
    }
    if !remove_clauses.is_empty() {
        if !expression.is_empty() {
            expression.push(' ');
        }
        expression.push_str(&format!("REMOVE {}", remove_clauses.join(", ")));
    }

    (expression, names, values)
}

/// Condition that holds only when the item addressed by `key` exists
fn existence_condition(key: &Record, names: &mut HashMap<String, String>) -> Option<String> {
    let name = key.keys().min()?;
    let _ = names.insert("#k0".to_string(), name.clone());
    Some("attribute_exists(#k0)".to_string())
}

impl TableStore for DynamoStore {
    async fn scan_page(
        &self,
        table: &str,
        start: Option<Record>,
        limit: Option<usize>,
    ) -> Result<ScanPage, Error> {
        let output = self
            .client
            .scan()
            .table_name(table)
            // Scans operate on the base table, so requesting all attributes is always valid.
            .select(Select::AllAttributes)
            .set_exclusive_start_key(start)
            .set_limit(limit.map(|l| l.min(i32::MAX as usize) as i32))
            .send()
            .await
            .map_err(|e| Error::from_sdk(e, table))?;

        Ok(ScanPage {
            items: output.items.unwrap_or_default(),
            last_evaluated_key: output.last_evaluated_key.filter(|key| !key.is_empty()),
        })
    }

    async fn count_items(&self, table: &str) -> Result<usize, Error> {
        self.client
            .scan()
            .table_name(table)
            .select(Select::Count)
            .into_paginator()
            .send()
            .into_stream_03x()
            .map_err(|e| Error::from_sdk(e, table))
            .try_fold(0usize, |total, page| async move {
                Ok::<_, Error>(total + page.count.max(0) as usize)
            })
            .await
    }

    async fn batch_write(
        &self,
        table: &str,
        op: WriteOp,
        records: &[Record],
    ) -> Result<BatchResult, Error> {
        if records.is_empty() {
            return Ok(BatchResult::ok());
        }
        debug_assert!(
            records.len() <= BATCH_WRITE_SIZE,
            "batch of {} exceeds the BatchWriteItem limit",
            records.len()
        );

        let mut write_ops: Vec<WriteRequest> = Vec::with_capacity(records.len());
        for record in records {
            let request = match op {
                WriteOp::Put => WriteRequest::builder()
                    .set_put_request(Some(
                        PutRequest::builder().set_item(Some(record.clone())).build()?,
                    ))
                    .build(),
                WriteOp::Delete => WriteRequest::builder()
                    .set_delete_request(Some(
                        DeleteRequest::builder()
                            .set_key(Some(record.clone()))
                            .build()?,
                    ))
                    .build(),
            };
            write_ops.push(request);
        }

        let output = self
            .client
            .batch_write_item()
            .request_items(table, write_ops)
            .send()
            .await
            .map_err(|e| {
                let code = e.as_service_error().and_then(|s| s.code());
                match code {
                    Some("ValidationException" | "ItemCollectionSizeLimitExceededException") => {
                        let message = e
                            .as_service_error()
                            .and_then(|s| s.message())
                            .unwrap_or("validation failed")
                            .to_string();
                        Error::BatchRejected {
                            table: table.to_string(),
                            message,
                        }
                    }
                    _ => Error::from_sdk(e, table),
                }
            })?;

        let mut result = BatchResult::ok();
        if let Some(unprocessed_items) = output.unprocessed_items {
            for items in unprocessed_items.into_values() {
                for item in items {
                    if let Some(put_request) = item.put_request {
                        result.failed.push(put_request.item);
                    }

                    if let Some(delete_request) = item.delete_request {
                        result.failed.push(delete_request.key);
                    }
                }
            }
        }

        if !result.failed.is_empty() {
            warn!(
                table,
                unprocessed = result.failed.len(),
                submitted = records.len(),
                "batch write left items unprocessed"
            );
        }

        Ok(result)
    }

    async fn get_item(&self, table: &str, key: Record) -> Result<Option<Record>, Error> {
        let result = self
            .client
            .get_item()
            .table_name(table)
            .set_key(Some(key))
            .send()
            .await
            .map_err(|e| Error::from_sdk(e, table))?;

        Ok(result.item)
    }

    async fn put_item(&self, table: &str, item: Record) -> Result<(), Error> {
        let _ = self
            .client
            .put_item()
            .table_name(table)
            .return_values(ReturnValue::None)
            .set_item(Some(item))
            .send()
            .await
            .map_err(|e| Error::from_sdk(e, table))?;
        Ok(())
    }

    async fn update_item(
        &self,
        table: &str,
        key: Record,
        update: ItemUpdate,
    ) -> Result<Record, Error> {
        let (expression, mut names, values) = update_expression(&update);
        let condition = existence_condition(&key, &mut names);
        let rendered = describe_key(&key);
        debug!(table, key = %rendered, expression = %expression, "updating item");

        let result = self
            .client
            .update_item()
            .table_name(table)
            .set_key(Some(key))
            .update_expression(expression)
            .set_condition_expression(condition)
            .set_expression_attribute_names(Some(names))
            .set_expression_attribute_values((!values.is_empty()).then_some(values))
            .return_values(ReturnValue::UpdatedNew)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error()
                    .is_some_and(|se| se.is_conditional_check_failed_exception())
                {
                    Error::ItemNotFound {
                        table: table.to_string(),
                        key: rendered,
                    }
                } else {
                    Error::from_sdk(e, table)
                }
            })?;

        Ok(result.attributes.unwrap_or_default())
    }

    async fn delete_item(&self, table: &str, key: Record) -> Result<Option<Record>, Error> {
        let result = self
            .client
            .delete_item()
            .table_name(table)
            .set_key(Some(key))
            .return_values(ReturnValue::AllOld)
            .send()
            .await
            .map_err(|e| Error::from_sdk(e, table))?;

        Ok(result.attributes)
    }

    async fn describe_key_schema(&self, table: &str) -> Result<KeySchema, Error> {
        let output = self
            .client
            .describe_table()
            .table_name(table)
            .send()
            .await
            .map_err(|e| Error::from_sdk(e, table))?;

        let description = output
            .table()
            .ok_or_else(|| Error::TableNotFound(table.to_string()))?;

        KeySchema::from_elements(description.key_schema())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_expression_set_and_remove() {
        let mut update = ItemUpdate::default();
        let _ = update
            .set
            .insert("status".to_string(), AttributeValue::S("done".into()));
        let _ = update
            .set
            .insert("count".to_string(), AttributeValue::N("2".into()));
        update.remove.push("legacy".to_string());

        let (expression, names, values) = update_expression(&update);
        assert_eq!(expression, "SET #s0 = :v0, #s1 = :v1 REMOVE #r0");
        assert_eq!(names["#s0"], "count");
        assert_eq!(names["#s1"], "status");
        assert_eq!(names["#r0"], "legacy");
        assert_eq!(values[":v1"], AttributeValue::S("done".into()));
    }

    #[test]
    fn test_existence_condition_names_a_key_attribute() {
        let key = Record::from([
            ("game".to_string(), AttributeValue::S("chess".into())),
            ("age".to_string(), AttributeValue::N("7".into())),
        ]);
        let mut update = ItemUpdate::default();
        let _ = update
            .set
            .insert("ux".to_string(), AttributeValue::S("x".into()));
        let (_, mut names, _) = update_expression(&update);

        let condition = existence_condition(&key, &mut names);

        assert_eq!(condition.as_deref(), Some("attribute_exists(#k0)"));
        assert_eq!(names["#k0"], "age");
        assert_eq!(names["#s0"], "ux");
        assert!(existence_condition(&Record::new(), &mut names).is_none());
    }

    #[test]
    fn test_update_expression_remove_only() {
        let update = ItemUpdate {
            set: Record::new(),
            remove: vec!["a".to_string(), "b".to_string()],
        };
        let (expression, names, values) = update_expression(&update);
        assert_eq!(expression, "REMOVE #r0, #r1");
        assert_eq!(names.len(), 2);
        assert!(values.is_empty());
    }
}
