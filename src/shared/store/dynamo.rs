use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_dynamodb::config::timeout::TimeoutConfig;
use aws_sdk_dynamodb::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_dynamodb::error::SdkError;
use aws_sdk_dynamodb::types::{
    AttributeDefinition, AttributeValue, BillingMode, DeleteRequest, KeySchemaElement, KeyType,
    Put, PutRequest, ScalarAttributeType, TableStatus, TransactWriteItem, WriteRequest,
};
use aws_sdk_dynamodb::Client as DynamoDbClient;
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::Serialize;
use tracing::{debug, info};

use crate::aggregation::SnapshotAccumulator;
use crate::config::{Settings, MAX_BATCH_SIZE};
use crate::domain::{AggregateSnapshot, Device, DeviceFilter, Reading};
use crate::error::StoreError;
use crate::store::{validate_batch, with_timeout, DeviceRegistry, FleetAdmin, ReadingStore};

/// BatchWriteItem accepts at most 25 requests per call
const BATCH_WRITE_LIMIT: usize = 25;
const MAX_UNPROCESSED_RETRIES: usize = 5;
const UNPROCESSED_RETRY_DELAY: Duration = Duration::from_millis(100);
const TABLE_READY_POLLS: usize = 30;
const TABLE_READY_INTERVAL: Duration = Duration::from_millis(500);
const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_millis(5000);
/// Per-device Queries in flight during one aggregation
const AGGREGATE_CONCURRENCY: usize = 8;

/// DynamoDB-backed store
///
/// Tables:
/// * devices: partition key `device_id`
/// * readings: partition key `device_id`, sort key `ts_reading`
///   ("{timestamp_ms:013}#{reading_id}")
#[derive(Debug, Clone)]
pub struct DynamoStore {
    client: DynamoDbClient,
    devices_table: String,
    readings_table: String,
    call_timeout: Duration,
}

/// Item layout of the readings table
#[derive(Debug, Serialize)]
struct ReadingItem<'a> {
    device_id: &'a str,
    ts_reading: String,
    reading_id: &'a str,
    timestamp_ms: i64,
    value: f64,
    kind: &'a str,
}

impl<'a> From<&'a Reading> for ReadingItem<'a> {
    fn from(reading: &'a Reading) -> Self {
        Self {
            device_id: &reading.device_id,
            ts_reading: reading.sort_key(),
            reading_id: &reading.reading_id,
            timestamp_ms: reading.timestamp_ms,
            value: reading.value,
            kind: &reading.kind,
        }
    }
}

impl DynamoStore {
    pub fn new(
        client: DynamoDbClient,
        devices_table: impl Into<String>,
        readings_table: impl Into<String>,
    ) -> Self {
        Self {
            client,
            devices_table: devices_table.into(),
            readings_table: readings_table.into(),
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    /// Bound each Query page of an aggregation by `limit`
    pub fn with_call_timeout(mut self, limit: Duration) -> Self {
        self.call_timeout = limit;
        self
    }

    /// Build a client from Settings
    ///
    /// With `store_endpoint` set (DynamoDB Local) static credentials are used;
    /// otherwise the default AWS provider chain resolves region and
    /// credentials. Every operation is bounded by `store_timeout`.
    pub async fn connect(settings: &Settings) -> Self {
        let timeout_config = TimeoutConfig::builder()
            .operation_timeout(settings.store_timeout)
            .operation_attempt_timeout(settings.store_timeout)
            .build();

        let client = match &settings.store_endpoint {
            Some(endpoint) => {
                let credentials = Credentials::new("local", "local", None, None, "static");
                let dynamodb_config = aws_sdk_dynamodb::config::Builder::new()
                    .behavior_version(BehaviorVersion::latest())
                    .region(Region::new(settings.aws_region.clone()))
                    .credentials_provider(credentials)
                    .endpoint_url(endpoint)
                    .timeout_config(timeout_config)
                    .build();
                DynamoDbClient::from_conf(dynamodb_config)
            }
            None => {
                let aws_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
                    .load()
                    .await;
                let dynamodb_config = aws_sdk_dynamodb::config::Builder::from(&aws_config)
                    .timeout_config(timeout_config)
                    .build();
                DynamoDbClient::from_conf(dynamodb_config)
            }
        };

        Self::new(client, &settings.devices_table, &settings.readings_table)
            .with_call_timeout(settings.store_timeout)
    }

    pub fn devices_table(&self) -> &str {
        &self.devices_table
    }

    pub fn readings_table(&self) -> &str {
        &self.readings_table
    }

    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }

    /// Page through one device's partition newest first
    async fn aggregate_device(
        &self,
        device_id: &str,
    ) -> Result<Option<AggregateSnapshot>, StoreError> {
        let mut acc = SnapshotAccumulator::new();
        let mut start_key = None;

        loop {
            let query = self
                .client
                .query()
                .table_name(&self.readings_table)
                .key_condition_expression("device_id = :device_id")
                .expression_attribute_values(":device_id", AttributeValue::S(device_id.to_string()))
                .projection_expression("#value")
                .expression_attribute_names("#value", "value")
                .scan_index_forward(false) // Newest first
                .set_exclusive_start_key(start_key.take());

            let output = with_timeout(self.call_timeout, async {
                query.send().await.map_err(StoreError::from)
            })
            .await?;

            fold_items(&mut acc, output.items.unwrap_or_default())?;

            match output.last_evaluated_key {
                Some(key) if !key.is_empty() => start_key = Some(key),
                _ => break,
            }
        }

        Ok(acc.finish())
    }

    /// Create both tables if they do not exist yet
    ///
    /// Meant for DynamoDB Local and first-time setup; returns once both
    /// tables are ACTIVE.
    pub async fn ensure_tables(&self) -> Result<(), StoreError> {
        self.ensure_table(&self.devices_table, "device_id", None)
            .await?;
        self.ensure_table(&self.readings_table, "device_id", Some("ts_reading"))
            .await?;
        Ok(())
    }

    async fn ensure_table(
        &self,
        table: &str,
        partition_key: &str,
        sort_key: Option<&str>,
    ) -> Result<(), StoreError> {
        match self.client.describe_table().table_name(table).send().await {
            Ok(_) => {
                debug!(table = %table, "Table already exists");
                return Ok(());
            }
            Err(SdkError::ServiceError(service_err))
                if service_err.err().is_resource_not_found_exception() => {}
            Err(err) => return Err(err.into()),
        }

        let mut request = self
            .client
            .create_table()
            .table_name(table)
            .billing_mode(BillingMode::PayPerRequest)
            .attribute_definitions(attribute_definition(partition_key)?)
            .key_schema(key_schema_element(partition_key, KeyType::Hash)?);

        if let Some(sort_key) = sort_key {
            request = request
                .attribute_definitions(attribute_definition(sort_key)?)
                .key_schema(key_schema_element(sort_key, KeyType::Range)?);
        }

        request.send().await?;
        info!(table = %table, "Created table");

        for _ in 0..TABLE_READY_POLLS {
            let output = self.client.describe_table().table_name(table).send().await?;
            if output.table.and_then(|t| t.table_status) == Some(TableStatus::Active) {
                return Ok(());
            }
            tokio::time::sleep(TABLE_READY_INTERVAL).await;
        }

        Err(StoreError::Unavailable(format!(
            "Table {} did not become active",
            table
        )))
    }

    /// Delete every item of a table, returning the number deleted
    async fn purge_table(&self, table: &str, key_attributes: &str) -> Result<usize, StoreError> {
        let mut deleted = 0;
        let mut start_key = None;

        loop {
            let output = self
                .client
                .scan()
                .table_name(table)
                .projection_expression(key_attributes)
                .set_exclusive_start_key(start_key.take())
                .send()
                .await?;

            let keys = output.items.unwrap_or_default();
            for chunk in keys.chunks(BATCH_WRITE_LIMIT) {
                let requests = chunk
                    .iter()
                    .map(|key| {
                        DeleteRequest::builder()
                            .set_key(Some(key.clone()))
                            .build()
                            .map(|delete| WriteRequest::builder().delete_request(delete).build())
                            .map_err(|e| {
                                StoreError::Rejected(format!(
                                    "Failed to build DeleteRequest: {}",
                                    e
                                ))
                            })
                    })
                    .collect::<Result<Vec<_>, _>>()?;

                self.batch_write(table, requests).await?;
                deleted += chunk.len();
            }

            match output.last_evaluated_key {
                Some(key) if !key.is_empty() => start_key = Some(key),
                _ => break,
            }
        }

        Ok(deleted)
    }

    /// BatchWriteItem with resubmission of unprocessed requests
    async fn batch_write(
        &self,
        table: &str,
        mut requests: Vec<WriteRequest>,
    ) -> Result<(), StoreError> {
        for _ in 0..MAX_UNPROCESSED_RETRIES {
            let output = self
                .client
                .batch_write_item()
                .request_items(table, requests)
                .send()
                .await?;

            match output
                .unprocessed_items
                .and_then(|mut unprocessed| unprocessed.remove(table))
            {
                Some(rest) if !rest.is_empty() => {
                    debug!(table = %table, unprocessed = rest.len(), "Resubmitting unprocessed writes");
                    requests = rest;
                    tokio::time::sleep(UNPROCESSED_RETRY_DELAY).await;
                }
                _ => return Ok(()),
            }
        }

        Err(StoreError::Unavailable(format!(
            "{} writes to {} left unprocessed",
            requests.len(),
            table
        )))
    }
}

#[async_trait]
impl DeviceRegistry for DynamoStore {
    /// Scan the devices table, sorted by name then id
    ///
    /// Scan order is unspecified in DynamoDB, so rows are sorted to keep
    /// dashboard refreshes stable. Seeded names are zero-padded, which makes
    /// this match seeding order.
    async fn list_devices(&self, filter: &DeviceFilter) -> Result<Vec<Device>, StoreError> {
        let mut devices: Vec<Device> = Vec::new();
        let mut start_key = None;

        loop {
            let mut scan = self
                .client
                .scan()
                .table_name(&self.devices_table)
                .set_exclusive_start_key(start_key.take());

            if let Some(sector) = &filter.sector {
                scan = scan
                    .filter_expression("#sector = :sector")
                    .expression_attribute_names("#sector", "sector")
                    .expression_attribute_values(":sector", AttributeValue::S(sector.clone()));
            }

            let output = scan.send().await?;

            let page: Vec<Device> = serde_dynamo::from_items(output.items.unwrap_or_default())?;
            devices.extend(page);

            match output.last_evaluated_key {
                Some(key) if !key.is_empty() => start_key = Some(key),
                _ => break,
            }
        }

        devices.sort_by(|a, b| {
            a.name
                .cmp(&b.name)
                .then_with(|| a.device_id.cmp(&b.device_id))
        });

        Ok(devices)
    }
}

#[async_trait]
impl ReadingStore for DynamoStore {
    /// Write the batch with a single TransactWriteItems call
    ///
    /// The transaction succeeds or fails as a whole, so a failed call never
    /// leaves part of the batch behind.
    async fn insert_many(&self, readings: &[Reading]) -> Result<usize, StoreError> {
        validate_batch(readings)?;

        if readings.len() > MAX_BATCH_SIZE {
            return Err(StoreError::InvalidBatch(format!(
                "Batch size {} exceeds maximum of {} readings",
                readings.len(),
                MAX_BATCH_SIZE
            )));
        }

        let mut transact_items = Vec::with_capacity(readings.len());
        for reading in readings {
            let item: HashMap<String, AttributeValue> =
                serde_dynamo::to_item(ReadingItem::from(reading))?;

            let put = Put::builder()
                .table_name(&self.readings_table)
                .set_item(Some(item))
                .build()
                .map_err(|e| {
                    StoreError::InvalidBatch(format!("Failed to build reading Put: {}", e))
                })?;

            transact_items.push(TransactWriteItem::builder().put(put).build());
        }

        self.client
            .transact_write_items()
            .set_transact_items(Some(transact_items))
            .send()
            .await?;

        Ok(readings.len())
    }

    /// Fold each device's partition newest first
    ///
    /// One paginated descending Query per device, with up to
    /// `AGGREGATE_CONCURRENCY` devices in flight; only `value` is projected.
    /// Each page is bounded by the call timeout, not the whole aggregation,
    /// since the number of pages grows with the history.
    async fn aggregate(
        &self,
        device_ids: &[String],
    ) -> Result<HashMap<String, AggregateSnapshot>, StoreError> {
        let unique: BTreeSet<String> = device_ids.iter().cloned().collect();

        let folded: Vec<(String, Option<AggregateSnapshot>)> = stream::iter(unique)
            .map(|device_id| async move {
                let snapshot = self.aggregate_device(&device_id).await?;
                Ok::<_, StoreError>((device_id, snapshot))
            })
            .buffer_unordered(AGGREGATE_CONCURRENCY)
            .try_collect()
            .await?;

        Ok(folded
            .into_iter()
            .filter_map(|(device_id, snapshot)| {
                snapshot.map(|snapshot| (device_id, snapshot))
            })
            .collect())
    }
}

#[async_trait]
impl FleetAdmin for DynamoStore {
    async fn reset(&self) -> Result<(), StoreError> {
        let readings = self
            .purge_table(&self.readings_table, "device_id, ts_reading")
            .await?;
        let devices = self.purge_table(&self.devices_table, "device_id").await?;

        info!(devices, readings, "Purged fleet tables");
        Ok(())
    }

    async fn insert_devices(&self, devices: &[Device]) -> Result<usize, StoreError> {
        for chunk in devices.chunks(BATCH_WRITE_LIMIT) {
            let mut requests = Vec::with_capacity(chunk.len());
            for device in chunk {
                let item: HashMap<String, AttributeValue> = serde_dynamo::to_item(device)?;
                let put = PutRequest::builder()
                    .set_item(Some(item))
                    .build()
                    .map_err(|e| StoreError::Rejected(format!("Failed to build PutRequest: {}", e)))?;
                requests.push(WriteRequest::builder().put_request(put).build());
            }

            self.batch_write(&self.devices_table, requests).await?;
        }

        Ok(devices.len())
    }
}

/// Fold projected reading items, in the order the Query returned them
fn fold_items(
    acc: &mut SnapshotAccumulator,
    items: impl IntoIterator<Item = HashMap<String, AttributeValue>>,
) -> Result<(), StoreError> {
    for item in items {
        acc.observe(item_value(&item)?);
    }
    Ok(())
}

/// Extract the numeric `value` attribute of a projected reading item
fn item_value(item: &HashMap<String, AttributeValue>) -> Result<f64, StoreError> {
    item.get("value")
        .and_then(|v| v.as_n().ok())
        .and_then(|n| n.parse::<f64>().ok())
        .ok_or_else(|| StoreError::Serialization("Missing or invalid value".to_string()))
}

fn attribute_definition(name: &str) -> Result<AttributeDefinition, StoreError> {
    AttributeDefinition::builder()
        .attribute_name(name)
        .attribute_type(ScalarAttributeType::S)
        .build()
        .map_err(|e| StoreError::Rejected(format!("Failed to build AttributeDefinition: {}", e)))
}

fn key_schema_element(name: &str, key_type: KeyType) -> Result<KeySchemaElement, StoreError> {
    KeySchemaElement::builder()
        .attribute_name(name)
        .key_type(key_type)
        .build()
        .map_err(|e| StoreError::Rejected(format!("Failed to build KeySchemaElement: {}", e)))
}
