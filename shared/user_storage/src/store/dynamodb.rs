//! `DynamoDB` transport using `aws-sdk-dynamodb`

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_dynamodb::{error::SdkError, types::KeysAndAttributes, Client as DynamoDbClient};
use tracing::{debug, warn};

use super::{ContinuationToken, KeyCondition, Page, StoreError, StoreResult, UpdateOutcome, UserStore};
use crate::codec::Item;
use crate::update::UpdateRequest;

/// Attempts made to resolve `UnprocessedKeys` of a batch get
const MAX_BATCH_GET_ATTEMPTS: u32 = 5;

/// Initial delay before resubmitting unprocessed keys
const UNPROCESSED_KEYS_BACKOFF: Duration = Duration::from_millis(50);

/// Delay before resubmitting the keys left over by `attempt`, `None` once
/// no attempts remain
fn resubmit_delay(attempt: u32) -> Option<Duration> {
    (attempt < MAX_BATCH_GET_ATTEMPTS)
        .then(|| UNPROCESSED_KEYS_BACKOFF * 2_u32.pow(attempt.saturating_sub(1)))
}

/// Users table transport backed by a `DynamoDB` client
pub struct DynamoDbStore {
    dynamodb_client: Arc<DynamoDbClient>,
    table_name: String,
}

impl DynamoDbStore {
    /// Creates a new transport for the given table
    ///
    /// # Arguments
    ///
    /// * `dynamodb_client` - Pre-configured `DynamoDB` client
    /// * `table_name` - `DynamoDB` table name for users
    #[must_use]
    pub const fn new(dynamodb_client: Arc<DynamoDbClient>, table_name: String) -> Self {
        Self {
            dynamodb_client,
            table_name,
        }
    }

    /// Name of the table this transport writes to
    #[must_use]
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    fn page(items: Option<Vec<Item>>, last_evaluated_key: Option<Item>) -> Page {
        Page {
            items: items.unwrap_or_default(),
            next_token: last_evaluated_key
                .filter(|key| !key.is_empty())
                .map(ContinuationToken::new),
        }
    }
}

#[async_trait]
impl UserStore for DynamoDbStore {
    async fn put_item(&self, item: Item) -> StoreResult<()> {
        self.dynamodb_client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(item))
            .send()
            .await?;

        Ok(())
    }

    async fn get_item(&self, key: Item) -> StoreResult<Option<Item>> {
        let response = self
            .dynamodb_client
            .get_item()
            .table_name(&self.table_name)
            .set_key(Some(key))
            .send()
            .await?;

        Ok(response.item)
    }

    async fn scan(&self, token: Option<ContinuationToken>) -> StoreResult<Page> {
        let response = self
            .dynamodb_client
            .scan()
            .table_name(&self.table_name)
            .set_exclusive_start_key(token.map(ContinuationToken::into_item))
            .send()
            .await?;

        Ok(Self::page(response.items, response.last_evaluated_key))
    }

    async fn query(
        &self,
        index_name: &str,
        condition: KeyCondition,
        token: Option<ContinuationToken>,
    ) -> StoreResult<Page> {
        let response = self
            .dynamodb_client
            .query()
            .table_name(&self.table_name)
            .index_name(index_name)
            .key_condition_expression(condition.expression())
            .expression_attribute_names(condition.name_placeholder(), &condition.attribute)
            .expression_attribute_values(condition.value_placeholder(), condition.value.clone())
            .set_exclusive_start_key(token.map(ContinuationToken::into_item))
            .send()
            .await?;

        Ok(Self::page(response.items, response.last_evaluated_key))
    }

    async fn batch_get_item(&self, keys: Vec<Item>) -> StoreResult<Vec<Item>> {
        let mut pending = KeysAndAttributes::builder().set_keys(Some(keys)).build()?;
        let mut rows = Vec::new();

        for attempt in 1..=MAX_BATCH_GET_ATTEMPTS {
            let response = self
                .dynamodb_client
                .batch_get_item()
                .request_items(&self.table_name, pending)
                .send()
                .await?;

            if let Some(mut responses) = response.responses {
                rows.extend(responses.remove(&self.table_name).unwrap_or_default());
            }

            let unprocessed = response
                .unprocessed_keys
                .and_then(|mut unprocessed| unprocessed.remove(&self.table_name))
                .filter(|remaining| !remaining.keys().is_empty());

            match (unprocessed, resubmit_delay(attempt)) {
                (None, _) => return Ok(rows),
                (Some(remaining), Some(delay)) => {
                    debug!(
                        attempt,
                        remaining = remaining.keys().len(),
                        "Resubmitting unprocessed keys"
                    );
                    pending = remaining;
                    tokio::time::sleep(delay).await;
                }
                (Some(_), None) => break,
            }
        }

        warn!(
            table = %self.table_name,
            "Unprocessed keys remain after {MAX_BATCH_GET_ATTEMPTS} attempts"
        );
        Err(StoreError::Transport(format!(
            "Unprocessed keys remain after {MAX_BATCH_GET_ATTEMPTS} attempts"
        )))
    }

    async fn update_item(&self, request: UpdateRequest) -> StoreResult<UpdateOutcome> {
        let result = self
            .dynamodb_client
            .update_item()
            .table_name(&self.table_name)
            .set_key(Some(request.key()))
            .update_expression(request.update_expression())
            .set_condition_expression(request.condition_expression())
            .set_expression_attribute_names(Some(request.expression_attribute_names()))
            .set_expression_attribute_values(Some(request.expression_attribute_values()))
            .send()
            .await;

        match result {
            Ok(_) => Ok(UpdateOutcome::Applied),
            Err(err)
                if matches!(
                    err,
                    SdkError::ServiceError(ref svc) if svc.err().is_conditional_check_failed_exception()
                ) =>
            {
                Ok(UpdateOutcome::ConditionFailed)
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn delete_item(&self, key: Item) -> StoreResult<()> {
        self.dynamodb_client
            .delete_item()
            .table_name(&self.table_name)
            .set_key(Some(key))
            .send()
            .await?;

        Ok(())
    }
}
