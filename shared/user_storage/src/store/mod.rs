//! Store transport
//!
//! The storage layer never talks to `DynamoDB` directly: it builds requests
//! and hands them to a [`UserStore`]. [`DynamoDbStore`] is the production
//! transport; `InMemoryStore` (feature `test-utils`) is a synthetic store for
//! tests. Network retries and backoff belong to the transport.

mod dynamodb;
mod error;
#[cfg(feature = "test-utils")]
mod memory;

use async_trait::async_trait;
use aws_sdk_dynamodb::types::AttributeValue;

pub use dynamodb::DynamoDbStore;
pub use error::{StoreError, StoreResult};
#[cfg(feature = "test-utils")]
pub use memory::InMemoryStore;

use crate::codec::Item;
use crate::update::UpdateRequest;

/// Opaque cursor returned by a paginated read when more rows may remain
///
/// Wraps the `LastEvaluatedKey` of the previous page.
#[derive(Debug, Clone, PartialEq)]
pub struct ContinuationToken(Item);

impl ContinuationToken {
    /// Wraps the last evaluated key of a page
    #[must_use]
    pub const fn new(last_evaluated_key: Item) -> Self {
        Self(last_evaluated_key)
    }

    /// Borrows the wrapped key
    #[must_use]
    pub const fn as_item(&self) -> &Item {
        &self.0
    }

    /// Unwraps the key, to be sent as the exclusive start key
    #[must_use]
    pub fn into_item(self) -> Item {
        self.0
    }
}

/// One page of a scan or query
#[derive(Debug, Clone, Default)]
pub struct Page {
    /// Rows in the order the store returned them
    pub items: Vec<Item>,
    /// Present when the store reports that more rows may follow
    pub next_token: Option<ContinuationToken>,
}

/// Equality condition on the hash key of an index
#[derive(Debug, Clone, PartialEq)]
pub struct KeyCondition {
    /// Attribute name
    pub attribute: String,
    /// Value the attribute must equal
    pub value: AttributeValue,
}

impl KeyCondition {
    /// Builds an equality condition
    pub fn equals(attribute: impl ToString, value: AttributeValue) -> Self {
        Self {
            attribute: attribute.to_string(),
            value,
        }
    }

    /// Placeholder used for the attribute name in the expression
    #[must_use]
    pub fn name_placeholder(&self) -> String {
        format!("#{}", self.attribute)
    }

    /// Placeholder used for the value in the expression
    #[must_use]
    pub fn value_placeholder(&self) -> String {
        format!(":{}", self.attribute)
    }

    /// Key condition expression, e.g. `#lastName = :lastName`
    #[must_use]
    pub fn expression(&self) -> String {
        format!("{} = {}", self.name_placeholder(), self.value_placeholder())
    }
}

/// Result of submitting an update to the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The update was written
    Applied,
    /// The store rejected the update because its condition did not hold
    ConditionFailed,
}

/// Transport for the users table
///
/// Each method maps to exactly one store call. Implementations are bound to
/// a single table and must not retry condition failures.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Writes a full item, replacing any existing item with the same key
    async fn put_item(&self, item: Item) -> StoreResult<()>;

    /// Reads a single item by key
    async fn get_item(&self, key: Item) -> StoreResult<Option<Item>>;

    /// Reads one page of a full table scan
    async fn scan(&self, token: Option<ContinuationToken>) -> StoreResult<Page>;

    /// Reads one page of a secondary index query
    async fn query(
        &self,
        index_name: &str,
        condition: KeyCondition,
        token: Option<ContinuationToken>,
    ) -> StoreResult<Page>;

    /// Reads up to 100 items by key, in no particular order
    async fn batch_get_item(&self, keys: Vec<Item>) -> StoreResult<Vec<Item>>;

    /// Applies a partial update, honouring its condition if it carries one
    async fn update_item(&self, request: UpdateRequest) -> StoreResult<UpdateOutcome>;

    /// Deletes an item by key; deleting a missing item is not an error
    async fn delete_item(&self, key: Item) -> StoreResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_condition_expression() {
        let condition = KeyCondition::equals("lastName", AttributeValue::S("Jansen".to_string()));

        assert_eq!(condition.expression(), "#lastName = :lastName");
        assert_eq!(condition.name_placeholder(), "#lastName");
        assert_eq!(condition.value_placeholder(), ":lastName");
    }
}
