//! Tests against a `LocalStack` `DynamoDB`
//!
//! Run with `cargo test -p user_storage -- --ignored` while `LocalStack` is
//! listening on port 4566.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use aws_config::{BehaviorVersion, Region};
use aws_credential_types::Credentials;
use aws_sdk_dynamodb::types::{
    AttributeDefinition, BillingMode, GlobalSecondaryIndex, KeySchemaElement, KeyType, Projection,
    ProjectionType, ScalarAttributeType,
};
use aws_sdk_dynamodb::Client as DynamoDbClient;
use tokio::time::sleep;
use user_storage::{Gender, StorageSettings, User, UserAttribute, UserStorage, UserStorageError};
use uuid::Uuid;

/// Test configuration for LocalStack
const LOCALSTACK_ENDPOINT: &str = "http://localhost:4566";
const TEST_REGION: &str = "us-east-1";
const TEST_LAST_NAME_INDEX_NAME: &str = "lastNameIndex";

/// Test context that automatically cleans up the table on drop
struct TestContext {
    storage: UserStorage,
    table_name: String,
    dynamodb_client: Arc<DynamoDbClient>,
}

impl Drop for TestContext {
    fn drop(&mut self) {
        // Clean up the table
        let client = self.dynamodb_client.clone();
        let table = self.table_name.clone();

        let handle = tokio::runtime::Handle::try_current();
        if let Ok(handle) = handle {
            handle.spawn(async move {
                let _ = client.delete_table().table_name(&table).send().await;
            });
        }
    }
}

/// Creates a users table with the last name index under a unique name
async fn setup_test() -> TestContext {
    let table_name = format!("test-users-{}", Uuid::new_v4());

    let credentials = Credentials::from_keys(
        "test", // AWS_ACCESS_KEY_ID
        "test", // AWS_SECRET_ACCESS_KEY
        None,   // no session token
    );
    let config = aws_config::defaults(BehaviorVersion::latest())
        .endpoint_url(LOCALSTACK_ENDPOINT)
        .region(Region::new(TEST_REGION))
        .credentials_provider(credentials)
        .load()
        .await;

    let dynamodb_client = Arc::new(DynamoDbClient::new(&config));

    dynamodb_client
        .create_table()
        .table_name(&table_name)
        .billing_mode(BillingMode::PayPerRequest)
        .key_schema(
            KeySchemaElement::builder()
                .attribute_name(UserAttribute::Id.to_string())
                .key_type(KeyType::Hash)
                .build()
                .expect("Failed to build key schema"),
        )
        .attribute_definitions(
            AttributeDefinition::builder()
                .attribute_name(UserAttribute::Id.to_string())
                .attribute_type(ScalarAttributeType::S)
                .build()
                .expect("Failed to build attribute definition"),
        )
        .attribute_definitions(
            AttributeDefinition::builder()
                .attribute_name(UserAttribute::LastName.to_string())
                .attribute_type(ScalarAttributeType::S)
                .build()
                .expect("Failed to build attribute definition"),
        )
        .global_secondary_indexes(
            GlobalSecondaryIndex::builder()
                .index_name(TEST_LAST_NAME_INDEX_NAME)
                .key_schema(
                    KeySchemaElement::builder()
                        .attribute_name(UserAttribute::LastName.to_string())
                        .key_type(KeyType::Hash)
                        .build()
                        .expect("Failed to build GSI key schema"),
                )
                .projection(
                    Projection::builder()
                        .projection_type(ProjectionType::All)
                        .build(),
                )
                .build()
                .expect("Failed to build GSI"),
        )
        .send()
        .await
        .expect("Failed to create test table");

    // Wait for table to be ready
    sleep(Duration::from_millis(100)).await;

    let storage = UserStorage::new(
        dynamodb_client.clone(),
        StorageSettings {
            table_name: table_name.clone(),
            last_name_index_name: TEST_LAST_NAME_INDEX_NAME.to_string(),
            batch_get_concurrency: 4,
        },
    );

    TestContext {
        storage,
        table_name,
        dynamodb_client,
    }
}

fn create_test_user(last_name: &str) -> User {
    User {
        first_name: Some("Anna".to_string()),
        last_name: Some(last_name.to_string()),
        age: Some(34),
        gender: Some(Gender::Other),
        is_admin: Some(true),
        ..User::default()
    }
}

#[tokio::test]
#[ignore = "requires LocalStack"]
async fn test_create_and_get_user() {
    let context = setup_test().await;

    let created = context
        .storage
        .create(create_test_user("Jansen"))
        .await
        .expect("Failed to create user");

    let fetched = context
        .storage
        .get_by_id(created.id.unwrap())
        .await
        .expect("Failed to get user")
        .expect("User should exist");

    assert_eq!(fetched, created);
}

#[tokio::test]
#[ignore = "requires LocalStack"]
async fn test_scan_query_and_batch_get() {
    let context = setup_test().await;

    let mut jansens = HashSet::new();
    for _ in 0..5 {
        let user = context.storage.create(create_test_user("Jansen")).await.unwrap();
        jansens.insert(user.id.unwrap());
    }
    let other = context.storage.create(create_test_user("Visser")).await.unwrap();

    let all = context.storage.find_all().await.expect("Failed to scan");
    assert_eq!(all.len(), 6);

    let found = context
        .storage
        .find_by_last_name("Jansen")
        .await
        .expect("Failed to query");
    let found_ids: HashSet<Uuid> = found.iter().filter_map(|user| user.id).collect();
    assert_eq!(found_ids, jansens);

    let mut ids: Vec<Uuid> = jansens.iter().copied().collect();
    ids.push(other.id.unwrap());
    ids.push(Uuid::new_v4());
    let batch = context
        .storage
        .find_by_ids(&ids)
        .await
        .expect("Failed to batch get");
    assert_eq!(batch.len(), 6);
}

#[tokio::test]
#[ignore = "requires LocalStack"]
async fn test_conditional_update_rejects_stale_writer() {
    let context = setup_test().await;
    let created = context.storage.create(create_test_user("Jansen")).await.unwrap();

    let mut first = created.clone();
    first.age = Some(35);
    let t2 = context
        .storage
        .update_if_unmodified(&first)
        .await
        .expect("First update should apply");
    assert!(t2 > created.last_modified.unwrap());

    let mut second = created.clone();
    second.age = Some(36);
    let err = context
        .storage
        .update_if_unmodified(&second)
        .await
        .unwrap_err();
    assert!(matches!(err, UserStorageError::ConflictRejected { .. }));

    let fetched = context
        .storage
        .get_by_id(created.id.unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(fetched.age, Some(35));
    assert_eq!(fetched.last_modified, Some(t2));
}

#[tokio::test]
#[ignore = "requires LocalStack"]
async fn test_delete_user() {
    let context = setup_test().await;
    let created = context.storage.create(create_test_user("Jansen")).await.unwrap();
    let id = created.id.unwrap();

    context.storage.delete(id).await.expect("Failed to delete");

    assert_eq!(context.storage.get_by_id(id).await.unwrap(), None);
}
