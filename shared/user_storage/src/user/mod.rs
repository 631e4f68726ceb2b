//! User storage module for `DynamoDB` operations

mod error;
mod model;

use std::future::Future;
use std::sync::Arc;

use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client as DynamoDbClient;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use futures::{future, stream, Stream, StreamExt, TryStreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

pub use error::{UserStorageError, UserStorageResult};
pub use model::{Address, AddressAttribute, Education, Gender, User, UserAttribute};

use crate::batch;
use crate::codec::{self, Item};
use crate::environment::{Environment, StorageSettings};
use crate::pagination::paginate;
use crate::store::{DynamoDbStore, KeyCondition, UpdateOutcome, UserStore};
use crate::update::{self, UpdateMode, UpdateRequest};

/// Storage client for user operations
///
/// Holds only read-only configuration and a cancellation token, so clones are
/// cheap and calls never share mutable state. Every operation stops when the
/// token is cancelled.
pub struct UserStorage<S = DynamoDbStore> {
    store: Arc<S>,
    settings: StorageSettings,
    cancel: CancellationToken,
}

impl<S> Clone for UserStorage<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            settings: self.settings.clone(),
            cancel: self.cancel.clone(),
        }
    }
}

impl UserStorage<DynamoDbStore> {
    /// Creates a new storage instance backed by `DynamoDB`
    ///
    /// # Arguments
    ///
    /// * `dynamodb_client` - Pre-configured `DynamoDB` client
    /// * `settings` - Table name, last name index name and batch concurrency
    #[must_use]
    pub fn new(dynamodb_client: Arc<DynamoDbClient>, settings: StorageSettings) -> Self {
        let store = DynamoDbStore::new(dynamodb_client, settings.table_name.clone());
        Self::with_store(Arc::new(store), settings)
    }

    /// Creates a storage instance configured from the environment
    pub async fn from_environment(env: &Environment) -> Self {
        let dynamodb_client = Arc::new(env.dynamodb_client().await);
        Self::new(dynamodb_client, env.storage_settings())
    }
}

impl<S: UserStore + 'static> UserStorage<S> {
    /// Creates a storage instance on top of any store transport
    #[must_use]
    pub fn with_store(store: Arc<S>, settings: StorageSettings) -> Self {
        Self {
            store,
            settings,
            cancel: CancellationToken::new(),
        }
    }

    /// Returns a handle sharing this store whose operations observe `cancel`
    #[must_use]
    pub fn with_cancellation(&self, cancel: CancellationToken) -> Self {
        Self {
            store: Arc::clone(&self.store),
            settings: self.settings.clone(),
            cancel,
        }
    }

    /// Configuration this handle was built with
    #[must_use]
    pub const fn settings(&self) -> &StorageSettings {
        &self.settings
    }

    /// Stores a user, replacing any existing user with the same id
    ///
    /// A random id is assigned when the user has none. `last_modified` is
    /// stamped from the current time; any value the caller set is discarded.
    ///
    /// # Errors
    ///
    /// - `UserStorageError::Codec` if the user cannot be encoded
    /// - `UserStorageError::Store` if the put fails
    /// - `UserStorageError::Cancelled` if cancelled before submission
    /// - `UserStorageError::OutcomeUnknown` if cancelled while in flight
    #[instrument(skip(self, user))]
    pub async fn create(&self, user: User) -> UserStorageResult<User> {
        let mut user = user;
        let id = *user.id.get_or_insert_with(Uuid::new_v4);
        user.last_modified = Some(update::next_version(Utc::now(), None));

        let item = codec::encode(&user, true)?;
        self.submit_write(id, async {
            self.store
                .put_item(item)
                .await
                .map_err(UserStorageError::Store)
        })
        .await?;

        info!(user_id = %id, "Stored user");
        Ok(user)
    }

    /// Get a single user by id
    ///
    /// # Errors
    ///
    /// Returns `UserStorageError::Store` if the get fails,
    /// `UserStorageError::Codec` if the stored row cannot be decoded, or
    /// `UserStorageError::Cancelled`
    #[instrument(skip(self))]
    pub async fn get_by_id(&self, id: Uuid) -> UserStorageResult<Option<User>> {
        let item = self
            .cancellable(async {
                self.store
                    .get_item(codec::key_for(id))
                    .await
                    .map_err(UserStorageError::Store)
            })
            .await?;

        Ok(item.as_ref().map(codec::decode).transpose()?)
    }

    /// Deletes a user; deleting a missing user succeeds
    ///
    /// # Errors
    ///
    /// - `UserStorageError::Store` if the delete fails
    /// - `UserStorageError::Cancelled` if cancelled before submission
    /// - `UserStorageError::OutcomeUnknown` if cancelled while in flight
    #[instrument(skip(self))]
    pub async fn delete(&self, id: Uuid) -> UserStorageResult<()> {
        self.submit_write(id, async {
            self.store
                .delete_item(codec::key_for(id))
                .await
                .map_err(UserStorageError::Store)
        })
        .await?;

        info!(user_id = %id, "Deleted user");
        Ok(())
    }

    /// Scans the whole table
    ///
    /// # Errors
    ///
    /// Returns `UserStorageError::Retrieval` if any page fails,
    /// `UserStorageError::Codec` if a row cannot be decoded, or
    /// `UserStorageError::Cancelled`. No partial result is returned.
    #[instrument(skip(self))]
    pub async fn find_all(&self) -> UserStorageResult<Vec<User>> {
        let users: Vec<User> = self.stream_all().try_collect().await?;
        info!(count = users.len(), "Scanned users");
        Ok(users)
    }

    /// Lazily scans the whole table, one page at a time
    #[must_use]
    pub fn stream_all(&self) -> BoxStream<'static, UserStorageResult<User>> {
        let store = Arc::clone(&self.store);
        let cancel = self.cancel.clone();

        decode_rows(paginate(move |token| {
            let store = Arc::clone(&store);
            let cancel = cancel.clone();
            async move {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => Err(UserStorageError::Cancelled),
                    page = store.scan(token) => page.map_err(UserStorageError::Retrieval),
                }
            }
        }))
    }

    /// Queries the last name index for every user with `last_name`
    ///
    /// # Errors
    ///
    /// Returns `UserStorageError::Validation` if `last_name` is empty,
    /// otherwise the same errors as [`Self::find_all`]
    #[instrument(skip(self))]
    pub async fn find_by_last_name(&self, last_name: &str) -> UserStorageResult<Vec<User>> {
        let users: Vec<User> = self.stream_by_last_name(last_name).try_collect().await?;
        info!(count = users.len(), "Queried users by last name");
        Ok(users)
    }

    /// Lazily queries the last name index, one page at a time
    ///
    /// An empty `last_name` yields a single `UserStorageError::Validation`.
    #[must_use]
    pub fn stream_by_last_name(&self, last_name: &str) -> BoxStream<'static, UserStorageResult<User>> {
        if last_name.is_empty() {
            return stream::once(future::ready(Err(UserStorageError::Validation(
                "Last name may not be empty".to_string(),
            ))))
            .boxed();
        }

        let store = Arc::clone(&self.store);
        let cancel = self.cancel.clone();
        let index_name = self.settings.last_name_index_name.clone();
        let condition = KeyCondition::equals(
            UserAttribute::LastName,
            AttributeValue::S(last_name.to_string()),
        );

        decode_rows(paginate(move |token| {
            let store = Arc::clone(&store);
            let cancel = cancel.clone();
            let index_name = index_name.clone();
            let condition = condition.clone();
            async move {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => Err(UserStorageError::Cancelled),
                    page = store.query(&index_name, condition, token) => {
                        page.map_err(UserStorageError::Retrieval)
                    }
                }
            }
        }))
    }

    /// Fetches the users with the given ids
    ///
    /// Ids missing from the table are left out of the result. The result has
    /// no particular order.
    ///
    /// # Errors
    ///
    /// Returns `UserStorageError::Retrieval` if any chunk fails,
    /// `UserStorageError::Codec` if a row cannot be decoded, or
    /// `UserStorageError::Cancelled`
    #[instrument(skip(self, ids), fields(count = ids.len()))]
    pub async fn find_by_ids(&self, ids: &[Uuid]) -> UserStorageResult<Vec<User>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let store: &S = &self.store;
        let rows = self
            .cancellable(async {
                batch::batch_get_all(
                    batch::chunk_keys(ids),
                    self.settings.batch_get_concurrency,
                    move |keys| store.batch_get_item(keys),
                )
                .await
                .map_err(UserStorageError::Retrieval)
            })
            .await?;

        let users = rows
            .iter()
            .map(codec::decode)
            .collect::<Result<Vec<_>, _>>()?;
        info!(count = users.len(), "Fetched users by id");
        Ok(users)
    }

    /// Writes the present fields of `user` whatever the stored version is
    ///
    /// Last writer wins. Prefer [`Self::update_if_unmodified`].
    ///
    /// # Errors
    ///
    /// Returns `UserStorageError::Validation` if the user has no id,
    /// `UserStorageError::Update` if the write fails, or a cancellation error
    #[instrument(skip(self, user), fields(user_id = ?user.id))]
    pub async fn update(&self, user: &User) -> UserStorageResult<DateTime<Utc>> {
        let request = update::build_update(user, UpdateMode::Unconditional, Utc::now())?;
        self.submit_update(request).await
    }

    /// Writes the present fields of `user` if the stored row still has the
    /// `last_modified` the caller read
    ///
    /// Returns the new `last_modified`. A user read from a row that was
    /// never stamped carries no `last_modified` and matches only such rows.
    ///
    /// # Errors
    ///
    /// - `UserStorageError::Validation` if the user has no id
    /// - `UserStorageError::ConflictRejected` if the row changed since it was read
    /// - `UserStorageError::Update` if the write fails
    /// - `UserStorageError::Cancelled` if cancelled before submission
    /// - `UserStorageError::OutcomeUnknown` if cancelled while in flight
    #[instrument(skip(self, user), fields(user_id = ?user.id))]
    pub async fn update_if_unmodified(&self, user: &User) -> UserStorageResult<DateTime<Utc>> {
        let request = update::build_update(user, UpdateMode::Conditional, Utc::now())?;
        self.submit_update(request).await
    }

    async fn submit_update(&self, request: UpdateRequest) -> UserStorageResult<DateTime<Utc>> {
        let id = request.id();
        let last_modified = request.last_modified();

        self.submit_write(id, async {
            match self.store.update_item(request).await {
                Ok(UpdateOutcome::Applied) => {
                    info!(user_id = %id, %last_modified, "Updated user");
                    Ok(last_modified)
                }
                Ok(UpdateOutcome::ConditionFailed) => {
                    warn!(user_id = %id, "Update rejected, user was modified concurrently");
                    Err(UserStorageError::ConflictRejected { id })
                }
                Err(source) => {
                    error!(user_id = %id, error = %source, "Failed to update user");
                    Err(UserStorageError::Update { id, source })
                }
            }
        })
        .await
    }

    /// Runs a write against the store
    ///
    /// Once the write has been handed to the store, cancellation can no longer
    /// tell whether it was applied, so it surfaces as `OutcomeUnknown`.
    async fn submit_write<T>(
        &self,
        id: Uuid,
        write: impl Future<Output = UserStorageResult<T>>,
    ) -> UserStorageResult<T> {
        if self.cancel.is_cancelled() {
            warn!(user_id = %id, "Write cancelled before submission");
            return Err(UserStorageError::Cancelled);
        }

        tokio::select! {
            biased;
            () = self.cancel.cancelled() => {
                warn!(user_id = %id, "Write cancelled while in flight");
                Err(UserStorageError::OutcomeUnknown { id })
            }
            result = write => result,
        }
    }

    async fn cancellable<T>(
        &self,
        operation: impl Future<Output = UserStorageResult<T>>,
    ) -> UserStorageResult<T> {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(UserStorageError::Cancelled),
            result = operation => result,
        }
    }
}

fn decode_rows(
    rows: impl Stream<Item = UserStorageResult<Item>> + Send + 'static,
) -> BoxStream<'static, UserStorageResult<User>> {
    rows.and_then(|item| future::ready(codec::decode(&item).map_err(UserStorageError::from)))
        .boxed()
}
