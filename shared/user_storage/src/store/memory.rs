//! In-memory transport for tests

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_dynamodb::types::AttributeValue;

use super::{ContinuationToken, KeyCondition, Page, StoreError, StoreResult, UpdateOutcome, UserStore};
use crate::codec::{timestamp_value, Item};
use crate::update::{UpdateRequest, VersionCondition};
use crate::user::UserAttribute;

const DEFAULT_PAGE_SIZE: usize = 25;

/// Synthetic users table kept in memory
///
/// Rows are ordered by id, pages hold at most `page_size` rows and a page
/// carries a continuation token only when rows remain after it. Request
/// counters and recorded batch sizes let tests assert how many store calls an
/// operation made. Updates are checked and applied under one lock, so
/// concurrent conditional writes behave like they do against `DynamoDB`.
pub struct InMemoryStore {
    rows: Mutex<BTreeMap<String, Item>>,
    page_size: usize,
    latency: Option<Duration>,
    failing_page: Option<usize>,
    failing_batch: Option<usize>,
    scan_requests: AtomicUsize,
    query_requests: AtomicUsize,
    batch_sizes: Mutex<Vec<usize>>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    /// Creates an empty store with the default page size
    #[must_use]
    pub fn new() -> Self {
        Self {
            rows: Mutex::new(BTreeMap::new()),
            page_size: DEFAULT_PAGE_SIZE,
            latency: None,
            failing_page: None,
            failing_batch: None,
            scan_requests: AtomicUsize::new(0),
            query_requests: AtomicUsize::new(0),
            batch_sizes: Mutex::new(Vec::new()),
        }
    }

    /// Sets the maximum number of rows per scan or query page
    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Delays every store call by `latency`
    #[must_use]
    pub const fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Fails the `n`th scan or query request (1-based)
    #[must_use]
    pub const fn failing_page(mut self, n: usize) -> Self {
        self.failing_page = Some(n);
        self
    }

    /// Fails the `n`th batch get request (1-based)
    #[must_use]
    pub const fn failing_batch(mut self, n: usize) -> Self {
        self.failing_batch = Some(n);
        self
    }

    /// Stores a row exactly as given, bypassing the codec
    ///
    /// # Panics
    ///
    /// Panics if the row has no string `id` attribute
    pub fn insert_raw(&self, item: Item) {
        let id = match item.get(&UserAttribute::Id.to_string()) {
            Some(AttributeValue::S(id)) => id.clone(),
            _ => panic!("raw rows need a string id"),
        };
        self.lock_rows().insert(id, item);
    }

    /// Returns the stored row for an id
    #[must_use]
    pub fn raw(&self, id: &str) -> Option<Item> {
        self.lock_rows().get(id).cloned()
    }

    /// Number of stored rows
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock_rows().len()
    }

    /// Whether the store holds no rows
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock_rows().is_empty()
    }

    /// Scan requests received so far
    #[must_use]
    pub fn scan_requests(&self) -> usize {
        self.scan_requests.load(Ordering::SeqCst)
    }

    /// Query requests received so far
    #[must_use]
    pub fn query_requests(&self) -> usize {
        self.query_requests.load(Ordering::SeqCst)
    }

    /// Key count of every batch get request, in arrival order
    #[must_use]
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batch_sizes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn lock_rows(&self) -> MutexGuard<'_, BTreeMap<String, Item>> {
        self.rows.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn simulate_latency(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn check_page_fault(&self, request: usize) -> StoreResult<()> {
        if self.failing_page == Some(request) {
            return Err(StoreError::Transport(format!(
                "injected failure on page request {request}"
            )));
        }
        Ok(())
    }

    /// Cuts one page out of `rows`, starting after the id in `token`
    fn paginate<'a>(
        &self,
        rows: impl Iterator<Item = (&'a String, &'a Item)>,
        token: Option<&ContinuationToken>,
        token_for: impl Fn(&Item) -> Item,
    ) -> Page {
        let after = token.and_then(|token| match token.as_item().get(&UserAttribute::Id.to_string()) {
            Some(AttributeValue::S(id)) => Some(id.clone()),
            _ => None,
        });

        let mut remaining = rows
            .filter(|(id, _)| after.as_ref().map_or(true, |after| *id > after))
            .map(|(_, item)| item);

        let items: Vec<Item> = remaining.by_ref().take(self.page_size).cloned().collect();
        let next_token = match (remaining.next(), items.last()) {
            (Some(_), Some(last)) => Some(ContinuationToken::new(token_for(last))),
            _ => None,
        };

        Page { items, next_token }
    }
}

fn key_of(item: &Item, attributes: &[UserAttribute]) -> Item {
    attributes
        .iter()
        .filter_map(|attribute| {
            let name = attribute.to_string();
            item.get(&name).cloned().map(|value| (name, value))
        })
        .collect()
}

fn id_of(key: &Item) -> Option<&str> {
    match key.get(&UserAttribute::Id.to_string()) {
        Some(AttributeValue::S(id)) => Some(id.as_str()),
        _ => None,
    }
}

fn condition_holds(condition: &VersionCondition, row: Option<&Item>) -> bool {
    let stored = row.and_then(|row| row.get(&UserAttribute::LastModified.to_string()));
    match condition {
        VersionCondition::Matches(expected) => stored == Some(&timestamp_value(*expected)),
        VersionCondition::Unversioned => row.is_some() && stored.is_none(),
    }
}

#[async_trait]
impl UserStore for InMemoryStore {
    async fn put_item(&self, item: Item) -> StoreResult<()> {
        self.simulate_latency().await;
        let id = id_of(&item)
            .ok_or_else(|| StoreError::Transport("item is missing its key".to_string()))?
            .to_string();
        self.lock_rows().insert(id, item);
        Ok(())
    }

    async fn get_item(&self, key: Item) -> StoreResult<Option<Item>> {
        self.simulate_latency().await;
        Ok(id_of(&key).and_then(|id| self.lock_rows().get(id).cloned()))
    }

    async fn scan(&self, token: Option<ContinuationToken>) -> StoreResult<Page> {
        self.simulate_latency().await;
        let request = self.scan_requests.fetch_add(1, Ordering::SeqCst) + 1;
        self.check_page_fault(request)?;

        let rows = self.lock_rows();
        Ok(self.paginate(rows.iter(), token.as_ref(), |last| {
            key_of(last, &[UserAttribute::Id])
        }))
    }

    async fn query(
        &self,
        index_name: &str,
        condition: KeyCondition,
        token: Option<ContinuationToken>,
    ) -> StoreResult<Page> {
        self.simulate_latency().await;
        let request = self.query_requests.fetch_add(1, Ordering::SeqCst) + 1;
        self.check_page_fault(request)?;

        if condition.attribute != UserAttribute::LastName.to_string() {
            return Err(StoreError::Transport(format!(
                "index {index_name} has no hash key {}",
                condition.attribute
            )));
        }

        let rows = self.lock_rows();
        let matching = rows
            .iter()
            .filter(|(_, item)| item.get(&condition.attribute) == Some(&condition.value));
        Ok(self.paginate(matching, token.as_ref(), |last| {
            key_of(last, &[UserAttribute::Id, UserAttribute::LastName])
        }))
    }

    async fn batch_get_item(&self, keys: Vec<Item>) -> StoreResult<Vec<Item>> {
        let request = {
            let mut sizes = self
                .batch_sizes
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            sizes.push(keys.len());
            sizes.len()
        };
        self.simulate_latency().await;

        if self.failing_batch == Some(request) {
            return Err(StoreError::Transport(format!(
                "injected failure on batch request {request}"
            )));
        }

        let rows = self.lock_rows();
        Ok(keys
            .iter()
            .filter_map(|key| id_of(key).and_then(|id| rows.get(id).cloned()))
            .collect())
    }

    async fn update_item(&self, request: UpdateRequest) -> StoreResult<UpdateOutcome> {
        self.simulate_latency().await;
        let id = request.id().to_string();
        let mut rows = self.lock_rows();

        if let Some(condition) = request.condition() {
            if !condition_holds(condition, rows.get(&id)) {
                return Ok(UpdateOutcome::ConditionFailed);
            }
        }

        let row = rows.entry(id).or_insert_with(|| request.key());
        for (name, value) in request.assignments() {
            row.insert(name.clone(), value.clone());
        }

        Ok(UpdateOutcome::Applied)
    }

    async fn delete_item(&self, key: Item) -> StoreResult<()> {
        self.simulate_latency().await;
        if let Some(id) = id_of(&key) {
            self.lock_rows().remove(id);
        }
        Ok(())
    }
}
