//! Request-scoped data loading with batching and caching
//!
//! A [`DataLoaderRegistry`] is generated per top-level GraphQL request by a
//! [`DataLoaderRegistryFactory`] and shared by every operation of that
//! request (one operation, or all operations of a batch). Field resolvers
//! queue keys on a named [`DataLoader`]; queued keys are fetched together
//! the next time the loader is dispatched.
//!
//! Who dispatches is up to the executor. Executors that support
//! synchronized dispatch use the [`BatchCoordination`] entry of the
//! execution context: each operation reports when it can make no more
//! progress without loader results, and once every operation of the batch
//! has done so the whole registry is dispatched at once.

use crate::core::context::ExecutionContext;
use futures::future::{BoxFuture, join_all};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::oneshot;

/// Errors delivered to callers waiting on a [`DataLoader`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoaderError {
    /// The batch function failed for the dispatch that carried the key
    #[error("batch load failed: {0}")]
    BatchFailed(String),

    /// The loader went away before the key was dispatched
    #[error("data loader dropped before the key was dispatched")]
    Dropped,
}

/// Batch function: fetch values for a set of distinct keys
pub type BatchFn<K, V> =
    Arc<dyn Fn(Vec<K>) -> BoxFuture<'static, Result<HashMap<K, V>, LoaderError>> + Send + Sync>;

type Waiter<V> = oneshot::Sender<Result<Option<V>, LoaderError>>;

struct LoaderState<K, V> {
    cache: HashMap<K, V>,
    /// Keys waiting for the next dispatch, in first-load order
    queued: Vec<K>,
    /// Waiters per queued or in-flight key
    waiters: HashMap<K, Vec<Waiter<V>>>,
}

enum Lookup<V> {
    Cached(V),
    Waiting(oneshot::Receiver<Result<Option<V>, LoaderError>>),
}

/// Batching, caching loader for one kind of backend fetch
pub struct DataLoader<K, V> {
    batch_fn: BatchFn<K, V>,
    state: Mutex<LoaderState<K, V>>,
}

impl<K, V> DataLoader<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Create a loader from an async batch function
    pub fn new<F, Fut>(batch_fn: F) -> Self
    where
        F: Fn(Vec<K>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<HashMap<K, V>, LoaderError>> + Send + 'static,
    {
        Self {
            batch_fn: Arc::new(move |keys| Box::pin(batch_fn(keys))),
            state: Mutex::new(LoaderState {
                cache: HashMap::new(),
                queued: Vec::new(),
                waiters: HashMap::new(),
            }),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, LoaderState<K, V>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Load a value by key
    ///
    /// The key is queued as soon as this is called, not when the returned
    /// future is first polled. Cached keys resolve immediately. A key that is
    /// already queued or being fetched joins that fetch; other keys resolve
    /// on the next [`dispatch`](Self::dispatch). A key the batch function
    /// does not return resolves to `None`.
    pub fn load(
        &self,
        key: K,
    ) -> impl Future<Output = Result<Option<V>, LoaderError>> + Send + use<K, V> {
        let lookup = {
            let mut state = self.lock_state();
            match state.cache.get(&key) {
                Some(value) => Lookup::Cached(value.clone()),
                None => {
                    let (tx, rx) = oneshot::channel();
                    match state.waiters.get_mut(&key) {
                        Some(waiters) => waiters.push(tx),
                        None => {
                            state.queued.push(key.clone());
                            state.waiters.insert(key, vec![tx]);
                        }
                    }
                    Lookup::Waiting(rx)
                }
            }
        };

        async move {
            match lookup {
                Lookup::Cached(value) => Ok(Some(value)),
                Lookup::Waiting(rx) => rx.await.unwrap_or(Err(LoaderError::Dropped)),
            }
        }
    }

    /// Load several keys; results are in key order
    pub async fn load_many(&self, keys: Vec<K>) -> Vec<Result<Option<V>, LoaderError>> {
        let futures: Vec<_> = keys.into_iter().map(|key| self.load(key)).collect();
        join_all(futures).await
    }

    /// Fetch every queued key with one call to the batch function
    ///
    /// Returns the number of distinct keys fetched. Keys stay in flight until
    /// the batch function completes; loads of those keys made meanwhile join
    /// this fetch instead of queueing a new one.
    pub async fn dispatch(&self) -> usize {
        let keys = std::mem::take(&mut self.lock_state().queued);
        if keys.is_empty() {
            return 0;
        }
        let key_count = keys.len();
        tracing::debug!(keys = key_count, "Dispatching data loader batch");

        let in_flight = InFlight {
            state: &self.state,
            keys,
        };
        let result = (self.batch_fn)(in_flight.keys.clone()).await;

        let mut state = self.lock_state();
        match result {
            Ok(values) => {
                for key in &in_flight.keys {
                    let value = values.get(key).cloned();
                    if let Some(value) = &value {
                        state.cache.insert(key.clone(), value.clone());
                    }
                    for waiter in state.waiters.remove(key).unwrap_or_default() {
                        let _ = waiter.send(Ok(value.clone()));
                    }
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "Data loader batch failed");
                for key in &in_flight.keys {
                    for waiter in state.waiters.remove(key).unwrap_or_default() {
                        let _ = waiter.send(Err(err.clone()));
                    }
                }
            }
        }
        drop(state);

        key_count
    }

    /// Put a value in the cache without fetching it
    pub fn prime(&self, key: K, value: V) {
        self.lock_state().cache.insert(key, value);
    }

    pub fn clear(&self) {
        self.lock_state().cache.clear();
    }

    pub fn clear_key(&self, key: &K) {
        self.lock_state().cache.remove(key);
    }

    /// Number of distinct keys queued for the next dispatch
    pub fn pending_len(&self) -> usize {
        self.lock_state().queued.len()
    }
}

/// Keys handed to the batch function by one dispatch
///
/// Dropping it detaches the waiters still registered for those keys; they
/// then fail with [`LoaderError::Dropped`].
struct InFlight<'a, K: Eq + Hash, V> {
    state: &'a Mutex<LoaderState<K, V>>,
    keys: Vec<K>,
}

impl<K: Eq + Hash, V> Drop for InFlight<'_, K, V> {
    fn drop(&mut self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        for key in &self.keys {
            state.waiters.remove(key);
        }
    }
}

/// Type-erased view of a loader, used by the registry
trait Dispatchable: Send + Sync {
    fn dispatch(&self) -> BoxFuture<'_, usize>;
    fn pending_len(&self) -> usize;
}

impl<K, V> Dispatchable for DataLoader<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn dispatch(&self) -> BoxFuture<'_, usize> {
        Box::pin(DataLoader::dispatch(self))
    }

    fn pending_len(&self) -> usize {
        DataLoader::pending_len(self)
    }
}

struct RegisteredLoader {
    dispatcher: Arc<dyn Dispatchable>,
    typed: Arc<dyn Any + Send + Sync>,
}

/// Named set of loaders scoped to one top-level request
#[derive(Default)]
pub struct DataLoaderRegistry {
    loaders: HashMap<String, RegisteredLoader>,
}

impl DataLoaderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a loader under a name, replacing any loader with that name
    pub fn register<K, V>(&mut self, name: impl Into<String>, loader: DataLoader<K, V>)
    where
        K: Eq + Hash + Clone + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
    {
        let loader = Arc::new(loader);
        self.loaders.insert(
            name.into(),
            RegisteredLoader {
                dispatcher: loader.clone(),
                typed: loader,
            },
        );
    }

    /// Builder-style [`register`](Self::register)
    pub fn with_loader<K, V>(mut self, name: impl Into<String>, loader: DataLoader<K, V>) -> Self
    where
        K: Eq + Hash + Clone + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
    {
        self.register(name, loader);
        self
    }

    /// Look up a loader by name and key/value types
    ///
    /// Returns `None` if no loader has that name or its types differ.
    pub fn loader<K, V>(&self, name: &str) -> Option<Arc<DataLoader<K, V>>>
    where
        K: Eq + Hash + Clone + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
    {
        self.loaders
            .get(name)
            .and_then(|entry| entry.typed.clone().downcast::<DataLoader<K, V>>().ok())
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.loaders.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.loaders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loaders.is_empty()
    }

    /// Total number of queued loads across all loaders
    pub fn pending_len(&self) -> usize {
        self.loaders
            .values()
            .map(|entry| entry.dispatcher.pending_len())
            .sum()
    }

    /// Dispatch every loader that has queued keys
    ///
    /// Returns the number of loaders that were dispatched.
    pub async fn dispatch_all(&self) -> usize {
        let dispatches = self
            .loaders
            .values()
            .filter(|entry| entry.dispatcher.pending_len() > 0)
            .map(|entry| entry.dispatcher.dispatch());
        join_all(dispatches)
            .await
            .into_iter()
            .filter(|keys| *keys > 0)
            .count()
    }
}

impl fmt::Debug for DataLoaderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataLoaderRegistry")
            .field("loaders", &self.names())
            .finish()
    }
}

/// Produces a fresh registry for each top-level request
pub trait DataLoaderRegistryFactory: Send + Sync {
    /// Generate a registry for the request described by `context`
    ///
    /// Returning `None` means no loaders are configured; resolvers then
    /// fetch without batching.
    fn generate(&self, context: &ExecutionContext) -> Option<Arc<DataLoaderRegistry>>;
}

/// [`DataLoaderRegistryFactory`] backed by a closure
pub struct FnRegistryFactory<F> {
    build: F,
}

impl<F> FnRegistryFactory<F>
where
    F: Fn(&ExecutionContext) -> Option<DataLoaderRegistry> + Send + Sync,
{
    pub fn new(build: F) -> Self {
        Self { build }
    }
}

impl<F> DataLoaderRegistryFactory for FnRegistryFactory<F>
where
    F: Fn(&ExecutionContext) -> Option<DataLoaderRegistry> + Send + Sync,
{
    fn generate(&self, context: &ExecutionContext) -> Option<Arc<DataLoaderRegistry>> {
        (self.build)(context).map(Arc::new)
    }
}

#[derive(Debug)]
struct CoordinationState {
    active: usize,
    exhausted: usize,
}

/// Synchronized-exhaustion dispatch state for one batch
///
/// `size` is the number of operations expected to share the registry
/// concurrently. An operation calls
/// [`on_execution_exhausted`](Self::on_execution_exhausted) once it is
/// blocked on loader results; when every still-running operation has done so,
/// the registry is dispatched. The request handler calls
/// [`on_execution_finished`](Self::on_execution_finished) when an operation
/// completes, so a finished or failed operation never holds back the others.
pub struct BatchCoordination {
    size: usize,
    registry: Arc<DataLoaderRegistry>,
    state: Mutex<CoordinationState>,
}

impl BatchCoordination {
    pub fn new(size: usize, registry: Arc<DataLoaderRegistry>) -> Self {
        Self {
            size,
            registry,
            state: Mutex::new(CoordinationState {
                active: size,
                exhausted: 0,
            }),
        }
    }

    /// Declared number of operations in the batch
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn registry(&self) -> &Arc<DataLoaderRegistry> {
        &self.registry
    }

    fn lock_state(&self) -> MutexGuard<'_, CoordinationState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Report that one operation is blocked on loader results
    ///
    /// Returns `true` if this call triggered a dispatch.
    pub async fn on_execution_exhausted(&self) -> bool {
        let ready = {
            let mut state = self.lock_state();
            state.exhausted += 1;
            if state.exhausted >= state.active {
                state.exhausted = 0;
                true
            } else {
                false
            }
        };
        if ready {
            self.registry.dispatch_all().await;
        }
        ready
    }

    /// Report that one operation has completed
    ///
    /// Returns `true` if the remaining operations were all waiting and a
    /// dispatch was triggered.
    pub async fn on_execution_finished(&self) -> bool {
        let ready = {
            let mut state = self.lock_state();
            state.active = state.active.saturating_sub(1);
            if state.active > 0 && state.exhausted >= state.active {
                state.exhausted = 0;
                true
            } else {
                false
            }
        };
        if ready {
            self.registry.dispatch_all().await;
        }
        ready
    }

    /// Number of operations that have not completed yet
    pub fn active(&self) -> usize {
        self.lock_state().active
    }
}

impl fmt::Debug for BatchCoordination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchCoordination")
            .field("size", &self.size)
            .field("registry", &self.registry)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Loader doubling keys, recording every batch it receives
    fn recording_loader(batches: Arc<Mutex<Vec<Vec<u32>>>>) -> DataLoader<u32, u64> {
        DataLoader::new(move |keys: Vec<u32>| {
            let batches = batches.clone();
            async move {
                batches.lock().expect("lock poisoned").push(keys.clone());
                Ok(keys
                    .into_iter()
                    .filter(|k| *k != 404)
                    .map(|k| (k, u64::from(k) * 2))
                    .collect())
            }
        })
    }

    #[tokio::test]
    async fn test_load_waits_for_dispatch_and_deduplicates() {
        let batches = Arc::new(Mutex::new(Vec::new()));
        let loader = recording_loader(batches.clone());

        let first = loader.load(1);
        let second = loader.load(2);
        let duplicate = loader.load(1);
        assert_eq!(loader.pending_len(), 2);

        assert_eq!(loader.dispatch().await, 2);

        assert_eq!(first.await, Ok(Some(2)));
        assert_eq!(second.await, Ok(Some(4)));
        assert_eq!(duplicate.await, Ok(Some(2)));
        assert_eq!(*batches.lock().unwrap(), vec![vec![1, 2]]);
    }

    #[tokio::test]
    async fn test_cached_keys_resolve_without_dispatch() {
        let batches = Arc::new(Mutex::new(Vec::new()));
        let loader = recording_loader(batches.clone());

        let pending = loader.load(7);
        loader.dispatch().await;
        assert_eq!(pending.await, Ok(Some(14)));

        assert_eq!(loader.load(7).await, Ok(Some(14)));
        assert_eq!(loader.pending_len(), 0);
        assert_eq!(batches.lock().unwrap().len(), 1);

        loader.prime(8, 99);
        assert_eq!(loader.load(8).await, Ok(Some(99)));

        loader.clear_key(&8);
        let _requeued = loader.load(8);
        assert_eq!(loader.pending_len(), 1);
    }

    #[tokio::test]
    async fn test_missing_key_resolves_to_none() {
        let loader = recording_loader(Arc::new(Mutex::new(Vec::new())));
        let missing = loader.load(404);
        loader.dispatch().await;
        assert_eq!(missing.await, Ok(None));
    }

    #[tokio::test]
    async fn test_batch_error_reaches_every_waiter() {
        let loader: DataLoader<u32, u64> = DataLoader::new(|_keys: Vec<u32>| async {
            Err(LoaderError::BatchFailed("backend down".to_string()))
        });

        let a = loader.load(1);
        let b = loader.load(2);
        loader.dispatch().await;

        let expected = Err(LoaderError::BatchFailed("backend down".to_string()));
        assert_eq!(a.await, expected);
        assert_eq!(b.await, expected);
    }

    #[tokio::test]
    async fn test_dropped_loader_fails_waiters() {
        let loader = recording_loader(Arc::new(Mutex::new(Vec::new())));
        let pending = loader.load(1);
        drop(loader);
        assert_eq!(pending.await, Err(LoaderError::Dropped));
    }

    /// Loader doubling keys after a delay, recording every batch it receives
    fn slow_loader(batches: Arc<Mutex<Vec<Vec<u32>>>>, delay: Duration) -> DataLoader<u32, u64> {
        DataLoader::new(move |keys: Vec<u32>| {
            let batches = batches.clone();
            async move {
                batches.lock().expect("lock poisoned").push(keys.clone());
                tokio::time::sleep(delay).await;
                Ok(keys.into_iter().map(|k| (k, u64::from(k) * 2)).collect())
            }
        })
    }

    async fn load_and_dispatch(
        loader: &DataLoader<u32, u64>,
        key: u32,
    ) -> Result<Option<u64>, LoaderError> {
        let pending = loader.load(key);
        loader.dispatch().await;
        pending.await
    }

    #[tokio::test]
    async fn test_load_of_in_flight_key_joins_the_running_fetch() {
        let batches = Arc::new(Mutex::new(Vec::new()));
        let loader = slow_loader(batches.clone(), Duration::from_millis(20));

        let (a, b) = tokio::join!(load_and_dispatch(&loader, 1), load_and_dispatch(&loader, 1));

        assert_eq!(a, Ok(Some(2)));
        assert_eq!(b, Ok(Some(2)));
        assert_eq!(*batches.lock().unwrap(), vec![vec![1]]);
    }

    #[tokio::test]
    async fn test_cancelled_dispatch_releases_waiters() {
        let batches = Arc::new(Mutex::new(Vec::new()));
        let loader = slow_loader(batches.clone(), Duration::from_millis(500));

        let pending = loader.load(1);
        let cancelled = tokio::time::timeout(Duration::from_millis(10), loader.dispatch()).await;
        assert!(cancelled.is_err());
        assert_eq!(pending.await, Err(LoaderError::Dropped));

        // The key is no longer in flight, so it is queued again
        let _retry = loader.load(1);
        assert_eq!(loader.pending_len(), 1);
    }

    #[tokio::test]
    async fn test_registry_typed_lookup() {
        let registry = DataLoaderRegistry::new()
            .with_loader("doubles", recording_loader(Arc::new(Mutex::new(Vec::new()))));

        assert!(registry.loader::<u32, u64>("doubles").is_some());
        assert!(registry.loader::<String, u64>("doubles").is_none());
        assert!(registry.loader::<u32, u64>("unknown").is_none());
        assert_eq!(registry.names(), vec!["doubles"]);
    }

    #[tokio::test]
    async fn test_registry_dispatch_all_only_touches_pending_loaders() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counting = |calls: Arc<AtomicUsize>| {
            DataLoader::new(move |keys: Vec<u32>| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move { Ok(keys.into_iter().map(|k| (k, k)).collect::<HashMap<_, _>>()) }
            })
        };
        let registry = DataLoaderRegistry::new()
            .with_loader("a", counting(calls.clone()))
            .with_loader("b", counting(calls.clone()));

        let a = registry.loader::<u32, u32>("a").unwrap();
        let pending = a.load(5);
        assert_eq!(registry.pending_len(), 1);

        assert_eq!(registry.dispatch_all().await, 1);
        assert_eq!(pending.await, Ok(Some(5)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_coordination_dispatches_once_all_operations_are_exhausted() {
        let batches = Arc::new(Mutex::new(Vec::new()));
        let registry =
            Arc::new(DataLoaderRegistry::new().with_loader("doubles", recording_loader(batches.clone())));
        let coordination = Arc::new(BatchCoordination::new(2, registry));

        let operation = |key: u32| {
            let coordination = coordination.clone();
            async move {
                let loader = coordination
                    .registry()
                    .loader::<u32, u64>("doubles")
                    .expect("loader registered");
                let pending = loader.load(key);
                coordination.on_execution_exhausted().await;
                pending.await
            }
        };

        let (a, b) = tokio::join!(operation(1), operation(2));

        assert_eq!(a, Ok(Some(2)));
        assert_eq!(b, Ok(Some(4)));
        assert_eq!(*batches.lock().unwrap(), vec![vec![1, 2]]);
    }

    #[tokio::test]
    async fn test_finished_operation_releases_waiting_siblings() {
        let batches = Arc::new(Mutex::new(Vec::new()));
        let registry =
            Arc::new(DataLoaderRegistry::new().with_loader("doubles", recording_loader(batches.clone())));
        let coordination = BatchCoordination::new(2, registry.clone());

        let loader = registry.loader::<u32, u64>("doubles").unwrap();
        let pending = loader.load(3);
        assert!(!coordination.on_execution_exhausted().await);

        // The sibling completes without ever touching a loader
        assert!(coordination.on_execution_finished().await);
        assert_eq!(pending.await, Ok(Some(6)));
        assert_eq!(coordination.active(), 1);
    }
}
