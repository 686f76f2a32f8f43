use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use courier_multipart::Parameter;
use tokio::sync::oneshot;
use url::Url;

use super::metadata::RemoteMetadata;
use super::record::{Transfer, TransferCallback, TransferOutcome, UpdateCallback};
use super::schema::CacheSchema;
use crate::data::{Method, ProgressObserver};
use crate::dispatch::{DispatchManager, ExecutionQueue};
use crate::error::{Error, Result};
use crate::request::{Body, Request, RequestConfig, Response};
use crate::sync::lock;

/// How an upload is sent.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum UploadMode {
    /// `PUT` with the raw file as the body.
    #[default]
    Put,
    /// `POST` of a multipart form with the file under `field`.
    Multipart { field: String },
}

/// Options for one download call.
pub struct DownloadOptions {
    pub observers:    Vec<Arc<dyn ProgressObserver>>,
    /// Run on the download queue rather than immediately.
    pub enqueue:      bool,
    /// With a cached copy present, complete with it at once and then check
    /// whether the remote resource changed.
    pub update_check: bool,
    /// Called with the new file when an update check found a change.
    pub on_update:    Option<UpdateCallback>,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            observers:    Vec::new(),
            enqueue:      true,
            update_check: false,
            on_update:    None,
        }
    }
}

impl DownloadOptions {
    pub fn new() -> Self { Self::default() }

    #[must_use]
    pub fn observer(mut self, observer: impl ProgressObserver + 'static) -> Self {
        self.observers.push(Arc::new(observer));
        self
    }

    #[must_use]
    pub fn observer_arc(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    #[must_use]
    pub fn enqueue(mut self, enqueue: bool) -> Self {
        self.enqueue = enqueue;
        self
    }

    #[must_use]
    pub fn update_check(mut self, on_update: impl FnOnce(&Path) + Send + 'static) -> Self {
        self.update_check = true;
        self.on_update = Some(Box::new(on_update));
        self
    }
}

/// Options for one upload call.
pub struct UploadOptions {
    pub observers: Vec<Arc<dyn ProgressObserver>>,
    pub enqueue:   bool,
    pub mode:      UploadMode,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            observers: Vec::new(),
            enqueue:   true,
            mode:      UploadMode::Put,
        }
    }
}

impl UploadOptions {
    pub fn new() -> Self { Self::default() }

    #[must_use]
    pub fn observer(mut self, observer: impl ProgressObserver + 'static) -> Self {
        self.observers.push(Arc::new(observer));
        self
    }

    #[must_use]
    pub fn enqueue(mut self, enqueue: bool) -> Self {
        self.enqueue = enqueue;
        self
    }

    #[must_use]
    pub fn mode(mut self, mode: UploadMode) -> Self {
        self.mode = mode;
        self
    }
}

type UploadKey = (PathBuf, String);

struct Shared {
    dispatch:        DispatchManager,
    schema:          Arc<dyn CacheSchema>,
    downloads:       Mutex<HashMap<String, Arc<Transfer>>>,
    uploads:         Mutex<HashMap<UploadKey, Arc<Transfer>>>,
    download_queue:  ExecutionQueue,
    upload_queue:    ExecutionQueue,
    cache_downloads: AtomicBool,
}

/// Downloads into a disk cache and uploads local files, coalescing
/// concurrent calls for the same resource into one exchange.
#[derive(Clone)]
pub struct TransferManager {
    shared: Arc<Shared>,
}

impl TransferManager {
    pub fn new(dispatch: DispatchManager, schema: Arc<dyn CacheSchema>) -> Self {
        Self {
            shared: Arc::new(Shared {
                dispatch,
                schema,
                downloads: Mutex::new(HashMap::new()),
                uploads: Mutex::new(HashMap::new()),
                download_queue: ExecutionQueue::new("downloads"),
                upload_queue: ExecutionQueue::new("uploads"),
                cache_downloads: AtomicBool::new(true),
            }),
        }
    }

    pub fn dispatch(&self) -> &DispatchManager { &self.shared.dispatch }

    pub fn schema(&self) -> &Arc<dyn CacheSchema> { &self.shared.schema }

    pub fn download_queue(&self) -> &ExecutionQueue { &self.shared.download_queue }

    pub fn upload_queue(&self) -> &ExecutionQueue { &self.shared.upload_queue }

    pub fn cache_downloads(&self) -> bool { self.shared.cache_downloads.load(Ordering::SeqCst) }

    /// When off, downloads go to fresh temporary files and the cache is
    /// neither read nor written.
    pub fn set_cache_downloads(&self, enabled: bool) { self.shared.cache_downloads.store(enabled, Ordering::SeqCst); }

    pub fn cache_path_for(&self, url: &Url) -> PathBuf { self.shared.schema.cache_path_for_url(url) }

    // -- downloads ------------------------------------------------------------

    /// Download `url` into the cache and call `completion` with the local
    /// path. A download already running for `url` is joined instead of
    /// starting a second one.
    pub fn download_file<F>(&self, url: &Url, options: DownloadOptions, completion: F)
    where
        F: FnOnce(&TransferOutcome) + Send + 'static,
    {
        let key = url.as_str().to_string();
        let caching = self.cache_downloads();
        let cache_path = caching.then(|| self.cache_path_for(url));
        let cached = cache_path.clone().filter(|p| p.is_file());
        let DownloadOptions {
            observers,
            enqueue,
            update_check,
            on_update,
        } = options;

        let mut completion: Option<TransferCallback> = Some(Box::new(completion));
        let immediate = {
            let mut downloads = lock(&self.shared.downloads);
            if let Some(existing) = downloads.get(&key) {
                tracing::debug!(url = %url, "joining running download");
                join(existing, observers, completion.take(), on_update);
                None
            } else if let (Some(path), false) = (&cached, update_check) {
                Some((path.clone(), observers))
            } else {
                let transfer = Transfer::new(key.clone());
                let check = update_check && cached.is_some();
                let now = if check { None } else { completion.take() };
                join(&transfer, Vec::new(), now, on_update.filter(|_| check));
                for observer in &observers {
                    transfer.add_observer(observer.clone());
                }
                downloads.insert(key.clone(), transfer.clone());
                tracing::info!(url = %url, update_check = check, "download started");
                tokio::spawn(run_download(self.shared.clone(), transfer, url.clone(), DownloadPlan {
                    cache_path,
                    check,
                    enqueue,
                }));
                cached.clone().filter(|_| check).map(|p| (p, Vec::new()))
            }
        };

        if let Some((path, observers)) = immediate {
            tracing::debug!(url = %url, path = %path.display(), "served from cache");
            for observer in observers {
                observer.on_progress(1.0);
            }
            if let Some(completion) = completion {
                completion(&TransferOutcome::cached(path));
            }
        }
    }

    /// [`download_file`](Self::download_file), awaited.
    pub async fn download(&self, url: &Url, options: DownloadOptions) -> TransferOutcome {
        let (tx, rx) = oneshot::channel();
        self.download_file(url, options, move |outcome| {
            let _ = tx.send(outcome.clone());
        });
        rx.await.unwrap_or_else(|_| TransferOutcome::cancelled(None))
    }

    /// Wait for the running download of `url`, including a background
    /// update check. `None` when nothing is running for `url`.
    pub async fn wait_for_download(&self, url: &Url) -> Option<TransferOutcome> {
        let (tx, rx) = oneshot::channel();
        {
            let downloads = lock(&self.shared.downloads);
            let transfer = downloads.get(url.as_str())?;
            let completion: TransferCallback = Box::new(move |outcome: &TransferOutcome| {
                let _ = tx.send(outcome.clone());
            });
            join(transfer, Vec::new(), Some(completion), None);
        }
        rx.await.ok()
    }

    pub fn add_download_observer(&self, url: &Url, observer: Arc<dyn ProgressObserver>) -> bool {
        match lock(&self.shared.downloads).get(url.as_str()) {
            Some(transfer) => {
                transfer.add_observer(observer);
                true
            }
            None => false,
        }
    }

    pub fn remove_download_observer(&self, url: &Url, observer: &Arc<dyn ProgressObserver>) -> bool {
        lock(&self.shared.downloads)
            .get(url.as_str())
            .is_some_and(|t| t.remove_observer(observer))
    }

    pub fn remove_observers_for_download(&self, url: &Url) {
        if let Some(transfer) = lock(&self.shared.downloads).get(url.as_str()) {
            transfer.clear_observers();
        }
    }

    pub fn remove_observer_from_all_downloads(&self, observer: &Arc<dyn ProgressObserver>) {
        for transfer in lock(&self.shared.downloads).values() {
            transfer.remove_observer(observer);
        }
    }

    pub fn requests_for_download(&self, url: &Url) -> Option<Request> {
        lock(&self.shared.downloads).get(url.as_str()).and_then(|t| t.current_request())
    }

    pub fn is_downloading(&self, url: &Url) -> bool { lock(&self.shared.downloads).contains_key(url.as_str()) }

    /// Cancel the download of `url`. Every attached caller is told the
    /// download was cancelled, and the next call for `url` starts over.
    pub fn cancel_download(&self, url: &Url) -> bool {
        let removed = lock(&self.shared.downloads).remove(url.as_str());
        match removed {
            Some(transfer) => {
                cancel_transfer(&transfer);
                true
            }
            None => false,
        }
    }

    pub fn cancel_all_downloads(&self) {
        let all = std::mem::take(&mut *lock(&self.shared.downloads));
        for transfer in all.into_values() {
            cancel_transfer(&transfer);
        }
    }

    /// Remove the cached copy of `url` and its metadata. Absent files are
    /// not an error.
    pub fn delete_cached_file(&self, url: &Url) -> Result<bool> { self.delete_cached_path(&self.cache_path_for(url)) }

    pub fn delete_cached_path(&self, path: &Path) -> Result<bool> {
        courier_fs::remove_if_exists(&RemoteMetadata::sidecar_path(path))?;
        Ok(courier_fs::remove_if_exists(path)?)
    }

    // -- uploads --------------------------------------------------------------

    /// Upload `local` to `remote`. Calls for the same pair share one
    /// exchange.
    pub fn upload_file<F>(&self, local: &Path, remote: &Url, options: UploadOptions, completion: F)
    where
        F: FnOnce(&TransferOutcome) + Send + 'static,
    {
        let key = (local.to_path_buf(), remote.as_str().to_string());
        let UploadOptions {
            observers,
            enqueue,
            mode,
        } = options;

        let mut uploads = lock(&self.shared.uploads);
        if let Some(existing) = uploads.get(&key) {
            tracing::debug!(url = %remote, "joining running upload");
            join(existing, observers, Some(Box::new(completion)), None);
            return;
        }
        let transfer = Transfer::new(format!("{} -> {}", local.display(), remote));
        join(&transfer, observers, Some(Box::new(completion)), None);
        uploads.insert(key.clone(), transfer.clone());
        tracing::info!(file = %local.display(), url = %remote, "upload started");
        tokio::spawn(run_upload(self.shared.clone(), transfer, key, remote.clone(), mode, enqueue));
    }

    pub async fn upload(&self, local: &Path, remote: &Url, options: UploadOptions) -> TransferOutcome {
        let (tx, rx) = oneshot::channel();
        self.upload_file(local, remote, options, move |outcome| {
            let _ = tx.send(outcome.clone());
        });
        rx.await.unwrap_or_else(|_| TransferOutcome::cancelled(None))
    }

    fn uploads_where(&self, keep: impl Fn(&UploadKey) -> bool) -> Vec<Arc<Transfer>> {
        lock(&self.shared.uploads)
            .iter()
            .filter(|(k, _)| keep(k))
            .map(|(_, t)| t.clone())
            .collect()
    }

    pub fn add_upload_observer(&self, remote: &Url, observer: Arc<dyn ProgressObserver>) -> bool {
        let matching = self.uploads_where(|(_, r)| r == remote.as_str());
        for transfer in &matching {
            transfer.add_observer(observer.clone());
        }
        !matching.is_empty()
    }

    pub fn add_upload_file_observer(&self, local: &Path, observer: Arc<dyn ProgressObserver>) -> bool {
        let matching = self.uploads_where(|(l, _)| l == local);
        for transfer in &matching {
            transfer.add_observer(observer.clone());
        }
        !matching.is_empty()
    }

    pub fn remove_upload_observer(&self, remote: &Url, observer: &Arc<dyn ProgressObserver>) {
        for transfer in self.uploads_where(|(_, r)| r == remote.as_str()) {
            transfer.remove_observer(observer);
        }
    }

    pub fn remove_upload_file_observer(&self, local: &Path, observer: &Arc<dyn ProgressObserver>) {
        for transfer in self.uploads_where(|(l, _)| l == local) {
            transfer.remove_observer(observer);
        }
    }

    pub fn remove_observers_for_upload(&self, remote: &Url) {
        for transfer in self.uploads_where(|(_, r)| r == remote.as_str()) {
            transfer.clear_observers();
        }
    }

    pub fn remove_observer_from_all_uploads(&self, observer: &Arc<dyn ProgressObserver>) {
        for transfer in self.uploads_where(|_| true) {
            transfer.remove_observer(observer);
        }
    }

    pub fn remove_observer_from_all_transfers(&self, observer: &Arc<dyn ProgressObserver>) {
        self.remove_observer_from_all_downloads(observer);
        self.remove_observer_from_all_uploads(observer);
    }

    pub fn requests_for_upload(&self, remote: &Url) -> Vec<Request> {
        self.uploads_where(|(_, r)| r == remote.as_str())
            .iter()
            .filter_map(|t| t.current_request())
            .collect()
    }

    fn cancel_uploads_where(&self, keep: impl Fn(&UploadKey) -> bool) -> usize {
        let removed: Vec<Arc<Transfer>> = {
            let mut uploads = lock(&self.shared.uploads);
            let keys: Vec<UploadKey> = uploads.keys().filter(|k| keep(k)).cloned().collect();
            keys.iter().filter_map(|k| uploads.remove(k)).collect()
        };
        for transfer in &removed {
            cancel_transfer(transfer);
        }
        removed.len()
    }

    pub fn cancel_upload(&self, remote: &Url) -> usize { self.cancel_uploads_where(|(_, r)| r == remote.as_str()) }

    pub fn cancel_upload_of_file(&self, local: &Path) -> usize { self.cancel_uploads_where(|(l, _)| l == local) }

    pub fn cancel_all_uploads(&self) -> usize { self.cancel_uploads_where(|_| true) }
}

impl fmt::Debug for TransferManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferManager")
            .field("cache_dir", &self.shared.schema.cache_dir())
            .field("downloads", &lock(&self.shared.downloads).len())
            .field("uploads", &lock(&self.shared.uploads).len())
            .finish_non_exhaustive()
    }
}

fn join(
    transfer: &Arc<Transfer>,
    observers: Vec<Arc<dyn ProgressObserver>>,
    completion: Option<TransferCallback>,
    on_update: Option<UpdateCallback>,
) {
    for observer in observers {
        transfer.add_observer(observer);
    }
    if let Some(on_update) = on_update {
        transfer.add_update_callback(on_update);
    }
    if let Some(late) = completion.and_then(|c| transfer.add_completion(c)) {
        late(&TransferOutcome::cancelled(transfer.current_request()));
    }
}

fn cancel_transfer(transfer: &Transfer) {
    tracing::info!(transfer = transfer.label(), "transfer cancelled");
    let request = transfer.cancel();
    transfer.resolve(TransferOutcome::cancelled(request));
}

struct DownloadPlan {
    cache_path: Option<PathBuf>,
    check:      bool,
    enqueue:    bool,
}

fn dispatch_request(shared: &Shared, request: &Request, queue: &ExecutionQueue, enqueue: bool) {
    if enqueue {
        shared.dispatch.enqueue_in(request, queue);
    } else {
        request.start();
    }
}

fn forward_progress(request: &Request, transfer: &Arc<Transfer>) {
    let weak: Weak<Transfer> = Arc::downgrade(transfer);
    request.on_progress(move |value: f32| {
        if let Some(transfer) = weak.upgrade() {
            transfer.broadcast(value);
        }
    });
}

/// Remove the download from the in-flight map, if it is still the current
/// one for `key`, then resolve it.
fn finish_download(shared: &Shared, key: &str, transfer: &Arc<Transfer>, outcome: TransferOutcome) {
    {
        let mut downloads = lock(&shared.downloads);
        if downloads.get(key).is_some_and(|t| Arc::ptr_eq(t, transfer)) {
            downloads.remove(key);
        }
    }
    transfer.resolve(outcome);
}

async fn remove_quietly(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), error = %e, "could not remove temporary file");
        }
    }
}

/// `true` unless the HEAD response shows the resource changed.
async fn unchanged_since_cached(cached: &Path, head: &Response) -> bool {
    if let Some(error) = head.error() {
        tracing::warn!(%error, "update check failed, keeping cached file");
        return true;
    }
    match RemoteMetadata::load(cached).await {
        Some(local) => local.is_unchanged(&RemoteMetadata::from_headers(head.headers())),
        None => false,
    }
}

async fn run_download(shared: Arc<Shared>, transfer: Arc<Transfer>, url: Url, plan: DownloadPlan) {
    let key = url.as_str().to_string();

    let cache_path = plan.cache_path.filter(|path| {
        let dir = path.parent().unwrap_or(shared.schema.cache_dir());
        match courier_fs::ensure_cache_dir(dir) {
            Ok(()) => true,
            Err(error) => {
                tracing::warn!(%error, "cache directory unavailable, downloading without caching");
                false
            }
        }
    });

    if let (true, Some(cached)) = (plan.check, &cache_path) {
        let head = match shared.dispatch.request(RequestConfig::new(Method::Head, url.clone()), None) {
            Ok(head) => head,
            Err(error) => {
                finish_download(&shared, &key, &transfer, TransferOutcome::new(Err(error), None));
                return;
            }
        };
        if !transfer.attach_request(&head) {
            return;
        }
        dispatch_request(&shared, &head, &shared.download_queue, plan.enqueue);
        let response = head.finished().await;
        if response.is_cancelled() || transfer.is_cancelled() {
            finish_download(&shared, &key, &transfer, TransferOutcome::cancelled(Some(head)));
            return;
        }
        if unchanged_since_cached(cached, &response).await {
            tracing::debug!(url = %url, "cached file is current");
            let outcome = TransferOutcome::new(Ok(cached.clone()), Some(head)).into_cached();
            finish_download(&shared, &key, &transfer, outcome);
            return;
        }
        tracing::info!(url = %url, "remote resource changed, downloading again");
    }

    let (staging, destination) = match staging_path(&shared, &url, cache_path.as_deref()) {
        Ok(paths) => paths,
        Err(error) => {
            finish_download(&shared, &key, &transfer, TransferOutcome::new(Err(error), None));
            return;
        }
    };

    let config = RequestConfig::get(url.clone()).target_file(&staging).atomic(false);
    let get = match shared.dispatch.request(config, None) {
        Ok(get) => get,
        Err(error) => {
            finish_download(&shared, &key, &transfer, TransferOutcome::new(Err(error), None));
            return;
        }
    };
    forward_progress(&get, &transfer);
    if !transfer.attach_request(&get) {
        return;
    }
    dispatch_request(&shared, &get, &shared.download_queue, plan.enqueue);
    let response = get.finished().await;

    if response.is_cancelled() {
        remove_quietly(&staging).await;
        finish_download(&shared, &key, &transfer, TransferOutcome::cancelled(Some(get)));
        return;
    }
    if let Some(error) = response.error() {
        remove_quietly(&staging).await;
        finish_download(&shared, &key, &transfer, TransferOutcome::new(Err(error.clone()), Some(get)));
        return;
    }

    let Some(destination) = destination else {
        finish_download(&shared, &key, &transfer, TransferOutcome::new(Ok(staging), Some(get)));
        return;
    };

    let (from, to) = (staging.clone(), destination.clone());
    let placed = tokio::task::spawn_blocking(move || courier_fs::place(&from, &to))
        .await
        .map_err(|e| e.to_string())
        .and_then(|r| r.map_err(|e| e.to_string()));
    if let Err(message) = placed {
        tracing::warn!(path = %destination.display(), %message, "could not move download into the cache");
        remove_quietly(&staging).await;
        let error = Error::CacheWrite {
            path: destination,
            message,
        };
        finish_download(&shared, &key, &transfer, TransferOutcome::new(Err(error), Some(get)));
        return;
    }

    let metadata = RemoteMetadata::from_headers(response.headers());
    if !metadata.is_empty() {
        if let Err(error) = metadata.store(&destination).await {
            tracing::warn!(%error, "could not store cache metadata");
        }
    }
    tracing::info!(url = %url, path = %destination.display(), "download finished");

    // Update listeners run before the transfer resolves.
    if plan.check {
        for on_update in transfer.take_update_callbacks() {
            on_update(&destination);
        }
    }
    finish_download(&shared, &key, &transfer, TransferOutcome::new(Ok(destination.clone()), Some(get)));
}

/// Where the body is written while downloading, and where it ends up.
fn staging_path(shared: &Shared, url: &Url, cache_path: Option<&Path>) -> Result<(PathBuf, Option<PathBuf>)> {
    match cache_path {
        Some(dest) => {
            let name = dest.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
            let dir = dest.parent().unwrap_or(shared.schema.cache_dir());
            let staging = dir.join(format!(".{name}.{}.partial", uuid::Uuid::new_v4().simple()));
            Ok((staging, Some(dest.to_path_buf())))
        }
        None => {
            let suffix = shared
                .schema
                .cache_path_for_url(url)
                .extension()
                .map(|e| format!(".{}", e.to_string_lossy()))
                .unwrap_or_default();
            let path = tempfile::Builder::new()
                .prefix("courier-")
                .suffix(&suffix)
                .tempfile()?
                .into_temp_path()
                .keep()
                .map_err(|e| e.error)?;
            Ok((path, None))
        }
    }
}

async fn run_upload(
    shared: Arc<Shared>,
    transfer: Arc<Transfer>,
    key: UploadKey,
    remote: Url,
    mode: UploadMode,
    enqueue: bool,
) {
    let local = key.0.clone();
    let config = match mode {
        UploadMode::Put => RequestConfig::new(Method::Put, remote.clone()).body(Body::File(local.clone())),
        UploadMode::Multipart { field } => {
            RequestConfig::post(remote.clone()).parameter(Parameter::file(field, local.clone()))
        }
    };
    let request = match shared.dispatch.request(config, None) {
        Ok(request) => request,
        Err(error) => {
            finish_upload(&shared, &key, &transfer, TransferOutcome::new(Err(error), None));
            return;
        }
    };
    forward_progress(&request, &transfer);
    if !transfer.attach_request(&request) {
        return;
    }
    dispatch_request(&shared, &request, &shared.upload_queue, enqueue);
    let response = request.finished().await;
    let result = match response.error() {
        None => Ok(local),
        Some(error) => Err(error.clone()),
    };
    if !response.is_cancelled() {
        tracing::info!(url = %remote, success = result.is_ok(), "upload finished");
    }
    finish_upload(&shared, &key, &transfer, TransferOutcome::new(result, Some(request)));
}

fn finish_upload(shared: &Shared, key: &UploadKey, transfer: &Arc<Transfer>, outcome: TransferOutcome) {
    {
        let mut uploads = lock(&shared.uploads);
        if uploads.get(key).is_some_and(|t| Arc::ptr_eq(t, transfer)) {
            uploads.remove(key);
        }
    }
    transfer.resolve(outcome);
}
