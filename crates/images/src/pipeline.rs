use std::io::{self, Read};
use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use core_types::{AttachmentStore, MessageId, Preferences, RequestId};
use net::{Transport, TransportError};

use crate::cache::DiskCache;
use crate::decode::{
    DecodedImage, MAX_IMAGE_BYTES, PROBE_BYTES, decode_image, downscale, encode_png, fit_width,
    probe_dimensions, read_limited, scale_factor,
};
use crate::error::ImageError;
use crate::icons::{DisplayMetrics, Icon, icon_size_px};
use crate::source::{ImageSource, content_id_key, parse_data_uri};

/// Hook run on the worker thread after a completion was queued, so the
/// owner knows to call [`ImagePipeline::pump`].
pub type WakeHook = Arc<dyn Fn() + Send + Sync>;

#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub cache_dir: PathBuf,
    pub metrics: DisplayMetrics,
    pub max_image_bytes: usize,
    /// Upper bound on what the size probe reads from the first stream.
    pub probe_bytes: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            cache_dir: std::env::temp_dir().join("mailview-images"),
            metrics: DisplayMetrics::default(),
            max_image_bytes: MAX_IMAGE_BYTES,
            probe_bytes: PROBE_BYTES,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResolveState {
    Hidden,
    NotFound,
    Unavailable,
    LocalHit,
    DataDecoded,
    CachedOnDisk,
    Fetching,
    Fetched,
    FetchFailedNetwork,
    FetchFailedDecode,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Displayable {
    Image(DecodedImage),
    Icon { icon: Icon, size_px: u32 },
}

impl Displayable {
    pub fn icon(&self) -> Option<Icon> {
        match self {
            Displayable::Icon { icon, .. } => Some(*icon),
            Displayable::Image(_) => None,
        }
    }

    pub fn image(&self) -> Option<&DecodedImage> {
        match self {
            Displayable::Image(img) => Some(img),
            Displayable::Icon { .. } => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Resolution {
    pub state: ResolveState,
    pub image: Displayable,
    /// Set only while `state` is [`ResolveState::Fetching`].
    pub request: Option<RequestId>,
}

/// Outcome of a background fetch, delivered through [`ImagePipeline::pump`].
#[derive(Clone, Debug)]
pub struct Completion {
    pub request: RequestId,
    pub owner: MessageId,
    pub locator: String,
    pub state: ResolveState,
    pub image: Displayable,
}

/// Receives late replacements for placeholders handed out by
/// [`ImagePipeline::resolve`].
pub trait DisplaySurface {
    fn replace(&mut self, request: RequestId, image: Displayable);
}

/// Maps image references to something displayable.
///
/// Embedded and cached images resolve synchronously. Remote images resolve
/// to a loading placeholder and are fetched on the injected pool; results
/// come back through a channel drained by [`ImagePipeline::pump`] on the
/// owner's thread.
pub struct ImagePipeline {
    config: PipelineConfig,
    prefs: Arc<dyn Preferences>,
    attachments: Arc<dyn AttachmentStore>,
    transport: Arc<dyn Transport>,
    pool: Arc<rayon::ThreadPool>,
    cache: DiskCache,
    next_request: RequestId,
    done_tx: mpsc::Sender<Completion>,
    done_rx: mpsc::Receiver<Completion>,
    wake: Option<WakeHook>,
}

impl ImagePipeline {
    pub fn new(
        config: PipelineConfig,
        prefs: Arc<dyn Preferences>,
        attachments: Arc<dyn AttachmentStore>,
        transport: Arc<dyn Transport>,
        pool: Arc<rayon::ThreadPool>,
    ) -> Self {
        let (done_tx, done_rx) = mpsc::channel();
        let cache = DiskCache::new(config.cache_dir.clone());
        Self {
            config,
            prefs,
            attachments,
            transport,
            pool,
            cache,
            next_request: 1,
            done_tx,
            done_rx,
            wake: None,
        }
    }

    pub fn with_wake(mut self, wake: WakeHook) -> Self {
        self.wake = Some(wake);
        self
    }

    pub fn cache(&self) -> &DiskCache {
        &self.cache
    }

    pub fn icon_size_px(&self) -> u32 {
        icon_size_px(&self.config.metrics, self.prefs.as_ref())
    }

    fn icon(&self, icon: Icon) -> Displayable {
        Displayable::Icon {
            icon,
            size_px: self.icon_size_px(),
        }
    }

    fn settled(&self, state: ResolveState, image: Displayable) -> Resolution {
        Resolution {
            state,
            image,
            request: None,
        }
    }

    /// Never blocks on the network. `width_hint` is the display width in
    /// pixels that local and fetched images are scaled down to.
    pub fn resolve(
        &mut self,
        source: &str,
        owner: MessageId,
        show: bool,
        width_hint: u32,
    ) -> Resolution {
        let source = ImageSource::parse(source);
        if source == ImageSource::Empty {
            return self.settled(ResolveState::NotFound, self.icon(Icon::BrokenImage));
        }
        if !show {
            let icon = if source.is_embedded() {
                Icon::HiddenEmbedded
            } else {
                Icon::HiddenRemote
            };
            return self.settled(ResolveState::Hidden, self.icon(icon));
        }
        match source {
            ImageSource::Empty => self.settled(ResolveState::NotFound, self.icon(Icon::BrokenImage)),
            ImageSource::ContentId(cid) => self.resolve_attachment(owner, cid, width_hint),
            ImageSource::Data(uri) => self.resolve_data(uri),
            ImageSource::Remote(locator) => self.resolve_remote(owner, locator, width_hint),
        }
    }

    fn resolve_attachment(&self, owner: MessageId, cid: &str, width_hint: u32) -> Resolution {
        let key = content_id_key(cid);
        let Some(part) = self.attachments.lookup(owner, &key) else {
            log::debug!(target: "images", "no attachment {key} for message {owner}");
            return self.settled(ResolveState::NotFound, self.icon(Icon::BrokenImage));
        };
        if !part.available() {
            return self.settled(ResolveState::Unavailable, self.icon(Icon::Unavailable));
        }
        let decoded = part
            .open()
            .map_err(ImageError::from)
            .and_then(|stream| read_limited(stream, self.config.max_image_bytes))
            .and_then(|bytes| decode_image(&bytes, self.config.max_image_bytes));
        match decoded {
            Ok(img) => {
                let img = fit_width(img, width_hint);
                self.settled(ResolveState::LocalHit, Displayable::Image(img))
            }
            Err(e) => {
                log::warn!(target: "images", "attachment {key}: {e}");
                self.settled(ResolveState::NotFound, self.icon(Icon::BrokenImage))
            }
        }
    }

    fn resolve_data(&self, uri: &str) -> Resolution {
        let decoded = parse_data_uri(uri)
            .and_then(|data| decode_image(&data.bytes, self.config.max_image_bytes));
        match decoded {
            Ok(img) => self.settled(ResolveState::DataDecoded, Displayable::Image(img)),
            Err(e) => {
                log::warn!(target: "images", "inline image: {e}");
                self.settled(ResolveState::NotFound, self.icon(Icon::BrokenImage))
            }
        }
    }

    fn resolve_remote(&mut self, owner: MessageId, locator: &str, width_hint: u32) -> Resolution {
        match self.cache.load(owner, locator) {
            Ok(Some(bytes)) => {
                return match decode_image(&bytes, self.config.max_image_bytes) {
                    Ok(img) => {
                        log::info!(target: "images", "cache hit for {locator}");
                        self.settled(ResolveState::CachedOnDisk, Displayable::Image(img))
                    }
                    Err(e) => {
                        log::warn!(target: "images", "corrupt cache entry for {locator}: {e}");
                        self.settled(ResolveState::FetchFailedDecode, self.icon(Icon::BrokenImage))
                    }
                };
            }
            Ok(None) => {}
            Err(e) => log::warn!(target: "images", "cache read for {locator}: {e}"),
        }

        let request = self.next_request;
        self.next_request += 1;
        let task = FetchTask {
            request,
            owner,
            locator: locator.to_string(),
            width_hint,
            max_bytes: self.config.max_image_bytes,
            probe_bytes: self.config.probe_bytes,
            icon_size_px: self.icon_size_px(),
            transport: Arc::clone(&self.transport),
            cache: self.cache.clone(),
            done_tx: self.done_tx.clone(),
            wake: self.wake.clone(),
        };
        log::debug!(target: "images", "request {request}: fetching {locator}");
        self.pool.spawn(move || task.run());

        Resolution {
            state: ResolveState::Fetching,
            image: self.icon(Icon::Loading),
            request: Some(request),
        }
    }

    /// Drains every completion queued so far without blocking.
    pub fn pump(&mut self) -> Vec<Completion> {
        self.done_rx.try_iter().collect()
    }

    /// Forwards queued completions to `surface`. Returns how many were
    /// delivered.
    pub fn pump_into(&mut self, surface: &mut dyn DisplaySurface) -> usize {
        let mut delivered = 0;
        for done in self.pump() {
            surface.replace(done.request, done.image);
            delivered += 1;
        }
        delivered
    }

    /// Blocks until one completion arrives or `timeout` passes.
    pub fn wait_completion(&mut self, timeout: Duration) -> Option<Completion> {
        self.done_rx.recv_timeout(timeout).ok()
    }
}

struct FetchTask {
    request: RequestId,
    owner: MessageId,
    locator: String,
    width_hint: u32,
    max_bytes: usize,
    probe_bytes: u64,
    icon_size_px: u32,
    transport: Arc<dyn Transport>,
    cache: DiskCache,
    done_tx: mpsc::Sender<Completion>,
    wake: Option<WakeHook>,
}

impl FetchTask {
    fn run(self) {
        let (state, image) = match self.fetch() {
            Ok(img) => {
                self.persist(&img);
                log::info!(
                    target: "images",
                    "request {}: fetched {} ({}x{})",
                    self.request,
                    self.locator,
                    img.width(),
                    img.height()
                );
                (ResolveState::Fetched, Displayable::Image(img))
            }
            Err(e) if e.is_network() => {
                log::warn!(target: "images", "request {}: {}: {e}", self.request, self.locator);
                (ResolveState::FetchFailedNetwork, self.icon(Icon::Offline))
            }
            Err(e) => {
                log::warn!(target: "images", "request {}: {}: {e}", self.request, self.locator);
                (ResolveState::FetchFailedDecode, self.icon(Icon::BrokenImage))
            }
        };
        let done = Completion {
            request: self.request,
            owner: self.owner,
            locator: self.locator,
            state,
            image,
        };
        // The owner may have dropped the pipeline; nothing left to notify.
        if self.done_tx.send(done).is_ok() {
            if let Some(wake) = &self.wake {
                wake();
            }
        }
    }

    fn icon(&self, icon: Icon) -> Displayable {
        Displayable::Icon {
            icon,
            size_px: self.icon_size_px,
        }
    }

    /// Probe, then fetch and decode at the probed scale.
    fn fetch(&self) -> Result<DecodedImage, ImageError> {
        let mut head = Vec::new();
        self.transport
            .open_stream(&self.locator)?
            .take(self.probe_bytes)
            .read_to_end(&mut head)
            .map_err(stream_error)?;
        let factor = match probe_dimensions(&head[..], self.probe_bytes) {
            Ok((width, _)) => scale_factor(width, self.width_hint),
            Err(e) => {
                log::debug!(target: "images", "probe of {} failed: {e}", self.locator);
                1
            }
        };
        let stream = self.transport.open_stream(&self.locator)?;
        let bytes = read_limited(stream, self.max_bytes).map_err(|e| match e {
            ImageError::Io(io) => stream_error(io),
            other => other,
        })?;
        let img = decode_image(&bytes, self.max_bytes)?;
        Ok(downscale(img, factor))
    }

    fn persist(&self, img: &DecodedImage) {
        let stored = encode_png(img).and_then(|png| {
            self.cache
                .store(self.owner, &self.locator, &png)
                .map_err(ImageError::from)
        });
        if let Err(e) = stored {
            log::warn!(target: "images", "could not cache {}: {e}", self.locator);
        }
    }
}

/// A read failure on a transport stream is a network failure, not a bad
/// image.
fn stream_error(e: io::Error) -> ImageError {
    ImageError::Transport(TransportError::Network(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::tests::png_bytes;
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use core_types::{MemoryAttachment, MemoryAttachmentStore, MemoryPreferences};
    use net::TransportError;
    use std::io::{Cursor, Read};

    struct NoNetwork;

    impl Transport for NoNetwork {
        fn open_stream(&self, _uri: &str) -> Result<Box<dyn Read + Send>, TransportError> {
            Err(TransportError::Network("offline".into()))
        }
    }

    struct Served(Vec<u8>);

    impl Transport for Served {
        fn open_stream(&self, _uri: &str) -> Result<Box<dyn Read + Send>, TransportError> {
            Ok(Box::new(Cursor::new(self.0.clone())))
        }
    }

    fn pipeline(
        dir: &std::path::Path,
        store: MemoryAttachmentStore,
        transport: Arc<dyn Transport>,
    ) -> ImagePipeline {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(2)
            .build()
            .expect("pool");
        ImagePipeline::new(
            PipelineConfig {
                cache_dir: dir.to_path_buf(),
                ..PipelineConfig::default()
            },
            Arc::new(MemoryPreferences::new()),
            Arc::new(store),
            transport,
            Arc::new(pool),
        )
    }

    #[test]
    fn empty_and_hidden_sources() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut p = pipeline(dir.path(), MemoryAttachmentStore::new(), Arc::new(NoNetwork));
        let r = p.resolve("", 1, true, 100);
        assert_eq!(r.state, ResolveState::NotFound);
        assert_eq!(
            r.image,
            Displayable::Icon {
                icon: Icon::BrokenImage,
                size_px: 48
            }
        );
        let r = p.resolve("cid:a", 1, false, 100);
        assert_eq!((r.state, r.image.icon()), (ResolveState::Hidden, Some(Icon::HiddenEmbedded)));
        let r = p.resolve("https://x.example/a.png", 1, false, 100);
        assert_eq!((r.state, r.image.icon()), (ResolveState::Hidden, Some(Icon::HiddenRemote)));
        assert!(r.request.is_none());
    }

    #[test]
    fn attachments_resolve_locally() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut store = MemoryAttachmentStore::new();
        store.insert(1, "big@x", MemoryAttachment::new("image/png", png_bytes(400, 100)));
        store.insert(1, "bad@x", MemoryAttachment::new("image/png", b"nope".to_vec()));
        store.insert(1, "later@x", MemoryAttachment::unavailable("image/png"));
        let mut p = pipeline(dir.path(), store, Arc::new(NoNetwork));

        let r = p.resolve("cid:big@x", 1, true, 100);
        assert_eq!(r.state, ResolveState::LocalHit);
        assert_eq!(r.image.image().map(DecodedImage::size_px), Some([100, 25]));

        let r = p.resolve("cid:bad@x", 1, true, 100);
        assert_eq!((r.state, r.image.icon()), (ResolveState::NotFound, Some(Icon::BrokenImage)));
        let r = p.resolve("cid:later@x", 1, true, 100);
        assert_eq!((r.state, r.image.icon()), (ResolveState::Unavailable, Some(Icon::Unavailable)));
        let r = p.resolve("cid:missing@x", 1, true, 100);
        assert_eq!((r.state, r.image.icon()), (ResolveState::NotFound, Some(Icon::BrokenImage)));
    }

    #[test]
    fn one_pixel_data_uri_decodes_immediately() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut p = pipeline(dir.path(), MemoryAttachmentStore::new(), Arc::new(NoNetwork));
        let uri = format!("data:image/png;base64,{}", STANDARD.encode(png_bytes(1, 1)));
        let r = p.resolve(&uri, 1, true, 10);
        assert_eq!(r.state, ResolveState::DataDecoded);
        assert_eq!(r.image.image().map(DecodedImage::size_px), Some([1, 1]));

        let r = p.resolve("data:image/png;base64,@@@", 1, true, 10);
        assert_eq!((r.state, r.image.icon()), (ResolveState::NotFound, Some(Icon::BrokenImage)));
    }

    #[test]
    fn network_failure_maps_to_offline() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut p = pipeline(dir.path(), MemoryAttachmentStore::new(), Arc::new(NoNetwork));
        let r = p.resolve("https://x.example/a.png", 3, true, 100);
        assert_eq!((r.state, r.image.icon()), (ResolveState::Fetching, Some(Icon::Loading)));
        let done = p.wait_completion(Duration::from_secs(10)).expect("completion");
        assert_eq!(Some(done.request), r.request);
        assert_eq!(done.state, ResolveState::FetchFailedNetwork);
        assert_eq!(done.image.icon(), Some(Icon::Offline));
    }

    struct ResetMidStream;

    impl Read for ResetMidStream {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset by peer"))
        }
    }

    struct Resetting;

    impl Transport for Resetting {
        fn open_stream(&self, _uri: &str) -> Result<Box<dyn Read + Send>, TransportError> {
            Ok(Box::new(ResetMidStream))
        }
    }

    #[test]
    fn stream_read_error_maps_to_offline() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut p = pipeline(dir.path(), MemoryAttachmentStore::new(), Arc::new(Resetting));
        p.resolve("https://x.example/a.png", 3, true, 100);
        let done = p.wait_completion(Duration::from_secs(10)).expect("completion");
        assert_eq!(done.state, ResolveState::FetchFailedNetwork);
        assert_eq!(done.image.icon(), Some(Icon::Offline));
    }

    #[test]
    fn undecodable_response_maps_to_broken_image() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut p = pipeline(
            dir.path(),
            MemoryAttachmentStore::new(),
            Arc::new(Served(b"<html>".to_vec())),
        );
        p.resolve("https://x.example/a.png", 3, true, 100);
        let done = p.wait_completion(Duration::from_secs(10)).expect("completion");
        assert_eq!(done.state, ResolveState::FetchFailedDecode);
        assert_eq!(done.image.icon(), Some(Icon::BrokenImage));
    }

    #[test]
    fn fetched_image_is_cached_and_reused() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut p = pipeline(
            dir.path(),
            MemoryAttachmentStore::new(),
            Arc::new(Served(png_bytes(64, 32))),
        );
        let locator = "https://x.example/a.png";
        p.resolve(locator, 5, true, 16);
        let done = p.wait_completion(Duration::from_secs(10)).expect("completion");
        assert_eq!(done.state, ResolveState::Fetched);
        assert_eq!(done.image.image().map(DecodedImage::size_px), Some([16, 8]));

        let again = p.resolve(locator, 5, true, 16);
        assert_eq!(again.state, ResolveState::CachedOnDisk);
        assert!(again.request.is_none());
        assert_eq!(again.image.image().map(DecodedImage::size_px), Some([16, 8]));
    }

    #[test]
    fn corrupt_cache_entry_is_broken() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut p = pipeline(dir.path(), MemoryAttachmentStore::new(), Arc::new(NoNetwork));
        p.cache().store(1, "https://x.example/c.png", b"junk").expect("store");
        let r = p.resolve("https://x.example/c.png", 1, true, 100);
        assert_eq!((r.state, r.image.icon()), (ResolveState::FetchFailedDecode, Some(Icon::BrokenImage)));
    }

    #[test]
    fn pump_into_forwards_completions() {
        struct Surface(Vec<(RequestId, Option<Icon>)>);
        impl DisplaySurface for Surface {
            fn replace(&mut self, request: RequestId, image: Displayable) {
                self.0.push((request, image.icon()));
            }
        }

        let dir = tempfile::tempdir().expect("temp dir");
        let woken = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = Arc::clone(&woken);
        let mut p = pipeline(dir.path(), MemoryAttachmentStore::new(), Arc::new(NoNetwork))
            .with_wake(Arc::new(move || {
                counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            }));
        let r = p.resolve("https://x.example/a.png", 1, true, 100);
        let request = r.request.expect("request id");

        let mut surface = Surface(Vec::new());
        let deadline = std::time::Instant::now() + Duration::from_secs(10);
        while surface.0.is_empty() && std::time::Instant::now() < deadline {
            p.pump_into(&mut surface);
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(surface.0, vec![(request, Some(Icon::Offline))]);
        // The hook runs right after the send, possibly after we pumped.
        while woken.load(std::sync::atomic::Ordering::SeqCst) == 0
            && std::time::Instant::now() < deadline
        {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(woken.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
