use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use crate::capture::domain::frame_source::FrameSource;
use crate::detection::domain::face_detector::FaceDetector;
use crate::detection::domain::face_embedder::FaceEmbedder;
use crate::identity::domain::encoding::{Encoding, FaceId, NO_FACE};
use crate::identity::domain::face_cache::FaceCache;
use crate::recognition::domain::face_event::EventQueues;
use crate::recognition::domain::frame_observer::FrameObserver;
use crate::recognition::domain::recognizer_error::RecognizerError;
use crate::recognition::domain::track::{Sighting, TrackTable};
use crate::shared::config::RecognizerConfig;
use crate::shared::image::Image;
use crate::shared::rectangle::Rectangle;

pub type SharedCache = Arc<Mutex<dyn FaceCache>>;
pub type SharedSource = Arc<dyn FrameSource>;

pub type AppearCallback = Box<dyn FnMut(RecognizerId, FaceId, Rectangle, &Encoding) + Send>;
pub type DisappearCallback = Box<dyn FnMut(RecognizerId, FaceId) + Send>;
pub type MoveCallback = Box<dyn FnMut(RecognizerId, FaceId, Rectangle) + Send>;

static NEXT_RECOGNIZER_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies the recognizer an event came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecognizerId(u64);

impl fmt::Display for RecognizerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "recognizer-{}", self.0)
    }
}

/// State shared between the caller and the worker, guarded by one lock.
struct Interface {
    cache: Option<SharedCache>,
    source: Option<SharedSource>,
    detector: Box<dyn FaceDetector>,
    embedder: Box<dyn FaceEmbedder>,
    tracks: TrackTable,
    events: EventQueues,
    observer: Option<Box<dyn FrameObserver>>,
}

#[derive(Default)]
struct Callbacks {
    appear: Vec<AppearCallback>,
    disappear: Vec<DisappearCallback>,
    moves: Vec<MoveCallback>,
}

struct Shared {
    id: RecognizerId,
    config: RecognizerConfig,
    interface: Mutex<Interface>,
    callbacks: Mutex<Callbacks>,
    cancelled: AtomicBool,
    frames_processed: AtomicU64,
}

/// Continuous face recognizer.
///
/// A background worker pulls frames from the [`FrameSource`], resolves every
/// detected face to an identity through the [`FaceCache`] and turns the
/// result into appear, move and disappear events. Events are queued until
/// [`Recognizer::poll`] delivers them to the registered callbacks on the
/// calling thread.
///
/// Lock order is interface, then cache. Code holding the cache lock must not
/// call into the recognizer.
pub struct Recognizer {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Recognizer {
    pub fn new(
        detector: Box<dyn FaceDetector>,
        embedder: Box<dyn FaceEmbedder>,
        config: RecognizerConfig,
    ) -> Self {
        let id = RecognizerId(NEXT_RECOGNIZER_ID.fetch_add(1, Ordering::Relaxed));
        let interface = Interface {
            cache: None,
            source: None,
            detector,
            embedder,
            tracks: TrackTable::new(config.ttl_max),
            events: EventQueues::default(),
            observer: None,
        };
        Self {
            shared: Arc::new(Shared {
                id,
                config,
                interface: Mutex::new(interface),
                callbacks: Mutex::new(Callbacks::default()),
                cancelled: AtomicBool::new(false),
                frames_processed: AtomicU64::new(0),
            }),
            worker: Mutex::new(None),
        }
    }

    /// Attaches an observer that sees every processed frame on the worker.
    pub fn with_observer(self, observer: Box<dyn FrameObserver>) -> Self {
        self.shared.lock_interface().observer = Some(observer);
        self
    }

    pub fn id(&self) -> RecognizerId {
        self.shared.id
    }

    pub fn is_running(&self) -> bool {
        lock(&self.worker).is_some()
    }

    /// Frames the worker has fully processed since construction.
    pub fn frames_processed(&self) -> u64 {
        self.shared.frames_processed.load(Ordering::Acquire)
    }

    pub fn get_cache(&self) -> Option<SharedCache> {
        self.shared.lock_interface().cache.clone()
    }

    /// Takes effect from the next frame, also while running.
    pub fn set_cache(&self, cache: SharedCache) {
        self.shared.lock_interface().cache = Some(cache);
    }

    pub fn get_source(&self) -> Option<SharedSource> {
        self.shared.lock_interface().source.clone()
    }

    /// Takes effect from the next wait, also while running.
    pub fn set_source(&self, source: SharedSource) {
        self.shared.lock_interface().source = Some(source);
    }

    pub fn register_face_appear<F>(&self, callback: F)
    where
        F: FnMut(RecognizerId, FaceId, Rectangle, &Encoding) + Send + 'static,
    {
        lock(&self.shared.callbacks).appear.push(Box::new(callback));
    }

    pub fn register_face_disappear<F>(&self, callback: F)
    where
        F: FnMut(RecognizerId, FaceId) + Send + 'static,
    {
        lock(&self.shared.callbacks).disappear.push(Box::new(callback));
    }

    pub fn register_face_move<F>(&self, callback: F)
    where
        F: FnMut(RecognizerId, FaceId, Rectangle) + Send + 'static,
    {
        lock(&self.shared.callbacks).moves.push(Box::new(callback));
    }

    /// Starts the worker thread.
    ///
    /// A missing cache or source is not an error: the worker idles until
    /// both are set.
    pub fn start(&self) -> Result<(), RecognizerError> {
        let mut worker = lock(&self.worker);
        if worker.is_some() {
            return Err(RecognizerError::AlreadyRunning);
        }
        self.shared.cancelled.store(false, Ordering::Relaxed);

        let shared = self.shared.clone();
        let handle = thread::Builder::new()
            .name(self.shared.id.to_string())
            .spawn(move || shared.run())
            .map_err(RecognizerError::Spawn)?;
        *worker = Some(handle);

        log::info!("{}: continuous recognition started", self.shared.id);
        Ok(())
    }

    /// Signals the worker and joins it. Must not be called from a
    /// [`FrameObserver`], which runs on the worker itself.
    pub fn stop(&self) -> Result<(), RecognizerError> {
        let mut worker = lock(&self.worker);
        let handle = worker.take().ok_or(RecognizerError::NotRunning)?;
        self.shared.cancelled.store(true, Ordering::Relaxed);
        let joined = handle.join();
        drop(worker);

        joined.map_err(|_| RecognizerError::WorkerPanicked)?;
        log::info!(
            "{}: continuous recognition stopped after {} frame(s)",
            self.shared.id,
            self.frames_processed()
        );
        Ok(())
    }

    /// Delivers queued events to the registered callbacks and returns the
    /// number of callback invocations.
    ///
    /// Appear events go first, then disappear, then move. Callbacks run on the
    /// calling thread without the interface lock held, so they may call back
    /// into the recognizer. The callback lock is held throughout, so calling
    /// `poll` or any `register_*` method from inside a callback deadlocks.
    pub fn poll(&self) -> usize {
        let mut callbacks = lock(&self.shared.callbacks);
        let events = std::mem::take(&mut self.shared.lock_interface().events);
        if events.is_empty() {
            return 0;
        }

        let id = self.shared.id;
        let mut delivered = 0;
        for (face, rect, encoding) in &events.appear {
            for callback in callbacks.appear.iter_mut() {
                callback(id, *face, *rect, encoding);
                delivered += 1;
            }
        }
        for face in &events.disappear {
            for callback in callbacks.disappear.iter_mut() {
                callback(id, *face);
                delivered += 1;
            }
        }
        for (face, rect) in &events.moves {
            for callback in callbacks.moves.iter_mut() {
                callback(id, *face, *rect);
                delivered += 1;
            }
        }
        delivered
    }

    /// Renames an identity in the cache and carries its live track over.
    ///
    /// When `new` is already tracked, its track survives and a disappear
    /// event is queued for `old`.
    pub fn rename_identity(&self, old: FaceId, new: FaceId) -> Result<(), RecognizerError> {
        let mut interface = self.shared.lock_interface();
        let cache = interface.cache.clone().ok_or(RecognizerError::NoCache)?;
        lock(&cache).rename(old, new)?;
        if let Some(event) = interface.tracks.rename(old, new) {
            interface.events.push(event);
        }
        log::info!("{}: renamed face {old} to {new}", self.shared.id);
        Ok(())
    }
}

impl Drop for Recognizer {
    fn drop(&mut self) {
        match self.stop() {
            Ok(()) | Err(RecognizerError::NotRunning) => {}
            Err(e) => log::error!("{}: failed to stop on drop: {e}", self.shared.id),
        }
    }
}

impl Shared {
    fn lock_interface(&self) -> MutexGuard<'_, Interface> {
        lock(&self.interface)
    }

    fn run(&self) {
        let timeout = self.config.wait_timeout();
        while !self.cancelled.load(Ordering::Relaxed) {
            // The source is waited on without the interface lock so callers
            // can reconfigure or poll while no frame is available.
            let source = self.lock_interface().source.clone();
            let frame = match source {
                Some(source) => source.wait(timeout),
                None => {
                    thread::sleep(timeout);
                    None
                }
            };
            if self.cancelled.load(Ordering::Relaxed) {
                break;
            }
            let Some(image) = frame else {
                continue;
            };

            if self.lock_interface().process(&image, self.config.tolerance) {
                self.frames_processed.fetch_add(1, Ordering::Release);
            }
        }
        log::debug!("{}: worker exiting", self.id);
    }
}

impl Interface {
    /// Returns false when the frame was skipped for lack of a cache.
    fn process(&mut self, image: &Image, tolerance: f64) -> bool {
        let Some(cache) = self.cache.clone() else {
            log::warn!("Frame {} skipped: no face cache set", image.index());
            return false;
        };

        let faces = self.analyze(image);
        let sightings: Vec<Sighting> = {
            let mut cache = lock(&cache);
            faces
                .into_iter()
                .filter_map(|(rect, encoding)| resolve(&mut *cache, rect, encoding, tolerance))
                .collect()
        };
        let resolved: Vec<(FaceId, Rectangle)> = sightings.iter().map(|s| (s.id, s.rect)).collect();

        for event in self.tracks.update(sightings) {
            self.events.push(event);
        }
        if let Some(observer) = self.observer.as_mut() {
            observer.observe(image, &resolved);
        }
        true
    }

    fn analyze(&mut self, image: &Image) -> Vec<(Rectangle, Encoding)> {
        let rects = match self.detector.detect(image) {
            Ok(rects) => rects,
            Err(e) => {
                log::warn!("Detection failed on frame {}: {e}", image.index());
                return Vec::new();
            }
        };
        rects
            .into_iter()
            .filter_map(|rect| match self.embedder.embed(image, &rect) {
                Ok(encoding) => Some((rect, encoding)),
                Err(e) => {
                    log::warn!("Embedding failed for {rect} on frame {}: {e}", image.index());
                    None
                }
            })
            .collect()
    }
}

fn resolve(
    cache: &mut dyn FaceCache,
    rect: Rectangle,
    encoding: Encoding,
    tolerance: f64,
) -> Option<Sighting> {
    let mut id = cache.query(&encoding, tolerance);
    if id == NO_FACE {
        id = match cache.insert_unknown(encoding.clone()) {
            Ok(id) => id,
            Err(e) => {
                log::warn!("Could not remember face at {rect}: {e}");
                return None;
            }
        };
    }
    Some(Sighting { id, rect, encoding })
}

fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
