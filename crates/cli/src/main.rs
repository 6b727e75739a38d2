use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};

use facewatch_core::capture::domain::frame_source::FrameSource;
use facewatch_core::capture::infrastructure::image_sequence::ImageSequence;
use facewatch_core::capture::infrastructure::mailbox_source::MailboxSource;
use facewatch_core::capture::infrastructure::queued_source::QueuedSource;
use facewatch_core::detection::infrastructure::scripted_faces::FaceScript;
use facewatch_core::identity::domain::encoding::{Encoding, FaceId};
use facewatch_core::identity::domain::face_cache::FaceCache;
use facewatch_core::identity::infrastructure::json_face_cache::JsonFaceCache;
use facewatch_core::identity::infrastructure::memory_face_cache::MemoryFaceCache;
use facewatch_core::recognition::infrastructure::log_frame_observer::LogFrameObserver;
use facewatch_core::recognition::infrastructure::recognizer::{
    Recognizer, SharedCache, SharedSource,
};
use facewatch_core::shared::config::RecognizerConfig;
use facewatch_core::shared::constants::{STORE_DIR_NAME, STORE_FILE_NAME};
use facewatch_core::shared::image::Image;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

type SendError = Box<dyn std::error::Error + Send + Sync>;

/// Face identity store and continuous recognition replay.
#[derive(Parser)]
#[command(name = "facewatch")]
struct Cli {
    /// Identity store file (default: <data dir>/facewatch/faces.json).
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// Recognizer settings as JSON; flags below override it.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Match tolerance on encoding distance.
    #[arg(long, global = true)]
    tolerance: Option<f64>,

    /// Consecutive missed frames before a face disappears.
    #[arg(long, global = true)]
    ttl: Option<u32>,

    /// How long the worker waits for a frame before re-checking for stop.
    #[arg(long, global = true)]
    wait_timeout_ms: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List every stored identity.
    List,
    /// Store a user identity from a JSON array of 128 numbers.
    Add {
        id: FaceId,
        encoding: PathBuf,

        /// Name to greet this face with.
        #[arg(long)]
        name: Option<String>,
    },
    /// Set or clear the name of a stored identity.
    Name {
        #[arg(allow_negative_numbers = true)]
        id: FaceId,
        name: Option<String>,
    },
    /// Forget an identity.
    Delete {
        #[arg(allow_negative_numbers = true)]
        id: FaceId,
    },
    /// Re-key an identity, e.g. to give an unknown face a user id.
    Rename {
        #[arg(allow_negative_numbers = true)]
        old: FaceId,
        new: FaceId,
    },
    /// Replay a recorded session through a live recognizer.
    Watch {
        /// Face script (JSON) with the detections of every frame.
        script: PathBuf,

        /// Directory of frame images; blank frames are used otherwise.
        #[arg(long)]
        frames: Option<PathBuf>,

        /// Submit frames at this rate instead of as fast as possible.
        #[arg(long)]
        fps: Option<f64>,

        /// Queue frames instead of keeping only the latest one.
        #[arg(long)]
        lossless: bool,

        /// Use a throwaway in-memory store.
        #[arg(long)]
        memory: bool,

        /// Log every processed frame at debug level.
        #[arg(long)]
        trace_frames: bool,
    },
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let store = match &cli.store {
        Some(path) => path.clone(),
        None => default_store_path()?,
    };

    match &cli.command {
        Command::List => {
            let cache = JsonFaceCache::open(&store)?;
            for id in cache.ids() {
                let kind = if id > 0 { "user" } else { "unknown" };
                let profile = cache.profile(id)?;
                println!(
                    "{id}\t{kind}\t{}\t{}\t{}",
                    profile.label(id),
                    format_time(profile.first_seen),
                    format_time(profile.last_seen)
                );
            }
        }
        Command::Add { id, encoding, name } => {
            let encoding = read_encoding(encoding)?;
            let mut cache = JsonFaceCache::open(&store)?;
            cache.insert(*id, encoding)?;
            if name.is_some() {
                cache.set_name(*id, name.clone())?;
            }
            log::info!("Stored face {id} in {}", store.display());
        }
        Command::Name { id, name } => {
            JsonFaceCache::open(&store)?.set_name(*id, name.clone())?;
            match name {
                Some(name) => log::info!("Face {id} is now called {name}"),
                None => log::info!("Cleared the name of face {id}"),
            }
        }
        Command::Delete { id } => {
            JsonFaceCache::open(&store)?.remove(*id)?;
            log::info!("Deleted face {id} from {}", store.display());
        }
        Command::Rename { old, new } => {
            JsonFaceCache::open(&store)?.rename(*old, *new)?;
            log::info!("Renamed face {old} to {new} in {}", store.display());
        }
        Command::Watch {
            script,
            frames,
            fps,
            lossless,
            memory,
            trace_frames,
        } => {
            let config = build_config(&cli)?;
            let cache: SharedCache = if *memory {
                Arc::new(Mutex::new(MemoryFaceCache::new()))
            } else {
                Arc::new(Mutex::new(JsonFaceCache::open(&store)?))
            };
            let options = WatchOptions {
                frames: frames.clone(),
                interval: frame_interval(*fps)?,
                lossless: *lossless,
                trace_frames: *trace_frames,
            };
            run_watch(script, cache, config, options)?;
        }
    }

    Ok(())
}

struct WatchOptions {
    frames: Option<PathBuf>,
    interval: Option<Duration>,
    lossless: bool,
    trace_frames: bool,
}

fn run_watch(
    script_path: &Path,
    cache: SharedCache,
    config: RecognizerConfig,
    options: WatchOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let script = FaceScript::load(script_path)?;
    let (width, height) = (script.width, script.height);
    let sequence = options.frames.as_deref().map(ImageSequence::open).transpose()?;
    let recorded = sequence
        .as_ref()
        .map_or(script.frames.len(), ImageSequence::len);
    let trailing = config.ttl_max as usize;

    let (detector, embedder) = script.into_collaborators();
    let mut recognizer = Recognizer::new(Box::new(detector), Box::new(embedder), config);
    if options.trace_frames {
        recognizer = recognizer.with_observer(Box::new(LogFrameObserver::new()));
    }

    let mailbox = (!options.lossless).then(|| Arc::new(MailboxSource::new()));
    let source: SharedSource = match &mailbox {
        Some(mailbox) => mailbox.clone(),
        None => Arc::new(QueuedSource::new()),
    };
    recognizer.set_cache(cache.clone());
    recognizer.set_source(source.clone());

    let store = cache.clone();
    recognizer.register_face_appear(move |_, id, rect, _| {
        let label = note_sighting(&store, id, Utc::now());
        println!("appear {id} {rect} {label}");
    });
    recognizer.register_face_disappear(move |_, id| {
        let label = note_sighting(&cache, id, Utc::now());
        println!("disappear {id} {label}");
    });
    recognizer.register_face_move(|_, id, rect| println!("move {id} {rect}"));
    recognizer.start()?;

    log::info!(
        "Replaying {recorded} frame(s) plus {trailing} trailing from {}",
        script_path.display()
    );
    let interval = options.interval;
    let producer = thread::spawn(move || {
        produce(&*source, sequence, width, height, recorded, trailing, interval)
    });

    let dropped = || mailbox.as_ref().map_or(0, |m| m.dropped_frames());
    let mut producer = Some(producer);
    let mut submitted = None;
    let mut delivered = 0;
    loop {
        delivered += recognizer.poll();

        if producer.as_ref().is_some_and(thread::JoinHandle::is_finished) {
            if let Some(handle) = producer.take() {
                let count = handle
                    .join()
                    .map_err(|_| "frame producer panicked")?
                    .map_err(|e| e.to_string())?;
                submitted = Some(count as u64);
            }
        }
        // Every submitted frame is either processed or overwritten in the mailbox.
        if let Some(total) = submitted {
            if recognizer.frames_processed() + dropped() >= total {
                break;
            }
        }
        thread::sleep(POLL_INTERVAL);
    }

    recognizer.stop()?;
    delivered += recognizer.poll();
    log::info!(
        "Processed {} frame(s), dropped {}, delivered {delivered} event(s)",
        recognizer.frames_processed(),
        dropped()
    );
    Ok(())
}

/// Submits the recorded frames, then blank frames so every track expires.
fn produce(
    source: &dyn FrameSource,
    sequence: Option<ImageSequence>,
    width: u32,
    height: u32,
    recorded: usize,
    trailing: usize,
    interval: Option<Duration>,
) -> Result<usize, SendError> {
    let submit = |image: Image| {
        source.update(image);
        if let Some(interval) = interval {
            thread::sleep(interval);
        }
    };

    match sequence {
        Some(sequence) => {
            for frame in sequence.frames(0) {
                submit(frame.map_err(|e| -> SendError { e.to_string().into() })?);
            }
        }
        None => (0..recorded).for_each(|index| submit(Image::blank(width, height, index))),
    }
    for index in recorded..recorded + trailing {
        submit(Image::blank(width, height, index));
    }
    Ok(recorded + trailing)
}

/// Stamps a sighting on the identity and returns the name to print for it.
fn note_sighting(cache: &SharedCache, id: FaceId, at: DateTime<Utc>) -> String {
    let mut cache = cache.lock().unwrap_or_else(PoisonError::into_inner);
    if let Err(e) = cache.mark_seen(id, at) {
        log::warn!("Could not record sighting of face {id}: {e}");
    }
    cache
        .profile(id)
        .map(|profile| profile.label(id))
        .unwrap_or_else(|_| format!("face {id}"))
}

fn format_time(time: Option<DateTime<Utc>>) -> String {
    time.map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".into())
}

fn build_config(cli: &Cli) -> Result<RecognizerConfig, Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => RecognizerConfig::load(path)?,
        None => RecognizerConfig::default(),
    };
    if let Some(tolerance) = cli.tolerance {
        config.tolerance = tolerance;
    }
    if let Some(ttl) = cli.ttl {
        config.ttl_max = ttl;
    }
    if let Some(timeout) = cli.wait_timeout_ms {
        config.wait_timeout_ms = timeout;
    }
    config.validate()?;
    Ok(config)
}

fn frame_interval(fps: Option<f64>) -> Result<Option<Duration>, Box<dyn std::error::Error>> {
    match fps {
        None => Ok(None),
        Some(fps) if fps.is_finite() && fps > 0.0 => Ok(Some(Duration::from_secs_f64(1.0 / fps))),
        Some(fps) => Err(format!("FPS must be a positive number, got {fps}").into()),
    }
}

fn read_encoding(path: &Path) -> Result<Encoding, Box<dyn std::error::Error>> {
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read encoding {}: {e}", path.display()))?;
    Ok(serde_json::from_str(&raw)?)
}

fn default_store_path() -> Result<PathBuf, Box<dyn std::error::Error>> {
    let data_dir = dirs::data_dir().ok_or("No data directory found; pass --store")?;
    Ok(data_dir.join(STORE_DIR_NAME).join(STORE_FILE_NAME))
}
