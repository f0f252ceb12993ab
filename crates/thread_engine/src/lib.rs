//! Thread engine: the concurrent fetch scheduler and its collaborators.
mod decode;
mod fetch;
mod filename;
mod http;
mod persist;
mod pool;
mod queue;
mod render;
mod scheduler;
mod types;
mod wire;

pub use decode::{decode_body, DecodedBody};
pub use fetch::{NoopProgressSink, PageFetcher, ProgressSink};
pub use filename::snapshot_filename;
pub use http::{FetchSettings, HttpPageFetcher};
pub use persist::{ensure_output_dir, AtomicFileWriter, JsonPersistence, PersistError, Persistence};
pub use pool::{PoolReport, PoolStats, WorkerPool};
pub use queue::{Completion, JobQueue, QueueShutdownError, QueueStats};
pub use render::{render_html, HtmlRenderer, RenderOptions};
pub use scheduler::{
    Harvest, Scheduler, SchedulerConfig, SchedulerError, DEFAULT_MAX_CONCURRENT_WORKERS,
};
pub use types::{FailureKind, FetchError, HarvestEvent, RunReport, StreamWarning};
pub use wire::{HtmlFragmentDecoder, JsonPageDecoder, PageDecoder, WireFormat};
