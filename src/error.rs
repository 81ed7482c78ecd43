// Error categories a caller can act on. Faults that are part of the
// documented ARM exception model (bus faults taken as Data/Prefetch Abort,
// undefined instructions taken as the Undefined exception) are NOT errors
// here — they flow through `StepResult` instead, the way real hardware
// would just vector into a handler. `SimError` is reserved for things that
// must never reach the CPU: configuration and API misuse.

use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("failed to read disk image {path}: {source}")]
    DiskImage {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("ROM image is too large: {size} bytes, max {max}")]
    RomTooLarge { size: usize, max: usize },

    #[error("sdram_bytes must be a multiple of 4, got {0}")]
    MisalignedSdram(usize),

    #[error("projection root {0} is not a directory")]
    BadProjectionRoot(String),

    #[error("step() called with no ROM loaded")]
    NoImageLoaded,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type SimResult<T> = Result<T, SimError>;
