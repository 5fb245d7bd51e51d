//! CPU pool for the in-process geometry steps
//!
//! The external tools manage their own threads; this only sizes the Rayon
//! pool used by normal estimation, surface reconstruction and decimation.

use crate::{Error, Result};
use std::sync::OnceLock;

/// Environment variable consulted when `--threads` is not given.
pub const CPU_THREADS_ENV: &str = "RECON_CPU_THREADS";

/// Where the pool size came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolSize {
    /// Explicit thread count from the command line.
    Requested(usize),
    /// Thread count read from [`CPU_THREADS_ENV`].
    FromEnv(usize),
    /// Rayon picks (one thread per logical CPU).
    Automatic,
}

impl PoolSize {
    /// An explicit request wins over the environment value. Zero and
    /// non-numeric values are rejected rather than silently falling back.
    pub fn resolve(requested: Option<usize>, env_value: Option<&str>) -> Result<Self> {
        if let Some(n) = requested {
            return match n {
                0 => Err(Error::InvalidInput("thread count must be at least 1".into())),
                n => Ok(Self::Requested(n)),
            };
        }
        let Some(raw) = env_value.map(str::trim) else {
            return Ok(Self::Automatic);
        };
        match raw.parse::<usize>() {
            Ok(0) => Err(Error::InvalidInput(format!(
                "{CPU_THREADS_ENV} must be at least 1"
            ))),
            Ok(n) => Ok(Self::FromEnv(n)),
            Err(_) => Err(Error::InvalidInput(format!(
                "{CPU_THREADS_ENV} is not a thread count: '{raw}'"
            ))),
        }
    }

    pub fn threads(self) -> Option<usize> {
        match self {
            Self::Requested(n) | Self::FromEnv(n) => Some(n),
            Self::Automatic => None,
        }
    }
}

// Error is not Clone, so the first outcome is kept as its message.
static POOL: OnceLock<std::result::Result<PoolSize, String>> = OnceLock::new();

fn env_threads() -> Result<Option<String>> {
    match std::env::var(CPU_THREADS_ENV) {
        Ok(v) => Ok(Some(v)),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(Error::InvalidInput(format!("{CPU_THREADS_ENV}: {e}"))),
    }
}

fn build_pool(requested: Option<usize>) -> Result<PoolSize> {
    let env_value = match requested {
        Some(_) => None,
        None => env_threads()?,
    };
    let size = PoolSize::resolve(requested, env_value.as_deref())?;

    let mut builder = rayon::ThreadPoolBuilder::new();
    if let Some(n) = size.threads() {
        builder = builder.num_threads(n);
    }
    builder
        .build_global()
        .map_err(|e| Error::InvalidInput(format!("CPU pool: {e}")))?;
    Ok(size)
}

/// Size the global Rayon pool once per process.
///
/// Later calls do not rebuild the pool; they report the outcome of the first
/// call, whatever they ask for.
pub fn init_global_thread_pool(requested: Option<usize>) -> Result<PoolSize> {
    POOL.get_or_init(|| build_pool(requested).map_err(|e| e.to_string()))
        .clone()
        .map_err(Error::InvalidInput)
}

pub fn current_cpu_threads() -> usize {
    rayon::current_num_threads()
}
