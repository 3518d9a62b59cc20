//! Nether-Loader: tracker module loading
//!
//! Detects the format of an in-memory module file and parses it into a
//! unified [`nether_tracker::Module`].
//!
//! Candidate formats are a closed set tried in a fixed order. Each candidate
//! first probes the stream's signature, then parses it into a
//! [`nether_tracker::ModuleBuilder`]. A parse either succeeds, declines with
//! "not this format" (the next candidate is tried), or fails with malformed
//! data (the load stops). The builder is owned by the parse call, so any
//! failure releases everything allocated so far.
//!
//! # Example
//! ```ignore
//! let data = std::fs::read("song.it")?;
//! let loaded = nether_loader::load_module(&data)?;
//! for note in loaded.module.unsupported() {
//!     eprintln!("inert: {}", note);
//! }
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use nether_tracker::{DuplicatePolicy, FormatId, Limits, Module, ResourceLedger};

mod chunk;
mod error;
mod formats;
mod reader;

pub use chunk::{Chunk, ChunkReader, LengthOrder};
pub use error::{FormatError, LoadError, Malformed, ReadError};
pub use reader::ByteReader;

use formats::{gal4, it, protracker, s3m, xm};

// =============================================================================
// Format dispatch
// =============================================================================

/// Supported on-disk formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    /// FastTracker 2 Extended Module
    Xm,
    /// Impulse Tracker
    It,
    /// Scream Tracker 3
    S3m,
    /// Galaxy Music System 4.0
    Gal4,
    /// ProTracker / Soundtracker MOD
    Mod,
}

impl Format {
    /// Order in which candidates are tried
    ///
    /// Formats with strong signatures come first; MOD has the weakest probe.
    pub const PROBE_ORDER: [Format; 5] = [
        Format::Xm,
        Format::It,
        Format::S3m,
        Format::Gal4,
        Format::Mod,
    ];

    pub fn id(self) -> FormatId {
        match self {
            Format::Xm => FormatId::FastTracker2,
            Format::It => FormatId::ImpulseTracker,
            Format::S3m => FormatId::ScreamTracker3,
            Format::Gal4 => FormatId::Galaxy4,
            Format::Mod => FormatId::ProTracker,
        }
    }

    /// Cheap signature check
    pub fn probe(self, data: &[u8]) -> bool {
        match self {
            Format::Xm => xm::probe(data),
            Format::It => it::probe(data),
            Format::S3m => s3m::probe(data),
            Format::Gal4 => gal4::probe(data),
            Format::Mod => protracker::probe(data),
        }
    }

    /// Parse `data` as this format without building the module
    pub fn parse(
        self,
        data: &[u8],
        options: &LoadOptions,
    ) -> Result<nether_tracker::ModuleBuilder, FormatError> {
        match self {
            Format::Xm => xm::parse(data, options),
            Format::It => it::parse(data, options),
            Format::S3m => s3m::parse(data, options),
            Format::Gal4 => gal4::parse(data, options),
            Format::Mod => protracker::parse(data, options),
        }
    }

    /// Duplicate slot policy used when the options leave it open
    fn default_duplicate_policy(self) -> DuplicatePolicy {
        match self {
            Format::Gal4 => DuplicatePolicy::Reject,
            _ => DuplicatePolicy::FirstWins,
        }
    }
}

// =============================================================================
// Options and results
// =============================================================================

/// Load-time settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadOptions {
    /// Upper bounds for declared dimensions
    pub limits: Limits,
    /// Duplicate slot policy, `None` for the format's default
    pub duplicate_policy: Option<DuplicatePolicy>,
    /// Allocation accounting shared with the caller
    #[serde(skip)]
    pub ledger: Option<ResourceLedger>,
}

impl LoadOptions {
    pub(crate) fn duplicate_policy_for(&self, format: Format) -> DuplicatePolicy {
        self.duplicate_policy
            .unwrap_or_else(|| format.default_duplicate_policy())
    }

    pub(crate) fn builder(
        &self,
        format: nether_tracker::FormatInfo,
        channels: usize,
    ) -> Result<nether_tracker::ModuleBuilder, FormatError> {
        Ok(nether_tracker::ModuleBuilder::new(format, channels, self.limits)?
            .with_ledger(self.ledger.clone()))
    }
}

/// A successfully loaded module
#[derive(Debug, Clone)]
pub struct LoadedModule {
    /// Format the stream was parsed as
    pub format: Format,
    /// The module, ready to share between playback sessions
    pub module: Arc<Module>,
}

impl LoadedModule {
    /// Whether some recognized features were left inert
    pub fn is_degraded(&self) -> bool {
        !self.module.unsupported().is_empty()
    }
}

// =============================================================================
// Entry points
// =============================================================================

/// Load a module with default options
pub fn load_module(data: &[u8]) -> Result<LoadedModule, LoadError> {
    load_module_with(data, &LoadOptions::default())
}

/// Load a module, trying every candidate format in order
pub fn load_module_with(data: &[u8], options: &LoadOptions) -> Result<LoadedModule, LoadError> {
    for format in Format::PROBE_ORDER {
        if !format.probe(data) {
            continue;
        }
        match load_as(format, data, options) {
            Err(LoadError::FormatUnrecognized) => {
                tracing::debug!("{:?} probe matched but parser declined", format);
            }
            result => return result,
        }
    }
    Err(LoadError::FormatUnrecognized)
}

/// Detect the format without parsing
pub fn probe_format(data: &[u8]) -> Option<Format> {
    Format::PROBE_ORDER
        .into_iter()
        .find(|format| format.probe(data))
}

/// Parse as one specific format
pub fn load_as(format: Format, data: &[u8], options: &LoadOptions) -> Result<LoadedModule, LoadError> {
    let malformed = |source| LoadError::MalformedData {
        format: format.id(),
        source,
    };
    let builder = match format.parse(data, options) {
        Ok(builder) => builder,
        Err(FormatError::NotThisFormat) => return Err(LoadError::FormatUnrecognized),
        Err(FormatError::Malformed(e)) => {
            tracing::warn!("Rejecting {} module: {}", format.id().name(), e);
            return Err(malformed(e));
        }
    };
    let module = builder.build().map_err(|e| malformed(Malformed::Model(e)))?;
    tracing::info!(
        "Loaded {} module '{}' ({} channels, {} patterns, {} instruments, {} samples)",
        module.format().tracker,
        module.title(),
        module.channels(),
        module.patterns().len(),
        module.instruments().len(),
        module.samples().len()
    );
    Ok(LoadedModule {
        format,
        module: Arc::new(module),
    })
}

#[cfg(test)]
mod tests;
