//! textel renders raster images to character-cell terminals as symbol
//! art, backed by a terminal capability layer, concurrent stream I/O, and
//! an ordered parallel media pipeline.
//!
//! The typical flow: build a [`canvas::config::CanvasConfig`], install a
//! [`symbols::SymbolMap`], create a [`canvas::Canvas`], call
//! `draw_all_pixels`, then `print` against a [`term::info::TermInfo`].
//! Interactive callers own a [`term::Term`] for output and for decoded
//! input events.

pub mod canvas;
pub mod color;
pub mod error;
pub mod fifo;
pub mod grid;
pub mod pipeline;
pub mod placement;
pub mod symbols;
pub mod term;
pub mod util;

pub use canvas::config::{
    CanvasConfig, CanvasMode, ColorExtractor, DitherMode, PixelMode, PixelType,
};
pub use canvas::Canvas;
pub use error::{Error, Result};
pub use grid::GridLayout;
pub use pipeline::{MediaLoader, MediaPipeline, PathQueue};
pub use placement::PlacementCounter;
pub use symbols::SymbolMap;
pub use term::info::TermInfo;
pub use term::Term;

use std::sync::atomic::{AtomicUsize, Ordering};

/// 0 means "number of available cores".
static N_THREADS: AtomicUsize = AtomicUsize::new(0);

/// Caps the worker threads used by canvas drawing and the media
/// pipeline. Pass 0 to restore the default.
pub fn set_n_threads(n: usize) {
    N_THREADS.store(n, Ordering::Relaxed);
}

pub fn n_threads() -> usize {
    match N_THREADS.load(Ordering::Relaxed) {
        0 => std::thread::available_parallelism()
            .map(|p| p.get())
            .unwrap_or(1),
        n => n,
    }
}
