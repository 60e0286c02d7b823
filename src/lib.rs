//! ChartMark: a two-layer raster annotation engine for clinical reference
//! diagrams.
//!
//! A [`CanvasSurface`] owns the background diagram and the annotation layer,
//! a [`ToolEngine`] turns pointer input into strokes and shapes, and every
//! finished action is committed to a linear [`HistoryManager`]. The
//! [`Exporter`] produces the annotation-only payload for saving and the
//! full-resolution composite for download.

#[macro_use]
pub mod logger;

pub mod canvas;
pub mod cli;
pub mod components;
pub mod coords;
pub mod export;
pub mod io;
pub mod ops;
pub mod project;
pub mod replay;
pub mod settings;
pub mod viewport;

pub use canvas::{AnnotationLayer, BackgroundLayer, CanvasSurface, SurfaceError, SurfaceStatus};
pub use components::history::{HistoryManager, Snapshot};
pub use components::tools::{EngineState, InputResponse, PointerSession, Tool, ToolEngine, ToolSettings};
pub use export::{EncodedImage, Exporter};
pub use io::{BackgroundSource, CodecError};
pub use project::{ChartSession, FileSink, SaveSink};
pub use settings::EditorSettings;
pub use viewport::ViewportController;
