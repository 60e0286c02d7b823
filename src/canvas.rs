use egui::{Pos2, Rect, Vec2};
use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use std::sync::mpsc;

use crate::components::history::{HistoryManager, Snapshot};
use crate::components::tools::{
    DrawTarget, InputResponse, PointerInput, Tool, ToolEngine, ToolSettings,
};
use crate::coords;
use crate::export::Exporter;
use crate::io::{self, BackgroundSource, CodecError};
use crate::ops::raster::{self, PixelRect, Primitive};
use crate::settings::EditorSettings;
use crate::viewport::ViewportController;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug)]
pub enum SurfaceError {
    /// The background has not finished loading (or failed to).
    NotReady,
    LoadFailed(String),
    Codec(CodecError),
    Save(String),
}

impl std::fmt::Display for SurfaceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SurfaceError::NotReady => write!(f, "Canvas is not ready"),
            SurfaceError::LoadFailed(e) => write!(f, "Background load failed: {}", e),
            SurfaceError::Codec(e) => write!(f, "{}", e),
            SurfaceError::Save(e) => write!(f, "Save failed: {}", e),
        }
    }
}

impl std::error::Error for SurfaceError {}

impl From<CodecError> for SurfaceError {
    fn from(e: CodecError) -> Self {
        SurfaceError::Codec(e)
    }
}

// ============================================================================
// LAYERS
// ============================================================================

/// Physical size for a logical size at `scale`, never below 1×1.
pub fn physical_size(logical_w: u32, logical_h: u32, scale: f32) -> (u32, u32) {
    let w = ((logical_w as f32 * scale).round() as u32).max(1);
    let h = ((logical_h as f32 * scale).round() as u32).max(1);
    (w, h)
}

/// Logical size of a `src_w`×`src_h` image fitted to `target_width`.
pub fn fitted_logical_size(src_w: u32, src_h: u32, target_width: u32) -> (u32, u32) {
    let w = target_width.max(1);
    let h = ((w as f64 * src_h as f64 / src_w.max(1) as f64).round() as u32).max(1);
    (w, h)
}

/// The reference diagram, resampled to the physical layer size. Immutable.
#[derive(Clone, Debug)]
pub struct BackgroundLayer {
    pixels: RgbaImage,
    logical: (u32, u32),
    source: String,
}

impl BackgroundLayer {
    /// Fit `image` to `target_width` logical pixels and resample to `scale`.
    pub fn fit(image: &RgbaImage, target_width: u32, scale: f32, source: &str) -> Result<Self, CodecError> {
        io::check_dimensions(image.width(), image.height())?;
        let logical = fitted_logical_size(image.width(), image.height(), target_width);
        let (pw, ph) = physical_size(logical.0, logical.1, scale);
        io::check_dimensions(pw, ph)?;
        let pixels = if image.dimensions() == (pw, ph) {
            image.clone()
        } else {
            imageops::resize(image, pw, ph, FilterType::Triangle)
        };
        Ok(Self {
            pixels,
            logical,
            source: source.to_string(),
        })
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    pub fn logical_size(&self) -> (u32, u32) {
        self.logical
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

/// The drawable layer. `pixels` is live (including any preview), `committed`
/// mirrors the current history snapshot.
#[derive(Clone, Debug)]
pub struct AnnotationLayer {
    pixels: RgbaImage,
    committed: RgbaImage,
    logical: (u32, u32),
    scale: f32,
}

impl AnnotationLayer {
    pub fn blank(logical_w: u32, logical_h: u32, scale: f32) -> Self {
        let (pw, ph) = physical_size(logical_w, logical_h, scale);
        let pixels = RgbaImage::new(pw, ph);
        Self {
            committed: pixels.clone(),
            pixels,
            logical: (logical_w, logical_h),
            scale,
        }
    }

    /// Layer initialised from a previously saved annotation. A differently
    /// sized image is stretched to the layer.
    pub fn from_saved(saved: &RgbaImage, logical_w: u32, logical_h: u32, scale: f32) -> Self {
        let mut layer = Self::blank(logical_w, logical_h, scale);
        let (pw, ph) = layer.pixels.dimensions();
        layer.pixels = if saved.dimensions() == (pw, ph) {
            saved.clone()
        } else {
            imageops::resize(saved, pw, ph, FilterType::Triangle)
        };
        layer.committed = layer.pixels.clone();
        layer
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    pub fn committed(&self) -> &RgbaImage {
        &self.committed
    }

    pub fn logical_size(&self) -> (u32, u32) {
        self.logical
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn physical_size(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    /// Source-over paint. Returns the touched rect.
    pub fn paint(&mut self, prims: &[Primitive], color: Rgba<u8>) -> Option<PixelRect> {
        let (w, h) = self.pixels.dimensions();
        let mask = raster::rasterize(prims, self.scale, w, h)?;
        raster::paint(&mut self.pixels, &mask, color);
        Some(mask.rect)
    }

    /// Destination-out erase. Returns the touched rect.
    pub fn erase(&mut self, prims: &[Primitive]) -> Option<PixelRect> {
        let (w, h) = self.pixels.dimensions();
        let mask = raster::rasterize(prims, self.scale, w, h)?;
        raster::erase(&mut self.pixels, &mask);
        Some(mask.rect)
    }

    /// Put `rect` back to its committed pixels.
    pub fn revert_region(&mut self, rect: PixelRect) {
        raster::restore_region(&mut self.pixels, &self.committed, rect);
    }

    pub fn clear(&mut self) {
        self.pixels.pixels_mut().for_each(|p| *p = Rgba([0, 0, 0, 0]));
    }

    /// Encode the live pixels as a snapshot; they become the committed state.
    pub fn capture(&mut self, label: &str) -> Result<Snapshot, CodecError> {
        let snapshot = Snapshot::capture(label, &self.pixels)?;
        self.committed.clone_from(&self.pixels);
        Ok(snapshot)
    }

    /// Replace the layer with a decoded snapshot.
    pub fn restore(&mut self, snapshot: &Snapshot) -> Result<(), CodecError> {
        let img = snapshot.decode()?;
        if img.dimensions() != self.pixels.dimensions() {
            return Err(CodecError::Dimensions {
                width: img.width(),
                height: img.height(),
            });
        }
        self.pixels = img;
        self.committed.clone_from(&self.pixels);
        Ok(())
    }
}

// ============================================================================
// LOADING
// ============================================================================

#[derive(Clone, Debug, PartialEq)]
pub enum SurfaceStatus {
    Loading,
    Ready,
    Failed(String),
}

/// Worker → surface message for the async background load.
enum LoadResult {
    Loaded {
        background: BackgroundLayer,
        annotation: AnnotationLayer,
        initial: Snapshot,
    },
    Failed(String),
}

/// Sizing parameters captured at open.
#[derive(Clone, Copy, Debug)]
struct LoadParams {
    target_width: u32,
    scale: f32,
}

impl LoadParams {
    fn from_settings(settings: &EditorSettings) -> Self {
        Self {
            target_width: settings.target_width.max(1),
            scale: settings.scale_factor.clamp(1.0, 8.0),
        }
    }
}

fn build_layers(
    background: &RgbaImage,
    previous: Option<&[u8]>,
    params: LoadParams,
    source: &str,
) -> Result<(BackgroundLayer, AnnotationLayer, Snapshot), CodecError> {
    let background = BackgroundLayer::fit(background, params.target_width, params.scale, source)?;
    let (lw, lh) = background.logical_size();

    let mut annotation = match previous.map(io::decode_image) {
        Some(Ok(saved)) => AnnotationLayer::from_saved(&saved, lw, lh, params.scale),
        Some(Err(e)) => {
            log_warn!("Previous annotation unreadable, starting blank: {}", e);
            AnnotationLayer::blank(lw, lh, params.scale)
        }
        None => AnnotationLayer::blank(lw, lh, params.scale),
    };
    let initial = annotation.capture("Open")?;
    Ok((background, annotation, initial))
}

fn load_worker(source: BackgroundSource, previous: Option<Vec<u8>>, params: LoadParams) -> LoadResult {
    let label = source.describe();
    let result = source
        .fetch()
        .and_then(|bytes| io::decode_image(&bytes))
        .and_then(|img| build_layers(&img, previous.as_deref(), params, &label));
    match result {
        Ok((background, annotation, initial)) => LoadResult::Loaded {
            background,
            annotation,
            initial,
        },
        Err(e) => LoadResult::Failed(format!("{}: {}", label, e)),
    }
}

// ============================================================================
// CANVAS SURFACE
// ============================================================================

/// Two stacked layers plus the engine that draws on them.
///
/// Created in `Loading`; every mutating call is rejected until the background
/// arrives and the initial snapshot is taken.
pub struct CanvasSurface {
    status: SurfaceStatus,
    background: Option<BackgroundLayer>,
    annotation: Option<AnnotationLayer>,
    history: HistoryManager,
    tools: ToolEngine,
    viewport: ViewportController,
    receiver: Option<mpsc::Receiver<LoadResult>>,
}

impl CanvasSurface {
    fn empty(settings: &EditorSettings) -> Self {
        Self {
            status: SurfaceStatus::Loading,
            background: None,
            annotation: None,
            history: HistoryManager::new(settings.max_history_steps),
            tools: ToolEngine::new(ToolSettings::from_settings(settings)),
            viewport: ViewportController::from_settings(settings),
            receiver: None,
        }
    }

    /// Start loading `source` (and `previous`, an earlier annotation-only
    /// export) on the rayon pool.
    pub fn open(source: BackgroundSource, previous: Option<Vec<u8>>, settings: &EditorSettings) -> Self {
        let mut surface = Self::empty(settings);
        let params = LoadParams::from_settings(settings);
        let (sender, receiver) = mpsc::channel();
        surface.receiver = Some(receiver);

        log_info!("Loading background {}", source.describe());
        rayon::spawn(move || {
            let _ = sender.send(load_worker(source, previous, params));
        });
        surface
    }

    /// Build a ready surface synchronously from a decoded background.
    pub fn from_images(
        background: &RgbaImage,
        previous: Option<&[u8]>,
        settings: &EditorSettings,
    ) -> Result<Self, SurfaceError> {
        let mut surface = Self::empty(settings);
        let params = LoadParams::from_settings(settings);
        match build_layers(background, previous, params, "<memory>") {
            Ok(layers) => {
                surface.install(layers);
                Ok(surface)
            }
            Err(e) => {
                log_err!("Background rejected: {}", e);
                Err(SurfaceError::LoadFailed(e.to_string()))
            }
        }
    }

    fn install(&mut self, (background, annotation, initial): (BackgroundLayer, AnnotationLayer, Snapshot)) {
        let (lw, lh) = background.logical_size();
        let (pw, ph) = annotation.physical_size();
        log_info!(
            "Canvas ready: logical {}x{}, physical {}x{}, from {}",
            lw,
            lh,
            pw,
            ph,
            background.source()
        );
        self.background = Some(background);
        self.annotation = Some(annotation);
        self.history.clear();
        self.history.commit(initial);
        self.status = SurfaceStatus::Ready;
    }

    /// Apply a finished load without blocking.
    pub fn poll(&mut self) -> &SurfaceStatus {
        let msg = match &self.receiver {
            Some(rx) => match rx.try_recv() {
                Ok(msg) => Some(msg),
                Err(mpsc::TryRecvError::Empty) => None,
                Err(mpsc::TryRecvError::Disconnected) => {
                    Some(LoadResult::Failed("loader exited without a result".to_string()))
                }
            },
            None => None,
        };
        if let Some(msg) = msg {
            self.receiver = None;
            self.apply(msg);
        }
        &self.status
    }

    /// Block until loading finishes.
    pub fn wait_ready(&mut self) -> Result<(), SurfaceError> {
        if let Some(rx) = self.receiver.take() {
            let msg = rx
                .recv()
                .unwrap_or_else(|_| LoadResult::Failed("loader exited without a result".to_string()));
            self.apply(msg);
        }
        match &self.status {
            SurfaceStatus::Ready => Ok(()),
            SurfaceStatus::Failed(e) => Err(SurfaceError::LoadFailed(e.clone())),
            SurfaceStatus::Loading => Err(SurfaceError::NotReady),
        }
    }

    fn apply(&mut self, msg: LoadResult) {
        match msg {
            LoadResult::Loaded {
                background,
                annotation,
                initial,
            } => self.install((background, annotation, initial)),
            LoadResult::Failed(e) => {
                log_err!("Background load failed: {}", e);
                self.status = SurfaceStatus::Failed(e);
            }
        }
    }

    pub fn status(&self) -> &SurfaceStatus {
        &self.status
    }

    pub fn is_ready(&self) -> bool {
        self.status == SurfaceStatus::Ready
    }

    /// Logical canvas size; `None` until ready.
    pub fn logical_size(&self) -> Option<Vec2> {
        let (w, h) = self.background.as_ref()?.logical_size();
        Some(Vec2::new(w as f32, h as f32))
    }

    pub fn background(&self) -> Option<&BackgroundLayer> {
        self.background.as_ref()
    }

    pub fn annotation(&self) -> Option<&AnnotationLayer> {
        self.annotation.as_ref()
    }

    pub fn history(&self) -> &HistoryManager {
        &self.history
    }

    pub fn viewport(&self) -> &ViewportController {
        &self.viewport
    }

    pub fn tool_engine(&self) -> &ToolEngine {
        &self.tools
    }

    pub fn tool_settings(&self) -> ToolSettings {
        self.tools.settings
    }

    /// Read-only access for serialization.
    pub fn exporter(&self) -> Result<Exporter<'_>, SurfaceError> {
        match (&self.status, &self.background, &self.annotation) {
            (SurfaceStatus::Ready, Some(bg), Some(ann)) => Ok(Exporter::new(bg, ann)),
            _ => {
                log_err!("Export requested before the canvas is ready");
                Err(SurfaceError::NotReady)
            }
        }
    }

    // ------------------------------------------------------------------------
    // Input
    // ------------------------------------------------------------------------

    fn target_parts(&mut self) -> Option<(&mut ToolEngine, DrawTarget<'_>)> {
        if self.status != SurfaceStatus::Ready {
            return None;
        }
        let layer = self.annotation.as_mut()?;
        Some((
            &mut self.tools,
            DrawTarget {
                layer,
                history: &mut self.history,
                viewport: &mut self.viewport,
            },
        ))
    }

    fn map_pointer(&self, client: Pos2, bounds: Rect) -> PointerInput {
        let logical_size = self.logical_size().unwrap_or(Vec2::ZERO);
        PointerInput {
            client,
            logical: coords::client_to_logical(client, bounds, logical_size),
        }
    }

    fn rejected(what: &str) -> InputResponse {
        log_warn!("Input '{}' rejected: canvas not ready", what);
        InputResponse::Rejected
    }

    /// `bounds` is the canvas element's current on-screen rect.
    pub fn pointer_down(&mut self, client: Pos2, bounds: Rect) -> Result<InputResponse, SurfaceError> {
        let input = self.map_pointer(client, bounds);
        let Some((tools, mut target)) = self.target_parts() else {
            return Ok(Self::rejected("pointer down"));
        };
        Ok(tools.pointer_down(input, &mut target)?)
    }

    pub fn pointer_move(&mut self, client: Pos2, bounds: Rect) -> InputResponse {
        let input = self.map_pointer(client, bounds);
        let Some((tools, mut target)) = self.target_parts() else {
            return InputResponse::Rejected;
        };
        tools.pointer_move(input, &mut target)
    }

    pub fn pointer_up(&mut self, client: Option<Pos2>, bounds: Rect) -> Result<InputResponse, SurfaceError> {
        let input = client.map(|c| self.map_pointer(c, bounds));
        let Some((tools, mut target)) = self.target_parts() else {
            return Ok(Self::rejected("pointer up"));
        };
        Ok(tools.pointer_up(input, &mut target)?)
    }

    pub fn pointer_leave(&mut self) -> Result<InputResponse, SurfaceError> {
        let Some((tools, mut target)) = self.target_parts() else {
            return Ok(Self::rejected("pointer leave"));
        };
        Ok(tools.pointer_leave(&mut target)?)
    }

    /// Touch variants follow the first contact.
    pub fn touch_start(&mut self, touches: &[Pos2], bounds: Rect) -> Result<InputResponse, SurfaceError> {
        match coords::primary_touch(touches) {
            Some(p) => self.pointer_down(p, bounds),
            None => Ok(InputResponse::Ignored),
        }
    }

    pub fn touch_move(&mut self, touches: &[Pos2], bounds: Rect) -> InputResponse {
        match coords::primary_touch(touches) {
            Some(p) => self.pointer_move(p, bounds),
            None => InputResponse::Ignored,
        }
    }

    pub fn touch_end(&mut self) -> Result<InputResponse, SurfaceError> {
        self.pointer_up(None, Rect::NOTHING)
    }

    // ------------------------------------------------------------------------
    // Tool state
    // ------------------------------------------------------------------------

    /// Switch tool, finishing any action in progress.
    pub fn set_tool(&mut self, tool: Tool) -> Result<InputResponse, SurfaceError> {
        match self.target_parts() {
            Some((tools, mut target)) => Ok(tools.set_tool(tool, &mut target)?),
            None => {
                self.tools.settings.tool = tool;
                Ok(InputResponse::Ignored)
            }
        }
    }

    pub fn set_color(&mut self, color: Rgba<u8>) {
        self.tools.set_color(color);
    }

    pub fn set_brush_size(&mut self, size: f32) {
        self.tools.set_brush_size(size);
    }

    // ------------------------------------------------------------------------
    // History
    // ------------------------------------------------------------------------

    pub fn undo(&mut self) -> Result<InputResponse, SurfaceError> {
        self.step_history(true)
    }

    pub fn redo(&mut self) -> Result<InputResponse, SurfaceError> {
        self.step_history(false)
    }

    fn step_history(&mut self, back: bool) -> Result<InputResponse, SurfaceError> {
        let what = if back { "undo" } else { "redo" };
        let Some((tools, mut target)) = self.target_parts() else {
            return Ok(Self::rejected(what));
        };
        // Any half-finished action lands in history first.
        tools.finish(&mut target)?;
        let snapshot = if back {
            target.history.undo()
        } else {
            target.history.redo()
        };
        let restored = snapshot.map(|s| target.layer.restore(s).map(|()| s.description().to_string()));
        match restored {
            Some(Ok(label)) => {
                log_info!("{} -> \"{}\"", what, label);
                Ok(InputResponse::Restored)
            }
            Some(Err(e)) => {
                // The layer still holds the old snapshot; point back at it.
                if back {
                    target.history.redo();
                } else {
                    target.history.undo();
                }
                log_err!("{} failed, history unchanged: {}", what, e);
                Err(e.into())
            }
            None => {
                log_info!("{}: nothing to {}", what, what);
                Ok(InputResponse::Ignored)
            }
        }
    }

    /// Wipe the annotation layer to transparent and commit.
    pub fn clear(&mut self) -> Result<InputResponse, SurfaceError> {
        let Some((tools, mut target)) = self.target_parts() else {
            return Ok(Self::rejected("clear"));
        };
        tools.finish(&mut target)?;
        target.layer.clear();
        target.commit("Clear")?;
        Ok(InputResponse::Committed)
    }

    // ------------------------------------------------------------------------
    // Viewport (presentation only)
    // ------------------------------------------------------------------------

    pub fn zoom_in(&mut self) {
        self.viewport.zoom_in();
    }

    pub fn zoom_out(&mut self) {
        self.viewport.zoom_out();
    }

    pub fn set_zoom(&mut self, zoom: f32) {
        self.viewport.set_zoom(zoom);
    }

    pub fn reset_view(&mut self) {
        self.viewport.reset();
    }
}
