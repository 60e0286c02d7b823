use egui::Pos2;
use image::Rgba;

use crate::canvas::AnnotationLayer;
use crate::components::history::HistoryManager;
use crate::io::CodecError;
use crate::ops::raster::{PixelRect, Primitive};
use crate::ops::shapes::{ShapeKind, shape_primitives};
use crate::settings::EditorSettings;
use crate::viewport::ViewportController;

/// Eraser width in multiples of the brush size.
pub const ERASER_WIDTH_SCALE: f32 = 4.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum Tool {
    #[default]
    Pen,
    Eraser,
    Pan,
    Rectangle,
    Square,
    Circle,
    Oval,
    Diamond,
    Arrow,
    CurvedArrow,
}

impl Tool {
    pub const ALL: [Tool; 10] = [
        Tool::Pen,
        Tool::Eraser,
        Tool::Pan,
        Tool::Rectangle,
        Tool::Square,
        Tool::Circle,
        Tool::Oval,
        Tool::Diamond,
        Tool::Arrow,
        Tool::CurvedArrow,
    ];

    /// Script/CLI name.
    pub fn name(&self) -> &'static str {
        match self {
            Tool::Pen => "pen",
            Tool::Eraser => "eraser",
            Tool::Pan => "pan",
            Tool::Rectangle => "rect",
            Tool::Square => "square",
            Tool::Circle => "circle",
            Tool::Oval => "oval",
            Tool::Diamond => "diamond",
            Tool::Arrow => "arrow",
            Tool::CurvedArrow => "curved-arrow",
        }
    }

    pub fn from_name(name: &str) -> Option<Tool> {
        let n = name.trim().to_ascii_lowercase().replace('_', "-");
        match n.as_str() {
            "pen" | "brush" => Some(Tool::Pen),
            "eraser" => Some(Tool::Eraser),
            "pan" | "hand" => Some(Tool::Pan),
            "rect" | "rectangle" => Some(Tool::Rectangle),
            "square" => Some(Tool::Square),
            "circle" => Some(Tool::Circle),
            "oval" | "ellipse" => Some(Tool::Oval),
            "diamond" => Some(Tool::Diamond),
            "arrow" => Some(Tool::Arrow),
            "curved-arrow" | "curvedarrow" => Some(Tool::CurvedArrow),
            _ => None,
        }
    }

    pub fn shape(&self) -> Option<ShapeKind> {
        match self {
            Tool::Rectangle => Some(ShapeKind::Rectangle),
            Tool::Square => Some(ShapeKind::Square),
            Tool::Circle => Some(ShapeKind::Circle),
            Tool::Oval => Some(ShapeKind::Oval),
            Tool::Diamond => Some(ShapeKind::Diamond),
            Tool::Arrow => Some(ShapeKind::Arrow),
            Tool::CurvedArrow => Some(ShapeKind::CurvedArrow),
            Tool::Pen | Tool::Eraser | Tool::Pan => None,
        }
    }

    /// Label recorded with the history snapshot this tool commits.
    pub fn history_label(&self) -> &'static str {
        match self {
            Tool::Pen => "Pen Stroke",
            Tool::Eraser => "Eraser Stroke",
            Tool::Pan => "Pan",
            _ => self.shape().map_or("Shape", |s| s.label()),
        }
    }
}

/// Active tool, color and brush size.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ToolSettings {
    pub tool: Tool,
    pub color: Rgba<u8>,
    pub brush_size: f32,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self::from_settings(&EditorSettings::default())
    }
}

impl ToolSettings {
    pub fn from_settings(settings: &EditorSettings) -> Self {
        Self {
            tool: Tool::Pen,
            color: settings.default_color,
            brush_size: settings.default_brush_size,
        }
    }
}

/// Pointer position in both spaces. Drawing uses `logical`, panning `client`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PointerInput {
    pub client: Pos2,
    pub logical: Pos2,
}

/// Transient state of the action in progress. Never part of committed state.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PointerSession {
    pub tool: Tool,
    pub anchor: Pos2,
    pub last: Pos2,
    pub last_client: Pos2,
    pub is_active: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    StrokeInProgress,
    ShapeInProgress,
    Panning,
}

/// What an input event did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputResponse {
    /// Surface not ready; nothing happened.
    Rejected,
    /// Valid but had no effect (e.g. a move while idle, undo at the start).
    Ignored,
    /// An action began.
    Started,
    /// Layer pixels changed (stroke segment or shape preview).
    Drawn,
    /// Viewport moved.
    Panned,
    /// A snapshot was appended to history.
    Committed,
    /// A history snapshot was restored onto the layer.
    Restored,
}

/// Everything an action writes to.
pub struct DrawTarget<'a> {
    pub layer: &'a mut AnnotationLayer,
    pub history: &'a mut HistoryManager,
    pub viewport: &'a mut ViewportController,
}

impl DrawTarget<'_> {
    /// Capture the layer as a new snapshot and append it to history.
    pub fn commit(&mut self, label: &str) -> Result<(), CodecError> {
        let snapshot = self.layer.capture(label)?;
        self.history.commit(snapshot);
        log_info!(
            "commit \"{}\" (history {} / {})",
            label,
            self.history.undo_count(),
            self.history.len()
        );
        Ok(())
    }
}

/// Pointer state machine for all tools.
pub struct ToolEngine {
    pub settings: ToolSettings,
    state: EngineState,
    session: Option<PointerSession>,
    /// Physical pixels touched by the current shape preview.
    preview_rect: Option<PixelRect>,
}

impl ToolEngine {
    pub fn new(settings: ToolSettings) -> Self {
        Self {
            settings,
            state: EngineState::Idle,
            session: None,
            preview_rect: None,
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn session(&self) -> Option<&PointerSession> {
        self.session.as_ref()
    }

    pub fn set_color(&mut self, color: Rgba<u8>) {
        self.settings.color = color;
    }

    /// Non-positive or non-finite sizes are ignored.
    pub fn set_brush_size(&mut self, size: f32) {
        if size.is_finite() && size > 0.0 {
            self.settings.brush_size = size;
        }
    }

    /// Switch tools, finishing any action in progress first.
    pub fn set_tool(
        &mut self,
        tool: Tool,
        target: &mut DrawTarget,
    ) -> Result<InputResponse, CodecError> {
        let response = self.finish(target)?;
        self.settings.tool = tool;
        Ok(response)
    }

    pub fn pointer_down(
        &mut self,
        input: PointerInput,
        target: &mut DrawTarget,
    ) -> Result<InputResponse, CodecError> {
        // A second press while an action is live ends that action first.
        self.finish(target)?;

        let tool = self.settings.tool;
        self.state = match tool {
            Tool::Pen | Tool::Eraser => EngineState::StrokeInProgress,
            Tool::Pan => EngineState::Panning,
            _ => EngineState::ShapeInProgress,
        };
        self.session = Some(PointerSession {
            tool,
            anchor: input.logical,
            last: input.logical,
            last_client: input.client,
            is_active: true,
        });
        self.preview_rect = None;
        Ok(InputResponse::Started)
    }

    pub fn pointer_move(&mut self, input: PointerInput, target: &mut DrawTarget) -> InputResponse {
        let Some(mut session) = self.session else {
            return InputResponse::Ignored;
        };
        let response = match self.state {
            EngineState::Idle => InputResponse::Ignored,
            EngineState::StrokeInProgress => {
                self.draw_segment(session.tool, session.last, input.logical, target);
                InputResponse::Drawn
            }
            EngineState::ShapeInProgress => {
                self.draw_preview(session.tool, session.anchor, input.logical, target);
                InputResponse::Drawn
            }
            EngineState::Panning => {
                target.viewport.pan_by(input.client - session.last_client);
                InputResponse::Panned
            }
        };
        session.last = input.logical;
        session.last_client = input.client;
        self.session = Some(session);
        response
    }

    /// Release. With a position, the action is first extended to it.
    pub fn pointer_up(
        &mut self,
        input: Option<PointerInput>,
        target: &mut DrawTarget,
    ) -> Result<InputResponse, CodecError> {
        if let (Some(input), Some(session)) = (input, self.session)
            && (input.logical != session.last || input.client != session.last_client)
        {
            self.pointer_move(input, target);
        }
        self.finish(target)
    }

    /// Pointer left the canvas: identical to a release without position.
    pub fn pointer_leave(&mut self, target: &mut DrawTarget) -> Result<InputResponse, CodecError> {
        self.pointer_up(None, target)
    }

    /// End whatever is in progress. Strokes and shapes commit, panning just stops.
    pub fn finish(&mut self, target: &mut DrawTarget) -> Result<InputResponse, CodecError> {
        let state = std::mem::replace(&mut self.state, EngineState::Idle);
        let session = self.session.take();
        self.preview_rect = None;
        match (state, session) {
            (EngineState::StrokeInProgress | EngineState::ShapeInProgress, Some(s)) => {
                target.commit(s.tool.history_label())?;
                Ok(InputResponse::Committed)
            }
            (EngineState::Panning, Some(_)) => Ok(InputResponse::Panned),
            _ => Ok(InputResponse::Ignored),
        }
    }

    fn draw_segment(&self, tool: Tool, from: Pos2, to: Pos2, target: &mut DrawTarget) {
        let brush = self.settings.brush_size;
        if tool == Tool::Eraser {
            let seg = [Primitive::stroke(vec![from, to], brush * ERASER_WIDTH_SCALE)];
            target.layer.erase(&seg);
        } else {
            let seg = [Primitive::stroke(vec![from, to], brush)];
            target.layer.paint(&seg, self.settings.color);
        }
    }

    /// Revert the previous preview frame to committed pixels, then render the
    /// shape from `anchor` to `cursor`.
    fn draw_preview(&mut self, tool: Tool, anchor: Pos2, cursor: Pos2, target: &mut DrawTarget) {
        let Some(kind) = tool.shape() else { return };
        if let Some(rect) = self.preview_rect.take() {
            target.layer.revert_region(rect);
        }
        let prims = shape_primitives(kind, anchor, cursor, self.settings.brush_size);
        self.preview_rect = target.layer.paint(&prims, self.settings.color);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use egui::pos2;

    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);

    struct Rig {
        layer: AnnotationLayer,
        history: HistoryManager,
        viewport: ViewportController,
        engine: ToolEngine,
    }

    impl Rig {
        fn new() -> Self {
            let mut layer = AnnotationLayer::blank(100, 80, 2.0);
            let mut history = HistoryManager::default();
            history.commit(layer.capture("Open").unwrap());
            Self {
                layer,
                history,
                viewport: ViewportController::default(),
                engine: ToolEngine::new(ToolSettings {
                    tool: Tool::Pen,
                    color: RED,
                    brush_size: 3.0,
                }),
            }
        }

        fn target(&mut self) -> (&mut ToolEngine, DrawTarget<'_>) {
            (
                &mut self.engine,
                DrawTarget {
                    layer: &mut self.layer,
                    history: &mut self.history,
                    viewport: &mut self.viewport,
                },
            )
        }

        fn down(&mut self, x: f32, y: f32) -> InputResponse {
            let (e, mut t) = self.target();
            e.pointer_down(at(x, y), &mut t).unwrap()
        }

        fn drag(&mut self, x: f32, y: f32) -> InputResponse {
            let (e, mut t) = self.target();
            e.pointer_move(at(x, y), &mut t)
        }

        fn up(&mut self, p: Option<(f32, f32)>) -> InputResponse {
            let (e, mut t) = self.target();
            e.pointer_up(p.map(|(x, y)| at(x, y)), &mut t).unwrap()
        }

        fn leave(&mut self) -> InputResponse {
            let (e, mut t) = self.target();
            e.pointer_leave(&mut t).unwrap()
        }

        fn select(&mut self, tool: Tool) -> InputResponse {
            let (e, mut t) = self.target();
            e.set_tool(tool, &mut t).unwrap()
        }
    }

    fn at(x: f32, y: f32) -> PointerInput {
        PointerInput {
            client: pos2(x, y),
            logical: pos2(x, y),
        }
    }

    #[test]
    fn tool_names_parse() {
        for tool in Tool::ALL {
            assert_eq!(Tool::from_name(tool.name()), Some(tool));
        }
        assert_eq!(Tool::from_name("Curved_Arrow"), Some(Tool::CurvedArrow));
        assert_eq!(Tool::from_name("rectangle"), Some(Tool::Rectangle));
        assert_eq!(Tool::from_name("lasso"), None);
    }

    #[test]
    fn pen_stroke_draws_live_and_commits_on_up() {
        let mut rig = Rig::new();
        assert_eq!(rig.down(10.0, 10.0), InputResponse::Started);
        assert_eq!(rig.engine.state(), EngineState::StrokeInProgress);
        assert_eq!(rig.drag(40.0, 10.0), InputResponse::Drawn);
        assert_eq!(*rig.layer.pixels().get_pixel(50, 20), RED);
        assert_eq!(rig.history.len(), 1);
        assert_eq!(rig.up(None), InputResponse::Committed);
        assert_eq!(rig.engine.state(), EngineState::Idle);
        assert_eq!(rig.history.len(), 2);
        assert_eq!(rig.history.current().map(|s| s.description()), Some("Pen Stroke"));
    }

    #[test]
    fn leave_behaves_like_up() {
        let mut a = Rig::new();
        a.select(Tool::Oval);
        a.down(10.0, 10.0);
        a.drag(60.0, 40.0);
        a.up(None);

        let mut b = Rig::new();
        b.select(Tool::Oval);
        b.down(10.0, 10.0);
        b.drag(60.0, 40.0);
        assert_eq!(b.leave(), InputResponse::Committed);

        assert_eq!(a.layer.pixels(), b.layer.pixels());
        assert_eq!(a.history.len(), b.history.len());
        assert_eq!(b.engine.state(), EngineState::Idle);
    }

    #[test]
    fn shape_preview_does_not_touch_history_until_release() {
        let mut rig = Rig::new();
        rig.select(Tool::Rectangle);
        rig.down(10.0, 10.0);
        assert!(rig.layer.pixels().pixels().all(|p| p[3] == 0));
        rig.drag(50.0, 50.0);
        assert_eq!(rig.history.len(), 1);
        assert!(rig.layer.committed().pixels().all(|p| p[3] == 0));
        rig.up(None);
        assert_eq!(rig.history.len(), 2);
        assert_eq!(rig.layer.committed(), rig.layer.pixels());
    }

    #[test]
    fn dragging_through_frames_equals_direct_draw() {
        let mut dragged = Rig::new();
        dragged.select(Tool::CurvedArrow);
        dragged.down(20.0, 20.0);
        for (x, y) in [(90.0, 70.0), (25.0, 60.0), (5.0, 5.0), (70.0, 30.0), (60.0, 50.0)] {
            dragged.drag(x, y);
        }
        dragged.up(Some((60.0, 50.0)));

        let mut direct = Rig::new();
        direct.select(Tool::CurvedArrow);
        direct.down(20.0, 20.0);
        direct.up(Some((60.0, 50.0)));

        assert_eq!(dragged.layer.pixels(), direct.layer.pixels());
    }

    #[test]
    fn preview_restores_existing_committed_content() {
        let mut rig = Rig::new();
        rig.down(0.0, 40.0);
        rig.drag(100.0, 40.0);
        rig.up(None);
        let before = rig.layer.pixels().clone();

        rig.select(Tool::Circle);
        rig.down(50.0, 40.0);
        rig.drag(80.0, 40.0);
        rig.drag(55.0, 40.0);
        // The big circle's top edge is gone and the stroke under it is intact.
        assert_eq!(rig.layer.pixels().get_pixel(100, 20)[3], 0);
        assert_eq!(rig.layer.pixels().get_pixel(160, 80), before.get_pixel(160, 80));
        assert_eq!(rig.layer.pixels().get_pixel(30, 80), before.get_pixel(30, 80));
    }

    #[test]
    fn eraser_is_wider_and_clears_alpha() {
        let mut rig = Rig::new();
        rig.down(0.0, 40.0);
        rig.drag(100.0, 40.0);
        rig.up(None);
        rig.engine.set_brush_size(2.0);
        rig.select(Tool::Eraser);
        rig.down(50.0, 20.0);
        rig.drag(50.0, 60.0);
        rig.up(None);
        // 2 * 4 = 8 logical wide: x = 47 is inside the eraser band.
        assert_eq!(rig.layer.pixels().get_pixel(94, 80)[3], 0);
        assert_eq!(rig.layer.pixels().get_pixel(40, 80)[3], 255);
        assert_eq!(rig.history.current().map(|s| s.description()), Some("Eraser Stroke"));
    }

    #[test]
    fn tool_switch_finishes_active_action() {
        let mut rig = Rig::new();
        rig.down(10.0, 10.0);
        rig.drag(20.0, 20.0);
        assert_eq!(rig.select(Tool::Circle), InputResponse::Committed);
        assert_eq!(rig.engine.state(), EngineState::Idle);
        assert_eq!(rig.history.len(), 2);
        assert_eq!(rig.engine.settings.tool, Tool::Circle);
    }

    #[test]
    fn second_down_commits_the_first_action() {
        let mut rig = Rig::new();
        rig.down(10.0, 10.0);
        rig.drag(20.0, 20.0);
        rig.down(30.0, 30.0);
        assert_eq!(rig.history.len(), 2);
        assert_eq!(rig.engine.state(), EngineState::StrokeInProgress);
        assert_eq!(rig.engine.session().map(|s| s.anchor), Some(pos2(30.0, 30.0)));
    }

    #[test]
    fn click_without_move_still_commits() {
        let mut rig = Rig::new();
        rig.down(10.0, 10.0);
        assert_eq!(rig.up(None), InputResponse::Committed);
        assert_eq!(rig.history.len(), 2);
        assert!(rig.layer.pixels().pixels().all(|p| p[3] == 0));
    }

    #[test]
    fn pan_moves_viewport_only() {
        let mut rig = Rig::new();
        rig.select(Tool::Pan);
        rig.down(100.0, 100.0);
        assert_eq!(rig.engine.state(), EngineState::Panning);
        assert_eq!(rig.drag(130.0, 90.0), InputResponse::Panned);
        rig.drag(150.0, 150.0);
        assert_eq!(rig.up(None), InputResponse::Panned);
        assert_eq!(rig.viewport.pan_offset(), egui::vec2(50.0, 50.0));
        assert_eq!(rig.history.len(), 1);
        assert!(rig.layer.pixels().pixels().all(|p| p[3] == 0));
    }

    #[test]
    fn moves_while_idle_are_ignored() {
        let mut rig = Rig::new();
        assert_eq!(rig.drag(10.0, 10.0), InputResponse::Ignored);
        assert_eq!(rig.up(None), InputResponse::Ignored);
        assert_eq!(rig.leave(), InputResponse::Ignored);
    }

    #[test]
    fn invalid_brush_sizes_are_ignored() {
        let mut engine = ToolEngine::new(ToolSettings::default());
        engine.set_brush_size(0.0);
        engine.set_brush_size(f32::NAN);
        assert_eq!(engine.settings.brush_size, 3.0);
        engine.set_brush_size(7.5);
        assert_eq!(engine.settings.brush_size, 7.5);
    }
}
