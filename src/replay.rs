//! Headless action scripts.
//!
//! One command per line, `#` starts a comment:
//!
//! ```text
//! tool pen
//! color #ff0000
//! size 4
//! down 100 100
//! move 200 100
//! up
//! zoom in
//! pan 50 50
//! undo
//! ```
//!
//! Coordinates are logical. The player converts them to client space through
//! the surface's current viewport before dispatching, so scripts exercise the
//! same mapping a real pointer goes through.

use egui::{Pos2, Rect, Vec2};
use image::Rgba;

use crate::canvas::{CanvasSurface, SurfaceError};
use crate::components::tools::{InputResponse, Tool};
use crate::coords;
use crate::settings::parse_hex_color;

#[derive(Debug, Clone, PartialEq)]
pub struct ScriptError {
    /// 1-based source line.
    pub line: usize,
    pub message: String,
}

impl std::fmt::Display for ScriptError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

impl std::error::Error for ScriptError {}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ZoomCommand {
    In,
    Out,
    Reset,
    Set(f32),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Command {
    Tool(Tool),
    Color(Rgba<u8>),
    Size(f32),
    Down(Pos2),
    Move(Pos2),
    Up(Option<Pos2>),
    Leave,
    Undo,
    Redo,
    Clear,
    Zoom(ZoomCommand),
    /// Screen-space drag with the pan tool.
    Pan(Vec2),
}

#[derive(Clone, Debug, PartialEq)]
pub struct ScriptLine {
    pub line: usize,
    pub command: Command,
}

pub fn parse_script(text: &str) -> Result<Vec<ScriptLine>, ScriptError> {
    let mut out = Vec::new();
    for (idx, raw) in text.lines().enumerate() {
        let line = idx + 1;
        let tokens = tokenize(raw);
        if tokens.is_empty() {
            continue;
        }
        let command = parse_command(&tokens).map_err(|message| ScriptError { line, message })?;
        out.push(ScriptLine { line, command });
    }
    Ok(out)
}

/// Whitespace tokens up to the first comment. The argument of `color` may
/// start with `#`.
fn tokenize(raw: &str) -> Vec<&str> {
    let mut tokens: Vec<&str> = Vec::new();
    for tok in raw.split_whitespace() {
        let is_color_arg = tokens.len() == 1
            && (tokens[0].eq_ignore_ascii_case("color") || tokens[0].eq_ignore_ascii_case("colour"));
        if tok.starts_with('#') && !is_color_arg {
            break;
        }
        tokens.push(tok);
    }
    tokens
}

fn parse_command(tokens: &[&str]) -> Result<Command, String> {
    let verb = tokens.first().map(|v| v.to_ascii_lowercase()).unwrap_or_default();
    let args = tokens.get(1..).unwrap_or(&[]);

    let num = |s: &str| -> Result<f32, String> {
        s.parse::<f32>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| format!("'{}' is not a number", s))
    };
    let point = |args: &[&str]| -> Result<Pos2, String> {
        match args {
            [x, y] => Ok(Pos2::new(num(*x)?, num(*y)?)),
            _ => Err(format!("'{}' expects two coordinates", verb)),
        }
    };
    let no_args = |cmd: Command| -> Result<Command, String> {
        if args.is_empty() {
            Ok(cmd)
        } else {
            Err(format!("'{}' takes no arguments", verb))
        }
    };

    match verb.as_str() {
        "tool" => match args {
            [name] => Tool::from_name(name)
                .map(Command::Tool)
                .ok_or_else(|| format!("unknown tool '{}'", name)),
            _ => Err("'tool' expects a name".to_string()),
        },
        "color" | "colour" => match args {
            [hex] => parse_hex_color(hex)
                .map(Command::Color)
                .ok_or_else(|| format!("bad color '{}'", hex)),
            _ => Err("'color' expects #rrggbb".to_string()),
        },
        "size" => match args {
            [v] => {
                let v = num(*v)?;
                if v > 0.0 {
                    Ok(Command::Size(v))
                } else {
                    Err("size must be positive".to_string())
                }
            }
            _ => Err("'size' expects one number".to_string()),
        },
        "down" => point(args).map(Command::Down),
        "move" => point(args).map(Command::Move),
        "up" => {
            if args.is_empty() {
                Ok(Command::Up(None))
            } else {
                point(args).map(|p| Command::Up(Some(p)))
            }
        }
        "leave" => no_args(Command::Leave),
        "undo" => no_args(Command::Undo),
        "redo" => no_args(Command::Redo),
        "clear" => no_args(Command::Clear),
        "zoom" => match args {
            ["in"] => Ok(Command::Zoom(ZoomCommand::In)),
            ["out"] => Ok(Command::Zoom(ZoomCommand::Out)),
            ["reset"] => Ok(Command::Zoom(ZoomCommand::Reset)),
            [v] => num(*v).map(|f| Command::Zoom(ZoomCommand::Set(f))),
            _ => Err("'zoom' expects in|out|reset|<factor>".to_string()),
        },
        "pan" => point(args).map(|p| Command::Pan(p.to_vec2())),
        other => Err(format!("unknown command '{}'", other)),
    }
}

/// Tally of what a replay did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReplayReport {
    pub commands: usize,
    pub commits: usize,
    pub restores: usize,
    pub rejected: usize,
}

impl ReplayReport {
    fn record(&mut self, response: InputResponse) {
        match response {
            InputResponse::Committed => self.commits += 1,
            InputResponse::Restored => self.restores += 1,
            InputResponse::Rejected => self.rejected += 1,
            _ => {}
        }
    }
}

/// Run `script` against `surface`.
pub fn play(surface: &mut CanvasSurface, script: &[ScriptLine]) -> Result<ReplayReport, SurfaceError> {
    let mut report = ReplayReport::default();
    for step in script {
        report.commands += 1;
        let response = match step.command {
            Command::Tool(tool) => surface.set_tool(tool)?,
            Command::Color(c) => {
                surface.set_color(c);
                InputResponse::Ignored
            }
            Command::Size(s) => {
                surface.set_brush_size(s);
                InputResponse::Ignored
            }
            Command::Down(p) => {
                let (client, bounds) = to_client(surface, p);
                surface.pointer_down(client, bounds)?
            }
            Command::Move(p) => {
                let (client, bounds) = to_client(surface, p);
                surface.pointer_move(client, bounds)
            }
            Command::Up(p) => {
                let bounds = presented_bounds(surface);
                let client = p.map(|p| to_client(surface, p).0);
                surface.pointer_up(client, bounds)?
            }
            Command::Leave => surface.pointer_leave()?,
            Command::Undo => surface.undo()?,
            Command::Redo => surface.redo()?,
            Command::Clear => surface.clear()?,
            Command::Zoom(z) => {
                match z {
                    ZoomCommand::In => surface.zoom_in(),
                    ZoomCommand::Out => surface.zoom_out(),
                    ZoomCommand::Reset => surface.reset_view(),
                    ZoomCommand::Set(f) => surface.set_zoom(f),
                }
                InputResponse::Ignored
            }
            Command::Pan(delta) => pan_drag(surface, delta)?,
        };
        if response == InputResponse::Rejected {
            log_warn!("replay line {}: {:?} rejected", step.line, step.command);
        }
        report.record(response);
    }
    log_info!(
        "Replay finished: {} commands, {} commits, {} restores, {} rejected",
        report.commands,
        report.commits,
        report.restores,
        report.rejected
    );
    Ok(report)
}

/// On-screen rect of the canvas, taking the unzoomed canvas to sit at the origin.
fn presented_bounds(surface: &CanvasSurface) -> Rect {
    let logical = surface.logical_size().unwrap_or(Vec2::ZERO);
    surface
        .viewport()
        .presented_rect(Rect::from_min_size(Pos2::ZERO, logical))
}

fn to_client(surface: &CanvasSurface, logical: Pos2) -> (Pos2, Rect) {
    let bounds = presented_bounds(surface);
    let size = surface.logical_size().unwrap_or(Vec2::ZERO);
    (coords::logical_to_client(logical, bounds, size), bounds)
}

/// Press, drag by `delta` and release with the pan tool, then restore the
/// previous tool.
fn pan_drag(surface: &mut CanvasSurface, delta: Vec2) -> Result<InputResponse, SurfaceError> {
    let previous = surface.tool_settings().tool;
    surface.set_tool(Tool::Pan)?;
    let bounds = presented_bounds(surface);
    let start = bounds.center();
    let mut response = surface.pointer_down(start, bounds)?;
    if response != InputResponse::Rejected {
        surface.pointer_move(start + delta, bounds);
        response = surface.pointer_up(None, bounds)?;
    }
    surface.set_tool(previous)?;
    Ok(response)
}
