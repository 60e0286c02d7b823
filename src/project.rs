use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::canvas::{CanvasSurface, SurfaceError};
use crate::export::EncodedImage;
use crate::io::{self, BackgroundSource};
use crate::settings::EditorSettings;

/// Host-side persistence for annotation-only exports.
pub trait SaveSink {
    fn save(&mut self, image: &EncodedImage) -> Result<(), String>;
}

impl<F> SaveSink for F
where
    F: FnMut(&EncodedImage) -> Result<(), String>,
{
    fn save(&mut self, image: &EncodedImage) -> Result<(), String> {
        self(image)
    }
}

/// Writes the annotation PNG to a fixed path.
pub struct FileSink {
    pub path: PathBuf,
}

impl SaveSink for FileSink {
    fn save(&mut self, image: &EncodedImage) -> Result<(), String> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| e.to_string())?;
        }
        io::write_bytes(&self.path, &image.bytes).map_err(|e| e.to_string())
    }
}

/// One open chart: the surface plus everything that should reset when the
/// editor closes.
pub struct ChartSession {
    pub id: Uuid,
    /// Display name (derived from the background source)
    pub name: String,
    pub settings: EditorSettings,
    surface: CanvasSurface,
    /// `(commit_count, current_index)` at the last save.
    saved_marker: Option<(u64, Option<usize>)>,
}

impl ChartSession {
    /// Begin loading a chart. `previous` is an earlier annotation-only export.
    pub fn open(source: BackgroundSource, previous: Option<Vec<u8>>, settings: EditorSettings) -> Self {
        let name = source_name(&source);
        let surface = CanvasSurface::open(source, previous, &settings);
        Self::from_surface(surface, name, settings)
    }

    pub fn from_surface(surface: CanvasSurface, name: String, settings: EditorSettings) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            settings,
            surface,
            saved_marker: None,
        }
    }

    pub fn surface(&self) -> &CanvasSurface {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut CanvasSurface {
        &mut self.surface
    }

    /// True when the current annotation differs from the last save (or from
    /// the state at open, if never saved).
    pub fn is_dirty(&self) -> bool {
        let history = self.surface.history();
        let now = (history.commit_count(), history.current_index());
        let baseline = self.saved_marker.unwrap_or((1, Some(0)));
        self.surface.is_ready() && now != baseline
    }

    pub fn mark_clean(&mut self) {
        let history = self.surface.history();
        self.saved_marker = Some((history.commit_count(), history.current_index()));
    }

    /// Get the display title (name with dirty indicator)
    pub fn display_title(&self) -> String {
        if self.is_dirty() {
            format!("{}*", self.name)
        } else {
            self.name.clone()
        }
    }

    /// Hand the annotation-only export to `sink`. The only write path to
    /// external persistence.
    pub fn save(&mut self, sink: &mut dyn SaveSink) -> Result<EncodedImage, SurfaceError> {
        let image = self.surface.exporter()?.export_annotation_only()?;
        if let Err(e) = sink.save(&image) {
            log_err!("Save of \"{}\" failed: {}", self.name, e);
            return Err(SurfaceError::Save(e));
        }
        self.mark_clean();
        log_info!("Saved \"{}\" ({} bytes)", self.name, image.bytes.len());
        Ok(image)
    }

    /// Write the full-resolution composite to the configured download dir.
    pub fn download(&self) -> Result<PathBuf, SurfaceError> {
        let dir = self
            .settings
            .download_dir
            .clone()
            .unwrap_or_else(io::default_download_dir);
        self.download_to(&dir)
    }

    pub fn download_to(&self, dir: &Path) -> Result<PathBuf, SurfaceError> {
        let image = self.surface.exporter()?.export_composite()?;
        let path = io::write_download(dir, &image.bytes)?;
        log_info!("Downloaded \"{}\" to {}", self.name, path.display());
        Ok(path)
    }

    /// End the session. History and in-memory layers are discarded; only
    /// what was saved survives.
    pub fn close(self) {
        if self.is_dirty() {
            log_warn!("Closing \"{}\" with unsaved changes", self.name);
        } else {
            log_info!("Closed \"{}\"", self.name);
        }
    }
}

fn source_name(source: &BackgroundSource) -> String {
    match source {
        BackgroundSource::Path(p) => p
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "Chart".to_string()),
        BackgroundSource::Url(u) => u
            .rsplit('/')
            .find(|s| !s.is_empty())
            .map(|s| s.split(['?', '#']).next().unwrap_or(s).to_string())
            .unwrap_or_else(|| "Chart".to_string()),
        BackgroundSource::Bytes(_) => "Chart".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use egui::{Pos2, Rect, pos2};
    use image::{Rgba, RgbaImage};

    fn session() -> ChartSession {
        let settings = EditorSettings {
            target_width: 40,
            scale_factor: 1.0,
            ..EditorSettings::default()
        };
        let bg = RgbaImage::from_pixel(40, 40, Rgba([200, 200, 200, 255]));
        let surface = CanvasSurface::from_images(&bg, None, &settings).unwrap();
        ChartSession::from_surface(surface, "tooth-12.png".to_string(), settings)
    }

    fn scribble(s: &mut ChartSession) {
        let b = Rect::from_min_size(Pos2::ZERO, egui::vec2(40.0, 40.0));
        let surface = s.surface_mut();
        surface.pointer_down(pos2(5.0, 5.0), b).unwrap();
        surface.pointer_move(pos2(30.0, 30.0), b);
        surface.pointer_up(None, b).unwrap();
    }

    #[test]
    fn dirty_tracks_commits_and_saves() {
        let mut s = session();
        assert!(!s.is_dirty());
        assert_eq!(s.display_title(), "tooth-12.png");
        scribble(&mut s);
        assert!(s.is_dirty());
        assert_eq!(s.display_title(), "tooth-12.png*");

        let mut saved: Vec<EncodedImage> = Vec::new();
        let mut sink = |img: &EncodedImage| -> Result<(), String> {
            saved.push(img.clone());
            Ok(())
        };
        s.save(&mut sink).unwrap();
        assert!(!s.is_dirty());
        assert_eq!(saved.len(), 1);

        s.surface_mut().undo().unwrap();
        assert!(s.is_dirty());
        s.surface_mut().redo().unwrap();
        assert!(!s.is_dirty());
    }

    #[test]
    fn failing_sink_keeps_session_dirty() {
        let mut s = session();
        scribble(&mut s);
        let mut sink = |_: &EncodedImage| -> Result<(), String> { Err("disk full".to_string()) };
        assert!(matches!(s.save(&mut sink), Err(SurfaceError::Save(_))));
        assert!(s.is_dirty());
    }

    #[test]
    fn file_sink_and_download_write_pngs() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = session();
        scribble(&mut s);
        let mut sink = FileSink {
            path: dir.path().join("out").join("annotation.png"),
        };
        s.save(&mut sink).unwrap();
        let saved = io::decode_png(&std::fs::read(&sink.path).unwrap()).unwrap();
        assert_eq!(saved.get_pixel(0, 39)[3], 0);

        let path = s.download_to(dir.path()).unwrap();
        let composite = io::decode_png(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(*composite.get_pixel(0, 39), Rgba([200, 200, 200, 255]));
        s.close();
    }

    #[test]
    fn names_from_sources() {
        assert_eq!(source_name(&BackgroundSource::parse("/x/root-canal.png")), "root-canal.png");
        assert_eq!(
            source_name(&BackgroundSource::parse("https://h/charts/molar.jpg?v=2")),
            "molar.jpg"
        );
        assert_eq!(source_name(&BackgroundSource::Bytes(vec![1])), "Chart");
    }
}
