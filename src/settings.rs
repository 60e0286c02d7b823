use image::Rgba;
use std::path::{Path, PathBuf};

/// Editor settings that persist across sessions.
#[derive(Clone, Debug, PartialEq)]
pub struct EditorSettings {
    /// Logical width the background diagram is fitted to.
    pub target_width: u32,
    /// Physical backing-store pixels per logical pixel.
    pub scale_factor: f32,
    pub zoom_min: f32,
    pub zoom_max: f32,
    /// Additive zoom increment for zoom in/out.
    pub zoom_step: f32,
    pub default_color: Rgba<u8>,
    pub default_brush_size: f32,
    /// Maximum number of history snapshots (0 = unbounded)
    pub max_history_steps: usize,
    /// Where `download()` writes composites. `None` = OS download dir.
    pub download_dir: Option<PathBuf>,
}

impl Default for EditorSettings {
    fn default() -> Self {
        Self {
            target_width: 600,
            scale_factor: 2.0,
            zoom_min: 0.5,
            zoom_max: 3.0,
            zoom_step: 0.25,
            default_color: Rgba([255, 0, 0, 255]),
            default_brush_size: 3.0,
            max_history_steps: 0,
            download_dir: None,
        }
    }
}

impl EditorSettings {
    /// Path to the settings file.
    /// On Linux:   ~/.config/chartmark/chartmark_settings.cfg  (XDG_CONFIG_HOME respected)
    /// On Windows: %APPDATA%\ChartMark\chartmark_settings.cfg
    /// On macOS:   ~/Library/Application Support/ChartMark/chartmark_settings.cfg
    pub fn settings_path() -> Option<PathBuf> {
        #[cfg(target_os = "windows")]
        {
            let appdata = std::env::var("APPDATA").ok()?;
            return Some(PathBuf::from(appdata).join("ChartMark").join("chartmark_settings.cfg"));
        }
        #[cfg(target_os = "macos")]
        {
            let home = std::env::var("HOME").ok()?;
            return Some(
                PathBuf::from(home)
                    .join("Library")
                    .join("Application Support")
                    .join("ChartMark")
                    .join("chartmark_settings.cfg"),
            );
        }
        #[cfg(not(any(target_os = "windows", target_os = "macos")))]
        {
            let config_dir = std::env::var("XDG_CONFIG_HOME")
                .map(PathBuf::from)
                .or_else(|_| std::env::var("HOME").map(|h| PathBuf::from(h).join(".config")))
                .ok()?;
            Some(config_dir.join("chartmark").join("chartmark_settings.cfg"))
        }
    }

    /// Load from the default location (defaults if missing or unreadable).
    pub fn load() -> Self {
        match Self::settings_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::parse(&content),
            Err(_) => Self::default(),
        }
    }

    /// Parse `key=value` lines. Unknown keys are skipped and malformed values
    /// keep their defaults.
    pub fn parse(content: &str) -> Self {
        let mut s = Self::default();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, val)) = line.split_once('=') else { continue };
            let key = key.trim();
            let val = val.trim();
            match key {
                "target_width" => match val.parse::<u32>() {
                    Ok(w) if w > 0 => s.target_width = w,
                    _ => {
                        log_warn!("settings: bad target_width '{}'", val);
                    }
                },
                "scale_factor" => {
                    if let Ok(f) = val.parse::<f32>()
                        && f.is_finite()
                    {
                        s.scale_factor = f.clamp(1.0, 8.0);
                    }
                }
                "zoom_min" => s.zoom_min = val.parse().unwrap_or(s.zoom_min),
                "zoom_max" => s.zoom_max = val.parse().unwrap_or(s.zoom_max),
                "zoom_step" => s.zoom_step = val.parse().unwrap_or(s.zoom_step),
                "default_color" => match parse_hex_color(val) {
                    Some(c) => s.default_color = c,
                    None => {
                        log_warn!("settings: bad default_color '{}'", val);
                    }
                },
                "default_brush_size" => {
                    if let Ok(b) = val.parse::<f32>()
                        && b > 0.0
                    {
                        s.default_brush_size = b;
                    }
                }
                "max_history_steps" => {
                    s.max_history_steps = val.parse().unwrap_or(s.max_history_steps);
                }
                "download_dir" => {
                    s.download_dir = if val.is_empty() { None } else { Some(PathBuf::from(val)) };
                }
                _ => {}
            }
        }
        s
    }

    pub fn to_config_string(&self) -> String {
        format!(
            "target_width={}\n\
             scale_factor={}\n\
             zoom_min={}\n\
             zoom_max={}\n\
             zoom_step={}\n\
             default_color={}\n\
             default_brush_size={}\n\
             max_history_steps={}\n\
             download_dir={}\n",
            self.target_width,
            self.scale_factor,
            self.zoom_min,
            self.zoom_max,
            self.zoom_step,
            color_to_hex(self.default_color),
            self.default_brush_size,
            self.max_history_steps,
            self.download_dir
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
        )
    }

    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_config_string())
    }

    /// Save to the default location; failures are logged, not raised.
    pub fn save(&self) {
        let Some(path) = Self::settings_path() else { return };
        if let Err(e) = self.save_to(&path) {
            log_warn!("settings: could not write {}: {}", path.display(), e);
        }
    }
}

/// Parse `#rrggbb` or `#rrggbbaa` (leading `#` optional).
pub fn parse_hex_color(s: &str) -> Option<Rgba<u8>> {
    let hex = s.trim().trim_start_matches('#');
    if !hex.is_ascii() {
        return None;
    }
    let byte = |i: usize| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok();
    match hex.len() {
        6 => Some(Rgba([byte(0)?, byte(2)?, byte(4)?, 255])),
        8 => Some(Rgba([byte(0)?, byte(2)?, byte(4)?, byte(6)?])),
        _ => None,
    }
}

pub fn color_to_hex(c: Rgba<u8>) -> String {
    if c[3] == 255 {
        format!("#{:02x}{:02x}{:02x}", c[0], c[1], c[2])
    } else {
        format!("#{:02x}{:02x}{:02x}{:02x}", c[0], c[1], c[2], c[3])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_colors() {
        assert_eq!(parse_hex_color("#ff0000"), Some(Rgba([255, 0, 0, 255])));
        assert_eq!(parse_hex_color("00ff0080"), Some(Rgba([0, 255, 0, 128])));
        assert_eq!(parse_hex_color("#fff"), None);
        assert_eq!(parse_hex_color("#gg0000"), None);
        assert_eq!(color_to_hex(Rgba([1, 2, 3, 255])), "#010203");
        assert_eq!(color_to_hex(Rgba([1, 2, 3, 4])), "#01020304");
    }

    #[test]
    fn parse_overrides_and_ignores_junk() {
        let s = EditorSettings::parse(
            "# comment\n\
             target_width=800\n\
             scale_factor=50\n\
             default_color=#0000ff\n\
             default_brush_size=-2\n\
             max_history_steps=20\n\
             nonsense\n\
             unknown_key=1\n",
        );
        assert_eq!(s.target_width, 800);
        assert_eq!(s.scale_factor, 8.0);
        assert_eq!(s.default_color, Rgba([0, 0, 255, 255]));
        assert_eq!(s.default_brush_size, 3.0);
        assert_eq!(s.max_history_steps, 20);
    }

    #[test]
    fn bad_values_keep_defaults() {
        let s = EditorSettings::parse("target_width=0\nzoom_step=abc\n");
        assert_eq!(s, EditorSettings::default());
    }

    #[test]
    fn malformed_width_and_color_are_logged_and_skipped() {
        let s = EditorSettings::parse("target_width=-5\ndefault_color=#zzz\ndefault_brush_size=7\n");
        assert_eq!(s.target_width, 600);
        assert_eq!(s.default_color, Rgba([255, 0, 0, 255]));
        assert_eq!(s.default_brush_size, 7.0);
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("chartmark_settings.cfg");
        let mut s = EditorSettings::default();
        s.target_width = 420;
        s.default_color = Rgba([9, 8, 7, 200]);
        s.download_dir = Some(PathBuf::from("/tmp/out"));
        s.save_to(&path).unwrap();
        assert_eq!(EditorSettings::load_from(&path), s);
    }

    #[test]
    fn missing_file_gives_defaults() {
        let s = EditorSettings::load_from(Path::new("/no/such/chartmark.cfg"));
        assert_eq!(s, EditorSettings::default());
    }
}
