use image::Rgb;
use std::path::PathBuf;
use std::time::Duration;

/// Errors raised while resolving the pipeline configuration
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("{what} resolution must be non-zero, got {width}x{height}")]
    InvalidResolution {
        what: &'static str,
        width: u32,
        height: u32,
    },

    #[error("target fps must be at least 1")]
    InvalidFps,

    #[error("only one background source may be selected (got {0})")]
    ConflictingBackgrounds(String),

    #[error("invalid background colour {0:?}: expected six hex digits like 00FF00")]
    InvalidColor(String),

    #[error("pixel size must be between 1 and the output size, got {0}")]
    InvalidPixelSize(u32),

    #[error("temporal smoothing weight must be in (0, 1], got {0}")]
    InvalidSmoothing(f32),

    #[error("trail {what} must be at least 1")]
    InvalidTrailParameter { what: &'static str },

    #[error("trail fade opacity must be in [0, 1], got {0}")]
    InvalidFade(f32),

    #[error("trail hue shift must be a finite number of degrees, got {0}")]
    InvalidHueShift(f32),

    #[error("video backgrounds require the `background-video` feature")]
    VideoUnsupported,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    fn check(self, what: &'static str) -> Result<Self, ConfigError> {
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::InvalidResolution {
                what,
                width: self.width,
                height: self.height,
            });
        }
        Ok(self)
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Where the replacement background comes from
#[derive(Debug, Clone, PartialEq)]
pub enum BackgroundMode {
    /// Keep the camera's own background
    None,
    Color(Rgb<u8>),
    Image(PathBuf),
    Video(PathBuf),
}

impl BackgroundMode {
    /// Resolve the mutually exclusive background flags into a single mode
    pub fn from_flags(
        color: Option<&str>,
        image: Option<PathBuf>,
        video: Option<PathBuf>,
    ) -> Result<Self, ConfigError> {
        let selected: Vec<&str> = [
            color.map(|_| "color"),
            image.as_ref().map(|_| "image"),
            video.as_ref().map(|_| "video"),
        ]
        .into_iter()
        .flatten()
        .collect();

        if selected.len() > 1 {
            return Err(ConfigError::ConflictingBackgrounds(selected.join(", ")));
        }

        if let Some(hex) = color {
            return Ok(Self::Color(parse_hex_color(hex)?));
        }
        if let Some(path) = image {
            return Ok(Self::Image(path));
        }
        if let Some(path) = video {
            return Ok(Self::Video(path));
        }
        Ok(Self::None)
    }
}

/// Parse `RRGGBB` (optionally prefixed with `#`) into an RGB triple
pub fn parse_hex_color(hex: &str) -> Result<Rgb<u8>, ConfigError> {
    let digits = hex.trim().trim_start_matches('#');
    let invalid = || ConfigError::InvalidColor(hex.to_string());

    if digits.len() != 6 || !digits.is_ascii() {
        return Err(invalid());
    }

    let channel = |range: std::ops::Range<usize>| {
        u8::from_str_radix(&digits[range], 16).map_err(|_| invalid())
    };

    Ok(Rgb([channel(0..2)?, channel(2..4)?, channel(4..6)?]))
}

/// Artistic effect applied to the whole frame before it is used as foreground
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ForegroundEffect {
    #[default]
    None,
    /// Painterly stylization
    Stylize,
    /// Colour pencil sketch
    Sketch,
    /// Grayscale pencil sketch rendered back to three channels
    SketchMono,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelateConfig {
    pub enabled: bool,
    pub pixel_size: u32,
    pub invert: bool,
}

impl Default for PixelateConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            pixel_size: 16,
            invert: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrailsConfig {
    pub enabled: bool,
    /// Capture a snapshot every `interval` frames
    pub interval: u32,
    /// Trail buffer capacity
    pub count: usize,
    /// Opacity of the oldest trail
    pub fade_start: f32,
    /// Opacity of the newest trail
    pub fade_end: f32,
    /// Pixelate snapshots with the background pixel size
    pub pixelate: bool,
    /// Hue rotation in degrees per trail index
    pub hue_shift: f32,
}

impl Default for TrailsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval: 3,
            count: 8,
            fade_start: 0.1,
            fade_end: 0.6,
            pixelate: false,
            hue_shift: 0.0,
        }
    }
}

/// Immutable configuration for one pipeline run
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub capture: Resolution,
    pub output: Resolution,
    pub fps: u32,
    pub background: BackgroundMode,
    pub pixelate: PixelateConfig,
    pub foreground_effect: ForegroundEffect,
    pub trails: TrailsConfig,
    /// Weight of the current matte in the temporal EMA
    pub smoothing: f32,
    /// Emit the matte as a grayscale frame instead of the composite
    pub show_matte: bool,
}

/// Weight given to the current frame's matte when smoothing.
///
/// Two historical builds used 0.7 and 0.3; 0.7 favours responsiveness.
pub const DEFAULT_SMOOTHING: f32 = 0.7;

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            capture: Resolution::new(1920, 1080),
            output: Resolution::new(1280, 720),
            fps: 30,
            background: BackgroundMode::None,
            pixelate: PixelateConfig::default(),
            foreground_effect: ForegroundEffect::None,
            trails: TrailsConfig::default(),
            smoothing: DEFAULT_SMOOTHING,
            show_matte: false,
        }
    }
}

impl PipelineConfig {
    /// Check every invariant once so the rest of the pipeline can trust the values
    pub fn validate(self) -> Result<Self, ConfigError> {
        self.capture.check("capture")?;
        self.output.check("output")?;

        if self.fps == 0 {
            return Err(ConfigError::InvalidFps);
        }

        if !(self.smoothing > 0.0 && self.smoothing <= 1.0) {
            return Err(ConfigError::InvalidSmoothing(self.smoothing));
        }

        let uses_pixel_size = self.pixelate.enabled || (self.trails.enabled && self.trails.pixelate);
        let max_block = self.output.width.min(self.output.height);
        if uses_pixel_size && (self.pixelate.pixel_size == 0 || self.pixelate.pixel_size > max_block) {
            return Err(ConfigError::InvalidPixelSize(self.pixelate.pixel_size));
        }

        if self.trails.enabled {
            if self.trails.interval == 0 {
                return Err(ConfigError::InvalidTrailParameter { what: "interval" });
            }
            if self.trails.count == 0 {
                return Err(ConfigError::InvalidTrailParameter { what: "count" });
            }
            for fade in [self.trails.fade_start, self.trails.fade_end] {
                if !(0.0..=1.0).contains(&fade) {
                    return Err(ConfigError::InvalidFade(fade));
                }
            }
            if !self.trails.hue_shift.is_finite() {
                return Err(ConfigError::InvalidHueShift(self.trails.hue_shift));
            }
        }

        if matches!(self.background, BackgroundMode::Video(_)) && !cfg!(feature = "background-video") {
            return Err(ConfigError::VideoUnsupported);
        }

        Ok(self)
    }

    pub fn frame_duration(&self) -> Duration {
        Duration::from_secs_f32(1.0 / self.fps as f32)
    }
}
