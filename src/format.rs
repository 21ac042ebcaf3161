//! Video format descriptions negotiated between a channel, its sources and its outputs.

use num_enum::{IntoPrimitive, TryFromPrimitive};
use once_cell::sync::Lazy;

use std::{fmt, str::FromStr};

use crate::{time::Rational, Error, Result};

/// Enumerated broadcast video formats.
///
/// The format type is selected when a [`Channel`](crate::Channel) is created
/// and fixes geometry, frame rate and interlacing for its whole lifetime.
///
/// # Examples
///
/// ```
/// use grafton_playout::{VideoFormat, VideoFormatType};
///
/// let format = VideoFormat::new(VideoFormatType::V1080i5000);
/// assert_eq!(format.width(), 1920);
/// assert!(format.is_interlaced());
///
/// let parsed: VideoFormatType = "1080i5000".parse().unwrap();
/// assert_eq!(parsed, VideoFormatType::V1080i5000);
/// ```
#[derive(Debug, TryFromPrimitive, IntoPrimitive, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
#[repr(u32)]
pub enum VideoFormatType {
    /// 720x576 interlaced, 25 fps, 4:3.
    Pal = 1,
    /// 720x576 interlaced, 25 fps, full-height anamorphic 16:9.
    PalFha = 2,
    /// 720x486 interlaced, 29.97 fps, 4:3.
    Ntsc = 3,
    /// 720x486 interlaced, 29.97 fps, full-height anamorphic 16:9.
    NtscFha = 4,
    V720p5000 = 5,
    V720p5994 = 6,
    V720p6000 = 7,
    V1080p2398 = 8,
    V1080p2400 = 9,
    V1080p2500 = 10,
    V1080p2997 = 11,
    V1080p3000 = 12,
    V1080p5000 = 13,
    V1080p5994 = 14,
    V1080p6000 = 15,
    V1080i5000 = 16,
    V1080i5994 = 17,
    V1080i6000 = 18,
    V2160p2398 = 19,
    V2160p2400 = 20,
    V2160p2500 = 21,
    V2160p2997 = 22,
    V2160p3000 = 23,
    V2160p5000 = 24,
    V2160p5994 = 25,
    V2160p6000 = 26,
}

impl VideoFormatType {
    /// All known format types, in declaration order.
    pub const ALL: [VideoFormatType; 26] = [
        Self::Pal,
        Self::PalFha,
        Self::Ntsc,
        Self::NtscFha,
        Self::V720p5000,
        Self::V720p5994,
        Self::V720p6000,
        Self::V1080p2398,
        Self::V1080p2400,
        Self::V1080p2500,
        Self::V1080p2997,
        Self::V1080p3000,
        Self::V1080p5000,
        Self::V1080p5994,
        Self::V1080p6000,
        Self::V1080i5000,
        Self::V1080i5994,
        Self::V1080i6000,
        Self::V2160p2398,
        Self::V2160p2400,
        Self::V2160p2500,
        Self::V2160p2997,
        Self::V2160p3000,
        Self::V2160p5000,
        Self::V2160p5994,
        Self::V2160p6000,
    ];

    /// Canonical configuration name, e.g. `"1080i5000"` or `"PAL"`.
    pub fn name(self) -> &'static str {
        match self {
            Self::Pal => "PAL",
            Self::PalFha => "PAL_FHA",
            Self::Ntsc => "NTSC",
            Self::NtscFha => "NTSC_FHA",
            Self::V720p5000 => "720p5000",
            Self::V720p5994 => "720p5994",
            Self::V720p6000 => "720p6000",
            Self::V1080p2398 => "1080p2398",
            Self::V1080p2400 => "1080p2400",
            Self::V1080p2500 => "1080p2500",
            Self::V1080p2997 => "1080p2997",
            Self::V1080p3000 => "1080p3000",
            Self::V1080p5000 => "1080p5000",
            Self::V1080p5994 => "1080p5994",
            Self::V1080p6000 => "1080p6000",
            Self::V1080i5000 => "1080i5000",
            Self::V1080i5994 => "1080i5994",
            Self::V1080i6000 => "1080i6000",
            Self::V2160p2398 => "2160p2398",
            Self::V2160p2400 => "2160p2400",
            Self::V2160p2500 => "2160p2500",
            Self::V2160p2997 => "2160p2997",
            Self::V2160p3000 => "2160p3000",
            Self::V2160p5000 => "2160p5000",
            Self::V2160p5994 => "2160p5994",
            Self::V2160p6000 => "2160p6000",
        }
    }
}

impl fmt::Display for VideoFormatType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for VideoFormatType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| Error::InvalidConfiguration(format!("Unknown video format: {s}")))
    }
}

/// Order in which the two fields of an interlaced frame are displayed.
#[derive(Debug, TryFromPrimitive, IntoPrimitive, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
#[repr(u32)]
pub enum FieldOrder {
    /// Source does not declare a field order.
    Unknown = 0,
    Progressive = 1,
    /// Top field first.
    TopFieldFirst = 2,
    /// Bottom field first.
    BottomFieldFirst = 3,
}

/// Pixel layout of video frames flowing through a channel.
///
/// This enum is marked `#[non_exhaustive]`; always use a wildcard pattern when matching.
#[derive(Debug, TryFromPrimitive, IntoPrimitive, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
#[repr(u32)]
pub enum PixelFormat {
    /// Blue-Green-Red-Alpha, 32 bits per pixel.
    Bgra = 1,
    /// Packed YCbCr 4:2:2 (UYVY byte order), 16 bits per pixel.
    Yuv422 = 2,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Bgra => 4,
            PixelFormat::Yuv422 => 2,
        }
    }

    pub fn has_alpha(self) -> bool {
        matches!(self, PixelFormat::Bgra)
    }
}

/// Read-only description of a [`VideoFormatType`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoFormat {
    format_type: VideoFormatType,
    width: u32,
    height: u32,
    frame_rate: Rational,
    interlaced: bool,
    field_order: FieldOrder,
    sample_aspect_ratio: Rational,
}

static FORMATS: Lazy<Vec<VideoFormat>> = Lazy::new(|| {
    VideoFormatType::ALL
        .iter()
        .map(|t| VideoFormat::describe(*t))
        .collect()
});

impl VideoFormat {
    pub fn new(format_type: VideoFormatType) -> Self {
        FORMATS
            .iter()
            .find(|f| f.format_type == format_type)
            .copied()
            .unwrap_or_else(|| Self::describe(format_type))
    }

    /// Every supported format descriptor.
    pub fn all() -> &'static [VideoFormat] {
        &FORMATS
    }

    fn describe(format_type: VideoFormatType) -> Self {
        use VideoFormatType as T;

        const P2398: Rational = Rational::new(24000, 1001);
        const P2400: Rational = Rational::new(24, 1);
        const P2500: Rational = Rational::new(25, 1);
        const P2997: Rational = Rational::new(30000, 1001);
        const P3000: Rational = Rational::new(30, 1);
        const P5000: Rational = Rational::new(50, 1);
        const P5994: Rational = Rational::new(60000, 1001);
        const P6000: Rational = Rational::new(60, 1);
        const SQUARE: Rational = Rational::new(1, 1);

        let (width, height, frame_rate, interlaced, sar) = match format_type {
            T::Pal => (720, 576, P2500, true, Rational::new(16, 15)),
            T::PalFha => (720, 576, P2500, true, Rational::new(64, 45)),
            T::Ntsc => (720, 486, P2997, true, Rational::new(8, 9)),
            T::NtscFha => (720, 486, P2997, true, Rational::new(32, 27)),
            T::V720p5000 => (1280, 720, P5000, false, SQUARE),
            T::V720p5994 => (1280, 720, P5994, false, SQUARE),
            T::V720p6000 => (1280, 720, P6000, false, SQUARE),
            T::V1080p2398 => (1920, 1080, P2398, false, SQUARE),
            T::V1080p2400 => (1920, 1080, P2400, false, SQUARE),
            T::V1080p2500 => (1920, 1080, P2500, false, SQUARE),
            T::V1080p2997 => (1920, 1080, P2997, false, SQUARE),
            T::V1080p3000 => (1920, 1080, P3000, false, SQUARE),
            T::V1080p5000 => (1920, 1080, P5000, false, SQUARE),
            T::V1080p5994 => (1920, 1080, P5994, false, SQUARE),
            T::V1080p6000 => (1920, 1080, P6000, false, SQUARE),
            T::V1080i5000 => (1920, 1080, P2500, true, SQUARE),
            T::V1080i5994 => (1920, 1080, P2997, true, SQUARE),
            T::V1080i6000 => (1920, 1080, P3000, true, SQUARE),
            T::V2160p2398 => (3840, 2160, P2398, false, SQUARE),
            T::V2160p2400 => (3840, 2160, P2400, false, SQUARE),
            T::V2160p2500 => (3840, 2160, P2500, false, SQUARE),
            T::V2160p2997 => (3840, 2160, P2997, false, SQUARE),
            T::V2160p3000 => (3840, 2160, P3000, false, SQUARE),
            T::V2160p5000 => (3840, 2160, P5000, false, SQUARE),
            T::V2160p5994 => (3840, 2160, P5994, false, SQUARE),
            T::V2160p6000 => (3840, 2160, P6000, false, SQUARE),
        };

        // SD interlaced is bottom field first, HD interlaced is top field first.
        let field_order = match (interlaced, height) {
            (false, _) => FieldOrder::Progressive,
            (true, h) if h < 720 => FieldOrder::BottomFieldFirst,
            (true, _) => FieldOrder::TopFieldFirst,
        };

        Self {
            format_type,
            width,
            height,
            frame_rate,
            interlaced,
            field_order,
            sample_aspect_ratio: sar,
        }
    }

    pub fn format_type(&self) -> VideoFormatType {
        self.format_type
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Frames per second. For interlaced formats this is the frame (not field) rate.
    pub fn frame_rate(&self) -> Rational {
        self.frame_rate
    }

    /// Duration of one frame, usable as a video time base.
    pub fn frame_duration(&self) -> Rational {
        self.frame_rate.invert()
    }

    pub fn is_interlaced(&self) -> bool {
        self.interlaced
    }

    pub fn field_order(&self) -> FieldOrder {
        self.field_order
    }

    pub fn sample_aspect_ratio(&self) -> Rational {
        self.sample_aspect_ratio
    }

    /// Display aspect ratio derived from geometry and sample aspect ratio.
    pub fn display_aspect_ratio(&self) -> f64 {
        self.width as f64 * self.sample_aspect_ratio.as_f64() / self.height as f64
    }
}

impl From<VideoFormatType> for VideoFormat {
    fn from(value: VideoFormatType) -> Self {
        VideoFormat::new(value)
    }
}
