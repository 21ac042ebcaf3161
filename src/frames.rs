//! Raw video and audio frame types.
//!
//! Frames are immutable once built and are shared between producer and
//! consumer threads through `Arc`. A frame stays alive for as long as some
//! synchronizing buffer, output slot or [`SyncFrame`](crate::SyncFrame) still
//! references it.

use std::fmt;

use crate::{
    format::{FieldOrder, PixelFormat, VideoFormat},
    time::{pts_to_time, Rational},
    Error, Result,
};

/// Maximum allowed size for video frame data (256 MiB, enough for 2160p BGRA).
const MAX_VIDEO_BYTES: usize = 256 * 1024 * 1024;

/// Maximum allowed size for audio frame data (64 MiB).
const MAX_AUDIO_BYTES: usize = 64 * 1024 * 1024;

/// Highest channel count an audio frame may carry.
pub const MAX_AUDIO_CHANNELS: usize = 63;

/// One decoded picture.
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    pub pixel_format: PixelFormat,
    pub field_order: FieldOrder,
    /// Presentation timestamp in the time base the producer pushes the frame with.
    pub pts: Option<i64>,
    pub line_stride: usize,
    pub data: Vec<u8>,
}

impl fmt::Debug for VideoFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VideoFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("pixel_format", &self.pixel_format)
            .field("field_order", &self.field_order)
            .field("pts", &self.pts)
            .field("line_stride", &self.line_stride)
            .field("data (bytes)", &self.data.len())
            .finish()
    }
}

impl Default for VideoFrame {
    fn default() -> Self {
        VideoFrame::builder()
            .resolution(1920, 1080)
            .pixel_format(PixelFormat::Bgra)
            .build()
            .expect("Default VideoFrame should always succeed")
    }
}

impl VideoFrame {
    /// Create a builder for configuring a video frame
    pub fn builder() -> VideoFrameBuilder {
        VideoFrameBuilder::new()
    }

    /// A black picture at the geometry of `format`.
    ///
    /// Used as the placeholder when a channel has no source loaded or a source
    /// has not delivered any picture yet.
    pub fn black(format: &VideoFormat, pixel_format: PixelFormat) -> VideoFrame {
        let line_stride = calculate_line_stride(pixel_format, format.width());
        let mut data = vec![0u8; line_stride * format.height() as usize];
        fill_black(pixel_format, &mut data);
        VideoFrame {
            width: format.width(),
            height: format.height(),
            pixel_format,
            field_order: format.field_order(),
            pts: None,
            line_stride,
            data,
        }
    }

    pub fn has_alpha(&self) -> bool {
        self.pixel_format.has_alpha()
    }

    /// Presentation time in the global time base, given the frame's time base.
    pub fn time(&self, time_base: Rational) -> Option<i64> {
        self.pts.map(|pts| pts_to_time(pts, time_base))
    }

    /// Convert the picture to tightly packed 8-bit RGBA.
    ///
    /// YCbCr 4:2:2 input is converted with BT.709 limited-range coefficients.
    pub fn to_rgba(&self) -> Result<Vec<u8>> {
        let width = self.width as usize;
        let height = self.height as usize;
        let row_bytes = calculate_line_stride(self.pixel_format, self.width);
        if self.line_stride < row_bytes || self.data.len() < self.line_stride * height {
            return Err(Error::InvalidFrame(format!(
                "Frame buffer too small: {} bytes for {}x{} with stride {}",
                self.data.len(),
                width,
                height,
                self.line_stride
            )));
        }

        let mut rgba = Vec::with_capacity(width * height * 4);
        for row in self.data.chunks(self.line_stride).take(height) {
            let row = &row[..row_bytes];
            match self.pixel_format {
                PixelFormat::Bgra => {
                    for px in row.chunks_exact(4) {
                        rgba.extend_from_slice(&[px[2], px[1], px[0], px[3]]);
                    }
                }
                PixelFormat::Yuv422 => {
                    let mut remaining = width;
                    for quad in row.chunks_exact(4) {
                        let (u, y0, v, y1) = (quad[0], quad[1], quad[2], quad[3]);
                        rgba.extend_from_slice(&yuv_to_rgba(y0, u, v));
                        if remaining > 1 {
                            rgba.extend_from_slice(&yuv_to_rgba(y1, u, v));
                        }
                        remaining = remaining.saturating_sub(2);
                    }
                }
            }
        }
        Ok(rgba)
    }

    /// Encode the video frame as PNG bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer does not match the declared geometry or
    /// PNG encoding fails.
    pub fn encode_png(&self) -> Result<Vec<u8>> {
        use png::{BitDepth, ColorType, Encoder};

        let rgba_data = self.to_rgba()?;

        let mut png_data = Vec::new();
        let mut encoder = Encoder::new(&mut png_data, self.width, self.height);
        encoder.set_color(ColorType::Rgba);
        encoder.set_depth(BitDepth::Eight);

        encoder
            .write_header()
            .and_then(|mut writer| writer.write_image_data(&rgba_data))
            .map_err(|e| Error::Encoding(format!("PNG encoding failed: {e}")))?;

        Ok(png_data)
    }

    /// Encode the video frame as JPEG bytes with the specified quality (1-100).
    #[cfg(feature = "image-encoding")]
    pub fn encode_jpeg(&self, quality: u8) -> Result<Vec<u8>> {
        use jpeg_encoder::{ColorType as JpegColorType, Encoder as JpegEncoder};

        let (width, height) = match (u16::try_from(self.width), u16::try_from(self.height)) {
            (Ok(w), Ok(h)) => (w, h),
            _ => {
                return Err(Error::Encoding(format!(
                    "Frame {}x{} exceeds JPEG dimensions",
                    self.width, self.height
                )))
            }
        };

        // JPEG has no alpha channel
        let rgb_data: Vec<u8> = self
            .to_rgba()?
            .chunks_exact(4)
            .flat_map(|px| [px[0], px[1], px[2]])
            .collect();

        let mut jpeg_data = Vec::new();
        let encoder = JpegEncoder::new(&mut jpeg_data, quality);
        encoder
            .encode(&rgb_data, width, height, JpegColorType::Rgb)
            .map_err(|e| Error::Encoding(format!("JPEG encoding failed: {e}")))?;

        Ok(jpeg_data)
    }

    /// Encode the video frame as a base64 data URL (`data:image/png;base64,...`).
    #[cfg(feature = "image-encoding")]
    pub fn encode_data_url(&self, format: ImageFormat) -> Result<String> {
        use base64::{engine::general_purpose::STANDARD, Engine};

        let (mime_type, image_bytes) = match format {
            ImageFormat::Png => ("image/png", self.encode_png()?),
            ImageFormat::Jpeg(quality) => ("image/jpeg", self.encode_jpeg(quality)?),
        };

        let base64_data = STANDARD.encode(&image_bytes);
        Ok(format!("data:{mime_type};base64,{base64_data}"))
    }
}

/// Builder for configuring a VideoFrame with ergonomic method chaining
#[derive(Debug, Clone, Default)]
pub struct VideoFrameBuilder {
    width: Option<u32>,
    height: Option<u32>,
    pixel_format: Option<PixelFormat>,
    field_order: Option<FieldOrder>,
    pts: Option<i64>,
    data: Option<Vec<u8>>,
}

impl VideoFrameBuilder {
    /// Create a new builder with no fields set
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the video resolution
    #[must_use]
    pub fn resolution(mut self, width: u32, height: u32) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    /// Set the pixel format
    #[must_use]
    pub fn pixel_format(mut self, pixel_format: PixelFormat) -> Self {
        self.pixel_format = Some(pixel_format);
        self
    }

    /// Set the field order
    #[must_use]
    pub fn field_order(mut self, field_order: FieldOrder) -> Self {
        self.field_order = Some(field_order);
        self
    }

    /// Set the presentation timestamp
    #[must_use]
    pub fn pts(mut self, pts: i64) -> Self {
        self.pts = Some(pts);
        self
    }

    /// Supply the pixel data. Without it the frame is black.
    #[must_use]
    pub fn data(mut self, data: Vec<u8>) -> Self {
        self.data = Some(data);
        self
    }

    /// Build the VideoFrame
    ///
    /// # Errors
    ///
    /// Returns an error if the geometry is empty, too large, or the supplied
    /// data length does not equal `line_stride * height`.
    pub fn build(self) -> Result<VideoFrame> {
        let width = self.width.unwrap_or(1920);
        let height = self.height.unwrap_or(1080);
        let pixel_format = self.pixel_format.unwrap_or(PixelFormat::Bgra);

        if width == 0 || height == 0 {
            return Err(Error::InvalidFrame(format!(
                "Invalid video resolution: {width}x{height}"
            )));
        }

        let line_stride = calculate_line_stride(pixel_format, width);
        let buffer_size = line_stride
            .checked_mul(height as usize)
            .filter(|size| *size <= MAX_VIDEO_BYTES)
            .ok_or_else(|| {
                Error::InvalidFrame(format!(
                    "Video frame {width}x{height} exceeds maximum size of {MAX_VIDEO_BYTES} bytes"
                ))
            })?;

        let data = match self.data {
            Some(data) if data.len() != buffer_size => {
                return Err(Error::InvalidFrame(format!(
                    "Video data length {} doesn't match {width}x{height} {pixel_format:?} ({buffer_size} bytes)",
                    data.len()
                )));
            }
            Some(data) => data,
            None => {
                let mut data = vec![0u8; buffer_size];
                fill_black(pixel_format, &mut data);
                data
            }
        };

        Ok(VideoFrame {
            width,
            height,
            pixel_format,
            field_order: self.field_order.unwrap_or(FieldOrder::Progressive),
            pts: self.pts,
            line_stride,
            data,
        })
    }
}

/// A block of interleaved 32-bit float audio samples.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    pub sample_rate: u32,
    pub num_channels: usize,
    /// Samples per channel.
    pub num_samples: usize,
    /// Presentation timestamp in units of `1 / sample_rate`.
    pub pts: Option<i64>,
    data: Vec<f32>,
}

impl AudioFrame {
    /// Create a builder for configuring an audio frame
    pub fn builder() -> AudioFrameBuilder {
        AudioFrameBuilder::new()
    }

    /// A block of `num_samples` zero samples.
    pub fn silence(num_samples: usize, num_channels: usize, sample_rate: u32) -> AudioFrame {
        AudioFrame {
            sample_rate,
            num_channels,
            num_samples,
            pts: None,
            data: vec![0.0; num_samples * num_channels],
        }
    }

    pub(crate) fn from_interleaved(
        data: Vec<f32>,
        num_channels: usize,
        sample_rate: u32,
        pts: Option<i64>,
    ) -> AudioFrame {
        let num_samples = data.len().checked_div(num_channels).unwrap_or(0);
        AudioFrame {
            sample_rate,
            num_channels,
            num_samples,
            pts,
            data,
        }
    }

    /// Interleaved sample data
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Samples of one channel, de-interleaved
    pub fn channel_data(&self, channel: usize) -> Option<Vec<f32>> {
        if channel >= self.num_channels {
            return None;
        }
        Some(
            self.data
                .iter()
                .skip(channel)
                .step_by(self.num_channels)
                .copied()
                .collect(),
        )
    }

    /// The audio time base, `1 / sample_rate`.
    pub fn time_base(&self) -> Rational {
        Rational::new(1, i64::from(self.sample_rate))
    }

    /// Presentation time in the global time base.
    pub fn time(&self) -> Option<i64> {
        self.pts.map(|pts| pts_to_time(pts, self.time_base()))
    }

    pub fn is_silent(&self) -> bool {
        self.data.iter().all(|s| *s == 0.0)
    }
}

impl Default for AudioFrame {
    fn default() -> Self {
        AudioFrame::silence(0, 2, 48000)
    }
}

/// Builder for configuring an AudioFrame with ergonomic method chaining
#[derive(Debug, Clone, Default)]
pub struct AudioFrameBuilder {
    sample_rate: Option<u32>,
    num_channels: Option<usize>,
    num_samples: Option<usize>,
    pts: Option<i64>,
    data: Option<Vec<f32>>,
}

impl AudioFrameBuilder {
    /// Create a new builder with no fields set
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the sample rate
    #[must_use]
    pub fn sample_rate(mut self, rate: u32) -> Self {
        self.sample_rate = Some(rate);
        self
    }

    /// Set the number of audio channels
    #[must_use]
    pub fn channels(mut self, channels: usize) -> Self {
        self.num_channels = Some(channels);
        self
    }

    /// Set the number of samples per channel
    #[must_use]
    pub fn samples(mut self, samples: usize) -> Self {
        self.num_samples = Some(samples);
        self
    }

    /// Set the presentation timestamp, in samples
    #[must_use]
    pub fn pts(mut self, pts: i64) -> Self {
        self.pts = Some(pts);
        self
    }

    /// Set interleaved sample data. The sample count is derived from it when
    /// `samples()` is not set.
    #[must_use]
    pub fn data(mut self, data: Vec<f32>) -> Self {
        self.data = Some(data);
        self
    }

    /// Build the AudioFrame
    ///
    /// # Errors
    ///
    /// Returns an error if the sample rate is zero, the channel count is out of
    /// range, or the data length doesn't equal `samples * channels`.
    pub fn build(self) -> Result<AudioFrame> {
        let sample_rate = self.sample_rate.unwrap_or(48000);
        let num_channels = self.num_channels.unwrap_or(2);

        if sample_rate == 0 {
            return Err(Error::InvalidFrame("Invalid sample rate: 0".into()));
        }
        if num_channels == 0 || num_channels > MAX_AUDIO_CHANNELS {
            return Err(Error::InvalidFrame(format!(
                "Invalid number of channels: {num_channels}"
            )));
        }

        let num_samples = match (self.num_samples, &self.data) {
            (Some(n), _) => n,
            (None, Some(data)) => data.len() / num_channels,
            (None, None) => 1024,
        };

        let sample_count = num_samples.checked_mul(num_channels).ok_or_else(|| {
            Error::InvalidFrame(format!(
                "Audio sample count overflow: {num_samples} samples × {num_channels} channels"
            ))
        })?;
        if sample_count * std::mem::size_of::<f32>() > MAX_AUDIO_BYTES {
            return Err(Error::InvalidFrame(format!(
                "Audio frame exceeds maximum size of {MAX_AUDIO_BYTES} bytes"
            )));
        }

        let data = match self.data {
            Some(data) if data.len() != sample_count => {
                return Err(Error::InvalidFrame(format!(
                    "Audio data length {} doesn't match {num_samples} samples × {num_channels} channels",
                    data.len()
                )));
            }
            Some(data) => data,
            None => vec![0.0; sample_count],
        };

        Ok(AudioFrame {
            sample_rate,
            num_channels,
            num_samples,
            pts: self.pts,
            data,
        })
    }
}

/// Image format for snapshot encoding.
#[cfg(feature = "image-encoding")]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    /// PNG format (lossless compression)
    Png,
    /// JPEG format with quality setting (1-100, where 100 is highest quality)
    Jpeg(u8),
}

/// Calculate the line stride (bytes per row) for a pixel format and width.
///
/// 4:2:2 rows always hold an even number of pixels.
pub fn calculate_line_stride(pixel_format: PixelFormat, width: u32) -> usize {
    let width = width as usize;
    match pixel_format {
        PixelFormat::Bgra => width * 4,
        PixelFormat::Yuv422 => width.div_ceil(2) * 4,
    }
}

fn fill_black(pixel_format: PixelFormat, data: &mut [u8]) {
    match pixel_format {
        PixelFormat::Bgra => {
            for px in data.chunks_exact_mut(4) {
                px.copy_from_slice(&[0, 0, 0, 255]);
            }
        }
        // UYVY limited range black
        PixelFormat::Yuv422 => {
            for quad in data.chunks_exact_mut(4) {
                quad.copy_from_slice(&[128, 16, 128, 16]);
            }
        }
    }
}

fn yuv_to_rgba(y: u8, u: u8, v: u8) -> [u8; 4] {
    let y = (f32::from(y) - 16.0) * 1.164_383;
    let u = f32::from(u) - 128.0;
    let v = f32::from(v) - 128.0;
    let r = y + 1.792_741 * v;
    let g = y - 0.213_249 * u - 0.532_909 * v;
    let b = y + 2.112_402 * u;
    let clamp = |c: f32| c.round().clamp(0.0, 255.0) as u8;
    [clamp(r), clamp(g), clamp(b), 255]
}
