//! Capture geometry probing and aspect-correction selection. The geometry is
//! read once per session from the first preview frame; the correction decides
//! which ffmpeg filter pads or crops the stream toward the configured output.

use image::GenericImageView;
use tethercast_foundation::StreamError;

/// Aspects within this tolerance are treated as equal; preview sizes are
/// quantized enough that anything closer is sensor rounding.
const ASPECT_EPSILON: f64 = 1e-3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureGeometry {
    pub width: u32,
    pub height: u32,
}

impl CaptureGeometry {
    pub fn aspect(&self) -> f64 {
        f64::from(self.width) / f64::from(self.height)
    }

    /// Decode the first preview frame just far enough to learn its size.
    pub fn probe(frame: &[u8]) -> Result<Self, StreamError> {
        let img = image::load_from_memory(frame)
            .map_err(|e| StreamError::Geometry(e.to_string()))?;
        let (width, height) = img.dimensions();
        if width == 0 || height == 0 {
            return Err(StreamError::Geometry("empty preview frame".into()));
        }
        Ok(Self { width, height })
    }
}

/// Direction the capture aspect must move to match the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AspectCorrection {
    /// Target is wider than the capture: pad the sides.
    Increase,
    /// Target is narrower than the capture: crop the sides.
    Decrease,
}

impl AspectCorrection {
    /// Render the ffmpeg filter for this correction at the given target
    /// aspect. Width expressions are kept even for the encoder.
    pub fn filter(&self, target_aspect: f64) -> String {
        match self {
            AspectCorrection::Increase => format!(
                "pad=trunc(ih*{:.6}/2)*2:ih:(ow-iw)/2:0",
                target_aspect
            ),
            AspectCorrection::Decrease => {
                format!("crop=trunc(ih*{:.6}/2)*2:ih", target_aspect)
            }
        }
    }
}

/// Pick the correction, if any: none when preservation is off or the aspects
/// already agree.
pub fn select_correction(
    target_aspect: f64,
    capture_aspect: f64,
    preserve_aspect: bool,
) -> Option<AspectCorrection> {
    if !preserve_aspect {
        return None;
    }
    let delta = target_aspect - capture_aspect;
    if delta.abs() <= ASPECT_EPSILON {
        None
    } else if delta > 0.0 {
        Some(AspectCorrection::Increase)
    } else {
        Some(AspectCorrection::Decrease)
    }
}
