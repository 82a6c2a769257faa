//! Raw device buffers to RGB24.
//!
//! Drivers that refuse RGB3 usually offer NV12 or YUYV. Both are converted
//! with full-range BT.601 in 16.16 fixed point.

use anyhow::{anyhow, Result};

use crate::frame::rgb_len;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum PixelFormat {
    Rgb24,
    Nv12,
    Yuyv,
}

impl PixelFormat {
    pub(crate) fn from_fourcc(fourcc: &[u8; 4]) -> Option<Self> {
        match fourcc {
            b"RGB3" => Some(Self::Rgb24),
            b"NV12" => Some(Self::Nv12),
            b"YUYV" => Some(Self::Yuyv),
            _ => None,
        }
    }

    /// Bytes in one `width` x `height` buffer of this format.
    fn buffer_len(self, width: u32, height: u32) -> Result<usize> {
        let pixels = (width as usize)
            .checked_mul(height as usize)
            .ok_or_else(|| anyhow!("{:?} frame dimensions overflow", self))?;
        Ok(match self {
            Self::Rgb24 => rgb_len(width, height)?,
            Self::Nv12 => pixels + pixels / 2,
            Self::Yuyv => pixels * 2,
        })
    }
}

pub(crate) fn normalize_to_rgb(
    raw: &[u8],
    width: u32,
    height: u32,
    format: PixelFormat,
) -> Result<Vec<u8>> {
    let expected = format.buffer_len(width, height)?;
    if raw.len() != expected {
        return Err(anyhow!(
            "{:?} buffer length mismatch for {}x{}: expected {}, got {}",
            format,
            width,
            height,
            expected,
            raw.len()
        ));
    }
    match format {
        PixelFormat::Rgb24 => Ok(raw.to_vec()),
        PixelFormat::Nv12 => {
            if width % 2 != 0 || height % 2 != 0 {
                return Err(anyhow!("NV12 needs even dimensions, got {}x{}", width, height));
            }
            Ok(nv12_to_rgb(raw, width as usize, height as usize))
        }
        PixelFormat::Yuyv => {
            if width % 2 != 0 {
                return Err(anyhow!("YUYV needs an even width, got {}", width));
            }
            Ok(yuyv_to_rgb(raw))
        }
    }
}

/// Full-resolution luma plane followed by interleaved UV at quarter resolution.
fn nv12_to_rgb(raw: &[u8], width: usize, height: usize) -> Vec<u8> {
    let (luma, chroma) = raw.split_at(width * height);
    let mut rgb = Vec::with_capacity(width * height * 3);
    for (row, luma_row) in luma.chunks_exact(width.max(1)).take(height).enumerate() {
        let uv_row = &chroma[(row / 2) * width..];
        for (col, &y) in luma_row.iter().enumerate() {
            let uv = (col / 2) * 2;
            rgb.extend_from_slice(&ycbcr(y, uv_row[uv], uv_row[uv + 1]));
        }
    }
    rgb
}

/// Packed 4:2:2, two pixels per `Y0 U Y1 V` quad.
fn yuyv_to_rgb(raw: &[u8]) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(raw.len() / 2 * 3);
    for quad in raw.chunks_exact(4) {
        rgb.extend_from_slice(&ycbcr(quad[0], quad[1], quad[3]));
        rgb.extend_from_slice(&ycbcr(quad[2], quad[1], quad[3]));
    }
    rgb
}

fn ycbcr(y: u8, cb: u8, cr: u8) -> [u8; 3] {
    const HALF: i32 = 1 << 15;
    let y = (y as i32) << 16;
    let cb = cb as i32 - 128;
    let cr = cr as i32 - 128;
    let r = (y + 91_881 * cr + HALF) >> 16;
    let g = (y - 22_554 * cb - 46_802 * cr + HALF) >> 16;
    let b = (y + 116_130 * cb + HALF) >> 16;
    [r.clamp(0, 255) as u8, g.clamp(0, 255) as u8, b.clamp(0, 255) as u8]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn neutral_chroma_is_gray() -> Result<()> {
        let nv12 = [vec![128u8; 4], vec![128u8; 2]].concat();
        assert_eq!(normalize_to_rgb(&nv12, 2, 2, PixelFormat::Nv12)?, vec![128u8; 12]);

        let yuyv = [10u8, 128, 200, 128];
        assert_eq!(
            normalize_to_rgb(&yuyv, 2, 1, PixelFormat::Yuyv)?,
            vec![10, 10, 10, 200, 200, 200]
        );
        Ok(())
    }

    #[test]
    fn strong_red_chroma_saturates_red() -> Result<()> {
        let yuyv = [128u8, 128, 128, 255];
        let rgb = normalize_to_rgb(&yuyv, 2, 1, PixelFormat::Yuyv)?;
        assert_eq!(rgb[0], 255);
        assert!(rgb[1] < 128);
        assert_eq!(rgb[2], 128);
        Ok(())
    }

    #[test]
    fn lengths_and_widths_are_checked() {
        assert!(normalize_to_rgb(&[0u8; 4], 1, 2, PixelFormat::Yuyv).is_err());
        assert!(normalize_to_rgb(&[0u8; 5], 2, 2, PixelFormat::Nv12).is_err());
        assert!(normalize_to_rgb(&[0u8; 8], 1, 3, PixelFormat::Rgb24).is_err());
        assert_eq!(PixelFormat::from_fourcc(b"MJPG"), None);
    }
}
