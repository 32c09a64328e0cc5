//! Pixel layout normalization and validation.

use super::FormatError;

/// Geometry of a single image plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaneLayout {
    /// Samples per row.
    pub width: u32,
    /// Number of rows.
    pub height: u32,
    pub pixel_stride: u32,
    pub row_stride: u32,
}

impl PlaneLayout {
    /// Minimum number of bytes a buffer needs to hold this plane.
    ///
    /// The last row does not need to be padded out to `row_stride`.
    pub fn required_len(&self) -> usize {
        if self.width == 0 || self.height == 0 {
            return 0;
        }
        let last_row = (self.height as usize - 1) * self.row_stride as usize;
        let last_sample = (self.width as usize - 1) * self.pixel_stride as usize;
        last_row + last_sample + 1
    }

    /// Checks strides and buffer length against this layout.
    pub fn validate(&self, plane: &'static str, len: usize) -> Result<(), FormatError> {
        if self.pixel_stride == 0 {
            return Err(FormatError::InvalidStride {
                plane,
                reason: "pixel stride is zero",
            });
        }
        let row_span = (self.width.saturating_sub(1) as u64) * (self.pixel_stride as u64) + 1;
        if self.height > 1 && (self.row_stride as u64) < row_span {
            return Err(FormatError::InvalidStride {
                plane,
                reason: "row stride shorter than one row of samples",
            });
        }
        let required = self.required_len();
        if len < required {
            return Err(FormatError::PlaneTooSmall {
                plane,
                len,
                required,
            });
        }
        Ok(())
    }
}

/// Dimensions of the chroma planes for a 4:2:0 frame.
#[inline]
pub fn chroma_dimensions(width: u32, height: u32) -> (u32, u32) {
    (width.div_ceil(2), height.div_ceil(2))
}

/// Tightly packed I420 planes.
#[derive(Debug, Clone)]
pub struct I420Planes {
    pub y: Vec<u8>,
    pub u: Vec<u8>,
    pub v: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl I420Planes {
    /// Row stride of the chroma planes.
    pub fn chroma_stride(&self) -> u32 {
        chroma_dimensions(self.width, self.height).0
    }
}

/// Converts packed RGB888 into I420 planes (BT.601, full range).
///
/// Chroma is sampled from the top-left pixel of each 2x2 block.
pub fn rgb_to_i420(rgb: &[u8], width: u32, height: u32) -> Result<I420Planes, FormatError> {
    let w = width as usize;
    let h = height as usize;
    let expected = w * h * 3;
    if rgb.len() < expected {
        return Err(FormatError::PlaneTooSmall {
            plane: "rgb",
            len: rgb.len(),
            required: expected,
        });
    }

    let (cw, ch) = chroma_dimensions(width, height);
    let (cw, ch) = (cw as usize, ch as usize);
    let mut y = vec![0u8; w * h];
    let mut u = vec![0u8; cw * ch];
    let mut v = vec![0u8; cw * ch];

    for row in 0..h {
        for col in 0..w {
            let idx = (row * w + col) * 3;
            let r = f32::from(rgb[idx]);
            let g = f32::from(rgb[idx + 1]);
            let b = f32::from(rgb[idx + 2]);

            y[row * w + col] = (0.299 * r + 0.587 * g + 0.114 * b).clamp(0.0, 255.0) as u8;

            if row % 2 == 0 && col % 2 == 0 {
                let ci = (row / 2) * cw + col / 2;
                u[ci] = (-0.169 * r - 0.331 * g + 0.5 * b + 128.0).clamp(0.0, 255.0) as u8;
                v[ci] = (0.5 * r - 0.419 * g - 0.081 * b + 128.0).clamp(0.0, 255.0) as u8;
            }
        }
    }

    Ok(I420Planes {
        y,
        u,
        v,
        width,
        height,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_len_ignores_last_row_padding() {
        let layout = PlaneLayout {
            width: 4,
            height: 2,
            pixel_stride: 1,
            row_stride: 8,
        };
        assert_eq!(layout.required_len(), 12);
        assert!(layout.validate("y", 12).is_ok());
        assert!(matches!(
            layout.validate("y", 11),
            Err(FormatError::PlaneTooSmall { required: 12, .. })
        ));
    }

    #[test]
    fn test_interleaved_chroma_layout() {
        // Semi-planar chroma: pixel stride 2, the last sample has no partner byte.
        let layout = PlaneLayout {
            width: 2,
            height: 2,
            pixel_stride: 2,
            row_stride: 4,
        };
        assert_eq!(layout.required_len(), 7);
    }

    #[test]
    fn test_row_stride_too_short() {
        let layout = PlaneLayout {
            width: 8,
            height: 2,
            pixel_stride: 1,
            row_stride: 4,
        };
        assert!(matches!(
            layout.validate("y", 1024),
            Err(FormatError::InvalidStride { plane: "y", .. })
        ));
    }

    #[test]
    fn test_rgb_to_i420_plane_sizes() {
        let rgb = vec![0u8; 5 * 3 * 3];
        let planes = rgb_to_i420(&rgb, 5, 3).unwrap();
        assert_eq!(planes.y.len(), 15);
        assert_eq!(planes.u.len(), 3 * 2);
        assert_eq!(planes.v.len(), 3 * 2);
        assert_eq!(planes.chroma_stride(), 3);
    }

    #[test]
    fn test_rgb_to_i420_white_and_black() {
        let mut rgb = vec![255u8; 2 * 2 * 3];
        let white = rgb_to_i420(&rgb, 2, 2).unwrap();
        assert!(white.y.iter().all(|&y| y >= 254));
        assert!(white.u.iter().all(|&u| (127..=129).contains(&u)));

        rgb.fill(0);
        let black = rgb_to_i420(&rgb, 2, 2).unwrap();
        assert!(black.y.iter().all(|&y| y == 0));
        assert_eq!(black.v, vec![128]);
    }

    #[test]
    fn test_rgb_to_i420_short_input() {
        assert!(rgb_to_i420(&[0u8; 10], 4, 4).is_err());
    }
}
