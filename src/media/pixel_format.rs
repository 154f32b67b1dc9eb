// Pixel format metadata
//
// A static subset of FFmpeg's pixel format table covering the formats this
// tool can negotiate: packed/planar yuv, rgb/bgr/gbr and grayscale, little
// endian, no alpha. `pipe_bpp` is the bits-per-pixel of one frame on a
// rawvideo pipe and is the single source of truth for frame sizing across
// all three stages.

/// Channel ordering of a raw frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelOrder {
    Yuv,
    Rgb,
    Bgr,
    Gbr,
    Gray,
}

/// Metadata for one FFmpeg pixel format
#[derive(Debug, Clone, Copy)]
pub struct PixelFormat {
    pub name: &'static str,
    /// Number of components
    pub components: u8,
    /// Storage bit depth of the widest component
    pub bit_depth: u8,
    /// Bits per pixel of one frame on a rawvideo pipe
    pub pipe_bpp: u32,
    pub order: ChannelOrder,
}

/// Frame dimensions and layout negotiated once per run.
/// Shared by the decoder, the filter and the encoder; any disagreement
/// with the actual stream shows up only as frame misalignment downstream,
/// so this value is computed in exactly one place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameGeometry {
    pub width: u32,
    pub height: u32,
    pub bits_per_pixel: u32,
    pub channel_order: ChannelOrder,
}

impl FrameGeometry {
    pub fn new(width: u32, height: u32, format: &PixelFormat) -> Self {
        Self {
            width,
            height,
            bits_per_pixel: format.pipe_bpp,
            channel_order: format.order,
        }
    }

    /// Exact byte length of one raw frame
    pub fn frame_size(&self) -> usize {
        (self.width as usize * self.height as usize * self.bits_per_pixel as usize) / 8
    }
}

macro_rules! pix_fmt {
    ($name:literal, $c:literal, $depth:literal, $pipe:literal, $order:ident) => {
        PixelFormat {
            name: $name,
            components: $c,
            bit_depth: $depth,
            pipe_bpp: $pipe,
            order: ChannelOrder::$order,
        }
    };
}

/// Supported pixel formats. Formats with an alpha channel, big-endian or
/// floating-point layouts are rejected at probe time by their absence
/// from this table.
pub const PIXEL_FORMATS: &[PixelFormat] = &[
    pix_fmt!("yuv420p", 3, 8, 12, Yuv),
    pix_fmt!("yuvj420p", 3, 8, 12, Yuv),
    pix_fmt!("yuv422p", 3, 8, 16, Yuv),
    pix_fmt!("yuvj422p", 3, 8, 16, Yuv),
    pix_fmt!("yuv440p", 3, 8, 16, Yuv),
    pix_fmt!("yuvj440p", 3, 8, 16, Yuv),
    pix_fmt!("yuv444p", 3, 8, 24, Yuv),
    pix_fmt!("yuvj444p", 3, 8, 24, Yuv),
    pix_fmt!("yuv410p", 3, 8, 9, Yuv),
    pix_fmt!("yuv411p", 3, 8, 12, Yuv),
    pix_fmt!("yuvj411p", 3, 8, 12, Yuv),
    pix_fmt!("yuyv422", 3, 8, 16, Yuv),
    pix_fmt!("uyvy422", 3, 8, 16, Yuv),
    pix_fmt!("yvyu422", 3, 8, 16, Yuv),
    pix_fmt!("yuv420p9le", 3, 9, 13, Yuv),
    pix_fmt!("yuv420p10le", 3, 10, 15, Yuv),
    pix_fmt!("yuv420p12le", 3, 12, 18, Yuv),
    pix_fmt!("yuv420p14le", 3, 14, 21, Yuv),
    pix_fmt!("yuv420p16le", 3, 16, 24, Yuv),
    pix_fmt!("yuv422p9le", 3, 9, 18, Yuv),
    pix_fmt!("yuv422p10le", 3, 10, 20, Yuv),
    pix_fmt!("yuv422p12le", 3, 12, 24, Yuv),
    pix_fmt!("yuv422p14le", 3, 14, 28, Yuv),
    pix_fmt!("yuv422p16le", 3, 16, 32, Yuv),
    pix_fmt!("yuv440p10le", 3, 10, 20, Yuv),
    pix_fmt!("yuv440p12le", 3, 12, 24, Yuv),
    pix_fmt!("yuv444p9le", 3, 9, 27, Yuv),
    pix_fmt!("yuv444p10le", 3, 10, 30, Yuv),
    pix_fmt!("yuv444p12le", 3, 12, 36, Yuv),
    pix_fmt!("yuv444p14le", 3, 14, 42, Yuv),
    pix_fmt!("yuv444p16le", 3, 16, 48, Yuv),
    pix_fmt!("nv12", 3, 8, 12, Yuv),
    pix_fmt!("nv21", 3, 8, 12, Yuv),
    pix_fmt!("nv16", 3, 8, 16, Yuv),
    pix_fmt!("nv24", 3, 8, 24, Yuv),
    pix_fmt!("nv42", 3, 8, 24, Yuv),
    pix_fmt!("rgb24", 3, 8, 24, Rgb),
    pix_fmt!("bgr24", 3, 8, 24, Bgr),
    pix_fmt!("rgb48le", 3, 16, 48, Rgb),
    pix_fmt!("bgr48le", 3, 16, 48, Bgr),
    pix_fmt!("rgb8", 3, 3, 8, Rgb),
    pix_fmt!("bgr8", 3, 3, 8, Bgr),
    pix_fmt!("rgb444le", 3, 4, 12, Rgb),
    pix_fmt!("bgr444le", 3, 4, 12, Bgr),
    pix_fmt!("rgb555le", 3, 5, 15, Rgb),
    pix_fmt!("bgr555le", 3, 5, 15, Bgr),
    pix_fmt!("rgb565le", 3, 6, 16, Rgb),
    pix_fmt!("bgr565le", 3, 6, 16, Bgr),
    pix_fmt!("gbrp", 3, 8, 24, Gbr),
    pix_fmt!("gbrp9le", 3, 9, 27, Gbr),
    pix_fmt!("gbrp10le", 3, 10, 30, Gbr),
    pix_fmt!("gbrp12le", 3, 12, 36, Gbr),
    pix_fmt!("gbrp14le", 3, 14, 42, Gbr),
    pix_fmt!("gbrp16le", 3, 16, 48, Gbr),
    pix_fmt!("gray", 1, 8, 8, Gray),
    pix_fmt!("gray9le", 1, 9, 9, Gray),
    pix_fmt!("gray10le", 1, 10, 10, Gray),
    pix_fmt!("gray12le", 1, 12, 12, Gray),
    pix_fmt!("gray14le", 1, 14, 14, Gray),
    pix_fmt!("gray16le", 1, 16, 16, Gray),
];

/// Look up a supported pixel format by FFmpeg name
pub fn pixel_format(name: &str) -> Option<&'static PixelFormat> {
    PIXEL_FORMATS.iter().find(|f| f.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_supported() {
        let fmt = pixel_format("yuv420p").unwrap();
        assert_eq!(fmt.pipe_bpp, 12);
        assert_eq!(fmt.bit_depth, 8);
        assert_eq!(fmt.order, ChannelOrder::Yuv);

        let fmt = pixel_format("yuv444p16le").unwrap();
        assert_eq!(fmt.pipe_bpp, 48);
        assert_eq!(fmt.bit_depth, 16);
    }

    #[test]
    fn unsupported_formats_are_absent() {
        // alpha, big endian and hardware formats are not negotiable
        assert!(pixel_format("yuva420p").is_none());
        assert!(pixel_format("yuv420p10be").is_none());
        assert!(pixel_format("cuda").is_none());
    }

    #[test]
    fn frame_size_hd_420() {
        // 1080p 4:2:0 8-bit: 1080*1920*12/8
        let geometry = FrameGeometry::new(1920, 1080, pixel_format("yuv420p").unwrap());
        assert_eq!(geometry.frame_size(), 3_110_400);
        // repeated calls are idempotent
        assert_eq!(geometry.frame_size(), 3_110_400);
    }

    #[test]
    fn frame_size_scales_with_depth() {
        let g8 = FrameGeometry::new(640, 480, pixel_format("yuv420p").unwrap());
        let g16 = FrameGeometry::new(640, 480, pixel_format("yuv444p16le").unwrap());
        assert_eq!(g8.frame_size(), 640 * 480 * 12 / 8);
        assert_eq!(g16.frame_size(), 640 * 480 * 48 / 8);
    }
}
