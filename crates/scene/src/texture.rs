//! Procedural RGBA8 textures.

/// Bytes per RGBA8 texel.
pub const BYTES_PER_TEXEL: usize = 4;

/// Tightly packed RGBA8 pixels, row-major, top row first.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextureData {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl TextureData {
    /// Square checkerboard of `cells` x `cells` squares alternating `light` and `dark`.
    ///
    /// `cells` is clamped to at least 1 and at most `size`.
    pub fn checkerboard(size: u32, cells: u32, light: [u8; 4], dark: [u8; 4]) -> Self {
        let size = size.max(1);
        let cells = cells.clamp(1, size);
        let cell_size = (size / cells).max(1);

        let mut pixels = Vec::with_capacity(size as usize * size as usize * BYTES_PER_TEXEL);
        for y in 0..size {
            for x in 0..size {
                let even = ((x / cell_size) + (y / cell_size)) % 2 == 0;
                pixels.extend_from_slice(if even { &light } else { &dark });
            }
        }

        Self {
            width: size,
            height: size,
            pixels,
        }
    }

    /// Grey-on-white board used by the sample scene.
    pub fn sample() -> Self {
        Self::checkerboard(256, 8, [235, 235, 235, 255], [60, 60, 60, 255])
    }

    pub fn texel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let start = (y as usize * self.width as usize + x as usize) * BYTES_PER_TEXEL;
        let mut texel = [0; 4];
        texel.copy_from_slice(&self.pixels[start..start + BYTES_PER_TEXEL]);
        Some(texel)
    }

    pub fn byte_size(&self) -> usize {
        self.pixels.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WHITE: [u8; 4] = [255, 255, 255, 255];
    const BLACK: [u8; 4] = [0, 0, 0, 255];

    #[test]
    fn test_checkerboard_size() {
        let tex = TextureData::checkerboard(16, 4, WHITE, BLACK);
        assert_eq!(tex.width, 16);
        assert_eq!(tex.height, 16);
        assert_eq!(tex.byte_size(), 16 * 16 * BYTES_PER_TEXEL);
    }

    #[test]
    fn test_checkerboard_alternates_cells() {
        let tex = TextureData::checkerboard(16, 4, WHITE, BLACK);
        assert_eq!(tex.texel(0, 0), Some(WHITE));
        assert_eq!(tex.texel(3, 3), Some(WHITE));
        assert_eq!(tex.texel(4, 0), Some(BLACK));
        assert_eq!(tex.texel(0, 4), Some(BLACK));
        assert_eq!(tex.texel(4, 4), Some(WHITE));
        assert_eq!(tex.texel(15, 15), Some(WHITE));
    }

    #[test]
    fn test_texel_out_of_bounds() {
        let tex = TextureData::checkerboard(8, 2, WHITE, BLACK);
        assert_eq!(tex.texel(8, 0), None);
        assert_eq!(tex.texel(0, 8), None);
    }

    #[test]
    fn test_degenerate_arguments_are_clamped() {
        let tex = TextureData::checkerboard(0, 0, WHITE, BLACK);
        assert_eq!((tex.width, tex.height), (1, 1));
        assert_eq!(tex.texel(0, 0), Some(WHITE));

        let tex = TextureData::checkerboard(4, 100, WHITE, BLACK);
        assert_eq!(tex.texel(0, 0), Some(WHITE));
        assert_eq!(tex.texel(1, 0), Some(BLACK));
    }
}
