use image::RgbImage;
use ratatui::{buffer::Buffer, layout::Rect, style::Color, widgets::Widget};

const UPPER_HALF_BLOCK: &str = "▀";

/// Draws an image with half-block cells: two pixel rows per terminal row,
/// scaled to fit and centred, aspect ratio preserved.
pub struct ImagePreview<'a> {
    image: &'a RgbImage,
}

impl<'a> ImagePreview<'a> {
    pub fn new(image: &'a RgbImage) -> Self {
        Self { image }
    }
}

/// Size in pixels (one column per cell, two rows per cell) of `image_size`
/// scaled to fit inside `area`
pub fn fit(image_size: (u32, u32), area: Rect) -> (u32, u32) {
    let (iw, ih) = image_size;
    if iw == 0 || ih == 0 || area.width == 0 || area.height == 0 {
        return (0, 0);
    }
    let max_w = area.width as f64;
    let max_h = area.height as f64 * 2.0;
    let scale = (max_w / iw as f64).min(max_h / ih as f64);
    // epsilon guards against 19.999.. flooring to 19
    let w = ((iw as f64 * scale + 1e-9).floor() as u32).clamp(1, area.width as u32);
    let h = ((ih as f64 * scale + 1e-9).floor() as u32).clamp(1, area.height as u32 * 2);
    (w, h)
}

impl Widget for ImagePreview<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let (iw, ih) = self.image.dimensions();
        let (w, h) = fit((iw, ih), area);
        if w == 0 || h == 0 {
            return;
        }

        let rows = h.div_ceil(2);
        let x0 = area.x + (area.width - w as u16) / 2;
        let y0 = area.y + (area.height - rows as u16) / 2;

        let sample = |px: u32, py: u32| -> Color {
            let sx = (px as u64 * iw as u64 / w as u64).min(iw as u64 - 1) as u32;
            let sy = (py as u64 * ih as u64 / h as u64).min(ih as u64 - 1) as u32;
            let [r, g, b] = self.image.get_pixel(sx, sy).0;
            Color::Rgb(r, g, b)
        };

        for row in 0..rows {
            for col in 0..w {
                let top = sample(col, row * 2);
                let bottom = if row * 2 + 1 < h {
                    sample(col, row * 2 + 1)
                } else {
                    Color::Reset
                };
                if let Some(cell) = buf.cell_mut((x0 + col as u16, y0 + row as u16)) {
                    cell.set_symbol(UPPER_HALF_BLOCK).set_fg(top).set_bg(bottom);
                }
            }
        }
    }
}
