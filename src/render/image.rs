//! Bitmap rendering using tiny-skia
//!
//! These functions composite captured bitmaps through the oval mask and paint
//! the dimming layer for renderers that draw into a pixel surface.

use image::{Rgba, RgbaImage};
use tiny_skia::{
    ColorU8, FillRule, Mask, Paint, PathBuilder, Pixmap, Transform,
};

use super::geometry::MaskPath;

/// Ellipse bezier approximation constant: 4/3 * (sqrt(2) - 1)
const BEZIER_K: f32 = 0.552_284_8;

/// Copy a straight-alpha image into a premultiplied pixmap
fn to_pixmap(img: &RgbaImage) -> Option<Pixmap> {
    let mut pixmap = Pixmap::new(img.width(), img.height())?;
    for (dst, src) in pixmap.pixels_mut().iter_mut().zip(img.pixels()) {
        let [r, g, b, a] = src.0;
        *dst = ColorU8::from_rgba(r, g, b, a).premultiply();
    }
    Some(pixmap)
}

/// Copy a premultiplied pixmap back into a straight-alpha image
fn from_pixmap(pixmap: &Pixmap) -> RgbaImage {
    let mut img = RgbaImage::new(pixmap.width(), pixmap.height());
    for (dst, src) in img.pixels_mut().zip(pixmap.pixels()) {
        let c = src.demultiply();
        *dst = Rgba([c.red(), c.green(), c.blue(), c.alpha()]);
    }
    img
}

/// Build an ellipse path using cubic bezier curves
fn build_ellipse_path(cx: f32, cy: f32, rx: f32, ry: f32) -> Option<tiny_skia::Path> {
    let kx = rx * BEZIER_K;
    let ky = ry * BEZIER_K;

    let mut pb = PathBuilder::new();
    pb.move_to(cx, cy - ry);
    pb.cubic_to(cx + kx, cy - ry, cx + rx, cy - ky, cx + rx, cy);
    pb.cubic_to(cx + rx, cy + ky, cx + kx, cy + ry, cx, cy + ry);
    pb.cubic_to(cx - kx, cy + ry, cx - rx, cy + ky, cx - rx, cy);
    pb.cubic_to(cx - rx, cy - ky, cx - kx, cy - ry, cx, cy - ry);
    pb.close();
    pb.finish()
}

/// Keep only the ellipse inscribed in the image; everything else becomes transparent.
///
/// Returns the input unchanged if the image is empty.
pub fn apply_oval_mask(img: RgbaImage) -> RgbaImage {
    let (w, h) = (img.width(), img.height());
    let Some(mut pixmap) = to_pixmap(&img) else {
        return img;
    };
    let Some(mut mask) = Mask::new(w, h) else {
        return img;
    };

    let (rx, ry) = (w as f32 * 0.5, h as f32 * 0.5);
    if let Some(path) = build_ellipse_path(rx, ry, rx, ry) {
        mask.fill_path(&path, FillRule::Winding, true, Transform::identity());
    }
    pixmap.apply_mask(&mask);

    log::debug!("Applied oval mask to {}x{} capture", w, h);
    from_pixmap(&pixmap)
}

/// Paint the dimming layer described by `mask` into a new `width` x `height` surface
pub fn render_dim_layer(mask: &MaskPath, width: u32, height: u32, color: [u8; 4]) -> Option<RgbaImage> {
    let mut pixmap = Pixmap::new(width, height)?;

    let mut pb = PathBuilder::new();
    let mut points = mask.points.iter();
    let first = points.next()?;
    pb.move_to(first.x as f32, first.y as f32);
    for p in points {
        pb.line_to(p.x as f32, p.y as f32);
    }
    pb.close();
    let path = pb.finish()?;

    let mut paint = Paint::default();
    let [r, g, b, a] = color;
    paint.set_color_rgba8(r, g, b, a);
    paint.anti_alias = false;
    pixmap.fill_path(&path, &paint, FillRule::EvenOdd, Transform::identity(), None);

    Some(from_pixmap(&pixmap))
}
