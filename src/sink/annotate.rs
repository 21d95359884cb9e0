use font8x8::{UnicodeFonts, BASIC_FONTS};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;

use crate::detect::Detection;

const THICKNESS: u32 = 3;
const GLYPH: u32 = 8;
const CAPTION_TEXT: Rgb<u8> = Rgb([255, 255, 255]);

const PALETTE: [[u8; 3]; 8] = [
    [255, 56, 56],
    [255, 157, 151],
    [255, 112, 31],
    [255, 178, 29],
    [207, 210, 49],
    [72, 249, 10],
    [26, 147, 52],
    [0, 194, 255],
];

pub fn class_colour(class_id: usize) -> Rgb<u8> {
    Rgb(PALETTE[class_id % PALETTE.len()])
}

/// `label conf`, or just the confidence for unlabelled boxes.
pub fn caption(det: &Detection) -> String {
    if det.label.is_empty() {
        format!("{:.2}", det.confidence)
    } else {
        format!("{} {:.2}", det.label, det.confidence)
    }
}

/// Glyph scale for an image height: 8px text up to 719 rows, larger above.
fn text_scale(height: u32) -> u32 {
    (height / 360).max(1)
}

/// Draw one box per detection with its caption on a filled tab above it.
/// Boxes near the top edge get the tab clipped to the image instead.
pub fn draw_detections(image: &mut RgbImage, detections: &[Detection]) {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return;
    }
    let scale = text_scale(height);
    for det in detections {
        let x0 = ((det.x.clamp(0.0, 1.0) * width as f32) as u32).min(width - 1);
        let y0 = ((det.y.clamp(0.0, 1.0) * height as f32) as u32).min(height - 1);
        let x1 = (((det.x + det.w).clamp(0.0, 1.0) * width as f32) as u32).min(width - 1);
        let y1 = (((det.y + det.h).clamp(0.0, 1.0) * height as f32) as u32).min(height - 1);
        if x1 <= x0 || y1 <= y0 {
            continue;
        }
        let colour = class_colour(det.class_id);
        for t in 0..THICKNESS {
            let w = (x1 - x0 + 1).saturating_sub(2 * t);
            let h = (y1 - y0 + 1).saturating_sub(2 * t);
            if w == 0 || h == 0 {
                break;
            }
            let rect = Rect::at((x0 + t) as i32, (y0 + t) as i32).of_size(w, h);
            draw_hollow_rect_mut(image, rect, colour);
        }
        draw_caption(image, x0, y0, &caption(det), colour, scale);
    }
}

fn draw_caption(
    image: &mut RgbImage,
    x: u32,
    box_top: u32,
    text: &str,
    background: Rgb<u8>,
    scale: u32,
) {
    let pad = scale;
    let tab_height = GLYPH * scale + 2 * pad;
    let tab_width = text.chars().count() as u32 * GLYPH * scale + 2 * pad;
    let top = box_top.saturating_sub(tab_height);
    draw_filled_rect_mut(
        image,
        Rect::at(x as i32, top as i32).of_size(tab_width, tab_height),
        background,
    );

    let mut pen_x = x + pad;
    let pen_y = top + pad;
    for ch in text.chars() {
        if let Some(rows) = BASIC_FONTS.get(ch) {
            for (row, bits) in rows.into_iter().enumerate() {
                for col in 0..GLYPH {
                    if bits >> col & 1 == 0 {
                        continue;
                    }
                    let px = pen_x + col * scale;
                    let py = pen_y + row as u32 * scale;
                    draw_filled_rect_mut(
                        image,
                        Rect::at(px as i32, py as i32).of_size(scale, scale),
                        CAPTION_TEXT,
                    );
                }
            }
        }
        pen_x += GLYPH * scale;
    }
}
