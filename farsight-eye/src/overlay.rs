//! Box and label drawing

use crate::error::VisionError;
use crate::models::BoundingBox;
use opencv::{
    core::{Mat, Point, Rect, Scalar},
    imgproc,
    prelude::*,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// BGR color
pub type Color = [u8; 3];

pub const RED: Color = [0, 0, 255];
pub const GREEN: Color = [0, 255, 0];
const LABEL_TEXT: Color = [225, 255, 255];

/// One random color per class
#[derive(Debug, Clone)]
pub struct Palette {
    colors: Vec<Color>,
}

impl Palette {
    pub fn random(num_classes: usize) -> Self {
        Self::from_rng(num_classes, &mut StdRng::from_entropy())
    }

    /// Reproducible palette
    pub fn seeded(num_classes: usize, seed: u64) -> Self {
        Self::from_rng(num_classes, &mut StdRng::seed_from_u64(seed))
    }

    fn from_rng(num_classes: usize, rng: &mut impl Rng) -> Self {
        let colors = (0..num_classes.max(1))
            .map(|_| [rng.gen::<u8>(), rng.gen::<u8>(), rng.gen::<u8>()])
            .collect();
        Self { colors }
    }

    pub fn color(&self, class_id: usize) -> Color {
        self.colors[class_id % self.colors.len()]
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }
}

/// Default line thickness for a frame of this size
pub fn line_thickness(width: i32, height: i32) -> i32 {
    (0.002 * (width + height) as f64 / 2.0).round() as i32 + 1
}

fn scalar(color: Color) -> Scalar {
    Scalar::new(color[0] as f64, color[1] as f64, color[2] as f64, 0.0)
}

/// Draw a box with an optional filled label above its top-left corner
pub fn draw_box(
    image: &mut Mat,
    bbox: &BoundingBox,
    color: Color,
    label: Option<&str>,
    thickness: Option<i32>,
) -> Result<(), VisionError> {
    let tl = thickness.unwrap_or_else(|| line_thickness(image.cols(), image.rows())).max(1);

    let (x1, y1) = (bbox.x1 as i32, bbox.y1 as i32);
    let (x2, y2) = (bbox.x2 as i32, bbox.y2 as i32);
    imgproc::rectangle(
        image,
        Rect::new(x1, y1, (x2 - x1).max(1), (y2 - y1).max(1)),
        scalar(color),
        tl,
        imgproc::LINE_AA,
        0,
    )?;

    if let Some(label) = label.filter(|l| !l.is_empty()) {
        let tf = (tl - 1).max(1);
        let font_scale = tl as f64 / 3.0;
        let mut baseline = 0;
        let size = imgproc::get_text_size(
            label,
            imgproc::FONT_HERSHEY_SIMPLEX,
            font_scale,
            tf,
            &mut baseline,
        )?;

        let label_height = size.height + 3;
        imgproc::rectangle(
            image,
            Rect::new(x1, y1 - label_height, size.width, label_height),
            scalar(color),
            imgproc::FILLED,
            imgproc::LINE_AA,
            0,
        )?;
        imgproc::put_text(
            image,
            label,
            Point::new(x1, y1 - 2),
            imgproc::FONT_HERSHEY_SIMPLEX,
            font_scale,
            scalar(LABEL_TEXT),
            tf,
            imgproc::LINE_AA,
            false,
        )?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use opencv::core::{Vec3b, CV_8UC3};

    #[test]
    fn test_line_thickness() {
        assert_eq!(line_thickness(640, 480), 2);
        assert_eq!(line_thickness(1920, 1080), 4);
        assert_eq!(line_thickness(10, 10), 1);
    }

    #[test]
    fn test_seeded_palette_is_stable() {
        let a = Palette::seeded(80, 7);
        let b = Palette::seeded(80, 7);
        assert_eq!(a.len(), 80);
        assert_eq!(a.color(3), b.color(3));
        assert_eq!(a.color(80), a.color(0));
    }

    #[test]
    fn test_empty_palette_still_has_a_color() {
        let palette = Palette::random(0);
        assert!(!palette.is_empty());
        let _ = palette.color(5);
    }

    #[test]
    fn test_draw_box_marks_pixels() {
        let mut image =
            Mat::new_rows_cols_with_default(100, 100, CV_8UC3, Scalar::all(0.0)).unwrap();
        let bbox = BoundingBox::new(20.0, 40.0, 80.0, 90.0);
        draw_box(&mut image, &bbox, RED, Some("person 0.90"), Some(1)).unwrap();

        let edge = *image.at_2d::<Vec3b>(60, 20).unwrap();
        assert!(edge[2] > 0);
        let inside = *image.at_2d::<Vec3b>(60, 50).unwrap();
        assert_eq!(inside[2], 0);
    }
}
