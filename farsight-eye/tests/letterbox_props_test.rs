//! Property tests for letterbox geometry

use farsight_eye::models::BoundingBox;
use farsight_eye::processing::Letterbox;
use proptest::prelude::*;

fn to_model(lb: &Letterbox, bbox: &BoundingBox) -> BoundingBox {
    BoundingBox::new(
        bbox.x1 * lb.gain + lb.pad_x,
        bbox.y1 * lb.gain + lb.pad_y,
        bbox.x2 * lb.gain + lb.pad_x,
        bbox.y2 * lb.gain + lb.pad_y,
    )
}

fn close(a: f32, b: f32) -> bool {
    (a - b).abs() <= 0.01 * b.abs().max(1.0)
}

proptest! {
    #[test]
    fn unmap_inverts_forward_mapping(
        width in 16i32..4000,
        height in 16i32..4000,
        stride_multiple in 10i32..41,
        fx1 in 0.0f32..0.5,
        fy1 in 0.0f32..0.5,
        fw in 0.01f32..0.5,
        fh in 0.01f32..0.5,
    ) {
        let target = stride_multiple * 32;
        let lb = Letterbox::compute(width, height, target).unwrap();
        let (w, h) = (width as f32, height as f32);
        let bbox = BoundingBox::new(fx1 * w, fy1 * h, (fx1 + fw) * w, (fy1 + fh) * h);

        let back = lb.unmap(&to_model(&lb, &bbox), w, h);
        prop_assert!(close(back.x1, bbox.x1), "x1 {} vs {}", back.x1, bbox.x1);
        prop_assert!(close(back.y1, bbox.y1), "y1 {} vs {}", back.y1, bbox.y1);
        prop_assert!(close(back.x2, bbox.x2), "x2 {} vs {}", back.x2, bbox.x2);
        prop_assert!(close(back.y2, bbox.y2), "y2 {} vs {}", back.y2, bbox.y2);
    }

    #[test]
    fn resized_frame_fits_target(
        width in 1i32..8000,
        height in 1i32..8000,
        stride_multiple in 1i32..41,
    ) {
        let target = stride_multiple * 32;
        let lb = Letterbox::compute(width, height, target).unwrap();
        prop_assert!(lb.resized_width <= target && lb.resized_height <= target);
        prop_assert!(lb.resized_width.max(lb.resized_height) >= target - 1);
        prop_assert!(lb.pad_x >= 0.0 && lb.pad_y >= 0.0);
    }
}
