//! Class filtering and non-maximum suppression

use crate::processing::decode::Candidate;

/// Keep only candidates whose class is in `classes` (all when `None`)
pub fn filter_classes(candidates: Vec<Candidate>, classes: Option<&[usize]>) -> Vec<Candidate> {
    match classes {
        Some(allowed) => candidates
            .into_iter()
            .filter(|c| allowed.contains(&c.class_id))
            .collect(),
        None => candidates,
    }
}

/// Greedy NMS, highest confidence first
///
/// Boxes of different classes never suppress each other unless
/// `agnostic` is set. At most `max_det` candidates survive.
pub fn non_max_suppression(
    mut candidates: Vec<Candidate>,
    iou_threshold: f32,
    agnostic: bool,
    max_det: usize,
) -> Vec<Candidate> {
    candidates.retain(|c| c.confidence.is_finite());
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep: Vec<Candidate> = Vec::new();
    let mut suppressed = vec![false; candidates.len()];

    for i in 0..candidates.len() {
        if keep.len() >= max_det {
            break;
        }
        if suppressed[i] {
            continue;
        }

        let current = candidates[i];
        keep.push(current);

        for j in (i + 1)..candidates.len() {
            if suppressed[j] {
                continue;
            }
            let other = &candidates[j];
            if !agnostic && other.class_id != current.class_id {
                continue;
            }
            if current.bbox.iou(&other.bbox) > iou_threshold {
                suppressed[j] = true;
            }
        }
    }

    keep
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BoundingBox;

    fn candidate(class_id: usize, confidence: f32, x1: f32) -> Candidate {
        Candidate {
            class_id,
            confidence,
            bbox: BoundingBox::new(x1, 0.0, x1 + 10.0, 10.0),
        }
    }

    #[test]
    fn test_overlapping_same_class_suppressed() {
        let kept = non_max_suppression(
            vec![candidate(0, 0.6, 1.0), candidate(0, 0.9, 0.0)],
            0.45,
            false,
            300,
        );
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].confidence, 0.9);
    }

    #[test]
    fn test_overlapping_different_classes_kept() {
        let kept = non_max_suppression(
            vec![candidate(0, 0.9, 0.0), candidate(16, 0.8, 1.0)],
            0.45,
            false,
            300,
        );
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn test_agnostic_suppresses_across_classes() {
        let kept = non_max_suppression(
            vec![candidate(0, 0.9, 0.0), candidate(16, 0.8, 1.0)],
            0.45,
            true,
            300,
        );
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].class_id, 0);
    }

    #[test]
    fn test_disjoint_boxes_kept_in_confidence_order() {
        let kept = non_max_suppression(
            vec![candidate(0, 0.3, 0.0), candidate(0, 0.7, 100.0), candidate(0, 0.5, 200.0)],
            0.45,
            false,
            300,
        );
        let confidences: Vec<f32> = kept.iter().map(|c| c.confidence).collect();
        assert_eq!(confidences, vec![0.7, 0.5, 0.3]);
    }

    #[test]
    fn test_max_det() {
        let candidates = (0..10).map(|i| candidate(0, 0.5, i as f32 * 100.0)).collect();
        assert_eq!(non_max_suppression(candidates, 0.45, false, 3).len(), 3);
    }

    #[test]
    fn test_nan_confidence_dropped() {
        let kept = non_max_suppression(vec![candidate(0, f32::NAN, 0.0)], 0.45, false, 300);
        assert!(kept.is_empty());
    }

    #[test]
    fn test_filter_classes() {
        let candidates = vec![candidate(0, 0.9, 0.0), candidate(2, 0.9, 0.0), candidate(16, 0.9, 0.0)];
        let kept = filter_classes(candidates.clone(), Some(&[0, 16]));
        assert_eq!(kept.iter().map(|c| c.class_id).collect::<Vec<_>>(), vec![0, 16]);
        assert_eq!(filter_classes(candidates, None).len(), 3);
    }
}
