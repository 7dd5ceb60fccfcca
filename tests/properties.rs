use cropsense::aggregate::aggregate;
use cropsense::history::History;
use cropsense::schema::{Detection, ImageResult, InfestationType};
use cropsense::severity::{SeverityThresholds, assess, prevalence_pct};
use proptest::prelude::*;

const LABELS: &[&str] = &["blast", "weed", "mite", "aphid"];

fn detection() -> impl Strategy<Value = Detection> {
    (0..LABELS.len(), 0.0f64..=1.0, any::<bool>()).prop_map(|(idx, confidence, is_crop)| {
        if is_crop {
            Detection::crop(LABELS[idx], confidence).unwrap()
        } else {
            Detection::infestation(LABELS[idx], confidence, InfestationType::Unknown).unwrap()
        }
    })
}

fn image() -> impl Strategy<Value = ImageResult> {
    prop::collection::vec(detection(), 0..6).prop_map(ImageResult::new)
}

proptest! {
    #[test]
    fn infestation_counts_stay_within_bounds(images in prop::collection::vec(image(), 0..12)) {
        let agg = aggregate(&images);
        prop_assert_eq!(agg.total_images, images.len());

        for stats in agg.infestations.iter() {
            let raw = images
                .iter()
                .flat_map(|i| i.infestations())
                .filter(|d| d.label() == stats.label)
                .count();
            prop_assert!(stats.count <= images.len());
            prop_assert!(stats.count <= raw);
            prop_assert_eq!(stats.confidences.len(), raw);
        }
    }

    #[test]
    fn prevalence_is_monotonic_in_count(total in 1usize..500, a in 0usize..500, b in 0usize..500) {
        let (lo, hi) = (a.min(b).min(total), a.max(b).min(total));
        prop_assert!(prevalence_pct(lo, total) <= prevalence_pct(hi, total));
    }

    #[test]
    fn history_never_exceeds_capacity(
        capacity in 1usize..8,
        sliding in any::<bool>(),
        images in prop::collection::vec(image(), 0..20),
    ) {
        let mut history = if sliding {
            History::sliding_window(capacity, 1)
        } else {
            History::fixed_lock(capacity)
        };
        for image in images {
            if let Ok(next) = history.append(image) {
                history = next;
            }
            prop_assert!(history.len() <= capacity);
        }
    }

    #[test]
    fn at_most_one_major_infestation(images in prop::collection::vec(image(), 1..10)) {
        let assessment = assess(&aggregate(&images), &SeverityThresholds::default());
        match &assessment.major_infestation {
            Some(label) => prop_assert!(assessment.infestations.iter().any(|i| &i.label == label)),
            None => prop_assert!(assessment.infestations.is_empty()),
        }
    }
}
