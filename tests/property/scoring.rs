//! Properties of composite scoring and the feedback decision rules

use animatr::feedback::{decide, Aspect, Decision, QaScore, APPROVAL_THRESHOLD, MAX_ITERATIONS};
use proptest::prelude::*;

fn scores() -> impl Strategy<Value = [f64; 6]> {
    prop::array::uniform6(0.0f64..=1.0)
}

fn qa(values: [f64; 6]) -> QaScore {
    QaScore::new(Aspect::ALL.into_iter().zip(values)).unwrap()
}

proptest! {
    #[test]
    fn composite_is_the_weighted_sum(values in scores()) {
        let score = qa(values);
        let expected: f64 = Aspect::ALL
            .iter()
            .zip(values)
            .map(|(aspect, value)| aspect.weight() * value)
            .sum();
        prop_assert!((score.composite() - expected).abs() < 1e-9);
        prop_assert!((0.0..=1.0 + 1e-9).contains(&score.composite()));
    }

    #[test]
    fn decision_respects_threshold_and_cap(values in scores(), iteration in 0u32..=MAX_ITERATIONS) {
        let score = qa(values);
        let decision = decide(iteration, &score);
        if score.composite() >= APPROVAL_THRESHOLD + 1e-6 {
            prop_assert_eq!(decision, Decision::Deliver);
        } else if score.composite() < APPROVAL_THRESHOLD - 1e-6 {
            match decision {
                Decision::Revise { aspect, stage, .. } => {
                    prop_assert!(iteration < MAX_ITERATIONS);
                    prop_assert_eq!(stage, aspect.owning_stage());
                    prop_assert!(score.aspect(aspect) < APPROVAL_THRESHOLD);
                }
                Decision::Escalate => prop_assert!(iteration >= MAX_ITERATIONS || score.failing_aspects().is_empty()),
                Decision::Deliver => prop_assert!(false, "delivered below threshold"),
            }
        }
    }

    #[test]
    fn out_of_range_scores_are_rejected(bad in prop_oneof![-10.0f64..-0.0001, 1.0001f64..10.0]) {
        let mut values = [0.9; 6];
        values[1] = bad;
        prop_assert!(QaScore::new(Aspect::ALL.into_iter().zip(values)).is_err());
    }
}
