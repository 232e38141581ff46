//! Property tests for freeze-day selection and worst-fraction trimming.
//!
//! Uses proptest to verify:
//! 1. The freeze day is the earliest day covering at least f·N resolved questions
//! 2. Extra rows per question do not change N
//! 3. The trimmed set is the worst floor(frac·n) forecasters, at least one

use std::collections::BTreeSet;

use chrono::{Days, NaiveDate};
use proptest::prelude::*;
use poolcast_core::domain::{ForecasterDayRecord, ForecasterId};
use poolcast_runner::trimming::{select_freeze_day, select_worst, RankedForecaster};

// ── Strategies (proptest) ────────────────────────────────────────────

/// Distinct day offsets, one resolved question per offset.
fn arb_offsets() -> impl Strategy<Value = BTreeSet<u64>> {
    prop::collection::btree_set(0u64..400, 1..60)
}

fn day(offset: u64) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + Days::new(offset)
}

fn resolved(question: usize, forecaster: usize, ck: NaiveDate) -> ForecasterDayRecord {
    ForecasterDayRecord {
        question: format!("q{question}").as_str().into(),
        forecaster: format!("f{forecaster}").as_str().into(),
        day: day(0),
        bucket: 0,
        probability: 0.5,
        resolved_probability: Some(1.0),
        correctness_known_day: Some(ck),
    }
}

proptest! {
    #[test]
    fn freeze_day_is_earliest_covering_target(offsets in arb_offsets(), f in 0.0..=1.0_f64) {
        let days: Vec<NaiveDate> = offsets.iter().map(|&o| day(o)).collect();
        let records: Vec<ForecasterDayRecord> = days
            .iter()
            .enumerate()
            .map(|(q, &ck)| resolved(q, 0, ck))
            .collect();

        let freeze = select_freeze_day(&records, f).unwrap();

        let n = days.len();
        let target = f * n as f64;
        let expected = (0..n).find(|&i| (i + 1) as f64 >= target).unwrap_or(0);
        prop_assert_eq!(freeze.day, days[expected]);
        prop_assert_eq!(freeze.n_resolved, n);
        prop_assert!((freeze.resolved_fraction - (expected + 1) as f64 / n as f64).abs() < 1e-12);
    }

    #[test]
    fn extra_forecasters_do_not_inflate_question_count(
        offsets in arb_offsets(),
        extra in 1usize..5,
        f in 0.0..=1.0_f64,
    ) {
        let days: Vec<NaiveDate> = offsets.iter().map(|&o| day(o)).collect();
        let single: Vec<ForecasterDayRecord> = days
            .iter()
            .enumerate()
            .map(|(q, &ck)| resolved(q, 0, ck))
            .collect();
        let crowded: Vec<ForecasterDayRecord> = days
            .iter()
            .enumerate()
            .flat_map(|(q, &ck)| (0..=extra).map(move |fc| resolved(q, fc, ck)))
            .collect();

        prop_assert_eq!(
            select_freeze_day(&single, f).unwrap(),
            select_freeze_day(&crowded, f).unwrap()
        );
    }

    #[test]
    fn worst_fraction_takes_head_of_ranking(n in 1usize..50, frac in 0.0..=1.0_f64) {
        let ranked: Vec<RankedForecaster> = (0..n)
            .map(|i| RankedForecaster {
                forecaster: format!("f{i:02}").as_str().into(),
                score: (n - i) as f64,
                n_questions: 1,
            })
            .collect();

        let worst = select_worst(&ranked, frac);

        let expected = ((frac * n as f64).floor() as usize).max(1);
        prop_assert_eq!(worst.len(), expected);
        let head: BTreeSet<ForecasterId> =
            ranked.iter().take(expected).map(|r| r.forecaster.clone()).collect();
        prop_assert_eq!(worst, head);
    }
}
