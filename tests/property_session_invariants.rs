use std::time::Duration;

use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::Value;

use dice_session_backend::constants::{SESSION_CODE_CHARSET, SESSION_CODE_LENGTH};
use dice_session_backend::session::dice::{DiceCounts, DiceTable, DieKind};
use dice_session_backend::session::sweeper::collect_expired;
use dice_session_backend::session::SessionCode;
use dice_session_backend::store::Snapshot;

proptest! {
    #[test]
    fn pt_generated_codes_use_readable_charset(seed in any::<u64>()) {
        let mut rng = StdRng::seed_from_u64(seed);
        let code = SessionCode::generate(&mut rng);

        prop_assert_eq!(code.as_str().chars().count(), SESSION_CODE_LENGTH);
        prop_assert!(code.as_str().chars().all(|c| c.is_ascii() && SESSION_CODE_CHARSET.contains(&(c as u8))));
        prop_assert_eq!(SessionCode::parse(code.as_str()).ok(), Some(code));
    }

    #[test]
    fn pt_expiry_matches_age_against_ttl(
        ages in prop::collection::vec(0_i64..100_000, 0..40),
        ttl_secs in 1_u64..50_000,
    ) {
        let now = 1_700_000_000_i64;
        let snapshot: Snapshot = ages
            .iter()
            .enumerate()
            .map(|(i, age)| (format!("S{i:05}"), Value::from(now - age)))
            .collect();

        let scan = collect_expired(&snapshot, now, Duration::from_secs(ttl_secs));

        let expected: Vec<String> = ages
            .iter()
            .enumerate()
            .filter(|(_, age)| **age >= ttl_secs as i64)
            .map(|(i, _)| format!("S{i:05}"))
            .collect();
        prop_assert_eq!(scan.expired, expected);
        prop_assert!(scan.malformed.is_empty());
    }

    #[test]
    fn pt_dice_counts_are_normalized_and_totals_bounded(
        d6 in proptest::option::of(-5.0_f64..500.0),
        d20 in proptest::option::of(-5.0_f64..500.0),
        seed in any::<u64>(),
    ) {
        let mut counts = DiceCounts::new();
        counts.insert("d6".to_string(), d6);
        counts.insert("d20".to_string(), d20);

        let mut table = DiceTable::from_counts(&counts).unwrap();
        table.roll(&mut StdRng::seed_from_u64(seed));

        for (kind, raw) in [(DieKind::D6, d6), (DieKind::D20, d20)] {
            match raw.map(f64::round).filter(|c| *c > 0.0) {
                None => prop_assert!(table.get(kind).is_none()),
                Some(rounded) => {
                    let die = table.get(kind).unwrap();
                    prop_assert_eq!(die.count, rounded.min(99.0) as u32);
                    prop_assert!(die.total >= die.count);
                    prop_assert!(die.total <= die.count * kind.sides());
                }
            }
        }

        let reparsed = DiceTable::parse_payload(&table.to_payload()).unwrap();
        prop_assert_eq!(reparsed, table);
    }
}
