//! Property-based test generators using proptest, plus seeded random data.

use crate::fixtures::Trivial;
use entiscope_store::Key;
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// One step of a deferred write sequence.
#[derive(Debug, Clone, PartialEq)]
pub enum DeferredAction {
    /// Defer a save of a [`Trivial`] with this id.
    Save {
        /// Entity id.
        id: i64,
        /// Value written to `some_number`.
        number: i64,
    },
    /// Defer a delete of the [`Trivial`] with this id.
    Delete {
        /// Entity id.
        id: i64,
    },
}

impl DeferredAction {
    /// Returns the id this action touches.
    #[must_use]
    pub fn id(&self) -> i64 {
        match self {
            Self::Save { id, .. } | Self::Delete { id } => *id,
        }
    }
}

/// Strategy for complete root keys of kind `kind` with ids in `1..=max_id`.
pub fn key_strategy(kind: &'static str, max_id: i64) -> impl Strategy<Value = Key> {
    (1..=max_id).prop_map(move |id| Key::new(kind, id))
}

/// Strategy for [`Trivial`] property values.
pub fn trivial_strategy() -> impl Strategy<Value = Trivial> {
    ("[a-z]{0,12}", any::<i64>()).prop_map(|(s, n)| Trivial::new(s, n))
}

/// Strategy for a deferred write sequence over a small id space, so the
/// same identity is usually touched more than once.
pub fn deferred_actions_strategy(max_len: usize) -> impl Strategy<Value = Vec<DeferredAction>> {
    let action = prop_oneof![
        (1..=5i64, any::<i64>()).prop_map(|(id, number)| DeferredAction::Save { id, number }),
        (1..=5i64).prop_map(|id| DeferredAction::Delete { id }),
    ];
    prop::collection::vec(action, 1..=max_len)
}

/// Generates `count` unsaved [`Trivial`] entities from `seed`.
#[must_use]
pub fn random_trivials(count: usize, seed: u64) -> Vec<Trivial> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|i| {
            let len = rng.gen_range(4..16);
            let text: String = (0..len)
                .map(|_| char::from(rng.gen_range(b'a'..=b'z')))
                .collect();
            Trivial::new(format!("{text}-{i}"), rng.gen_range(0..1_000))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_trivials_are_deterministic() {
        assert_eq!(random_trivials(5, 7), random_trivials(5, 7));
        assert_eq!(random_trivials(3, 1).len(), 3);
    }

    proptest! {
        #[test]
        fn keys_are_complete(key in key_strategy("Thing", 10)) {
            prop_assert!(key.is_complete());
            prop_assert_eq!(key.kind(), "Thing");
        }

        #[test]
        fn actions_stay_in_range(actions in deferred_actions_strategy(20)) {
            prop_assert!(actions.iter().all(|a| (1..=5).contains(&a.id())));
        }
    }
}
