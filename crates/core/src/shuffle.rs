//! Deterministic, seed-driven ordering for questions and choices.
//!
//! Both orderings must be reproducible across processes and machines: a
//! session's question order is fixed the moment the session is created, and a
//! given user always sees a given question's choices in the same order, which
//! blocks answer-position memorization without reshuffling on every view.

use blake3::Hasher;
use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;

use crate::model::{ChoiceId, Question, QuestionId, UserId};

const SEED_SEP: u8 = 0x1f;

/// Stable 64-bit seed from the given parts.
///
/// The hash keeps seeds stable across processes and platforms; a separator
/// byte between parts keeps `(1, 23)` and `(12, 3)` from colliding.
fn seed_from_parts(parts: &[&[u8]]) -> u64 {
    let mut hasher = Hasher::new();
    for part in parts {
        hasher.update(part);
        hasher.update(&[SEED_SEP]);
    }
    let digest = hasher.finalize();
    let mut bytes = [0_u8; 8];
    bytes.copy_from_slice(&digest.as_bytes()[..8]);
    u64::from_le_bytes(bytes)
}

/// Seed for a session's question order, derived from the owning user and the
/// creation timestamp so the order is fixed once and not re-randomized on
/// resume.
#[must_use]
pub fn session_seed(user_id: UserId, timestamp_ms: i64) -> u64 {
    seed_from_parts(&[
        b"session",
        &user_id.value().to_le_bytes(),
        &timestamp_ms.to_le_bytes(),
    ])
}

/// Seed for a question's choice display order, derived from the user and the
/// question only — stable for that user across sessions.
#[must_use]
pub fn question_seed(user_id: UserId, question_id: QuestionId) -> u64 {
    seed_from_parts(&[
        b"question",
        &user_id.value().to_le_bytes(),
        &question_id.value().to_le_bytes(),
    ])
}

/// Deterministic Fisher–Yates permutation of `items`.
///
/// Items are first sorted into a canonical order by `sort_key` so ties in the
/// source ordering never introduce nondeterminism; the permutation itself is
/// driven by a seeded ChaCha generator. Always succeeds; the output is a
/// permutation of the input.
#[must_use]
pub fn shuffle_with_seed<T, K, F>(mut items: Vec<T>, seed: u64, sort_key: F) -> Vec<T>
where
    K: Ord,
    F: Fn(&T) -> K,
{
    items.sort_by_key(|item| sort_key(item));
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    items.shuffle(&mut rng);
    items
}

/// Shuffle question ids for a new session. Canonical order is the numeric id.
#[must_use]
pub fn shuffle_question_ids(ids: Vec<QuestionId>, seed: u64) -> Vec<QuestionId> {
    shuffle_with_seed(ids, seed, |id| id.value())
}

/// Per-user display order for a question's choices.
///
/// Canonical order is the authored `(sort_order, id)`; the seed is derived
/// from user and question only, so the same user sees the same order on
/// every encounter.
#[must_use]
pub fn choice_display_order(question: &Question, user_id: UserId) -> Vec<ChoiceId> {
    let ids: Vec<ChoiceId> = question.choices().iter().map(|c| c.id).collect();
    let seed = question_seed(user_id, question.id());
    let by_key = |id: &ChoiceId| {
        question
            .choice(*id)
            .map_or((u32::MAX, id.value()), |c| (c.sort_order, c.id.value()))
    };
    shuffle_with_seed(ids, seed, by_key)
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Choice, ChoiceLabel, Difficulty, QuestionStatus, TagSlug};
    use crate::time::fixed_now;
    use std::collections::BTreeSet;

    fn ids(values: &[u64]) -> Vec<QuestionId> {
        values.iter().copied().map(QuestionId::new).collect()
    }

    #[test]
    fn seeds_are_deterministic() {
        let user = UserId::new(42);
        assert_eq!(session_seed(user, 1_000), session_seed(user, 1_000));
        assert_eq!(
            question_seed(user, QuestionId::new(7)),
            question_seed(user, QuestionId::new(7))
        );
    }

    #[test]
    fn seeds_vary_with_inputs() {
        let user = UserId::new(42);
        assert_ne!(session_seed(user, 1_000), session_seed(user, 1_001));
        assert_ne!(
            session_seed(user, 1_000),
            session_seed(UserId::new(43), 1_000)
        );
        assert_ne!(
            question_seed(user, QuestionId::new(7)),
            question_seed(user, QuestionId::new(8))
        );
    }

    #[test]
    fn session_and_question_seeds_do_not_collide_on_same_parts() {
        // same numeric inputs through the two derivations must differ
        let user = UserId::new(5);
        assert_ne!(
            session_seed(user, 9),
            question_seed(user, QuestionId::new(9))
        );
    }

    #[test]
    fn shuffle_is_a_permutation() {
        let input = ids(&[9, 3, 7, 1, 4, 8, 2]);
        let output = shuffle_question_ids(input.clone(), 12345);

        assert_eq!(output.len(), input.len());
        let before: BTreeSet<u64> = input.iter().map(|q| q.value()).collect();
        let after: BTreeSet<u64> = output.iter().map(|q| q.value()).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn shuffle_is_deterministic_for_fixed_seed() {
        let input = ids(&[1, 2, 3, 4, 5, 6, 7, 8]);
        let a = shuffle_question_ids(input.clone(), 99);
        let b = shuffle_question_ids(input, 99);
        assert_eq!(a, b);
    }

    #[test]
    fn shuffle_ignores_source_ordering() {
        // the canonical pre-sort makes the result independent of input order
        let a = shuffle_question_ids(ids(&[5, 1, 3, 2, 4]), 7);
        let b = shuffle_question_ids(ids(&[4, 2, 5, 3, 1]), 7);
        assert_eq!(a, b);
    }

    #[test]
    fn different_seeds_give_different_orders() {
        let input = ids(&[1, 2, 3, 4, 5, 6, 7, 8, 9, 10]);
        let a = shuffle_question_ids(input.clone(), 1);
        let b = shuffle_question_ids(input, 2);
        assert_ne!(a, b);
    }

    fn build_question(id: u64) -> Question {
        let choices = (0..4)
            .map(|i| Choice {
                id: ChoiceId::new(i + 1),
                label: ChoiceLabel::from_index(i as usize).unwrap(),
                text: format!("choice {i}"),
                is_correct: i == 0,
                explanation_md: None,
                sort_order: i as u32,
            })
            .collect();
        Question::new(
            QuestionId::new(id),
            "slug",
            "stem",
            "explanation",
            Difficulty::Easy,
            QuestionStatus::Published,
            choices,
            vec![TagSlug::new("tag").unwrap()],
            fixed_now(),
        )
        .unwrap()
    }

    #[test]
    fn choice_order_is_stable_per_user_and_question() {
        let question = build_question(7);
        let user = UserId::new(11);
        assert_eq!(
            choice_display_order(&question, user),
            choice_display_order(&question, user)
        );
    }

    #[test]
    fn choice_order_differs_between_users() {
        // a single four-choice question can legitimately collide between two
        // users, so require a difference somewhere across several questions
        let differs = (1..=8).any(|id| {
            let question = build_question(id);
            choice_display_order(&question, UserId::new(1))
                != choice_display_order(&question, UserId::new(2))
        });
        assert!(differs);
    }

    #[test]
    fn choice_order_covers_all_choices() {
        let question = build_question(3);
        let order = choice_display_order(&question, UserId::new(5));
        let expected: BTreeSet<u64> = question.choices().iter().map(|c| c.id.value()).collect();
        let actual: BTreeSet<u64> = order.iter().map(|c| c.value()).collect();
        assert_eq!(expected, actual);
    }
}
