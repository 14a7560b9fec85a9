// src/sampler.rs
//
// Exam sheet sampling. The RNG is an explicit parameter so tests can drive
// the sampler with a seeded `StdRng`; production handlers pass `thread_rng`.

use rand::Rng;
use rand::seq::SliceRandom;

/// One delivered question with its choices in presentation order.
#[derive(Debug, Clone)]
pub struct SampledQuestion {
    pub question_id: i64,
    pub choice_ids: Vec<i64>,
}

/// Picks `min(target, pool.len())` questions uniformly at random without
/// replacement and shuffles each question's choices.
///
/// The caller persists the result as the attempt's one-time exam sheet, so a
/// user cannot re-roll an easier question set by re-reading the attempt.
pub fn sample_exam_sheet<R: Rng + ?Sized>(
    rng: &mut R,
    pool: Vec<(i64, Vec<i64>)>,
    target: usize,
) -> Vec<SampledQuestion> {
    let mut pool = pool;
    pool.shuffle(rng);
    pool.truncate(target);

    pool.into_iter()
        .map(|(question_id, mut choice_ids)| {
            choice_ids.shuffle(rng);
            SampledQuestion {
                question_id,
                choice_ids,
            }
        })
        .collect()
}
