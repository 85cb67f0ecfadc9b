//! Synthetic conversation generation. Good enough to drive the rest of the
//! engine end to end; actual prompt composition is out of scope and left to
//! the embedding application's own text source.

use aiperf_core::{Conversation, Turn, TurnRole};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[derive(Debug, Clone)]
pub struct SyntheticConfig {
    pub num_conversations: usize,
    pub turns_per_conversation: usize,
    pub mean_input_tokens: usize,
    pub random_seed: u64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            num_conversations: 1,
            turns_per_conversation: 1,
            mean_input_tokens: 128,
            random_seed: 0,
        }
    }
}

/// Generates conversations with placeholder text sized around
/// `mean_input_tokens` words per user turn, using a seeded PRNG so a fixed
/// `random_seed` reproduces the same dataset.
pub struct SyntheticGenerator {
    config: SyntheticConfig,
}

impl SyntheticGenerator {
    pub fn new(config: SyntheticConfig) -> Self {
        Self { config }
    }

    pub fn generate(&self) -> Vec<Conversation> {
        let mut rng = StdRng::seed_from_u64(self.config.random_seed);
        (0..self.config.num_conversations)
            .map(|i| self.generate_one(&mut rng, i))
            .collect()
    }

    fn generate_one(&self, rng: &mut StdRng, index: usize) -> Conversation {
        let mut turns = Vec::with_capacity(self.config.turns_per_conversation);
        for turn_index in 0..self.config.turns_per_conversation {
            let word_count = rng.gen_range(
                self.config.mean_input_tokens.saturating_sub(16)..=self.config.mean_input_tokens + 16,
            );
            turns.push(Turn {
                role: TurnRole::User,
                text: synthetic_words(word_count),
                timestamp_ns: None,
            });
            let _ = turn_index;
        }
        Conversation {
            session_id: format!("synthetic-{index}"),
            turns,
        }
    }
}

fn synthetic_words(count: usize) -> String {
    std::iter::repeat("lorem").take(count.max(1)).collect::<Vec<_>>().join(" ")
}
