use crate::Generator;
use typed_builder::TypedBuilder;

/// Characters a random short id is drawn from.
pub const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Default number of characters in a random short id.
pub const DEFAULT_LENGTH: usize = 5;

/// Uniformly random short ids over [`ALPHABET`].
///
/// With five letters there are 52^5 (about 380 million) ids, so collisions
/// are rare but expected over the lifetime of a large table.
#[derive(Debug, Clone, TypedBuilder)]
pub struct RandomGenerator {
    #[builder(default = DEFAULT_LENGTH)]
    length: usize,
}

impl Default for RandomGenerator {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl RandomGenerator {
    pub fn length(&self) -> usize {
        self.length
    }
}

impl Generator for RandomGenerator {
    fn generate(&self) -> String {
        (0..self.length)
            .map(|_| ALPHABET[rand::random_range(0..ALPHABET.len())] as char)
            .collect()
    }
}
