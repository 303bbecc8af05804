pub mod random;
pub mod seq;

pub use random::RandomGenerator;
pub use seq::SeqGenerator;

/// Trait for generating short ids.
///
/// Implementations are pure generators that don't interact with storage.
/// Uniqueness is not guaranteed: storage rejects a taken id and the caller
/// asks for another one.
pub trait Generator: Send + Sync + 'static {
    fn generate(&self) -> String;
}
