use crate::Generator;
use std::sync::atomic::{AtomicU64, Ordering};

/// Deterministic short ids built from a prefix and a counter: "wh000000",
/// "wh000001", and so on.
///
/// Ids never repeat within one instance. Different processes writing to the
/// same storage should use different prefixes.
#[derive(Debug)]
pub struct SeqGenerator {
    counter: AtomicU64,
    prefix: String,
}

impl Clone for SeqGenerator {
    fn clone(&self) -> Self {
        Self {
            counter: AtomicU64::new(self.counter.load(Ordering::SeqCst)),
            prefix: self.prefix.clone(),
        }
    }
}

impl SeqGenerator {
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self::with_offset(prefix, 0)
    }

    /// Starts counting from `offset`, e.g. to resume after a restart.
    pub fn with_offset(prefix: impl Into<String>, offset: u64) -> Self {
        Self {
            counter: AtomicU64::new(offset),
            prefix: prefix.into(),
        }
    }
}

impl Generator for SeqGenerator {
    fn generate(&self) -> String {
        let count = self.counter.fetch_add(1, Ordering::SeqCst);
        format!("{}{:06}", self.prefix, count)
    }
}
