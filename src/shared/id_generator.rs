use std::sync::Mutex;

use uuid::Uuid;

/// IdGenerator trait for abstracting UUID generation
/// Used for device identifiers at seeding time and per-reading identifiers
pub trait IdGenerator: Send + Sync {
    /// Generate a new UUID v4 in hyphenated lowercase format
    fn uuid_v4(&self) -> String;
}

/// Production implementation of IdGenerator using random UUID generation
#[derive(Debug, Clone, Default)]
pub struct RandomIdGenerator;

impl RandomIdGenerator {
    pub fn new() -> Self {
        Self
    }
}

impl IdGenerator for RandomIdGenerator {
    fn uuid_v4(&self) -> String {
        Uuid::new_v4().to_string()
    }
}

/// Deterministic IdGenerator that hands out "{prefix}-{n}" in sequence
#[derive(Debug)]
pub struct SequentialIdGenerator {
    prefix: String,
    next: Mutex<u64>,
}

impl SequentialIdGenerator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: Mutex::new(1),
        }
    }
}

impl IdGenerator for SequentialIdGenerator {
    fn uuid_v4(&self) -> String {
        let mut next = match self.next.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let id = format!("{}-{}", self.prefix, *next);
        *next += 1;
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_id_generator() {
        let generator = RandomIdGenerator::new();

        let uuid1 = generator.uuid_v4();
        let uuid2 = generator.uuid_v4();

        assert!(Uuid::parse_str(&uuid1).is_ok());
        assert_ne!(uuid1, uuid2);
        assert_eq!(Uuid::parse_str(&uuid1).unwrap().get_version_num(), 4);
        assert_eq!(uuid1.len(), 36);
    }

    #[test]
    fn test_sequential_id_generator() {
        let generator = SequentialIdGenerator::new("reading");

        assert_eq!(generator.uuid_v4(), "reading-1");
        assert_eq!(generator.uuid_v4(), "reading-2");
        assert_eq!(generator.uuid_v4(), "reading-3");
    }

    #[test]
    fn test_id_generator_trait_object() {
        let random_gen: Box<dyn IdGenerator> = Box::new(RandomIdGenerator::new());
        let seq_gen: Box<dyn IdGenerator> = Box::new(SequentialIdGenerator::new("dev"));

        assert!(Uuid::parse_str(&random_gen.uuid_v4()).is_ok());
        assert_eq!(seq_gen.uuid_v4(), "dev-1");
    }

    #[test]
    fn test_sequential_id_generator_thread_safe() {
        use std::collections::HashSet;
        use std::sync::Arc;
        use std::thread;

        let generator = Arc::new(SequentialIdGenerator::new("id"));

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let gen = Arc::clone(&generator);
                thread::spawn(move || gen.uuid_v4())
            })
            .collect();

        let results: HashSet<String> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        // Every thread got a distinct id
        assert_eq!(results.len(), 10);
    }
}
