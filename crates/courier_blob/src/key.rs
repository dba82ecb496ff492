use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use chrono::Utc;

/// Issues `{owner}/{stamp}_{file_name}` keys.
///
/// The stamp is wall-clock milliseconds, bumped past the last issued value
/// when the clock has not advanced, so keys never repeat within a process.
#[derive(Debug, Default)]
pub struct StorageKeyGenerator {
    last_stamp: AtomicU64,
}

static PROCESS_KEYS: OnceLock<Arc<StorageKeyGenerator>> = OnceLock::new();

impl StorageKeyGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// The generator every orchestrator in this process shares unless given
    /// its own.
    pub fn shared() -> Arc<Self> {
        PROCESS_KEYS.get_or_init(|| Arc::new(Self::new())).clone()
    }

    pub fn next_stamp(&self) -> u64 {
        let now = u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0);
        let mut last = self.last_stamp.load(Ordering::Relaxed);
        loop {
            let candidate = now.max(last + 1);
            match self.last_stamp.compare_exchange_weak(
                last,
                candidate,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return candidate,
                Err(observed) => last = observed,
            }
        }
    }

    pub fn key_for(&self, owner: &str, file_name: &str) -> String {
        format!("{}/{}_{}", owner, self.next_stamp(), flatten_file_name(file_name))
    }
}

/// Keeps a file name inside its owner's prefix.
fn flatten_file_name(file_name: &str) -> String {
    let flattened: String = file_name
        .chars()
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .collect();
    if flattened.trim().is_empty() {
        "unnamed".to_string()
    } else {
        flattened
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;

    use super::*;
    use crate::store::validate_key;

    #[test]
    fn keys_are_prefixed_by_owner() {
        let keys = StorageKeyGenerator::new();
        let key = keys.key_for("u1", "report.pdf");
        assert!(key.starts_with("u1/"));
        assert!(key.ends_with("_report.pdf"));
        assert!(validate_key(&key).is_ok());
    }

    #[test]
    fn same_name_in_same_instant_gets_distinct_keys() {
        let keys = StorageKeyGenerator::new();
        let issued: HashSet<String> = (0..500).map(|_| keys.key_for("u1", "a.txt")).collect();
        assert_eq!(issued.len(), 500);
    }

    #[test]
    fn stamps_are_unique_across_threads() {
        let keys = Arc::new(StorageKeyGenerator::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let keys = keys.clone();
                std::thread::spawn(move || (0..250).map(|_| keys.next_stamp()).collect::<Vec<_>>())
            })
            .collect();

        let mut all = HashSet::new();
        for handle in handles {
            for stamp in handle.join().expect("thread") {
                assert!(all.insert(stamp), "duplicate stamp {stamp}");
            }
        }
        assert_eq!(all.len(), 1000);
    }

    #[test]
    fn shared_generator_is_one_per_process() {
        let first = StorageKeyGenerator::shared();
        let second = StorageKeyGenerator::shared();
        assert!(Arc::ptr_eq(&first, &second));
        let earlier = first.next_stamp();
        assert!(second.next_stamp() > earlier);
    }

    #[test]
    fn path_separators_in_file_names_are_flattened() {
        let keys = StorageKeyGenerator::new();
        let key = keys.key_for("u1", "../u2/evil.sh");
        assert!(key.starts_with("u1/"));
        assert_eq!(key.matches('/').count(), 1);
        assert!(validate_key(&key).is_ok());
    }
}
