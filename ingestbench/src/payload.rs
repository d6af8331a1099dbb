//! Synthetic log entries posted by insert scenarios.

use rand::rngs::SmallRng;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};
use serde::Serialize;

const SOURCES: &[&str] = &[
    "test-service-1",
    "test-service-2",
    "test-service-3",
    "test-service-4",
];

const LEVELS: &[&str] = &["DEBUG", "INFO", "WARNING", "ERROR"];

const ACTIONS: &[&str] = &[
    "login", "logout", "update", "delete", "create", "read", "write",
];

const USERS: &[&str] = &["user1", "user2", "user3", "admin", "guest"];

/// The JSON body of a `POST /logs` request.
///
/// Identity and timestamp are assigned by the system under test and never sent.
#[derive(Clone, Debug, Serialize)]
pub struct LogPayload {
    pub source: &'static str,
    pub level: &'static str,
    pub message: String,
    pub metadata: LogMetadata,
}

/// Structured fields attached to a [`LogPayload`].
#[derive(Clone, Debug, Serialize)]
pub struct LogMetadata {
    pub test_id: i64,
    pub user: &'static str,
    pub action: &'static str,
}

impl LogPayload {
    /// Generates the payload for the given seed.
    ///
    /// The same seed always yields the same payload.
    pub fn generate(seed: u64) -> Self {
        let mut rng = SmallRng::seed_from_u64(seed);

        let source = pick(&mut rng, SOURCES);
        let level = pick(&mut rng, LEVELS);
        let action = pick(&mut rng, ACTIONS);
        let user = pick(&mut rng, USERS);
        let test_id = rng.random_range(0..i64::MAX);

        Self {
            source,
            level,
            message: format!("Performance test: {action} by {user}"),
            metadata: LogMetadata {
                test_id,
                user,
                action,
            },
        }
    }
}

fn pick(rng: &mut SmallRng, pool: &[&'static str]) -> &'static str {
    // All pools are non-empty constants.
    pool.choose(rng).copied().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_per_seed() {
        let a = serde_json::to_value(LogPayload::generate(42)).unwrap();
        let b = serde_json::to_value(LogPayload::generate(42)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn fields_come_from_pools() {
        for seed in 0..200 {
            let payload = LogPayload::generate(seed);
            assert!(SOURCES.contains(&payload.source));
            assert!(LEVELS.contains(&payload.level));
            assert!(ACTIONS.contains(&payload.metadata.action));
            assert!(USERS.contains(&payload.metadata.user));
            assert!(payload.metadata.test_id >= 0);
            assert_eq!(
                payload.message,
                format!(
                    "Performance test: {} by {}",
                    payload.metadata.action, payload.metadata.user
                )
            );
        }
    }

    #[test]
    fn serialized_shape() {
        let value = serde_json::to_value(LogPayload::generate(7)).unwrap();
        let object = value.as_object().unwrap();

        let mut keys: Vec<_> = object.keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(keys, ["level", "message", "metadata", "source"]);

        let mut metadata: Vec<_> = object["metadata"]
            .as_object()
            .unwrap()
            .keys()
            .map(String::as_str)
            .collect();
        metadata.sort_unstable();
        assert_eq!(metadata, ["action", "test_id", "user"]);
    }
}
