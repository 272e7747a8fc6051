//! Identifier generation.

use uuid::Uuid;

/// Generates a prefixed, time-ordered identifier (e.g. `action_0190…`).
#[must_use]
pub fn new_id(prefix: &str) -> String {
    format!("{prefix}_{}", Uuid::now_v7().simple())
}

/// Generates a trace identifier for one tool invocation or workflow run.
#[must_use]
pub fn new_trace_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_id_is_prefixed_and_unique() {
        let a = new_id("action");
        let b = new_id("action");

        assert!(a.starts_with("action_"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_trace_id_is_uuid() {
        let trace = new_trace_id();
        assert!(Uuid::parse_str(&trace).is_ok());
    }
}
