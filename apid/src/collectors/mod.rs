//! Metric collectors: pure store-to-aggregate derivations.

pub mod global;
pub mod users;

use crate::error::Result;
use tracing::error;

/// Last-known-good fallback applied around every collector call.
///
/// On success the target field is replaced wholesale; on failure it is
/// left at its previous value and the failure is logged. Collector errors
/// never travel further than this.
pub fn or_cached<T>(target: &mut T, what: &str, result: Result<T>) {
    match result {
        Ok(value) => *target = value,
        Err(e) => error!("Error collecting {}: {}", what, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;

    #[test]
    fn test_or_cached_keeps_previous_value_on_error() {
        let mut value = 7u64;
        or_cached(&mut value, "test", Err(EngineError::Api("down".into())));
        assert_eq!(value, 7);
        or_cached(&mut value, "test", Ok(9));
        assert_eq!(value, 9);
    }
}
