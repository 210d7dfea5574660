//! Reduce trial durations to one value per configuration.

use crate::error::SweepError;

/// Arithmetic mean in whole milliseconds, truncated toward zero.
pub fn average(values: &[u64]) -> Result<u64, SweepError> {
    if values.is_empty() {
        return Err(SweepError::EmptyInput);
    }
    // u128 so a long list of large durations cannot overflow the sum.
    let total: u128 = values.iter().map(|&v| u128::from(v)).sum();
    Ok((total / values.len() as u128) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_average() {
        assert_eq!(average(&[10, 20, 30]).unwrap(), 20);
        assert_eq!(average(&[7]).unwrap(), 7);
    }

    #[test]
    fn test_average_truncates() {
        assert_eq!(average(&[1, 2]).unwrap(), 1);
        assert_eq!(average(&[999, 1000, 1000]).unwrap(), 999);
    }

    #[test]
    fn test_average_empty_fails() {
        assert!(matches!(average(&[]), Err(SweepError::EmptyInput)));
    }

    #[test]
    fn test_average_large_values() {
        assert_eq!(average(&[u64::MAX, u64::MAX]).unwrap(), u64::MAX);
    }
}
