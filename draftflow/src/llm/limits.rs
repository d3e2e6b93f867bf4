use crate::errors::GenerationError;

/// Rejects requests whose combined prompt exceeds `max_chars` characters.
pub fn check_input_limits(system: &str, user: &str, max_chars: usize) -> Result<(), GenerationError> {
    let actual = system.chars().count() + user.chars().count();
    if actual > max_chars {
        return Err(GenerationError::InputTooLarge {
            actual,
            limit: max_chars,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_within_limit() {
        assert!(check_input_limits("abc", "de", 5).is_ok());
    }

    #[test]
    fn test_over_limit() {
        let err = check_input_limits("abc", "def", 5).unwrap_err();
        assert_eq!(err, GenerationError::InputTooLarge { actual: 6, limit: 5 });
    }
}
