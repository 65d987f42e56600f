//! Checks on path and body parameters shared by the handlers.

use crate::error::ApiError;

/// Parse a comma-separated seq list such as `1,2,3`. Empty entries are
/// skipped; anything else that is not a positive integer is rejected.
pub fn parse_seq_list(raw: &str) -> Result<Vec<i64>, ApiError> {
    let mut seqs = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        match part.parse::<i64>() {
            Ok(n) if n > 0 => {
                if !seqs.contains(&n) {
                    seqs.push(n);
                }
            }
            _ => return Err(ApiError::validation(format!("{part:?} is not a valid seq"))),
        }
    }
    if seqs.is_empty() {
        return Err(ApiError::validation("at least one seq is required"));
    }
    Ok(seqs)
}

/// Length in characters must fall within `min..=max`.
pub fn check_len(field: &str, value: &str, min: usize, max: usize) -> Result<(), ApiError> {
    let len = value.chars().count();
    if len < min || len > max {
        return Err(ApiError::validation(format!(
            "{field} must be between {min} and {max} characters"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seq_lists() {
        assert_eq!(parse_seq_list("1,2,3").unwrap(), vec![1, 2, 3]);
        assert_eq!(parse_seq_list(" 4 ,,4, 5").unwrap(), vec![4, 5]);
        assert!(parse_seq_list("").is_err());
        assert!(parse_seq_list(",,").is_err());
        assert!(parse_seq_list("1,x").is_err());
        assert!(parse_seq_list("0").is_err());
    }

    #[test]
    fn lengths_count_characters() {
        assert!(check_len("user_name", "김철", 2, 50).is_ok());
        assert!(check_len("user_name", "a", 2, 50).is_err());
        assert!(check_len("password", "1234567890123456", 5, 15).is_err());
    }
}
