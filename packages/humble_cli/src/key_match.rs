use thiserror::Error;

/// Length of every bundle identifier
pub const FULL_KEY_SIZE: usize = 16;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyMatchError {
    #[error("no bundle matches '{0}'")]
    NotFound(String),

    #[error("more than one bundle matches '{input}':\n{}", .candidates.join("\n"))]
    Ambiguous {
        input: String,
        candidates: Vec<String>,
    },
}

/// Resolves a possibly partial bundle identifier to a single full one.
///
/// Input with the length of a full identifier is returned as is, without
/// checking that it is one of `keys`. Anything shorter is matched as a
/// case-insensitive prefix.
pub fn resolve(keys: &[String], input: &str) -> Result<String, KeyMatchError> {
    if input.len() == FULL_KEY_SIZE {
        return Ok(input.to_owned());
    }

    let prefix = input.to_lowercase();
    let mut matches: Vec<String> = keys
        .iter()
        .filter(|k| k.to_lowercase().starts_with(&prefix))
        .cloned()
        .collect();

    match matches.len() {
        0 => Err(KeyMatchError::NotFound(input.to_owned())),
        1 => Ok(matches.remove(0)),
        _ => Err(KeyMatchError::Ambiguous {
            input: input.to_owned(),
            candidates: matches,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys() -> Vec<String> {
        vec![
            "1aXXXXXXXXXXXXXX".to_owned(),
            "1aYYYYYYYYYYYYYY".to_owned(),
            "2bZZZZZZZZZZZZZZ".to_owned(),
        ]
    }

    #[test]
    fn single_match_is_case_insensitive() {
        assert_eq!(resolve(&keys(), "2BZ").unwrap(), "2bZZZZZZZZZZZZZZ");
        assert_eq!(resolve(&keys(), "1ax").unwrap(), "1aXXXXXXXXXXXXXX");
    }

    #[test]
    fn ambiguous_prefix_lists_candidates() {
        let err = resolve(&keys(), "1a").unwrap_err();
        assert_eq!(
            err,
            KeyMatchError::Ambiguous {
                input: "1a".to_owned(),
                candidates: vec![
                    "1aXXXXXXXXXXXXXX".to_owned(),
                    "1aYYYYYYYYYYYYYY".to_owned()
                ],
            }
        );
        assert!(err.to_string().contains("1aYYYYYYYYYYYYYY"));
    }

    #[test]
    fn unknown_prefix_is_not_found() {
        assert_eq!(
            resolve(&keys(), "3c"),
            Err(KeyMatchError::NotFound("3c".to_owned()))
        );
    }

    #[test]
    fn full_length_input_is_returned_verbatim() {
        assert_eq!(resolve(&keys(), "QqQqQqQqQqQqQqQq").unwrap(), "QqQqQqQqQqQqQqQq");
        assert_eq!(resolve(&[], "QqQqQqQqQqQqQqQq").unwrap(), "QqQqQqQqQqQqQqQq");
    }
}
