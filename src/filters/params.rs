//! Parameter splitting shared by filters that take several arguments

/// Splits filter parameters on commas. A backslash right before a comma
/// escapes it: the comma stays in the current parameter and the backslash
/// is dropped.
pub fn split_params(params: &str) -> Vec<String> {
    split_params_by(params, ',')
}

pub fn split_params_by(params: &str, separator: char) -> Vec<String> {
    let mut results: Vec<String> = Vec::new();
    let mut escaped = false;

    for piece in params.split(separator) {
        match results.last_mut() {
            Some(last) if escaped => {
                last.pop();
                last.push(separator);
                last.push_str(piece);
            }
            _ => results.push(piece.to_string()),
        }
        escaped = piece.ends_with('\\');
    }

    results
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escaped_comma() {
        assert_eq!(split_params(r"\,b,c,d"), vec![",b", "c", "d"]);
    }

    #[test]
    fn test_plain_and_empty_pieces() {
        assert_eq!(split_params("a,b"), vec!["a", "b"]);
        assert_eq!(split_params("a,,b"), vec!["a", "", "b"]);
        assert_eq!(split_params(""), vec![""]);
    }

    #[test]
    fn test_consecutive_escapes() {
        assert_eq!(split_params(r"a\,\,b,c"), vec!["a,,b", "c"]);
    }

    #[test]
    fn test_other_separator() {
        assert_eq!(split_params_by(r"x\;y;z", ';'), vec!["x;y", "z"]);
    }
}
