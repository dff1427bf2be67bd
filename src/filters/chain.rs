//! Tokenizing and running `name(params)|name|...` chains

use regex::Regex;
use std::sync::LazyLock;

use super::FilterRegistry;
use crate::error::FilterError;
use crate::value::Value;

// Parameters run lazily up to the first `)` that is followed by `|` or the
// end, so `split(|)` and `replace(()` tokenize as one call each.
static CALL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([a-zA-Z0-9\-_]+)(?:\(([\w\W]*?)\))?(\||$)").expect("valid filter call pattern")
});

/// One `name(params)` element of a chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterCall {
    pub name: String,
    /// Raw text between the parentheses, empty when absent
    pub params: String,
}

/// A validator rejected the value. The chain stopped at `filter`; `value`
/// is what the validator saw.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentRejected {
    pub filter: String,
    pub value: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterChain {
    calls: Vec<FilterCall>,
}

impl FilterChain {
    pub fn parse(expr: &str) -> Self {
        let calls = CALL_RE
            .captures_iter(expr)
            .filter_map(|caps| {
                let name = caps.get(1)?.as_str().to_string();
                let params = caps.get(2).map(|m| m.as_str().to_string()).unwrap_or_default();
                Some(FilterCall { name, params })
            })
            .collect();
        Self { calls }
    }

    pub fn calls(&self) -> &[FilterCall] {
        &self.calls
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Runs every call in order. Failing calls are skipped; only a
    /// validator rejection ends the chain early.
    pub fn apply(&self, registry: &FilterRegistry, value: Value) -> Result<Value, ContentRejected> {
        let mut current = value;

        for call in &self.calls {
            match registry.apply(&call.name, &current, &call.params) {
                Ok(next) => current = next,
                Err(FilterError::InvalidContent) => {
                    tracing::debug!(filter = %call.name, "value rejected, chain stopped");
                    return Err(ContentRejected {
                        filter: call.name.clone(),
                        value: current,
                    });
                }
                Err(e) => {
                    tracing::debug!(filter = %call.name, error = %e, "filter failed, keeping previous value");
                }
            }
        }

        Ok(current)
    }
}

impl FilterRegistry {
    /// Parses and applies a chain expression in one step
    pub fn apply_chain(&self, value: Value, expr: &str) -> Result<Value, ContentRejected> {
        if expr.is_empty() {
            return Ok(value);
        }
        FilterChain::parse(expr).apply(self, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> FilterRegistry {
        FilterRegistry::builtin().unwrap()
    }

    fn names(expr: &str) -> Vec<(String, String)> {
        FilterChain::parse(expr)
            .calls()
            .iter()
            .map(|c| (c.name.clone(), c.params.clone()))
            .collect()
    }

    #[test]
    fn test_tokenize() {
        assert_eq!(
            names("trimspace|replace((豆瓣))|trim( )"),
            vec![
                ("trimspace".to_string(), "".to_string()),
                ("replace".to_string(), "(豆瓣)".to_string()),
                ("trim".to_string(), " ".to_string()),
            ]
        );
    }

    #[test]
    fn test_tokenize_parens_and_pipes_in_params() {
        assert_eq!(
            names("replace(()|replace())|intval"),
            vec![
                ("replace".to_string(), "(".to_string()),
                ("replace".to_string(), ")".to_string()),
                ("intval".to_string(), "".to_string()),
            ]
        );
        assert_eq!(
            names("preadd(AAAA)|split(|)|join(,)"),
            vec![
                ("preadd".to_string(), "AAAA".to_string()),
                ("split".to_string(), "|".to_string()),
                ("join".to_string(), ",".to_string()),
            ]
        );
    }

    #[test]
    fn test_validator_aborts_chain() {
        let err = registry()
            .apply_chain(Value::from(""), "_required|postadd(x)")
            .unwrap_err();
        assert_eq!(err.filter, "_required");
        assert_eq!(err.value, Value::from(""));
    }

    #[test]
    fn test_failing_filter_is_skipped() {
        let out = registry().apply_chain(Value::from("abc"), "intval|postadd(z)").unwrap();
        assert_eq!(out, Value::from("abcz"));
    }

    #[test]
    fn test_unknown_filter_is_skipped() {
        let out = registry().apply_chain(Value::from("a"), "nosuchfilter|postadd(b)").unwrap();
        assert_eq!(out, Value::from("ab"));
    }

    #[test]
    fn test_trimspace_idempotent() {
        let registry = registry();
        for input in ["  a b  ", "\n\tx\n", "", "   ", "plain"] {
            let once = registry.apply_chain(Value::from(input), "trimspace").unwrap();
            let twice = registry.apply_chain(Value::from(input), "trimspace|trimspace").unwrap();
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn test_split_join_chain() {
        let out = registry()
            .apply_chain(Value::from("美团他|女神||"), "preadd(AAAA)|split(|)|join(,)")
            .unwrap();
        assert_eq!(out, Value::from("AAAA美团他,女神"));
    }
}
