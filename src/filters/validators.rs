//! Validator filters. Each either passes the value through untouched or
//! rejects it with [`FilterError::InvalidContent`].

use fancy_regex::Regex as ExtendedRegex;
use regex::Regex;
use std::sync::LazyLock;

use super::FilterRegistry;
use crate::error::{FilterError, RegistryError};
use crate::value::Value;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]+@[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?)+$")
        .expect("valid email pattern")
});
static USERNAME_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\w+$").expect("valid username pattern"));
static CHINESE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\p{Han}+$").expect("valid han pattern"));
static HAS_CHINESE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\p{Han}").expect("valid han pattern"));

pub(super) fn install(registry: &mut FilterRegistry) -> Result<(), RegistryError> {
    registry
        .register("_required", "Must not be empty", "_required", required)?
        .register("_email", "E-mail address", "_email", |v, _| check(v, |s| EMAIL_RE.is_match(s)))?
        .register("_username", "User name (letters, digits, CJK)", "_username", |v, _| {
            check(v, |s| USERNAME_RE.is_match(s))
        })?
        .register("_singleline", "Single line of text", "_singleline", |v, _| {
            check(v, |s| !s.is_empty() && !s.contains(['\n', '\r']))
        })?
        .register("_mutiline", "Multi-line text", "_mutiline", |v, _| check(v, |s| !s.is_empty()))?
        .register("_url", "URL", "_url", |v, _| check(v, is_url))?
        .register("_chinese", "Only Chinese characters", "_chinese", |v, _| {
            check(v, |s| CHINESE_RE.is_match(s))
        })?
        .register("_haschinese", "Contains Chinese characters", "_haschinese", |v, _| {
            check(v, |s| HAS_CHINESE_RE.is_match(s))
        })?
        .register("_minsize", "Minimum length", "_minsize(5)", |v, p| {
            let min = size_param(p)?;
            check(v, |s| s.chars().count() >= min)
        })?
        .register("_maxsize", "Maximum length", "_maxsize(5)", |v, p| {
            let max = size_param(p)?;
            check(v, |s| s.chars().count() <= max)
        })?
        .register("_size", "Exact length", "_size(5)", |v, p| {
            let size = size_param(p)?;
            check(v, |s| s.chars().count() == size)
        })?
        .register("_alpha", "ASCII letters", "_alpha", |v, _| {
            check(v, |s| s.chars().all(|c| c.is_ascii_alphabetic()))
        })?
        .register("_alphanum", "ASCII letters or digits", "_alphanum", |v, _| {
            check(v, |s| s.chars().all(|c| c.is_ascii_alphanumeric()))
        })?
        .register("_numeric", "ASCII digits", "_numeric", |v, _| {
            check(v, |s| s.chars().all(|c| c.is_ascii_digit()))
        })?
        .register("_match", "Matches a regular expression", "_match([a-z]+)", |v, p| {
            let re = standard(p)?;
            check(v, |s| re.is_match(s))
        })?
        .register("_unmatch", "Does not match a regular expression", "_unmatch([a-z]+)", |v, p| {
            let re = standard(p)?;
            check(v, |s| !re.is_match(s))
        })?
        .register(
            "_match2",
            "Matches a regular expression (backtracking engine, lookaround allowed)",
            "_match2([a-z]+)",
            |v, p| {
                let re = extended(p)?;
                try_check(v, |s| extended_match(&re, s))
            },
        )?
        .register(
            "_unmatch2",
            "Does not match a regular expression (backtracking engine, lookaround allowed)",
            "_unmatch2([a-z]+)",
            |v, p| {
                let re = extended(p)?;
                try_check(v, |s| extended_match(&re, s).map(|m| !m))
            },
        )?;
    Ok(())
}

/// A string must satisfy `pred`; for a string list every element must.
/// Heterogeneous arrays check only their string elements. Other shapes pass.
fn check<P>(value: &Value, pred: P) -> Result<Value, FilterError>
where
    P: Fn(&str) -> bool,
{
    try_check(value, |s| Ok(pred(s)))
}

/// [`check`] with a predicate that can fail; the first error is returned
fn try_check<P>(value: &Value, pred: P) -> Result<Value, FilterError>
where
    P: Fn(&str) -> Result<bool, FilterError>,
{
    let ok = match value {
        Value::String(s) => pred(s)?,
        Value::StringArray(items) => all_pass(items.iter().map(String::as_str), &pred)?,
        Value::Array(items) => all_pass(items.iter().filter_map(Value::as_str), &pred)?,
        _ => true,
    };
    if ok {
        Ok(value.clone())
    } else {
        Err(FilterError::InvalidContent)
    }
}

fn all_pass<'a, P>(items: impl Iterator<Item = &'a str>, pred: &P) -> Result<bool, FilterError>
where
    P: Fn(&str) -> Result<bool, FilterError>,
{
    for s in items {
        if !pred(s)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn required(value: &Value, _params: &str) -> Result<Value, FilterError> {
    let present = match value {
        Value::String(s) => !s.is_empty(),
        Value::StringArray(items) => !items.is_empty() && items.iter().all(|s| !s.is_empty()),
        Value::IntArray(items) => !items.is_empty(),
        Value::FloatArray(items) => !items.is_empty(),
        Value::BoolArray(items) => !items.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Map(map) => !map.is_empty(),
        Value::Json(json) => !json.is_null(),
        Value::Int(_) | Value::Float(_) | Value::Bool(_) => true,
    };
    if present {
        Ok(value.clone())
    } else {
        Err(FilterError::InvalidContent)
    }
}

fn is_url(s: &str) -> bool {
    match url::Url::parse(s) {
        Ok(parsed) => {
            matches!(parsed.scheme(), "http" | "https" | "ftp" | "ftps") && parsed.host_str().is_some_and(|h| !h.is_empty())
        }
        Err(_) => false,
    }
}

fn size_param(params: &str) -> Result<usize, FilterError> {
    params
        .trim()
        .parse()
        .map_err(|_| FilterError::InvalidParams(format!("size `{}` is not a non-negative integer", params)))
}

fn standard(params: &str) -> Result<Regex, FilterError> {
    Regex::new(params).map_err(|e| FilterError::InvalidParams(e.to_string()))
}

fn extended(params: &str) -> Result<ExtendedRegex, FilterError> {
    ExtendedRegex::new(params).map_err(|e| FilterError::InvalidParams(e.to_string()))
}

/// A runtime failure such as the backtrack limit is not a verdict either way
fn extended_match(re: &ExtendedRegex, s: &str) -> Result<bool, FilterError> {
    re.is_match(s)
        .map_err(|e| FilterError::InvalidParams(format!("pattern could not be evaluated: {}", e)))
}
