//! String transforms: affixes, replacement, splitting, trimming, conversion

use fancy_regex::{Expander, Regex as ExtendedRegex};
use std::sync::LazyLock;

use super::{map_text, split_params, string_items, FilterRegistry};
use crate::error::{FilterError, RegistryError};
use crate::value::Value;

static HREF_RE: LazyLock<ExtendedRegex> = LazyLock::new(|| {
    ExtendedRegex::new(r#"(?i)href(?:\s*)=(?:\s*)(['"]?)([^'" ]*)\1"#).expect("valid href pattern")
});

pub(super) fn install(registry: &mut FilterRegistry) -> Result<(), RegistryError> {
    registry
        .register("preadd", "Add a prefix", "preadd(prefix)", preadd)?
        .register("postadd", "Add a suffix", "postadd(suffix)", postadd)?
        .register("replace", "Replace literal text", "replace(find,replace,count)", replace)?
        .register("split", "Split a string into a list on a separator", "split(-)", split)?
        .register("join", "Join a list into a string, dropping empty items", "join(-)", join)?
        .register("trim", "Strip the given characters from both ends", "trim(;)", trim)?
        .register("trimspace", "Strip surrounding whitespace", "trimspace", trimspace)?
        .register(
            "substr",
            "Character slice from start (inclusive) to end (exclusive)",
            "substr(0,5)",
            substr,
        )?
        .register("intval", "Convert to an integer", "intval", intval)?
        .register("floatval", "Convert to a decimal", "floatval", floatval)?
        .register(
            "hrefreplace",
            "Rewrite href attributes; $2 is the captured href value",
            r#"hrefreplace(data-url="$2")"#,
            hrefreplace,
        )?
        .register(
            "regexpreplace",
            "Regular expression replace (backtracking engine)",
            "regexpreplace(^A$,B,start,count)",
            regexpreplace,
        )?
        .register("wraphtml", "Wrap the value in an HTML tag", "wraphtml(a)", wraphtml)?
        .register(
            "tosbc",
            "Convert full-width punctuation and letters to half-width",
            "tosbc",
            tosbc,
        )?
        .register("unescape", "Decode HTML entities", "unescape", unescape)?
        .register("escape", "Encode HTML special characters", "escape", escape)?;
    Ok(())
}

fn preadd(value: &Value, params: &str) -> Result<Value, FilterError> {
    map_text(value, |s| Ok(format!("{}{}", params, s)))
}

fn postadd(value: &Value, params: &str) -> Result<Value, FilterError> {
    map_text(value, |s| Ok(format!("{}{}", s, params)))
}

fn parse_int(raw: &str, what: &str) -> Result<i64, FilterError> {
    raw.trim()
        .parse::<i64>()
        .map_err(|_| FilterError::InvalidParams(format!("{} must be an integer, got `{}`", what, raw)))
}

fn replace(value: &Value, params: &str) -> Result<Value, FilterError> {
    let args = split_params(params);
    let (find, with, count) = match args.as_slice() {
        [find] => (find.as_str(), "", -1),
        [find, with] => (find.as_str(), with.as_str(), -1),
        [find, with, count] => (find.as_str(), with.as_str(), parse_int(count, "count")?),
        _ => return Err(FilterError::InvalidParams(format!("replace takes 1-3 params: {}", params))),
    };

    map_text(value, |s| {
        Ok(if count < 0 {
            s.replace(find, with)
        } else {
            s.replacen(find, with, count as usize)
        })
    })
}

fn split_one(s: &str, separator: &str) -> Vec<String> {
    let s = s.trim();
    if s.is_empty() {
        return vec![];
    }
    if separator.is_empty() {
        return s.chars().map(String::from).collect();
    }
    s.split(separator).map(String::from).collect()
}

fn split(value: &Value, params: &str) -> Result<Value, FilterError> {
    match value {
        Value::String(s) => Ok(Value::StringArray(split_one(s, params))),
        Value::StringArray(items) => Ok(Value::Array(
            items
                .iter()
                .map(|s| Value::StringArray(split_one(s, params)))
                .collect(),
        )),
        other => Ok(other.clone()),
    }
}

fn join(value: &Value, params: &str) -> Result<Value, FilterError> {
    match string_items(value) {
        Some(items) => {
            let kept: Vec<&str> = items.into_iter().filter(|s| !s.is_empty()).collect();
            Ok(Value::String(kept.join(params)))
        }
        None => Ok(value.clone()),
    }
}

fn trim(value: &Value, params: &str) -> Result<Value, FilterError> {
    map_text(value, |s| Ok(s.trim_matches(|c: char| params.contains(c)).to_string()))
}

fn trimspace(value: &Value, _params: &str) -> Result<Value, FilterError> {
    map_text(value, |s| Ok(s.trim().to_string()))
}

fn substr_one(s: &str, start: usize, end: Option<usize>) -> Result<String, FilterError> {
    let len = s.chars().count();
    let end = end.unwrap_or(len);
    if start > end || end > len {
        return Err(FilterError::InvalidParams(format!(
            "substr({},{}) out of range for length {}",
            start, end, len
        )));
    }
    Ok(s.chars().skip(start).take(end - start).collect())
}

fn substr(value: &Value, params: &str) -> Result<Value, FilterError> {
    let index = |raw: &str| {
        raw.trim()
            .parse::<usize>()
            .map_err(|_| FilterError::InvalidParams(format!("substr index `{}`", raw)))
    };
    let parts: Vec<&str> = params.split(',').collect();
    let (start, end) = match parts.as_slice() {
        [start] => (index(start)?, None),
        [start, end] => (index(start)?, Some(index(end)?)),
        _ => return Ok(value.clone()),
    };
    map_text(value, |s| substr_one(s, start, end))
}

fn intval(value: &Value, _params: &str) -> Result<Value, FilterError> {
    match value {
        Value::String(s) => s
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|_| FilterError::Conversion(format!("`{}` is not an integer", s))),
        Value::StringArray(items) => Ok(Value::IntArray(
            items.iter().map(|s| s.parse::<i64>().unwrap_or(0)).collect(),
        )),
        other => Ok(other.clone()),
    }
}

fn floatval(value: &Value, _params: &str) -> Result<Value, FilterError> {
    match value {
        Value::String(s) => s
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|_| FilterError::Conversion(format!("`{}` is not a number", s))),
        Value::StringArray(items) => Ok(Value::FloatArray(
            items.iter().map(|s| s.parse::<f64>().unwrap_or(0.0)).collect(),
        )),
        other => Ok(other.clone()),
    }
}

fn hrefreplace(value: &Value, params: &str) -> Result<Value, FilterError> {
    map_text(value, |s| {
        HREF_RE
            .try_replacen(s, 0, params)
            .map(|out| out.into_owned())
            .map_err(|e| FilterError::InvalidParams(e.to_string()))
    })
}

fn regexpreplace(value: &Value, params: &str) -> Result<Value, FilterError> {
    let args = split_params(params);
    let expr = args.first().map(String::as_str).unwrap_or_default();
    let repl = args.get(1).map(String::as_str).unwrap_or_default();
    let start = match args.get(2) {
        Some(raw) => parse_int(raw, "start")?.max(0) as usize,
        None => 0,
    };
    let count = match args.get(3) {
        Some(raw) => parse_int(raw, "count")?,
        None => -1,
    };

    let re = ExtendedRegex::new(expr).map_err(|e| FilterError::InvalidParams(e.to_string()))?;
    if count == 0 {
        return Ok(value.clone());
    }
    let limit = usize::try_from(count).ok();

    map_text(value, |s| {
        let from = s.char_indices().nth(start).map_or(s.len(), |(i, _)| i);
        replace_from(&re, s, repl, from, limit)
    })
}

/// Replaces up to `limit` matches that begin at or after byte `from`. The
/// pattern still sees the text before `from`, for lookbehind and anchors.
fn replace_from(
    re: &ExtendedRegex,
    s: &str,
    repl: &str,
    from: usize,
    limit: Option<usize>,
) -> Result<String, FilterError> {
    let expander = Expander::default();
    let mut out = String::with_capacity(s.len());
    let mut copied = 0;
    let mut pos = from;
    let mut replaced = 0;

    while limit.map_or(true, |limit| replaced < limit) {
        let Some(caps) = re
            .captures_from_pos(s, pos)
            .map_err(|e| FilterError::InvalidParams(e.to_string()))?
        else {
            break;
        };
        let Some(whole) = caps.get(0) else {
            break;
        };
        out.push_str(&s[copied..whole.start()]);
        expander.append_expansion(&mut out, repl, &caps);
        copied = whole.end();
        replaced += 1;

        pos = if whole.start() == whole.end() {
            match s[whole.end()..].chars().next() {
                Some(c) => whole.end() + c.len_utf8(),
                None => break,
            }
        } else {
            whole.end()
        };
    }

    out.push_str(&s[copied..]);
    Ok(out)
}

fn wraphtml(value: &Value, params: &str) -> Result<Value, FilterError> {
    if params.is_empty() {
        return Err(FilterError::InvalidParams("wraphtml needs a tag name".to_string()));
    }
    map_text(value, |s| Ok(format!("<{0}>{1}</{0}>", params, s)))
}

fn to_half_width(s: &str) -> String {
    s.chars()
        .map(|c| match c as u32 {
            0x3000 => ' ',
            code @ 0xFF01..=0xFF5E => char::from_u32(code - 0xFEE0).unwrap_or(c),
            _ => c,
        })
        .collect()
}

fn tosbc(value: &Value, _params: &str) -> Result<Value, FilterError> {
    map_text(value, |s| Ok(to_half_width(s)))
}

fn unescape(value: &Value, _params: &str) -> Result<Value, FilterError> {
    map_text(value, |s| Ok(html_escape::decode_html_entities(s).into_owned()))
}

fn escape(value: &Value, _params: &str) -> Result<Value, FilterError> {
    map_text(value, |s| Ok(html_escape::encode_quoted_attribute(s).into_owned()))
}
