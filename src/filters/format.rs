//! Templating filters: printf-style formatting, paging, timestamps, quoting

use super::{map_text, split_params, FilterRegistry};
use crate::error::{FilterError, RegistryError};
use crate::value::Value;

pub(super) fn install(registry: &mut FilterRegistry) -> Result<(), RegistryError> {
    registry
        .register("sprintf", "Format the value into a template", "sprintf(%s)", sprintf)?
        .register(
            "sprintfmap",
            "Format map values into a template; the value must be a map and the remaining params name its keys",
            "sprintfmap(%v-%v,a,b)",
            sprintfmap,
        )?
        .register("unixtime", "UNIX timestamp (seconds)", "unixtime", unixtime)?
        .register("unixmill", "UNIX timestamp (milliseconds)", "unixmill", unixmill)?
        .register(
            "paging",
            "Expand a template over a page range; params are start page, end page and an optional step",
            "paging(1,10,1)",
            paging,
        )?
        .register("quote", "Wrap in double quotes, escaping as needed", "quote", quote)?
        .register("unquote", "Remove surrounding double quotes and decode escapes", "unquote", unquote)?;
    Ok(())
}

/// Printf-style expansion. `None` arguments render as `<nil>`; verbs past
/// the end of `args` render as `%!v(MISSING)`.
fn format_template(template: &str, args: &[Option<&Value>]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    let mut next_arg = args.iter();

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        if chars.peek() == Some(&'%') {
            chars.next();
            out.push('%');
            continue;
        }

        let mut left_align = false;
        let mut zero_pad = false;
        while let Some(&flag) = chars.peek() {
            match flag {
                '-' => left_align = true,
                '0' => zero_pad = true,
                '+' | ' ' | '#' => {}
                _ => break,
            }
            chars.next();
        }
        let width = take_number(&mut chars);
        let precision = if chars.peek() == Some(&'.') {
            chars.next();
            Some(take_number(&mut chars).unwrap_or(0))
        } else {
            None
        };

        let Some(verb) = chars.next() else {
            out.push_str("%!(NOVERB)");
            break;
        };

        let rendered = match next_arg.next() {
            Some(Some(value)) => render_verb(verb, value, precision),
            Some(None) => "<nil>".to_string(),
            None => {
                out.push_str(&format!("%!{}(MISSING)", verb));
                continue;
            }
        };
        out.push_str(&pad(rendered, width, left_align, zero_pad));
    }

    out
}

fn take_number(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> Option<usize> {
    let mut digits = String::new();
    while let Some(&d) = chars.peek() {
        if !d.is_ascii_digit() {
            break;
        }
        digits.push(d);
        chars.next();
    }
    digits.parse().ok()
}

fn render_verb(verb: char, value: &Value, precision: Option<usize>) -> String {
    let number = match value {
        Value::Int(n) => Some(*n as f64),
        Value::Float(f) => Some(*f),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match (verb, number) {
        ('f' | 'F', Some(f)) => format!("{:.*}", precision.unwrap_or(6), f),
        ('d', Some(f)) if matches!(value, Value::Float(_)) => (f.trunc() as i64).to_string(),
        ('q', _) => quote_str(&value.to_text()),
        _ => value.to_text(),
    }
}

fn pad(text: String, width: Option<usize>, left_align: bool, zero_pad: bool) -> String {
    let len = text.chars().count();
    match width {
        Some(width) if width > len => {
            let fill = width - len;
            if left_align {
                format!("{}{}", text, " ".repeat(fill))
            } else if zero_pad {
                format!("{}{}", "0".repeat(fill), text)
            } else {
                format!("{}{}", " ".repeat(fill), text)
            }
        }
        _ => text,
    }
}

fn sprintf(value: &Value, params: &str) -> Result<Value, FilterError> {
    match value {
        Value::String(s) => Ok(Value::String(format_template(params, &[Some(&Value::from(s.as_str()))]))),
        Value::StringArray(items) => Ok(Value::StringArray(
            items
                .iter()
                .map(|s| {
                    if s.is_empty() {
                        s.clone()
                    } else {
                        format_template(params, &[Some(&Value::from(s.as_str()))])
                    }
                })
                .collect(),
        )),
        other => Ok(Value::String(format_template(params, &[Some(other)]))),
    }
}

fn sprintfmap(value: &Value, params: &str) -> Result<Value, FilterError> {
    let map = value
        .as_map()
        .ok_or_else(|| FilterError::Unsupported(format!("sprintfmap needs a map, got {}", value.kind())))?;
    let args = split_params(params);
    if args.len() <= 1 {
        return Err(FilterError::InvalidParams("sprintfmap needs a template and at least one key".to_string()));
    }

    let values: Vec<Option<&Value>> = args[1..].iter().map(|key| map.get(key)).collect();
    Ok(Value::String(format_template(&args[0], &values)))
}

fn unixtime(_value: &Value, _params: &str) -> Result<Value, FilterError> {
    Ok(Value::Int(chrono::Utc::now().timestamp()))
}

fn unixmill(_value: &Value, _params: &str) -> Result<Value, FilterError> {
    Ok(Value::Int(chrono::Utc::now().timestamp_millis()))
}

/// Most pages a single `paging` call may produce
const MAX_PAGES: i64 = 10_000;

struct PageRange {
    start: i64,
    end: i64,
    step: Option<i64>,
}

impl PageRange {
    fn parse(params: &str) -> Result<Self, FilterError> {
        let parts: Vec<&str> = params.split(',').collect();
        if parts.len() < 2 {
            return Err(FilterError::InvalidParams("paging needs a start and an end".to_string()));
        }
        let int = |raw: &str| {
            raw.trim()
                .parse::<i64>()
                .map_err(|_| FilterError::InvalidParams(format!("paging param `{}` is not an integer", raw)))
        };
        let step = match parts.get(2) {
            Some(raw) => {
                let step = int(raw)?;
                if step < 1 {
                    return Err(FilterError::InvalidParams("paging step must be at least 1".to_string()));
                }
                Some(step)
            }
            None => None,
        };
        let (start, end) = (int(parts[0])?, int(parts[1])?);
        let pages = end.checked_sub(start).and_then(|n| n.checked_add(1));
        if !pages.is_some_and(|n| n <= MAX_PAGES) {
            return Err(FilterError::InvalidParams(format!(
                "paging({},{}) spans more than {} pages",
                start, end, MAX_PAGES
            )));
        }
        Ok(Self { start, end, step })
    }

    fn fill(&self, template: &str, page: i64) -> Result<String, FilterError> {
        let overflow = || FilterError::InvalidParams(format!("paging offset for page {} overflows", page));
        Ok(match self.step {
            Some(step) => {
                let from = page.checked_mul(step).ok_or_else(overflow)?;
                let to = page
                    .checked_add(1)
                    .and_then(|next| next.checked_mul(step))
                    .ok_or_else(overflow)?;
                template
                    .replace("{0}", &from.to_string())
                    .replace("{1}", &to.to_string())
            }
            None => template.replace("{0}", &page.to_string()),
        })
    }
}

fn paging(value: &Value, params: &str) -> Result<Value, FilterError> {
    let range = PageRange::parse(params)?;
    let mut pages = Vec::new();

    match value {
        Value::String(template) => {
            for page in range.start..=range.end {
                pages.push(range.fill(template, page)?);
            }
        }
        Value::Array(items) => {
            let templates: Vec<&str> = items
                .iter()
                .map(|item| {
                    item.as_str()
                        .ok_or_else(|| FilterError::Unsupported(format!("paging template is {}", item.kind())))
                })
                .collect::<Result<_, _>>()?;
            for page in range.start..=range.end {
                for template in &templates {
                    pages.push(range.fill(template, page)?);
                }
            }
        }
        // The page number picks the template, once per template in the list.
        Value::StringArray(items) => {
            for page in range.start..=range.end {
                for _ in 0..items.len() {
                    let template = usize::try_from(page)
                        .ok()
                        .and_then(|index| items.get(index))
                        .ok_or_else(|| {
                            FilterError::InvalidParams(format!(
                                "page {} has no template in a list of {}",
                                page,
                                items.len()
                            ))
                        })?;
                    pages.push(range.fill(template, page)?);
                }
            }
        }
        other => {
            return Err(FilterError::Unsupported(format!(
                "paging needs a string or list, got {}",
                other.kind()
            )))
        }
    }

    Ok(Value::StringArray(pages))
}

/// Double-quoted literal with backslash escapes for quotes, backslashes and
/// non-printable characters
pub fn quote_str(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\u{07}' => out.push_str("\\a"),
            '\u{08}' => out.push_str("\\b"),
            '\u{0c}' => out.push_str("\\f"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{0b}' => out.push_str("\\v"),
            c if (c as u32) < 0x20 || c == '\u{7f}' => out.push_str(&format!("\\x{:02x}", c as u32)),
            c if c.is_control() && (c as u32) <= 0xFFFF => out.push_str(&format!("\\u{:04x}", c as u32)),
            c if c.is_control() => out.push_str(&format!("\\U{:08x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Inverse of [`quote_str`]. One pair of surrounding double quotes is
/// stripped when present; an unescaped quote inside the text is an error.
pub fn unquote_str(s: &str) -> Result<String, FilterError> {
    let inner = if s.len() >= 2 && s.starts_with('"') && s.ends_with('"') {
        &s[1..s.len() - 1]
    } else {
        s
    };

    let bad = |what: &str| FilterError::Conversion(format!("cannot unquote `{}`: {}", s, what));
    let mut bytes: Vec<u8> = Vec::with_capacity(inner.len());
    let mut chars = inner.chars();

    while let Some(c) = chars.next() {
        match c {
            '"' => return Err(bad("unescaped quote")),
            '\\' => {
                let escape = chars.next().ok_or_else(|| bad("trailing backslash"))?;
                let simple = match escape {
                    'n' => Some(b'\n'),
                    'r' => Some(b'\r'),
                    't' => Some(b'\t'),
                    'a' => Some(0x07),
                    'b' => Some(0x08),
                    'f' => Some(0x0c),
                    'v' => Some(0x0b),
                    '\\' => Some(b'\\'),
                    '"' => Some(b'"'),
                    '\'' => Some(b'\''),
                    _ => None,
                };
                if let Some(byte) = simple {
                    bytes.push(byte);
                    continue;
                }

                match escape {
                    'x' => {
                        let code = read_digits(&mut chars, 2, 16).ok_or_else(|| bad("bad \\x escape"))?;
                        bytes.push(code as u8);
                    }
                    'u' | 'U' => {
                        let len = if escape == 'u' { 4 } else { 8 };
                        let code = read_digits(&mut chars, len, 16).ok_or_else(|| bad("bad unicode escape"))?;
                        let ch = char::from_u32(code).ok_or_else(|| bad("invalid code point"))?;
                        let mut buf = [0u8; 4];
                        bytes.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
                    }
                    '0'..='7' => {
                        let rest = read_digits(&mut chars, 2, 8).ok_or_else(|| bad("bad octal escape"))?;
                        let code = escape.to_digit(8).unwrap_or(0) * 64 + rest;
                        if code > 0xFF {
                            return Err(bad("octal escape out of range"));
                        }
                        bytes.push(code as u8);
                    }
                    other => return Err(bad(&format!("unknown escape \\{}", other))),
                }
            }
            c => {
                let mut buf = [0u8; 4];
                bytes.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            }
        }
    }

    String::from_utf8(bytes).map_err(|_| bad("escapes do not form valid UTF-8"))
}

fn read_digits(chars: &mut std::str::Chars<'_>, count: usize, radix: u32) -> Option<u32> {
    let mut code = 0u32;
    for _ in 0..count {
        code = code * radix + chars.next()?.to_digit(radix)?;
    }
    Some(code)
}

fn quote(value: &Value, _params: &str) -> Result<Value, FilterError> {
    map_text(value, |s| Ok(quote_str(s)))
}

fn unquote(value: &Value, _params: &str) -> Result<Value, FilterError> {
    map_text(value, unquote_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn s(text: &str) -> Value {
        Value::from(text)
    }

    fn list(items: &[&str]) -> Value {
        Value::StringArray(items.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn test_sprintf() {
        assert_eq!(sprintf(&s("a"), "<%s>").unwrap(), s("<a>"));
        assert_eq!(sprintf(&s("7"), "100%% %03d").unwrap(), s("100% 007"));
        assert_eq!(sprintf(&list(&["a", ""]), "[%v]").unwrap(), list(&["[a]", ""]));
        assert_eq!(sprintf(&Value::Float(1.5), "%.2f").unwrap(), s("1.50"));
        assert_eq!(sprintf(&s("a"), "%s-%s").unwrap(), s("a-%!s(MISSING)"));
    }

    #[test]
    fn test_sprintfmap() {
        let mut map = HashMap::new();
        map.insert("a".to_string(), Value::Int(1));
        map.insert("b".to_string(), Value::from("two"));
        let value = Value::Map(map);

        assert_eq!(sprintfmap(&value, "%v-%v,a,b").unwrap(), s("1-two"));
        assert_eq!(sprintfmap(&value, "%v/%v,a,zzz").unwrap(), s("1/<nil>"));
        assert!(sprintfmap(&value, "%v").is_err());
        assert!(sprintfmap(&s("x"), "%v,a").is_err());
    }

    #[test]
    fn test_timestamps() {
        let Value::Int(secs) = unixtime(&s(""), "").unwrap() else {
            panic!("unixtime is not an int");
        };
        let Value::Int(millis) = unixmill(&s(""), "").unwrap() else {
            panic!("unixmill is not an int");
        };
        assert!(secs > 1_600_000_000);
        assert!(millis / 1000 >= secs);
    }

    #[test]
    fn test_paging_string() {
        assert_eq!(
            paging(&s("page={0}"), "1,3").unwrap(),
            list(&["page=1", "page=2", "page=3"])
        );
        assert_eq!(
            paging(&s("o={0}&l={1}"), "0,1,10").unwrap(),
            list(&["o=0&l=10", "o=10&l=20"])
        );
        assert!(paging(&s("x"), "1,3,0").is_err());
        assert!(paging(&Value::Int(1), "1,3").is_err());
        assert_eq!(paging(&s("x"), "3,1").unwrap(), list(&[]));
    }

    #[test]
    fn test_paging_bounds() {
        assert!(matches!(
            paging(&s("p={0}&q={1}"), "1,1,9223372036854775807"),
            Err(FilterError::InvalidParams(_))
        ));
        assert!(matches!(
            paging(&s("p={0}"), "-9223372036854775808,9223372036854775807"),
            Err(FilterError::InvalidParams(_))
        ));
        assert!(matches!(paging(&s("p={0}"), "0,100000"), Err(FilterError::InvalidParams(_))));
        assert_eq!(
            paging(&s("p={0}"), "9223372036854775806,9223372036854775807").unwrap(),
            list(&["p=9223372036854775806", "p=9223372036854775807"])
        );
    }

    #[test]
    fn test_paging_template_lists() {
        let mixed = Value::Array(vec![s("a{0}"), s("b{0}")]);
        assert_eq!(paging(&mixed, "1,2").unwrap(), list(&["a1", "b1", "a2", "b2"]));

        // a string list is indexed by page number
        assert_eq!(paging(&list(&["a{0}", "b{0}"]), "0,1").unwrap(), list(&["a0", "a0", "b1", "b1"]));
        assert!(paging(&list(&["a{0}", "b{0}"]), "1,2").is_err());
    }

    #[test]
    fn test_quote_unquote_round_trip() {
        for text in ["plain", "tab\there", "line\nbreak", "中文 ok", "say \"hi\"", r"back\slash", "\u{1}"] {
            let quoted = quote_str(text);
            assert_eq!(unquote_str(&quoted).unwrap(), text, "round trip of {:?}", quoted);
        }
        assert_eq!(quote_str("a\"b"), r#""a\"b""#);
    }

    #[test]
    fn test_unquote_escapes() {
        assert_eq!(unquote_str(r"中\x41\101").unwrap(), "中AA");
        assert_eq!(unquote_str(r#"{\"a\":1}"#).unwrap(), r#"{"a":1}"#);
        assert!(unquote_str(r#"a"b"#).is_err());
        assert!(unquote_str(r"a\").is_err());
        assert!(unquote_str(r"\q").is_err());
    }
}
