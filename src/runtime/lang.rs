//! Source scanning for the statement language [MemChain](super::MemChain)
//! interprets. The scanner is deliberately shallow: it recognizes the
//! statement forms by lexical shape and leaves everything else alone, which
//! keeps interpretation a pure function of the source text.

use serde_json::Value;

use crate::common::Address;

/// A script's `return` expression.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum ReturnExpr {
    /// A literal, rendered verbatim (string literals keep their quotes).
    Literal(String),
    /// `height()`: the latest block height.
    Height,
    /// `getStorage(0x.., "key")`: a storage read on an account.
    Storage(Address, String),
}

/// Slice out the balanced argument list whose `(` sits at byte `open`.
/// Respects nesting and double-quoted strings (with escapes).
fn balanced_args(src: &str, open: usize) -> Option<&str> {
    let bytes = src.as_bytes();
    if bytes.get(open) != Some(&b'(') {
        return None
    }
    let mut depth = 0usize;
    let mut in_str = false;
    let mut escaped = false;
    for (i, &b) in bytes.iter().enumerate().skip(open) {
        if in_str {
            if escaped {
                escaped = false
            } else if b == b'\\' {
                escaped = true
            } else if b == b'"' {
                in_str = false
            }
            continue
        }
        match b {
            b'"' => in_str = true,
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&src[open + 1..i])
                }
            }
            _ => {}
        }
    }
    None
}

/// Argument lists of every `name(...)` call site, in source order. A call
/// site requires the preceding byte to not be part of an identifier, so
/// `blog(` never matches `log`.
fn call_sites<'a>(src: &'a str, name: &str) -> Vec<&'a str> {
    let mut out = Vec::new();
    let mut from = 0;
    while let Some(pos) = src[from..].find(name) {
        let at = from + pos;
        from = at + name.len();
        let boundary = at == 0 || {
            let c = src.as_bytes()[at - 1];
            !(c.is_ascii_alphanumeric() || c == b'_')
        };
        if !boundary {
            continue
        }
        if let Some(args) = balanced_args(src, at + name.len()) {
            out.push(args);
        }
    }
    out
}

fn is_ident(token: &str) -> bool {
    let mut chars = token.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Strip surrounding double quotes from a string literal, if present.
fn unquote(expr: &str) -> &str {
    let expr = expr.trim();
    expr.strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(expr)
}

/// Parse a literal into a JSON value: numbers, booleans and quoted strings
/// parse natively; anything else becomes a raw string.
fn literal_value(expr: &str) -> Value {
    let expr = expr.trim();
    serde_json::from_str(expr).unwrap_or_else(|_| Value::String(expr.to_string()))
}

/// Rendered arguments of every `log(...)` call, in emission order. String
/// literals render with their quotes, matching how the runtime echoes them.
pub fn log_lines(src: &str) -> Vec<String> {
    call_sites(src, "log")
        .into_iter()
        .map(|args| args.trim().to_string())
        .collect()
}

/// The message of the first `panic(...)` call, if any. A panicking program
/// fails with a structured error and produces no other effects.
pub fn panic_message(src: &str) -> Option<String> {
    call_sites(src, "panic")
        .into_iter()
        .next()
        .map(|args| unquote(args).to_string())
}

/// Number of `AuthAccount(payer: …)` constructor calls, each of which
/// creates one account.
pub fn account_creations(src: &str) -> usize {
    call_sites(src, "AuthAccount")
        .iter()
        .filter(|args| args.trim_start().starts_with("payer"))
        .count()
}

/// The `contract <Name>` declaration in `src`, if any. Interface
/// declarations do not count as deployable contracts.
pub fn contract_name(src: &str) -> Option<String> {
    let mut tokens = src.split_whitespace().peekable();
    while let Some(token) = tokens.next() {
        if token != "contract" {
            continue
        }
        let next = tokens.peek()?;
        if *next == "interface" {
            tokens.next();
            continue
        }
        let name: String = next
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
            .collect();
        if is_ident(&name) {
            return Some(name)
        }
    }
    None
}

/// Every `signer.save(<literal>, to: /storage/<key>)` statement as a
/// `(key, value)` pair, in source order.
pub fn saves(src: &str) -> Vec<(String, Value)> {
    let mut out = Vec::new();
    let mut from = 0;
    while let Some(pos) = src[from..].find(".save(") {
        let at = from + pos;
        from = at + ".save(".len();
        let args = match balanced_args(src, at + ".save".len()) {
            Some(a) => a,
            None => continue,
        };
        let (value_expr, path) = match args.rsplit_once(", to:") {
            Some(split) => split,
            None => continue,
        };
        let key: String = match path.trim().strip_prefix("/storage/") {
            Some(rest) => rest
                .chars()
                .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
                .collect(),
            None => continue,
        };
        if !key.is_empty() {
            out.push((key, literal_value(value_expr)));
        }
    }
    out
}

/// The first `return` expression of a script body, classified.
pub fn script_return(src: &str) -> Option<ReturnExpr> {
    let mut from = 0;
    let at = loop {
        let pos = src[from..].find("return")?;
        let at = from + pos;
        from = at + "return".len();
        let pre_ok = at == 0 || {
            let c = src.as_bytes()[at - 1];
            !(c.is_ascii_alphanumeric() || c == b'_')
        };
        let post_ok = src[at + "return".len()..]
            .chars()
            .next()
            .map_or(true, |c| c.is_whitespace());
        if pre_ok && post_ok {
            break at
        }
    };
    let rest = &src[at + "return".len()..];
    let end = rest
        .find(|c| c == '\n' || c == '}')
        .unwrap_or(rest.len());
    let expr = rest[..end].trim();
    if expr.is_empty() {
        return None
    }
    if expr.starts_with("height()") {
        return Some(ReturnExpr::Height)
    }
    if let Some(open) = expr.strip_prefix("getStorage") {
        let args = balanced_args(open, 0)?;
        let (addr, key) = args.split_once(',')?;
        let addr: Address = addr.trim().parse().ok()?;
        return Some(ReturnExpr::Storage(addr, unquote(key).to_string()))
    }
    Some(ReturnExpr::Literal(expr.to_string()))
}
