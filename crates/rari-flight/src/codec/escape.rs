pub const DEFERRED_PREFIX: &str = "$@";
pub const SYMBOL_PREFIX: &str = "$S";
pub const TUPLE_MARKER: &str = "$P";

/// What a `$`-prefixed wire string stands for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireString<'a> {
    Plain(&'a str),
    Escaped(&'a str),
    Deferred(u32),
    Symbol(&'a str),
}

/// Doubles a leading `$` so user strings never collide with references.
pub fn escape_string(value: &str) -> String {
    if value.starts_with('$') { format!("${value}") } else { value.to_string() }
}

pub fn deferred_ref(id: u32) -> String {
    format!("{DEFERRED_PREFIX}{id}")
}

pub fn symbol_ref(name: &str) -> String {
    format!("{SYMBOL_PREFIX}{name}")
}

/// Classifies a raw wire string. Unknown `$` forms yield `None`.
pub fn parse_string(value: &str) -> Option<WireString<'_>> {
    if !value.starts_with('$') {
        return Some(WireString::Plain(value));
    }
    if let Some(unescaped) = value.strip_prefix('$')
        && unescaped.starts_with('$')
    {
        return Some(WireString::Escaped(unescaped));
    }
    if let Some(id) = value.strip_prefix(DEFERRED_PREFIX) {
        return id.parse::<u32>().ok().map(WireString::Deferred);
    }
    if let Some(name) = value.strip_prefix(SYMBOL_PREFIX)
        && !name.is_empty()
    {
        return Some(WireString::Symbol(name));
    }
    None
}
