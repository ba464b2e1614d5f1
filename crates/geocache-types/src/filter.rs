use xxhash_rust::xxh3::xxh3_64;

/// An opaque caller-supplied predicate. The engine never interprets it
/// beyond canonicalization for fingerprinting (spec.md §3).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Filter(pub String);

impl Filter {
    pub fn new(raw: impl Into<String>) -> Self {
        Filter(raw.into())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Collapse whitespace runs to a single space and normalize spacing
    /// around punctuation, producing the text that gets fingerprinted and
    /// written into shard key sanitization.
    pub fn canonicalize(&self) -> String {
        let collapsed = self.0.split_whitespace().collect::<Vec<_>>().join(" ");
        let mut out = String::with_capacity(collapsed.len());
        let mut chars = collapsed.chars().peekable();
        while let Some(c) = chars.next() {
            if is_punct(c) {
                while out.ends_with(' ') {
                    out.pop();
                }
                out.push(c);
                if matches!(chars.peek(), Some(next) if !next.is_whitespace()) {
                    out.push(' ');
                }
            } else {
                out.push(c);
            }
        }
        out.trim().to_string()
    }

    pub fn fingerprint(&self) -> FilterFingerprint {
        let canonical = self.canonicalize();
        FilterFingerprint::from_canonical(&canonical)
    }
}

fn is_punct(c: char) -> bool {
    matches!(c, '=' | '>' | '<' | '!' | '(' | ')' | ',' | '\'' | '"' | '-')
}

/// A stable safe-character prefix plus a 64-bit hash of the canonicalized
/// filter text, rendered as 16 lowercase hex characters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterFingerprint {
    pub prefix: String,
    pub hash_hex: String,
}

impl FilterFingerprint {
    fn from_canonical(canonical: &str) -> Self {
        let truncated: String = canonical.chars().take(160).collect();
        let sanitized = sanitize(&truncated);
        let hash = xxh3_64(canonical.as_bytes());
        FilterFingerprint {
            prefix: sanitized,
            hash_hex: format!("{hash:016x}"),
        }
    }
}

/// ASCII whitespace -> `_`; anything outside `[A-Za-z0-9:_\-=]` -> `-`; runs
/// of `_`/`-` collapsed. Used both for the filter fingerprint prefix and the
/// full shard key (spec.md §6).
pub fn sanitize(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if c.is_ascii_whitespace() {
            out.push('_');
        } else if c.is_ascii_alphanumeric() || matches!(c, ':' | '_' | '-' | '=') {
            out.push(c);
        } else {
            out.push('-');
        }
    }
    collapse_runs(&out)
}

fn collapse_runs(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev: Option<char> = None;
    for c in s.chars() {
        if (c == '_' || c == '-') && prev == Some(c) {
            continue;
        }
        out.push(c);
        prev = Some(c);
    }
    out
}
