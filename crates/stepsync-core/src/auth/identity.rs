use std::fmt;

/// Country-code prefix applied to bare phone numbers.
pub const DEFAULT_COUNTRY_PREFIX: &str = "+86";

/// Escalation profile requested from the provider, fixed by the handle format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdentityKind {
    Phone,
    Email,
}

/// Normalized account handle.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity {
    handle: String,
    kind: IdentityKind,
}

impl Identity {
    /// Normalize a raw handle. Returns `None` for an empty handle.
    ///
    /// Handles containing `@` are emails. Anything else is a phone number and
    /// receives [`DEFAULT_COUNTRY_PREFIX`] unless it already starts with `+`.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        if raw.contains('@') {
            return Some(Self {
                handle: raw.to_string(),
                kind: IdentityKind::Email,
            });
        }
        let handle = if raw.starts_with('+') {
            raw.to_string()
        } else {
            format!("{}{}", DEFAULT_COUNTRY_PREFIX, raw)
        };
        Some(Self {
            handle,
            kind: IdentityKind::Phone,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.handle
    }

    pub fn kind(&self) -> IdentityKind {
        self.kind
    }

    pub fn redacted(&self) -> String {
        redact(&self.handle)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.handle)
    }
}

/// Mask the middle of an account handle for logs and reports
pub fn redact(handle: &str) -> String {
    let chars: Vec<char> = handle.chars().collect();
    let len = chars.len();
    if len <= 8 {
        let keep = (len / 3).max(1).min(len);
        let head: String = chars[..keep].iter().collect();
        let tail: String = chars[len - keep..].iter().collect();
        format!("{}***{}", head, tail)
    } else {
        let head: String = chars[..3].iter().collect();
        let tail: String = chars[len - 4..].iter().collect();
        format!("{}****{}", head, tail)
    }
}
