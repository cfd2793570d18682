//! SQL identifier and parameter-name validation.
//!
//! Identifiers (table and column names) accept dotted notation for
//! schema-qualified tables. Each part is validated against
//! `[A-Za-z_][A-Za-z0-9_$]*` and is always quoted when rendered, so the
//! stored spelling is the exact spelling that reaches the database.
//!
//! # Example
//! ```ignore
//! use sqlplan::Ident;
//!
//! let t = Ident::parse("public.users")?;
//! assert_eq!(t.to_sql('"'), r#""public"."users""#);
//! # Ok::<(), sqlplan::CatalogError>(())
//! ```

use crate::catalog::CatalogError;

/// A validated, possibly schema-qualified SQL identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Ident {
    parts: Vec<String>,
}

fn invalid(name: &str, reason: impl Into<String>) -> CatalogError {
    CatalogError::InvalidIdentifier {
        name: name.to_string(),
        reason: reason.into(),
    }
}

fn check_part(full: &str, part: &str) -> Result<(), CatalogError> {
    let mut chars = part.chars();
    match chars.next() {
        None => return Err(invalid(full, "empty identifier segment")),
        Some(c) if c == '_' || c.is_ascii_alphabetic() => {}
        Some(c) => return Err(invalid(full, format!("invalid start character '{c}'"))),
    }
    for c in chars {
        if !(c == '_' || c == '$' || c.is_ascii_alphanumeric()) {
            return Err(invalid(full, format!("invalid character '{c}'")));
        }
    }
    Ok(())
}

impl Ident {
    /// Parse `name` or `schema.name`.
    pub fn parse(s: &str) -> Result<Self, CatalogError> {
        if s.is_empty() {
            return Err(invalid(s, "identifier cannot be empty"));
        }
        let parts: Vec<String> = s.split('.').map(str::to_string).collect();
        for part in &parts {
            check_part(s, part)?;
        }
        Ok(Self { parts })
    }

    /// Last segment (the bare table or column name).
    pub fn name(&self) -> &str {
        self.parts.last().map(String::as_str).unwrap_or_default()
    }

    /// Dotted source spelling, unquoted.
    pub fn as_dotted(&self) -> String {
        self.parts.join(".")
    }

    /// Render with every part wrapped in `quote`.
    pub fn to_sql(&self, quote: char) -> String {
        let mut out = String::with_capacity(self.parts.iter().map(|p| p.len() + 3).sum());
        self.write_sql(&mut out, quote);
        out
    }

    pub(crate) fn write_sql(&self, out: &mut String, quote: char) {
        for (i, part) in self.parts.iter().enumerate() {
            if i > 0 {
                out.push('.');
            }
            write_quoted(out, part, quote);
        }
    }
}

/// Append `name` wrapped in `quote`, doubling any embedded quote character.
pub(crate) fn write_quoted(out: &mut String, name: &str, quote: char) {
    out.push(quote);
    for ch in name.chars() {
        if ch == quote {
            out.push(quote);
        }
        out.push(ch);
    }
    out.push(quote);
}

/// Whether `s` is usable as a `:name` placeholder.
///
/// Placeholder names are plain ASCII words: `[A-Za-z_][A-Za-z0-9_]*`.
pub fn is_param_name(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c == '_' || c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}
