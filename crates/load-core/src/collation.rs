//! Collation-aware value comparison.
//!
//! Two engines can disagree on whether `'dave'` equals `'Dave '`. When diffing a
//! source row against a destination row the destination's collation governs: source
//! text is normalised into the destination's rules before comparing.

use crate::dialect::Engine;
use crate::values::UniversalValue;
use rust_decimal::Decimal;

/// The comparison rules of one collation that matter for diffing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Collation {
    /// `'a' <> 'A'`
    pub case_sensitive: bool,
    /// `'a' = 'a  '` (trailing spaces ignored)
    pub pad_spaces: bool,
}

impl Collation {
    /// Exact comparison: case sensitive, trailing spaces significant.
    pub const BINARY: Collation = Collation {
        case_sensitive: true,
        pad_spaces: false,
    };

    /// Engine default when the catalogue reports no collation.
    pub fn engine_default(engine: Engine) -> Self {
        match engine {
            Engine::MicrosoftSqlServer => Collation {
                case_sensitive: false,
                pad_spaces: true,
            },
            Engine::MySql => Collation {
                case_sensitive: false,
                pad_spaces: false,
            },
            Engine::PostgreSql | Engine::Oracle => Collation::BINARY,
        }
    }

    /// Interpret a catalogue collation name for `engine`.
    pub fn parse(name: Option<&str>, engine: Engine) -> Self {
        let Some(name) = name.filter(|n| !n.trim().is_empty()) else {
            return Self::engine_default(engine);
        };
        let lower = name.to_ascii_lowercase();
        match engine {
            Engine::MicrosoftSqlServer => Collation {
                case_sensitive: !lower.contains("_ci"),
                pad_spaces: true,
            },
            Engine::MySql => Collation {
                case_sensitive: lower.ends_with("_cs") || lower.ends_with("_bin"),
                pad_spaces: !lower.contains("_0900_") && !lower.ends_with("_nopad_bin"),
            },
            Engine::PostgreSql => Collation {
                case_sensitive: !(lower.contains("ks-level1") || lower.contains("ks-level2")),
                pad_spaces: false,
            },
            Engine::Oracle => Collation {
                case_sensitive: !(lower.ends_with("_ci") || lower.ends_with("_ai")),
                pad_spaces: false,
            },
        }
    }

    /// Bring text into this collation's canonical form.
    pub fn normalize(&self, text: &str) -> String {
        let text = if self.pad_spaces {
            text.trim_end_matches(' ')
        } else {
            text
        };
        if self.case_sensitive {
            text.to_string()
        } else {
            text.to_lowercase()
        }
    }

    /// True when both collations give the same answer for every pair of strings
    /// that differ only by case.
    pub fn agrees_on_case(&self, other: &Collation) -> bool {
        self.case_sensitive == other.case_sensitive
    }
}

/// Compare a source value with a destination value under the destination collation.
///
/// NULL equals NULL here: a NULL that stays NULL is not a change.
pub fn values_match(source: &UniversalValue, destination: &UniversalValue, collation: &Collation) -> bool {
    use UniversalValue as V;
    match (source, destination) {
        (V::Null, V::Null) => true,
        (V::Null, _) | (_, V::Null) => false,
        (V::Text(a), V::Text(b)) => collation.normalize(a) == collation.normalize(b),
        (V::Int(a), V::Decimal(b)) | (V::Decimal(b), V::Int(a)) => Decimal::from(*a) == *b,
        (V::Int(a), V::Float(b)) | (V::Float(b), V::Int(a)) => (*a as f64) == *b,
        (V::Float(a), V::Decimal(b)) | (V::Decimal(b), V::Float(a)) => {
            Decimal::try_from(*a).map(|a| a == *b).unwrap_or(false)
        }
        (V::Bool(a), V::Int(b)) | (V::Int(b), V::Bool(a)) => i64::from(*a) == *b,
        (V::DateTime(a), V::DateTimeTz(b)) | (V::DateTimeTz(b), V::DateTime(a)) => *a == b.naive_utc(),
        (V::Uuid(a), V::Text(b)) | (V::Text(b), V::Uuid(a)) => {
            a.to_string().eq_ignore_ascii_case(b.trim())
        }
        (V::Json(a), V::Text(b)) | (V::Text(b), V::Json(a)) => {
            serde_json::from_str::<serde_json::Value>(b).map(|b| *a == b).unwrap_or(false)
        }
        (a, b) => a == b,
    }
}

/// Canonical text form of a value under a collation, used to detect duplicate keys.
pub fn key_fingerprint(value: &UniversalValue, collation: &Collation) -> String {
    match value {
        UniversalValue::Text(s) => format!("t:{}", collation.normalize(s)),
        UniversalValue::Decimal(d) => format!("n:{}", d.normalize()),
        UniversalValue::Int(i) => format!("n:{i}"),
        UniversalValue::DateTimeTz(dt) => format!("d:{}", dt.naive_utc()),
        UniversalValue::DateTime(dt) => format!("d:{dt}"),
        other => format!("{}:{other}", other.kind()),
    }
}
