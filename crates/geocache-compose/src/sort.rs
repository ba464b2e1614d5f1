use geocache_types::Feature;
use serde_json::Value;
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Nulls {
    First,
    Last,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeHint {
    Number,
    Time,
    String,
    Auto,
}

#[derive(Debug, Clone)]
pub struct SortKey {
    pub property: String,
    pub direction: Direction,
    pub nulls: Nulls,
    pub type_hint: TypeHint,
}

impl SortKey {
    pub fn new(property: impl Into<String>, direction: Direction) -> Self {
        SortKey {
            property: property.into(),
            direction,
            nulls: Nulls::Last,
            type_hint: TypeHint::Auto,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Typed {
    Number(f64),
    Time(time::OffsetDateTime),
    Text(String),
}

fn coerce(value: &Value, hint: TypeHint) -> Option<Typed> {
    match hint {
        TypeHint::Number => value.as_f64().map(Typed::Number),
        TypeHint::Time => value
            .as_str()
            .and_then(|s| time::OffsetDateTime::parse(s, &time::format_description::well_known::Rfc3339).ok())
            .map(Typed::Time),
        TypeHint::String => value.as_str().map(|s| Typed::Text(s.to_string())),
        TypeHint::Auto => {
            if let Some(s) = value.as_str() {
                if let Ok(t) =
                    time::OffsetDateTime::parse(s, &time::format_description::well_known::Rfc3339)
                {
                    return Some(Typed::Time(t));
                }
                if let Ok(n) = s.parse::<f64>() {
                    return Some(Typed::Number(n));
                }
                return Some(Typed::Text(s.to_string()));
            }
            value.as_f64().map(Typed::Number)
        }
    }
}

fn cmp_typed(a: &Typed, b: &Typed) -> Ordering {
    match (a, b) {
        (Typed::Number(x), Typed::Number(y)) => x.partial_cmp(y).unwrap_or(Ordering::Equal),
        (Typed::Time(x), Typed::Time(y)) => x.cmp(y),
        (Typed::Text(x), Typed::Text(y)) => x.as_bytes().cmp(y.as_bytes()),
        // mismatched types after coercion: fall back to a stable string compare.
        (a, b) => format!("{a:?}").cmp(&format!("{b:?}")),
    }
}

fn key_value<'a>(feature: &'a Feature, key: &SortKey) -> Option<Typed> {
    feature
        .properties
        .get(&key.property)
        .filter(|v| !v.is_null())
        .and_then(|v| coerce(v, key.type_hint))
}

/// Compares two features by the full sort key list, per-key null placement,
/// and the overall asc/desc direction.
pub fn compare_features(a: &Feature, b: &Feature, sort: &[SortKey]) -> Ordering {
    for key in sort {
        let va = key_value(a, key);
        let vb = key_value(b, key);
        let ordering = match (va, vb) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => {
                if key.nulls == Nulls::First {
                    Ordering::Less
                } else {
                    Ordering::Greater
                }
            }
            (Some(_), None) => {
                if key.nulls == Nulls::First {
                    Ordering::Greater
                } else {
                    Ordering::Less
                }
            }
            (Some(x), Some(y)) => {
                let base = cmp_typed(&x, &y);
                if key.direction == Direction::Desc {
                    base.reverse()
                } else {
                    base
                }
            }
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}
