//! Type-driven random values for leaves
//!
//! Strings draw from a weighted mixture of synthetic formats (inferred from
//! the declared format, the field name or its examples), dictionary reuse,
//! a word list and plain alphanumerics, then are fitted to the length bounds.
//! Numbers are drawn inside the declared range, honoring exclusivity.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, NaiveDate, SecondsFormat};
use rand::Rng;
use rand::seq::SliceRandom;
use serde_json::{Number, Value, json};

use crate::dictionary::Dictionary;
use crate::model::compliance::format_compliant;
use crate::model::{NodeId, NodeKind, NumberNode, ParameterArena, ParameterNode, StringNode};
use crate::normalize::split_words;

/// Maximum string length for generation (prevents OOM on absurd maxLength values).
const MAX_STRING_LEN: usize = 10_000;

/// Upper length of unbounded strings.
const DEFAULT_MAX_LEN: usize = 20;

/// Chance of picking a bound or zero instead of a uniform draw.
const EDGE_PROBABILITY: f64 = 0.2;

const WORDS: &[&str] = &[
    "alpha", "bravo", "charlie", "delta", "echo", "river", "stone", "cloud", "maple", "harbor",
    "violet", "amber", "copper", "meadow", "falcon", "summit", "lantern", "orbit", "willow",
    "cedar", "pixel", "quartz", "nova", "ember",
];

const ALPHANUMERIC: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// String shapes with a dedicated generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyntheticFormat {
    Email,
    Date,
    DateTime,
    Uuid,
    Uri,
    Hostname,
    Ipv4,
    Ipv6,
    Iban,
    Phone,
    Hex,
    Base64,
}

impl SyntheticFormat {
    const ALL: [Self; 12] = [
        Self::Email,
        Self::Date,
        Self::DateTime,
        Self::Uuid,
        Self::Uri,
        Self::Hostname,
        Self::Ipv4,
        Self::Ipv6,
        Self::Iban,
        Self::Phone,
        Self::Hex,
        Self::Base64,
    ];

    /// Map an OpenAPI `format` keyword.
    #[must_use]
    pub fn from_format(format: &str) -> Option<Self> {
        Some(match format {
            "email" | "idn-email" => Self::Email,
            "date" => Self::Date,
            "date-time" => Self::DateTime,
            "uuid" => Self::Uuid,
            "uri" | "url" | "uri-reference" | "iri" => Self::Uri,
            "hostname" | "idn-hostname" => Self::Hostname,
            "ipv4" => Self::Ipv4,
            "ipv6" => Self::Ipv6,
            "iban" => Self::Iban,
            "phone" => Self::Phone,
            "byte" | "base64" => Self::Base64,
            _ => return None,
        })
    }

    /// Declared format first, then hints in the field name, then the shape of its examples.
    #[must_use]
    pub fn infer(node: &ParameterNode) -> Option<Self> {
        if let Some(format) = node.format.as_deref().and_then(Self::from_format) {
            return Some(format);
        }
        let words = split_words(&node.name);
        let has = |w: &str| words.iter().any(|x| x == w);
        let hint = if has("email") || has("mail") {
            Some(Self::Email)
        } else if has("uuid") || has("guid") {
            Some(Self::Uuid)
        } else if has("iban") {
            Some(Self::Iban)
        } else if has("ipv6") {
            Some(Self::Ipv6)
        } else if has("ip") || has("ipv4") {
            Some(Self::Ipv4)
        } else if has("url") || has("uri") || has("link") || has("website") {
            Some(Self::Uri)
        } else if has("host") || has("hostname") || has("domain") {
            Some(Self::Hostname)
        } else if has("phone") || has("mobile") || has("tel") {
            Some(Self::Phone)
        } else if has("timestamp") || has("time") || words.last().is_some_and(|w| w == "at") {
            Some(Self::DateTime)
        } else if has("date") || has("birthday") || has("dob") {
            Some(Self::Date)
        } else if has("hex") || has("color") || has("hash") || has("sha") {
            Some(Self::Hex)
        } else if has("base64") {
            Some(Self::Base64)
        } else {
            None
        };
        hint.or_else(|| {
            node.examples.iter().filter_map(Value::as_str).find_map(|example| {
                Self::ALL
                    .into_iter()
                    .find(|f| f.recognizes(example))
            })
        })
    }

    /// Formats recognizable from an example value alone.
    fn recognizes(self, value: &str) -> bool {
        match self {
            Self::Email => format_compliant("email", value),
            Self::Date => format_compliant("date", value),
            Self::DateTime => format_compliant("date-time", value),
            Self::Uuid => format_compliant("uuid", value),
            Self::Uri => format_compliant("uri", value),
            Self::Ipv4 => format_compliant("ipv4", value) && value.contains('.'),
            Self::Ipv6 => value.contains(':') && format_compliant("ipv6", value),
            _ => false,
        }
    }

    /// The `format` keyword a generated value satisfies, if any.
    #[must_use]
    pub const fn keyword(self) -> Option<&'static str> {
        match self {
            Self::Email => Some("email"),
            Self::Date => Some("date"),
            Self::DateTime => Some("date-time"),
            Self::Uuid => Some("uuid"),
            Self::Uri => Some("uri"),
            Self::Ipv4 => Some("ipv4"),
            Self::Ipv6 => Some("ipv6"),
            _ => None,
        }
    }

    pub fn generate<R: Rng + ?Sized>(self, rng: &mut R) -> String {
        match self {
            Self::Email => format!(
                "{}{}@example.com",
                WORDS.choose(rng).copied().unwrap_or("user"),
                rng.gen_range(1..9999_u32)
            ),
            Self::Date => random_date(rng).format("%Y-%m-%d").to_string(),
            Self::DateTime => {
                let secs = rng.gen_range(946_684_800_i64..4_102_444_800);
                DateTime::from_timestamp(secs, 0)
                    .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
                    .unwrap_or_else(|| "2024-01-15T12:00:00Z".into())
            }
            Self::Uuid => uuid::Builder::from_random_bytes(rng.r#gen())
                .into_uuid()
                .to_string(),
            Self::Uri => format!(
                "https://{}.example.com/{}",
                WORDS.choose(rng).copied().unwrap_or("www"),
                WORDS.choose(rng).copied().unwrap_or("index")
            ),
            Self::Hostname => format!("{}.example.com", WORDS.choose(rng).copied().unwrap_or("api")),
            Self::Ipv4 => std::net::Ipv4Addr::from(rng.r#gen::<u32>()).to_string(),
            Self::Ipv6 => std::net::Ipv6Addr::from(rng.r#gen::<u128>()).to_string(),
            Self::Iban => random_iban(rng),
            Self::Phone => format!(
                "+1{}{:03}{:04}",
                rng.gen_range(200..1000_u32),
                rng.gen_range(0..1000_u32),
                rng.gen_range(0..10_000_u32)
            ),
            Self::Hex => hex::encode(rng.r#gen::<[u8; 16]>()),
            Self::Base64 => BASE64.encode(rng.r#gen::<[u8; 12]>()),
        }
    }
}

fn random_date<R: Rng + ?Sized>(rng: &mut R) -> NaiveDate {
    let year = rng.gen_range(1970..2100);
    let month = rng.gen_range(1..=12);
    let day = rng.gen_range(1..=28);
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or_default()
}

/// German IBAN with a valid ISO 7064 check.
fn random_iban<R: Rng + ?Sized>(rng: &mut R) -> String {
    let bban: String = (0..18)
        .map(|_| char::from(b'0' + rng.gen_range(0..10_u8)))
        .collect();
    // bban + "DE00", letters as numbers (D = 13, E = 14)
    let rearranged = format!("{bban}131400");
    let remainder = rearranged
        .bytes()
        .fold(0_u32, |acc, b| (acc * 10 + u32::from(b - b'0')) % 97);
    format!("DE{:02}{bban}", 98 - remainder)
}

fn random_alnum<R: Rng + ?Sized>(rng: &mut R, len: usize) -> String {
    (0..len)
        .map(|_| char::from(ALPHANUMERIC[rng.gen_range(0..ALPHANUMERIC.len())]))
        .collect()
}

fn random_words<R: Rng + ?Sized>(rng: &mut R) -> String {
    let count = rng.gen_range(1..=3);
    (0..count)
        .filter_map(|_| WORDS.choose(rng).copied())
        .collect::<Vec<_>>()
        .join("_")
}

/// Pad with alphanumerics or truncate to land in `[min, max]` characters.
fn fit_length<R: Rng + ?Sized>(value: String, min: usize, max: usize, rng: &mut R) -> String {
    let len = value.chars().count();
    if len < min {
        let mut padded = value;
        padded.push_str(&random_alnum(rng, min - len));
        padded
    } else if len > max {
        value.chars().take(max).collect()
    } else {
        value
    }
}

fn length_bounds(s: &StringNode) -> (usize, usize) {
    let clamp = |v: u64| usize::try_from(v).unwrap_or(MAX_STRING_LEN).min(MAX_STRING_LEN);
    let min = s.min_length.map_or(0, clamp);
    let max = s
        .max_length
        .map_or(min.max(DEFAULT_MAX_LEN), clamp)
        .max(min);
    (min, max)
}

/// Random string for a string leaf.
pub fn random_string<R: Rng + ?Sized>(
    node: &ParameterNode,
    s: &StringNode,
    dictionary: &Dictionary,
    rng: &mut R,
) -> String {
    let (min, max) = length_bounds(s);
    let format = SyntheticFormat::infer(node);
    let roll = rng.gen_range(0..10);
    let base = match (format, roll) {
        (Some(f), 0..=6) => f.generate(rng),
        (_, 0..=1) => {
            let reusable: Vec<&str> = dictionary
                .entries()
                .filter_map(|e| e.value.as_str())
                .filter(|v| (min..=max).contains(&v.chars().count()))
                .collect();
            match reusable.choose(rng) {
                Some(v) => (*v).to_string(),
                None => random_words(rng),
            }
        }
        (_, 2..=5) => random_words(rng),
        _ => {
            let len = rng.gen_range(min.max(1)..=max.max(1));
            random_alnum(rng, len)
        }
    };
    fit_length(base, min, max, rng)
}

fn integer_bounds(n: &NumberNode) -> Option<(i64, i64)> {
    #[allow(clippy::cast_possible_truncation)]
    let lower = match n.minimum {
        Some(m) if n.exclusive_minimum && m.fract() == 0.0 => (m as i64).checked_add(1)?,
        Some(m) => m.ceil() as i64,
        None => i64::MIN,
    };
    #[allow(clippy::cast_possible_truncation)]
    let upper = match n.maximum {
        Some(m) if n.exclusive_maximum && m.fract() == 0.0 => (m as i64).checked_sub(1)?,
        Some(m) => m.floor() as i64,
        None => i64::MAX,
    };
    (lower <= upper).then_some((lower, upper))
}

/// Random number inside the declared range; `None` when the range is empty.
pub fn random_number<R: Rng + ?Sized>(n: &NumberNode, rng: &mut R) -> Option<Value> {
    if n.integer {
        let (lo, hi) = integer_bounds(n)?;
        if rng.gen_bool(EDGE_PROBABILITY) {
            let mut edges = vec![lo, hi];
            if (lo..=hi).contains(&0) {
                edges.push(0);
            }
            return edges.choose(rng).map(|v| json!(v));
        }
        return Some(json!(rng.gen_range(lo..=hi)));
    }

    let limit = f64::MAX / 4.0;
    let lo = n.minimum.unwrap_or(-limit).max(-limit);
    let hi = n.maximum.unwrap_or(limit).min(limit);
    if lo > hi || (lo == hi && (n.exclusive_minimum || n.exclusive_maximum)) {
        return None;
    }
    let mut x = if lo == hi { lo } else { rng.gen_range(lo..=hi) };
    if (n.exclusive_minimum && x <= lo) || (n.exclusive_maximum && x >= hi) {
        x = lo / 2.0 + hi / 2.0;
    }
    Number::from_f64(x).map(Value::Number)
}

/// A random value of the leaf's declared type; `None` for structured nodes
/// and unsatisfiable constraints.
pub fn random_leaf_value<R: Rng + ?Sized>(
    arena: &ParameterArena,
    id: NodeId,
    dictionary: &Dictionary,
    rng: &mut R,
) -> Option<Value> {
    let node = arena.get(id)?;
    match &node.kind {
        NodeKind::String(s) => Some(Value::String(random_string(node, s, dictionary, rng))),
        NodeKind::Number(n) => random_number(n, rng),
        NodeKind::Boolean(_) => Some(Value::Bool(rng.gen_bool(0.5))),
        NodeKind::Null(_) => Some(Value::Null),
        NodeKind::Generic(_) => Some(Value::String(random_words(rng))),
        NodeKind::Array(_) | NodeKind::Object(_) | NodeKind::Combined(_) => None,
    }
}

/// Random printable character, for padding and mutation.
pub fn random_char<R: Rng + ?Sized>(rng: &mut R) -> char {
    char::from(ALPHANUMERIC[rng.gen_range(0..ALPHANUMERIC.len())])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{LeafNode, Location};
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    fn string_node(name: &str, format: Option<&str>) -> ParameterNode {
        let mut node = ParameterNode::new(
            name,
            Location::Query,
            NodeKind::String(StringNode::default()),
        );
        node.format = format.map(String::from);
        node
    }

    #[test]
    fn infers_format_from_name_and_examples() {
        assert_eq!(
            SyntheticFormat::infer(&string_node("contactEmail", None)),
            Some(SyntheticFormat::Email)
        );
        assert_eq!(
            SyntheticFormat::infer(&string_node("createdAt", None)),
            Some(SyntheticFormat::DateTime)
        );
        assert_eq!(
            SyntheticFormat::infer(&string_node("x", Some("uuid"))),
            Some(SyntheticFormat::Uuid)
        );
        let mut by_example = string_node("value", None);
        by_example.examples.push(json!("2024-03-01"));
        assert_eq!(SyntheticFormat::infer(&by_example), Some(SyntheticFormat::Date));
        assert_eq!(SyntheticFormat::infer(&string_node("title", None)), None);
    }

    #[test]
    fn synthetic_formats_are_well_formed() {
        let mut rng = SmallRng::seed_from_u64(42);
        for format in SyntheticFormat::ALL {
            let value = format.generate(&mut rng);
            if let Some(keyword) = format.keyword() {
                assert!(format_compliant(keyword, &value), "{keyword}: {value}");
            }
        }
        let iban = SyntheticFormat::Iban.generate(&mut rng);
        assert_eq!(iban.len(), 22);
        assert!(iban.starts_with("DE"));
    }

    #[test]
    fn strings_respect_length_bounds() {
        let mut rng = SmallRng::seed_from_u64(42);
        let dict = Dictionary::new();
        let s = StringNode {
            min_length: Some(3),
            max_length: Some(5),
            ..StringNode::default()
        };
        let node = string_node("email", None);
        for _ in 0..50 {
            let value = random_string(&node, &s, &dict, &mut rng);
            assert!((3..=5).contains(&value.chars().count()), "{value}");
        }
    }

    #[test]
    fn numbers_respect_exclusive_bounds() {
        let mut rng = SmallRng::seed_from_u64(42);
        let n = NumberNode {
            minimum: Some(0.0),
            exclusive_minimum: true,
            maximum: Some(3.0),
            exclusive_maximum: true,
            integer: true,
            ..NumberNode::default()
        };
        for _ in 0..50 {
            let v = random_number(&n, &mut rng).unwrap().as_i64().unwrap();
            assert!((1..=2).contains(&v));
        }
        let empty = NumberNode {
            minimum: Some(1.0),
            maximum: Some(1.0),
            exclusive_maximum: true,
            ..NumberNode::default()
        };
        assert!(random_number(&empty, &mut rng).is_none());
    }

    #[test]
    fn unbounded_float_stays_finite() {
        let mut rng = SmallRng::seed_from_u64(42);
        let value = random_number(&NumberNode::default(), &mut rng).unwrap();
        assert!(value.as_f64().is_some_and(f64::is_finite));
    }

    #[test]
    fn null_leaf_gets_explicit_null() {
        let mut rng = SmallRng::seed_from_u64(42);
        let mut arena = ParameterArena::new("GET /x");
        let id = arena
            .alloc(ParameterNode::new("n", Location::Query, NodeKind::Null(LeafNode::default())))
            .unwrap();
        assert_eq!(
            random_leaf_value(&arena, id, &Dictionary::new(), &mut rng),
            Some(Value::Null)
        );
    }
}
