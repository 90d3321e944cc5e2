//! Regular-expression driven string generation
//!
//! Patterns are parsed with `regex-syntax` and walked directly, so generation
//! always terminates: unbounded repetitions are capped and output length is
//! bounded. Results are verified against the original pattern with `regex`.

use rand::Rng;
use regex::Regex;
use regex_syntax::ParserBuilder;
use regex_syntax::hir::{Class, ClassUnicode, ClassUnicodeRange, Hir, HirKind};

/// Extra repetitions allowed past the minimum of `*`, `+` and `{n,}`.
const UNBOUNDED_EXTRA: u32 = 8;

/// Repetition count never exceeded unless the pattern's minimum demands it.
const MAX_REPEAT: u32 = 64;

/// Generated strings longer than this are abandoned.
const MAX_GENERATED_LEN: usize = 10_000;

/// Attempts before generation gives up.
const MAX_ATTEMPTS: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatternError {
    #[error("unsupported pattern: {0}")]
    Unsupported(String),
    #[error("pattern must be a valid regex: {0}")]
    Parse(String),
}

/// A compiled `pattern` keyword, ready for generation.
#[derive(Debug, Clone)]
pub struct PatternGenerator {
    validation: Regex,
    hir: Hir,
}

impl PatternGenerator {
    /// # Errors
    ///
    /// [`PatternError::Unsupported`] for word-boundary and absolute anchors
    /// (`\b \B \A \Z \z \G`), [`PatternError::Parse`] for invalid regexes.
    pub fn compile(pattern: &str) -> Result<Self, PatternError> {
        let validation = Regex::new(pattern).map_err(|e| PatternError::Parse(e.to_string()))?;
        let normalized = strip_anchors(pattern)?;
        let hir = ParserBuilder::new()
            .build()
            .parse(&normalized)
            .map_err(|e| PatternError::Parse(e.to_string()))?;
        Ok(Self { validation, hir })
    }

    #[must_use]
    pub fn is_match(&self, value: &str) -> bool {
        self.validation.is_match(value)
    }

    /// A string matching the pattern, or `None` if none was found in a few attempts.
    pub fn generate<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<String> {
        (0..MAX_ATTEMPTS).find_map(|_| {
            let mut out = String::new();
            emit_matching(&self.hir, rng, &mut out);
            (out.len() <= MAX_GENERATED_LEN && self.is_match(&out)).then_some(out)
        })
    }

    /// A string that does not match the pattern.
    ///
    /// The top-level sequence is split into components; a random non-empty
    /// subset of them is generated to *not* match while the rest match.
    pub fn generate_mismatch<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<String> {
        let components = top_level_components(&self.hir);
        for _ in 0..MAX_ATTEMPTS {
            let mut flips: Vec<bool> = components.iter().map(|_| rng.gen_bool(0.5)).collect();
            if !flips.iter().any(|f| *f) {
                let forced = rng.gen_range(0..flips.len());
                flips[forced] = true;
            }
            let mut out = String::new();
            let mut flipped_any = false;
            for (component, flip) in components.iter().zip(&flips) {
                if *flip && emit_mismatching(component, rng, &mut out) {
                    flipped_any = true;
                } else {
                    emit_matching(component, rng, &mut out);
                }
            }
            if flipped_any && out.len() <= MAX_GENERATED_LEN && !self.is_match(&out) {
                return Some(out);
            }
        }
        // most anchored patterns reject the empty string
        (!self.is_match("")).then(String::new)
    }
}

/// Strip a leading `^` and trailing unescaped `$`; reject anchors the walker cannot honor.
fn strip_anchors(pattern: &str) -> Result<String, PatternError> {
    let bytes = pattern.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' {
            if let Some(next) = bytes.get(i + 1) {
                if matches!(next, b'b' | b'B' | b'A' | b'Z' | b'z' | b'G') {
                    return Err(PatternError::Unsupported(format!(
                        "escape \\{} has no generation strategy",
                        char::from(*next)
                    )));
                }
            }
            i += 2;
            continue;
        }
        i += 1;
    }
    let start = usize::from(bytes.first() == Some(&b'^'));
    let mut end = bytes.len();
    if end > start && bytes[end - 1] == b'$' && !is_escaped(bytes, end - 1) {
        end -= 1;
    }
    Ok(pattern[start..end].to_string())
}

fn is_escaped(bytes: &[u8], idx: usize) -> bool {
    bytes[..idx]
        .iter()
        .rev()
        .take_while(|b| **b == b'\\')
        .count()
        % 2
        == 1
}

fn top_level_components(hir: &Hir) -> Vec<Hir> {
    match hir.kind() {
        HirKind::Capture(c) => top_level_components(&c.sub),
        HirKind::Concat(parts) => parts.clone(),
        _ => vec![hir.clone()],
    }
}

fn printable() -> ClassUnicode {
    ClassUnicode::new([ClassUnicodeRange::new(' ', '~')])
}

/// Pick a char from `class`, preferring printable ASCII.
fn pick_char<R: Rng + ?Sized>(class: &ClassUnicode, rng: &mut R) -> Option<char> {
    let mut visible = class.clone();
    visible.intersect(&printable());
    let source = if visible.ranges().is_empty() { class } else { &visible };
    let total: u32 = source
        .ranges()
        .iter()
        .map(|r| u32::from(r.end()) - u32::from(r.start()) + 1)
        .sum();
    if total == 0 {
        return None;
    }
    let mut offset = rng.gen_range(0..total);
    for range in source.ranges() {
        let size = u32::from(range.end()) - u32::from(range.start()) + 1;
        if offset < size {
            // surrogate code points are excluded from unicode classes
            return char::from_u32(u32::from(range.start()) + offset);
        }
        offset -= size;
    }
    None
}

fn unicode_class(class: &Class) -> ClassUnicode {
    match class {
        Class::Unicode(c) => c.clone(),
        Class::Bytes(b) => ClassUnicode::new(b.ranges().iter().filter_map(|r| {
            (r.start().is_ascii() && r.end().is_ascii())
                .then(|| ClassUnicodeRange::new(char::from(r.start()), char::from(r.end())))
        })),
    }
}

fn repeat_bounds(min: u32, max: Option<u32>) -> (u32, u32) {
    let upper = max.unwrap_or_else(|| min.saturating_add(UNBOUNDED_EXTRA));
    (min, upper.min(MAX_REPEAT).max(min))
}

fn emit_matching<R: Rng + ?Sized>(hir: &Hir, rng: &mut R, out: &mut String) {
    if out.len() > MAX_GENERATED_LEN {
        return;
    }
    match hir.kind() {
        HirKind::Empty | HirKind::Look(_) => {}
        HirKind::Literal(lit) => out.push_str(&String::from_utf8_lossy(&lit.0)),
        HirKind::Class(class) => {
            if let Some(c) = pick_char(&unicode_class(class), rng) {
                out.push(c);
            }
        }
        HirKind::Repetition(rep) => {
            let (min, max) = repeat_bounds(rep.min, rep.max);
            for _ in 0..rng.gen_range(min..=max) {
                emit_matching(&rep.sub, rng, out);
            }
        }
        HirKind::Capture(cap) => emit_matching(&cap.sub, rng, out),
        HirKind::Concat(parts) => {
            for part in parts {
                emit_matching(part, rng, out);
            }
        }
        HirKind::Alternation(branches) => {
            if !branches.is_empty() {
                let pick = rng.gen_range(0..branches.len());
                emit_matching(&branches[pick], rng, out);
            }
        }
    }
}

/// Emit text for `hir` that is meant not to match it. Returns `false` when
/// no flipping strategy exists; nothing is emitted in that case.
fn emit_mismatching<R: Rng + ?Sized>(hir: &Hir, rng: &mut R, out: &mut String) -> bool {
    match hir.kind() {
        HirKind::Empty | HirKind::Look(_) => match pick_char(&printable(), rng) {
            Some(c) => {
                out.push(c);
                true
            }
            None => false,
        },
        HirKind::Literal(lit) => {
            let text = String::from_utf8_lossy(&lit.0).into_owned();
            let chars: Vec<char> = text.chars().collect();
            if chars.is_empty() {
                out.push('#');
                return true;
            }
            let at = rng.gen_range(0..chars.len());
            let mut others = printable();
            others.difference(&ClassUnicode::new([ClassUnicodeRange::new(chars[at], chars[at])]));
            let Some(replacement) = pick_char(&others, rng) else {
                return false;
            };
            out.extend(chars[..at].iter());
            out.push(replacement);
            out.extend(chars[at + 1..].iter());
            true
        }
        HirKind::Class(class) => {
            let mut negated = unicode_class(class);
            negated.negate();
            match pick_char(&negated, rng) {
                Some(c) => {
                    out.push(c);
                    true
                }
                None => false,
            }
        }
        HirKind::Repetition(rep) => {
            let mut options = Vec::new();
            if rep.min > 0 {
                options.push(rng.gen_range(0..rep.min));
            }
            if let Some(max) = rep.max {
                options.push(max.saturating_add(rng.gen_range(1..=3)));
            }
            if options.is_empty() {
                // `*` accepts any count; break the repeated item instead
                return emit_mismatching(&rep.sub, rng, out);
            }
            let count = options[rng.gen_range(0..options.len())];
            for _ in 0..count.min(MAX_REPEAT.max(rep.min)) {
                emit_matching(&rep.sub, rng, out);
            }
            true
        }
        HirKind::Capture(cap) => emit_mismatching(&cap.sub, rng, out),
        HirKind::Concat(parts) => {
            if parts.is_empty() {
                return false;
            }
            let flip = rng.gen_range(0..parts.len());
            let mut flipped = false;
            for (i, part) in parts.iter().enumerate() {
                if i == flip && emit_mismatching(part, rng, out) {
                    flipped = true;
                } else {
                    emit_matching(part, rng, out);
                }
            }
            flipped
        }
        HirKind::Alternation(branches) => {
            if branches.is_empty() {
                return false;
            }
            let pick = rng.gen_range(0..branches.len());
            emit_mismatching(&branches[pick], rng, out)
        }
    }
}
