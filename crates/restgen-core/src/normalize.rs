//! Parameter name normalization
//!
//! Independently authored APIs rarely agree on field names (`petId`,
//! `pet_id`, `PetIDs`), so dependency matching compares *normalized* names:
//! the raw name is split into words, every word is lower-cased and stemmed,
//! and the words are joined with `_`.
//!
//! A bare `id` carries no meaning on its own and is first completed from its
//! context (see [`id_completion`]).

use rust_stemmers::{Algorithm, Stemmer};

use crate::error::CoreError;
use crate::model::{Location, NodeId, ParameterArena, ParameterNode};
use crate::operation::DEFAULT_BODY_NAME;

/// Verbs stripped from operation ids when deriving an owner name for `id`.
const LEADING_VERBS: &[&str] = &[
    "get", "set", "create", "add", "post", "put", "update", "patch", "delete", "remove", "list",
    "find", "fetch", "retrieve", "read", "search", "replace",
];

/// Words after which an operation id stops naming its resource (`getPetById`).
const RESOURCE_TERMINATORS: &[&str] = &["by", "for", "with", "from", "of", "in"];

/// Where a name was declared, for [`id_completion`].
#[derive(Debug, Clone, Copy, Default)]
pub struct NameScope<'a> {
    /// Path template of the operation, e.g. `/pets/{id}`.
    pub path: &'a str,
    pub operation_id: Option<&'a str>,
    pub location: Option<Location>,
    /// Name of the nearest named object or array containing the parameter.
    pub enclosing: Option<&'a str>,
}

/// Split a raw name into lower-case words.
///
/// Boundaries: any non-alphanumeric character, lower→upper transitions,
/// letter↔digit transitions, and the end of an acronym (`HTTPServer` →
/// `http`, `server`).
#[must_use]
pub fn split_words(raw: &str) -> Vec<String> {
    let chars: Vec<char> = raw.chars().collect();
    let mut words = Vec::new();
    let mut current = String::new();
    for (i, &c) in chars.iter().enumerate() {
        if !c.is_alphanumeric() {
            flush(&mut current, &mut words);
            continue;
        }
        if let Some(&prev) = i.checked_sub(1).and_then(|p| chars.get(p)) {
            let next = chars.get(i + 1).copied();
            let boundary = (prev.is_lowercase() && c.is_uppercase())
                || (prev.is_alphabetic() && c.is_numeric())
                || (prev.is_numeric() && c.is_alphabetic())
                || (prev.is_uppercase()
                    && c.is_uppercase()
                    && next.is_some_and(char::is_lowercase));
            if boundary {
                flush(&mut current, &mut words);
            }
        }
        current.extend(c.to_lowercase());
    }
    flush(&mut current, &mut words);
    words
}

fn flush(current: &mut String, words: &mut Vec<String>) {
    if !current.is_empty() {
        words.push(std::mem::take(current));
    }
}

/// Stem until the word stops changing.
fn stem_word(stemmer: &Stemmer, word: &str) -> String {
    let mut current = word.to_string();
    for _ in 0..=word.len() {
        let next = stemmer.stem(&current).into_owned();
        if next == current || next.is_empty() {
            break;
        }
        current = next;
    }
    current
}

/// Canonical form of a raw name: stemmed lower-case words joined by `_`.
///
/// Idempotent: normalizing a normalized name returns it unchanged.
#[must_use]
pub fn normalize(raw: &str) -> String {
    let stemmer = Stemmer::create(Algorithm::English);
    split_words(raw)
        .iter()
        .map(|w| stem_word(&stemmer, w))
        .collect::<Vec<_>>()
        .join("_")
}

/// Resource word in singular camelCase, used as the owner of an `id`.
fn singular_owner(word: &str) -> Option<String> {
    let mut words = split_words(word);
    let last = words.pop()?;
    words.push(singular(&last));
    Some(camel_join(&words))
}

fn singular(word: &str) -> String {
    if let Some(stem) = word.strip_suffix("ies") {
        return format!("{stem}y");
    }
    match word.strip_suffix('s') {
        Some(stem) if !stem.is_empty() && !stem.ends_with(['s', 'u', 'i']) => stem.to_string(),
        _ => word.to_string(),
    }
}

fn camel_join(words: &[String]) -> String {
    let mut out = String::new();
    for (i, word) in words.iter().enumerate() {
        if i == 0 {
            out.push_str(word);
            continue;
        }
        let mut chars = word.chars();
        if let Some(first) = chars.next() {
            out.extend(first.to_uppercase());
            out.push_str(chars.as_str());
        }
    }
    out
}

/// Replace a bare `id` with `<owner>Id`.
///
/// The owner is taken from, in order:
/// 1. for path parameters, the literal path segment right before `{id}`
///    (`/pets/{id}` → `petId`); if the path has no such segment the name is
///    returned unchanged;
/// 2. the nearest named enclosing object or array, unless that is the
///    placeholder root of an unnamed request body;
/// 3. the operation id without its leading verb (`createItem` → `itemId`),
///    or the last literal path segment when there is no operation id.
///
/// Any other name is returned unchanged.
#[must_use]
pub fn id_completion(raw: &str, scope: &NameScope<'_>) -> String {
    if !raw.eq_ignore_ascii_case("id") {
        return raw.to_string();
    }
    let owner = if scope.location == Some(Location::Path) {
        path_owner(scope.path, raw)
    } else {
        scope
            .enclosing
            .filter(|e| !e.is_empty() && *e != DEFAULT_BODY_NAME)
            .and_then(singular_owner)
            .or_else(|| scope.operation_id.and_then(operation_owner))
            .or_else(|| last_literal_segment(scope.path).and_then(singular_owner))
    };
    owner.map_or_else(|| raw.to_string(), |o| format!("{o}Id"))
}

fn path_owner(path: &str, raw: &str) -> Option<String> {
    let placeholder = format!("{{{raw}}}");
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let at = segments.iter().position(|s| *s == placeholder)?;
    let previous = segments.get(at.checked_sub(1)?)?;
    if previous.starts_with('{') {
        return None;
    }
    singular_owner(previous)
}

fn last_literal_segment(path: &str) -> Option<&str> {
    path.split('/')
        .rev()
        .find(|s| !s.is_empty() && !s.starts_with('{'))
}

fn operation_owner(operation_id: &str) -> Option<String> {
    let mut words = split_words(operation_id);
    if words
        .first()
        .is_some_and(|w| LEADING_VERBS.contains(&w.as_str()))
    {
        words.remove(0);
    }
    let end = words
        .iter()
        .position(|w| RESOURCE_TERMINATORS.contains(&w.as_str()))
        .unwrap_or(words.len());
    words.truncate(end);
    if words.is_empty() {
        return None;
    }
    singular_owner(&camel_join(&words))
}

/// Normalized name of a raw name in its scope (id completion, then normalization).
#[must_use]
pub fn normalized_in_scope(raw: &str, scope: &NameScope<'_>) -> String {
    normalize(&id_completion(raw, scope))
}

/// Compute `normalized_name` for every node of the subtree at `root`.
///
/// # Errors
///
/// Fails on a frozen arena.
pub fn assign_normalized_names(
    arena: &mut ParameterArena,
    root: NodeId,
    path: &str,
    operation_id: Option<&str>,
) -> Result<(), CoreError> {
    for id in arena.subtree(root) {
        let node = &arena[id];
        let location = (id == root).then_some(node.location);
        let scope = NameScope {
            path,
            operation_id,
            location,
            enclosing: arena.enclosing_name(id),
        };
        let normalized = normalized_in_scope(&node.name, &scope);
        arena.node_mut(id)?.normalized_name = normalized;
    }
    Ok(())
}

/// Same field: equal declared types and case-insensitively equal normalized names.
#[must_use]
pub fn matched_names(a: &ParameterNode, b: &ParameterNode) -> bool {
    a.parameter_type() == b.parameter_type()
        && a.normalized_name.eq_ignore_ascii_case(&b.normalized_name)
}

/// Match a node against a normalized output field name; types are not compared.
#[must_use]
pub fn matches_output(node: &ParameterNode, normalized_output: &str) -> bool {
    !normalized_output.is_empty() && node.normalized_name.eq_ignore_ascii_case(normalized_output)
}
