//! Value providers
//!
//! A [`ProviderChain`] asks its providers in a fixed priority order and
//! returns the first compliant candidate:
//!
//! 1. values learned from earlier successful calls ([`DictionaryProvider`])
//! 2. a declared enum value ([`EnumProvider`])
//! 3. a string matching the declared pattern ([`PatternProvider`])
//! 4. a declared example, the default or a random value ([`CandidateProvider`])
//!
//! [`Filler`] walks a parameter tree and assigns values to its leaves,
//! routing authentication parameters to an [`AuthenticationSource`].

pub mod pattern;
pub mod random;

use rand::seq::SliceRandom;
use rand::{Rng, RngCore};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::{AuthParameter, GenerationConfig};
use crate::dictionary::Dictionary;
use crate::error::CoreError;
use crate::model::{Location, NodeId, NodeKind, ParameterArena};
use crate::operation::OperationInstance;

pub use pattern::{PatternError, PatternGenerator};
pub use random::{SyntheticFormat, random_leaf_value};

/// Attempts at producing a compliant pattern match.
const PATTERN_ATTEMPTS: usize = 16;

/// Attempts at materializing an array item distinct from its siblings.
const UNIQUE_ITEM_ATTEMPTS: usize = 4;

/// One source of leaf values.
pub trait ValueProvider {
    fn name(&self) -> &'static str;

    /// A value for `leaf`, or `None` when this source has nothing to offer.
    fn provide(
        &self,
        arena: &ParameterArena,
        leaf: NodeId,
        dictionary: &Dictionary,
        rng: &mut dyn RngCore,
    ) -> Option<Value>;
}

/// Values previously observed for the same normalized name and type.
#[derive(Debug, Default, Clone, Copy)]
pub struct DictionaryProvider;

impl ValueProvider for DictionaryProvider {
    fn name(&self) -> &'static str {
        "dictionary"
    }

    fn provide(
        &self,
        arena: &ParameterArena,
        leaf: NodeId,
        dictionary: &Dictionary,
        rng: &mut dyn RngCore,
    ) -> Option<Value> {
        dictionary
            .strict_entries_by_normalized_name(arena, leaf)
            .choose(rng)
            .map(|entry| entry.value.clone())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct EnumProvider;

impl ValueProvider for EnumProvider {
    fn name(&self) -> &'static str {
        "enum"
    }

    fn provide(
        &self,
        arena: &ParameterArena,
        leaf: NodeId,
        _dictionary: &Dictionary,
        rng: &mut dyn RngCore,
    ) -> Option<Value> {
        let node = arena.get(leaf)?;
        let compliant: Vec<&Value> = node
            .enum_values
            .iter()
            .filter(|v| arena.is_value_compliant(leaf, v))
            .collect();
        compliant.choose(rng).map(|v| (*v).clone())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PatternProvider;

impl ValueProvider for PatternProvider {
    fn name(&self) -> &'static str {
        "pattern"
    }

    fn provide(
        &self,
        arena: &ParameterArena,
        leaf: NodeId,
        _dictionary: &Dictionary,
        rng: &mut dyn RngCore,
    ) -> Option<Value> {
        let node = arena.get(leaf)?;
        let NodeKind::String(s) = &node.kind else {
            return None;
        };
        let pattern = s.pattern.as_deref()?;
        let generator = match PatternGenerator::compile(pattern) {
            Ok(generator) => generator,
            Err(e) => {
                warn!(parameter = %node.name, error = %e, "skipping pattern generation");
                return None;
            }
        };
        (0..PATTERN_ATTEMPTS).find_map(|_| {
            generator
                .generate(rng)
                .map(Value::String)
                .filter(|v| arena.is_value_compliant(leaf, v))
        })
    }
}

/// Uniform pick among a declared example, the default and a random value.
#[derive(Debug, Default, Clone, Copy)]
pub struct CandidateProvider;

impl ValueProvider for CandidateProvider {
    fn name(&self) -> &'static str {
        "candidate"
    }

    fn provide(
        &self,
        arena: &ParameterArena,
        leaf: NodeId,
        dictionary: &Dictionary,
        rng: &mut dyn RngCore,
    ) -> Option<Value> {
        let node = arena.get(leaf)?;
        let example = node.examples.choose(rng).cloned();
        let random = random_leaf_value(arena, leaf, dictionary, rng);
        let candidates: Vec<Value> = [example, node.default_value.clone(), random]
            .into_iter()
            .flatten()
            .filter(|v| arena.is_value_compliant(leaf, v))
            .collect();
        candidates.choose(rng).cloned()
    }
}

/// Providers in priority order.
pub struct ProviderChain {
    providers: Vec<Box<dyn ValueProvider>>,
}

impl Default for ProviderChain {
    fn default() -> Self {
        Self {
            providers: vec![
                Box::new(DictionaryProvider),
                Box::new(EnumProvider),
                Box::new(PatternProvider),
                Box::new(CandidateProvider),
            ],
        }
    }
}

impl std::fmt::Debug for ProviderChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.providers.iter().map(|p| p.name()))
            .finish()
    }
}

impl ProviderChain {
    #[must_use]
    pub fn new(providers: Vec<Box<dyn ValueProvider>>) -> Self {
        Self { providers }
    }

    /// First value offered, with the name of the provider that offered it.
    pub fn provide_value_for(
        &self,
        arena: &ParameterArena,
        leaf: NodeId,
        dictionary: &Dictionary,
        rng: &mut dyn RngCore,
    ) -> Option<(Value, &'static str)> {
        self.providers.iter().find_map(|provider| {
            provider
                .provide(arena, leaf, dictionary, rng)
                .map(|value| (value, provider.name()))
        })
    }
}

/// Values for authentication parameters, bypassing the provider chain.
pub trait AuthenticationSource {
    fn value_for(&self, name: &str, location: Location) -> Option<Value>;
}

/// Authentication values taken verbatim from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticAuthentication {
    parameters: Vec<AuthParameter>,
}

impl StaticAuthentication {
    #[must_use]
    pub fn from_config(parameters: &[AuthParameter]) -> Self {
        Self {
            parameters: parameters.to_vec(),
        }
    }

    #[must_use]
    pub fn parameters(&self) -> &[AuthParameter] {
        &self.parameters
    }
}

impl AuthenticationSource for StaticAuthentication {
    fn value_for(&self, name: &str, location: Location) -> Option<Value> {
        self.parameters
            .iter()
            .find(|p| {
                p.location == location
                    && if location == Location::Header {
                        p.name.eq_ignore_ascii_case(name)
                    } else {
                        p.name == name
                    }
            })
            .map(|p| Value::String(p.value.clone()))
    }
}

/// How much optional structure gets filled.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FillOptions {
    pub optional_inclusion_rate: f64,
    pub max_array_elements: u64,
}

impl Default for FillOptions {
    fn default() -> Self {
        Self::from(&GenerationConfig::default())
    }
}

impl From<&GenerationConfig> for FillOptions {
    fn from(config: &GenerationConfig) -> Self {
        Self {
            optional_inclusion_rate: config.optional_inclusion_rate,
            max_array_elements: config.max_array_elements,
        }
    }
}

/// Assigns values to the leaves of a writable parameter tree.
pub struct Filler<'a> {
    pub chain: &'a ProviderChain,
    pub dictionary: &'a Dictionary,
    pub authentication: &'a dyn AuthenticationSource,
    pub options: FillOptions,
}

impl Filler<'_> {
    /// Fill every required root of `instance` and a random share of the optional ones.
    ///
    /// # Errors
    ///
    /// Only programming errors ([`CoreError::ReadOnlyViolation`],
    /// [`CoreError::UnknownNode`]) are returned; value mismatches are logged.
    pub fn fill_instance(
        &self,
        instance: &mut OperationInstance,
        rng: &mut dyn RngCore,
    ) -> Result<(), CoreError> {
        let roots: Vec<NodeId> = instance.roots().collect();
        for root in roots {
            let node = &instance.arena()[root];
            let authenticated = self
                .authentication
                .value_for(&node.name, node.location)
                .is_some();
            if node.required || authenticated || self.include_optional(rng) {
                self.fill_node(instance.arena_mut(), root, rng)?;
            }
        }
        Ok(())
    }

    fn include_optional(&self, rng: &mut dyn RngCore) -> bool {
        rng.gen_bool(self.options.optional_inclusion_rate.clamp(0.0, 1.0))
    }

    /// Fill the subtree at `id`.
    ///
    /// # Errors
    ///
    /// See [`Filler::fill_instance`].
    pub fn fill_node(
        &self,
        arena: &mut ParameterArena,
        id: NodeId,
        rng: &mut dyn RngCore,
    ) -> Result<(), CoreError> {
        let node = arena.get(id).ok_or(CoreError::UnknownNode(id))?;
        match &node.kind {
            NodeKind::Object(o) => {
                let properties = o.properties.clone();
                for property in properties {
                    if arena[property].required || self.include_optional(rng) {
                        self.fill_node(arena, property, rng)?;
                    }
                }
                Ok(())
            }
            NodeKind::Array(a) => {
                let unique = a.unique_items;
                let count = self.array_length(a.min_items, a.max_items, node.required, rng);
                for _ in 0..count {
                    self.push_item(arena, id, unique, rng)?;
                }
                Ok(())
            }
            NodeKind::Combined(_) => match arena.effective_schema(id) {
                Some(schema) => self.fill_node(arena, schema, rng),
                None => Ok(()),
            },
            _ => self.fill_leaf(arena, id, rng),
        }
    }

    fn array_length(
        &self,
        min_items: Option<u64>,
        max_items: Option<u64>,
        required: bool,
        rng: &mut dyn RngCore,
    ) -> u64 {
        let mut min = min_items.unwrap_or(0);
        let max = max_items
            .unwrap_or(u64::MAX)
            .min(self.options.max_array_elements)
            .max(min);
        if required && min == 0 && max > 0 {
            min = 1;
        }
        rng.gen_range(min..=max)
    }

    fn push_item(
        &self,
        arena: &mut ParameterArena,
        array: NodeId,
        unique: bool,
        rng: &mut dyn RngCore,
    ) -> Result<(), CoreError> {
        for _ in 0..UNIQUE_ITEM_ATTEMPTS {
            let item = arena.push_element_from_reference(array)?;
            self.fill_node(arena, item, rng)?;
            if !unique || !self.duplicates_sibling(arena, array, item) {
                return Ok(());
            }
            arena.detach(item)?;
        }
        debug!(array = %arena[array].name, "no distinct item found for unique array");
        Ok(())
    }

    fn duplicates_sibling(&self, arena: &ParameterArena, array: NodeId, item: NodeId) -> bool {
        let NodeKind::Array(a) = &arena[array].kind else {
            return false;
        };
        let rendered = arena.json_representation(item);
        a.elements
            .iter()
            .filter(|e| **e != item)
            .any(|e| arena.json_representation(*e) == rendered)
    }

    fn fill_leaf(
        &self,
        arena: &mut ParameterArena,
        id: NodeId,
        rng: &mut dyn RngCore,
    ) -> Result<(), CoreError> {
        let node = &arena[id];
        let authenticated = if node.parent().is_none() {
            self.authentication.value_for(&node.name, node.location)
        } else {
            None
        };
        let (value, source) = match authenticated {
            Some(value) => (value, "authentication"),
            None => match self
                .chain
                .provide_value_for(arena, id, self.dictionary, rng)
            {
                Some(provided) => provided,
                None => {
                    debug!(parameter = %node.name, "no provider produced a value");
                    return Ok(());
                }
            },
        };
        debug!(parameter = %node.name, %value, source, "value provided");
        match arena.set_value(id, value) {
            Err(e @ CoreError::TypeMismatch { .. }) => {
                warn!(error = %e, "discarding provided value");
                Ok(())
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictionary::DictionaryEntry;
    use crate::model::{ParameterMeta, ParameterType};
    use rand::SeedableRng;
    use rand::rngs::SmallRng;
    use serde_json::json;

    fn arena_with(name: &str, schema: Value, location: Location) -> (ParameterArena, NodeId) {
        let mut arena = ParameterArena::new("GET /items");
        let id = arena
            .build_parameter(name, &schema, &ParameterMeta::new(location, "listItems"))
            .unwrap();
        let normalized = crate::normalize::normalize(name);
        for node in arena.subtree(id) {
            arena.node_mut(node).unwrap().normalized_name.clone_from(&normalized);
        }
        (arena, id)
    }

    #[test]
    fn dictionary_values_come_first() {
        let mut rng = SmallRng::seed_from_u64(1);
        let (arena, id) = arena_with("itemId", json!({"type": "integer", "enum": [1, 2]}), Location::Query);
        let mut dict = Dictionary::new();
        dict.add_entry(DictionaryEntry::new("itemId", "item_id", ParameterType::Number, json!(2)));
        // non-compliant entries are skipped
        dict.add_entry(DictionaryEntry::new("itemId", "item_id", ParameterType::Number, json!(99)));

        let chain = ProviderChain::default();
        for _ in 0..10 {
            let (value, source) = chain.provide_value_for(&arena, id, &dict, &mut rng).unwrap();
            assert_eq!(source, "dictionary");
            assert_eq!(value, json!(2));
        }
    }

    #[test]
    fn enum_then_pattern_then_candidates() {
        let mut rng = SmallRng::seed_from_u64(2);
        let dict = Dictionary::new();
        let chain = ProviderChain::default();

        let (arena, id) = arena_with("status", json!({"type": "string", "enum": ["a", "b"]}), Location::Query);
        let (value, source) = chain.provide_value_for(&arena, id, &dict, &mut rng).unwrap();
        assert_eq!(source, "enum");
        assert!(value == json!("a") || value == json!("b"));

        let (arena, id) = arena_with("code", json!({"type": "string", "pattern": "^[A-Z]{3}-\\d{2}$"}), Location::Query);
        let (value, source) = chain.provide_value_for(&arena, id, &dict, &mut rng).unwrap();
        assert_eq!(source, "pattern");
        assert!(arena.is_value_compliant(id, &value));

        let (arena, id) = arena_with("limit", json!({"type": "integer", "minimum": 1, "maximum": 5, "example": 3}), Location::Query);
        for _ in 0..20 {
            let (value, source) = chain.provide_value_for(&arena, id, &dict, &mut rng).unwrap();
            assert_eq!(source, "candidate");
            assert!(arena.is_value_compliant(id, &value));
        }
    }

    #[test]
    fn non_compliant_examples_are_never_provided() {
        let mut rng = SmallRng::seed_from_u64(3);
        let (arena, id) = arena_with("name", json!({"type": "string", "maxLength": 3, "example": "too long"}), Location::Query);
        for _ in 0..30 {
            let value = CandidateProvider
                .provide(&arena, id, &Dictionary::new(), &mut rng)
                .unwrap();
            assert_ne!(value, json!("too long"));
        }
    }

    #[test]
    fn authentication_overrides_providers() {
        let mut rng = SmallRng::seed_from_u64(4);
        let (mut arena, id) = arena_with("authorization", json!({"type": "string"}), Location::Header);
        let auth = StaticAuthentication::from_config(&[AuthParameter {
            name: "Authorization".into(),
            location: Location::Header,
            value: "Bearer t".into(),
        }]);
        let chain = ProviderChain::default();
        let dict = Dictionary::new();
        let filler = Filler {
            chain: &chain,
            dictionary: &dict,
            authentication: &auth,
            options: FillOptions::default(),
        };
        filler.fill_node(&mut arena, id, &mut rng).unwrap();
        assert_eq!(arena.value(id), Some(&json!("Bearer t")));
        assert_eq!(auth.value_for("Authorization", Location::Query), None);
    }

    #[test]
    fn fill_respects_required_and_array_bounds() {
        let mut rng = SmallRng::seed_from_u64(5);
        let schema = json!({
            "type": "object",
            "required": ["tags"],
            "properties": {
                "tags": {"type": "array", "minItems": 2, "items": {"type": "string"}},
                "note": {"type": "string"}
            }
        });
        let (mut arena, id) = arena_with("item", schema, Location::RequestBody);
        let chain = ProviderChain::default();
        let dict = Dictionary::new();
        let filler = Filler {
            chain: &chain,
            dictionary: &dict,
            authentication: &StaticAuthentication::default(),
            options: FillOptions {
                optional_inclusion_rate: 0.0,
                max_array_elements: 3,
            },
        };
        filler.fill_node(&mut arena, id, &mut rng).unwrap();

        let body = arena.json_representation(id).unwrap();
        assert!(body.get("note").is_none());
        let tags = body["tags"].as_array().unwrap();
        assert!((2..=3).contains(&tags.len()));
        assert!(arena.is_value_compliant(id, &body));
    }

    #[test]
    fn fill_on_template_is_rejected() {
        let mut rng = SmallRng::seed_from_u64(6);
        let (mut arena, id) = arena_with("q", json!({"type": "string"}), Location::Query);
        arena.freeze();
        let chain = ProviderChain::default();
        let dict = Dictionary::new();
        let filler = Filler {
            chain: &chain,
            dictionary: &dict,
            authentication: &StaticAuthentication::default(),
            options: FillOptions::default(),
        };
        assert!(matches!(
            filler.fill_node(&mut arena, id, &mut rng),
            Err(CoreError::ReadOnlyViolation { .. })
        ));
    }
}
