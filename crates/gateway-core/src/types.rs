use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::{Display, EnumIter, EnumString};
use uuid::Uuid;

use crate::error::GatewayError;

/// Closed set of abstract service classes. Adding a kind is a code change,
/// not a configuration change.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CapabilityKind {
    Asr,
    Tts,
    Llm,
    Vlllm,
    Vad,
}

/// Adapter-specific parameters parsed eagerly from a provider config's
/// opaque `props` map. Realizes the "sum type per capability kind plus a
/// per-adapter typed config parsed from the map on load" design note: a
/// malformed `props` map surfaces `ConfigInvalid` at load time rather than
/// lazily the first time some capability method is invoked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AdapterProps {
    Asr {
        sample_rate_hz: u32,
        language: String,
    },
    Tts {
        voice: String,
        sample_rate_hz: u32,
    },
    Llm {
        model: String,
        #[serde(default)]
        max_tokens: Option<u32>,
        #[serde(default)]
        temperature: Option<f32>,
    },
    Vlllm {
        model: String,
        #[serde(default)]
        max_image_tokens: Option<u32>,
    },
    Vad {
        frame_ms: u32,
        #[serde(default)]
        threshold: Option<f32>,
    },
}

impl AdapterProps {
    /// Parses the raw `props` map for the given capability kind, returning
    /// `ConfigInvalid` on the first structural problem instead of deferring
    /// failure to first use.
    pub fn parse(kind: CapabilityKind, raw: &Map<String, Value>) -> Result<Self, GatewayError> {
        let value = Value::Object(raw.clone());
        let tagged = match kind {
            CapabilityKind::Asr => json_with_tag(value, "asr"),
            CapabilityKind::Tts => json_with_tag(value, "tts"),
            CapabilityKind::Llm => json_with_tag(value, "llm"),
            CapabilityKind::Vlllm => json_with_tag(value, "vlllm"),
            CapabilityKind::Vad => json_with_tag(value, "vad"),
        };
        serde_json::from_value(tagged).map_err(|e| {
            GatewayError::config_invalid(format!(
                "props for capability {kind} do not match the expected shape: {e}"
            ))
        })
    }
}

fn json_with_tag(mut value: Value, tag: &str) -> Value {
    if let Value::Object(map) = &mut value {
        map.insert("kind".to_string(), Value::String(tag.to_string()));
    }
    value
}

/// `(category, name, version)` uniquely identifies a provider config row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProviderKey {
    pub category: CapabilityKind,
    pub name: String,
    pub version: String,
}

impl fmt::Display for ProviderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.category, self.name, self.version)
    }
}

/// A single configured provider version, as stored in `provider_configs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub id: Uuid,
    pub category: CapabilityKind,
    pub name: String,
    pub version: String,
    pub weight: u8,
    pub is_active: bool,
    pub is_default: bool,
    pub adapter_type: String,
    pub props: Map<String, Value>,
    pub health_score: u8,
}

impl ProviderConfig {
    pub fn key(&self) -> ProviderKey {
        ProviderKey {
            category: self.category,
            name: self.name.clone(),
            version: self.version.clone(),
        }
    }

    /// Validates `weight`/`health_score` range invariants from spec §3.
    /// Callers constructing a config from operator input must call this
    /// before persisting.
    pub fn validate(&self) -> Result<(), GatewayError> {
        if self.weight > 100 {
            return Err(GatewayError::config_invalid(format!(
                "weight {} out of range [0,100]",
                self.weight
            )));
        }
        if self.health_score > 100 {
            return Err(GatewayError::config_invalid(format!(
                "health_score {} out of range [0,100]",
                self.health_score
            )));
        }
        if self.name.trim().is_empty() {
            return Err(GatewayError::config_invalid("provider name cannot be empty"));
        }
        if self.version.trim().is_empty() {
            return Err(GatewayError::config_invalid("provider version cannot be empty"));
        }
        Ok(())
    }

    pub fn typed_props(&self) -> Result<AdapterProps, GatewayError> {
        AdapterProps::parse(self.category, &self.props)
    }
}

/// Scope of a capability binding, encoded so the "priority is a scope tag,
/// not an ordering among multiple device bindings" Open Question
/// resolution (spec §9) is enforced by the type: there is no way to
/// construct two simultaneous `Device` priorities for the same kind via the
/// public API, since only one binding per `(scope, kind)` is ever active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum Scope {
    /// Priority band 1..=99 reserved for device-scoped bindings.
    Device { priority: u8 },
    User,
    System,
}

impl Scope {
    pub fn priority_value(&self) -> u16 {
        match self {
            Scope::Device { priority } => (*priority).clamp(1, 99) as u16,
            Scope::User => 100,
            Scope::System => 200,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Scope::Device { .. } => "device",
            Scope::User => "user",
            Scope::System => "system",
        }
    }
}

/// Per-scope association of a capability kind to a provider config, with an
/// optional per-binding config override.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityBinding {
    pub id: Uuid,
    pub scope: Scope,
    pub device_id: Option<String>,
    pub user_id: Option<String>,
    pub kind: CapabilityKind,
    pub provider_name: String,
    pub config_override: Option<Value>,
    pub is_enabled: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Result of the capability resolver (C2): the logical binding only, never
/// a concrete version — version selection is deferred to the grayscale
/// router (C3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectiveBinding {
    pub source: BindingSource,
    pub priority: u16,
    pub kind: CapabilityKind,
    pub name: String,
    pub config_data: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BindingSource {
    Device,
    User,
    System,
}

/// A live, pool-owned adapter object. Opaque and non-`Clone`; only the pool
/// constructs or destroys one, matching spec §3's "Owned exclusively by the
/// pool" invariant.
pub struct ProviderInstanceHandle<T> {
    pub key: ProviderKey,
    pub value: T,
}

impl<T> ProviderInstanceHandle<T> {
    pub fn new(key: ProviderKey, value: T) -> Self {
        Self { key, value }
    }
}

impl<T: fmt::Debug> fmt::Debug for ProviderInstanceHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderInstanceHandle")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Archived,
    Deleted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: Uuid,
    pub device_id: String,
    pub user_id: Option<String>,
    pub start_time: DateTime<Utc>,
    pub status: SessionStatus,
    pub message_count: u32,
    pub end_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
    Tool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// Immutable once written, as spec §3 requires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub session_id: Uuid,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub tool_call_id: Option<String>,
    pub tool_calls: Vec<ToolCall>,
}

impl Message {
    pub fn new(session_id: Uuid, role: Role, content: impl Into<String>) -> Self {
        Self {
            session_id,
            role,
            content: content.into(),
            timestamp: Utc::now(),
            tool_call_id: None,
            tool_calls: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MemoryType {
    Conversation,
    Summary,
    KeyPoints,
}

/// Insert-only from extractors; `use_count`/`last_used` updated by recall.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: Uuid,
    pub user_id: Option<String>,
    pub device_id: String,
    pub session_id: Uuid,
    pub memory_type: MemoryType,
    pub content: String,
    pub importance: u8,
    pub tags: Vec<String>,
    pub use_count: u32,
    pub last_used: Option<DateTime<Utc>>,
    pub is_active: bool,
}

impl MemoryRecord {
    pub fn validate(&self) -> Result<(), GatewayError> {
        if !(1..=10).contains(&self.importance) {
            return Err(GatewayError::config_invalid(format!(
                "memory importance {} out of range [1,10]",
                self.importance
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_priority_values_match_spec_bands() {
        assert_eq!(Scope::Device { priority: 1 }.priority_value(), 1);
        assert_eq!(Scope::Device { priority: 99 }.priority_value(), 99);
        assert_eq!(Scope::User.priority_value(), 100);
        assert_eq!(Scope::System.priority_value(), 200);
    }

    #[test]
    fn device_priority_clamped_into_band() {
        assert_eq!(Scope::Device { priority: 0 }.priority_value(), 1);
    }

    #[test]
    fn provider_config_validate_rejects_out_of_range_weight() {
        let cfg = ProviderConfig {
            id: Uuid::new_v4(),
            category: CapabilityKind::Llm,
            name: "openai".into(),
            version: "v1".into(),
            weight: 150,
            is_active: true,
            is_default: false,
            adapter_type: "openai".into(),
            props: Map::new(),
            health_score: 50,
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn adapter_props_parse_llm_roundtrips() {
        let mut raw = Map::new();
        raw.insert("model".into(), Value::String("gpt-4".into()));
        let parsed = AdapterProps::parse(CapabilityKind::Llm, &raw).unwrap();
        match parsed {
            AdapterProps::Llm { model, .. } => assert_eq!(model, "gpt-4"),
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn adapter_props_parse_rejects_missing_required_field() {
        let raw = Map::new();
        let err = AdapterProps::parse(CapabilityKind::Llm, &raw).unwrap_err();
        assert!(matches!(err, GatewayError::ConfigInvalid { .. }));
    }

    #[test]
    fn memory_record_validate_rejects_out_of_range_importance() {
        let rec = MemoryRecord {
            id: Uuid::new_v4(),
            user_id: None,
            device_id: "d1".into(),
            session_id: Uuid::new_v4(),
            memory_type: MemoryType::Summary,
            content: "x".into(),
            importance: 11,
            tags: vec![],
            use_count: 0,
            last_used: None,
            is_active: true,
        };
        assert!(rec.validate().is_err());
    }
}
