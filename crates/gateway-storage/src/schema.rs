/// Table definitions for the embedded SQLite backend. Conceptually the same
/// tables spec §6 names for any backend: `provider_configs`,
/// `ai_capabilities`, `user_capabilities`, `device_capabilities`,
/// `system_configs`, `global_configs`, `sessions`, `messages`, `memories`.
///
/// `ai_capabilities` catalogs the closed `CapabilityKind` enum for
/// referential/operator-display purposes; the resolution algorithm itself
/// reads `device_capabilities`, `user_capabilities` and `system_configs`
/// directly (see DESIGN.md for this Open Question resolution).
/// `system_configs` holds the `"default.<kind>" -> provider name` mappings
/// consulted at resolver step 3; `global_configs` is a free-form key/value
/// store for other operator-set values outside the resolution path.
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS provider_configs (
    id TEXT PRIMARY KEY,
    category TEXT NOT NULL,
    name TEXT NOT NULL,
    version TEXT NOT NULL,
    weight INTEGER NOT NULL DEFAULT 0,
    is_active INTEGER NOT NULL DEFAULT 1,
    is_default INTEGER NOT NULL DEFAULT 0,
    adapter_type TEXT NOT NULL,
    props TEXT NOT NULL DEFAULT '{}',
    health_score INTEGER NOT NULL DEFAULT 100,
    UNIQUE(category, name, version)
);

CREATE TABLE IF NOT EXISTS ai_capabilities (
    kind TEXT PRIMARY KEY,
    description TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS device_capabilities (
    id TEXT PRIMARY KEY,
    device_id TEXT NOT NULL,
    kind TEXT NOT NULL,
    provider_name TEXT NOT NULL,
    priority INTEGER NOT NULL DEFAULT 1,
    config_override TEXT,
    is_enabled INTEGER NOT NULL DEFAULT 1,
    is_active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_device_capabilities_lookup
    ON device_capabilities(device_id, kind, is_enabled);

CREATE TABLE IF NOT EXISTS user_capabilities (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    kind TEXT NOT NULL,
    provider_name TEXT NOT NULL,
    config_override TEXT,
    is_active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_user_capabilities_lookup
    ON user_capabilities(user_id, kind, is_active, created_at);

CREATE TABLE IF NOT EXISTS system_configs (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS global_configs (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS sessions (
    session_id TEXT PRIMARY KEY,
    device_id TEXT NOT NULL,
    user_id TEXT,
    start_time TEXT NOT NULL,
    status TEXT NOT NULL,
    message_count INTEGER NOT NULL DEFAULT 0,
    end_time TEXT
);

CREATE TABLE IF NOT EXISTS messages (
    session_id TEXT NOT NULL,
    seq INTEGER NOT NULL,
    role TEXT NOT NULL,
    content TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    tool_call_id TEXT,
    tool_calls TEXT NOT NULL DEFAULT '[]',
    PRIMARY KEY (session_id, seq)
);

CREATE TABLE IF NOT EXISTS memories (
    id TEXT PRIMARY KEY,
    user_id TEXT,
    device_id TEXT NOT NULL,
    session_id TEXT NOT NULL,
    memory_type TEXT NOT NULL,
    content TEXT NOT NULL,
    importance INTEGER NOT NULL,
    tags TEXT NOT NULL DEFAULT '[]',
    use_count INTEGER NOT NULL DEFAULT 0,
    last_used TEXT,
    is_active INTEGER NOT NULL DEFAULT 1
);
CREATE INDEX IF NOT EXISTS idx_memories_recall
    ON memories(device_id, user_id, is_active, importance, last_used, use_count);
"#;
