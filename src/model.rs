//! Core data model: proxies, seats, delegate workloads, and the typed
//! runtime-value keys that flow between them.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque identifier for a user-facing proxy.
pub type ProxyId = Uuid;
/// Opaque identifier for a seat on a delegate workload.
pub type SeatId = Uuid;
/// Opaque identifier for a delegate workload.
pub type DelegateProxyId = Uuid;
/// Opaque identifier for a proxy spec.
pub type SpecId = String;

/// A single wire-level value a runtime value key can hold.
///
/// Kept as an enum rather than a generic so that a heterogeneous
/// `runtime_values` map can exist on one [`Proxy`] without boxing trait
/// objects per entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RuntimeValue {
    String(String),
    Bool(bool),
}

impl RuntimeValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            RuntimeValue::String(s) => Some(s),
            RuntimeValue::Bool(_) => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            RuntimeValue::Bool(b) => Some(*b),
            RuntimeValue::String(_) => None,
        }
    }
}

impl fmt::Display for RuntimeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeValue::String(s) => write!(f, "{s}"),
            RuntimeValue::Bool(b) => write!(f, "{b}"),
        }
    }
}

/// A process-wide, write-once description of a runtime value key.
///
/// The source system registers these ambiently at class-load time via a
/// global registry keyed by environment variable name. The keys this
/// crate actually uses are few and fixed by the wire contract in
/// `SPEC_FULL.md`, so registration collapses to the associated constants
/// below rather than a runtime table; looking one up is just a field
/// read, so there is no "unknown key" failure mode left to guard against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeValueKey {
    /// Stable identifier, e.g. `"SeatId"`.
    pub name: &'static str,
    /// Environment variable name exposed to the delegate workload.
    pub env_var_name: &'static str,
    /// Whether the value is included in the proxy's serialized API form.
    pub include_in_api: bool,
}

impl RuntimeValueKey {
    pub const SEAT_ID: RuntimeValueKey = RuntimeValueKey {
        name: "SeatId",
        env_var_name: "SHINYPROXY_SEAT_ID",
        include_in_api: false,
    };

    pub const DELEGATE_PROXY: RuntimeValueKey = RuntimeValueKey {
        name: "DelegateProxy",
        env_var_name: "SHINYPROXY_DELEGATE_PROXYS",
        include_in_api: false,
    };

    pub const TARGET_ID: RuntimeValueKey = RuntimeValueKey {
        name: "TargetId",
        env_var_name: "SHINYPROXY_TARGET_ID",
        include_in_api: true,
    };

    pub const PUBLIC_PATH: RuntimeValueKey = RuntimeValueKey {
        name: "PublicPath",
        env_var_name: "SHINYPROXY_PUBLIC_PATH",
        include_in_api: true,
    };
}

/// Capability interface implemented by anything that carries runtime
/// values. Replaces the source's abstract base class with a trait so
/// holders other than [`Proxy`] can share the same accessors.
pub trait RuntimeValueHolder {
    fn runtime_values(&self) -> &BTreeMap<String, RuntimeValue>;

    fn get(&self, key: RuntimeValueKey) -> Option<&RuntimeValue> {
        self.runtime_values().get(key.name)
    }
}

/// Status of a user-facing proxy. Transitions are monotonic except the
/// terminal `Stopped` state, which a fresh proxy may cycle back through
/// on restart (modeled by constructing a new [`Proxy`], not by reusing
/// this one).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProxyStatus {
    New,
    Starting,
    Up,
    Stopping,
    Stopped,
    Paused,
}

impl ProxyStatus {
    pub fn is_terminal_for_waiters(&self) -> bool {
        matches!(self, ProxyStatus::Stopping | ProxyStatus::Stopped)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerSpec {
    pub id: String,
    pub image: String,
}

/// A single authentication backend variant.
///
/// The source system selects a backend through a factory and a class
/// hierarchy rooted at an abstract `IAuthenticationBackend`. That seam
/// is modeled here as a closed tagged union. The dispatcher never reads
/// this field; it exists purely so [`ProxySpec`] can describe the
/// surrounding proxy faithfully.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AuthBackend {
    None,
    Simple,
    Ldap,
    Oidc,
    Saml,
    WebService,
    CustomHeader,
}

/// The sharing extension on a [`ProxySpec`]. Its presence enables
/// seat-pooling for that spec; `minimum_seats_available` is opaque to
/// the dispatcher and is consumed only by the (out-of-scope) scaler.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ProxySharingExtension {
    pub minimum_seats_available: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxySpec {
    pub id: SpecId,
    pub container: ContainerSpec,
    pub auth_backend: AuthBackend,
    pub sharing: Option<ProxySharingExtension>,
}

impl ProxySpec {
    pub fn supports_sharing(&self) -> bool {
        self.sharing.is_some()
    }
}

/// Immutable snapshot of a user-facing proxy.
///
/// The source mutates a live proxy object in place (`proxy.copy(target)`).
/// Here a [`Proxy`] never changes after construction; producing an
/// "updated" proxy means building a new snapshot via [`Proxy::retargeted`].
///
/// Keyed by owned `String` rather than `&'static str`: a `Deserialize`
/// impl cannot be derived for a map of `&'static str` keys over a generic
/// lifetime `'de`, and the wire form below needs to deserialize too.
#[derive(Debug, Clone)]
pub struct Proxy {
    pub id: ProxyId,
    pub spec_id: SpecId,
    pub user_id: String,
    pub status: ProxyStatus,
    pub created_ts: i64,
    pub startup_ts: Option<i64>,
    pub display_name: Option<String>,
    pub container: ContainerSpec,
    pub targets: Vec<String>,
    runtime_values: BTreeMap<String, RuntimeValue>,
}

impl RuntimeValueHolder for Proxy {
    fn runtime_values(&self) -> &BTreeMap<String, RuntimeValue> {
        &self.runtime_values
    }
}

impl Proxy {
    pub fn new(id: ProxyId, spec_id: SpecId, user_id: impl Into<String>, container: ContainerSpec, created_ts: i64) -> Self {
        Self {
            id,
            spec_id,
            user_id: user_id.into(),
            status: ProxyStatus::New,
            created_ts,
            startup_ts: None,
            display_name: None,
            container,
            targets: Vec::new(),
            runtime_values: BTreeMap::new(),
        }
    }

    pub fn with_status(mut self, status: ProxyStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_runtime_value(mut self, key: RuntimeValueKey, value: RuntimeValue) -> Self {
        self.runtime_values.insert(key.name.to_string(), value);
        self
    }

    /// Builds the snapshot that `startProxy` returns once a seat has been
    /// claimed: the container gets a fresh id, `targets` gains the
    /// delegate's endpoints, `TargetId`/`SeatId` are set, and `PublicPath`
    /// (if present) has its `proxy.id` substring replaced by `delegate.id`.
    ///
    /// The substring replacement is intentionally unguarded: if the proxy
    /// id happens to be a substring of unrelated text in the path, that
    /// text is replaced too. This mirrors the source's behavior exactly.
    pub fn retargeted(&self, delegate_id: DelegateProxyId, seat_id: SeatId, delegate_targets: &[String], new_container_id: String) -> Proxy {
        let mut next = self.clone();
        next.container.id = new_container_id;
        next.targets.extend(delegate_targets.iter().cloned());
        next.runtime_values.insert(
            RuntimeValueKey::TARGET_ID.name.to_string(),
            RuntimeValue::String(delegate_id.to_string()),
        );
        next.runtime_values.insert(
            RuntimeValueKey::SEAT_ID.name.to_string(),
            RuntimeValue::String(seat_id.to_string()),
        );
        if let Some(RuntimeValue::String(path)) = next.runtime_values.get(RuntimeValueKey::PUBLIC_PATH.name) {
            let rewritten = path.replace(&self.id.to_string(), &delegate_id.to_string());
            next.runtime_values
                .insert(RuntimeValueKey::PUBLIC_PATH.name.to_string(), RuntimeValue::String(rewritten));
        }
        next
    }

    /// Runtime values whose key has `include_in_api == true`, the subset
    /// that crosses the wire. Internal keys like `SeatId` are dropped by
    /// design, not by omission. This is also what [`Proxy`]'s `Serialize`
    /// impl below sends over the wire; anything inserted into
    /// `runtime_values` under a key not listed here never leaves the
    /// process.
    pub fn api_runtime_values(&self) -> BTreeMap<String, RuntimeValue> {
        const API_KEYS: [RuntimeValueKey; 2] = [RuntimeValueKey::TARGET_ID, RuntimeValueKey::PUBLIC_PATH];
        self.runtime_values
            .iter()
            .filter(|(name, _)| API_KEYS.iter().any(|k| k.name == name.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

/// Wire form of [`Proxy`]: identical field set, except `runtime_values`
/// is the `include_in_api` subset rather than the full internal map.
/// Round-tripping a [`Proxy`] through this form drops any
/// `include_in_api == false` runtime value (`SeatId`, `DelegateProxy`) by
/// design — they are internal dispatcher state, never part of the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename = "Proxy")]
struct ProxyWire {
    id: ProxyId,
    spec_id: SpecId,
    user_id: String,
    status: ProxyStatus,
    created_ts: i64,
    startup_ts: Option<i64>,
    display_name: Option<String>,
    container: ContainerSpec,
    targets: Vec<String>,
    #[serde(default)]
    runtime_values: BTreeMap<String, RuntimeValue>,
}

impl Serialize for Proxy {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        ProxyWire {
            id: self.id,
            spec_id: self.spec_id.clone(),
            user_id: self.user_id.clone(),
            status: self.status,
            created_ts: self.created_ts,
            startup_ts: self.startup_ts,
            display_name: self.display_name.clone(),
            container: self.container.clone(),
            targets: self.targets.clone(),
            runtime_values: self.api_runtime_values(),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Proxy {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let wire = ProxyWire::deserialize(deserializer)?;
        Ok(Proxy {
            id: wire.id,
            spec_id: wire.spec_id,
            user_id: wire.user_id,
            status: wire.status,
            created_ts: wire.created_ts,
            startup_ts: wire.startup_ts,
            display_name: wire.display_name,
            container: wire.container,
            targets: wire.targets,
            runtime_values: wire.runtime_values,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Seat {
    pub id: SeatId,
    pub delegate_proxy_id: DelegateProxyId,
    pub spec_id: SpecId,
    pub claimant_proxy_id: Option<ProxyId>,
}

impl Seat {
    pub fn is_claimed(&self) -> bool {
        self.claimant_proxy_id.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct DelegateProxy {
    pub id: DelegateProxyId,
    pub spec_id: SpecId,
    pub targets: Vec<String>,
}
