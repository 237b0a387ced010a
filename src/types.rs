// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Core OPC UA types for the browse engine.
//!
//! This module provides the data model shared by every layer of the client:
//!
//! - **NodeId**: all four OPC UA node identifier kinds with canonical parsing
//! - **QualifiedName**: namespace-qualified browse names
//! - **NodeClass / BrowseDirection**: browse filter primitives
//! - **SecurityMode / SecurityPolicy / UserIdentity**: endpoint security model
//! - **EndpointDescriptor**: immutable connection configuration with builder
//!
//! # Examples
//!
//! ```
//! use opcua_browse::types::{NodeId, EndpointDescriptor};
//!
//! // Parse a node ID from its textual form
//! let node: NodeId = "ns=2;s=MyVariable".parse().unwrap();
//! assert_eq!(node.to_opc_string(), "ns=2;s=MyVariable");
//!
//! // Describe an endpoint
//! let endpoint = EndpointDescriptor::builder()
//!     .url("opc.tcp://localhost:4840")
//!     .build()
//!     .unwrap();
//! ```

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ClientError, ConfigError};

// =============================================================================
// NodeId
// =============================================================================

/// OPC UA node identifier.
///
/// A `NodeId` uniquely identifies a node within a server's address space. It
/// pairs a namespace index with one of four identifier kinds (numeric, string,
/// GUID, or opaque byte string). Equality is structural.
///
/// # Examples
///
/// ```
/// use opcua_browse::types::NodeId;
///
/// let numeric = NodeId::numeric(2, 4);
/// assert_eq!(numeric.to_opc_string(), "ns=2;i=4");
///
/// let parsed: NodeId = "ns=3;s=MyVariable".parse().unwrap();
/// assert_eq!(parsed, NodeId::string(3, "MyVariable"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId {
    /// Namespace index (0 = OPC UA standard namespace).
    pub namespace_index: u16,

    /// The node identifier.
    pub identifier: NodeIdentifier,
}

impl NodeId {
    // =========================================================================
    // Constructors
    // =========================================================================

    /// Creates a numeric node ID.
    #[inline]
    pub fn numeric(namespace_index: u16, value: u32) -> Self {
        Self {
            namespace_index,
            identifier: NodeIdentifier::Numeric(value),
        }
    }

    /// Creates a string node ID.
    #[inline]
    pub fn string(namespace_index: u16, value: impl Into<String>) -> Self {
        Self {
            namespace_index,
            identifier: NodeIdentifier::String(value.into()),
        }
    }

    /// Creates a GUID node ID.
    #[inline]
    pub fn guid(namespace_index: u16, value: Uuid) -> Self {
        Self {
            namespace_index,
            identifier: NodeIdentifier::Guid(value),
        }
    }

    /// Creates an opaque (byte string) node ID.
    #[inline]
    pub fn opaque(namespace_index: u16, value: Vec<u8>) -> Self {
        Self {
            namespace_index,
            identifier: NodeIdentifier::Opaque(value),
        }
    }

    // =========================================================================
    // Standard Node IDs
    // =========================================================================

    /// Root folder node (ns=0, i=84).
    pub const ROOT_FOLDER: NodeId = NodeId {
        namespace_index: 0,
        identifier: NodeIdentifier::Numeric(84),
    };

    /// Objects folder node (ns=0, i=85). Default browse root.
    pub const OBJECTS_FOLDER: NodeId = NodeId {
        namespace_index: 0,
        identifier: NodeIdentifier::Numeric(85),
    };

    /// Types folder node (ns=0, i=86).
    pub const TYPES_FOLDER: NodeId = NodeId {
        namespace_index: 0,
        identifier: NodeIdentifier::Numeric(86),
    };

    /// Views folder node (ns=0, i=87).
    pub const VIEWS_FOLDER: NodeId = NodeId {
        namespace_index: 0,
        identifier: NodeIdentifier::Numeric(87),
    };

    // =========================================================================
    // Properties
    // =========================================================================

    /// Returns `true` if this is a numeric identifier.
    #[inline]
    pub const fn is_numeric(&self) -> bool {
        matches!(self.identifier, NodeIdentifier::Numeric(_))
    }

    /// Returns `true` if this is a string identifier.
    #[inline]
    pub const fn is_string(&self) -> bool {
        matches!(self.identifier, NodeIdentifier::String(_))
    }

    /// Returns `true` if this is in the standard namespace (ns=0).
    #[inline]
    pub const fn is_standard(&self) -> bool {
        self.namespace_index == 0
    }

    /// Returns the null node ID (ns=0, i=0).
    #[inline]
    pub const fn null() -> Self {
        Self {
            namespace_index: 0,
            identifier: NodeIdentifier::Numeric(0),
        }
    }

    /// Returns `true` if this is the null node ID.
    #[inline]
    pub fn is_null(&self) -> bool {
        self.namespace_index == 0 && matches!(self.identifier, NodeIdentifier::Numeric(0))
    }

    // =========================================================================
    // Conversion
    // =========================================================================

    /// Converts to the canonical OPC UA string format.
    ///
    /// The canonical form always carries the namespace:
    /// `ns=<namespace>;{i|s|g|b}=<identifier>`. Parsing a canonical string and
    /// formatting it again yields the identical string.
    pub fn to_opc_string(&self) -> String {
        format!("ns={};{}", self.namespace_index, self.identifier)
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::null()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_opc_string())
    }
}

impl FromStr for NodeId {
    type Err = ClientError;

    /// Parses a NodeId from OPC UA string format.
    ///
    /// Supported forms:
    /// - `ns=2;i=4` (numeric)
    /// - `ns=3;s=MyVariable` (string)
    /// - `ns=2;g=550e8400-e29b-41d4-a716-446655440000` (GUID)
    /// - `ns=2;b=SGVsbG8=` (opaque, base64)
    /// - `i=85` (numeric, namespace 0; normalized to `ns=0;i=85`)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();

        let (namespace_index, identifier_part) = if let Some(rest) = s.strip_prefix("ns=") {
            let (ns_str, id_part) = rest.split_once(';').ok_or_else(|| {
                ClientError::configuration(ConfigError::invalid_node_id(
                    s,
                    "missing identifier after namespace",
                ))
            })?;
            let ns: u16 = ns_str.parse().map_err(|_| {
                ClientError::configuration(ConfigError::invalid_node_id(
                    s,
                    "invalid namespace index",
                ))
            })?;
            (ns, id_part)
        } else {
            (0, s)
        };

        let identifier = if let Some(id) = identifier_part.strip_prefix("i=") {
            let value: u32 = id.parse().map_err(|_| {
                ClientError::configuration(ConfigError::invalid_node_id(
                    s,
                    "invalid numeric identifier",
                ))
            })?;
            NodeIdentifier::Numeric(value)
        } else if let Some(id) = identifier_part.strip_prefix("s=") {
            NodeIdentifier::String(id.to_string())
        } else if let Some(id) = identifier_part.strip_prefix("g=") {
            let uuid = Uuid::parse_str(id).map_err(|e| {
                ClientError::configuration(ConfigError::invalid_node_id(
                    s,
                    format!("invalid GUID: {}", e),
                ))
            })?;
            NodeIdentifier::Guid(uuid)
        } else if let Some(id) = identifier_part.strip_prefix("b=") {
            let bytes = BASE64.decode(id).map_err(|e| {
                ClientError::configuration(ConfigError::invalid_node_id(
                    s,
                    format!("invalid base64: {}", e),
                ))
            })?;
            NodeIdentifier::Opaque(bytes)
        } else {
            return Err(ClientError::configuration(ConfigError::invalid_node_id(
                s,
                "unknown identifier type, expected i=, s=, g=, or b=",
            )));
        };

        Ok(Self {
            namespace_index,
            identifier,
        })
    }
}

// =============================================================================
// NodeIdentifier
// =============================================================================

/// The four OPC UA node identifier kinds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum NodeIdentifier {
    /// Numeric identifier (most efficient, used for standard nodes).
    Numeric(u32),

    /// String identifier (human-readable, used for custom nodes).
    String(String),

    /// GUID identifier (globally unique).
    Guid(Uuid),

    /// Opaque identifier (application-specific byte array).
    Opaque(Vec<u8>),
}

impl NodeIdentifier {
    /// Returns the identifier type prefix used in the textual form.
    pub const fn type_prefix(&self) -> char {
        match self {
            Self::Numeric(_) => 'i',
            Self::String(_) => 's',
            Self::Guid(_) => 'g',
            Self::Opaque(_) => 'b',
        }
    }
}

impl fmt::Display for NodeIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Numeric(v) => write!(f, "i={}", v),
            Self::String(v) => write!(f, "s={}", v),
            Self::Guid(v) => write!(f, "g={}", v),
            Self::Opaque(v) => write!(f, "b={}", BASE64.encode(v)),
        }
    }
}

// =============================================================================
// QualifiedName
// =============================================================================

/// OPC UA qualified name (namespace index + name).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QualifiedName {
    /// Namespace index.
    pub namespace_index: u16,

    /// The name string.
    pub name: String,
}

impl QualifiedName {
    /// Creates a new qualified name.
    pub fn new(namespace_index: u16, name: impl Into<String>) -> Self {
        Self {
            namespace_index,
            name: name.into(),
        }
    }

    /// Creates a qualified name in the standard namespace.
    pub fn standard(name: impl Into<String>) -> Self {
        Self::new(0, name)
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace_index == 0 {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}:{}", self.namespace_index, self.name)
        }
    }
}

impl From<&str> for QualifiedName {
    fn from(s: &str) -> Self {
        if let Some((ns, name)) = s.split_once(':') {
            if let Ok(ns_idx) = ns.parse::<u16>() {
                return Self::new(ns_idx, name);
            }
        }
        Self::standard(s)
    }
}

// =============================================================================
// NodeClass
// =============================================================================

/// OPC UA node class.
///
/// The discriminant values double as the bits of the node-class mask used in
/// browse requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeClass {
    /// Object node.
    Object,

    /// Variable node.
    Variable,

    /// Method node.
    Method,

    /// Object type definition.
    ObjectType,

    /// Variable type definition.
    VariableType,

    /// Reference type definition.
    ReferenceType,

    /// Data type definition.
    DataType,

    /// View node.
    View,
}

impl NodeClass {
    /// Returns the OPC UA node class mask bit.
    pub const fn mask_bit(&self) -> u32 {
        match self {
            Self::Object => 1,
            Self::Variable => 2,
            Self::Method => 4,
            Self::ObjectType => 8,
            Self::VariableType => 16,
            Self::ReferenceType => 32,
            Self::DataType => 64,
            Self::View => 128,
        }
    }

    /// Creates from a node class mask bit.
    pub fn from_mask_bit(value: u32) -> Option<Self> {
        match value {
            1 => Some(Self::Object),
            2 => Some(Self::Variable),
            4 => Some(Self::Method),
            8 => Some(Self::ObjectType),
            16 => Some(Self::VariableType),
            32 => Some(Self::ReferenceType),
            64 => Some(Self::DataType),
            128 => Some(Self::View),
            _ => None,
        }
    }

    /// Returns `true` if nodes of this class can be browsed further.
    #[inline]
    pub const fn is_browsable(&self) -> bool {
        matches!(self, Self::Object | Self::View)
    }

    /// Returns the display name.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Object => "Object",
            Self::Variable => "Variable",
            Self::Method => "Method",
            Self::ObjectType => "ObjectType",
            Self::VariableType => "VariableType",
            Self::ReferenceType => "ReferenceType",
            Self::DataType => "DataType",
            Self::View => "View",
        }
    }
}

impl fmt::Display for NodeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

// =============================================================================
// BrowseDirection
// =============================================================================

/// Direction of reference traversal during a browse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BrowseDirection {
    /// Follow references from source to target.
    #[default]
    Forward,

    /// Follow references from target to source.
    Inverse,

    /// Follow references in both directions.
    Both,
}

impl BrowseDirection {
    /// Returns the OPC UA wire value.
    pub const fn value(&self) -> u32 {
        match self {
            Self::Forward => 0,
            Self::Inverse => 1,
            Self::Both => 2,
        }
    }
}

impl fmt::Display for BrowseDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Forward => write!(f, "Forward"),
            Self::Inverse => write!(f, "Inverse"),
            Self::Both => write!(f, "Both"),
        }
    }
}

// =============================================================================
// SecurityMode
// =============================================================================

/// OPC UA message security mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SecurityMode {
    /// Messages are neither signed nor encrypted.
    #[default]
    None,

    /// Messages are signed but not encrypted.
    Sign,

    /// Messages are signed and encrypted.
    SignAndEncrypt,
}

impl SecurityMode {
    /// Returns the display name.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Sign => "Sign",
            Self::SignAndEncrypt => "SignAndEncrypt",
        }
    }
}

impl fmt::Display for SecurityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for SecurityMode {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace(['-', '_'], "").as_str() {
            "none" | "nosecurity" | "" => Ok(Self::None),
            "sign" | "signed" => Ok(Self::Sign),
            "signandencrypt" | "signencrypt" | "encrypted" => Ok(Self::SignAndEncrypt),
            _ => Err(ClientError::configuration(
                ConfigError::invalid_security(format!("unknown security mode '{}'", s)),
            )),
        }
    }
}

// =============================================================================
// SecurityPolicy
// =============================================================================

/// OPC UA security policy (cryptographic algorithm suite).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SecurityPolicy {
    /// No security policy (use with `SecurityMode::None`).
    #[default]
    None,

    /// Basic128Rsa15 (deprecated, legacy servers only).
    Basic128Rsa15,

    /// Basic256 (deprecated, legacy servers only).
    Basic256,

    /// Basic256Sha256 (recommended minimum).
    Basic256Sha256,

    /// Aes128Sha256RsaOaep.
    Aes128Sha256RsaOaep,

    /// Aes256Sha256RsaPss (most secure).
    Aes256Sha256RsaPss,
}

impl SecurityPolicy {
    /// Returns the OPC UA policy URI.
    pub const fn uri(&self) -> &'static str {
        match self {
            Self::None => "http://opcfoundation.org/UA/SecurityPolicy#None",
            Self::Basic128Rsa15 => "http://opcfoundation.org/UA/SecurityPolicy#Basic128Rsa15",
            Self::Basic256 => "http://opcfoundation.org/UA/SecurityPolicy#Basic256",
            Self::Basic256Sha256 => "http://opcfoundation.org/UA/SecurityPolicy#Basic256Sha256",
            Self::Aes128Sha256RsaOaep => {
                "http://opcfoundation.org/UA/SecurityPolicy#Aes128_Sha256_RsaOaep"
            }
            Self::Aes256Sha256RsaPss => {
                "http://opcfoundation.org/UA/SecurityPolicy#Aes256_Sha256_RsaPss"
            }
        }
    }

    /// Returns the short name.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Basic128Rsa15 => "Basic128Rsa15",
            Self::Basic256 => "Basic256",
            Self::Basic256Sha256 => "Basic256Sha256",
            Self::Aes128Sha256RsaOaep => "Aes128Sha256RsaOaep",
            Self::Aes256Sha256RsaPss => "Aes256Sha256RsaPss",
        }
    }

    /// Returns `true` if certificate material is required for this policy.
    #[inline]
    pub const fn requires_certificates(&self) -> bool {
        !matches!(self, Self::None)
    }
}

impl fmt::Display for SecurityPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for SecurityPolicy {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace(['-', '_'], "").as_str() {
            "none" | "" => Ok(Self::None),
            "basic128rsa15" | "basic128" => Ok(Self::Basic128Rsa15),
            "basic256" => Ok(Self::Basic256),
            "basic256sha256" => Ok(Self::Basic256Sha256),
            "aes128sha256rsaoaep" | "aes128" => Ok(Self::Aes128Sha256RsaOaep),
            "aes256sha256rsapss" | "aes256" => Ok(Self::Aes256Sha256RsaPss),
            _ => Err(ClientError::configuration(
                ConfigError::invalid_security(format!("unknown security policy '{}'", s)),
            )),
        }
    }
}

// =============================================================================
// UserIdentity
// =============================================================================

/// How the client authenticates to the server during session activation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UserIdentity {
    /// Anonymous authentication.
    #[default]
    Anonymous,

    /// Username and password authentication.
    UserName {
        /// The username.
        username: String,
        /// The password.
        password: String,
    },

    /// X.509 certificate authentication.
    Certificate {
        /// PEM-encoded certificate.
        certificate_pem: String,
        /// PEM-encoded private key.
        private_key_pem: String,
    },
}

impl UserIdentity {
    /// Returns `true` if this is anonymous authentication.
    #[inline]
    pub fn is_anonymous(&self) -> bool {
        matches!(self, Self::Anonymous)
    }

    /// Returns the identity type name.
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Anonymous => "Anonymous",
            Self::UserName { .. } => "UserName",
            Self::Certificate { .. } => "Certificate",
        }
    }
}

impl fmt::Display for UserIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Anonymous => write!(f, "Anonymous"),
            Self::UserName { username, .. } => write!(f, "UserName({})", username),
            Self::Certificate { .. } => write!(f, "Certificate"),
        }
    }
}

// =============================================================================
// EndpointDescriptor
// =============================================================================

/// Immutable description of a server endpoint and how to connect to it.
///
/// An `EndpointDescriptor` is read-only once built and may be shared across
/// concurrent browse runs.
///
/// # Examples
///
/// ```
/// use opcua_browse::types::{EndpointDescriptor, SecurityMode, SecurityPolicy};
///
/// let endpoint = EndpointDescriptor::builder()
///     .url("opc.tcp://plant-server:4840")
///     .security_mode(SecurityMode::None)
///     .security_policy(SecurityPolicy::None)
///     .build()
///     .unwrap();
/// assert_eq!(endpoint.url, "opc.tcp://plant-server:4840");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointDescriptor {
    /// Server endpoint URL (e.g. "opc.tcp://localhost:4840").
    pub url: String,

    /// Message security mode.
    #[serde(default)]
    pub security_mode: SecurityMode,

    /// Security policy.
    #[serde(default)]
    pub security_policy: SecurityPolicy,

    /// User identity presented during session activation.
    #[serde(default)]
    pub identity: UserIdentity,

    /// Application name reported to the server.
    #[serde(default = "default_application_name")]
    pub application_name: String,

    /// Session name, defaults to the application name when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_name: Option<String>,

    /// PEM-encoded client certificate (required for non-None policies).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate_pem: Option<String>,

    /// PEM-encoded client private key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub private_key_pem: Option<String>,

    /// Requested session timeout.
    #[serde(default = "default_session_timeout", with = "humantime_serde")]
    pub session_timeout: Duration,

    /// Per-request timeout on the transport channel.
    #[serde(default = "default_request_timeout", with = "humantime_serde")]
    pub request_timeout: Duration,

    /// Timeout for establishing the transport connection.
    #[serde(default = "default_connect_timeout", with = "humantime_serde")]
    pub connect_timeout: Duration,
}

fn default_application_name() -> String {
    "opcua-browse client".to_string()
}

fn default_session_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(10)
}

impl EndpointDescriptor {
    /// Creates a new builder.
    pub fn builder() -> EndpointDescriptorBuilder {
        EndpointDescriptorBuilder::default()
    }

    /// Creates a descriptor with just the URL and defaults for the rest.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            security_mode: SecurityMode::default(),
            security_policy: SecurityPolicy::default(),
            identity: UserIdentity::default(),
            application_name: default_application_name(),
            session_name: None,
            certificate_pem: None,
            private_key_pem: None,
            session_timeout: default_session_timeout(),
            request_timeout: default_request_timeout(),
            connect_timeout: default_connect_timeout(),
        }
    }

    /// Validates this descriptor.
    pub fn validate(&self) -> Result<(), ClientError> {
        if self.url.is_empty() {
            return Err(ClientError::configuration(ConfigError::missing_field("url")));
        }

        if !self.url.starts_with("opc.tcp://") {
            return Err(ClientError::configuration(ConfigError::invalid_endpoint(
                &self.url,
                "endpoint URL must start with opc.tcp://",
            )));
        }

        // Mode and policy must agree on whether security is in play.
        if self.security_mode != SecurityMode::None && self.security_policy == SecurityPolicy::None
        {
            return Err(ClientError::configuration(ConfigError::invalid_security(
                "security mode requires a security policy other than None",
            )));
        }
        if self.security_mode == SecurityMode::None && self.security_policy != SecurityPolicy::None
        {
            return Err(ClientError::configuration(ConfigError::invalid_security(
                "security policy requires a security mode other than None",
            )));
        }

        if self.security_policy.requires_certificates()
            && (self.certificate_pem.is_none() || self.private_key_pem.is_none())
        {
            return Err(ClientError::configuration(ConfigError::missing_field(
                "certificate_pem/private_key_pem",
            )));
        }

        if self.session_timeout.is_zero() || self.request_timeout.is_zero() {
            return Err(ClientError::configuration(ConfigError::invalid_security(
                "timeouts must be greater than zero",
            )));
        }

        Ok(())
    }

    /// Returns the effective session name.
    pub fn effective_session_name(&self) -> &str {
        self.session_name.as_deref().unwrap_or(&self.application_name)
    }

    /// Returns `true` if this endpoint uses message security.
    #[inline]
    pub fn uses_security(&self) -> bool {
        self.security_mode != SecurityMode::None
    }
}

// =============================================================================
// EndpointDescriptorBuilder
// =============================================================================

/// Builder for [`EndpointDescriptor`].
#[derive(Debug, Default)]
pub struct EndpointDescriptorBuilder {
    url: Option<String>,
    security_mode: Option<SecurityMode>,
    security_policy: Option<SecurityPolicy>,
    identity: Option<UserIdentity>,
    application_name: Option<String>,
    session_name: Option<String>,
    certificate_pem: Option<String>,
    private_key_pem: Option<String>,
    session_timeout: Option<Duration>,
    request_timeout: Option<Duration>,
    connect_timeout: Option<Duration>,
}

impl EndpointDescriptorBuilder {
    /// Sets the server endpoint URL.
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Sets the security mode.
    pub fn security_mode(mut self, mode: SecurityMode) -> Self {
        self.security_mode = Some(mode);
        self
    }

    /// Sets the security policy.
    pub fn security_policy(mut self, policy: SecurityPolicy) -> Self {
        self.security_policy = Some(policy);
        self
    }

    /// Sets username/password authentication.
    pub fn username(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.identity = Some(UserIdentity::UserName {
            username: username.into(),
            password: password.into(),
        });
        self
    }

    /// Sets anonymous authentication.
    pub fn anonymous(mut self) -> Self {
        self.identity = Some(UserIdentity::Anonymous);
        self
    }

    /// Sets the application name.
    pub fn application_name(mut self, name: impl Into<String>) -> Self {
        self.application_name = Some(name.into());
        self
    }

    /// Sets the session name.
    pub fn session_name(mut self, name: impl Into<String>) -> Self {
        self.session_name = Some(name.into());
        self
    }

    /// Sets the client certificate material.
    pub fn certificate(
        mut self,
        certificate_pem: impl Into<String>,
        private_key_pem: impl Into<String>,
    ) -> Self {
        self.certificate_pem = Some(certificate_pem.into());
        self.private_key_pem = Some(private_key_pem.into());
        self
    }

    /// Sets the requested session timeout.
    pub fn session_timeout(mut self, timeout: Duration) -> Self {
        self.session_timeout = Some(timeout);
        self
    }

    /// Sets the per-request timeout.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Sets the connect timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Builds and validates the descriptor.
    pub fn build(self) -> Result<EndpointDescriptor, ClientError> {
        let url = self
            .url
            .ok_or_else(|| ClientError::configuration(ConfigError::missing_field("url")))?;

        let descriptor = EndpointDescriptor {
            url,
            security_mode: self.security_mode.unwrap_or_default(),
            security_policy: self.security_policy.unwrap_or_default(),
            identity: self.identity.unwrap_or_default(),
            application_name: self.application_name.unwrap_or_else(default_application_name),
            session_name: self.session_name,
            certificate_pem: self.certificate_pem,
            private_key_pem: self.private_key_pem,
            session_timeout: self.session_timeout.unwrap_or_else(default_session_timeout),
            request_timeout: self.request_timeout.unwrap_or_else(default_request_timeout),
            connect_timeout: self.connect_timeout.unwrap_or_else(default_connect_timeout),
        };

        descriptor.validate()?;
        Ok(descriptor)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_canonical_round_trip() {
        let cases = [
            "ns=0;i=85",
            "ns=2;i=4",
            "ns=3;s=MyVariable",
            "ns=2;s=Device.Temperature",
            "ns=2;g=550e8400-e29b-41d4-a716-446655440000",
            "ns=4;b=SGVsbG8=",
        ];

        for case in cases {
            let parsed: NodeId = case.parse().unwrap();
            assert_eq!(parsed.to_opc_string(), case, "round trip failed for {}", case);
        }
    }

    #[test]
    fn test_node_id_bare_form_normalizes() {
        let parsed: NodeId = "i=85".parse().unwrap();
        assert_eq!(parsed, NodeId::OBJECTS_FOLDER);
        assert_eq!(parsed.to_opc_string(), "ns=0;i=85");
    }

    #[test]
    fn test_node_id_parse_errors() {
        assert!("ns=2".parse::<NodeId>().is_err());
        assert!("ns=x;i=1".parse::<NodeId>().is_err());
        assert!("ns=2;i=abc".parse::<NodeId>().is_err());
        assert!("ns=2;q=1".parse::<NodeId>().is_err());
        assert!("ns=2;g=not-a-guid".parse::<NodeId>().is_err());
        assert!("ns=2;b=!!".parse::<NodeId>().is_err());
    }

    #[test]
    fn test_node_id_structural_equality() {
        assert_eq!(NodeId::numeric(2, 4), "ns=2;i=4".parse().unwrap());
        assert_ne!(NodeId::numeric(2, 4), NodeId::numeric(3, 4));
        assert_ne!(NodeId::numeric(2, 4), NodeId::string(2, "4"));
    }

    #[test]
    fn test_qualified_name_parsing() {
        let qn = QualifiedName::from("2:Temperature");
        assert_eq!(qn.namespace_index, 2);
        assert_eq!(qn.name, "Temperature");

        let qn = QualifiedName::from("Temperature");
        assert_eq!(qn.namespace_index, 0);
        assert_eq!(qn.to_string(), "Temperature");
    }

    #[test]
    fn test_node_class_mask_bits() {
        assert_eq!(NodeClass::Object.mask_bit(), 1);
        assert_eq!(NodeClass::Variable.mask_bit(), 2);
        assert_eq!(NodeClass::View.mask_bit(), 128);
        assert_eq!(NodeClass::from_mask_bit(4), Some(NodeClass::Method));
        assert_eq!(NodeClass::from_mask_bit(3), None);
        assert!(NodeClass::Object.is_browsable());
        assert!(!NodeClass::Variable.is_browsable());
    }

    #[test]
    fn test_security_mode_parsing() {
        assert_eq!("none".parse::<SecurityMode>().unwrap(), SecurityMode::None);
        assert_eq!("Sign".parse::<SecurityMode>().unwrap(), SecurityMode::Sign);
        assert_eq!(
            "SignAndEncrypt".parse::<SecurityMode>().unwrap(),
            SecurityMode::SignAndEncrypt
        );
        assert!("bogus".parse::<SecurityMode>().is_err());
    }

    #[test]
    fn test_security_policy_parsing() {
        assert_eq!(
            "Basic256Sha256".parse::<SecurityPolicy>().unwrap(),
            SecurityPolicy::Basic256Sha256
        );
        assert!(SecurityPolicy::Basic256Sha256.requires_certificates());
        assert!(!SecurityPolicy::None.requires_certificates());
    }

    #[test]
    fn test_endpoint_builder_defaults() {
        let endpoint = EndpointDescriptor::builder()
            .url("opc.tcp://localhost:4840")
            .build()
            .unwrap();

        assert_eq!(endpoint.security_mode, SecurityMode::None);
        assert!(endpoint.identity.is_anonymous());
        assert_eq!(endpoint.request_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_endpoint_validation() {
        // Missing URL
        assert!(EndpointDescriptor::builder().build().is_err());

        // Wrong scheme
        assert!(EndpointDescriptor::builder()
            .url("http://localhost:4840")
            .build()
            .is_err());

        // Mode without policy
        assert!(EndpointDescriptor::builder()
            .url("opc.tcp://localhost:4840")
            .security_mode(SecurityMode::Sign)
            .build()
            .is_err());

        // Secure policy without certificate material
        assert!(EndpointDescriptor::builder()
            .url("opc.tcp://localhost:4840")
            .security_mode(SecurityMode::Sign)
            .security_policy(SecurityPolicy::Basic256Sha256)
            .build()
            .is_err());

        // Secure policy with certificate material
        assert!(EndpointDescriptor::builder()
            .url("opc.tcp://localhost:4840")
            .security_mode(SecurityMode::Sign)
            .security_policy(SecurityPolicy::Basic256Sha256)
            .certificate("CERT", "KEY")
            .build()
            .is_ok());
    }
}
