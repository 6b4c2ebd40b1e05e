//! Scope keys and request arguments.
//!
//! A scope key names the state a request is counted against. Limiters are
//! generic over the argument shape through [`ScopeArguments`], so the
//! endpoint-scoped and limiter-id-scoped limiters share one implementation.

use crate::error::ThrottleError;
use std::fmt;

/// Identity under which counters are isolated.
///
/// Equality and hashing are structural, so two endpoint keys with the same
/// method and URL share state.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ScopeKey {
    /// One counter for all traffic
    Global,
    /// Per method and normalized URL
    Endpoint {
        /// HTTP method, e.g. `GET`
        method: String,
        /// Normalized URL, e.g. `api.com/users/{id}`
        normalized_url: String,
    },
    /// Per arbitrary limiter id, e.g. a remedy name
    Limiter(String),
}

impl fmt::Display for ScopeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopeKey::Global => write!(f, "global"),
            ScopeKey::Endpoint {
                method,
                normalized_url,
            } => write!(f, "{} {}", method, normalized_url),
            ScopeKey::Limiter(id) => write!(f, "limiter:{}", id),
        }
    }
}

/// Opaque group identifier, typically derived from a header value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupId(String);

impl GroupId {
    /// Wrap a group id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw id.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the id is empty (and therefore unusable for grouping).
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for GroupId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for GroupId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Whether a request is counted on the scope's default counter or on a
/// per-group counter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Grouping {
    /// Count against the scope's default counter
    #[default]
    Ungrouped,
    /// Count against the counter of this group
    Grouped(GroupId),
}

impl Grouping {
    /// Group the request under `id`.
    pub fn grouped(id: impl Into<GroupId>) -> Self {
        Grouping::Grouped(id.into())
    }

    /// Reject grouping with an empty group id.
    pub fn validate(&self) -> Result<(), ThrottleError> {
        match self {
            Grouping::Grouped(id) if id.is_empty() => Err(ThrottleError::MissingGroupId),
            _ => Ok(()),
        }
    }

    /// The group id, if grouped.
    pub fn group_id(&self) -> Option<&GroupId> {
        match self {
            Grouping::Ungrouped => None,
            Grouping::Grouped(id) => Some(id),
        }
    }
}

/// Argument shape accepted by a keyed rate limiter.
pub trait ScopeArguments: Send + Sync {
    /// Validate the arguments and derive the scope key.
    fn scope_key(&self) -> Result<ScopeKey, ThrottleError>;

    /// How the request is grouped inside its scope.
    fn grouping(&self) -> &Grouping;
}

/// Whether endpoint-shaped arguments address the global scope or a single endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RequestScope {
    /// All endpoints share one scope
    #[default]
    Global,
    /// Each method and URL pair has its own scope
    Endpoint,
}

/// Arguments for limiters keyed by endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EndpointArguments {
    /// Global or per-endpoint scope
    pub scope: RequestScope,
    /// HTTP method, required for endpoint scope
    pub method: String,
    /// Normalized URL, required for endpoint scope
    pub normalized_url: String,
    /// Grouping inside the scope
    pub grouping: Grouping,
}

impl EndpointArguments {
    /// Arguments for the global scope.
    pub fn global(grouping: Grouping) -> Self {
        Self {
            scope: RequestScope::Global,
            grouping,
            ..Self::default()
        }
    }

    /// Arguments for one endpoint.
    pub fn endpoint(
        method: impl Into<String>,
        normalized_url: impl Into<String>,
        grouping: Grouping,
    ) -> Self {
        Self {
            scope: RequestScope::Endpoint,
            method: method.into(),
            normalized_url: normalized_url.into(),
            grouping,
        }
    }
}

impl ScopeArguments for EndpointArguments {
    fn scope_key(&self) -> Result<ScopeKey, ThrottleError> {
        self.grouping.validate()?;
        match self.scope {
            RequestScope::Global => Ok(ScopeKey::Global),
            RequestScope::Endpoint => {
                if self.method.is_empty() || self.normalized_url.is_empty() {
                    return Err(ThrottleError::MissingEndpoint);
                }
                Ok(ScopeKey::Endpoint {
                    method: self.method.clone(),
                    normalized_url: self.normalized_url.clone(),
                })
            }
        }
    }

    fn grouping(&self) -> &Grouping {
        &self.grouping
    }
}

/// Arguments for limiters keyed by an arbitrary limiter id.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LimiterArguments {
    /// Limiter id, must not be empty
    pub limiter_id: String,
    /// Grouping inside the limiter
    pub grouping: Grouping,
}

impl LimiterArguments {
    /// Create limiter arguments.
    pub fn new(limiter_id: impl Into<String>, grouping: Grouping) -> Self {
        Self {
            limiter_id: limiter_id.into(),
            grouping,
        }
    }
}

impl ScopeArguments for LimiterArguments {
    fn scope_key(&self) -> Result<ScopeKey, ThrottleError> {
        if self.limiter_id.is_empty() {
            return Err(ThrottleError::MissingLimiterId);
        }
        self.grouping.validate()?;
        Ok(ScopeKey::Limiter(self.limiter_id.clone()))
    }

    fn grouping(&self) -> &Grouping {
        &self.grouping
    }
}
