// src/tenancy.rs
// Tenant scope: the (tenant, package, channel) triple that partitions
// everything. Resolved once per request and carried by value; nothing in the
// server reads tenancy from a global.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::Settings;
use crate::error::ServerError;

/// Hierarchical partition key. All three parts are required and non-empty.
/// Canonical string form is `tenant::package::channel`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantScope {
    pub tenant_id: String,
    pub package_id: String,
    pub channel_id: String,
}

impl TenantScope {
    pub fn new(
        tenant_id: impl Into<String>,
        package_id: impl Into<String>,
        channel_id: impl Into<String>,
    ) -> Result<Self, ServerError> {
        let scope = Self {
            tenant_id: tenant_id.into(),
            package_id: package_id.into(),
            channel_id: channel_id.into(),
        };
        scope.validate()?;
        Ok(scope)
    }

    fn validate(&self) -> Result<(), ServerError> {
        for (name, value) in [
            ("tenant", &self.tenant_id),
            ("package", &self.package_id),
            ("channel", &self.channel_id),
        ] {
            if value.trim().is_empty() {
                return Err(ServerError::TenantUnresolved(format!("empty {name} id")));
            }
        }
        Ok(())
    }

    pub fn canonical(&self) -> String {
        format!(
            "{}::{}::{}",
            self.tenant_id, self.package_id, self.channel_id
        )
    }

    /// Guard helper: error when `other` names a different scope.
    pub fn ensure_same(&self, other: &TenantScope) -> Result<(), ServerError> {
        if self == other {
            Ok(())
        } else {
            Err(ServerError::ScopeViolation(format!(
                "operation crosses scopes {} and {}",
                self.canonical(),
                other.canonical()
            )))
        }
    }
}

impl fmt::Display for TenantScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

impl FromStr for TenantScope {
    type Err = ServerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split("::");
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(t), Some(p), Some(c), None) => TenantScope::new(t, p, c),
            _ => Err(ServerError::TenantUnresolved(format!(
                "expected tenant::package::channel, got {s:?}"
            ))),
        }
    }
}

/// Inputs available when resolving a scope for one request. The HTTP layer
/// fills `claim_tenant` from the bearer token and the headers from the
/// request; the stdio transport fills `fixed_tenant` from CLI flags or
/// environment.
#[derive(Debug, Default, Clone)]
pub struct ScopeInputs {
    /// `tenant_id` claim (or legacy `tid`) from an authenticated principal.
    pub claim_tenant: Option<String>,
    /// True when the claim came from the legacy `tid` field.
    pub claim_is_legacy: bool,
    /// X-Tenant-Id header (dev only).
    pub header_tenant: Option<String>,
    /// X-Tenant-Package header.
    pub header_package: Option<String>,
    /// X-Tenant-Channel header.
    pub header_channel: Option<String>,
    /// Tenant pinned at process start (stdio mode).
    pub fixed_tenant: Option<String>,
    /// Tenant named inside the request body, which must agree with the
    /// principal's claim when both are present.
    pub requested_tenant: Option<String>,
}

/// Resolve a scope according to the precedence rules:
/// claim > (dev) X-Tenant-Id header > (dev) configured default, with the
/// process-pinned tenant taking the claim's slot in stdio mode. Package and
/// channel come from headers or configuration.
pub fn resolve_scope(settings: &Settings, inputs: &ScopeInputs) -> Result<TenantScope, ServerError> {
    let tenant = if let Some(claim) = &inputs.claim_tenant {
        if inputs.claim_is_legacy {
            tracing::warn!("principal uses legacy 'tid' claim; migrate to 'tenant_id'");
        }
        claim.clone()
    } else if let Some(fixed) = &inputs.fixed_tenant {
        fixed.clone()
    } else if settings.dev_mode {
        inputs
            .header_tenant
            .clone()
            .or_else(|| settings.default_tenant.clone())
            .ok_or_else(|| {
                ServerError::TenantUnresolved(
                    "no tenant claim, header, or configured default".into(),
                )
            })?
    } else {
        return Err(ServerError::TenantUnresolved(
            "no authenticated tenant and dev fallbacks are disabled".into(),
        ));
    };

    // A request naming a tenant inconsistent with the principal is a scope
    // violation, not a resolution failure.
    if let Some(requested) = &inputs.requested_tenant
        && requested != &tenant
    {
        return Err(ServerError::ScopeViolation(format!(
            "request names tenant {requested:?} but principal is {tenant:?}"
        )));
    }

    let package = inputs
        .header_package
        .clone()
        .unwrap_or_else(|| settings.default_package.clone());
    let channel = inputs
        .header_channel
        .clone()
        .unwrap_or_else(|| settings.default_channel.clone());

    TenantScope::new(tenant, package, channel)
}
