use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Ingest,
    Query,
    Admin,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub subject: String,
    pub tenant: String,
    pub roles: HashSet<String>,
    pub scopes: HashSet<String>,
    pub attributes: HashMap<String, String>,
}

impl Principal {
    pub fn new(subject: impl Into<String>, tenant: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            tenant: tenant.into(),
            roles: HashSet::new(),
            scopes: HashSet::new(),
            attributes: HashMap::new(),
        }
    }

    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles = roles.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwtClaims {
    pub sub: String,
    pub tenant: String,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
    #[serde(default)]
    pub iss: Option<String>,
    #[serde(default)]
    pub aud: Option<String>,
    pub exp: usize,
    #[serde(default)]
    pub nbf: Option<usize>,
    #[serde(default)]
    pub iat: Option<usize>,
}

impl TryFrom<JwtClaims> for Principal {
    type Error = AuthError;

    fn try_from(claims: JwtClaims) -> Result<Self, Self::Error> {
        if claims.sub.trim().is_empty() {
            return Err(AuthError::MissingSubject);
        }
        if claims.tenant.trim().is_empty() {
            return Err(AuthError::MissingTenant);
        }

        let roles = claims
            .roles
            .into_iter()
            .filter_map(|role| {
                let trimmed = role.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            })
            .collect();

        let scopes = claims
            .scope
            .unwrap_or_default()
            .split_whitespace()
            .filter_map(|scope| {
                let trimmed = scope.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            })
            .collect();

        Ok(Principal {
            subject: claims.sub,
            tenant: claims.tenant,
            roles,
            scopes,
            attributes: claims.attributes,
        })
    }
}

pub struct JwtAuthenticator {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtAuthenticator {
    pub fn new_hs256(
        secret: impl AsRef<[u8]>,
        issuer: Option<&str>,
        audience: Option<&str>,
    ) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.leeway = 0;
        if let Some(issuer) = issuer {
            validation.set_issuer(&[issuer]);
        }
        if let Some(audience) = audience {
            validation.set_audience(&[audience]);
        }

        Self {
            decoding_key: DecodingKey::from_secret(secret.as_ref()),
            validation,
        }
    }

    pub fn authenticate(&self, token: &str) -> Result<Principal, AuthError> {
        let normalized = token
            .trim()
            .strip_prefix("Bearer ")
            .or_else(|| token.trim().strip_prefix("bearer "))
            .unwrap_or(token)
            .trim();
        if normalized.is_empty() {
            return Err(AuthError::MissingToken);
        }

        let token_data = decode::<JwtClaims>(normalized, &self.decoding_key, &self.validation)
            .map_err(|err| AuthError::InvalidToken(err.to_string()))?;
        Principal::try_from(token_data.claims)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing bearer token")]
    MissingToken,
    #[error("invalid jwt: {0}")]
    InvalidToken(String),
    #[error("jwt claim sub must not be empty")]
    MissingSubject,
    #[error("jwt claim tenant must not be empty")]
    MissingTenant,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceContext {
    pub tenant: String,
    pub required_attributes: HashMap<String, String>,
    pub min_clearance_level: Option<u8>,
}

impl ResourceContext {
    pub fn new(tenant: impl Into<String>) -> Self {
        Self {
            tenant: tenant.into(),
            required_attributes: HashMap::new(),
            min_clearance_level: None,
        }
    }

    pub fn require_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.required_attributes.insert(key.into(), value.into());
        self
    }

    pub fn require_min_clearance(mut self, level: u8) -> Self {
        self.min_clearance_level = Some(level);
        self
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("permission denied for action {action:?}")]
    PermissionDenied { action: Action },
    #[error("resource tenant is required when tenant boundary is enabled")]
    MissingResourceTenant,
    #[error("tenant boundary violation: principal tenant {principal_tenant} cannot access {resource_tenant}")]
    TenantMismatch {
        principal_tenant: String,
        resource_tenant: String,
    },
    #[error("missing required attribute: {key}")]
    MissingAttribute { key: String },
    #[error("attribute mismatch for {key}: expected {expected}, got {actual}")]
    AttributeMismatch {
        key: String,
        expected: String,
        actual: String,
    },
    #[error("invalid numeric attribute {key}: {value}")]
    InvalidAttributeValue { key: String, value: String },
    #[error("insufficient clearance level: required {required}, got {actual}")]
    InsufficientClearance { required: u8, actual: u8 },
}

#[derive(Debug, Clone)]
pub struct Authorizer {
    role_permissions: HashMap<String, HashSet<Action>>,
    action_scopes: HashMap<Action, HashSet<String>>,
    enforce_tenant_boundary: bool,
}

impl Default for Authorizer {
    fn default() -> Self {
        let mut role_permissions = HashMap::new();
        role_permissions.insert("reader".to_string(), HashSet::from([Action::Query]));
        role_permissions.insert("ingestor".to_string(), HashSet::from([Action::Ingest]));
        role_permissions.insert(
            "admin".to_string(),
            HashSet::from([Action::Ingest, Action::Query, Action::Admin]),
        );

        let mut action_scopes = HashMap::new();
        action_scopes.insert(
            Action::Ingest,
            HashSet::from(["ingest:write".to_string(), "admin:*".to_string()]),
        );
        action_scopes.insert(
            Action::Query,
            HashSet::from(["query:execute".to_string(), "admin:*".to_string()]),
        );
        action_scopes.insert(Action::Admin, HashSet::from(["admin:*".to_string()]));

        Self {
            role_permissions,
            action_scopes,
            enforce_tenant_boundary: true,
        }
    }
}

impl Authorizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tenant_boundary(mut self, enforce: bool) -> Self {
        self.enforce_tenant_boundary = enforce;
        self
    }

    pub fn with_role_permissions<I>(mut self, role: impl Into<String>, actions: I) -> Self
    where
        I: IntoIterator<Item = Action>,
    {
        self.role_permissions
            .insert(role.into(), actions.into_iter().collect());
        self
    }

    pub fn with_action_scopes<I, S>(mut self, action: Action, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.action_scopes
            .insert(action, scopes.into_iter().map(Into::into).collect());
        self
    }

    pub fn authorize(
        &self,
        principal: &Principal,
        action: Action,
        resource: &ResourceContext,
    ) -> Result<(), AuthzError> {
        if self.enforce_tenant_boundary {
            let resource_tenant = resource.tenant.trim();
            if resource_tenant.is_empty() {
                return Err(AuthzError::MissingResourceTenant);
            }
            if principal.tenant != resource_tenant {
                return Err(AuthzError::TenantMismatch {
                    principal_tenant: principal.tenant.clone(),
                    resource_tenant: resource_tenant.to_string(),
                });
            }
        }

        if !self.is_action_permitted(principal, action) {
            return Err(AuthzError::PermissionDenied { action });
        }

        self.validate_resource_attributes(principal, resource)?;
        self.validate_clearance(principal, resource)?;
        Ok(())
    }

    fn is_action_permitted(&self, principal: &Principal, action: Action) -> bool {
        let role_allows = principal.roles.iter().any(|role| {
            self.role_permissions
                .get(role)
                .map(|actions| actions.contains(&Action::Admin) || actions.contains(&action))
                .unwrap_or(false)
        });

        let scope_allows = self
            .action_scopes
            .get(&action)
            .map(|required| {
                required
                    .iter()
                    .any(|scope| principal.scopes.contains(scope))
            })
            .unwrap_or(false);

        role_allows || scope_allows
    }

    fn validate_resource_attributes(
        &self,
        principal: &Principal,
        resource: &ResourceContext,
    ) -> Result<(), AuthzError> {
        for (key, expected_value) in &resource.required_attributes {
            let actual = principal
                .attributes
                .get(key)
                .ok_or_else(|| AuthzError::MissingAttribute { key: key.clone() })?;
            if actual != expected_value {
                return Err(AuthzError::AttributeMismatch {
                    key: key.clone(),
                    expected: expected_value.clone(),
                    actual: actual.clone(),
                });
            }
        }
        Ok(())
    }

    fn validate_clearance(
        &self,
        principal: &Principal,
        resource: &ResourceContext,
    ) -> Result<(), AuthzError> {
        let Some(required_level) = resource.min_clearance_level else {
            return Ok(());
        };

        let key = "clearance_level".to_string();
        let raw_level = principal
            .attributes
            .get(&key)
            .ok_or_else(|| AuthzError::MissingAttribute { key: key.clone() })?;
        let actual_level =
            raw_level
                .parse::<u8>()
                .map_err(|_| AuthzError::InvalidAttributeValue {
                    key: key.clone(),
                    value: raw_level.clone(),
                })?;

        if actual_level < required_level {
            return Err(AuthzError::InsufficientClearance {
                required: required_level,
                actual: actual_level,
            });
        }
        Ok(())
    }
}
