//! # Security Validator
//!
//! Checks the security requirements of an operation against a request.
//! Schemes inside one requirement group must all be satisfied; any one
//! satisfied group is enough. Only the presence and syntax of credentials
//! are checked: verifying them is up to the application.

use crate::oas::models::{ParamSource, ParameterSpec, SchemaTable, SecurityRequirement, SecurityScheme};
use crate::validation::errors::{ErrorKind, Location, ValidationError};
use crate::validation::params::{ParameterDeserializer, ParameterSources};
use crate::value::Value;
use base64::prelude::{Engine, BASE64_STANDARD};
use indexmap::IndexMap;

/// Validates security requirements against parameter sources.
#[derive(Debug, Clone, Copy)]
pub struct SecurityValidator<'a> {
    schemes: &'a IndexMap<String, SecurityScheme>,
    parameters: &'a ParameterDeserializer,
    schemas: &'a SchemaTable,
}

impl<'a> SecurityValidator<'a> {
    /// Creates a validator for the declared `schemes`.
    pub fn new(
        schemes: &'a IndexMap<String, SecurityScheme>,
        parameters: &'a ParameterDeserializer,
        schemas: &'a SchemaTable,
    ) -> Self {
        Self {
            schemes,
            parameters,
            schemas,
        }
    }

    /// Returns the scheme names of the first satisfied group.
    ///
    /// With no requirements the operation is unsecured and the set is
    /// empty. When no group is satisfied, one `SecurityValidation` error is
    /// returned per distinct unsatisfied scheme.
    pub fn validate(
        &self,
        requirements: &[SecurityRequirement],
        sources: &ParameterSources,
    ) -> Result<Vec<String>, Vec<ValidationError>> {
        if requirements.is_empty() {
            return Ok(Vec::new());
        }

        let mut unsatisfied: IndexMap<&str, String> = IndexMap::new();
        for group in requirements {
            let mut group_ok = true;
            for name in group.schemes.keys() {
                if let Err(reason) = self.check_scheme(name, sources) {
                    group_ok = false;
                    unsatisfied.entry(name.as_str()).or_insert(reason);
                }
            }
            if group_ok {
                return Ok(group.schemes.keys().cloned().collect());
            }
        }

        Err(unsatisfied
            .into_iter()
            .map(|(scheme, reason)| {
                ValidationError::new(ErrorKind::SecurityValidation, reason).at(Location::Security {
                    scheme: scheme.to_string(),
                })
            })
            .collect())
    }

    fn check_scheme(&self, name: &str, sources: &ParameterSources) -> Result<(), String> {
        let scheme = self
            .schemes
            .get(name)
            .ok_or_else(|| format!("security scheme '{}' is not declared", name))?;
        match scheme {
            SecurityScheme::ApiKey {
                name: key,
                location,
            } => match self.credential(key, *location, sources) {
                Some(value) if !value.is_empty() => Ok(()),
                _ => Err(format!("API key '{}' is missing from the {}", key, location)),
            },
            SecurityScheme::Http { scheme, .. } => self.check_http(scheme, sources),
            SecurityScheme::OAuth2 | SecurityScheme::OpenIdConnect => {
                self.check_http("bearer", sources)
            }
            SecurityScheme::MutualTls => Ok(()),
        }
    }

    fn check_http(&self, scheme: &str, sources: &ParameterSources) -> Result<(), String> {
        let header = self
            .credential("Authorization", ParamSource::Header, sources)
            .ok_or_else(|| "Authorization header is missing".to_string())?;
        let (given, credentials) = header
            .trim()
            .split_once(' ')
            .map(|(s, c)| (s, c.trim()))
            .unwrap_or((header.trim(), ""));
        if !given.eq_ignore_ascii_case(scheme) {
            return Err(format!("Authorization scheme '{}' expected", scheme));
        }
        match scheme {
            "bearer" if credentials.is_empty() => Err("bearer token is empty".to_string()),
            "basic" => {
                let decoded = BASE64_STANDARD
                    .decode(credentials)
                    .ok()
                    .and_then(|bytes| String::from_utf8(bytes).ok());
                match decoded {
                    Some(pair) if pair.contains(':') => Ok(()),
                    _ => Err("basic credentials are not base64 'user:password'".to_string()),
                }
            }
            _ => Ok(()),
        }
    }

    fn credential(&self, name: &str, location: ParamSource, sources: &ParameterSources) -> Option<String> {
        let param = ParameterSpec::new(name, location, None);
        match self.parameters.deserialize(self.schemas, &param, sources) {
            Ok(Some(Value::String(raw))) => Some(raw),
            _ => None,
        }
    }
}
