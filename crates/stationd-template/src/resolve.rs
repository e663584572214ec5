//! Template resolution (spec §4.G "Resolve"): repository precedence (local
//! overrides external; highest semver wins within an origin for `latest`)
//! plus parameter default/override substitution.

use crate::error::{Result, TemplateError};
use serde_json::Value;
use stationd_core::domain::{ParameterSpec, ParameterType, Template, TemplateOrigin};
use stationd_store::Store;
use std::collections::BTreeMap;

/// `None` means "latest".
pub fn resolve(store: &Store, name: &str, version: Option<&semver::Version>) -> Result<(Template, TemplateOrigin)> {
    let mut candidates: Vec<_> = store
        .list_templates()
        .into_iter()
        .filter(|stored| stored.template.name == name)
        .collect();

    if let Some(version) = version {
        candidates.retain(|stored| &stored.template.version == version);
        // `TemplateOrigin::Local` sorts before `External`, so the first
        // element after sorting is the precedence winner.
        candidates.sort_by_key(|stored| stored.origin);
        return candidates
            .into_iter()
            .next()
            .map(|stored| (stored.template, stored.origin))
            .ok_or_else(|| TemplateError::NotFound {
                name: name.to_string(),
                version: version.to_string(),
            });
    }

    let local_best = candidates
        .iter()
        .filter(|stored| stored.origin == TemplateOrigin::Local)
        .max_by(|a, b| a.template.version.cmp(&b.template.version));
    if let Some(stored) = local_best {
        return Ok((stored.template.clone(), stored.origin));
    }

    candidates
        .iter()
        .filter(|stored| stored.origin == TemplateOrigin::External)
        .max_by(|a, b| a.template.version.cmp(&b.template.version))
        .map(|stored| (stored.template.clone(), stored.origin))
        .ok_or_else(|| TemplateError::NotFound {
            name: name.to_string(),
            version: "latest".to_string(),
        })
}

/// Merge declared parameter defaults with caller-supplied overrides,
/// type-checking each override against its [`ParameterSpec`].
pub fn resolve_parameters(template: &Template, overrides: &BTreeMap<String, Value>) -> Result<BTreeMap<String, Value>> {
    let mut resolved = BTreeMap::new();
    for spec in &template.parameters {
        let value = match overrides.get(&spec.name) {
            Some(value) => {
                check_parameter(spec, value)?;
                value.clone()
            }
            None => match &spec.default {
                Some(default) => default.clone(),
                None => {
                    return Err(TemplateError::InvalidParameter {
                        name: spec.name.clone(),
                        reason: "no default declared and no override supplied".to_string(),
                    })
                }
            },
        };
        resolved.insert(spec.name.clone(), value);
    }
    Ok(resolved)
}

fn check_parameter(spec: &ParameterSpec, value: &Value) -> Result<()> {
    let type_ok = match spec.param_type {
        ParameterType::String => value.is_string(),
        ParameterType::Integer => value.is_i64() || value.is_u64(),
        ParameterType::Boolean => value.is_boolean(),
    };
    if !type_ok {
        return Err(TemplateError::InvalidParameter {
            name: spec.name.clone(),
            reason: format!("expected a {:?}", spec.param_type),
        });
    }
    if !spec.allowed_values.is_empty() && !spec.allowed_values.contains(value) {
        return Err(TemplateError::InvalidParameter {
            name: spec.name.clone(),
            reason: format!("{value} is not one of the allowed values"),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use stationd_core::domain::BaseImageSelector;

    fn template(version: &str) -> Template {
        Template {
            name: "basic-ubuntu".to_string(),
            version: semver::Version::parse(version).unwrap(),
            description: String::new(),
            base_image: BaseImageSelector {
                os_family: "ubuntu".to_string(),
                os_version: "22.04".to_string(),
                arch: "x86_64".to_string(),
            },
            packages: Vec::new(),
            users: Vec::new(),
            services: Vec::new(),
            open_ports: Default::default(),
            parameters: Vec::new(),
        }
    }

    #[test]
    fn latest_prefers_local_over_higher_external_version() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        store.put_template(template("2.0.0"), TemplateOrigin::External).unwrap();
        store.put_template(template("1.0.0"), TemplateOrigin::Local).unwrap();

        let (resolved, origin) = resolve(&store, "basic-ubuntu", None).unwrap();
        assert_eq!(origin, TemplateOrigin::Local);
        assert_eq!(resolved.version, semver::Version::parse("1.0.0").unwrap());
    }

    #[test]
    fn latest_picks_highest_semver_within_local() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        store.put_template(template("1.0.0"), TemplateOrigin::Local).unwrap();
        store.put_template(template("1.5.0"), TemplateOrigin::Local).unwrap();

        let (resolved, _) = resolve(&store, "basic-ubuntu", None).unwrap();
        assert_eq!(resolved.version, semver::Version::parse("1.5.0").unwrap());
    }

    #[test]
    fn unresolved_template_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        assert!(resolve(&store, "nope", None).is_err());
    }
}
