//! Snapshot (spec §4.G "Snapshot", the inverse of apply): observe a running
//! workstation and emit an `apply`-compatible [`Template`] document.

use crate::diff::ObservedState;
use stationd_core::domain::{BaseImageSelector, PackageSpec, ServiceSpec, Template, UserSpec};

/// Build a template from observed state. The emitted document omits
/// version/parameters (the caller assigns those) and reproduces the
/// observed package/user/service/port set verbatim — applying it to a
/// fresh workstation of the same base is expected to reproduce this state
/// modulo non-deterministic fields (spec §8 property 5).
pub fn build_template(name: impl Into<String>, base_image: BaseImageSelector, observed: &ObservedState) -> Template {
    Template {
        name: name.into(),
        version: semver::Version::new(0, 1, 0),
        description: "generated by snapshot".to_string(),
        base_image,
        packages: observed.installed_packages.clone(),
        users: observed.users.clone(),
        services: observed.services.clone(),
        open_ports: observed.open_ports.clone(),
        parameters: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stationd_core::domain::PackageManager;
    use std::collections::BTreeSet;

    #[test]
    fn build_template_reproduces_observed_packages() {
        let observed = ObservedState {
            installed_packages: vec![PackageSpec {
                manager: PackageManager::Apt,
                name: "htop".to_string(),
                version: Some("3.0".to_string()),
            }],
            users: vec![UserSpec {
                name: "researcher".to_string(),
                groups: BTreeSet::new(),
            }],
            services: vec![ServiceSpec {
                name: "jupyter".to_string(),
                command: String::new(),
                port: Some(8888),
            }],
            open_ports: [8888].into_iter().collect(),
        };

        let template = build_template(
            "snapshot-of-w1",
            BaseImageSelector {
                os_family: "ubuntu".to_string(),
                os_version: "22.04".to_string(),
                arch: "x86_64".to_string(),
            },
            &observed,
        );

        assert_eq!(template.packages.len(), 1);
        assert_eq!(template.users[0].name, "researcher");
        assert!(template.open_ports.contains(&8888));
    }
}
