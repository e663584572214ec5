//! Diff computation (spec §4.G "Diff"): inspect a running workstation via
//! `exec` probes and compute a deterministic plan against a resolved
//! template.

use serde::{Deserialize, Serialize};
use stationd_core::domain::{PackageManager, PackageSpec, ServiceSpec, Template, UserSpec, PACKAGE_MANAGER_ORDER};
use stationd_core::CancellationToken;
use stationd_provider::{CloudProvider, ExecRequest};
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageChange {
    pub manager: PackageManager,
    pub name: String,
    pub version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conflict {
    pub description: String,
}

/// The deterministic plan a [`Diff`] compiles down to: what `apply` would
/// actually do, ordered the way `apply` executes it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateDiff {
    pub packages_to_install: Vec<PackageChange>,
    pub services_to_configure: Vec<ServiceSpec>,
    pub users_to_create: Vec<UserSpec>,
    pub ports_to_open: BTreeSet<u16>,
    pub conflicts: Vec<Conflict>,
}

impl TemplateDiff {
    pub fn blocks_apply(&self) -> bool {
        !self.conflicts.is_empty()
    }
}

/// Current observed state of a workstation, as reconstructed from `exec`
/// probes. Kept separate from [`TemplateDiff`] so `snapshot` can reuse it
/// directly as the basis of an emitted template.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObservedState {
    pub installed_packages: Vec<PackageSpec>,
    pub users: Vec<UserSpec>,
    pub services: Vec<ServiceSpec>,
    pub open_ports: BTreeSet<u16>,
}

/// Probe a workstation's current configuration through read-only `exec`
/// calls, one per [`PackageManager`] the provider's base image supports,
/// plus user/service/port enumeration.
pub async fn probe_workstation(
    provider: &dyn CloudProvider,
    provider_id: &str,
    cancel: &CancellationToken,
) -> stationd_core::Result<ObservedState> {
    let supported = provider.supported_package_managers().await?;
    let mut installed_packages = Vec::new();
    for manager in PACKAGE_MANAGER_ORDER.iter().filter(|m| supported.contains(*m)) {
        let probe = package_query_command(*manager);
        let result = provider
            .exec(
                provider_id,
                &ExecRequest {
                    command: probe.0.to_string(),
                    args: probe.1,
                    read_only: true,
                },
                cancel,
            )
            .await?;
        installed_packages.extend(parse_package_listing(*manager, &result.stdout));
    }

    let users_probe = provider
        .exec(
            provider_id,
            &ExecRequest {
                command: "getent".to_string(),
                args: vec!["passwd".to_string()],
                read_only: true,
            },
            cancel,
        )
        .await?;
    let users = parse_user_listing(&users_probe.stdout);

    let services_probe = provider
        .exec(
            provider_id,
            &ExecRequest {
                command: "systemctl".to_string(),
                args: vec!["list-units".to_string(), "--type=service".to_string()],
                read_only: true,
            },
            cancel,
        )
        .await?;
    let services = parse_service_listing(&services_probe.stdout);

    let ports_probe = provider
        .exec(
            provider_id,
            &ExecRequest {
                command: "ss".to_string(),
                args: vec!["-ltn".to_string()],
                read_only: true,
            },
            cancel,
        )
        .await?;
    let open_ports = parse_port_listing(&ports_probe.stdout);

    Ok(ObservedState {
        installed_packages,
        users,
        services,
        open_ports,
    })
}

fn package_query_command(manager: PackageManager) -> (&'static str, Vec<String>) {
    match manager {
        PackageManager::System | PackageManager::Apt => ("dpkg-query", vec!["-W".to_string(), "-f=${Package} ${Version}\\n".to_string()]),
        PackageManager::Dnf => ("rpm", vec!["-qa".to_string(), "--qf=%{NAME} %{VERSION}\\n".to_string()]),
        PackageManager::Pip => ("pip", vec!["list".to_string(), "--format=freeze".to_string()]),
        PackageManager::Conda => ("conda", vec!["list".to_string()]),
        PackageManager::Spack => ("spack", vec!["find".to_string()]),
        PackageManager::R => ("Rscript", vec!["-e".to_string(), "installed.packages()[,1]".to_string()]),
    }
}

/// One line per installed package, `name version`.
fn parse_package_listing(manager: PackageManager, stdout: &str) -> Vec<PackageSpec> {
    stdout
        .lines()
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let name = parts.next()?.to_string();
            let version = parts.next().map(str::to_string);
            Some(PackageSpec { manager, name, version })
        })
        .collect()
}

fn parse_user_listing(stdout: &str) -> Vec<UserSpec> {
    stdout
        .lines()
        .filter_map(|line| {
            let mut fields = line.split(':');
            let name = fields.next()?.to_string();
            let uid: u32 = fields.nth(1)?.parse().ok()?;
            if uid < 1000 || name == "nobody" {
                return None;
            }
            Some(UserSpec {
                name,
                groups: BTreeSet::new(),
            })
        })
        .collect()
}

fn parse_service_listing(stdout: &str) -> Vec<ServiceSpec> {
    stdout
        .lines()
        .filter(|line| line.contains(".service"))
        .filter_map(|line| {
            let name = line.split_whitespace().next()?.trim_end_matches(".service").to_string();
            Some(ServiceSpec {
                name,
                command: String::new(),
                port: None,
            })
        })
        .collect()
}

fn parse_port_listing(stdout: &str) -> BTreeSet<u16> {
    stdout
        .lines()
        .filter_map(|line| {
            let token = line.split_whitespace().nth(3)?;
            let port_str = token.rsplit(':').next()?;
            port_str.parse::<u16>().ok()
        })
        .collect()
}

/// Compute the plan to bring `observed` in line with `template`. Pure and
/// deterministic: identical inputs always produce an identical
/// [`TemplateDiff`] (spec §8 property 4).
pub fn compute_diff(template: &Template, observed: &ObservedState, force: bool) -> TemplateDiff {
    let mut diff = TemplateDiff::default();

    for declared in &template.packages {
        let existing = observed
            .installed_packages
            .iter()
            .find(|p| p.manager == declared.manager && p.name == declared.name);
        match existing {
            None => diff.packages_to_install.push(PackageChange {
                manager: declared.manager,
                name: declared.name.clone(),
                version: declared.version.clone(),
            }),
            Some(current) => {
                if let (Some(wanted), Some(have)) = (&declared.version, &current.version) {
                    if wanted != have {
                        if force {
                            diff.packages_to_install.push(PackageChange {
                                manager: declared.manager,
                                name: declared.name.clone(),
                                version: declared.version.clone(),
                            });
                        } else {
                            diff.conflicts.push(Conflict {
                                description: format!(
                                    "{} {:?} is installed at {have} but template requires {wanted}",
                                    declared.name, declared.manager
                                ),
                            });
                        }
                    }
                }
            }
        }
    }

    diff.packages_to_install.sort_by_key(|change| {
        PACKAGE_MANAGER_ORDER.iter().position(|m| *m == change.manager).unwrap_or(PACKAGE_MANAGER_ORDER.len())
    });

    for declared in &template.users {
        let existing = observed.users.iter().find(|u| u.name == declared.name);
        if existing.is_none() {
            diff.users_to_create.push(declared.clone());
        }
    }

    for declared in &template.services {
        let existing = observed.services.iter().find(|s| s.name == declared.name);
        if existing.is_none() {
            diff.services_to_configure.push(declared.clone());
        }
    }

    for port in &template.open_ports {
        if !observed.open_ports.contains(port) {
            diff.ports_to_open.insert(*port);
        }
    }

    diff
}
