//! Apply (spec §4.G "Apply"): checkpoint, phased plan execution, rollback
//! on failure, and append of the resulting [`LayerRecord`].

use crate::diff::TemplateDiff;
use stationd_core::domain::{PackageManager, PackageSpec};
use stationd_core::CancellationToken;
use stationd_provider::{CloudProvider, ExecRequest};

/// Outcome of running a [`TemplateDiff`]'s phases against a workstation.
#[derive(Debug, Default)]
pub struct ApplySummary {
    pub packages_installed: u32,
    pub services_configured: u32,
    pub users_created: u32,
    pub warnings: Vec<String>,
}

fn install_command(package: &PackageSpec) -> (&'static str, Vec<String>) {
    let versioned = |sep: &str| match &package.version {
        Some(version) => format!("{}{sep}{version}", package.name),
        None => package.name.clone(),
    };
    match package.manager {
        PackageManager::System | PackageManager::Apt => ("apt-get", vec!["install".to_string(), "-y".to_string(), versioned("=")]),
        PackageManager::Dnf => ("dnf", vec!["install".to_string(), "-y".to_string(), versioned("-")]),
        PackageManager::Pip => ("pip", vec!["install".to_string(), versioned("==")]),
        PackageManager::Conda => ("conda", vec!["install".to_string(), "-y".to_string(), versioned("=")]),
        PackageManager::Spack => ("spack", vec!["install".to_string(), versioned("@")]),
        PackageManager::R => (
            "Rscript",
            vec!["-e".to_string(), format!("install.packages('{}')", package.name)],
        ),
    }
}

async fn exec_phase(
    provider: &dyn CloudProvider,
    provider_id: &str,
    cancel: &CancellationToken,
    command: &str,
    args: Vec<String>,
) -> stationd_core::Result<()> {
    let result = provider
        .exec(
            provider_id,
            &ExecRequest {
                command: command.to_string(),
                args,
                read_only: false,
            },
            cancel,
        )
        .await?;
    if result.exit_code != 0 {
        return Err(stationd_core::StationError::new(
            stationd_core::ErrorKind::CloudPermanent,
            format!("`{command}` exited with status {}: {}", result.exit_code, result.stderr),
        ));
    }
    Ok(())
}

/// Run every phase of `diff` in order (packages -> users -> services ->
/// ports), reporting progress through `on_progress`. Returns on the first
/// phase failure without attempting later phases; the caller is
/// responsible for invoking rollback.
pub async fn run_phases(
    provider: &dyn CloudProvider,
    provider_id: &str,
    cancel: &CancellationToken,
    diff: &TemplateDiff,
    mut on_progress: impl FnMut(&str, String),
) -> stationd_core::Result<ApplySummary> {
    let mut summary = ApplySummary::default();

    for package in &diff.packages_to_install {
        let (command, args) = install_command(&PackageSpec {
            manager: package.manager,
            name: package.name.clone(),
            version: package.version.clone(),
        });
        on_progress("packages", format!("installing {} via {:?}", package.name, package.manager));
        exec_phase(provider, provider_id, cancel, command, args).await?;
        summary.packages_installed += 1;
    }

    for user in &diff.users_to_create {
        on_progress("users", format!("creating user {}", user.name));
        exec_phase(provider, provider_id, cancel, "useradd", vec!["-m".to_string(), user.name.clone()]).await?;
        if !user.groups.is_empty() {
            let groups = user.groups.iter().cloned().collect::<Vec<_>>().join(",");
            exec_phase(
                provider,
                provider_id,
                cancel,
                "usermod",
                vec!["-aG".to_string(), groups, user.name.clone()],
            )
            .await?;
        }
        summary.users_created += 1;
    }

    for service in &diff.services_to_configure {
        on_progress("services", format!("enabling service {}", service.name));
        exec_phase(
            provider,
            provider_id,
            cancel,
            "systemctl",
            vec!["enable".to_string(), "--now".to_string(), service.name.clone()],
        )
        .await?;
        summary.services_configured += 1;
    }

    for port in &diff.ports_to_open {
        on_progress("ports", format!("opening port {port}"));
        exec_phase(provider, provider_id, cancel, "ufw", vec!["allow".to_string(), format!("{port}/tcp")]).await?;
    }

    Ok(summary)
}
