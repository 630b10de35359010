//! Internet Connection Sharing (NAT) configuration.
//!
//! Two mechanisms are tried in order: the `*-NetConnectionSharing` PowerShell
//! cmdlets, then the `SharedAccess` service plus `netsh routing ip nat`. A
//! cmdlet that does not exist on the host is reported as
//! [`ControlError::CapabilityNotFound`] and only that variant triggers the
//! fallback; any other failure is surfaced as is.

use std::future::Future;
use std::io::ErrorKind;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::cmd_abstraction::{CommandExecutor, Invocation};
use crate::compiler::ps_quote;
use crate::error::{ControlError, ControlResult};
use crate::model::{NatConfig, Platform};
use crate::store::Records;
use crate::validation::validate_interface_name;

/// Diagnostic signature PowerShell prints for an unknown cmdlet.
pub const COMMAND_NOT_FOUND_SIGNATURE: &str = "CommandNotFoundException";

const ICS_SERVICE: &str = "SharedAccess";

/// Benign `net start`/`net stop` diagnostics.
const ALREADY_STARTED: &str = "already been started";
const NOT_STARTED: &str = "is not started";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SharingMode {
    Internet,
    Home,
}

impl SharingMode {
    fn as_str(self) -> &'static str {
        match self {
            SharingMode::Internet => "Internet",
            SharingMode::Home => "Home",
        }
    }
}

fn powershell(script: String) -> Invocation {
    Invocation::new("powershell", ["-NoProfile".to_string(), "-Command".to_string(), script])
}

pub fn disable_sharing_script() -> Invocation {
    powershell(
        "Get-NetConnectionSharing | ForEach-Object { \
         Disable-NetConnectionSharing -ConnectionName $_.ConnectionName }"
            .to_string(),
    )
}

pub fn enable_sharing_script(interface: &str, mode: SharingMode) -> Invocation {
    powershell(format!(
        "Enable-NetConnectionSharing -ConnectionName {} -SharingMode {}",
        ps_quote(interface),
        mode.as_str()
    ))
}

/// Check the request before anything is stored or executed.
pub fn validate_nat(config: &NatConfig) -> ControlResult<()> {
    if !config.enabled {
        return Ok(());
    }
    for (role, iface) in [("WAN", &config.wan), ("LAN", &config.lan)] {
        validate_interface_name(iface)
            .map_err(|e| ControlError::validation(format!("{} interface: {}", role, e)))?;
    }
    if config.wan == config.lan {
        return Err(ControlError::validation(
            "WAN and LAN must be different interfaces",
        ));
    }
    Ok(())
}

/// Run the fallback only when the primary mechanism is missing.
async fn or_fallback<F>(primary: ControlResult<()>, fallback: F) -> ControlResult<()>
where
    F: Future<Output = ControlResult<()>>,
{
    match primary {
        Err(ControlError::CapabilityNotFound(text)) => {
            warn!("Connection sharing cmdlets unavailable, using service fallback");
            debug!("capability probe: {}", text);
            fallback.await
        }
        other => other,
    }
}

pub struct NatConfigurator {
    executor: Arc<dyn CommandExecutor>,
    platform: Platform,
    records: Records,
}

impl NatConfigurator {
    pub fn new(executor: Arc<dyn CommandExecutor>, platform: Platform, records: Records) -> Self {
        Self {
            executor,
            platform: platform.resolve(),
            records,
        }
    }

    /// Stored configuration, or the disabled default.
    pub async fn get(&self) -> ControlResult<NatConfig> {
        Ok(self.records.nat_config().await?.unwrap_or_default())
    }

    /// Persist `config` then bring the host in line with it.
    ///
    /// The desired state is stored before any mechanism runs, so a failed
    /// host application leaves the stored record ahead of the host.
    pub async fn apply(&self, config: NatConfig) -> ControlResult<()> {
        if self.platform != Platform::Windows {
            return Err(ControlError::NotSupported(
                "connection sharing is only available on Windows hosts".to_string(),
            ));
        }
        validate_nat(&config)?;

        self.records.save_nat_config(&config).await?;

        or_fallback(self.disable_primary().await, self.disable_fallback()).await?;
        info!("Connection sharing disabled on all interfaces");

        if config.enabled {
            let primary = async {
                self.probe(&enable_sharing_script(&config.wan, SharingMode::Internet))
                    .await?;
                self.probe(&enable_sharing_script(&config.lan, SharingMode::Home))
                    .await
            }
            .await;
            or_fallback(primary, self.enable_fallback(&config.wan, &config.lan)).await?;
            info!("Connection sharing enabled: {} -> {}", config.wan, config.lan);
        }
        Ok(())
    }

    async fn disable_primary(&self) -> ControlResult<()> {
        self.probe(&disable_sharing_script()).await
    }

    async fn disable_fallback(&self) -> ControlResult<()> {
        self.run_tolerant(
            &Invocation::new("sc", ["config", ICS_SERVICE, "start=", "disabled"]),
            None,
        )
        .await?;
        self.run_tolerant(&Invocation::new("net", ["stop", ICS_SERVICE]), Some(NOT_STARTED))
            .await
    }

    async fn enable_fallback(&self, wan: &str, lan: &str) -> ControlResult<()> {
        self.run_tolerant(
            &Invocation::new("sc", ["config", ICS_SERVICE, "start=", "auto"]),
            None,
        )
        .await?;
        self.run_tolerant(&Invocation::new("net", ["start", ICS_SERVICE]), Some(ALREADY_STARTED))
            .await?;

        let assignments = [
            Invocation::new("netsh", ["routing", "ip", "nat", "install"]),
            Invocation::new("netsh", ["routing", "ip", "nat", "add", "interface", wan, "full"]),
            Invocation::new("netsh", ["routing", "ip", "nat", "add", "interface", lan, "private"]),
        ];
        for inv in &assignments {
            self.run_tolerant(inv, None).await?;
        }
        Ok(())
    }

    /// Invoke a primary mechanism, classifying absence separately from
    /// failure.
    async fn probe(&self, inv: &Invocation) -> ControlResult<()> {
        debug!("exec: {}", inv);
        let output = match self.executor.execute(&inv.program, &inv.args).await {
            Ok(output) => output,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(ControlError::CapabilityNotFound(format!(
                    "{}: {}",
                    inv.program, e
                )))
            }
            Err(e) => {
                return Err(ControlError::CommandExecution {
                    program: inv.program.clone(),
                    stderr: e.to_string(),
                    code: None,
                })
            }
        };

        if output.success {
            return Ok(());
        }
        let diagnostic = output.diagnostic().to_string();
        if diagnostic.contains(COMMAND_NOT_FOUND_SIGNATURE) {
            Err(ControlError::CapabilityNotFound(diagnostic))
        } else {
            Err(ControlError::CommandExecution {
                program: inv.program.clone(),
                stderr: diagnostic,
                code: output.code,
            })
        }
    }

    async fn run_tolerant(&self, inv: &Invocation, benign: Option<&str>) -> ControlResult<()> {
        match crate::cmd_abstraction::run_checked(self.executor.as_ref(), inv).await {
            Ok(_) => Ok(()),
            Err(e) => {
                let tolerated = benign.is_some_and(|needle| {
                    e.diagnostic()
                        .is_some_and(|d| d.to_lowercase().contains(needle))
                });
                if tolerated {
                    debug!("ignoring benign result of '{}'", inv);
                    Ok(())
                } else {
                    Err(e)
                }
            }
        }
    }
}
