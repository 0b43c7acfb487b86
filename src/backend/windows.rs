use std::io::Write;
use std::process::Command;

use tracing::{debug, info};

use super::{InstallLocation, SigningBackend, TrustScope};
use crate::cert::Certificate;
use crate::error::{Error, Result};

/// Certificate store locations tried in order. `LocalMachine` needs an
/// elevated process; `CurrentUser` works for anyone but Windows shows a
/// confirmation prompt before adding a root.
const STORE_LOCATIONS: &[(&str, TrustScope)] = &[
    ("LocalMachine", TrustScope::System),
    ("CurrentUser", TrustScope::User),
];

/// Backend for Windows hosts.
///
/// Signing uses the same sidecar format as other platforms; installation
/// adds the certificate to a `Root` store through PowerShell's X509Store API.
#[derive(Debug, Clone, Default)]
pub struct WindowsBackend;

impl SigningBackend for WindowsBackend {
    fn platform(&self) -> &'static str {
        "windows"
    }

    fn install_to_trust_store(&self, certificate: &Certificate) -> Result<InstallLocation> {
        let der = certificate
            .to_der()
            .map_err(|e| Error::InstallFailed(e.to_string()))?;
        let mut cert_file = tempfile::Builder::new()
            .prefix("selfsign-")
            .suffix(".cer")
            .tempfile()
            .map_err(|e| {
                Error::InstallFailed(format!("failed to create temporary certificate file: {e}"))
            })?;
        cert_file
            .write_all(&der)
            .and_then(|()| cert_file.flush())
            .map_err(|e| Error::InstallFailed(format!("failed to write certificate: {e}")))?;

        let mut failures = Vec::new();
        for (location, scope) in STORE_LOCATIONS {
            let script = import_script(&cert_file.path().to_string_lossy(), location);
            match Command::new("powershell")
                .args(["-NoProfile", "-NonInteractive", "-Command", &script])
                .output()
            {
                Ok(output) if output.status.success() => {
                    let store = format!("{location}\\Root");
                    info!(store = %store, "certificate installed to Windows certificate store");
                    return Ok(InstallLocation {
                        scope: *scope,
                        location: store,
                    });
                }
                Ok(output) => {
                    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
                    debug!(location, %stderr, "certificate import refused");
                    failures.push(format!("{location}: {stderr}"));
                }
                Err(e) => {
                    debug!(location, error = %e, "could not run powershell");
                    failures.push(format!("{location}: {e}"));
                }
            }
        }

        Err(Error::InstallFailed(format!(
            "failed to install certificate via PowerShell ({}); administrator rights may be required",
            failures.join("; ")
        )))
    }
}

fn import_script(cert_path: &str, location: &str) -> String {
    let quoted = cert_path.replace('\'', "''");
    format!(
        "$ErrorActionPreference = 'Stop'; \
         $cert = New-Object System.Security.Cryptography.X509Certificates.X509Certificate2('{quoted}'); \
         $store = New-Object System.Security.Cryptography.X509Certificates.X509Store(\
         [System.Security.Cryptography.X509Certificates.StoreName]::Root, \
         [System.Security.Cryptography.X509Certificates.StoreLocation]::{location}); \
         $store.Open([System.Security.Cryptography.X509Certificates.OpenFlags]::ReadWrite); \
         $store.Add($cert); \
         $store.Close()"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_quotes_paths() {
        let script = import_script(r"C:\Users\O'Neil\cert.cer", "CurrentUser");
        assert!(script.contains(r"'C:\Users\O''Neil\cert.cer'"));
        assert!(script.contains("StoreLocation]::CurrentUser"));
    }
}
