//! Host platform and architecture detection for repository root templates

use std::process::Command;
use std::sync::LazyLock;

#[cfg(test)]
use mockall::automock;
use regex::Regex;
use tracing::debug;

use crate::repository::error::RepositoryError;

const REDHAT_RELEASE: &str = "/etc/redhat-release";

static CENTOS_RELEASE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"CentOS release (\d)").expect("valid CentOS release regex"));

/// Facts about the host the platform name is derived from
#[cfg_attr(test, automock)]
pub trait HostProbe: Send + Sync {
    /// Contents of the Red Hat release file, if present
    fn redhat_release(&self) -> Option<String>;

    /// Kernel name as reported by `uname -s`
    fn kernel_name(&self) -> Option<String>;

    /// Distribution codename as reported by `lsb_release -cs`
    fn lsb_codename(&self) -> Option<String>;

    /// Machine hardware name as reported by `uname -m`
    fn machine(&self) -> Option<String>;
}

/// Probes the running system
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProbe;

impl HostProbe for SystemProbe {
    fn redhat_release(&self) -> Option<String> {
        std::fs::read_to_string(REDHAT_RELEASE).ok()
    }

    fn kernel_name(&self) -> Option<String> {
        command_output("uname", &["-s"])
    }

    fn lsb_codename(&self) -> Option<String> {
        command_output("lsb_release", &["-cs"])
    }

    fn machine(&self) -> Option<String> {
        command_output("uname", &["-m"])
    }
}

/// Platform name: `centos<N>`, `mountainlion` on macOS, else the LSB codename
pub fn platform(host: &dyn HostProbe) -> Result<String, RepositoryError> {
    let platform = if let Some(release) = host.redhat_release()
        && let Some(captures) = CENTOS_RELEASE.captures(&release)
    {
        format!("centos{}", &captures[1])
    } else if host.kernel_name().as_deref() == Some("Darwin") {
        "mountainlion".to_string()
    } else if let Some(codename) = host.lsb_codename() {
        codename
    } else {
        return Err(RepositoryError::UnknownPlatform);
    };

    debug!("Detected platform {}", platform);
    Ok(platform)
}

pub fn architecture(host: &dyn HostProbe) -> Result<String, RepositoryError> {
    host.machine().ok_or(RepositoryError::UnknownArchitecture)
}

fn command_output(program: &str, args: &[&str]) -> Option<String> {
    let output = Command::new(program).args(args).output().ok()?;
    if !output.status.success() {
        debug!("{} {:?} exited with {}", program, args, output.status);
        return None;
    }

    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!stdout.is_empty()).then_some(stdout)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probe(
        redhat_release: Option<&str>,
        kernel_name: Option<&str>,
        lsb_codename: Option<&str>,
    ) -> MockHostProbe {
        let mut host = MockHostProbe::new();
        let redhat_release = redhat_release.map(str::to_string);
        let kernel_name = kernel_name.map(str::to_string);
        let lsb_codename = lsb_codename.map(str::to_string);
        host.expect_redhat_release()
            .returning(move || redhat_release.clone());
        host.expect_kernel_name()
            .returning(move || kernel_name.clone());
        host.expect_lsb_codename()
            .returning(move || lsb_codename.clone());
        host
    }

    #[test]
    fn centos_release_file_takes_priority() {
        let host = probe(
            Some("CentOS release 6.4 (Final)\n"),
            Some("Linux"),
            Some("precise"),
        );
        assert_eq!(platform(&host).unwrap(), "centos6");
    }

    #[test]
    fn non_centos_release_file_falls_through() {
        let host = probe(
            Some("Red Hat Enterprise Linux release 9.2 (Plow)\n"),
            Some("Linux"),
            Some("plow"),
        );
        assert_eq!(platform(&host).unwrap(), "plow");
    }

    #[test]
    fn darwin_is_mountainlion() {
        let host = probe(None, Some("Darwin"), None);
        assert_eq!(platform(&host).unwrap(), "mountainlion");
    }

    #[test]
    fn lsb_codename_is_used_on_other_linux() {
        let host = probe(None, Some("Linux"), Some("trusty"));
        assert_eq!(platform(&host).unwrap(), "trusty");
    }

    #[test]
    fn unknown_platform_fails() {
        let host = probe(None, Some("Linux"), None);
        let err = platform(&host).unwrap_err();
        assert!(matches!(err, RepositoryError::UnknownPlatform));
        assert_eq!(err.to_string(), "Unable to determine platform");
    }

    #[test]
    fn architecture_comes_from_machine_name() {
        let mut host = MockHostProbe::new();
        host.expect_machine()
            .returning(|| Some("x86_64".to_string()));
        assert_eq!(architecture(&host).unwrap(), "x86_64");

        let mut host = MockHostProbe::new();
        host.expect_machine().returning(|| None);
        assert!(matches!(
            architecture(&host),
            Err(RepositoryError::UnknownArchitecture)
        ));
    }
}
