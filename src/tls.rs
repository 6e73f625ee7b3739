// ABOUTME: Certificate issuance for the proxy: custom copy, self-signed, ACME.
// ABOUTME: Certificates land in the proxy's certs dir as `<url>.crt` / `<url>.key`.

use crate::site::{SiteParams, SslMode};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("failed to install certificate file {path}: {source}")]
    Copy {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} timed out after {timeout:?}")]
    Timeout { program: String, timeout: Duration },

    #[error("{program} exited with {code:?}: {stderr}")]
    Failed {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("Let's Encrypt requested but tls.acme_command is not configured")]
    AcmeNotConfigured,
}

#[async_trait]
pub trait CertificateIssuer: Send + Sync {
    /// Obtain or install the certificate the site's SSL mode asks for.
    async fn issue(&self, site: &SiteParams) -> Result<(), TlsError>;
}

/// Issues certificates with local tools.
pub struct CommandIssuer {
    certs_dir: PathBuf,
    acme_command: Option<Vec<String>>,
    timeout: Duration,
}

impl CommandIssuer {
    pub fn new(certs_dir: PathBuf, acme_command: Option<Vec<String>>, timeout: Duration) -> Self {
        Self {
            certs_dir,
            acme_command,
            timeout,
        }
    }

    fn cert_path(&self, site: &SiteParams, ext: &str) -> PathBuf {
        self.certs_dir.join(format!("{}.{}", site.url(), ext))
    }

    async fn install(&self, from: &Path, to: PathBuf) -> Result<(), TlsError> {
        tokio::fs::create_dir_all(&self.certs_dir)
            .await
            .map_err(|source| TlsError::Copy {
                path: self.certs_dir.clone(),
                source,
            })?;
        tokio::fs::copy(from, &to)
            .await
            .map_err(|source| TlsError::Copy { path: to, source })?;
        Ok(())
    }

    async fn self_signed(&self, site: &SiteParams) -> Result<(), TlsError> {
        tokio::fs::create_dir_all(&self.certs_dir)
            .await
            .map_err(|source| TlsError::Copy {
                path: self.certs_dir.clone(),
                source,
            })?;
        let san = site
            .domains()
            .iter()
            .map(|d| format!("DNS:{d}"))
            .collect::<Vec<_>>()
            .join(",");
        let args = vec![
            "req".to_string(),
            "-x509".to_string(),
            "-nodes".to_string(),
            "-newkey".to_string(),
            "rsa:2048".to_string(),
            "-days".to_string(),
            "3650".to_string(),
            "-keyout".to_string(),
            self.cert_path(site, "key").display().to_string(),
            "-out".to_string(),
            self.cert_path(site, "crt").display().to_string(),
            "-subj".to_string(),
            format!("/CN={}", site.url()),
            "-addext".to_string(),
            format!("subjectAltName={san}"),
        ];
        self.run("openssl", &args).await
    }

    async fn acme(&self, site: &SiteParams) -> Result<(), TlsError> {
        let (program, leading) = self
            .acme_command
            .as_deref()
            .and_then(<[String]>::split_first)
            .ok_or(TlsError::AcmeNotConfigured)?;

        let mut args = leading.to_vec();
        args.extend(site.domains().iter().map(|d| d.to_string()));
        if site.wildcard() {
            args.push(format!("*.{}", site.url()));
        }
        self.run(program, &args).await
    }

    async fn run(&self, program: &str, args: &[String]) -> Result<(), TlsError> {
        tracing::debug!("{} {}", program, args.join(" "));
        let child = Command::new(program)
            .args(args)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, child)
            .await
            .map_err(|_| TlsError::Timeout {
                program: program.to_string(),
                timeout: self.timeout,
            })?
            .map_err(|source| TlsError::Spawn {
                program: program.to_string(),
                source,
            })?;

        if !output.status.success() {
            return Err(TlsError::Failed {
                program: program.to_string(),
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl CertificateIssuer for CommandIssuer {
    async fn issue(&self, site: &SiteParams) -> Result<(), TlsError> {
        match site.ssl() {
            SslMode::None | SslMode::Inherit => Ok(()),
            SslMode::Custom { key, crt } => {
                self.install(key, self.cert_path(site, "key")).await?;
                self.install(crt, self.cert_path(site, "crt")).await
            }
            SslMode::SelfSigned => self.self_signed(site).await,
            SslMode::Le => self.acme(site).await,
        }
    }
}
