
#[cfg(test)]
pub(crate) mod fake_server;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Display;
use std::io::Cursor;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::time::Duration;
use suppaftp::types::FileType;
use suppaftp::{FtpStream, Mode};

use crate::errors::{GproError, GproResult};

pub const DEFAULT_FTP_PORT: u16 = 21;
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Saved FTP deployment target
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FtpProfile {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub remote_path: String,
    pub passive: bool,
}

impl Default for FtpProfile {
    fn default() -> Self {
        Self {
            name: String::new(),
            host: String::new(),
            port: DEFAULT_FTP_PORT,
            username: String::new(),
            password: String::new(),
            remote_path: "/".to_string(),
            passive: true,
        }
    }
}

impl FtpProfile {
    pub fn validate(&self) -> GproResult<()> {
        if self.name.trim().is_empty() {
            return Err(GproError::Validation("Profile name is required".to_string()));
        }
        if self.host.trim().is_empty() {
            return Err(GproError::Validation("FTP host is required".to_string()));
        }
        if self.port == 0 {
            return Err(GproError::Validation("FTP port must be between 1 and 65535".to_string()));
        }
        Ok(())
    }
}

/// Profile as listed back to the browser; the password never leaves the server
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProfileSummary {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub remote_path: String,
    pub passive: bool,
}

impl From<&FtpProfile> for ProfileSummary {
    fn from(profile: &FtpProfile) -> Self {
        Self {
            name: profile.name.clone(),
            host: profile.host.clone(),
            port: profile.port,
            username: profile.username.clone(),
            remote_path: profile.remote_path.clone(),
            passive: profile.passive,
        }
    }
}

/// Per-session collection of deployment profiles, keyed by name
#[derive(Debug, Default)]
pub struct DeployProfiles {
    profiles: BTreeMap<String, FtpProfile>,
}

impl DeployProfiles {
    /// Store a profile, replacing any with the same name. Returns true on replace.
    pub fn save(&mut self, profile: FtpProfile) -> bool {
        self.profiles.insert(profile.name.clone(), profile).is_some()
    }

    pub fn list(&self) -> Vec<ProfileSummary> {
        self.profiles.values().map(ProfileSummary::from).collect()
    }

    pub fn get(&self, name: &str) -> Option<FtpProfile> {
        self.profiles.get(name).cloned()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeployRequest {
    pub profile_name: String,
    pub local_file: String,
    #[serde(default)]
    pub remote_file: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DeployReport {
    pub success: bool,
    pub remote_file: String,
    pub bytes: usize,
}

/// Resolve `local_file` against the workspace, refusing anything that ends
/// up outside it (`..`, absolute paths, symlinks pointing away).
pub fn resolve_workspace_file(workspace_root: &Path, local_file: &str) -> GproResult<PathBuf> {
    let root = workspace_root.canonicalize().map_err(|e| {
        tracing::error!(path = %workspace_root.display(), "Workspace directory unavailable: {}", e);
        GproError::Config("Workspace directory not available".to_string())
    })?;

    let relative = local_file.trim();
    if relative.is_empty() {
        return Err(GproError::Validation("Local file is required".to_string()));
    }

    let resolved = root
        .join(relative)
        .canonicalize()
        .map_err(|_| GproError::NotFound(format!("Local file '{}' not found", relative)))?;

    if !resolved.starts_with(&root) {
        tracing::warn!(requested = relative, "Rejected deploy path outside the workspace");
        return Err(GproError::Validation("Local file must be inside the workspace".to_string()));
    }
    if !resolved.is_file() {
        return Err(GproError::Validation(format!("'{}' is not a file", relative)));
    }
    Ok(resolved)
}

fn deploy_error(stage: &str, err: impl Display, message: &str) -> GproError {
    tracing::warn!(stage, "FTP deploy failed: {}", err);
    GproError::Deploy(message.to_string())
}

fn resolve_server(host: &str, port: u16) -> GproResult<SocketAddr> {
    (host, port)
        .to_socket_addrs()
        .map_err(|e| deploy_error("resolve", e, "Could not connect to FTP server"))?
        .next()
        .ok_or_else(|| deploy_error("resolve", host, "Could not connect to FTP server"))
}

// Everything after the greeting; the caller always sends QUIT afterwards
fn transfer(ftp: &mut FtpStream, profile: &FtpProfile, remote_name: &str, data: &[u8]) -> GproResult<()> {
    ftp.login(&profile.username, &profile.password)
        .map_err(|e| deploy_error("login", e, "FTP login failed"))?;

    let remote_path = profile.remote_path.trim();
    if !remote_path.is_empty() && remote_path != "/" {
        ftp.cwd(remote_path)
            .map_err(|e| deploy_error("cwd", e, "Could not change to remote directory"))?;
    }

    ftp.set_mode(if profile.passive { Mode::Passive } else { Mode::Active });
    ftp.transfer_type(FileType::Binary)
        .map_err(|e| deploy_error("upload", e, "File upload failed"))?;
    ftp.put_file(remote_name, &mut Cursor::new(data))
        .map_err(|e| deploy_error("upload", e, "File upload failed"))?;
    Ok(())
}

// Blocking FTP session, run on the blocking pool
fn upload(profile: &FtpProfile, remote_name: &str, data: &[u8]) -> GproResult<()> {
    let addr = resolve_server(&profile.host, profile.port)?;
    let mut ftp = FtpStream::connect_timeout(addr, CONNECT_TIMEOUT)
        .map_err(|e| deploy_error("connect", e, "Could not connect to FTP server"))?;
    ftp.get_ref()
        .set_read_timeout(Some(CONNECT_TIMEOUT))
        .map_err(|e| deploy_error("connect", e, "Could not connect to FTP server"))?;

    let result = transfer(&mut ftp, profile, remote_name, data);
    if let Err(e) = ftp.quit() {
        tracing::debug!("FTP QUIT failed: {}", e);
    }
    result
}

/// Upload one workspace file to the profile's server.
pub async fn deploy_file(
    profile: &FtpProfile,
    workspace_root: &Path,
    local_file: &str,
    remote_file: &str,
) -> GproResult<DeployReport> {
    let path = resolve_workspace_file(workspace_root, local_file)?;
    let data = tokio::fs::read(&path).await?;

    let remote_name = match remote_file.trim() {
        "" => path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| GproError::Validation("Remote file name is required".to_string()))?,
        name => name.to_string(),
    };

    tracing::info!(profile = %profile.name, host = %profile.host, remote = %remote_name, bytes = data.len(), "Deploying file");

    let bytes = data.len();
    let session_profile = profile.clone();
    let session_remote = remote_name.clone();
    tokio::task::spawn_blocking(move || upload(&session_profile, &session_remote, &data))
        .await
        .map_err(|e| deploy_error("upload", e, "File upload failed"))??;

    Ok(DeployReport {
        success: true,
        remote_file: remote_name,
        bytes,
    })
}
