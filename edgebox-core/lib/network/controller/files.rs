//! Writes a sandbox's hosts and resolv.conf files.

use std::{
    net::Ipv4Addr,
    os::unix::fs::PermissionsExt,
    path::Path,
};

use tokio::fs;

use super::state::SandboxConfig;
use crate::network::NetworkResult;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

const DEFAULT_HOSTS: &str = "127.0.0.1\tlocalhost
::1\tlocalhost ip6-localhost ip6-loopback
fe00::0\tip6-localnet
ff00::0\tip6-mcastprefix
ff02::1\tip6-allnodes
ff02::2\tip6-allrouters
";

const FALLBACK_NAMESERVERS: [&str; 2] = ["8.8.8.8", "8.8.4.4"];

const FILE_MODE: u32 = 0o644;

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Writes the hosts file and resolv.conf of a sandbox. `own_address` adds the sandbox's own
/// entry once it has joined a bridge endpoint.
pub(crate) async fn write_sandbox_files(
    config: &SandboxConfig,
    own_address: Option<Ipv4Addr>,
) -> NetworkResult<()> {
    if let Some(path) = &config.hosts_path {
        write_file(path, &hosts_content(config, own_address).await?).await?;
    }

    if let Some(path) = &config.resolv_conf_path {
        write_file(path, &resolv_conf_content(config).await?).await?;
    }

    Ok(())
}

/// Builds the hosts file. The host sandbox gets a copy of the origin file.
pub(crate) async fn hosts_content(
    config: &SandboxConfig,
    own_address: Option<Ipv4Addr>,
) -> NetworkResult<String> {
    let mut content = match (&config.origin_hosts_path, config.use_default_sandbox) {
        (Some(origin), true) => read_or_empty(origin).await?,
        _ => DEFAULT_HOSTS.to_string(),
    };

    for (name, ip) in &config.extra_hosts {
        push_line(&mut content, &format!("{}\t{}", ip, name));
    }

    if let Some(ip) = own_address {
        let mut names = config.hostname.clone();
        if !config.domainname.is_empty() && !config.hostname.is_empty() {
            names = format!("{}.{} {}", config.hostname, config.domainname, config.hostname);
        }
        if !names.is_empty() {
            push_line(&mut content, &format!("{}\t{}", ip, names));
        }
    }

    Ok(content)
}

/// Builds resolv.conf from the origin file. Outside the host sandbox, loopback nameservers are
/// unreachable and get dropped; when none remain, public fallbacks are added.
pub(crate) async fn resolv_conf_content(config: &SandboxConfig) -> NetworkResult<String> {
    let origin = match &config.origin_resolv_conf_path {
        Some(origin) => read_or_empty(origin).await?,
        None => String::new(),
    };

    if config.use_default_sandbox {
        return Ok(origin);
    }

    let mut content = String::new();
    let mut nameservers = 0;
    for line in origin.lines() {
        if let Some(server) = nameserver_of(line) {
            if server.starts_with("127.") || server == "::1" {
                continue;
            }
            nameservers += 1;
        }
        push_line(&mut content, line);
    }

    if nameservers == 0 {
        for server in FALLBACK_NAMESERVERS {
            push_line(&mut content, &format!("nameserver {}", server));
        }
    }

    Ok(content)
}

//--------------------------------------------------------------------------------------------------
// Functions: Helpers
//--------------------------------------------------------------------------------------------------

fn nameserver_of(line: &str) -> Option<&str> {
    let mut fields = line.split_whitespace();
    match (fields.next(), fields.next()) {
        (Some("nameserver"), Some(server)) => Some(server),
        _ => None,
    }
}

fn push_line(content: &mut String, line: &str) {
    if !content.is_empty() && !content.ends_with('\n') {
        content.push('\n');
    }
    content.push_str(line);
    content.push('\n');
}

async fn read_or_empty(path: &Path) -> NetworkResult<String> {
    match fs::read_to_string(path).await {
        Ok(content) => Ok(content),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!("origin file {} not found, using empty content", path.display());
            Ok(String::new())
        }
        Err(e) => Err(e.into()),
    }
}

async fn write_file(path: &Path, content: &str) -> NetworkResult<()> {
    fs::write(path, content).await?;
    fs::set_permissions(path, std::fs::Permissions::from_mode(FILE_MODE)).await?;
    Ok(())
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
