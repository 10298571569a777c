//! Allowlisted PowerShell scripts run against IIS hosts.
//!
//! This is the single source of truth for what the collector can run. Every
//! script only reads state; none of them changes the host.

/// Hostname.
const HOSTNAME: &str = "[System.Net.Dns]::GetHostName()";

/// Sites with bindings and sub-applications. A site that fails to enumerate
/// is emitted as `{ Name, Error }` so the rest of the listing survives.
const SITES: &str = r#"$ErrorActionPreference = 'Stop'
Import-Module WebAdministration
@(Get-ChildItem IIS:\Sites | ForEach-Object {
  $site = $_
  try {
    [pscustomobject]@{
      Name = $site.Name
      Id = $site.Id
      State = [string]$site.State
      ApplicationPool = $site.applicationPool
      PhysicalPath = $site.physicalPath
      Bindings = @($site.Bindings.Collection | ForEach-Object {
        [pscustomobject]@{ Protocol = $_.protocol; BindingInformation = $_.bindingInformation }
      })
      Applications = @(Get-WebApplication -Site $site.Name | ForEach-Object {
        [pscustomobject]@{ Path = $_.path; ApplicationPool = $_.applicationPool; PhysicalPath = $_.PhysicalPath }
      })
    }
  } catch {
    [pscustomobject]@{ Name = $site.Name; Error = $_.Exception.Message }
  }
}) | ConvertTo-Json -Depth 5 -Compress"#;

/// Application pools with their environment variables. `EnvironmentVariables`
/// is `null` when the pool's configuration could not be read.
const POOLS: &str = r#"$ErrorActionPreference = 'Stop'
Import-Module WebAdministration
@(Get-ChildItem IIS:\AppPools | ForEach-Object {
  $pool = $_
  $env = @{}
  try {
    Get-WebConfiguration "system.applicationHost/applicationPools/add[@name='$($pool.Name)']/environmentVariables/add" |
      ForEach-Object { $env[$_.name] = $_.value }
  } catch {
    $env = $null
  }
  [pscustomobject]@{
    Name = $pool.Name
    State = [string]$pool.State
    ManagedRuntimeVersion = $pool.managedRuntimeVersion
    ManagedPipelineMode = [string]$pool.managedPipelineMode
    IdentityType = [string]$pool.processModel.identityType
    UserName = $pool.processModel.userName
    AutoStart = [bool]$pool.autoStart
    EnvironmentVariables = $env
  }
}) | ConvertTo-Json -Depth 5 -Compress"#;

/// Environment blocks of the IIS worker services, one `NAME=value` per line.
const SERVICE_ENVIRONMENT: &str = r#"foreach ($svc in 'W3SVC', 'WAS') {
  $key = "HKLM:\SYSTEM\CurrentControlSet\Services\$svc"
  (Get-ItemProperty -Path $key -Name Environment -ErrorAction SilentlyContinue).Environment
}"#;

/// Directories the agent configuration may be read from.
const ALLOWED_READ_PREFIXES: [&str; 3] = [
    "C:\\ProgramData\\",
    "C:\\Program Files\\",
    "C:\\Program Files (x86)\\",
];

/// PowerShell scripts for IIS enumeration.
#[derive(Debug, Clone, Copy, Default)]
pub struct IisCommands;

impl IisCommands {
    pub fn new() -> Self {
        Self
    }

    pub fn hostname_cmd(&self) -> &'static str {
        HOSTNAME
    }

    pub fn sites_cmd(&self) -> &'static str {
        SITES
    }

    pub fn pools_cmd(&self) -> &'static str {
        POOLS
    }

    pub fn service_environment_cmd(&self) -> &'static str {
        SERVICE_ENVIRONMENT
    }

    /// Script printing the base64 content of `path`, or nothing when the file
    /// does not exist. `None` when the path is not allowed.
    pub fn read_file_cmd(&self, path: &str) -> Option<String> {
        if !is_safe_path(path) {
            return None;
        }
        let normalized = path.replace('/', "\\");
        let allowed = ALLOWED_READ_PREFIXES
            .iter()
            .any(|prefix| starts_with_ignore_case(&normalized, prefix));
        if !allowed {
            return None;
        }
        Some(format!(
            "if (Test-Path -LiteralPath '{0}' -PathType Leaf) {{ [Convert]::ToBase64String([IO.File]::ReadAllBytes('{0}')) }}",
            normalized
        ))
    }
}

fn starts_with_ignore_case(s: &str, prefix: &str) -> bool {
    s.get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
}

/// Validate that a path cannot break out of its quoted literal.
fn is_safe_path(path: &str) -> bool {
    const FORBIDDEN: [char; 8] = ['\'', '"', ';', '|', '&', '$', '`', '\n'];
    !path.is_empty()
        && path.len() < 1024
        && !path.contains(FORBIDDEN)
        && !path.contains('\r')
        && !path.contains("..")
}
