//! PowerShell executors: local process or remote WinRM shell.

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use iisrecon_common::Error;
use std::time::Duration;
use tracing::{debug, warn};

/// Output of one PowerShell invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Runs PowerShell scripts on a target.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, script: &str) -> Result<CommandOutput>;

    /// Human-readable target description for logs.
    fn target(&self) -> &str;
}

/// Encode a script for `powershell.exe -EncodedCommand` (base64 of UTF-16LE).
pub fn encode_powershell(script: &str) -> String {
    let utf16: Vec<u8> = script.encode_utf16().flat_map(|c| c.to_le_bytes()).collect();
    STANDARD.encode(utf16)
}

/// Executor for the machine the tool runs on.
pub struct LocalExecutor {
    program: &'static str,
}

impl LocalExecutor {
    pub fn new() -> Self {
        Self {
            program: if cfg!(target_os = "windows") {
                "powershell.exe"
            } else {
                "pwsh"
            },
        }
    }
}

impl Default for LocalExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Executor for LocalExecutor {
    async fn execute(&self, script: &str) -> Result<CommandOutput> {
        debug!("Local exec: {}", script);

        let output = tokio::process::Command::new(self.program)
            .args(["-NoProfile", "-NonInteractive", "-EncodedCommand"])
            .arg(encode_powershell(script))
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| Error::CommandExecution {
                cmd: self.program.to_string(),
                reason: e.to_string(),
            })?;

        Ok(CommandOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }

    fn target(&self) -> &str {
        "localhost"
    }
}

const SHELL_RESOURCE_URI: &str = "http://schemas.microsoft.com/wbem/wsman/1/windows/shell/cmd";
const ACTION_CREATE: &str = "http://schemas.xmlsoap.org/ws/2004/09/transfer/Create";
const ACTION_DELETE: &str = "http://schemas.xmlsoap.org/ws/2004/09/transfer/Delete";
const ACTION_COMMAND: &str = "http://schemas.microsoft.com/wbem/wsman/1/windows/shell/Command";
const ACTION_RECEIVE: &str = "http://schemas.microsoft.com/wbem/wsman/1/windows/shell/Receive";
const COMMAND_STATE_DONE: &str =
    "http://schemas.microsoft.com/wbem/wsman/1/windows/shell/CommandState/Done";

/// Longest a single command may keep producing output.
const MAX_COMMAND_SECONDS: u64 = 600;

/// Connection settings for [`WinRmExecutor`].
#[derive(Debug, Clone)]
pub struct WinRmConfig {
    pub host: String,
    pub port: u16,
    pub https: bool,
    pub username: String,
    pub password: String,
    /// Accept self-signed listener certificates.
    pub accept_invalid_certs: bool,
}

/// Executor for a remote Windows host over WS-Management (basic auth).
///
/// Each script runs in its own remote shell: create, command, receive until
/// done, delete.
pub struct WinRmExecutor {
    endpoint: String,
    username: String,
    password: String,
    client: reqwest::Client,
}

impl WinRmExecutor {
    /// Connect to a remote host and verify the listener answers.
    pub async fn connect(config: &WinRmConfig) -> Result<Self> {
        let scheme = if config.https { "https" } else { "http" };
        let endpoint = format!("{}://{}:{}/wsman", scheme, config.host, config.port);

        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .timeout(Duration::from_secs(120))
            .build()
            .context("Failed to create HTTP client")?;

        let executor = Self {
            endpoint,
            username: config.username.clone(),
            password: config.password.clone(),
            client,
        };

        let probe = executor.execute("hostname").await?;
        if !probe.success() {
            warn!("WinRM probe on {} returned {:?}", executor.endpoint, probe.exit_code);
        }

        Ok(executor)
    }

    async fn send(&self, action: &str, shell_id: Option<&str>, body: &str) -> Result<String> {
        let envelope = envelope(&self.endpoint, action, shell_id, body);
        let response = self
            .client
            .post(&self.endpoint)
            .basic_auth(&self.username, Some(&self.password))
            .header("Content-Type", "application/soap+xml;charset=UTF-8")
            .body(envelope)
            .send()
            .await
            .map_err(|e| Error::WinRmConnection(format!("{}: {}", self.endpoint, e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .context("Failed to read WinRM response")?;

        if !status.is_success() {
            let fault = fault_reason(&text).unwrap_or_else(|| status.to_string());
            return Err(Error::WinRmConnection(format!("{}: {}", self.endpoint, fault)).into());
        }
        Ok(text)
    }

    async fn run_in_shell(&self, shell_id: &str, script: &str) -> Result<CommandOutput> {
        let command_body = format!(
            "<rsp:CommandLine><rsp:Command>powershell.exe</rsp:Command>\
             <rsp:Arguments>-NoProfile -NonInteractive -EncodedCommand {}</rsp:Arguments>\
             </rsp:CommandLine>",
            encode_powershell(script)
        );
        let response = self.send(ACTION_COMMAND, Some(shell_id), &command_body).await?;
        let command_id = element_text(&response, "CommandId")
            .context("WinRM response carries no CommandId")?;

        let receive_body = format!(
            "<rsp:Receive><rsp:DesiredStream CommandId=\"{}\">stdout stderr</rsp:DesiredStream></rsp:Receive>",
            command_id
        );

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let started = tokio::time::Instant::now();
        loop {
            let response = self.send(ACTION_RECEIVE, Some(shell_id), &receive_body).await?;
            let chunk = parse_receive(&response)?;
            stdout.extend(chunk.stdout);
            stderr.extend(chunk.stderr);

            if chunk.done {
                return Ok(CommandOutput {
                    exit_code: chunk.exit_code,
                    stdout: String::from_utf8_lossy(&stdout).to_string(),
                    stderr: String::from_utf8_lossy(&stderr).to_string(),
                });
            }
            if started.elapsed() > Duration::from_secs(MAX_COMMAND_SECONDS) {
                return Err(Error::CommandTimeout {
                    cmd: "powershell.exe".to_string(),
                    seconds: MAX_COMMAND_SECONDS,
                }
                .into());
            }
        }
    }
}

#[async_trait]
impl Executor for WinRmExecutor {
    async fn execute(&self, script: &str) -> Result<CommandOutput> {
        debug!("WinRM exec: {}", script);

        let shell_body = "<rsp:Shell><rsp:InputStreams>stdin</rsp:InputStreams>\
                          <rsp:OutputStreams>stdout stderr</rsp:OutputStreams></rsp:Shell>";
        let response = self.send(ACTION_CREATE, None, shell_body).await?;
        let shell_id =
            element_text(&response, "ShellId").context("WinRM response carries no ShellId")?;

        let result = self.run_in_shell(&shell_id, script).await;

        if let Err(e) = self.send(ACTION_DELETE, Some(&shell_id), "").await {
            warn!("Failed to delete WinRM shell {}: {}", shell_id, e);
        }
        result
    }

    fn target(&self) -> &str {
        &self.endpoint
    }
}

fn envelope(endpoint: &str, action: &str, shell_id: Option<&str>, body: &str) -> String {
    let selector = shell_id
        .map(|id| {
            format!(
                "<w:SelectorSet><w:Selector Name=\"ShellId\">{}</w:Selector></w:SelectorSet>",
                id
            )
        })
        .unwrap_or_default();
    let options = if action == ACTION_CREATE {
        "<w:OptionSet><w:Option Name=\"WINRS_NOPROFILE\">TRUE</w:Option>\
         <w:Option Name=\"WINRS_CODEPAGE\">65001</w:Option></w:OptionSet>"
    } else {
        ""
    };

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope"
            xmlns:a="http://schemas.xmlsoap.org/ws/2004/08/addressing"
            xmlns:w="http://schemas.dmtf.org/wbem/wsman/1/wsman.xsd"
            xmlns:rsp="http://schemas.microsoft.com/wbem/wsman/1/windows/shell">
  <s:Header>
    <a:To>{endpoint}</a:To>
    <a:ReplyTo><a:Address s:mustUnderstand="true">http://schemas.xmlsoap.org/ws/2004/08/addressing/role/anonymous</a:Address></a:ReplyTo>
    <w:ResourceURI s:mustUnderstand="true">{SHELL_RESOURCE_URI}</w:ResourceURI>
    <a:Action s:mustUnderstand="true">{action}</a:Action>
    <a:MessageID>uuid:{id}</a:MessageID>
    <w:MaxEnvelopeSize s:mustUnderstand="true">153600</w:MaxEnvelopeSize>
    <w:OperationTimeout>PT60S</w:OperationTimeout>
    {selector}{options}
  </s:Header>
  <s:Body>{body}</s:Body>
</s:Envelope>"#,
        id = uuid::Uuid::new_v4()
    )
}

/// Decoded content of one Receive response.
#[derive(Debug, Default, PartialEq, Eq)]
struct ReceiveChunk {
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    done: bool,
    exit_code: Option<i32>,
}

fn parse_receive(response: &str) -> Result<ReceiveChunk> {
    let doc = roxmltree::Document::parse(response).context("Malformed WinRM Receive response")?;
    let mut chunk = ReceiveChunk::default();

    for node in doc.descendants().filter(|n| n.is_element()) {
        match node.tag_name().name() {
            "Stream" => {
                let Some(text) = node.text().map(str::trim).filter(|t| !t.is_empty()) else {
                    continue;
                };
                let bytes = STANDARD
                    .decode(text)
                    .context("WinRM stream is not valid base64")?;
                match node.attribute("Name") {
                    Some("stderr") => chunk.stderr.extend(bytes),
                    _ => chunk.stdout.extend(bytes),
                }
            }
            "CommandState" => {
                chunk.done = node.attribute("State") == Some(COMMAND_STATE_DONE);
            }
            "ExitCode" => {
                chunk.exit_code = node.text().and_then(|t| t.trim().parse().ok());
            }
            _ => {}
        }
    }

    Ok(chunk)
}

/// Text of the first element with local name `name`.
fn element_text(response: &str, name: &str) -> Option<String> {
    let doc = roxmltree::Document::parse(response).ok()?;
    let text = doc
        .descendants()
        .find(|n| n.is_element() && n.tag_name().name() == name)?
        .text()?
        .trim()
        .to_string();
    Some(text)
}

fn fault_reason(response: &str) -> Option<String> {
    element_text(response, "Text").or_else(|| element_text(response, "Message"))
}


#[cfg(test)]
pub(crate) mod scripted {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Executor answering from a fixed script table.
    #[derive(Default)]
    pub struct ScriptedExecutor {
        responses: HashMap<String, std::result::Result<CommandOutput, String>>,
        delay: Option<Duration>,
        pub calls: Mutex<Vec<String>>,
    }

    impl ScriptedExecutor {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn ok(mut self, script: &str, stdout: &str) -> Self {
            self.responses.insert(
                script.to_string(),
                Ok(CommandOutput {
                    exit_code: Some(0),
                    stdout: stdout.to_string(),
                    stderr: String::new(),
                }),
            );
            self
        }

        pub fn exit(mut self, script: &str, code: i32, stderr: &str) -> Self {
            self.responses.insert(
                script.to_string(),
                Ok(CommandOutput {
                    exit_code: Some(code),
                    stdout: String::new(),
                    stderr: stderr.to_string(),
                }),
            );
            self
        }

        pub fn fail(mut self, script: &str, reason: &str) -> Self {
            self.responses.insert(script.to_string(), Err(reason.to_string()));
            self
        }

        pub fn delayed(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }
    }

    #[async_trait]
    impl Executor for ScriptedExecutor {
        async fn execute(&self, script: &str) -> Result<CommandOutput> {
            self.calls.lock().unwrap().push(script.to_string());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            match self.responses.get(script) {
                Some(Ok(output)) => Ok(output.clone()),
                Some(Err(reason)) => Err(Error::WinRmConnection(reason.clone()).into()),
                None => Ok(CommandOutput {
                    exit_code: Some(1),
                    stdout: String::new(),
                    stderr: "unexpected script".to_string(),
                }),
            }
        }

        fn target(&self) -> &str {
            "scripted"
        }
    }
}
