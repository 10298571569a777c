//! Agent configuration parser.
//!
//! Turns the monitoring agent's `config.xml` into a typed descriptor. Parsing
//! is best-effort per entry: an `<application>` missing a required attribute
//! is skipped and recorded, only a document that is not well-formed markup
//! fails as a whole.

use iisrecon_report_schema::{
    ControllerConfig, DeclaredApplication, DiagnosticLog, InstrumentationMode, Phase,
    StandaloneApplication,
};
use roxmltree::{Document, Node};
use std::fmt;
use thiserror::Error;
use tracing::{debug, warn};

const ROOT_ELEMENT: &str = "appdynamics-agent";

/// Fatal parse failure of the agent configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DescriptorError {
    #[error("Malformed document: {0}")]
    MalformedDocument(String),

    #[error("Agent configuration not found")]
    NotFound,

    #[error("Agent configuration unreadable: {0}")]
    Unreadable(String),
}

/// An entry skipped because a required attribute was missing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingRequiredField {
    pub element: String,
    /// 1-based position among its siblings.
    pub position: usize,
    pub field: &'static str,
}

impl fmt::Display for MissingRequiredField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<{}> #{} skipped: missing required attribute '{}'",
            self.element, self.position, self.field
        )
    }
}

/// Parsed agent configuration.
#[derive(Debug, Clone)]
pub struct AgentDescriptor {
    pub controller: Option<ControllerConfig>,
    pub mode: InstrumentationMode,
    pub applications: Vec<DeclaredApplication>,
    pub standalone: Vec<StandaloneApplication>,
    pub skipped: Vec<MissingRequiredField>,
}

impl Default for AgentDescriptor {
    fn default() -> Self {
        Self {
            controller: None,
            mode: InstrumentationMode::NotConfigured,
            applications: Vec::new(),
            standalone: Vec::new(),
            skipped: Vec::new(),
        }
    }
}

/// Parse raw agent configuration bytes.
pub fn parse_descriptor(
    bytes: &[u8],
    diagnostics: &mut DiagnosticLog,
) -> Result<AgentDescriptor, DescriptorError> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| DescriptorError::MalformedDocument(format!("not valid UTF-8: {}", e)))?;
    let text = text.trim_start_matches('\u{feff}');

    let doc = Document::parse(text)
        .map_err(|e| DescriptorError::MalformedDocument(e.to_string()))?;
    let root = doc.root_element();
    if !is_named(root, ROOT_ELEMENT) {
        return Err(DescriptorError::MalformedDocument(format!(
            "unexpected root element <{}>",
            root.tag_name().name()
        )));
    }

    let mut descriptor = AgentDescriptor {
        controller: child(root, &["controller"]).map(|n| parse_controller(n, diagnostics)),
        ..Default::default()
    };
    if descriptor.controller.is_none() {
        diagnostics.warn(Phase::Parse, "no <controller> element found");
    }

    let app_agents = child(root, &["app-agents"]);
    let iis = app_agents.and_then(|n| child(n, &["IIS"]));

    let application_nodes: Vec<Node> = iis
        .and_then(|n| child(n, &["applications"]))
        .map(|list| children(list, &["application"]).collect())
        .unwrap_or_default();
    let automatic = iis
        .and_then(|n| child(n, &["automatic"]))
        .filter(|n| !attr(*n, "enabled").is_some_and(|v| v.eq_ignore_ascii_case("false")));

    descriptor.mode = if !application_nodes.is_empty() {
        if automatic.is_some() {
            diagnostics.warn(
                Phase::Parse,
                "<automatic> marker ignored because an application list is present",
            );
        }
        InstrumentationMode::Manual
    } else if automatic.is_some() {
        InstrumentationMode::Automatic
    } else {
        InstrumentationMode::NotConfigured
    };
    debug!("Instrumentation mode: {}", descriptor.mode);

    for (index, node) in application_nodes.iter().enumerate() {
        match parse_application(*node, index + 1) {
            Ok(app) => descriptor.applications.push(app),
            Err(missing) => {
                warn!("{}", missing);
                diagnostics.warn(Phase::Parse, missing.to_string());
                descriptor.skipped.push(missing);
            }
        }
    }

    // The standalone list lives under <app-agents> in current agents and at
    // the root in older ones.
    let standalone_list = app_agents
        .and_then(|n| child(n, &["standalone-applications", "StandaloneApplications"]))
        .or_else(|| child(root, &["standalone-applications", "StandaloneApplications"]));
    if let Some(list) = standalone_list {
        let entries = children(list, &["standalone-application", "StandaloneApplication"]);
        for (index, node) in entries.enumerate() {
            match parse_standalone(node, index + 1) {
                Ok(app) => descriptor.standalone.push(app),
                Err(missing) => {
                    warn!("{}", missing);
                    diagnostics.warn(Phase::Parse, missing.to_string());
                    descriptor.skipped.push(missing);
                }
            }
        }
    }

    diagnostics.info(
        Phase::Parse,
        format!(
            "mode {}, {} application(s), {} standalone, {} skipped",
            descriptor.mode,
            descriptor.applications.len(),
            descriptor.standalone.len(),
            descriptor.skipped.len()
        ),
    );

    Ok(descriptor)
}

fn parse_controller(node: Node, diagnostics: &mut DiagnosticLog) -> ControllerConfig {
    let tls_enabled = attr(node, "ssl")
        .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
        .unwrap_or(false);
    let default_port = if tls_enabled { 443 } else { 80 };

    let port = match attr(node, "port") {
        Some(raw) => raw.parse::<u16>().unwrap_or_else(|_| {
            diagnostics.warn(
                Phase::Parse,
                format!("controller port '{}' is not a valid port, using {}", raw, default_port),
            );
            default_port
        }),
        None => default_port,
    };

    let host = attr(node, "host").unwrap_or_default().to_string();
    if host.is_empty() {
        diagnostics.warn(Phase::Parse, "controller host is missing");
    }

    let account_name = attr(node, "account")
        .or_else(|| child(node, &["account"]).and_then(|a| attr(a, "name")))
        .unwrap_or_default()
        .to_string();

    ControllerConfig {
        host,
        port,
        tls_enabled,
        account_name,
    }
}

fn parse_application(node: Node, position: usize) -> Result<DeclaredApplication, MissingRequiredField> {
    let missing = |field| MissingRequiredField {
        element: "application".to_string(),
        position,
        field,
    };

    let controller_application =
        attr(node, "controller-application").ok_or_else(|| missing("controller-application"))?;
    let site = attr(node, "site").ok_or_else(|| missing("site"))?;
    let path = attr(node, "path").unwrap_or("/");

    Ok(DeclaredApplication::new(
        controller_application,
        site,
        path,
        tier_name(node).unwrap_or_default(),
        false,
    ))
}

fn parse_standalone(node: Node, position: usize) -> Result<StandaloneApplication, MissingRequiredField> {
    let executable = attr(node, "executable").ok_or_else(|| MissingRequiredField {
        element: "standalone-application".to_string(),
        position,
        field: "executable",
    })?;

    let node_name = attr(node, "node")
        .or_else(|| child(node, &["node"]).and_then(|n| attr(n, "name")))
        .map(str::to_string);

    Ok(StandaloneApplication {
        executable: executable.to_string(),
        tier: tier_name(node).unwrap_or_default().to_string(),
        node: node_name,
    })
}

fn tier_name<'a>(node: Node<'a, '_>) -> Option<&'a str> {
    child(node, &["tier"])
        .and_then(|t| attr(t, "name"))
        .or_else(|| attr(node, "tier"))
}

fn is_named(node: Node, name: &str) -> bool {
    node.is_element() && node.tag_name().name().eq_ignore_ascii_case(name)
}

fn child<'a, 'input>(node: Node<'a, 'input>, names: &[&str]) -> Option<Node<'a, 'input>> {
    children(node, names).next()
}

fn children<'a, 'input: 'a, 'n>(
    node: Node<'a, 'input>,
    names: &'n [&'n str],
) -> impl Iterator<Item = Node<'a, 'input>> + 'n
where
    'a: 'n,
{
    node.children()
        .filter(move |n| names.iter().any(|name| is_named(*n, name)))
}

/// Attribute lookup ignoring ASCII case; blank values count as absent.
fn attr<'a>(node: Node<'a, '_>, name: &str) -> Option<&'a str> {
    node.attributes()
        .find(|a| a.name().eq_ignore_ascii_case(name))
        .map(|a| a.value().trim())
        .filter(|v| !v.is_empty())
}
