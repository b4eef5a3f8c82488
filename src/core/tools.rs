//! Tool catalog, MCP server listings, and agent presets.

use chat_core::{ToolRef, ToolSource};
use serde::{Deserialize, Serialize};

/// A built-in Heroku tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HerokuTool {
    pub id: &'static str,
    pub label: &'static str,
}

/// Heroku tools available to every agent turn.
pub const HEROKU_TOOLS: &[HerokuTool] = &[
    HerokuTool { id: "html_to_markdown", label: "HTML to Markdown" },
    HerokuTool { id: "pdf_to_markdown", label: "PDF to Markdown" },
    HerokuTool { id: "code_exec_python", label: "Python" },
    HerokuTool { id: "code_exec_node", label: "Node.js" },
    HerokuTool { id: "code_exec_ruby", label: "Ruby" },
    HerokuTool { id: "code_exec_go", label: "Go" },
    HerokuTool { id: "postgres_get_schema", label: "Postgres schema" },
    HerokuTool { id: "postgres_run_query", label: "Postgres query" },
];

const CODE_EXEC_TOOLS: &[&str] = &[
    "code_exec_python",
    "code_exec_node",
    "code_exec_ruby",
    "code_exec_go",
];

const CONTENT_TOOLS: &[&str] = &["html_to_markdown", "pdf_to_markdown"];

/// A tool exposed by an MCP server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(default)]
pub struct McpServerTool {
    pub name: String,
    pub namespaced_name: String,
    pub description: String,
}

/// An MCP server registered with the inference service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(default)]
pub struct McpServer {
    pub id: String,
    pub app_id: String,
    pub tools: Vec<McpServerTool>,
    pub server_status: String,
    pub primitives_status: String,
    pub namespace: String,
}

/// MCP tools from every server, addressed by namespaced name.
#[must_use]
pub fn mcp_tool_refs(servers: &[McpServer]) -> Vec<ToolRef> {
    servers
        .iter()
        .flat_map(|server| &server.tools)
        .map(|tool| ToolRef {
            name: tool.namespaced_name.clone(),
            source: Some(ToolSource::Mcp),
            description: Some(tool.description.clone()).filter(|d| !d.is_empty()),
        })
        .collect()
}

fn heroku_ref(id: &str) -> ToolRef {
    ToolRef {
        name: id.to_string(),
        source: Some(ToolSource::Heroku),
        description: None,
    }
}

/// Named bundle of tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Preset {
    /// Code execution across languages.
    CodeExec,
    /// Document conversion.
    ContentProcessor,
    /// MCP server tools only.
    HerokuAdmin,
    /// Every available tool.
    FullStack,
}

impl Preset {
    pub const ALL: [Self; 4] = [
        Self::CodeExec,
        Self::ContentProcessor,
        Self::HerokuAdmin,
        Self::FullStack,
    ];

    #[must_use]
    pub const fn id(self) -> &'static str {
        match self {
            Self::CodeExec => "code-exec",
            Self::ContentProcessor => "content-processor",
            Self::HerokuAdmin => "heroku-admin",
            Self::FullStack => "full-stack",
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::CodeExec => "Code Executor",
            Self::ContentProcessor => "Content Processor",
            Self::HerokuAdmin => "MCP Only",
            Self::FullStack => "Admin",
        }
    }

    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::CodeExec => "Code execution across multiple languages",
            Self::ContentProcessor => "Convert and process documents",
            Self::HerokuAdmin => "MCP server tools only",
            Self::FullStack => "All available tools for comprehensive tasks",
        }
    }

    /// Tools selected by this preset, given the MCP tools currently available.
    #[must_use]
    pub fn tools(self, mcp: &[ToolRef]) -> Vec<ToolRef> {
        let heroku = |ids: &[&str]| ids.iter().copied().map(heroku_ref).collect::<Vec<_>>();

        match self {
            Self::CodeExec => heroku(CODE_EXEC_TOOLS),
            Self::ContentProcessor => heroku(CONTENT_TOOLS),
            Self::HerokuAdmin => mcp.to_vec(),
            Self::FullStack => {
                let mut tools = heroku(CONTENT_TOOLS);
                tools.extend(heroku(CODE_EXEC_TOOLS));
                tools.extend_from_slice(mcp);
                tools
            }
        }
    }

    /// Whether this preset draws on MCP servers.
    #[must_use]
    pub const fn uses_mcp(self) -> bool {
        matches!(self, Self::HerokuAdmin | Self::FullStack)
    }
}

/// Resolve tool names picked by the user.
///
/// Heroku tool ids and MCP namespaced names are tagged with their source.
/// Unknown names pass through untagged; the proxy skips them.
#[must_use]
pub fn resolve(names: &[String], mcp: &[ToolRef]) -> Vec<ToolRef> {
    names
        .iter()
        .map(|name| {
            if HEROKU_TOOLS.iter().any(|tool| tool.id == name.as_str()) {
                heroku_ref(name)
            } else if let Some(tool) = mcp.iter().find(|tool| &tool.name == name) {
                tool.clone()
            } else {
                tracing::warn!(tool = %name, "unknown tool selected");
                ToolRef::named(name.clone())
            }
        })
        .collect()
}

/// Merge tool lists, keeping the first occurrence of each name.
#[must_use]
pub fn dedup(tools: Vec<ToolRef>) -> Vec<ToolRef> {
    let mut seen = std::collections::HashSet::new();
    tools
        .into_iter()
        .filter(|tool| seen.insert(tool.name.clone()))
        .collect()
}
