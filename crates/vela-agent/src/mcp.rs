//! MCP gateway service registry.
//!
//! The table is static (slug, keywords, routing priority, capability tag);
//! gateway URLs and bearer credentials are secrets and come from config.
//! Priority is the declaration order — most specific first, so overlapping
//! keywords ("docs" inside "google docs") resolve deterministically. Adding
//! an integration means appending one `ServiceSpec` row.

use serde_json::{json, Value};

use vela_core::config::McpGatewayConfig;

/// The registered integration services, in routing priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum McpService {
    FileDrive,
    Mail,
    TaskTracker,
    Calendar,
    Docs,
    Sheets,
    TimeTracker,
    ChatBridge,
}

struct ServiceSpec {
    service: McpService,
    slug: &'static str,
    display_name: &'static str,
    keywords: &'static [&'static str],
    tag: &'static str,
    description: &'static str,
}

/// Priority order: most specific first.
const SERVICES: &[ServiceSpec] = &[
    ServiceSpec {
        service: McpService::FileDrive,
        slug: "drive",
        display_name: "File Drive",
        keywords: &["drive", "gdrive", "arquivo"],
        tag: "McpFileDrive",
        description: "📁 buscar, listar, criar e gerenciar arquivos e pastas",
    },
    ServiceSpec {
        service: McpService::Mail,
        slug: "mail",
        display_name: "Mail",
        keywords: &["mail", "email", "e-mail"],
        tag: "McpMail",
        description: "📧 enviar, ler e gerenciar emails",
    },
    ServiceSpec {
        service: McpService::TaskTracker,
        slug: "tasks",
        display_name: "Task Tracker",
        keywords: &["tasks", "task", "project", "projeto"],
        tag: "McpTaskTracker",
        description: "📋 gerenciar projetos, tarefas e workspaces",
    },
    ServiceSpec {
        service: McpService::Calendar,
        slug: "calendar",
        display_name: "Calendar",
        keywords: &["calendar", "calendario", "agenda", "evento", "meeting", "reunião"],
        tag: "McpCalendar",
        description: "📅 criar e gerenciar eventos, reuniões e compromissos",
    },
    ServiceSpec {
        service: McpService::Docs,
        slug: "docs",
        display_name: "Docs",
        keywords: &["docs", "documento"],
        tag: "McpDocs",
        description: "📝 criar, editar e gerenciar documentos de texto",
    },
    ServiceSpec {
        service: McpService::Sheets,
        slug: "sheets",
        display_name: "Sheets",
        keywords: &["sheets", "planilha", "spreadsheet"],
        tag: "McpSheets",
        description: "📊 criar, editar e gerenciar planilhas",
    },
    ServiceSpec {
        service: McpService::TimeTracker,
        slug: "timetracker",
        display_name: "Time Tracker",
        keywords: &["timetracker", "track", "time", "hours", "horas"],
        tag: "McpTimeTracker",
        description: "⏱️ registrar tempo em projetos e tarefas",
    },
    ServiceSpec {
        service: McpService::ChatBridge,
        slug: "bridge",
        display_name: "Chat Bridge",
        keywords: &["bridge", "mensagem"],
        tag: "McpChatBridge",
        description: "💬 enviar mensagens para outros workspaces",
    },
];

impl McpService {
    fn spec(self) -> &'static ServiceSpec {
        SERVICES
            .iter()
            .find(|s| s.service == self)
            .expect("every service has a spec row")
    }

    pub fn slug(self) -> &'static str {
        self.spec().slug
    }

    pub fn display_name(self) -> &'static str {
        self.spec().display_name
    }

    pub fn tag(self) -> &'static str {
        self.spec().tag
    }

    pub fn keywords(self) -> &'static [&'static str] {
        self.spec().keywords
    }

    pub fn description(self) -> &'static str {
        self.spec().description
    }

    /// Gateway routing label.
    pub fn server_label(self) -> String {
        format!("gateway-{}", self.slug())
    }

    pub fn all() -> impl Iterator<Item = McpService> {
        SERVICES.iter().map(|s| s.service)
    }
}

/// A fully configured gateway endpoint for one service.
#[derive(Debug, Clone)]
pub struct McpDescriptor {
    pub service: McpService,
    pub url: String,
    pub api_key: String,
}

impl McpDescriptor {
    /// Wire shape passed into the responses call's `tools` array.
    pub fn tool_json(&self) -> Value {
        json!({
            "type": "mcp",
            "server_label": self.service.server_label(),
            "server_url": self.url,
            "require_approval": "never",
            "headers": {
                "Authorization": format!("Bearer {}", self.api_key.trim()),
            },
        })
    }
}

/// Configured services, preserving routing priority order.
pub struct McpRegistry {
    descriptors: Vec<McpDescriptor>,
}

impl McpRegistry {
    pub fn from_config(cfg: &McpGatewayConfig) -> Self {
        let mut descriptors = Vec::new();
        for service in McpService::all() {
            if let Some(ep) = cfg.endpoints.iter().find(|e| e.slug == service.slug()) {
                descriptors.push(McpDescriptor {
                    service,
                    url: ep.url.clone(),
                    api_key: ep.api_key.clone(),
                });
            }
        }
        Self { descriptors }
    }

    pub fn descriptors(&self) -> &[McpDescriptor] {
        &self.descriptors
    }

    pub fn get(&self, service: McpService) -> Option<&McpDescriptor> {
        self.descriptors.iter().find(|d| d.service == service)
    }

    /// Keyword-priority routing: first configured service whose keyword set
    /// matches the lowercased text wins.
    pub fn detect(&self, text: &str) -> Option<&McpDescriptor> {
        let lower = text.to_lowercase();
        self.descriptors.iter().find(|d| {
            d.service
                .keywords()
                .iter()
                .any(|kw| lower.contains(kw))
        })
    }

    /// Tool-list description block injected into the agent instructions.
    pub fn tools_description(&self) -> String {
        let mut out = String::from("Gateway Integration Tools:\n");
        for d in &self.descriptors {
            out.push_str(&format!(
                "  - **{}**: {} (keyword: '{}')\n",
                d.service.display_name(),
                d.service.description(),
                d.service.slug(),
            ));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vela_core::config::McpEndpoint;

    fn full_config() -> McpGatewayConfig {
        McpGatewayConfig {
            endpoints: McpService::all()
                .map(|s| McpEndpoint {
                    slug: s.slug().to_string(),
                    url: format!("https://gateway.example/{}/mcp", s.slug()),
                    api_key: format!("key-{}", s.slug()),
                })
                .collect(),
        }
    }

    #[test]
    fn registry_preserves_priority_order() {
        let reg = McpRegistry::from_config(&full_config());
        let order: Vec<McpService> = reg.descriptors().iter().map(|d| d.service).collect();
        assert_eq!(order[0], McpService::FileDrive);
        assert_eq!(order[1], McpService::Mail);
        assert_eq!(*order.last().unwrap(), McpService::ChatBridge);
    }

    #[test]
    fn keyword_routing_first_match_wins() {
        let reg = McpRegistry::from_config(&full_config());
        // "docs" appears in the Docs keyword set, but "drive" has priority
        // when both occur.
        let d = reg.detect("procure no drive o documento docs").unwrap();
        assert_eq!(d.service, McpService::FileDrive);
    }

    #[test]
    fn time_tracking_phrase_routes_to_time_tracker() {
        let reg = McpRegistry::from_config(&full_config());
        let d = reg.detect("track 2h on ev:273393148295192").unwrap();
        assert_eq!(d.service, McpService::TimeTracker);
    }

    #[test]
    fn unmatched_text_routes_nowhere() {
        let reg = McpRegistry::from_config(&full_config());
        assert!(reg.detect("qual a previsão de chuva para amanhã?").is_none());
    }

    #[test]
    fn unconfigured_service_is_not_routable() {
        let mut cfg = full_config();
        cfg.endpoints.retain(|e| e.slug != "mail");
        let reg = McpRegistry::from_config(&cfg);
        // "email" would route to mail, but mail has no endpoint, and no
        // other keyword matches.
        assert!(reg.detect("leia meu email").is_none());
    }

    #[test]
    fn tool_json_shape() {
        let reg = McpRegistry::from_config(&full_config());
        let tool = reg.get(McpService::Mail).unwrap().tool_json();
        assert_eq!(tool["type"], "mcp");
        assert_eq!(tool["server_label"], "gateway-mail");
        assert_eq!(tool["require_approval"], "never");
        assert!(tool["headers"]["Authorization"]
            .as_str()
            .unwrap()
            .starts_with("Bearer "));
    }
}
