/// Resource families exposed by the Forge v1 API
///
/// Each family knows where it lives (account, server or site scope), which
/// JSON envelope keys Forge wraps it in, and which CRUD operations the API
/// supports for it.
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::forge::errors::{ForgeError, ForgeResult};

/// Where a resource lives in the URL hierarchy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    Account,
    Server,
    Site,
}

/// CRUD operations the generic client exposes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    List,
    Get,
    Create,
    Update,
    Delete,
}

impl Operation {
    pub fn is_read(self) -> bool {
        matches!(self, Operation::List | Operation::Get)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resource {
    Server,
    Site,
    Certificate,
    Database,
    DatabaseUser,
    Worker,
    Job,
    Daemon,
    FirewallRule,
    Recipe,
    Webhook,
    SshKey,
    SecurityRule,
    RedirectRule,
    NginxTemplate,
    Monitor,
    BackupConfig,
    PhpVersion,
}

const CRUD: &[Operation] = &[
    Operation::List,
    Operation::Get,
    Operation::Create,
    Operation::Update,
    Operation::Delete,
];

const NO_UPDATE: &[Operation] = &[
    Operation::List,
    Operation::Get,
    Operation::Create,
    Operation::Delete,
];

impl Resource {
    pub const ALL: [Resource; 18] = [
        Resource::Server,
        Resource::Site,
        Resource::Certificate,
        Resource::Database,
        Resource::DatabaseUser,
        Resource::Worker,
        Resource::Job,
        Resource::Daemon,
        Resource::FirewallRule,
        Resource::Recipe,
        Resource::Webhook,
        Resource::SshKey,
        Resource::SecurityRule,
        Resource::RedirectRule,
        Resource::NginxTemplate,
        Resource::Monitor,
        Resource::BackupConfig,
        Resource::PhpVersion,
    ];

    pub fn scope(self) -> Scope {
        match self {
            Resource::Server | Resource::Recipe => Scope::Account,
            Resource::Certificate
            | Resource::Worker
            | Resource::Webhook
            | Resource::SecurityRule
            | Resource::RedirectRule => Scope::Site,
            _ => Scope::Server,
        }
    }

    /// URL segment below the scope prefix
    fn segment(self) -> &'static str {
        match self {
            Resource::Server => "servers",
            Resource::Site => "sites",
            Resource::Certificate => "certificates",
            Resource::Database => "databases",
            Resource::DatabaseUser => "database-users",
            Resource::Worker => "workers",
            Resource::Job => "jobs",
            Resource::Daemon => "daemons",
            Resource::FirewallRule => "firewall-rules",
            Resource::Recipe => "recipes",
            Resource::Webhook => "webhooks",
            Resource::SshKey => "keys",
            Resource::SecurityRule => "security-rules",
            Resource::RedirectRule => "redirect-rules",
            Resource::NginxTemplate => "nginx/templates",
            Resource::Monitor => "monitors",
            Resource::BackupConfig => "backup-configs",
            Resource::PhpVersion => "php",
        }
    }

    /// Key wrapping a collection response, `None` when Forge returns a bare array
    pub fn collection_key(self) -> Option<&'static str> {
        match self {
            Resource::DatabaseUser => Some("users"),
            Resource::FirewallRule => Some("rules"),
            Resource::SshKey => Some("keys"),
            Resource::SecurityRule => Some("security_rules"),
            Resource::RedirectRule => Some("redirect_rules"),
            Resource::NginxTemplate => Some("templates"),
            Resource::BackupConfig => Some("backups"),
            Resource::PhpVersion => None,
            other => Some(other.segment()),
        }
    }

    /// Key wrapping a single-entity response
    pub fn item_key(self) -> Option<&'static str> {
        match self {
            Resource::Server => Some("server"),
            Resource::Site => Some("site"),
            Resource::Certificate => Some("certificate"),
            Resource::Database => Some("database"),
            Resource::DatabaseUser => Some("user"),
            Resource::Worker => Some("worker"),
            Resource::Job => Some("job"),
            Resource::Daemon => Some("daemon"),
            Resource::FirewallRule => Some("rule"),
            Resource::Recipe => Some("recipe"),
            Resource::Webhook => Some("webhook"),
            Resource::SshKey => Some("key"),
            Resource::SecurityRule => Some("security_rule"),
            Resource::RedirectRule => Some("redirect_rule"),
            Resource::NginxTemplate => Some("template"),
            Resource::Monitor => Some("monitor"),
            Resource::BackupConfig => Some("backup"),
            Resource::PhpVersion => None,
        }
    }

    pub fn operations(self) -> &'static [Operation] {
        match self {
            Resource::Server
            | Resource::Site
            | Resource::DatabaseUser
            | Resource::Recipe
            | Resource::NginxTemplate
            | Resource::BackupConfig => CRUD,
            Resource::PhpVersion => &[Operation::List, Operation::Create],
            _ => NO_UPDATE,
        }
    }

    pub fn supports(self, operation: Operation) -> bool {
        self.operations().contains(&operation)
    }

    /// Singular name used in tool names and messages
    pub fn singular(self) -> &'static str {
        match self {
            Resource::Server => "server",
            Resource::Site => "site",
            Resource::Certificate => "certificate",
            Resource::Database => "database",
            Resource::DatabaseUser => "database_user",
            Resource::Worker => "worker",
            Resource::Job => "scheduled_job",
            Resource::Daemon => "daemon",
            Resource::FirewallRule => "firewall_rule",
            Resource::Recipe => "recipe",
            Resource::Webhook => "webhook",
            Resource::SshKey => "ssh_key",
            Resource::SecurityRule => "security_rule",
            Resource::RedirectRule => "redirect_rule",
            Resource::NginxTemplate => "nginx_template",
            Resource::Monitor => "monitor",
            Resource::BackupConfig => "backup_config",
            Resource::PhpVersion => "php_version",
        }
    }

    pub fn plural(self) -> String {
        format!("{}s", self.singular())
    }

    /// Human readable label for descriptions
    pub fn label(self) -> String {
        match self {
            Resource::SshKey => "SSH key".to_string(),
            Resource::PhpVersion => "PHP version".to_string(),
            Resource::NginxTemplate => "Nginx template".to_string(),
            other => other.singular().replace('_', " "),
        }
    }

    /// Collection path for this resource below the given parents
    pub fn collection_path(self, parents: &Parents) -> ForgeResult<String> {
        let prefix = match self.scope() {
            Scope::Account => String::new(),
            Scope::Server => format!("/servers/{}", parents.require_server(self)?),
            Scope::Site => format!(
                "/servers/{}/sites/{}",
                parents.require_server(self)?,
                parents.require_site(self)?
            ),
        };

        Ok(format!("{}/{}", prefix, self.segment()))
    }

    pub fn item_path(self, parents: &Parents, id: u64) -> ForgeResult<String> {
        Ok(format!("{}/{}", self.collection_path(parents)?, id))
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.singular())
    }
}

/// Parent identifiers locating a nested resource
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Parents {
    pub server_id: Option<u64>,
    pub site_id: Option<u64>,
}

impl Parents {
    pub fn account() -> Self {
        Self::default()
    }

    pub fn server(server_id: u64) -> Self {
        Self {
            server_id: Some(server_id),
            site_id: None,
        }
    }

    pub fn site(server_id: u64, site_id: u64) -> Self {
        Self {
            server_id: Some(server_id),
            site_id: Some(site_id),
        }
    }

    fn require_server(&self, resource: Resource) -> ForgeResult<u64> {
        self.server_id.ok_or_else(|| {
            ForgeError::InvalidRequest(format!("server_id is required for {}", resource.label()))
        })
    }

    fn require_site(&self, resource: Resource) -> ForgeResult<u64> {
        self.site_id.ok_or_else(|| {
            ForgeError::InvalidRequest(format!("site_id is required for {}", resource.label()))
        })
    }
}
