//! Prompt templates served through `prompts/list` and `prompts/get`.
//!
//! Templates use `{name}` placeholders, one per declared argument. Optional
//! arguments fall back to their default text when the client omits them.

use serde::Serialize;
use serde_json::{Value, json};
use std::collections::HashMap;

use crate::mcp::errors::{MCPError, MCPResult, ServerError};

#[derive(Debug, Clone, Serialize)]
pub struct PromptArgument {
    pub name: &'static str,
    pub description: &'static str,
    pub required: bool,
    #[serde(skip)]
    pub default: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct Prompt {
    pub name: &'static str,
    pub description: &'static str,
    pub arguments: Vec<PromptArgument>,
    #[serde(skip)]
    template: &'static str,
}

const fn required(name: &'static str, description: &'static str) -> PromptArgument {
    PromptArgument {
        name,
        description,
        required: true,
        default: "",
    }
}

const fn optional(
    name: &'static str,
    description: &'static str,
    default: &'static str,
) -> PromptArgument {
    PromptArgument {
        name,
        description,
        required: false,
        default,
    }
}

const DEPLOY_SITE: &str = "\
Deploy site {site_id} on Forge server {server_id}.

1. Call get_site to confirm the site exists and note its repository and branch.
2. Call get_deployment_script and check it for anything unexpected before running it.
3. Call deploy_site to trigger the deployment.
4. Call get_deployment_log and summarise the result. If the deployment failed, quote the failing lines and suggest a fix.";

const TROUBLESHOOT_SITE: &str = "\
Site {site_id} on Forge server {server_id} is misbehaving. Reported symptom: {symptom}.

Investigate without changing anything first:
1. Run server_health_check for server {server_id}.
2. Read the latest deployment log with get_deployment_log and the history with list_deployments.
3. List the site's workers and the server's daemons and note any that are not running.
4. Check the site's certificates with list_certificates.

Then explain the most likely cause and propose concrete steps. Ask before running anything that restarts, reboots or deletes.";

const SSL_RENEWAL_REVIEW: &str = "\
Review SSL certificates across the Forge account.

1. Run check_ssl_expiration with days_threshold {days_threshold}.
2. List expired certificates first, then the ones expiring soon, soonest first.
3. For each, say whether obtain_letsencrypt_certificate can renew it or whether manual action is needed.
4. Report any servers or sites that could not be scanned.";

const PROVISION_SITE: &str = "\
Set up {domain} on Forge server {server_id}.

1. Call create_site with the domain {domain}.
2. Repository: {repository}. If one is given, call install_git_repository on the new site.
3. Review the generated deployment script with get_deployment_script.
4. Call obtain_letsencrypt_certificate for {domain} once DNS points at the server.
5. Finish with a checklist of what is left to do (environment variables, database, first deploy).";

pub fn builtin_prompts() -> Vec<Prompt> {
    vec![
        Prompt {
            name: "deploy_site",
            description: "Deploy a site and review the outcome",
            arguments: vec![
                required("server_id", "Forge server id"),
                required("site_id", "Forge site id"),
            ],
            template: DEPLOY_SITE,
        },
        Prompt {
            name: "troubleshoot_site",
            description: "Diagnose a failing site using read-only tools first",
            arguments: vec![
                required("server_id", "Forge server id"),
                required("site_id", "Forge site id"),
                optional("symptom", "What is going wrong", "not specified"),
            ],
            template: TROUBLESHOOT_SITE,
        },
        Prompt {
            name: "ssl_renewal_review",
            description: "Find certificates that need renewing across all servers",
            arguments: vec![optional(
                "days_threshold",
                "Days before expiry that count as expiring soon",
                "30",
            )],
            template: SSL_RENEWAL_REVIEW,
        },
        Prompt {
            name: "provision_site",
            description: "Create a new site with repository and certificate",
            arguments: vec![
                required("server_id", "Forge server id"),
                required("domain", "Domain of the new site"),
                optional("repository", "Git repository as owner/name", "none"),
            ],
            template: PROVISION_SITE,
        },
    ]
}

pub struct PromptLibrary {
    prompts: Vec<Prompt>,
}

impl PromptLibrary {
    pub fn new() -> Self {
        Self {
            prompts: builtin_prompts(),
        }
    }

    pub fn list(&self) -> Value {
        json!({ "prompts": self.prompts })
    }

    /// Render a prompt into the `prompts/get` result shape
    pub fn get(&self, name: &str, arguments: &HashMap<String, String>) -> MCPResult<Value> {
        let prompt = self
            .prompts
            .iter()
            .find(|p| p.name == name)
            .ok_or_else(|| invalid_params(format!("Unknown prompt: {}", name)))?;

        let text = render(prompt, arguments)?;

        Ok(json!({
            "description": prompt.description,
            "messages": [{
                "role": "user",
                "content": { "type": "text", "text": text }
            }]
        }))
    }
}

impl Default for PromptLibrary {
    fn default() -> Self {
        Self::new()
    }
}

fn render(prompt: &Prompt, arguments: &HashMap<String, String>) -> MCPResult<String> {
    let mut text = prompt.template.to_string();

    for argument in &prompt.arguments {
        let value = match arguments.get(argument.name).map(|v| v.trim()) {
            Some(value) if !value.is_empty() => value,
            _ if argument.required => {
                return Err(invalid_params(format!(
                    "Prompt '{}' requires argument '{}'",
                    prompt.name, argument.name
                )));
            }
            _ => argument.default,
        };
        text = text.replace(&format!("{{{}}}", argument.name), value);
    }

    Ok(text)
}

fn invalid_params(message: String) -> MCPError {
    MCPError::Server(ServerError::InvalidParams(message))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_list_exposes_arguments() {
        let listed = PromptLibrary::new().list();
        let prompts = listed["prompts"].as_array().unwrap();
        assert_eq!(prompts.len(), 4);
        assert_eq!(prompts[0]["name"], json!("deploy_site"));
        assert_eq!(prompts[0]["arguments"][0]["required"], json!(true));
        assert!(prompts[0].get("template").is_none());
    }

    #[test]
    fn test_render_substitutes_every_placeholder() {
        let result = PromptLibrary::new()
            .get("provision_site", &args(&[("server_id", "3"), ("domain", "shop.test")]))
            .unwrap();
        let text = result["messages"][0]["content"]["text"].as_str().unwrap();
        assert!(text.starts_with("Set up shop.test on Forge server 3."));
        assert!(text.contains("Repository: none."));
        assert!(!text.contains('{'));
    }

    #[test]
    fn test_missing_required_argument() {
        let error = PromptLibrary::new()
            .get("deploy_site", &args(&[("server_id", "3")]))
            .unwrap_err();
        assert!(matches!(error, MCPError::Server(ServerError::InvalidParams(_))));
        assert!(error.to_string().contains("site_id"));
    }

    #[test]
    fn test_unknown_prompt() {
        assert!(PromptLibrary::new().get("nope", &HashMap::new()).is_err());
    }
}
