//! Terminal prompt resolver.

use std::io::{self, BufRead, Write};

use anyhow::{Context, Result};
use async_trait::async_trait;
use colored::Colorize;

use aas_access::{CredentialHint, HeaderItem, InteractiveResolver, ResolveRequest};

/// Asks for credentials on the terminal.
///
/// Secrets are read without echo. Empty input declines, including an empty
/// basic-auth password.
///
/// The read runs on the blocking pool and cannot be aborted. If the caller is
/// dropped the read is detached and keeps the terminal until it returns or the
/// process exits; the CLI exits on Ctrl-C for that reason.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsolePromptResolver;

impl ConsolePromptResolver {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn ask(request: &ResolveRequest) -> Result<Option<HeaderItem>> {
        let scope = request.key.as_str();
        eprintln!(
            "{} {} ({})",
            "Credentials required for".bright_yellow(),
            request.display_name().bright_cyan(),
            request.hint()
        );

        match request.hint() {
            CredentialHint::Basic => {
                let user = read_line("Username: ")?;
                if user.is_empty() {
                    return Ok(None);
                }
                let password = rpassword::prompt_password("Password: ")
                    .context("Failed to read password")?;
                Ok(basic_item(&user, &password, scope))
            }
            CredentialHint::ApiKey => {
                let prompt = format!("{}: ", request.header_name());
                let key = rpassword::prompt_password(prompt).context("Failed to read key")?;
                Ok(non_empty(&key).map(|key| HeaderItem::new(request.header_name(), key, scope)))
            }
            _ => {
                let token = rpassword::prompt_password("Bearer token (empty to skip): ")
                    .context("Failed to read token")?;
                Ok(non_empty(&token).map(|token| {
                    HeaderItem::new(request.header_name(), format!("Bearer {token}"), scope)
                }))
            }
        }
    }
}

fn read_line(prompt: &str) -> Result<String> {
    eprint!("{prompt}");
    io::stderr().flush()?;

    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read from terminal")?;
    Ok(line.trim().to_string())
}

/// Builds a basic-auth header, declining when either part is empty.
fn basic_item(user: &str, password: &str, scope: &str) -> Option<HeaderItem> {
    if user.is_empty() || password.is_empty() {
        return None;
    }
    Some(HeaderItem::basic(user, password, scope))
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[async_trait]
impl InteractiveResolver for ConsolePromptResolver {
    async fn resolve(&self, request: &ResolveRequest) -> Result<Option<HeaderItem>> {
        let request = request.clone();
        tokio::task::spawn_blocking(move || Self::ask(&request))
            .await
            .context("Prompt task failed")?
    }

    fn name(&self) -> &str {
        "console"
    }
}
