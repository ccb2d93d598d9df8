//! Display utilities for CLI output formatting

use colored::Colorize;
use secrecy::ExposeSecret;

use aas_access::{EndpointDescription, HeaderItem, LocationKey, LocationState};

/// Display one catalog entry
pub fn display_endpoint(index: usize, endpoint: &EndpointDescription) {
    println!(
        "{:>3}. {} {}",
        index + 1,
        endpoint.location.bright_cyan(),
        format!("[{}]", endpoint.credential_hint).bright_blue()
    );
    if let Some(name) = &endpoint.name {
        println!("     {name}");
    }
    if let Some(var) = &endpoint.token_env {
        println!("     token from ${var}");
    }
}

/// Display the result of matching a location against the catalog
pub fn display_match(key: &LocationKey, endpoint: Option<&EndpointDescription>) {
    println!("{} {}", "Key:".bold(), key.as_str().bright_cyan());
    match endpoint {
        Some(endpoint) => {
            println!(
                "{} {} ({}, header {})",
                "Endpoint:".bold(),
                endpoint.display_name().bright_green(),
                endpoint.credential_hint,
                endpoint.header_name()
            );
        }
        None => println!("{} {}", "Endpoint:".bold(), "none".dimmed()),
    }
}

/// Display a resolved header, redacted unless `reveal` is set
pub fn display_header(item: &HeaderItem, reveal: bool) {
    let value = if reveal {
        item.value().expose_secret().to_string()
    } else {
        redact(item.value().expose_secret())
    };
    println!("{} {value}", format!("{}:", item.name()).bright_green());
    if let Some(at) = item.expires_at() {
        println!("  expires {}", at.to_rfc3339().yellow());
    }
}

/// Display that no credential is available
pub fn display_none(state: LocationState) {
    println!("{} no credential ({state})", "○".bright_blue());
}

/// Keeps an auth scheme prefix such as `Bearer` and masks the rest.
fn redact(value: &str) -> String {
    match value.split_once(' ') {
        Some((scheme, _)) => format!("{scheme} ********"),
        None => "********".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redact() {
        assert_eq!(redact("Bearer abc"), "Bearer ********");
        assert_eq!(redact("k-123"), "********");
    }
}
