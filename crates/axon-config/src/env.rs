use std::sync::OnceLock;

use anyhow::bail;
use regex::{Captures, Regex};

fn placeholder() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // `{{ scope.NAME }}` with an optional `| default("value")`
    RE.get_or_init(|| {
        Regex::new(r#"\{\{\s*([A-Za-z0-9_]+)\.([A-Za-z0-9_]+)\s*(?:\|\s*default\("([^"]*)"\))?\s*\}\}"#)
            .expect("placeholder regex is valid")
    })
}

/// Substitute `{{ env.VAR }}` placeholders in raw config text
///
/// `{{ env.VAR | default("x") }}` yields `x` when `VAR` is unset. TOML comment
/// lines are copied verbatim so commented-out secrets never need to exist.
pub(crate) fn expand_env(input: &str) -> anyhow::Result<String> {
    let mut lines = Vec::new();

    for line in input.split('\n') {
        if line.trim_start().starts_with('#') || !line.contains("{{") {
            lines.push(line.to_owned());
            continue;
        }

        let mut failure = None;
        let expanded = placeholder().replace_all(line, |caps: &Captures<'_>| {
            resolve(caps).unwrap_or_else(|e| {
                failure.get_or_insert(e);
                String::new()
            })
        });

        if let Some(e) = failure {
            return Err(e);
        }
        lines.push(expanded.into_owned());
    }

    Ok(lines.join("\n"))
}

fn resolve(caps: &Captures<'_>) -> anyhow::Result<String> {
    let scope = &caps[1];
    let name = &caps[2];

    if scope != "env" {
        bail!("unsupported placeholder scope `{scope}` in `{}`", &caps[0]);
    }

    match (std::env::var(name), caps.get(3)) {
        (Ok(value), _) => Ok(value),
        (Err(_), Some(default)) => Ok(default.as_str().to_owned()),
        (Err(_), None) => bail!("environment variable `{name}` is not set"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_untouched() {
        let input = "model = \"gpt-4o\"\n";
        assert_eq!(expand_env(input).unwrap(), input);
    }

    #[test]
    fn substitutes_set_variables() {
        temp_env::with_vars([("AXON_KEY", Some("sk-1")), ("AXON_MODEL", Some("m"))], || {
            let out = expand_env("api_key = \"{{ env.AXON_KEY }}\"\nmodel = \"{{env.AXON_MODEL}}\"").unwrap();
            assert_eq!(out, "api_key = \"sk-1\"\nmodel = \"m\"");
        });
    }

    #[test]
    fn unset_variable_without_default_fails() {
        temp_env::with_var_unset("AXON_ABSENT", || {
            let err = expand_env("api_key = \"{{ env.AXON_ABSENT }}\"").unwrap_err();
            assert!(err.to_string().contains("AXON_ABSENT"));
        });
    }

    #[test]
    fn default_applies_only_when_unset() {
        temp_env::with_var_unset("AXON_PROXY", || {
            let out = expand_env("proxy_url = \"{{ env.AXON_PROXY | default(\"http://p:8080\") }}\"").unwrap();
            assert_eq!(out, "proxy_url = \"http://p:8080\"");
        });
        temp_env::with_var("AXON_PROXY", Some("http://q:1"), || {
            let out = expand_env("proxy_url = \"{{ env.AXON_PROXY | default(\"http://p:8080\") }}\"").unwrap();
            assert_eq!(out, "proxy_url = \"http://q:1\"");
        });
    }

    #[test]
    fn other_scopes_are_rejected() {
        let err = expand_env("x = \"{{ vault.SECRET }}\"").unwrap_err();
        assert!(err.to_string().contains("vault"));
    }

    #[test]
    fn comments_are_not_expanded() {
        temp_env::with_var_unset("AXON_ABSENT", || {
            let input = "  # api_key = \"{{ env.AXON_ABSENT }}\"\nmodel = \"m\"";
            assert_eq!(expand_env(input).unwrap(), input);
        });
    }
}
