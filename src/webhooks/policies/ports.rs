//! Required port declarations.

use super::Violation;
use crate::webhooks::context::RuleContext;

/// Every port listed in the required-ports annotation must be declared by
/// some container or init container
pub fn validate(ctx: &RuleContext<'_>) -> Vec<Violation> {
    let key = &ctx.config.keys.required_ports_annotation;
    let Some(raw) = ctx.view.metadata.annotation(key) else {
        return Vec::new();
    };
    let annotation = ctx.annotation(key);

    let mut violations = Vec::new();
    let mut required: Vec<u16> = Vec::new();
    for token in split_ports(raw) {
        match parse_port(token) {
            Some(port) if !required.contains(&port) => required.push(port),
            Some(_) => {}
            None => violations.push(Violation::invalid(
                &annotation,
                token,
                "must be a port number between 1 and 65535",
            )),
        }
    }

    let containers = ctx.pod_spec().field("containers");
    for port in required {
        let declared = ctx
            .view
            .pod_spec
            .all_containers()
            .flat_map(|(_, _, c)| c.ports.iter().flatten())
            .any(|p| p.number == i32::from(port));
        if !declared {
            violations.push(Violation::forbidden(
                &containers,
                format!("required port {port} is not declared by any container"),
            ));
        }
    }
    violations
}

/// Tokens separated by commas, semicolons or whitespace
fn split_ports(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(|c: char| c == ',' || c == ';' || c.is_whitespace())
        .filter(|t| !t.is_empty())
}

/// Plain decimal digits only; `u16::from_str` would also take a leading `+`
fn parse_port(token: &str) -> Option<u16> {
    if !token.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    token.parse::<u16>().ok().filter(|p| *p != 0)
}
