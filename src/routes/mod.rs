//! Route registry
//!
//! Static table from `resource.action` to the HTTP semantics of the
//! downstream financial operations API. The table is built once and never
//! mutated; every abstract command is translated through it.

mod table;

pub use table::{builtin_routes, CURRENT_ORGANIZATION_FLAG};

use crate::error::GatewayError;
use crate::mfa::SensitiveKind;
use crate::models::normalize;
use crate::Result;
use lazy_static::lazy_static;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

//
// ================= Descriptor =================
//

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }

    /// GET/DELETE carry flags in the query, everything else in the body.
    pub fn default_placement(&self) -> Placement {
        match self {
            HttpMethod::Get | HttpMethod::Delete => Placement::Query,
            HttpMethod::Post | HttpMethod::Put | HttpMethod::Patch => Placement::Body,
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Placement {
    Query,
    Body,
}

/// Where a route's flags are serialized. First match wins:
/// blanket directive, then explicit query allowlist, then method default.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(tag = "rule", content = "value", rename_all = "snake_case")]
pub enum FlagPlacement {
    All(Placement),
    QueryAllowlist(&'static [&'static str]),
    ByMethod,
}

impl FlagPlacement {
    pub fn resolve(&self, method: HttpMethod, flag: &str) -> Placement {
        match self {
            FlagPlacement::All(placement) => *placement,
            FlagPlacement::QueryAllowlist(names) => {
                if names.contains(&flag) {
                    Placement::Query
                } else {
                    Placement::Body
                }
            }
            FlagPlacement::ByMethod => method.default_placement(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ResponseFormat {
    Json,
    Binary,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RouteDescriptor {
    pub resource: &'static str,
    pub action: &'static str,
    pub method: HttpMethod,
    pub path: &'static str,
    pub placement: FlagPlacement,
    pub description: &'static str,
    pub response: ResponseFormat,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sensitive: Option<SensitiveKind>,
    /// Reachable only from inside the crate; never listed or looked up by callers.
    #[serde(skip)]
    pub internal: bool,
}

impl RouteDescriptor {
    pub fn new(
        resource: &'static str,
        action: &'static str,
        method: HttpMethod,
        path: &'static str,
        description: &'static str,
    ) -> Self {
        Self {
            resource,
            action,
            method,
            path,
            placement: FlagPlacement::ByMethod,
            description,
            response: ResponseFormat::Json,
            sensitive: None,
            internal: false,
        }
    }

    pub fn placement(mut self, placement: FlagPlacement) -> Self {
        self.placement = placement;
        self
    }

    pub fn query_flags(self, names: &'static [&'static str]) -> Self {
        self.placement(FlagPlacement::QueryAllowlist(names))
    }

    pub fn binary(mut self) -> Self {
        self.response = ResponseFormat::Binary;
        self
    }

    pub fn sensitive(mut self, kind: SensitiveKind) -> Self {
        self.sensitive = Some(kind);
        self
    }

    pub fn internal(mut self) -> Self {
        self.internal = true;
        self
    }

    pub fn key(&self) -> String {
        format!("{}.{}", self.resource, self.action)
    }

    /// Name of the `{placeholder}` in the path template, if any.
    pub fn placeholder(&self) -> Option<&'static str> {
        let path = self.path;
        let start = path.find('{')?;
        let end = path[start..].find('}')? + start;
        Some(&path[start + 1..end])
    }

    /// Substitute `id` as a single percent-encoded path segment.
    ///
    /// `None` when the template has a placeholder and `id` cannot fill it:
    /// blank, or a dot segment that URL resolution would collapse.
    pub fn render_path(&self, id: &str) -> Option<String> {
        let Some(name) = self.placeholder() else {
            return Some(self.path.to_string());
        };

        if id.trim().is_empty() || is_dot_segment(id) {
            return None;
        }

        let segment = urlencoding::encode(id);
        Some(self.path.replacen(&format!("{{{}}}", name), &segment, 1))
    }

    pub fn usage(&self) -> String {
        match self.placeholder() {
            Some(name) => format!("{} {} <{}>", self.resource, self.action, name),
            None => format!("{} {}", self.resource, self.action),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.resource.is_empty() || self.action.is_empty() {
            return Err(GatewayError::InvalidRouteTable(format!(
                "route '{}' has an empty resource or action",
                self.key()
            )));
        }

        if self.resource != normalize(self.resource) || self.action != normalize(self.action) {
            return Err(GatewayError::InvalidRouteTable(format!(
                "route '{}' must be lowercase",
                self.key()
            )));
        }

        let opens = self.path.matches('{').count();
        let closes = self.path.matches('}').count();
        if opens > 1 || opens != closes || self.placeholder().is_some_and(str::is_empty) {
            return Err(GatewayError::InvalidRouteTable(format!(
                "route '{}' path '{}' must contain at most one named placeholder",
                self.key(),
                self.path
            )));
        }

        Ok(())
    }
}

//
// ================= Registry =================
//

lazy_static! {
    static ref BUILTIN: Arc<RouteRegistry> = Arc::new(RouteRegistry::from_trusted(builtin_routes()));
}

/// Immutable `resource.action` → [`RouteDescriptor`] table.
///
/// Internal routes live in a separate table: callers cannot look them up
/// and they never appear in help.
#[derive(Debug, Default)]
pub struct RouteRegistry {
    routes: Vec<RouteDescriptor>,
    index: HashMap<String, usize>,
    internal: Vec<RouteDescriptor>,
    internal_index: HashMap<String, usize>,
}

impl RouteRegistry {
    /// Build a registry, rejecting duplicate keys and malformed paths.
    pub fn new(routes: Vec<RouteDescriptor>) -> Result<Self> {
        let mut registry = Self::default();

        for route in routes {
            route.validate()?;
            if registry.contains(&route.key()) {
                return Err(GatewayError::InvalidRouteTable(format!(
                    "duplicate route '{}'",
                    route.key()
                )));
            }
            registry.insert(route);
        }

        Ok(registry)
    }

    /// The compiled-in table shared by the whole process.
    pub fn builtin() -> Arc<RouteRegistry> {
        Arc::clone(&BUILTIN)
    }

    /// Keeps the first of any duplicates and drops malformed entries.
    fn from_trusted(routes: Vec<RouteDescriptor>) -> Self {
        let mut registry = Self::default();

        for route in routes {
            if let Err(e) = route.validate() {
                warn!(error = %e, "Dropping invalid route");
                continue;
            }
            if registry.contains(&route.key()) {
                warn!(route = %route.key(), "Dropping duplicate route");
                continue;
            }
            registry.insert(route);
        }

        registry
    }

    fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key) || self.internal_index.contains_key(key)
    }

    fn insert(&mut self, route: RouteDescriptor) {
        let (routes, index) = if route.internal {
            (&mut self.internal, &mut self.internal_index)
        } else {
            (&mut self.routes, &mut self.index)
        };
        index.insert(route.key(), routes.len());
        routes.push(route);
    }

    /// Caller-facing lookup. Internal routes are invisible here.
    pub fn lookup(&self, resource: &str, action: &str) -> Option<&RouteDescriptor> {
        let key = format!("{}.{}", normalize(resource), normalize(action));
        self.index.get(&key).map(|&i| &self.routes[i])
    }

    pub(crate) fn lookup_internal(&self, resource: &str, action: &str) -> Option<&RouteDescriptor> {
        let key = format!("{}.{}", normalize(resource), normalize(action));
        self.internal_index.get(&key).map(|&i| &self.internal[i])
    }

    /// All routes in registration order.
    pub fn list(&self) -> &[RouteDescriptor] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Routes grouped by resource, resources in first-registration order.
    pub fn grouped_by_resource(&self) -> Vec<(&'static str, Vec<&RouteDescriptor>)> {
        let mut groups: Vec<(&'static str, Vec<&RouteDescriptor>)> = Vec::new();

        for route in &self.routes {
            match groups.iter_mut().find(|(resource, _)| *resource == route.resource) {
                Some((_, routes)) => routes.push(route),
                None => groups.push((route.resource, vec![route])),
            }
        }

        groups
    }

    pub fn resources(&self) -> Vec<&'static str> {
        self.grouped_by_resource()
            .into_iter()
            .map(|(resource, _)| resource)
            .collect()
    }

    pub fn has_resource(&self, resource: &str) -> bool {
        let resource = normalize(resource);
        self.routes.iter().any(|r| r.resource == resource)
    }

    /// Full command list as aligned text.
    pub fn render_catalog(&self) -> String {
        let rows: Vec<[String; 4]> = self
            .routes
            .iter()
            .map(|r| {
                [
                    r.usage(),
                    r.method.to_string(),
                    r.path.to_string(),
                    describe(r),
                ]
            })
            .collect();

        let mut out = String::from("Available commands:\n\n");
        out.push_str(&render_rows(&rows));
        out
    }

    /// One resource's actions as aligned text.
    pub fn render_resource(&self, resource: &str) -> Option<String> {
        let resource = normalize(resource);
        let rows: Vec<[String; 4]> = self
            .routes
            .iter()
            .filter(|r| r.resource == resource)
            .map(|r| {
                let usage = match r.placeholder() {
                    Some(name) => format!("{} <{}>", r.action, name),
                    None => r.action.to_string(),
                };
                [usage, r.method.to_string(), r.path.to_string(), describe(r)]
            })
            .collect();

        if rows.is_empty() {
            return None;
        }

        let mut out = format!("{} commands:\n\n", resource);
        out.push_str(&render_rows(&rows));
        Some(out)
    }

    /// Comma-separated resource names, used in error hints.
    pub fn render_resource_list(&self) -> String {
        format!("Available resources: {}", self.resources().join(", "))
    }
}

/// `%` is escaped by the encoder, so only the literal forms need catching.
fn is_dot_segment(id: &str) -> bool {
    id == "." || id == ".."
}

fn describe(route: &RouteDescriptor) -> String {
    match route.sensitive {
        Some(_) => format!("{} (requires passcode)", route.description),
        None => route.description.to_string(),
    }
}

fn render_rows(rows: &[[String; 4]]) -> String {
    let mut widths = [0usize; 3];
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row.iter()) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    for row in rows {
        out.push_str(&format!(
            "  {:<w0$}  {:<w1$}  {:<w2$}  {}\n",
            row[0],
            row[1],
            row[2],
            row[3],
            w0 = widths[0],
            w1 = widths[1],
            w2 = widths[2],
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mfa::SensitiveKind;

    fn route(resource: &'static str, action: &'static str, path: &'static str) -> RouteDescriptor {
        RouteDescriptor::new(resource, action, HttpMethod::Get, path, "test route")
    }

    #[test]
    fn test_builtin_table_is_valid() {
        let registry = RouteRegistry::new(builtin_routes());
        assert!(registry.is_ok(), "{:?}", registry.err());
        assert_eq!(registry.unwrap().len(), RouteRegistry::builtin().len());
    }

    #[test]
    fn test_duplicate_routes_are_rejected() {
        let result = RouteRegistry::new(vec![
            route("transfers", "show", "/v2/transfers/{id}"),
            route("transfers", "show", "/v2/transfers/{id}"),
        ]);
        assert!(matches!(result, Err(GatewayError::InvalidRouteTable(_))));
    }

    #[test]
    fn test_paths_with_two_placeholders_are_rejected() {
        let result = RouteRegistry::new(vec![route("a", "b", "/x/{id}/y/{other}")]);
        assert!(result.is_err());

        let result = RouteRegistry::new(vec![route("a", "b", "/x/{}")]);
        assert!(result.is_err());
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let registry = RouteRegistry::builtin();
        let descriptor = registry.lookup("Transfers", " SHOW").unwrap();
        assert_eq!(descriptor.method, HttpMethod::Get);
        assert_eq!(descriptor.path, "/v2/transfers/{id}");
        assert!(registry.lookup("transfers", "teleport").is_none());
    }

    #[test]
    fn test_placeholder_and_render_path() {
        let descriptor = route("transfers", "show", "/v2/transfers/{id}");
        assert_eq!(descriptor.placeholder(), Some("id"));
        assert_eq!(descriptor.render_path("txn_42").as_deref(), Some("/v2/transfers/txn_42"));

        let descriptor = route("transfers", "list", "/v2/transfers");
        assert_eq!(descriptor.placeholder(), None);
        assert_eq!(descriptor.render_path("ignored").as_deref(), Some("/v2/transfers"));
    }

    #[test]
    fn test_render_path_escapes_id_as_one_segment() {
        let descriptor = route("transfers", "return", "/v2/transfers/{id}/return");

        assert_eq!(
            descriptor.render_path("../../v2/transfers?").as_deref(),
            Some("/v2/transfers/..%2F..%2Fv2%2Ftransfers%3F/return")
        );
        assert_eq!(
            descriptor.render_path("a#b%2e").as_deref(),
            Some("/v2/transfers/a%23b%252e/return")
        );
        assert_eq!(
            descriptor.render_path("acme inc").as_deref(),
            Some("/v2/transfers/acme%20inc/return")
        );

        for unusable in ["", "  ", ".", ".."] {
            assert_eq!(descriptor.render_path(unusable), None, "{:?}", unusable);
        }
    }

    #[test]
    fn test_internal_routes_are_hidden() {
        let registry = RouteRegistry::builtin();

        assert!(registry.lookup("otp", "send").is_none());
        assert!(registry.lookup_internal("otp", "send").is_some());
        assert!(registry.lookup_internal("transfers", "show").is_none());
        assert!(!registry.has_resource("otp"));
        assert!(!registry.render_catalog().contains("/v1/otp/send"));
        assert!(registry.render_resource("otp").is_none());
        assert!(registry.list().iter().all(|r| !r.internal));
    }

    #[test]
    fn test_internal_and_public_keys_share_one_namespace() {
        let result = RouteRegistry::new(vec![
            route("otp", "send", "/v1/otp/send"),
            route("otp", "send", "/v1/otp/send").internal(),
        ]);
        assert!(matches!(result, Err(GatewayError::InvalidRouteTable(_))));
    }

    #[test]
    fn test_placement_resolution_order() {
        let blanket = FlagPlacement::All(Placement::Query);
        assert_eq!(blanket.resolve(HttpMethod::Post, "amount"), Placement::Query);

        let allowlist = FlagPlacement::QueryAllowlist(&["mode"]);
        assert_eq!(allowlist.resolve(HttpMethod::Delete, "mode"), Placement::Query);
        assert_eq!(allowlist.resolve(HttpMethod::Delete, "otp_code"), Placement::Body);

        let by_method = FlagPlacement::ByMethod;
        assert_eq!(by_method.resolve(HttpMethod::Get, "limit"), Placement::Query);
        assert_eq!(by_method.resolve(HttpMethod::Delete, "limit"), Placement::Query);
        assert_eq!(by_method.resolve(HttpMethod::Post, "amount"), Placement::Body);
        assert_eq!(by_method.resolve(HttpMethod::Put, "amount"), Placement::Body);
        assert_eq!(by_method.resolve(HttpMethod::Patch, "amount"), Placement::Body);
    }

    #[test]
    fn test_grouping_follows_registration_order() {
        let registry = RouteRegistry::new(vec![
            route("zeta", "list", "/z"),
            route("alpha", "list", "/a"),
            route("zeta", "show", "/z/{id}"),
        ])
        .unwrap();

        let groups = registry.grouped_by_resource();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, "zeta");
        assert_eq!(groups[0].1.len(), 2);
        assert_eq!(registry.resources(), vec!["zeta", "alpha"]);
    }

    #[test]
    fn test_catalog_is_aligned() {
        let registry = RouteRegistry::new(vec![
            route("transfers", "list", "/v2/transfers"),
            route("transfers", "show", "/v2/transfers/{id}"),
        ])
        .unwrap();

        let catalog = registry.render_catalog();
        let lines: Vec<&str> = catalog.lines().skip(2).collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].starts_with("  transfers show <id>  GET"));
        assert_eq!(lines[0].find("GET"), lines[1].find("GET"));
        assert_eq!(lines[0].find("/v2"), lines[1].find("/v2"));
    }

    #[test]
    fn test_render_resource() {
        let registry = RouteRegistry::builtin();
        let text = registry.render_resource("webhook_endpoints").unwrap();
        assert!(text.starts_with("webhook_endpoints commands:"));
        assert!(text.contains("delete <id>"));
        assert!(text.contains("(requires passcode)"));
        assert!(registry.render_resource("spaceships").is_none());
    }

    #[test]
    fn test_every_sensitive_kind_has_exactly_its_route() {
        let registry = RouteRegistry::builtin();
        for kind in SensitiveKind::ALL {
            let (resource, action) = kind.route();
            let descriptor = registry
                .lookup(resource, action)
                .unwrap_or_else(|| panic!("missing route for {:?}", kind));
            assert_eq!(descriptor.sensitive, Some(kind));
        }

        let sensitive_count = registry.list().iter().filter(|r| r.sensitive.is_some()).count();
        assert_eq!(sensitive_count, SensitiveKind::ALL.len());
    }

    #[test]
    fn test_sensitive_routes_keep_passcode_out_of_query() {
        for descriptor in RouteRegistry::builtin().list() {
            if descriptor.sensitive.is_some() {
                assert_eq!(
                    descriptor.placement.resolve(descriptor.method, crate::mfa::OTP_CODE_FLAG),
                    Placement::Body,
                    "{} would leak the passcode into the query",
                    descriptor.key()
                );
            }
        }
    }
}
