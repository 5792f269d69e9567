// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! File-based route and layout compiler.
//!
//! Turns an application directory into an immutable [`RouteTable`]:
//! - `index.lua`, `about.lua`, `users/[id]/index.lua` → Page or API routes
//! - `layout.lua` → Layout for its directory and everything below it
//! - `404.lua` (root only) → Not-found page
//! - `[param]` → Dynamic segment
//! - `[...rest]` → Catch-all segment
//! - `[[...rest]]` → Optional catch-all segment
//!
//! Paths with a component starting with `_` are private and never routed.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::module::LuaModule;
use crate::resolver::ModuleResolver;

/// File name of layout modules.
pub const LAYOUT_FILE: &str = "layout.lua";

/// File name of the not-found module (application root only).
pub const NOT_FOUND_FILE: &str = "404.lua";

/// Segment type in a route template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SegmentType {
    /// Static segment (e.g., "blog")
    Static(String),

    /// Dynamic parameter (e.g., "[slug]" -> "{slug}")
    Dynamic(String),

    /// Catch-all parameter (e.g., "[...rest]" -> "{*rest}")
    CatchAll(String),

    /// Optional catch-all (e.g., "[[...rest]]"), also matches the parent path
    OptionalCatchAll(String),
}

impl SegmentType {
    /// Parses a template segment.
    pub fn parse(segment: &str) -> Result<Self> {
        let parsed = if let Some(name) = segment
            .strip_prefix("[[...")
            .and_then(|s| s.strip_suffix("]]"))
        {
            SegmentType::OptionalCatchAll(name.to_string())
        } else if let Some(name) = segment
            .strip_prefix("[...")
            .and_then(|s| s.strip_suffix(']'))
        {
            SegmentType::CatchAll(name.to_string())
        } else if let Some(name) = segment.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
            SegmentType::Dynamic(name.to_string())
        } else {
            return Ok(SegmentType::Static(segment.to_string()));
        };

        match parsed.param_name() {
            Some(name) if is_param_name(name) => Ok(parsed),
            _ => Err(Error::Pattern {
                pattern: segment.to_string(),
                message: "parameter names must match [A-Za-z_][A-Za-z0-9_]*".to_string(),
            }),
        }
    }

    /// Returns the parameter name of a dynamic segment.
    pub fn param_name(&self) -> Option<&str> {
        match self {
            SegmentType::Static(_) => None,
            SegmentType::Dynamic(name)
            | SegmentType::CatchAll(name)
            | SegmentType::OptionalCatchAll(name) => Some(name),
        }
    }

    /// Returns true for every non-static segment.
    pub fn is_dynamic(&self) -> bool {
        !matches!(self, SegmentType::Static(_))
    }

    /// Converts to a matchit pattern segment.
    /// matchit uses {param} for dynamic segments and {*param} for catch-all.
    pub fn to_matcher(&self) -> String {
        match self {
            SegmentType::Static(s) => s.clone(),
            SegmentType::Dynamic(name) => format!("{{{}}}", name),
            SegmentType::CatchAll(name) | SegmentType::OptionalCatchAll(name) => {
                format!("{{*{}}}", name)
            }
        }
    }

    /// Converts to a regex fragment, including its leading (escaped) slash.
    pub fn to_regex(&self) -> String {
        match self {
            SegmentType::Static(s) => format!(r"\/{}", regex::escape(s)),
            SegmentType::Dynamic(name) => format!(r"\/(?P<{}>[^/]+)", name),
            SegmentType::CatchAll(name) => format!(r"\/(?P<{}>.+)", name),
            SegmentType::OptionalCatchAll(name) => format!(r"(?:\/(?P<{}>.+))?", name),
        }
    }
}

fn is_param_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Converts a module id to its route template.
///
/// `users/[id]/index.lua` → `/users/[id]`, `index.lua` → `/`,
/// `about.lua` → `/about`.
pub fn template_for(id: &str) -> String {
    let stem = id.strip_suffix(".lua").unwrap_or(id);
    let mut segments: Vec<&str> = stem.split('/').filter(|s| !s.is_empty()).collect();
    if segments.last() == Some(&"index") {
        segments.pop();
    }
    format!("/{}", segments.join("/"))
}

fn parse_template(template: &str) -> Result<Vec<SegmentType>> {
    template
        .split('/')
        .filter(|s| !s.is_empty())
        .map(SegmentType::parse)
        .collect()
}

/// Builds the anchored regex pattern for a route template.
pub fn regex_pattern(template: &str) -> Result<String> {
    let segments = parse_template(template)?;
    let body: String = segments.iter().map(SegmentType::to_regex).collect();

    let pattern = match segments.last() {
        None => r"^\/$".to_string(),
        Some(SegmentType::OptionalCatchAll(_)) => format!(r"^{}\/?$", body),
        Some(_) => format!("^{}$", body),
    };

    Regex::new(&pattern).map_err(|e| Error::Pattern {
        pattern: template.to_string(),
        message: e.to_string(),
    })?;
    Ok(pattern)
}

/// Converts a route pattern to matchit syntax.
///
/// Accepts bracket-style templates (`/users/[id]`), colon-style parameters
/// (`/users/:id`), `*rest` catch-alls and native matchit syntax.
pub fn matcher_path(pattern: &str) -> Result<String> {
    let mut segments = Vec::new();
    for segment in pattern.split('/').filter(|s| !s.is_empty()) {
        let converted = if let Some(name) = segment.strip_prefix(':') {
            SegmentType::Dynamic(name.to_string())
        } else if let Some(name) = segment.strip_prefix('*') {
            SegmentType::CatchAll(name.to_string())
        } else {
            SegmentType::parse(segment)?
        };

        if let Some(name) = converted.param_name() {
            if !is_param_name(name) {
                return Err(Error::Pattern {
                    pattern: pattern.to_string(),
                    message: format!("invalid parameter name '{}'", name),
                });
            }
        }
        segments.push(converted.to_matcher());
    }
    Ok(format!("/{}", segments.join("/")))
}

/// Returns the matchit paths registered for a template.
///
/// An optional catch-all registers its parent path as well.
fn matcher_paths(template: &str) -> Result<Vec<String>> {
    let segments = parse_template(template)?;
    let join = |segments: &[SegmentType]| {
        let parts: Vec<String> = segments.iter().map(SegmentType::to_matcher).collect();
        format!("/{}", parts.join("/"))
    };

    let mut paths = vec![join(&segments)];
    if let Some((SegmentType::OptionalCatchAll(_), parent)) = segments.split_last() {
        paths.insert(0, join(parent));
    }
    Ok(paths)
}

/// A compiled layout module.
///
/// Identity is the module id: every route below the layout's directory shares
/// the same `Arc<LayoutRef>`.
#[derive(Debug)]
pub struct LayoutRef {
    /// The layout module.
    pub module: LuaModule,
}

impl LayoutRef {
    /// Module id (e.g. "users/layout.lua").
    pub fn id(&self) -> &str {
        self.module.id()
    }

    /// True when the layout has a loader function.
    pub fn ssr(&self) -> bool {
        self.module.is_ssr()
    }

    /// Static payload, if any.
    pub fn data(&self) -> Option<&JsonValue> {
        self.module.static_data()
    }
}

/// A compiled leaf page.
#[derive(Debug, Clone)]
pub struct RouteEntry {
    /// Route template (e.g. "/users/[id]").
    pub template: String,
    /// Anchored regex with named capture groups.
    pub pattern: String,
    /// matchit syntax (e.g. "/users/{id}").
    pub matcher_path: String,
    /// The page module.
    pub module: LuaModule,
    /// Layouts, outermost first.
    pub layouts: Vec<Arc<LayoutRef>>,
}

impl RouteEntry {
    /// True when the page has a loader function.
    pub fn ssr(&self) -> bool {
        self.module.is_ssr()
    }

    /// Static payload, if any.
    pub fn data(&self) -> Option<&JsonValue> {
        self.module.static_data()
    }
}

/// A module that only exports method handlers.
#[derive(Debug, Clone)]
pub struct ApiRoute {
    /// Route template.
    pub template: String,
    /// matchit syntax.
    pub matcher_path: String,
    /// The module.
    pub module: LuaModule,
}

#[derive(Debug, Clone, Copy)]
enum Target {
    Page(usize),
    Api(usize),
}

/// What a path resolved to.
#[derive(Debug, Clone, Copy)]
pub enum Matched<'a> {
    /// A leaf page.
    Page(&'a Arc<RouteEntry>),
    /// An API module.
    Api(&'a Arc<ApiRoute>),
}

/// A successful lookup.
#[derive(Debug, Clone)]
pub struct RouteMatch<'a> {
    /// The matched route.
    pub target: Matched<'a>,
    /// Percent-decoded parameters.
    pub params: HashMap<String, String>,
}

/// The immutable result of compiling an application directory.
pub struct RouteTable {
    entries: Vec<Arc<RouteEntry>>,
    apis: Vec<Arc<ApiRoute>>,
    root_layout: Option<Arc<LayoutRef>>,
    not_found: Option<LuaModule>,
    matcher: matchit::Router<Target>,
}

impl std::fmt::Debug for RouteTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteTable")
            .field("entries", &self.entries)
            .field("apis", &self.apis)
            .field("root_layout", &self.root_layout)
            .field("not_found", &self.not_found)
            .finish_non_exhaustive()
    }
}

fn is_ignored(id: &str) -> bool {
    id.split('/').any(|component| component.starts_with('_'))
}

fn dir_of(id: &str) -> &str {
    id.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
}

fn file_of(id: &str) -> &str {
    id.rsplit_once('/').map(|(_, file)| file).unwrap_or(id)
}

/// Collects layouts from the root down to `dir`, outermost first.
fn collect_layouts(dir: &str, layouts_by_dir: &HashMap<String, Arc<LayoutRef>>) -> Vec<Arc<LayoutRef>> {
    let mut layouts = Vec::new();
    let mut current = String::new();

    if let Some(root) = layouts_by_dir.get("") {
        layouts.push(root.clone());
    }

    for component in dir.split('/').filter(|s| !s.is_empty()) {
        if !current.is_empty() {
            current.push('/');
        }
        current.push_str(component);

        if let Some(layout) = layouts_by_dir.get(&current) {
            layouts.push(layout.clone());
        }
    }

    layouts
}

/// Match priority of a template, compared segment by segment: static
/// segments before dynamic ones before catch-alls.
///
/// The first regex hit in this order is the route matchit picks.
fn priority(template: &str) -> (Vec<u8>, String) {
    let ranks = template
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|segment| match SegmentType::parse(segment) {
            Ok(SegmentType::Static(_)) => 0,
            Ok(SegmentType::Dynamic(_)) => 1,
            _ => 2,
        })
        .collect();
    (ranks, template.to_string())
}

/// Strips trailing slashes; the root stays `/`.
pub fn normalize_path(path: &str) -> &str {
    match path.trim_end_matches('/') {
        "" => "/",
        trimmed => trimmed,
    }
}

impl RouteTable {
    /// Compiles every module the resolver lists.
    pub fn compile(resolver: &dyn ModuleResolver) -> Result<Self> {
        let mut layouts_by_dir: HashMap<String, Arc<LayoutRef>> = HashMap::new();
        let mut not_found = None;
        let mut candidates = Vec::new();

        // First pass: compile modules and sort out layouts
        for id in resolver.list()? {
            if is_ignored(&id) || !id.ends_with(".lua") {
                continue;
            }

            let module = LuaModule::compile(&id, &resolver.load(&id)?)?;
            match file_of(&id) {
                LAYOUT_FILE if module.has_render() => {
                    layouts_by_dir.insert(dir_of(&id).to_string(), Arc::new(LayoutRef { module }));
                }
                LAYOUT_FILE => {
                    tracing::warn!("Skipping layout {}: no default render function", id);
                }
                NOT_FOUND_FILE if dir_of(&id).is_empty() => {
                    if module.has_render() {
                        not_found = Some(module);
                    } else {
                        tracing::warn!("Skipping {}: no default render function", id);
                    }
                }
                _ => candidates.push(module),
            }
        }

        // Second pass: routes with their layout chains
        let mut templates = HashSet::new();
        let mut entries = Vec::new();
        let mut apis = Vec::new();

        for module in candidates {
            let template = template_for(module.id());
            let paths = matcher_paths(&template)?;
            let matcher_path = paths.last().cloned().unwrap_or_else(|| "/".to_string());

            if !module.has_render() && module.exports().methods.is_empty() {
                tracing::warn!(
                    "Skipping {}: exports neither a render function nor method handlers",
                    module.id()
                );
                continue;
            }

            if !templates.insert(template.clone()) {
                return Err(Error::Compile(format!(
                    "Duplicate route {} (defined again by {})",
                    template,
                    module.id()
                )));
            }

            if module.has_render() {
                entries.push(Arc::new(RouteEntry {
                    pattern: regex_pattern(&template)?,
                    layouts: collect_layouts(dir_of(module.id()), &layouts_by_dir),
                    template,
                    matcher_path,
                    module,
                }));
            } else {
                apis.push(Arc::new(ApiRoute {
                    template,
                    matcher_path,
                    module,
                }));
            }
        }

        entries.sort_by_cached_key(|e| priority(&e.template));
        apis.sort_by_cached_key(|a| priority(&a.template));

        let mut matcher = matchit::Router::new();
        let targets = entries
            .iter()
            .enumerate()
            .map(|(i, e)| (&e.template, Target::Page(i)))
            .chain(
                apis.iter()
                    .enumerate()
                    .map(|(i, a)| (&a.template, Target::Api(i))),
            );
        for (template, target) in targets {
            for path in matcher_paths(template)? {
                matcher.insert(path.as_str(), target).map_err(|e| {
                    Error::Compile(format!("Route {} conflicts: {}", template, e))
                })?;
            }
        }

        tracing::debug!(
            "Compiled {} page route(s), {} API route(s), {} layout(s)",
            entries.len(),
            apis.len(),
            layouts_by_dir.len()
        );

        Ok(Self {
            entries,
            apis,
            root_layout: layouts_by_dir.get("").cloned(),
            not_found,
            matcher,
        })
    }

    /// Page routes in match priority order.
    pub fn routes(&self) -> &[Arc<RouteEntry>] {
        &self.entries
    }

    /// API routes.
    pub fn apis(&self) -> &[Arc<ApiRoute>] {
        &self.apis
    }

    /// The layout at the application root, if any.
    pub fn root_layout(&self) -> Option<&Arc<LayoutRef>> {
        self.root_layout.as_ref()
    }

    /// The `404.lua` module, if any.
    pub fn not_found(&self) -> Option<&LuaModule> {
        self.not_found.as_ref()
    }

    /// Matches a request path.
    pub fn find(&self, path: &str) -> Option<RouteMatch<'_>> {
        let matched = self.matcher.at(normalize_path(path)).ok()?;
        let params = matched
            .params
            .iter()
            .map(|(k, v)| {
                let value = urlencoding::decode(v)
                    .map(|d| d.into_owned())
                    .unwrap_or_else(|_| v.to_string());
                (k.to_string(), value)
            })
            .collect();

        let target = match *matched.value {
            Target::Page(i) => Matched::Page(&self.entries[i]),
            Target::Api(i) => Matched::Api(&self.apis[i]),
        };
        Some(RouteMatch { target, params })
    }

    /// Serializes the page routes for the client router.
    pub fn manifest(&self) -> Manifest {
        let layout = |l: &Arc<LayoutRef>| ManifestLayout {
            module: l.id().to_string(),
            ssr: l.ssr(),
            data: l.data().cloned(),
        };

        Manifest {
            routes: self
                .entries
                .iter()
                .map(|e| ManifestRoute {
                    template: e.template.clone(),
                    pattern: e.pattern.clone(),
                    module: e.module.id().to_string(),
                    ssr: e.ssr(),
                    data: e.data().cloned(),
                    layouts: e.layouts.iter().map(layout).collect(),
                })
                .collect(),
            root_layout: self.root_layout.as_ref().map(layout),
            not_found: self.not_found.as_ref().map(|m| m.id().to_string()),
        }
    }
}

/// The serialized route table consumed by the client router.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// Page routes in match priority order.
    pub routes: Vec<ManifestRoute>,
    /// Layout at the application root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_layout: Option<ManifestLayout>,
    /// Id of the not-found module.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not_found: Option<String>,
}

/// A page route as seen by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestRoute {
    /// Route template.
    pub template: String,
    /// Anchored regex with named capture groups.
    pub pattern: String,
    /// Page module id.
    pub module: String,
    /// Page data comes from the server.
    pub ssr: bool,
    /// Static page payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<JsonValue>,
    /// Layouts, outermost first.
    #[serde(default)]
    pub layouts: Vec<ManifestLayout>,
}

/// A layout as seen by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestLayout {
    /// Layout module id.
    pub module: String,
    /// Layout data comes from the server.
    pub ssr: bool,
    /// Static layout payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<JsonValue>,
}
