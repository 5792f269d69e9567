// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

use futures_util::future::BoxFuture;
use futures_util::stream::{FuturesUnordered, StreamExt};
use regex::Regex;
use serde_json::Value as JsonValue;
use std::collections::HashMap;

use super::history::{History, Location};
use crate::error::{Error, Result};
use crate::protocol::{data_url, DataTarget};
use crate::render::{merge_layout_data, not_found_data};
use crate::request::parse_query;
use crate::router::{normalize_path, Manifest, ManifestLayout, ManifestRoute};

/// One level of a matched route: `Layout(i)` or the page.
pub type Level = DataTarget;

/// Default offset, in pixels, kept above a fragment target.
pub const DEFAULT_SCROLL_OFFSET: f64 = 80.0;

/// Result of matching the current path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchState {
    /// No sync has happened yet.
    Unresolved,
    /// No route matches the path.
    Unmatched,
    /// `routes[index]` matches the path.
    Matched(usize),
}

/// A data fetch the host must perform for one level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataRequest {
    /// Navigation generation the request belongs to.
    pub generation: u64,
    /// Path the request was issued for.
    pub path: String,
    /// Level receiving the data.
    pub level: Level,
    /// URL to fetch.
    pub url: String,
}

/// Fetches data URLs from the server.
pub trait DataFetcher {
    /// Fetches `url`. JSON bodies are returned as is, text as a JSON string.
    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<JsonValue>>;
}

/// What one level receives when rendered.
#[derive(Debug, Clone, Copy)]
pub struct Props<'a> {
    /// Decoded query parameters.
    pub query: &'a HashMap<String, String>,
    /// Decoded route parameters.
    pub params: &'a HashMap<String, String>,
    /// Data for the level.
    pub data: &'a JsonValue,
}

/// Turns modules into host nodes.
pub trait Renderer {
    /// Rendered node type.
    type Node;

    /// Renders a page module.
    fn page(&self, module: &str, props: Props<'_>) -> Self::Node;
    /// Renders a layout module around `children`.
    fn layout(&self, module: &str, props: Props<'_>, children: Self::Node) -> Self::Node;
    /// Renders the not-found page.
    fn not_found(&self, module: Option<&str>) -> Self::Node;
    /// Renders nothing.
    fn empty(&self) -> Self::Node;
}

/// Scroll action to perform after a render.
#[derive(Debug, Clone, PartialEq)]
pub enum ScrollEffect {
    /// Jump to the top of the page.
    Top,
    /// Smoothly scroll to the element with this id, minus `offset` pixels.
    Element {
        /// Target element id, without the `#`.
        id: String,
        /// Pixels left above the element.
        offset: f64,
    },
}

/// The host's scrollable viewport.
pub trait Viewport {
    /// Top of the element with `id` relative to the viewport, if it exists.
    fn element_top(&self, id: &str) -> Option<f64>;
    /// Current vertical scroll position.
    fn scroll_y(&self) -> f64;
    /// Scrolls to `top`.
    fn scroll_to(&mut self, top: f64, smooth: bool);
}

struct CompiledRoute {
    regex: Regex,
    route: ManifestRoute,
}

/// Client-side router.
///
/// Mirrors the server's matching over the [`Manifest`], tracks the data of
/// every level of the current route and fetches server-rendered levels
/// through the data protocol.
pub struct ClientRouter<H: History> {
    history: H,
    routes: Vec<CompiledRoute>,
    root_layout: Option<ManifestLayout>,
    not_found: Option<String>,
    location: Option<Location>,
    state: MatchState,
    generation: u64,
    query: HashMap<String, String>,
    params: HashMap<String, String>,
    levels: HashMap<Level, JsonValue>,
    data: JsonValue,
    pending: Vec<DataRequest>,
    failed: Vec<Level>,
}

impl<H: History> ClientRouter<H> {
    /// Builds a router, compiling every route pattern once.
    pub fn new(manifest: Manifest, history: H) -> Result<Self> {
        let routes = manifest
            .routes
            .into_iter()
            .map(|route| {
                let regex = Regex::new(&route.pattern).map_err(|e| Error::Pattern {
                    pattern: route.pattern.clone(),
                    message: e.to_string(),
                })?;
                Ok(CompiledRoute { regex, route })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            history,
            routes,
            root_layout: manifest.root_layout,
            not_found: manifest.not_found,
            location: None,
            state: MatchState::Unresolved,
            generation: 0,
            query: HashMap::new(),
            params: HashMap::new(),
            levels: HashMap::new(),
            data: JsonValue::Null,
            pending: Vec::new(),
            failed: Vec::new(),
        })
    }

    /// The history this router drives.
    pub fn history(&self) -> &H {
        &self.history
    }

    /// The current match state.
    pub fn state(&self) -> MatchState {
        self.state
    }

    /// The current navigation generation.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The matched route, if any.
    pub fn route(&self) -> Option<&ManifestRoute> {
        match self.state {
            MatchState::Matched(index) => self.routes.get(index).map(|r| &r.route),
            _ => None,
        }
    }

    /// Decoded route parameters.
    pub fn params(&self) -> &HashMap<String, String> {
        &self.params
    }

    /// Decoded query parameters.
    pub fn query(&self) -> &HashMap<String, String> {
        &self.query
    }

    /// Data of all levels merged outermost to innermost.
    pub fn data(&self) -> &JsonValue {
        &self.data
    }

    /// Data received for one level.
    pub fn level_data(&self, level: Level) -> Option<&JsonValue> {
        self.levels.get(&level)
    }

    /// Requests not yet handed to [`hydrate`](Self::hydrate).
    pub fn pending(&self) -> &[DataRequest] {
        &self.pending
    }

    /// Levels whose last fetch failed.
    pub fn failed(&self) -> &[Level] {
        &self.failed
    }

    /// Number of levels of the matched route whose data is available.
    pub fn resolved(&self) -> usize {
        self.route()
            .map(|route| {
                levels_of(route)
                    .filter(|(level, _)| self.levels.contains_key(level))
                    .count()
            })
            .unwrap_or(0)
    }

    /// True once every level of the matched route has its data.
    pub fn is_hydrated(&self) -> bool {
        self.route()
            .map(|route| self.resolved() == route.layouts.len() + 1)
            .unwrap_or(true)
    }

    /// Reads the history location and re-matches when the path changed.
    ///
    /// Returns the data requests for the new path; an unchanged path yields
    /// no requests.
    pub fn sync(&mut self) -> Vec<DataRequest> {
        let location = self.history.location();
        let changed = self
            .location
            .as_ref()
            .map_or(true, |current| current.path != location.path);
        self.query = location.query.as_deref().map(parse_query).unwrap_or_default();
        self.location = Some(location);

        if !changed && self.state != MatchState::Unresolved {
            return Vec::new();
        }
        self.reset();
        self.resolve();
        self.pending.clone()
    }

    /// Pushes `url` and syncs.
    pub fn push(&mut self, url: &str) -> Vec<DataRequest> {
        self.history.push(url);
        self.sync()
    }

    /// Replaces the current entry with `url` and syncs.
    pub fn replace(&mut self, url: &str) -> Vec<DataRequest> {
        self.history.replace(url);
        self.sync()
    }

    /// Goes one entry back and syncs.
    pub fn back(&mut self) -> Vec<DataRequest> {
        self.history.back();
        self.sync()
    }

    /// Reloads the current entry, discarding all data.
    pub fn reload(&mut self) -> Vec<DataRequest> {
        self.history.reload();
        self.location = None;
        self.sync()
    }

    fn reset(&mut self) {
        self.generation += 1;
        self.state = MatchState::Unmatched;
        self.params.clear();
        self.levels.clear();
        self.data = JsonValue::Null;
        self.pending.clear();
        self.failed.clear();
    }

    fn resolve(&mut self) {
        let Some(location) = &self.location else {
            return;
        };

        let path = normalize_path(&location.path);
        let Some((index, compiled)) = self
            .routes
            .iter()
            .enumerate()
            .find(|(_, r)| r.regex.is_match(path))
        else {
            tracing::debug!("No client route for {}", location.path);
            return;
        };

        self.state = MatchState::Matched(index);
        if let Some(captures) = compiled.regex.captures(path) {
            self.params = compiled
                .regex
                .capture_names()
                .flatten()
                .filter_map(|name| {
                    let value = captures.name(name)?.as_str();
                    let decoded = urlencoding::decode(value)
                        .map(|d| d.into_owned())
                        .unwrap_or_else(|_| value.to_string());
                    Some((name.to_string(), decoded))
                })
                .collect();
        }

        let mut pending = Vec::new();
        for (level, (ssr, data)) in levels_of(&compiled.route) {
            if ssr {
                pending.push(DataRequest {
                    generation: self.generation,
                    path: location.path.clone(),
                    level,
                    url: data_url(&location.path, location.query.as_deref(), level),
                });
            } else {
                self.levels
                    .insert(level, data.cloned().unwrap_or(JsonValue::Null));
            }
        }
        self.pending = pending;
        self.merge();
    }

    /// Stores data fetched for `request`.
    ///
    /// Returns false, leaving the state untouched, when the request belongs
    /// to an earlier navigation.
    pub fn receive(&mut self, request: &DataRequest, data: JsonValue) -> bool {
        let current = self.location.as_ref().map(|l| l.path.as_str());
        if request.generation != self.generation || current != Some(request.path.as_str()) {
            tracing::debug!(
                "Dropping stale data for {} (generation {}, current {})",
                request.path,
                request.generation,
                self.generation
            );
            return false;
        }

        self.pending.retain(|p| p.level != request.level);
        self.failed.retain(|l| *l != request.level);
        self.levels.insert(request.level, data);
        self.merge();
        true
    }

    /// Fetches every pending level concurrently.
    ///
    /// Returns the failures; failed levels are also recorded in
    /// [`failed`](Self::failed).
    pub async fn hydrate<F>(&mut self, fetcher: &F) -> Vec<(Level, Error)>
    where
        F: DataFetcher + ?Sized,
    {
        let requests = std::mem::take(&mut self.pending);
        let mut in_flight: FuturesUnordered<_> = requests
            .into_iter()
            .map(|request| async move {
                let result = fetcher.fetch(&request.url).await;
                (request, result)
            })
            .collect();

        let mut failures = Vec::new();
        while let Some((request, result)) = in_flight.next().await {
            match result {
                Ok(data) => {
                    self.receive(&request, data);
                }
                Err(err) => {
                    tracing::warn!("Failed to fetch {}: {}", request.url, err);
                    if request.generation == self.generation {
                        self.failed.push(request.level);
                    }
                    failures.push((
                        request.level,
                        Error::Fetch {
                            url: request.url,
                            message: err.to_string(),
                        },
                    ));
                }
            }
        }
        failures
    }

    fn merge(&mut self) {
        let Some(route) = self.route() else {
            self.data = JsonValue::Null;
            return;
        };

        let mut merged = JsonValue::Null;
        for (level, _) in levels_of(route) {
            match (self.levels.get(&level), &mut merged) {
                (Some(JsonValue::Object(data)), JsonValue::Object(acc)) => {
                    acc.extend(data.iter().map(|(k, v)| (k.clone(), v.clone())));
                }
                (Some(data @ JsonValue::Object(_)), acc) => *acc = data.clone(),
                (Some(JsonValue::Null) | None, _) => {}
                (Some(other), acc) => *acc = other.clone(),
            }
        }
        self.data = merged;
    }

    /// Renders the current state.
    pub fn render<R: Renderer>(&self, renderer: &R) -> R::Node {
        match self.state {
            MatchState::Unresolved => renderer.empty(),
            MatchState::Unmatched => {
                let page = renderer.not_found(self.not_found.as_deref());
                match &self.root_layout {
                    Some(layout) => {
                        let data = merge_layout_data(
                            layout.data.as_ref().unwrap_or(&JsonValue::Null),
                            &not_found_data(),
                        );
                        renderer.layout(&layout.module, self.props(&data), page)
                    }
                    None => page,
                }
            }
            MatchState::Matched(index) => {
                let route = &self.routes[index].route;
                let page_data = self.levels.get(&Level::Page).unwrap_or(&JsonValue::Null);

                let mut node = renderer.page(&route.module, self.props(page_data));
                for (i, layout) in route.layouts.iter().enumerate().rev() {
                    let own = self.levels.get(&Level::Layout(i)).unwrap_or(&JsonValue::Null);
                    let data = merge_layout_data(own, page_data);
                    node = renderer.layout(&layout.module, self.props(&data), node);
                }
                node
            }
        }
    }

    fn props<'a>(&'a self, data: &'a JsonValue) -> Props<'a> {
        Props {
            query: &self.query,
            params: &self.params,
            data,
        }
    }

    /// The scroll action for the current fragment.
    ///
    /// `#id` scrolls to the element, `#id:offset` keeps `offset` pixels above
    /// it; no fragment scrolls to the top.
    pub fn scroll_effect(&self) -> ScrollEffect {
        let Some(hash) = self.location.as_ref().and_then(|l| l.hash.as_deref()) else {
            return ScrollEffect::Top;
        };

        let (id, offset) = match hash.split_once(':') {
            Some((id, offset)) => (id, offset.parse().unwrap_or(DEFAULT_SCROLL_OFFSET)),
            None => (hash, DEFAULT_SCROLL_OFFSET),
        };
        ScrollEffect::Element {
            id: id.to_string(),
            offset,
        }
    }

    /// Applies [`scroll_effect`](Self::scroll_effect) to `viewport`.
    ///
    /// A fragment naming a missing element leaves the scroll position alone.
    pub fn apply_scroll<V: Viewport + ?Sized>(&self, viewport: &mut V) {
        match self.scroll_effect() {
            ScrollEffect::Top => viewport.scroll_to(0.0, false),
            ScrollEffect::Element { id, offset } => {
                if let Some(top) = viewport.element_top(&id) {
                    let target = top + viewport.scroll_y() - offset;
                    viewport.scroll_to(target, true);
                }
            }
        }
    }
}

/// Levels of a route, outermost first, with their `ssr` flag and static data.
fn levels_of(route: &ManifestRoute) -> impl Iterator<Item = (Level, (bool, Option<&JsonValue>))> {
    route
        .layouts
        .iter()
        .enumerate()
        .map(|(i, l)| (Level::Layout(i), (l.ssr, l.data.as_ref())))
        .chain(std::iter::once((
            Level::Page,
            (route.ssr, route.data.as_ref()),
        )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::history::MemoryHistory;
    use crate::resolver::MemoryResolver;
    use crate::router::{Matched, RouteTable};
    use futures_util::FutureExt;
    use serde_json::json;
    use std::sync::Mutex;

    fn manifest() -> Manifest {
        let resolver = MemoryResolver::new()
            .with(
                "layout.lua",
                r#"return { ["$"] = { site = "docs", _meta = { title = "Site" } }, default = function(a) return a.children end }"#,
            )
            .with(
                "users/layout.lua",
                r#"return { ["$"] = function() return { section = "users" } end, default = function(a) return a.children end }"#,
            )
            .with(
                "users/[id].lua",
                r#"return { ["$"] = function(req) return { id = req.params.id } end, default = function(a) return "" end }"#,
            )
            .with(
                "about.lua",
                r#"return { ["$"] = { title = "About" }, default = function(a) return "" end }"#,
            );
        RouteTable::compile(&resolver).unwrap().manifest()
    }

    fn router(url: &str) -> ClientRouter<MemoryHistory> {
        ClientRouter::new(manifest(), MemoryHistory::new(url)).unwrap()
    }

    /// Renders nodes as strings.
    struct TextRenderer;

    impl Renderer for TextRenderer {
        type Node = String;

        fn page(&self, module: &str, props: Props<'_>) -> String {
            format!("{}{}", module, props.data)
        }

        fn layout(&self, module: &str, props: Props<'_>, children: String) -> String {
            format!("[{} {} {}]", module, props.data["_meta"]["title"], children)
        }

        fn not_found(&self, _module: Option<&str>) -> String {
            "404".to_string()
        }

        fn empty(&self) -> String {
            String::new()
        }
    }

    /// Serves canned data and records fetched URLs.
    struct FakeFetcher {
        urls: Mutex<Vec<String>>,
    }

    impl DataFetcher for FakeFetcher {
        fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<JsonValue>> {
            async move {
                self.urls.lock().unwrap().push(url.to_string());
                if url.contains("_$=-1") {
                    Ok(json!({ "id": "from-server", "_meta": { "title": "User" } }))
                } else if url.contains("_$=1") {
                    Err(Error::handler("offline"))
                } else {
                    Ok(json!({}))
                }
            }
            .boxed()
        }
    }

    struct FakeViewport {
        scroll: f64,
        smooth: bool,
    }

    impl Viewport for FakeViewport {
        fn element_top(&self, id: &str) -> Option<f64> {
            (id == "intro").then_some(500.0)
        }

        fn scroll_y(&self) -> f64 {
            100.0
        }

        fn scroll_to(&mut self, top: f64, smooth: bool) {
            self.scroll = top;
            self.smooth = smooth;
        }
    }

    #[test]
    fn test_unresolved_renders_nothing() {
        let router = router("/");
        assert_eq!(router.state(), MatchState::Unresolved);
        assert_eq!(router.render(&TextRenderer), "");
    }

    #[test]
    fn test_sync_requests_server_levels() {
        let mut router = router("/users/a%20b?tab=1");
        let requests = router.sync();

        assert_eq!(router.params()["id"], "a b");
        assert_eq!(router.query()["tab"], "1");
        assert_eq!(
            requests.iter().map(|r| r.url.as_str()).collect::<Vec<_>>(),
            vec!["/users/a%20b?tab=1&_$=1", "/users/a%20b?tab=1&_$=-1"]
        );
        assert_eq!(requests[0].level, Level::Layout(1));
        assert_eq!(requests[1].level, Level::Page);

        // The static root layout is seeded immediately.
        assert_eq!(router.level_data(Level::Layout(0)).unwrap()["site"], "docs");
        assert!(!router.is_hydrated());

        // Same path again: nothing to refetch.
        assert!(router.replace("/users/a%20b?tab=2#top").is_empty());
        assert_eq!(router.generation(), 1);
        assert_eq!(router.query()["tab"], "2");
    }

    #[test]
    fn test_static_route_needs_no_fetch() {
        let mut router = router("/about");
        assert!(router.sync().is_empty());
        assert!(router.is_hydrated());
        assert_eq!(router.data()["title"], "About");
        assert_eq!(router.data()["site"], "docs");
    }

    #[test]
    fn test_stale_fetch_rejected() {
        let mut router = router("/users/1");
        let old = router.sync();

        router.push("/users/2");
        assert_eq!(router.generation(), 2);
        assert!(!router.receive(&old[1], json!({ "id": "1" })));
        assert_eq!(router.level_data(Level::Page), None);

        let fresh = router.pending().to_vec();
        assert!(router.receive(&fresh[1], json!({ "id": "2" })));
        assert_eq!(router.data()["id"], "2");
    }

    #[test]
    fn test_late_parent_does_not_override_page() {
        let mut router = router("/users/1");
        let requests = router.sync();

        router.receive(&requests[1], json!({ "section": "page" }));
        router.receive(&requests[0], json!({ "section": "users", "extra": true }));

        assert_eq!(router.data()["section"], "page");
        assert_eq!(router.data()["extra"], true);
        assert!(router.is_hydrated());
    }

    #[tokio::test]
    async fn test_hydrate_records_failures() {
        let mut router = router("/users/7");
        router.sync();
        let fetcher = FakeFetcher {
            urls: Mutex::new(Vec::new()),
        };

        let failures = router.hydrate(&fetcher).await;
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, Level::Layout(1));
        assert!(matches!(failures[0].1, Error::Fetch { .. }));
        assert_eq!(router.failed(), &[Level::Layout(1)]);
        assert_eq!(fetcher.urls.lock().unwrap().len(), 2);
        assert_eq!(router.data()["id"], "from-server");
        assert!(router.pending().is_empty());
    }

    #[test]
    fn test_render_nests_layouts() {
        let mut router = router("/users/1");
        let requests = router.sync();
        router.receive(&requests[1], json!({ "_meta": { "title": "User" } }));

        let node = router.render(&TextRenderer);
        assert_eq!(
            node,
            r#"[layout.lua "User" [users/layout.lua "User" users/[id].lua{"_meta":{"title":"User"}}]]"#
        );
    }

    #[test]
    fn test_unmatched_renders_not_found_in_root_layout() {
        let mut router = router("/nowhere");
        assert!(router.sync().is_empty());
        assert_eq!(router.state(), MatchState::Unmatched);
        assert_eq!(router.render(&TextRenderer), r#"[layout.lua "Not found" 404]"#);
    }

    #[test]
    fn test_navigation_resets_state() {
        let mut router = router("/about");
        router.sync();
        router.push("/users/3");
        assert_eq!(router.params()["id"], "3");

        router.back();
        assert_eq!(router.route().unwrap().template, "/about");
        assert!(router.params().is_empty());
        assert_eq!(router.generation(), 3);

        router.reload();
        assert_eq!(router.generation(), 4);
        assert_eq!(router.history().reloads(), 1);
    }

    #[test]
    fn test_client_and_server_pick_the_same_route() {
        const PAGE: &str = r#"return { default = function() return "" end }"#;
        let resolver = [
            "users/new.lua",
            "users/[id]/index.lua",
            "[a]/x.lua",
            "b/[c].lua",
            "docs/[[...path]].lua",
            "blog/latest.lua",
            "blog/[...slug].lua",
            "index.lua",
        ]
        .iter()
        .fold(MemoryResolver::new(), |r, id| r.with(id, PAGE));
        let table = RouteTable::compile(&resolver).unwrap();

        let cases = [
            "/",
            "/users/42/",
            "/users/new",
            "/users/new/",
            "/b/x",
            "/b/y",
            "/c/x",
            "/docs",
            "/docs/",
            "/docs/guide/intro",
            "/blog/latest",
            "/blog/2024/05/post",
            "/nowhere/deep",
        ];
        for path in cases {
            let server = table.find(path).map(|m| {
                let Matched::Page(entry) = m.target else {
                    panic!("expected a page for {}", path);
                };
                (entry.template.clone(), m.params)
            });

            let mut router = ClientRouter::new(table.manifest(), MemoryHistory::new(path)).unwrap();
            router.sync();
            let client = router
                .route()
                .map(|route| (route.template.clone(), router.params().clone()));

            assert_eq!(client, server, "{}", path);
        }

        let b_x = table.find("/b/x").unwrap();
        assert!(matches!(b_x.target, Matched::Page(e) if e.template == "/b/[c]"));
    }

    #[test]
    fn test_scroll_effects() {
        let mut router = router("/about#intro:20");
        router.sync();
        assert_eq!(
            router.scroll_effect(),
            ScrollEffect::Element {
                id: "intro".into(),
                offset: 20.0
            }
        );

        let mut viewport = FakeViewport {
            scroll: -1.0,
            smooth: false,
        };
        router.apply_scroll(&mut viewport);
        assert_eq!(viewport.scroll, 580.0);
        assert!(viewport.smooth);

        router.push("/about#intro");
        router.apply_scroll(&mut viewport);
        assert_eq!(viewport.scroll, 520.0);

        router.push("/about#missing");
        router.apply_scroll(&mut viewport);
        assert_eq!(viewport.scroll, 520.0);

        router.push("/about");
        assert_eq!(router.scroll_effect(), ScrollEffect::Top);
        router.apply_scroll(&mut viewport);
        assert_eq!(viewport.scroll, 0.0);
        assert!(!viewport.smooth);
    }
}
