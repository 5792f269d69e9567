// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Server-side rendering of pages nested in their layouts.
//!
//! [`render_tree`] folds the page render with every layout from the innermost
//! outward; [`document`] turns the result into the chunks of a full HTML
//! document that boots the client bundle.

use serde_json::{json, Map, Value as JsonValue};
use std::collections::HashMap;

use crate::error::Result;
use crate::module::{LuaModule, RenderArgs, Runtime};

/// Path of the client bootstrap module.
pub const BOOTSTRAP_PATH: &str = "/root.js";

/// Path of the development reload script.
pub const HOT_RELOAD_PATH: &str = "/hot-reload.js";

/// Document settings shared by every full render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentOptions {
    /// Application version, appended to the bootstrap URL.
    pub version: String,
    /// Development mode (adds the reload script).
    pub dev: bool,
}

impl Default for DocumentOptions {
    fn default() -> Self {
        Self {
            version: "0.0.1".to_string(),
            dev: false,
        }
    }
}

impl DocumentOptions {
    /// Module scripts the document references, in load order.
    pub fn scripts(&self) -> Vec<String> {
        let mut scripts = vec![format!(
            "{}?v={}",
            BOOTSTRAP_PATH,
            urlencoding::encode(&self.version)
        )];
        if self.dev {
            scripts.push(HOT_RELOAD_PATH.to_string());
        }
        scripts
    }

    fn script_tags(&self) -> String {
        self.scripts()
            .iter()
            .map(|src| format!(r#"<script type="module" src="{}" async></script>"#, escape_html(src)))
            .collect()
    }
}

/// Escapes text for inclusion in HTML.
pub fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// Data handed to a layout: its own payload with `_meta` keys from the page
/// taking precedence over the layout's.
pub fn merge_layout_data(layout: &JsonValue, page: &JsonValue) -> JsonValue {
    let mut merged = match layout {
        JsonValue::Object(map) => map.clone(),
        _ => Map::new(),
    };

    let mut meta = match layout.get("_meta") {
        Some(JsonValue::Object(map)) => map.clone(),
        _ => Map::new(),
    };
    if let Some(JsonValue::Object(page_meta)) = page.get("_meta") {
        for (k, v) in page_meta {
            meta.insert(k.clone(), v.clone());
        }
    }

    merged.insert("_meta".to_string(), JsonValue::Object(meta));
    JsonValue::Object(merged)
}

/// Data handed to the root layout around a not-found page.
pub fn not_found_data() -> JsonValue {
    json!({ "_meta": { "title": "Not found" } })
}

/// One level of a render tree.
#[derive(Debug, Clone)]
pub struct Layer<'a> {
    /// Module providing the render function.
    pub module: &'a LuaModule,
    /// Data for this level.
    pub data: JsonValue,
}

/// Renders `page` nested in `layouts` (outermost first).
pub fn render_tree(
    runtime: &Runtime,
    page: &Layer<'_>,
    layouts: &[Layer<'_>],
    query: &HashMap<String, String>,
    params: &HashMap<String, String>,
) -> Result<String> {
    let mut html = runtime.instantiate(page.module)?.render(RenderArgs {
        query,
        params,
        data: &page.data,
        children: None,
    })?;

    for layout in layouts.iter().rev() {
        let data = merge_layout_data(&layout.data, &page.data);
        html = runtime.instantiate(layout.module)?.render(RenderArgs {
            query,
            params,
            data: &data,
            children: Some(&html),
        })?;
    }

    Ok(html)
}

/// Splits rendered HTML into document chunks referencing the client scripts.
///
/// Scripts are injected before `</body>`; a fragment without one is wrapped
/// in a default shell titled from `title`.
pub fn document(html: String, title: Option<&str>, options: &DocumentOptions) -> Vec<String> {
    let scripts = options.script_tags();

    if let Some(pos) = html.to_ascii_lowercase().rfind("</body>") {
        let mut head = html;
        let tail = head.split_off(pos);
        if !head.trim_start().to_ascii_lowercase().starts_with("<!doctype") {
            head.insert_str(0, "<!DOCTYPE html>");
        }
        return vec![head, scripts, tail];
    }

    let title = escape_html(title.unwrap_or("isoroute"));
    vec![
        format!(
            "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n    <meta charset=\"UTF-8\">\n    \
             <meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">\n    \
             <title>{}</title>\n</head>\n<body>\n",
            title
        ),
        html,
        scripts,
        "\n</body>\n</html>\n".to_string(),
    ]
}

/// Built-in not-found page, used when the app has no `404.lua`.
pub const BUILTIN_NOT_FOUND: &str = r#"<main class="not-found"><h1>404</h1><p>This page could not be found.</p></main>"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_layout_data_page_meta_wins() {
        let layout = json!({ "nav": ["a"], "_meta": { "title": "Site", "lang": "en" } });
        let page = json!({ "_meta": { "title": "Users" }, "users": [] });

        let merged = merge_layout_data(&layout, &page);
        assert_eq!(
            merged,
            json!({ "nav": ["a"], "_meta": { "title": "Users", "lang": "en" } })
        );
    }

    #[test]
    fn test_merge_layout_data_without_payloads() {
        assert_eq!(
            merge_layout_data(&JsonValue::Null, &JsonValue::Null),
            json!({ "_meta": {} })
        );
    }

    #[test]
    fn test_scripts_include_version_and_dev_reload() {
        let options = DocumentOptions {
            version: "1.2.0".into(),
            dev: true,
        };
        assert_eq!(options.scripts(), vec!["/root.js?v=1.2.0", "/hot-reload.js"]);

        let prod = DocumentOptions {
            dev: false,
            ..options
        };
        assert_eq!(prod.scripts(), vec!["/root.js?v=1.2.0"]);
    }

    #[test]
    fn test_document_injects_before_body_end() {
        let html = "<html><body><h1>Hi</h1></BODY></html>".to_string();
        let chunks = document(html, None, &DocumentOptions::default());

        assert_eq!(chunks.len(), 3);
        assert!(chunks[0].starts_with("<!DOCTYPE html><html><body><h1>Hi</h1>"));
        assert!(chunks[1].contains("/root.js?v=0.0.1"));
        assert_eq!(chunks[2], "</BODY></html>");
    }

    #[test]
    fn test_document_wraps_fragments() {
        let chunks = document("<p>x</p>".into(), Some("A & B"), &DocumentOptions::default());
        let full = chunks.concat();
        assert!(full.contains("<title>A &amp; B</title>"));
        assert!(full.contains("<p>x</p>"));
        assert!(full.contains(r#"src="/root.js?v=0.0.1""#));
    }

    #[test]
    fn test_render_tree_folds_layouts() {
        let page = LuaModule::compile(
            "index.lua",
            r#"return { default = function(a) return "<p>" .. a.data.msg .. "</p>" end }"#,
        )
        .unwrap();
        let layout = LuaModule::compile(
            "layout.lua",
            r#"return { default = function(a)
                return "<main title='" .. a.data._meta.title .. "'>" .. a.children .. "</main>"
            end }"#,
        )
        .unwrap();
        let inner = LuaModule::compile(
            "blog/layout.lua",
            r#"return { default = function(a) return "<section>" .. a.children .. "</section>" end }"#,
        )
        .unwrap();

        let runtime = Runtime::new().unwrap();
        let html = render_tree(
            &runtime,
            &Layer {
                module: &page,
                data: json!({ "msg": "hi", "_meta": { "title": "Blog" } }),
            },
            &[
                Layer {
                    module: &layout,
                    data: json!({ "_meta": { "title": "Site" } }),
                },
                Layer {
                    module: &inner,
                    data: JsonValue::Null,
                },
            ],
            &HashMap::new(),
            &HashMap::new(),
        )
        .unwrap();

        assert_eq!(html, "<main title='Blog'><section><p>hi</p></section></main>");
    }
}
