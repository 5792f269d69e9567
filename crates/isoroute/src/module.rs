// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Lua page, layout and API modules.
//!
//! A module is a Lua chunk that evaluates to a table:
//!
//! ```lua
//! return {
//!   -- loader: a function (server-rendered) or any other value (static payload)
//!   ["$"] = function(req) return { user = req.params.id } end,
//!
//!   -- render function: receives { query, params, data, children }
//!   default = function(args)
//!     return "<h1>" .. escape(args.data.user) .. "</h1>"
//!   end,
//!
//!   -- method handlers
//!   POST = function(req) return response(201, { ok = true }) end,
//! }
//! ```
//!
//! [`LuaModule::compile`] evaluates the chunk once to record its exports.
//! Every request then evaluates the modules it needs in a fresh [`Runtime`],
//! so no Lua state is shared between requests.
//!
//! Helpers available to modules: `response(status, body, headers)`,
//! `redirect(location, status)` and `escape(text)`.

use http::{HeaderName, HeaderValue, Method, StatusCode};
use mlua::{Function, Lua, Result as LuaResult, Table, Value};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::render::escape_html;
use crate::request::Request;
use crate::response::{Body, Response};

/// Export key of the loader.
pub const LOADER_KEY: &str = "$";

/// Export key of the render function.
pub const RENDER_KEY: &str = "default";

/// Method handler exports, in lookup order.
pub const METHOD_KEYS: [&str; 5] = ["GET", "POST", "PUT", "PATCH", "DELETE"];

/// Marker set on tables built by `response()` and `redirect()`.
const RESPONSE_MARKER: &str = "__response";

/// The loader export of a module.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Loader {
    /// No `$` export.
    #[default]
    None,
    /// `$` is a function, evaluated per request.
    Function,
    /// `$` is a plain value, serialized once at compile time.
    Static(JsonValue),
}

/// Exports recorded when a module is compiled.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Exports {
    /// Module exports a `default` render function.
    pub render: bool,
    /// The `$` export.
    pub loader: Loader,
    /// Methods with an upper-case handler export.
    pub methods: Vec<Method>,
}

/// A compiled module: its id, source and recorded exports.
#[derive(Debug, Clone)]
pub struct LuaModule {
    id: String,
    source: Arc<str>,
    exports: Exports,
}

impl LuaModule {
    /// Evaluates `source` once and records its exports.
    pub fn compile(id: &str, source: &str) -> Result<Self> {
        let runtime = Runtime::new()?;
        let table = runtime.evaluate(id, source)?;
        let exports = inspect(&table).map_err(|e| Error::lua(id, e))?;

        tracing::debug!(
            "Compiled module {} (render: {}, methods: {:?})",
            id,
            exports.render,
            exports.methods
        );

        Ok(Self {
            id: id.to_string(),
            source: Arc::from(source),
            exports,
        })
    }

    /// Module id (path relative to the app directory).
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Recorded exports.
    pub fn exports(&self) -> &Exports {
        &self.exports
    }

    /// True when the module has a render function.
    pub fn has_render(&self) -> bool {
        self.exports.render
    }

    /// True when the loader is a function.
    pub fn is_ssr(&self) -> bool {
        self.exports.loader == Loader::Function
    }

    /// The static payload, when `$` is a plain value.
    pub fn static_data(&self) -> Option<&JsonValue> {
        match &self.exports.loader {
            Loader::Static(data) => Some(data),
            _ => None,
        }
    }

    /// True when the module exports a handler for `method`.
    pub fn handles(&self, method: &Method) -> bool {
        self.exports.methods.contains(method)
    }
}

fn inspect(table: &Table) -> LuaResult<Exports> {
    let render = matches!(table.get::<Value>(RENDER_KEY)?, Value::Function(_));

    let loader = match table.get::<Value>(LOADER_KEY)? {
        Value::Nil => Loader::None,
        Value::Function(_) => Loader::Function,
        other => Loader::Static(lua_to_json(&other)?),
    };

    let mut methods = Vec::new();
    for key in METHOD_KEYS {
        if let Value::Function(_) = table.get::<Value>(key)? {
            // METHOD_KEYS are all valid method names.
            if let Ok(method) = Method::from_bytes(key.as_bytes()) {
                methods.push(method);
            }
        }
    }

    Ok(Exports {
        render,
        loader,
        methods,
    })
}

/// Arguments passed to a render function.
#[derive(Debug, Clone, Copy)]
pub struct RenderArgs<'a> {
    /// Query parameters.
    pub query: &'a HashMap<String, String>,
    /// Route parameters.
    pub params: &'a HashMap<String, String>,
    /// Data for this level.
    pub data: &'a JsonValue,
    /// Rendered inner content, for layouts.
    pub children: Option<&'a str>,
}

/// What a loader produced.
#[derive(Debug, Clone)]
pub enum LoaderOutput {
    /// A table (or other structured value), serialized as JSON.
    Data(JsonValue),
    /// A scalar value, answered as text.
    Text(String),
    /// A `response(...)` or `redirect(...)` override.
    Response(Response),
}

impl LoaderOutput {
    /// Returns the value handed to render functions.
    pub fn into_data(self) -> JsonValue {
        match self {
            LoaderOutput::Data(data) => data,
            LoaderOutput::Text(text) => JsonValue::String(text),
            LoaderOutput::Response(_) => JsonValue::Null,
        }
    }
}

/// A per-request Lua state with the module helpers installed.
pub struct Runtime {
    lua: Lua,
}

impl Runtime {
    /// Creates a fresh Lua state.
    pub fn new() -> Result<Self> {
        let lua = Lua::new();
        register_helpers(&lua).map_err(|e| Error::lua("<runtime>", e))?;
        Ok(Self { lua })
    }

    /// Evaluates a module chunk and returns its export table.
    pub fn evaluate(&self, id: &str, source: &str) -> Result<Table> {
        let value = self
            .lua
            .load(source)
            .set_name(id)
            .eval::<Value>()
            .map_err(|e| Error::lua(id, e))?;

        match value {
            Value::Table(table) => Ok(table),
            other => Err(Error::Compile(format!(
                "Module {} must return a table, got {}",
                id,
                other.type_name()
            ))),
        }
    }

    /// Evaluates a compiled module in this state.
    pub fn instantiate<'r>(&'r self, module: &'r LuaModule) -> Result<Instance<'r>> {
        let table = self.evaluate(&module.id, &module.source)?;
        Ok(Instance {
            runtime: self,
            module,
            table,
        })
    }

    /// Converts a JSON value to a Lua value.
    pub fn json_to_lua(&self, json: &JsonValue) -> LuaResult<Value> {
        Ok(match json {
            JsonValue::Null => Value::Nil,
            JsonValue::Bool(b) => Value::Boolean(*b),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Integer(i)
                } else if let Some(f) = n.as_f64() {
                    Value::Number(f)
                } else {
                    Value::Nil
                }
            }
            JsonValue::String(s) => Value::String(self.lua.create_string(s)?),
            JsonValue::Array(arr) => {
                let table = self.lua.create_table()?;
                for (i, v) in arr.iter().enumerate() {
                    table.set(i + 1, self.json_to_lua(v)?)?;
                }
                Value::Table(table)
            }
            JsonValue::Object(obj) => {
                let table = self.lua.create_table()?;
                for (k, v) in obj {
                    table.set(k.as_str(), self.json_to_lua(v)?)?;
                }
                Value::Table(table)
            }
        })
    }

    fn string_map(&self, map: &HashMap<String, String>) -> LuaResult<Table> {
        let table = self.lua.create_table()?;
        for (k, v) in map {
            table.set(k.as_str(), v.as_str())?;
        }
        Ok(table)
    }

    fn render_table(&self, args: RenderArgs<'_>) -> LuaResult<Table> {
        let table = self.lua.create_table()?;
        table.set("query", self.string_map(args.query)?)?;
        table.set("params", self.string_map(args.params)?)?;
        table.set("data", self.json_to_lua(args.data)?)?;
        if let Some(children) = args.children {
            table.set("children", children)?;
        }
        Ok(table)
    }

    /// Builds the request table handed to loaders and method handlers.
    fn request_table(&self, req: &Request) -> LuaResult<Table> {
        let table = self.lua.create_table()?;
        table.set("method", req.method.as_str())?;
        table.set("path", req.path.as_str())?;
        table.set("url", req.url())?;
        table.set("params", self.string_map(&req.params)?)?;
        table.set("query", self.string_map(&req.query)?)?;
        table.set("cookies", self.string_map(req.cookies())?)?;
        let context = match &req.context {
            JsonValue::Null => Value::Table(self.lua.create_table()?),
            other => self.json_to_lua(other)?,
        };
        table.set("context", context)?;

        let headers = self.lua.create_table()?;
        for (name, value) in &req.headers {
            if let Ok(value) = value.to_str() {
                headers.set(name.as_str(), value)?;
            }
        }
        table.set("headers", headers)?;

        if let Some(body) = &req.body {
            table.set("body", self.lua.create_string(body)?)?;
        }
        if let Some(form) = req.form() {
            table.set("form", self.json_to_lua(&form)?)?;
        }

        Ok(table)
    }
}

/// A module evaluated in a [`Runtime`].
pub struct Instance<'r> {
    runtime: &'r Runtime,
    module: &'r LuaModule,
    table: Table,
}

impl Instance<'_> {
    fn export(&self, key: &str) -> Result<Function> {
        match self.table.get::<Value>(key) {
            Ok(Value::Function(f)) => Ok(f),
            Ok(_) => Err(Error::MissingExport {
                module: self.module.id.clone(),
                export: key.to_string(),
            }),
            Err(e) => Err(Error::lua(&self.module.id, e)),
        }
    }

    /// Calls the render function and returns the produced HTML.
    pub fn render(&self, args: RenderArgs<'_>) -> Result<String> {
        let render = self.export(RENDER_KEY)?;
        let id = &self.module.id;

        let lua_args = self
            .runtime
            .render_table(args)
            .map_err(|e| Error::lua(id, e))?;

        match render.call::<Value>(lua_args).map_err(|e| Error::lua(id, e))? {
            Value::Nil => Ok(String::new()),
            Value::String(s) => Ok(s.to_string_lossy()),
            Value::Integer(i) => Ok(i.to_string()),
            Value::Number(n) => Ok(n.to_string()),
            other => Err(Error::Compile(format!(
                "Render function of {} returned {}, expected a string",
                id,
                other.type_name()
            ))),
        }
    }

    /// Calls the loader function.
    ///
    /// Any failure, including evaluation errors, becomes [`Error::Loader`].
    pub fn load(&self, req: &Request) -> Result<LoaderOutput> {
        let id = &self.module.id;
        let loader_error = |message: String| Error::Loader {
            module: id.clone(),
            message,
        };

        let loader = self.export(LOADER_KEY).map_err(|e| loader_error(e.to_string()))?;
        let request = self
            .runtime
            .request_table(req)
            .map_err(|e| loader_error(e.to_string()))?;
        let value = loader
            .call::<Value>(request)
            .map_err(|e| loader_error(e.to_string()))?;

        match value {
            Value::Table(ref table) if is_response(table) => {
                Ok(LoaderOutput::Response(self.to_response(table)?))
            }
            Value::Table(_) => Ok(LoaderOutput::Data(
                lua_to_json(&value).map_err(|e| loader_error(e.to_string()))?,
            )),
            Value::Nil => Ok(LoaderOutput::Data(JsonValue::Null)),
            Value::String(s) => Ok(LoaderOutput::Text(s.to_string_lossy())),
            other => Ok(LoaderOutput::Text(
                lua_to_json(&other)
                    .map_err(|e| loader_error(e.to_string()))?
                    .to_string(),
            )),
        }
    }

    /// Calls the handler exported for the request method.
    ///
    /// Tables become JSON, strings HTML, `nil` an empty `204`.
    pub fn call_method(&self, req: &Request) -> Result<Response> {
        let id = &self.module.id;
        let handler = self.export(req.method.as_str())?;
        let request = self
            .runtime
            .request_table(req)
            .map_err(|e| Error::lua(id, e))?;

        match handler.call::<Value>(request).map_err(|e| Error::lua(id, e))? {
            Value::Table(ref table) if is_response(table) => self.to_response(table),
            Value::Nil => Ok(Response::new(StatusCode::NO_CONTENT)),
            Value::String(s) => Ok(Response::html(StatusCode::OK, s.to_string_lossy())),
            other => {
                let json = lua_to_json(&other).map_err(|e| Error::lua(id, e))?;
                Ok(Response::json(StatusCode::OK, &json))
            }
        }
    }

    fn to_response(&self, table: &Table) -> Result<Response> {
        table_to_response(table).map_err(|e| Error::lua(&self.module.id, e))
    }
}

fn is_response(table: &Table) -> bool {
    table.get::<bool>(RESPONSE_MARKER).unwrap_or(false)
}

fn table_to_response(table: &Table) -> LuaResult<Response> {
    let status = table.get::<Option<u16>>("status")?.unwrap_or(200);
    let status = StatusCode::from_u16(status).map_err(mlua::Error::external)?;

    let mut response = match table.get::<Value>("body")? {
        Value::Nil => Response::new(status),
        Value::String(s) => {
            let mut response = Response::html(status, String::new());
            response.body = Body::Full(s.as_bytes().to_vec());
            response
        }
        other => Response::json(status, &lua_to_json(&other)?),
    };

    if let Some(headers) = table.get::<Option<Table>>("headers")? {
        for pair in headers.pairs::<String, String>() {
            let (name, value) = pair?;
            let name = HeaderName::try_from(name.as_str()).map_err(mlua::Error::external)?;
            let value = HeaderValue::from_str(&value).map_err(mlua::Error::external)?;
            response.headers.insert(name, value);
        }
    }

    Ok(response)
}

fn register_helpers(lua: &Lua) -> LuaResult<()> {
    let globals = lua.globals();

    let response = lua.create_function(|lua, (status, body, headers): (u16, Value, Option<Table>)| {
        let result = lua.create_table()?;
        result.set(RESPONSE_MARKER, true)?;
        result.set("status", status)?;
        result.set("body", body)?;
        if let Some(headers) = headers {
            result.set("headers", headers)?;
        }
        Ok(result)
    })?;
    globals.set("response", response)?;

    let redirect = lua.create_function(|lua, (location, status): (String, Option<u16>)| {
        let result = lua.create_table()?;
        result.set(RESPONSE_MARKER, true)?;
        result.set("status", status.unwrap_or(302))?;
        let headers = lua.create_table()?;
        headers.set("Location", location)?;
        result.set("headers", headers)?;
        Ok(result)
    })?;
    globals.set("redirect", redirect)?;

    let escape = lua.create_function(|_, text: Value| {
        Ok(match text {
            Value::Nil => String::new(),
            Value::String(s) => escape_html(&s.to_string_lossy()),
            other => escape_html(&other.to_string()?),
        })
    })?;
    globals.set("escape", escape)?;

    Ok(())
}

/// Deepest table nesting [`lua_to_json`] converts.
pub const MAX_JSON_DEPTH: usize = 128;

/// Integer keys up to this bound always form an array.
const SPARSE_SAFE: i64 = 10;

/// Converts a Lua value to JSON.
///
/// Sequences (integer keys `1..n`) become arrays; functions and userdata
/// become `null`. Integer-keyed tables whose largest key is more than twice
/// their key count become objects. A table containing itself, or nesting
/// deeper than [`MAX_JSON_DEPTH`], is an error.
pub fn lua_to_json(value: &Value) -> LuaResult<JsonValue> {
    convert(value, &mut Vec::new())
}

fn convert(value: &Value, ancestors: &mut Vec<*const std::ffi::c_void>) -> LuaResult<JsonValue> {
    Ok(match value {
        Value::Nil => JsonValue::Null,
        Value::Boolean(b) => JsonValue::Bool(*b),
        Value::Integer(i) => JsonValue::Number((*i).into()),
        Value::Number(n) => serde_json::Number::from_f64(*n)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        Value::String(s) => JsonValue::String(s.to_str()?.to_string()),
        Value::Table(t) => {
            let pointer = t.to_pointer();
            if ancestors.contains(&pointer) {
                return Err(mlua::Error::runtime("cannot convert a table that contains itself"));
            }
            if ancestors.len() >= MAX_JSON_DEPTH {
                return Err(mlua::Error::runtime(format!(
                    "tables nested deeper than {} levels",
                    MAX_JSON_DEPTH
                )));
            }

            ancestors.push(pointer);
            let converted = convert_table(t, ancestors);
            ancestors.pop();
            converted?
        }
        _ => JsonValue::Null,
    })
}

fn convert_table(t: &Table, ancestors: &mut Vec<*const std::ffi::c_void>) -> LuaResult<JsonValue> {
    let mut is_array = true;
    let mut max_index = 0i64;
    let mut count = 0i64;

    for pair in t.clone().pairs::<Value, Value>() {
        let (key, _) = pair?;
        match key {
            Value::Integer(i) if i > 0 => {
                max_index = max_index.max(i);
                count += 1;
            }
            _ => {
                is_array = false;
                break;
            }
        }
    }

    let dense = max_index <= SPARSE_SAFE || max_index / 2 <= count;
    if is_array && max_index > 0 && dense {
        let mut arr = Vec::with_capacity(max_index as usize);
        for i in 1..=max_index {
            let v: Value = t.get(i)?;
            arr.push(convert(&v, ancestors)?);
        }
        return Ok(JsonValue::Array(arr));
    }

    let mut map = serde_json::Map::new();
    for pair in t.clone().pairs::<Value, Value>() {
        let (key, val) = pair?;
        let key = match key {
            Value::String(s) => s.to_str()?.to_string(),
            Value::Integer(i) => i.to_string(),
            _ => continue,
        };
        map.insert(key, convert(&val, ancestors)?);
    }
    Ok(JsonValue::Object(map))
}
