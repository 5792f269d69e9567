// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Prints the compiled route table.

use std::fmt::Write;

use isoroute::RouteTable;

use crate::commands::compile;
use crate::config::Config;

/// Runs the command.
pub fn run() -> anyhow::Result<()> {
    let root = std::env::current_dir()?;
    let config = Config::load_from(&root)?;
    let table = compile(&config, &root)?;
    print!("{}", describe(&table));
    Ok(())
}

/// Formats one line per route: template, module, data source and layouts.
pub fn describe(table: &RouteTable) -> String {
    let mut out = String::new();

    for entry in table.routes() {
        let data = if entry.ssr() {
            "loader"
        } else if entry.data().is_some() {
            "static"
        } else {
            "none"
        };
        let layouts: Vec<&str> = entry.layouts.iter().map(|l| l.id()).collect();
        let _ = writeln!(
            out,
            "page  {:<28} {:<28} data={:<6} layouts=[{}]",
            entry.template,
            entry.module.id(),
            data,
            layouts.join(", ")
        );
    }

    for api in table.apis() {
        let methods: Vec<&str> = api
            .module
            .exports()
            .methods
            .iter()
            .map(|m| m.as_str())
            .collect();
        let _ = writeln!(
            out,
            "api   {:<28} {:<28} methods={}",
            api.template,
            api.module.id(),
            methods.join(",")
        );
    }

    if let Some(module) = table.not_found() {
        let _ = writeln!(out, "404   {}", module.id());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use isoroute::MemoryResolver;

    #[test]
    fn test_describe() {
        let resolver = MemoryResolver::new()
            .with("layout.lua", r#"return { default = function(a) return a.children end }"#)
            .with(
                "users/[id].lua",
                r#"return { ["$"] = function() return {} end, default = function() return "" end }"#,
            )
            .with("api/ping.lua", r#"return { GET = function() return "pong" end }"#);
        let table = RouteTable::compile(&resolver).unwrap();

        let text = describe(&table);
        assert!(text.contains("/users/[id]"));
        assert!(text.contains("data=loader"));
        assert!(text.contains("layouts=[layout.lua]"));
        assert!(text.contains("methods=GET"));
    }
}
