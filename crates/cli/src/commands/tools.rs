//! `parley tools`: Inspect and run registered tools.

use parley_config::AppConfig;
use parley_core::tool::{Tool, ToolRegistry};

pub async fn run(config: &AppConfig, name: Option<String>, args: Option<String>) -> anyhow::Result<()> {
    let registry = parley_tools::default_registry(&config.tools);

    let Some(name) = name else {
        print!("{}", render_list(&registry));
        return Ok(());
    };

    let Some(args) = args else {
        let info = registry.describe(&name)?;
        println!("{}", info.name);
        println!();
        println!("{}", info.documentation);
        if let Some(tool) = registry.get(&name) {
            println!();
            println!("Parameters:");
            println!("{}", serde_json::to_string_pretty(&tool.parameters_schema())?);
        }
        return Ok(());
    };

    let arguments: serde_json::Value = serde_json::from_str(&args)?;
    let result = registry.execute(&name, arguments).await?;
    match result {
        serde_json::Value::String(s) => println!("{s}"),
        other => println!("{}", serde_json::to_string_pretty(&other)?),
    }
    Ok(())
}

/// One line per tool, sorted by name, with the first line of its description.
fn render_list(registry: &ToolRegistry) -> String {
    let mut defs = registry.definitions();
    defs.sort_by(|a, b| a.name.cmp(&b.name));

    let mut out = format!("Registered tools ({}):\n", defs.len());
    for def in defs {
        let summary = def.description.lines().next().unwrap_or_default();
        out.push_str(&format!("  {:<14} {summary}\n", def.name));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_default_tools_sorted() {
        let registry = parley_tools::default_registry(&AppConfig::default().tools);
        let listing = render_list(&registry);
        let names: Vec<&str> = listing
            .lines()
            .skip(1)
            .filter_map(|l| l.split_whitespace().next())
            .collect();
        assert!(listing.starts_with("Registered tools (3):"));
        assert_eq!(names, ["list_files", "read_file", "write_file"]);
    }
}
