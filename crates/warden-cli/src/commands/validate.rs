//! `warden validate`: show what the merged configuration resolves to.

use colored::Colorize;
use warden_config::LoadedConfig;
use warden_policy::PatternRuleSet;

use crate::config_bridge;
use crate::theme::Theme;

/// Print the loaded files, agents and tools. Returns `false` if any tool
/// declaration would be excluded.
pub(crate) fn run_validate(loaded: &LoadedConfig) -> bool {
    let cfg = &loaded.config;

    println!("{}", Theme::header("Configuration"));
    if loaded.loaded_files.is_empty() {
        println!("  {}", Theme::dimmed("no config files found, using defaults"));
    }
    for path in &loaded.loaded_files {
        println!("  {}", path.display());
    }
    match loaded.grant_path() {
        Some(path) => println!("  grants: {}", path.display()),
        None => println!("  grants: {}", Theme::dimmed("in memory")),
    }
    println!(
        "  approval timeouts: low {}s, medium {}s, high {}s (default scope {})",
        cfg.approval.low_timeout_secs,
        cfg.approval.medium_timeout_secs,
        cfg.approval.high_timeout_secs,
        cfg.approval.default_scope,
    );

    println!();
    println!("{}", Theme::header("Agents"));
    if cfg.agents.is_empty() {
        println!("  {}", Theme::warning("no agents configured; every check will fail"));
    }
    for (name, spec) in &cfg.agents {
        println!("  {}", name.bold());
        print_rules("files.read", spec.files.read.rules());
        print_rules("files.write", spec.files.write.rules());
        print_rules("files.edit", spec.files.edit.rules());
        print_rules("bash", spec.bash.rules());
        if spec.files.write.is_documentation_only() || spec.files.edit.is_documentation_only() {
            println!("    {}", Theme::dimmed("documentation_only applies to some file rules"));
        }
    }

    println!();
    println!("{}", Theme::header("Tools"));
    let (registry, excluded) = config_bridge::to_declarations(cfg);
    if registry.is_empty() && excluded.is_empty() {
        println!("  {}", Theme::dimmed("no tool declarations"));
    }
    for name in cfg.tools.keys().filter(|n| registry.contains(n)) {
        println!("  {}", Theme::success(name));
    }
    for (name, err) in &excluded {
        println!("  {}", Theme::error(&format!("{name}: {err}")));
    }

    excluded.is_empty()
}

fn print_rules(label: &str, rules: &PatternRuleSet) {
    println!(
        "    {label:<12} default {:<5} allow [{}] deny [{}]",
        rules.default_decision().to_string(),
        rules.allow_patterns().join(", "),
        rules.deny_patterns().join(", "),
    );
}
