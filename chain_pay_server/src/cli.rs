use std::{env, env::VarError};

/// The server takes no arguments. Any argument prints the help text and the current configuration.
pub fn handle_command_line_args() -> bool {
    let has_cli_args = env::args().count() > 1;
    if has_cli_args {
        display_readme();
        display_envs();
    }
    has_cli_args
}

fn display_readme() {
    const README: &str = include_str!("./cli-help.txt");
    println!("\n{README}\n");
}

fn display_envs() {
    // Secrets are deliberately left off this list
    const DISPLAY_ENVS: [&str; 9] = [
        "RUST_LOG",
        "CPG_HOST",
        "CPG_PORT",
        "CPG_DATABASE_URL",
        "CPG_PUSH_HMAC_CHECKS",
        "CPG_ORDER_EXPIRY_CHECK_INTERVAL",
        "CPG_WALLET_CACHE_TTL",
        "CPG_GAS_PRICE_INTERVAL",
        "CPG_RPC_TIMEOUT",
    ];

    println!("Current environment values (EXCLUDING variables that contain secrets):");
    DISPLAY_ENVS.iter().for_each(|&name| print_env(name));
    println!("\nPer-chain overrides that are set:");
    env::vars()
        .map(|(name, _)| name)
        .filter(|name| name.starts_with("CPG_") && !DISPLAY_ENVS.contains(&name.as_str()) && !name.contains("SECRET"))
        .for_each(|name| print_env(&name));
}

fn print_env(name: &str) {
    let val = match env::var(name) {
        Ok(s) => s,
        Err(VarError::NotPresent) => "Not set".into(),
        Err(VarError::NotUnicode(s)) => format!("Invalid value: {}", s.to_string_lossy()),
    };
    println!("  {name:<35} {val:<15}");
}
