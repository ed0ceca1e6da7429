use colored::Colorize;

pub fn header(title: &str) {
    println!("{}", title.bold().underline());
}

pub fn subheader(title: &str) {
    println!("{}", title.bold());
}

pub fn hint(msg: &str) {
    println!("{} {}", "hint:".cyan().bold(), msg.dimmed());
}

pub fn info(msg: &str) {
    eprintln!("{} {}", "info:".blue().bold(), msg);
}

pub fn warn(msg: &str) {
    eprintln!("{} {}", "warning:".yellow().bold(), msg);
}

pub fn success(msg: &str) {
    println!("{} {}", "✓".green().bold(), msg);
}

/// One aligned `name: value` row.
pub fn field(name: &str, value: &str) {
    println!("  {:<18} {}", format!("{name}:"), value.cyan());
}

pub fn json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn on_off(enabled: bool) -> colored::ColoredString {
    if enabled { "on".green() } else { "off".red() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_printers_do_not_panic() {
        header("Test Header");
        subheader("Test Subheader");
        hint("This is a hint");
        info("This is info");
        warn("This is a warning");
        success("This is success");
        field("name", "value");
    }

    #[test]
    fn test_json_prints_serializable_values() {
        assert!(json(&serde_json::json!({ "status": "healthy" })).is_ok());
    }

    #[test]
    fn test_on_off_labels() {
        assert!(on_off(true).to_string().contains("on"));
        assert!(on_off(false).to_string().contains("off"));
    }
}
