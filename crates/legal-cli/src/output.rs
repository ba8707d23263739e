use colored::Colorize;
use legal_client::PolicyVersionRule;
use tabled::builder::Builder;
use tabled::settings::Style;

pub fn print_success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

pub fn print_failure(msg: &str) {
    println!("{} {}", "✗".red(), msg);
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

pub fn print_field(name: &str, value: impl std::fmt::Display) {
    println!("{}: {}", name.cyan(), value);
}

/// Prints `(scope, rule)` pairs as a table.
pub fn print_rules_table<'a>(rows: impl IntoIterator<Item = (&'a str, &'a PolicyVersionRule)>) {
    let mut builder = Builder::default();
    builder.push_record(["Scope", "Policy Version", "Country", "Namespace"]);

    let mut count = 0usize;
    for (scope, rule) in rows {
        builder.push_record([
            scope,
            rule.policy_version_id.as_str(),
            rule.country.as_str(),
            rule.namespace.as_str(),
        ]);
        count += 1;
    }

    if count == 0 {
        println!("No crucial policies found.");
        return;
    }

    let table = builder.build().with(Style::rounded()).to_string();
    println!("{table}");
    println!("Total: {count}");
}
