//! Terminal output formatting.

use colored::Colorize;
use dashing_core::Config;

/// Print the startup banner for `dashing serve`.
pub fn print_banner(config: &Config, jobs: &[&str]) {
    let host = config.bind;

    println!();
    println!("  {} {}", "Dashing".cyan().bold(), "Server".bold());
    println!();
    println!("  {}  http://{}", "Dashboards".green(), host);
    println!("  {}      http://{}/events", "Events".green(), host);
    println!("  {}     {}", "Webroot".green(), config.webroot.display());
    if jobs.is_empty() {
        println!("  {}        {}", "Jobs".green(), "none".dimmed());
    } else {
        println!("  {}        {}", "Jobs".green(), jobs.join(", "));
    }
    if config.development {
        println!("  {}", "Development mode".yellow());
    }
    println!();
    println!("  {}", "Ctrl+C to stop".dimmed());
    println!();
}

/// Print the effective configuration.
pub fn print_config(config: &Config) {
    println!("{}", "Configuration OK".green().bold());
    println!();
    println!("{}: {}", "Bind".bold(), config.bind);
    println!("{}: {}", "Webroot".bold(), config.webroot.display());
    println!("{}: {}", "Development".bold(), config.development);
    println!(
        "{}: {}",
        "Subscriber buffer".bold(),
        config.broker.subscriber_buffer
    );
    println!("{}: {}", "Publish queue".bold(), config.broker.publish_queue);

    if config.jobs.is_empty() {
        println!("{}: {}", "Job settings".bold(), "none".dimmed());
    } else {
        println!("{}", "Job settings".bold());
        for (name, settings) in &config.jobs {
            println!("  {} {}", name.cyan(), settings);
        }
    }
}
