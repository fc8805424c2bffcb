// src/banner.rs

/// Prints the application startup banner to the console.
pub fn print_banner() {
    let banner = r#"
                         _                      _
  __ _  __ _  ___ _ __ | |_       _____   ____ _| |
 / _` |/ _` |/ _ \ '_ \| __|____ / _ \ \ / / _` | |
| (_| | (_| |  __/ | | | ||_____|  __/\ V / (_| | |
 \__,_|\__, |\___|_| |_|\__|     \___| \_/ \__,_|_|
       |___/

    Agent Evaluation Pipeline
"#;
    println!("{}", banner);
    println!("    version {}", env!("CARGO_PKG_VERSION"));
}
