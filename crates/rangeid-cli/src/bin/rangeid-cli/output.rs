//! Output formatting for CLI responses.
//!
//! Supports both human-readable and JSON output formats for
//! integration with scripts and other tools.

/// Trait for types that can be output in multiple formats.
pub trait Outputable {
    /// Convert to JSON value for structured output.
    fn to_json(&self) -> serde_json::Value;

    /// Convert to human-readable string.
    fn to_human(&self) -> String;
}

/// Print a value in the appropriate format.
pub fn print_output<T: Outputable>(value: &T, json: bool) {
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&value.to_json())
                .unwrap_or_else(|e| format!("{{\"error\": \"failed to serialize: {}\"}}", e))
        );
    } else {
        println!("{}", value.to_human());
    }
}

/// Outcome of a yes/no operation such as lock or delete.
pub struct BoolOutput {
    pub operation: &'static str,
    pub key: String,
    pub success: bool,
}

impl Outputable for BoolOutput {
    fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "operation": self.operation,
            "key": self.key,
            "success": self.success
        })
    }

    fn to_human(&self) -> String {
        if self.success {
            format!("{} {}: OK", self.operation, self.key)
        } else {
            format!("{} {}: refused", self.operation, self.key)
        }
    }
}
