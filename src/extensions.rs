//! Built-in extension functions available to `dynamic` mappings.

use crate::transform_registry::{ExtensionArgs, ExtensionError, ExtensionRegistry};

pub fn register_builtins(registry: &mut ExtensionRegistry) {
    registry.register("text", "upper", upper);
    registry.register("text", "lower", lower);
    registry.register("text", "trim", trim);
    registry.register("cvss", "severity", cvss_severity);
}

fn upper(args: &ExtensionArgs<'_>) -> Result<String, ExtensionError> {
    Ok(args.cell_value.to_uppercase())
}

fn lower(args: &ExtensionArgs<'_>) -> Result<String, ExtensionError> {
    Ok(args.cell_value.to_lowercase())
}

fn trim(args: &ExtensionArgs<'_>) -> Result<String, ExtensionError> {
    Ok(args.cell_value.trim().to_string())
}

/// Qualitative rating of a CVSS v3 base score. Empty when the cell is not a
/// score in `0.0..=10.0`.
fn cvss_severity(args: &ExtensionArgs<'_>) -> Result<String, ExtensionError> {
    let score = match args.cell_value.trim().parse::<f64>() {
        Ok(score) if (0.0..=10.0).contains(&score) => score,
        _ => return Ok(String::new()),
    };

    let rating = if score >= 9.0 {
        "Critical"
    } else if score >= 7.0 {
        "High"
    } else if score >= 4.0 {
        "Medium"
    } else if score > 0.0 {
        "Low"
    } else {
        "None"
    };

    Ok(rating.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::{FieldMapping, GlobalOptions, ProcessKind};
    use crate::record::Row;

    fn run(identifier: &str, cell: &str) -> String {
        let registry = ExtensionRegistry::with_builtins();
        let row = Row::new();
        let mapping = FieldMapping::new("Score", "severity", ProcessKind::Dynamic);
        let options = GlobalOptions::default();
        let args = ExtensionArgs {
            cell_value: cell,
            column: "Score",
            row: &row,
            mapping: &mapping,
            options: &options,
        };
        registry.call(identifier, &args).unwrap()
    }

    #[test]
    fn test_cvss_severity_bands() {
        assert_eq!(run("cvss.severity", "9.8"), "Critical");
        assert_eq!(run("cvss.severity", "7.0"), "High");
        assert_eq!(run("cvss.severity", " 5.3 "), "Medium");
        assert_eq!(run("cvss.severity", "0.1"), "Low");
        assert_eq!(run("cvss.severity", "0"), "None");
    }

    #[test]
    fn test_cvss_severity_rejects_non_scores() {
        assert_eq!(run("cvss.severity", "high"), "");
        assert_eq!(run("cvss.severity", "11"), "");
    }

    #[test]
    fn test_text_builtins() {
        assert_eq!(run("text.upper", "sql injection"), "SQL INJECTION");
        assert_eq!(run("text.lower", "XSS"), "xss");
        assert_eq!(run("text.trim", "  CSRF "), "CSRF");
    }
}
