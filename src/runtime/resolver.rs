//! Per-field value resolution.
//!
//! [`FieldResolver::resolve`] turns one cell into the value written to the
//! target record, dispatching on the mapping's [`ProcessKind`]. Configuration
//! problems and collaborator failures are returned as [`ImportError`]. A bad
//! cell is not: an unmatched lookup or choice, an unparseable date, or an
//! unknown extension resolves to an empty value and leaves a diagnostic in
//! the run log.

use crate::error::ImportError;
use crate::mapping::{FieldMapping, ProcessKind};
use crate::record::{FieldValue, Row};
use crate::runtime::collaborators::{ChoiceLookup, ReferenceLookup};
use crate::runtime::context::RunContext;
use crate::runtime::date_format::DateFormatError;
use crate::runtime::query::{self, PLACEHOLDER};
use crate::transform_registry::{ExtensionArgs, ExtensionRegistry};

/// Resolves cells using injected lookup collaborators and extensions.
#[derive(Clone, Copy)]
pub struct FieldResolver<'a> {
    references: &'a dyn ReferenceLookup,
    choices: &'a dyn ChoiceLookup,
    extensions: &'a ExtensionRegistry,
}

impl<'a> FieldResolver<'a> {
    pub fn new(
        references: &'a dyn ReferenceLookup,
        choices: &'a dyn ChoiceLookup,
        extensions: &'a ExtensionRegistry,
    ) -> Self {
        Self {
            references,
            choices,
            extensions,
        }
    }

    /// Resolve the value of `column` in `row` according to `mapping`.
    ///
    /// For `mergeFields` mappings `column` is only used in diagnostics; the
    /// value is built from the mapping's source fields.
    pub fn resolve(
        &self,
        mapping: &FieldMapping,
        row: &Row,
        column: &str,
        ctx: &mut RunContext,
    ) -> Result<String, ImportError> {
        let cell = cell(row, column);

        match mapping.process {
            ProcessKind::Copy => Ok(cell.to_string()),
            ProcessKind::Date => self.resolve_date(cell, column, ctx),
            ProcessKind::Lookup => self.resolve_lookup(mapping, cell, column, ctx),
            ProcessKind::Choice => self.resolve_choice(mapping, cell, column, ctx),
            ProcessKind::Dynamic => self.resolve_dynamic(mapping, row, cell, column, ctx),
            ProcessKind::MergeFields => Ok(merge_fields(mapping, row)),
        }
    }

    /// Like [`FieldResolver::resolve`], tagged with how the sink should store it.
    pub fn resolve_value(
        &self,
        mapping: &FieldMapping,
        row: &Row,
        column: &str,
        ctx: &mut RunContext,
    ) -> Result<FieldValue, ImportError> {
        let value = self.resolve(mapping, row, column, ctx)?;
        Ok(match mapping.process {
            ProcessKind::Date | ProcessKind::Lookup => FieldValue::raw(value),
            _ => FieldValue::display(value),
        })
    }

    fn resolve_date(
        &self,
        cell: &str,
        column: &str,
        ctx: &mut RunContext,
    ) -> Result<String, ImportError> {
        let (pattern, parsed) = {
            let format = ctx.date_format()?;
            (format.pattern().to_string(), format.to_canonical(cell))
        };

        match parsed {
            Ok(date) => {
                ctx.log(format!(
                    "Input date: {} Format: {} Output date: {}",
                    cell, pattern, date
                ));
                Ok(date)
            }
            Err(DateFormatError::Unparseable { reason, .. }) => {
                ctx.log(format!(
                    "{}: Invalid date has been specified ({}) for format {}: {}",
                    column, cell, pattern, reason
                ));
                Ok(String::new())
            }
            Err(e) => Err(ImportError::InvalidDateFormat {
                format: pattern,
                reason: e.to_string(),
            }),
        }
    }

    fn resolve_lookup(
        &self,
        mapping: &FieldMapping,
        cell: &str,
        column: &str,
        ctx: &mut RunContext,
    ) -> Result<String, ImportError> {
        let table = mapping.lookup_table.as_deref().unwrap_or_default();
        let query = build_query(mapping, cell, column, ctx);

        match self.references.find_reference(table, &query)? {
            Some(id) => Ok(id),
            None => {
                ctx.log(format!("{}: Invalid option has been specified ({})", column, cell));
                Ok(String::new())
            }
        }
    }

    fn resolve_choice(
        &self,
        mapping: &FieldMapping,
        cell: &str,
        column: &str,
        ctx: &mut RunContext,
    ) -> Result<String, ImportError> {
        let query = build_query(mapping, cell, column, ctx);

        match self.choices.find_choice_value(&query)? {
            Some(value) => Ok(value),
            None => {
                ctx.log(format!("{}: Invalid option has been specified ({})", column, cell));
                Ok(String::new())
            }
        }
    }

    fn resolve_dynamic(
        &self,
        mapping: &FieldMapping,
        row: &Row,
        cell: &str,
        column: &str,
        ctx: &mut RunContext,
    ) -> Result<String, ImportError> {
        let identifier = mapping.script_extension.as_deref().unwrap_or_default();

        let extension = match self.extensions.resolve(identifier) {
            Ok(extension) => extension,
            Err(e) => {
                ctx.log(format!(
                    "{}: Invalid extension has been specified '{}' ({}): {}",
                    column, identifier, cell, e
                ));
                return Ok(String::new());
            }
        };

        let args = ExtensionArgs {
            cell_value: cell,
            column,
            row,
            mapping,
            options: ctx.options(),
        };

        extension.call(&args).map_err(|source| ImportError::Extension {
            identifier: identifier.to_string(),
            source,
        })
    }
}

fn cell<'r>(row: &'r Row, column: &str) -> &'r str {
    row.get(column).map(String::as_str).unwrap_or("")
}

/// Fill the mapping's query template, noting templates that do not carry
/// exactly one placeholder.
fn build_query(mapping: &FieldMapping, cell: &str, column: &str, ctx: &mut RunContext) -> String {
    let template = mapping.lookup_query.as_deref().unwrap_or_default();
    let substitution = query::substitute(template, cell);

    match substitution.placeholders {
        1 => {}
        0 => ctx.log(format!(
            "{}: Lookup query '{}' has no {} placeholder; cell value ignored",
            column, template, PLACEHOLDER
        )),
        n => ctx.log(format!(
            "{}: Lookup query '{}' has {} {} placeholders; only the first is replaced",
            column, template, n, PLACEHOLDER
        )),
    }

    substitution.query
}

/// Join the first two source fields. Further entries are ignored.
fn merge_fields(mapping: &FieldMapping, row: &Row) -> String {
    let first = mapping.fields_to_merge.first().map_or("", |f| cell(row, f));
    let second = mapping.fields_to_merge.get(1).map_or("", |f| cell(row, f));
    format!("{}{}{}", first, mapping.merge_separator(), second)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::mapping::GlobalOptions;
    use crate::transform_registry::ExtensionError;
    use std::cell::RefCell;

    /// Lookup double that records queries and answers from a fixed list.
    #[derive(Default)]
    struct Lookups {
        answers: Vec<(String, String)>,
        seen: RefCell<Vec<String>>,
    }

    impl Lookups {
        fn answering(query: &str, answer: &str) -> Self {
            Self {
                answers: vec![(query.to_string(), answer.to_string())],
                seen: RefCell::default(),
            }
        }

        fn answer(&self, query: &str) -> Option<String> {
            self.seen.borrow_mut().push(query.to_string());
            self.answers
                .iter()
                .find(|(q, _)| q == query)
                .map(|(_, a)| a.clone())
        }
    }

    impl ReferenceLookup for Lookups {
        fn find_reference(&self, _table: &str, query: &str) -> Result<Option<String>, StoreError> {
            Ok(self.answer(query))
        }
    }

    impl ChoiceLookup for Lookups {
        fn find_choice_value(&self, query: &str) -> Result<Option<String>, StoreError> {
            Ok(self.answer(query))
        }
    }

    fn ctx(date_format: &str) -> RunContext {
        RunContext::new(GlobalOptions {
            date_format: date_format.to_string(),
            target_table: "findings".to_string(),
            logging_enabled: true,
        })
    }

    fn row(pairs: &[(&str, &str)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn choice_mapping() -> FieldMapping {
        FieldMapping {
            lookup_table: Some("sys_choice".to_string()),
            lookup_query: Some("name=finding^value=$1".to_string()),
            ..FieldMapping::new("Severity", "severity", ProcessKind::Choice)
        }
    }

    #[test]
    fn test_copy() {
        let lookups = Lookups::default();
        let registry = ExtensionRegistry::new();
        let resolver = FieldResolver::new(&lookups, &lookups, &registry);
        let mapping = FieldMapping::new("Title", "short_description", ProcessKind::Copy);

        let value = resolver
            .resolve(&mapping, &row(&[("Title", " SQL injection ")]), "Title", &mut ctx(""))
            .unwrap();
        assert_eq!(value, " SQL injection ");
    }

    #[test]
    fn test_date_to_canonical() {
        let lookups = Lookups::default();
        let registry = ExtensionRegistry::new();
        let resolver = FieldResolver::new(&lookups, &lookups, &registry);
        let mapping = FieldMapping::new("Found On", "found_date", ProcessKind::Date);
        let r = row(&[("Found On", "03/14/2024")]);
        let mut ctx = ctx("MM/dd/yyyy");

        let first = resolver.resolve(&mapping, &r, "Found On", &mut ctx).unwrap();
        let second = resolver.resolve(&mapping, &r, "Found On", &mut ctx).unwrap();
        assert_eq!(first, "2024-03-14");
        assert_eq!(first, second);
        assert!(ctx.run_log().entries()[0].contains("Output date: 2024-03-14"));
    }

    #[test]
    fn test_date_without_format_is_fatal() {
        let lookups = Lookups::default();
        let registry = ExtensionRegistry::new();
        let resolver = FieldResolver::new(&lookups, &lookups, &registry);
        let mapping = FieldMapping::new("Found On", "found_date", ProcessKind::Date);

        let result = resolver.resolve(&mapping, &row(&[("Found On", "03/14/2024")]), "Found On", &mut ctx(""));
        assert!(matches!(result, Err(ImportError::MissingDateFormat)));
    }

    #[test]
    fn test_date_with_unsupported_pattern_is_fatal() {
        let lookups = Lookups::default();
        let registry = ExtensionRegistry::new();
        let resolver = FieldResolver::new(&lookups, &lookups, &registry);
        let mapping = FieldMapping::new("Found On", "found_date", ProcessKind::Date);

        let result = resolver.resolve(
            &mapping,
            &row(&[("Found On", "2024-03-14 UTC")]),
            "Found On",
            &mut ctx("yyyy-MM-dd z"),
        );
        match result {
            Err(ImportError::InvalidDateFormat { format, reason }) => {
                assert_eq!(format, "yyyy-MM-dd z");
                assert!(reason.contains("'z'"));
            }
            other => panic!("expected InvalidDateFormat, got {:?}", other),
        }
    }

    #[test]
    fn test_unmatched_lookup_degrades() {
        let lookups = Lookups::answering("user_name=jdoe", "6816f79c");
        let registry = ExtensionRegistry::new();
        let resolver = FieldResolver::new(&lookups, &lookups, &registry);
        let mapping = FieldMapping {
            lookup_table: Some("sys_user".to_string()),
            lookup_query: Some("user_name=$1".to_string()),
            ..FieldMapping::new("Tester", "tester", ProcessKind::Lookup)
        };
        let mut ctx = ctx("");

        let value = resolver
            .resolve_value(&mapping, &row(&[("Tester", "nobody")]), "Tester", &mut ctx)
            .unwrap();
        assert_eq!(value, FieldValue::raw(""));
        assert_eq!(lookups.seen.borrow().as_slice(), &["user_name=nobody"]);
        assert_eq!(
            ctx.run_log().entries().last().map(String::as_str),
            Some("Tester: Invalid option has been specified (nobody)")
        );
    }

    #[test]
    fn test_unparseable_date_degrades() {
        let lookups = Lookups::default();
        let registry = ExtensionRegistry::new();
        let resolver = FieldResolver::new(&lookups, &lookups, &registry);
        let mapping = FieldMapping::new("Found On", "found_date", ProcessKind::Date);
        let mut ctx = ctx("MM/dd/yyyy");

        let value = resolver
            .resolve(&mapping, &row(&[("Found On", "last week")]), "Found On", &mut ctx)
            .unwrap();
        assert_eq!(value, "");
        assert!(ctx.run_log().entries()[0].contains("Invalid date"));
    }

    #[test]
    fn test_lookup_returns_reference_id() {
        let lookups = Lookups::answering("user_name=jdoe", "6816f79c");
        let registry = ExtensionRegistry::new();
        let resolver = FieldResolver::new(&lookups, &lookups, &registry);
        let mapping = FieldMapping {
            lookup_table: Some("sys_user".to_string()),
            lookup_query: Some("user_name=$1".to_string()),
            ..FieldMapping::new("Tester", "tester", ProcessKind::Lookup)
        };

        let value = resolver
            .resolve_value(&mapping, &row(&[("Tester", "jdoe")]), "Tester", &mut ctx(""))
            .unwrap();
        assert_eq!(value, FieldValue::raw("6816f79c"));
    }

    #[test]
    fn test_unmatched_choice_degrades() {
        let lookups = Lookups::answering("name=finding^value=Low", "3");
        let registry = ExtensionRegistry::new();
        let resolver = FieldResolver::new(&lookups, &lookups, &registry);
        let mut ctx = ctx("");

        let value = resolver
            .resolve(&choice_mapping(), &row(&[("Severity", "High")]), "Severity", &mut ctx)
            .unwrap();
        assert_eq!(value, "");
        assert_eq!(
            ctx.run_log().entries(),
            &["Severity: Invalid option has been specified (High)"]
        );
    }

    #[test]
    fn test_matched_choice_is_display_value() {
        let lookups = Lookups::answering("name=finding^value=High", "2");
        let registry = ExtensionRegistry::new();
        let resolver = FieldResolver::new(&lookups, &lookups, &registry);

        let value = resolver
            .resolve_value(&choice_mapping(), &row(&[("Severity", "High")]), "Severity", &mut ctx(""))
            .unwrap();
        assert_eq!(value, FieldValue::display("2"));
    }

    #[test]
    fn test_query_without_placeholder() {
        let lookups = Lookups::answering("name=finding^value=1", "1");
        let registry = ExtensionRegistry::new();
        let resolver = FieldResolver::new(&lookups, &lookups, &registry);
        let mapping = FieldMapping {
            lookup_query: Some("name=finding^value=1".to_string()),
            ..choice_mapping()
        };
        let mut ctx = ctx("");

        let value = resolver
            .resolve(&mapping, &row(&[("Severity", "High")]), "Severity", &mut ctx)
            .unwrap();
        assert_eq!(value, "1");
        assert!(ctx.run_log().entries()[0].contains("no $1 placeholder"));
    }

    #[test]
    fn test_query_with_repeated_placeholder() {
        let lookups = Lookups::default();
        let registry = ExtensionRegistry::new();
        let resolver = FieldResolver::new(&lookups, &lookups, &registry);
        let mapping = FieldMapping {
            lookup_query: Some("label=$1^value=$1".to_string()),
            ..choice_mapping()
        };
        let mut ctx = ctx("");

        resolver
            .resolve(&mapping, &row(&[("Severity", "High")]), "Severity", &mut ctx)
            .unwrap();
        assert_eq!(lookups.seen.borrow().as_slice(), &["label=High^value=$1"]);
        assert!(ctx.run_log().entries()[0].contains("only the first is replaced"));
    }

    #[test]
    fn test_merge_fields_default_separator() {
        let lookups = Lookups::default();
        let registry = ExtensionRegistry::new();
        let resolver = FieldResolver::new(&lookups, &lookups, &registry);
        let mapping = FieldMapping {
            fields_to_merge: vec!["First".to_string(), "Last".to_string()],
            ..FieldMapping::new("Full Name", "reporter", ProcessKind::MergeFields)
        };

        let value = resolver
            .resolve(&mapping, &row(&[("First", "Jane"), ("Last", "Doe")]), "Full Name", &mut ctx(""))
            .unwrap();
        assert_eq!(value, "Jane Doe");
    }

    #[test]
    fn test_merge_fields_uses_only_first_two() {
        let lookups = Lookups::default();
        let registry = ExtensionRegistry::new();
        let resolver = FieldResolver::new(&lookups, &lookups, &registry);
        let mapping = FieldMapping {
            fields_to_merge: vec!["Host".into(), "Port".into(), "Path".into()],
            merge_character: Some(":".to_string()),
            ..FieldMapping::new("Endpoint", "endpoint", ProcessKind::MergeFields)
        };
        let r = row(&[("Host", "10.0.0.5"), ("Port", "443"), ("Path", "/login")]);

        let value = resolver.resolve(&mapping, &r, "Endpoint", &mut ctx("")).unwrap();
        assert_eq!(value, "10.0.0.5:443");
    }

    #[test]
    fn test_dynamic_receives_fixed_arguments() {
        let lookups = Lookups::default();
        let mut registry = ExtensionRegistry::new();
        registry.register("finding", "describe", |args| {
            Ok(format!(
                "{}|{}|{}|{}|{}",
                args.cell_value,
                args.column,
                args.row.len(),
                args.mapping.destination_field,
                args.options.target_table
            ))
        });
        let resolver = FieldResolver::new(&lookups, &lookups, &registry);
        let mapping = FieldMapping {
            script_extension: Some("finding.describe".to_string()),
            ..FieldMapping::new("Host", "cmdb_ci", ProcessKind::Dynamic)
        };

        let value = resolver
            .resolve(&mapping, &row(&[("Host", "web01"), ("Port", "80")]), "Host", &mut ctx(""))
            .unwrap();
        assert_eq!(value, "web01|Host|2|cmdb_ci|findings");
    }

    #[test]
    fn test_dynamic_unresolvable_identifier_degrades() {
        let lookups = Lookups::default();
        let registry = ExtensionRegistry::with_builtins();
        let resolver = FieldResolver::new(&lookups, &lookups, &registry);
        let mut ctx = ctx("");

        for identifier in ["nodot", "missing.function", "text.missing"] {
            let mapping = FieldMapping {
                script_extension: Some(identifier.to_string()),
                ..FieldMapping::new("Host", "cmdb_ci", ProcessKind::Dynamic)
            };
            let value = resolver
                .resolve(&mapping, &row(&[("Host", "web01")]), "Host", &mut ctx)
                .unwrap();
            assert_eq!(value, "");
        }
        assert_eq!(ctx.run_log().len(), 3);
    }

    #[test]
    fn test_dynamic_failure_is_fatal() {
        let lookups = Lookups::default();
        let mut registry = ExtensionRegistry::new();
        registry.register("finding", "explode", |_| {
            Err(ExtensionError::ExecutionError("boom".to_string()))
        });
        let resolver = FieldResolver::new(&lookups, &lookups, &registry);
        let mapping = FieldMapping {
            script_extension: Some("finding.explode".to_string()),
            ..FieldMapping::new("Host", "cmdb_ci", ProcessKind::Dynamic)
        };

        let result = resolver.resolve(&mapping, &row(&[("Host", "web01")]), "Host", &mut ctx(""));
        assert!(matches!(result, Err(ImportError::Extension { .. })));
    }
}
