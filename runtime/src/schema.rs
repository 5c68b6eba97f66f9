//! Schema-checked response parsing.
//!
//! A [`SchemaParser`] turns a raw response payload into the value a success
//! handler wants, in three steps:
//!
//! 1. **Validate** the payload against a JSON Schema. Any violation stops here
//!    with [`ParseError::SchemaValidation`].
//! 2. **Filter** out top-level properties the schema does not declare. Only
//!    the top level is pruned; undeclared keys inside retained objects stay.
//! 3. **Transform** the filtered payload with a caller-supplied function
//!    (identity by default). A failing transform yields
//!    [`ParseError::Transform`] carrying the cause, the original payload and
//!    the transform's name.
//!
//! # Example
//!
//! ```
//! use datalayer_runtime::schema::{make_json_schema_parser, ParserOptions};
//! use serde_json::json;
//!
//! let schema = json!({
//!     "type": "object",
//!     "required": ["ID"],
//!     "properties": { "ID": { "type": "integer" }, "name": { "type": "string" } }
//! });
//!
//! let parser = make_json_schema_parser(&schema, ParserOptions::default(), |post| {
//!     Ok(post["ID"].as_i64().unwrap_or_default())
//! })?;
//!
//! assert_eq!(parser.parse(json!({ "ID": 7, "name": "a", "junk": true }))?, 7);
//! assert!(parser.parse(json!({ "name": "no id" })).is_err());
//! # Ok::<(), datalayer_runtime::schema::ParseError>(())
//! ```

use crate::metrics::ParserMetrics;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;

/// Boxed cause of a transform failure.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

type TransformFn<T> = Box<dyn Fn(Value) -> anyhow::Result<T> + Send + Sync>;

/// Errors produced while building or running a parser.
#[derive(Error, Debug)]
pub enum ParseError {
    /// The schema itself could not be compiled.
    #[error("Invalid JSON schema: {message}")]
    InvalidSchema {
        /// Compiler message
        message: String,
    },

    /// The payload does not match the schema.
    #[error("Payload failed schema validation ({} violation(s))", errors.len())]
    SchemaValidation {
        /// Every violation the validator reported
        errors: Vec<SchemaViolation>,
    },

    /// The transform rejected an already-validated payload.
    #[error("Transform `{transformer}` failed: {cause}")]
    Transform {
        /// What the transform returned
        #[source]
        cause: BoxError,
        /// The payload handed to the parser
        data: Value,
        /// Which transform failed
        transformer: &'static str,
    },
}

impl ParseError {
    /// Short label for logs and metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::InvalidSchema { .. } => "invalid_schema",
            Self::SchemaValidation { .. } => "schema_validation",
            Self::Transform { .. } => "transform",
        }
    }
}

/// One validator-reported problem.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchemaViolation {
    /// JSON pointer to the offending value (`""` is the root)
    pub instance_path: String,
    /// Human readable description
    pub message: String,
    /// Location of the failing keyword in the schema (verbose only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_path: Option<String>,
    /// The offending value (verbose only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

/// Validator settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParserOptions {
    /// Report every violation instead of stopping at the first one
    pub greedy: bool,
    /// Attach schema path and offending value to each violation
    pub verbose: bool,
    /// Enforce the `format` keyword
    pub validate_formats: bool,
}

impl ParserOptions {
    /// Defaults: first violation only, verbose reports, formats not enforced.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            greedy: false,
            verbose: true,
            validate_formats: false,
        }
    }

    /// Set greedy reporting
    #[must_use]
    pub const fn with_greedy(mut self, greedy: bool) -> Self {
        self.greedy = greedy;
        self
    }

    /// Set verbose reporting
    #[must_use]
    pub const fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Set `format` enforcement
    #[must_use]
    pub const fn with_validate_formats(mut self, validate_formats: bool) -> Self {
        self.validate_formats = validate_formats;
        self
    }
}

impl Default for ParserOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// Validate, filter, transform.
pub struct SchemaParser<T = Value> {
    validator: jsonschema::Validator,
    declared: Option<BTreeSet<String>>,
    options: ParserOptions,
    transform: TransformFn<T>,
    transformer: &'static str,
}

impl SchemaParser<Value> {
    /// Parser with default options and the identity transform.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::InvalidSchema`] if `schema` does not compile.
    pub fn new(schema: &Value) -> Result<Self, ParseError> {
        Self::with_options(schema, ParserOptions::default())
    }

    /// Parser with explicit options and the identity transform.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::InvalidSchema`] if `schema` does not compile.
    pub fn with_options(schema: &Value, options: ParserOptions) -> Result<Self, ParseError> {
        let validator = jsonschema::options()
            .should_validate_formats(options.validate_formats)
            .build(schema)
            .map_err(|e| ParseError::InvalidSchema {
                message: e.to_string(),
            })?;

        Ok(Self {
            validator,
            declared: declared_properties(schema),
            options,
            transform: Box::new(Ok::<Value, anyhow::Error>),
            transformer: "identity",
        })
    }
}

impl<T> SchemaParser<T> {
    /// Replace the transform. Its type name becomes the transformer name.
    #[must_use]
    pub fn with_transform<U, F>(self, transform: F) -> SchemaParser<U>
    where
        F: Fn(Value) -> anyhow::Result<U> + Send + Sync + 'static,
    {
        SchemaParser {
            validator: self.validator,
            declared: self.declared,
            options: self.options,
            transform: Box::new(transform),
            transformer: std::any::type_name::<F>(),
        }
    }

    /// Override the name reported in [`ParseError::Transform`].
    #[must_use]
    pub fn named(mut self, transformer: &'static str) -> Self {
        self.transformer = transformer;
        self
    }

    /// Name reported when the transform fails.
    #[must_use]
    pub const fn transformer(&self) -> &'static str {
        self.transformer
    }

    /// Options in effect.
    #[must_use]
    pub const fn options(&self) -> ParserOptions {
        self.options
    }

    /// Check `payload` against the schema.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::SchemaValidation`] listing the violations: the
    /// first one, or all of them when the parser is greedy.
    pub fn validate(&self, payload: &Value) -> Result<(), ParseError> {
        let errors: Vec<SchemaViolation> = if self.options.greedy {
            self.validator
                .iter_errors(payload)
                .map(|error| self.violation(&error, payload))
                .collect()
        } else {
            match self.validator.validate(payload) {
                Ok(()) => Vec::new(),
                Err(error) => vec![self.violation(&error, payload)],
            }
        };

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ParseError::SchemaValidation { errors })
        }
    }

    /// Drop top-level properties the schema does not declare.
    ///
    /// Payloads that are not objects, and schemas without a top-level
    /// `properties` map, pass through untouched.
    #[must_use]
    pub fn filter(&self, payload: Value) -> Value {
        match (payload, &self.declared) {
            (Value::Object(map), Some(declared)) => Value::Object(
                map.into_iter()
                    .filter(|(key, _)| declared.contains(key))
                    .collect(),
            ),
            (other, _) => other,
        }
    }

    /// Run the full pipeline.
    ///
    /// # Errors
    ///
    /// [`ParseError::SchemaValidation`] when validation fails (the transform
    /// never runs), [`ParseError::Transform`] when the transform fails.
    pub fn parse(&self, payload: Value) -> Result<T, ParseError> {
        let result = self.validate(&payload).and_then(|()| {
            let original = payload.clone();
            (self.transform)(self.filter(payload)).map_err(|cause| ParseError::Transform {
                cause: cause.into(),
                data: original,
                transformer: self.transformer,
            })
        });

        if let Err(error) = &result {
            ParserMetrics::record_failure(error.kind());
            tracing::debug!(
                kind = error.kind(),
                transformer = self.transformer,
                "Payload rejected by parser"
            );
        }
        result
    }

    fn violation(&self, error: &jsonschema::ValidationError<'_>, payload: &Value) -> SchemaViolation {
        let instance_path = error.instance_path().to_string();
        let (schema_path, value) = if self.options.verbose {
            (
                Some(error.schema_path().to_string()),
                payload.pointer(&instance_path).cloned(),
            )
        } else {
            (None, None)
        };

        SchemaViolation {
            instance_path,
            message: error.to_string(),
            schema_path,
            value,
        }
    }
}

impl<T> fmt::Debug for SchemaParser<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaParser")
            .field("declared", &self.declared)
            .field("options", &self.options)
            .field("transformer", &self.transformer)
            .finish_non_exhaustive()
    }
}

/// Build a parser from a schema, options and a transform.
///
/// # Errors
///
/// Returns [`ParseError::InvalidSchema`] if `schema` does not compile.
pub fn make_json_schema_parser<T, F>(
    schema: &Value,
    options: ParserOptions,
    transform: F,
) -> Result<SchemaParser<T>, ParseError>
where
    F: Fn(Value) -> anyhow::Result<T> + Send + Sync + 'static,
{
    Ok(SchemaParser::with_options(schema, options)?.with_transform(transform))
}

fn declared_properties(schema: &Value) -> Option<BTreeSet<String>> {
    schema
        .get("properties")
        .and_then(Value::as_object)
        .map(|properties| properties.keys().cloned().collect())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use serde_json::json;

    fn post_schema() -> Value {
        json!({
            "type": "object",
            "required": ["ID", "title"],
            "properties": {
                "ID": { "type": "integer" },
                "title": { "type": "string" },
                "author": {
                    "type": "object",
                    "properties": { "name": { "type": "string" } }
                }
            }
        })
    }

    #[test]
    fn keeps_declared_top_level_properties_only() {
        let parser = SchemaParser::new(&post_schema()).unwrap();
        let parsed = parser
            .parse(json!({
                "ID": 1,
                "title": "Hello",
                "author": { "name": "A", "avatar": "x.png" },
                "tracking": { "pixel": true }
            }))
            .unwrap();

        assert_eq!(
            parsed,
            json!({
                "ID": 1,
                "title": "Hello",
                "author": { "name": "A", "avatar": "x.png" }
            })
        );
    }

    #[test]
    fn schema_without_properties_passes_payload_through() {
        let parser = SchemaParser::new(&json!({ "type": "array" })).unwrap();
        assert_eq!(parser.parse(json!([1, 2])).unwrap(), json!([1, 2]));
    }

    #[test]
    fn validation_failure_skips_the_transform() {
        let parser = SchemaParser::new(&post_schema())
            .unwrap()
            .with_transform(|_| -> anyhow::Result<()> { anyhow::bail!("transform must not run") });

        let error = parser.parse(json!({ "ID": "one", "title": "x" })).unwrap_err();
        match error {
            ParseError::SchemaValidation { errors } => {
                assert_eq!(errors.len(), 1);
                assert_eq!(errors[0].instance_path, "/ID");
                assert_eq!(errors[0].value, Some(json!("one")));
                assert!(errors[0].schema_path.is_some());
            },
            other => panic!("expected schema validation error, got {other:?}"),
        }
    }

    #[test]
    fn greedy_reports_every_violation() {
        let options = ParserOptions::default().with_greedy(true).with_verbose(false);
        let parser = SchemaParser::with_options(&post_schema(), options).unwrap();

        let error = parser.parse(json!({ "ID": "one", "title": 2 })).unwrap_err();
        match error {
            ParseError::SchemaValidation { errors } => {
                assert_eq!(errors.len(), 2);
                assert!(errors.iter().all(|e| e.schema_path.is_none() && e.value.is_none()));
            },
            other => panic!("expected schema validation error, got {other:?}"),
        }
    }

    #[test]
    fn transform_failure_carries_input_and_name() {
        let parser = make_json_schema_parser(&post_schema(), ParserOptions::default(), |post| {
            if post["ID"] == json!(1) {
                anyhow::bail!("post 1 is reserved");
            }
            Ok(post["title"].clone())
        })
        .unwrap()
        .named("post_title");

        let input = json!({ "ID": 1, "title": "x", "extra": true });
        match parser.parse(input.clone()).unwrap_err() {
            ParseError::Transform {
                cause,
                data,
                transformer,
            } => {
                assert_eq!(cause.to_string(), "post 1 is reserved");
                assert_eq!(data, input);
                assert_eq!(transformer, "post_title");
            },
            other => panic!("expected transform error, got {other:?}"),
        }

        assert_eq!(parser.parse(json!({ "ID": 2, "title": "y" })).unwrap(), json!("y"));
    }

    #[test]
    fn transform_name_defaults_to_its_type() {
        fn to_unit(_: Value) -> anyhow::Result<()> {
            Ok(())
        }
        let parser = SchemaParser::new(&post_schema()).unwrap().with_transform(to_unit);
        assert!(parser.transformer().ends_with("to_unit"));
        assert_eq!(SchemaParser::new(&json!({})).unwrap().transformer(), "identity");
    }

    #[test]
    fn invalid_schema_is_rejected_up_front() {
        let result = SchemaParser::new(&json!({ "type": "not-a-type" }));
        assert!(matches!(result, Err(ParseError::InvalidSchema { .. })));
    }
}
