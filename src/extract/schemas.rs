//! Built-in extraction schemas and the schema catalog.

use std::str::FromStr;

use crate::models::{FieldSchema, FieldSpec, SchemaError};

/// Schema name for passports.
pub const PASSPORT: &str = "passport";
/// Schema name for driver's licences.
pub const DRIVERS_LICENCE: &str = "drivers-licence";
/// Schema name for the document-type classification step.
pub const DOCUMENT_TYPE: &str = "document-type";

const KYC_CONTEXT: &str = "You are working with a financial services industry (FSI) enterprise account for their know your customer (KYC) process.";

/// Appended to instructions that do not embed `{response_pattern}` themselves.
const PATTERN_SUFFIX: &str = "Provide your answer as a JSON object in the following format: {response_pattern}. Use null for any field you cannot find. Disregard all other information not in the response pattern.";

/// Schema for deciding whether a document is a passport or a driver's licence.
pub fn document_type_schema() -> FieldSchema {
    FieldSchema {
        name: DOCUMENT_TYPE.to_string(),
        system_prompt: format!(
            "{} You will be given Identity Verification documents and must determine if it is an American drivers licence or passport.",
            KYC_CONTEXT
        ),
        instruction: "Is this Identity Verification document a drivers licence or passport? Return your response as a JSON object in the following format: {response_pattern}".to_string(),
        fields: vec![
            FieldSpec::new("document_type", "passport or drivers_licence", "passport or drivers_licence"),
            FieldSpec::new(
                "state",
                "if a drivers licence, the issuing state, otherwise null",
                "if drivers licence, the state it's from, otherwise null",
            ),
        ],
    }
}

/// Schema for travel passports.
pub fn passport_schema() -> FieldSchema {
    FieldSchema {
        name: PASSPORT.to_string(),
        system_prompt: format!(
            "{} You will be given Identity Verification documents in the form of travel Passports and must extract information such as name and date of birth (DOB) of the customer.",
            KYC_CONTEXT
        ),
        instruction: "What is the surname or last name (LN), given first name (FN) which may contain two first names such as Janice Ann or John Q, nationality, place of birth (POB), date of birth (DOB), and date of expiration (EXP) provided by the user? The date of birth and expiration must be in a numerical format such as 01/01/2020. Provide your answer as a JSON object in the following format: {response_pattern}. Use null for any field you cannot find. Disregard all other information not in the response pattern.".to_string(),
        fields: vec![
            FieldSpec::new("LN", "surname / last name", "Doe"),
            FieldSpec::new("FN", "given first name(s)", "John"),
            FieldSpec::new("NATIONALITY", "nationality", "USA"),
            FieldSpec::new("POB", "place of birth", "CALIFORNIA"),
            FieldSpec::new("EXP", "date of expiration", "01/01/2020"),
            FieldSpec::new("DOB", "date of birth", "01/01/2020"),
        ],
    }
}

/// Schema for driver's licences.
pub fn drivers_licence_schema() -> FieldSchema {
    FieldSchema {
        name: DRIVERS_LICENCE.to_string(),
        system_prompt: format!(
            "{} You will be given Identity Verification documents such as Passports & Drivers license and must extract information such as drivers licence number, name, and date of birth (DOB).",
            KYC_CONTEXT
        ),
        instruction: "What is the drivers licence (DL) number denoted by the number 1, expiration date (EXP), last name (LN), first name (FN) which may contain two first names such as Janice Ann or John Q, and date of birth (DOB) provided by the user? Provide your answer as a JSON object in the following format: {response_pattern}. Use null for any field you cannot find. Disregard all other information not in the response pattern.".to_string(),
        fields: vec![
            FieldSpec::new("DL", "drivers licence number", "abcd12345"),
            FieldSpec::new("EXP", "expiration date", "01/01/2020"),
            FieldSpec::new("FN", "first name(s)", "John"),
            FieldSpec::new("LN", "last name", "Doe"),
            FieldSpec::new("DOB", "date of birth", "01/01/2020"),
        ],
    }
}

/// Render the user instruction with the schema's response pattern filled in.
pub fn render_instruction(schema: &FieldSchema) -> String {
    let pattern = schema.response_pattern();
    let instruction = if schema.instruction.trim().is_empty() {
        let described: Vec<String> = schema
            .fields
            .iter()
            .map(|f| {
                if f.description.is_empty() {
                    f.name.clone()
                } else {
                    format!("{} ({})", f.description, f.name)
                }
            })
            .collect();
        format!(
            "Extract the following fields from this document: {}. {}",
            described.join(", "),
            PATTERN_SUFFIX
        )
    } else if schema.instruction.contains("{response_pattern}") {
        schema.instruction.clone()
    } else {
        format!("{} {}", schema.instruction.trim_end(), PATTERN_SUFFIX)
    };
    instruction.replace("{response_pattern}", &pattern)
}

/// How the extraction schema is chosen for a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaSelection {
    /// Classify the document first, then use the matching built-in schema.
    Auto,
    /// Use the named schema.
    Named(String),
}

impl FromStr for SchemaSelection {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("auto") {
            Ok(SchemaSelection::Auto)
        } else {
            Ok(SchemaSelection::Named(trimmed.to_string()))
        }
    }
}

impl std::fmt::Display for SchemaSelection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchemaSelection::Auto => write!(f, "auto"),
            SchemaSelection::Named(name) => write!(f, "{}", name),
        }
    }
}

/// Named schemas available to the CLI and web form.
#[derive(Debug, Clone)]
pub struct SchemaCatalog {
    schemas: Vec<FieldSchema>,
}

impl Default for SchemaCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl SchemaCatalog {
    /// The built-in passport, driver's licence and document-type schemas.
    pub fn builtin() -> Self {
        Self {
            schemas: vec![
                passport_schema(),
                drivers_licence_schema(),
                document_type_schema(),
            ],
        }
    }

    /// Built-ins plus custom schemas. A custom schema replaces a built-in of the same name.
    pub fn with_custom(custom: Vec<FieldSchema>) -> Result<Self, SchemaError> {
        let mut catalog = Self::builtin();
        for schema in custom {
            schema.validate()?;
            let key = normalize_name(&schema.name);
            match catalog
                .schemas
                .iter_mut()
                .find(|s| normalize_name(&s.name) == key)
            {
                Some(existing) => *existing = schema,
                None => catalog.schemas.push(schema),
            }
        }
        Ok(catalog)
    }

    /// Look up a schema by name, ignoring case and `_`/`-` differences.
    pub fn get(&self, name: &str) -> Result<&FieldSchema, SchemaError> {
        let key = normalize_name(name);
        let key = match key.as_str() {
            "drivers-license" | "driver-licence" | "driver-license" | "licence" | "license" => {
                DRIVERS_LICENCE.to_string()
            }
            _ => key,
        };
        self.schemas
            .iter()
            .find(|s| normalize_name(&s.name) == key)
            .ok_or_else(|| SchemaError::Unknown(name.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldSchema> {
        self.schemas.iter()
    }

    /// Schemas meant for field extraction (excludes the classification step).
    pub fn extraction_schemas(&self) -> impl Iterator<Item = &FieldSchema> {
        self.schemas.iter().filter(|s| s.name != DOCUMENT_TYPE)
    }
}

fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase().replace('_', "-")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_schemas_are_valid() {
        for schema in SchemaCatalog::builtin().iter() {
            schema.validate().unwrap();
        }
    }

    #[test]
    fn test_lookup_aliases() {
        let catalog = SchemaCatalog::builtin();
        assert_eq!(catalog.get("passport").unwrap().name, PASSPORT);
        assert_eq!(catalog.get("Drivers_Licence").unwrap().name, DRIVERS_LICENCE);
        assert_eq!(catalog.get("drivers-license").unwrap().name, DRIVERS_LICENCE);
        assert!(matches!(catalog.get("visa"), Err(SchemaError::Unknown(_))));
    }

    #[test]
    fn test_extraction_schemas_skip_classifier() {
        let names: Vec<_> = SchemaCatalog::builtin()
            .extraction_schemas()
            .map(|s| s.name.clone())
            .collect();
        assert_eq!(names, vec![PASSPORT, DRIVERS_LICENCE]);
    }

    #[test]
    fn test_custom_schema_overrides_and_appends() {
        let mut passport = passport_schema();
        passport.fields.truncate(2);
        let visa = FieldSchema {
            name: "visa".to_string(),
            system_prompt: String::new(),
            instruction: String::new(),
            fields: vec![FieldSpec::new("VISA_NO", "visa number", "X123")],
        };

        let catalog = SchemaCatalog::with_custom(vec![passport, visa]).unwrap();
        assert_eq!(catalog.get(PASSPORT).unwrap().len(), 2);
        assert_eq!(catalog.get("visa").unwrap().len(), 1);
        assert_eq!(catalog.iter().count(), 4);
    }

    #[test]
    fn test_custom_schema_is_validated() {
        let broken = FieldSchema {
            name: "broken".to_string(),
            system_prompt: String::new(),
            instruction: String::new(),
            fields: Vec::new(),
        };
        assert!(SchemaCatalog::with_custom(vec![broken]).is_err());
    }

    #[test]
    fn test_render_instruction_fills_pattern() {
        let text = render_instruction(&passport_schema());
        assert!(text.contains(r#""LN": "Doe""#));
        assert!(!text.contains("{response_pattern}"));
    }

    #[test]
    fn test_render_instruction_without_template() {
        let schema = FieldSchema {
            name: "visa".to_string(),
            system_prompt: String::new(),
            instruction: String::new(),
            fields: vec![FieldSpec::new("VISA_NO", "visa number", "X123")],
        };
        let text = render_instruction(&schema);
        assert!(text.starts_with("Extract the following fields from this document: visa number (VISA_NO)."));
        assert!(text.contains(r#"{"VISA_NO": "X123"}"#));
    }

    #[test]
    fn test_schema_selection_parse() {
        assert_eq!("auto".parse::<SchemaSelection>().unwrap(), SchemaSelection::Auto);
        assert_eq!("".parse::<SchemaSelection>().unwrap(), SchemaSelection::Auto);
        assert_eq!(
            "passport".parse::<SchemaSelection>().unwrap(),
            SchemaSelection::Named("passport".to_string())
        );
    }
}
