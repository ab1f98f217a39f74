//! Page parsing behind a stable seam.
//!
//! Fetching and parsing are decoupled: the fetch pipeline hands over HTML, a
//! [`Parser`] turns it into a flat JSON record. When a site changes its markup
//! the parser raises [`Error::Selector`], naming the missing field and the
//! selector set version, so breakage is visible as its own error kind instead
//! of as empty data.
//!
//! ### Selector sets
//! - [`SelectorSet`] is a versioned list of named CSS selectors.
//! - Each field reads element text or one attribute, first match or all matches.
//! - Required fields must match at least once.

use schemars::JsonSchema;
use scraper::{ElementRef, Html, Selector};
use scrapegate_core::Error;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Parsed page: field name to value.
pub type Record = Map<String, Value>;

/// Stable parser trait for page extraction.
///
/// This allows swapping the parsing engine without changing route code.
pub trait Parser: Send + Sync {
    /// Parse `html` fetched for `site`.
    fn parse(&self, html: &str, site: &str) -> Result<Record, Error>;
}

/// One named field of a [`SelectorSet`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FieldSelector {
    /// Key in the output record
    pub name: String,
    /// CSS selector
    pub selector: String,
    /// Attribute to read instead of the element text
    #[serde(default)]
    pub attr: Option<String>,
    /// Collect every match into an array
    #[serde(default)]
    pub many: bool,
    /// Fail with SELECTOR_MISSING when nothing matches (default: true)
    #[serde(default = "default_required")]
    pub required: bool,
}

fn default_required() -> bool {
    true
}

/// Versioned collection of field selectors for one page layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SelectorSet {
    /// Layout version reported in selector errors
    #[serde(default = "default_version")]
    pub version: String,
    pub fields: Vec<FieldSelector>,
}

fn default_version() -> String {
    "v1".to_string()
}

/// CSS-selector based [`Parser`].
#[derive(Debug)]
pub struct SelectorParser {
    version: String,
    fields: Vec<(FieldSelector, Selector)>,
}

impl SelectorParser {
    /// Compile every selector in `set`.
    pub fn new(set: SelectorSet) -> Result<Self, Error> {
        if set.fields.is_empty() {
            return Err(Error::InvalidInput("selector set has no fields".to_string()));
        }

        let fields = set
            .fields
            .into_iter()
            .map(|field| {
                let compiled = Selector::parse(&field.selector)
                    .map_err(|e| Error::InvalidInput(format!("invalid selector for {}: {}", field.name, e)))?;
                Ok((field, compiled))
            })
            .collect::<Result<Vec<_>, Error>>()?;

        Ok(Self { version: set.version, fields })
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    fn missing(&self, field: &FieldSelector, site: &str) -> Error {
        tracing::warn!(
            site, field = %field.name, selector = %field.selector, version = %self.version,
            "selector matched nothing"
        );
        Error::Selector { selector: field.name.clone(), version: self.version.clone(), site: site.to_string() }
    }
}

impl Parser for SelectorParser {
    fn parse(&self, html: &str, site: &str) -> Result<Record, Error> {
        let document = Html::parse_document(html);
        let mut record = Record::new();

        for (field, selector) in &self.fields {
            let values: Vec<String> = document
                .select(selector)
                .filter_map(|el| read_value(el, field.attr.as_deref()))
                .collect();

            if values.is_empty() && field.required {
                return Err(self.missing(field, site));
            }

            let value = if field.many {
                Value::Array(values.into_iter().map(Value::String).collect())
            } else {
                values.into_iter().next().map(Value::String).unwrap_or(Value::Null)
            };
            record.insert(field.name.clone(), value);
        }

        Ok(record)
    }
}

/// Attribute value, or whitespace-collapsed text; empty text counts as no match.
fn read_value(element: ElementRef<'_>, attr: Option<&str>) -> Option<String> {
    match attr {
        Some(attr) => element.value().attr(attr).map(|v| v.trim().to_string()),
        None => {
            let text = element.text().flat_map(str::split_whitespace).collect::<Vec<_>>().join(" ");
            (!text.is_empty()).then_some(text)
        }
    }
}
