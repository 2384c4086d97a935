//! Per-row string templates.
//!
//! `{}` is replaced by the record number, `{{title}}` by the row's value in
//! column `title`.

use crate::models::ConfigError;
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Record,
    Field(String),
}

/// A parsed template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    source: String,
    segments: Vec<Segment>,
}

fn token_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\{\{([^{}]*)\}\}|\{\}").expect("token pattern is valid"))
}

impl Template {
    pub fn parse(source: &str) -> Self {
        let mut segments = Vec::new();
        let mut last = 0;

        for cap in token_pattern().captures_iter(source) {
            let Some(whole) = cap.get(0) else { continue };
            if whole.start() > last {
                segments.push(Segment::Literal(source[last..whole.start()].to_string()));
            }
            match cap.get(1) {
                Some(field) => segments.push(Segment::Field(field.as_str().trim().to_string())),
                None => segments.push(Segment::Record),
            }
            last = whole.end();
        }
        if last < source.len() {
            segments.push(Segment::Literal(source[last..].to_string()));
        }

        Self {
            source: source.to_string(),
            segments,
        }
    }

    /// Column titles referenced by `{{title}}` tokens.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Field(name) => Some(name.as_str()),
            _ => None,
        })
    }

    /// Fail when a referenced column is not in `header`.
    pub fn check_columns(&self, header: &[String]) -> Result<(), ConfigError> {
        for column in self.columns() {
            if !header.iter().any(|h| h == column) {
                return Err(ConfigError::UnknownTemplateColumn {
                    template: self.source.clone(),
                    column: column.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Render for one row.
    pub fn render(&self, record: usize, fields: &HashMap<&str, &str>) -> String {
        let mut out = String::with_capacity(self.source.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Record => out.push_str(&record.to_string()),
                Segment::Field(name) => {
                    out.push_str(fields.get(name.as_str()).copied().unwrap_or(""))
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_substitution() {
        let template = Template::parse("{}.png");
        assert_eq!(template.render(7, &HashMap::new()), "7.png");
    }

    #[test]
    fn test_field_substitution() {
        let template = Template::parse("{{ first }}-{{last}}_{}.jpg");
        let fields = HashMap::from([("first", "Ada"), ("last", "Lovelace")]);
        assert_eq!(template.render(3, &fields), "Ada-Lovelace_3.jpg");
        assert_eq!(template.columns().collect::<Vec<_>>(), vec!["first", "last"]);
    }

    #[test]
    fn test_plain_text_and_stray_braces() {
        let template = Template::parse("Gift {for} you");
        assert_eq!(template.render(0, &HashMap::new()), "Gift {for} you");
    }

    #[test]
    fn test_check_columns() {
        let header = vec!["name".to_string()];
        Template::parse("{{name}}").check_columns(&header).unwrap();
        assert!(matches!(
            Template::parse("{{email}}").check_columns(&header),
            Err(ConfigError::UnknownTemplateColumn { .. })
        ));
    }
}
