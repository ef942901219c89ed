//! Target-language lists as received from clients.

use crate::error::ApiError;

/// Ordered, trimmed, de-duplicated list of target language names.
///
/// Language names are free-form ("French", "Tamil", "zh-TW"); nothing here
/// checks them against a catalogue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageList(Vec<String>);

impl LanguageList {
    /// Build from raw names. Blank names are dropped and repeats keep their
    /// first position. Fails if nothing is left or more than `max` remain.
    pub fn new<I>(raw: I, max: usize) -> Result<Self, ApiError>
    where
        I: IntoIterator<Item = String>,
    {
        let mut languages: Vec<String> = Vec::new();
        for language in raw {
            let language = language.trim();
            if language.is_empty() || languages.iter().any(|seen| seen == language) {
                continue;
            }
            languages.push(language.to_string());
        }

        if languages.is_empty() {
            return Err(ApiError::invalid_languages());
        }
        if languages.len() > max {
            return Err(ApiError::InvalidRequest(format!(
                "invalid languages: at most {} allowed, got {}",
                max,
                languages.len()
            )));
        }
        Ok(Self(languages))
    }

    /// Parse the `languages` form field.
    ///
    /// A single value must be a JSON array of strings. When the field is
    /// repeated each value is one language name, or a JSON array to expand.
    pub fn from_form_values(values: &[String], max: usize) -> Result<Self, ApiError> {
        match values {
            [] => Err(ApiError::invalid_languages()),
            [single] => Self::new(parse_json_list(single)?, max),
            many => {
                let mut raw = Vec::new();
                for value in many {
                    if value.trim_start().starts_with('[') {
                        raw.extend(parse_json_list(value)?);
                    } else {
                        raw.push(value.clone());
                    }
                }
                Self::new(raw, max)
            }
        }
    }

    /// Build from fixed form slots (`lang1`, `lang2`, ...). Absent or blank
    /// slots are skipped.
    pub fn from_slots(slots: &[Option<String>]) -> Result<Self, ApiError> {
        let raw = slots.iter().flatten().cloned();
        Self::new(raw, slots.len())
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

fn parse_json_list(value: &str) -> Result<Vec<String>, ApiError> {
    serde_json::from_str::<Vec<String>>(value).map_err(|_| ApiError::invalid_languages())
}
