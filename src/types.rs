use std::fmt;
use std::marker::PhantomData;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Language-keyed map that serializes as a JSON object in insertion order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageMap<T>(Vec<(String, T)>);

impl<T> LanguageMap<T> {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Insert or replace the entry for `language`, keeping its first position.
    pub fn insert(&mut self, language: impl Into<String>, value: T) {
        let language = language.into();
        match self.0.iter_mut().find(|(key, _)| *key == language) {
            Some(entry) => entry.1 = value,
            None => self.0.push((language, value)),
        }
    }

    #[cfg(test)]
    pub fn get(&self, language: &str) -> Option<&T> {
        self.0
            .iter()
            .find(|(key, _)| key == language)
            .map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[cfg(test)]
    pub fn iter(&self) -> impl Iterator<Item = (&str, &T)> {
        self.0.iter().map(|(key, value)| (key.as_str(), value))
    }
}

impl<T> Default for LanguageMap<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> FromIterator<(String, T)> for LanguageMap<T> {
    fn from_iter<I: IntoIterator<Item = (String, T)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (language, value) in iter {
            map.insert(language, value);
        }
        map
    }
}

impl<T> IntoIterator for LanguageMap<T> {
    type Item = (String, T);
    type IntoIter = std::vec::IntoIter<(String, T)>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<T: Serialize> Serialize for LanguageMap<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (language, value) in &self.0 {
            map.serialize_entry(language, value)?;
        }
        map.end()
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for LanguageMap<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct LanguageMapVisitor<T>(PhantomData<T>);

        impl<'de, T: Deserialize<'de>> Visitor<'de> for LanguageMapVisitor<T> {
            type Value = LanguageMap<T>;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a map keyed by language")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut map = LanguageMap::new();
                while let Some((language, value)) = access.next_entry::<String, T>()? {
                    map.insert(language, value);
                }
                Ok(map)
            }
        }

        deserializer.deserialize_map(LanguageMapVisitor(PhantomData))
    }
}

/// Which engine produced the extracted text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionSource {
    Remote,
    Fallback,
}

/// Recognized prescription text. The text itself is opaque.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    pub text: String,
    pub source: ExtractionSource,
}

/// Per-language translation outcome. A failed language still has an entry
/// in `translations` (empty string) and its reason in `errors`.
#[derive(Debug, Clone, Default)]
pub struct TranslationBatch {
    pub translations: LanguageMap<String>,
    pub errors: LanguageMap<String>,
}

/// Response of `POST /upload`.
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub original_text: String,
    pub translations: LanguageMap<String>,
    pub extraction_source: ExtractionSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_filename: Option<String>,
    #[serde(skip_serializing_if = "LanguageMap::is_empty")]
    pub translation_errors: LanguageMap<String>,
}

/// Response of `POST /translate`: one single-key object per language.
#[derive(Debug, Serialize)]
pub struct SlotTranslateResponse {
    pub original: String,
    pub translations: Vec<LanguageMap<String>>,
    #[serde(skip_serializing_if = "LanguageMap::is_empty")]
    pub translation_errors: LanguageMap<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MedicineTranslation {
    pub medicine_name: String,
    pub dosage: String,
}

/// A medicine entry held in a session. Unknown fields are kept verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MedicineRecord {
    #[serde(default)]
    pub medicine_name: String,
    #[serde(default)]
    pub dosage: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translations: Option<LanguageMap<MedicineTranslation>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translation_errors: Option<LanguageMap<String>>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[cfg(test)]
impl MedicineRecord {
    pub fn new(medicine_name: impl Into<String>, dosage: impl Into<String>) -> Self {
        Self {
            medicine_name: medicine_name.into(),
            dosage: dosage.into(),
            translations: None,
            translation_errors: None,
            extra: serde_json::Map::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SessionExtractRequest {
    pub session_id: String,
    pub languages: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionMedicines {
    pub session_id: String,
    pub medicines: Vec<MedicineRecord>,
}

#[derive(Debug, Deserialize)]
pub struct SessionPutRequest {
    pub medicines: Vec<MedicineRecord>,
}
