use std::collections::HashMap;
use std::time::Instant;

use axum::extract::multipart::{Multipart, MultipartRejection};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::{info, warn};

use crate::error::ApiError;
use crate::languages::LanguageList;
use crate::prescription::PrescriptionImage;
use crate::state::AppState;
use crate::types::{
    LanguageMap, SessionExtractRequest, SessionMedicines, SessionPutRequest,
    SlotTranslateResponse, UploadResponse,
};

/// Form field names accepted for the prescription photo.
const IMAGE_FIELDS: [&str; 2] = ["image", "file"];

/// Fixed language slots of `POST /translate`.
const LANGUAGE_SLOTS: [&str; 3] = ["lang1", "lang2", "lang3"];

/// Parsed multipart body: the image plus every text field by name.
struct UploadForm {
    image: Option<PrescriptionImage>,
    fields: HashMap<String, Vec<String>>,
}

impl UploadForm {
    fn values(&self, name: &str) -> &[String] {
        self.fields.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    fn first(&self, name: &str) -> Option<String> {
        self.values(name).first().cloned()
    }
}

async fn read_upload_form(mut multipart: Multipart) -> Result<UploadForm, ApiError> {
    let mut image = None;
    let mut fields: HashMap<String, Vec<String>> = HashMap::new();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or("").to_string();
        if IMAGE_FIELDS.contains(&name.as_str()) {
            let content_type = field.content_type().map(str::to_string);
            let file_name = field.file_name().map(str::to_string);
            let bytes = field.bytes().await?;
            if !bytes.is_empty() {
                image = Some(PrescriptionImage::new(
                    bytes.to_vec(),
                    content_type.as_deref(),
                    file_name.as_deref(),
                ));
            }
        } else {
            let text = field.text().await?;
            fields.entry(name).or_default().push(text);
        }
    }

    Ok(UploadForm { image, fields })
}

/// Copy the upload into the served directory when persistence is on.
/// Failure here is logged and never fails the request.
async fn persist_upload(state: &AppState, image: &PrescriptionImage) -> Option<String> {
    if !state.uploads.persists() {
        return None;
    }
    match state.uploads.save(image).await {
        Ok(filename) => Some(filename),
        Err(e) => {
            warn!("Could not persist upload: {}", e);
            None
        }
    }
}

/// `POST /upload`: multipart `image` + `languages` (JSON array).
pub async fn upload(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, ApiError> {
    let start = Instant::now();
    let form = read_upload_form(multipart?).await?;
    let image = form.image.clone().ok_or_else(ApiError::no_image)?;
    let languages = LanguageList::from_form_values(
        form.values("languages"),
        state.config.system_config.max_languages,
    )?;

    info!(
        "Upload: {} bytes ({}), {} languages",
        image.bytes.len(),
        image.mime_type,
        languages.len()
    );

    let extraction = state.prescriptions.extract(&image).await?;
    let batch = state
        .prescriptions
        .translate_all(&extraction.text, &languages)
        .await;
    let image_filename = persist_upload(&state, &image).await;

    info!(
        "Upload completed in {:.2}s: source={:?}, {} translated, {} failed",
        start.elapsed().as_secs_f64(),
        extraction.source,
        batch.translations.len() - batch.errors.len(),
        batch.errors.len()
    );

    Ok(Json(UploadResponse {
        original_text: extraction.text,
        translations: batch.translations,
        extraction_source: extraction.source,
        image_filename,
        translation_errors: batch.errors,
    }))
}

/// `POST /translate`: multipart `file` + `lang1` (required), `lang2`, `lang3`.
pub async fn translate_slots(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<SlotTranslateResponse>, ApiError> {
    let form = read_upload_form(multipart?).await?;
    let image = form.image.clone().ok_or_else(ApiError::no_image)?;

    let slots: Vec<Option<String>> = LANGUAGE_SLOTS.iter().map(|slot| form.first(slot)).collect();
    if slots[0].as_deref().map_or(true, |lang| lang.trim().is_empty()) {
        return Err(ApiError::invalid_languages());
    }
    let languages = LanguageList::from_slots(&slots)?;

    info!("Translate: {} bytes, languages {:?}", image.bytes.len(), slots);

    let extraction = state.prescriptions.extract(&image).await?;
    let batch = state
        .prescriptions
        .translate_all(&extraction.text, &languages)
        .await;

    let translations = batch
        .translations
        .into_iter()
        .map(|entry| std::iter::once(entry).collect::<LanguageMap<String>>())
        .collect();

    Ok(Json(SlotTranslateResponse {
        original: extraction.text,
        translations,
        translation_errors: batch.errors,
    }))
}

/// `POST /session/extract`: translate the medicines stored for a session.
/// An unknown session id yields an empty list. Translations are written back
/// only if the session was not changed in the meantime.
pub async fn session_extract(
    State(state): State<AppState>,
    payload: Result<Json<SessionExtractRequest>, JsonRejection>,
) -> Result<Json<SessionMedicines>, ApiError> {
    let Json(request) = payload?;
    let languages = LanguageList::new(
        request.languages,
        state.config.system_config.max_languages,
    )?;

    let medicines = state
        .sessions
        .get(&request.session_id)
        .await
        .unwrap_or_default();
    if medicines.is_empty() {
        info!("Session {} has no medicines", request.session_id);
        return Ok(Json(SessionMedicines {
            session_id: request.session_id,
            medicines,
        }));
    }

    info!(
        "Session {}: translating {} medicines into {} languages",
        request.session_id,
        medicines.len(),
        languages.len()
    );
    let snapshot = medicines.clone();
    let translated = state
        .prescriptions
        .translate_medicines(medicines, &languages)
        .await;

    // The session may have been replaced or deleted while translating; that
    // change wins and is what the caller gets back.
    let medicines = if state
        .sessions
        .replace_if_unchanged(&request.session_id, &snapshot, translated.clone())
        .await
    {
        translated
    } else {
        warn!(
            "Session {} changed during translation, keeping the newer medicines",
            request.session_id
        );
        state
            .sessions
            .get(&request.session_id)
            .await
            .unwrap_or_default()
    };

    Ok(Json(SessionMedicines {
        session_id: request.session_id,
        medicines,
    }))
}

/// `GET /session/{session_id}`
pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Json<SessionMedicines> {
    let medicines = state.sessions.get(&session_id).await.unwrap_or_default();
    Json(SessionMedicines {
        session_id,
        medicines,
    })
}

/// `PUT /session/{session_id}`: replace the stored medicine list.
pub async fn put_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    payload: Result<Json<SessionPutRequest>, JsonRejection>,
) -> Result<Json<SessionMedicines>, ApiError> {
    let Json(request) = payload?;
    info!(
        "Session {}: storing {} medicines",
        session_id,
        request.medicines.len()
    );
    state
        .sessions
        .put(&session_id, request.medicines.clone())
        .await;
    Ok(Json(SessionMedicines {
        session_id,
        medicines: request.medicines,
    }))
}

/// `DELETE /session/{session_id}`
pub async fn delete_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.sessions.delete(&session_id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("Session not found: {}", session_id)))
    }
}

/// `GET /image/{filename}`
pub async fn get_image(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Response, ApiError> {
    let stored = state.uploads.read(&filename).await?;
    Ok((
        [(header::CONTENT_TYPE, stored.mime_type)],
        stored.bytes,
    )
        .into_response())
}
