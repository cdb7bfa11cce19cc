//! Recognition language listing

use axum::Json;
use serde::Serialize;

use crate::service::SUPPORTED_LANGUAGES;

#[derive(Debug, Serialize)]
pub struct LanguageEntry {
    pub code: &'static str,
    pub name: &'static str,
}

#[derive(Debug, Serialize)]
pub struct LanguagesResponse {
    pub languages: Vec<LanguageEntry>,
}

/// GET /api/languages - Supported recognition languages
pub async fn list_languages() -> Json<LanguagesResponse> {
    let languages = SUPPORTED_LANGUAGES
        .iter()
        .map(|(code, name)| LanguageEntry { code, name })
        .collect();

    Json(LanguagesResponse { languages })
}
