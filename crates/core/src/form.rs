//! Submission draft and the request body derived from it.
//!
//! [`SubmissionForm`] is the mutable draft a user edits before submitting a
//! crawl. It has exactly one canonical default ([`SubmissionForm::default`]);
//! resetting a draft always restores that value, never a cached earlier one.
//! [`CrawlRequest`] is the shape the job runner validates on
//! `POST /crawler/run` and `POST /crawler/run-async`.

use serde::{Deserialize, Serialize};

use crate::types::{lenient_flag, null_as_default};

/// Media platform a crawl targets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Xhs,
    Dy,
    Ks,
    #[default]
    Bili,
    Wb,
    Tieba,
    Zhihu,
}

impl Platform {
    pub const ALL: [Platform; 7] = [
        Platform::Xhs,
        Platform::Dy,
        Platform::Ks,
        Platform::Bili,
        Platform::Wb,
        Platform::Tieba,
        Platform::Zhihu,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Platform::Xhs => "xhs",
            Platform::Dy => "dy",
            Platform::Ks => "ks",
            Platform::Bili => "bili",
            Platform::Wb => "wb",
            Platform::Tieba => "tieba",
            Platform::Zhihu => "zhihu",
        }
    }
}

/// How the crawler authenticates against the platform.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoginType {
    Qrcode,
    Phone,
    #[default]
    Cookie,
}

/// What the crawler collects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrawlType {
    /// Keyword search.
    #[default]
    Search,
    /// Specific posts by id or URL.
    Detail,
    /// Creator home pages.
    Creator,
}

/// Where the runner persists collected records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageTarget {
    #[default]
    Sqlite,
    Mysql,
}

impl StorageTarget {
    pub fn as_str(self) -> &'static str {
        match self {
            StorageTarget::Sqlite => "sqlite",
            StorageTarget::Mysql => "mysql",
        }
    }
}

/// Editable crawl parameters.
///
/// List-valued inputs (`keywords`, `detail_urls`, `creator_ids`) are kept as
/// the raw text the user typed; [`CrawlRequest::from`] splits them. Fields
/// arriving as `null` in a server `formData` decode as empty values; flags
/// also accept the runner's `0`/`1` integer columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionForm {
    #[serde(default, deserialize_with = "null_as_default")]
    pub platform: Platform,
    #[serde(default, deserialize_with = "null_as_default")]
    pub lt: LoginType,
    #[serde(rename = "type", default, deserialize_with = "null_as_default")]
    pub crawl_type: CrawlType,
    #[serde(default, deserialize_with = "null_as_default")]
    pub start: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub max_count: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub keywords: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub detail_urls: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub creator_ids: String,
    #[serde(default, deserialize_with = "lenient_flag")]
    pub get_comment: bool,
    #[serde(default, deserialize_with = "lenient_flag")]
    pub get_sub_comment: bool,
    #[serde(default, deserialize_with = "lenient_flag")]
    pub sync_to_mysql: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub cookies: String,
}

impl Default for SubmissionForm {
    fn default() -> Self {
        Self {
            platform: Platform::Bili,
            lt: LoginType::Cookie,
            crawl_type: CrawlType::Search,
            start: 1,
            max_count: 50,
            keywords: String::new(),
            detail_urls: String::new(),
            creator_ids: String::new(),
            get_comment: false,
            get_sub_comment: false,
            sync_to_mysql: false,
            cookies: String::new(),
        }
    }
}

impl SubmissionForm {
    /// Restore the canonical default, discarding every edit.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn storage_target(&self) -> StorageTarget {
        if self.sync_to_mysql {
            StorageTarget::Mysql
        } else {
            StorageTarget::Sqlite
        }
    }
}

/// Request body accepted by the job runner's crawl endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CrawlRequest {
    pub platform: Platform,
    pub lt: LoginType,
    #[serde(rename = "type")]
    pub crawl_type: CrawlType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keywords: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub specified_ids: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creator_ids: Option<Vec<String>>,
    pub get_comment: bool,
    pub get_sub_comment: bool,
    pub storage_type: StorageTarget,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cookies: Option<String>,
}

impl From<&SubmissionForm> for CrawlRequest {
    fn from(form: &SubmissionForm) -> Self {
        Self {
            platform: form.platform,
            lt: form.lt,
            crawl_type: form.crawl_type,
            // The runner rejects 0 for both bounds.
            start: (form.start > 0).then_some(form.start),
            max_count: (form.max_count > 0).then_some(form.max_count),
            keywords: non_empty(&form.keywords),
            specified_ids: split_list(&form.detail_urls),
            creator_ids: split_list(&form.creator_ids),
            get_comment: form.get_comment,
            get_sub_comment: form.get_sub_comment,
            storage_type: form.storage_target(),
            cookies: non_empty(&form.cookies),
        }
    }
}

fn non_empty(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Split user input on newlines and commas, dropping blanks.
fn split_list(raw: &str) -> Option<Vec<String>> {
    let items: Vec<String> = raw
        .split(['\n', ','])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect();
    (!items.is_empty()).then_some(items)
}
