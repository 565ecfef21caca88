use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Account row. The password hash never leaves the db layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub name: Option<String>,
    pub created_at: String,
}

impl User {
    /// Get display name, falling back to email if name is not set.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.email)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Website {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub slug: String,
    pub description: String,
    pub published: bool,
    pub settings: Value,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    pub id: i64,
    pub website_id: i64,
    pub title: String,
    pub slug: String,
    pub position: i64,
    pub is_home: bool,
    pub meta_description: String,
    pub html: String,
    pub css: String,
    pub project_data: Value,
    pub created_at: String,
    pub updated_at: String,
}

/// Page listing row without the editor payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageSummary {
    pub id: i64,
    pub website_id: i64,
    pub title: String,
    pub slug: String,
    pub position: i64,
    pub is_home: bool,
    pub updated_at: String,
}

impl From<&Page> for PageSummary {
    fn from(page: &Page) -> Self {
        Self {
            id: page.id,
            website_id: page.website_id,
            title: page.title.clone(),
            slug: page.slug.clone(),
            position: page.position,
            is_home: page.is_home,
            updated_at: page.updated_at.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Section {
    pub id: i64,
    pub page_id: i64,
    pub kind: String,
    pub position: i64,
    pub content: Value,
    pub style: Value,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Element {
    pub id: i64,
    pub section_id: i64,
    pub kind: String,
    pub position: i64,
    pub content: Value,
    pub style: Value,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaAsset {
    pub id: i64,
    pub user_id: i64,
    pub filename: String,
    pub storage_key: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VCard {
    pub id: i64,
    pub user_id: i64,
    pub slug: String,
    pub full_name: String,
    pub job_title: String,
    pub company: String,
    pub email: String,
    pub phone: String,
    pub website_url: String,
    pub address: String,
    pub bio: String,
    pub avatar_url: String,
    pub theme_color: String,
    pub social_links: Value,
    pub published: bool,
    pub view_count: i64,
    pub created_at: String,
    pub updated_at: String,
}

pub const DEFAULT_THEME_COLOR: &str = "#1f2937";

// ── Write payloads ────────────────────────────────────────────────────
//
// `Option` fields are "leave unchanged" on update.

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewWebsite {
    pub name: String,
    pub slug: Option<String>,
    pub description: Option<String>,
    pub settings: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebsitePatch {
    pub name: Option<String>,
    pub slug: Option<String>,
    pub description: Option<String>,
    pub published: Option<bool>,
    pub settings: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewPage {
    pub title: String,
    pub slug: Option<String>,
    pub meta_description: Option<String>,
    pub is_home: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PagePatch {
    pub title: Option<String>,
    pub slug: Option<String>,
    pub meta_description: Option<String>,
    pub is_home: Option<bool>,
}

/// Payload exchanged with the visual editor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EditorDocument {
    #[serde(default)]
    pub html: String,
    #[serde(default)]
    pub css: String,
    #[serde(default)]
    pub project_data: Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewSection {
    pub kind: String,
    pub position: Option<i64>,
    pub content: Option<Value>,
    pub style: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SectionPatch {
    pub kind: Option<String>,
    pub content: Option<Value>,
    pub style: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewElement {
    pub kind: String,
    pub position: Option<i64>,
    pub content: Option<Value>,
    pub style: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ElementPatch {
    pub kind: Option<String>,
    pub content: Option<Value>,
    pub style: Option<Value>,
    /// Moves the element to the end of another section.
    pub section_id: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewVCard {
    pub full_name: String,
    pub slug: Option<String>,
    pub job_title: Option<String>,
    pub company: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub website_url: Option<String>,
    pub address: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub theme_color: Option<String>,
    pub social_links: Option<Value>,
    pub published: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VCardPatch {
    pub full_name: Option<String>,
    pub slug: Option<String>,
    pub job_title: Option<String>,
    pub company: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub website_url: Option<String>,
    pub address: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub theme_color: Option<String>,
    pub social_links: Option<Value>,
    pub published: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReorderRequest {
    pub ids: Vec<i64>,
}

// ── API view types ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebsiteDetail {
    #[serde(flatten)]
    pub website: Website,
    pub pages: Vec<PageSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionDetail {
    #[serde(flatten)]
    pub section: Section,
    pub elements: Vec<Element>,
}

/// Fully expanded page used by the public renderer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageTree {
    pub website: Website,
    pub page: Page,
    pub sections: Vec<SectionDetail>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaView {
    #[serde(flatten)]
    pub asset: MediaAsset,
    pub url: String,
}

impl From<MediaAsset> for MediaView {
    fn from(asset: MediaAsset) -> Self {
        let url = format!("/media/{}", asset.id);
        Self { asset, url }
    }
}
