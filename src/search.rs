use crate::action::Action;
use crate::model::{CatalogEntry, EntryId};
use crate::storage::Catalog;
use once_cell::sync::Lazy;
use regex::Regex;
use unicode_segmentation::UnicodeSegmentation;
use url::Url;

/// Лимит подписи к фото в Telegram.
const CAPTION_LIMIT: usize = 1024;

static DEEP_LINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:anime_)?(\d{1,19})$").expect("static regex"));

/// Как показать превью результата инлайн-поиска.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Preview {
    /// Без постера — обычная статья.
    None,
    /// Постер через наш /thumb.
    Thumbnail(Url),
    /// Постер прямо по file_id.
    CachedPhoto(String),
}

/// Один результат инлайн-поиска, без привязки к teloxide.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultCard {
    pub id: String,
    pub title: String,
    pub description: String,
    pub caption_html: String,
    pub preview: Preview,
    pub action: Action,
}

/// Одно сообщение из выдачи по кнопке «Смотреть» или deep link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Photo { file_id: String, caption_html: String },
    /// Постера нет: подпись уходит текстом.
    Caption(String),
    Video(String),
    VideoUnavailable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    Found(CatalogEntry),
    NotFound,
    /// Каталог недоступен.
    Unavailable,
}

/// Поиск для инлайн-режима. Ошибка каталога = пустой список.
pub async fn search(catalog: &dyn Catalog, query: &str, limit: usize) -> Vec<CatalogEntry> {
    match catalog.search(query, limit).await {
        Ok(found) => found,
        Err(e) => {
            tracing::warn!(error = %e, query, "catalog search failed");
            Vec::new()
        }
    }
}

pub async fn lookup(catalog: &dyn Catalog, id: EntryId) -> Lookup {
    match catalog.find(id).await {
        Ok(Some(entry)) => Lookup::Found(entry),
        Ok(None) => Lookup::NotFound,
        Err(e) => {
            tracing::warn!(error = %e, %id, "catalog lookup failed");
            Lookup::Unavailable
        }
    }
}

/// `anime_12` или просто `12` из /start.
pub fn parse_deep_link(payload: &str) -> Option<EntryId> {
    let caps = DEEP_LINK.captures(payload.trim())?;
    caps[1].parse().ok().map(EntryId)
}

pub fn deep_link_payload(id: EntryId) -> String {
    format!("anime_{id}")
}

pub fn season_label(entry: &CatalogEntry) -> String {
    entry.season.map(|s| s.to_string()).unwrap_or_else(|| "—".to_string())
}

/// Однострочное описание: имя, сезон, серии.
pub fn summary_line(entry: &CatalogEntry) -> String {
    format!("{} · Сезон: {} · Серий: {}", entry.name, season_label(entry), entry.episode_count)
}

pub fn caption_html(entry: &CatalogEntry) -> String {
    let text = format!(
        "📺 <b>{}</b>\n📆 Сезон: {}\n🎞️ Серий: {}",
        html_escape(&entry.name),
        season_label(entry),
        entry.episode_count,
    );
    clip(&text, CAPTION_LIMIT)
}

/// Превью: через прокси, если есть публичный адрес, иначе по file_id.
pub fn render_card(entry: &CatalogEntry, thumb_base: Option<&Url>) -> ResultCard {
    let preview = match (&entry.poster, thumb_base) {
        (None, _) => Preview::None,
        (Some(poster), Some(base)) => match thumb_url(base, poster) {
            Some(url) => Preview::Thumbnail(url),
            None => Preview::CachedPhoto(poster.clone()),
        },
        (Some(poster), None) => Preview::CachedPhoto(poster.clone()),
    };
    ResultCard {
        id: entry.id.to_string(),
        title: entry.name.clone(),
        description: format!("Сезон: {} | Серий: {}", season_label(entry), entry.episode_count),
        caption_html: caption_html(entry),
        preview,
        action: Action::Watch(entry.id),
    }
}

/// Сначала постер с подписью (или подпись текстом), затем видео или уведомление, что его нет.
pub fn delivery(entry: &CatalogEntry) -> [Delivery; 2] {
    let caption_html = caption_html(entry);
    let head = match &entry.poster {
        Some(file_id) => Delivery::Photo { file_id: file_id.clone(), caption_html },
        None => Delivery::Caption(caption_html),
    };
    let tail = match &entry.video {
        Some(file_id) => Delivery::Video(file_id.clone()),
        None => Delivery::VideoUnavailable,
    };
    [head, tail]
}

pub fn thumb_url(base: &Url, file_id: &str) -> Option<Url> {
    let mut url = base.join("thumb").ok()?;
    url.set_query(Some(&format!("file_id={}", urlencoding::encode(file_id))));
    Some(url)
}

pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

/// Обрезка по графемам, чтобы не рвать эмодзи.
pub fn clip(s: &str, max: usize) -> String {
    if s.graphemes(true).count() <= max {
        s.to_string()
    } else {
        s.graphemes(true).take(max.saturating_sub(1)).collect::<String>() + "…"
    }
}
