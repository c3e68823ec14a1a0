use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("upstream status {0}")]
    Status(reqwest::StatusCode),
    #[error("unexpected content-type: {0}")]
    ContentType(String),
}

/// Скачанная картинка вместе с content-type апстрима.
#[derive(Debug, Clone)]
pub struct Image {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Ссылка на файл Bot API: `{api}/file/bot{token}/{path}`.
pub fn telegram_file_url(api_base: &str, token: &str, path: &str) -> String {
    format!("{}/file/bot{}/{}", api_base.trim_end_matches('/'), token, path)
}

/// Bot API кладёт фото и превью в `photos/` и `thumbnails/`; видео и документы в других каталогах.
pub fn is_image_path(path: &str) -> bool {
    path.starts_with("photos/") || path.starts_with("thumbnails/")
}

/// Тип картинки по сигнатуре: jpeg, png, webp.
fn sniff_image(bytes: &[u8]) -> Option<&'static str> {
    match bytes {
        [0xFF, 0xD8, 0xFF, ..] => Some("image/jpeg"),
        [0x89, b'P', b'N', b'G', ..] => Some("image/png"),
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => Some("image/webp"),
        _ => None,
    }
}

#[derive(Clone)]
pub struct ImageFetcher {
    http: reqwest::Client,
}

impl ImageFetcher {
    pub fn new() -> Result<Self, FetchError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .user_agent("Mozilla/5.0 (compatible; anime-catalog-bot/1.0)")
            .build()?;
        Ok(Self { http })
    }

    /// Одна попытка, без ретраев. Telegram отдаёт файлы как octet-stream: такие проверяем по сигнатуре.
    pub async fn fetch_image(&self, url: &str) -> Result<Image, FetchError> {
        let resp = self
            .http
            .get(url)
            .header(reqwest::header::ACCEPT, "image/*")
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(FetchError::Status(resp.status()));
        }
        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|ct| ct.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();
        if content_type.starts_with("image/") {
            let bytes = resp.bytes().await?;
            return Ok(Image { content_type, bytes: bytes.to_vec() });
        }
        if !content_type.starts_with("application/octet-stream") {
            return Err(FetchError::ContentType(content_type));
        }
        // octet-stream пускаем, только если внутри действительно картинка
        let bytes = resp.bytes().await?;
        match sniff_image(&bytes) {
            Some(sniffed) => Ok(Image { content_type: sniffed.to_string(), bytes: bytes.to_vec() }),
            None => Err(FetchError::ContentType(content_type)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn builds_bot_api_file_url() {
        assert_eq!(
            telegram_file_url("https://api.telegram.org/", "123:abc", "photos/file_1.jpg"),
            "https://api.telegram.org/file/bot123:abc/photos/file_1.jpg"
        );
    }

    #[tokio::test]
    async fn fetches_image_bytes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/poster.png"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(vec![1u8, 2, 3], "image/png"),
            )
            .mount(&server)
            .await;

        let image = ImageFetcher::new()
            .unwrap()
            .fetch_image(&format!("{}/poster.png", server.uri()))
            .await
            .unwrap();
        assert_eq!(image.content_type, "image/png");
        assert_eq!(image.bytes, vec![1, 2, 3]);
    }

    #[test]
    fn only_photo_paths_are_proxied() {
        assert!(is_image_path("photos/file_1.jpg"));
        assert!(is_image_path("thumbnails/file_7.jpg"));
        assert!(!is_image_path("videos/file_2.mp4"));
        assert!(!is_image_path("documents/file_3.pdf"));
    }

    #[tokio::test]
    async fn octet_stream_is_sniffed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/photo"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(vec![0xFFu8, 0xD8, 0xFF, 0xE0, 0, 0x10], "application/octet-stream"),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/video"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(vec![0u8, 0, 0, 0x18, b'f', b't', b'y', b'p'], "application/octet-stream"),
            )
            .mount(&server)
            .await;

        let fetcher = ImageFetcher::new().unwrap();
        let image = fetcher.fetch_image(&format!("{}/photo", server.uri())).await.unwrap();
        assert_eq!(image.content_type, "image/jpeg");
        assert!(matches!(
            fetcher.fetch_image(&format!("{}/video", server.uri())).await,
            Err(FetchError::ContentType(_))
        ));
    }

    #[tokio::test]
    async fn rejects_errors_and_non_images() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/page"))
            .respond_with(ResponseTemplate::new(200).set_body_raw("<html>", "text/html"))
            .mount(&server)
            .await;

        let fetcher = ImageFetcher::new().unwrap();
        assert!(matches!(
            fetcher.fetch_image(&format!("{}/missing", server.uri())).await,
            Err(FetchError::Status(s)) if s.as_u16() == 404
        ));
        assert!(matches!(
            fetcher.fetch_image(&format!("{}/page", server.uri())).await,
            Err(FetchError::ContentType(_))
        ));
    }
}
