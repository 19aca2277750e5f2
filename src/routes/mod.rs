pub mod events;
pub mod items;
pub mod shares;

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use tokio_util::io::ReaderStream;

use crate::db::models::{Item, ItemKind};
use crate::items::Payload;

/// "1", "true" and "yes" all count as set; everything else does not.
pub(crate) fn flag_is_true(value: Option<&str>) -> bool {
    matches!(
        value.map(|v| v.to_ascii_lowercase()).as_deref(),
        Some("1") | Some("true") | Some("yes")
    )
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub(crate) enum Disposition {
    Inline,
    Attachment,
}

impl Disposition {
    fn as_str(self) -> &'static str {
        match self {
            Disposition::Inline => "inline",
            Disposition::Attachment => "attachment",
        }
    }
}

/// Build the byte-stream response for a payload read: content type and
/// disposition from the item metadata, length when known, disk payloads
/// streamed rather than buffered.
pub(crate) fn payload_response(
    item: &Item,
    payload: Payload,
    disposition: Disposition,
    cache_control: &'static str,
) -> Response {
    let mut filename = item.file_name.clone().unwrap_or_else(|| "download".into());
    let content_type = match (&item.mime_type, item.kind) {
        (Some(mime), _) => mime.clone(),
        (None, ItemKind::Text) => "text/plain; charset=utf-8".to_string(),
        (None, _) => mime_guess::from_path(&filename)
            .first_or_octet_stream()
            .to_string(),
    };
    if item.kind == ItemKind::Text
        && disposition == Disposition::Attachment
        && !filename.ends_with(".txt")
    {
        filename.push_str(".txt");
    }

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&content_type)
            .unwrap_or(HeaderValue::from_static("application/octet-stream")),
    );
    let disp = format!(
        "{}; filename*=UTF-8''{}",
        disposition.as_str(),
        urlencoding::encode(&filename)
    );
    if let Ok(value) = HeaderValue::from_str(&disp) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static(cache_control),
    );

    match payload {
        Payload::Inline(bytes) => {
            headers.insert(header::CONTENT_LENGTH, HeaderValue::from(bytes.len()));
            (StatusCode::OK, headers, Body::from(bytes)).into_response()
        }
        Payload::File { file, len } => {
            headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
            let body = Body::from_stream(ReaderStream::new(file));
            (StatusCode::OK, headers, body).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_parsing_accepts_common_truthy_forms() {
        assert!(flag_is_true(Some("1")));
        assert!(flag_is_true(Some("true")));
        assert!(flag_is_true(Some("YES")));
        assert!(!flag_is_true(Some("0")));
        assert!(!flag_is_true(Some("")));
        assert!(!flag_is_true(None));
    }

    fn text_item() -> Item {
        Item {
            id: "i1".into(),
            kind: ItemKind::Text,
            text_content: Some("hi".into()),
            file_name: None,
            file_size: None,
            mime_type: None,
            payload: None,
            sort_weight: 0,
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn text_attachment_gets_txt_extension_and_plain_type() {
        let response = payload_response(
            &text_item(),
            Payload::Inline(b"hi".to_vec()),
            Disposition::Attachment,
            "no-store",
        );
        let headers = response.headers();
        assert_eq!(
            headers.get(header::CONTENT_TYPE).unwrap(),
            "text/plain; charset=utf-8"
        );
        let disp = headers.get(header::CONTENT_DISPOSITION).unwrap();
        assert!(disp.to_str().unwrap().starts_with("attachment"));
        assert!(disp.to_str().unwrap().contains("download.txt"));
        assert_eq!(headers.get(header::CONTENT_LENGTH).unwrap(), "2");
    }

    #[test]
    fn inline_view_keeps_original_name() {
        let mut item = text_item();
        item.kind = ItemKind::Image;
        item.file_name = Some("shot.png".into());
        item.mime_type = Some("image/png".into());
        let response = payload_response(
            &item,
            Payload::Inline(vec![0u8; 4]),
            Disposition::Inline,
            "no-store",
        );
        let headers = response.headers();
        assert_eq!(headers.get(header::CONTENT_TYPE).unwrap(), "image/png");
        let disp = headers.get(header::CONTENT_DISPOSITION).unwrap().to_str().unwrap();
        assert!(disp.starts_with("inline"));
        assert!(disp.contains("shot.png"));
    }
}
