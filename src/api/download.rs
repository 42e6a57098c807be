use std::io::Cursor;

use rocket::http::{ContentType, Header};
use rocket::response::{self, Responder, Response};
use rocket::Request;

use crate::export::spreadsheet::XLSX_CONTENT_TYPE;

/// `Content-Disposition` for a download. Plain ASCII names are sent as is,
/// anything else in RFC 5987 form.
pub fn attachment(filename: &str) -> Header<'static> {
    let plain = filename
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));

    let value = if plain {
        format!("attachment; filename={}", filename)
    } else {
        format!(
            "attachment; filename*=UTF-8''{}",
            urlencoding::encode(filename)
        )
    };
    Header::new("Content-Disposition", value)
}

/// A generated file sent as an attachment.
pub struct Download {
    content_type: ContentType,
    filename: String,
    body: Vec<u8>,
}

impl Download {
    pub fn xlsx(filename: impl Into<String>, body: Vec<u8>) -> Self {
        let (top, sub) = XLSX_CONTENT_TYPE
            .split_once('/')
            .unwrap_or(("application", "octet-stream"));
        Self {
            content_type: ContentType::new(top.to_string(), sub.to_string()),
            filename: filename.into(),
            body,
        }
    }

    pub fn text(filename: impl Into<String>, body: String) -> Self {
        Self {
            content_type: ContentType::Plain,
            filename: filename.into(),
            body: body.into_bytes(),
        }
    }
}

impl<'r> Responder<'r, 'static> for Download {
    fn respond_to(self, _req: &'r Request<'_>) -> response::Result<'static> {
        Response::build()
            .header(self.content_type)
            .header(attachment(&self.filename))
            .sized_body(self.body.len(), Cursor::new(self.body))
            .ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_names_stay_plain() {
        assert_eq!(
            attachment("import_template.xlsx").value(),
            "attachment; filename=import_template.xlsx"
        );
    }

    #[test]
    fn other_names_are_percent_encoded() {
        assert_eq!(
            attachment("活动_export.xlsx").value(),
            "attachment; filename*=UTF-8''%E6%B4%BB%E5%8A%A8_export.xlsx"
        );
    }
}
