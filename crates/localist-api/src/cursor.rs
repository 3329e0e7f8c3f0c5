//! Opaque page cursors: URL-safe base64 of `created_at|id`.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD as B64;

use localist_db::PageCursor;

use crate::error::ApiError;

pub fn encode(cursor: &PageCursor) -> String {
    B64.encode(format!("{}|{}", cursor.created_at, cursor.id))
}

pub fn decode(raw: &str) -> Result<PageCursor, ApiError> {
    let invalid = || ApiError::bad_request("Invalid cursor.");

    let bytes = B64.decode(raw.trim()).map_err(|_| invalid())?;
    let text = String::from_utf8(bytes).map_err(|_| invalid())?;
    let (created_at, id) = text.split_once('|').ok_or_else(invalid)?;
    if created_at.is_empty() || id.is_empty() {
        return Err(invalid());
    }

    Ok(PageCursor {
        created_at: created_at.to_string(),
        id: id.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_what_it_encodes() {
        let cursor = PageCursor {
            created_at: "2024-01-01T10:00:00.000Z".into(),
            id: "4b1c6f0e-3a51-4e0b-9d59-0c7f6f1f2b4e".into(),
        };
        let token = encode(&cursor);
        assert!(!token.contains(['+', '/', '=']));
        assert_eq!(decode(&token).unwrap(), cursor);
    }

    #[test]
    fn rejects_garbage() {
        assert!(decode("not base64!").is_err());
        assert!(decode(&B64.encode("no-separator")).is_err());
        assert!(decode(&B64.encode("|id-only")).is_err());
    }
}
