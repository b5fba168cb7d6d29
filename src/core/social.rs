//! Codec for the social-media link blob.
//!
//! The ordered link list is persisted as a single JSON text column locally
//! and a native array remotely. Encode/decode are pure functions; a
//! malformed blob is recovered as the empty list rather than surfaced.

use thiserror::Error;

#[derive(Debug, Error)]
#[error("social media blob is not a JSON string array: {reason}")]
pub struct DecodeError {
    pub reason: String,
}

/// Encode an ordered link list into the persisted JSON blob.
pub fn encode_links(links: &[String]) -> String {
    serde_json::to_string(links).unwrap_or_else(|_| "[]".to_string())
}

/// Decode the persisted blob back into the ordered link list.
///
/// The empty string decodes to the empty list (freshly created rows may
/// never have had the column written).
pub fn decode_links(blob: &str) -> Result<Vec<String>, DecodeError> {
    if blob.is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(blob).map_err(|e| DecodeError {
        reason: e.to_string(),
    })
}

/// Decode with the recovery rule: a malformed or absent blob yields the
/// empty list. Never fails; the defect is logged for diagnosis only.
pub fn decode_links_lossy(blob: Option<&str>) -> Vec<String> {
    let Some(blob) = blob else {
        return Vec::new();
    };
    match decode_links(blob) {
        Ok(links) => links,
        Err(err) => {
            tracing::debug!(%err, "dropping malformed social media blob");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_ordered_lists() {
        let cases: Vec<Vec<String>> = vec![
            vec![],
            vec!["https://x.com/ada".into()],
            vec!["b".into(), "a".into(), "c".into()],
            vec!["".into(), "".into()],
            vec!["https://linkedin.com/in/ada".into(), "".into(), "x".into()],
        ];
        for links in cases {
            let blob = encode_links(&links);
            assert_eq!(decode_links(&blob).unwrap(), links);
        }
    }

    #[test]
    fn empty_blob_decodes_to_empty_list() {
        assert_eq!(decode_links("").unwrap(), Vec::<String>::new());
    }

    #[test]
    fn malformed_blob_errors_strictly() {
        assert!(decode_links("not json").is_err());
        assert!(decode_links("{\"a\":1}").is_err());
    }

    #[test]
    fn lossy_decode_recovers_to_empty() {
        assert_eq!(decode_links_lossy(Some("not json")), Vec::<String>::new());
        assert_eq!(decode_links_lossy(None), Vec::<String>::new());
    }
}
