use std::io::Read;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use core_types::{Attachment, AttachmentStore, MessageId};
use html::{parse_document, to_html};

use crate::error::ResourceError;
use crate::source::{ImageSource, content_id_key};

/// Replaces every `cid:` image reference that resolves to a downloaded
/// attachment of `owner` with a `data:` URI carrying its bytes.
///
/// References that cannot be resolved are left as they are. A read error or
/// short read fails the whole call.
pub fn inline_embedded(
    owner: MessageId,
    html: &str,
    store: &dyn AttachmentStore,
) -> Result<String, ResourceError> {
    let mut doc = parse_document(html);
    let mut inlined = 0usize;
    for img in doc.elements_by_tag("img") {
        let ImageSource::ContentId(cid) = ImageSource::parse(doc.attr_or_empty(img, "src")) else {
            continue;
        };
        let key = content_id_key(cid);
        let Some(part) = store.lookup(owner, &key) else {
            log::debug!(target: "images", "no attachment for {key}");
            continue;
        };
        if !part.available() {
            log::debug!(target: "images", "attachment {key} not downloaded");
            continue;
        }
        let bytes = read_part(part.as_ref(), &key)?;
        let uri = format!("data:{};base64,{}", part.media_type(), STANDARD.encode(&bytes));
        doc.set_attr(img, "src", uri);
        inlined += 1;
    }
    log::debug!(target: "images", "inlined {inlined} embedded images for message {owner}");
    Ok(to_html(&doc))
}

fn read_part(part: &dyn Attachment, key: &str) -> Result<Vec<u8>, ResourceError> {
    let io_error = |source| ResourceError::Io {
        content_id: key.to_string(),
        source,
    };
    let expected = part.size();
    let mut bytes = Vec::new();
    part.open()
        .map_err(io_error)?
        .take(expected)
        .read_to_end(&mut bytes)
        .map_err(io_error)?;
    let read = bytes.len() as u64;
    if read < expected {
        return Err(ResourceError::ShortRead {
            content_id: key.to_string(),
            read,
            expected,
        });
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::{MemoryAttachment, MemoryAttachmentStore};

    fn store() -> MemoryAttachmentStore {
        let mut store = MemoryAttachmentStore::new();
        store.insert(1, "logo@x", MemoryAttachment::new("image/png", b"hello".to_vec()));
        store.insert(1, "later@x", MemoryAttachment::unavailable("image/jpeg"));
        store
    }

    #[test]
    fn inlines_available_parts() {
        let out = inline_embedded(1, r#"<img src="cid:logo@x" alt="l">"#, &store()).expect("inline");
        assert!(out.contains(r#"<img src="data:image/png;base64,aGVsbG8=" alt="l">"#), "{out}");
    }

    #[test]
    fn leaves_unresolved_references() {
        let html = r#"<img src="cid:later@x"><img src="cid:missing@x"><img src="https://x/a.png">"#;
        let out = inline_embedded(1, html, &store()).expect("inline");
        assert!(out.contains(r#"src="cid:later@x""#));
        assert!(out.contains(r#"src="cid:missing@x""#));
        assert!(out.contains(r#"src="https://x/a.png""#));
        let other_owner = inline_embedded(2, r#"<img src="cid:logo@x">"#, &store()).expect("inline");
        assert!(other_owner.contains(r#"src="cid:logo@x""#));
    }

    #[test]
    fn short_read_fails_whole_call() {
        let mut store = store();
        let mut truncated = MemoryAttachment::new("image/png", vec![1, 2, 3]);
        truncated.declared_size = Some(10);
        store.insert(1, "cut@x", truncated);
        let err = inline_embedded(1, r#"<img src="cid:logo@x"><img src="cid:cut@x">"#, &store)
            .expect_err("short read");
        assert!(matches!(
            err,
            ResourceError::ShortRead {
                read: 3,
                expected: 10,
                ..
            }
        ));
    }

    #[test]
    fn returns_whole_document() {
        let out = inline_embedded(1, "<p>x</p>", &store()).expect("inline");
        assert_eq!(out, "<html><head></head><body><p>x</p></body></html>");
    }
}
