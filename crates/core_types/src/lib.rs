use std::collections::HashMap;
use std::io::{self, Cursor, Read};

pub type MessageId = u64;
pub type RequestId = u64;

/// Preference keys read by the renderer.
pub mod keys {
    pub const PARANOID: &str = "paranoid";
    pub const COMPACT: &str = "compact";
    pub const ZOOM: &str = "zoom";
}

/// Read-only view of the user's preferences. Callers supply the default.
pub trait Preferences: Send + Sync {
    fn get_bool(&self, name: &str, default: bool) -> bool;
    fn get_int(&self, name: &str, default: i64) -> i64;
}

pub fn paranoid(prefs: &dyn Preferences) -> bool {
    prefs.get_bool(keys::PARANOID, true)
}

pub fn compact(prefs: &dyn Preferences) -> bool {
    prefs.get_bool(keys::COMPACT, false)
}

pub fn zoom(prefs: &dyn Preferences) -> i64 {
    prefs.get_int(keys::ZOOM, if compact(prefs) { 0 } else { 1 })
}

#[derive(Clone, Debug, Default)]
pub struct MemoryPreferences {
    bools: HashMap<String, bool>,
    ints: HashMap<String, i64>,
}

impl MemoryPreferences {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_bool(&mut self, name: &str, value: bool) -> &mut Self {
        self.bools.insert(name.to_string(), value);
        self
    }

    pub fn set_int(&mut self, name: &str, value: i64) -> &mut Self {
        self.ints.insert(name.to_string(), value);
        self
    }
}

impl Preferences for MemoryPreferences {
    fn get_bool(&self, name: &str, default: bool) -> bool {
        self.bools.get(name).copied().unwrap_or(default)
    }

    fn get_int(&self, name: &str, default: i64) -> i64 {
        self.ints.get(name).copied().unwrap_or(default)
    }
}

/// A locally stored message part.
pub trait Attachment: Send {
    /// False while the part has not been downloaded yet.
    fn available(&self) -> bool;
    fn media_type(&self) -> &str;
    /// Declared payload length in bytes.
    fn size(&self) -> u64;
    fn open(&self) -> io::Result<Box<dyn Read + Send>>;
}

pub trait AttachmentStore: Send + Sync {
    /// `content_id` is given in angle-bracket form, e.g. `<part1@host>`.
    fn lookup(&self, owner: MessageId, content_id: &str) -> Option<Box<dyn Attachment>>;
}

#[derive(Clone, Debug)]
pub struct MemoryAttachment {
    pub available: bool,
    pub media_type: String,
    pub bytes: Vec<u8>,
    /// Overrides the declared size; lets tests model truncated parts.
    pub declared_size: Option<u64>,
}

impl MemoryAttachment {
    pub fn new(media_type: &str, bytes: Vec<u8>) -> Self {
        Self {
            available: true,
            media_type: media_type.to_string(),
            bytes,
            declared_size: None,
        }
    }

    pub fn unavailable(media_type: &str) -> Self {
        Self {
            available: false,
            media_type: media_type.to_string(),
            bytes: Vec::new(),
            declared_size: None,
        }
    }
}

impl Attachment for MemoryAttachment {
    fn available(&self) -> bool {
        self.available
    }

    fn media_type(&self) -> &str {
        &self.media_type
    }

    fn size(&self) -> u64 {
        self.declared_size.unwrap_or(self.bytes.len() as u64)
    }

    fn open(&self) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(Cursor::new(self.bytes.clone())))
    }
}

#[derive(Clone, Debug, Default)]
pub struct MemoryAttachmentStore {
    parts: HashMap<(MessageId, String), MemoryAttachment>,
}

impl MemoryAttachmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a part under its bare content id (without angle brackets).
    pub fn insert(&mut self, owner: MessageId, content_id: &str, part: MemoryAttachment) {
        self.parts.insert((owner, format!("<{content_id}>")), part);
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }
}

impl AttachmentStore for MemoryAttachmentStore {
    fn lookup(&self, owner: MessageId, content_id: &str) -> Option<Box<dyn Attachment>> {
        self.parts
            .get(&(owner, content_id.to_string()))
            .map(|p| Box::new(p.clone()) as Box<dyn Attachment>)
    }
}
