use serde::{Deserialize, Serialize};
use crate::note::ItemId;

/// Content type that is never offered for notes
pub const ATTACHMENT_TYPE: &str = "attachment";

/// A content type known to the host (post, page, custom types)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentType {
    /// Machine name, e.g. `post`
    pub name: String,
    /// Human-readable plural label, e.g. `Posts`
    pub label: String,
    /// Whether the type is publicly queryable
    #[serde(default = "default_public")]
    pub public: bool,
}

fn default_public() -> bool {
    true
}

impl ContentType {
    pub fn new(name: &str, label: &str) -> Self {
        ContentType {
            name: name.to_string(),
            label: label.to_string(),
            public: true,
        }
    }
}

/// Enumerates the content types the host knows about. Queried, never mutated.
pub trait ContentRegistry: Send + Sync {
    fn content_types(&self) -> Vec<ContentType>;
}

/// Registry with a fixed list of types
#[derive(Debug, Clone)]
pub struct StaticRegistry {
    types: Vec<ContentType>,
}

impl StaticRegistry {
    pub fn new(types: Vec<ContentType>) -> Self {
        StaticRegistry { types }
    }
}

impl Default for StaticRegistry {
    fn default() -> Self {
        StaticRegistry::new(default_content_types())
    }
}

impl ContentRegistry for StaticRegistry {
    fn content_types(&self) -> Vec<ContentType> {
        self.types.clone()
    }
}

/// The types a stock host ships with
pub fn default_content_types() -> Vec<ContentType> {
    vec![
        ContentType::new("post", "Posts"),
        ContentType::new("page", "Pages"),
        ContentType::new(ATTACHMENT_TYPE, "Media"),
    ]
}

/// Permission levels the host can grant a caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// May edit content items and their notes
    EditPosts,
    /// May change plugin settings
    ManageOptions,
}

/// Who is making the current request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    /// Session identifier; tokens are bound to it
    pub session: String,
    #[serde(default)]
    pub capabilities: Vec<Capability>,
}

impl Caller {
    pub fn new(session: &str, capabilities: Vec<Capability>) -> Self {
        Caller {
            session: session.to_string(),
            capabilities,
        }
    }

    /// A caller without any capability
    pub fn anonymous(session: &str) -> Self {
        Caller::new(session, Vec::new())
    }

    pub fn has(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }
}

/// Per-request context supplied by the host
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub caller: Caller,
    /// The item being displayed, if any (used by the shortcode)
    pub current_item: Option<ItemId>,
}

impl RequestContext {
    pub fn new(caller: Caller) -> Self {
        RequestContext {
            caller,
            current_item: None,
        }
    }

    pub fn with_current_item(mut self, item: ItemId) -> Self {
        self.current_item = Some(item);
        self
    }
}
