//! Sender avatar resolution.
//!
//! Real deployments plug in a lodestone-backed resolver; the fallback
//! implementation generates a deterministic identicon URL so webhook sends
//! always have something to show. Resolution never fails.

use async_trait::async_trait;

/// Resolves a character portrait URL for a sender.
#[async_trait]
pub trait AvatarResolver: Send + Sync {
    /// Returns an avatar URL for the character. Never fails; implementations
    /// fall back to a generated URL on lookup miss.
    async fn avatar_url(&self, name: &str, world: &str) -> String;
}

const DEFAULT_AVATAR_BASE: &str = "https://api.dicebear.com/7.x/identicon/png";

/// Generates a deterministic identicon URL from the sender identity.
pub struct FallbackAvatarResolver {
    base: String,
}

impl FallbackAvatarResolver {
    pub fn new(base: Option<String>) -> Self {
        Self {
            base: base.unwrap_or_else(|| DEFAULT_AVATAR_BASE.to_string()),
        }
    }

    fn seed(name: &str, world: &str) -> String {
        let raw = if world.is_empty() {
            name.to_string()
        } else {
            format!("{}@{}", name, world)
        };
        // Percent-encode the few characters that can appear in names.
        raw.chars()
            .flat_map(|c| match c {
                ' ' => "%20".chars().collect::<Vec<_>>(),
                '@' => "%40".chars().collect(),
                '\'' => "%27".chars().collect(),
                other => vec![other],
            })
            .collect()
    }
}

impl Default for FallbackAvatarResolver {
    fn default() -> Self {
        Self::new(None)
    }
}

#[async_trait]
impl AvatarResolver for FallbackAvatarResolver {
    async fn avatar_url(&self, name: &str, world: &str) -> String {
        format!("{}?seed={}", self.base, Self::seed(name, world))
    }
}
