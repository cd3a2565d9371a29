//! Well-known cache key and tag builders.
//!
//! Route handlers and invalidation sites must agree on naming; these
//! builders are the single source of truth for it. Keys are
//! entity-scoped, tags are entity-type-scoped (plus per-user tags where
//! invalidation follows a user's writes).

/// Prefix for tag index entries in the backing store.
pub const TAG_INDEX_PREFIX: &str = "tag:";

/// Cache key for a single hook by id
pub fn hook_key(hook_id: &str) -> String {
    format!("hook:{hook_id}")
}

/// Cache key for a hook listing filtered by category
pub fn hooks_by_category_key(category: &str) -> String {
    format!("hooks:category:{category}")
}

/// Cache key for a user's favorites listing
pub fn user_favorites_key(user_id: &str) -> String {
    format!("favorites:user:{user_id}")
}

/// Cache key for a generation result, keyed by prompt digest
pub fn generation_key(prompt_hash: &str) -> String {
    format!("generation:{prompt_hash}")
}

/// Cache key for an analysis result, keyed by content digest
pub fn analysis_key(content_hash: &str) -> String {
    format!("analysis:{content_hash}")
}

/// Tag covering every cached hook entity and listing
pub fn hooks_tag() -> String {
    "hooks".to_string()
}

/// Tag covering one user's favorites-derived entries
pub fn user_favorites_tag(user_id: &str) -> String {
    format!("favorites:{user_id}")
}

/// Tag covering cached generation results
pub fn generations_tag() -> String {
    "generations".to_string()
}

/// Storage key of the tag index entry for `tag`
pub fn tag_index_key(tag: &str) -> String {
    format!("{TAG_INDEX_PREFIX}{tag}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builders_are_stable() {
        assert_eq!(hook_key("h1"), "hook:h1");
        assert_eq!(hooks_by_category_key("openers"), "hooks:category:openers");
        assert_eq!(user_favorites_key("u9"), "favorites:user:u9");
        assert_eq!(generation_key("abc123"), "generation:abc123");
        assert_eq!(tag_index_key("hooks"), "tag:hooks");
    }
}
