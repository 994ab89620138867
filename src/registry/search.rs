//! Query helpers over the registry: category filter and keyword search.

use super::backend::Registry;
use super::script::ScriptDefinition;

/// Definitions whose category equals `category` exactly.
pub fn by_category<'a>(registry: &'a Registry, category: &str) -> Vec<&'a ScriptDefinition> {
    registry
        .values()
        .filter(|s| s.category.as_deref() == Some(category))
        .collect()
}

/// Case-insensitive substring match against name or description.
///
/// An empty keyword matches everything.
pub fn by_keyword<'a>(registry: &'a Registry, keyword: &str) -> Vec<&'a ScriptDefinition> {
    let keyword = keyword.to_lowercase();
    registry
        .values()
        .filter(|s| matches_keyword(s, &keyword))
        .collect()
}

fn matches_keyword(script: &ScriptDefinition, keyword_lower: &str) -> bool {
    script.name.to_lowercase().contains(keyword_lower)
        || script.description.to_lowercase().contains(keyword_lower)
}
