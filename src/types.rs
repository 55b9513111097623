use std::fmt;

/// Identifier of a work item, unique across the input set.
pub type ItemId = String;

/// Name of a pipeline stage (`[stage.<name>]`).
pub type StageName = String;

/// Key of one sub-condition inside a multi-condition stage.
pub type ConditionKey = String;

/// How a stage tracks completion for an item.
///
/// - `Single`: the item is either done or not.
/// - `Multi`: each declared sub-condition is checkpointed on its own, and the
///   stage is done only once every one of them is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageKind {
    Single,
    Multi,
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageKind::Single => f.write_str("single-condition"),
            StageKind::Multi => f.write_str("multi-condition"),
        }
    }
}

/// Check that `name` can be used as a single file name component.
///
/// Item IDs and condition keys end up in claim descriptors, scratch paths and
/// artifact names, so they must not contain separators or whitespace.
pub fn check_file_component(name: &str) -> std::result::Result<(), String> {
    if name.is_empty() {
        return Err("must not be empty".to_string());
    }
    if name.starts_with('.') {
        return Err(format!("'{name}' must not start with '.'"));
    }
    if let Some(bad) = name
        .chars()
        .find(|c| c.is_whitespace() || c.is_control() || matches!(c, '/' | '\\' | ':'))
    {
        return Err(format!("'{name}' contains forbidden character {bad:?}"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_components() {
        assert!(check_file_component("id000123").is_ok());
        assert!(check_file_component("rxn_17-a").is_ok());
        assert!(check_file_component("").is_err());
        assert!(check_file_component(".hidden").is_err());
        assert!(check_file_component("a/b").is_err());
        assert!(check_file_component("a b").is_err());
    }
}
