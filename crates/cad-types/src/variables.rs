use serde::{Deserialize, Serialize};

/// A binding as shown in the Variables pane: name, type and rendered value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableView {
    pub name: String,
    pub type_name: String,
    pub value: String,
}

impl VariableView {
    /// Private (`_`-prefixed) bindings are hidden from display.
    pub fn is_visible_name(name: &str) -> bool {
        !name.starts_with('_')
    }
}
