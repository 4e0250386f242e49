//! ansible.cfg generation.
//!
//! Renders structured override sections into the INI format ansible
//! reads. Sections and keys come out in sorted order so generating twice
//! from the same input yields byte-identical text.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Structured ansible.cfg override sections, keyed section -> key -> value.
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq, Eq)]
#[serde(transparent)]
pub struct AnsibleCfg {
    pub sections: BTreeMap<String, BTreeMap<String, String>>,
}

impl AnsibleCfg {
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.sections.get(section).and_then(|keys| keys.get(key)).map(String::as_str)
    }

    /// Sets `key` in `section` only when no explicit value exists.
    pub fn set_if_unset(&mut self, section: &str, key: &str, value: &str) {
        self.sections
            .entry(section.to_string())
            .or_default()
            .entry(key.to_string())
            .or_insert_with(|| value.to_string());
    }

    /// Renders `[section]` / `key = value` INI text.
    pub fn to_ini(&self) -> String {
        let mut out = String::new();
        for (index, (section, keys)) in self.sections.iter().enumerate() {
            if index > 0 {
                out.push('\n');
            }
            out.push('[');
            out.push_str(section);
            out.push_str("]\n");
            for (key, value) in keys {
                out.push_str(key);
                out.push_str(" = ");
                out.push_str(value);
                out.push('\n');
            }
        }
        out
    }
}
