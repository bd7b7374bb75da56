use std::collections::HashMap;
use std::sync::Mutex;

/// Synthesized ids for labels with no entry in the table start here.
pub const SYNTHETIC_ID_BASE: i64 = 100;

/// Fixed mapping from numeric class id (as string, as the server
/// sends it) to a human-readable label, plus the reverse lookup used
/// when assembling broadcast payloads. This is part of the pipeline's
/// own configuration, not an external file: callers construct it from
/// whatever catalog their deployment uses.
#[derive(Debug)]
pub struct ClassTable {
    id_to_label: HashMap<String, String>,
    label_to_id: HashMap<String, i64>,
    synthesized: Mutex<HashMap<String, i64>>,
}

impl Clone for ClassTable {
    fn clone(&self) -> Self {
        Self {
            id_to_label: self.id_to_label.clone(),
            label_to_id: self.label_to_id.clone(),
            synthesized: Mutex::new(self.synthesized.lock().unwrap().clone()),
        }
    }
}

impl ClassTable {
    /// Builds a table from `(numeric_id_as_string, label)` pairs.
    pub fn new<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut id_to_label = HashMap::new();
        let mut label_to_id = HashMap::new();
        for (id, label) in entries {
            if let Ok(numeric) = id.parse::<i64>() {
                label_to_id.insert(label.clone(), numeric);
            }
            id_to_label.insert(id, label);
        }
        Self {
            id_to_label,
            label_to_id,
            synthesized: Mutex::new(HashMap::new()),
        }
    }

    /// A small illustrative default catalog for local development and
    /// tests; production deployments supply their own.
    pub fn default_table() -> Self {
        Self::new([
            ("0".to_string(), "cucur".to_string()),
            ("1".to_string(), "lemper".to_string()),
            ("2".to_string(), "wajik".to_string()),
            ("3".to_string(), "kue ku".to_string()),
        ])
    }

    /// Maps a server-reported class id (or already-resolved name) to a
    /// display label. Unknown ids pass through as their raw string so
    /// downstream components can still display and count them.
    pub fn label_for(&self, class_id_or_name: &str) -> String {
        self.id_to_label
            .get(class_id_or_name)
            .cloned()
            .unwrap_or_else(|| class_id_or_name.to_string())
    }

    /// Reverse-looks-up a label to its numeric id. Labels with no
    /// table entry are assigned a synthesized id starting at 100,
    /// stable for the lifetime of this table.
    pub fn id_for_label(&self, label: &str) -> i64 {
        if let Some(&id) = self.label_to_id.get(label) {
            return id;
        }
        let mut synth = self.synthesized.lock().unwrap();
        if let Some(&id) = synth.get(label) {
            return id;
        }
        let next = SYNTHETIC_ID_BASE + synth.len() as i64;
        synth.insert(label.to_string(), next);
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_id_maps_to_label() {
        let table = ClassTable::default_table();
        assert_eq!(table.label_for("1"), "lemper");
    }

    #[test]
    fn unknown_id_passes_through() {
        let table = ClassTable::default_table();
        assert_eq!(table.label_for("99"), "99");
    }

    #[test]
    fn known_label_reverse_lookup() {
        let table = ClassTable::default_table();
        assert_eq!(table.id_for_label("wajik"), 2);
    }

    #[test]
    fn unknown_label_gets_stable_synthetic_id() {
        let table = ClassTable::default_table();
        let first = table.id_for_label("durian");
        let second = table.id_for_label("durian");
        assert_eq!(first, SYNTHETIC_ID_BASE);
        assert_eq!(first, second);

        let other = table.id_for_label("rambutan");
        assert_eq!(other, SYNTHETIC_ID_BASE + 1);
    }
}
