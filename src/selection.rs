#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionEntry {
    pub name: String,
    pub include: bool,
}

/// Include flags for the Missing Set, in display order. Every change bumps
/// `revision` so the UI can re-derive whether Install is enabled.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    entries: Vec<SelectionEntry>,
    revision: u64,
}

impl Selection {
    /// Every missing name starts included.
    pub fn new(missing: &[String]) -> Self {
        Self {
            entries: missing
                .iter()
                .map(|name| SelectionEntry {
                    name: name.clone(),
                    include: true,
                })
                .collect(),
            revision: 0,
        }
    }

    pub fn entries(&self) -> &[SelectionEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn toggle(&mut self, index: usize) -> bool {
        let Some(entry) = self.entries.get_mut(index) else {
            return false;
        };
        entry.include = !entry.include;
        self.revision += 1;
        true
    }

    pub fn set_all(&mut self, include: bool) -> bool {
        let mut changed = false;
        for entry in &mut self.entries {
            if entry.include != include {
                entry.include = include;
                changed = true;
            }
        }
        if changed {
            self.revision += 1;
        }
        changed
    }

    pub fn selected_count(&self) -> usize {
        self.entries.iter().filter(|entry| entry.include).count()
    }

    /// Included names in display order.
    pub fn selected(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter(|entry| entry.include)
            .map(|entry| entry.name.clone())
            .collect()
    }

    pub fn any_selected(&self) -> bool {
        any_selected(&self.entries)
    }
}

pub fn any_selected(entries: &[SelectionEntry]) -> bool {
    entries.iter().any(|entry| entry.include)
}
