use std::sync::RwLock;

/// Global atomic string tag attached to observability events (spec.md §3).
/// Modeled as a process-wide registry with an explicit init/set API rather
/// than ad-hoc globals, per the design note in spec.md §9; tests should
/// construct their own `Scenario` rather than mutating a process-wide one.
pub struct Scenario {
    current: RwLock<String>,
}

impl Scenario {
    pub fn new(initial: impl Into<String>) -> Self {
        Scenario {
            current: RwLock::new(initial.into()),
        }
    }

    pub fn get(&self) -> String {
        self.current.read().unwrap().clone()
    }

    pub fn set(&self, label: impl Into<String>) {
        *self.current.write().unwrap() = label.into();
    }
}

impl Default for Scenario {
    fn default() -> Self {
        Scenario::new("default")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_reflects_latest_set() {
        let s = Scenario::new("a");
        assert_eq!(s.get(), "a");
        s.set("b");
        assert_eq!(s.get(), "b");
    }
}
