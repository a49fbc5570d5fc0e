//! Theme set reconciliation
//!
//! The host pushes the full set of stylesheet URLs it wants applied. The
//! reconciler diffs that against what is currently active and touches only the
//! difference: deactivations first, then activations in the order supplied.

use std::collections::BTreeSet;

use tracing::debug;

/// Stylesheet collaborator that actually loads and unloads theme resources
pub trait ThemeSink {
    fn activate(&mut self, url: &str);
    fn deactivate(&mut self, url: &str);
}

/// Sink that only logs
#[derive(Debug, Default)]
pub struct LoggingThemeSink;

impl ThemeSink for LoggingThemeSink {
    fn activate(&mut self, url: &str) {
        tracing::info!(%url, "Activating theme");
    }

    fn deactivate(&mut self, url: &str) {
        tracing::info!(%url, "Deactivating theme");
    }
}

/// Operations applied by one reconcile pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThemeDiff {
    pub deactivated: Vec<String>,
    pub activated: Vec<String>,
}

impl ThemeDiff {
    pub fn is_empty(&self) -> bool {
        self.deactivated.is_empty() && self.activated.is_empty()
    }
}

/// Currently applied theme set
#[derive(Debug, Clone, Default)]
pub struct ThemeReconciler {
    active: Vec<String>,
}

impl ThemeReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// URLs currently applied, in activation order
    pub fn active(&self) -> &[String] {
        &self.active
    }

    /// Bring the active set in line with `desired`
    pub fn reconcile(&mut self, desired: &[String], sink: &mut dyn ThemeSink) -> ThemeDiff {
        debug!(?desired, active = ?self.active, "ThemeReconciler::reconcile: called");

        let desired_set: BTreeSet<&str> = desired.iter().map(String::as_str).filter(|u| !u.is_empty()).collect();
        let active_set: BTreeSet<&str> = self.active.iter().map(String::as_str).collect();

        if desired_set == active_set {
            debug!("ThemeReconciler::reconcile: desired matches active, nothing to do");
            return ThemeDiff::default();
        }

        let deactivated: Vec<String> = self
            .active
            .iter()
            .filter(|url| !desired_set.contains(url.as_str()))
            .cloned()
            .collect();

        let mut seen: BTreeSet<String> = BTreeSet::new();
        let activated: Vec<String> = desired
            .iter()
            .filter(|url| !url.is_empty())
            .filter(|url| !active_set.contains(url.as_str()))
            .filter(|url| seen.insert(url.to_string()))
            .cloned()
            .collect();

        for url in &deactivated {
            sink.deactivate(url);
        }

        self.active.retain(|url| desired_set.contains(url.as_str()));

        for url in &activated {
            sink.activate(url);
            self.active.push(url.clone());
        }

        debug!(?deactivated, ?activated, "ThemeReconciler::reconcile: applied");
        ThemeDiff { deactivated, activated }
    }

    /// Remove one URL from the active set
    ///
    /// A URL that is not active is left alone.
    pub fn deactivate(&mut self, url: &str, sink: &mut dyn ThemeSink) -> bool {
        let before = self.active.len();
        self.active.retain(|u| u != url);
        if self.active.len() == before {
            return false;
        }
        sink.deactivate(url);
        true
    }
}
