//! Per-section render isolation
//!
//! Structural containment for rendering-time failures: a section whose
//! render closure errors (or panics) is switched to a fallback while its
//! siblings keep rendering. Retry clears one section's failure state
//! only. This layer knows nothing about data fetching; fetch errors are
//! handled inside the section views.

use dashmap::DashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::sections::Section;

/// What the page should show for one section
#[derive(Debug, PartialEq)]
pub enum RenderOutcome<T> {
    Rendered(T),
    /// Local fallback: message plus a retry affordance
    Fallback { message: String },
}

impl<T> RenderOutcome<T> {
    pub fn is_fallback(&self) -> bool {
        matches!(self, RenderOutcome::Fallback { .. })
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "section render panicked".to_string()
    }
}

/// Tracks which sections have failed to render
pub struct SectionBoundary {
    failures: DashMap<Section, String>,
}

impl SectionBoundary {
    pub fn new() -> Self {
        Self {
            failures: DashMap::new(),
        }
    }

    /// Run a section's render closure inside its boundary. A section
    /// that already failed stays on its fallback until `retry`.
    pub fn render_with<T, F>(&self, section: Section, render: F) -> RenderOutcome<T>
    where
        F: FnOnce() -> anyhow::Result<T>,
    {
        if let Some(message) = self.failures.get(&section) {
            return RenderOutcome::Fallback {
                message: message.clone(),
            };
        }

        match catch_unwind(AssertUnwindSafe(render)) {
            Ok(Ok(value)) => RenderOutcome::Rendered(value),
            Ok(Err(e)) => {
                let message = format!("{e:#}");
                log::error!("{section}: render failed: {message}");
                self.failures.insert(section, message.clone());
                RenderOutcome::Fallback { message }
            }
            Err(payload) => {
                let message = panic_message(payload);
                log::error!("{section}: render panicked: {message}");
                self.failures.insert(section, message.clone());
                RenderOutcome::Fallback { message }
            }
        }
    }

    /// Clear one section's failure so its next render runs again. Other
    /// sections are untouched.
    pub fn retry(&self, section: Section) {
        self.failures.remove(&section);
        log::info!("{section}: boundary reset");
    }

    pub fn is_failed(&self, section: Section) -> bool {
        self.failures.contains_key(&section)
    }

    pub fn failure_message(&self, section: Section) -> Option<String> {
        self.failures.get(&section).map(|message| message.clone())
    }
}

impl Default for SectionBoundary {
    fn default() -> Self {
        Self::new()
    }
}
