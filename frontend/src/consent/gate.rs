use std::cell::Cell;
use std::rc::Rc;

use log::{info, warn};
use wasm_bindgen::JsCast;
use web_sys::{window, Document, HtmlScriptElement};

use super::record::{Category, ConsentRecord};
use super::store::{ConsentStore, ListenerId};

/// An optional feature that may only run with consent for its category.
pub trait Integration {
    fn category(&self) -> Category;
    fn name(&self) -> &str;
    fn enable(&self);
    fn disable(&self);
}

/// Third-party `<script>` injected into `<head>` while its category is allowed.
pub struct ScriptIntegration {
    category: Category,
    name: String,
    script_id: String,
    src: Option<String>,
}

impl ScriptIntegration {
    pub fn new(category: Category, name: impl Into<String>, src: Option<String>) -> Self {
        Self {
            category,
            name: name.into(),
            script_id: format!("prism-{}-script", category),
            src,
        }
    }

    /// Reads the script source from `<meta name="{meta_name}" content="...">`.
    /// Without the tag the integration only logs its state changes.
    pub fn from_meta(category: Category, name: impl Into<String>, meta_name: &str) -> Self {
        let src = document()
            .and_then(|doc| {
                doc.query_selector(&format!("meta[name=\"{}\"]", meta_name))
                    .ok()
                    .flatten()
            })
            .and_then(|meta| meta.get_attribute("content"))
            .filter(|src| !src.trim().is_empty());
        Self::new(category, name, src)
    }

    pub fn script_id(&self) -> &str {
        &self.script_id
    }

    fn inject(&self, doc: &Document, src: &str) -> Result<(), wasm_bindgen::JsValue> {
        if doc.get_element_by_id(&self.script_id).is_some() {
            return Ok(());
        }
        let script = doc
            .create_element("script")?
            .dyn_into::<HtmlScriptElement>()?;
        script.set_id(&self.script_id);
        script.set_src(src);
        script.set_async(true);
        if let Some(head) = doc.head() {
            head.append_child(&script)?;
        }
        Ok(())
    }
}

fn document() -> Option<Document> {
    window().and_then(|w| w.document())
}

impl Integration for ScriptIntegration {
    fn category(&self) -> Category {
        self.category
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn enable(&self) {
        info!("{} enabled", self.name);
        if let (Some(src), Some(doc)) = (self.src.as_deref(), document()) {
            if let Err(e) = self.inject(&doc, src) {
                warn!("Failed to load {} script: {:?}", self.name, e);
            }
        }
    }

    fn disable(&self) {
        info!("{} disabled", self.name);
        if let Some(script) = document().and_then(|doc| doc.get_element_by_id(&self.script_id)) {
            script.remove();
        }
    }
}

/// Keeps every registered integration in line with the current consent.
pub struct FeatureGates {
    integrations: Vec<(Box<dyn Integration>, Cell<Option<bool>>)>,
}

impl FeatureGates {
    pub fn new() -> Self {
        Self { integrations: Vec::new() }
    }

    pub fn with(mut self, integration: impl Integration + 'static) -> Self {
        let integration: Box<dyn Integration> = Box::new(integration);
        self.integrations.push((integration, Cell::new(None)));
        self
    }

    /// Enable what `record` allows, disable the rest. A missing record
    /// disables everything. Integrations already in the wanted state are not
    /// touched.
    pub fn apply(&self, record: Option<&ConsentRecord>) {
        for (integration, state) in &self.integrations {
            let allowed = record.map_or(false, |r| r.allows(integration.category()));
            if state.get() == Some(allowed) {
                continue;
            }
            if allowed {
                integration.enable();
            } else {
                integration.disable();
            }
            state.set(Some(allowed));
        }
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        self.integrations
            .iter()
            .any(|(integration, state)| integration.name() == name && state.get() == Some(true))
    }

    /// Re-apply after every successful save or clear on `store`.
    pub fn attach(self: &Rc<Self>, store: &ConsentStore) -> ListenerId {
        let gates = Rc::clone(self);
        store.subscribe(move |record| gates.apply(record))
    }
}

impl Default for FeatureGates {
    fn default() -> Self {
        Self::new()
    }
}
