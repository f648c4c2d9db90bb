//! Template Renderer - Substitutes contact fields into message templates

use regex::{Captures, Regex};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;
use wapulse_storage::models::{Contact, Template};

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{\s*([^{}]+?)\s*\}\}").expect("valid placeholder pattern"))
}

/// A template rendered for one contact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    pub header: Option<String>,
    pub body: String,
    pub footer: Option<String>,
    /// Variables that had no binding and were replaced with an empty string
    pub unbound: BTreeSet<String>,
}

impl RenderedMessage {
    /// Text sent on the wire: the non-empty parts joined by newlines
    pub fn text(&self) -> String {
        [self.header.as_deref(), Some(self.body.as_str()), self.footer.as_deref()]
            .into_iter()
            .flatten()
            .filter(|part| !part.trim().is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Template renderer for personalizing campaign messages
#[derive(Debug, Clone, Default)]
pub struct TemplateRenderer;

impl TemplateRenderer {
    pub fn new() -> Self {
        Self
    }

    /// Render every part of a template for a contact.
    ///
    /// `bindings` maps a template variable to a contact field path. A variable
    /// with no binding, or bound to a field the contact does not have, renders
    /// as an empty string.
    pub fn render(
        &self,
        template: &Template,
        contact: &Contact,
        bindings: &BTreeMap<String, String>,
    ) -> RenderedMessage {
        let mut unbound = BTreeSet::new();

        let header = template
            .header
            .as_deref()
            .map(|h| self.render_text(h, contact, bindings, &mut unbound));
        let body = self.render_text(&template.body, contact, bindings, &mut unbound);
        let footer = template
            .footer
            .as_deref()
            .map(|f| self.render_text(f, contact, bindings, &mut unbound));

        RenderedMessage {
            header,
            body,
            footer,
            unbound,
        }
    }

    /// Render a single text fragment
    pub fn render_text(
        &self,
        text: &str,
        contact: &Contact,
        bindings: &BTreeMap<String, String>,
        unbound: &mut BTreeSet<String>,
    ) -> String {
        placeholder_re()
            .replace_all(text, |caps: &Captures| {
                let variable = &caps[1];
                match bindings.get(variable) {
                    Some(path) => contact.field(path).unwrap_or_default(),
                    None => {
                        unbound.insert(variable.to_string());
                        String::new()
                    }
                }
            })
            .into_owned()
    }
}
