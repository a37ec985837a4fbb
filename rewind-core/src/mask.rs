//! Sensitive-field classification and masking.

use regex::Regex;

use crate::dom::{Document, NodeKey};
use crate::selector::Selector;

/// Replacement for any masked value. Fixed length so the original length
/// is not leaked.
pub const MASK: &str = "********";

const PAYMENT_PATTERN: &str = r"(?i)card|cc[-_]?num|cvv|cvc|ccv|expir";

#[derive(Debug, Clone)]
pub struct MaskPolicy {
    mask_all_inputs: bool,
    selectors: Vec<Selector>,
    payment: Option<Regex>,
}

impl Default for MaskPolicy {
    fn default() -> Self {
        Self::new(true, &[])
    }
}

impl MaskPolicy {
    /// Build a policy. Selectors that fail to parse are logged and ignored.
    pub fn new(mask_all_inputs: bool, selectors: &[String]) -> Self {
        let selectors = selectors
            .iter()
            .filter_map(|s| match Selector::parse(s) {
                Ok(sel) => Some(sel),
                Err(e) => {
                    tracing::warn!(selector = %s, error = %e, "ignoring mask selector");
                    None
                }
            })
            .collect();
        let payment = match Regex::new(PAYMENT_PATTERN) {
            Ok(re) => Some(re),
            Err(e) => {
                tracing::error!(error = %e, "payment field pattern failed to compile");
                None
            }
        };
        Self {
            mask_all_inputs,
            selectors,
            payment,
        }
    }

    /// Policy that masks nothing. Used when rebuilding already-masked data.
    pub fn none() -> Self {
        Self {
            mask_all_inputs: false,
            selectors: Vec::new(),
            payment: None,
        }
    }

    pub fn is_sensitive(&self, doc: &Document, node: NodeKey) -> bool {
        let Some(tag) = doc.tag(node) else {
            return false;
        };
        if tag == "input" && is_password(doc, node) {
            return true;
        }
        if let Some(re) = &self.payment {
            let probe = format!(
                "{}{}",
                doc.attribute(node, "name").unwrap_or_default(),
                doc.attribute(node, "autocomplete").unwrap_or_default()
            );
            if !probe.is_empty() && re.is_match(&probe) {
                return true;
            }
        }
        if self.mask_all_inputs && is_form_control(tag) {
            return true;
        }
        self.selectors.iter().any(|s| s.matches(doc, node))
    }
}

pub fn is_form_control(tag: &str) -> bool {
    matches!(tag, "input" | "textarea" | "select")
}

pub fn is_password(doc: &Document, node: NodeKey) -> bool {
    doc.attribute(node, "type")
        .map(|t| t.eq_ignore_ascii_case("password"))
        .unwrap_or(false)
}
