use std::collections::{BTreeMap, HashMap};

use serde_json::json;

use super::Signal;

/// Identity of a form as seen by the funnel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormRef {
    /// Stable key: the form's id, name or action, else a generated key.
    pub key: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRef {
    pub name: String,
    pub kind: String,
}

#[derive(Debug, Clone, Default)]
struct FieldState {
    focused_at: Option<f64>,
    last_len: usize,
    grew: bool,
    corrections: u32,
}

#[derive(Debug, Clone)]
struct FormState {
    name: String,
    started: bool,
    submitted: bool,
    abandon_reported: bool,
    last_field: Option<String>,
    fields: HashMap<String, FieldState>,
}

/// Per-form start, field timing, submit and abandonment tracking.
#[derive(Debug, Clone, Default)]
pub struct FormFunnel {
    forms: BTreeMap<String, FormState>,
}

impl FormFunnel {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&mut self, form: &FormRef) -> &mut FormState {
        self.forms
            .entry(form.key.clone())
            .or_insert_with(|| FormState {
                name: form.name.clone(),
                started: false,
                submitted: false,
                abandon_reported: false,
                last_field: None,
                fields: HashMap::new(),
            })
    }

    pub fn on_focus(&mut self, form: &FormRef, field: &FieldRef, now: f64) -> Vec<Signal> {
        let state = self.state(form);
        let mut out = Vec::new();
        if !state.started {
            state.started = true;
            out.push(Signal::new(
                "form_start",
                json!({ "form_id": form.key, "form_name": state.name }),
            ));
        }
        state.last_field = Some(field.name.clone());
        state.fields.entry(field.name.clone()).or_default().focused_at = Some(now);
        out.push(Signal::new(
            "form_field_focus",
            json!({
                "form_id": form.key,
                "form_name": state.name,
                "field_name": field.name,
                "field_type": field.kind,
            }),
        ));
        out
    }

    /// Track value length changes. A shrink that follows growth counts as
    /// one correction.
    pub fn on_input(&mut self, form: &FormRef, field: &FieldRef, value_len: usize) {
        let f = self.state(form).fields.entry(field.name.clone()).or_default();
        if value_len > f.last_len {
            f.grew = true;
        } else if value_len < f.last_len && f.grew {
            f.corrections += 1;
            f.grew = false;
        }
        f.last_len = value_len;
    }

    pub fn on_blur(&mut self, form: &FormRef, field: &FieldRef, now: f64) -> Option<Signal> {
        let state = self.state(form);
        let name = state.name.clone();
        let f = state.fields.get_mut(&field.name)?;
        let focused_at = f.focused_at.take()?;
        Some(Signal::new(
            "form_field_blur",
            json!({
                "form_id": form.key,
                "form_name": name,
                "field_name": field.name,
                "field_type": field.kind,
                "time_spent_ms": (now - focused_at).max(0.0).round() as u64,
                "corrections": f.corrections,
            }),
        ))
    }

    pub fn on_submit(&mut self, form: &FormRef) -> Signal {
        let state = self.state(form);
        state.submitted = true;
        Signal::new(
            "form_submit",
            json!({
                "form_id": form.key,
                "form_name": state.name,
                "fields_interacted": state.fields.len(),
            }),
        )
    }

    /// Abandonment for every started, unsubmitted form not yet reported.
    pub fn finalize(&mut self) -> Vec<Signal> {
        let mut out = Vec::new();
        for (key, state) in &mut self.forms {
            if state.started && !state.submitted && !state.abandon_reported {
                state.abandon_reported = true;
                out.push(Signal::new(
                    "form_abandon",
                    json!({
                        "form_id": key,
                        "form_name": state.name,
                        "field_name": state.last_field,
                        "fields_interacted": state.fields.len(),
                    }),
                ));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(key: &str) -> FormRef {
        FormRef {
            key: key.into(),
            name: key.into(),
        }
    }

    fn field(name: &str) -> FieldRef {
        FieldRef {
            name: name.into(),
            kind: "text".into(),
        }
    }

    #[test]
    fn test_start_fires_once_per_form() {
        let mut f = FormFunnel::new();
        let a = f.on_focus(&form("signup"), &field("email"), 0.0);
        let b = f.on_focus(&form("signup"), &field("name"), 10.0);
        assert_eq!(a[0].name, "form_start");
        assert_eq!(a.len(), 2);
        assert_eq!(b.len(), 1);
        assert_eq!(b[0].name, "form_field_focus");
    }

    #[test]
    fn test_blur_reports_time_and_corrections() {
        let mut f = FormFunnel::new();
        let (fm, fd) = (form("checkout"), field("card"));
        f.on_focus(&fm, &fd, 1000.0);
        for len in [1, 2, 3, 2, 1, 2, 3, 4, 3] {
            f.on_input(&fm, &fd, len);
        }
        let s = f.on_blur(&fm, &fd, 3500.0).unwrap();
        assert_eq!(s.props["time_spent_ms"], 2500);
        assert_eq!(s.props["corrections"], 2);
        assert!(f.on_blur(&fm, &fd, 4000.0).is_none());
    }

    #[test]
    fn test_abandonment_at_most_once_and_only_unsubmitted() {
        let mut f = FormFunnel::new();
        f.on_focus(&form("a"), &field("x"), 0.0);
        f.on_focus(&form("b"), &field("y"), 0.0);
        f.on_submit(&form("b"));
        f.on_submit(&form("never-started"));

        let first = f.finalize();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].props["form_id"], "a");
        assert_eq!(first[0].props["field_name"], "x");
        assert!(f.finalize().is_empty());
    }
}
