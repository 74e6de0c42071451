//! Reconstructing HTML forms and pseudo-verb links for resubmission.
//!
//! The site performs every mutation through forms it renders itself, so a
//! submission is the form's own default fields plus whatever the caller
//! overrides. Links carrying `data-method` stand in for PUT/DELETE requests
//! and are replayed as a POST with a `_method` field.

use scraper::{ElementRef, Html};

use storygraph_shared::{Result, StoryGraphError};

use crate::markup::selector;

/// Ordered form fields, as sent in a urlencoded body.
pub type Fields = Vec<(String, String)>;

/// A form found on a page, with the default values it would submit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Form {
    /// Target path of the form.
    pub action: String,
    /// Harvested `name`/`value` pairs, first occurrence of a name only.
    pub fields: Fields,
}

impl Form {
    /// Harvest a form element.
    ///
    /// Inputs, then selects (value of the selected option; a select with no
    /// selected option is left out), then named buttons.
    pub fn from_element(form: ElementRef<'_>) -> Result<Self> {
        let action = form
            .value()
            .attr("action")
            .ok_or_else(|| StoryGraphError::parse("form has no action"))?
            .to_string();

        let mut fields = Fields::new();

        for input in form.select(&selector("input[name]")?) {
            let name = input.value().attr("name").unwrap_or_default();
            let value = input.value().attr("value").unwrap_or_default();
            push_default(&mut fields, name, value);
        }

        let option_sel = selector("option[selected]")?;
        for select in form.select(&selector("select[name]")?) {
            let Some(option) = select.select(&option_sel).next() else {
                continue;
            };
            let name = select.value().attr("name").unwrap_or_default();
            let value = option.value().attr("value").unwrap_or_default();
            push_default(&mut fields, name, value);
        }

        for button in form.select(&selector("button[name]")?) {
            let name = button.value().attr("name").unwrap_or_default();
            let value = button.value().attr("value").unwrap_or_default();
            push_default(&mut fields, name, value);
        }

        Ok(Self { action, fields })
    }

    /// Harvest the first form in `doc` matching `css`.
    pub fn find(doc: &Html, css: &str) -> Result<Self> {
        let form = doc
            .select(&selector(css)?)
            .next()
            .ok_or_else(|| StoryGraphError::parse(format!("no form matching {css:?}")))?;
        Self::from_element(form)
    }

    /// Default value harvested for `name`.
    pub fn value(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Body to submit: `overrides` first, defaults only for names not overridden.
    pub fn fill(&self, overrides: Fields) -> Fields {
        let mut data = overrides;
        for (name, value) in &self.fields {
            if !data.iter().any(|(n, _)| n == name) {
                data.push((name.clone(), value.clone()));
            }
        }
        data
    }
}

fn push_default(fields: &mut Fields, name: &str, value: &str) {
    if !fields.iter().any(|(n, _)| n == name) {
        fields.push((name.to_string(), value.to_string()));
    }
}

/// An `<a href=.. data-method=..>` link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodLink {
    /// Path the verb applies to.
    pub href: String,
    /// Emulated verb (`delete`, `put`, `get`, ..).
    pub verb: String,
}

impl MethodLink {
    /// Read a pseudo-verb link element.
    pub fn from_element(link: ElementRef<'_>) -> Result<Self> {
        let attr = |name: &str| {
            link.value()
                .attr(name)
                .map(str::to_string)
                .ok_or_else(|| StoryGraphError::parse(format!("link has no {name} attribute")))
        };
        Ok(Self {
            href: attr("href")?,
            verb: attr("data-method")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EDIT_FORM: &str = r#"
        <form class="edit_journal_entry" action="/journal_entries/42" method="post">
            <input type="hidden" name="_method" value="patch">
            <input type="hidden" name="authenticity_token" value="form-token">
            <input type="number" name="journal_entry[pages_read]" value="120">
            <input type="number" name="journal_entry[percent_reached]">
            <select name="journal_entry[month]">
                <option value="">Month</option>
                <option value="3" selected>March</option>
            </select>
            <select name="journal_entry[day]">
                <option value="1">1</option>
            </select>
            <input type="hidden" name="journal_entry[pages_read]" value="999">
            <button type="submit" name="commit" value="Save">Save</button>
        </form>"#;

    fn edit_form() -> Form {
        let doc = Html::parse_fragment(EDIT_FORM);
        Form::find(&doc, "form.edit_journal_entry").expect("form")
    }

    #[test]
    fn harvests_defaults_in_order() {
        let form = edit_form();
        assert_eq!(form.action, "/journal_entries/42");
        let names: Vec<_> = form.fields.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(
            names,
            [
                "_method",
                "authenticity_token",
                "journal_entry[pages_read]",
                "journal_entry[percent_reached]",
                "journal_entry[month]",
                "commit",
            ]
        );
    }

    #[test]
    fn first_occurrence_wins() {
        let form = edit_form();
        assert_eq!(form.value("journal_entry[pages_read]"), Some("120"));
    }

    #[test]
    fn missing_value_is_empty_and_unselected_select_skipped() {
        let form = edit_form();
        assert_eq!(form.value("journal_entry[percent_reached]"), Some(""));
        assert_eq!(form.value("journal_entry[month]"), Some("3"));
        assert_eq!(form.value("journal_entry[day]"), None);
        assert_eq!(form.value("commit"), Some("Save"));
    }

    #[test]
    fn overrides_take_precedence() {
        let form = edit_form();
        let data = form.fill(vec![
            ("journal_entry[pages_read]".into(), "200".into()),
            ("journal_entry[year]".into(), "2024".into()),
        ]);
        assert_eq!(data[0], ("journal_entry[pages_read]".into(), "200".into()));
        assert_eq!(data[1], ("journal_entry[year]".into(), "2024".into()));
        assert_eq!(
            data.iter()
                .filter(|(n, _)| n == "journal_entry[pages_read]")
                .count(),
            1
        );
        assert!(data.contains(&("_method".into(), "patch".into())));
    }

    #[test]
    fn form_without_action_is_error() {
        let doc = Html::parse_fragment(r#"<form><input name="a" value="b"></form>"#);
        let err = Form::find(&doc, "form").unwrap_err();
        assert!(err.to_string().contains("no action"));
    }

    #[test]
    fn missing_form_is_error() {
        let doc = Html::parse_fragment("<div></div>");
        assert!(Form::find(&doc, "form.edit_journal_entry").is_err());
    }

    #[test]
    fn method_link_attributes() {
        let doc = Html::parse_fragment(
            r#"<a href="/journal_entries/42" data-method="delete">Delete</a><a href="/x">x</a>"#,
        );
        let a_sel = selector("a").unwrap();
        let mut links = doc.select(&a_sel);
        let link = MethodLink::from_element(links.next().unwrap()).expect("link");
        assert_eq!(link.href, "/journal_entries/42");
        assert_eq!(link.verb, "delete");

        assert!(MethodLink::from_element(links.next().unwrap()).is_err());
    }
}
