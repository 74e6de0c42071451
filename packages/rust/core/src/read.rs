//! One read-through of a book, from the book's reading summary.

use std::fmt;

use scraper::Html;
use tracing::instrument;

use storygraph_session::markup::select_first;
use storygraph_session::{Fields, Form, FromFragment, MethodLink, Session};
use storygraph_shared::{Result, StoryGraphError};

use crate::dates::{ApproxDate, describe};

/// A row like `5 March 2023 to 20 April 2023` with edit and delete links.
#[derive(Clone)]
pub struct Read {
    session: Session,
    fragment: String,
}

impl FromFragment for Read {
    fn from_fragment(session: Session, fragment: String) -> Self {
        Self { session, fragment }
    }
}

impl Read {
    fn doc(&self) -> Html {
        Html::parse_fragment(&self.fragment)
    }

    fn start_end(&self) -> Result<(Option<ApproxDate>, Option<ApproxDate>)> {
        let doc = self.doc();
        let line = doc
            .root_element()
            .text()
            .find(|t| t.contains(" to "))
            .ok_or_else(|| StoryGraphError::parse("no read dates"))?;

        let (start, end) = line
            .trim()
            .split_once(" to ")
            .ok_or_else(|| StoryGraphError::parse("no read dates"))?;
        Ok((ApproxDate::parse(start)?, ApproxDate::parse(end)?))
    }

    pub fn start(&self) -> Result<Option<ApproxDate>> {
        Ok(self.start_end()?.0)
    }

    pub fn end(&self) -> Result<Option<ApproxDate>> {
        Ok(self.start_end()?.1)
    }

    fn link(&self, verb: &str) -> Result<MethodLink> {
        let doc = self.doc();
        let link = select_first(&doc, &format!(r#"a[data-method="{verb}"]"#))?
            .ok_or_else(|| StoryGraphError::parse(format!("no {verb} link")))?;
        MethodLink::from_element(link)
    }

    /// Change the start and/or end date. Sides passed as `None` are left as they are.
    #[instrument(skip_all)]
    pub async fn edit(&self, start: Option<ApproxDate>, end: Option<ApproxDate>) -> Result<()> {
        let link = self.link("get")?;
        let page = self.session.follow(&link).await?;
        let form = {
            let doc = self.session.parse(&page);
            Form::find(&doc, "form")?
        };

        let mut overrides = Fields::new();
        if let Some(start) = start {
            overrides.extend(start.form_fields("read_instance[start_{}]"));
        }
        if let Some(end) = end {
            overrides.extend(end.form_fields("read_instance[{}]"));
        }

        self.session.submit(&form, overrides, true).await?;
        Ok(())
    }

    pub async fn set_start(&self, start: ApproxDate) -> Result<()> {
        self.edit(Some(start), None).await
    }

    pub async fn set_end(&self, end: ApproxDate) -> Result<()> {
        self.edit(None, Some(end)).await
    }

    /// Remove this read-through.
    pub async fn delete(&self) -> Result<()> {
        let link = self.link("delete")?;
        self.session.follow(&link).await?;
        Ok(())
    }
}

impl fmt::Display for Read {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.start_end() {
            Ok((start, end)) => write!(
                f,
                "{} -> {}",
                describe(start.as_ref()),
                describe(end.as_ref())
            ),
            Err(_) => f.write_str("<unrecognised read>"),
        }
    }
}

impl fmt::Debug for Read {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Read({self})")
    }
}
